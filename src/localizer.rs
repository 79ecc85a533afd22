//! Heatmap localization (spatial soft-argmax).
//!
//! A heatmap of unnormalized scores over an `H × W` grid is turned into a joint
//! probability field with a softmax over all `H·W` sites, and then reduced to the
//! expected position along each axis. Both axes are expressed in normalized
//! device coordinates spanning `[-1, 1]`.
//!
//! The returned estimate is `[x, y]`: component 0 comes from the column
//! (horizontal) marginal, component 1 from the row (vertical) marginal. This is
//! the order the Planner was trained with.

use ndarray::{Array1, Array2, ArrayView2, ArrayView3, Axis};

/// Compute softmax of a slice of logits.
///
/// The maximum is subtracted before exponentiating so large logits cannot overflow.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_values: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exp_values.iter().sum();
    exp_values.iter().map(|&x| x / sum).collect()
}

/// Evenly spaced coordinates covering `[-1, 1]` with `n` points.
///
/// A single-point axis sits at the center so a one-pixel-wide heatmap never
/// biases the estimate toward an edge. The trainer's `linspace(-1, 1, 1)` gives
/// `[-1]` instead, so one-pixel axes differ from training.
pub fn axis_coordinates(n: usize) -> Array1<f32> {
    if n == 1 {
        return Array1::zeros(1);
    }
    Array1::linspace(-1.0, 1.0, n)
}

/// Normalize a heatmap into a probability field summing to 1 over the whole grid.
pub fn probability_field(heatmap: &ArrayView2<f32>) -> Array2<f32> {
    let max = heatmap.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let mut field = heatmap.mapv(|v| (v - max).exp());
    let sum = field.sum();
    field /= sum;
    field
}

/// Soft-argmax of a single `H × W` heatmap, returned as `[x, y]` in `[-1, 1]`.
pub fn spatial_soft_argmax(heatmap: &ArrayView2<f32>) -> [f32; 2] {
    let (height, width) = heatmap.dim();
    if height == 0 || width == 0 {
        return [0.0, 0.0];
    }

    let weights = probability_field(heatmap);

    // Column marginal: probability mass per x position (sum over rows).
    let column_marginal = weights.sum_axis(Axis(0));
    // Row marginal: probability mass per y position (sum over columns).
    let row_marginal = weights.sum_axis(Axis(1));

    let x = column_marginal.dot(&axis_coordinates(width));
    let y = row_marginal.dot(&axis_coordinates(height));

    // Rounding in the probability sum can push a full spike a few ulps past an edge.
    [x.clamp(-1.0, 1.0), y.clamp(-1.0, 1.0)]
}

/// Soft-argmax of a batch of heatmaps with shape `(B, H, W)`.
///
/// Returns a `(B, 2)` array of `[x, y]` location estimates.
pub fn spatial_soft_argmax_batch(heatmaps: &ArrayView3<f32>) -> Array2<f32> {
    let batch = heatmaps.len_of(Axis(0));
    let mut locations = Array2::<f32>::zeros((batch, 2));
    for (i, heatmap) in heatmaps.axis_iter(Axis(0)).enumerate() {
        let [x, y] = spatial_soft_argmax(&heatmap);
        locations[[i, 0]] = x;
        locations[[i, 1]] = y;
    }
    locations
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, Array3};

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(probs[2] > probs[1]);
        assert!(probs[1] > probs[0]);
    }

    #[test]
    fn test_softmax_large_values() {
        // Should not overflow
        let probs = softmax(&[1000.0, 1001.0, 1002.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_axis_coordinates_span() {
        let coords = axis_coordinates(5);
        assert_eq!(coords.len(), 5);
        assert!((coords[0] + 1.0).abs() < 1e-6);
        assert!((coords[2]).abs() < 1e-6);
        assert!((coords[4] - 1.0).abs() < 1e-6);
        assert_eq!(axis_coordinates(1)[0], 0.0);
    }

    #[test]
    fn test_probability_field_sums_to_one() {
        let heatmap = Array2::from_shape_fn((4, 6), |(r, c)| (r * 6 + c) as f32 * 0.3);
        let field = probability_field(&heatmap.view());
        assert_eq!(field.dim(), (4, 6));
        assert!((field.sum() - 1.0).abs() < 1e-5);
        assert!(field.iter().all(|&p| p >= 0.0));
        // Highest score lands in the last cell
        assert!(field[[3, 5]] > field[[0, 0]]);
    }

    #[test]
    fn test_probability_field_of_strided_view() {
        // Transposed views are not in standard layout; the field must keep their shape
        let heatmap = Array2::from_shape_fn((3, 5), |(r, c)| (r * 5 + c) as f32);
        let transposed = heatmap.t();
        let field = probability_field(&transposed);
        assert_eq!(field.dim(), (5, 3));
        assert!((field.sum() - 1.0).abs() < 1e-5);
        assert!(field[[4, 2]] > field[[4, 1]]);

        let extreme = Array2::<f32>::from_elem((2, 3), 3.0e38);
        let field = probability_field(&extreme.view());
        assert!((field.sum() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_uniform_heatmap_is_centered() {
        for &(h, w) in &[(19usize, 25usize), (2, 2), (7, 3), (1, 1)] {
            let heatmap = Array2::<f32>::from_elem((h, w), 3.5);
            let [x, y] = spatial_soft_argmax(&heatmap.view());
            assert!(x.abs() < 1e-5, "x = {} for {}x{}", x, h, w);
            assert!(y.abs() < 1e-5, "y = {} for {}x{}", y, h, w);
        }
    }

    #[test]
    fn test_single_spike_maps_to_grid_coordinate() {
        for &(h, w, r, c) in &[
            (19usize, 25usize, 0usize, 24usize),
            (19, 25, 9, 12),
            (5, 8, 4, 1),
            (3, 3, 2, 0),
        ] {
            let mut heatmap = Array2::<f32>::zeros((h, w));
            heatmap[[r, c]] = 100.0;
            let [x, y] = spatial_soft_argmax(&heatmap.view());
            let expected_x = axis_coordinates(w)[c];
            let expected_y = axis_coordinates(h)[r];
            assert!((x - expected_x).abs() < 1e-4, "x {} vs {}", x, expected_x);
            assert!((y - expected_y).abs() < 1e-4, "y {} vs {}", y, expected_y);
        }
    }

    #[test]
    fn test_spike_in_right_column_is_positive_x() {
        // Component 0 follows the column axis, component 1 the row axis
        let mut heatmap = Array2::<f32>::zeros((10, 10));
        heatmap[[0, 9]] = 50.0;
        let [x, y] = spatial_soft_argmax(&heatmap.view());
        assert!(x > 0.9);
        assert!(y < -0.9);
    }

    #[test]
    fn test_batch_matches_single() {
        let heatmaps = Array3::from_shape_fn((3, 6, 9), |(b, r, c)| {
            ((b + 1) as f32 * 0.7 * r as f32 - c as f32 * 0.4).sin() * 4.0
        });
        let locations = spatial_soft_argmax_batch(&heatmaps.view());
        assert_eq!(locations.dim(), (3, 2));
        for b in 0..3 {
            let single = spatial_soft_argmax(&heatmaps.index_axis(Axis(0), b));
            assert_eq!(locations[[b, 0]], single[0]);
            assert_eq!(locations[[b, 1]], single[1]);
        }
    }

    #[test]
    fn test_extreme_scores_stay_finite() {
        let mut heatmap = Array2::<f32>::from_elem((4, 4), -1.0e30);
        heatmap[[1, 2]] = 1.0e30;
        let [x, y] = spatial_soft_argmax(&heatmap.view());
        assert!(x.is_finite() && y.is_finite());
        assert!((x - axis_coordinates(4)[2]).abs() < 1e-5);
        assert!((y - axis_coordinates(4)[1]).abs() < 1e-5);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn heatmap_strategy() -> impl Strategy<Value = Array2<f32>> {
            (1usize..24, 1usize..24).prop_flat_map(|(h, w)| {
                proptest::collection::vec(-1.0e4f32..1.0e4f32, h * w).prop_map(move |values| {
                    Array2::from_shape_vec((h, w), values).expect("shape matches length")
                })
            })
        }

        proptest! {
            /// Property: the estimate is always inside [-1, 1] on both axes
            #[test]
            fn prop_location_is_bounded(heatmap in heatmap_strategy()) {
                let [x, y] = spatial_soft_argmax(&heatmap.view());
                prop_assert!(x.is_finite() && y.is_finite());
                prop_assert!((-1.0..=1.0).contains(&x));
                prop_assert!((-1.0..=1.0).contains(&y));
            }

            /// Property: adding a constant to every score leaves the estimate unchanged
            #[test]
            fn prop_shift_invariant(heatmap in heatmap_strategy(), shift in -100.0f32..100.0f32) {
                let small = heatmap.mapv(|v| v * 1.0e-3);
                let [x0, y0] = spatial_soft_argmax(&small.view());
                let shifted = small.mapv(|v| v + shift);
                let [x1, y1] = spatial_soft_argmax(&shifted.view());
                prop_assert!((x0 - x1).abs() < 1e-3);
                prop_assert!((y0 - y1).abs() < 1e-3);
            }
        }
    }
}
