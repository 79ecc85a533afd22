//! Puck perception models.
//!
//! Every backend implements the [`PerceptionModel`] trait so the team
//! orchestrator can be exercised with a mock model in tests.

use anyhow::{Context, Result};
use ndarray::{Array2, ArrayView4};
use std::path::Path;

#[cfg(feature = "binary")]
pub mod onnx_planner;
pub mod planner;

use crate::transform::INPUT_CHANNELS;

/// Trait for models that predict puck visibility, distance and on-screen location.
pub trait PerceptionModel {
    /// Run the model on a `(B, 3, H, W)` batch of normalized images.
    ///
    /// Returns one visibility/distance pair and one location estimate per image.
    fn predict(&mut self, images: &ArrayView4<f32>) -> Result<PerceptionOutput>;
}

/// Batched model output.
#[derive(Debug, Clone)]
pub struct PerceptionOutput {
    /// `(B, 2)`: column 0 is the visibility score, column 1 the distance proxy.
    pub puck: Array2<f32>,
    /// `(B, 2)`: soft-argmax location `[x, y]` in `[-1, 1]`.
    pub location: Array2<f32>,
}

/// What the model saw in one kart's frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PuckObservation {
    /// Unbounded score; higher means the puck is more likely on screen.
    pub visibility: f32,
    /// Coarse closeness indicator, not a calibrated distance.
    pub distance: f32,
    /// Location estimate `[x, y]` in normalized device coordinates.
    pub location: [f32; 2],
}

impl PerceptionOutput {
    pub fn batch_size(&self) -> usize {
        self.puck.nrows()
    }

    /// Observation for the `index`-th image of the batch.
    pub fn observation(&self, index: usize) -> Option<PuckObservation> {
        if index >= self.puck.nrows() || index >= self.location.nrows() {
            return None;
        }
        Some(PuckObservation {
            visibility: self.puck[[index, 0]],
            distance: self.puck[[index, 1]],
            location: [self.location[[index, 0]], self.location[[index, 1]]],
        })
    }
}

/// Check that `images` is a `(B, 3, H, W)` batch the Planner can consume.
pub fn check_image_batch(images: &ArrayView4<f32>) -> Result<()> {
    let (batch, channels, height, width) = images.dim();
    anyhow::ensure!(batch > 0, "Image batch is empty");
    anyhow::ensure!(
        channels == INPUT_CHANNELS,
        "Expected {} input channels, got image batch of shape ({}, {}, {}, {})",
        INPUT_CHANNELS,
        batch,
        channels,
        height,
        width
    );
    anyhow::ensure!(height > 0 && width > 0, "Image batch has zero spatial size");
    Ok(())
}

/// Load a perception model, picking the backend from the file extension.
///
/// * `.npz` - native Planner weights (PyTorch state-dict names).
/// * `.onnx` - ONNX Runtime session (requires the `binary` feature).
pub fn load_perception_model<P: AsRef<Path>>(
    path: P,
    channels: &[usize],
) -> Result<Box<dyn PerceptionModel>> {
    let path = path.as_ref();
    anyhow::ensure!(
        path.exists(),
        "Perception model not found at {}",
        path.display()
    );

    match path.extension().and_then(|e| e.to_str()) {
        Some("npz") => {
            let planner = planner::Planner::load(path, channels)
                .with_context(|| format!("Failed to load Planner weights from {}", path.display()))?;
            Ok(Box::new(planner))
        }
        #[cfg(feature = "binary")]
        Some("onnx") => {
            let planner = onnx_planner::OnnxPlanner::new(path)?;
            Ok(Box::new(planner))
        }
        _ => anyhow::bail!(
            "Unsupported perception model format: {}",
            path.display()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{arr2, Array4};

    #[test]
    fn test_observation_unpacks_columns() {
        let output = PerceptionOutput {
            puck: arr2(&[[7.5, 0.07], [2.0, 0.3]]),
            location: arr2(&[[0.1, -0.2], [-0.5, 0.4]]),
        };
        assert_eq!(output.batch_size(), 2);
        let obs = output.observation(1).unwrap();
        assert_eq!(obs.visibility, 2.0);
        assert_eq!(obs.distance, 0.3);
        assert_eq!(obs.location, [-0.5, 0.4]);
        assert!(output.observation(2).is_none());
    }

    #[test]
    fn test_check_image_batch() {
        assert!(check_image_batch(&Array4::<f32>::zeros((2, 3, 8, 8)).view()).is_ok());
        assert!(check_image_batch(&Array4::<f32>::zeros((2, 4, 8, 8)).view()).is_err());
        assert!(check_image_batch(&Array4::<f32>::zeros((0, 3, 8, 8)).view()).is_err());
    }

    #[test]
    fn test_load_missing_model_fails() {
        assert!(load_perception_model("/nonexistent/planner.npz", &[16, 32]).is_err());
    }

    #[test]
    fn test_load_unknown_extension_fails() {
        let file = tempfile::Builder::new().suffix(".th").tempfile().unwrap();
        assert!(load_perception_model(file.path(), &[16, 32]).is_err());
    }
}
