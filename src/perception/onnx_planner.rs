//! ONNX Runtime backend for the Planner.
//!
//! The exported graph takes `image` `(B, 3, H, W)` and returns `puck` `(B, 2)`
//! together with the raw single-channel `heatmap` `(B, h, w)`. The soft-argmax
//! runs on the Rust side so the graph only carries the convolutional layers.
//!
//! This module is only available behind the `binary` feature flag.

use anyhow::{Context, Result};
use ndarray::{Array2, Array3, ArrayView4};
use ort::session::Session;
use std::path::Path;
use tracing::info;

use crate::localizer::spatial_soft_argmax_batch;
use crate::perception::{check_image_batch, PerceptionModel, PerceptionOutput};

/// A Planner evaluated by ONNX Runtime.
pub struct OnnxPlanner {
    session: Session,
}

impl OnnxPlanner {
    /// Load an ONNX model from the given path.
    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model_path = model_path.as_ref();
        let session = Session::builder()
            .context("Failed to create ONNX session builder")?
            .commit_from_file(model_path)
            .context("Failed to load ONNX model")?;
        info!(path = %model_path.display(), "Loaded ONNX planner");
        Ok(Self { session })
    }
}

impl PerceptionModel for OnnxPlanner {
    fn predict(&mut self, images: &ArrayView4<f32>) -> Result<PerceptionOutput> {
        check_image_batch(images)?;
        let batch = images.dim().0;

        // Convert to flat vec for ORT
        let shape = images.shape().to_vec();
        let data: Vec<f32> = images.iter().copied().collect();
        let input_value = ort::value::Value::from_array((shape.as_slice(), data))
            .context("Failed to create ONNX input value")?;

        // Run inference
        let outputs = self
            .session
            .run(ort::inputs!["image" => input_value])
            .context("Failed to run ONNX inference")?;

        let (puck_shape, puck_data) = outputs["puck"]
            .try_extract_tensor::<f32>()
            .context("Failed to extract puck tensor")?;
        let puck_dims: Vec<usize> = puck_shape.iter().map(|&d| d as usize).collect();
        anyhow::ensure!(
            puck_dims == [batch, 2],
            "Unexpected puck output shape {:?}",
            puck_dims
        );
        let puck = Array2::from_shape_vec((batch, 2), puck_data.to_vec())
            .context("Failed to reshape puck output")?;

        let (heatmap_shape, heatmap_data) = outputs["heatmap"]
            .try_extract_tensor::<f32>()
            .context("Failed to extract heatmap tensor")?;
        let heatmap_dims: Vec<usize> = heatmap_shape.iter().map(|&d| d as usize).collect();
        // Accept (B, h, w) or the raw conv layout (B, 1, h, w)
        let (h, w) = match heatmap_dims.as_slice() {
            [b, h, w] if *b == batch => (*h, *w),
            [b, 1, h, w] if *b == batch => (*h, *w),
            other => anyhow::bail!("Unexpected heatmap output shape {:?}", other),
        };
        let heatmaps = Array3::from_shape_vec((batch, h, w), heatmap_data.to_vec())
            .context("Failed to reshape heatmap output")?;

        Ok(PerceptionOutput {
            puck,
            location: spatial_soft_argmax_batch(&heatmaps.view()),
        })
    }
}
