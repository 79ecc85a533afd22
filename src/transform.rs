//! Camera frame → model tensor conversion.
//!
//! Frames arrive from the simulator as `H × W × 3` RGB bytes. The Planner expects
//! `(B, 3, H, W)` float tensors with every channel scaled into `[0, 1]`.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageReader, RgbImage};
use ndarray::{s, Array3, Array4, ArrayView3, Axis};
use std::path::Path;

/// Number of color channels the Planner consumes.
pub const INPUT_CHANNELS: usize = 3;

/// Convert one `H × W × 3` RGB frame into a `(3, H, W)` tensor in `[0, 1]`.
pub fn frame_to_tensor(frame: &ArrayView3<u8>) -> Result<Array3<f32>> {
    let (height, width, channels) = frame.dim();
    anyhow::ensure!(
        channels == INPUT_CHANNELS,
        "Expected an RGB frame with {} channels, got shape ({}, {}, {})",
        INPUT_CHANNELS,
        height,
        width,
        channels
    );

    // HWC -> CHW
    let chw = frame.view().permuted_axes([2, 0, 1]);
    Ok(chw.mapv(|v| v as f32 / 255.0))
}

/// Convert a set of frames (one per kart) into a single `(B, 3, H, W)` batch.
///
/// All frames must share the same resolution.
pub fn frames_to_batch(frames: &[ArrayView3<u8>]) -> Result<Array4<f32>> {
    anyhow::ensure!(!frames.is_empty(), "Cannot build a batch from zero frames");

    let (height, width, _) = frames[0].dim();
    let mut batch = Array4::<f32>::zeros((frames.len(), INPUT_CHANNELS, height, width));
    for (i, frame) in frames.iter().enumerate() {
        anyhow::ensure!(
            frame.dim().0 == height && frame.dim().1 == width,
            "Frame {} has resolution {}x{}, expected {}x{}",
            i,
            frame.dim().1,
            frame.dim().0,
            width,
            height
        );
        let tensor = frame_to_tensor(frame).with_context(|| format!("Frame {}", i))?;
        batch.index_axis_mut(Axis(0), i).assign(&tensor);
    }
    Ok(batch)
}

/// Copy an RGB image into an `H × W × 3` byte array.
pub fn rgb_image_to_frame(img: &RgbImage) -> Array3<u8> {
    let (width, height) = img.dimensions();
    let mut frame = Array3::<u8>::zeros((height as usize, width as usize, INPUT_CHANNELS));
    for (x, y, pixel) in img.enumerate_pixels() {
        frame
            .slice_mut(s![y as usize, x as usize, ..])
            .assign(&ndarray::arr1(&pixel.0));
    }
    frame
}

/// Load a frame from an image file on disk.
pub fn load_frame<P: AsRef<Path>>(path: P) -> Result<Array3<u8>> {
    let path = path.as_ref();
    let img = ImageReader::open(path)
        .with_context(|| format!("Failed to open image {}", path.display()))?
        .decode()
        .with_context(|| format!("Failed to decode image {}", path.display()))?;

    // Convert to RGB if not already
    let img = match img {
        DynamicImage::ImageRgb8(rgb) => rgb,
        other => other.to_rgb8(),
    };
    Ok(rgb_image_to_frame(&img))
}
