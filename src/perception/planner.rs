//! Native Planner network evaluated with ndarray.
//!
//! Architecture (inference mode):
//! - `channels.len()` blocks of BatchNorm → Conv 5×5 stride 2 pad 2 → ReLU
//! - global average pool → linear layer producing `[visibility, distance]`
//! - 1×1 convolution to a single-channel heatmap → spatial soft-argmax
//!
//! Both heads share the convolutional backbone, so one forward pass per tick
//! yields everything the controller needs.
//!
//! Weights are stored as an `.npz` archive keyed by the PyTorch state-dict names
//! (`_conv.0.weight`, `_conv.1.bias`, ..., `classifier.weight`, `location.bias`).
//! Block `i` owns the BatchNorm at Sequential index `3i` and the Conv at `3i + 1`.

use anyhow::{Context, Result};
use ndarray::{Array, Array1, Array2, Array3, Array4, ArrayView3, ArrayView4, Axis, Dimension};
use ndarray_npy::{NpzReader, NpzWriter};
use rayon::prelude::*;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use crate::localizer::spatial_soft_argmax;
use crate::perception::{check_image_batch, PerceptionModel, PerceptionOutput};
use crate::transform::INPUT_CHANNELS;

/// Backbone widths the shipped weights were trained with.
pub const DEFAULT_CHANNELS: [usize; 4] = [16, 32, 32, 32];

const KERNEL_SIZE: usize = 5;
const STRIDE: usize = 2;
const PADDING: usize = 2;
const BATCH_NORM_EPS: f32 = 1e-5;

/// Outputs of the classifier head.
const CLASSIFIER_OUTPUTS: usize = 2;

/// BatchNorm2d in inference mode (running statistics).
#[derive(Debug, Clone)]
struct BatchNorm {
    weight: Array1<f32>,
    bias: Array1<f32>,
    running_mean: Array1<f32>,
    running_var: Array1<f32>,
}

impl BatchNorm {
    fn check(&self, channels: usize, name: &str) -> Result<()> {
        for (param, len) in [
            ("weight", self.weight.len()),
            ("bias", self.bias.len()),
            ("running_mean", self.running_mean.len()),
            ("running_var", self.running_var.len()),
        ] {
            anyhow::ensure!(
                len == channels,
                "{}.{} has {} entries, expected {}",
                name,
                param,
                len,
                channels
            );
        }
        Ok(())
    }

    fn apply(&self, input: &ArrayView3<f32>) -> Array3<f32> {
        let mut output = input.to_owned();
        for (c, mut plane) in output.axis_iter_mut(Axis(0)).enumerate() {
            let scale = self.weight[c] / (self.running_var[c] + BATCH_NORM_EPS).sqrt();
            let shift = self.bias[c] - self.running_mean[c] * scale;
            plane.mapv_inplace(|v| v * scale + shift);
        }
        output
    }
}

/// Square-kernel 2D convolution over a single `(C, H, W)` input.
#[derive(Debug, Clone)]
struct Conv2d {
    /// `(out_channels, in_channels, k, k)`
    weight: Array4<f32>,
    bias: Array1<f32>,
    stride: usize,
    padding: usize,
}

impl Conv2d {
    fn check(&self, in_channels: usize, out_channels: usize, kernel: usize, name: &str) -> Result<()> {
        let expected = (out_channels, in_channels, kernel, kernel);
        anyhow::ensure!(
            self.weight.dim() == expected,
            "{}.weight has shape {:?}, expected {:?}",
            name,
            self.weight.shape(),
            expected
        );
        anyhow::ensure!(
            self.bias.len() == out_channels,
            "{}.bias has {} entries, expected {}",
            name,
            self.bias.len(),
            out_channels
        );
        Ok(())
    }

    fn output_size(&self, size: usize) -> usize {
        let kernel = self.weight.dim().2;
        (size + 2 * self.padding - kernel) / self.stride + 1
    }

    fn forward(&self, input: &ArrayView3<f32>) -> Array3<f32> {
        let (in_channels, height, width) = input.dim();
        let (out_channels, _, kernel, _) = self.weight.dim();
        let out_h = self.output_size(height);
        let out_w = self.output_size(width);
        let pad = self.padding as isize;

        // Output channels are independent, so they are computed in parallel.
        let planes: Vec<Array2<f32>> = (0..out_channels)
            .into_par_iter()
            .map(|o| {
                let mut plane = Array2::<f32>::from_elem((out_h, out_w), self.bias[o]);
                for c in 0..in_channels {
                    let channel = input.index_axis(Axis(0), c);
                    for ky in 0..kernel {
                        for kx in 0..kernel {
                            let w = self.weight[[o, c, ky, kx]];
                            if w == 0.0 {
                                continue;
                            }
                            for oy in 0..out_h {
                                let iy = (oy * self.stride + ky) as isize - pad;
                                if iy < 0 || iy >= height as isize {
                                    continue;
                                }
                                for ox in 0..out_w {
                                    let ix = (ox * self.stride + kx) as isize - pad;
                                    if ix < 0 || ix >= width as isize {
                                        continue;
                                    }
                                    plane[[oy, ox]] += w * channel[[iy as usize, ix as usize]];
                                }
                            }
                        }
                    }
                }
                plane
            })
            .collect();

        let mut output = Array3::<f32>::zeros((out_channels, out_h, out_w));
        for (o, plane) in planes.iter().enumerate() {
            output.index_axis_mut(Axis(0), o).assign(plane);
        }
        output
    }
}

#[derive(Debug, Clone)]
struct ConvBlock {
    norm: BatchNorm,
    conv: Conv2d,
}

/// The Planner: shared conv backbone with a classifier head and a heatmap head.
#[derive(Debug, Clone)]
pub struct Planner {
    blocks: Vec<ConvBlock>,
    /// `(2, C)`
    classifier_weight: Array2<f32>,
    classifier_bias: Array1<f32>,
    /// 1×1 convolution, `C` → 1
    location: Conv2d,
}

/// `NpzWriter` stores each array as `<name>.npy`, as numpy does.
fn read_array<D: Dimension>(npz: &mut NpzReader<File>, name: &str) -> Result<Array<f32, D>> {
    npz.by_name(&format!("{}.npy", name))
        .with_context(|| format!("Missing or malformed array '{}'", name))
}

impl Planner {
    /// Load Planner weights from an `.npz` archive.
    ///
    /// `channels` lists the output width of each backbone block and must match
    /// the widths the weights were trained with.
    pub fn load<P: AsRef<Path>>(path: P, channels: &[usize]) -> Result<Self> {
        anyhow::ensure!(!channels.is_empty(), "Planner needs at least one conv block");

        let file = File::open(path.as_ref())
            .with_context(|| format!("Failed to open {}", path.as_ref().display()))?;
        let mut npz = NpzReader::new(file).context("Failed to read npz archive")?;

        let mut blocks = Vec::with_capacity(channels.len());
        let mut in_channels = INPUT_CHANNELS;
        for (i, &out_channels) in channels.iter().enumerate() {
            let norm_name = format!("_conv.{}", 3 * i);
            let conv_name = format!("_conv.{}", 3 * i + 1);

            let norm = BatchNorm {
                weight: read_array(&mut npz, &format!("{}.weight", norm_name))?,
                bias: read_array(&mut npz, &format!("{}.bias", norm_name))?,
                running_mean: read_array(&mut npz, &format!("{}.running_mean", norm_name))?,
                running_var: read_array(&mut npz, &format!("{}.running_var", norm_name))?,
            };
            norm.check(in_channels, &norm_name)?;

            let conv = Conv2d {
                weight: read_array(&mut npz, &format!("{}.weight", conv_name))?,
                bias: read_array(&mut npz, &format!("{}.bias", conv_name))?,
                stride: STRIDE,
                padding: PADDING,
            };
            conv.check(in_channels, out_channels, KERNEL_SIZE, &conv_name)?;

            blocks.push(ConvBlock { norm, conv });
            in_channels = out_channels;
        }

        let classifier_weight: Array2<f32> = read_array(&mut npz, "classifier.weight")?;
        let classifier_bias: Array1<f32> = read_array(&mut npz, "classifier.bias")?;
        anyhow::ensure!(
            classifier_weight.dim() == (CLASSIFIER_OUTPUTS, in_channels),
            "classifier.weight has shape {:?}, expected ({}, {})",
            classifier_weight.shape(),
            CLASSIFIER_OUTPUTS,
            in_channels
        );
        anyhow::ensure!(
            classifier_bias.len() == CLASSIFIER_OUTPUTS,
            "classifier.bias has {} entries, expected {}",
            classifier_bias.len(),
            CLASSIFIER_OUTPUTS
        );

        let location = Conv2d {
            weight: read_array(&mut npz, "location.weight")?,
            bias: read_array(&mut npz, "location.bias")?,
            stride: 1,
            padding: 0,
        };
        location.check(in_channels, 1, 1, "location")?;

        Ok(Self {
            blocks,
            classifier_weight,
            classifier_bias,
            location,
        })
    }

    /// Write the weights as an `.npz` archive readable by [`Planner::load`].
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        let file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create {}", path.as_ref().display()))?;
        let mut npz = NpzWriter::new(BufWriter::new(file));
        for (i, block) in self.blocks.iter().enumerate() {
            let norm_name = format!("_conv.{}", 3 * i);
            let conv_name = format!("_conv.{}", 3 * i + 1);
            npz.add_array(format!("{}.weight", norm_name), &block.norm.weight)?;
            npz.add_array(format!("{}.bias", norm_name), &block.norm.bias)?;
            npz.add_array(format!("{}.running_mean", norm_name), &block.norm.running_mean)?;
            npz.add_array(format!("{}.running_var", norm_name), &block.norm.running_var)?;
            npz.add_array(format!("{}.weight", conv_name), &block.conv.weight)?;
            npz.add_array(format!("{}.bias", conv_name), &block.conv.bias)?;
        }
        npz.add_array("classifier.weight", &self.classifier_weight)?;
        npz.add_array("classifier.bias", &self.classifier_bias)?;
        npz.add_array("location.weight", &self.location.weight)?;
        npz.add_array("location.bias", &self.location.bias)?;
        npz.finish()?;
        Ok(())
    }

    /// Output width of each backbone block.
    pub fn channels(&self) -> Vec<usize> {
        self.blocks.iter().map(|b| b.conv.bias.len()).collect()
    }

    /// Spatial size of the feature grid (and heatmap) for an input of `height × width`.
    ///
    /// For the default backbone a 300×400 frame gives a 19×25 heatmap.
    pub fn feature_grid(&self, height: usize, width: usize) -> (usize, usize) {
        self.blocks.iter().fold((height, width), |(h, w), block| {
            (block.conv.output_size(h), block.conv.output_size(w))
        })
    }

    /// Backbone features `(C, h, w)` for one `(3, H, W)` image.
    fn features(&self, image: &ArrayView3<f32>) -> Array3<f32> {
        let mut x = image.to_owned();
        for block in &self.blocks {
            let normed = block.norm.apply(&x.view());
            x = block.conv.forward(&normed.view());
            x.mapv_inplace(|v| v.max(0.0));
        }
        x
    }

    /// Run both heads on a `(B, 3, H, W)` batch.
    pub fn forward(&self, images: &ArrayView4<f32>) -> Result<PerceptionOutput> {
        check_image_batch(images)?;

        let batch = images.len_of(Axis(0));
        let mut puck = Array2::<f32>::zeros((batch, CLASSIFIER_OUTPUTS));
        let mut location = Array2::<f32>::zeros((batch, 2));

        for (i, image) in images.axis_iter(Axis(0)).enumerate() {
            let features = self.features(&image);
            let (_, h, w) = features.dim();

            // Global average pool -> classifier
            let pooled = features.sum_axis(Axis(2)).sum_axis(Axis(1)) / (h * w) as f32;
            let logits = self.classifier_weight.dot(&pooled) + &self.classifier_bias;
            puck.row_mut(i).assign(&logits);

            // 1x1 conv -> heatmap -> soft-argmax
            let heatmap = self.location.forward(&features.view());
            let [x, y] = spatial_soft_argmax(&heatmap.index_axis(Axis(0), 0));
            location[[i, 0]] = x;
            location[[i, 1]] = y;
        }

        Ok(PerceptionOutput { puck, location })
    }
}

impl PerceptionModel for Planner {
    fn predict(&mut self, images: &ArrayView4<f32>) -> Result<PerceptionOutput> {
        self.forward(images)
    }
}
