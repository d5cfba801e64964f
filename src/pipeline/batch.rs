//! Batched inference: feed images through a network in fixed-size chunks.

use indicatif::{ProgressBar, ProgressStyle};
use ndarray::{concatenate, s, Array2, Array3, Array4, ArrayD, Axis, Ix2, Ix4};

use crate::error::{Error, Result};
use crate::image::Image;
use crate::model::Network;

/// Create a progress bar in the crate's style.
pub(crate) fn progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let template = format!("{{spinner:.green}} {label} [{{bar:40.cyan/blue}}] {{pos}}/{{len}}");
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Run `images` (HWC) through `network` in chunks of `batch_size`.
///
/// Each chunk is stacked in NCHW layout and forwarded once. The outputs are
/// concatenated along the batch axis in input order. Every chunk's geometry
/// is validated before the first forward pass.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] for a zero batch size or no images,
/// [`Error::ShapeMismatch`] if images in one chunk differ in shape or the
/// network returns the wrong batch dimension, and any error raised by the
/// network.
pub fn infer<N: Network + ?Sized>(
    network: &mut N,
    images: &[Image],
    batch_size: usize,
) -> Result<ArrayD<f32>> {
    if batch_size == 0 {
        return Err(Error::invalid_parameter("batch_size", "must be greater than 0"));
    }
    if images.is_empty() {
        return Err(Error::invalid_parameter("images", "at least one image is required"));
    }

    for chunk in images.chunks(batch_size) {
        let dim = chunk[0].dim();
        if let Some(other) = chunk.iter().find(|im| im.dim() != dim) {
            return Err(Error::shape_mismatch(
                format!("{dim:?} for every image in a batch"),
                format!("{:?}", other.dim()),
            ));
        }
    }

    let total = images.len();
    let pb = progress_bar(total as u64, "Inference");
    let mut responses = Vec::with_capacity(total.div_ceil(batch_size));
    let mut done = 0;

    for chunk in images.chunks(batch_size) {
        let batch = stack_nchw(chunk);
        let output = network.forward(batch.view())?;

        if output.ndim() == 0 || output.shape()[0] != chunk.len() {
            return Err(Error::shape_mismatch(
                format!("batch dimension {}", chunk.len()),
                format!("output shape {:?}", output.shape()),
            ));
        }
        responses.push(output);

        done += chunk.len();
        pb.set_position(done as u64);
        tracing::debug!("Progress {}%", done * 100 / total);
    }

    pb.finish_and_clear();

    let views: Vec<_> = responses.iter().map(ArrayD::view).collect();
    concatenate(Axis(0), &views)
        .map_err(|e| Error::shape_mismatch("equal output shapes across batches", e.to_string()))
}

/// Stack same-shape HWC images into one NCHW batch.
fn stack_nchw(images: &[Image]) -> Array4<f32> {
    let (height, width, channels) = images[0].dim();
    let mut batch = Array4::<f32>::zeros((images.len(), channels, height, width));

    for (i, im) in images.iter().enumerate() {
        batch
            .slice_mut(s![i, .., .., ..])
            .assign(&im.view().permuted_axes([2, 0, 1]));
    }

    batch
}

/// Split an NCHW output tensor into per-image HWC maps.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the tensor is not four-dimensional.
pub fn split_nchw(outputs: ArrayD<f32>) -> Result<Vec<Array3<f32>>> {
    let shape = outputs.shape().to_vec();
    let outputs = outputs
        .into_dimensionality::<Ix4>()
        .map_err(|_| Error::shape_mismatch("NCHW output", format!("{shape:?}")))?;

    Ok(outputs
        .axis_iter(Axis(0))
        .map(|item| item.permuted_axes([1, 2, 0]).as_standard_layout().into_owned())
        .collect())
}

/// View a classification output as one score row per image.
///
/// Trailing singleton dimensions (e.g. `N x K x 1 x 1`) are dropped.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the tensor cannot be reduced to two
/// dimensions.
pub fn class_scores(outputs: ArrayD<f32>) -> Result<Array2<f32>> {
    let shape = outputs.shape().to_vec();
    let mut outputs = outputs;
    while outputs.ndim() > 2 && outputs.shape()[outputs.ndim() - 1] == 1 {
        let last = outputs.ndim() - 1;
        outputs = outputs.index_axis_move(Axis(last), 0);
    }

    outputs
        .into_dimensionality::<Ix2>()
        .map_err(|_| Error::shape_mismatch("N x classes output", format!("{shape:?}")))
}
