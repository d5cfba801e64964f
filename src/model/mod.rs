//! Network inference capability and its ONNX Runtime implementation.

mod loader;

pub use loader::{Device, ModelConfig, OrtNetwork};

use ndarray::{ArrayD, ArrayView4};

use crate::error::Result;

/// A network that maps a batch of images to an output tensor.
///
/// Input batches are NCHW. Implementations return an owned copy of the
/// designated output tensor so that the next call can reuse internal buffers
/// freely. The first output dimension must equal the batch size.
pub trait Network {
    /// Run one forward pass.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn forward(&mut self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>>;
}

impl<N: Network + ?Sized> Network for Box<N> {
    fn forward(&mut self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        (**self).forward(batch)
    }
}

impl<N: Network + ?Sized> Network for &mut N {
    fn forward(&mut self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        (**self).forward(batch)
    }
}
