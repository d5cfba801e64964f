//! ONNX model loading and execution.

use std::path::{Path, PathBuf};

use ndarray::{ArrayD, ArrayView4, IxDyn};
use ort::session::Session;
use ort::value::Tensor;

use crate::error::{Error, Result};

use super::Network;

/// Where a network runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Device {
    #[default]
    Cpu,
    /// CUDA device with the given index.
    Gpu(i32),
}

impl Device {
    /// Select a device from an optional GPU index; absent or negative means CPU.
    #[must_use]
    pub fn from_gpu_index(index: Option<i32>) -> Self {
        match index {
            Some(id) if id >= 0 => Self::Gpu(id),
            _ => Self::Cpu,
        }
    }
}

/// Location of a model file and the tensors to bind.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Path to the `.onnx` file.
    pub path: PathBuf,

    /// Name of the image input tensor.
    pub input_name: String,

    /// Name of the output tensor to read back.
    pub output_name: String,

    pub device: Device,
}

impl ModelConfig {
    /// Model config with the given tensor names, running on CPU.
    pub fn new(path: impl Into<PathBuf>, input_name: &str, output_name: &str) -> Self {
        Self {
            path: path.into(),
            input_name: input_name.to_string(),
            output_name: output_name.to_string(),
            device: Device::Cpu,
        }
    }

    /// Run on the given device.
    #[must_use]
    pub const fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    fn display_name(&self) -> String {
        self.path
            .file_name()
            .map_or_else(|| self.path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

/// A [`Network`] backed by an ONNX Runtime session.
pub struct OrtNetwork {
    session: Session,
    input_name: String,
    output_name: String,
}

impl OrtNetwork {
    /// Load an ONNX model session.
    ///
    /// # Errors
    ///
    /// Returns an error if the model file does not exist or cannot be loaded.
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let name = config.display_name();
        if !config.path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("model file not found: {}", config.path.display()),
            )));
        }

        tracing::info!("Loading model {name} on {:?}", config.device);
        let session = build_session(&config.path, config.device).map_err(|source| {
            Error::ModelLoad {
                name: name.clone(),
                source,
            }
        })?;

        Ok(Self {
            session,
            input_name: config.input_name.clone(),
            output_name: config.output_name.clone(),
        })
    }
}

fn build_session(path: &Path, device: Device) -> ort::Result<Session> {
    #[allow(unused_mut)]
    let mut builder = Session::builder()?;

    match device {
        Device::Cpu => {}
        #[cfg(feature = "cuda")]
        Device::Gpu(id) => {
            let cuda = ort::execution_providers::CUDAExecutionProvider::default()
                .with_device_id(id)
                .build();
            builder = builder.with_execution_providers([cuda])?;
        }
        #[cfg(not(feature = "cuda"))]
        Device::Gpu(id) => {
            tracing::warn!("GPU {id} requested but built without the `cuda` feature; using CPU");
        }
    }

    builder.commit_from_file(path)
}

impl Network for OrtNetwork {
    #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
    fn forward(&mut self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        let input_value =
            Tensor::from_array(batch.to_owned()).map_err(|source| Error::Inference { source })?;

        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input_value])
            .map_err(|source| Error::Inference { source })?;

        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            Error::shape_mismatch(format!("output {:?}", self.output_name), "no such output")
        })?;

        let (shape_info, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|source| Error::Inference { source })?;

        // Safe: tensor dimensions are always non-negative
        let dims: Vec<usize> = shape_info.iter().map(|&x| x as usize).collect();

        // The session reuses its output buffers, so copy before returning.
        ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())
            .map_err(|_| Error::shape_mismatch(format!("{dims:?}"), "reshape failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_selection() {
        assert_eq!(Device::from_gpu_index(None), Device::Cpu);
        assert_eq!(Device::from_gpu_index(Some(-1)), Device::Cpu);
        assert_eq!(Device::from_gpu_index(Some(2)), Device::Gpu(2));
    }

    #[test]
    fn test_missing_model_file() {
        let config = ModelConfig::new("/nonexistent/model.onnx", "data", "prob");
        assert!(matches!(OrtNetwork::load(&config), Err(Error::Io(_))));
    }

    #[test]
    fn test_display_name() {
        let config = ModelConfig::new("/models/binarize.onnx", "data", "prob");
        assert_eq!(config.display_name(), "binarize.onnx");
    }
}
