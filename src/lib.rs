//! # doctile
//!
//! Tools for running document-image networks over whole pages.
//!
//! Pages are cut into overlapping tiles, pushed through an ONNX network in
//! batches, and the per-tile outputs are stitched back into full-resolution
//! maps. Whole-image classifiers get test-time augmentation from a small
//! transform language, with the per-variant outputs combined by a weighted
//! vote. Binarization results can be scored against ground truth.
//!
//! ## Example
//!
//! ```no_run
//! use doctile::{BinarizeConfig, Binarizer, ModelConfig, OrtNetwork};
//!
//! # fn main() -> doctile::Result<()> {
//! let network = OrtNetwork::load(&ModelConfig::new("binarize.onnx", "data", "prob"))?;
//! let mut binarizer = Binarizer::new(BinarizeConfig::default(), network)?;
//!
//! binarizer.process("page.png", "out/page")?;
//! # Ok(())
//! # }
//! ```

pub mod dataset;
pub mod error;
pub mod eval;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod tiling;
pub mod transform;
pub mod vote;

pub use error::{Error, Result};
pub use model::{Device, ModelConfig, Network, OrtNetwork};
pub use pipeline::{
    BinarizeConfig, Binarizer, ClassifyConfig, Classifier, Inverter, Report, TileConfig,
};
pub use transform::{CropWeighting, Pipeline, TransformSet};
pub use vote::VoteMode;
