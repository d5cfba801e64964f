//! Document tools built on tiled or augmented inference.

mod batch;
mod binarize;
mod classify;
mod invert;
mod tiled;

pub use batch::{class_scores, infer, split_nchw};
pub use binarize::{BinarizeConfig, Binarizer, BinaryMaps};
pub use classify::{ClassifyConfig, Classifier, Report};
pub use invert::{output_to_sample, Inverter};
pub use tiled::TileConfig;
