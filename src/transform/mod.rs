//! Test-time augmentation: parse transform pipelines and expand an image
//! into weighted variants.
//!
//! A pipeline is a `;`-separated list of operations applied in order. A
//! transform set is one pipeline per line of a text file.

mod filter;
mod geometry;
mod op;
mod plane;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use rand::Rng;

use crate::error::{Error, Result};
use crate::image::Image;

pub use filter::{blur, color_jitter, elastic, gauss_noise, unsharp_mask};
pub use geometry::{crop, dense_crop, mirror, rand_crop, rescale, resize, rotate};
pub use op::{MirrorAxis, ShearAxis, TransformOp};

/// How dense crops are weighted in the final vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CropWeighting {
    /// Every crop counts once.
    #[default]
    Uniform,
    /// Crops touching no image edge count twice.
    InteriorEmphasis,
}

impl CropWeighting {
    pub(crate) const fn weight(self, interior: bool) -> f32 {
        match self {
            Self::InteriorEmphasis if interior => 2.0,
            _ => 1.0,
        }
    }
}

/// One augmented copy of an input image and its vote weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Variant {
    pub image: Image,
    pub weight: f32,
}

impl TransformOp {
    /// Apply this operation to one image.
    ///
    /// Every operation yields exactly one image except dense cropping.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidCrop`] for crops that do not fit and
    /// [`Error::InvalidGeometry`] or [`Error::InvalidParameter`] for
    /// degenerate resampling or warps.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        image: &Image,
        rng: &mut R,
        weighting: CropWeighting,
    ) -> Result<Vec<(Image, f32)>> {
        let spec = self.to_string();
        let single = match *self {
            Self::Crop {
                y,
                x,
                height,
                width,
            } => geometry::crop(image, y, x, height, width, &spec)?,
            Self::DenseCrop {
                height,
                width,
                y_stride,
                x_stride,
            } => {
                return geometry::dense_crop(
                    image, height, width, y_stride, x_stride, weighting, &spec,
                );
            }
            Self::RandCrop { height, width } => {
                geometry::rand_crop(image, height, width, rng, &spec)?
            }
            Self::Resize { height, width } => geometry::resize(image, height, width),
            Self::Rescale { factor } => geometry::rescale(image, factor)?,
            Self::Mirror(axis) => geometry::mirror(image, axis),
            Self::GaussNoise { sigma, seed } => filter::gauss_noise(image, sigma, seed)?,
            Self::ColorJitter { sigma, seed } => filter::color_jitter(image, sigma, seed)?,
            Self::Rotation { degrees } => geometry::rotate(image, degrees)?,
            Self::Blur { sigma } => filter::blur(image, sigma),
            Self::UnsharpMask { sigma, amount } => filter::unsharp_mask(image, sigma, amount),
            Self::Shear { degrees, axis } => {
                geometry::warp(image, &geometry::shear_matrix(degrees, axis))?
            }
            Self::Perspective { ref offsets } => {
                geometry::warp(image, &geometry::perspective_matrix(offsets, &spec)?)?
            }
            Self::Elastic { sigma, alpha, seed } => filter::elastic(image, sigma, alpha, seed),
            Self::Identity => image.clone(),
        };
        Ok(vec![(single, 1.0)])
    }
}

/// An ordered list of operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    ops: Vec<TransformOp>,
}

impl Pipeline {
    /// The pipeline that returns its input unchanged.
    #[must_use]
    pub fn identity() -> Self {
        Self {
            ops: vec![TransformOp::Identity],
        }
    }

    #[must_use]
    pub fn ops(&self) -> &[TransformOp] {
        &self.ops
    }

    /// Whether any operation can fork the image.
    #[must_use]
    pub fn is_multi_output(&self) -> bool {
        self.ops.iter().any(TransformOp::is_multi_output)
    }

    /// Run every operation in order. A multi-output operation forks the
    /// running image and the remaining operations apply to each fork; fork
    /// weights multiply along the way.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by an operation.
    pub fn apply<R: Rng + ?Sized>(
        &self,
        image: &Image,
        rng: &mut R,
        weighting: CropWeighting,
    ) -> Result<Vec<Variant>> {
        let mut variants = vec![Variant {
            image: image.clone(),
            weight: 1.0,
        }];

        for op in &self.ops {
            let mut next = Vec::with_capacity(variants.len());
            for variant in &variants {
                for (image, weight) in op.apply(&variant.image, rng, weighting)? {
                    next.push(Variant {
                        image,
                        weight: variant.weight * weight,
                    });
                }
            }
            variants = next;
        }

        Ok(variants)
    }
}

impl FromStr for Pipeline {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let ops = s
            .split(';')
            .map(str::parse)
            .collect::<Result<Vec<TransformOp>>>()?;
        Ok(Self { ops })
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(";")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}

/// The pipelines applied to every input image.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformSet {
    pipelines: Vec<Pipeline>,
}

impl Default for TransformSet {
    fn default() -> Self {
        Self {
            pipelines: vec![Pipeline::identity()],
        }
    }
}

impl TransformSet {
    /// Parse one pipeline per line. Blank lines and lines starting with `#`
    /// are skipped; a set with no pipelines is the identity set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTransform`] or [`Error::InvalidTransform`] for
    /// the first line that fails to parse.
    pub fn parse(text: &str) -> Result<Self> {
        let pipelines = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::parse)
            .collect::<Result<Vec<Pipeline>>>()?;

        if pipelines.is_empty() {
            return Ok(Self::default());
        }
        Ok(Self { pipelines })
    }

    /// Read and parse a transform file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be read, or a parse error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let set = Self::parse(&text)?;
        tracing::info!("Loaded {} transform(s) from {}", set.len(), path.display());
        Ok(set)
    }

    #[must_use]
    pub fn pipelines(&self) -> &[Pipeline] {
        &self.pipelines
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Whether every image yields exactly one variant per pipeline.
    #[must_use]
    pub fn is_fixed(&self) -> bool {
        !self.pipelines.iter().any(Pipeline::is_multi_output)
    }

    /// Apply every pipeline to `image` and concatenate the variants in
    /// pipeline order.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by any pipeline.
    pub fn apply_all<R: Rng + ?Sized>(
        &self,
        image: &Image,
        rng: &mut R,
        weighting: CropWeighting,
    ) -> Result<Vec<Variant>> {
        let mut variants = Vec::new();
        for pipeline in &self.pipelines {
            variants.extend(pipeline.apply(image, rng, weighting)?);
        }
        Ok(variants)
    }
}

/// Scale weights so they sum to one. All-zero weights are left unchanged.
pub fn normalize_weights(weights: &mut [f32]) {
    let total: f32 = weights.iter().sum();
    if total > 0.0 {
        for w in weights {
            *w /= total;
        }
    }
}
