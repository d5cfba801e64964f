//! Full-page binarization with a tiled per-pixel network.

use std::path::{Path, PathBuf};

use ndarray::{Array2, Array3, Axis};

use crate::error::{Error, Result};
use crate::image::{self, saturate_u8, ColorMode, Image, MAX_SAMPLE};
use crate::model::Network;
use crate::tiling::stitch;

use super::tiled::{infer_tiles, TileConfig};

/// Configuration for the binarizer.
#[derive(Debug, Clone)]
pub struct BinarizeConfig {
    pub tiles: TileConfig,

    /// Foreground probability at or above which a pixel is foreground.
    pub threshold: f32,
}

impl Default for BinarizeConfig {
    fn default() -> Self {
        Self {
            tiles: TileConfig::default(),
            threshold: 0.5,
        }
    }
}

impl BinarizeConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        self.tiles.validate()?;

        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::invalid_parameter(
                "threshold",
                "must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

/// Stitched per-pixel results for one page. Foreground is 1 in `binary`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryMaps {
    pub binary: Array2<u8>,
    pub raw: Array2<f32>,
}

impl BinaryMaps {
    /// Black-on-white rendering of the binary map.
    #[must_use]
    pub fn prediction_image(&self) -> Array2<u8> {
        self.binary.mapv(|b| if b == 0 { 255 } else { 0 })
    }

    /// Grayscale rendering of the foreground probability, dark = likely
    /// foreground.
    #[must_use]
    pub fn raw_image(&self) -> Array2<u8> {
        self.raw.mapv(|p| saturate_u8(MAX_SAMPLE * (1.0 - p)))
    }
}

/// Binarizes document images with a foreground-probability network.
pub struct Binarizer<N> {
    config: BinarizeConfig,
    network: N,
}

impl<N: Network> Binarizer<N> {
    /// Create a binarizer around a loaded network.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: BinarizeConfig, network: N) -> Result<Self> {
        config.validate()?;
        tracing::debug!("Binarizer config: {config:?}");
        Ok(Self { config, network })
    }

    /// Binarize an image already in memory (BGR, samples in `[0, 255]`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGeometry`] if the image is smaller than one
    /// tile, [`Error::ShapeMismatch`] if the network does not return one
    /// channel per tile, or any inference error.
    pub fn binarize(&mut self, image: &Image) -> Result<BinaryMaps> {
        let (height, width, _) = image.dim();
        let (locations, outputs) = infer_tiles(&mut self.network, image, &self.config.tiles)?;

        if let Some(bad) = outputs.iter().find(|o| o.dim().2 != 1) {
            return Err(Error::shape_mismatch(
                "one probability channel",
                format!("{} channels", bad.dim().2),
            ));
        }

        let threshold = self.config.threshold;
        let binary_tiles: Vec<Array3<u8>> = outputs
            .iter()
            .map(|o| o.mapv(|p| u8::from(p >= threshold)))
            .collect();

        let shape = (height, width, 1);
        let binary = stitch(&locations, &binary_tiles, shape)?.index_axis_move(Axis(2), 0);
        let raw = stitch(&locations, &outputs, shape)?.index_axis_move(Axis(2), 0);

        Ok(BinaryMaps { binary, raw })
    }

    /// Binarize `input` and write `<prefix>_pred.png` and `<prefix>_raw.png`.
    ///
    /// Returns the two written paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be loaded, processed, or saved.
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &mut self,
        input: P,
        out_prefix: Q,
    ) -> Result<(PathBuf, PathBuf)> {
        let input = input.as_ref();
        tracing::info!("Binarizing {}", input.display());

        let page = image::load_image(input, ColorMode::Color)?;
        let maps = self.binarize(&page)?;

        let pred_path = suffixed(out_prefix.as_ref(), "_pred.png");
        let raw_path = suffixed(out_prefix.as_ref(), "_raw.png");
        image::save_gray(&maps.prediction_image(), &pred_path)?;
        image::save_gray(&maps.raw_image(), &raw_path)?;

        tracing::info!("Wrote {} and {}", pred_path.display(), raw_path.display());
        Ok((pred_path, raw_path))
    }
}

fn suffixed(prefix: &Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}
