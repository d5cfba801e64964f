//! Shared settings and steps for tools that run a network tile by tile.

use ndarray::Array3;

use crate::error::{Error, Result};
use crate::image::Image;
use crate::model::Network;
use crate::preprocess::ScaleShift;
use crate::tiling::{partition, TileGeometry, TileLocation, DEFAULT_PADDING, DEFAULT_TILE_SIZE};

use super::batch::{infer, split_nchw};

/// Configuration for tiled full-page inference.
#[derive(Debug, Clone)]
pub struct TileConfig {
    /// Tile edge length in pixels.
    pub tile_size: usize,

    /// Overlap discarded on each side of interior tiles.
    pub padding: usize,

    /// Tiles per forward pass.
    pub batch_size: usize,

    /// Value subtracted from every sample before scaling.
    pub mean: f32,

    /// Factor applied after the mean shift.
    pub scale: f32,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            padding: DEFAULT_PADDING,
            batch_size: 1,
            mean: 127.0,
            scale: 0.0039,
        }
    }
}

impl TileConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(Error::invalid_parameter("tile_size", "must be greater than 0"));
        }

        if self.tile_size <= 2 * self.padding {
            return Err(Error::invalid_parameter(
                "padding",
                format!("must be less than half the tile size {}", self.tile_size),
            ));
        }

        if self.batch_size == 0 {
            return Err(Error::invalid_parameter("batch_size", "must be greater than 0"));
        }

        if !self.scale.is_finite() || !self.mean.is_finite() {
            return Err(Error::invalid_parameter("scale", "mean and scale must be finite"));
        }

        Ok(())
    }

    #[must_use]
    pub const fn geometry(&self) -> TileGeometry {
        TileGeometry::new(self.tile_size, self.padding)
    }

    #[must_use]
    pub fn scale_shift(&self) -> ScaleShift {
        ScaleShift::new(self.mean, self.scale)
    }
}

/// Normalise `image`, cut it into tiles, and run every tile through
/// `network`. Returns the tile placements and one HWC output per tile.
///
/// # Errors
///
/// Returns [`Error::InvalidGeometry`] if the tiles do not fit the image,
/// or any inference error.
pub(crate) fn infer_tiles<N: Network + ?Sized>(
    network: &mut N,
    image: &Image,
    config: &TileConfig,
) -> Result<(Vec<TileLocation>, Vec<Array3<f32>>)> {
    let shifted = config.scale_shift().apply(image)?;
    let (locations, tiles) = partition(&shifted, config.geometry())?;

    tracing::info!("Running {} tile(s)", tiles.len());
    let outputs = split_nchw(infer(network, &tiles, config.batch_size)?)?;

    Ok((locations, outputs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TileConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.geometry(), TileGeometry::new(512, 6));
        assert_eq!(config.geometry().stride(), 500);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        for config in [
            TileConfig {
                tile_size: 0,
                ..TileConfig::default()
            },
            TileConfig {
                padding: 256,
                ..TileConfig::default()
            },
            TileConfig {
                batch_size: 0,
                ..TileConfig::default()
            },
            TileConfig {
                scale: f32::NAN,
                ..TileConfig::default()
            },
        ] {
            assert!(matches!(
                config.validate(),
                Err(Error::InvalidParameter { .. })
            ));
        }
    }
}
