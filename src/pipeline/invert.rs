//! Full-page image-to-image inversion with a tiled network whose outputs
//! lie in `[-1, 1]`.

use std::path::Path;

use ndarray::Array3;

use crate::error::{Error, Result};
use crate::image::{self, truncate_u8, ColorMode, Image};
use crate::model::Network;
use crate::tiling::stitch;

use super::tiled::{infer_tiles, TileConfig};

/// Map a network output in `[-1, 1]` to a sample in `[0, 255]`.
#[must_use]
pub fn output_to_sample(value: f32) -> u8 {
    truncate_u8(127.5 * (value + 1.0))
}

/// Renders document images through an image-to-image network.
pub struct Inverter<N> {
    config: TileConfig,
    network: N,
}

impl<N: Network> Inverter<N> {
    /// Create an inverter around a loaded network.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: TileConfig, network: N) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, network })
    }

    /// Run the network over an image in memory and stitch the result.
    ///
    /// The output has as many channels as the network produces.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGeometry`] if the image is smaller than one
    /// tile, [`Error::ShapeMismatch`] if tile outputs disagree in channel
    /// count, or any inference error.
    pub fn invert(&mut self, image: &Image) -> Result<Array3<u8>> {
        let (height, width, _) = image.dim();
        let (locations, outputs) = infer_tiles(&mut self.network, image, &self.config)?;

        let channels = outputs.first().map_or(0, |o| o.dim().2);
        if channels == 0 {
            return Err(Error::shape_mismatch("at least one output channel", "none"));
        }

        let tiles: Vec<Array3<u8>> = outputs.iter().map(|o| o.mapv(output_to_sample)).collect();
        stitch(&locations, &tiles, (height, width, channels))
    }

    /// Invert `input` and write the stitched raster to `output`.
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be loaded, processed, or saved.
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(&mut self, input: P, output: Q) -> Result<()> {
        let input = input.as_ref();
        let output = output.as_ref();
        tracing::info!("Inverting {}", input.display());

        let page = image::load_image(input, ColorMode::Color)?;
        let raster = self.invert(&page)?;
        image::save_raster(&raster, output)?;

        tracing::info!("Saved output to: {}", output.display());
        Ok(())
    }
}
