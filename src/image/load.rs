//! Image loading utilities.

use std::path::Path;

use image::DynamicImage;
use ndarray::{Array2, Array3};

use crate::error::{Error, Result};

use super::{ColorMode, Image, COLOR_CHANNELS};

/// Load an image from disk as an HWC sample array.
///
/// Colour images are converted to BGR channel order; gray images have a
/// single channel. Samples stay in `[0, 255]`.
///
/// # Errors
///
/// Returns an error if the image cannot be loaded or decoded.
pub fn load_image<P: AsRef<Path>>(path: P, mode: ColorMode) -> Result<Image> {
    let path = path.as_ref();

    let img = image::open(path).map_err(|source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(decode_image(&img, mode))
}

/// Load a single-channel image as raw `u8` samples, e.g. a binarization
/// result or a ground-truth mask.
///
/// # Errors
///
/// Returns an error if the image cannot be loaded.
pub fn load_binary<P: AsRef<Path>>(path: P) -> Result<Array2<u8>> {
    let path = path.as_ref();

    let img = image::open(path).map_err(|source| Error::ImageLoad {
        path: path.to_path_buf(),
        source,
    })?;

    let gray = img.to_luma8();
    let (width, height) = (gray.width() as usize, gray.height() as usize);

    Array2::from_shape_vec((height, width), gray.into_raw())
        .map_err(|e| Error::shape_mismatch(format!("{height}x{width} gray image"), e.to_string()))
}

/// Convert a `DynamicImage` to an HWC sample array.
#[must_use]
pub fn decode_image(img: &DynamicImage, mode: ColorMode) -> Image {
    match mode {
        ColorMode::Gray => {
            let gray = img.to_luma8();
            let (width, height) = (gray.width() as usize, gray.height() as usize);
            Array3::from_shape_fn((height, width, 1), |(y, x, _)| {
                // Safe: x and y are bounded by the source dimensions which fit in u32
                #[allow(clippy::cast_possible_truncation)]
                let pixel = gray.get_pixel(x as u32, y as u32);
                f32::from(pixel[0])
            })
        }
        ColorMode::Color => {
            let rgb = img.to_rgb8();
            let (width, height) = (rgb.width() as usize, rgb.height() as usize);
            Array3::from_shape_fn((height, width, COLOR_CHANNELS), |(y, x, c)| {
                #[allow(clippy::cast_possible_truncation)]
                let pixel = rgb.get_pixel(x as u32, y as u32);
                // BGR: channel 0 is blue
                f32::from(pixel[COLOR_CHANNELS - 1 - c])
            })
        }
    }
}
