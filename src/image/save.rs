//! Image saving utilities.

use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb};
use ndarray::{Array2, Array3, ArrayView2, Axis};

use crate::error::{Error, Result};

use super::COLOR_CHANNELS;

/// JPEG quality used when an output path has a JPEG extension.
const JPEG_QUALITY: u8 = 95;

/// Save a single-channel `u8` map (e.g. a binary mask) as an image file.
///
/// # Errors
///
/// Returns an error if the image cannot be saved.
pub fn save_gray<P: AsRef<Path>>(map: &Array2<u8>, path: P) -> Result<()> {
    write_image(&DynamicImage::ImageLuma8(gray_to_image(map.view())), path.as_ref())
}

/// Save an HWC `u8` raster.
///
/// Three-channel rasters are interpreted as BGR and written as RGB; one
/// channel rasters are written as gray.
///
/// # Errors
///
/// Returns an error if the channel count is unsupported or the image cannot
/// be saved.
pub fn save_raster<P: AsRef<Path>>(raster: &Array3<u8>, path: P) -> Result<()> {
    let (height, width, channels) = raster.dim();

    let img = match channels {
        1 => DynamicImage::ImageLuma8(gray_to_image(raster.index_axis(Axis(2), 0))),
        COLOR_CHANNELS => {
            #[allow(clippy::cast_possible_truncation)]
            let img = ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
                let (y, x) = (y as usize, x as usize);
                Rgb([raster[[y, x, 2]], raster[[y, x, 1]], raster[[y, x, 0]]])
            });
            DynamicImage::ImageRgb8(img)
        }
        other => {
            return Err(Error::shape_mismatch(
                "1 or 3 channels",
                format!("{other} channels"),
            ))
        }
    };

    write_image(&img, path.as_ref())
}

#[allow(clippy::cast_possible_truncation)]
fn gray_to_image(map: ArrayView2<'_, u8>) -> GrayImage {
    let (height, width) = map.dim();
    // Safe: dimensions come from images that were decoded with u32 sizes
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        Luma([map[[y as usize, x as usize]]])
    })
}

/// Write an image, choosing the encoder from the file extension.
fn write_image(img: &DynamicImage, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("png")
        .to_lowercase();

    match extension.as_str() {
        "jpg" | "jpeg" => {
            let mut output = std::fs::File::create(path)?;
            let encoder =
                image::codecs::jpeg::JpegEncoder::new_with_quality(&mut output, JPEG_QUALITY);
            img.write_with_encoder(encoder)
                .map_err(|source| Error::ImageSave {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
        _ => {
            img.save(path).map_err(|source| Error::ImageSave {
                path: path.to_path_buf(),
                source,
            })?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{load_binary, load_image, ColorMode};

    #[test]
    fn test_gray_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        let map = Array2::from_shape_fn((3, 4), |(y, x)| if (y + x) % 2 == 0 { 0 } else { 255 });

        save_gray(&map, &path).unwrap();
        let loaded = load_binary(&path).unwrap();

        assert_eq!(loaded, map);
    }

    #[test]
    fn test_bgr_raster_written_as_rgb() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raster.png");
        let mut raster = Array3::<u8>::zeros((2, 2, 3));
        raster[[0, 0, 0]] = 200; // blue

        save_raster(&raster, &path).unwrap();
        let rgb = image::open(&path).unwrap().to_rgb8();
        assert_eq!(rgb.get_pixel(0, 0)[2], 200);

        let reloaded = load_image(&path, ColorMode::Color).unwrap();
        assert_eq!(reloaded[[0, 0, 0]], 200.0);
    }

    #[test]
    fn test_unsupported_channels() {
        let raster = Array3::<u8>::zeros((2, 2, 2));
        let dir = tempfile::tempdir().unwrap();
        let err = save_raster(&raster, dir.path().join("x.png")).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }
}
