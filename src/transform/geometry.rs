//! Geometric operations: crops, resampling, reflection and warps.

use image::imageops::{self, FilterType};
use image::Luma;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::{DMatrix, DVector, Matrix3, RowDVector};
use ndarray::s;
use rand::Rng;

use crate::error::{Error, Result};
use crate::image::{Image, MAX_SAMPLE};
use crate::tiling::window_offsets;

use super::op::{MirrorAxis, ShearAxis};
use super::plane::{map_channels, to_array, to_bordered_plane, to_plane, Plane};
use super::CropWeighting;

/// Forward map from source `(x, y, 1)` to destination, in homogeneous
/// coordinates. Affine maps keep `[0, 0, 1]` as the last row.
pub type Homography = Matrix3<f64>;

fn invalid_crop(image: &Image, spec: &str, reason: &str) -> Error {
    let (height, width, _) = image.dim();
    Error::InvalidCrop {
        spec: spec.to_string(),
        height,
        width,
        reason: reason.to_string(),
    }
}

/// Fixed rectangular crop. A negative origin indexes from the far edge as
/// long as the rectangle does not wrap past zero.
///
/// # Errors
///
/// Returns [`Error::InvalidCrop`] for empty dimensions, an origin outside
/// the image, a wrapping negative origin, a rectangle larger than the image, or a
/// rectangle that runs off the image.
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_possible_truncation)]
pub fn crop(image: &Image, y: i64, x: i64, height: i64, width: i64, spec: &str) -> Result<Image> {
    let (img_h, img_w, _) = image.dim();
    let (img_h, img_w) = (img_h as i64, img_w as i64);

    if height <= 0 || width <= 0 {
        return Err(invalid_crop(image, spec, "crop dims must be positive"));
    }
    if y >= img_h || x >= img_w {
        return Err(invalid_crop(image, spec, "(y, x) outside image bounds"));
    }
    if (y < 0 && y + height >= 0) || (x < 0 && x + width >= 0) {
        return Err(invalid_crop(image, spec, "negative indexing wraps around"));
    }
    if height > img_h || width > img_w {
        return Err(invalid_crop(image, spec, "crop dims larger than image"));
    }
    if y + height > img_h || x + width > img_w {
        return Err(invalid_crop(image, spec, "crop goes off edge of image"));
    }

    let y0 = if y < 0 { y + img_h } else { y };
    let x0 = if x < 0 { x + img_w } else { x };
    if y0 < 0 || x0 < 0 {
        return Err(invalid_crop(image, spec, "(y, x) outside image bounds"));
    }

    // Safe: every bound was checked to lie in [0, extent]
    let (y0, x0) = (y0 as usize, x0 as usize);
    let (h, w) = (height as usize, width as usize);
    Ok(image.slice(s![y0..y0 + h, x0..x0 + w, ..]).to_owned())
}

/// Every `height x width` window on a stride grid, with the last row and
/// column clamped to the image edge. Each crop carries a weight from
/// `weighting`.
///
/// # Errors
///
/// Returns [`Error::InvalidCrop`] if the window is larger than the image.
pub fn dense_crop(
    image: &Image,
    height: usize,
    width: usize,
    y_stride: usize,
    x_stride: usize,
    weighting: CropWeighting,
    spec: &str,
) -> Result<Vec<(Image, f32)>> {
    let (img_h, img_w, _) = image.dim();
    if height > img_h || width > img_w {
        return Err(invalid_crop(image, spec, "crop dims larger than image"));
    }

    let rows = window_offsets(img_h, height, y_stride);
    let cols = window_offsets(img_w, width, x_stride);

    let mut crops = Vec::with_capacity(rows.len() * cols.len());
    for &y in &rows {
        for &x in &cols {
            let interior = y > 0 && x > 0 && y + height < img_h && x + width < img_w;
            let tile = image.slice(s![y..y + height, x..x + width, ..]).to_owned();
            crops.push((tile, weighting.weight(interior)));
        }
    }
    Ok(crops)
}

/// Crop at a uniformly random in-bounds offset drawn from `rng`.
///
/// # Errors
///
/// Returns [`Error::InvalidCrop`] if the window is larger than the image.
pub fn rand_crop<R: Rng + ?Sized>(
    image: &Image,
    height: usize,
    width: usize,
    rng: &mut R,
    spec: &str,
) -> Result<Image> {
    let (img_h, img_w, _) = image.dim();
    if height > img_h || width > img_w {
        return Err(invalid_crop(image, spec, "crop dims larger than image"));
    }

    let y = rng.random_range(0..=img_h - height);
    let x = rng.random_range(0..=img_w - width);
    Ok(image.slice(s![y..y + height, x..x + width, ..]).to_owned())
}

/// Bilinear resampling to `height x width`, pixel-centre aligned.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn resize(image: &Image, height: usize, width: usize) -> Image {
    // `image` clamps float samples to [0, 1] while filtering.
    map_channels(image, (height, width), |channel| {
        let unit = to_plane(channel.mapv(|v| v / MAX_SAMPLE).view());
        let scaled = imageops::resize(&unit, width as u32, height as u32, FilterType::Triangle);
        to_array(&scaled).mapv(|v| v * MAX_SAMPLE)
    })
}

/// Resample by `factor`, truncating the new size to whole pixels.
///
/// # Errors
///
/// Returns [`Error::InvalidGeometry`] if the scaled image would be empty.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn rescale(image: &Image, factor: f64) -> Result<Image> {
    let (height, width, _) = image.dim();
    let new_h = (factor * height as f64) as usize;
    let new_w = (factor * width as f64) as usize;
    if new_h == 0 || new_w == 0 {
        return Err(Error::InvalidGeometry {
            height,
            width,
            reason: format!("scale {factor} gives an empty image"),
        });
    }
    Ok(resize(image, new_h, new_w))
}

/// Reflect rows, columns, or both.
#[must_use]
pub fn mirror(image: &Image, axis: MirrorAxis) -> Image {
    match axis {
        MirrorAxis::Horizontal => image.slice(s![..;-1, .., ..]).to_owned(),
        MirrorAxis::Vertical => image.slice(s![.., ..;-1, ..]).to_owned(),
        MirrorAxis::Both => image.slice(s![..;-1, ..;-1, ..]).to_owned(),
    }
}

fn projection(forward: &Homography) -> Result<Projection> {
    let singular = || Error::invalid_parameter("warp", "matrix is singular");
    forward.try_inverse().ok_or_else(singular)?;

    // Sources carry a one pixel zero frame, so shift them back into place.
    let unframe = Matrix3::new(1.0, 0.0, -1.0, 0.0, 1.0, -1.0, 0.0, 0.0, 1.0);
    let m = forward * unframe;
    #[allow(clippy::cast_possible_truncation)]
    let rows: [f32; 9] = std::array::from_fn(|i| m[(i / 3, i % 3)] as f32);
    Projection::from_matrix(rows).ok_or_else(singular)
}

/// Apply a forward projective map with bilinear interpolation, keeping the
/// frame size. Samples that fall outside the image read as zero, so edge
/// pixels fade into the zero fill.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if the map is singular.
#[allow(clippy::cast_possible_truncation)]
pub fn warp(image: &Image, forward: &Homography) -> Result<Image> {
    let projection = projection(forward)?;
    let (height, width, _) = image.dim();

    Ok(map_channels(image, (height, width), |channel| {
        let source = to_bordered_plane(channel, 1);
        let mut out = Plane::new(width as u32, height as u32);
        warp_into(&source, &projection, Interpolation::Bilinear, Luma([0.0]), &mut out);
        to_array(&out)
    }))
}

/// Rotation by `degrees` (counter-clockwise on screen) about `(cx, cy)`.
#[must_use]
pub fn rotation_matrix(cx: f64, cy: f64, degrees: f64) -> Homography {
    let (sin, cos) = degrees.to_radians().sin_cos();
    Matrix3::new(
        cos,
        sin,
        (1.0 - cos).mul_add(cx, -(sin * cy)),
        -sin,
        cos,
        sin.mul_add(cx, (1.0 - cos) * cy),
        0.0,
        0.0,
        1.0,
    )
}

/// Rotate about the image centre, keeping the original frame.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if the map cannot be inverted.
#[allow(clippy::cast_precision_loss)]
pub fn rotate(image: &Image, degrees: f64) -> Result<Image> {
    let (height, width, _) = image.dim();
    warp(image, &rotation_matrix(width as f64 / 2.0, height as f64 / 2.0, degrees))
}

/// Shear by `tan(degrees)` along one axis.
#[must_use]
pub fn shear_matrix(degrees: f64, axis: ShearAxis) -> Homography {
    let t = degrees.to_radians().tan();
    match axis {
        ShearAxis::Horizontal => Matrix3::new(1.0, t, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
        ShearAxis::Vertical => Matrix3::new(1.0, 0.0, 0.0, t, 1.0, 0.0, 0.0, 0.0, 1.0),
    }
}

/// Homography taking the unit square's corners to the perturbed corners.
///
/// Corners are visited as `(y, x)` = (0,0), (0,1), (1,1), (1,0) and each
/// receives its `(dy, dx)` offset.
///
/// # Errors
///
/// Returns [`Error::InvalidTransform`] if the moved corners admit no
/// homography.
pub fn perspective_matrix(offsets: &[(f64, f64); 4], spec: &str) -> Result<Homography> {
    let corners = [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)];

    let mut a = DMatrix::<f64>::zeros(8, 8);
    let mut b = DVector::<f64>::zeros(8);
    for (i, (&(y, x), &(dy, dx))) in corners.iter().zip(offsets).enumerate() {
        let (u, v) = (x + dx, y + dy);
        a.set_row(
            2 * i,
            &RowDVector::from_row_slice(&[x, y, 1.0, 0.0, 0.0, 0.0, -x * u, -y * u]),
        );
        a.set_row(
            2 * i + 1,
            &RowDVector::from_row_slice(&[0.0, 0.0, 0.0, x, y, 1.0, -x * v, -y * v]),
        );
        b[2 * i] = u;
        b[2 * i + 1] = v;
    }

    let h = a.lu().solve(&b).ok_or_else(|| Error::InvalidTransform {
        spec: spec.to_string(),
        reason: "corners do not define a homography".to_string(),
    })?;
    Ok(Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0))
}
