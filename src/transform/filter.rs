//! Photometric operations and smooth deformations.

use ndarray::{Array2, Array3, Axis, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::error::{Error, Result};
use crate::image::{Image, MAX_SAMPLE};

use super::plane::{filter_reflected, map_channels};

/// Map an out-of-range index back into `0..len`, mirroring about the edge
/// pixels without repeating them (`gfedcb|abcdefgh|gfedcba`).
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn reflect_101(i: isize, len: usize) -> usize {
    if len == 1 {
        return 0;
    }
    let period = 2 * (len as isize - 1);
    let m = i.rem_euclid(period);
    let m = if m >= len as isize { period - m } else { m };
    m as usize
}

/// Map an out-of-range index back into `0..len`, mirroring about the outer
/// pixel boundary (`dcba|abcd|dcba`).
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss)]
fn reflect_half(i: isize, len: usize) -> usize {
    let period = 2 * len as isize;
    let m = i.rem_euclid(period);
    let m = if m >= len as isize { period - 1 - m } else { m };
    m as usize
}

/// Blur kernel size for `sigma`: `floor(4 * sigma + 0.999)`, bumped to odd.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn blur_kernel_size(sigma: f64) -> usize {
    let size = 4.0f64.mul_add(sigma, 0.999) as usize;
    if size % 2 == 0 {
        size + 1
    } else {
        size
    }
}

/// Normalised 1-D Gaussian of `size` taps centred on the middle tap.
#[must_use]
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
pub fn gaussian_kernel(size: usize, sigma: f64) -> Vec<f32> {
    if size <= 1 {
        return vec![1.0];
    }
    let centre = (size as f64 - 1.0) / 2.0;
    let weights: Vec<f64> = (0..size)
        .map(|i| {
            let d = i as f64 - centre;
            (-(d * d) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.into_iter().map(|w| (w / sum) as f32).collect()
}

/// Separable Gaussian blur with a `blur_kernel_size(sigma)` square kernel
/// and mirrored borders.
#[must_use]
pub fn blur(image: &Image, sigma: f64) -> Image {
    let kernel = gaussian_kernel(blur_kernel_size(sigma), sigma);
    let (height, width, _) = image.dim();
    map_channels(image, (height, width), |channel| {
        filter_reflected(channel, &kernel, reflect_101)
    })
}

/// `(1 + amount) * image - amount * blur(image)`, clipped to the sample range.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn unsharp_mask(image: &Image, sigma: f64, amount: f64) -> Image {
    let blurred = blur(image, sigma);
    let amount = amount as f32;
    let mut output = image.clone();
    Zip::from(&mut output).and(&blurred).for_each(|o, &b| {
        *o = (1.0 + amount).mul_add(*o, -amount * b).clamp(0.0, MAX_SAMPLE);
    });
    output
}

fn normal(sigma: f64) -> Result<Normal<f64>> {
    Normal::new(0.0, sigma).map_err(|e| Error::invalid_parameter("sigma", e.to_string()))
}

/// Add one seeded Gaussian noise field, shared across channels, then clip and
/// truncate to whole sample values.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `sigma` is not a valid deviation.
#[allow(clippy::cast_possible_truncation)]
pub fn gauss_noise(image: &Image, sigma: f64, seed: u64) -> Result<Image> {
    let dist = normal(sigma)?;
    let mut rng = StdRng::seed_from_u64(seed);
    let (height, width, _) = image.dim();
    let noise = Array2::from_shape_simple_fn((height, width), || dist.sample(&mut rng));

    let mut output = image.clone();
    for mut channel in output.axis_iter_mut(Axis(2)) {
        Zip::from(&mut channel).and(&noise).for_each(|v, &n| {
            *v = (f64::from(*v) + n).clamp(0.0, f64::from(MAX_SAMPLE)).trunc() as f32;
        });
    }
    Ok(output)
}

/// Shift each channel by its own seeded, truncated Gaussian offset.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if `sigma` is not a valid deviation.
#[allow(clippy::cast_possible_truncation)]
pub fn color_jitter(image: &Image, sigma: f64, seed: u64) -> Result<Image> {
    let dist = normal(sigma)?;
    let mut rng = StdRng::seed_from_u64(seed);

    let mut output = image.mapv(f32::trunc);
    for mut channel in output.axis_iter_mut(Axis(2)) {
        let shift = dist.sample(&mut rng).trunc() as f32;
        channel.mapv_inplace(|v| (v + shift).clamp(0.0, MAX_SAMPLE));
    }
    Ok(output)
}

/// Gaussian smoothing of a 2-D field along both axes, with kernel radius
/// `round(2 * sigma)` and half-sample mirrored borders. A zero `sigma`
/// leaves the field unchanged.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn smooth_field(field: &Array2<f32>, sigma: f64) -> Array2<f32> {
    if sigma <= 1e-15 {
        return field.clone();
    }
    let radius = 2.0f64.mul_add(sigma, 0.5) as usize;
    let kernel = gaussian_kernel(2 * radius + 1, sigma);
    filter_reflected(field.view(), &kernel, reflect_half)
}

/// Elastic deformation: random displacement fields in `[-alpha, alpha]`,
/// smoothed by `sigma`, drive a bilinear backward mapping.
///
/// The x field is drawn before the y field, each row-major from one
/// generator seeded with `seed`. Samples past the edge mirror back into the
/// image about the outer pixel boundary.
#[must_use]
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap
)]
pub fn elastic(image: &Image, sigma: f64, alpha: f64, seed: u64) -> Image {
    let (height, width, channels) = image.dim();
    let mut rng = StdRng::seed_from_u64(seed);
    let mut field = || {
        Array2::from_shape_simple_fn((height, width), || {
            (2.0 * alpha).mul_add(rng.random::<f64>(), -alpha) as f32
        })
    };
    let dx = field();
    let dy = field();
    let dx = smooth_field(&dx, sigma);
    let dy = smooth_field(&dy, sigma);

    Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
        let sy = (y as f32 + dy[[y, x]]).clamp(0.0, height as f32);
        let sx = (x as f32 + dx[[y, x]]).clamp(0.0, width as f32);
        let (y0, x0) = (sy.floor(), sx.floor());
        let (fy, fx) = (sy - y0, sx - x0);
        let (y0, x0) = (y0 as isize, x0 as isize);

        let at = |yy: isize, xx: isize| {
            image[[reflect_half(yy, height), reflect_half(xx, width), c]]
        };
        let top = at(y0, x0) * (1.0 - fx) + at(y0, x0 + 1) * fx;
        let bottom = at(y0 + 1, x0) * (1.0 - fx) + at(y0 + 1, x0 + 1) * fx;
        top * (1.0 - fy) + bottom * fy
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(height: usize, width: usize, channels: usize) -> Image {
        Array3::from_shape_fn((height, width, channels), |(y, x, c)| {
            ((y * 13 + x * 7 + c * 29) % 256) as f32
        })
    }

    #[test]
    fn test_reflect_indices() {
        let r101: Vec<usize> = (-3..7).map(|i| reflect_101(i, 4)).collect();
        assert_eq!(r101, vec![3, 2, 1, 0, 1, 2, 3, 2, 1, 0]);

        let half: Vec<usize> = (-3..7).map(|i| reflect_half(i, 4)).collect();
        assert_eq!(half, vec![2, 1, 0, 0, 1, 2, 3, 3, 2, 1]);

        assert_eq!(reflect_101(-5, 1), 0);
    }

    #[test]
    fn test_kernel_size() {
        assert_eq!(blur_kernel_size(1.0), 5);
        assert_eq!(blur_kernel_size(1.5), 7);
        assert_eq!(blur_kernel_size(2.0), 9);
        assert_eq!(blur_kernel_size(0.1), 1);
    }

    #[test]
    fn test_gaussian_kernel_normalised_and_symmetric() {
        let k = gaussian_kernel(7, 1.5);
        assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
        for i in 0..3 {
            assert!((k[i] - k[6 - i]).abs() < 1e-7);
        }
        assert!(k[3] > k[2]);
        assert_eq!(gaussian_kernel(blur_kernel_size(0.0), 0.0), vec![1.0]);
    }

    #[test]
    fn test_blur_preserves_constant() {
        let flat = Array3::from_elem((6, 9, 3), 77.0);
        let out = blur(&flat, 2.0);
        assert!(out.iter().all(|&v| (v - 77.0).abs() < 1e-3));
    }

    #[test]
    fn test_blur_mirrors_without_repeating_edge() {
        // One row: the vertical pass is the identity, and the left edge sees
        // its right neighbour on both sides.
        let row = Array3::from_shape_fn((1, 5, 1), |(_, x, _)| 10.0 * x as f32);
        let k = gaussian_kernel(3, 0.5);
        let out = blur(&row, 0.5);

        assert!((out[[0, 0, 0]] - 2.0 * k[0] * 10.0).abs() < 1e-3);
        assert!((out[[0, 2, 0]] - 20.0).abs() < 1e-3);
        assert!((out[[0, 4, 0]] - (2.0 * k[0] * 30.0 + k[1] * 40.0)).abs() < 1e-3);
    }

    #[test]
    fn test_blur_reduces_variation() {
        let image = ramp(12, 12, 1);
        let out = blur(&image, 1.0);
        let spread = |im: &Image| {
            let max = im.iter().copied().fold(f32::MIN, f32::max);
            let min = im.iter().copied().fold(f32::MAX, f32::min);
            max - min
        };
        assert!(spread(&out) < spread(&image));
    }

    #[test]
    fn test_unsharp_with_zero_amount_is_identity() {
        let image = ramp(5, 5, 3);
        assert_eq!(unsharp_mask(&image, 1.0, 0.0), image);
    }

    #[test]
    fn test_unsharp_stays_in_range() {
        let out = unsharp_mask(&ramp(10, 10, 3), 1.0, 3.0);
        assert!(out.iter().all(|&v| (0.0..=255.0).contains(&v)));
    }

    #[test]
    fn test_gauss_noise_is_deterministic() {
        let image = ramp(8, 8, 3);
        let a = gauss_noise(&image, 10.0, 42).unwrap();
        let b = gauss_noise(&image, 10.0, 42).unwrap();
        let c = gauss_noise(&image, 10.0, 43).unwrap();

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|&v| v.fract() == 0.0 && (0.0..=255.0).contains(&v)));
    }

    #[test]
    fn test_gauss_noise_shared_across_channels() {
        let flat = Array3::from_elem((4, 4, 3), 128.0);
        let out = gauss_noise(&flat, 5.0, 1).unwrap();
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(out[[y, x, 0]], out[[y, x, 1]]);
                assert_eq!(out[[y, x, 1]], out[[y, x, 2]]);
            }
        }
    }

    #[test]
    fn test_color_jitter_shifts_whole_channels() {
        let flat = Array3::from_elem((3, 3, 3), 100.0);
        let out = color_jitter(&flat, 20.0, 7).unwrap();
        for c in 0..3 {
            let channel = out.index_axis(Axis(2), c);
            let first = channel[[0, 0]];
            assert!(channel.iter().all(|&v| v == first));
        }
        assert_eq!(out, color_jitter(&flat, 20.0, 7).unwrap());
    }

    #[test]
    fn test_zero_sigma_noise_is_truncation() {
        let image = Array3::from_elem((2, 2, 1), 10.7);
        let out = gauss_noise(&image, 0.0, 0).unwrap();
        assert!(out.iter().all(|&v| v == 10.0));
    }

    #[test]
    fn test_smooth_field_zero_sigma_is_identity() {
        let field = Array2::from_shape_fn((4, 5), |(y, x)| (y * 5 + x) as f32);
        assert_eq!(smooth_field(&field, 0.0), field);
    }

    #[test]
    fn test_smooth_field_preserves_constant() {
        let field = Array2::from_elem((6, 6), 3.5);
        let out = smooth_field(&field, 1.5);
        assert!(out.iter().all(|&v| (v - 3.5).abs() < 1e-5));
    }

    #[test]
    fn test_smooth_field_mirrors_edge_pixel() {
        // Radius 1: the first sample is its own mirror image.
        let field = Array2::from_shape_fn((1, 4), |(_, x)| x as f32);
        let k = gaussian_kernel(3, 0.5);
        let out = smooth_field(&field, 0.5);

        assert!((out[[0, 0]] - k[2]).abs() < 1e-5);
        assert!((out[[0, 3]] - (k[0] * 2.0 + (k[1] + k[2]) * 3.0)).abs() < 1e-5);
    }

    #[test]
    fn test_elastic_with_zero_alpha_is_identity() {
        let image = ramp(7, 6, 3);
        let out = elastic(&image, 2.0, 0.0, 5);
        assert!(out.iter().zip(&image).all(|(a, b)| (a - b).abs() < 1e-4));
    }

    #[test]
    fn test_elastic_is_deterministic() {
        let image = ramp(10, 10, 1);
        let a = elastic(&image, 1.0, 3.0, 11);
        assert_eq!(a, elastic(&image, 1.0, 3.0, 11));
        assert_ne!(a, elastic(&image, 1.0, 3.0, 12));
        assert_eq!(a.dim(), image.dim());
    }
}
