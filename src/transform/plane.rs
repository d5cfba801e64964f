//! Single-channel planes for the `image` and `imageproc` routines.

use image::{ImageBuffer, Luma};
use imageproc::filter::separable_filter_equal;
use ndarray::{s, Array2, Array3, ArrayView2, Axis};

use crate::image::Image;

/// One channel of an [`Image`] as an `image` buffer.
pub type Plane = ImageBuffer<Luma<f32>, Vec<f32>>;

#[allow(clippy::cast_possible_truncation)]
pub fn to_plane(channel: ArrayView2<'_, f32>) -> Plane {
    let (height, width) = channel.dim();
    ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
        Luma([channel[[y as usize, x as usize]]])
    })
}

/// Copy of `channel` inside a frame of `border` zero pixels.
#[allow(clippy::cast_possible_truncation)]
pub fn to_bordered_plane(channel: ArrayView2<'_, f32>, border: usize) -> Plane {
    let (height, width) = channel.dim();
    let mut plane = Plane::new((width + 2 * border) as u32, (height + 2 * border) as u32);
    for ((y, x), &v) in channel.indexed_iter() {
        plane.put_pixel((x + border) as u32, (y + border) as u32, Luma([v]));
    }
    plane
}

#[allow(clippy::cast_possible_truncation)]
pub fn to_array(plane: &Plane) -> Array2<f32> {
    let (width, height) = plane.dimensions();
    Array2::from_shape_fn((height as usize, width as usize), |(y, x)| {
        plane.get_pixel(x as u32, y as u32).0[0]
    })
}

/// Run `f` over every channel; each result must be `height x width`.
pub fn map_channels<F>(image: &Image, (height, width): (usize, usize), mut f: F) -> Image
where
    F: FnMut(ArrayView2<'_, f32>) -> Array2<f32>,
{
    let channels = image.dim().2;
    let mut output = Array3::zeros((height, width, channels));
    for (src, mut dst) in image.axis_iter(Axis(2)).zip(output.axis_iter_mut(Axis(2))) {
        dst.assign(&f(src));
    }
    output
}

/// Filter with the symmetric `kernel` along both axes, extending `field`
/// past its edges through `reflect(index, len)`.
#[allow(clippy::cast_possible_wrap)]
pub fn filter_reflected(
    field: ArrayView2<'_, f32>,
    kernel: &[f32],
    reflect: fn(isize, usize) -> usize,
) -> Array2<f32> {
    let radius = kernel.len() / 2;
    let (height, width) = field.dim();
    let padded = Array2::from_shape_fn((height + 2 * radius, width + 2 * radius), |(y, x)| {
        let sy = reflect(y as isize - radius as isize, height);
        let sx = reflect(x as isize - radius as isize, width);
        field[[sy, sx]]
    });

    let filtered = separable_filter_equal(&to_plane(padded.view()), kernel);
    to_array(&filtered)
        .slice(s![radius..radius + height, radius..radius + width])
        .to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plane_round_trip_keeps_layout() {
        let channel = Array2::from_shape_fn((3, 5), |(y, x)| (y * 10 + x) as f32);
        let plane = to_plane(channel.view());
        assert_eq!(plane.dimensions(), (5, 3));
        assert_eq!(plane.get_pixel(4, 1).0[0], 14.0);
        assert_eq!(to_array(&plane), channel);
    }

    #[test]
    fn test_bordered_plane() {
        let channel = Array2::from_elem((2, 3), 7.0);
        let plane = to_array(&to_bordered_plane(channel.view(), 1));
        assert_eq!(plane.dim(), (4, 5));
        assert_eq!(plane.sum(), 42.0);
        assert_eq!(plane[[0, 0]], 0.0);
        assert_eq!(plane[[1, 1]], 7.0);
    }

    #[test]
    fn test_map_channels_changes_frame() {
        let image = Array3::from_shape_fn((2, 2, 2), |(_, _, c)| c as f32);
        let out = map_channels(&image, (1, 3), |ch| Array2::from_elem((1, 3), ch[[0, 0]] + 1.0));
        assert_eq!(out.dim(), (1, 3, 2));
        assert_eq!(out[[0, 2, 1]], 2.0);
    }
}
