//! Reassembly of per-tile outputs into a full-size map.

use ndarray::{s, Array3};
use num_traits::Zero;

use crate::error::{Error, Result};

use super::partition::{EdgeKind, TileLocation};

/// Region of a tile to keep along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AxisSpan {
    /// Start inside the tile.
    cut: usize,
    /// Start inside the output map.
    paste: usize,
    len: usize,
}

impl AxisSpan {
    const fn new(
        edge: EdgeKind,
        outer_start: usize,
        inner_start: usize,
        tile: usize,
        padding: usize,
        extent: usize,
    ) -> Self {
        if edge.is_leading() {
            // A tile spanning the whole axis keeps everything.
            let len = if outer_start + tile == extent {
                tile
            } else {
                tile - padding
            };
            Self {
                cut: 0,
                paste: 0,
                len,
            }
        } else if edge.is_trailing() {
            Self {
                cut: padding,
                paste: inner_start,
                len: tile - padding,
            }
        } else {
            Self {
                cut: padding,
                paste: inner_start,
                len: tile - 2 * padding,
            }
        }
    }
}

/// Paste the interior of every tile output into a zeroed map of `shape`
/// (height, width, channels).
///
/// Tile borders are discarded except where they lie on a true image edge,
/// which removes seams caused by convolution border effects.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the number of outputs differs from the
/// number of locations, or an output does not match its tile's size and the
/// map's channel count.
pub fn stitch<A>(
    locations: &[TileLocation],
    tile_outputs: &[Array3<A>],
    shape: (usize, usize, usize),
) -> Result<Array3<A>>
where
    A: Clone + Zero,
{
    if locations.len() != tile_outputs.len() {
        return Err(Error::shape_mismatch(
            format!("{} tile outputs", locations.len()),
            format!("{} tile outputs", tile_outputs.len()),
        ));
    }

    let (height, width, channels) = shape;
    let mut output = Array3::<A>::zeros(shape);

    for (loc, tile) in locations.iter().zip(tile_outputs) {
        let expected = (loc.outer.height(), loc.outer.width(), channels);
        if tile.dim() != expected || loc.outer.y1 > height || loc.outer.x1 > width {
            return Err(Error::shape_mismatch(
                format!("{expected:?} tile inside {shape:?}"),
                format!("{:?} tile at {:?}", tile.dim(), loc.outer),
            ));
        }

        let padding = loc.padding();
        let ys = AxisSpan::new(
            loc.y_edge,
            loc.outer.y0,
            loc.inner_y,
            loc.outer.height(),
            padding,
            height,
        );
        let xs = AxisSpan::new(
            loc.x_edge,
            loc.outer.x0,
            loc.inner_x,
            loc.outer.width(),
            padding,
            width,
        );

        output
            .slice_mut(s![ys.paste..ys.paste + ys.len, xs.paste..xs.paste + xs.len, ..])
            .assign(&tile.slice(s![ys.cut..ys.cut + ys.len, xs.cut..xs.cut + xs.len, ..]));
    }

    Ok(output)
}
