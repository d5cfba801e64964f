//! Subwindow partitioning of an image into overlapping fixed-size tiles.

use ndarray::s;

use crate::error::{Error, Result};
use crate::image::Image;

/// Position of a tile along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// First column of tiles.
    Left,
    /// First row of tiles.
    Top,
    /// Interior tile along this axis.
    Middle,
    /// Last column of tiles.
    Right,
    /// Last row of tiles.
    Bottom,
}

impl EdgeKind {
    /// Classify a row offset.
    #[must_use]
    pub const fn for_row(y: usize, height: usize, tile: usize) -> Self {
        if y == 0 {
            Self::Top
        } else if y + tile == height {
            Self::Bottom
        } else {
            Self::Middle
        }
    }

    /// Classify a column offset.
    #[must_use]
    pub const fn for_column(x: usize, width: usize, tile: usize) -> Self {
        if x == 0 {
            Self::Left
        } else if x + tile == width {
            Self::Right
        } else {
            Self::Middle
        }
    }

    /// Whether the tile touches the leading image edge (top or left).
    #[must_use]
    pub const fn is_leading(self) -> bool {
        matches!(self, Self::Top | Self::Left)
    }

    /// Whether the tile touches the trailing image edge (bottom or right).
    #[must_use]
    pub const fn is_trailing(self) -> bool {
        matches!(self, Self::Bottom | Self::Right)
    }
}

/// Half-open rectangle `[y0, y1) x [x0, x1)` in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoundingBox {
    pub y0: usize,
    pub x0: usize,
    pub y1: usize,
    pub x1: usize,
}

impl BoundingBox {
    #[must_use]
    pub const fn height(&self) -> usize {
        self.y1 - self.y0
    }

    #[must_use]
    pub const fn width(&self) -> usize {
        self.x1 - self.x0
    }
}

/// Placement of one tile in its source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileLocation {
    /// Where the tile was cropped from.
    pub outer: BoundingBox,
    /// Start of the part of the tile that does not overlap its neighbours.
    pub inner_y: usize,
    pub inner_x: usize,
    pub y_edge: EdgeKind,
    pub x_edge: EdgeKind,
}

impl TileLocation {
    /// Overlap width between this tile and its neighbours.
    #[must_use]
    pub const fn padding(&self) -> usize {
        self.inner_y - self.outer.y0
    }
}

/// Tile size and overlap used to cover an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    pub tile_size: usize,
    pub padding: usize,
}

impl TileGeometry {
    #[must_use]
    pub const fn new(tile_size: usize, padding: usize) -> Self {
        Self { tile_size, padding }
    }

    /// Distance between consecutive tile origins.
    #[must_use]
    pub const fn stride(&self) -> usize {
        self.tile_size.saturating_sub(2 * self.padding)
    }

    /// Check that tiles of this geometry fit an image of the given size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidGeometry`] if the tile is larger than the image
    /// or the padding leaves no stride.
    pub fn check(&self, height: usize, width: usize) -> Result<()> {
        let invalid = |reason: String| Error::InvalidGeometry {
            height,
            width,
            reason,
        };

        if self.stride() == 0 {
            return Err(invalid(format!(
                "tile size {} must exceed twice the padding {}",
                self.tile_size, self.padding
            )));
        }
        if self.tile_size > height || self.tile_size > width {
            return Err(invalid(format!(
                "tile size {} is larger than the image",
                self.tile_size
            )));
        }
        Ok(())
    }
}

/// Origins of fixed-size windows covering `extent` with the given stride.
///
/// The last window is clamped to end exactly at `extent`, so there are no
/// gaps and at most the final step is shorter than `stride`. Callers must
/// ensure `window <= extent` and `stride > 0`.
#[must_use]
pub fn window_offsets(extent: usize, window: usize, stride: usize) -> Vec<usize> {
    debug_assert!(window <= extent && stride > 0);

    let mut offsets = Vec::new();
    let mut pos = 0;
    loop {
        if pos + window >= extent {
            offsets.push(extent - window);
            break;
        }
        offsets.push(pos);
        pos += stride;
    }
    offsets
}

/// Tile placements covering an image of `height` x `width`, row-major.
///
/// # Errors
///
/// Returns [`Error::InvalidGeometry`] if the tiles do not fit the image.
pub fn tile_locations(
    height: usize,
    width: usize,
    geometry: TileGeometry,
) -> Result<Vec<TileLocation>> {
    geometry.check(height, width)?;

    let TileGeometry { tile_size, padding } = geometry;
    let stride = geometry.stride();
    let rows = window_offsets(height, tile_size, stride);
    let cols = window_offsets(width, tile_size, stride);

    let mut locations = Vec::with_capacity(rows.len() * cols.len());
    for &y in &rows {
        for &x in &cols {
            locations.push(TileLocation {
                outer: BoundingBox {
                    y0: y,
                    x0: x,
                    y1: y + tile_size,
                    x1: x + tile_size,
                },
                inner_y: y + padding,
                inner_x: x + padding,
                y_edge: EdgeKind::for_row(y, height, tile_size),
                x_edge: EdgeKind::for_column(x, width, tile_size),
            });
        }
    }

    tracing::debug!(
        rows = rows.len(),
        cols = cols.len(),
        tile_size,
        padding,
        "Partitioned {height}x{width} image"
    );

    Ok(locations)
}

/// Cover an image with overlapping tiles.
///
/// Returns the tile placements and the cropped tiles in the same row-major
/// order.
///
/// # Errors
///
/// Returns [`Error::InvalidGeometry`] if the tiles do not fit the image.
pub fn partition(image: &Image, geometry: TileGeometry) -> Result<(Vec<TileLocation>, Vec<Image>)> {
    let (height, width, _) = image.dim();
    let locations = tile_locations(height, width, geometry)?;

    let tiles = locations
        .iter()
        .map(|loc| {
            image
                .slice(s![loc.outer.y0..loc.outer.y1, loc.outer.x0..loc.outer.x1, ..])
                .to_owned()
        })
        .collect();

    Ok((locations, tiles))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_window_offsets_clamps_last() {
        assert_eq!(window_offsets(100, 30, 40), vec![0, 40, 70]);
    }

    #[test]
    fn test_window_offsets_exact_fit_not_duplicated() {
        assert_eq!(window_offsets(110, 30, 40), vec![0, 40, 80]);
        assert_eq!(window_offsets(30, 30, 40), vec![0]);
    }

    #[test]
    fn test_rejects_oversized_tile() {
        let image = Array3::<f32>::zeros((10, 20, 1));
        let err = partition(&image, TileGeometry::new(16, 2)).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry { height: 10, width: 20, .. }));
    }

    #[test]
    fn test_rejects_padding_without_stride() {
        let image = Array3::<f32>::zeros((20, 20, 1));
        let err = partition(&image, TileGeometry::new(8, 4)).unwrap_err();
        assert!(matches!(err, Error::InvalidGeometry { .. }));
    }

    #[test]
    fn test_tiles_cover_image() {
        for (height, width) in [(16, 16), (17, 40), (33, 21), (64, 50)] {
            let geometry = TileGeometry::new(16, 3);
            let locations = tile_locations(height, width, geometry).unwrap();
            let mut covered = vec![false; height * width];

            for loc in &locations {
                assert_eq!(loc.outer.height(), 16);
                assert_eq!(loc.outer.width(), 16);
                for y in loc.outer.y0..loc.outer.y1 {
                    for x in loc.outer.x0..loc.outer.x1 {
                        covered[y * width + x] = true;
                    }
                }
            }

            assert!(covered.iter().all(|&c| c), "gap in {height}x{width}");
        }
    }

    #[test]
    fn test_edge_kinds_match_boundaries() {
        let (height, width) = (50, 37);
        let locations = tile_locations(height, width, TileGeometry::new(16, 2)).unwrap();

        for loc in &locations {
            match loc.y_edge {
                EdgeKind::Top => assert_eq!(loc.outer.y0, 0),
                EdgeKind::Bottom => assert_eq!(loc.outer.y1, height),
                EdgeKind::Middle => {
                    assert!(loc.outer.y0 > 0 && loc.outer.y1 < height);
                }
                other => panic!("unexpected row edge {other:?}"),
            }
            match loc.x_edge {
                EdgeKind::Left => assert_eq!(loc.outer.x0, 0),
                EdgeKind::Right => assert_eq!(loc.outer.x1, width),
                EdgeKind::Middle => {
                    assert!(loc.outer.x0 > 0 && loc.outer.x1 < width);
                }
                other => panic!("unexpected column edge {other:?}"),
            }
        }
    }

    #[test]
    fn test_single_tile_is_top_left() {
        let locations = tile_locations(16, 16, TileGeometry::new(16, 2)).unwrap();
        assert_eq!(locations.len(), 1);
        assert_eq!(locations[0].y_edge, EdgeKind::Top);
        assert_eq!(locations[0].x_edge, EdgeKind::Left);
    }

    #[test]
    fn test_row_major_order_and_crops() {
        let image = Array3::from_shape_fn((20, 20, 1), |(y, x, _)| (y * 100 + x) as f32);
        let (locations, tiles) = partition(&image, TileGeometry::new(12, 2)).unwrap();

        assert_eq!(locations.len(), tiles.len());
        for pair in locations.windows(2) {
            let (a, b) = (pair[0].outer, pair[1].outer);
            assert!((a.y0, a.x0) < (b.y0, b.x0));
        }
        for (loc, tile) in locations.iter().zip(&tiles) {
            assert_eq!(tile.dim(), (12, 12, 1));
            assert_eq!(tile[[0, 0, 0]], (loc.outer.y0 * 100 + loc.outer.x0) as f32);
        }
        assert_eq!(locations[0].padding(), 2);
    }

    #[test]
    fn test_inner_origin_follows_stride() {
        let geometry = TileGeometry::new(12, 2);
        let locations = tile_locations(12, 40, geometry).unwrap();
        let origins: Vec<_> = locations.iter().map(|loc| loc.inner_x).collect();

        assert_eq!(origins, vec![2, 10, 18, 26, 30]);
        for pair in locations.windows(2).take(3) {
            assert_eq!(pair[1].inner_x - pair[0].inner_x, geometry.stride());
        }
        assert!(locations.iter().all(|loc| loc.inner_y == 2 && loc.padding() == 2));
    }
}
