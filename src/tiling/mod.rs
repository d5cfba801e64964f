//! Sliding-window tiling: cover an image with overlapping tiles and stitch
//! per-tile network outputs back into one full-resolution map.

mod partition;
mod stitch;

pub use partition::{
    partition, tile_locations, window_offsets, BoundingBox, EdgeKind, TileGeometry, TileLocation,
};
pub use stitch::stitch;

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: usize = 512;

/// Default overlap discarded on each side of interior tiles.
pub const DEFAULT_PADDING: usize = 6;
