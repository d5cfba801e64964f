//! Colour-coded comparison of two binary images.

use ndarray::{Array2, Array3};

use crate::error::{Error, Result};

/// Samples below this value count as foreground.
const FOREGROUND_BELOW: u8 = 128;

/// BGR colours for (first is ink, second is ink).
const BOTH_BACKGROUND: [u8; 3] = [255, 255, 255];
const ONLY_SECOND: [u8; 3] = [0, 0, 255];
const ONLY_FIRST: [u8; 3] = [0, 255, 0];
const BOTH_FOREGROUND: [u8; 3] = [0, 0, 0];

/// Build a BGR raster showing where `first` and `second` agree.
///
/// White where both are background, black where both are foreground, green
/// where only `first` has ink, and red where only `second` does.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the images differ in size.
pub fn binary_diff(first: &Array2<u8>, second: &Array2<u8>) -> Result<Array3<u8>> {
    if first.dim() != second.dim() {
        return Err(Error::shape_mismatch(
            format!("{:?}", first.dim()),
            format!("{:?}", second.dim()),
        ));
    }

    let (height, width) = first.dim();
    Ok(Array3::from_shape_fn((height, width, 3), |(y, x, c)| {
        let colour = match (
            first[[y, x]] < FOREGROUND_BELOW,
            second[[y, x]] < FOREGROUND_BELOW,
        ) {
            (false, false) => BOTH_BACKGROUND,
            (false, true) => ONLY_SECOND,
            (true, false) => ONLY_FIRST,
            (true, true) => BOTH_FOREGROUND,
        };
        colour[c]
    }))
}
