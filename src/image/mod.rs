//! Image loading, conversion, and saving utilities.

mod load;
mod save;

pub use load::{decode_image, load_binary, load_image};
pub use save::{save_gray, save_raster};

use ndarray::Array3;

/// Image array in HWC format (height, width, channels).
///
/// Samples are kept as `f32` in the `[0, 255]` range until a preprocessing
/// stage shifts them. Colour images store their channels in BGR order, the
/// order the document networks were trained with.
pub type Image = Array3<f32>;

/// Largest valid sample value.
pub const MAX_SAMPLE: f32 = 255.0;

/// Number of channels in colour images.
pub const COLOR_CHANNELS: usize = 3;

/// How an image file is decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMode {
    /// Single luminance channel.
    Gray,
    /// Three channels in BGR order.
    Color,
}

impl ColorMode {
    /// Decode mode for a requested channel count: 3 is colour, anything else gray.
    #[must_use]
    pub const fn from_channels(channels: usize) -> Self {
        if channels == COLOR_CHANNELS {
            Self::Color
        } else {
            Self::Gray
        }
    }

    /// Number of channels produced by this mode.
    #[must_use]
    pub const fn channels(self) -> usize {
        match self {
            Self::Gray => 1,
            Self::Color => COLOR_CHANNELS,
        }
    }
}

/// Round and saturate a sample to `u8`.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn saturate_u8(value: f32) -> u8 {
    // Safe: clamped to [0, 255] before casting
    value.round().clamp(0.0, MAX_SAMPLE) as u8
}

/// Saturate a sample to `u8`, truncating the fractional part.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn truncate_u8(value: f32) -> u8 {
    value.clamp(0.0, MAX_SAMPLE) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_saturate_rounds() {
        assert_eq!(saturate_u8(127.5), 128);
        assert_eq!(saturate_u8(-3.0), 0);
        assert_eq!(saturate_u8(300.0), 255);
    }

    #[test]
    fn test_truncate_drops_fraction() {
        assert_eq!(truncate_u8(127.9), 127);
        assert_eq!(truncate_u8(255.7), 255);
        assert_eq!(truncate_u8(-0.5), 0);
    }

    #[test]
    fn test_color_mode_from_channels() {
        assert_eq!(ColorMode::from_channels(3), ColorMode::Color);
        assert_eq!(ColorMode::from_channels(1), ColorMode::Gray);
        assert_eq!(ColorMode::from_channels(0), ColorMode::Gray);
    }
}
