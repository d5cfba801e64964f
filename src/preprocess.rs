//! Mean/scale normalisation applied before inference, and the per-slice
//! parameter syntax used by multi-source classification.

use ndarray::{Array1, Axis};

use crate::error::{Error, Result};
use crate::image::{ColorMode, Image};

/// `scale * (sample - mean)`, with one mean per channel or one for all.
#[derive(Debug, Clone, PartialEq)]
pub struct ScaleShift {
    pub mean: Vec<f32>,
    pub scale: f32,
}

impl ScaleShift {
    /// A single mean broadcast over every channel.
    #[must_use]
    pub fn new(mean: f32, scale: f32) -> Self {
        Self {
            mean: vec![mean],
            scale,
        }
    }

    fn means_for(&self, channels: usize) -> Result<Array1<f32>> {
        match self.mean.len() {
            0 => Ok(Array1::zeros(channels)),
            1 => Ok(Array1::from_elem(channels, self.mean[0])),
            n if n == channels => Ok(Array1::from_vec(self.mean.clone())),
            n => Err(Error::shape_mismatch(
                format!("1 or {channels} mean value(s)"),
                format!("{n}"),
            )),
        }
    }

    /// Shift then scale every sample.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the number of means matches
    /// neither one nor the channel count.
    pub fn apply(&self, image: &Image) -> Result<Image> {
        let means = self.means_for(image.dim().2)?;
        let mut output = image - &means.insert_axis(Axis(0)).insert_axis(Axis(0));
        output.mapv_inplace(|v| v * self.scale);
        Ok(output)
    }

    /// Undo [`ScaleShift::apply`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] on a mean/channel count mismatch and
    /// [`Error::InvalidParameter`] for a zero scale.
    pub fn invert(&self, image: &Image) -> Result<Image> {
        if self.scale == 0.0 {
            return Err(Error::invalid_parameter("scale", "cannot invert a zero scale"));
        }
        let means = self.means_for(image.dim().2)?;
        let output = image.mapv(|v| v / self.scale);
        Ok(output + &means.insert_axis(Axis(0)).insert_axis(Axis(0)))
    }
}

/// Per-slice preprocessing parameters.
///
/// Each field holds one entry per slice as written on the command line,
/// e.g. means `127:182,192,112` with delimiter `:`. Slice `i` uses entry
/// `min(i, len - 1)`, so a single entry applies to every slice.
#[derive(Debug, Clone, PartialEq)]
pub struct SliceParams {
    means: Vec<Vec<f32>>,
    scales: Vec<f32>,
    channels: Vec<usize>,
}

impl Default for SliceParams {
    /// One grayscale slice, no shift, samples scaled to `[0, 1]`.
    fn default() -> Self {
        Self {
            means: vec![Vec::new()],
            scales: vec![1.0 / 255.0],
            channels: vec![0],
        }
    }
}

fn parse_list<T: std::str::FromStr>(name: &str, raw: &str, delimiter: &str) -> Result<Vec<T>> {
    raw.split(delimiter)
        .map(|token| {
            token
                .trim()
                .parse()
                .map_err(|_| Error::invalid_parameter(name, format!("cannot parse {token:?}")))
        })
        .collect()
}

impl SliceParams {
    /// Parse the three delimited parameter strings. An empty `means` string
    /// means no shift.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for an empty delimiter or a
    /// token that does not parse.
    pub fn parse(means: &str, scales: &str, channels: &str, delimiter: &str) -> Result<Self> {
        if delimiter.is_empty() {
            return Err(Error::invalid_parameter("delimiter", "must not be empty"));
        }

        let means = if means.trim().is_empty() {
            vec![Vec::new()]
        } else {
            means
                .split(delimiter)
                .map(|entry| parse_list("means", entry, ","))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            means,
            scales: parse_list("scales", scales, delimiter)?,
            channels: parse_list("channels", channels, delimiter)?,
        })
    }

    /// Check that every parameter list has either one entry or one per slice.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] naming the first list of the
    /// wrong length.
    pub fn validate(&self, num_slices: usize) -> Result<()> {
        for (name, len) in [
            ("means", self.means.len()),
            ("scales", self.scales.len()),
            ("channels", self.channels.len()),
        ] {
            if len != 1 && len != num_slices {
                return Err(Error::invalid_parameter(
                    name,
                    format!("{len} entries for {num_slices} slice(s)"),
                ));
            }
        }
        Ok(())
    }

    fn pick<T>(entries: &[T], slice: usize) -> &T {
        &entries[slice.min(entries.len() - 1)]
    }

    /// Normalisation for one slice.
    #[must_use]
    pub fn scale_shift(&self, slice: usize) -> ScaleShift {
        ScaleShift {
            mean: Self::pick(&self.means, slice).clone(),
            scale: *Self::pick(&self.scales, slice),
        }
    }

    /// Decode mode for one slice.
    #[must_use]
    pub fn color_mode(&self, slice: usize) -> ColorMode {
        ColorMode::from_channels(*Self::pick(&self.channels, slice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_scale_shift_round_trip() {
        let image = Array3::from_shape_fn((4, 5, 3), |(y, x, c)| (y * 50 + x * 10 + c) as f32);
        let shift = ScaleShift {
            mean: vec![182.0, 192.0, 112.0],
            scale: 0.0039,
        };

        let forward = shift.apply(&image).unwrap();
        assert!((forward[[0, 0, 1]] - 0.0039 * (1.0 - 192.0)).abs() < 1e-6);

        let back = shift.invert(&forward).unwrap();
        assert!(back.iter().zip(&image).all(|(a, b)| (a - b).abs() < 1e-3));
    }

    #[test]
    fn test_broadcast_mean() {
        let image = Array3::from_elem((2, 2, 3), 127.0);
        let out = ScaleShift::new(127.0, 0.5).apply(&image).unwrap();
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_mean_count_mismatch() {
        let shift = ScaleShift {
            mean: vec![1.0, 2.0],
            scale: 1.0,
        };
        let err = shift.apply(&Array3::zeros((2, 2, 3))).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_zero_scale_cannot_invert() {
        let shift = ScaleShift::new(0.0, 0.0);
        assert!(shift.invert(&Array3::zeros((1, 1, 1))).is_err());
    }

    #[test]
    fn test_slice_params_pick_last_entry() {
        let params = SliceParams::parse("127:182,192,112", "0.0039", "1:3", ":").unwrap();
        params.validate(2).unwrap();

        assert_eq!(params.scale_shift(0).mean, vec![127.0]);
        assert_eq!(params.scale_shift(1).mean, vec![182.0, 192.0, 112.0]);
        assert_eq!(params.scale_shift(5).mean, vec![182.0, 192.0, 112.0]);
        assert!((params.scale_shift(1).scale - 0.0039).abs() < f32::EPSILON);
        assert_eq!(params.color_mode(0), ColorMode::Gray);
        assert_eq!(params.color_mode(1), ColorMode::Color);
    }

    #[test]
    fn test_slice_params_empty_means() {
        let params = SliceParams::parse("", "1", "0", ":").unwrap();
        let out = params
            .scale_shift(0)
            .apply(&Array3::from_elem((1, 1, 1), 9.0))
            .unwrap();
        assert_eq!(out[[0, 0, 0]], 9.0);
    }

    #[test]
    fn test_slice_params_validation() {
        let params = SliceParams::parse("1:2:3", "1", "3", ":").unwrap();
        assert!(params.validate(3).is_ok());
        assert!(matches!(
            params.validate(2),
            Err(Error::InvalidParameter { ref name, .. }) if name == "means"
        ));
        assert!(SliceParams::parse("1", "x", "3", ":").is_err());
        assert!(SliceParams::parse("1", "1", "3", "").is_err());
    }
}
