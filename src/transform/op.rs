//! Typed transform operations and their token grammar.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Axis reflected by [`TransformOp::Mirror`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorAxis {
    /// Reflect about the horizontal axis (flip rows).
    Horizontal,
    /// Reflect about the vertical axis (flip columns).
    Vertical,
    /// Both axes.
    Both,
}

/// Direction of [`TransformOp::Shear`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShearAxis {
    Horizontal,
    Vertical,
}

/// One image operation with validated parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum TransformOp {
    /// `crop y x h w`
    Crop {
        y: i64,
        x: i64,
        height: i64,
        width: i64,
    },
    /// `densecrop h w ystride xstride`
    DenseCrop {
        height: usize,
        width: usize,
        y_stride: usize,
        x_stride: usize,
    },
    /// `randcrop h w`
    RandCrop { height: usize, width: usize },
    /// `resize h w`
    Resize { height: usize, width: usize },
    /// `resize2 scale`
    Rescale { factor: f64 },
    /// `mirror {h|v|hv}`
    Mirror(MirrorAxis),
    /// `gaussnoise sigma seed`
    GaussNoise { sigma: f64, seed: u64 },
    /// `color_jitter sigma seed`
    ColorJitter { sigma: f64, seed: u64 },
    /// `rotation degree`
    Rotation { degrees: f64 },
    /// `blur sigma`
    Blur { sigma: f64 },
    /// `unsharpmask sigma amount`
    UnsharpMask { sigma: f64, amount: f64 },
    /// `shear degree {h|v}`
    Shear { degrees: f64, axis: ShearAxis },
    /// `perspective dy1 dx1 dy2 dx2 dy3 dx3 dy4 dx4`
    Perspective { offsets: [(f64, f64); 4] },
    /// `elastic sigma alpha seed`
    Elastic { sigma: f64, alpha: f64, seed: u64 },
    /// `none`
    Identity,
}

impl TransformOp {
    /// Whether this operation can emit more than one image.
    #[must_use]
    pub const fn is_multi_output(&self) -> bool {
        matches!(self, Self::DenseCrop { .. })
    }
}

/// Positional parameters of one operation.
struct Params<'a> {
    spec: &'a str,
    args: Vec<&'a str>,
}

impl Params<'_> {
    fn expect_len(&self, names: &[&str]) -> Result<()> {
        if self.args.len() == names.len() {
            Ok(())
        } else {
            Err(self.invalid(format!(
                "expected {} parameter(s) ({}), got {}",
                names.len(),
                names.join(" "),
                self.args.len()
            )))
        }
    }

    fn get<T: FromStr>(&self, idx: usize, name: &str) -> Result<T> {
        let raw = self.args[idx];
        raw.parse()
            .map_err(|_| self.invalid(format!("cannot parse {name} from {raw:?}")))
    }

    fn positive(&self, idx: usize, name: &str) -> Result<usize> {
        let value: usize = self.get(idx, name)?;
        if value == 0 {
            return Err(self.invalid(format!("{name} must be positive")));
        }
        Ok(value)
    }

    fn finite(&self, idx: usize, name: &str) -> Result<f64> {
        let value: f64 = self.get(idx, name)?;
        if !value.is_finite() {
            return Err(self.invalid(format!("{name} must be finite")));
        }
        Ok(value)
    }

    fn non_negative(&self, idx: usize, name: &str) -> Result<f64> {
        let value = self.finite(idx, name)?;
        if value < 0.0 {
            return Err(self.invalid(format!("{name} must not be negative")));
        }
        Ok(value)
    }

    fn invalid(&self, reason: String) -> Error {
        Error::InvalidTransform {
            spec: self.spec.to_string(),
            reason,
        }
    }
}

impl FromStr for TransformOp {
    type Err = Error;

    fn from_str(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let lowered = spec.to_lowercase();
        let mut tokens = lowered.split_whitespace();
        let Some(name) = tokens.next() else {
            return Err(Error::InvalidTransform {
                spec: spec.to_string(),
                reason: "empty operation".to_string(),
            });
        };
        let p = Params {
            spec,
            args: tokens.collect(),
        };

        let op = match name {
            "crop" => {
                p.expect_len(&["y", "x", "height", "width"])?;
                Self::Crop {
                    y: p.get(0, "y")?,
                    x: p.get(1, "x")?,
                    height: p.get(2, "height")?,
                    width: p.get(3, "width")?,
                }
            }
            "densecrop" => {
                p.expect_len(&["height", "width", "ystride", "xstride"])?;
                Self::DenseCrop {
                    height: p.positive(0, "height")?,
                    width: p.positive(1, "width")?,
                    y_stride: p.positive(2, "ystride")?,
                    x_stride: p.positive(3, "xstride")?,
                }
            }
            "randcrop" => {
                p.expect_len(&["height", "width"])?;
                Self::RandCrop {
                    height: p.positive(0, "height")?,
                    width: p.positive(1, "width")?,
                }
            }
            "resize" => {
                p.expect_len(&["height", "width"])?;
                Self::Resize {
                    height: p.positive(0, "height")?,
                    width: p.positive(1, "width")?,
                }
            }
            "resize2" => {
                p.expect_len(&["scale"])?;
                let factor = p.finite(0, "scale")?;
                if factor <= 0.0 {
                    return Err(p.invalid("scale must be positive".to_string()));
                }
                Self::Rescale { factor }
            }
            "mirror" => {
                p.expect_len(&["axis"])?;
                Self::Mirror(match p.args[0] {
                    "h" => MirrorAxis::Horizontal,
                    "v" => MirrorAxis::Vertical,
                    "hv" => MirrorAxis::Both,
                    other => return Err(p.invalid(format!("unrecognized mirror axis {other:?}"))),
                })
            }
            "gaussnoise" => {
                p.expect_len(&["sigma", "seed"])?;
                Self::GaussNoise {
                    sigma: p.non_negative(0, "sigma")?,
                    seed: p.get(1, "seed")?,
                }
            }
            "color_jitter" => {
                p.expect_len(&["sigma", "seed"])?;
                Self::ColorJitter {
                    sigma: p.non_negative(0, "sigma")?,
                    seed: p.get(1, "seed")?,
                }
            }
            "rotation" | "rotate" => {
                p.expect_len(&["degree"])?;
                Self::Rotation {
                    degrees: p.finite(0, "degree")?,
                }
            }
            "blur" => {
                p.expect_len(&["sigma"])?;
                Self::Blur {
                    sigma: positive_sigma(&p)?,
                }
            }
            "unsharpmask" | "unsharp" => {
                p.expect_len(&["sigma", "amount"])?;
                Self::UnsharpMask {
                    sigma: positive_sigma(&p)?,
                    amount: p.finite(1, "amount")?,
                }
            }
            "shear" => {
                p.expect_len(&["degree", "axis"])?;
                let axis = match p.args[1] {
                    "h" => ShearAxis::Horizontal,
                    "v" => ShearAxis::Vertical,
                    other => return Err(p.invalid(format!("unrecognized shear axis {other:?}"))),
                };
                Self::Shear {
                    degrees: p.finite(0, "degree")?,
                    axis,
                }
            }
            "perspective" => {
                p.expect_len(&["dy1", "dx1", "dy2", "dx2", "dy3", "dx3", "dy4", "dx4"])?;
                let mut offsets = [(0.0, 0.0); 4];
                for (i, corner) in offsets.iter_mut().enumerate() {
                    *corner = (p.finite(2 * i, "dy")?, p.finite(2 * i + 1, "dx")?);
                }
                Self::Perspective { offsets }
            }
            "elastic" => {
                p.expect_len(&["sigma", "alpha", "seed"])?;
                Self::Elastic {
                    sigma: p.non_negative(0, "sigma")?,
                    alpha: p.non_negative(1, "alpha")?,
                    seed: p.get(2, "seed")?,
                }
            }
            "none" => {
                p.expect_len(&[])?;
                Self::Identity
            }
            _ => return Err(Error::UnknownTransform(spec.to_string())),
        };

        Ok(op)
    }
}

fn positive_sigma(p: &Params<'_>) -> Result<f64> {
    let sigma = p.finite(0, "sigma")?;
    if sigma <= 0.0 {
        return Err(p.invalid("sigma must be positive".to_string()));
    }
    Ok(sigma)
}

impl fmt::Display for TransformOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Crop {
                y,
                x,
                height,
                width,
            } => write!(f, "crop {y} {x} {height} {width}"),
            Self::DenseCrop {
                height,
                width,
                y_stride,
                x_stride,
            } => write!(f, "densecrop {height} {width} {y_stride} {x_stride}"),
            Self::RandCrop { height, width } => write!(f, "randcrop {height} {width}"),
            Self::Resize { height, width } => write!(f, "resize {height} {width}"),
            Self::Rescale { factor } => write!(f, "resize2 {factor}"),
            Self::Mirror(axis) => {
                let axis = match axis {
                    MirrorAxis::Horizontal => "h",
                    MirrorAxis::Vertical => "v",
                    MirrorAxis::Both => "hv",
                };
                write!(f, "mirror {axis}")
            }
            Self::GaussNoise { sigma, seed } => write!(f, "gaussnoise {sigma} {seed}"),
            Self::ColorJitter { sigma, seed } => write!(f, "color_jitter {sigma} {seed}"),
            Self::Rotation { degrees } => write!(f, "rotation {degrees}"),
            Self::Blur { sigma } => write!(f, "blur {sigma}"),
            Self::UnsharpMask { sigma, amount } => write!(f, "unsharpmask {sigma} {amount}"),
            Self::Shear { degrees, axis } => {
                let axis = match axis {
                    ShearAxis::Horizontal => "h",
                    ShearAxis::Vertical => "v",
                };
                write!(f, "shear {degrees} {axis}")
            }
            Self::Perspective { offsets } => {
                write!(f, "perspective")?;
                for (dy, dx) in offsets {
                    write!(f, " {dy} {dx}")?;
                }
                Ok(())
            }
            Self::Elastic { sigma, alpha, seed } => write!(f, "elastic {sigma} {alpha} {seed}"),
            Self::Identity => write!(f, "none"),
        }
    }
}
