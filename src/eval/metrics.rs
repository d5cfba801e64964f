//! Per-image binarization quality measures.
//!
//! Images follow the document convention: 0 is foreground (ink), anything
//! else is background.

use std::path::Path;

use ndarray::{s, Array2, Zip};

use crate::error::{Error, Result};

/// Every measure for one predicted/ground-truth pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BinaryMetrics {
    pub pseudo_f_measure: f64,
    pub pseudo_precision: f64,
    pub pseudo_recall: f64,
    pub f_measure: f64,
    pub precision: f64,
    pub recall: f64,
    pub drd: f64,
    pub psnr: f64,
    pub accuracy: f64,
}

impl BinaryMetrics {
    /// Values in report column order.
    #[must_use]
    pub const fn values(&self) -> [f64; 9] {
        [
            self.pseudo_f_measure,
            self.pseudo_precision,
            self.pseudo_recall,
            self.f_measure,
            self.precision,
            self.recall,
            self.drd,
            self.psnr,
            self.accuracy,
        ]
    }

    /// Element-wise mean of several results.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn mean(all: &[Self]) -> Self {
        if all.is_empty() {
            return Self::default();
        }
        let n = all.len() as f64;
        let avg = |f: fn(&Self) -> f64| all.iter().map(f).sum::<f64>() / n;
        Self {
            pseudo_f_measure: avg(|m| m.pseudo_f_measure),
            pseudo_precision: avg(|m| m.pseudo_precision),
            pseudo_recall: avg(|m| m.pseudo_recall),
            f_measure: avg(|m| m.f_measure),
            precision: avg(|m| m.precision),
            recall: avg(|m| m.recall),
            drd: avg(|m| m.drd),
            psnr: avg(|m| m.psnr),
            accuracy: avg(|m| m.accuracy),
        }
    }

    /// Space-separated values with four decimals.
    #[must_use]
    pub fn format_row(&self) -> String {
        self.values()
            .iter()
            .map(|v| format!("{v:.4}"))
            .collect::<Vec<_>>()
            .join("  ")
    }
}

fn harmonic_mean(a: f64, b: f64) -> f64 {
    if a + b == 0.0 {
        0.0
    } else {
        2.0 * a * b / (a + b)
    }
}

fn check_shapes(predicted: &Array2<u8>, truth: &Array2<u8>) -> Result<()> {
    if predicted.dim() == truth.dim() {
        Ok(())
    } else {
        Err(Error::shape_mismatch(
            format!("{:?} prediction", truth.dim()),
            format!("{:?}", predicted.dim()),
        ))
    }
}

/// Percentage of pixels with identical values.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn accuracy(predicted: &Array2<u8>, truth: &Array2<u8>) -> f64 {
    let total = predicted.len();
    if total == 0 {
        return 0.0;
    }
    let equal = Zip::from(predicted)
        .and(truth)
        .fold(0usize, |acc, a, b| acc + usize::from(a == b));
    100.0 * equal as f64 / total as f64
}

/// Peak signal-to-noise ratio with the ground truth's maximum as peak.
///
/// Identical images give positive infinity. An all-black ground truth has a
/// zero peak, giving negative infinity when the prediction differs and NaN
/// when it matches. Any of these carries into [`BinaryMetrics::mean`], so
/// the `avg:` summary line reads `inf` or `NaN` for such a directory.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn psnr(predicted: &Array2<u8>, truth: &Array2<u8>) -> f64 {
    let mse = Zip::from(predicted)
        .and(truth)
        .fold(0.0, |acc, &a, &b| {
            let d = f64::from(a) - f64::from(b);
            d.mul_add(d, acc)
        })
        / predicted.len().max(1) as f64;
    let peak = f64::from(truth.iter().copied().max().unwrap_or(0));
    10.0 * (peak * peak / mse).log10()
}

/// Distance-reciprocal distortion: each wrong pixel costs the weighted count
/// of ground-truth pixels in its 5x5 neighbourhood that disagree with it,
/// normalised by the number of non-uniform 8x8 ground-truth blocks.
///
/// When every block is uniform the score is 0 for a perfect prediction and
/// positive infinity otherwise, which also makes the averaged DRD infinite.
#[must_use]
#[allow(clippy::cast_possible_wrap, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn drd(predicted: &Array2<u8>, truth: &Array2<u8>) -> f64 {
    let mut weights = [[0.0f64; 5]; 5];
    for (i, row) in weights.iter_mut().enumerate() {
        for (j, w) in row.iter_mut().enumerate() {
            let (di, dj) = (i as f64 - 2.0, j as f64 - 2.0);
            if di != 0.0 || dj != 0.0 {
                *w = 1.0 / di.hypot(dj);
            }
        }
    }
    let norm: f64 = weights.iter().flatten().sum();

    let (height, width) = truth.dim();
    let mut total = 0.0;
    for ((h, w), &p) in predicted.indexed_iter() {
        if p == truth[[h, w]] {
            continue;
        }
        for (i, row) in weights.iter().enumerate() {
            for (j, &weight) in row.iter().enumerate() {
                let y = h as isize + i as isize - 2;
                let x = w as isize + j as isize - 2;
                if y < 0 || x < 0 || y as usize >= height || x as usize >= width {
                    continue;
                }
                if p != truth[[y as usize, x as usize]] {
                    total += weight / norm;
                }
            }
        }
    }

    let mut non_uniform = 0usize;
    for by in (0..height.saturating_sub(7)).step_by(8) {
        for bx in (0..width.saturating_sub(7)).step_by(8) {
            let block = truth.slice(s![by..by + 8, bx..bx + 8]);
            let first = block[[0, 0]];
            let uniform = (first == 0 || first == 255) && block.iter().all(|&v| v == first);
            if !uniform {
                non_uniform += 1;
            }
        }
    }

    if non_uniform == 0 {
        return if total == 0.0 { 0.0 } else { f64::INFINITY };
    }
    total / non_uniform as f64
}

/// F-measure, precision, and recall (percentages) of the foreground.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn f_measure(predicted: &Array2<u8>, truth: &Array2<u8>) -> (f64, f64, f64) {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    Zip::from(predicted).and(truth).for_each(|&p, &t| match (p == 0, t == 0) {
        (true, true) => tp += 1,
        (true, false) => fp += 1,
        (false, true) => fn_ += 1,
        (false, false) => {}
    });

    let recall = if tp + fn_ == 0 {
        0.0
    } else {
        100.0 * tp as f64 / (tp + fn_) as f64
    };
    let precision = if tp + fp == 0 {
        0.0
    } else {
        100.0 * tp as f64 / (tp + fp) as f64
    };
    (harmonic_mean(recall, precision), precision, recall)
}

/// Pseudo F-measure, precision, and recall (percentages) using per-pixel
/// recall and precision weight maps.
///
/// Both images are inverted about their own maximum so that foreground
/// carries the weight.
#[must_use]
pub fn pseudo_f_measure(
    predicted: &Array2<u8>,
    truth: &Array2<u8>,
    recall_weights: &Array2<f64>,
    precision_weights: &Array2<f64>,
) -> (f64, f64, f64) {
    let invert = |im: &Array2<u8>| {
        let max = f64::from(im.iter().copied().max().unwrap_or(0));
        im.mapv(|v| max - f64::from(v))
    };
    let im = invert(predicted);
    let gt = invert(truth);

    let weighted = |a: &Array2<f64>, b: &Array2<f64>, w: &Array2<f64>| {
        Zip::from(a)
            .and(b)
            .and(w)
            .fold(0.0, |acc, &x, &y, &z| (x * y).mul_add(z, acc))
    };
    let dot = |a: &Array2<f64>, w: &Array2<f64>| (a * w).sum();

    let recall_den = dot(&gt, recall_weights);
    let recall = if recall_den == 0.0 {
        0.0
    } else {
        (100.0 / 255.0) * weighted(&im, &gt, recall_weights) / recall_den
    };

    let precision_den = dot(&im, precision_weights);
    let precision = if precision_den == 0.0 {
        0.0
    } else {
        (100.0 / 255.0) * weighted(&im, &gt, precision_weights) / precision_den
    };

    (harmonic_mean(recall, precision), precision, recall)
}

/// Read a whitespace-separated weight map with `shape` values.
///
/// # Errors
///
/// Returns [`Error::DataSource`] if the file cannot be read, a value does not
/// parse, or the value count does not match `shape`.
pub fn load_weights(path: &Path, shape: (usize, usize)) -> Result<Array2<f64>> {
    let bad = |reason: String| Error::DataSource {
        path: path.to_path_buf(),
        reason,
    };
    let text = std::fs::read_to_string(path).map_err(|e| bad(e.to_string()))?;
    let values = text
        .split_whitespace()
        .map(|t| t.parse::<f64>().map_err(|_| bad(format!("bad value {t:?}"))))
        .collect::<Result<Vec<_>>>()?;
    let count = values.len();
    Array2::from_shape_vec(shape, values)
        .map_err(|_| bad(format!("{count} values for a {}x{} image", shape.0, shape.1)))
}

/// Compute every measure for one pair. `precision_weights` are used as
/// stored plus one.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the images or weight maps differ in
/// size.
pub fn evaluate(
    predicted: &Array2<u8>,
    truth: &Array2<u8>,
    recall_weights: &Array2<f64>,
    precision_weights: &Array2<f64>,
) -> Result<BinaryMetrics> {
    check_shapes(predicted, truth)?;
    if recall_weights.dim() != truth.dim() || precision_weights.dim() != truth.dim() {
        return Err(Error::shape_mismatch(
            format!("{:?} weight maps", truth.dim()),
            format!("{:?} and {:?}", recall_weights.dim(), precision_weights.dim()),
        ));
    }

    let precision_weights = precision_weights + 1.0;
    let (pseudo_f_measure, pseudo_precision, pseudo_recall) =
        pseudo_f_measure(predicted, truth, recall_weights, &precision_weights);
    let (f_measure, precision, recall) = f_measure(predicted, truth);

    Ok(BinaryMetrics {
        pseudo_f_measure,
        pseudo_precision,
        pseudo_recall,
        f_measure,
        precision,
        recall,
        drd: drd(predicted, truth),
        psnr: psnr(predicted, truth),
        accuracy: accuracy(predicted, truth),
    })
}
