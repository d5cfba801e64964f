//! Combine per-variant class distributions into one decision.

use ndarray::{Array1, ArrayView1, ArrayView2, Axis};

use crate::error::{Error, Result};

/// Index of the largest value; the first one wins ties.
#[must_use]
pub fn argmax(values: ArrayView1<'_, f32>) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

/// Outcome of voting over the variants of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct Vote {
    /// Winning class.
    pub label: usize,
    /// Weighted average distribution.
    pub scores: Array1<f32>,
    /// Arg-max class of each variant on its own.
    pub predictions: Vec<usize>,
}

/// Weighted average of `outputs` (one row per variant) and its arg-max.
///
/// Weights are divided by their sum; if they sum to zero the raw weighted
/// sum is used.
///
/// # Errors
///
/// Returns [`Error::ShapeMismatch`] if the weight count differs from the
/// variant count, and [`Error::InvalidParameter`] if there are no variants
/// or no classes.
pub fn aggregate(outputs: ArrayView2<'_, f32>, weights: &[f32]) -> Result<Vote> {
    let (variants, classes) = outputs.dim();
    if weights.len() != variants {
        return Err(Error::shape_mismatch(
            format!("{variants} weight(s)"),
            format!("{}", weights.len()),
        ));
    }
    if variants == 0 || classes == 0 {
        return Err(Error::invalid_parameter("outputs", "no variants to vote over"));
    }

    let mut scores = Array1::<f32>::zeros(classes);
    for (row, &w) in outputs.axis_iter(Axis(0)).zip(weights) {
        scores.scaled_add(w, &row);
    }
    let total: f32 = weights.iter().sum();
    if total != 0.0 {
        scores /= total;
    }

    let predictions = outputs
        .axis_iter(Axis(0))
        .map(|row| argmax(row).unwrap_or(0))
        .collect();
    let label = argmax(scores.view()).unwrap_or(0);

    Ok(Vote {
        label,
        scores,
        predictions,
    })
}

/// How a tuning pass scores each variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoteMode {
    /// 1 if the variant's arg-max is the true label, else 0.
    Hard,
    /// The variant's probability for the true label.
    #[default]
    Soft,
}

/// Accumulates per-transform votes over a labeled tuning set.
#[derive(Debug, Clone)]
pub struct WeightTuner {
    mode: VoteMode,
    votes: Vec<f64>,
    count: usize,
}

impl WeightTuner {
    #[must_use]
    pub fn new(transforms: usize, mode: VoteMode) -> Self {
        Self {
            mode,
            votes: vec![0.0; transforms],
            count: 0,
        }
    }

    /// Add the outputs for one tuning image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if the variant count differs from the
    /// transform count or `label` is not a valid class.
    pub fn add(&mut self, outputs: ArrayView2<'_, f32>, label: usize) -> Result<()> {
        let (variants, classes) = outputs.dim();
        if variants != self.votes.len() {
            return Err(Error::shape_mismatch(
                format!("{} variant(s)", self.votes.len()),
                format!("{variants}"),
            ));
        }
        if label >= classes {
            return Err(Error::shape_mismatch(
                format!("label below {classes}"),
                format!("{label}"),
            ));
        }

        for (vote, row) in self.votes.iter_mut().zip(outputs.axis_iter(Axis(0))) {
            *vote += match self.mode {
                VoteMode::Hard => f64::from(u8::from(argmax(row) == Some(label))),
                VoteMode::Soft => f64::from(row[label]),
            };
        }
        self.count += 1;
        Ok(())
    }

    /// Number of tuning images seen.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Per-transform weights: mean vote over the tuning images. With no
    /// images every weight is 1.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn finish(self) -> Vec<f32> {
        if self.count == 0 {
            tracing::warn!("No tuning images; using uniform weights");
            return vec![1.0; self.votes.len()];
        }
        let n = self.count as f64;
        self.votes.iter().map(|v| (v / n) as f32).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_uniform_average() {
        let outputs = array![[0.9, 0.1], [0.3, 0.7]];
        let vote = aggregate(outputs.view(), &[1.0, 1.0]).unwrap();

        assert_eq!(vote.label, 0);
        assert!((vote.scores[0] - 0.6).abs() < 1e-6);
        assert!((vote.scores[1] - 0.4).abs() < 1e-6);
        assert_eq!(vote.predictions, vec![0, 1]);
    }

    #[test]
    fn test_weights_shift_decision() {
        let outputs = array![[0.9, 0.1], [0.3, 0.7]];
        let vote = aggregate(outputs.view(), &[1.0, 3.0]).unwrap();
        assert_eq!(vote.label, 1);
        assert!((vote.scores[1] - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_weight_count_mismatch() {
        let outputs = array![[0.9, 0.1], [0.3, 0.7]];
        let err = aggregate(outputs.view(), &[1.0]).unwrap_err();
        assert!(matches!(err, Error::ShapeMismatch { .. }));
    }

    #[test]
    fn test_argmax_ties_pick_first() {
        assert_eq!(argmax(array![0.2, 0.4, 0.4].view()), Some(1));
        assert_eq!(argmax(Array1::<f32>::zeros(0).view()), None);
    }

    #[test]
    fn test_hard_tuning() {
        let mut tuner = WeightTuner::new(2, VoteMode::Hard);
        tuner.add(array![[0.9, 0.1], [0.3, 0.7]].view(), 0).unwrap();
        tuner.add(array![[0.8, 0.2], [0.6, 0.4]].view(), 0).unwrap();

        assert_eq!(tuner.count(), 2);
        assert_eq!(tuner.finish(), vec![1.0, 0.5]);
    }

    #[test]
    fn test_soft_tuning() {
        let mut tuner = WeightTuner::new(2, VoteMode::Soft);
        tuner.add(array![[0.9, 0.1], [0.3, 0.7]].view(), 1).unwrap();
        let weights = tuner.finish();

        assert!((weights[0] - 0.1).abs() < 1e-6);
        assert!((weights[1] - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_tuning_rejects_variable_variants() {
        let mut tuner = WeightTuner::new(3, VoteMode::Soft);
        assert!(tuner.add(array![[0.5, 0.5]].view(), 0).is_err());
        assert!(tuner.add(array![[0.5, 0.5], [0.5, 0.5], [1.0, 0.0]].view(), 2).is_err());
        assert_eq!(tuner.finish(), vec![1.0; 3]);
    }
}
