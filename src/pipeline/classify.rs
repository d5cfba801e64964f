//! Whole-image classification with test-time augmentation and voting.

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use ndarray::{concatenate, Array2, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dataset::{Record, SliceSet};
use crate::error::{Error, Result};
use crate::image::{self, Image};
use crate::model::Network;
use crate::preprocess::SliceParams;
use crate::transform::{normalize_weights, CropWeighting, TransformSet, Variant};
use crate::vote::{aggregate, VoteMode, WeightTuner};

use super::batch::{class_scores, infer, progress_bar};

/// Configuration for the classifier.
#[derive(Debug, Clone)]
pub struct ClassifyConfig {
    /// Variants per forward pass.
    pub batch_size: usize,

    /// Stop after this many documents.
    pub max_images: usize,

    /// Log progress every this many documents.
    pub print_count: usize,

    pub transforms: TransformSet,

    /// Per-slice channels, means, and scales.
    pub slices: SliceParams,

    /// How tuning scores each variant.
    pub vote_mode: VoteMode,

    /// Weighting of dense crops in the final vote.
    pub crop_weighting: CropWeighting,

    /// Seed for random crops.
    pub seed: u64,

    /// Mirror report lines to this file.
    pub log_file: Option<PathBuf>,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            batch_size: 64,
            max_images: 40000,
            print_count: 1000,
            transforms: TransformSet::default(),
            slices: SliceParams::default(),
            vote_mode: VoteMode::Soft,
            crop_weighting: CropWeighting::Uniform,
            seed: 0,
            log_file: None,
        }
    }
}

impl ClassifyConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::invalid_parameter("batch_size", "must be greater than 0"));
        }

        if self.max_images == 0 {
            return Err(Error::invalid_parameter("max_images", "must be greater than 0"));
        }

        if self.print_count == 0 {
            return Err(Error::invalid_parameter("print_count", "must be greater than 0"));
        }

        Ok(())
    }
}

/// Accuracy figures for one evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Rows are true labels, columns predicted labels.
    pub confusion: Array2<usize>,
    /// Correct predictions per transform, when every document produced one
    /// variant per transform.
    pub transform_correct: Vec<usize>,
    pub correct: usize,
    pub total: usize,
}

impl Report {
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn transform_accuracy(&self) -> Vec<f64> {
        let total = self.total.max(1) as f64;
        self.transform_correct
            .iter()
            .map(|&c| c as f64 / total)
            .collect()
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Conf Mat:")?;
        for row in self.confusion.rows() {
            let cells: Vec<String> = row.iter().map(|c| format!("{c:>6}")).collect();
            writeln!(f, " {}", cells.join(""))?;
        }
        writeln!(f)?;
        let accs: Vec<String> = self
            .transform_accuracy()
            .iter()
            .map(|a| format!("{a:.4}"))
            .collect();
        writeln!(f, "Transform Accuracy:\n [{}]", accs.join(", "))?;
        writeln!(f)?;
        writeln!(f, "Correct/Total:\n {}/{}", self.correct, self.total)?;
        writeln!(f)?;
        write!(f, "Overall Accuracy: {:.6}", self.accuracy())
    }
}

/// Report lines sent to the log and, optionally, a file.
struct ReportLog {
    file: Option<BufWriter<File>>,
}

impl ReportLog {
    fn open(path: Option<&PathBuf>) -> Result<Self> {
        let file = path.map(File::create).transpose()?.map(BufWriter::new);
        Ok(Self { file })
    }

    fn line(&mut self, text: &str) -> Result<()> {
        tracing::info!("{text}");
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{text}")?;
        }
        Ok(())
    }

    fn finish(mut self) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

/// Classifies documents from one or more parallel image slices.
pub struct Classifier<N> {
    config: ClassifyConfig,
    network: N,
    rng: StdRng,
}

impl<N: Network> Classifier<N> {
    /// Create a classifier around a loaded network.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: ClassifyConfig, network: N) -> Result<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            network,
            rng,
        })
    }

    /// Build the variants of one document: every slice is decoded,
    /// transformed and normalised, then the slices are stacked along the
    /// channel axis variant by variant.
    ///
    /// # Errors
    ///
    /// Returns an error if an image cannot be loaded or transformed, or the
    /// slices yield different variant counts or sizes.
    pub fn prepare(&mut self, record: Record<'_>) -> Result<Vec<Variant>> {
        let mut per_slice: Vec<Vec<Variant>> = Vec::with_capacity(record.entries.len());

        for (slice, entry) in record.entries.iter().enumerate() {
            let page = image::load_image(&entry.path, self.config.slices.color_mode(slice))?;
            let shift = self.config.slices.scale_shift(slice);
            let mut variants =
                self.config
                    .transforms
                    .apply_all(&page, &mut self.rng, self.config.crop_weighting)?;
            for variant in &mut variants {
                variant.image = shift.apply(&variant.image)?;
            }
            per_slice.push(variants);
        }

        let Some((first, rest)) = per_slice.split_first() else {
            return Err(Error::invalid_parameter("record", "no slices"));
        };
        if let Some(other) = rest.iter().find(|v| v.len() != first.len()) {
            return Err(Error::shape_mismatch(
                format!("{} variant(s) in every slice", first.len()),
                format!("{}", other.len()),
            ));
        }
        if rest.is_empty() {
            return Ok(per_slice.swap_remove(0));
        }

        (0..first.len())
            .map(|i| -> Result<Variant> {
                let views: Vec<_> = per_slice.iter().map(|v| v[i].image.view()).collect();
                let stacked: Image = concatenate(Axis(2), &views).map_err(|e| {
                    Error::shape_mismatch("equal slice sizes", e.to_string())
                })?;
                Ok(Variant {
                    image: stacked,
                    weight: first[i].weight,
                })
            })
            .collect()
    }

    fn scores(&mut self, variants: &[Variant]) -> Result<Array2<f32>> {
        let images: Vec<Image> = variants.iter().map(|v| v.image.clone()).collect();
        class_scores(infer(&mut self.network, &images, self.config.batch_size)?)
    }

    /// Learn per-transform weights from a labeled tuning set.
    ///
    /// Returns `None`, with a warning, when the transform set can yield a
    /// varying number of variants.
    ///
    /// # Errors
    ///
    /// Returns an error if a document cannot be prepared or classified.
    pub fn tune(&mut self, data: &SliceSet) -> Result<Option<Vec<f32>>> {
        if !self.config.transforms.is_fixed() {
            tracing::warn!("Transforms yield a variable number of variants; skipping tuning");
            return Ok(None);
        }

        let mut tuner = WeightTuner::new(self.config.transforms.len(), self.config.vote_mode);
        let limit = self.config.max_images;
        let pb = progress_bar(data.len().min(limit) as u64, "Tuning");

        data.for_each(limit, |index, record| {
            if index % self.config.print_count == 0 {
                tracing::info!("Tuned {index} images");
            }
            let variants = self.prepare(record)?;
            let scores = self.scores(&variants)?;
            tuner.add(scores.view(), record.label)?;
            pb.inc(1);
            Ok(())
        })?;

        pb.finish_and_clear();
        Ok(Some(tuner.finish()))
    }

    /// Classify every document in `data` and tally the results.
    ///
    /// `transform_weights`, when given, scale each transform's vote; they
    /// apply only to documents with one variant per transform.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShapeMismatch`] if a label is outside the network's
    /// classes, or any loading or inference error.
    pub fn evaluate(
        &mut self,
        data: &SliceSet,
        transform_weights: Option<&[f32]>,
    ) -> Result<Report> {
        let num_transforms = self.config.transforms.len();
        let limit = self.config.max_images;
        let pb = progress_bar(data.len().min(limit) as u64, "Classifying");

        let mut confusion: Option<Array2<usize>> = None;
        let mut transform_correct = vec![0; num_transforms];
        let mut correct = 0;
        let mut total = 0;

        data.for_each(limit, |index, record| {
            if index % self.config.print_count == 0 {
                tracing::info!("Processed {index} images");
            }

            let variants = self.prepare(record)?;
            let scores = self.scores(&variants)?;
            let weights = self.vote_weights(&variants, transform_weights);
            let vote = aggregate(scores.view(), &weights)?;

            let classes = scores.ncols();
            if record.label >= classes {
                return Err(Error::shape_mismatch(
                    format!("label below {classes}"),
                    format!("{}", record.label),
                ));
            }
            let matrix = confusion.get_or_insert_with(|| Array2::zeros((classes, classes)));
            matrix[[record.label, vote.label]] += 1;

            total += 1;
            if vote.label == record.label {
                correct += 1;
            }
            if vote.predictions.len() == num_transforms {
                for (count, &p) in transform_correct.iter_mut().zip(&vote.predictions) {
                    if p == record.label {
                        *count += 1;
                    }
                }
            }

            pb.inc(1);
            Ok(())
        })?;

        pb.finish_and_clear();
        Ok(Report {
            confusion: confusion.unwrap_or_else(|| Array2::zeros((0, 0))),
            transform_correct,
            correct,
            total,
        })
    }

    fn vote_weights(&self, variants: &[Variant], transform_weights: Option<&[f32]>) -> Vec<f32> {
        let mut weights: Vec<f32> = variants.iter().map(|v| v.weight).collect();
        if self.config.crop_weighting == CropWeighting::InteriorEmphasis {
            normalize_weights(&mut weights);
        }
        if let Some(tw) = transform_weights.filter(|tw| tw.len() == weights.len()) {
            for (w, t) in weights.iter_mut().zip(tw) {
                *w *= t;
            }
        }
        weights
    }

    /// Tune on `tune` if given, evaluate on `test`, and write the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the slice counts of the two sets differ, the
    /// per-slice parameters do not fit, or any step fails.
    pub fn run(&mut self, test: &SliceSet, tune: Option<&SliceSet>) -> Result<Report> {
        self.config.slices.validate(test.num_slices())?;
        if let Some(tune) = tune {
            if tune.num_slices() != test.num_slices() {
                return Err(Error::invalid_parameter(
                    "tune",
                    format!(
                        "{} tuning slice(s) for {} test slice(s)",
                        tune.num_slices(),
                        test.num_slices()
                    ),
                ));
            }
        }

        let mut log = ReportLog::open(self.config.log_file.as_ref())?;
        log.line(&format!(
            "Fixed Transforms: {}",
            self.config.transforms.is_fixed()
        ))?;

        let weights = match tune {
            Some(tune) => self.tune(tune)?,
            None => None,
        };
        match &weights {
            Some(w) => {
                let shown: Vec<String> = w.iter().map(|v| format!("{v:.4}")).collect();
                log.line(&format!("Weights: [{}]", shown.join(" ")))?;
            }
            None => log.line("Weights: None")?,
        }

        let report = self.evaluate(test, weights.as_deref())?;
        log.line("Done")?;
        for line in report.to_string().lines() {
            log.line(line)?;
        }
        log.finish()?;

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::LabeledList;
    use ndarray::{Array3, ArrayD, ArrayView4};
    use std::path::Path;

    /// Class 0 for dark images, class 1 for bright ones.
    struct Brightness;

    impl Network for Brightness {
        fn forward(&mut self, batch: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
            let n = batch.dim().0;
            let mut out = Array2::<f32>::zeros((n, 2));
            for (i, item) in batch.axis_iter(Axis(0)).enumerate() {
                let mean = item.mean().unwrap_or(0.0);
                let bright = if mean > 0.5 { 0.8 } else { 0.2 };
                out[[i, 0]] = 1.0 - bright;
                out[[i, 1]] = bright;
            }
            Ok(out.into_dyn())
        }
    }

    fn write_page(dir: &Path, name: &str, value: u8) -> PathBuf {
        let path = dir.join(name);
        image::save_raster(&Array3::from_elem((8, 8, 1), value), &path).unwrap();
        path
    }

    fn dataset(dir: &Path) -> SliceSet {
        write_page(dir, "dark.png", 20);
        write_page(dir, "bright.png", 230);
        write_page(dir, "dim.png", 100);
        let list = LabeledList::parse(
            "dark.png 0\nbright.png 1\ndim.png 1\n",
            &dir.join("list.txt"),
        )
        .unwrap();
        SliceSet::from_lists(vec![list])
    }

    fn config() -> ClassifyConfig {
        ClassifyConfig {
            slices: SliceParams::parse("0", "0.00392", "1", ":").unwrap(),
            batch_size: 2,
            ..ClassifyConfig::default()
        }
    }

    #[test]
    fn test_evaluate_counts() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(dir.path());
        let mut classifier = Classifier::new(config(), Brightness).unwrap();
        let report = classifier.evaluate(&data, None).unwrap();

        assert_eq!(report.total, 3);
        assert_eq!(report.correct, 2);
        assert_eq!(report.confusion, ndarray::array![[1usize, 0], [1, 1]]);
        assert_eq!(report.transform_correct, vec![2]);
        assert!((report.accuracy() - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_prepare_stacks_slices() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_page(dir.path(), "a.png", 10);
        let b = write_page(dir.path(), "b.png", 20);
        let entries = [
            &crate::dataset::LabeledEntry { path: a, label: 0 },
            &crate::dataset::LabeledEntry { path: b, label: 0 },
        ];
        let record = Record {
            label: 0,
            entries: &entries,
        };

        let config = ClassifyConfig {
            transforms: TransformSet::parse("none\nmirror h").unwrap(),
            slices: SliceParams::parse("0", "1", "1", ":").unwrap(),
            ..ClassifyConfig::default()
        };
        let mut classifier = Classifier::new(config, Brightness).unwrap();
        let variants = classifier.prepare(record).unwrap();

        assert_eq!(variants.len(), 2);
        assert_eq!(variants[0].image.dim(), (8, 8, 2));
        assert_eq!(variants[0].image[[0, 0, 0]], 10.0);
        assert_eq!(variants[0].image[[0, 0, 1]], 20.0);
    }

    #[test]
    fn test_tuning_skipped_for_dense_crops() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(dir.path());
        let config = ClassifyConfig {
            transforms: TransformSet::parse("densecrop 4 4 4 4").unwrap(),
            ..config()
        };
        let mut classifier = Classifier::new(config, Brightness).unwrap();
        assert_eq!(classifier.tune(&data).unwrap(), None);
    }

    #[test]
    fn test_hard_tuning_weights() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(dir.path());
        let config = ClassifyConfig {
            transforms: TransformSet::parse("none\nmirror v").unwrap(),
            vote_mode: VoteMode::Hard,
            ..config()
        };
        let mut classifier = Classifier::new(config, Brightness).unwrap();
        let weights = classifier.tune(&data).unwrap().unwrap();

        assert_eq!(weights.len(), 2);
        assert!(weights.iter().all(|&w| (w - 2.0 / 3.0).abs() < 1e-6));
    }

    #[test]
    fn test_run_writes_log() {
        let dir = tempfile::tempdir().unwrap();
        let data = dataset(dir.path());
        let log_path = dir.path().join("report.log");
        let config = ClassifyConfig {
            log_file: Some(log_path.clone()),
            ..config()
        };
        let mut classifier = Classifier::new(config, Brightness).unwrap();
        let report = classifier.run(&data, Some(&data)).unwrap();
        assert_eq!(report.total, 3);

        let log = std::fs::read_to_string(log_path).unwrap();
        assert!(log.contains("Correct/Total:"));
        assert!(log.contains(" 2/3"));
        assert!(log.contains("Overall Accuracy: 0.666667"));
    }

    #[test]
    fn test_label_outside_classes() {
        let dir = tempfile::tempdir().unwrap();
        write_page(dir.path(), "x.png", 20);
        let list = LabeledList::parse("x.png 5\n", &dir.path().join("l.txt")).unwrap();
        let data = SliceSet::from_lists(vec![list]);

        let mut classifier = Classifier::new(config(), Brightness).unwrap();
        assert!(matches!(
            classifier.evaluate(&data, None),
            Err(Error::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_batch() {
        let config = ClassifyConfig {
            batch_size: 0,
            ..ClassifyConfig::default()
        };
        assert!(Classifier::new(config, Brightness).is_err());
    }
}
