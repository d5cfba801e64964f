//! Binarization evaluation against ground truth.

mod diff;
mod metrics;

pub use diff::binary_diff;
pub use metrics::{
    accuracy, drd, evaluate, f_measure, load_weights, pseudo_f_measure, psnr, BinaryMetrics,
};

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::image;

/// Evaluate one prediction against `<gt_dir>/<name>`, reading
/// `<stem>_RWeights.dat` and `<stem>_PWeights.dat` from `gt_dir`.
///
/// # Errors
///
/// Returns an error if any file is missing or malformed, or the sizes
/// disagree.
pub fn evaluate_file(predicted: &Path, gt_dir: &Path) -> Result<BinaryMetrics> {
    let name = predicted
        .file_name()
        .ok_or_else(|| Error::invalid_parameter("predicted", "path has no file name"))?;
    let stem = predicted
        .file_stem()
        .map_or_else(String::new, |s| s.to_string_lossy().into_owned());

    let pred = image::load_binary(predicted)?;
    let truth = image::load_binary(gt_dir.join(name))?;
    let recall_weights = load_weights(&gt_dir.join(format!("{stem}_RWeights.dat")), truth.dim())?;
    let precision_weights =
        load_weights(&gt_dir.join(format!("{stem}_PWeights.dat")), truth.dim())?;

    evaluate(&pred, &truth, &recall_weights, &precision_weights)
}

/// Evaluate every file in `predict_dir`, in name order.
///
/// Writes one `<name>  <metrics>` line per file to `out_file` and the
/// average as `avg:  <metrics>` to `summary_file`. Returns the per-file
/// results.
///
/// # Errors
///
/// Returns [`Error::InvalidParameter`] if the directory holds no files, or
/// the first evaluation or write error.
pub fn evaluate_dir(
    predict_dir: &Path,
    gt_dir: &Path,
    out_file: &Path,
    summary_file: &Path,
) -> Result<Vec<(String, BinaryMetrics)>> {
    let mut names: Vec<String> = std::fs::read_dir(predict_dir)?
        .filter_map(std::result::Result::ok)
        .filter(|e| e.path().is_file())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    if names.is_empty() {
        return Err(Error::invalid_parameter(
            "predict_dir",
            format!("no files in {}", predict_dir.display()),
        ));
    }

    let mut out = BufWriter::new(File::create(out_file)?);
    let mut results = Vec::with_capacity(names.len());
    for name in names {
        tracing::info!("{name}");
        let metrics = evaluate_file(&predict_dir.join(&name), gt_dir)?;
        writeln!(out, "{name}  {}", metrics.format_row())?;
        results.push((name, metrics));
    }
    out.flush()?;

    let all: Vec<BinaryMetrics> = results.iter().map(|(_, m)| *m).collect();
    let mut summary = File::create(summary_file)?;
    writeln!(summary, "avg:  {}", BinaryMetrics::mean(&all).format_row())?;

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn write_case(pred_dir: &Path, gt_dir: &Path, name: &str, flip: bool) {
        let gt = Array2::from_shape_fn((8, 8), |(y, _)| if y < 4 { 0u8 } else { 255 });
        let mut pred = gt.clone();
        if flip {
            pred[[7, 7]] = 0;
        }
        image::save_gray(&gt, gt_dir.join(name)).unwrap();
        image::save_gray(&pred, pred_dir.join(name)).unwrap();

        let stem = Path::new(name).file_stem().unwrap().to_string_lossy().into_owned();
        let ones = vec!["1"; 64].join(" ");
        let zeros = vec!["0"; 64].join(" ");
        std::fs::write(gt_dir.join(format!("{stem}_RWeights.dat")), ones).unwrap();
        std::fs::write(gt_dir.join(format!("{stem}_PWeights.dat")), zeros).unwrap();
    }

    #[test]
    fn test_evaluate_dir_writes_reports() {
        let root = tempfile::tempdir().unwrap();
        let pred_dir = root.path().join("pred");
        let gt_dir = root.path().join("gt");
        std::fs::create_dir_all(&pred_dir).unwrap();
        std::fs::create_dir_all(&gt_dir).unwrap();
        write_case(&pred_dir, &gt_dir, "b.png", true);
        write_case(&pred_dir, &gt_dir, "a.png", false);

        let out = root.path().join("out.txt");
        let summary = root.path().join("summary.txt");
        let results = evaluate_dir(&pred_dir, &gt_dir, &out, &summary).unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "a.png");
        assert!((results[0].1.accuracy - 100.0).abs() < 1e-9);
        assert!(results[1].1.accuracy < 100.0);

        let lines = std::fs::read_to_string(out).unwrap();
        assert!(lines.starts_with("a.png  "));
        assert_eq!(lines.lines().count(), 2);
        let avg = std::fs::read_to_string(summary).unwrap();
        assert!(avg.starts_with("avg:  "));
    }

    #[test]
    fn test_empty_directory() {
        let root = tempfile::tempdir().unwrap();
        let err = evaluate_dir(
            root.path(),
            root.path(),
            &root.path().join("o"),
            &root.path().join("s"),
        );
        assert!(matches!(err, Err(Error::InvalidParameter { .. })));
    }

    #[test]
    fn test_missing_weights() {
        let root = tempfile::tempdir().unwrap();
        let gt = Array2::from_elem((4, 4), 255u8);
        image::save_gray(&gt, root.path().join("x.png")).unwrap();
        assert!(matches!(
            evaluate_file(&root.path().join("x.png"), root.path()),
            Err(Error::DataSource { .. })
        ));
    }
}
