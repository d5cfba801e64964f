//! End-to-end runs of the public tools with stand-in networks.

use std::path::Path;

use ndarray::{Array2, Array3, ArrayD, ArrayView4, Axis};

use doctile::dataset::SliceSet;
use doctile::preprocess::SliceParams;
use doctile::{
    eval, image, BinarizeConfig, Binarizer, ClassifyConfig, Classifier, CropWeighting, Network,
    TileConfig, TransformSet,
};

/// Foreground wherever the shifted first channel is negative.
struct DarkIsInk;

impl Network for DarkIsInk {
    fn forward(&mut self, batch: ArrayView4<'_, f32>) -> doctile::Result<ArrayD<f32>> {
        let first = batch.index_axis(Axis(1), 0);
        let probs = first.mapv(|v| if v < 0.0 { 1.0 } else { 0.0 });
        Ok(probs.insert_axis(Axis(1)).into_dyn())
    }
}

/// Two classes: dark then bright, by mean sample value.
struct Brightness;

impl Network for Brightness {
    fn forward(&mut self, batch: ArrayView4<'_, f32>) -> doctile::Result<ArrayD<f32>> {
        let n = batch.dim().0;
        let mut out = Array2::<f32>::zeros((n, 2));
        for (i, item) in batch.axis_iter(Axis(0)).enumerate() {
            let bright = if item.mean().unwrap_or(0.0) > 0.5 { 0.9 } else { 0.1 };
            out[[i, 0]] = 1.0 - bright;
            out[[i, 1]] = bright;
        }
        Ok(out.into_dyn())
    }
}

fn is_ink(y: usize, x: usize) -> bool {
    (10..30).contains(&y) && (15..60).contains(&x)
}

fn write_weights(path: &Path, count: usize) {
    std::fs::write(path, vec!["1"; count].join(" ")).unwrap();
}

#[test]
fn test_binarize_then_evaluate() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("page.png");
    let page = Array3::from_shape_fn((50, 70, 3), |(y, x, _)| if is_ink(y, x) { 5u8 } else { 250 });
    image::save_raster(&page, &input).unwrap();

    let config = BinarizeConfig {
        tiles: TileConfig {
            tile_size: 24,
            padding: 3,
            batch_size: 4,
            ..TileConfig::default()
        },
        ..BinarizeConfig::default()
    };
    let mut binarizer = Binarizer::new(config, DarkIsInk).unwrap();
    let (pred_path, raw_path) = binarizer.process(&input, dir.path().join("out")).unwrap();
    assert!(raw_path.exists());

    let pred = image::load_binary(&pred_path).unwrap();
    assert_eq!(pred.dim(), (50, 70));
    assert_eq!(pred[[20, 30]], 0);
    assert_eq!(pred[[0, 0]], 255);

    let pred_dir = dir.path().join("pred");
    let gt_dir = dir.path().join("gt");
    std::fs::create_dir_all(&pred_dir).unwrap();
    std::fs::create_dir_all(&gt_dir).unwrap();
    std::fs::copy(&pred_path, pred_dir.join("page.png")).unwrap();
    let truth = Array2::from_shape_fn((50, 70), |(y, x)| if is_ink(y, x) { 0u8 } else { 255 });
    image::save_gray(&truth, gt_dir.join("page.png")).unwrap();
    write_weights(&gt_dir.join("page_RWeights.dat"), 50 * 70);
    write_weights(&gt_dir.join("page_PWeights.dat"), 50 * 70);

    let results = eval::evaluate_dir(
        &pred_dir,
        &gt_dir,
        &dir.path().join("metrics.txt"),
        &dir.path().join("summary.txt"),
    )
    .unwrap();
    assert_eq!(results.len(), 1);
    assert!((results[0].1.accuracy - 100.0).abs() < 1e-9);
    assert!(results[0].1.drd.abs() < 1e-12);

    let diff = eval::binary_diff(&pred, &truth).unwrap();
    assert_eq!(diff.dim(), (50, 70, 3));
    assert!(diff.iter().all(|&v| v == 0 || v == 255));
}

#[test]
fn test_classify_from_list_files() {
    let dir = tempfile::tempdir().unwrap();
    for (name, value) in [("dark.png", 30u8), ("bright.png", 220), ("grey.png", 200)] {
        image::save_raster(&Array3::from_elem((12, 12, 1), value), dir.path().join(name)).unwrap();
    }
    let list = dir.path().join("test.txt");
    std::fs::write(&list, "dark.png 0\nbright.png 1\ngrey.png 1\n").unwrap();
    let transforms = dir.path().join("transforms.txt");
    std::fs::write(&transforms, "# crops and flips\nnone\n\nmirror h\n").unwrap();

    let data = SliceSet::open(&[list]).unwrap();
    let config = ClassifyConfig {
        transforms: TransformSet::from_file(&transforms).unwrap(),
        slices: SliceParams::parse("", "0.00392", "1", ":").unwrap(),
        batch_size: 3,
        ..ClassifyConfig::default()
    };
    let mut classifier = Classifier::new(config, Brightness).unwrap();
    let report = classifier.run(&data, Some(&data)).unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.correct, 3);
    assert_eq!(report.transform_correct, vec![3, 3]);
    assert!((report.accuracy() - 1.0).abs() < 1e-12);
}

#[test]
fn test_classify_with_dense_crops() {
    let dir = tempfile::tempdir().unwrap();
    image::save_raster(&Array3::from_elem((16, 16, 1), 240u8), dir.path().join("a.png")).unwrap();
    let list = dir.path().join("test.txt");
    std::fs::write(&list, "a.png 1\n").unwrap();

    let config = ClassifyConfig {
        transforms: TransformSet::parse("densecrop 8 8 4 4\nresize 8 8").unwrap(),
        slices: SliceParams::parse("", "0.00392", "1", ":").unwrap(),
        crop_weighting: CropWeighting::InteriorEmphasis,
        ..ClassifyConfig::default()
    };
    let mut classifier = Classifier::new(config, Brightness).unwrap();
    let data = SliceSet::open(&[list]).unwrap();
    let report = classifier.run(&data, None).unwrap();

    assert_eq!(report.correct, 1);
    assert!(report.transform_correct.iter().all(|&c| c == 0));
}
