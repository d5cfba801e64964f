//! doctile CLI - tiled and augmented inference for document images.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use doctile::dataset::SliceSet;
use doctile::preprocess::SliceParams;
use doctile::{
    eval, image, BinarizeConfig, Binarizer, ClassifyConfig, Classifier, CropWeighting, Device,
    Inverter, ModelConfig, OrtNetwork, TileConfig, TransformSet, VoteMode,
};

/// Run document-image networks over whole pages.
#[derive(Parser, Debug)]
#[command(name = "doctile")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Binarize a page, writing <OUT_PREFIX>_pred.png and <OUT_PREFIX>_raw.png.
    Binarize {
        #[command(flatten)]
        model: ModelArgs,

        /// Input image path.
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Prefix for the output images.
        #[arg(value_name = "OUT_PREFIX")]
        out_prefix: PathBuf,

        #[command(flatten)]
        tiles: TileArgs,

        /// Foreground probability threshold.
        #[arg(long, default_value = "0.5", value_name = "FLOAT")]
        threshold: f32,
    },

    /// Render a page through an image-to-image network with outputs in [-1, 1].
    Invert {
        #[command(flatten)]
        model: ModelArgs,

        /// Input image path.
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Output image path.
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,

        #[command(flatten)]
        tiles: TileArgs,
    },

    /// Classify labeled images with test-time augmentation.
    Classify(ClassifyArgs),

    /// Score a directory of binarized images against ground truth.
    Eval {
        /// Directory of predicted binary images.
        #[arg(value_name = "PREDICT_DIR")]
        predict_dir: PathBuf,

        /// Directory of ground-truth images and their weight files.
        #[arg(value_name = "GT_DIR")]
        gt_dir: PathBuf,

        /// Per-image metrics file.
        #[arg(value_name = "OUT_FILE")]
        out_file: PathBuf,

        /// Averaged metrics file.
        #[arg(value_name = "SUMMARY_FILE")]
        summary_file: PathBuf,
    },

    /// Colour-code the agreement of two binary images.
    Diff {
        /// First binary image.
        #[arg(value_name = "FIRST")]
        first: PathBuf,

        /// Second binary image.
        #[arg(value_name = "SECOND")]
        second: PathBuf,

        /// Output image path.
        #[arg(value_name = "OUTPUT")]
        output: PathBuf,
    },
}

#[derive(ClapArgs, Debug)]
struct ModelArgs {
    /// ONNX model path.
    #[arg(value_name = "MODEL")]
    model: PathBuf,

    /// Name of the network's image input.
    #[arg(long, default_value = "data", value_name = "NAME")]
    input_name: String,

    /// Name of the network output to read.
    #[arg(long, default_value = "prob", value_name = "NAME")]
    output_name: String,

    /// GPU device to run on. Negative or absent selects the CPU.
    #[arg(long, value_name = "INT", allow_negative_numbers = true)]
    gpu: Option<i32>,
}

impl ModelArgs {
    fn load(&self) -> Result<OrtNetwork> {
        let config = ModelConfig::new(&self.model, &self.input_name, &self.output_name)
            .with_device(Device::from_gpu_index(self.gpu));
        OrtNetwork::load(&config).context("Failed to load network")
    }
}

#[derive(ClapArgs, Debug)]
struct TileArgs {
    /// Tile edge length in pixels.
    #[arg(long, default_value = "512", value_name = "INT")]
    tile_size: usize,

    /// Overlap discarded on each side of interior tiles.
    #[arg(long, default_value = "6", value_name = "INT")]
    padding: usize,

    /// Tiles per forward pass.
    #[arg(short, long, default_value = "1", value_name = "INT")]
    batch_size: usize,
}

impl TileArgs {
    fn config(&self) -> TileConfig {
        TileConfig {
            tile_size: self.tile_size,
            padding: self.padding,
            batch_size: self.batch_size,
            ..TileConfig::default()
        }
    }
}

#[derive(ClapArgs, Debug)]
struct ClassifyArgs {
    #[command(flatten)]
    model: ModelArgs,

    /// Labeled list files, one per slice, separated with ';'.
    #[arg(value_name = "TEST_LISTS", value_delimiter = ';', required = true)]
    test_lists: Vec<PathBuf>,

    /// Tune transform weights on these list files, separated with ';'.
    #[arg(short = 'l', long, value_name = "LISTS", value_delimiter = ';')]
    tune_lists: Vec<PathBuf>,

    /// File of transform pipelines, one per line.
    #[arg(short, long, value_name = "FILE")]
    transform_file: Option<PathBuf>,

    /// Per-slice means, e.g. 127:182,192,112.
    #[arg(short, long, default_value = "", value_name = "LIST")]
    means: String,

    /// Per-slice scale factors.
    #[arg(short = 'a', long, default_value = "0.00392156862745098", value_name = "LIST")]
    scales: String,

    /// Per-slice channel counts (3 for colour, anything else gray).
    #[arg(short, long, default_value = "0", value_name = "LIST")]
    channels: String,

    /// Separator between per-slice parameters.
    #[arg(short, long, default_value = ":", value_name = "STR")]
    delimiter: String,

    /// Tune with hard votes instead of true-label probabilities.
    #[arg(short = 'z', long)]
    hard_weights: bool,

    /// Weigh interior dense crops twice as much as edge crops.
    #[arg(long)]
    interior_weighting: bool,

    /// Variants per forward pass.
    #[arg(short, long, default_value = "64", value_name = "INT")]
    batch_size: usize,

    /// Stop after this many images.
    #[arg(long, default_value = "40000", value_name = "INT")]
    max_images: usize,

    /// Log progress every this many images.
    #[arg(long, default_value = "1000", value_name = "INT")]
    print_count: usize,

    /// Seed for random crops.
    #[arg(long, default_value = "0", value_name = "INT")]
    seed: u64,

    /// Also write the report to this file.
    #[arg(short = 'f', long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Usage goes to stdout, and every usage error exits with 1.
            print!("{}", err.render());
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Initialize logging
    let log_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("doctile={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    if let Err(err) = run(args.command) {
        tracing::error!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn require_file(path: &Path) -> Result<()> {
    if !path.exists() {
        anyhow::bail!("Input file does not exist: {}", path.display());
    }
    Ok(())
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Binarize {
            model,
            input,
            out_prefix,
            tiles,
            threshold,
        } => {
            require_file(&input)?;
            let config = BinarizeConfig {
                tiles: tiles.config(),
                threshold,
            };
            let mut binarizer =
                Binarizer::new(config, model.load()?).context("Failed to set up binarizer")?;
            let (pred, raw) = binarizer
                .process(&input, &out_prefix)
                .context("Failed to binarize image")?;
            println!("Wrote {} and {}", pred.display(), raw.display());
        }

        Command::Invert {
            model,
            input,
            output,
            tiles,
        } => {
            require_file(&input)?;
            let mut inverter =
                Inverter::new(tiles.config(), model.load()?).context("Failed to set up inverter")?;
            inverter
                .process(&input, &output)
                .context("Failed to invert image")?;
            println!("Successfully processed {} -> {}", input.display(), output.display());
        }

        Command::Classify(args) => classify(args)?,

        Command::Eval {
            predict_dir,
            gt_dir,
            out_file,
            summary_file,
        } => {
            let results = eval::evaluate_dir(&predict_dir, &gt_dir, &out_file, &summary_file)
                .context("Failed to evaluate predictions")?;
            println!(
                "Evaluated {} image(s); summary in {}",
                results.len(),
                summary_file.display()
            );
        }

        Command::Diff {
            first,
            second,
            output,
        } => {
            let a = image::load_binary(&first).context("Failed to load first image")?;
            let b = image::load_binary(&second).context("Failed to load second image")?;
            let diff = eval::binary_diff(&a, &b).context("Failed to compare images")?;
            image::save_raster(&diff, &output).context("Failed to save diff")?;
        }
    }

    Ok(())
}

fn classify(args: ClassifyArgs) -> Result<()> {
    let transforms = match &args.transform_file {
        Some(path) => TransformSet::from_file(path).context("Failed to read transforms")?,
        None => TransformSet::default(),
    };
    let slices = SliceParams::parse(&args.means, &args.scales, &args.channels, &args.delimiter)
        .context("Failed to parse slice parameters")?;

    let config = ClassifyConfig {
        batch_size: args.batch_size,
        max_images: args.max_images,
        print_count: args.print_count,
        transforms,
        slices,
        vote_mode: if args.hard_weights {
            VoteMode::Hard
        } else {
            VoteMode::Soft
        },
        crop_weighting: if args.interior_weighting {
            CropWeighting::InteriorEmphasis
        } else {
            CropWeighting::Uniform
        },
        seed: args.seed,
        log_file: args.log_file,
    };

    let test = SliceSet::open(&args.test_lists).context("Failed to open test lists")?;
    let tune = if args.tune_lists.is_empty() {
        None
    } else {
        Some(SliceSet::open(&args.tune_lists).context("Failed to open tuning lists")?)
    };

    let mut classifier =
        Classifier::new(config, args.model.load()?).context("Failed to set up classifier")?;
    let report = classifier
        .run(&test, tune.as_ref())
        .context("Classification failed")?;

    println!("{report}");
    Ok(())
}
