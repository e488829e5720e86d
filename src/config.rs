use clap::{Parser, ValueEnum};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::PipelineError;
use crate::types::Split;

/// YOLOv8 input resolution used for manifests and validation.
pub const IMG_SIZE: u32 = 640;

pub const TRAIN_RATIO: f64 = 0.7;
pub const VAL_RATIO: f64 = 0.15;
pub const TEST_RATIO: f64 = 0.15;

pub const CV_FOLDS: usize = 3;
pub const RANDOM_STATE: u64 = 42;

// Detection thresholds for inference runs. Baseline validation keeps the
// Ultralytics defaults so its mAP covers the whole precision/recall curve.
pub const CONF_THRESHOLD: f64 = 0.25;
pub const IOU_THRESHOLD: f64 = 0.5;
pub const VAL_BATCH: u32 = 16;

pub const TRASHNET_CLASSES: &[&str] = &["cardboard", "glass", "metal", "paper", "plastic", "trash"];

pub const TACO_CLASSES: &[&str] = &[
    "Aluminium foil",
    "Bottle cap",
    "Bottle",
    "Broken glass",
    "Can",
    "Carton",
    "Cigarette",
    "Cup",
    "Lid",
    "Other litter",
    "Other plastic",
    "Paper",
    "Plastic bag - wrapper",
    "Plastic container",
    "Pop tab",
    "Straw",
    "Styrofoam piece",
    "Unlabeled litter",
];

/// TACO label to TrashNet label.
pub const CATEGORY_MAPPING: &[(&str, &str)] = &[
    ("Bottle", "plastic"),
    ("Plastic container", "plastic"),
    ("Plastic bag - wrapper", "plastic"),
    ("Other plastic", "plastic"),
    ("Can", "metal"),
    ("Bottle cap", "metal"),
    ("Pop tab", "metal"),
    ("Aluminium foil", "metal"),
    ("Broken glass", "glass"),
    ("Paper", "paper"),
    ("Carton", "cardboard"),
    ("Cup", "trash"),
    ("Lid", "trash"),
    ("Other litter", "trash"),
    ("Cigarette", "trash"),
    ("Straw", "trash"),
    ("Styrofoam piece", "trash"),
    ("Unlabeled litter", "trash"),
];

/// Keys of a persisted metrics record, in file order.
pub const METRICS: &[&str] = &["mAP50", "mAP50-95", "precision", "recall"];

/// The two benchmark datasets, in evaluation order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dataset {
    TrashNet,
    Taco,
}

impl Dataset {
    pub const ALL: [Dataset; 2] = [Dataset::TrashNet, Dataset::Taco];

    pub fn name(self) -> &'static str {
        match self {
            Dataset::TrashNet => "trashnet",
            Dataset::Taco => "taco",
        }
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// YOLOv8 checkpoint size.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug, Default)]
pub enum ModelSize {
    /// nano (fastest, least accurate)
    #[default]
    N,
    S,
    M,
    L,
    /// extra large (slowest, most accurate)
    X,
}

impl ModelSize {
    pub fn tag(self) -> char {
        match self {
            ModelSize::N => 'n',
            ModelSize::S => 's',
            ModelSize::M => 'm',
            ModelSize::L => 'l',
            ModelSize::X => 'x',
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ModelSize::N => "nano",
            ModelSize::S => "small",
            ModelSize::M => "medium",
            ModelSize::L => "large",
            ModelSize::X => "xlarge",
        }
    }

    /// Pretrained checkpoint name understood by Ultralytics, e.g. `yolov8n.pt`.
    pub fn weights_name(self) -> String {
        format!("yolov8{}.pt", self.tag())
    }
}

impl FromStr for ModelSize {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "n" => Ok(ModelSize::N),
            "s" => Ok(ModelSize::S),
            "m" => Ok(ModelSize::M),
            "l" => Ok(ModelSize::L),
            "x" => Ok(ModelSize::X),
            other => Err(PipelineError::Config(format!(
                "unknown model size '{}', expected one of n, s, m, l, x",
                other
            ))),
        }
    }
}

/// Garbage detection benchmark: preprocess TrashNet and TACO, then evaluate a
/// pretrained YOLOv8 baseline on both.
#[derive(Parser, Debug, Clone)]
#[command(version, long_about = None)]
pub struct Args {
    /// Installation root holding data/, preprocessed_data/ and results/
    #[arg(long = "root", default_value = ".")]
    pub root: PathBuf,

    /// YOLOv8 model size used for the baseline
    #[arg(long = "model_size", value_enum, default_value = "n")]
    pub model_size: ModelSize,

    /// Dataset split evaluated by the baseline
    #[arg(long = "split", value_enum, default_value = "test")]
    pub split: Split,

    /// Python interpreter with the ultralytics package installed
    #[arg(long = "python", default_value = "python3")]
    pub python: PathBuf,

    /// Seed for shuffling splits and cross-validation folds
    #[arg(long = "seed", default_value_t = RANDOM_STATE)]
    pub seed: u64,

    /// Number of cross-validation folds
    #[arg(long = "folds", default_value_t = CV_FOLDS)]
    pub folds: usize,

    /// Proportion of each dataset used for training
    #[arg(long = "train_ratio", default_value_t = TRAIN_RATIO, value_parser = validate_size)]
    pub train_ratio: f64,

    /// Proportion of each dataset used for validation
    #[arg(long = "val_ratio", default_value_t = VAL_RATIO, value_parser = validate_size)]
    pub val_ratio: f64,

    /// Proportion of each dataset used for testing
    #[arg(long = "test_ratio", default_value_t = TEST_RATIO, value_parser = validate_size)]
    pub test_ratio: f64,

    /// Rerun preprocessing even if manifests already exist
    #[arg(long = "force_preprocess")]
    pub force_preprocess: bool,
}

// Validate that the size is between 0.0 and 1.0
fn validate_size(s: &str) -> Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("SIZE must be between 0.0 and 1.0".to_string()),
    }
}

/// Everything the pipeline needs, built once at start-up and passed by reference.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub root: PathBuf,
    pub img_size: u32,
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
    pub cv_folds: usize,
    pub seed: u64,
    pub model_size: ModelSize,
    pub split: Split,
    pub batch: u32,
    pub python: PathBuf,
    pub force_preprocess: bool,
}

impl PipelineConfig {
    /// Defaults rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            img_size: IMG_SIZE,
            train_ratio: TRAIN_RATIO,
            val_ratio: VAL_RATIO,
            test_ratio: TEST_RATIO,
            cv_folds: CV_FOLDS,
            seed: RANDOM_STATE,
            model_size: ModelSize::default(),
            split: Split::Test,
            batch: VAL_BATCH,
            python: PathBuf::from("python3"),
            force_preprocess: false,
        }
    }

    pub fn from_args(args: &Args) -> Self {
        Self {
            train_ratio: args.train_ratio,
            val_ratio: args.val_ratio,
            test_ratio: args.test_ratio,
            cv_folds: args.folds,
            seed: args.seed,
            model_size: args.model_size,
            split: args.split,
            python: args.python.clone(),
            force_preprocess: args.force_preprocess,
            ..Self::new(&args.root)
        }
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn trashnet_dir(&self) -> PathBuf {
        self.data_dir().join("data_trashnet")
    }

    pub fn taco_dir(&self) -> PathBuf {
        self.data_dir().join("data_taco")
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join("preprocessed_data")
    }

    pub fn dataset_output_dir(&self, dataset: Dataset) -> PathBuf {
        self.output_dir().join(dataset.name())
    }

    pub fn manifest_path(&self, dataset: Dataset) -> PathBuf {
        self.dataset_output_dir(dataset).join("dataset.yaml")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn baseline_results_dir(&self) -> PathBuf {
        self.results_dir().join("baseline")
    }

    pub fn trained_results_dir(&self) -> PathBuf {
        self.results_dir().join("trained")
    }

    pub fn augmented_results_dir(&self) -> PathBuf {
        self.results_dir().join("augmented")
    }

    /// Results directories created before evaluation starts.
    pub fn results_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.baseline_results_dir(),
            self.trained_results_dir(),
            self.augmented_results_dir(),
        ]
    }

    /// True when the sentinel manifest of the first dataset already exists.
    pub fn is_preprocessed(&self) -> bool {
        self.manifest_path(Dataset::ALL[0]).exists()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::new(Path::new("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_size() {
        assert!(validate_size("0.5").is_ok());
        assert!(validate_size("1.0").is_ok());
        assert!(validate_size("0.0").is_ok());
        assert!(validate_size("-0.1").is_err());
        assert!(validate_size("1.1").is_err());
        assert!(validate_size("abc").is_err());
    }

    #[test]
    fn test_args_defaults_match_constants() {
        let args = Args::parse_from(["litter-bench"]);
        let config = PipelineConfig::from_args(&args);
        assert_eq!(config.model_size, ModelSize::N);
        assert_eq!(config.split, Split::Test);
        assert_eq!(config.cv_folds, CV_FOLDS);
        assert_eq!(config.seed, RANDOM_STATE);
        assert_eq!(config.train_ratio, TRAIN_RATIO);
        assert_eq!(config.root, PathBuf::from("."));
    }

    #[test]
    fn test_model_size_from_tag() {
        assert_eq!("x".parse::<ModelSize>().unwrap(), ModelSize::X);
        assert_eq!(ModelSize::M.weights_name(), "yolov8m.pt");
        assert!(matches!(
            "q".parse::<ModelSize>(),
            Err(PipelineError::Config(_))
        ));
    }
}
