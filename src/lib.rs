//! Garbage detection benchmark
//!
//! This library prepares the TrashNet and TACO litter datasets in YOLO format,
//! builds cross-validation folds, and evaluates a pretrained YOLOv8 baseline on
//! both.

pub mod coco;
pub mod config;
pub mod conversion;
pub mod dataset;
pub mod error;
pub mod evaluate;
pub mod io;
pub mod manifest;
pub mod mapping;
pub mod model;
pub mod pipeline;
pub mod preprocess;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use config::{Args, Dataset, ModelSize, PipelineConfig};
pub use dataset::{assign_folds, split_samples, validate_split_ratios, FoldAssignment, SplitRatios};
pub use error::{PipelineError, Result};
pub use evaluate::{Evaluator, Metrics, MetricsRecord};
pub use manifest::DatasetManifest;
pub use mapping::CategoryMapping;
pub use model::{
    BaselineModel, ConfusionMatrix, DetectionBackend, DetectionModel, DetectionResults,
    UltralyticsBackend, ValidationReport,
};
pub use preprocess::{DatasetPreprocessor, PreparedDataset};
pub use types::{Sample, Split, SplitData, YoloBox};
