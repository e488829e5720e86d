//! Pretrained YOLOv8 baseline, evaluated without any training.
//!
//! The detector itself lives in the Ultralytics Python package. Everything past
//! this module sees it only through [`DetectionBackend`], [`DetectionModel`] and
//! [`DetectionResults`].

use log::{error, info};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use crate::config::{ModelSize, PipelineConfig};
use crate::error::{PipelineError, Result};
use crate::types::Split;
use crate::utils::{ensure_directory, read_and_parse_json};

const BRIDGE_SCRIPT: &str = include_str!("bridge.py");
const BRIDGE_EXIT_LOAD: i32 = 3;

/// Report file the bridge writes next to the prediction artifacts.
pub const VALIDATION_REPORT_FILE: &str = "val_report.json";

/// Per-class confusion matrix with the class names indexing its rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub matrix: Vec<Vec<f64>>,
    pub names: BTreeMap<usize, String>,
}

/// What the evaluator needs from a validation run.
pub trait DetectionResults {
    /// mAP at IoU 0.50.
    fn map50(&self) -> Option<f64>;
    /// mAP averaged over IoU 0.50..0.95.
    fn map50_95(&self) -> Option<f64>;
    fn mean_precision(&self) -> Option<f64>;
    fn mean_recall(&self) -> Option<f64>;
    fn confusion_matrix(&self) -> Option<ConfusionMatrix> {
        None
    }
}

pub trait DetectionModel {
    fn name(&self) -> &str;

    /// Inference-only evaluation of `split` of the dataset described by `manifest`.
    fn predict(&self, manifest: &Path, split: Split) -> Result<Box<dyn DetectionResults>>;
}

pub trait DetectionBackend {
    fn load(&self, size: ModelSize) -> Result<Box<dyn DetectionModel>>;
}

/// Baseline model handle: a loaded detector plus the size it was loaded at.
pub struct BaselineModel {
    size: ModelSize,
    inner: Box<dyn DetectionModel>,
}

impl BaselineModel {
    pub fn load(backend: &dyn DetectionBackend, size: ModelSize) -> Result<Self> {
        info!(
            "Loading pretrained YOLOv8 model: {} ({})",
            size.weights_name(),
            size.description()
        );
        match backend.load(size) {
            Ok(inner) => {
                info!("Model loaded successfully");
                Ok(Self { size, inner })
            }
            Err(e) => {
                error!("Error loading model: {}", e);
                Err(e)
            }
        }
    }

    pub fn size(&self) -> ModelSize {
        self.size
    }

    pub fn predict(&self, manifest: &Path, split: Split) -> Result<Box<dyn DetectionResults>> {
        let dataset = dataset_name(manifest);
        info!(
            "Running {} predictions on {} {} set",
            self.size().weights_name(),
            dataset,
            split
        );
        match self.inner.predict(manifest, split) {
            Ok(results) => {
                info!("Predictions completed for {} {} set", dataset, split);
                Ok(results)
            }
            Err(e) => {
                error!("Error during prediction: {}", e);
                Err(e)
            }
        }
    }
}

/// Dataset name of a manifest: the name of the directory holding it.
pub fn dataset_name(manifest: &Path) -> String {
    manifest
        .parent()
        .and_then(|p| p.file_name())
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".to_string())
}

/// Metrics as reported by the Ultralytics validator (`results.box.*`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    #[serde(default)]
    pub map50: Option<f64>,
    #[serde(default)]
    pub map: Option<f64>,
    #[serde(default)]
    pub mp: Option<f64>,
    #[serde(default)]
    pub mr: Option<f64>,
    #[serde(default)]
    pub names: BTreeMap<usize, String>,
    #[serde(default)]
    pub confusion_matrix: Option<Vec<Vec<f64>>>,
}

impl DetectionResults for ValidationReport {
    fn map50(&self) -> Option<f64> {
        self.map50
    }

    fn map50_95(&self) -> Option<f64> {
        self.map
    }

    fn mean_precision(&self) -> Option<f64> {
        self.mp
    }

    fn mean_recall(&self) -> Option<f64> {
        self.mr
    }

    fn confusion_matrix(&self) -> Option<ConfusionMatrix> {
        self.confusion_matrix.as_ref().map(|matrix| ConfusionMatrix {
            matrix: matrix.clone(),
            names: self.names.clone(),
        })
    }
}

/// Validation settings shared by every model the backend loads.
#[derive(Debug, Clone)]
struct ValSettings {
    python: PathBuf,
    project: PathBuf,
    img_size: u32,
    batch: u32,
}

impl ValSettings {
    fn run_bridge(&self, args: &[String]) -> std::io::Result<Output> {
        Command::new(&self.python)
            .arg("-c")
            .arg(BRIDGE_SCRIPT)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
    }
}

fn stderr_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let message = stderr.trim();
    if message.is_empty() {
        format!("bridge exited with {}", output.status)
    } else {
        message.lines().last().unwrap_or(message).to_string()
    }
}

/// Drives Ultralytics through a Python subprocess.
#[derive(Debug, Clone)]
pub struct UltralyticsBackend {
    settings: ValSettings,
}

impl UltralyticsBackend {
    pub fn new(python: impl Into<PathBuf>, project: impl Into<PathBuf>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            settings: ValSettings {
                python: python.into(),
                project: project.into(),
                img_size: defaults.img_size,
                batch: defaults.batch,
            },
        }
    }

    /// Backend writing prediction artifacts under the baseline results directory.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            settings: ValSettings {
                python: config.python.clone(),
                project: config.baseline_results_dir(),
                img_size: config.img_size,
                batch: config.batch,
            },
        }
    }
}

impl DetectionBackend for UltralyticsBackend {
    fn load(&self, size: ModelSize) -> Result<Box<dyn DetectionModel>> {
        let weights = size.weights_name();
        let load_error = |msg: String| PipelineError::ModelLoad {
            model: weights.clone(),
            msg,
        };

        let output = self
            .settings
            .run_bridge(&["load".to_string(), weights.clone()])
            .map_err(|e| {
                load_error(format!(
                    "cannot run {}: {}",
                    self.settings.python.display(),
                    e
                ))
            })?;
        if !output.status.success() {
            return Err(load_error(stderr_message(&output)));
        }

        Ok(Box::new(UltralyticsModel {
            weights,
            settings: self.settings.clone(),
        }))
    }
}

pub struct UltralyticsModel {
    weights: String,
    settings: ValSettings,
}

impl DetectionModel for UltralyticsModel {
    fn name(&self) -> &str {
        &self.weights
    }

    fn predict(&self, manifest: &Path, split: Split) -> Result<Box<dyn DetectionResults>> {
        let dataset = dataset_name(manifest);
        let prediction_error = |msg: String| PipelineError::Prediction {
            dataset: dataset.clone(),
            msg,
        };

        let results_dir = self.settings.project.join(&dataset);
        ensure_directory(&results_dir)?;
        let report_path = results_dir.join(VALIDATION_REPORT_FILE);
        if report_path.exists() {
            fs::remove_file(&report_path).map_err(|e| PipelineError::io(&report_path, e))?;
        }

        let args = vec![
            "val".to_string(),
            self.weights.clone(),
            manifest.to_string_lossy().into_owned(),
            split.to_string(),
            self.settings.img_size.to_string(),
            self.settings.batch.to_string(),
            self.settings.project.to_string_lossy().into_owned(),
            dataset.clone(),
            report_path.to_string_lossy().into_owned(),
        ];
        let output = self.settings.run_bridge(&args).map_err(|e| {
            prediction_error(format!(
                "cannot run {}: {}",
                self.settings.python.display(),
                e
            ))
        })?;

        match output.status.code() {
            Some(0) => {}
            Some(BRIDGE_EXIT_LOAD) => {
                return Err(PipelineError::ModelLoad {
                    model: self.weights.clone(),
                    msg: stderr_message(&output),
                })
            }
            _ => return Err(prediction_error(stderr_message(&output))),
        }

        let report: ValidationReport = read_and_parse_json(&report_path)
            .map_err(|e| prediction_error(format!("unreadable validation report: {}", e)))?;
        Ok(Box::new(report))
    }
}
