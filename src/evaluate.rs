//! Extraction and persistence of baseline detection metrics.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PipelineConfig;
use crate::error::{PipelineError, Result};
use crate::model::{ConfusionMatrix, DetectionResults};
use crate::utils::{ensure_directory, read_and_parse_json, write_json_pretty};

pub const METRICS_FILE: &str = "metrics.json";
pub const CONFUSION_MATRIX_FILE: &str = "confusion_matrix.json";

/// The four scalar detection metrics, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    #[serde(rename = "mAP50")]
    pub map50: f64,
    #[serde(rename = "mAP50-95")]
    pub map50_95: f64,
    pub precision: f64,
    pub recall: f64,
}

/// A persisted metrics record: either the scores or the reason there are none.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricsRecord {
    Scores(Metrics),
    Error { error: String },
}

impl MetricsRecord {
    pub fn error(message: impl Into<String>) -> Self {
        MetricsRecord::Error {
            error: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MetricsRecord::Error { .. })
    }

    pub fn scores(&self) -> Option<&Metrics> {
        match self {
            MetricsRecord::Scores(metrics) => Some(metrics),
            MetricsRecord::Error { .. } => None,
        }
    }

    /// Value of a metric by its persisted key (`mAP50`, `mAP50-95`, `precision`, `recall`).
    pub fn get(&self, key: &str) -> Option<f64> {
        let metrics = self.scores()?;
        match key {
            "mAP50" => Some(metrics.map50),
            "mAP50-95" => Some(metrics.map50_95),
            "precision" => Some(metrics.precision),
            "recall" => Some(metrics.recall),
            _ => None,
        }
    }
}

fn read_metric(name: &str, value: Option<f64>) -> std::result::Result<f64, String> {
    match value {
        None => Err(format!("result has no {} value", name)),
        Some(v) if !v.is_finite() => Err(format!("{} is not finite: {}", name, v)),
        Some(v) if !(0.0..=1.0).contains(&v) => Err(format!("{} out of range [0, 1]: {}", name, v)),
        Some(v) => Ok(v),
    }
}

/// Pull exactly the four metrics out of a result, rejecting missing or malformed values.
pub fn read_metrics(results: &dyn DetectionResults) -> std::result::Result<Metrics, String> {
    Ok(Metrics {
        map50: read_metric("mAP50", results.map50())?,
        map50_95: read_metric("mAP50-95", results.map50_95())?,
        precision: read_metric("precision", results.mean_precision())?,
        recall: read_metric("recall", results.mean_recall())?,
    })
}

/// Writes per-dataset metrics under one results directory.
#[derive(Debug, Clone)]
pub struct Evaluator {
    results_dir: PathBuf,
}

impl Evaluator {
    pub fn new(results_dir: impl Into<PathBuf>) -> Self {
        Self {
            results_dir: results_dir.into(),
        }
    }

    /// Evaluator over `results/baseline`.
    pub fn baseline(config: &PipelineConfig) -> Self {
        Self::new(config.baseline_results_dir())
    }

    pub fn dataset_dir(&self, dataset: &str) -> PathBuf {
        self.results_dir.join(dataset)
    }

    pub fn metrics_path(&self, dataset: &str) -> PathBuf {
        self.dataset_dir(dataset).join(METRICS_FILE)
    }

    pub fn confusion_matrix_path(&self, dataset: &str) -> PathBuf {
        self.dataset_dir(dataset).join(CONFUSION_MATRIX_FILE)
    }

    /// Extract the metrics of `results` and persist them for `dataset`.
    ///
    /// Never fails: malformed results and write errors come back as error records.
    pub fn extract(&self, results: &dyn DetectionResults, dataset: &str) -> MetricsRecord {
        let metrics = match read_metrics(results) {
            Ok(metrics) => metrics,
            Err(msg) => {
                error!("Error evaluating {} baseline: {}", dataset, msg);
                return self.record_failure(dataset, &msg);
            }
        };

        let record = MetricsRecord::Scores(metrics);
        match self.persist(dataset, &record, results.confusion_matrix().as_ref()) {
            Ok(()) => record,
            Err(e) => {
                error!("Error evaluating {} baseline: {}", dataset, e);
                MetricsRecord::error(e.to_string())
            }
        }
    }

    /// Persist an error record for a dataset whose evaluation failed.
    pub fn record_failure(&self, dataset: &str, message: &str) -> MetricsRecord {
        let record = MetricsRecord::error(message);
        if let Err(e) = self.persist(dataset, &record, None) {
            warn!("Could not record failure for {}: {}", dataset, e);
        }
        record
    }

    fn persist(
        &self,
        dataset: &str,
        record: &MetricsRecord,
        confusion_matrix: Option<&ConfusionMatrix>,
    ) -> Result<()> {
        ensure_directory(&self.dataset_dir(dataset))?;

        let metrics_file = self.metrics_path(dataset);
        write_json_pretty(&metrics_file, record)?;
        info!("Saved {} baseline metrics to {}", dataset, metrics_file.display());

        let matrix_file = self.confusion_matrix_path(dataset);
        match confusion_matrix {
            Some(matrix) => {
                write_json_pretty(&matrix_file, matrix)?;
                info!("Saved confusion matrix to {}", matrix_file.display());
            }
            None => remove_stale(&matrix_file)?,
        }
        Ok(())
    }

    /// The last record written for `dataset`, or `None` if there is none.
    pub fn summary(&self, dataset: &str) -> Option<MetricsRecord> {
        let metrics_file = self.metrics_path(dataset);
        if !metrics_file.exists() {
            return None;
        }
        match read_and_parse_json(&metrics_file) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Ignoring unreadable metrics file: {}", e);
                None
            }
        }
    }

    /// The last confusion matrix written for `dataset`, if any.
    pub fn confusion_matrix(&self, dataset: &str) -> Option<ConfusionMatrix> {
        let matrix_file = self.confusion_matrix_path(dataset);
        if !matrix_file.exists() {
            return None;
        }
        read_and_parse_json(&matrix_file).ok()
    }
}

fn remove_stale(path: &Path) -> Result<()> {
    if path.exists() {
        fs::remove_file(path).map_err(|e| PipelineError::persistence(path, e))?;
    }
    Ok(())
}
