//! Preprocess-if-needed, then evaluate the baseline on every dataset.

use log::{error, info};
use std::collections::BTreeMap;

use crate::config::{Dataset, PipelineConfig};
use crate::error::Result;
use crate::evaluate::{Evaluator, MetricsRecord};
use crate::model::{BaselineModel, DetectionBackend};
use crate::preprocess::DatasetPreprocessor;
use crate::utils::ensure_directory;

/// Run preprocessing pipeline
pub fn run_preprocessing(config: &PipelineConfig) -> Result<()> {
    info!("Initializing data preprocessor...");
    let mut preprocessor = DatasetPreprocessor::new(config)?;

    for dataset in Dataset::ALL {
        info!("Processing {} dataset...", dataset);
        preprocessor.run(dataset)?;
    }

    info!(
        "Preprocessing complete. Output saved to {}",
        config.output_dir().display()
    );
    Ok(())
}

/// Load, predict and extract for one dataset; failures become error records.
pub fn evaluate_dataset(
    config: &PipelineConfig,
    backend: &dyn DetectionBackend,
    evaluator: &Evaluator,
    dataset: Dataset,
) -> MetricsRecord {
    info!("Evaluating baseline model on {}...", dataset);
    let manifest = config.manifest_path(dataset);
    let results = BaselineModel::load(backend, config.model_size)
        .and_then(|model| model.predict(&manifest, config.split));

    match results {
        Ok(results) => evaluator.extract(results.as_ref(), dataset.name()),
        Err(e) => {
            error!("Error evaluating {}: {}", dataset, e);
            evaluator.record_failure(dataset.name(), &e.to_string())
        }
    }
}

/// Run baseline model evaluation
pub fn run_baseline_evaluation(
    config: &PipelineConfig,
    backend: &dyn DetectionBackend,
) -> Result<BTreeMap<Dataset, MetricsRecord>> {
    info!("Starting baseline model evaluation...");
    for dir in config.results_dirs() {
        ensure_directory(&dir)?;
    }
    let evaluator = Evaluator::baseline(config);

    let mut records = BTreeMap::new();
    for dataset in Dataset::ALL {
        let record = evaluate_dataset(config, backend, &evaluator, dataset);
        match record.get("mAP50") {
            Some(map50) => info!("{} baseline mAP50: {:.4}", dataset, map50),
            None => info!("{} baseline mAP50: N/A", dataset),
        }
        records.insert(dataset, record);
    }

    info!(
        "Baseline evaluation complete. Results saved to {}",
        config.results_dir().display()
    );
    Ok(records)
}

/// Main execution pipeline
///
/// A preprocessing failure aborts the run; evaluation failures are recorded per
/// dataset and the returned map holds one record for every dataset.
pub fn run(
    config: &PipelineConfig,
    backend: &dyn DetectionBackend,
) -> Result<BTreeMap<Dataset, MetricsRecord>> {
    if config.force_preprocess || !config.is_preprocessed() {
        if let Err(e) = run_preprocessing(config) {
            error!("Error during preprocessing: {}", e);
            return Err(e);
        }
    } else {
        info!(
            "Found {}, skipping preprocessing",
            config.manifest_path(Dataset::ALL[0]).display()
        );
    }

    let records = run_baseline_evaluation(config, backend)?;
    info!("Pipeline completed successfully!");
    Ok(records)
}
