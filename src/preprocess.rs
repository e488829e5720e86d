//! Turns the raw TrashNet and TACO downloads into YOLO datasets with manifests,
//! cross-validation folds and metadata.

use log::{info, warn};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::config::{Dataset, PipelineConfig, TRASHNET_CLASSES};
use crate::conversion::process_split;
use crate::dataset::{assign_folds, class_instance_counts, split_samples, FoldAssignment, SplitRatios};
use crate::error::{PipelineError, Result};
use crate::io::{read_taco_samples, read_trashnet_samples, setup_output_directories};
use crate::manifest::{create_dataset_yaml, write_fold_manifests};
use crate::mapping::CategoryMapping;
use crate::types::{OutputDirs, ProcessingStats, Sample, Split, SplitData};
use crate::utils::write_json_pretty;

pub const METADATA_FILE: &str = "metadata.json";

/// A dataset written to disk by the preprocessor.
#[derive(Debug, Clone)]
pub struct PreparedDataset {
    pub dataset: Dataset,
    pub classes: Vec<String>,
    pub output_dirs: OutputDirs,
    pub manifest_path: PathBuf,
    pub split_data: SplitData,
    pub stats: ProcessingStats,
    pub folds: Option<FoldAssignment>,
    pub fold_manifests: Vec<PathBuf>,
}

impl PreparedDataset {
    pub fn training_pool(&self) -> Vec<String> {
        self.split_data.train.iter().map(|s| s.stem.clone()).collect()
    }
}

#[derive(Debug, Serialize)]
struct DatasetMetadata<'a> {
    name: &'a str,
    classes: &'a [String],
    num_classes: usize,
    image_size: u32,
    seed: u64,
    split_ratios: SplitRatios,
    images: BTreeMap<Split, usize>,
    instances: BTreeMap<Split, BTreeMap<String, usize>>,
    cv_folds: Option<usize>,
    processing: &'a ProcessingStats,
}

pub struct DatasetPreprocessor<'a> {
    config: &'a PipelineConfig,
    ratios: SplitRatios,
    mapping: CategoryMapping,
    prepared: HashMap<Dataset, PreparedDataset>,
}

impl<'a> DatasetPreprocessor<'a> {
    /// Validates ratios and the category mapping before anything touches disk.
    pub fn new(config: &'a PipelineConfig) -> Result<Self> {
        let ratios = SplitRatios::new(config.train_ratio, config.val_ratio, config.test_ratio)?;
        if config.cv_folds < 2 {
            return Err(PipelineError::Config(format!(
                "cross-validation needs at least 2 folds, got {}",
                config.cv_folds
            )));
        }
        let mapping = CategoryMapping::taco_to_trashnet()?;
        for (target, sources) in mapping.groups() {
            info!("{} <- {}", target, sources.join(", "));
        }
        Ok(Self {
            config,
            ratios,
            mapping,
            prepared: HashMap::new(),
        })
    }

    pub fn classes() -> Vec<String> {
        TRASHNET_CLASSES.iter().map(|c| c.to_string()).collect()
    }

    /// Convert the TrashNet class folders; every image gets a full-frame box.
    pub fn process_trashnet(&mut self) -> Result<&PreparedDataset> {
        let classes = Self::classes();
        let (samples, stats) = read_trashnet_samples(&self.config.trashnet_dir(), &classes)?;
        self.write_dataset(Dataset::TrashNet, classes, samples, stats)
    }

    /// Convert TACO's COCO annotations, collapsing its labels onto the TrashNet classes.
    pub fn process_taco(&mut self) -> Result<&PreparedDataset> {
        let classes = self.mapping.targets().to_vec();
        let (samples, stats) = read_taco_samples(&self.config.taco_dir(), &self.mapping)?;
        self.write_dataset(Dataset::Taco, classes, samples, stats)
    }

    fn write_dataset(
        &mut self,
        dataset: Dataset,
        classes: Vec<String>,
        samples: Vec<Sample>,
        stats: ProcessingStats,
    ) -> Result<&PreparedDataset> {
        stats.print_summary(dataset.name());
        if samples.is_empty() {
            warn!("{} has no usable images", dataset);
        }

        let split_data = split_samples(samples, self.ratios, self.config.seed);
        let root = self.config.dataset_output_dir(dataset);
        let output_dirs = setup_output_directories(&root)?;
        for split in Split::ALL {
            process_split(split_data.get(split), &output_dirs, split)?;
        }

        info!("Creating dataset.yaml file...");
        let manifest_path = create_dataset_yaml(&root, &classes, self.config.img_size)?;

        let prepared = PreparedDataset {
            dataset,
            classes,
            output_dirs,
            manifest_path,
            split_data,
            stats,
            folds: None,
            fold_manifests: Vec::new(),
        };
        self.prepared.insert(dataset, prepared);
        self.get(dataset)
    }

    pub fn get(&self, dataset: Dataset) -> Result<&PreparedDataset> {
        self.prepared.get(&dataset).ok_or_else(|| {
            PipelineError::Config(format!("{} has not been processed yet", dataset))
        })
    }

    fn get_mut(&mut self, dataset: Dataset) -> Result<&mut PreparedDataset> {
        self.prepared.get_mut(&dataset).ok_or_else(|| {
            PipelineError::Config(format!("{} has not been processed yet", dataset))
        })
    }

    /// Partition the training split into folds and write one manifest per fold.
    pub fn create_cross_validation_folds(&mut self, dataset: Dataset) -> Result<&FoldAssignment> {
        let (k, seed, img_size) = (self.config.cv_folds, self.config.seed, self.config.img_size);
        let prepared = self.get_mut(dataset)?;

        let pool = prepared.training_pool();
        let assignment = assign_folds(&pool, k, seed)?;
        assignment.verify_partition(&pool)?;
        prepared.fold_manifests = write_fold_manifests(
            &prepared.output_dirs.root,
            &prepared.split_data,
            &assignment,
            &prepared.classes,
            img_size,
        )?;
        info!(
            "Wrote {} cross-validation manifests for {}",
            prepared.fold_manifests.len(),
            dataset
        );
        let stored: &FoldAssignment = prepared.folds.insert(assignment);
        Ok(stored)
    }

    pub fn log_dataset_stats(&self, dataset: Dataset) -> Result<()> {
        let prepared = self.get(dataset)?;
        info!("{} dataset statistics:", dataset);
        for split in Split::ALL {
            info!("  {}: {} images", split, prepared.split_data.get(split).len());
        }
        for (split, per_class) in class_instance_counts(&prepared.split_data, &prepared.classes) {
            let counts: Vec<String> = per_class
                .iter()
                .map(|(name, count)| format!("{}={}", name, count))
                .collect();
            info!("  {} instances: {}", split, counts.join(", "));
        }
        if let Some(folds) = &prepared.folds {
            let sizes: Vec<usize> = folds.folds.iter().map(Vec::len).collect();
            info!("  cross-validation fold sizes: {:?}", sizes);
        }
        Ok(())
    }

    /// Write `metadata.json` next to the dataset manifest.
    pub fn save_dataset_metadata(&self, dataset: Dataset) -> Result<PathBuf> {
        let prepared = self.get(dataset)?;
        let metadata = DatasetMetadata {
            name: dataset.name(),
            classes: &prepared.classes,
            num_classes: prepared.classes.len(),
            image_size: self.config.img_size,
            seed: self.config.seed,
            split_ratios: self.ratios,
            images: Split::ALL
                .iter()
                .map(|&split| (split, prepared.split_data.get(split).len()))
                .collect(),
            instances: class_instance_counts(&prepared.split_data, &prepared.classes),
            cv_folds: prepared.folds.as_ref().map(|f| f.k),
            processing: &prepared.stats,
        };
        let path = prepared.output_dirs.root.join(METADATA_FILE);
        write_json_pretty(&path, &metadata)?;
        info!("Saved {} metadata to {}", dataset, path.display());
        Ok(path)
    }

    /// Full preprocessing of one dataset: convert, fold, log and save metadata.
    pub fn run(&mut self, dataset: Dataset) -> Result<()> {
        match dataset {
            Dataset::TrashNet => self.process_trashnet()?,
            Dataset::Taco => self.process_taco()?,
        };
        self.create_cross_validation_folds(dataset)?;
        self.log_dataset_stats(dataset)?;
        self.save_dataset_metadata(dataset)?;
        Ok(())
    }
}
