//! `dataset.yaml` manifests in the layout the Ultralytics loader expects.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::dataset::FoldAssignment;
use crate::error::{PipelineError, Result};
use crate::types::{Sample, Split, SplitData};
use crate::utils::{create_output_directory, write_json_pretty, write_text_file};

pub const MANIFEST_FILE: &str = "dataset.yaml";
pub const FOLDS_DIR: &str = "folds";
pub const FOLDS_FILE: &str = "folds.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    /// Absolute dataset root; split entries are relative to it.
    pub path: PathBuf,
    pub train: String,
    pub val: String,
    pub test: String,
    pub imgsz: u32,
    pub nc: usize,
    pub names: BTreeMap<usize, String>,
}

impl DatasetManifest {
    /// Manifest over the `images/{train,val,test}` directories under `root`.
    pub fn for_splits(root: &Path, classes: &[String], img_size: u32) -> Self {
        Self {
            path: root.to_path_buf(),
            train: images_dir_entry(Split::Train),
            val: images_dir_entry(Split::Val),
            test: images_dir_entry(Split::Test),
            imgsz: img_size,
            nc: classes.len(),
            names: classes.iter().cloned().enumerate().collect(),
        }
    }

    pub fn class_names(&self) -> Vec<String> {
        self.names.values().cloned().collect()
    }

    pub fn read(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        serde_yaml::from_str(&content).map_err(|source| PipelineError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self).map_err(|source| PipelineError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        write_text_file(path, &yaml)
    }
}

fn images_dir_entry(split: Split) -> String {
    format!("images/{}", split)
}

/// Create the dataset.yaml file for YOLO validation
pub fn create_dataset_yaml(root: &Path, classes: &[String], img_size: u32) -> Result<PathBuf> {
    let absolute_path = fs::canonicalize(root).map_err(|e| PipelineError::io(root, e))?;
    let manifest_path = root.join(MANIFEST_FILE);
    DatasetManifest::for_splits(&absolute_path, classes, img_size).write(&manifest_path)?;
    Ok(manifest_path)
}

/// Absolute image paths of `stems`, looked up among the training samples.
fn image_list(root: &Path, train: &[Sample], stems: &[String]) -> Result<String> {
    let by_stem: BTreeMap<&str, &Sample> = train.iter().map(|s| (s.stem.as_str(), s)).collect();
    let mut listing = String::new();
    for stem in stems {
        let sample = by_stem.get(stem.as_str()).ok_or_else(|| {
            PipelineError::Config(format!("fold member '{}' is not a training sample", stem))
        })?;
        let image = root
            .join(images_dir_entry(Split::Train))
            .join(sample.image_file_name());
        listing.push_str(&image.to_string_lossy());
        listing.push('\n');
    }
    Ok(listing)
}

/// Write `folds/folds.json` and one manifest per fold under `folds/fold_<i>/`.
///
/// Fold `i` validates on its held-out members and trains on the other folds;
/// the test split is shared with the main manifest.
pub fn write_fold_manifests(
    root: &Path,
    split_data: &SplitData,
    assignment: &FoldAssignment,
    classes: &[String],
    img_size: u32,
) -> Result<Vec<PathBuf>> {
    let absolute_root = fs::canonicalize(root).map_err(|e| PipelineError::io(root, e))?;
    let folds_dir = create_output_directory(&root.join(FOLDS_DIR))?;
    write_json_pretty(&folds_dir.join(FOLDS_FILE), assignment)?;

    let mut manifests = Vec::with_capacity(assignment.k);
    for index in 0..assignment.k {
        let fold_name = format!("fold_{}", index);
        let fold_dir = folds_dir.join(&fold_name);
        fs::create_dir_all(&fold_dir).map_err(|e| PipelineError::io(&fold_dir, e))?;

        let train_list = image_list(
            &absolute_root,
            &split_data.train,
            &assignment.training_complement(index),
        )?;
        let held_out = assignment.held_out(index).ok_or_else(|| {
            PipelineError::Config(format!(
                "fold assignment declares k={} but has {} folds",
                assignment.k,
                assignment.folds.len()
            ))
        })?;
        let val_list = image_list(&absolute_root, &split_data.train, held_out)?;
        write_text_file(&fold_dir.join("train.txt"), &train_list)?;
        write_text_file(&fold_dir.join("val.txt"), &val_list)?;

        let manifest = DatasetManifest {
            train: format!("{}/{}/train.txt", FOLDS_DIR, fold_name),
            val: format!("{}/{}/val.txt", FOLDS_DIR, fold_name),
            ..DatasetManifest::for_splits(&absolute_root, classes, img_size)
        };
        let manifest_path = fold_dir.join(MANIFEST_FILE);
        manifest.write(&manifest_path)?;
        manifests.push(manifest_path);
    }
    Ok(manifests)
}

/// Read back a persisted fold assignment.
pub fn read_fold_assignment(root: &Path) -> Result<FoldAssignment> {
    crate::utils::read_and_parse_json(&root.join(FOLDS_DIR).join(FOLDS_FILE))
}
