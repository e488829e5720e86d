use glob::glob;
use log::{debug, warn};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::coco::{coco_bbox_to_yolo, CocoFile};
use crate::error::{PipelineError, Result};
use crate::mapping::CategoryMapping;
use crate::types::{is_image_file, OutputDirs, ProcessingStats, Sample, Split, YoloBox};
use crate::utils::{create_output_directory, flatten_stem};

/// TACO's COCO annotation file, relative to the TACO data directory.
pub const TACO_ANNOTATIONS_FILE: &str = "annotations.json";

/// Set up the directory structure for YOLO dataset output
pub fn setup_output_directories(root: &Path) -> Result<OutputDirs> {
    let root = create_output_directory(root)?;
    let labels_dir = root.join("labels");
    let images_dir = root.join("images");

    let dir = |base: &Path, split: Split| create_output_directory(&base.join(split.as_str()));

    Ok(OutputDirs {
        train_labels_dir: dir(&labels_dir, Split::Train)?,
        val_labels_dir: dir(&labels_dir, Split::Val)?,
        test_labels_dir: dir(&labels_dir, Split::Test)?,
        train_images_dir: dir(&images_dir, Split::Train)?,
        val_images_dir: dir(&images_dir, Split::Val)?,
        test_images_dir: dir(&images_dir, Split::Test)?,
        root,
    })
}

/// Register a stem, failing if two source images flatten to the same name.
fn claim_stem(seen: &mut HashMap<String, PathBuf>, stem: &str, image_path: &Path) -> Result<()> {
    if let Some(previous) = seen.insert(stem.to_string(), image_path.to_path_buf()) {
        return Err(PipelineError::Config(format!(
            "images {} and {} both map to output name '{}'",
            previous.display(),
            image_path.display(),
            stem
        )));
    }
    Ok(())
}

/// Dot-directories such as `.ipynb_checkpoints` are not class folders.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .is_some_and(|name| name.to_string_lossy().starts_with('.'))
}

/// Collect TrashNet samples from `<dir>/<class>/*.<img>`; each image gets one full-frame box.
pub fn read_trashnet_samples(dir: &Path, classes: &[String]) -> Result<(Vec<Sample>, ProcessingStats)> {
    if !dir.is_dir() {
        return Err(PipelineError::Config(format!(
            "TrashNet directory does not exist: {}",
            dir.display()
        )));
    }

    let mut class_dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))? {
        let path = entry.map_err(|e| PipelineError::io(dir, e))?.path();
        if !path.is_dir() || is_hidden(&path) {
            continue;
        }
        class_dirs.push(path);
    }
    class_dirs.sort();

    let mut stats = ProcessingStats::new();
    let mut samples = Vec::new();
    let mut seen = HashMap::new();

    for class_dir in class_dirs {
        let class_name = class_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let class_id = classes.iter().position(|c| *c == class_name).ok_or_else(|| {
            PipelineError::Config(format!(
                "TrashNet class directory '{}' is not one of {:?}",
                class_name, classes
            ))
        })?;

        let pattern = format!("{}/*", glob::Pattern::escape(&class_dir.to_string_lossy()));
        let entries = glob(&pattern)
            .map_err(|e| PipelineError::Config(format!("bad glob pattern {}: {}", pattern, e)))?;
        let mut images: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file() && is_image_file(path))
            .collect();
        images.sort();
        debug!("{}: {} images", class_name, images.len());

        for image_path in images {
            stats.total_images += 1;
            stats.total_annotations += 1;
            let relative = image_path.strip_prefix(dir).unwrap_or(&image_path);
            let stem = flatten_stem(relative);
            claim_stem(&mut seen, &stem, &image_path)?;
            samples.push(Sample {
                image_path,
                stem,
                boxes: vec![YoloBox::full_frame(class_id)],
            });
            stats.kept_images += 1;
        }
    }

    Ok((samples, stats))
}

/// Collect TACO samples from the COCO annotation file under `dir`, mapping every
/// category through `mapping`.
pub fn read_taco_samples(dir: &Path, mapping: &CategoryMapping) -> Result<(Vec<Sample>, ProcessingStats)> {
    let annotations_path = dir.join(TACO_ANNOTATIONS_FILE);
    if !annotations_path.is_file() {
        return Err(PipelineError::Config(format!(
            "TACO annotations not found: {}",
            annotations_path.display()
        )));
    }
    let coco = CocoFile::read(&annotations_path)?;
    coco.check_categories()?;

    // Resolve every declared category up front so an unmapped label fails loudly
    // even if no annotation uses it.
    let mut category_classes = HashMap::new();
    for category in &coco.categories {
        category_classes.insert(category.id, mapping.resolve(&category.name)?);
    }

    let by_image = coco.annotations_by_image();
    let mut images: Vec<_> = coco.images.iter().collect();
    images.sort_by(|a, b| a.file_name.cmp(&b.file_name));

    let mut stats = ProcessingStats::new();
    let mut samples = Vec::with_capacity(images.len());
    let mut seen = HashMap::new();

    for image in images {
        stats.total_images += 1;
        let image_path = dir.join(&image.file_name);
        let annotations = by_image.get(&image.id).map(Vec::as_slice).unwrap_or(&[]);
        stats.total_annotations += annotations.len();

        if !image_path.is_file() {
            warn!("Image file not found, skipping: {}", image_path.display());
            stats.skipped_missing_image += 1;
            continue;
        }

        let mut boxes = Vec::with_capacity(annotations.len());
        for annotation in annotations {
            let class_id = *category_classes.get(&annotation.category_id).ok_or_else(|| {
                PipelineError::Config(format!(
                    "annotation {} references undeclared category {}",
                    annotation.id, annotation.category_id
                ))
            })?;
            match coco_bbox_to_yolo(annotation.bbox, image.width, image.height, class_id) {
                Some(b) => boxes.push(b),
                None => stats.dropped_degenerate_boxes += 1,
            }
        }

        let stem = flatten_stem(Path::new(&image.file_name));
        claim_stem(&mut seen, &stem, &image_path)?;
        samples.push(Sample {
            image_path,
            stem,
            boxes,
        });
        stats.kept_images += 1;
    }

    Ok((samples, stats))
}
