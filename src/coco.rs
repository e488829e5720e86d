//! COCO format data structures and utilities
//!
//! TACO ships its annotations as a single COCO detection file. This module reads
//! that file and turns pixel-space `[x, y, width, height]` boxes into normalised
//! YOLO centre boxes.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::types::YoloBox;

/// COCO dataset information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Info {
    #[serde(default)]
    pub year: Option<u32>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// COCO category information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub supercategory: String,
}

/// COCO image information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Image {
    pub id: u64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// COCO annotation information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub id: u64,
    pub image_id: u64,
    pub category_id: u64,
    pub bbox: [f64; 4], // [x, y, width, height]
    #[serde(default)]
    pub area: Option<f64>,
    #[serde(default)]
    pub iscrowd: Option<u32>,
}

/// Complete COCO dataset structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CocoFile {
    #[serde(default)]
    pub info: Info,
    pub categories: Vec<Category>,
    pub images: Vec<Image>,
    pub annotations: Vec<Annotation>,
}

impl CocoFile {
    pub fn read(path: &Path) -> Result<Self> {
        crate::utils::read_and_parse_json(path)
    }

    /// Category id to category name.
    pub fn category_names(&self) -> HashMap<u64, &str> {
        self.categories
            .iter()
            .map(|c| (c.id, c.name.as_str()))
            .collect()
    }

    /// Annotations grouped by image id, in file order.
    pub fn annotations_by_image(&self) -> HashMap<u64, Vec<&Annotation>> {
        let mut by_image: HashMap<u64, Vec<&Annotation>> = HashMap::new();
        for annotation in &self.annotations {
            by_image.entry(annotation.image_id).or_default().push(annotation);
        }
        by_image
    }

    /// Fails if an annotation points at a category the file does not declare.
    pub fn check_categories(&self) -> Result<()> {
        let names = self.category_names();
        match self
            .annotations
            .iter()
            .find(|a| !names.contains_key(&a.category_id))
        {
            Some(a) => Err(PipelineError::Config(format!(
                "annotation {} references undeclared category {}",
                a.id, a.category_id
            ))),
            None => Ok(()),
        }
    }
}

/// Clamp coordinates to image bounds
pub fn clamp_coords(x: f64, y: f64, width: u32, height: u32) -> (f64, f64) {
    let x = x.max(0.0).min(width as f64);
    let y = y.max(0.0).min(height as f64);
    (x, y)
}

/// Convert a COCO `[x, y, w, h]` pixel box to a normalised YOLO box.
///
/// Returns `None` when the box has no area once clamped to the image.
pub fn coco_bbox_to_yolo(bbox: [f64; 4], width: u32, height: u32, class_id: usize) -> Option<YoloBox> {
    if width == 0 || height == 0 || bbox.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let (x1, y1) = clamp_coords(bbox[0], bbox[1], width, height);
    let (x2, y2) = clamp_coords(bbox[0] + bbox[2], bbox[1] + bbox[3], width, height);
    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(YoloBox {
        class_id,
        x_center: (x1 + x2) / 2.0 / width as f64,
        y_center: (y1 + y2) / 2.0 / height as f64,
        width: (x2 - x1) / width as f64,
        height: (y2 - y1) / height as f64,
    })
}
