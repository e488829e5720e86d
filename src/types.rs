use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

// Supported image formats
pub const IMG_FORMATS: &[&str] = &[
    "bmp", "dng", "jpeg", "jpg", "mpo", "png", "tif", "tiff", "webp", "pfm",
];

// Precomputed HashSet of image extensions for fast lookup
pub static IMAGE_EXTENSIONS_SET: OnceLock<HashSet<String>> = OnceLock::new();

/// Get the image extensions set
pub fn get_image_extensions_set() -> &'static HashSet<String> {
    IMAGE_EXTENSIONS_SET.get_or_init(|| IMG_FORMATS.iter().map(|ext| ext.to_lowercase()).collect())
}

/// True if the path carries one of the supported image extensions (case-insensitive).
pub fn is_image_file(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| get_image_extensions_set().contains(&ext.to_lowercase()))
}

#[derive(
    Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Debug, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Val,
    Test,
}

impl Split {
    pub const ALL: [Split; 3] = [Split::Train, Split::Val, Split::Test];

    pub fn as_str(self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Val => "val",
            Split::Test => "test",
        }
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One box in normalised YOLO centre form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloBox {
    pub class_id: usize,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl YoloBox {
    /// A box covering the whole frame.
    pub fn full_frame(class_id: usize) -> Self {
        Self {
            class_id,
            x_center: 0.5,
            y_center: 0.5,
            width: 1.0,
            height: 1.0,
        }
    }
}

/// An image ready to be written into the unified layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Source image on disk.
    pub image_path: PathBuf,
    /// Sanitised, flattened file stem used for both image and label output.
    pub stem: String,
    pub boxes: Vec<YoloBox>,
}

impl Sample {
    /// Output file name of the copied image, keeping the source extension.
    pub fn image_file_name(&self) -> String {
        match self.image_path.extension().and_then(|e| e.to_str()) {
            Some(ext) => format!("{}.{}", self.stem, ext),
            None => self.stem.clone(),
        }
    }
}

// Struct to hold the paths to the output directories for train/val/test splits
#[derive(Debug, Clone)]
pub struct OutputDirs {
    pub root: PathBuf,
    pub train_labels_dir: PathBuf,
    pub val_labels_dir: PathBuf,
    pub test_labels_dir: PathBuf,
    pub train_images_dir: PathBuf,
    pub val_images_dir: PathBuf,
    pub test_images_dir: PathBuf,
}

impl OutputDirs {
    pub fn images_dir(&self, split: Split) -> &PathBuf {
        match split {
            Split::Train => &self.train_images_dir,
            Split::Val => &self.val_images_dir,
            Split::Test => &self.test_images_dir,
        }
    }

    pub fn labels_dir(&self, split: Split) -> &PathBuf {
        match split {
            Split::Train => &self.train_labels_dir,
            Split::Val => &self.val_labels_dir,
            Split::Test => &self.test_labels_dir,
        }
    }
}

// Struct to hold the split datasets for training, validation, and testing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SplitData {
    pub train: Vec<Sample>,
    pub val: Vec<Sample>,
    pub test: Vec<Sample>,
}

impl SplitData {
    pub fn get(&self, split: Split) -> &[Sample] {
        match split {
            Split::Train => &self.train,
            Split::Val => &self.val,
            Split::Test => &self.test,
        }
    }

    pub fn len(&self) -> usize {
        self.train.len() + self.val.len() + self.test.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Struct to hold processing statistics
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub total_images: usize,
    pub kept_images: usize,
    pub skipped_missing_image: usize,
    pub total_annotations: usize,
    pub dropped_degenerate_boxes: usize,
}

impl ProcessingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_summary(&self, dataset: &str) {
        log::info!("=== {} Processing Summary ===", dataset);
        log::info!("Images found: {}", self.total_images);
        log::info!("Images kept: {}", self.kept_images);
        log::info!("Annotations read: {}", self.total_annotations);

        if self.skipped_missing_image > 0 {
            log::warn!(
                "Skipped {} images whose file is missing on disk",
                self.skipped_missing_image
            );
        }
        if self.dropped_degenerate_boxes > 0 {
            log::warn!(
                "Dropped {} boxes with zero area after clamping",
                self.dropped_degenerate_boxes
            );
        }
    }
}
