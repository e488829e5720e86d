use log::info;
use std::fs::copy;
use std::path::Path;

use crate::error::{PipelineError, Result};
use crate::types::{OutputDirs, Sample, Split, YoloBox};
use crate::utils::{create_progress_bar, write_text_file};

/// Write one split's images and label files, in order.
pub fn process_split(samples: &[Sample], output_dirs: &OutputDirs, split: Split) -> Result<()> {
    let labels_dir = output_dirs.labels_dir(split);
    let images_dir = output_dirs.images_dir(split);
    let pb = create_progress_bar(samples.len() as u64, &capitalize(split.as_str()));

    for sample in samples {
        process_sample(sample, labels_dir, images_dir)?;
        pb.inc(1);
    }
    pb.finish_with_message(format!("{} processing complete", split));
    info!("Wrote {} {} samples", samples.len(), split);
    Ok(())
}

/// Copy a sample's image and write its YOLO label file.
pub fn process_sample(sample: &Sample, labels_dir: &Path, images_dir: &Path) -> Result<()> {
    let image_output_path = images_dir.join(sample.image_file_name());
    copy(&sample.image_path, &image_output_path)
        .map_err(|e| PipelineError::io(&sample.image_path, e))?;

    let label_output_path = labels_dir.join(format!("{}.txt", sample.stem));
    write_text_file(&label_output_path, &convert_to_yolo_format(&sample.boxes))
}

/// Render boxes as YOLO label lines: `class x_center y_center width height`.
pub fn convert_to_yolo_format(boxes: &[YoloBox]) -> String {
    let mut yolo_data = String::with_capacity(boxes.len() * 48);
    for b in boxes {
        yolo_data.push_str(&format!(
            "{} {:.6} {:.6} {:.6} {:.6}\n",
            b.class_id, b.x_center, b.y_center, b.width, b.height
        ));
    }
    yolo_data
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
