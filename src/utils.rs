use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, Result};

/// Read and parse a JSON file by streaming it from disk.
pub fn read_and_parse_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| PipelineError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Serialise `value` as JSON indented with four spaces, replacing any previous file.
pub fn write_json_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| PipelineError::persistence(path, e))?;
    let mut writer = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut writer, formatter);
    value.serialize(&mut ser).map_err(|source| PipelineError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    writer
        .write_all(b"\n")
        .and_then(|_| writer.flush())
        .map_err(|e| PipelineError::persistence(path, e))
}

/// Write a whole text file, replacing any previous file.
pub fn write_text_file(path: &Path, content: &str) -> Result<()> {
    let mut writer =
        BufWriter::new(File::create(path).map_err(|e| PipelineError::persistence(path, e))?);
    writer
        .write_all(content.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| PipelineError::persistence(path, e))
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Safely create output directories and return their paths
pub fn create_output_directory(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        log::warn!(
            "Directory {:?} already exists. Deleting and recreating it.",
            path
        );
        fs::remove_dir_all(path)
            .and_then(|_| fs::create_dir_all(path))
            .map_err(|e| PipelineError::io(path, e))?;
    } else {
        fs::create_dir_all(path).map_err(|e| PipelineError::io(path, e))?;
    }
    Ok(path.to_path_buf())
}

/// Create `path` and its parents if missing, leaving existing content alone.
pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path).map_err(|e| PipelineError::io(path, e))
}

/// Flatten a relative image path into a single safe file stem.
///
/// `batch_1/000006.jpg` becomes `batch_1_000006`.
pub fn flatten_stem(relative: &Path) -> String {
    let without_ext = relative.with_extension("");
    let joined = without_ext
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .filter(|part| !part.is_empty() && part != "." && part != "..")
        .collect::<Vec<_>>()
        .join("_");
    sanitize_filename::sanitize(joined)
}
