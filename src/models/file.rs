//! Candidate and selected files for a study upload.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use crate::error::AppResult;

/// Bytes per megabyte used for the batch summary.
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Where the contents of a file live.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// File on local disk, streamed at upload time.
    Disk(PathBuf),
    /// Contents already in memory (dropped buffers, tests).
    Memory(Arc<[u8]>),
}

/// A file offered to the intake, before filtering.
#[derive(Debug, Clone)]
pub struct RawFile {
    pub name: String,
    pub size_bytes: u64,
    /// Path relative to a dropped folder, if the file came from one.
    pub relative_path: Option<String>,
    pub source: FileSource,
}

impl RawFile {
    /// Wrap an in-memory buffer.
    pub fn from_bytes(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            name: name.into(),
            size_bytes: bytes.len() as u64,
            relative_path: None,
            source: FileSource::Memory(Arc::from(bytes)),
        }
    }

    /// Describe a file on disk. The size is read now and sent as the part length.
    pub async fn from_path(path: impl AsRef<Path>) -> AppResult<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Ok(Self {
            name,
            size_bytes: metadata.len(),
            relative_path: None,
            source: FileSource::Disk(path.to_path_buf()),
        })
    }

    /// Attach the path relative to a dropped folder.
    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = Some(relative_path.into());
        self
    }
}

/// A file accepted into the upload batch.
#[derive(Debug, Clone)]
pub struct SelectableFile {
    pub name: String,
    pub size_bytes: u64,
    pub relative_path: String,
    pub source: FileSource,
}

impl From<RawFile> for SelectableFile {
    fn from(raw: RawFile) -> Self {
        let relative_path = raw.relative_path.unwrap_or_else(|| raw.name.clone());
        Self {
            name: raw.name,
            size_bytes: raw.size_bytes,
            relative_path,
            source: raw.source,
        }
    }
}

/// Outcome of offering candidates to the intake.
#[derive(Debug, Clone, Default)]
pub struct FileIntakeResult {
    pub accepted: Vec<SelectableFile>,
    /// Rejected files are only counted, never listed.
    pub rejected_count: usize,
}

/// Derived summary of the current batch.
#[derive(Debug, Clone, PartialEq, Serialize, serde::Deserialize)]
pub struct BatchSummary {
    pub file_count: usize,
    pub total_size_bytes: u64,
    /// Total size in MB, rounded to two decimals.
    pub total_size_mb: f64,
    /// Coarse estimate: one series per ten files.
    pub estimated_series: usize,
}

impl BatchSummary {
    pub fn from_files(files: &[SelectableFile], files_per_series: usize) -> Self {
        let file_count = files.len();
        let total_size_bytes: u64 = files.iter().map(|f| f.size_bytes).sum();
        let total_size_mb = (total_size_bytes as f64 / BYTES_PER_MB * 100.0).round() / 100.0;

        Self {
            file_count,
            total_size_bytes,
            total_size_mb,
            estimated_series: file_count.div_ceil(files_per_series.max(1)),
        }
    }
}
