//! File intake: filtering candidates and holding the upload batch.

use std::path::Path;

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{AppResult, UploadError};
use crate::models::{BatchSummary, FileIntakeResult, FileSource, RawFile, SelectableFile};

/// Extensions accepted as DICOM (compared lower-cased, without the dot).
const DICOM_EXTENSIONS: &[&str] = &["dcm", "dicom"];

/// Files per series used by the summary estimate.
pub const FILES_PER_SERIES_ESTIMATE: usize = 10;

/// Check if a filename may be a DICOM file.
///
/// Accepts `.dcm` / `.dicom` in any case, and names without any `.` at all
/// (scanner exports often have no extension).
pub fn is_dicom_candidate(filename: &str) -> bool {
    match filename.rfind('.') {
        None => true,
        Some(pos) => {
            let extension = filename[pos + 1..].to_lowercase();
            DICOM_EXTENSIONS.contains(&extension.as_str())
        }
    }
}

/// Split candidates into accepted files and a rejected count.
pub fn filter_candidates(candidates: Vec<RawFile>) -> FileIntakeResult {
    let mut result = FileIntakeResult::default();

    for candidate in candidates {
        if is_dicom_candidate(&candidate.name) {
            result.accepted.push(SelectableFile::from(candidate));
        } else {
            debug!("Skipping non-DICOM file: {}", candidate.name);
            result.rejected_count += 1;
        }
    }

    result
}

/// Collect every file under `root` as a candidate, keeping folder-relative paths.
///
/// Equivalent to dropping a folder: nothing is filtered here.
pub fn scan_directory(root: &Path) -> AppResult<Vec<RawFile>> {
    if !root.is_dir() {
        return Err(UploadError::InvalidInput(format!(
            "{} is not a directory",
            root.display()
        )));
    }

    let mut candidates = Vec::new();

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let size_bytes = entry
            .metadata()
            .map_err(|e| UploadError::FileSystem(e.to_string()))?
            .len();

        let relative_path = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        candidates.push(RawFile {
            name: entry.file_name().to_string_lossy().into_owned(),
            size_bytes,
            relative_path: Some(relative_path),
            source: FileSource::Disk(entry.path().to_path_buf()),
        });
    }

    Ok(candidates)
}

/// Ordered set of files selected for one study.
///
/// Duplicates are kept: the same path added twice is uploaded twice.
#[derive(Debug, Clone, Default)]
pub struct UploadBatch {
    files: Vec<SelectableFile>,
}

impl UploadBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn files(&self) -> &[SelectableFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Append accepted files in order.
    pub fn extend(&mut self, files: impl IntoIterator<Item = SelectableFile>) {
        self.files.extend(files);
    }

    /// Remove the file at `index`, if present.
    pub fn remove(&mut self, index: usize) -> Option<SelectableFile> {
        (index < self.files.len()).then(|| self.files.remove(index))
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_files(&self.files, FILES_PER_SERIES_ESTIMATE)
    }
}
