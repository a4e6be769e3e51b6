//! Medical imaging endpoints.
//!
//! `POST /medical-imaging/upload-study` takes one multipart request per study:
//! the visit id, optional text fields, and every file under the shared
//! `dicomFiles` field so the server groups them into one study.

use std::io;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures_util::{Stream, StreamExt, stream};
use reqwest::Body;
use reqwest::multipart::{Form, Part};
use tokio::io::AsyncReadExt;
use tracing::info;

use super::ApiClient;
use crate::error::AppResult;
use crate::models::{FileSource, SelectableFile, StudyMetadata, UploadStudyData};

/// Upload endpoint path, relative to the API base URL.
pub const UPLOAD_STUDY_PATH: &str = "/medical-imaging/upload-study";

/// Multipart field shared by every file of the study.
pub const DICOM_FILES_FIELD: &str = "dicomFiles";

/// MIME type declared on each file part.
const DICOM_MIME: &str = "application/dicom";

/// Size of the chunks streamed into the request body.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

type ChunkStream = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send + Sync>>;

/// Receives `(bytes_sent, bytes_total)` as the request body is streamed.
#[derive(Clone)]
pub struct ProgressSink(Arc<dyn Fn(u64, u64) + Send + Sync>);

impl ProgressSink {
    pub fn new(report: impl Fn(u64, u64) + Send + Sync + 'static) -> Self {
        Self(Arc::new(report))
    }

    pub fn report(&self, sent: u64, total: u64) {
        (self.0)(sent, total)
    }
}

impl std::fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ProgressSink")
    }
}

/// Everything sent for one study.
#[derive(Debug, Clone)]
pub struct StudyUploadRequest {
    pub metadata: StudyMetadata,
    pub files: Vec<SelectableFile>,
}

impl StudyUploadRequest {
    pub fn new(metadata: StudyMetadata, files: Vec<SelectableFile>) -> Self {
        Self { metadata, files }
    }

    /// Sum of all file sizes; the denominator for transfer progress.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Successful upload: the server's message and data.
#[derive(Debug, Clone, Default)]
pub struct StudyUploadReceipt {
    pub message: Option<String>,
    pub data: UploadStudyData,
}

/// Transport used by the orchestrator to submit a study.
///
/// Implementations must not retry. Dropping the returned future must abort
/// the request.
#[async_trait]
pub trait StudyUploader: Send + Sync + 'static {
    async fn upload_study(
        &self,
        request: StudyUploadRequest,
        progress: ProgressSink,
    ) -> AppResult<StudyUploadReceipt>;
}

/// Uploads studies over HTTP with [`ApiClient`].
#[derive(Debug, Clone)]
pub struct HttpStudyUploader {
    client: ApiClient,
}

impl HttpStudyUploader {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl StudyUploader for HttpStudyUploader {
    async fn upload_study(
        &self,
        request: StudyUploadRequest,
        progress: ProgressSink,
    ) -> AppResult<StudyUploadReceipt> {
        let total_bytes = request.total_bytes();
        let tracker = TransferTracker::new(total_bytes, progress);

        let metadata = &request.metadata;
        let mut form = Form::new()
            .text("visit_id", metadata.visit_id().to_string())
            .text("findings", metadata.findings.clone())
            .text("recommendations", metadata.recommendations.clone());

        if let Some(body_part) = metadata.body_part_override() {
            form = form.text("body_part_override", body_part.to_string());
        }

        for file in &request.files {
            form = form.part(DICOM_FILES_FIELD, file_part(file, tracker.clone())?);
        }

        info!(
            visit_id = %metadata.visit_id(),
            files = request.files.len(),
            total_bytes,
            "Submitting DICOM study"
        );

        let response = self
            .client
            .post(UPLOAD_STUDY_PATH)
            .multipart(form)
            .send()
            .await?;

        let response = ApiClient::read_envelope::<UploadStudyData>(response).await?;

        info!(
            visit_id = %metadata.visit_id(),
            total_files = response.data.total_files,
            "DICOM study accepted by server"
        );

        Ok(StudyUploadReceipt {
            message: response.message,
            data: response.data,
        })
    }
}

/// Shared byte counter across every part of one request.
#[derive(Clone)]
struct TransferTracker {
    sent: Arc<AtomicU64>,
    total: u64,
    sink: ProgressSink,
}

impl TransferTracker {
    fn new(total: u64, sink: ProgressSink) -> Self {
        Self {
            sent: Arc::new(AtomicU64::new(0)),
            total,
            sink,
        }
    }

    fn advance(&self, bytes: usize) {
        let sent = self.sent.fetch_add(bytes as u64, Ordering::Relaxed) + bytes as u64;
        self.sink.report(sent, self.total);
    }
}

/// Build the multipart part for one file, counting bytes as they are pulled.
///
/// Disk files are not opened here; see [`disk_chunks`].
fn file_part(file: &SelectableFile, tracker: TransferTracker) -> AppResult<Part> {
    let chunks: ChunkStream = match file.source {
        FileSource::Memory(ref bytes) => memory_chunks(Arc::clone(bytes)),
        FileSource::Disk(ref path) => disk_chunks(path.clone()),
    };

    let counted = chunks.map(move |chunk| {
        if let Ok(ref data) = chunk {
            tracker.advance(data.len());
        }
        chunk
    });

    let part = Part::stream_with_length(Body::wrap_stream(counted), file.size_bytes)
        .file_name(file.relative_path.clone())
        .mime_str(DICOM_MIME)?;

    Ok(part)
}

fn memory_chunks(bytes: Arc<[u8]>) -> ChunkStream {
    let chunks: Vec<io::Result<Vec<u8>>> = bytes
        .chunks(UPLOAD_CHUNK_SIZE)
        .map(|chunk| Ok(chunk.to_vec()))
        .collect();
    Box::pin(stream::iter(chunks))
}

enum DiskRead {
    Pending(PathBuf),
    Open(tokio::fs::File),
    Done,
}

/// Stream a file from disk, opening it on first poll.
///
/// Only the part hyper is currently writing holds a descriptor, so a study
/// may contain more files than the process may open at once. The handle is
/// closed as soon as the file hits EOF.
fn disk_chunks(path: PathBuf) -> ChunkStream {
    Box::pin(stream::unfold(DiskRead::Pending(path), |state| async move {
        let mut file = match state {
            DiskRead::Pending(path) => match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) => return Some((Err(e), DiskRead::Done)),
            },
            DiskRead::Open(file) => file,
            DiskRead::Done => return None,
        };

        let mut buf = vec![0u8; UPLOAD_CHUNK_SIZE];
        match file.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(buf), DiskRead::Open(file)))
            }
            Err(e) => Some((Err(e), DiskRead::Done)),
        }
    }))
}
