//! Domain models for the DICOM study uploader.

pub mod envelope;
pub mod file;
pub mod session;
pub mod study;
pub mod upload_event;

// Re-export commonly used types
pub use envelope::{ApiEnvelope, ApiResponse, UploadStudyData};
pub use file::{BatchSummary, FileIntakeResult, FileSource, RawFile, SelectableFile};
pub use session::{SessionSnapshot, SessionState};
pub use study::StudyMetadata;
pub use upload_event::{
    NavigationTarget, Notification, NotificationLevel, UploadEvent, UploadEventMessage,
};
