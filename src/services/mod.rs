//! Upload workflow services.

pub mod event_broadcaster;
pub mod intake;
pub mod leave_guard;
pub mod orchestrator;
pub mod progress;
pub mod session;

pub use event_broadcaster::EventBroadcaster;
pub use intake::{UploadBatch, filter_candidates, is_dicom_candidate, scan_directory};
pub use leave_guard::{LEAVE_WARNING, LeaveGuard};
pub use orchestrator::{UploadOrchestrator, UploadOutcome, UploadSettings};
pub use session::UploadSession;
