//! Events emitted to the presentation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BatchSummary, SessionState};

/// Severity of a user notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Toast-style notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Where the presentation layer should go after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NavigationTarget {
    VisitDetail { visit_id: String },
}

impl NavigationTarget {
    /// Front-end route for the target.
    pub fn route(&self) -> String {
        match self {
            NavigationTarget::VisitDetail { visit_id } => format!("/visits/{}", visit_id),
        }
    }
}

/// Event sent to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum UploadEvent {
    /// The batch was modified.
    BatchChanged(BatchSummary),
    /// The session moved to a new state.
    StateChanged(StateChangedPayload),
    /// Displayed progress increased.
    Progress(ProgressPayload),
    /// Toast notification.
    Notification(Notification),
    /// First step of the two-step cancel; ask the user to confirm.
    CancelConfirmationRequested { session_id: Uuid },
    /// The server returned a viewer link the user may open.
    ViewerAvailable { url: String },
    /// Navigate away from the upload form.
    Navigate(NavigationTarget),
    /// The form was cleared in place for another submission.
    FormReset,
}

/// Payload for state_changed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateChangedPayload {
    pub session_id: Option<Uuid>,
    pub state: SessionState,
    pub progress_percent: u8,
    pub status_message: String,
}

/// Payload for progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub session_id: Uuid,
    pub progress_percent: u8,
}

/// Wrapper that includes timestamp with every event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadEventMessage {
    #[serde(flatten)]
    pub event: UploadEvent,
    pub timestamp: DateTime<Utc>,
}

impl UploadEventMessage {
    /// Create a new event message with the current timestamp.
    pub fn new(event: UploadEvent) -> Self {
        Self {
            event,
            timestamp: Utc::now(),
        }
    }
}
