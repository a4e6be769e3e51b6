//! Upload session lifecycle states.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::BatchSummary;

/// Lifecycle state of an upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Preparing,
    Uploading,
    Finalizing,
    Succeeded,
    Cancelled,
    Failed,
}

impl SessionState {
    /// Get state name as string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Preparing => "preparing",
            Self::Uploading => "uploading",
            Self::Finalizing => "finalizing",
            Self::Succeeded => "succeeded",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        }
    }

    /// A session in one of these states blocks a new submission.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Preparing | Self::Uploading | Self::Finalizing)
    }

    /// Default status line for the state.
    pub fn status_message(&self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Preparing => "Preparing upload...",
            Self::Uploading => "Uploading DICOM files...",
            Self::Finalizing => "Processing DICOM metadata...",
            Self::Succeeded => "Upload complete!",
            Self::Cancelled => "Upload cancelled",
            Self::Failed => "Upload failed",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the orchestrator for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: Option<Uuid>,
    pub state: SessionState,
    pub progress_percent: u8,
    pub status_message: String,
    pub cancel_prompt_open: bool,
    pub batch: BatchSummary,
}
