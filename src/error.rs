//! Domain error types for the DICOM study uploader.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use std::error::Error as StdError;
use std::io;

/// Shown when the request times out or the connection is aborted mid-transfer.
pub const TIMEOUT_MESSAGE: &str =
    "Upload timed out. Try uploading fewer files at a time.";

/// Shown when the failure carries no usable server message.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to upload DICOM study. Please try again.";

/// Shown once, at the moment the user confirms cancellation.
pub const CANCELLED_MESSAGE: &str = "Upload cancelled.";

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    /// Local validation failed before any network call
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Another upload session is still active
    #[error("An upload is already in progress")]
    SessionActive,

    /// The operation was aborted by its own cancellation token
    #[error("Upload cancelled")]
    Cancelled,

    /// Request timed out or the connection was aborted
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Server answered with an error status or a non-success envelope
    #[error("Server rejected request (status {}): {}", .status.map(|s| s.to_string()).unwrap_or_else(|| "n/a".to_string()), .message.as_deref().unwrap_or("no message"))]
    Server {
        status: Option<u16>,
        message: Option<String>,
    },

    /// Transport failed for any other reason (DNS, refused connection, TLS)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Reading a local file failed
    #[error("File system error: {0}")]
    FileSystem(String),

    /// Response body could not be understood
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

/// Convenience type alias for Results with UploadError.
pub type AppResult<T> = Result<T, UploadError>;

/// Terminal failure classes, checked in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Aborted by the session's own token. Never reported as an error.
    Cancelled,
    /// Timeout or connection abort.
    Timeout,
    /// Everything else, with the message to surface.
    Rejected { message: String },
}

impl FailureKind {
    /// User-facing message, or `None` for cancellation (already reported at cancel time).
    pub fn user_message(&self) -> Option<&str> {
        match self {
            FailureKind::Cancelled => None,
            FailureKind::Timeout => Some(TIMEOUT_MESSAGE),
            FailureKind::Rejected { message } => Some(message),
        }
    }
}

impl UploadError {
    /// Build an error from a non-success HTTP status and the server's message, if any.
    ///
    /// 408 and 504 are gateway/server timeouts and classify as timeouts.
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        match status {
            408 | 504 => UploadError::Timeout(
                message.unwrap_or_else(|| format!("server responded with status {}", status)),
            ),
            _ => UploadError::Server {
                status: Some(status),
                message,
            },
        }
    }

    /// Classify a failed upload.
    ///
    /// `cancelled_by_session` is whether the session's own token was signalled;
    /// it wins over whatever error the aborted transport produced.
    pub fn classify(&self, cancelled_by_session: bool) -> FailureKind {
        if cancelled_by_session {
            return FailureKind::Cancelled;
        }

        match self {
            UploadError::Cancelled => FailureKind::Cancelled,
            UploadError::Timeout(_) => FailureKind::Timeout,
            UploadError::Server {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => FailureKind::Rejected {
                message: message.clone(),
            },
            _ => FailureKind::Rejected {
                message: GENERIC_FAILURE_MESSAGE.to_string(),
            },
        }
    }

    /// Whether this error was raised by local validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, UploadError::InvalidInput(_))
    }
}

// Conversion implementations for common error types

impl From<reqwest::Error> for UploadError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || is_connection_aborted(&err) {
            return UploadError::Timeout(err.to_string());
        }
        if let Some(status) = err.status() {
            return UploadError::from_status(status.as_u16(), None);
        }
        if err.is_decode() {
            return UploadError::UnexpectedResponse(err.to_string());
        }
        UploadError::Transport(err.to_string())
    }
}

impl From<serde_json::Error> for UploadError {
    fn from(err: serde_json::Error) -> Self {
        UploadError::UnexpectedResponse(format!("JSON parsing error: {}", err))
    }
}

impl From<io::Error> for UploadError {
    fn from(err: io::Error) -> Self {
        UploadError::FileSystem(err.to_string())
    }
}

/// Walk the source chain looking for an aborted or timed-out socket.
fn is_connection_aborted(err: &(dyn StdError + 'static)) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io_err) = e.downcast_ref::<io::Error>()
            && matches!(
                io_err.kind(),
                io::ErrorKind::TimedOut | io::ErrorKind::ConnectionAborted
            )
        {
            return true;
        }
        current = e.source();
    }
    false
}
