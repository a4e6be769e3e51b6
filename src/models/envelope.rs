//! JSON envelope shared by every API response.

use serde::{Deserialize, Serialize};

/// Envelope status value signalling success.
pub const STATUS_SUCCESS: &str = "success";

/// `{status, message?, data}` wrapper returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    pub fn is_success(&self) -> bool {
        self.status == STATUS_SUCCESS
    }
}

/// Unwrapped successful response.
#[derive(Debug, Clone)]
pub struct ApiResponse<T> {
    pub message: Option<String>,
    pub data: T,
}

/// `data` of a successful study upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadStudyData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewer_url: Option<String>,
    /// Study descriptors as returned by the server; the shape is server-defined.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub studies: Vec<serde_json::Value>,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub total_size_mb: f64,
}
