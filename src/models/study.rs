//! Study metadata entered alongside the files.

use serde::{Deserialize, Serialize};

/// Form fields sent with a study upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudyMetadata {
    /// Visit the study is attached to. Required before a session may start.
    pub visit_id: String,
    /// Overrides the body part recorded in the DICOM headers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_part_override: Option<String>,
    #[serde(default)]
    pub findings: String,
    #[serde(default)]
    pub recommendations: String,
}

impl StudyMetadata {
    pub fn for_visit(visit_id: impl Into<String>) -> Self {
        Self {
            visit_id: visit_id.into(),
            ..Self::default()
        }
    }

    /// Visit id with surrounding whitespace removed.
    pub fn visit_id(&self) -> &str {
        self.visit_id.trim()
    }

    pub fn has_visit_id(&self) -> bool {
        !self.visit_id().is_empty()
    }

    /// Body part override, ignoring blank values.
    pub fn body_part_override(&self) -> Option<&str> {
        self.body_part_override
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Reset every field, visit id included.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
