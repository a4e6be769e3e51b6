//! Leave-page guard scoped to an upload session.
//!
//! A session registers while it is uploading and the registration is removed
//! when it is dropped, so the warning can never outlive the upload that armed it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use uuid::Uuid;

/// Warning shown when leaving while an upload is in flight.
pub const LEAVE_WARNING: &str =
    "A DICOM upload is in progress. Leaving this page will cancel it and all progress will be lost.";

/// Registry of live leave-guard registrations.
#[derive(Clone, Default)]
pub struct LeaveGuard {
    registrations: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl LeaveGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the guard for `session_id` until the returned registration is dropped.
    pub fn register(&self, session_id: Uuid, warning: impl Into<String>) -> LeaveGuardRegistration {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session_id, warning.into());

        LeaveGuardRegistration {
            session_id,
            registrations: Arc::clone(&self.registrations),
        }
    }

    /// Warning to show before leaving, if any upload is in flight.
    pub fn leave_warning(&self) -> Option<String> {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .next()
            .cloned()
    }

    pub fn is_armed(&self) -> bool {
        !self
            .registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty()
    }
}

/// Live registration. Dropping it disarms the guard for its session.
pub struct LeaveGuardRegistration {
    session_id: Uuid,
    registrations: Arc<Mutex<HashMap<Uuid, String>>>,
}

impl std::fmt::Debug for LeaveGuardRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaveGuardRegistration")
            .field("session_id", &self.session_id)
            .finish()
    }
}

impl Drop for LeaveGuardRegistration {
    fn drop(&mut self) {
        self.registrations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.session_id);
    }
}
