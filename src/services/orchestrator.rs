//! Upload orchestrator.
//!
//! Owns the batch, the study metadata and the single upload session. All
//! mutation happens under one lock; the ticker and the transport progress sink
//! re-check the session id under that lock before touching progress, so a
//! callback from a cancelled or replaced session is a no-op.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{ProgressSink, StudyUploadReceipt, StudyUploadRequest, StudyUploader};
use crate::config::Config;
use crate::error::{AppResult, CANCELLED_MESSAGE, FailureKind, UploadError};
use crate::models::{
    FileIntakeResult, NavigationTarget, Notification, NotificationLevel, RawFile,
    SessionSnapshot, SessionState, StudyMetadata, UploadEvent, UploadEventMessage,
};
use crate::models::upload_event::{ProgressPayload, StateChangedPayload};
use crate::services::event_broadcaster::EventBroadcaster;
use crate::services::intake::{UploadBatch, filter_candidates, scan_directory};
use crate::services::leave_guard::{LEAVE_WARNING, LeaveGuard};
use crate::services::progress::{TickControl, spawn_fallback_ticker};
use crate::services::session::UploadSession;

const MISSING_VISIT_MESSAGE: &str = "Please enter a visit ID";
const EMPTY_BATCH_MESSAGE: &str = "Please select at least one DICOM file";
const NO_DICOM_FILES_MESSAGE: &str =
    "No valid DICOM files selected. Accepted formats: .dcm, .dicom, or files without extension";
const BATCH_LOCKED_MESSAGE: &str = "Cannot change files while an upload is in progress";
const UPLOAD_SUCCESS_MESSAGE: &str = "DICOM study uploaded successfully";

/// Timing knobs for the orchestrator.
#[derive(Debug, Clone)]
pub struct UploadSettings {
    /// Period of the fallback progress ticker.
    pub progress_tick: Duration,
    /// How long the completed state is held before navigating or resetting.
    pub success_display: Duration,
    /// Base used to resolve relative viewer URLs returned by the server.
    pub viewer_base_url: Option<String>,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            progress_tick: Duration::from_secs(1),
            success_display: Duration::from_millis(500),
            viewer_base_url: None,
        }
    }
}

impl From<&Config> for UploadSettings {
    fn from(config: &Config) -> Self {
        Self {
            progress_tick: Duration::from_millis(config.progress_tick_ms),
            success_display: Duration::from_millis(config.success_display_ms),
            viewer_base_url: config.viewer_base_url.clone(),
        }
    }
}

impl UploadSettings {
    /// Absolute viewer URL. Absolute inputs, or inputs without a configured
    /// base, are returned unchanged.
    pub fn resolve_viewer_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            return url.to_string();
        }
        match self.viewer_base_url {
            Some(ref base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                url.trim_start_matches('/')
            ),
            None => url.to_string(),
        }
    }
}

/// Terminal result of [`UploadOrchestrator::submit`].
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    Succeeded {
        receipt: StudyUploadReceipt,
        /// Set when the orchestrator was opened for a specific visit.
        navigation: Option<NavigationTarget>,
    },
    /// Cancelled by the user. Already reported when the cancel was confirmed.
    Cancelled,
    Failed(FailureKind),
}

#[derive(Debug, Default)]
struct OrchestratorState {
    metadata: StudyMetadata,
    batch: UploadBatch,
    session: UploadSession,
    cancel_prompt_open: bool,
}

fn lock_state(state: &Mutex<OrchestratorState>) -> MutexGuard<'_, OrchestratorState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Drives one upload form: intake, submission, progress and cancellation.
///
/// Clones share the same form. Dropping the last clone drops the batch and
/// cancels any upload still in flight.
pub struct UploadOrchestrator<U: StudyUploader> {
    uploader: Arc<U>,
    settings: UploadSettings,
    events: EventBroadcaster,
    leave_guard: LeaveGuard,
    visit_context: Option<String>,
    state: Arc<Mutex<OrchestratorState>>,
}

impl<U: StudyUploader> Clone for UploadOrchestrator<U> {
    fn clone(&self) -> Self {
        Self {
            uploader: Arc::clone(&self.uploader),
            settings: self.settings.clone(),
            events: self.events.clone(),
            leave_guard: self.leave_guard.clone(),
            visit_context: self.visit_context.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<U: StudyUploader> UploadOrchestrator<U> {
    /// Standalone form: after a successful upload the form resets in place.
    pub fn new(uploader: U, settings: UploadSettings) -> Self {
        Self {
            uploader: Arc::new(uploader),
            settings,
            events: EventBroadcaster::new(),
            leave_guard: LeaveGuard::new(),
            visit_context: None,
            state: Arc::new(Mutex::new(OrchestratorState::default())),
        }
    }

    /// Form opened from a visit: the visit id is prefilled and a successful
    /// upload navigates back to that visit. A blank id gives a standalone form.
    pub fn for_visit(uploader: U, settings: UploadSettings, visit_id: impl Into<String>) -> Self {
        let visit_id = visit_id.into().trim().to_string();
        let orchestrator = Self {
            visit_context: Some(visit_id.clone()).filter(|id| !id.is_empty()),
            ..Self::new(uploader, settings)
        };
        orchestrator.lock().metadata = StudyMetadata::for_visit(visit_id);
        orchestrator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEventMessage> {
        self.events.subscribe()
    }

    pub fn leave_guard(&self) -> &LeaveGuard {
        &self.leave_guard
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.lock();
        SessionSnapshot {
            session_id: state.session.id(),
            state: state.session.state(),
            progress_percent: state.session.progress_percent(),
            status_message: state.session.status_message().to_string(),
            cancel_prompt_open: state.cancel_prompt_open,
            batch: state.batch.summary(),
        }
    }

    pub fn metadata(&self) -> StudyMetadata {
        self.lock().metadata.clone()
    }

    /// Replace the form fields. An upload already in flight keeps the values it
    /// was submitted with.
    pub fn set_metadata(&self, metadata: StudyMetadata) {
        self.lock().metadata = metadata;
    }

    /// Offer candidate files to the batch.
    ///
    /// Non-DICOM names are dropped and reported as a count. If nothing is
    /// accepted the batch is left unchanged. Refused while a session is active.
    pub fn add_files(&self, candidates: Vec<RawFile>) -> AppResult<FileIntakeResult> {
        let mut state = self.lock();
        if state.session.is_active() {
            self.notify(NotificationLevel::Warning, BATCH_LOCKED_MESSAGE);
            return Err(UploadError::SessionActive);
        }

        let result = filter_candidates(candidates);

        if result.rejected_count > 0 {
            self.notify(
                NotificationLevel::Warning,
                format!(
                    "{} file(s) were skipped (not DICOM format)",
                    result.rejected_count
                ),
            );
        }

        if result.accepted.is_empty() {
            self.notify(NotificationLevel::Error, NO_DICOM_FILES_MESSAGE);
            return Ok(result);
        }

        state.batch.extend(result.accepted.iter().cloned());
        debug!(
            accepted = result.accepted.len(),
            rejected = result.rejected_count,
            batch = state.batch.len(),
            "Files added to batch"
        );
        self.events.send(UploadEvent::BatchChanged(state.batch.summary()));

        Ok(result)
    }

    /// Offer every file under `root`, keeping folder-relative paths.
    pub fn add_directory(&self, root: &Path) -> AppResult<FileIntakeResult> {
        let candidates = scan_directory(root)?;
        self.add_files(candidates)
    }

    /// Remove one file. Returns false if nothing was removed or a session is active.
    pub fn remove_file(&self, index: usize) -> bool {
        let mut state = self.lock();
        if state.session.is_active() {
            return false;
        }
        if state.batch.remove(index).is_none() {
            return false;
        }
        self.events.send(UploadEvent::BatchChanged(state.batch.summary()));
        true
    }

    /// Empty the batch. Returns false while a session is active.
    pub fn clear_all(&self) -> bool {
        let mut state = self.lock();
        if state.session.is_active() {
            return false;
        }
        state.batch.clear();
        self.events.send(UploadEvent::BatchChanged(state.batch.summary()));
        true
    }

    /// Submit the batch as one study and drive the session to a terminal state.
    ///
    /// Validation failures return `Err` without touching the network; every
    /// outcome after dispatch is reported through [`UploadOutcome`]. Dropping
    /// the returned future aborts the request and resets the session.
    pub async fn submit(&self) -> AppResult<UploadOutcome> {
        let (session_id, token, request) = self.begin_session()?;
        let _in_flight = InFlightGuard {
            state: Arc::downgrade(&self.state),
            events: self.events.clone(),
            session_id,
        };

        let sink = self.progress_sink(session_id);
        let result = tokio::select! {
            biased;
            _ = token.cancelled() => Err(UploadError::Cancelled),
            result = self.uploader.upload_study(request, sink) => result,
        };

        match result {
            Ok(receipt) => Ok(self.finish_success(session_id, receipt).await),
            Err(err) => Ok(self.finish_failure(session_id, &token, err)),
        }
    }

    /// First step of cancellation: ask the user to confirm.
    pub fn request_cancel(&self) -> bool {
        let mut state = self.lock();
        let Some(session_id) = uploading_id(&state.session) else {
            return false;
        };
        state.cancel_prompt_open = true;
        self.events
            .send(UploadEvent::CancelConfirmationRequested { session_id });
        true
    }

    /// Second step: abort the upload.
    ///
    /// The session is back in `Idle` with zero progress when this returns; the
    /// transport observes the abort afterwards.
    pub fn confirm_cancel(&self) -> bool {
        let mut state = self.lock();
        if !state.cancel_prompt_open {
            return false;
        }
        state.cancel_prompt_open = false;

        let Some(session_id) = uploading_id(&state.session) else {
            return false;
        };

        state.session.cancel();
        self.emit_state(&state.session);
        info!(session_id = %session_id, "Upload cancelled by user");
        self.notify(NotificationLevel::Info, CANCELLED_MESSAGE);

        state.session.reset();
        self.emit_state(&state.session);
        true
    }

    /// Close the confirmation prompt and keep uploading.
    pub fn dismiss_cancel(&self) -> bool {
        let mut state = self.lock();
        std::mem::replace(&mut state.cancel_prompt_open, false)
    }

    fn lock(&self) -> MutexGuard<'_, OrchestratorState> {
        lock_state(&self.state)
    }

    /// Validate, then move Idle -> Preparing -> Uploading.
    fn begin_session(&self) -> AppResult<(Uuid, CancellationToken, StudyUploadRequest)> {
        let mut state = self.lock();

        if state.session.is_active() {
            warn!("Submit ignored: an upload is already in progress");
            return Err(UploadError::SessionActive);
        }
        if !state.metadata.has_visit_id() {
            self.notify(NotificationLevel::Error, MISSING_VISIT_MESSAGE);
            return Err(UploadError::InvalidInput(MISSING_VISIT_MESSAGE.to_string()));
        }
        if state.batch.is_empty() {
            self.notify(NotificationLevel::Error, EMPTY_BATCH_MESSAGE);
            return Err(UploadError::InvalidInput(EMPTY_BATCH_MESSAGE.to_string()));
        }

        let session_id = Uuid::now_v7();
        state.session.begin(session_id);
        state.cancel_prompt_open = false;
        self.emit_state(&state.session);

        let request = StudyUploadRequest::new(state.metadata.clone(), state.batch.files().to_vec());
        let token = CancellationToken::new();
        let ticker = self.spawn_ticker(session_id);
        let registration = self.leave_guard.register(session_id, LEAVE_WARNING);

        state
            .session
            .start_uploading(token.clone(), ticker, registration);
        self.emit_state(&state.session);

        info!(
            session_id = %session_id,
            visit_id = %request.metadata.visit_id(),
            files = request.files.len(),
            total_bytes = request.total_bytes(),
            "Upload started"
        );

        Ok((session_id, token, request))
    }

    fn spawn_ticker(&self, session_id: Uuid) -> JoinHandle<()> {
        let state = Arc::downgrade(&self.state);
        let events = self.events.clone();

        spawn_fallback_ticker(self.settings.progress_tick, move || {
            let Some(state) = state.upgrade() else {
                return TickControl::Stop;
            };
            let mut state = lock_state(&state);
            if !state.session.is_uploading(session_id) {
                return TickControl::Stop;
            }
            if let Some(progress_percent) = state.session.tick() {
                events.send(UploadEvent::Progress(ProgressPayload {
                    session_id,
                    progress_percent,
                }));
            }
            TickControl::Continue
        })
    }

    fn progress_sink(&self, session_id: Uuid) -> ProgressSink {
        let state = Arc::downgrade(&self.state);
        let events = self.events.clone();

        ProgressSink::new(move |sent, total| {
            let Some(state) = state.upgrade() else {
                return;
            };
            let mut state = lock_state(&state);
            if !state.session.is_uploading(session_id) {
                return;
            }
            if let Some(progress_percent) = state.session.record_transfer(sent, total) {
                events.send(UploadEvent::Progress(ProgressPayload {
                    session_id,
                    progress_percent,
                }));
            }
        })
    }

    async fn finish_success(&self, session_id: Uuid, receipt: StudyUploadReceipt) -> UploadOutcome {
        {
            let mut state = self.lock();
            if !state.session.is_uploading(session_id) {
                debug!(session_id = %session_id, "Ignoring response for a session that is no longer uploading");
                return UploadOutcome::Cancelled;
            }

            state.cancel_prompt_open = false;
            state.session.finalize();
            self.emit_state(&state.session);

            state.session.complete();
            self.emit_state(&state.session);

            info!(
                session_id = %session_id,
                total_files = receipt.data.total_files,
                total_size_mb = receipt.data.total_size_mb,
                "Upload complete"
            );

            let message = receipt
                .message
                .as_deref()
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(UPLOAD_SUCCESS_MESSAGE);
            self.notify(NotificationLevel::Success, message);

            if let Some(ref url) = receipt.data.viewer_url {
                self.events.send(UploadEvent::ViewerAvailable {
                    url: self.settings.resolve_viewer_url(url),
                });
            }

            state.batch.clear();
            self.events.send(UploadEvent::BatchChanged(state.batch.summary()));
        }

        tokio::time::sleep(self.settings.success_display).await;

        let mut state = self.lock();
        if !state.session.is_current(session_id) {
            // A newer session replaced this one during the display delay.
            return UploadOutcome::Succeeded {
                receipt,
                navigation: None,
            };
        }

        let navigation = match self.visit_context {
            Some(ref visit_id) => {
                let target = NavigationTarget::VisitDetail {
                    visit_id: visit_id.clone(),
                };
                debug!(route = %target.route(), "Navigating to visit");
                self.events.send(UploadEvent::Navigate(target.clone()));
                Some(target)
            }
            None => {
                state.metadata.clear();
                state.batch.clear();
                state.session.reset();
                self.events.send(UploadEvent::FormReset);
                self.emit_state(&state.session);
                None
            }
        };

        UploadOutcome::Succeeded {
            receipt,
            navigation,
        }
    }

    fn finish_failure(
        &self,
        session_id: Uuid,
        token: &CancellationToken,
        err: UploadError,
    ) -> UploadOutcome {
        let mut state = self.lock();
        if !state.session.is_uploading(session_id) {
            // Already reset by confirm_cancel.
            debug!(session_id = %session_id, error = %err, "Upload aborted after cancellation");
            return UploadOutcome::Cancelled;
        }

        state.cancel_prompt_open = false;
        let kind = err.classify(token.is_cancelled());

        match kind {
            FailureKind::Cancelled => {
                // Aborted below us without a confirmed cancel: report it once here.
                warn!(session_id = %session_id, "Upload aborted by transport");
                state.session.cancel();
                self.emit_state(&state.session);
                self.notify(NotificationLevel::Info, CANCELLED_MESSAGE);
            }
            FailureKind::Timeout => {
                warn!(session_id = %session_id, error = %err, "Upload timed out");
                self.fail_session(&mut state, &kind);
            }
            FailureKind::Rejected { .. } => {
                error!(session_id = %session_id, error = %err, "Upload failed");
                self.fail_session(&mut state, &kind);
            }
        }

        state.session.reset();
        self.emit_state(&state.session);

        match kind {
            FailureKind::Cancelled => UploadOutcome::Cancelled,
            kind => UploadOutcome::Failed(kind),
        }
    }

    fn fail_session(&self, state: &mut OrchestratorState, kind: &FailureKind) {
        state.session.fail();
        self.emit_state(&state.session);
        if let Some(message) = kind.user_message() {
            self.notify(NotificationLevel::Error, message);
        }
    }

    fn emit_state(&self, session: &UploadSession) {
        emit_state(&self.events, session);
    }

    fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.events
            .send(UploadEvent::Notification(Notification::new(level, message)));
    }
}

fn uploading_id(session: &UploadSession) -> Option<Uuid> {
    session
        .id()
        .filter(|_| session.state() == SessionState::Uploading)
}

fn emit_state(events: &EventBroadcaster, session: &UploadSession) {
    events.send(UploadEvent::StateChanged(StateChangedPayload {
        session_id: session.id(),
        state: session.state(),
        progress_percent: session.progress_percent(),
        status_message: session.status_message().to_string(),
    }));
}

/// Resets the session if `submit` is dropped while it is still active.
struct InFlightGuard {
    state: Weak<Mutex<OrchestratorState>>,
    events: EventBroadcaster,
    session_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let Some(state) = self.state.upgrade() else {
            return;
        };
        let mut state = lock_state(&state);
        if state.session.is_current(self.session_id) && state.session.is_active() {
            warn!(session_id = %self.session_id, "Upload abandoned before completion");
            state.cancel_prompt_open = false;
            state.session.reset();
            emit_state(&self.events, &state.session);
        }
    }
}
