//! Upload session: state, progress and the handles it owns exclusively.
//!
//! The cancellation token, the fallback ticker and the leave-guard registration
//! live only here. Every transition out of `Uploading` tears all three down in
//! one call, and dropping the session does the same.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::SessionState;
use crate::services::leave_guard::LeaveGuardRegistration;
use crate::services::progress::{COMPLETE_PROGRESS, FINALIZING_PROGRESS, ProgressBlend};

/// One submission attempt. `Idle` sessions carry no id and no handles.
#[derive(Debug)]
pub struct UploadSession {
    id: Option<Uuid>,
    state: SessionState,
    blend: ProgressBlend,
    progress_percent: u8,
    status_message: String,
    cancel: Option<CancellationToken>,
    ticker: Option<JoinHandle<()>>,
    leave_guard: Option<LeaveGuardRegistration>,
}

impl Default for UploadSession {
    fn default() -> Self {
        Self::idle()
    }
}

impl UploadSession {
    pub fn idle() -> Self {
        Self {
            id: None,
            state: SessionState::Idle,
            blend: ProgressBlend::new(),
            progress_percent: 0,
            status_message: SessionState::Idle.status_message().to_string(),
            cancel: None,
            ticker: None,
            leave_guard: None,
        }
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn progress_percent(&self) -> u8 {
        self.progress_percent
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether `id` names this session.
    pub fn is_current(&self, id: Uuid) -> bool {
        self.id == Some(id)
    }

    /// Whether `id` names this session and it is still uploading.
    /// Callbacks must check this before touching progress.
    pub fn is_uploading(&self, id: Uuid) -> bool {
        self.is_current(id) && self.state == SessionState::Uploading
    }

    /// Whether the ticker task is still attached and running.
    pub fn has_live_ticker(&self) -> bool {
        self.ticker.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Idle -> Preparing. Replaces whatever terminal session was shown before.
    pub fn begin(&mut self, id: Uuid) {
        self.teardown();
        *self = Self::idle();
        self.id = Some(id);
        self.set_state(SessionState::Preparing);
    }

    /// Preparing -> Uploading, taking ownership of the session's handles.
    pub fn start_uploading(
        &mut self,
        cancel: CancellationToken,
        ticker: JoinHandle<()>,
        leave_guard: LeaveGuardRegistration,
    ) {
        self.cancel = Some(cancel);
        self.ticker = Some(ticker);
        self.leave_guard = Some(leave_guard);
        self.set_state(SessionState::Uploading);
    }

    /// Record transport progress. Returns the new percentage if it changed.
    pub fn record_transfer(&mut self, sent: u64, total: u64) -> Option<u8> {
        let shown = self.blend.record_transfer(sent, total);
        self.update_progress(shown)
    }

    /// Advance the synthetic progress. Returns the new percentage if it changed.
    pub fn tick(&mut self) -> Option<u8> {
        let shown = self.blend.tick();
        self.update_progress(shown)
    }

    /// Uploading -> Finalizing once the server reported success.
    pub fn finalize(&mut self) {
        self.teardown();
        self.progress_percent = FINALIZING_PROGRESS;
        self.set_state(SessionState::Finalizing);
    }

    /// Finalizing -> Succeeded.
    pub fn complete(&mut self) {
        self.progress_percent = COMPLETE_PROGRESS;
        self.set_state(SessionState::Succeeded);
    }

    /// Uploading -> Cancelled: stop the ticker, then signal the token.
    pub fn cancel(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
        self.leave_guard = None;
        self.progress_percent = 0;
        self.set_state(SessionState::Cancelled);
    }

    /// Uploading -> Failed.
    pub fn fail(&mut self) {
        self.teardown();
        self.progress_percent = 0;
        self.set_state(SessionState::Failed);
    }

    /// Any state -> Idle with zeroed progress and no handles.
    pub fn reset(&mut self) {
        self.teardown();
        *self = Self::idle();
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.status_message = state.status_message().to_string();
    }

    fn update_progress(&mut self, shown: u8) -> Option<u8> {
        if shown > self.progress_percent {
            self.progress_percent = shown;
            Some(shown)
        } else {
            None
        }
    }

    /// Release every handle. Tokens are dropped, not signalled: only a user
    /// cancel (or dropping the session) aborts the request.
    fn teardown(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        self.cancel = None;
        self.leave_guard = None;
    }
}

impl Drop for UploadSession {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.take() {
            ticker.abort();
        }
        if let Some(token) = self.cancel.take() {
            token.cancel();
        }
    }
}
