//! Upload progress blending and the fallback ticker.
//!
//! Displayed progress is `min(cap, max(real, synthetic))`:
//! - real: bytes handed to the transport, as a percentage of the payload
//! - synthetic: advanced by the fallback ticker so the bar moves while the
//!   transport reports nothing (server-side buffering, slow links)
//!
//! Both inputs only ever grow, so the blend is non-decreasing.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

/// Highest percentage shown before the server confirms success.
pub const PROGRESS_CAP: u8 = 90;

/// Points added by each fallback tick.
pub const SYNTHETIC_STEP: u8 = 5;

/// Shown while the server response is being processed.
pub const FINALIZING_PROGRESS: u8 = 95;

/// Shown once the upload has succeeded.
pub const COMPLETE_PROGRESS: u8 = 100;

/// Combines real and synthetic progress for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressBlend {
    real: u8,
    synthetic: u8,
}

impl ProgressBlend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record bytes sent by the transport. Returns the displayed percentage.
    pub fn record_transfer(&mut self, sent: u64, total: u64) -> u8 {
        let percent = percent_of(sent, total).min(PROGRESS_CAP);
        self.real = self.real.max(percent);
        self.displayed()
    }

    /// Advance the synthetic source by one step. Returns the displayed percentage.
    pub fn tick(&mut self) -> u8 {
        self.synthetic = self.synthetic.saturating_add(SYNTHETIC_STEP).min(PROGRESS_CAP);
        self.displayed()
    }

    pub fn displayed(&self) -> u8 {
        self.real.max(self.synthetic).min(PROGRESS_CAP)
    }
}

/// Integer percentage of `sent` over `total`, clamped to 0..=100.
fn percent_of(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    let percent = (sent.min(total) as u128 * 100) / total as u128;
    percent as u8
}

/// Whether the ticker should keep running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickControl {
    Continue,
    Stop,
}

/// Spawn the fallback ticker.
///
/// The first tick fires one `period` after spawning. The task ends as soon as
/// `on_tick` returns [`TickControl::Stop`]; owners also abort the handle on
/// teardown.
pub fn spawn_fallback_ticker<F>(period: Duration, mut on_tick: F) -> JoinHandle<()>
where
    F: FnMut() -> TickControl + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if on_tick() == TickControl::Stop {
                break;
            }
        }
    })
}
