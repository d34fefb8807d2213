use crate::state_machine::AppState;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Lock-free status shared between the capture task, the watchdog and the
/// supervisor. Each field has a single writer: the capture task owns
/// `state`, `last_activity` and `frames_saved`, the supervisor owns
/// `restarts` and the running token.
#[derive(Debug)]
pub struct SharedStatus {
    state: AtomicU8,
    epoch: Instant,
    last_activity_ms: AtomicU64,
    restarts: AtomicU32,
    frames_saved: AtomicU64,
    running: CancellationToken,
}

/// Point-in-time copy of [`SharedStatus`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatusSnapshot {
    pub state: AppState,
    pub last_activity_age: Duration,
    pub restarts: u32,
    pub frames_saved: u64,
}

impl SharedStatus {
    pub fn new(running: CancellationToken) -> Self {
        Self {
            state: AtomicU8::new(AppState::Off.as_u8()),
            epoch: Instant::now(),
            last_activity_ms: AtomicU64::new(0),
            restarts: AtomicU32::new(0),
            frames_saved: AtomicU64::new(0),
            running,
        }
    }

    pub fn state(&self) -> AppState {
        AppState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: AppState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Liveness heartbeat
    pub fn touch(&self) {
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_activity_ms.store(now, Ordering::Release);
    }

    pub fn last_activity_age(&self) -> Duration {
        let last = self.last_activity_ms.load(Ordering::Acquire);
        let now = self.epoch.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(last))
    }

    pub fn record_restart(&self) -> u32 {
        self.restarts.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn restarts(&self) -> u32 {
        self.restarts.load(Ordering::Acquire)
    }

    pub fn record_saved_frame(&self) -> u64 {
        self.frames_saved.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn frames_saved(&self) -> u64 {
        self.frames_saved.load(Ordering::Acquire)
    }

    /// Global running flag, cancelled once on shutdown
    pub fn running(&self) -> &CancellationToken {
        &self.running
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_cancelled()
    }

    pub fn request_shutdown(&self) {
        self.running.cancel();
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            state: self.state(),
            last_activity_age: self.last_activity_age(),
            restarts: self.restarts(),
            frames_saved: self.frames_saved(),
        }
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state={} last_activity={:?} ago restarts={} frames_saved={}",
            self.state, self.last_activity_age, self.restarts, self.frames_saved
        )
    }
}
