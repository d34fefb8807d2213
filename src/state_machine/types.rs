use crate::config::{CaptureMode, PisnapConfig};
use crate::events::ButtonEvent;
use crate::session::SessionClock;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level appliance state. Written only by the capture task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AppState {
    /// Panel dark, camera idle
    Off,
    /// Live preview with histogram
    Idle,
    /// Frames streaming to the session directory
    Capturing,
}

impl AppState {
    pub fn as_u8(self) -> u8 {
        match self {
            AppState::Off => 0,
            AppState::Idle => 1,
            AppState::Capturing => 2,
        }
    }

    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => AppState::Idle,
            2 => AppState::Capturing,
            _ => AppState::Off,
        }
    }
}

impl fmt::Display for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppState::Off => write!(f, "OFF"),
            AppState::Idle => write!(f, "IDLE"),
            AppState::Capturing => write!(f, "CAPTURING"),
        }
    }
}

/// What a single tick ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Transition { from: AppState, to: AppState },
    /// OFF: nothing to do
    Standby,
    Previewed,
    PreviewMissed,
    Saved { count: u64 },
    CaptureMissed,
    SaveFailed,
    Recording,
    /// Hardware already handed back
    Released,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickOutcome {
    /// Event consumed this tick, if any
    pub event: Option<ButtonEvent>,
    pub action: TickAction,
    /// Pause before the next tick
    pub next_delay: Duration,
}

/// Static knobs of the capture task
#[derive(Debug, Clone)]
pub struct MachineSettings {
    pub capture_mode: CaptureMode,
    pub capture_root: PathBuf,
    pub clock: SessionClock,
    pub requested_gain: Option<f64>,
    pub requested_exposure_us: Option<u32>,
    pub preview_tick: Duration,
    pub capture_tick: Duration,
    pub off_tick: Duration,
}

impl MachineSettings {
    pub fn from_config(config: &PisnapConfig) -> Self {
        Self {
            capture_mode: config.capture.mode,
            capture_root: PathBuf::from(&config.capture.path),
            clock: SessionClock::from_name(Some(&config.capture.timezone)),
            requested_gain: config.camera.gain,
            requested_exposure_us: config.camera.exposure_us,
            preview_tick: Duration::from_millis(config.timing.preview_tick_ms),
            capture_tick: Duration::from_millis(config.timing.capture_tick_ms),
            off_tick: Duration::from_millis(config.timing.off_tick_ms),
        }
    }

    pub fn tick_delay(&self, state: AppState) -> Duration {
        match state {
            AppState::Off => self.off_tick,
            AppState::Idle => self.preview_tick,
            AppState::Capturing => self.capture_tick,
        }
    }
}
