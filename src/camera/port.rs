use crate::error::CameraError;
use crate::frame::{CaptureKind, Frame};
use async_trait::async_trait;
use std::fmt;
use std::path::Path;

/// Sensor pipeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    /// Fast, small RGB stream for the live view
    Preview,
    /// Full-resolution raw stream for capture
    Still,
}

impl fmt::Display for CameraMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraMode::Preview => write!(f, "preview"),
            CameraMode::Still => write!(f, "still"),
        }
    }
}

/// A set of control values to write in one request. `None` leaves a control untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControlRequest {
    pub ae_enable: Option<bool>,
    /// `Some(true)` pins the analogue gain, `Some(false)` lets AE drive it
    pub manual_gain: Option<bool>,
    pub gain: Option<f64>,
    pub exposure_us: Option<u32>,
}

impl ControlRequest {
    pub fn manual(gain: f64, exposure_us: u32) -> Self {
        Self {
            gain: Some(gain),
            exposure_us: Some(exposure_us),
            ..Default::default()
        }
    }

    pub fn gain(gain: f64) -> Self {
        Self {
            gain: Some(gain),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ae_enable.is_none()
            && self.manual_gain.is_none()
            && self.gain.is_none()
            && self.exposure_us.is_none()
    }
}

/// Control values the camera reports for its most recent frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraMetadata {
    pub gain: f64,
    pub exposure_us: u32,
    pub ae_enabled: bool,
}

/// One physical camera. Frame pulls may block for the duration of hardware I/O.
#[async_trait]
pub trait CameraPort: Send {
    /// Camera index this port drives
    fn index(&self) -> u32;

    async fn configure_mode(&mut self, mode: CameraMode) -> Result<(), CameraError>;

    async fn set_controls(&mut self, controls: &ControlRequest) -> Result<(), CameraError>;

    /// Pull one frame. Raw stills arrive unpacked, one `u16` per pixel.
    async fn capture_frame(&mut self, kind: CaptureKind) -> Result<Frame, CameraError>;

    async fn metadata(&mut self) -> Result<CameraMetadata, CameraError>;

    async fn start_recording(&mut self, path: &Path) -> Result<(), CameraError>;

    async fn stop_recording(&mut self) -> Result<(), CameraError>;

    fn is_recording(&self) -> bool;

    /// Stop the sensor and free the device
    async fn release(&mut self) -> Result<(), CameraError>;
}
