use crate::camera::CameraMode;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PisnapError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Display error: {0}")]
    Display(#[from] DisplayError),

    #[error("Button input error: {0}")]
    Button(#[from] ButtonError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Event channel error: {0}")]
    EventChannel(#[from] EventChannelError),

    #[error("Capture task stalled: no activity for {elapsed:?}")]
    WatchdogTimeout { elapsed: Duration },

    #[error("Recovery failed for {component} after {attempts} attempts")]
    RecoveryFailed { component: String, attempts: u32 },

    #[error("System error: {message}")]
    System { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

/// Camera-level failures. Everything except `DeviceInit` and `Released` is a
/// transient condition that the capture loop absorbs.
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Failed to initialize camera {index}: {details}")]
    DeviceInit { index: u32, details: String },

    #[error("Frame acquisition failed on camera {index}: {details}")]
    FrameAcquisition { index: u32, details: String },

    #[error("Control write failed on camera {index}: {details}")]
    ControlWrite { index: u32, details: String },

    #[error("Switch to {mode} mode failed on camera {index}: {details}")]
    ModeSwitch {
        index: u32,
        mode: CameraMode,
        details: String,
    },

    #[error("Recording failed on camera {index}: {details}")]
    Recording { index: u32, details: String },

    #[error("Camera {index} has already been released")]
    Released { index: u32 },

    #[error("Camera {index} is not registered with the exposure controller")]
    UnknownCamera { index: u32 },
}

#[derive(Error, Debug)]
pub enum DisplayError {
    #[error("Failed to open display device {device}: {details}")]
    DeviceInit { device: String, details: String },

    #[error("Failed to open backlight device {device}")]
    BacklightOpen {
        device: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write to display: {details}")]
    Write { details: String },

    #[error("Format conversion failed: {details}")]
    FormatConversion { details: String },
}

#[derive(Error, Debug)]
pub enum ButtonError {
    #[error("Failed to open button device {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Failed to read button state: {details}")]
    DeviceRead { details: String },

    #[error("Button input not available on this system")]
    NotAvailable,
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Failed to create capture directory {path}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {details}")]
    Write { path: String, details: String },

    #[error("Failed to encode frame: {details}")]
    Encode { details: String },

    #[error("Unsupported frame for {format} output")]
    UnsupportedFrame { format: &'static str },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventChannelError {
    #[error("Event channel closed")]
    ChannelClosed,
}

impl PisnapError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn recovery_failed<S: Into<String>>(component: S, attempts: u32) -> Self {
        Self::RecoveryFailed {
            component: component.into(),
            attempts,
        }
    }

    /// Whether a supervised restart can be expected to clear this error
    pub fn is_recoverable(&self) -> bool {
        match self {
            PisnapError::Camera(e) => !matches!(e, CameraError::UnknownCamera { .. }),
            PisnapError::Display(_)
            | PisnapError::Button(_)
            | PisnapError::Persistence(_)
            | PisnapError::Io(_)
            | PisnapError::WatchdogTimeout { .. }
            | PisnapError::Component { .. } => true,
            PisnapError::Config(_)
            | PisnapError::Serialization(_)
            | PisnapError::EventChannel(_)
            | PisnapError::RecoveryFailed { .. }
            | PisnapError::System { .. } => false,
        }
    }
}

impl CameraError {
    /// Transient errors degrade to "no-op this tick"
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CameraError::FrameAcquisition { .. }
                | CameraError::ControlWrite { .. }
                | CameraError::ModeSwitch { .. }
                | CameraError::Recording { .. }
        )
    }

    pub fn camera_index(&self) -> u32 {
        match self {
            CameraError::DeviceInit { index, .. }
            | CameraError::FrameAcquisition { index, .. }
            | CameraError::ControlWrite { index, .. }
            | CameraError::ModeSwitch { index, .. }
            | CameraError::Recording { index, .. }
            | CameraError::Released { index }
            | CameraError::UnknownCamera { index } => *index,
        }
    }
}

pub type Result<T> = std::result::Result<T, PisnapError>;
