use crate::exposure::ExposureMode;
use crate::sensor::SensorModel;
use crate::storage::RawFormat;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PisnapConfig {
    pub camera: CameraConfig,
    pub capture: CaptureConfig,
    pub display: DisplayConfig,
    pub timing: TimingConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CameraConfig {
    /// Camera index
    #[serde(default = "default_camera_index")]
    pub index: u32,

    /// Camera driver backend
    #[serde(default)]
    pub backend: CameraBackend,

    /// Sensor model, selects gain bounds, defaults and white levels
    #[serde(default = "default_sensor_model")]
    pub sensor_model: SensorModel,

    /// Exposure policy for the whole run
    #[serde(default)]
    pub exposure_mode: ExposureMode,

    /// Analogue gain; the sensor default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,

    /// Exposure time in microseconds; the sensor default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_us: Option<u32>,

    /// Preview stream size (width, height)
    #[serde(default = "default_preview_resolution")]
    pub preview_resolution: (u32, u32),

    /// Delay after the initial control write so the sensor settles
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,

    /// Simulated scene brightness as a fraction of white at default controls
    #[serde(default = "default_scene_luminance")]
    pub scene_luminance: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CameraBackend {
    #[default]
    Simulated,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Root directory for session directories
    #[serde(default = "default_capture_path")]
    pub path: String,

    /// Container for raw stills
    #[serde(default)]
    pub raw_format: RawFormat,

    /// What CAPTURING persists
    #[serde(default)]
    pub mode: CaptureMode,

    /// IANA zone for directory and file names, or "local"
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// TrueType font for the status screens
    #[serde(default = "default_font_path")]
    pub font_path: String,

    #[serde(default = "default_font_size")]
    pub font_size: f32,
}

/// What the camera produces while CAPTURING
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CaptureMode {
    #[default]
    Raw,
    Jpeg,
    Video,
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureMode::Raw => write!(f, "raw"),
            CaptureMode::Jpeg => write!(f, "jpeg"),
            CaptureMode::Video => write!(f, "video"),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DisplayConfig {
    /// Panel backend
    #[serde(default)]
    pub backend: DisplayBackend,

    /// Button backend
    #[serde(default)]
    pub buttons: ButtonBackend,

    /// Framebuffer device path
    #[serde(default = "default_framebuffer_device")]
    pub framebuffer_device: String,

    /// Backlight power control path
    #[serde(default = "default_backlight_device")]
    pub backlight_device: String,

    /// gpio-keys input device carrying both buttons
    #[serde(default = "default_button_device")]
    pub button_device: String,

    /// Display resolution (width, height)
    #[serde(default = "default_display_resolution")]
    pub resolution: (u32, u32),

    /// Key code reported for button A
    #[serde(default = "default_button_a_key")]
    pub button_a_key: u16,

    /// Key code reported for button B
    #[serde(default = "default_button_b_key")]
    pub button_b_key: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    #[default]
    Framebuffer,
    Headless,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ButtonBackend {
    #[default]
    Evdev,
    Keyboard,
    None,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_button_poll_ms")]
    pub button_poll_ms: u64,

    #[serde(default = "default_preview_tick_ms")]
    pub preview_tick_ms: u64,

    #[serde(default = "default_capture_tick_ms")]
    pub capture_tick_ms: u64,

    #[serde(default = "default_off_tick_ms")]
    pub off_tick_ms: u64,

    /// Capture task is restarted after this long without a heartbeat
    #[serde(default = "default_watchdog_timeout_ms")]
    pub watchdog_timeout_ms: u64,

    #[serde(default = "default_watchdog_check_ms")]
    pub watchdog_check_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Button event queue capacity
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,

    /// Consecutive capture task restarts before giving up
    #[serde(default = "default_max_restarts")]
    pub max_restarts: u32,

    #[serde(default = "default_restart_base_delay_ms")]
    pub restart_base_delay_ms: u64,

    #[serde(default = "default_restart_max_delay_ms")]
    pub restart_max_delay_ms: u64,

    /// Per-component stop timeout during shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

/// Command-line values that take precedence over every config source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliOverrides {
    pub exposure_mode: Option<ExposureMode>,
    pub gain: Option<f64>,
    pub exposure_us: Option<u32>,
    pub unpack_tiff: bool,
}

impl PisnapConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("pisnap.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            // Start with default values
            .set_default("camera.index", default_camera_index())?
            .set_default("camera.backend", "simulated")?
            .set_default("camera.sensor_model", default_sensor_model().to_string())?
            .set_default("camera.exposure_mode", ExposureMode::default().as_str())?
            .set_default(
                "camera.preview_resolution",
                vec![default_preview_resolution().0, default_preview_resolution().1],
            )?
            .set_default("camera.settle_ms", default_settle_ms() as i64)?
            .set_default("camera.scene_luminance", default_scene_luminance())?
            .set_default("capture.path", default_capture_path())?
            .set_default("capture.raw_format", RawFormat::default().extension())?
            .set_default("capture.mode", "raw")?
            .set_default("capture.timezone", default_timezone())?
            .set_default("capture.font_path", default_font_path())?
            .set_default("capture.font_size", default_font_size() as f64)?
            .set_default("display.backend", "framebuffer")?
            .set_default("display.buttons", "evdev")?
            .set_default("display.framebuffer_device", default_framebuffer_device())?
            .set_default("display.backlight_device", default_backlight_device())?
            .set_default("display.button_device", default_button_device())?
            .set_default(
                "display.resolution",
                vec![
                    default_display_resolution().0,
                    default_display_resolution().1,
                ],
            )?
            .set_default("display.button_a_key", default_button_a_key())?
            .set_default("display.button_b_key", default_button_b_key())?
            .set_default("timing.button_poll_ms", default_button_poll_ms() as i64)?
            .set_default("timing.preview_tick_ms", default_preview_tick_ms() as i64)?
            .set_default("timing.capture_tick_ms", default_capture_tick_ms() as i64)?
            .set_default("timing.off_tick_ms", default_off_tick_ms() as i64)?
            .set_default(
                "timing.watchdog_timeout_ms",
                default_watchdog_timeout_ms() as i64,
            )?
            .set_default("timing.watchdog_check_ms", default_watchdog_check_ms() as i64)?
            .set_default(
                "system.event_channel_capacity",
                default_event_channel_capacity() as i64,
            )?
            .set_default("system.max_restarts", default_max_restarts())?
            .set_default(
                "system.restart_base_delay_ms",
                default_restart_base_delay_ms() as i64,
            )?
            .set_default(
                "system.restart_max_delay_ms",
                default_restart_max_delay_ms() as i64,
            )?
            .set_default(
                "system.shutdown_timeout_ms",
                default_shutdown_timeout_ms() as i64,
            )?
            // Add configuration file (optional)
            .add_source(File::with_name(&path_str).required(false))
            // Environment variables: PISNAP_CAMERA__GAIN=2.0
            .add_source(
                Environment::with_prefix("PISNAP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: PisnapConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Apply command-line overrides on top of the loaded sources
    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(mode) = overrides.exposure_mode {
            self.camera.exposure_mode = mode;
        }
        if let Some(gain) = overrides.gain {
            self.camera.gain = Some(gain);
        }
        if let Some(exposure_us) = overrides.exposure_us {
            self.camera.exposure_us = Some(exposure_us);
        }
        if overrides.unpack_tiff {
            self.capture.raw_format = RawFormat::Tiff;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate camera settings
        if self.camera.preview_resolution.0 == 0 || self.camera.preview_resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Camera preview resolution must be greater than 0".to_string(),
            ));
        }

        if let Some(gain) = self.camera.gain {
            if !gain.is_finite() || gain <= 0.0 {
                return Err(ConfigError::Message(format!(
                    "Camera gain must be a positive number, got {}",
                    gain
                )));
            }
        }

        if self.camera.exposure_us == Some(0) {
            return Err(ConfigError::Message(
                "Camera exposure_us must be greater than 0".to_string(),
            ));
        }

        if !self.camera.scene_luminance.is_finite() || self.camera.scene_luminance < 0.0 {
            return Err(ConfigError::Message(
                "Camera scene_luminance must be zero or positive".to_string(),
            ));
        }

        // Validate capture settings
        if self.capture.path.trim().is_empty() {
            return Err(ConfigError::Message(
                "Capture path must not be empty".to_string(),
            ));
        }

        if self.capture.font_size <= 0.0 {
            return Err(ConfigError::Message(
                "Capture font_size must be greater than 0".to_string(),
            ));
        }

        // Validate display settings
        if self.display.resolution.0 == 0 || self.display.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Display resolution must be greater than 0".to_string(),
            ));
        }

        // Validate timing
        let timing = &self.timing;
        for (name, value) in [
            ("button_poll_ms", timing.button_poll_ms),
            ("preview_tick_ms", timing.preview_tick_ms),
            ("capture_tick_ms", timing.capture_tick_ms),
            ("off_tick_ms", timing.off_tick_ms),
            ("watchdog_timeout_ms", timing.watchdog_timeout_ms),
            ("watchdog_check_ms", timing.watchdog_check_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Message(format!(
                    "Timing {} must be greater than 0",
                    name
                )));
            }
        }

        if self.camera.settle_ms >= timing.watchdog_timeout_ms {
            return Err(ConfigError::Message(format!(
                "Camera settle_ms ({}ms) must be shorter than the watchdog timeout ({}ms)",
                self.camera.settle_ms, timing.watchdog_timeout_ms
            )));
        }

        let slowest_tick = timing
            .preview_tick_ms
            .max(timing.capture_tick_ms)
            .max(timing.off_tick_ms);
        if timing.watchdog_timeout_ms <= slowest_tick {
            return Err(ConfigError::Message(format!(
                "Watchdog timeout ({}ms) must exceed the slowest tick ({}ms)",
                timing.watchdog_timeout_ms, slowest_tick
            )));
        }

        // Validate system settings
        if self.system.event_channel_capacity == 0 {
            return Err(ConfigError::Message(
                "Event channel capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.max_restarts == 0 {
            return Err(ConfigError::Message(
                "max_restarts must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

impl TimingConfig {
    pub fn button_poll(&self) -> Duration {
        Duration::from_millis(self.button_poll_ms)
    }

    pub fn watchdog_timeout(&self) -> Duration {
        Duration::from_millis(self.watchdog_timeout_ms)
    }

    pub fn watchdog_check(&self) -> Duration {
        Duration::from_millis(self.watchdog_check_ms)
    }
}

impl Default for PisnapConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig {
                index: default_camera_index(),
                backend: CameraBackend::default(),
                sensor_model: default_sensor_model(),
                exposure_mode: ExposureMode::default(),
                gain: None,
                exposure_us: None,
                preview_resolution: default_preview_resolution(),
                settle_ms: default_settle_ms(),
                scene_luminance: default_scene_luminance(),
            },
            capture: CaptureConfig {
                path: default_capture_path(),
                raw_format: RawFormat::default(),
                mode: CaptureMode::default(),
                timezone: default_timezone(),
                font_path: default_font_path(),
                font_size: default_font_size(),
            },
            display: DisplayConfig {
                backend: DisplayBackend::default(),
                buttons: ButtonBackend::default(),
                framebuffer_device: default_framebuffer_device(),
                backlight_device: default_backlight_device(),
                button_device: default_button_device(),
                resolution: default_display_resolution(),
                button_a_key: default_button_a_key(),
                button_b_key: default_button_b_key(),
            },
            timing: TimingConfig {
                button_poll_ms: default_button_poll_ms(),
                preview_tick_ms: default_preview_tick_ms(),
                capture_tick_ms: default_capture_tick_ms(),
                off_tick_ms: default_off_tick_ms(),
                watchdog_timeout_ms: default_watchdog_timeout_ms(),
                watchdog_check_ms: default_watchdog_check_ms(),
            },
            system: SystemConfig::default(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: default_event_channel_capacity(),
            max_restarts: default_max_restarts(),
            restart_base_delay_ms: default_restart_base_delay_ms(),
            restart_max_delay_ms: default_restart_max_delay_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

// Default value functions
fn default_camera_index() -> u32 {
    0
}
fn default_sensor_model() -> SensorModel {
    SensorModel::PivarietyGsMono
}
fn default_preview_resolution() -> (u32, u32) {
    (240, 240)
}
fn default_settle_ms() -> u64 {
    200
}
fn default_scene_luminance() -> f64 {
    0.05
}

fn default_capture_path() -> String {
    "/data/captures".to_string()
}
fn default_timezone() -> String {
    "local".to_string()
}
fn default_font_path() -> String {
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf".to_string()
}
fn default_font_size() -> f32 {
    20.0
}

fn default_framebuffer_device() -> String {
    "/dev/fb1".to_string()
}
fn default_backlight_device() -> String {
    "/sys/class/backlight/soc:backlight/bl_power".to_string()
}
fn default_button_device() -> String {
    "/dev/input/event0".to_string()
}
fn default_display_resolution() -> (u32, u32) {
    (240, 240)
}
fn default_button_a_key() -> u16 {
    30 // KEY_A
}
fn default_button_b_key() -> u16 {
    48 // KEY_B
}

fn default_button_poll_ms() -> u64 {
    10
}
fn default_preview_tick_ms() -> u64 {
    50
}
fn default_capture_tick_ms() -> u64 {
    10
}
fn default_off_tick_ms() -> u64 {
    50
}
fn default_watchdog_timeout_ms() -> u64 {
    2000
}
fn default_watchdog_check_ms() -> u64 {
    500
}

fn default_event_channel_capacity() -> usize {
    64
}
fn default_max_restarts() -> u32 {
    5
}
fn default_restart_base_delay_ms() -> u64 {
    500
}
fn default_restart_max_delay_ms() -> u64 {
    10_000
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}
