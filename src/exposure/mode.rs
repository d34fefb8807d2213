use serde::{Deserialize, Serialize};
use std::fmt;

/// Exposure policy selected at startup and fixed for the process lifetime
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum ExposureMode {
    /// Hardware AE with gain and exposure both free
    #[default]
    Auto,
    /// Fixed gain and exposure, no correction of any kind
    Manual,
    /// Hardware AE with gain held fixed
    GainPriority,
    /// Hardware AE with exposure time held fixed
    EtimePriority,
    /// Software luminance correction
    SmartAuto,
    /// Software luminance correction tuned for motion
    SmartAutoAction,
    /// Software luminance correction tuned for low noise
    SmartAutoLowNoise,
}

/// Which quantity the native auto-exposure is allowed to move
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AePriority {
    /// Gain fixed, exposure free
    Gain,
    /// Exposure fixed, gain free
    ExposureTime,
    /// Both free
    Full,
}

impl ExposureMode {
    pub fn is_smart(&self) -> bool {
        matches!(
            self,
            ExposureMode::SmartAuto | ExposureMode::SmartAutoAction | ExposureMode::SmartAutoLowNoise
        )
    }

    /// Native AE priority for the modes that can delegate to the sensor
    pub fn hardware_priority(&self) -> Option<AePriority> {
        match self {
            ExposureMode::Auto => Some(AePriority::Full),
            ExposureMode::GainPriority => Some(AePriority::Gain),
            ExposureMode::EtimePriority => Some(AePriority::ExposureTime),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureMode::Auto => "auto",
            ExposureMode::Manual => "manual",
            ExposureMode::GainPriority => "gain-priority",
            ExposureMode::EtimePriority => "etime-priority",
            ExposureMode::SmartAuto => "smart-auto",
            ExposureMode::SmartAutoAction => "smart-auto-action",
            ExposureMode::SmartAutoLowNoise => "smart-auto-low-noise",
        }
    }
}

impl fmt::Display for ExposureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
