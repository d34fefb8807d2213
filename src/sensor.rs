use serde::{Deserialize, Serialize};
use std::fmt;

/// Sensor models the appliance knows how to drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum SensorModel {
    /// Arducam PiVariety 2.2MP global shutter, monochrome, no hardware AE
    PivarietyGsMono,
    /// Sony IMX519 16MP color, hardware AE capable
    Imx519,
}

/// Raw pixel layouts produced by the supported sensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RawPixelFormat {
    Srggb10,
    Srggb12,
}

impl RawPixelFormat {
    pub fn bit_depth(&self) -> u8 {
        match self {
            RawPixelFormat::Srggb10 => 10,
            RawPixelFormat::Srggb12 => 12,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RawPixelFormat::Srggb10 => "SRGGB10",
            RawPixelFormat::Srggb12 => "SRGGB12",
        }
    }
}

/// Static, read-only description of one sensor model
#[derive(Debug, Clone, PartialEq)]
pub struct SensorProfile {
    pub model: SensorModel,
    pub description: &'static str,
    pub raw_format: RawPixelFormat,
    pub default_gain: f64,
    pub gain_min: f64,
    pub gain_max: f64,
    pub default_exposure_us: u32,
    pub supports_auto_exposure: bool,
    pub resolution: (u32, u32),
    /// White level of 8-bit preview output
    pub white_level_preview: u16,
    /// White level of 12-bit still output
    pub white_level_still: u16,
}

static PIVARIETY_GS_MONO: SensorProfile = SensorProfile {
    model: SensorModel::PivarietyGsMono,
    description: "PiVariety 2.2MP Global Shutter Mono",
    raw_format: RawPixelFormat::Srggb12,
    default_gain: 1.0,
    gain_min: 1.0,
    gain_max: 16.0,
    default_exposure_us: 10_000,
    supports_auto_exposure: false,
    resolution: (1600, 1400),
    white_level_preview: 255,
    white_level_still: 4095,
};

static IMX519: SensorProfile = SensorProfile {
    model: SensorModel::Imx519,
    description: "IMX519 16MP Color",
    raw_format: RawPixelFormat::Srggb12,
    default_gain: 1.0,
    gain_min: 1.0,
    gain_max: 16.0,
    default_exposure_us: 10_000,
    supports_auto_exposure: true,
    resolution: (4656, 3496),
    white_level_preview: 255,
    white_level_still: 4095,
};

impl SensorModel {
    pub fn profile(self) -> &'static SensorProfile {
        match self {
            SensorModel::PivarietyGsMono => &PIVARIETY_GS_MONO,
            SensorModel::Imx519 => &IMX519,
        }
    }
}

impl fmt::Display for SensorModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SensorModel::PivarietyGsMono => write!(f, "pivariety-gs-mono"),
            SensorModel::Imx519 => write!(f, "imx519"),
        }
    }
}

impl SensorProfile {
    /// Maximum sample value for preview (8-bit) or still (12-bit) output
    pub fn white_level(&self, is_preview: bool) -> u16 {
        if is_preview {
            self.white_level_preview
        } else {
            self.white_level_still
        }
    }

    pub fn clamp_gain(&self, gain: f64) -> f64 {
        gain.clamp(self.gain_min, self.gain_max)
    }
}
