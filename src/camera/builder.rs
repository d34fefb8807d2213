use super::simulated::SimulatedCamera;
use crate::config::CameraConfig;
use crate::error::{PisnapError, Result};
use std::time::Duration;

/// Builder for the simulated camera
pub struct SimulatedCameraBuilder {
    config: Option<CameraConfig>,
    raw_resolution: Option<(u32, u32)>,
    frame_delay: Duration,
}

impl SimulatedCameraBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            raw_resolution: None,
            frame_delay: Duration::ZERO,
        }
    }

    pub fn config(mut self, config: CameraConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Raw still size; the sensor's native resolution when unset
    pub fn raw_resolution(mut self, width: u32, height: u32) -> Self {
        self.raw_resolution = Some((width, height));
        self
    }

    /// Simulated readout time per frame
    pub fn frame_delay(mut self, delay: Duration) -> Self {
        self.frame_delay = delay;
        self
    }

    pub fn build(self) -> Result<SimulatedCamera> {
        let config = self
            .config
            .ok_or_else(|| PisnapError::system("Camera configuration must be specified"))?;

        let profile = config.sensor_model.profile();
        let raw_size = self.raw_resolution.unwrap_or(profile.resolution);
        if raw_size.0 == 0 || raw_size.1 == 0 {
            return Err(PisnapError::system("Raw resolution must be greater than 0"));
        }

        Ok(SimulatedCamera::new(
            config.index,
            profile,
            config.scene_luminance,
            config.preview_resolution,
            raw_size,
            self.frame_delay,
        ))
    }
}

impl Default for SimulatedCameraBuilder {
    fn default() -> Self {
        Self::new()
    }
}
