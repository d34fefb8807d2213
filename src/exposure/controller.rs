use super::mode::{AePriority, ExposureMode};
use crate::camera::{CameraMode, CameraPort, ControlRequest};
use crate::error::CameraError;
use crate::frame::LuminanceSource;
use crate::sensor::SensorProfile;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

/// Corrections smaller than this are treated as single-frame noise
pub const CORRECTION_DEADBAND_STOPS: f64 = 0.2;

/// Target mean as a fraction of white (18% gray)
pub const MIDDLE_GRAY: f64 = 0.18;

/// Relative gain difference tolerated between tracked and reported values
const GAIN_TOLERANCE: f64 = 0.02;

/// Tracked control state for one camera
#[derive(Debug, Clone)]
pub struct CameraHandle {
    pub index: u32,
    pub profile: &'static SensorProfile,
    /// Intended gain, always within the profile bounds
    pub last_gain: f64,
    pub last_exposure_us: u32,
    pub mode: CameraMode,
    /// Native AE currently owns the exposure controls
    pub hardware_ae: bool,
}

impl CameraHandle {
    fn new(index: u32, profile: &'static SensorProfile) -> Self {
        Self {
            index,
            profile,
            last_gain: profile.default_gain,
            last_exposure_us: profile.default_exposure_us,
            mode: CameraMode::Preview,
            hardware_ae: false,
        }
    }

    pub fn supports_auto_exposure(&self) -> bool {
        self.profile.supports_auto_exposure
    }
}

/// Owns per-camera gain/exposure state and the smart auto-exposure loop.
///
/// Only the state-machine task calls into the controller, so the tracked
/// values need no locking. A design with one task per camera must add
/// per-handle locks first.
pub struct ExposureController {
    mode: ExposureMode,
    handles: HashMap<u32, CameraHandle>,
    settle_delay: Duration,
}

impl ExposureController {
    pub fn new(mode: ExposureMode) -> Self {
        Self {
            mode,
            handles: HashMap::new(),
            settle_delay: Duration::ZERO,
        }
    }

    /// Wait this long after a configuration write so the sensor can apply it
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn mode(&self) -> ExposureMode {
        self.mode
    }

    /// Track a camera, starting from the sensor defaults
    pub fn register(&mut self, index: u32, profile: &'static SensorProfile) -> &CameraHandle {
        debug!(
            "Registering camera {} ({}) with exposure controller",
            index, profile.description
        );
        self.handles
            .entry(index)
            .or_insert_with(|| CameraHandle::new(index, profile))
    }

    pub fn handle(&self, index: u32) -> Option<&CameraHandle> {
        self.handles.get(&index)
    }

    /// Remember which pipeline the camera is running after a successful switch
    pub fn record_mode(&mut self, index: u32, mode: CameraMode) {
        if let Some(handle) = self.handles.get_mut(&index) {
            handle.mode = mode;
        }
    }

    /// Resolve effective gain/exposure (explicit request over sensor default)
    /// and write them, either as native AE settings or as manual controls.
    ///
    /// Tracked values are updated before the write is issued.
    pub async fn configure(
        &mut self,
        camera: &mut dyn CameraPort,
        requested_gain: Option<f64>,
        requested_exposure_us: Option<u32>,
    ) -> Result<(), CameraError> {
        let index = camera.index();
        let mode = self.mode;
        let handle = self
            .handles
            .get_mut(&index)
            .ok_or(CameraError::UnknownCamera { index })?;
        let profile = handle.profile;

        let gain = match requested_gain {
            Some(gain) => {
                let clamped = profile.clamp_gain(gain);
                if clamped != gain {
                    warn!(
                        "Requested gain {:.2} outside [{:.1}, {:.1}] for camera {}, using {:.2}",
                        gain, profile.gain_min, profile.gain_max, index, clamped
                    );
                }
                clamped
            }
            None => profile.default_gain,
        };
        let exposure_us = requested_exposure_us.unwrap_or(profile.default_exposure_us);

        handle.last_gain = gain;
        handle.last_exposure_us = exposure_us;

        let priority = mode
            .hardware_priority()
            .filter(|_| profile.supports_auto_exposure);

        let request = match priority {
            Some(AePriority::Gain) => {
                info!("Camera {}: gain-priority AE, gain={:.2}", index, gain);
                ControlRequest {
                    ae_enable: Some(true),
                    manual_gain: Some(true),
                    gain: Some(gain),
                    exposure_us: None,
                }
            }
            Some(AePriority::ExposureTime) => {
                info!(
                    "Camera {}: exposure-priority AE, exposure={}us",
                    index, exposure_us
                );
                ControlRequest {
                    ae_enable: Some(true),
                    manual_gain: Some(false),
                    gain: None,
                    exposure_us: Some(exposure_us),
                }
            }
            Some(AePriority::Full) => {
                info!("Camera {}: full auto exposure", index);
                ControlRequest {
                    ae_enable: Some(true),
                    manual_gain: Some(false),
                    gain: None,
                    exposure_us: None,
                }
            }
            None => {
                info!(
                    "Camera {}: manual controls ({}), gain={:.2}, exposure={}us",
                    index,
                    if profile.supports_auto_exposure {
                        "forced"
                    } else {
                        "AE unsupported"
                    },
                    gain,
                    exposure_us
                );
                ControlRequest::manual(gain, exposure_us)
            }
        };
        handle.hardware_ae = priority.is_some();

        camera.set_controls(&request).await.map_err(|e| {
            warn!("Initial control write failed on camera {}: {}", index, e);
            e
        })?;

        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }
        Ok(())
    }

    /// Policy gate for software correction
    pub fn should_use_smart_correction(&self, index: u32) -> bool {
        match self.handles.get(&index) {
            Some(handle) if handle.supports_auto_exposure() => self.mode.is_smart(),
            Some(_) => self.mode != ExposureMode::Manual,
            None => false,
        }
    }

    /// Stops needed to bring the frame mean to middle gray. Positive means
    /// underexposed, negative overexposed, zero when the mean is not positive.
    pub fn suggest_correction<F>(&self, index: u32, is_preview: bool, frame: &F) -> f64
    where
        F: LuminanceSource + ?Sized,
    {
        let Some(handle) = self.handles.get(&index) else {
            warn!("No exposure state for camera {}", index);
            return 0.0;
        };

        let white_level = handle.profile.white_level(is_preview) as f64;
        let target = white_level * MIDDLE_GRAY;
        let mean = frame.mean_sample();
        if mean <= 0.0 {
            return 0.0;
        }

        let stops = (target / mean).log2();
        trace!(
            "Camera {} mean {:.1}, target {:.1}, suggested {:+.2} stops",
            index,
            mean,
            target,
            stops
        );
        stops
    }

    /// Scale gain by `2^stops`, clamp to the sensor bounds, and write it if it
    /// changed. Exposure time is never touched. Returns whether a write was issued.
    pub async fn apply_correction(
        &mut self,
        camera: &mut dyn CameraPort,
        stops: f64,
    ) -> Result<bool, CameraError> {
        let index = camera.index();
        let handle = self
            .handles
            .get_mut(&index)
            .ok_or(CameraError::UnknownCamera { index })?;

        if !stops.is_finite() {
            warn!("Ignoring non-finite correction on camera {}", index);
            return Ok(false);
        }

        let previous = handle.last_gain;
        let new_gain = handle.profile.clamp_gain(previous * stops.exp2());
        if (new_gain - previous).abs() <= f64::EPSILON {
            trace!(
                "Camera {}: no correction needed, gain={:.2}, exposure={}us",
                index,
                previous,
                handle.last_exposure_us
            );
            return Ok(false);
        }

        debug!(
            "Camera {}: correcting {:+.2} stops, gain {:.2} -> {:.2}, exposure={}us",
            index, stops, previous, new_gain, handle.last_exposure_us
        );
        handle.last_gain = new_gain;

        camera
            .set_controls(&ControlRequest::gain(new_gain))
            .await
            .map_err(|e| {
                warn!("Gain write failed on camera {}: {}", index, e);
                e
            })?;
        Ok(true)
    }

    /// Per-frame policy: measure and correct only when the gate allows it and
    /// the suggestion is outside the dead band. Returns the applied stops.
    pub async fn maybe_correct<F>(
        &mut self,
        camera: &mut dyn CameraPort,
        is_preview: bool,
        frame: &F,
    ) -> Result<Option<f64>, CameraError>
    where
        F: LuminanceSource + Sync + ?Sized,
    {
        let index = camera.index();
        if !self.should_use_smart_correction(index) {
            return Ok(None);
        }

        let stops = self.suggest_correction(index, is_preview, frame);
        if stops.abs() <= CORRECTION_DEADBAND_STOPS {
            return Ok(None);
        }

        if self.apply_correction(camera, stops).await? {
            Ok(Some(stops))
        } else {
            Ok(None)
        }
    }

    /// Compare tracked intent with what the camera reports. Divergence is
    /// logged, never fatal. Returns true when the two agree.
    pub async fn reconcile(&self, camera: &mut dyn CameraPort) -> Result<bool, CameraError> {
        let index = camera.index();
        let handle = self
            .handles
            .get(&index)
            .ok_or(CameraError::UnknownCamera { index })?;
        if handle.hardware_ae {
            return Ok(true);
        }

        let reported = camera.metadata().await?;
        let gain_diverged = (reported.gain - handle.last_gain).abs() > handle.last_gain * GAIN_TOLERANCE;
        let exposure_diverged =
            reported.exposure_us.abs_diff(handle.last_exposure_us) > handle.last_exposure_us / 100;

        if gain_diverged || exposure_diverged {
            warn!(
                "Camera {} controls diverged: tracked gain={:.2} exposure={}us, reported gain={:.2} exposure={}us",
                index, handle.last_gain, handle.last_exposure_us, reported.gain, reported.exposure_us
            );
            return Ok(false);
        }
        Ok(true)
    }
}
