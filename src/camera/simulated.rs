use super::port::{CameraMetadata, CameraMode, CameraPort, ControlRequest};
use crate::error::CameraError;
use crate::exposure::MIDDLE_GRAY;
use crate::frame::{CaptureKind, EncodedFormat, EncodedFrame, Frame, PreviewFrame, RawFrame};
use crate::sensor::SensorProfile;
use async_trait::async_trait;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, trace};

const JPEG_QUALITY: u8 = 90;

/// Deterministic software sensor. Frame brightness follows
/// `scene × gain/default_gain × exposure/default_exposure`, so exposure
/// corrections visibly converge.
pub struct SimulatedCamera {
    index: u32,
    profile: &'static SensorProfile,
    /// Scene brightness as a fraction of white at default gain and exposure
    scene_luminance: f64,
    preview_size: (u32, u32),
    raw_size: (u32, u32),
    frame_delay: Duration,
    mode: Option<CameraMode>,
    gain: f64,
    exposure_us: u32,
    ae_enabled: bool,
    manual_gain: bool,
    recording: Option<PathBuf>,
    released: bool,
    frame_counter: u64,
}

impl SimulatedCamera {
    pub(crate) fn new(
        index: u32,
        profile: &'static SensorProfile,
        scene_luminance: f64,
        preview_size: (u32, u32),
        raw_size: (u32, u32),
        frame_delay: Duration,
    ) -> Self {
        info!(
            "Initializing simulated {} as camera {} (preview {}x{}, raw {}x{})",
            profile.description, index, preview_size.0, preview_size.1, raw_size.0, raw_size.1
        );
        Self {
            index,
            profile,
            scene_luminance: scene_luminance.max(0.0),
            preview_size,
            raw_size,
            frame_delay,
            mode: None,
            gain: profile.default_gain,
            exposure_us: profile.default_exposure_us,
            ae_enabled: false,
            manual_gain: false,
            recording: None,
            released: false,
            frame_counter: 0,
        }
    }

    pub fn mode(&self) -> Option<CameraMode> {
        self.mode
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_counter
    }

    fn exposure_factor(&self, exposure_us: u32) -> f64 {
        exposure_us as f64 / self.profile.default_exposure_us.max(1) as f64
    }

    /// Gain and exposure after the simulated native AE has had its say
    fn effective_controls(&self) -> (f64, u32) {
        if !self.ae_enabled || self.scene_luminance <= 0.0 {
            return (self.gain, self.exposure_us);
        }

        if self.manual_gain {
            // Gain pinned, AE moves exposure
            let gain_factor = self.gain / self.profile.default_gain;
            let exposure = MIDDLE_GRAY / (self.scene_luminance * gain_factor)
                * self.profile.default_exposure_us as f64;
            (self.gain, exposure.clamp(100.0, 1_000_000.0) as u32)
        } else {
            // Exposure fixed, AE moves gain
            let gain = MIDDLE_GRAY / (self.scene_luminance * self.exposure_factor(self.exposure_us))
                * self.profile.default_gain;
            (self.profile.clamp_gain(gain), self.exposure_us)
        }
    }

    /// Mean brightness of the next frame as a fraction of white
    pub fn brightness(&self) -> f64 {
        let (gain, exposure_us) = self.effective_controls();
        let level = self.scene_luminance
            * (gain / self.profile.default_gain)
            * self.exposure_factor(exposure_us);
        level.clamp(0.0, 1.0)
    }

    /// Horizontal ramp around the mean so histograms have some spread
    fn sample(level: f64, white: f64, x: u32, width: u32) -> f64 {
        let ramp = 0.75 + 0.5 * (x as f64 + 0.5) / width.max(1) as f64;
        (level * white * ramp).round().clamp(0.0, white)
    }

    fn preview_image(&self, size: (u32, u32)) -> RgbImage {
        let level = self.brightness();
        let (width, height) = size;
        RgbImage::from_fn(width, height, |x, _| {
            let value = Self::sample(level, 255.0, x, width) as u8;
            image::Rgb([value, value, value])
        })
    }

    fn raw_frame(&self) -> Option<RawFrame> {
        let level = self.brightness();
        let white = self.profile.white_level_still as f64;
        let (width, height) = self.raw_size;
        let row: Vec<u16> = (0..width)
            .map(|x| Self::sample(level, white, x, width) as u16)
            .collect();
        let samples = row
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize)
            .collect();
        RawFrame::new(width, height, samples)
    }

    fn check_usable(&self) -> Result<(), CameraError> {
        if self.released {
            return Err(CameraError::Released { index: self.index });
        }
        Ok(())
    }

    fn acquisition_error(&self, details: impl Into<String>) -> CameraError {
        CameraError::FrameAcquisition {
            index: self.index,
            details: details.into(),
        }
    }
}

#[async_trait]
impl CameraPort for SimulatedCamera {
    fn index(&self) -> u32 {
        self.index
    }

    async fn configure_mode(&mut self, mode: CameraMode) -> Result<(), CameraError> {
        self.check_usable()?;
        if self.mode != Some(mode) {
            debug!("Camera {} switching to {} mode", self.index, mode);
        }
        self.mode = Some(mode);
        Ok(())
    }

    async fn set_controls(&mut self, controls: &ControlRequest) -> Result<(), CameraError> {
        self.check_usable()?;
        if let Some(gain) = controls.gain {
            if !gain.is_finite() || gain <= 0.0 {
                return Err(CameraError::ControlWrite {
                    index: self.index,
                    details: format!("invalid analogue gain {}", gain),
                });
            }
            self.gain = self.profile.clamp_gain(gain);
        }
        if let Some(exposure_us) = controls.exposure_us {
            self.exposure_us = exposure_us;
        }
        if let Some(enabled) = controls.ae_enable {
            self.ae_enabled = enabled && self.profile.supports_auto_exposure;
        }
        if let Some(manual) = controls.manual_gain {
            self.manual_gain = manual;
        }
        trace!(
            "Camera {} controls: gain={:.2} exposure={}us ae={}",
            self.index,
            self.gain,
            self.exposure_us,
            self.ae_enabled
        );
        Ok(())
    }

    async fn capture_frame(&mut self, kind: CaptureKind) -> Result<Frame, CameraError> {
        self.check_usable()?;
        let expected_mode = match kind {
            CaptureKind::Preview => CameraMode::Preview,
            CaptureKind::RawStill | CaptureKind::EncodedStill => CameraMode::Still,
        };
        match self.mode {
            Some(mode) if mode == expected_mode => {}
            Some(mode) => {
                return Err(self.acquisition_error(format!(
                    "{:?} frame requested in {} mode",
                    kind, mode
                )))
            }
            None => return Err(self.acquisition_error("camera not configured")),
        }

        if !self.frame_delay.is_zero() {
            tokio::time::sleep(self.frame_delay).await;
        }
        self.frame_counter += 1;

        match kind {
            CaptureKind::Preview => {
                let (width, height) = self.preview_size;
                let image = self.preview_image(self.preview_size);
                PreviewFrame::new(width, height, image.into_raw())
                    .map(Frame::Preview)
                    .ok_or_else(|| self.acquisition_error("preview buffer size mismatch"))
            }
            CaptureKind::RawStill => self
                .raw_frame()
                .map(Frame::Raw)
                .ok_or_else(|| self.acquisition_error("raw buffer size mismatch")),
            CaptureKind::EncodedStill => {
                let image = DynamicImage::ImageRgb8(self.preview_image(self.raw_size));
                let mut data = Cursor::new(Vec::new());
                image
                    .write_to(&mut data, ImageOutputFormat::Jpeg(JPEG_QUALITY))
                    .map_err(|e| self.acquisition_error(format!("JPEG encode: {}", e)))?;
                Ok(Frame::Encoded(EncodedFrame {
                    format: EncodedFormat::Jpeg,
                    data: data.into_inner(),
                    timestamp: SystemTime::now(),
                }))
            }
        }
    }

    async fn metadata(&mut self) -> Result<CameraMetadata, CameraError> {
        self.check_usable()?;
        let (gain, exposure_us) = self.effective_controls();
        Ok(CameraMetadata {
            gain,
            exposure_us,
            ae_enabled: self.ae_enabled,
        })
    }

    async fn start_recording(&mut self, path: &Path) -> Result<(), CameraError> {
        self.check_usable()?;
        if let Some(active) = &self.recording {
            return Err(CameraError::Recording {
                index: self.index,
                details: format!("already recording to {}", active.display()),
            });
        }

        let marker = format!(
            "simulated recording from camera {} ({})\n",
            self.index, self.profile.description
        );
        tokio::fs::write(path, marker)
            .await
            .map_err(|e| CameraError::Recording {
                index: self.index,
                details: format!("{}: {}", path.display(), e),
            })?;

        info!("Camera {} started recording to {}", self.index, path.display());
        self.recording = Some(path.to_path_buf());
        Ok(())
    }

    async fn stop_recording(&mut self) -> Result<(), CameraError> {
        if let Some(path) = self.recording.take() {
            info!("Camera {} stopped recording {}", self.index, path.display());
        }
        Ok(())
    }

    fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    async fn release(&mut self) -> Result<(), CameraError> {
        if self.released {
            return Ok(());
        }
        self.stop_recording().await?;
        self.mode = None;
        self.released = true;
        info!(
            "Camera {} released after {} frames",
            self.index, self.frame_counter
        );
        Ok(())
    }
}
