use super::converter::DisplayConverter;
use super::port::DisplayPort;
use crate::config::DisplayConfig;
use crate::error::DisplayError;
use async_trait::async_trait;
use image::RgbImage;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use tracing::{debug, info, warn};

/// RGB565 framebuffer panel with a sysfs backlight
pub struct FramebufferDisplay {
    config: DisplayConfig,
    framebuffer: Option<File>,
    backlight: Option<File>,
}

impl FramebufferDisplay {
    /// Open the framebuffer device. A missing backlight only disables dimming.
    pub fn new(config: DisplayConfig) -> Result<Self, DisplayError> {
        info!(
            "Initializing framebuffer display {} at {}x{}",
            config.framebuffer_device, config.resolution.0, config.resolution.1
        );

        let framebuffer = OpenOptions::new()
            .write(true)
            .open(&config.framebuffer_device)
            .map_err(|e| DisplayError::DeviceInit {
                device: config.framebuffer_device.clone(),
                details: e.to_string(),
            })?;

        let backlight = match Self::open_backlight(&config.backlight_device) {
            Ok(file) => {
                info!("Backlight device opened: {}", config.backlight_device);
                Some(file)
            }
            Err(e) => {
                warn!("Backlight control unavailable: {}", e);
                None
            }
        };

        Ok(Self {
            config,
            framebuffer: Some(framebuffer),
            backlight,
        })
    }

    fn open_backlight(device: &str) -> Result<File, DisplayError> {
        OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(device)
            .map_err(|e| DisplayError::BacklightOpen {
                device: device.to_string(),
                source: e,
            })
    }

    fn write_frame(&mut self, rgb565: &[u8]) -> Result<(), DisplayError> {
        let framebuffer = self.framebuffer.as_mut().ok_or_else(|| DisplayError::Write {
            details: "framebuffer already released".to_string(),
        })?;

        framebuffer
            .seek(SeekFrom::Start(0))
            .and_then(|_| framebuffer.write_all(rgb565))
            .and_then(|_| framebuffer.flush())
            .map_err(|e| DisplayError::Write {
                details: format!("{}: {}", self.config.framebuffer_device, e),
            })
    }
}

#[async_trait]
impl DisplayPort for FramebufferDisplay {
    fn resolution(&self) -> (u32, u32) {
        self.config.resolution
    }

    async fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
        if self.backlight.is_none() {
            match Self::open_backlight(&self.config.backlight_device) {
                Ok(file) => {
                    debug!("Backlight device reconnected");
                    self.backlight = Some(file);
                }
                Err(e) => {
                    debug!("Backlight control unavailable: {}", e);
                    return Ok(());
                }
            }
        }

        // bl_power: 0 is powered, 1 is blanked
        let power_value = if on { "0" } else { "1" };
        if let Some(file) = self.backlight.as_mut() {
            file.seek(SeekFrom::Start(0))
                .and_then(|_| file.write_all(power_value.as_bytes()))
                .and_then(|_| file.flush())
                .map_err(|e| DisplayError::Write {
                    details: format!("backlight {}: {}", self.config.backlight_device, e),
                })?;
        }

        debug!(
            "Backlight set to: {} (power value: {})",
            if on { "ON" } else { "OFF" },
            power_value
        );
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), DisplayError> {
        let (width, height) = self.config.resolution;
        self.write_frame(&DisplayConverter::blank_rgb565(width, height))
    }

    async fn render_image(&mut self, image: &RgbImage) -> Result<(), DisplayError> {
        let (width, height) = self.config.resolution;
        let rgb565 = DisplayConverter::rgb24_to_rgb565(image.as_raw(), image.width(), image.height())?;
        let scaled =
            DisplayConverter::scale_rgb565(&rgb565, image.width(), image.height(), width, height)?;
        self.write_frame(&scaled)
    }

    async fn release(&mut self) -> Result<(), DisplayError> {
        if self.framebuffer.is_none() {
            return Ok(());
        }
        let blank = self.clear().await;
        let backlight = self.set_backlight(false).await;
        self.framebuffer = None;
        self.backlight = None;
        info!("Framebuffer display released");
        blank.and(backlight)
    }
}
