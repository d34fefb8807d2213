use super::port::DisplayPort;
use crate::error::DisplayError;
use async_trait::async_trait;
use image::RgbImage;
use tracing::{debug, trace};

/// Display stand-in for hosts without a panel
pub struct HeadlessDisplay {
    resolution: (u32, u32),
    backlight: bool,
    frames_rendered: u64,
}

impl HeadlessDisplay {
    pub fn new(resolution: (u32, u32)) -> Self {
        Self {
            resolution,
            backlight: false,
            frames_rendered: 0,
        }
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn backlight(&self) -> bool {
        self.backlight
    }
}

#[async_trait]
impl DisplayPort for HeadlessDisplay {
    fn resolution(&self) -> (u32, u32) {
        self.resolution
    }

    async fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError> {
        if self.backlight != on {
            debug!("Headless backlight {}", if on { "ON" } else { "OFF" });
        }
        self.backlight = on;
        Ok(())
    }

    async fn clear(&mut self) -> Result<(), DisplayError> {
        trace!("Headless clear");
        Ok(())
    }

    async fn render_image(&mut self, image: &RgbImage) -> Result<(), DisplayError> {
        self.frames_rendered += 1;
        trace!(
            "Headless render #{} ({}x{})",
            self.frames_rendered,
            image.width(),
            image.height()
        );
        Ok(())
    }

    async fn release(&mut self) -> Result<(), DisplayError> {
        debug!(
            "Headless display released after {} frames",
            self.frames_rendered
        );
        self.backlight = false;
        Ok(())
    }
}
