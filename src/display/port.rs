use crate::error::DisplayError;
use async_trait::async_trait;
use image::RgbImage;

/// Output panel: backlight, blanking, and full-frame rendering
#[async_trait]
pub trait DisplayPort: Send {
    /// Panel resolution in pixels
    fn resolution(&self) -> (u32, u32);

    async fn set_backlight(&mut self, on: bool) -> Result<(), DisplayError>;

    /// Fill the panel with black
    async fn clear(&mut self) -> Result<(), DisplayError>;

    /// Draw an RGB image, scaled to the panel
    async fn render_image(&mut self, image: &RgbImage) -> Result<(), DisplayError>;

    /// Turn the panel off and close the devices
    async fn release(&mut self) -> Result<(), DisplayError>;
}
