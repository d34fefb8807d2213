use super::*;
use crate::config::{ButtonBackend, DisplayBackend, DisplayConfig};
use image::{Rgb, RgbImage};
use tempfile::TempDir;

fn create_test_config(dir: &TempDir) -> DisplayConfig {
    let framebuffer = dir.path().join("fb");
    let backlight = dir.path().join("bl_power");
    std::fs::write(&framebuffer, b"").unwrap();
    std::fs::write(&backlight, b"1").unwrap();

    DisplayConfig {
        backend: DisplayBackend::Framebuffer,
        buttons: ButtonBackend::Evdev,
        framebuffer_device: framebuffer.to_string_lossy().to_string(),
        backlight_device: backlight.to_string_lossy().to_string(),
        button_device: dir.path().join("event0").to_string_lossy().to_string(),
        resolution: (4, 2),
        button_a_key: 30,
        button_b_key: 48,
    }
}

#[test]
fn test_rgb24_to_rgb565_conversion() {
    let rgb24_data = vec![
        255, 0, 0, // Red
        0, 255, 0, // Green
        0, 0, 255, // Blue
    ];

    let rgb565_data = DisplayConverter::rgb24_to_rgb565(&rgb24_data, 3, 1).unwrap();
    assert_eq!(rgb565_data.len(), 6);

    let red = u16::from_le_bytes([rgb565_data[0], rgb565_data[1]]);
    let green = u16::from_le_bytes([rgb565_data[2], rgb565_data[3]]);
    let blue = u16::from_le_bytes([rgb565_data[4], rgb565_data[5]]);
    assert_eq!(red, 0xF800);
    assert_eq!(green, 0x07E0);
    assert_eq!(blue, 0x001F);
}

#[test]
fn test_rgb24_to_rgb565_invalid_size() {
    let invalid_data = vec![255, 0];
    assert!(DisplayConverter::rgb24_to_rgb565(&invalid_data, 1, 1).is_err());
}

#[test]
fn test_rgb565_scaling() {
    let src_data = vec![
        0x00, 0xF8, // Red
        0xE0, 0x07, // Green
        0x1F, 0x00, // Blue
        0xFF, 0xFF, // White
    ];

    let scaled = DisplayConverter::scale_rgb565(&src_data, 2, 2, 4, 4).unwrap();
    assert_eq!(scaled.len(), 32);
    // Top-left quadrant repeats the red source pixel
    assert_eq!(&scaled[0..2], &[0x00, 0xF8]);
    assert_eq!(&scaled[2..4], &[0x00, 0xF8]);
    // Bottom-right pixel comes from white
    assert_eq!(&scaled[30..32], &[0xFF, 0xFF]);
}

#[test]
fn test_scaling_same_size_is_copy() {
    let src_data = vec![1, 2, 3, 4];
    let scaled = DisplayConverter::scale_rgb565(&src_data, 2, 1, 2, 1).unwrap();
    assert_eq!(scaled, src_data);
}

#[tokio::test]
async fn test_framebuffer_render_writes_panel_sized_frame() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let fb_path = config.framebuffer_device.clone();
    let mut display = FramebufferDisplay::new(config).unwrap();

    let image = RgbImage::from_pixel(2, 1, Rgb([255, 255, 255]));
    display.render_image(&image).await.unwrap();

    let written = std::fs::read(&fb_path).unwrap();
    assert_eq!(written.len(), 4 * 2 * 2);
    assert!(written.iter().all(|&b| b == 0xFF));

    display.clear().await.unwrap();
    let written = std::fs::read(&fb_path).unwrap();
    assert!(written.iter().all(|&b| b == 0));
}

#[tokio::test]
async fn test_backlight_power_values() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let bl_path = config.backlight_device.clone();
    let mut display = FramebufferDisplay::new(config).unwrap();

    display.set_backlight(true).await.unwrap();
    assert_eq!(std::fs::read_to_string(&bl_path).unwrap(), "0");

    display.set_backlight(false).await.unwrap();
    assert_eq!(std::fs::read_to_string(&bl_path).unwrap(), "1");
}

#[tokio::test]
async fn test_missing_framebuffer_is_device_init_error() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.framebuffer_device = dir
        .path()
        .join("missing")
        .join("fb")
        .to_string_lossy()
        .to_string();

    match FramebufferDisplay::new(config) {
        Err(crate::error::DisplayError::DeviceInit { .. }) => {}
        Err(e) => panic!("Unexpected error: {}", e),
        Ok(_) => panic!("Expected device init failure"),
    }
}

#[tokio::test]
async fn test_release_is_repeatable() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let bl_path = config.backlight_device.clone();
    let mut display = FramebufferDisplay::new(config).unwrap();

    display.set_backlight(true).await.unwrap();
    display.release().await.unwrap();
    assert_eq!(std::fs::read_to_string(&bl_path).unwrap(), "1");

    display.release().await.unwrap();
    assert!(display.render_image(&RgbImage::new(1, 1)).await.is_err());
}

#[tokio::test]
async fn test_headless_display_counts_frames() {
    let mut display = HeadlessDisplay::new((240, 240));
    assert_eq!(display.resolution(), (240, 240));

    display.set_backlight(true).await.unwrap();
    display.render_image(&RgbImage::new(8, 8)).await.unwrap();
    display.render_image(&RgbImage::new(8, 8)).await.unwrap();

    assert!(display.backlight());
    assert_eq!(display.frames_rendered(), 2);

    display.release().await.unwrap();
    assert!(!display.backlight());
}
