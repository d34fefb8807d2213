use crate::error::DisplayError;
use crate::frame::PreviewFrame;
use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::path::Path;
use tracing::{debug, warn};

pub const HISTOGRAM_BINS: usize = 256;
pub const HISTOGRAM_HEIGHT: u32 = 100;
/// Size and position of the histogram inset on the preview
pub const HISTOGRAM_INSET: (u32, u32) = (128, 50);
pub const HISTOGRAM_POSITION: (i64, i64) = (5, 5);

/// Per-channel histogram, red, green, blue
pub type ChannelHistogram = [[u32; HISTOGRAM_BINS]; 3];

/// Draws the two screens the appliance shows: live preview with a histogram
/// inset, and the capture counter
pub struct OverlayRenderer {
    screen: (u32, u32),
    font: Option<Font<'static>>,
    font_size: f32,
}

impl OverlayRenderer {
    /// Renderer without text support; status screens fall back to a bar
    pub fn new(screen: (u32, u32)) -> Self {
        Self {
            screen,
            font: None,
            font_size: 20.0,
        }
    }

    /// Load a TrueType font for status text. A missing or broken font file is
    /// logged and leaves the renderer in bar mode.
    pub fn with_font_file(screen: (u32, u32), font_path: &Path, font_size: f32) -> Self {
        let font = match std::fs::read(font_path) {
            Ok(data) => {
                let font = Font::try_from_vec(data);
                if font.is_none() {
                    warn!("Failed to parse font file '{}'", font_path.display());
                }
                font
            }
            Err(e) => {
                warn!("Failed to read font file '{}': {}", font_path.display(), e);
                None
            }
        };

        Self {
            screen,
            font,
            font_size,
        }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Count samples per value for each colour channel
    pub fn histogram(frame: &PreviewFrame) -> ChannelHistogram {
        let mut hist = [[0u32; HISTOGRAM_BINS]; 3];
        for pixel in frame.rgb.chunks_exact(3) {
            for (channel, &value) in pixel.iter().enumerate() {
                hist[channel][value as usize] += 1;
            }
        }
        hist
    }

    /// 256x100 plot, each channel min-max normalised to the plot height
    pub fn histogram_image(hist: &ChannelHistogram) -> RgbImage {
        let mut plot = RgbImage::new(HISTOGRAM_BINS as u32, HISTOGRAM_HEIGHT);

        for (channel, counts) in hist.iter().enumerate() {
            let min = counts.iter().copied().min().unwrap_or(0);
            let max = counts.iter().copied().max().unwrap_or(0);
            let range = max.saturating_sub(min);
            if range == 0 {
                continue;
            }

            for (x, &count) in counts.iter().enumerate() {
                let height = ((count - min) as u64 * HISTOGRAM_HEIGHT as u64 / range as u64) as u32;
                for y in (HISTOGRAM_HEIGHT - height)..HISTOGRAM_HEIGHT {
                    plot.get_pixel_mut(x as u32, y).0[channel] = 255;
                }
            }
        }

        plot
    }

    /// Preview frame with the histogram inset pasted in the top-left corner
    pub fn preview_with_histogram(&self, frame: &PreviewFrame) -> Result<RgbImage, DisplayError> {
        let mut canvas = RgbImage::from_raw(frame.width, frame.height, frame.rgb.clone())
            .ok_or_else(|| DisplayError::FormatConversion {
                details: format!(
                    "preview buffer of {} bytes does not match {}x{}",
                    frame.rgb.len(),
                    frame.width,
                    frame.height
                ),
            })?;

        let plot = Self::histogram_image(&Self::histogram(frame));
        let inset = imageops::resize(
            &plot,
            HISTOGRAM_INSET.0,
            HISTOGRAM_INSET.1,
            FilterType::Triangle,
        );
        imageops::replace(
            &mut canvas,
            &inset,
            HISTOGRAM_POSITION.0,
            HISTOGRAM_POSITION.1,
        );
        Ok(canvas)
    }

    /// Black screen reading `capturing - N`
    pub fn capture_counter_screen(&self, count: u64) -> RgbImage {
        self.status_screen(&format!("capturing - {}", count), count)
    }

    /// Black screen with elapsed recording time
    pub fn recording_screen(&self, elapsed_secs: u64) -> RgbImage {
        self.status_screen(&format!("recording - {}s", elapsed_secs), elapsed_secs)
    }

    fn status_screen(&self, text: &str, progress: u64) -> RgbImage {
        let (width, height) = self.screen;
        let mut img = RgbImage::new(width, height);
        let x = (width / 6) as i32;
        let y = (height * 11 / 24) as i32;

        match &self.font {
            Some(font) => {
                draw_text_mut(
                    &mut img,
                    Rgb([255, 255, 255]),
                    x,
                    y,
                    Scale::uniform(self.font_size),
                    font,
                    text,
                );
            }
            None => {
                // Bar length cycles every 100 units so progress stays visible
                let span = width.saturating_sub(2 * x as u32).max(1);
                let bar = ((progress % 100 + 1) * span as u64 / 100).max(1) as u32;
                let bar_height = (height / 24).max(2);
                draw_filled_rect_mut(
                    &mut img,
                    Rect::at(x, y).of_size(bar, bar_height),
                    Rgb([255, 255, 255]),
                );
                debug!("{}", text);
            }
        }

        img
    }
}
