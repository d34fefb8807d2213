use std::time::SystemTime;

/// What the state machine asks the camera for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureKind {
    /// Small RGB frame from the preview stream
    Preview,
    /// Full-resolution raw sensor samples
    RawStill,
    /// Camera-encoded still (JPEG)
    EncodedStill,
}

/// Encoded still formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncodedFormat {
    Jpeg,
}

impl EncodedFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            EncodedFormat::Jpeg => "jpg",
        }
    }
}

/// Anything the exposure controller can measure
pub trait LuminanceSource {
    /// Mean sample value in the linear domain
    fn mean_sample(&self) -> f64;
}

/// Raw still frame: one unsigned 16-bit sample per pixel, row-major
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<u16>,
    pub timestamp: SystemTime,
}

impl RawFrame {
    /// Create a raw frame, rejecting sample buffers that do not match the geometry
    pub fn new(width: u32, height: u32, samples: Vec<u16>) -> Option<Self> {
        if samples.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            samples,
            timestamp: SystemTime::now(),
        })
    }

    /// Unpack little-endian byte pairs (the in-memory layout of 12-bit raw
    /// buffers) into one sample per pixel
    pub fn from_le_bytes(width: u32, height: u32, bytes: &[u8]) -> Option<Self> {
        if bytes.len() != width as usize * height as usize * 2 {
            return None;
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Self::new(width, height, samples)
    }

    pub fn row(&self, y: u32) -> Option<&[u16]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.width as usize;
        self.samples.get(start..start + self.width as usize)
    }
}

impl LuminanceSource for RawFrame {
    fn mean_sample(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.samples.iter().map(|&s| s as u64).sum();
        sum as f64 / self.samples.len() as f64
    }
}

/// Preview frame in packed RGB24
#[derive(Debug, Clone)]
pub struct PreviewFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub timestamp: SystemTime,
}

impl PreviewFrame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Option<Self> {
        if rgb.len() != width as usize * height as usize * 3 {
            return None;
        }
        Some(Self {
            width,
            height,
            rgb,
            timestamp: SystemTime::now(),
        })
    }
}

impl LuminanceSource for PreviewFrame {
    fn mean_sample(&self) -> f64 {
        if self.rgb.is_empty() {
            return 0.0;
        }
        let sum: u64 = self.rgb.iter().map(|&s| s as u64).sum();
        sum as f64 / self.rgb.len() as f64
    }
}

/// Encoded still as produced by the camera
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub format: EncodedFormat,
    pub data: Vec<u8>,
    pub timestamp: SystemTime,
}

/// A frame pulled from the camera
#[derive(Debug, Clone)]
pub enum Frame {
    Preview(PreviewFrame),
    Raw(RawFrame),
    Encoded(EncodedFrame),
}

impl Frame {
    pub fn kind(&self) -> CaptureKind {
        match self {
            Frame::Preview(_) => CaptureKind::Preview,
            Frame::Raw(_) => CaptureKind::RawStill,
            Frame::Encoded(_) => CaptureKind::EncodedStill,
        }
    }

    pub fn timestamp(&self) -> SystemTime {
        match self {
            Frame::Preview(f) => f.timestamp,
            Frame::Raw(f) => f.timestamp,
            Frame::Encoded(f) => f.timestamp,
        }
    }

    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Frame::Preview(f) => Some((f.width, f.height)),
            Frame::Raw(f) => Some((f.width, f.height)),
            Frame::Encoded(_) => None,
        }
    }
}
