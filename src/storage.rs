use crate::error::PersistenceError;
use crate::frame::{Frame, RawFrame};
use async_trait::async_trait;
use image::codecs::tiff::TiffEncoder;
use image::ColorType;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, trace};

/// On-disk container for raw stills, chosen at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RawFormat {
    /// NumPy `.npy` array dump
    #[default]
    Npy,
    /// 16-bit grayscale TIFF
    Tiff,
}

impl RawFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            RawFormat::Npy => "npy",
            RawFormat::Tiff => "tiff",
        }
    }
}

/// Persistence collaborator for captured frames
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// File extension this sink uses for the given frame
    fn extension(&self, frame: &Frame) -> Result<&'static str, PersistenceError>;

    /// Write the frame. Returns only once the file is complete.
    async fn save(&self, path: &Path, frame: &Frame) -> Result<(), PersistenceError>;
}

/// Writes raw stills as NPY or TIFF and encoded stills verbatim
#[derive(Debug, Clone)]
pub struct RawFileWriter {
    format: RawFormat,
}

impl RawFileWriter {
    pub fn new(format: RawFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> RawFormat {
        self.format
    }

    fn encode(&self, frame: &Frame) -> Result<Vec<u8>, PersistenceError> {
        match frame {
            Frame::Raw(raw) => match self.format {
                RawFormat::Npy => Ok(encode_npy(raw)),
                RawFormat::Tiff => encode_tiff(raw),
            },
            Frame::Encoded(encoded) => Ok(encoded.data.clone()),
            Frame::Preview(_) => Err(PersistenceError::UnsupportedFrame { format: "preview" }),
        }
    }
}

#[async_trait]
impl FrameSink for RawFileWriter {
    fn extension(&self, frame: &Frame) -> Result<&'static str, PersistenceError> {
        match frame {
            Frame::Raw(_) => Ok(self.format.extension()),
            Frame::Encoded(encoded) => Ok(encoded.format.extension()),
            Frame::Preview(_) => Err(PersistenceError::UnsupportedFrame { format: "preview" }),
        }
    }

    async fn save(&self, path: &Path, frame: &Frame) -> Result<(), PersistenceError> {
        let bytes = self.encode(frame)?;
        trace!("Writing {} bytes to {}", bytes.len(), path.display());

        tokio::fs::write(path, &bytes)
            .await
            .map_err(|e| PersistenceError::Write {
                path: path.display().to_string(),
                details: e.to_string(),
            })?;

        debug!("Saved {}", path.display());
        Ok(())
    }
}

const NPY_MAGIC: &[u8] = b"\x93NUMPY";
const NPY_ALIGNMENT: usize = 64;

/// NPY v1.0: little-endian `u16`, C order, shape `(height, width)`
pub fn encode_npy(frame: &RawFrame) -> Vec<u8> {
    let mut header = format!(
        "{{'descr': '<u2', 'fortran_order': False, 'shape': ({}, {}), }}",
        frame.height, frame.width
    );

    // magic + version + header length field
    let preamble = NPY_MAGIC.len() + 2 + 2;
    let unpadded = preamble + header.len() + 1;
    let padding = (NPY_ALIGNMENT - unpadded % NPY_ALIGNMENT) % NPY_ALIGNMENT;
    header.extend(std::iter::repeat(' ').take(padding));
    header.push('\n');

    let mut out = Vec::with_capacity(preamble + header.len() + frame.samples.len() * 2);
    out.extend_from_slice(NPY_MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    for sample in &frame.samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Single-channel 16-bit TIFF
pub fn encode_tiff(frame: &RawFrame) -> Result<Vec<u8>, PersistenceError> {
    let bytes: Vec<u8> = frame
        .samples
        .iter()
        .flat_map(|sample| sample.to_ne_bytes())
        .collect();

    let mut cursor = Cursor::new(Vec::new());
    TiffEncoder::new(&mut cursor)
        .encode(&bytes, frame.width, frame.height, ColorType::L16)
        .map_err(|e| PersistenceError::Encode {
            details: e.to_string(),
        })?;
    Ok(cursor.into_inner())
}
