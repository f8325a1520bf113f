use crate::error::BoothError;
use chrono::{DateTime, Utc};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Encoding of a captured frame's byte buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FrameFormat {
    /// JPEG-compressed frame
    Jpeg,
    /// PNG-compressed frame
    Png,
}

impl FrameFormat {
    /// File extension for the format
    pub fn extension(&self) -> &'static str {
        match self {
            FrameFormat::Jpeg => "jpg",
            FrameFormat::Png => "png",
        }
    }
}

/// A single encoded frame produced by a camera backend.
///
/// The byte buffer is shared so a frame can sit in the preview slot, travel
/// through the engine queue, and be persisted without copies.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    /// Monotonic sequence number assigned by the backend
    pub seq: u64,
    /// Encoded image bytes (shared ownership)
    pub data: Arc<Vec<u8>>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Buffer encoding
    pub format: FrameFormat,
    /// When the backend produced the frame
    pub taken_at: DateTime<Utc>,
}

impl CapturedFrame {
    pub fn new(seq: u64, data: Vec<u8>, width: u32, height: u32, format: FrameFormat) -> Self {
        Self {
            seq,
            data: Arc::new(data),
            width,
            height,
            format,
            taken_at: Utc::now(),
        }
    }

    /// Decode the frame into a pixel image
    pub fn decode(&self) -> Result<DynamicImage, BoothError> {
        image::load_from_memory(&self.data)
            .map_err(|e| BoothError::composition(format!("frame decode failed: {}", e)))
    }

    /// Size of the encoded buffer in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
