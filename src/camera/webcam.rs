use super::backend::CameraBackend;
use super::interface::{CameraDevice, CameraInfo};
use crate::error::CameraError;
use crate::frame::{CapturedFrame, FrameFormat};
use async_trait::async_trait;
use image::{Rgb, RgbImage};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// USB webcam transport.
///
/// Frames are synthesized in-process: a shaded test pattern with a moving
/// highlight bar, encoded as JPEG at the configured resolution. This keeps
/// the full capture/compose pipeline exercisable on machines without video
/// hardware; a V4L2/DirectShow grab slots in behind the same generator seam.
pub struct WebcamCamera {
    index: u32,
    resolution: RwLock<(u32, u32)>,
    connected: AtomicBool,
    frame_counter: AtomicU64,
}

impl WebcamCamera {
    pub fn new(index: u32, resolution: (u32, u32)) -> Self {
        Self {
            index,
            resolution: RwLock::new(resolution),
            connected: AtomicBool::new(false),
            frame_counter: AtomicU64::new(0),
        }
    }

    /// Devices this transport can open on the current machine
    pub fn list_available() -> Vec<CameraInfo> {
        vec![CameraInfo {
            name: "Integrated Webcam".to_string(),
            backend: CameraBackend::Webcam,
            index: 0,
        }]
    }

    fn render_frame(&self, seq: u64) -> Result<CapturedFrame, CameraError> {
        let (width, height) = *self.resolution.read();

        let mut img = RgbImage::new(width, height);
        let bar = (seq * 16) % width.max(1) as u64;
        for (x, y, pixel) in img.enumerate_pixels_mut() {
            let shade_x = (x * 255 / width.max(1)) as u8;
            let shade_y = (y * 255 / height.max(1)) as u8;
            let highlight = if (x as u64).abs_diff(bar) < 24 { 96 } else { 0 };
            *pixel = Rgb([
                shade_x.saturating_add(highlight),
                shade_y,
                128u8.saturating_add(highlight),
            ]);
        }

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(
                &mut Cursor::new(&mut buf),
                image::ImageOutputFormat::Jpeg(90),
            )
            .map_err(|e| CameraError::Capture {
                details: format!("frame encoding failed: {}", e),
            })?;

        Ok(CapturedFrame::new(seq, buf, width, height, FrameFormat::Jpeg))
    }
}

#[async_trait]
impl CameraDevice for WebcamCamera {
    async fn connect(&self) -> Result<(), CameraError> {
        if self.connected.load(Ordering::Acquire) {
            debug!("Webcam {} already connected", self.index);
            return Ok(());
        }

        let (width, height) = *self.resolution.read();
        if width == 0 || height == 0 {
            return Err(CameraError::Connection {
                details: format!("invalid resolution {}x{}", width, height),
            });
        }

        self.connected.store(true, Ordering::Release);
        info!("Webcam {} connected ({}x{})", self.index, width, height);
        Ok(())
    }

    async fn disconnect(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            info!("Webcam {} disconnected", self.index);
        }
    }

    async fn capture(&self) -> Result<CapturedFrame, CameraError> {
        if !self.connected.load(Ordering::Acquire) {
            return Err(CameraError::NotConnected);
        }

        let seq = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let frame = self.render_frame(seq)?;
        debug!(
            "Webcam {} captured frame {} ({} bytes)",
            self.index,
            seq,
            frame.len()
        );
        Ok(frame)
    }

    async fn preview_frame(&self) -> Option<CapturedFrame> {
        if !self.connected.load(Ordering::Acquire) {
            return None;
        }

        let seq = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        self.render_frame(seq).ok()
    }

    async fn settings(&self) -> HashMap<String, serde_json::Value> {
        let (width, height) = *self.resolution.read();
        let mut settings = HashMap::new();
        settings.insert(
            "resolution".to_string(),
            serde_json::Value::String(format!("{}x{}", width, height)),
        );
        settings.insert(
            "backend".to_string(),
            serde_json::Value::String(CameraBackend::Webcam.as_str().to_string()),
        );
        settings.insert("index".to_string(), serde_json::json!(self.index));
        settings
    }

    async fn set_setting(&self, name: &str, value: serde_json::Value) -> Result<(), CameraError> {
        match name {
            "resolution" => {
                let text = value.as_str().ok_or_else(|| CameraError::InvalidSetting {
                    name: name.to_string(),
                    details: "expected a \"WIDTHxHEIGHT\" string".to_string(),
                })?;
                let parsed = parse_resolution(text).ok_or_else(|| CameraError::InvalidSetting {
                    name: name.to_string(),
                    details: format!("'{}' is not WIDTHxHEIGHT", text),
                })?;
                *self.resolution.write() = parsed;
                info!("Webcam {} resolution set to {}x{}", self.index, parsed.0, parsed.1);
                Ok(())
            }
            other => {
                warn!("Webcam does not support setting '{}'", other);
                Err(CameraError::InvalidSetting {
                    name: other.to_string(),
                    details: "unsupported setting".to_string(),
                })
            }
        }
    }

    fn info(&self) -> CameraInfo {
        CameraInfo {
            name: "Integrated Webcam".to_string(),
            backend: CameraBackend::Webcam,
            index: self.index,
        }
    }
}

fn parse_resolution(text: &str) -> Option<(u32, u32)> {
    let (w, h) = text.split_once('x')?;
    let width = w.trim().parse().ok()?;
    let height = h.trim().parse().ok()?;
    if width == 0 || height == 0 {
        return None;
    }
    Some((width, height))
}
