use super::backend::CameraBackend;
use super::interface::{CameraDevice, CameraInfo};
use crate::error::CameraError;
use crate::frame::{CapturedFrame, FrameFormat};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Scripted camera for engine tests.
///
/// Capture outcomes are queued up front; once the script runs dry every
/// capture succeeds with a generated frame. Connection failures and a
/// per-capture latency are configurable.
pub struct MockCamera {
    connect_result: Mutex<Result<(), CameraError>>,
    capture_script: Mutex<VecDeque<Result<CapturedFrame, CameraError>>>,
    capture_delay: Mutex<Duration>,
    connected: AtomicBool,
    capture_calls: AtomicU64,
    frame_counter: AtomicU64,
    resolution: (u32, u32),
}

impl MockCamera {
    pub fn new() -> Self {
        Self {
            connect_result: Mutex::new(Ok(())),
            capture_script: Mutex::new(VecDeque::new()),
            capture_delay: Mutex::new(Duration::ZERO),
            connected: AtomicBool::new(false),
            capture_calls: AtomicU64::new(0),
            frame_counter: AtomicU64::new(0),
            resolution: (640, 480),
        }
    }

    /// Make the next `connect` call fail
    pub fn fail_connect(&self, details: &str) {
        *self.connect_result.lock() = Err(CameraError::Connection {
            details: details.to_string(),
        });
    }

    /// Queue one capture failure
    pub fn push_capture_failure(&self, details: &str) {
        self.capture_script
            .lock()
            .push_back(Err(CameraError::Capture {
                details: details.to_string(),
            }));
    }

    /// Queue one successful capture
    pub fn push_capture_success(&self) {
        let frame = self.generate_frame();
        self.capture_script.lock().push_back(Ok(frame));
    }

    /// Artificial latency applied to every capture
    pub fn set_capture_delay(&self, delay: Duration) {
        *self.capture_delay.lock() = delay;
    }

    /// Number of capture calls observed so far
    pub fn capture_calls(&self) -> u64 {
        self.capture_calls.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn generate_frame(&self) -> CapturedFrame {
        let seq = self.frame_counter.fetch_add(1, Ordering::Relaxed);
        let (width, height) = self.resolution;
        let shade = (40 + (seq * 37) % 180) as u8;
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([shade, 90, 200]));

        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(
                &mut Cursor::new(&mut buf),
                image::ImageOutputFormat::Jpeg(85),
            )
            .expect("mock frame encoding");

        CapturedFrame::new(seq, buf, width, height, FrameFormat::Jpeg)
    }
}

impl Default for MockCamera {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CameraDevice for MockCamera {
    async fn connect(&self) -> Result<(), CameraError> {
        match &*self.connect_result.lock() {
            Ok(()) => {
                self.connected.store(true, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => Err(e.clone()),
        }
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    async fn capture(&self) -> Result<CapturedFrame, CameraError> {
        if !self.connected.load(Ordering::Relaxed) {
            return Err(CameraError::NotConnected);
        }

        self.capture_calls.fetch_add(1, Ordering::Relaxed);

        let delay = *self.capture_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match self.capture_script.lock().pop_front() {
            Some(result) => result,
            None => Ok(self.generate_frame()),
        }
    }

    async fn preview_frame(&self) -> Option<CapturedFrame> {
        if !self.connected.load(Ordering::Relaxed) {
            return None;
        }
        Some(self.generate_frame())
    }

    async fn settings(&self) -> HashMap<String, serde_json::Value> {
        HashMap::from([(
            "resolution".to_string(),
            serde_json::Value::String(format!("{}x{}", self.resolution.0, self.resolution.1)),
        )])
    }

    async fn set_setting(&self, name: &str, _value: serde_json::Value) -> Result<(), CameraError> {
        Err(CameraError::InvalidSetting {
            name: name.to_string(),
            details: "mock camera settings are fixed".to_string(),
        })
    }

    fn info(&self) -> CameraInfo {
        CameraInfo {
            name: "Mock Camera".to_string(),
            backend: CameraBackend::Webcam,
            index: 99,
        }
    }
}
