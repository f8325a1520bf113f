use crate::error::CameraError;
use crate::frame::CapturedFrame;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Identity of a camera device as reported by detection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CameraInfo {
    pub name: String,
    pub backend: super::CameraBackend,
    pub index: u32,
}

/// The capability every camera transport provides to the engine.
///
/// The engine owns the handle exclusively for the lifetime of a
/// warm-up/session cycle; `capture` may block on hardware and is always run
/// off the engine's event loop.
#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Open the device; must be called before any other operation
    async fn connect(&self) -> Result<(), CameraError>;

    /// Release the device; safe to call when not connected
    async fn disconnect(&self);

    /// Take one full-resolution exposure
    async fn capture(&self) -> Result<CapturedFrame, CameraError>;

    /// Latest live-view frame, if the device has one ready
    async fn preview_frame(&self) -> Option<CapturedFrame>;

    /// Current device settings as name/value pairs
    async fn settings(&self) -> HashMap<String, serde_json::Value>;

    /// Change one device setting
    async fn set_setting(&self, name: &str, value: serde_json::Value) -> Result<(), CameraError>;

    /// Static identity of the device
    fn info(&self) -> CameraInfo;
}
