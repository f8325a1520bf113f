use super::interface::{CameraDevice, CameraInfo};
use super::webcam::WebcamCamera;
use crate::config::CameraConfig;
use crate::error::CameraError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Supported camera transports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraBackend {
    Webcam,
    NikonDslr,
    UsbPtp,
    OsCamera,
}

impl CameraBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraBackend::Webcam => "webcam",
            CameraBackend::NikonDslr => "nikon_dslr",
            CameraBackend::UsbPtp => "usb_ptp",
            CameraBackend::OsCamera => "os_camera",
        }
    }
}

impl fmt::Display for CameraBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the camera device for the configured backend.
///
/// Only the webcam transport ships with this crate; vendor PTP/DSLR and
/// OS-native transports plug in behind the same `CameraDevice` trait.
pub fn create_camera(
    backend: CameraBackend,
    config: &CameraConfig,
) -> Result<Arc<dyn CameraDevice>, CameraError> {
    match backend {
        CameraBackend::Webcam => Ok(Arc::new(WebcamCamera::new(
            config.index,
            config.resolution,
        ))),
        other => {
            warn!("Camera backend '{}' is not implemented", other);
            Err(CameraError::UnsupportedBackend {
                backend: other.as_str().to_string(),
            })
        }
    }
}

/// Enumerate camera devices available on this machine
pub fn detect_cameras() -> Vec<CameraInfo> {
    // Webcams only; other transports report through their own discovery once
    // implemented.
    WebcamCamera::list_available()
}
