mod backend;
mod interface;
mod mock;
mod webcam;

pub use backend::{create_camera, detect_cameras, CameraBackend};
pub use interface::{CameraDevice, CameraInfo};
pub use mock::MockCamera;
pub use webcam::WebcamCamera;
