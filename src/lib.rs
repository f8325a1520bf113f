pub mod camera;
pub mod collage;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod frame;
pub mod session;
pub mod store;
pub mod template;
pub mod timing;

pub use camera::{create_camera, detect_cameras, CameraBackend, CameraDevice, CameraInfo};
pub use collage::{Compositor, EncodedCollage};
pub use config::BoothConfig;
pub use engine::{BoothEngine, BoothEngineBuilder, EngineSnapshot, EngineState, SessionPhase};
pub use error::{BoothError, CameraError, Result, StoreError};
pub use events::{EngineEvent, TimerEvent, TimerEventKind, WaitKind};
pub use frame::{CapturedFrame, FrameFormat};
pub use session::{CollageResult, PhotoRecord, Session, SessionStatus};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use template::{catalog, Template};
pub use timing::TimingController;
