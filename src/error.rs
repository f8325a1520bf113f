use thiserror::Error;

/// Top-level error taxonomy for the photobooth engine
#[derive(Error, Debug)]
pub enum BoothError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] toml::de::Error),

    #[error("Camera unavailable: {source}")]
    CameraUnavailable {
        #[source]
        source: CameraError,
    },

    #[error("Capture failed for session {session_id}, frame {frame_index}: {source}")]
    CaptureFailed {
        session_id: String,
        frame_index: u32,
        #[source]
        source: CameraError,
    },

    #[error("Persistence failed for session {session_id}: {source}")]
    PersistenceFailed {
        session_id: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to create session: {source}")]
    SessionCreateFailed {
        #[source]
        source: StoreError,
    },

    #[error("Frame count mismatch: template expects {expected} photos, got {actual}")]
    FrameCountMismatch { expected: usize, actual: usize },

    #[error("Composition failed: {details}")]
    CompositionFailed { details: String },

    #[error("Malformed template: {details}")]
    MalformedTemplate { details: String },

    #[error("A session is already active: {session_id}")]
    SessionAlreadyActive { session_id: String },

    #[error("No camera is active; call warmup_camera first")]
    NoCameraActive,

    #[error("No active session")]
    NoActiveSession,

    #[error("Operation not valid in the current engine state: {details}")]
    InvalidState { details: String },

    #[error("Engine is stopped")]
    EngineStopped,

    #[error("System error: {message}")]
    System { message: String },
}

impl BoothError {
    pub fn composition<S: Into<String>>(details: S) -> Self {
        Self::CompositionFailed {
            details: details.into(),
        }
    }

    pub fn template<S: Into<String>>(details: S) -> Self {
        Self::MalformedTemplate {
            details: details.into(),
        }
    }

    pub fn invalid_state<S: Into<String>>(details: S) -> Self {
        Self::InvalidState {
            details: details.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }
}

/// Errors reported by camera backends
#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Connection failed: {details}")]
    Connection { details: String },

    #[error("Camera is not connected")]
    NotConnected,

    #[error("Capture failed: {details}")]
    Capture { details: String },

    #[error("Camera backend not supported: {backend}")]
    UnsupportedBackend { backend: String },

    #[error("Invalid setting '{name}': {details}")]
    InvalidSetting { name: String, details: String },
}

/// Errors reported by the session/photo store
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown session: {session_id}")]
    UnknownSession { session_id: String },

    #[error("Photo already recorded for session {session_id}, frame {frame_index}")]
    DuplicatePhoto { session_id: String, frame_index: u32 },
}

pub type Result<T> = std::result::Result<T, BoothError>;
