use crate::events::WaitKind;
use crate::session::{CollageResult, SessionStatus};
use crate::template::Template;
use std::sync::Arc;

/// Sub-state of an active capture session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Counting down to the next shot
    Countdown { remaining: u32 },
    /// A capture call is in flight against the camera
    Capturing,
    /// The captured shot is being written to the store
    Persisting,
    /// Holding the shot on screen, then pausing before the next countdown
    PostShotWait,
    /// The last capture failed; waiting for a manual retry
    AwaitingRetry,
}

/// Engine lifecycle state.
///
/// `Idle` is the only state with no camera; a session exists from
/// `SessionActive` through the terminal states.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    CameraWarmup,
    PreviewActive,
    SessionActive(SessionPhase),
    Composing,
    /// All shots captured, compose failed; retryable without re-shooting
    ComposeFailed,
    Complete,
    SessionFailed,
}

impl EngineState {
    /// True while a session is running its capture loop
    pub fn is_session_active(&self) -> bool {
        matches!(self, EngineState::SessionActive(_))
    }

    /// True once a session exists and has not been replaced
    pub fn has_session(&self) -> bool {
        matches!(
            self,
            EngineState::SessionActive(_)
                | EngineState::Composing
                | EngineState::ComposeFailed
                | EngineState::Complete
                | EngineState::SessionFailed
        )
    }
}

/// Side effects requested by a state transition.
///
/// The transition function never performs I/O itself; the engine shell
/// executes these against the camera, store, timers, and preview task.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    StartPreview,
    SuspendPreview,
    ResumePreview,
    StopPreview,
    StartCountdown {
        epoch: u64,
        seconds: u32,
    },
    StartDelay {
        epoch: u64,
        kind: WaitKind,
        seconds: u32,
    },
    CancelTimers,
    SpawnCapture {
        epoch: u64,
    },
    PersistPhoto {
        epoch: u64,
        frame_index: u32,
        data: Arc<Vec<u8>>,
    },
    SpawnCompose {
        epoch: u64,
        template: Arc<Template>,
        photos: Vec<Arc<Vec<u8>>>,
    },
    PersistCollage {
        epoch: u64,
        data: Arc<Vec<u8>>,
    },
    MarkSession {
        session_id: String,
        status: SessionStatus,
    },
}

/// Point-in-time view of the engine published to callers
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub state: EngineState,
    /// (captured shots, template frame count); (0, 0) with no session
    pub progress: (u32, u32),
    pub session_id: Option<String>,
    pub latest_collage: Option<CollageResult>,
    /// Description of the most recent failure, with session context
    pub last_failure: Option<String>,
}

impl Default for EngineSnapshot {
    fn default() -> Self {
        Self {
            state: EngineState::Idle,
            progress: (0, 0),
            session_id: None,
            latest_collage: None,
            last_failure: None,
        }
    }
}
