//! Events that drive the session state machine.
//!
//! Everything the engine reacts to arrives through one queue and is processed
//! one event at a time: caller commands, timer ticks and fires, and
//! completion reports from spawned camera/compose/store work. Timer and
//! completion events carry the session epoch they were armed under so stale
//! events from a canceled session can never cause a transition.

use crate::collage::EncodedCollage;
use crate::error::{BoothError, CameraError, StoreError};
use crate::frame::CapturedFrame;
use crate::session::{CollageResult, PhotoHandle};
use crate::template::Template;
use std::sync::Arc;
use tokio::sync::oneshot;

/// Waits scheduled between shots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitKind {
    /// Hold the captured shot on screen
    DisplayHold,
    /// Pause before the next countdown begins
    InterShot,
}

/// What a timer emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEventKind {
    /// One countdown step; `remaining == 0` is the final "get ready" cue
    Tick { remaining: u32 },
    /// The capture trigger, emitted once per countdown after the grace delay
    Fire,
    /// A one-shot delay ran out
    Elapsed { kind: WaitKind },
}

/// A timer event tagged with the epoch it was armed under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerEvent {
    pub epoch: u64,
    pub kind: TimerEventKind,
}

/// Caller-facing commands, delivered with a reply channel
#[derive(Debug)]
pub enum EngineCommand {
    Warmup {
        reply: oneshot::Sender<Result<(), BoothError>>,
    },
    ShutdownCamera {
        reply: oneshot::Sender<Result<(), BoothError>>,
    },
    BeginSession {
        template: Arc<Template>,
        reply: oneshot::Sender<Result<String, BoothError>>,
    },
    CancelSession {
        reply: oneshot::Sender<Result<(), BoothError>>,
    },
    RetryCapture {
        reply: oneshot::Sender<Result<(), BoothError>>,
    },
    RetryCompose {
        reply: oneshot::Sender<Result<(), BoothError>>,
    },
}

/// Everything the engine loop can receive
#[derive(Debug)]
pub enum EngineEvent {
    Command(EngineCommand),
    Timer(TimerEvent),
    CaptureFinished {
        epoch: u64,
        result: Result<CapturedFrame, CameraError>,
    },
    PhotoPersisted {
        epoch: u64,
        result: Result<PhotoHandle, StoreError>,
    },
    ComposeFinished {
        epoch: u64,
        result: Result<EncodedCollage, BoothError>,
    },
    CollagePersisted {
        epoch: u64,
        result: Result<CollageResult, StoreError>,
    },
}
