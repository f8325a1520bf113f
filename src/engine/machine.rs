//! The session state machine as one explicit transition function.
//!
//! `StateMachine::handle` maps (current state, event) to a new state plus a
//! list of side effects, performs no I/O, and is therefore testable without a
//! runtime. The engine shell owns executing the effects and feeding completion
//! events back in.
//!
//! Every timer and async-completion event carries the epoch it was armed
//! under. Starting or canceling a session bumps the epoch, so anything still
//! in flight for the previous session is dropped on arrival.

use super::types::{Effect, EngineState, SessionPhase};
use crate::config::SessionConfig;
use crate::error::{BoothError, CameraError, Result, StoreError};
use crate::events::{TimerEvent, TimerEventKind, WaitKind};
use crate::frame::CapturedFrame;
use crate::session::{CollageResult, PhotoHandle, PhotoRecord, SessionStatus};
use crate::template::Template;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Inputs to the transition function.
///
/// Commands arrive pre-stripped of their reply channels; the shell answers
/// callers from the `Result` that `handle` returns.
#[derive(Debug)]
pub enum MachineEvent {
    WarmupRequested,
    CameraReady,
    CameraFailed { error: CameraError },
    SessionStarted {
        session_id: String,
        template: Arc<Template>,
    },
    CancelRequested,
    RetryCaptureRequested,
    RetryComposeRequested,
    ShutdownRequested,
    Timer(TimerEvent),
    CaptureFinished {
        epoch: u64,
        result: std::result::Result<CapturedFrame, CameraError>,
    },
    PhotoPersisted {
        epoch: u64,
        result: std::result::Result<PhotoHandle, StoreError>,
    },
    ComposeFinished {
        epoch: u64,
        result: Result<crate::collage::EncodedCollage>,
    },
    CollagePersisted {
        epoch: u64,
        result: std::result::Result<CollageResult, StoreError>,
    },
}

/// Context of the session currently owned by the machine
struct ActiveSession {
    session_id: String,
    template: Arc<Template>,
    /// Shots captured so far; also the next frame ordinal
    captured: u32,
    /// Manual retries used for the current frame
    capture_retries: u32,
    photos: Vec<PhotoRecord>,
    /// Captured shot currently being persisted
    pending: Option<CapturedFrame>,
}

impl ActiveSession {
    fn frame_count(&self) -> u32 {
        self.template.frame_count() as u32
    }
}

pub struct StateMachine {
    config: SessionConfig,
    state: EngineState,
    epoch: u64,
    session: Option<ActiveSession>,
    latest_collage: Option<CollageResult>,
    /// Rendered description of the most recent failure, with session context
    last_failure: Option<String>,
}

impl StateMachine {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: EngineState::Idle,
            epoch: 0,
            session: None,
            latest_collage: None,
            last_failure: None,
        }
    }

    pub fn state(&self) -> &EngineState {
        &self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// (captured shots, template frame count) for the current session
    pub fn progress(&self) -> (u32, u32) {
        self.session
            .as_ref()
            .map(|s| (s.captured, s.frame_count()))
            .unwrap_or((0, 0))
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.session_id.as_str())
    }

    pub fn latest_collage(&self) -> Option<&CollageResult> {
        self.latest_collage.as_ref()
    }

    /// Description of the most recent capture/persist/compose failure
    pub fn last_failure(&self) -> Option<&str> {
        self.last_failure.as_deref()
    }

    /// Whether a start trigger may be accepted right now.
    ///
    /// Checked by the shell before it creates the session row, so a rejected
    /// trigger leaves no trace in the store.
    pub fn ensure_can_begin_session(&self) -> Result<()> {
        match &self.state {
            EngineState::PreviewActive | EngineState::Complete | EngineState::SessionFailed => {
                Ok(())
            }
            EngineState::Idle | EngineState::CameraWarmup => Err(BoothError::NoCameraActive),
            EngineState::SessionActive(_)
            | EngineState::Composing
            | EngineState::ComposeFailed => Err(BoothError::SessionAlreadyActive {
                session_id: self
                    .session_id()
                    .unwrap_or("unknown")
                    .to_string(),
            }),
        }
    }

    /// Advance the machine by one event.
    ///
    /// Command events return `Err` when the current state rejects them; timer
    /// and completion events never fail, stale ones are dropped silently.
    pub fn handle(&mut self, event: MachineEvent) -> Result<Vec<Effect>> {
        match event {
            MachineEvent::WarmupRequested => self.on_warmup_requested(),
            MachineEvent::CameraReady => self.on_camera_ready(),
            MachineEvent::CameraFailed { error } => self.on_camera_failed(error),
            MachineEvent::SessionStarted {
                session_id,
                template,
            } => self.on_session_started(session_id, template),
            MachineEvent::CancelRequested => self.on_cancel_requested(),
            MachineEvent::RetryCaptureRequested => self.on_retry_capture(),
            MachineEvent::RetryComposeRequested => self.on_retry_compose(),
            MachineEvent::ShutdownRequested => self.on_shutdown_requested(),
            MachineEvent::Timer(timer) => Ok(self.on_timer(timer)),
            MachineEvent::CaptureFinished { epoch, result } => {
                Ok(self.on_capture_finished(epoch, result))
            }
            MachineEvent::PhotoPersisted { epoch, result } => {
                Ok(self.on_photo_persisted(epoch, result))
            }
            MachineEvent::ComposeFinished { epoch, result } => {
                Ok(self.on_compose_finished(epoch, result))
            }
            MachineEvent::CollagePersisted { epoch, result } => {
                Ok(self.on_collage_persisted(epoch, result))
            }
        }
    }

    fn on_warmup_requested(&mut self) -> Result<Vec<Effect>> {
        match self.state {
            EngineState::Idle => {
                info!("Camera warm-up requested");
                self.state = EngineState::CameraWarmup;
                Ok(Vec::new())
            }
            _ => Err(BoothError::invalid_state(
                "camera warm-up is only valid from idle",
            )),
        }
    }

    fn on_camera_ready(&mut self) -> Result<Vec<Effect>> {
        match self.state {
            EngineState::CameraWarmup => {
                info!("Camera connected, preview active");
                self.state = EngineState::PreviewActive;
                Ok(vec![Effect::StartPreview])
            }
            _ => {
                warn!("Camera-ready report outside warm-up ignored");
                Ok(Vec::new())
            }
        }
    }

    fn on_camera_failed(&mut self, error: CameraError) -> Result<Vec<Effect>> {
        match self.state {
            EngineState::CameraWarmup => {
                error!("Camera warm-up failed: {}", error);
                self.state = EngineState::Idle;
                Ok(Vec::new())
            }
            _ => {
                warn!("Camera-failure report outside warm-up ignored: {}", error);
                Ok(Vec::new())
            }
        }
    }

    fn on_session_started(
        &mut self,
        session_id: String,
        template: Arc<Template>,
    ) -> Result<Vec<Effect>> {
        self.ensure_can_begin_session()?;

        info!(
            "Session {} started with template '{}' ({} shots)",
            session_id,
            template.name,
            template.frame_count()
        );

        self.epoch += 1;
        self.last_failure = None;
        self.session = Some(ActiveSession {
            session_id,
            template,
            captured: 0,
            capture_retries: 0,
            photos: Vec::new(),
            pending: None,
        });
        self.state = EngineState::SessionActive(SessionPhase::Countdown {
            remaining: self.config.countdown_seconds,
        });

        Ok(vec![Effect::StartCountdown {
            epoch: self.epoch,
            seconds: self.config.countdown_seconds,
        }])
    }

    fn on_cancel_requested(&mut self) -> Result<Vec<Effect>> {
        match &self.state {
            EngineState::SessionActive(_) => {
                let session = self.session.take().expect("active session");
                info!("Session {} canceled by caller", session.session_id);

                self.epoch += 1;
                self.state = EngineState::PreviewActive;
                Ok(vec![
                    Effect::CancelTimers,
                    Effect::MarkSession {
                        session_id: session.session_id,
                        status: SessionStatus::Canceled,
                    },
                    Effect::ResumePreview,
                ])
            }
            // All shots are already captured and the session row marked
            // completed; abandoning the compose step only releases the engine.
            EngineState::Composing | EngineState::ComposeFailed => {
                let session = self.session.take().expect("active session");
                info!(
                    "Session {} released at the compose step",
                    session.session_id
                );

                self.epoch += 1;
                self.state = EngineState::PreviewActive;
                Ok(vec![Effect::CancelTimers, Effect::ResumePreview])
            }
            _ => Err(BoothError::NoActiveSession),
        }
    }

    fn on_retry_capture(&mut self) -> Result<Vec<Effect>> {
        match self.state {
            EngineState::SessionActive(SessionPhase::AwaitingRetry) => {
                let session = self.session.as_mut().expect("active session");
                session.capture_retries += 1;
                info!(
                    "Retrying capture for session {}, frame {} (retry {}/{})",
                    session.session_id,
                    session.captured,
                    session.capture_retries,
                    self.config.max_capture_retries
                );

                self.state = EngineState::SessionActive(SessionPhase::Countdown {
                    remaining: self.config.countdown_seconds,
                });
                Ok(vec![Effect::StartCountdown {
                    epoch: self.epoch,
                    seconds: self.config.countdown_seconds,
                }])
            }
            _ => Err(BoothError::invalid_state("no failed capture to retry")),
        }
    }

    fn on_retry_compose(&mut self) -> Result<Vec<Effect>> {
        match self.state {
            EngineState::ComposeFailed => {
                let session = self.session.as_ref().expect("active session");
                info!("Retrying compose for session {}", session.session_id);

                self.state = EngineState::Composing;
                Ok(vec![self.compose_effect(session)])
            }
            _ => Err(BoothError::invalid_state("no failed compose to retry")),
        }
    }

    fn on_shutdown_requested(&mut self) -> Result<Vec<Effect>> {
        match &self.state {
            EngineState::Idle => Ok(Vec::new()),
            EngineState::PreviewActive | EngineState::Complete | EngineState::SessionFailed => {
                info!("Camera shut down, engine idle");
                self.session = None;
                self.state = EngineState::Idle;
                Ok(vec![Effect::StopPreview])
            }
            _ => Err(BoothError::invalid_state(
                "cancel the active session before stopping the camera",
            )),
        }
    }

    fn on_timer(&mut self, timer: TimerEvent) -> Vec<Effect> {
        if timer.epoch != self.epoch {
            debug!(
                "Dropping stale timer event (epoch {} != {})",
                timer.epoch, self.epoch
            );
            return Vec::new();
        }

        match timer.kind {
            TimerEventKind::Tick { remaining } => {
                if let EngineState::SessionActive(SessionPhase::Countdown { .. }) = self.state {
                    self.state =
                        EngineState::SessionActive(SessionPhase::Countdown { remaining });
                }
                Vec::new()
            }
            TimerEventKind::Fire => self.on_countdown_fire(),
            TimerEventKind::Elapsed { kind } => self.on_wait_elapsed(kind),
        }
    }

    fn on_countdown_fire(&mut self) -> Vec<Effect> {
        let EngineState::SessionActive(SessionPhase::Countdown { .. }) = self.state else {
            warn!("Countdown fire outside countdown phase ignored");
            return Vec::new();
        };
        let session = self.session.as_ref().expect("active session");

        if session.captured >= session.frame_count() {
            warn!(
                "Session {} already has {} shots; fire ignored",
                session.session_id, session.captured
            );
            return Vec::new();
        }

        debug!(
            "Triggering capture {}/{} for session {}",
            session.captured + 1,
            session.frame_count(),
            session.session_id
        );
        self.state = EngineState::SessionActive(SessionPhase::Capturing);
        vec![
            Effect::SuspendPreview,
            Effect::SpawnCapture { epoch: self.epoch },
        ]
    }

    fn on_wait_elapsed(&mut self, kind: WaitKind) -> Vec<Effect> {
        let EngineState::SessionActive(SessionPhase::PostShotWait) = self.state else {
            warn!("{:?} wait elapsed outside post-shot phase ignored", kind);
            return Vec::new();
        };
        let session = self.session.as_ref().expect("active session");

        match kind {
            WaitKind::DisplayHold => {
                if session.captured == session.frame_count() {
                    info!(
                        "Session {} captured all {} shots, composing",
                        session.session_id,
                        session.frame_count()
                    );
                    let effects = vec![
                        Effect::MarkSession {
                            session_id: session.session_id.clone(),
                            status: SessionStatus::Completed,
                        },
                        self.compose_effect(session),
                    ];
                    self.state = EngineState::Composing;
                    effects
                } else {
                    vec![Effect::StartDelay {
                        epoch: self.epoch,
                        kind: WaitKind::InterShot,
                        seconds: self.config.inter_shot_delay_seconds,
                    }]
                }
            }
            WaitKind::InterShot => {
                self.state = EngineState::SessionActive(SessionPhase::Countdown {
                    remaining: self.config.countdown_seconds,
                });
                vec![
                    Effect::ResumePreview,
                    Effect::StartCountdown {
                        epoch: self.epoch,
                        seconds: self.config.countdown_seconds,
                    },
                ]
            }
        }
    }

    fn on_capture_finished(
        &mut self,
        epoch: u64,
        result: std::result::Result<CapturedFrame, CameraError>,
    ) -> Vec<Effect> {
        if epoch != self.epoch {
            debug!("Discarding capture result from a superseded session");
            return Vec::new();
        }
        let EngineState::SessionActive(SessionPhase::Capturing) = self.state else {
            warn!("Capture result outside capturing phase ignored");
            return Vec::new();
        };
        let session = self.session.as_mut().expect("active session");

        match result {
            Ok(frame) => {
                if session.captured >= session.frame_count() {
                    warn!(
                        "Session {} is already full; extra capture discarded",
                        session.session_id
                    );
                    return Vec::new();
                }

                let frame_index = session.captured;
                debug!(
                    "Capture {} for session {} succeeded ({} bytes)",
                    frame_index,
                    session.session_id,
                    frame.len()
                );
                let data = Arc::clone(&frame.data);
                session.pending = Some(frame);
                self.state = EngineState::SessionActive(SessionPhase::Persisting);
                vec![Effect::PersistPhoto {
                    epoch: self.epoch,
                    frame_index,
                    data,
                }]
            }
            Err(e) => {
                let failure = BoothError::CaptureFailed {
                    session_id: session.session_id.clone(),
                    frame_index: session.captured,
                    source: e,
                };
                error!("{}", failure);

                let exhausted = session.capture_retries >= self.config.max_capture_retries;
                let retained = session.photos.len();
                self.last_failure = Some(failure.to_string());

                if exhausted {
                    error!(
                        "Giving up after {} retries; {} shot(s) retained",
                        self.config.max_capture_retries, retained
                    );
                    self.fail_session()
                } else {
                    self.state = EngineState::SessionActive(SessionPhase::AwaitingRetry);
                    vec![Effect::ResumePreview]
                }
            }
        }
    }

    fn on_photo_persisted(
        &mut self,
        epoch: u64,
        result: std::result::Result<PhotoHandle, StoreError>,
    ) -> Vec<Effect> {
        if epoch != self.epoch {
            debug!("Discarding persist result from a superseded session");
            return Vec::new();
        }
        let EngineState::SessionActive(SessionPhase::Persisting) = self.state else {
            warn!("Persist result outside persisting phase ignored");
            return Vec::new();
        };
        let session = self.session.as_mut().expect("active session");

        match result {
            Ok(handle) => {
                let frame = session.pending.take().expect("pending capture");
                session.photos.push(PhotoRecord {
                    session_id: session.session_id.clone(),
                    frame_index: session.captured,
                    data: Arc::clone(&frame.data),
                    handle,
                    taken_at: frame.taken_at,
                });
                session.captured += 1;
                session.capture_retries = 0;
                self.last_failure = None;

                info!(
                    "Shot {}/{} persisted for session {}",
                    session.captured,
                    session.frame_count(),
                    session.session_id
                );
                self.state = EngineState::SessionActive(SessionPhase::PostShotWait);
                vec![Effect::StartDelay {
                    epoch: self.epoch,
                    kind: WaitKind::DisplayHold,
                    seconds: self.config.display_duration_seconds,
                }]
            }
            Err(e) => {
                // A dropped shot would desynchronize the frame ordinal from
                // the template, so persistence failures end the session.
                let failure = BoothError::PersistenceFailed {
                    session_id: session.session_id.clone(),
                    source: e,
                };
                error!("{}", failure);
                session.pending = None;
                self.last_failure = Some(failure.to_string());
                self.fail_session()
            }
        }
    }

    fn on_compose_finished(
        &mut self,
        epoch: u64,
        result: Result<crate::collage::EncodedCollage>,
    ) -> Vec<Effect> {
        if epoch != self.epoch {
            debug!("Discarding compose result from a superseded session");
            return Vec::new();
        }
        let EngineState::Composing = self.state else {
            warn!("Compose result outside composing state ignored");
            return Vec::new();
        };
        let session = self.session.as_ref().expect("active session");

        match result {
            Ok(collage) => {
                debug!(
                    "Collage for session {} composed ({} bytes)",
                    session.session_id,
                    collage.data.len()
                );
                vec![Effect::PersistCollage {
                    epoch: self.epoch,
                    data: collage.data,
                }]
            }
            Err(e) => {
                // Captured photos stay intact; only the compose step is
                // retryable from here.
                error!("Compose failed for session {}: {}", session.session_id, e);
                self.last_failure = Some(e.to_string());
                self.state = EngineState::ComposeFailed;
                Vec::new()
            }
        }
    }

    fn on_collage_persisted(
        &mut self,
        epoch: u64,
        result: std::result::Result<CollageResult, StoreError>,
    ) -> Vec<Effect> {
        if epoch != self.epoch {
            debug!("Discarding collage persist result from a superseded session");
            return Vec::new();
        }
        let EngineState::Composing = self.state else {
            warn!("Collage persist result outside composing state ignored");
            return Vec::new();
        };

        match result {
            Ok(collage) => {
                info!(
                    "Session {} complete, collage {} ready",
                    collage.session_id, collage.collage_id
                );
                self.latest_collage = Some(collage);
                self.state = EngineState::Complete;
                vec![Effect::ResumePreview]
            }
            Err(e) => {
                let session = self.session.as_ref().expect("active session");
                let failure = BoothError::PersistenceFailed {
                    session_id: session.session_id.clone(),
                    source: e,
                };
                error!("{}", failure);
                self.last_failure = Some(failure.to_string());
                self.fail_session()
            }
        }
    }

    fn compose_effect(&self, session: &ActiveSession) -> Effect {
        Effect::SpawnCompose {
            epoch: self.epoch,
            template: Arc::clone(&session.template),
            photos: session
                .photos
                .iter()
                .map(|p| Arc::clone(&p.data))
                .collect(),
        }
    }

    /// Move the session to the failed terminal state, keeping persisted shots
    fn fail_session(&mut self) -> Vec<Effect> {
        let session = self.session.as_ref().expect("active session");
        let session_id = session.session_id.clone();

        self.state = EngineState::SessionFailed;
        vec![
            Effect::CancelTimers,
            Effect::MarkSession {
                session_id,
                status: SessionStatus::Failed,
            },
            Effect::ResumePreview,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BoothConfig;
    use crate::frame::FrameFormat;
    use crate::template::catalog;

    fn machine() -> StateMachine {
        StateMachine::new(BoothConfig::default().session)
    }

    fn four_shot_template() -> Arc<Template> {
        Arc::new(catalog::template_by_name("4 Fotos Grid").unwrap())
    }

    fn frame(seq: u64) -> CapturedFrame {
        CapturedFrame::new(seq, vec![seq as u8; 16], 640, 480, FrameFormat::Jpeg)
    }

    fn warmed_up(m: &mut StateMachine) {
        m.handle(MachineEvent::WarmupRequested).unwrap();
        m.handle(MachineEvent::CameraReady).unwrap();
        assert_eq!(*m.state(), EngineState::PreviewActive);
    }

    fn started(m: &mut StateMachine) {
        warmed_up(m);
        m.handle(MachineEvent::SessionStarted {
            session_id: "s-1".to_string(),
            template: four_shot_template(),
        })
        .unwrap();
    }

    fn timer(m: &StateMachine, kind: TimerEventKind) -> MachineEvent {
        MachineEvent::Timer(TimerEvent {
            epoch: m.epoch(),
            kind,
        })
    }

    /// Drive one successful capture from fire through persist
    fn capture_one(m: &mut StateMachine, seq: u64) {
        let fire = timer(m, TimerEventKind::Fire);
        let effects = m.handle(fire).unwrap();
        assert!(effects.contains(&Effect::SpawnCapture { epoch: m.epoch() }));
        assert_eq!(
            *m.state(),
            EngineState::SessionActive(SessionPhase::Capturing)
        );

        m.handle(MachineEvent::CaptureFinished {
            epoch: m.epoch(),
            result: Ok(frame(seq)),
        })
        .unwrap();
        assert_eq!(
            *m.state(),
            EngineState::SessionActive(SessionPhase::Persisting)
        );

        m.handle(MachineEvent::PhotoPersisted {
            epoch: m.epoch(),
            result: Ok(PhotoHandle::default()),
        })
        .unwrap();
        assert_eq!(
            *m.state(),
            EngineState::SessionActive(SessionPhase::PostShotWait)
        );
    }

    #[test]
    fn test_warmup_failure_returns_to_idle() {
        let mut m = machine();
        m.handle(MachineEvent::WarmupRequested).unwrap();
        assert_eq!(*m.state(), EngineState::CameraWarmup);

        m.handle(MachineEvent::CameraFailed {
            error: CameraError::Connection {
                details: "no device".to_string(),
            },
        })
        .unwrap();
        assert_eq!(*m.state(), EngineState::Idle);

        // no session may be started without a camera
        assert!(matches!(
            m.ensure_can_begin_session(),
            Err(BoothError::NoCameraActive)
        ));
    }

    #[test]
    fn test_warmup_rejected_outside_idle() {
        let mut m = machine();
        warmed_up(&mut m);
        assert!(m.handle(MachineEvent::WarmupRequested).is_err());
    }

    #[test]
    fn test_session_start_emits_countdown() {
        let mut m = machine();
        warmed_up(&mut m);

        let effects = m
            .handle(MachineEvent::SessionStarted {
                session_id: "s-1".to_string(),
                template: four_shot_template(),
            })
            .unwrap();
        assert_eq!(
            effects,
            vec![Effect::StartCountdown {
                epoch: 1,
                seconds: 3
            }]
        );
        assert_eq!(m.progress(), (0, 4));
    }

    #[test]
    fn test_second_session_start_is_rejected() {
        let mut m = machine();
        started(&mut m);

        let err = m
            .handle(MachineEvent::SessionStarted {
                session_id: "s-2".to_string(),
                template: four_shot_template(),
            })
            .unwrap_err();
        assert!(matches!(err, BoothError::SessionAlreadyActive { .. }));
        assert_eq!(m.session_id(), Some("s-1"));
    }

    #[test]
    fn test_full_four_shot_session_reaches_composing() {
        let mut m = machine();
        started(&mut m);

        for shot in 0..4u32 {
            capture_one(&mut m, shot as u64);
            assert_eq!(m.progress(), (shot + 1, 4));

            let effects = m
                .handle(timer(
                    &m,
                    TimerEventKind::Elapsed {
                        kind: WaitKind::DisplayHold,
                    },
                ))
                .unwrap();

            if shot < 3 {
                // more shots to go: inter-shot pause, then the next countdown
                assert_eq!(
                    effects,
                    vec![Effect::StartDelay {
                        epoch: m.epoch(),
                        kind: WaitKind::InterShot,
                        seconds: 3
                    }]
                );
                m.handle(timer(
                    &m,
                    TimerEventKind::Elapsed {
                        kind: WaitKind::InterShot,
                    },
                ))
                .unwrap();
                assert!(matches!(
                    m.state(),
                    EngineState::SessionActive(SessionPhase::Countdown { .. })
                ));
            } else {
                assert_eq!(*m.state(), EngineState::Composing);
                assert!(effects.iter().any(|e| matches!(
                    e,
                    Effect::MarkSession {
                        status: SessionStatus::Completed,
                        ..
                    }
                )));
                assert!(effects.iter().any(
                    |e| matches!(e, Effect::SpawnCompose { photos, .. } if photos.len() == 4)
                ));
            }
        }
    }

    #[test]
    fn test_compose_success_completes_session() {
        let mut m = machine();
        started(&mut m);
        for shot in 0..4u32 {
            capture_one(&mut m, shot as u64);
            m.handle(timer(
                &m,
                TimerEventKind::Elapsed {
                    kind: WaitKind::DisplayHold,
                },
            ))
            .unwrap();
            if shot < 3 {
                m.handle(timer(
                    &m,
                    TimerEventKind::Elapsed {
                        kind: WaitKind::InterShot,
                    },
                ))
                .unwrap();
            }
        }

        let effects = m
            .handle(MachineEvent::ComposeFinished {
                epoch: m.epoch(),
                result: Ok(crate::collage::EncodedCollage {
                    data: Arc::new(vec![1, 2, 3]),
                    width: 2000,
                    height: 2000,
                }),
            })
            .unwrap();
        assert!(matches!(effects[0], Effect::PersistCollage { .. }));

        m.handle(MachineEvent::CollagePersisted {
            epoch: m.epoch(),
            result: Ok(CollageResult {
                collage_id: "c-1".to_string(),
                session_id: "s-1".to_string(),
                data: Arc::new(vec![1, 2, 3]),
                path: None,
                print_count: 0,
                share_count: 0,
                created_at: chrono::Utc::now(),
            }),
        })
        .unwrap();
        assert_eq!(*m.state(), EngineState::Complete);
        assert!(m.latest_collage().is_some());
        assert_eq!(m.progress(), (4, 4));
    }

    #[test]
    fn test_capture_failure_waits_for_manual_retry() {
        let mut m = machine();
        started(&mut m);

        m.handle(timer(&m, TimerEventKind::Fire)).unwrap();
        let effects = m
            .handle(MachineEvent::CaptureFinished {
                epoch: m.epoch(),
                result: Err(CameraError::Capture {
                    details: "shutter jam".to_string(),
                }),
            })
            .unwrap();
        assert_eq!(
            *m.state(),
            EngineState::SessionActive(SessionPhase::AwaitingRetry)
        );
        assert_eq!(effects, vec![Effect::ResumePreview]);

        // retry re-arms the countdown for the same frame
        let effects = m.handle(MachineEvent::RetryCaptureRequested).unwrap();
        assert_eq!(
            effects,
            vec![Effect::StartCountdown {
                epoch: m.epoch(),
                seconds: 3
            }]
        );
        assert_eq!(m.progress(), (0, 4));
    }

    #[test]
    fn test_retry_bound_fails_session_and_keeps_photos() {
        let mut m = machine();
        started(&mut m);
        capture_one(&mut m, 0);
        m.handle(timer(
            &m,
            TimerEventKind::Elapsed {
                kind: WaitKind::DisplayHold,
            },
        ))
        .unwrap();
        m.handle(timer(
            &m,
            TimerEventKind::Elapsed {
                kind: WaitKind::InterShot,
            },
        ))
        .unwrap();

        // initial failure plus three retries exhausts the bound
        for attempt in 0..4 {
            m.handle(timer(&m, TimerEventKind::Fire)).unwrap();
            let effects = m
                .handle(MachineEvent::CaptureFinished {
                    epoch: m.epoch(),
                    result: Err(CameraError::Capture {
                        details: "shutter jam".to_string(),
                    }),
                })
                .unwrap();

            if attempt < 3 {
                assert_eq!(
                    *m.state(),
                    EngineState::SessionActive(SessionPhase::AwaitingRetry)
                );
                m.handle(MachineEvent::RetryCaptureRequested).unwrap();
            } else {
                assert_eq!(*m.state(), EngineState::SessionFailed);
                assert!(effects.iter().any(|e| matches!(
                    e,
                    Effect::MarkSession {
                        status: SessionStatus::Failed,
                        ..
                    }
                )));
            }
        }

        // the first shot survives the failure
        assert_eq!(m.progress(), (1, 4));
    }

    #[test]
    fn test_persistence_failure_fails_session() {
        let mut m = machine();
        started(&mut m);

        m.handle(timer(&m, TimerEventKind::Fire)).unwrap();
        m.handle(MachineEvent::CaptureFinished {
            epoch: m.epoch(),
            result: Ok(frame(0)),
        })
        .unwrap();

        let effects = m
            .handle(MachineEvent::PhotoPersisted {
                epoch: m.epoch(),
                result: Err(StoreError::UnknownSession {
                    session_id: "s-1".to_string(),
                }),
            })
            .unwrap();
        assert_eq!(*m.state(), EngineState::SessionFailed);
        assert!(effects.contains(&Effect::CancelTimers));
    }

    #[test]
    fn test_compose_failure_is_retryable_without_reshooting() {
        let mut m = machine();
        started(&mut m);
        for shot in 0..4u32 {
            capture_one(&mut m, shot as u64);
            m.handle(timer(
                &m,
                TimerEventKind::Elapsed {
                    kind: WaitKind::DisplayHold,
                },
            ))
            .unwrap();
            if shot < 3 {
                m.handle(timer(
                    &m,
                    TimerEventKind::Elapsed {
                        kind: WaitKind::InterShot,
                    },
                ))
                .unwrap();
            }
        }

        m.handle(MachineEvent::ComposeFinished {
            epoch: m.epoch(),
            result: Err(BoothError::composition("decode error")),
        })
        .unwrap();
        assert_eq!(*m.state(), EngineState::ComposeFailed);
        assert_eq!(m.progress(), (4, 4));

        let effects = m.handle(MachineEvent::RetryComposeRequested).unwrap();
        assert_eq!(*m.state(), EngineState::Composing);
        assert!(
            matches!(&effects[0], Effect::SpawnCompose { photos, .. } if photos.len() == 4)
        );
    }

    #[test]
    fn test_cancel_stops_session_and_drops_stale_events() {
        let mut m = machine();
        started(&mut m);
        let armed_epoch = m.epoch();

        m.handle(timer(&m, TimerEventKind::Fire)).unwrap();

        let effects = m.handle(MachineEvent::CancelRequested).unwrap();
        assert_eq!(*m.state(), EngineState::PreviewActive);
        assert!(effects.contains(&Effect::CancelTimers));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::MarkSession {
                status: SessionStatus::Canceled,
                ..
            }
        )));

        // a delayed fire and an in-flight capture from the canceled session
        // must not transition anything or create a photo record
        let effects = m
            .handle(MachineEvent::Timer(TimerEvent {
                epoch: armed_epoch,
                kind: TimerEventKind::Fire,
            }))
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(*m.state(), EngineState::PreviewActive);

        let effects = m
            .handle(MachineEvent::CaptureFinished {
                epoch: armed_epoch,
                result: Ok(frame(9)),
            })
            .unwrap();
        assert!(effects.is_empty());
        assert_eq!(*m.state(), EngineState::PreviewActive);
        assert_eq!(m.progress(), (0, 0));
    }

    #[test]
    fn test_cancel_without_session_is_rejected() {
        let mut m = machine();
        warmed_up(&mut m);
        assert!(matches!(
            m.handle(MachineEvent::CancelRequested),
            Err(BoothError::NoActiveSession)
        ));
    }

    #[test]
    fn test_no_captures_accepted_beyond_frame_count() {
        let mut m = machine();
        warmed_up(&mut m);
        m.handle(MachineEvent::SessionStarted {
            session_id: "s-1".to_string(),
            template: Arc::new(catalog::template_by_name("2 Fotos Vertical").unwrap()),
        })
        .unwrap();

        capture_one(&mut m, 0);
        m.handle(timer(
            &m,
            TimerEventKind::Elapsed {
                kind: WaitKind::DisplayHold,
            },
        ))
        .unwrap();
        m.handle(timer(
            &m,
            TimerEventKind::Elapsed {
                kind: WaitKind::InterShot,
            },
        ))
        .unwrap();
        capture_one(&mut m, 1);
        assert_eq!(m.progress(), (2, 2));

        // session is full: a stray fire must not trigger another capture
        let effects = m.handle(timer(&m, TimerEventKind::Fire)).unwrap();
        assert!(effects.is_empty());
        assert_eq!(
            *m.state(),
            EngineState::SessionActive(SessionPhase::PostShotWait)
        );
    }

    #[test]
    fn test_shutdown_requires_no_active_session() {
        let mut m = machine();
        started(&mut m);
        assert!(m.handle(MachineEvent::ShutdownRequested).is_err());

        m.handle(MachineEvent::CancelRequested).unwrap();
        let effects = m.handle(MachineEvent::ShutdownRequested).unwrap();
        assert_eq!(effects, vec![Effect::StopPreview]);
        assert_eq!(*m.state(), EngineState::Idle);
    }

    #[test]
    fn test_new_session_allowed_after_completion() {
        let mut m = machine();
        started(&mut m);
        for shot in 0..4u32 {
            capture_one(&mut m, shot as u64);
            m.handle(timer(
                &m,
                TimerEventKind::Elapsed {
                    kind: WaitKind::DisplayHold,
                },
            ))
            .unwrap();
            if shot < 3 {
                m.handle(timer(
                    &m,
                    TimerEventKind::Elapsed {
                        kind: WaitKind::InterShot,
                    },
                ))
                .unwrap();
            }
        }
        m.handle(MachineEvent::ComposeFinished {
            epoch: m.epoch(),
            result: Ok(crate::collage::EncodedCollage {
                data: Arc::new(vec![0]),
                width: 2000,
                height: 2000,
            }),
        })
        .unwrap();
        m.handle(MachineEvent::CollagePersisted {
            epoch: m.epoch(),
            result: Ok(CollageResult {
                collage_id: "c-1".to_string(),
                session_id: "s-1".to_string(),
                data: Arc::new(vec![0]),
                path: None,
                print_count: 0,
                share_count: 0,
                created_at: chrono::Utc::now(),
            }),
        })
        .unwrap();
        assert_eq!(*m.state(), EngineState::Complete);

        let effects = m
            .handle(MachineEvent::SessionStarted {
                session_id: "s-2".to_string(),
                template: four_shot_template(),
            })
            .unwrap();
        assert!(!effects.is_empty());
        assert_eq!(m.progress(), (0, 4));
        // the previous collage stays exposed until a new one lands
        assert!(m.latest_collage().is_some());
    }
}
