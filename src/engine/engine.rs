//! The engine shell: one event-loop task that owns the camera handle, the
//! store, the timing controller, and the preview poller, and drives the pure
//! state machine with every event it receives.

use super::machine::{MachineEvent, StateMachine};
use super::preview::PreviewSlot;
use super::types::{Effect, EngineSnapshot, EngineState};
use crate::camera::CameraDevice;
use crate::collage::Compositor;
use crate::config::BoothConfig;
use crate::error::{BoothError, Result};
use crate::events::{EngineCommand, EngineEvent};
use crate::frame::CapturedFrame;
use crate::session::CollageResult;
use crate::store::SessionStore;
use crate::template::Template;
use crate::timing::TimingController;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Builder for the photobooth engine
pub struct BoothEngineBuilder {
    config: Option<BoothConfig>,
    camera: Option<Arc<dyn CameraDevice>>,
    store: Option<Arc<dyn SessionStore>>,
}

impl BoothEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            camera: None,
            store: None,
        }
    }

    pub fn with_config(mut self, config: BoothConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_camera(mut self, camera: Arc<dyn CameraDevice>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn build(self) -> Result<BoothEngine> {
        let config = self.config.unwrap_or_default();
        let camera = self
            .camera
            .ok_or_else(|| BoothError::system("A camera device must be specified"))?;
        let store = self
            .store
            .ok_or_else(|| BoothError::system("A session store must be specified"))?;
        Ok(BoothEngine::new(config, camera, store))
    }
}

impl Default for BoothEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-facing handle to the running engine.
///
/// All mutation goes through the internal event queue; reads come from a
/// snapshot the loop publishes after every event.
pub struct BoothEngine {
    tx: mpsc::UnboundedSender<EngineEvent>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
    preview: Arc<PreviewSlot>,
    cancel_token: CancellationToken,
    loop_task: Mutex<Option<JoinHandle<()>>>,
}

impl BoothEngine {
    pub fn builder() -> BoothEngineBuilder {
        BoothEngineBuilder::new()
    }

    pub fn new(
        config: BoothConfig,
        camera: Arc<dyn CameraDevice>,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let snapshot = Arc::new(RwLock::new(EngineSnapshot::default()));
        let preview = Arc::new(PreviewSlot::new());
        let cancel_token = CancellationToken::new();

        let runtime = EngineRuntime {
            machine: StateMachine::new(config.session.clone()),
            compositor: Compositor::new(config.collage.clone()),
            timing: TimingController::new(
                tx.clone(),
                Duration::from_millis(config.session.capture_grace_ms),
            ),
            camera,
            store,
            tx: tx.clone(),
            snapshot: Arc::clone(&snapshot),
            preview: Arc::clone(&preview),
            preview_task: None,
            config,
        };

        let loop_task = tokio::spawn(runtime.run(rx, cancel_token.clone()));

        Self {
            tx,
            snapshot,
            preview,
            cancel_token,
            loop_task: Mutex::new(Some(loop_task)),
        }
    }

    /// Connect the camera and start preview polling
    pub async fn warmup_camera(&self) -> Result<()> {
        self.send(|reply| EngineCommand::Warmup { reply }).await
    }

    /// Disconnect the camera and return to idle
    pub async fn shutdown_camera(&self) -> Result<()> {
        self.send(|reply| EngineCommand::ShutdownCamera { reply })
            .await
    }

    /// Start a capture session bound to `template`; returns the session id
    pub async fn begin_session(&self, template: Template) -> Result<String> {
        let template = Arc::new(template);
        self.send(move |reply| EngineCommand::BeginSession { template, reply })
            .await
    }

    /// Cancel the running session; already-persisted photos are kept
    pub async fn cancel_session(&self) -> Result<()> {
        self.send(|reply| EngineCommand::CancelSession { reply })
            .await
    }

    /// Retry the failed capture for the current frame
    pub async fn retry_capture(&self) -> Result<()> {
        self.send(|reply| EngineCommand::RetryCapture { reply })
            .await
    }

    /// Re-run the compose step after a compose failure
    pub async fn retry_compose(&self) -> Result<()> {
        self.send(|reply| EngineCommand::RetryCompose { reply })
            .await
    }

    /// Current engine state
    pub fn state(&self) -> EngineState {
        self.snapshot.read().state.clone()
    }

    /// (captured shots, template frame count) for the current session
    pub fn current_progress(&self) -> (u32, u32) {
        self.snapshot.read().progress
    }

    /// Id of the session currently owned by the engine, if any
    pub fn session_id(&self) -> Option<String> {
        self.snapshot.read().session_id.clone()
    }

    /// Most recently composed collage, if any
    pub fn latest_collage(&self) -> Option<CollageResult> {
        self.snapshot.read().latest_collage.clone()
    }

    /// Description of the most recent capture/persist/compose failure
    pub fn last_failure(&self) -> Option<String> {
        self.snapshot.read().last_failure.clone()
    }

    /// Most recent preview frame, if preview is running
    pub fn latest_preview(&self) -> Option<CapturedFrame> {
        self.preview.latest()
    }

    /// Stop the engine loop and release the camera
    pub async fn stop(&self) {
        self.cancel_token.cancel();
        let task = self.loop_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    async fn send<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T>>) -> EngineCommand,
    ) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineEvent::Command(build(reply_tx)))
            .map_err(|_| BoothError::EngineStopped)?;
        reply_rx.await.map_err(|_| BoothError::EngineStopped)?
    }
}

impl Drop for BoothEngine {
    fn drop(&mut self) {
        self.cancel_token.cancel();
    }
}

/// State owned by the engine loop task
struct EngineRuntime {
    machine: StateMachine,
    compositor: Compositor,
    timing: TimingController,
    camera: Arc<dyn CameraDevice>,
    store: Arc<dyn SessionStore>,
    tx: mpsc::UnboundedSender<EngineEvent>,
    snapshot: Arc<RwLock<EngineSnapshot>>,
    preview: Arc<PreviewSlot>,
    preview_task: Option<JoinHandle<()>>,
    config: BoothConfig,
}

impl EngineRuntime {
    async fn run(
        mut self,
        mut rx: mpsc::UnboundedReceiver<EngineEvent>,
        cancel_token: CancellationToken,
    ) {
        info!("Photobooth engine loop started");

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Engine loop shutting down");
                    break;
                }
                event = rx.recv() => {
                    match event {
                        Some(event) => {
                            self.dispatch(event).await;
                            self.publish_snapshot();
                        }
                        None => break,
                    }
                }
            }
        }

        self.timing.cancel_all();
        if let Some(task) = self.preview_task.take() {
            task.abort();
        }
        self.camera.disconnect().await;
        info!("Photobooth engine loop stopped");
    }

    async fn dispatch(&mut self, event: EngineEvent) {
        match event {
            EngineEvent::Command(command) => self.handle_command(command).await,
            EngineEvent::Timer(timer) => self.apply(MachineEvent::Timer(timer)).await,
            EngineEvent::CaptureFinished { epoch, result } => {
                self.apply(MachineEvent::CaptureFinished { epoch, result })
                    .await
            }
            EngineEvent::PhotoPersisted { epoch, result } => {
                self.apply(MachineEvent::PhotoPersisted { epoch, result })
                    .await
            }
            EngineEvent::ComposeFinished { epoch, result } => {
                self.apply(MachineEvent::ComposeFinished { epoch, result })
                    .await
            }
            EngineEvent::CollagePersisted { epoch, result } => {
                self.apply(MachineEvent::CollagePersisted { epoch, result })
                    .await
            }
        }
    }

    async fn handle_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::Warmup { reply } => {
                let outcome = self.do_warmup().await;
                let _ = reply.send(outcome);
            }
            EngineCommand::ShutdownCamera { reply } => {
                let outcome = match self.machine.handle(MachineEvent::ShutdownRequested) {
                    Ok(effects) => {
                        self.execute_all(effects).await;
                        self.camera.disconnect().await;
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
                let _ = reply.send(outcome);
            }
            EngineCommand::BeginSession { template, reply } => {
                let outcome = self.do_begin_session(template).await;
                let _ = reply.send(outcome);
            }
            EngineCommand::CancelSession { reply } => {
                let outcome = self.apply_command(MachineEvent::CancelRequested).await;
                let _ = reply.send(outcome);
            }
            EngineCommand::RetryCapture { reply } => {
                let outcome = self.apply_command(MachineEvent::RetryCaptureRequested).await;
                let _ = reply.send(outcome);
            }
            EngineCommand::RetryCompose { reply } => {
                let outcome = self.apply_command(MachineEvent::RetryComposeRequested).await;
                let _ = reply.send(outcome);
            }
        }
    }

    async fn do_warmup(&mut self) -> Result<()> {
        self.machine.handle(MachineEvent::WarmupRequested)?;

        match self.camera.connect().await {
            Ok(()) => {
                self.apply(MachineEvent::CameraReady).await;
                Ok(())
            }
            Err(e) => {
                self.apply(MachineEvent::CameraFailed { error: e.clone() })
                    .await;
                Err(BoothError::CameraUnavailable { source: e })
            }
        }
    }

    async fn do_begin_session(&mut self, template: Arc<Template>) -> Result<String> {
        self.machine.ensure_can_begin_session()?;

        let session_id = self
            .store
            .create_session(&template.id, self.config.session.event_id)
            .await
            .map_err(|e| BoothError::SessionCreateFailed { source: e })?;

        self.apply(MachineEvent::SessionStarted {
            session_id: session_id.clone(),
            template,
        })
        .await;
        Ok(session_id)
    }

    /// Run a command event through the machine, executing its effects
    async fn apply_command(&mut self, event: MachineEvent) -> Result<()> {
        let effects = self.machine.handle(event)?;
        self.execute_all(effects).await;
        Ok(())
    }

    /// Run a non-command event through the machine; such events never fail
    async fn apply(&mut self, event: MachineEvent) {
        match self.machine.handle(event) {
            Ok(effects) => self.execute_all(effects).await,
            Err(e) => error!("State machine rejected internal event: {}", e),
        }
    }

    async fn execute_all(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            self.execute(effect).await;
        }
    }

    async fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::StartPreview => self.start_preview(),
            Effect::SuspendPreview => self.preview.set_enabled(false),
            Effect::ResumePreview => self.preview.set_enabled(true),
            Effect::StopPreview => self.stop_preview(),
            Effect::StartCountdown { epoch, seconds } => {
                self.timing.start_countdown(epoch, seconds)
            }
            Effect::StartDelay {
                epoch,
                kind,
                seconds,
            } => self
                .timing
                .after(epoch, kind, Duration::from_secs(seconds as u64)),
            Effect::CancelTimers => self.timing.cancel_all(),
            Effect::SpawnCapture { epoch } => self.spawn_capture(epoch),
            Effect::PersistPhoto {
                epoch,
                frame_index,
                data,
            } => self.persist_photo(epoch, frame_index, data).await,
            Effect::SpawnCompose {
                epoch,
                template,
                photos,
            } => self.spawn_compose(epoch, template, photos),
            Effect::PersistCollage { epoch, data } => self.persist_collage(epoch, data).await,
            Effect::MarkSession { session_id, status } => {
                // Status bookkeeping is best effort; photo and collage writes
                // are the persistence paths that can fail a session.
                if let Err(e) = self.store.mark_session(&session_id, status).await {
                    warn!("Failed to mark session {} {}: {}", session_id, status.as_str(), e);
                }
            }
        }
    }

    fn start_preview(&mut self) {
        if self.preview_task.is_some() {
            self.preview.set_enabled(true);
            return;
        }

        let camera = Arc::clone(&self.camera);
        let slot = Arc::clone(&self.preview);
        let period = Duration::from_millis(1000 / u64::from(self.config.camera.preview_fps.max(1)));

        slot.set_enabled(true);
        self.preview_task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                if !slot.is_enabled() {
                    continue;
                }
                if let Some(frame) = camera.preview_frame().await {
                    slot.store(frame);
                }
            }
        }));
        debug!("Preview polling started at {} fps", self.config.camera.preview_fps);
    }

    fn stop_preview(&mut self) {
        if let Some(task) = self.preview_task.take() {
            task.abort();
        }
        self.preview.clear();
        debug!("Preview polling stopped");
    }

    /// Capture runs off the loop; completion re-enters through the queue so
    /// a cancel issued meanwhile wins by epoch.
    fn spawn_capture(&self, epoch: u64) {
        let camera = Arc::clone(&self.camera);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = camera.capture().await;
            let _ = tx.send(EngineEvent::CaptureFinished { epoch, result });
        });
    }

    async fn persist_photo(&mut self, epoch: u64, frame_index: u32, data: Arc<Vec<u8>>) {
        let session_id = self.machine.session_id().unwrap_or_default().to_string();
        let result = self.store.append_photo(&session_id, frame_index, data).await;
        let _ = self.tx.send(EngineEvent::PhotoPersisted { epoch, result });
    }

    fn spawn_compose(&self, epoch: u64, template: Arc<Template>, photos: Vec<Arc<Vec<u8>>>) {
        let compositor = self.compositor.clone();
        let tx = self.tx.clone();
        tokio::task::spawn_blocking(move || {
            let slices: Vec<&[u8]> = photos.iter().map(|p| p.as_slice()).collect();
            let result = compositor.compose(&template, &slices);
            let _ = tx.send(EngineEvent::ComposeFinished { epoch, result });
        });
    }

    async fn persist_collage(&mut self, epoch: u64, data: Arc<Vec<u8>>) {
        let session_id = self.machine.session_id().unwrap_or_default().to_string();
        let result = self.store.save_collage_result(&session_id, data).await;
        let _ = self.tx.send(EngineEvent::CollagePersisted { epoch, result });
    }

    fn publish_snapshot(&self) {
        let mut snapshot = self.snapshot.write();
        snapshot.state = self.machine.state().clone();
        snapshot.progress = self.machine.progress();
        snapshot.session_id = self.machine.session_id().map(str::to_string);
        snapshot.latest_collage = self.machine.latest_collage().cloned();
        snapshot.last_failure = self.machine.last_failure().map(str::to_string);
    }
}
