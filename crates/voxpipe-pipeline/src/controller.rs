use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use voxpipe_audio::{CaptureBackend, PlaybackBackend};
use voxpipe_core::{AudioError, RecognitionConfig, RecognitionResult, SessionError};
use voxpipe_session::{CredentialProvider, RecognitionSession, SessionEvent};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Audio(#[from] AudioError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Lifecycle of the capture → session → playback pipeline. Every stop path,
/// including asynchronous stream failure, passes through `Stopping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
}

pub type ResultCallback = Arc<dyn Fn(RecognitionResult) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(PipelineError) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub endpoint: String,
    pub recognition: RecognitionConfig,
    /// Feed captured microphone audio to the playback device.
    pub monitor: bool,
}

struct Inner {
    state: SessionState,
    capture: Box<dyn CaptureBackend>,
    playback: Box<dyn PlaybackBackend>,
    session: Option<RecognitionSession>,
    pump_task: Option<JoinHandle<()>>,
    event_task: Option<JoinHandle<()>>,
}

/// Owns the single live capture handle, playback handle, and recognition
/// session, and is the only place their lifecycle state is mutated.
pub struct SessionController {
    config: ControllerConfig,
    credentials: CredentialProvider,
    on_result: ResultCallback,
    on_error: ErrorCallback,
    inner: Arc<Mutex<Inner>>,
}

impl SessionController {
    pub fn new(
        config: ControllerConfig,
        credentials: CredentialProvider,
        capture: Box<dyn CaptureBackend>,
        playback: Box<dyn PlaybackBackend>,
        on_result: ResultCallback,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            config,
            credentials,
            on_result,
            on_error,
            inner: Arc::new(Mutex::new(Inner {
                state: SessionState::Idle,
                capture,
                playback,
                session: None,
                pump_task: None,
                event_task: None,
            })),
        }
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// Bring the pipeline up: session first (config on the wire), then
    /// capture, then playback. A repeated call while not Idle is a no-op.
    pub async fn start(&self) -> Result<(), PipelineError> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Idle {
            tracing::warn!("start requested but pipeline is already running");
            return Ok(());
        }
        inner.state = SessionState::Starting;

        let mut session = match RecognitionSession::open(
            &self.config.endpoint,
            self.config.recognition.clone(),
            Arc::clone(&self.credentials),
        )
        .await
        {
            Ok(session) => session,
            Err(e) => {
                inner.state = SessionState::Idle;
                return Err(e.into());
            }
        };

        let mut frames = match inner.capture.start() {
            Ok(rx) => rx,
            Err(e) => {
                // No dangling session when the microphone cannot be opened
                session.shutdown().await;
                inner.state = SessionState::Idle;
                return Err(e.into());
            }
        };

        // Playback is a secondary channel; its failure never takes down the
        // recognition path.
        let monitor_writer = match inner.playback.open() {
            Ok(writer) => self.config.monitor.then_some(writer),
            Err(e) => {
                tracing::warn!("audio output unavailable, continuing without playback: {e}");
                None
            }
        };

        let events = session
            .take_event_receiver()
            .expect("event receiver taken from a fresh session");
        let handle = session.handle();
        inner.session = Some(session);

        let pump_inner = Arc::clone(&self.inner);
        let pump_on_error = Arc::clone(&self.on_error);
        inner.pump_task = Some(tokio::spawn(async move {
            while let Some(item) = frames.recv().await {
                let frame = match item {
                    Ok(frame) => frame,
                    Err(e) => {
                        // A dead capture device ends the session the same
                        // way a failed transport does. Teardown joins this
                        // task, so it must run elsewhere.
                        tracing::error!("capture failed: {e}");
                        (pump_on_error)(PipelineError::Audio(e));
                        tokio::spawn(async move {
                            Self::teardown(&pump_inner).await;
                        });
                        break;
                    }
                };
                if let Some(ref writer) = monitor_writer {
                    writer.write(&frame);
                }
                if handle.send_audio(frame.to_le_bytes()).is_err() {
                    tracing::debug!("session closed, capture pump exiting");
                    break;
                }
            }
        }));

        let inner_ref = Arc::clone(&self.inner);
        let on_result = Arc::clone(&self.on_result);
        let on_error = Arc::clone(&self.on_error);
        inner.event_task = Some(tokio::spawn(async move {
            let mut events = events;
            while let Some(event) = events.recv().await {
                match event {
                    SessionEvent::Result(result) => (on_result)(result),
                    SessionEvent::Closed => {
                        tracing::info!("service closed the stream");
                        Self::teardown(&inner_ref).await;
                        break;
                    }
                    SessionEvent::Failed(e) => {
                        tracing::error!("session failed: {e}");
                        (on_error)(PipelineError::Session(e));
                        Self::teardown(&inner_ref).await;
                        break;
                    }
                }
            }
        }));

        inner.state = SessionState::Active;
        tracing::info!(endpoint = %self.config.endpoint, "pipeline active");
        Ok(())
    }

    /// Tear the pipeline down. Idempotent from any state; from Idle it
    /// touches no resources.
    pub async fn stop(&self) {
        Self::teardown(&self.inner).await;
    }

    async fn teardown(inner: &Arc<Mutex<Inner>>) {
        let mut inner = inner.lock().await;
        if inner.state != SessionState::Active {
            tracing::debug!(state = ?inner.state, "stop requested but pipeline is not active");
            return;
        }
        inner.state = SessionState::Stopping;

        // Order matters: halt capture so no audio chases a closing session,
        // drain the pump, then release the transport and the speaker.
        inner.capture.stop();
        if let Some(pump) = inner.pump_task.take() {
            let _ = pump.await;
        }
        if let Some(session) = inner.session.take() {
            session.shutdown().await;
        }
        inner.playback.close();

        // The event task ends on its own once the session's channels are
        // gone; when teardown runs *on* the event task, joining it here
        // would deadlock.
        if let Some(task) = inner.event_task.take() {
            drop(task);
        }

        inner.state = SessionState::Idle;
        tracing::info!("pipeline stopped");
    }
}
