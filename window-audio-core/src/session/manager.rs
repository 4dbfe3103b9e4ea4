use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

use crate::adapter::native::{EngineCapture, NativeCaptureAdapter};
use crate::models::audio_models::{AudioFormat, AudioSessionInfo, StartOutcome, WindowInfo};
use crate::models::config::CaptureConfiguration;
use crate::models::error::CaptureError;
use crate::models::state::{SessionState, StopReason};
use crate::models::target::{resolve, CaptureTarget, RawTarget, RequestTarget};
use crate::relay::frame_relay::{ActiveSession, FrameRelay, NegotiatedFormat, RelayDiagnostics, RelayStats};
use crate::traits::capture_delegate::CaptureDelegate;
use crate::traits::capture_engine::{CaptureEngine, FrameCallback};
use crate::traits::consumer_transport::{ConsumerId, ConsumerTransport, LivenessCallback, WatchId};

/// Serialisable snapshot of the active capture session.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub client_id: String,
    pub engine_target: RequestTarget,
    pub consumer: ConsumerId,
    pub state: SessionState,
    pub format: AudioFormat,
    pub using_fallback: bool,
    pub process_specific: bool,
    pub started_at: DateTime<Utc>,
    pub relay: RelayStats,
}

/// The single live capture. Owned by [`Control`], never shared.
struct CaptureSession {
    id: Uuid,
    generation: u64,
    target: CaptureTarget,
    engine_target: RequestTarget,
    capture: EngineCapture,
    using_fallback: bool,
    transport: Arc<dyn ConsumerTransport>,
    watch: Option<WatchId>,
    format: Arc<NegotiatedFormat>,
    diagnostics: Arc<RelayDiagnostics>,
    started_at: DateTime<Utc>,
}

/// Everything mutated by `start`/`stop`, behind one lock.
struct Control<E: CaptureEngine> {
    adapter: NativeCaptureAdapter<E>,
    state: SessionState,
    session: Option<CaptureSession>,
}

/// Delegate calls collected under the lock and delivered after it is released.
#[derive(Default)]
struct Notices {
    states: Vec<SessionState>,
    errors: Vec<CaptureError>,
}

impl<E: CaptureEngine> Control<E> {
    fn transition(&mut self, next: SessionState, notices: &mut Notices) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            log::warn!("Unexpected session transition {} -> {}", self.state, next);
        }
        log::info!("Capture session: {} -> {}", self.state, next);
        self.state = next;
        notices.states.push(next);
    }
}

struct Shared<E: CaptureEngine> {
    control: Mutex<Control<E>>,
    active: Arc<ActiveSession>,
    next_generation: AtomicU64,
    delegate: Mutex<Option<Arc<dyn CaptureDelegate>>>,
    config: CaptureConfiguration,
}

/// Owner of the process-wide capture session.
///
/// All `start`/`stop` calls serialise through one critical section, so at
/// most one session exists at any time. Cloning yields another handle to the
/// same manager.
///
/// ```text
/// start(raw) → resolve → [stop old] → adapter.start ─┬→ Streaming
///                                                   └→ fallback → adapter.start(AudioSession)
/// consumer destroyed → stop(consumer-destroyed)
/// ```
pub struct SessionManager<E: CaptureEngine + 'static> {
    shared: Arc<Shared<E>>,
}

impl<E: CaptureEngine + 'static> Clone for SessionManager<E> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<E: CaptureEngine + 'static> SessionManager<E> {
    /// Rejects a configuration that fails [`CaptureConfiguration::validate`].
    pub fn new(adapter: NativeCaptureAdapter<E>, config: CaptureConfiguration) -> Result<Self, CaptureError> {
        config.validate().map_err(CaptureError::InvalidConfiguration)?;
        Ok(Self {
            shared: Arc::new(Shared {
                control: Mutex::new(Control {
                    adapter,
                    state: SessionState::Idle,
                    session: None,
                }),
                active: Arc::new(ActiveSession::new()),
                next_generation: AtomicU64::new(0),
                delegate: Mutex::new(None),
                config,
            }),
        })
    }

    pub fn set_delegate(&self, delegate: Arc<dyn CaptureDelegate>) {
        *self.shared.delegate.lock() = Some(delegate);
    }

    pub fn config(&self) -> &CaptureConfiguration {
        &self.shared.config
    }

    pub fn state(&self) -> SessionState {
        self.shared.control.lock().state
    }

    pub fn is_streaming(&self) -> bool {
        self.state().is_streaming()
    }

    /// Snapshot of the active session, if any.
    pub fn session_info(&self) -> Option<SessionInfo> {
        let control = self.shared.control.lock();
        control.session.as_ref().map(|session| SessionInfo {
            session_id: session.id,
            client_id: session.target.client_id.clone(),
            engine_target: session.engine_target.clone(),
            consumer: session.transport.consumer_id(),
            state: control.state,
            format: session.format.load(),
            using_fallback: session.using_fallback,
            process_specific: session.capture.process_specific,
            started_at: session.started_at,
            relay: session.diagnostics.snapshot(),
        })
    }

    pub fn list_windows(&self) -> Result<Vec<WindowInfo>, CaptureError> {
        self.shared.control.lock().adapter.list_windows()
    }

    pub fn list_audio_sessions(&self) -> Result<Vec<AudioSessionInfo>, CaptureError> {
        self.shared.control.lock().adapter.list_audio_sessions()
    }

    pub fn find_window(&self, query: &str) -> Result<Option<WindowInfo>, CaptureError> {
        self.shared.control.lock().adapter.find_window(query)
    }

    /// Start capturing `raw` for `consumer`, replacing any active session.
    ///
    /// An unresolvable target is rejected before the active session is
    /// touched. Any other failure leaves the manager idle.
    pub fn start(
        &self,
        raw: impl Into<RawTarget>,
        consumer: Arc<dyn ConsumerTransport>,
    ) -> Result<StartOutcome, CaptureError> {
        let target = resolve(&raw.into())?;

        let mut notices = Notices::default();
        let result = {
            let mut control = self.shared.control.lock();
            self.shared.start_locked(&mut control, target, consumer, &mut notices)
        };
        if let Err(e) = &result {
            log::warn!("Capture start failed: {}", e);
        }
        self.shared.notify(notices);
        result
    }

    /// Stop the active session.
    ///
    /// Succeeds without an engine call when idle, or when `expected_consumer`
    /// is given and differs from the session's consumer. Engine teardown
    /// errors are reported to the delegate; the manager ends idle regardless.
    pub fn stop(&self, reason: StopReason, expected_consumer: Option<ConsumerId>) -> Result<(), CaptureError> {
        self.shared.stop_matching(reason, |session| {
            expected_consumer.map_or(true, |id| session.transport.consumer_id() == id)
        });
        Ok(())
    }
}

impl<E: CaptureEngine + 'static> Shared<E> {
    fn start_locked(
        self: &Arc<Self>,
        control: &mut Control<E>,
        target: CaptureTarget,
        consumer: Arc<dyn ConsumerTransport>,
        notices: &mut Notices,
    ) -> Result<StartOutcome, CaptureError> {
        if control.session.is_some() {
            self.stop_locked(control, StopReason::Superseded, notices);
        }
        control.transition(SessionState::Starting, notices);

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.active.activate(generation);

        let defaults = self.config.default_format();
        let format = Arc::new(NegotiatedFormat::new(defaults));
        let diagnostics = Arc::new(RelayDiagnostics::default());
        let on_frame = FrameRelay::new(
            generation,
            target.client_id.clone(),
            Arc::clone(&self.active),
            Arc::clone(&format),
            Arc::clone(&consumer),
            Arc::clone(&diagnostics),
        )
        .into_callback();

        log_session_pids(control);
        log::info!("Starting capture for {} (target {})", target.client_id, target.request_target);

        let started = match control
            .adapter
            .start_stream_capture(&target.request_target, Arc::clone(&on_frame), defaults)
        {
            Ok(capture) => Ok((capture, target.request_target.clone(), false)),
            Err(CaptureError::ProcessLoopbackUnavailable(cause)) => {
                fall_back(control, &cause, on_frame, defaults, notices).map(|(capture, t)| (capture, t, true))
            }
            Err(e) => Err(e),
        };

        let (capture, engine_target, using_fallback) = match started {
            Ok(started) => started,
            Err(e) => {
                self.active.clear();
                control.transition(SessionState::Idle, notices);
                return Err(e);
            }
        };
        format.store(capture.format);

        let watch = match consumer.watch_destroyed(self.liveness_watcher(generation)) {
            Some(watch) => watch,
            None => {
                log::warn!("Consumer {} vanished during start; stopping capture", consumer.consumer_id());
                self.active.clear();
                if let Err(e) = control.adapter.stop_stream_capture() {
                    log::error!("Engine stop failed: {}", e);
                    notices.errors.push(e);
                }
                control.transition(SessionState::Idle, notices);
                return Err(CaptureError::ConsumerUnavailable);
            }
        };

        control.session = Some(CaptureSession {
            id: Uuid::new_v4(),
            generation,
            target,
            engine_target,
            capture,
            using_fallback,
            transport: consumer,
            watch: Some(watch),
            format,
            diagnostics,
            started_at: Utc::now(),
        });
        control.transition(SessionState::Streaming, notices);

        Ok(StartOutcome {
            sample_rate: capture.format.sample_rate,
            channels: capture.format.channels,
            using_fallback,
        })
    }

    /// Watcher that tears down exactly the session of `generation`.
    fn liveness_watcher(self: &Arc<Self>, generation: u64) -> LivenessCallback {
        let weak: Weak<Self> = Arc::downgrade(self);
        Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.stop_matching(StopReason::ConsumerDestroyed, |session| session.generation == generation);
            }
        })
    }

    fn stop_matching(&self, reason: StopReason, matches: impl FnOnce(&CaptureSession) -> bool) {
        let mut notices = Notices::default();
        {
            let mut control = self.control.lock();
            match &control.session {
                None => return,
                Some(session) if !matches(session) => {
                    log::debug!("Ignoring {} stop for another consumer's session", reason);
                    return;
                }
                Some(_) => {}
            }
            self.stop_locked(&mut control, reason, &mut notices);
        }
        self.notify(notices);
    }

    fn stop_locked(&self, control: &mut Control<E>, reason: StopReason, notices: &mut Notices) {
        let Some(session) = control.session.take() else {
            return;
        };
        control.transition(SessionState::Stopping, notices);
        self.active.clear();

        if let Some(watch) = session.watch {
            session.transport.unwatch_destroyed(watch);
        }

        let stats = session.diagnostics.snapshot();
        log::info!(
            "Stopping capture for {} ({}): {} frames forwarded, {} stale, {} delivery failures",
            session.target.client_id,
            reason,
            stats.frames_forwarded,
            stats.frames_dropped_stale,
            stats.delivery_failures
        );

        if let Err(e) = control.adapter.stop_stream_capture() {
            log::error!("Engine stop failed for {}: {}", session.target.client_id, e);
            notices.errors.push(e);
        }
        control.transition(SessionState::Idle, notices);
    }

    fn notify(&self, notices: Notices) {
        let Some(delegate) = self.delegate.lock().clone() else {
            return;
        };
        for error in &notices.errors {
            delegate.on_error(error);
        }
        for state in notices.states {
            delegate.on_state_changed(state);
        }
    }
}

/// Retry on the first active audio session after per-process loopback failed.
///
/// Returns the original loopback failure if the retry also fails, and
/// `NoActiveSession` if there is nothing to retry on.
fn fall_back<E: CaptureEngine>(
    control: &mut Control<E>,
    cause: &str,
    on_frame: FrameCallback,
    defaults: AudioFormat,
    notices: &mut Notices,
) -> Result<(EngineCapture, RequestTarget), CaptureError> {
    log::warn!("Process-specific loopback unavailable ({}); looking for an active audio session", cause);

    let sessions = control.adapter.list_audio_sessions().unwrap_or_else(|e| {
        log::warn!("Could not list audio sessions for fallback: {}", e);
        notices.errors.push(e);
        Vec::new()
    });
    let Some(candidate) = sessions.into_iter().find(|s| s.is_active) else {
        return Err(CaptureError::NoActiveSession { cause: cause.to_string() });
    };

    let fallback_target = RequestTarget::AudioSession {
        session_id: candidate.session_id,
        process_id: candidate.process_id,
    };
    log::warn!(
        "Falling back to audio session {} (pid {})",
        candidate.session_id,
        candidate.process_id
    );

    match control.adapter.start_stream_capture(&fallback_target, on_frame, defaults) {
        Ok(capture) => Ok((capture, fallback_target)),
        Err(e) => {
            log::warn!("Fallback capture failed: {}", e);
            notices.errors.push(e);
            Err(CaptureError::ProcessLoopbackUnavailable(cause.to_string()))
        }
    }
}

fn log_session_pids<E: CaptureEngine>(control: &Control<E>) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    match control.adapter.list_audio_sessions() {
        Ok(sessions) => {
            let pids: Vec<u32> = sessions.iter().map(|s| s.process_id).collect();
            log::debug!("Audio sessions before start: {:?}", pids);
        }
        Err(e) => log::debug!("Audio sessions unavailable before start: {}", e),
    }
}
