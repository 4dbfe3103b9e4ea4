//! End-to-end capture scenarios against a scripted engine.

use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use parking_lot::Mutex;
use serde_json::{json, Value};

use window_audio_core::{
    local_channel, AudioFrame, CaptureConfiguration, CaptureDelegate, CaptureEngine, CaptureError, ConsumerId,
    ConsumerTransport, EngineError, EngineStartResult, FrameCallback, FramePayload, LivenessCallback, LocalTransport,
    NativeCaptureAdapter, RequestTarget, SessionManager, SessionState, StopReason, WatchId, WindowAudioStream,
};

const LOOPBACK_FAILURE: &str = "Failed to create process-specific loopback capture";

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Start(RequestTarget),
    Stop,
}

#[derive(Default)]
struct Script {
    calls: Vec<Call>,
    callback: Option<FrameCallback>,
    direct_fails: bool,
    fallback_fails: bool,
    stop_fails: bool,
    sessions: Value,
}

/// Engine double that records calls in order and keeps the last frame callback.
struct ScriptedEngine {
    script: Arc<Mutex<Script>>,
}

impl CaptureEngine for ScriptedEngine {
    fn list_windows(&self) -> Result<Value, EngineError> {
        Ok(json!([
            {"id": 100, "title": "Program Manager", "executableName": "explorer.exe", "processId": 1},
            {"id": 1234, "title": "Music Player", "executableName": "player.exe", "processId": 20}
        ]))
    }

    fn list_audio_sessions(&self) -> Result<Value, EngineError> {
        Ok(self.script.lock().sessions.clone())
    }

    fn start_stream_capture(
        &mut self,
        target: &RequestTarget,
        on_frame: FrameCallback,
    ) -> Result<EngineStartResult, EngineError> {
        let mut script = self.script.lock();
        script.calls.push(Call::Start(target.clone()));

        let fallback = matches!(target, RequestTarget::AudioSession { .. });
        if (fallback && script.fallback_fails) || (!fallback && script.direct_fails) {
            return Err(EngineError::new(LOOPBACK_FAILURE));
        }
        script.callback = Some(on_frame);
        Ok(EngineStartResult::started(48000, 2, !fallback))
    }

    fn stop_stream_capture(&mut self) -> Result<(), EngineError> {
        let mut script = self.script.lock();
        script.calls.push(Call::Stop);
        if script.stop_fails {
            return Err(EngineError::new("audio client already released"));
        }
        Ok(())
    }
}

struct Harness {
    manager: SessionManager<ScriptedEngine>,
    script: Arc<Mutex<Script>>,
}

impl Harness {
    fn new() -> Self {
        Self::with_script(Script::default())
    }

    fn with_script(script: Script) -> Self {
        let script = Arc::new(Mutex::new(script));
        let engine = ScriptedEngine {
            script: Arc::clone(&script),
        };
        Self {
            manager: SessionManager::new(NativeCaptureAdapter::new(engine), CaptureConfiguration::default()).unwrap(),
            script,
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.script.lock().calls.clone()
    }

    fn callback(&self) -> FrameCallback {
        self.script.lock().callback.clone().expect("engine was never started")
    }

    fn emit(&self, samples: Vec<f32>) {
        let callback = self.callback();
        callback(FramePayload::float32(samples, 48000, 2));
    }
}

#[derive(Default)]
struct RecordingDelegate {
    states: Mutex<Vec<SessionState>>,
    errors: Mutex<Vec<CaptureError>>,
}

impl CaptureDelegate for RecordingDelegate {
    fn on_state_changed(&self, state: SessionState) {
        self.states.lock().push(state);
    }

    fn on_error(&self, error: &CaptureError) {
        self.errors.lock().push(error.clone());
    }
}

/// Transport double that records every frame it is asked to deliver.
struct RecordingTransport {
    inner: LocalTransport,
    sent: Mutex<Vec<AudioFrame>>,
}

impl RecordingTransport {
    fn new(inner: LocalTransport) -> Self {
        Self {
            inner,
            sent: Mutex::new(Vec::new()),
        }
    }
}

impl ConsumerTransport for RecordingTransport {
    fn consumer_id(&self) -> ConsumerId {
        self.inner.consumer_id()
    }

    fn send(&self, frame: AudioFrame) -> Result<(), CaptureError> {
        self.sent.lock().push(frame.clone());
        self.inner.send(frame)
    }

    fn watch_destroyed(&self, on_destroyed: LivenessCallback) -> Option<WatchId> {
        self.inner.watch_destroyed(on_destroyed)
    }

    fn unwatch_destroyed(&self, watch: WatchId) {
        self.inner.unwatch_destroyed(watch)
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn restart_stops_previous_session_first() {
    let h = Harness::new();
    let (transport, _endpoint) = local_channel();
    let consumer: Arc<dyn ConsumerTransport> = Arc::new(transport);

    let outcome = h.manager.start(1234u32, Arc::clone(&consumer)).unwrap();
    assert_eq!(outcome.sample_rate, 48000);
    assert_eq!(outcome.channels, 2);
    assert!(!outcome.using_fallback);

    h.manager.start(5678u32, consumer).unwrap();

    assert_eq!(
        h.calls(),
        vec![
            Call::Start(RequestTarget::Handle(1234)),
            Call::Stop,
            Call::Start(RequestTarget::Handle(5678)),
        ]
    );
    assert_eq!(h.manager.state(), SessionState::Streaming);
    assert_eq!(h.manager.session_info().map(|i| i.client_id), Some("5678".into()));
}

#[test]
fn falls_back_to_first_active_session() {
    let h = Harness::with_script(Script {
        direct_fails: true,
        sessions: json!([
            {"processId": 10, "sessionId": 1, "isActive": false},
            {"processId": 20, "sessionId": 2, "isActive": true},
            {"processId": 30, "sessionId": 3, "isActive": true}
        ]),
        ..Default::default()
    });
    let (transport, _endpoint) = local_channel();

    let outcome = h.manager.start("1234", Arc::new(transport)).unwrap();

    assert!(outcome.using_fallback);
    let fallback = RequestTarget::AudioSession {
        session_id: 2,
        process_id: 20,
    };
    assert_eq!(h.calls().last(), Some(&Call::Start(fallback.clone())));

    let info = h.manager.session_info().unwrap();
    assert_eq!(info.client_id, "1234");
    assert_eq!(info.engine_target, fallback);
    assert!(info.using_fallback);
}

#[test]
fn fallback_without_active_session_fails() {
    let h = Harness::with_script(Script {
        direct_fails: true,
        sessions: json!([{"processId": 10, "sessionId": 1, "isActive": false}]),
        ..Default::default()
    });
    let (transport, _endpoint) = local_channel();

    let err = h.manager.start(1234u32, Arc::new(transport)).unwrap_err();

    assert!(matches!(err, CaptureError::NoActiveSession { cause } if cause.contains("process-specific")));
    assert_eq!(h.manager.state(), SessionState::Idle);
    assert_eq!(h.calls().len(), 1);
}

#[test]
fn failed_fallback_reports_original_failure() {
    let h = Harness::with_script(Script {
        direct_fails: true,
        fallback_fails: true,
        sessions: json!({"0": {"processId": 20, "sessionId": 2, "isActive": true}}),
        ..Default::default()
    });
    let delegate = Arc::new(RecordingDelegate::default());
    h.manager.set_delegate(delegate.clone());
    let (transport, _endpoint) = local_channel();

    let err = h.manager.start(1234u32, Arc::new(transport)).unwrap_err();

    assert_eq!(err, CaptureError::ProcessLoopbackUnavailable(LOOPBACK_FAILURE.into()));
    assert_eq!(h.manager.state(), SessionState::Idle);
    assert_eq!(h.calls().len(), 2);
    assert_eq!(delegate.errors.lock().len(), 1);
    assert_eq!(delegate.states.lock().last(), Some(&SessionState::Idle));
}

#[test]
fn superseded_session_frames_never_reach_new_consumer() {
    let h = Harness::new();
    let (first, first_endpoint) = local_channel();
    h.manager.start("A", Arc::new(first)).unwrap();
    let stale = h.callback();

    let (second, second_endpoint) = local_channel();
    h.manager.start("B", Arc::new(second)).unwrap();

    stale(FramePayload::float32(vec![0.9; 4], 48000, 2));
    assert!(first_endpoint.try_recv().is_none());
    assert!(second_endpoint.try_recv().is_none());

    h.emit(vec![0.1, 0.2]);
    let frame = second_endpoint.try_recv().unwrap();
    assert_eq!(frame.client_id, "B");
    assert_eq!(frame.samples, vec![0.1, 0.2]);
}

#[test]
fn frames_keep_order_and_default_format() {
    let h = Harness::new();
    let (transport, endpoint) = local_channel();
    h.manager.start(77u32, Arc::new(transport)).unwrap();

    let callback = h.callback();
    callback(FramePayload::from_json(json!({"data": {"samples": {"0": 0.25, "1": -0.25}}})));
    callback(FramePayload::from_json(json!({"samples": [0.5, "0.75"], "sampleRate": 44100, "channels": 1})));

    let first = endpoint.try_recv().unwrap();
    assert_eq!((first.sample_rate, first.channels), (48000, 2));
    assert_relative_eq!(first.samples[1], -0.25);

    let second = endpoint.try_recv().unwrap();
    assert_eq!((second.sample_rate, second.channels), (44100, 1));
    assert_relative_eq!(second.samples[1], 0.75);
}

#[test]
fn consumer_teardown_stops_capture() {
    let h = Harness::new();
    let (transport, endpoint) = local_channel();
    let recorder = Arc::new(RecordingTransport::new(transport));
    h.manager.start("99", recorder.clone()).unwrap();
    let callback = h.callback();

    callback(FramePayload::float32(vec![0.1; 2], 48000, 2));
    assert_eq!(recorder.sent.lock().len(), 1);

    endpoint.destroy();

    assert_eq!(h.manager.state(), SessionState::Idle);
    assert_eq!(h.calls(), vec![Call::Start(RequestTarget::Handle(99)), Call::Stop]);
    assert!(h.manager.session_info().is_none());

    // Trailing engine callbacks after stop are dropped, not delivered.
    callback(FramePayload::float32(vec![0.3; 2], 48000, 2));
    assert_eq!(recorder.sent.lock().len(), 1);
    assert_eq!(h.calls().len(), 2);
}

#[test]
fn concurrent_starts_are_serialized() {
    let h = Harness::new();
    let barrier = Arc::new(Barrier::new(2));
    let (first, _first_endpoint) = local_channel();
    let (second, _second_endpoint) = local_channel();
    let consumers = [first.consumer_id(), second.consumer_id()];

    let handles: Vec<_> = [(1234u32, first), (5678u32, second)]
        .into_iter()
        .map(|(hwnd, transport)| {
            let manager = h.manager.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                manager.start(hwnd, Arc::new(transport))
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let calls = h.calls();
    assert_eq!(calls.len(), 3);
    assert!(matches!(calls[0], Call::Start(RequestTarget::Handle(_))));
    assert_eq!(calls[1], Call::Stop);
    assert!(matches!(calls[2], Call::Start(RequestTarget::Handle(_))));
    assert_ne!(calls[0], calls[2]);

    assert_eq!(h.manager.state(), SessionState::Streaming);
    let info = h.manager.session_info().unwrap();
    assert!(consumers.contains(&info.consumer));
    let winner = if info.client_id == "1234" { 1234 } else { 5678 };
    assert_eq!(calls[2], Call::Start(RequestTarget::Handle(winner)));
}

#[test]
fn stop_when_idle_makes_no_engine_call() {
    let h = Harness::new();
    assert!(h.manager.stop(StopReason::Requested, None).is_ok());
    assert!(h.manager.stop(StopReason::Requested, Some(ConsumerId::new())).is_ok());
    assert!(h.calls().is_empty());
}

#[test]
fn stop_for_another_consumer_is_ignored() {
    let h = Harness::new();
    let (transport, endpoint) = local_channel();
    h.manager.start(5u32, Arc::new(transport)).unwrap();

    h.manager.stop(StopReason::Requested, Some(ConsumerId::new())).unwrap();
    assert!(h.manager.is_streaming());
    assert_eq!(h.calls().len(), 1);

    h.manager
        .stop(StopReason::Requested, Some(endpoint.consumer_id()))
        .unwrap();
    assert_eq!(h.manager.state(), SessionState::Idle);
}

#[test]
fn teardown_failure_still_converges_to_idle() {
    let h = Harness::with_script(Script {
        stop_fails: true,
        ..Default::default()
    });
    let delegate = Arc::new(RecordingDelegate::default());
    h.manager.set_delegate(delegate.clone());
    let (transport, _endpoint) = local_channel();
    h.manager.start(5u32, Arc::new(transport)).unwrap();

    assert!(h.manager.stop(StopReason::Requested, None).is_ok());

    assert_eq!(h.manager.state(), SessionState::Idle);
    assert!(matches!(
        delegate.errors.lock().as_slice(),
        [CaptureError::TeardownFailure(_)]
    ));
}

#[test]
fn unavailable_engine_short_circuits() {
    let manager: SessionManager<ScriptedEngine> = SessionManager::new(
        NativeCaptureAdapter::unavailable("module not found"),
        CaptureConfiguration::default(),
    )
    .unwrap();
    let (transport, _endpoint) = local_channel();

    let err = manager.start(1u32, Arc::new(transport)).unwrap_err();
    assert!(matches!(err, CaptureError::EngineUnavailable(_)));
    assert!(!err.is_retryable());
    assert!(matches!(manager.list_windows(), Err(CaptureError::EngineUnavailable(_))));
    assert!(matches!(manager.list_audio_sessions(), Err(CaptureError::EngineUnavailable(_))));
    assert_eq!(manager.state(), SessionState::Idle);
}

#[test]
fn listing_hides_system_windows() {
    let h = Harness::new();
    let windows = h.manager.list_windows().unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(h.manager.find_window("music").unwrap(), None);
    assert_eq!(h.manager.find_window("Music").unwrap().map(|w| w.id), Some(1234));
}

#[test]
fn window_stream_reconstructs_pulled_blocks() {
    let h = Harness::new();
    let mut stream = WindowAudioStream::new(h.manager.clone());
    let recon = stream.start(42u32).unwrap();

    h.emit(vec![0.1, -0.1, 0.2, -0.2]);
    assert!(wait_until(|| recon.queued_samples() == 4));

    let mut left = [0.0f32; 2];
    let mut right = [0.0f32; 2];
    assert!(recon.render(&mut [&mut left[..], &mut right[..]]));
    assert_relative_eq!(left[1], 0.2);
    assert_relative_eq!(right[0], -0.1);

    // Empty queue: strict silence, no partial block.
    assert!(!recon.render(&mut [&mut left[..], &mut right[..]]));
    assert_eq!(left, [0.0, 0.0]);
}

#[test]
fn restarting_window_stream_uses_fresh_queue() {
    let h = Harness::new();
    let mut stream = WindowAudioStream::new(h.manager.clone());
    let first = stream.start(1u32).unwrap();
    h.emit(vec![0.5; 8]);
    assert!(wait_until(|| first.queued_samples() == 8));

    let second = stream.start(2u32).unwrap();
    assert_eq!(second.queued_samples(), 0);
    assert_eq!(second.client_id(), "2");
    assert_eq!(
        h.calls(),
        vec![
            Call::Start(RequestTarget::Handle(1)),
            Call::Stop,
            Call::Start(RequestTarget::Handle(2)),
        ]
    );
}

#[test]
fn dropping_window_stream_stops_capture() {
    let h = Harness::new();
    let mut stream = WindowAudioStream::new(h.manager.clone());
    stream.start("Music Player").unwrap();
    assert!(stream.is_capturing());

    drop(stream);

    assert_eq!(h.manager.state(), SessionState::Idle);
    assert_eq!(h.calls().last(), Some(&Call::Stop));
}
