use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::RecvTimeoutError;

use crate::models::audio_models::StartOutcome;
use crate::models::error::CaptureError;
use crate::models::state::StopReason;
use crate::models::target::{resolve, RawTarget};
use crate::session::manager::SessionManager;
use crate::stream::reconstructor::AudioStreamReconstructor;
use crate::traits::capture_engine::CaptureEngine;
use crate::transport::local::{local_channel, ConsumerEndpoint};

struct ActiveStream {
    endpoint: ConsumerEndpoint,
    reconstructor: Arc<AudioStreamReconstructor>,
    outcome: StartOutcome,
    running: Arc<AtomicBool>,
    pump: Option<thread::JoinHandle<()>>,
}

impl ActiveStream {
    fn halt_pump(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.pump.take() {
            let _ = handle.join();
        }
    }
}

/// Consumer-side handle for one window's audio.
///
/// Each `start` gets a fresh transport and a fresh reconstructor; a pump
/// thread moves frames from the one into the other. The audio graph pulls
/// from [`WindowAudioStream::reconstructor`].
///
/// ```text
/// [SessionManager] → [LocalTransport] ⇢ pump thread → [AudioStreamReconstructor] → render()
/// ```
///
/// Dropping the stream destroys its consumer endpoint; the session manager
/// sees the liveness signal and stops the native capture.
pub struct WindowAudioStream<E: CaptureEngine + 'static> {
    manager: SessionManager<E>,
    active: Option<ActiveStream>,
}

impl<E: CaptureEngine + 'static> WindowAudioStream<E> {
    pub fn new(manager: SessionManager<E>) -> Self {
        Self { manager, active: None }
    }

    /// Start streaming `raw`, replacing whatever this stream was playing.
    pub fn start(&mut self, raw: impl Into<RawTarget>) -> Result<Arc<AudioStreamReconstructor>, CaptureError> {
        self.stop()?;

        let raw = raw.into();
        let target = resolve(&raw)?;
        let (transport, endpoint) = local_channel();

        let outcome = self.manager.start(raw, Arc::new(transport))?;
        let config = self.manager.config();
        let reconstructor = Arc::new(AudioStreamReconstructor::new(
            target.client_id.clone(),
            outcome.format(),
            config,
        ));

        let running = Arc::new(AtomicBool::new(true));
        let pump = {
            let rx = endpoint.receiver();
            let reconstructor = Arc::clone(&reconstructor);
            let running = Arc::clone(&running);
            let poll = config.pump_poll_interval();

            thread::Builder::new()
                .name("window-audio-pump".into())
                .spawn(move || {
                    while running.load(Ordering::SeqCst) {
                        match rx.recv_timeout(poll) {
                            Ok(frame) => {
                                reconstructor.push_frame(&frame);
                            }
                            Err(RecvTimeoutError::Timeout) => continue,
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                })
        };
        let pump = match pump {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(stop_err) = self
                    .manager
                    .stop(StopReason::Other("pump spawn failed".into()), Some(endpoint.consumer_id()))
                {
                    log::error!("Failed to stop capture after pump spawn failure: {}", stop_err);
                }
                return Err(CaptureError::CaptureFailed(format!("failed to spawn pump thread: {}", e)));
            }
        };

        log::info!(
            "Streaming {} at {} Hz/{} ch{}",
            target.client_id,
            outcome.sample_rate,
            outcome.channels,
            if outcome.using_fallback { " (session fallback)" } else { "" }
        );

        self.active = Some(ActiveStream {
            endpoint,
            reconstructor: Arc::clone(&reconstructor),
            outcome,
            running,
            pump: Some(pump),
        });
        Ok(reconstructor)
    }

    /// Stop this stream's capture. A no-op if nothing is playing.
    pub fn stop(&mut self) -> Result<(), CaptureError> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        let result = self
            .manager
            .stop(StopReason::Requested, Some(active.endpoint.consumer_id()));
        active.halt_pump();
        result
    }

    /// Whether the manager's active session is still this stream's.
    pub fn is_capturing(&self) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        self.manager
            .session_info()
            .is_some_and(|info| info.consumer == active.endpoint.consumer_id())
    }

    pub fn reconstructor(&self) -> Option<Arc<AudioStreamReconstructor>> {
        self.active.as_ref().map(|a| Arc::clone(&a.reconstructor))
    }

    pub fn outcome(&self) -> Option<StartOutcome> {
        self.active.as_ref().map(|a| a.outcome)
    }
}

impl<E: CaptureEngine + 'static> Drop for WindowAudioStream<E> {
    fn drop(&mut self) {
        if let Some(mut active) = self.active.take() {
            active.halt_pump();
            active.endpoint.destroy();
        }
    }
}
