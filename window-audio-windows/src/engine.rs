//! `CaptureEngine` implementation over WASAPI.

use std::sync::Arc;

use serde_json::Value;
use windows::Win32::Media::Audio::{IMMDeviceEnumerator, MMDeviceEnumerator};
use windows::Win32::System::Com::{CoCreateInstance, CLSCTX_ALL};

use window_audio_core::models::error::EngineError;
use window_audio_core::models::target::RequestTarget;
use window_audio_core::traits::capture_engine::{CaptureEngine, EngineStartResult, FrameCallback};

use crate::com::ComScope;
use crate::loopback::LoopbackCapture;
use crate::session_enumerator::render_sessions;
use crate::targeting::{process_for_name, LoopbackSource};
use crate::window_enumerator::{top_level_windows, window_process_id};

/// WASAPI capture engine.
///
/// Window and name targets are captured through per-process loopback on the
/// owning process; a failure is reported as a process-specific loopback error
/// so the session manager can fall back to a session target. Session targets
/// try per-process loopback on the session's process and drop to render
/// endpoint loopback if that process cannot be captured on its own.
pub struct WasapiEngine {
    capture: Option<LoopbackCapture>,
}

impl WasapiEngine {
    /// Probe the MMDevice API; fails if no audio stack is reachable.
    pub fn new() -> Result<Self, EngineError> {
        let _com = ComScope::enter()?;
        unsafe {
            let _: IMMDeviceEnumerator = CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL)
                .map_err(|e| EngineError::new(format!("MMDevice API unavailable: {}", e)))?;
        }
        Ok(Self { capture: None })
    }

    fn run(&mut self, capture: LoopbackCapture) -> EngineStartResult {
        let format = capture.format();
        let process_specific = capture.source().is_process_specific();
        self.capture = Some(capture);
        EngineStartResult::started(format.sample_rate, format.channels, process_specific)
    }
}

/// Error the core adapter classifies as a per-process loopback failure.
fn no_process_loopback(what: &str) -> EngineError {
    EngineError::new(format!("Failed to create process-specific loopback capture for {}", what))
}

impl CaptureEngine for WasapiEngine {
    fn list_windows(&self) -> Result<Value, EngineError> {
        serde_json::to_value(top_level_windows()?).map_err(|e| EngineError::new(e.to_string()))
    }

    fn list_audio_sessions(&self) -> Result<Value, EngineError> {
        serde_json::to_value(render_sessions()?).map_err(|e| EngineError::new(e.to_string()))
    }

    fn start_stream_capture(
        &mut self,
        target: &RequestTarget,
        on_frame: FrameCallback,
    ) -> Result<EngineStartResult, EngineError> {
        if self.capture.is_some() {
            self.stop_stream_capture()?;
        }

        match target {
            RequestTarget::Handle(handle) => {
                let pid = window_process_id(*handle)
                    .ok_or_else(|| no_process_loopback(&format!("window {} (no owning process)", handle)))?;
                log::info!("Capturing window {} through process loopback on pid {}", handle, pid);
                let capture = LoopbackCapture::start(LoopbackSource::Process(pid), on_frame)?;
                Ok(self.run(capture))
            }
            RequestTarget::Name(name) => {
                let windows = top_level_windows().unwrap_or_default();
                let sessions = render_sessions().unwrap_or_default();
                let pid = process_for_name(name, &windows, &sessions)
                    .ok_or_else(|| no_process_loopback(&format!("'{}' (no running process)", name)))?;
                log::info!("Capturing '{}' through process loopback on pid {}", name, pid);
                let capture = LoopbackCapture::start(LoopbackSource::Process(pid), on_frame)?;
                Ok(self.run(capture))
            }
            RequestTarget::AudioSession {
                session_id,
                process_id,
            } => {
                log::info!("Capturing audio session {} (pid {})", session_id, process_id);
                let capture = match LoopbackCapture::start(LoopbackSource::Process(*process_id), Arc::clone(&on_frame)) {
                    Ok(capture) => capture,
                    Err(e) => {
                        log::warn!("{}; capturing the render endpoint mix instead", e);
                        LoopbackCapture::start(LoopbackSource::Endpoint, on_frame)?
                    }
                };
                Ok(self.run(capture))
            }
        }
    }

    fn stop_stream_capture(&mut self) -> Result<(), EngineError> {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        Ok(())
    }
}
