//! Thin contract wrapper around the platform capture engine.
//!
//! Normalises the engine's loosely shaped listings, filters out shell and
//! system windows, and turns every engine error or panic into a typed
//! [`CaptureError`]. Fallback policy is not decided here: a failed
//! per-process loopback is reported as
//! [`CaptureError::ProcessLoopbackUnavailable`] and left to the caller.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use serde::de::DeserializeOwned;

use crate::models::audio_models::{AudioFormat, AudioSessionInfo, WindowInfo};
use crate::models::error::{CaptureError, EngineError};
use crate::models::target::RequestTarget;
use crate::processing::coercion::to_ordered_sequence;
use crate::traits::capture_engine::{CaptureEngine, EngineStartResult, FrameCallback};

/// Executables whose windows never carry application audio.
const NON_APPLICATION_EXECUTABLES: [&str; 3] = ["explorer.exe", "dwm.exe", "taskmgr.exe"];

/// Engine message fragment identifying a per-process loopback failure.
const PROCESS_LOOPBACK_FAILURE: &str = "process-specific loopback";

/// Format and mode negotiated by a successful engine start.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineCapture {
    pub format: AudioFormat,
    pub process_specific: bool,
}

pub struct NativeCaptureAdapter<E: CaptureEngine> {
    engine: Result<E, String>,
}

impl<E: CaptureEngine> NativeCaptureAdapter<E> {
    pub fn new(engine: E) -> Self {
        Self { engine: Ok(engine) }
    }

    /// An adapter whose every operation fails with `EngineUnavailable`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            engine: Err(reason.into()),
        }
    }

    /// Build the engine with `loader`, recording a load failure (error or
    /// panic) as engine unavailability.
    pub fn load(loader: impl FnOnce() -> Result<E, EngineError>) -> Self {
        match guarded("engine load", loader) {
            Ok(engine) => Self::new(engine),
            Err(e) => {
                log::error!("Capture engine failed to load: {}", e);
                Self::unavailable(e.message)
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.engine.is_ok()
    }

    /// Application windows, in engine order.
    pub fn list_windows(&self) -> Result<Vec<WindowInfo>, CaptureError> {
        let engine = self.engine()?;
        let raw = guarded("list_windows", || engine.list_windows())
            .map_err(|e| CaptureError::CaptureFailed(format!("listing windows failed: {}", e)))?;

        let windows: Vec<WindowInfo> = decode_entries(&raw);
        Ok(windows.into_iter().filter(is_application_window).collect())
    }

    /// Audio sessions on the render endpoint, in engine order.
    pub fn list_audio_sessions(&self) -> Result<Vec<AudioSessionInfo>, CaptureError> {
        let engine = self.engine()?;
        let raw = guarded("list_audio_sessions", || engine.list_audio_sessions())
            .map_err(|e| CaptureError::CaptureFailed(format!("listing audio sessions failed: {}", e)))?;
        Ok(decode_entries(&raw))
    }

    /// First application window whose title contains `query`, or whose
    /// executable name contains it case-insensitively.
    pub fn find_window(&self, query: &str) -> Result<Option<WindowInfo>, CaptureError> {
        let needle = query.to_lowercase();
        Ok(self
            .list_windows()?
            .into_iter()
            .find(|w| w.title.contains(query) || w.executable_name.to_lowercase().contains(&needle)))
    }

    /// Start the engine. Missing format fields fall back to `defaults`.
    pub fn start_stream_capture(
        &mut self,
        target: &RequestTarget,
        on_frame: FrameCallback,
        defaults: AudioFormat,
    ) -> Result<EngineCapture, CaptureError> {
        let engine = self.engine_mut()?;
        let result = guarded("start_stream_capture", || engine.start_stream_capture(target, on_frame))
            .map_err(|e| classify_start_failure(&e.message))?;
        negotiated(result, defaults)
    }

    pub fn stop_stream_capture(&mut self) -> Result<(), CaptureError> {
        let engine = self.engine_mut()?;
        guarded("stop_stream_capture", || engine.stop_stream_capture())
            .map_err(|e| CaptureError::TeardownFailure(e.message))
    }

    fn engine(&self) -> Result<&E, CaptureError> {
        self.engine
            .as_ref()
            .map_err(|reason| CaptureError::EngineUnavailable(reason.clone()))
    }

    fn engine_mut(&mut self) -> Result<&mut E, CaptureError> {
        self.engine
            .as_mut()
            .map_err(|reason| CaptureError::EngineUnavailable(reason.clone()))
    }
}

fn negotiated(result: EngineStartResult, defaults: AudioFormat) -> Result<EngineCapture, CaptureError> {
    if !result.success {
        let message = result
            .error
            .unwrap_or_else(|| "engine reported failure without a reason".into());
        return Err(classify_start_failure(&message));
    }

    let sample_rate = result.sample_rate.filter(|r| *r > 0).unwrap_or(defaults.sample_rate);
    let channels = result.channels.filter(|c| *c > 0).unwrap_or(defaults.channels);
    Ok(EngineCapture {
        format: AudioFormat::new(sample_rate, channels),
        process_specific: result.using_process_specific_loopback.unwrap_or(false),
    })
}

fn classify_start_failure(message: &str) -> CaptureError {
    if message.to_lowercase().contains(PROCESS_LOOPBACK_FAILURE) {
        CaptureError::ProcessLoopbackUnavailable(message.to_string())
    } else {
        CaptureError::CaptureFailed(message.to_string())
    }
}

fn is_application_window(window: &WindowInfo) -> bool {
    let exe = window.executable_name.to_lowercase();
    !exe.is_empty() && !NON_APPLICATION_EXECUTABLES.iter().any(|deny| exe.contains(deny))
}

/// Decode every sequence element as `T`, dropping those that don't fit.
fn decode_entries<T: DeserializeOwned>(raw: &serde_json::Value) -> Vec<T> {
    to_ordered_sequence(raw)
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                log::debug!("Dropping malformed engine entry: {}", e);
                None
            }
        })
        .collect()
}

/// Run an engine call, turning a panic into an [`EngineError`].
fn guarded<T>(operation: &str, call: impl FnOnce() -> Result<T, EngineError>) -> Result<T, EngineError> {
    panic::catch_unwind(AssertUnwindSafe(call)).unwrap_or_else(|payload| {
        Err(EngineError::new(format!(
            "{} panicked: {}",
            operation,
            panic_message(payload.as_ref())
        )))
    })
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".into()
    }
}
