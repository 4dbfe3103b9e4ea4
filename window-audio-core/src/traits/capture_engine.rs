use std::sync::Arc;

use serde::Deserialize;

use crate::models::error::EngineError;
use crate::models::frame_payload::FramePayload;
use crate::models::target::RequestTarget;

/// Callback invoked by the engine for every captured batch.
///
/// Fires on an engine-owned thread, possibly real-time; implementations must
/// not block.
pub type FrameCallback = Arc<dyn Fn(FramePayload) + Send + Sync + 'static>;

/// What the engine reports back from `start_stream_capture`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStartResult {
    pub success: bool,
    #[serde(default)]
    pub sample_rate: Option<u32>,
    #[serde(default)]
    pub channels: Option<u16>,
    #[serde(default)]
    pub using_process_specific_loopback: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

impl EngineStartResult {
    pub fn started(sample_rate: u32, channels: u16, process_specific: bool) -> Self {
        Self {
            success: true,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
            using_process_specific_loopback: Some(process_specific),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            ..Default::default()
        }
    }
}

/// Contract of the platform capture engine.
///
/// Listing primitives return loosely shaped sequences (true arrays, array-like
/// objects, or numeric-keyed objects); the adapter normalises them. Errors are
/// plain messages; the adapter classifies them.
///
/// Implemented by:
/// - `WasapiEngine` (Windows)
pub trait CaptureEngine: Send {
    /// Top-level windows: `{ id, title, executableName, processId }`.
    fn list_windows(&self) -> Result<serde_json::Value, EngineError>;

    /// Audio sessions: `{ processId, sessionId, isActive, sessionName? }`.
    fn list_audio_sessions(&self) -> Result<serde_json::Value, EngineError>;

    /// Begin streaming from `target`. After success `on_frame` may be called
    /// zero or more times, asynchronously, until shortly after
    /// `stop_stream_capture` returns.
    fn start_stream_capture(
        &mut self,
        target: &RequestTarget,
        on_frame: FrameCallback,
    ) -> Result<EngineStartResult, EngineError>;

    fn stop_stream_capture(&mut self) -> Result<(), EngineError>;
}
