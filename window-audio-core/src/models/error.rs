use thiserror::Error;

/// Errors that can occur while selecting, starting, relaying or tearing down
/// a window audio capture.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// Missing or malformed capture target. Rejected before any engine call.
    #[error("invalid capture target: {0}")]
    InvalidTarget(String),

    /// The platform capture engine could not be loaded or initialised.
    #[error("capture engine unavailable: {0}")]
    EngineUnavailable(String),

    /// Per-process loopback could not be constructed for the requested target.
    #[error("process-specific loopback unavailable: {0}")]
    ProcessLoopbackUnavailable(String),

    /// Session fallback was attempted but no audio session is active.
    #[error("no active audio session to fall back to ({cause})")]
    NoActiveSession { cause: String },

    /// The consumer transport rejected a frame.
    #[error("frame delivery failed: {0}")]
    DeliveryFailure(String),

    /// The engine's stop call failed. Local state still converges to idle.
    #[error("capture teardown failed: {0}")]
    TeardownFailure(String),

    /// The engine refused to start for a reason other than process loopback.
    #[error("capture failed: {0}")]
    CaptureFailed(String),

    /// The capture configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The consumer was already gone when the session tried to watch it.
    #[error("consumer is no longer reachable")]
    ConsumerUnavailable,
}

impl CaptureError {
    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::EngineUnavailable(_)
                | Self::InvalidConfiguration(_)
                | Self::DeliveryFailure(_)
                | Self::TeardownFailure(_)
        )
    }
}

/// Failure raised by a [`CaptureEngine`](crate::traits::capture_engine::CaptureEngine)
/// primitive. Carries only the engine's message; the adapter classifies it.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct EngineError {
    pub message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
