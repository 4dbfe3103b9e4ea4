use std::fmt;

use serde::Serialize;
use uuid::Uuid;

use crate::models::audio_models::AudioFrame;
use crate::models::error::CaptureError;

/// Identity of a consumer across the process boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ConsumerId(Uuid);

impl ConsumerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConsumerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Registration handle returned by [`ConsumerTransport::watch_destroyed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WatchId(pub u64);

/// Invoked once when the consumer's owning context is destroyed.
pub type LivenessCallback = Box<dyn FnOnce() + Send + 'static>;

/// Delivery channel to a frame consumer, plus its liveness signal.
pub trait ConsumerTransport: Send + Sync {
    fn consumer_id(&self) -> ConsumerId;

    /// Deliver one frame. Called from the engine's capture thread.
    fn send(&self, frame: AudioFrame) -> Result<(), CaptureError>;

    /// Register `on_destroyed` to run when the consumer goes away.
    ///
    /// Returns `None` (without calling the callback) if the consumer is
    /// already gone. Callbacks must not be invoked from inside this call.
    fn watch_destroyed(&self, on_destroyed: LivenessCallback) -> Option<WatchId>;

    fn unwatch_destroyed(&self, watch: WatchId);
}
