use crate::models::error::CaptureError;
use crate::models::state::SessionState;

/// Event delegate for session manager notifications.
///
/// Called from whichever thread drives the transition (the host thread for
/// `start`/`stop`, the transport's thread for consumer teardown).
/// Implementations should marshal to their own context if needed.
pub trait CaptureDelegate: Send + Sync {
    /// Called after every state transition.
    fn on_state_changed(&self, state: SessionState);

    /// Called for failures the manager recovers from locally (teardown,
    /// fallback attempts).
    fn on_error(&self, error: &CaptureError);
}
