use std::fmt;

use serde::Serialize;

/// Capture session state machine.
///
/// State transitions:
/// ```text
/// idle → starting → streaming → stopping → idle
///           ↓
///          idle (start failed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Stopping,
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, Self::Streaming)
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Starting)
                | (Self::Starting, Self::Streaming)
                | (Self::Starting, Self::Idle)
                | (Self::Streaming, Self::Stopping)
                | (Self::Stopping, Self::Idle)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Why a session is being stopped. Logged and reported to the delegate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// Explicit stop from the consumer or host.
    Requested,
    /// A new `start` replaced the active session.
    Superseded,
    /// The consumer's owning context went away.
    ConsumerDestroyed,
    Other(String),
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("requested"),
            Self::Superseded => f.write_str("superseded"),
            Self::ConsumerDestroyed => f.write_str("consumer-destroyed"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(SessionState::Idle.can_transition_to(SessionState::Starting));
        assert!(SessionState::Starting.can_transition_to(SessionState::Idle));
        assert!(SessionState::Stopping.can_transition_to(SessionState::Idle));
        assert!(!SessionState::Idle.can_transition_to(SessionState::Streaming));
        assert!(!SessionState::Streaming.can_transition_to(SessionState::Idle));
    }

    #[test]
    fn consumer_destroyed_reason_text() {
        assert_eq!(StopReason::ConsumerDestroyed.to_string(), "consumer-destroyed");
    }
}
