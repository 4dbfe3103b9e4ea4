//! # window-audio-core
//!
//! Platform-agnostic core of the window/process audio capture pipeline.
//!
//! Selects a capture target, drives a platform capture engine through the
//! `CaptureEngine` trait, relays captured frames to a consumer and rebuilds a
//! pull-consumable stream on the consumer side. Platform backends (Windows
//! WASAPI) implement `CaptureEngine` and plug into the generic `SessionManager`.
//!
//! ## Architecture
//!
//! ```text
//! window-audio-core (this crate)
//! ├── models/       ← CaptureError, RawTarget/CaptureTarget, SessionState, AudioFrame, FramePayload, config
//! ├── traits/       ← CaptureEngine, ConsumerTransport, CaptureDelegate
//! ├── processing/   ← ordered-sequence coercion, AudioSampleQueue
//! ├── adapter/      ← NativeCaptureAdapter (engine contract wrapper)
//! ├── session/      ← SessionManager (single global session, fallback, teardown)
//! ├── relay/        ← FrameRelay (stale guard, format defaults, delivery)
//! ├── stream/       ← AudioStreamReconstructor, WindowAudioStream
//! └── transport/    ← in-process LocalTransport with liveness
//! ```
//!
//! Data flow:
//!
//! ```text
//! resolve → SessionManager → NativeCaptureAdapter → engine thread
//!                                                    ↓ FramePayload
//!                         FrameRelay → ConsumerTransport → AudioStreamReconstructor → audio graph
//! ```

pub mod adapter;
pub mod models;
pub mod processing;
pub mod relay;
pub mod session;
pub mod stream;
pub mod traits;
pub mod transport;

// Re-export key types at crate root for convenience.
pub use adapter::native::{EngineCapture, NativeCaptureAdapter};
pub use models::audio_models::{AudioFormat, AudioFrame, AudioSessionInfo, StartOutcome, WindowInfo};
pub use models::config::CaptureConfiguration;
pub use models::error::{CaptureError, EngineError};
pub use models::frame_payload::{FrameBody, FramePayload, SampleData};
pub use models::state::{SessionState, StopReason};
pub use models::target::{resolve, CaptureTarget, RawTarget, RequestTarget};
pub use processing::coercion::to_ordered_sequence;
pub use processing::sample_queue::AudioSampleQueue;
pub use relay::frame_relay::{FrameRelay, RelayStats};
pub use session::manager::{SessionInfo, SessionManager};
pub use stream::reconstructor::{AudioStreamReconstructor, ReconstructorStats};
pub use stream::window_stream::WindowAudioStream;
pub use traits::capture_delegate::CaptureDelegate;
pub use traits::capture_engine::{CaptureEngine, EngineStartResult, FrameCallback};
pub use traits::consumer_transport::{ConsumerId, ConsumerTransport, LivenessCallback, WatchId};
pub use transport::local::{local_channel, ConsumerEndpoint, LocalTransport};
