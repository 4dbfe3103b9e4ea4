//! Forwarding of engine frames to the session's consumer.
//!
//! A [`FrameRelay`] is built per session and closed over that session's
//! identity. It runs on the engine's capture thread, so it never blocks, never
//! panics outward, and treats every failure as a dropped frame.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU16, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::adapter::native::panic_message;
use crate::models::audio_models::{AudioFormat, AudioFrame};
use crate::models::frame_payload::FramePayload;
use crate::traits::capture_engine::FrameCallback;
use crate::traits::consumer_transport::ConsumerTransport;

/// Generation of the session currently allowed to deliver frames; 0 = none.
#[derive(Debug, Default)]
pub struct ActiveSession(AtomicU64);

impl ActiveSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&self, generation: u64) {
        self.0.store(generation, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::SeqCst);
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation != 0 && self.0.load(Ordering::SeqCst) == generation
    }
}

/// Session format readable from the capture thread without locking.
#[derive(Debug)]
pub struct NegotiatedFormat {
    sample_rate: AtomicU32,
    channels: AtomicU16,
}

impl NegotiatedFormat {
    pub fn new(format: AudioFormat) -> Self {
        Self {
            sample_rate: AtomicU32::new(format.sample_rate),
            channels: AtomicU16::new(format.channels),
        }
    }

    pub fn store(&self, format: AudioFormat) {
        self.sample_rate.store(format.sample_rate, Ordering::Release);
        self.channels.store(format.channels, Ordering::Release);
    }

    pub fn load(&self) -> AudioFormat {
        AudioFormat::new(
            self.sample_rate.load(Ordering::Acquire),
            self.channels.load(Ordering::Acquire),
        )
    }
}

/// Counters updated from the capture thread.
#[derive(Debug, Default)]
pub struct RelayDiagnostics {
    frames_forwarded: AtomicU64,
    samples_forwarded: AtomicU64,
    frames_dropped_stale: AtomicU64,
    delivery_failures: AtomicU64,
}

impl RelayDiagnostics {
    pub fn snapshot(&self) -> RelayStats {
        RelayStats {
            frames_forwarded: self.frames_forwarded.load(Ordering::Relaxed),
            samples_forwarded: self.samples_forwarded.load(Ordering::Relaxed),
            frames_dropped_stale: self.frames_dropped_stale.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStats {
    pub frames_forwarded: u64,
    pub samples_forwarded: u64,
    pub frames_dropped_stale: u64,
    pub delivery_failures: u64,
}

/// Per-session forwarder from the engine callback to the consumer transport.
pub struct FrameRelay {
    generation: u64,
    client_id: String,
    active: Arc<ActiveSession>,
    format: Arc<NegotiatedFormat>,
    transport: Arc<dyn ConsumerTransport>,
    diagnostics: Arc<RelayDiagnostics>,
}

impl FrameRelay {
    pub fn new(
        generation: u64,
        client_id: String,
        active: Arc<ActiveSession>,
        format: Arc<NegotiatedFormat>,
        transport: Arc<dyn ConsumerTransport>,
        diagnostics: Arc<RelayDiagnostics>,
    ) -> Self {
        Self {
            generation,
            client_id,
            active,
            format,
            transport,
            diagnostics,
        }
    }

    /// Wrap this relay as an engine frame callback.
    pub fn into_callback(self) -> FrameCallback {
        Arc::new(move |payload| self.forward(payload))
    }

    /// Forward one engine payload. Never panics, never blocks.
    pub fn forward(&self, payload: FramePayload) {
        if !self.active.is_current(self.generation) {
            let dropped = self.diagnostics.frames_dropped_stale.fetch_add(1, Ordering::Relaxed) + 1;
            if dropped == 1 {
                log::debug!("Dropping frame for superseded session {}", self.client_id);
            }
            return;
        }

        let frame = self.resolve(payload);
        let sample_count = frame.samples.len() as u64;

        let delivered = panic::catch_unwind(AssertUnwindSafe(|| self.transport.send(frame)));
        match delivered {
            Ok(Ok(())) => {
                self.diagnostics.frames_forwarded.fetch_add(1, Ordering::Relaxed);
                self.diagnostics
                    .samples_forwarded
                    .fetch_add(sample_count, Ordering::Relaxed);
            }
            Ok(Err(e)) => self.record_delivery_failure(&e.to_string()),
            Err(payload) => self.record_delivery_failure(&panic_message(payload.as_ref())),
        }
    }

    fn resolve(&self, payload: FramePayload) -> AudioFrame {
        let body = payload.into_body();
        let format = self.format.load();
        AudioFrame {
            client_id: self.client_id.clone(),
            samples: body.samples.into_samples(),
            sample_rate: body.sample_rate.filter(|r| *r > 0).unwrap_or(format.sample_rate),
            channels: body.channels.filter(|c| *c > 0).unwrap_or(format.channels),
        }
    }

    fn record_delivery_failure(&self, reason: &str) {
        let failures = self.diagnostics.delivery_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures == 1 || failures % 100 == 0 {
            log::warn!(
                "Frame delivery to consumer {} failed ({} so far): {}",
                self.transport.consumer_id(),
                failures,
                reason
            );
        }
    }
}
