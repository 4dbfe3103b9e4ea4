use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;

use crate::models::audio_models::{AudioFormat, AudioFrame};
use crate::models::config::CaptureConfiguration;
use crate::processing::sample_queue::AudioSampleQueue;

/// Counters describing one reconstructor's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructorStats {
    pub frames_accepted: u64,
    pub frames_rejected: u64,
    pub blocks_rendered: u64,
    pub underruns: u64,
    pub format_changes: u64,
    pub queue_depth: usize,
}

struct ReconstructorState {
    queue: AudioSampleQueue,
    scratch: Vec<f32>,
    format: AudioFormat,
    stats: ReconstructorStats,
    last_health_log: Instant,
    stalled: bool,
}

/// Consumer-side rebuild of a continuous stream from relayed frames.
///
/// Owns the sample queue of exactly one capture session; a new session gets a
/// new reconstructor. Frames from any other client id are dropped, and a pull
/// that cannot be fully satisfied renders silence for the whole block.
///
/// ```text
/// [transport] → push_frame ─→ [AudioSampleQueue] ─→ render → [audio graph]
/// ```
pub struct AudioStreamReconstructor {
    client_id: String,
    block_frames: usize,
    stall_threshold_blocks: usize,
    health_log_interval: Duration,
    state: Mutex<ReconstructorState>,
}

impl AudioStreamReconstructor {
    pub fn new(client_id: impl Into<String>, format: AudioFormat, config: &CaptureConfiguration) -> Self {
        let block_samples = config.block_frames * format.channels.max(1) as usize;
        Self {
            client_id: client_id.into(),
            block_frames: config.block_frames,
            stall_threshold_blocks: config.stall_threshold_blocks,
            health_log_interval: config.health_log_interval(),
            state: Mutex::new(ReconstructorState {
                queue: AudioSampleQueue::with_capacity(block_samples * 2),
                scratch: Vec::with_capacity(block_samples),
                format,
                stats: ReconstructorStats::default(),
                last_health_log: Instant::now(),
                stalled: false,
            }),
        }
    }

    /// The client id this reconstructor accepts frames for.
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current stream format. May change between pulls.
    pub fn format(&self) -> AudioFormat {
        self.state.lock().format
    }

    pub fn queued_samples(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn stats(&self) -> ReconstructorStats {
        let state = self.state.lock();
        ReconstructorStats {
            queue_depth: state.queue.len(),
            ..state.stats
        }
    }

    /// Producer path. Returns `false` if the frame belongs to another client.
    pub fn push_frame(&self, frame: &AudioFrame) -> bool {
        let mut state = self.state.lock();

        if frame.client_id != self.client_id {
            state.stats.frames_rejected += 1;
            if state.stats.frames_rejected == 1 {
                log::debug!(
                    "Ignoring frame for client {} (expecting {})",
                    frame.client_id,
                    self.client_id
                );
            }
            return false;
        }

        let incoming = frame.format();
        if incoming != state.format && incoming.sample_rate > 0 && incoming.channels > 0 {
            log::info!(
                "Stream format for {} renegotiated: {} Hz/{} ch -> {} Hz/{} ch",
                self.client_id,
                state.format.sample_rate,
                state.format.channels,
                incoming.sample_rate,
                incoming.channels
            );
            state.format = incoming;
            state.stats.format_changes += 1;
        }

        state.queue.push(&frame.samples);
        state.stats.frames_accepted += 1;
        self.check_depth(&mut state);
        true
    }

    /// Consumer path: fill one block of per-channel buffers.
    ///
    /// `outputs` holds one buffer per channel. The block length is the shortest
    /// buffer; any longer buffer is zero-padded past it. Either the whole block
    /// is filled from the queue or every buffer is zeroed.
    /// Returns whether real audio was rendered.
    pub fn render(&self, outputs: &mut [&mut [f32]]) -> bool {
        let channel_count = outputs.len();
        let frame_count = outputs.iter().map(|ch| ch.len()).min().unwrap_or(0);
        let needed = frame_count * channel_count;
        if needed == 0 {
            return false;
        }

        let mut guard = self.state.lock();
        let ReconstructorState {
            queue,
            scratch,
            stats,
            ..
        } = &mut *guard;

        scratch.resize(needed, 0.0);
        if !queue.drain_exact_into(scratch) {
            stats.underruns += 1;
            drop(guard);
            for channel in outputs.iter_mut() {
                channel.fill(0.0);
            }
            return false;
        }

        for (c, channel) in outputs.iter_mut().enumerate() {
            let (head, tail) = channel.split_at_mut(frame_count);
            for (i, slot) in head.iter_mut().enumerate() {
                *slot = scratch[i * channel_count + c];
            }
            tail.fill(0.0);
        }
        stats.blocks_rendered += 1;
        true
    }

    /// Consumer path for graphs that want interleaved output.
    pub fn pull_interleaved(&self, out: &mut [f32]) -> bool {
        if out.is_empty() {
            return false;
        }
        let mut state = self.state.lock();
        if state.queue.drain_exact_into(out) {
            state.stats.blocks_rendered += 1;
            true
        } else {
            state.stats.underruns += 1;
            drop(state);
            out.fill(0.0);
            false
        }
    }

    fn check_depth(&self, state: &mut ReconstructorState) {
        let depth = state.queue.len();
        let stall_depth = self.stall_threshold_blocks * self.block_frames * state.format.channels.max(1) as usize;

        if depth > stall_depth {
            if !state.stalled {
                log::warn!(
                    "Sample queue for {} holds {} samples (> {} blocks); consumer may be stalled",
                    self.client_id,
                    depth,
                    self.stall_threshold_blocks
                );
                state.stalled = true;
            }
        } else {
            state.stalled = false;
        }

        if state.last_health_log.elapsed() >= self.health_log_interval {
            log::debug!("Buffer health for {}: {} samples buffered", self.client_id, depth);
            state.last_health_log = Instant::now();
        }
    }
}
