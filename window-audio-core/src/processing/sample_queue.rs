use std::collections::VecDeque;

/// Ordered queue of interleaved audio samples for one capture session.
///
/// Single producer, single consumer. Wrap in `parking_lot::Mutex` for
/// cross-thread access. Growth is unbounded; depth is expected to track the
/// balance between capture and pull rates.
///
/// Draining is all-or-nothing: a request larger than the queued depth consumes
/// nothing, so an underrun never produces a partially filled block.
#[derive(Debug, Default)]
pub struct AudioSampleQueue {
    samples: VecDeque<f32>,
}

impl AudioSampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
        }
    }

    /// Append samples in order.
    pub fn push(&mut self, samples: &[f32]) {
        self.samples.extend(samples.iter().copied());
    }

    /// Fill `out` from the head of the queue if enough samples are queued.
    ///
    /// Returns `false` and leaves both the queue and `out` untouched otherwise.
    pub fn drain_exact_into(&mut self, out: &mut [f32]) -> bool {
        let n = out.len();
        if self.samples.len() < n {
            return false;
        }
        for (slot, sample) in out.iter_mut().zip(self.samples.drain(..n)) {
            *slot = sample;
        }
        true
    }

    /// Number of samples currently queued.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_then_drain() {
        let mut queue = AudioSampleQueue::new();
        queue.push(&[1.0, 2.0, 3.0]);

        let mut out = [0.0; 3];
        assert!(queue.drain_exact_into(&mut out));
        assert_eq!(out, [1.0, 2.0, 3.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_preserves_order_across_pushes() {
        let mut queue = AudioSampleQueue::new();
        queue.push(&[1.0, 2.0]);
        queue.push(&[3.0, 4.0, 5.0]);

        let mut out = [0.0; 4];
        assert!(queue.drain_exact_into(&mut out));
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn short_queue_consumes_nothing() {
        let mut queue = AudioSampleQueue::new();
        queue.push(&[1.0, 2.0]);

        let mut out = [9.0; 4];
        assert!(!queue.drain_exact_into(&mut out));
        assert_eq!(out, [9.0; 4]);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn clear_empties_queue() {
        let mut queue = AudioSampleQueue::with_capacity(16);
        queue.push(&[1.0; 10]);
        queue.clear();

        assert!(queue.is_empty());
        assert!(queue.drain_exact_into(&mut []));
    }

    #[test]
    fn empty_push_is_noop() {
        let mut queue = AudioSampleQueue::new();
        queue.push(&[]);
        assert!(queue.is_empty());
    }
}
