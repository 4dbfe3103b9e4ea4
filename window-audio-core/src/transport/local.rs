//! In-process consumer transport over a `crossbeam-channel`.
//!
//! [`local_channel`] splits a consumer into the sending half handed to the
//! session manager ([`LocalTransport`]) and the receiving half owned by the
//! consumer ([`ConsumerEndpoint`]). Dropping the endpoint is the consumer's
//! liveness signal: every registered watcher runs exactly once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::models::audio_models::AudioFrame;
use crate::models::error::CaptureError;
use crate::traits::consumer_transport::{ConsumerId, ConsumerTransport, LivenessCallback, WatchId};

#[derive(Default)]
struct Watchers {
    next_id: u64,
    callbacks: HashMap<WatchId, LivenessCallback>,
}

#[derive(Default)]
struct Liveness {
    destroyed: AtomicBool,
    watchers: Mutex<Watchers>,
}

impl Liveness {
    fn fire(&self) {
        let callbacks: Vec<LivenessCallback> = {
            let mut watchers = self.watchers.lock();
            if self.destroyed.swap(true, Ordering::SeqCst) {
                return;
            }
            watchers.callbacks.drain().map(|(_, cb)| cb).collect()
        };
        for callback in callbacks {
            callback();
        }
    }
}

/// Create a connected transport/endpoint pair for one consumer.
pub fn local_channel() -> (LocalTransport, ConsumerEndpoint) {
    let id = ConsumerId::new();
    let (tx, rx) = crossbeam_channel::unbounded();
    let liveness = Arc::new(Liveness::default());

    let transport = LocalTransport {
        id,
        tx,
        liveness: Arc::clone(&liveness),
    };
    let endpoint = ConsumerEndpoint { id, rx, liveness };
    (transport, endpoint)
}

/// Sending half, owned by the capture session.
pub struct LocalTransport {
    id: ConsumerId,
    tx: Sender<AudioFrame>,
    liveness: Arc<Liveness>,
}

impl ConsumerTransport for LocalTransport {
    fn consumer_id(&self) -> ConsumerId {
        self.id
    }

    fn send(&self, frame: AudioFrame) -> Result<(), CaptureError> {
        if self.liveness.destroyed.load(Ordering::SeqCst) {
            return Err(CaptureError::DeliveryFailure("consumer destroyed".into()));
        }
        self.tx
            .send(frame)
            .map_err(|_| CaptureError::DeliveryFailure("consumer endpoint disconnected".into()))
    }

    fn watch_destroyed(&self, on_destroyed: LivenessCallback) -> Option<WatchId> {
        let mut watchers = self.liveness.watchers.lock();
        if self.liveness.destroyed.load(Ordering::SeqCst) {
            return None;
        }
        watchers.next_id += 1;
        let id = WatchId(watchers.next_id);
        watchers.callbacks.insert(id, on_destroyed);
        Some(id)
    }

    fn unwatch_destroyed(&self, watch: WatchId) {
        self.liveness.watchers.lock().callbacks.remove(&watch);
    }
}

/// Receiving half, owned by the consumer. Its drop is the liveness signal.
pub struct ConsumerEndpoint {
    id: ConsumerId,
    rx: Receiver<AudioFrame>,
    liveness: Arc<Liveness>,
}

impl ConsumerEndpoint {
    pub fn consumer_id(&self) -> ConsumerId {
        self.id
    }

    /// A receiver clone, for handing to a pump thread.
    pub fn receiver(&self) -> Receiver<AudioFrame> {
        self.rx.clone()
    }

    pub fn try_recv(&self) -> Option<AudioFrame> {
        self.rx.try_recv().ok()
    }

    pub fn is_destroyed(&self) -> bool {
        self.liveness.destroyed.load(Ordering::SeqCst)
    }

    /// Tear the consumer down, running every liveness watcher.
    pub fn destroy(self) {
        drop(self);
    }
}

impl Drop for ConsumerEndpoint {
    fn drop(&mut self) {
        self.liveness.fire();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn frame(client_id: &str) -> AudioFrame {
        AudioFrame {
            client_id: client_id.into(),
            samples: vec![0.5, 0.5],
            sample_rate: 48000,
            channels: 2,
        }
    }

    #[test]
    fn delivers_frames_in_order() {
        let (transport, endpoint) = local_channel();
        transport.send(frame("a")).unwrap();
        transport.send(frame("b")).unwrap();

        assert_eq!(endpoint.try_recv().map(|f| f.client_id), Some("a".into()));
        assert_eq!(endpoint.try_recv().map(|f| f.client_id), Some("b".into()));
        assert!(endpoint.try_recv().is_none());
        assert_eq!(transport.consumer_id(), endpoint.consumer_id());
    }

    #[test]
    fn destroy_fires_watchers_once() {
        let (transport, endpoint) = local_channel();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        transport
            .watch_destroyed(Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        endpoint.destroy();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(transport.send(frame("a")).is_err());
    }

    #[test]
    fn unwatched_callback_does_not_fire() {
        let (transport, endpoint) = local_channel();
        let fired = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&fired);
        let watch = transport
            .watch_destroyed(Box::new(move || flag.store(true, Ordering::SeqCst)))
            .unwrap();
        transport.unwatch_destroyed(watch);

        drop(endpoint);
        assert!(!fired.load(Ordering::SeqCst));
    }

    #[test]
    fn watching_destroyed_consumer_returns_none() {
        let (transport, endpoint) = local_channel();
        endpoint.destroy();
        assert!(transport.watch_destroyed(Box::new(|| {})).is_none());
    }
}
