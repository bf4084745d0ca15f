//! The per-run signal queue: a FIFO the supervisor drains at the safe points
//! named in §4.5, and external callers (the HTTP surface, the webhook
//! router) enqueue onto from the outside. Legality checks against a run's
//! current status live in [`crate::supervisor`], not here — this is just the
//! queue.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use brains_types::{Signal, SignalSource};

/// A cloneable handle onto one run's signal queue. Every clone shares the
/// same backing deque: the supervisor's executor drains it as a
/// `SignalSource`, while the HTTP layer and webhook router hold their own
/// clones purely to enqueue.
#[derive(Clone)]
pub struct SignalQueue {
    inner: Arc<Mutex<VecDeque<Signal>>>,
}

impl SignalQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    pub fn enqueue(&self, signal: Signal) {
        self.inner.lock().unwrap().push_back(signal);
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().is_empty()
    }
}

impl Default for SignalQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalSource for SignalQueue {
    fn try_recv(&mut self) -> Option<Signal> {
        self.inner.lock().unwrap().pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brains_types::SignalKind;

    #[test]
    fn enqueue_and_drain_is_fifo() {
        let queue = SignalQueue::new();
        queue.enqueue(Signal::new(SignalKind::Pause));
        queue.enqueue(Signal::new(SignalKind::Kill));

        let mut source: Box<dyn SignalSource> = Box::new(queue);
        assert!(matches!(source.try_recv().unwrap().kind, SignalKind::Pause));
        assert!(matches!(source.try_recv().unwrap().kind, SignalKind::Kill));
        assert!(source.try_recv().is_none());
    }

    #[test]
    fn clones_share_the_same_backing_queue() {
        let queue = SignalQueue::new();
        let handle = queue.clone();
        handle.enqueue(Signal::new(SignalKind::Pause));
        assert!(!queue.is_empty());
    }
}
