//! Engine event bus with scoped subscriptions
//!
//! Subscribers hold a [`Subscription`] handle; dropping the handle
//! unregisters the subscriber, so there is no manual listener cleanup to
//! forget on shutdown.

use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use chainview_core::SessionId;

/// Notifications emitted by scans and resolutions
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Scan progress, reported in bounded batches
    ScanProgress {
        current: usize,
        total: usize,
        batch: usize,
        total_batches: usize,
    },
    ResolutionComplete {
        root_id: SessionId,
        generation: u64,
    },
    ResolutionError {
        root_id: SessionId,
        error: String,
    },
}

#[derive(Default)]
struct BusInner {
    next_id: u64,
    subscribers: Vec<(u64, mpsc::Sender<EngineEvent>)>,
}

/// Shared pub/sub channel for [`EngineEvent`]s
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. The returned handle unregisters on drop.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel();
        let mut inner = lock_inner(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscribers.push((id, tx));
        Subscription {
            id,
            bus: Arc::clone(&self.inner),
            rx,
        }
    }

    /// Deliver an event to every live subscriber, pruning closed ones
    pub fn emit(&self, event: EngineEvent) {
        let mut inner = lock_inner(&self.inner);
        inner
            .subscribers
            .retain(|(_, tx)| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        lock_inner(&self.inner).subscribers.len()
    }
}

/// Scoped subscription to the engine event stream
pub struct Subscription {
    id: u64,
    bus: Arc<Mutex<BusInner>>,
    rx: mpsc::Receiver<EngineEvent>,
}

impl Subscription {
    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.rx.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.rx.recv_timeout(timeout).ok()
    }

    /// All events queued so far
    pub fn drain(&self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let mut inner = lock_inner(&self.bus);
        inner.subscribers.retain(|(id, _)| *id != self.id);
    }
}

fn lock_inner(inner: &Mutex<BusInner>) -> std::sync::MutexGuard<'_, BusInner> {
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscriber_receives_events() {
        let bus = EventBus::new();
        let sub = bus.subscribe();

        bus.emit(EngineEvent::ResolutionComplete {
            root_id: "r".to_string(),
            generation: 1,
        });

        let events = sub.drain();
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0],
            EngineEvent::ResolutionComplete {
                root_id: "r".to_string(),
                generation: 1,
            }
        );
    }

    #[test]
    fn test_drop_unregisters() {
        let bus = EventBus::new();
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);

        // Emitting with no subscribers is a no-op
        bus.emit(EngineEvent::ResolutionError {
            root_id: "r".to_string(),
            error: "boom".to_string(),
        });
    }

    #[test]
    fn test_two_subscribers_both_receive() {
        let bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.emit(EngineEvent::ScanProgress {
            current: 25,
            total: 100,
            batch: 1,
            total_batches: 4,
        });

        assert_eq!(a.drain().len(), 1);
        assert_eq!(b.drain().len(), 1);
    }
}
