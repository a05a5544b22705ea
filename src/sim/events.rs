//! Position-changed notifications
//!
//! Every body owns a [`Subscribers`] registry. Handlers run synchronously on
//! the mover thread of the body that moved, after that tick's collision sweep,
//! so they must return quickly: a slow handler stalls its body.

use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::Serialize;

use super::body::BodyId;
use super::vector::Vector2;
use crate::error::{SimError, SimResult};

/// A body's state right after one of its position updates settled
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionChanged {
    pub body: BodyId,
    pub position: Vector2,
    /// Velocity read under the same guard acquisition as `position`
    pub velocity: Vector2,
}

pub type PositionHandler = dyn Fn(&PositionChanged) + Send + Sync;

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(u64, Arc<PositionHandler>)>,
    closed: bool,
}

/// Handler registry for one body
#[derive(Default)]
pub struct Subscribers {
    inner: Arc<RwLock<Registry>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. Fails once the registry has been closed.
    pub fn subscribe(&self, handler: Arc<PositionHandler>) -> SimResult<Subscription> {
        let mut registry = self.inner.write();
        if registry.closed {
            return Err(SimError::AlreadyStopped);
        }
        let id = registry.next_id;
        registry.next_id += 1;
        registry.handlers.push((id, handler));
        Ok(Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        })
    }

    /// Deliver an event to every current handler.
    pub fn publish(&self, event: &PositionChanged) {
        // Snapshot the handlers so none of them runs under the registry lock
        let handlers: Vec<Arc<PositionHandler>> = {
            let registry = self.inner.read();
            if registry.handlers.is_empty() {
                return;
            }
            registry.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };
        for handler in handlers {
            handler(event);
        }
    }

    /// Drop all handlers and refuse new ones
    pub fn close(&self) {
        let mut registry = self.inner.write();
        registry.closed = true;
        registry.handlers.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.read().closed
    }

    pub fn len(&self) -> usize {
        self.inner.read().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle for a registered handler; dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    registry: Weak<RwLock<Registry>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    fn remove(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.write().handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event() -> PositionChanged {
        PositionChanged {
            body: BodyId(7),
            position: Vector2::new(1.0, 2.0),
            velocity: Vector2::new(0.5, 0.0),
        }
    }

    #[test]
    fn test_publish_reaches_all_handlers() {
        let subscribers = Subscribers::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c1 = Arc::clone(&count);
        let _s1 = subscribers
            .subscribe(Arc::new(move |_: &PositionChanged| {
                c1.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        let c2 = Arc::clone(&count);
        let _s2 = subscribers
            .subscribe(Arc::new(move |e: &PositionChanged| {
                assert_eq!(e.body, BodyId(7));
                c2.fetch_add(10, Ordering::SeqCst);
            }))
            .unwrap();

        subscribers.publish(&event());
        assert_eq!(count.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_unsubscribe_and_drop_remove_handler() {
        let subscribers = Subscribers::new();
        let count = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&count);
        let sub = subscribers
            .subscribe(Arc::new(move |_: &PositionChanged| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        assert_eq!(subscribers.len(), 1);
        sub.unsubscribe();
        assert!(subscribers.is_empty());

        {
            let c = Arc::clone(&count);
            let _scoped = subscribers
                .subscribe(Arc::new(move |_: &PositionChanged| {
                    c.fetch_add(1, Ordering::SeqCst);
                }))
                .unwrap();
            subscribers.publish(&event());
        }
        subscribers.publish(&event());
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_closed_registry_rejects_subscribers() {
        let subscribers = Subscribers::new();
        let _sub = subscribers
            .subscribe(Arc::new(|_: &PositionChanged| {}))
            .unwrap();
        subscribers.close();
        assert!(subscribers.is_closed());
        assert!(subscribers.is_empty());
        assert!(matches!(
            subscribers.subscribe(Arc::new(|_: &PositionChanged| {})),
            Err(SimError::AlreadyStopped)
        ));
    }

    #[test]
    fn test_handler_can_unsubscribe_itself() {
        let subscribers = Arc::new(Subscribers::new());
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let calls = Arc::new(AtomicUsize::new(0));

        let slot_in = Arc::clone(&slot);
        let calls_in = Arc::clone(&calls);
        let sub = subscribers
            .subscribe(Arc::new(move |_: &PositionChanged| {
                calls_in.fetch_add(1, Ordering::SeqCst);
                // Would deadlock if publish held the registry lock
                drop(slot_in.lock().take());
            }))
            .unwrap();
        *slot.lock() = Some(sub);

        subscribers.publish(&event());
        subscribers.publish(&event());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(subscribers.is_empty());
    }

    #[test]
    fn test_event_serializes_to_json() {
        let json = serde_json::to_value(event()).unwrap();
        assert_eq!(json["body"], 7);
        assert_eq!(json["position"][0], 1.0);
        assert_eq!(json["velocity"][1], 0.0);
    }
}
