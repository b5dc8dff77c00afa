//! Typed, immediate event bus
//!
//! Handlers subscribe to one concrete event type. `publish` delivers the event
//! synchronously to every handler of that type in subscription order. A
//! handler that returns an error or panics is logged and counted; the
//! remaining handlers still run and `publish` itself never fails.

use std::any::{Any, TypeId};
use std::panic::{self, AssertUnwindSafe};

use ahash::AHashMap;

use crate::error::{EcsError, Result};

/// Trait for any event type on the bus
pub trait Event: Send + Sync + 'static {
    /// Event name for debugging
    fn event_name(&self) -> &str {
        "UnnamedEvent"
    }
}

/// Handle returned by [`EventBus::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub fn to_raw(self) -> u64 {
        self.0
    }
}

type Handler<E> = Box<dyn FnMut(&E) -> Result<()> + Send>;

/// Type-erased list of handlers for one event type
trait SubscriberList: Any + Send {
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn remove(&mut self, id: SubscriptionId) -> bool;
    fn len(&self) -> usize;
}

struct TypedSubscribers<E: Event> {
    handlers: Vec<(SubscriptionId, Handler<E>)>,
}

impl<E: Event> SubscriberList for TypedSubscribers<E> {
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(sub, _)| *sub != id);
        self.handlers.len() != before
    }

    fn len(&self) -> usize {
        self.handlers.len()
    }
}

/// Per-world publish/subscribe hub
#[derive(Default)]
pub struct EventBus {
    lists: AHashMap<TypeId, Box<dyn SubscriberList>>,
    next_id: u64,
    published: u64,
    failures: u64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for events of type `E`
    pub fn subscribe<E, F>(&mut self, handler: F) -> SubscriptionId
    where
        E: Event,
        F: FnMut(&E) -> Result<()> + Send + 'static,
    {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);

        let list = self
            .lists
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(TypedSubscribers::<E> { handlers: Vec::new() }));
        if let Some(typed) = list.as_any_mut().downcast_mut::<TypedSubscribers<E>>() {
            typed.handlers.push((id, Box::new(handler)));
        }
        id
    }

    /// Remove a handler. Returns false if it was not subscribed to `E`.
    pub fn unsubscribe<E: Event>(&mut self, id: SubscriptionId) -> bool {
        self.lists
            .get_mut(&TypeId::of::<E>())
            .is_some_and(|list| list.remove(id))
    }

    /// Deliver `event` to every handler of `E`; returns how many were invoked
    pub fn publish<E: Event>(&mut self, event: &E) -> usize {
        self.published += 1;

        let Some(typed) = self
            .lists
            .get_mut(&TypeId::of::<E>())
            .and_then(|list| list.as_any_mut().downcast_mut::<TypedSubscribers<E>>())
        else {
            return 0;
        };

        let mut failures = 0;
        for (id, handler) in &mut typed.handlers {
            match panic::catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    failures += 1;
                    tracing::warn!(
                        event = event.event_name(),
                        subscription = id.0,
                        error = %err,
                        "event handler failed"
                    );
                }
                Err(payload) => {
                    failures += 1;
                    tracing::error!(
                        event = event.event_name(),
                        subscription = id.0,
                        error = %EcsError::from_panic(payload),
                        "event handler panicked"
                    );
                }
            }
        }

        let invoked = typed.handlers.len();
        self.failures += failures;
        invoked
    }

    /// Handlers currently subscribed to `E`
    pub fn subscriber_count<E: Event>(&self) -> usize {
        self.lists
            .get(&TypeId::of::<E>())
            .map_or(0, |list| list.len())
    }

    pub fn total_subscribers(&self) -> usize {
        self.lists.values().map(|list| list.len()).sum()
    }

    /// Drop every subscription
    pub fn clear_subscribers(&mut self) {
        self.lists.clear();
    }

    /// Events published so far, delivered or not
    pub fn published_count(&self) -> u64 {
        self.published
    }

    /// Handler invocations that returned an error or panicked
    pub fn failure_count(&self) -> u64 {
        self.failures
    }
}
