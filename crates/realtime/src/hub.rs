use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use arc_swap::ArcSwap;

use super::event::RealtimeEvent;

type Handler = Arc<dyn Fn(&RealtimeEvent) + Send + Sync>;

#[derive(Clone)]
struct Observer {
    id: u64,
    name: Arc<str>,
    handler: Handler,
}

struct HubInner {
    // Copy-on-write list: publishing iterates a snapshot while subscribers come and go.
    observers: ArcSwap<Vec<Observer>>,
    next_id: AtomicU64,
}

/// Fan-out point for realtime events.
///
/// Every subscriber sees every event in subscription order, so consumers of the same
/// channel never have to wrap or replace each other's callbacks.
#[derive(Clone)]
pub struct EventHub {
    inner: Arc<HubInner>,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                observers: ArcSwap::from_pointee(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Registers `handler` until the returned [`Subscription`] is dropped.
    pub fn subscribe<F>(&self, name: impl Into<String>, handler: F) -> Subscription
    where
        F: Fn(&RealtimeEvent) + Send + Sync + 'static,
    {
        let observer = Observer {
            id: self.inner.next_id.fetch_add(1, Ordering::Relaxed),
            name: Arc::from(name.into()),
            handler: Arc::new(handler),
        };
        let subscription = Subscription {
            hub: Arc::downgrade(&self.inner),
            id: observer.id,
            name: observer.name.clone(),
        };

        self.inner.observers.rcu(|current| {
            let mut next = current.to_vec();
            next.push(observer.clone());
            next
        });
        tracing::debug!(subscriber = %subscription.name, "realtime subscriber attached");

        subscription
    }

    /// Delivers `event` to every current subscriber and returns how many saw it.
    pub fn publish(&self, event: &RealtimeEvent) -> usize {
        let observers = self.inner.observers.load_full();
        for observer in observers.iter() {
            tracing::trace!(subscriber = %observer.name, "delivering realtime event");
            (observer.handler)(event);
        }
        observers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.observers.load().len()
    }

    pub fn subscriber_names(&self) -> Vec<String> {
        self.inner
            .observers
            .load()
            .iter()
            .map(|observer| observer.name.to_string())
            .collect()
    }
}

/// Keeps a hub subscription alive. Dropping it unsubscribes.
pub struct Subscription {
    hub: Weak<HubInner>,
    id: u64,
    name: Arc<str>,
}

impl Subscription {
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Subscription")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(hub) = self.hub.upgrade() else {
            return;
        };
        hub.observers.rcu(|current| {
            current
                .iter()
                .filter(|observer| observer.id != self.id)
                .cloned()
                .collect::<Vec<_>>()
        });
        tracing::debug!(subscriber = %self.name, "realtime subscriber detached");
    }
}
