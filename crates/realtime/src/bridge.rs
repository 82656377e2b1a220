use bazaar_presence::{IndicatorRegistry, UserId};

use super::event::{RealtimeEvent, Signal};
use super::hub::{EventHub, Subscription};

pub const BRIDGE_SUBSCRIBER_NAME: &str = "indicator-bridge";

/// What the bridge did with one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeOutcome {
    Applied,
    /// The event described the local viewer and was filtered out.
    OwnActivity,
    /// The event was malformed and never reached the registry.
    Rejected,
}

/// Feeds realtime events into an [`IndicatorRegistry`].
///
/// Validation and self-exclusion happen here; the registry stores whatever it is given.
/// Detaching (or dropping) the bridge unsubscribes from the hub and clears every pending
/// expiry timer.
pub struct IndicatorBridge {
    registry: IndicatorRegistry,
    subscription: Option<Subscription>,
}

impl IndicatorBridge {
    pub fn attach(hub: &EventHub, registry: IndicatorRegistry, local_user: Option<UserId>) -> Self {
        let target = registry.clone();
        let subscription = hub.subscribe(BRIDGE_SUBSCRIBER_NAME, move |event| {
            apply_event(&target, local_user.as_ref(), event);
        });

        Self {
            registry,
            subscription: Some(subscription),
        }
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }

    pub fn is_attached(&self) -> bool {
        self.subscription.is_some()
    }

    pub fn detach(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            drop(subscription);
            self.registry.clear_all();
            tracing::debug!("indicator bridge detached");
        }
    }
}

impl Drop for IndicatorBridge {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Validates one event and applies it to `registry`.
pub fn apply_event(
    registry: &IndicatorRegistry,
    local_user: Option<&UserId>,
    event: &RealtimeEvent,
) -> BridgeOutcome {
    let signal = match Signal::try_from(event) {
        Ok(signal) => signal,
        Err(error) => {
            tracing::warn!(?event, "rejected realtime event: {error}");
            return BridgeOutcome::Rejected;
        }
    };

    match signal {
        Signal::Indicator {
            thread_id,
            user_id,
            patch,
        } => {
            if local_user == Some(&user_id) {
                return BridgeOutcome::OwnActivity;
            }
            registry.update(&thread_id, &user_id, patch);
        }
        Signal::ThreadClosed { thread_id } => registry.clear_thread(&thread_id),
    }

    BridgeOutcome::Applied
}

#[cfg(test)]
mod tests {
    use bazaar_presence::{RegistryConfig, ThreadId};

    use super::*;

    fn registry() -> IndicatorRegistry {
        IndicatorRegistry::new(RegistryConfig::default()).expect("tokio runtime")
    }

    #[tokio::test(start_paused = true)]
    async fn own_activity_is_filtered() {
        let registry = registry();
        let me = UserId::parse("me").expect("user id");
        let thread = ThreadId::parse("T1").expect("thread id");

        let outcome = apply_event(
            &registry,
            Some(&me),
            &RealtimeEvent::typing("T1", "me", "Me", true),
        );

        assert_eq!(outcome, BridgeOutcome::OwnActivity);
        assert!(!registry.has_activity(&thread));
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_events_never_reach_registry() {
        let registry = registry();
        let event = RealtimeEvent::UserTyping {
            thread_id: None,
            user_id: Some("U1".to_string()),
            user_name: None,
            is_typing: true,
        };

        assert_eq!(apply_event(&registry, None, &event), BridgeOutcome::Rejected);
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn thread_closed_clears_the_thread() {
        let registry = registry();
        let thread = ThreadId::parse("T1").expect("thread id");
        apply_event(&registry, None, &RealtimeEvent::typing("T1", "U1", "Alice", true));
        apply_event(&registry, None, &RealtimeEvent::recording("T1", "U2", true, Some(2.0)));
        assert_eq!(registry.list_for_thread(&thread).len(), 2);

        let outcome = apply_event(&registry, None, &RealtimeEvent::thread_closed("T1"));

        assert_eq!(outcome, BridgeOutcome::Applied);
        assert!(registry.list_for_thread(&thread).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn detach_unsubscribes_and_clears_registry() {
        let hub = EventHub::new();
        let registry = registry();
        let bridge = IndicatorBridge::attach(&hub, registry.clone(), None);
        assert!(bridge.is_attached());

        hub.publish(&RealtimeEvent::typing("T1", "U1", "Alice", true));
        assert_eq!(bridge.registry().snapshot().len(), 1);

        bridge.detach();
        assert_eq!(hub.subscriber_count(), 0);
        assert!(registry.snapshot().is_empty());

        hub.publish(&RealtimeEvent::typing("T1", "U1", "Alice", true));
        assert!(registry.snapshot().is_empty());
    }
}
