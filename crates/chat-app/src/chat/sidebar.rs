use std::collections::BTreeSet;

use bazaar_presence::{IndicatorRegistry, RegistryChange, ThreadId};

use super::Surface;

/// Activity dots on chat list rows.
pub struct ChatListBadges {
    registry: IndicatorRegistry,
    active: BTreeSet<ThreadId>,
}

impl ChatListBadges {
    pub fn new(registry: IndicatorRegistry) -> Self {
        Self {
            registry,
            active: BTreeSet::new(),
        }
    }

    pub fn badges(&self) -> &BTreeSet<ThreadId> {
        &self.active
    }

    pub fn has_badge(&self, thread_id: &ThreadId) -> bool {
        self.active.contains(thread_id)
    }
}

impl Surface for ChatListBadges {
    fn name(&self) -> &'static str {
        "chat-list-badges"
    }

    fn on_change(&mut self, change: &RegistryChange) -> bool {
        let thread_id = &change.thread_id;
        let changed = if self.registry.has_activity(thread_id) {
            self.active.insert(thread_id.clone())
        } else {
            self.active.remove(thread_id)
        };

        if changed {
            tracing::info!(
                thread_id = %thread_id,
                active = self.active.contains(thread_id),
                "chat list badge"
            );
        }
        changed
    }

    fn resync(&mut self) {
        self.active = self.registry.active_threads().into_iter().collect();
    }
}
