use std::sync::Arc;

use bazaar_presence::{DirectoryNames, IndicatorRegistry, IndicatorView, RegistryChange, ThreadId};

use super::Surface;

/// Header line of the open conversation: "Alice is typing…" and friends.
pub struct ConversationPane {
    registry: IndicatorRegistry,
    names: Arc<DirectoryNames>,
    thread_id: Option<ThreadId>,
    header: Option<String>,
}

impl ConversationPane {
    pub fn new(
        registry: IndicatorRegistry,
        names: Arc<DirectoryNames>,
        thread_id: Option<ThreadId>,
    ) -> Self {
        Self {
            registry,
            names,
            thread_id,
            header: None,
        }
    }

    pub fn thread_id(&self) -> Option<&ThreadId> {
        self.thread_id.as_ref()
    }

    pub fn header(&self) -> Option<&str> {
        self.header.as_deref()
    }

    /// Switches to `thread_id`; the previously open thread's indicators are dropped.
    pub fn open(&mut self, thread_id: ThreadId) {
        if let Some(previous) = self.thread_id.replace(thread_id)
            && Some(&previous) != self.thread_id.as_ref()
        {
            self.registry.clear_thread(&previous);
        }
        self.render();
    }

    pub fn close(&mut self) {
        if let Some(previous) = self.thread_id.take() {
            self.registry.clear_thread(&previous);
        }
        self.render();
    }

    fn render(&mut self) -> bool {
        let next = self.thread_id.as_ref().and_then(|thread_id| {
            IndicatorView::new(&self.registry, &*self.names)
                .summary(thread_id)
                .map(|summary| summary.to_string())
        });
        if next == self.header {
            return false;
        }

        self.header = next;
        if let Some(thread_id) = &self.thread_id {
            tracing::info!(
                thread_id = %thread_id,
                header = self.header.as_deref().unwrap_or(""),
                "conversation header"
            );
        }
        true
    }
}

impl Surface for ConversationPane {
    fn name(&self) -> &'static str {
        "conversation-pane"
    }

    fn on_change(&mut self, change: &RegistryChange) -> bool {
        let open_thread_changed = self
            .thread_id
            .as_ref()
            .is_some_and(|thread_id| change.concerns(thread_id));
        open_thread_changed && self.render()
    }

    fn resync(&mut self) {
        self.render();
    }
}
