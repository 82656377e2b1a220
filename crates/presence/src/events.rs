use super::ids::{ThreadId, UserId};

/// Why the registry published a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// An indicator was created or refreshed.
    Updated,
    /// An indicator was removed by a "stopped" signal or an explicit remove.
    Removed,
    /// An expiry timer removed a stale indicator.
    Expired,
    /// Every indicator of the thread was dropped at once.
    ThreadCleared,
}

/// Change notification emitted after every registry mutation.
///
/// `user_id` is `None` only for [`ChangeKind::ThreadCleared`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryChange {
    pub thread_id: ThreadId,
    pub user_id: Option<UserId>,
    pub kind: ChangeKind,
}

impl RegistryChange {
    pub(crate) fn user(thread_id: &ThreadId, user_id: &UserId, kind: ChangeKind) -> Self {
        Self {
            thread_id: thread_id.clone(),
            user_id: Some(user_id.clone()),
            kind,
        }
    }

    pub(crate) fn thread_cleared(thread_id: &ThreadId) -> Self {
        Self {
            thread_id: thread_id.clone(),
            user_id: None,
            kind: ChangeKind::ThreadCleared,
        }
    }

    pub fn concerns(&self, thread_id: &ThreadId) -> bool {
        &self.thread_id == thread_id
    }
}
