use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use snafu::ResultExt;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::error::{NoRuntimeSnafu, PresenceResult};
use super::events::{ChangeKind, RegistryChange};
use super::ids::{ThreadId, UserId};
use super::indicator::{ActivityMode, Indicator, IndicatorPatch};

/// How long a typing indicator survives without a refresh.
pub const DEFAULT_TYPING_TIMEOUT: Duration = Duration::from_millis(3_000);
/// How long a recording indicator survives without a refresh.
pub const DEFAULT_RECORDING_TIMEOUT: Duration = Duration::from_millis(10_000);
/// Change notifications buffered per subscriber before it lags.
pub const DEFAULT_CHANGE_BUFFER: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistryConfig {
    pub typing_timeout: Duration,
    pub recording_timeout: Duration,
    pub change_buffer: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            typing_timeout: DEFAULT_TYPING_TIMEOUT,
            recording_timeout: DEFAULT_RECORDING_TIMEOUT,
            change_buffer: DEFAULT_CHANGE_BUFFER,
        }
    }
}

impl RegistryConfig {
    pub fn timeout_for(&self, mode: ActivityMode) -> Duration {
        match mode {
            ActivityMode::Typing => self.typing_timeout,
            ActivityMode::Recording => self.recording_timeout,
        }
    }
}

/// Stored indicator plus the expiry timer armed for it.
struct Entry {
    indicator: Indicator,
    timer: Option<JoinHandle<()>>,
}

impl Entry {
    fn new(indicator: Indicator) -> Self {
        Self {
            indicator,
            timer: None,
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

impl Drop for Entry {
    fn drop(&mut self) {
        self.cancel_timer();
    }
}

#[derive(Default)]
struct RegistryState {
    threads: HashMap<ThreadId, HashMap<UserId, Entry>>,
}

impl RegistryState {
    /// Removes one entry and prunes the thread once it holds no users.
    fn take_entry(&mut self, thread_id: &ThreadId, user_id: &UserId) -> Option<Entry> {
        let users = self.threads.get_mut(thread_id)?;
        let entry = users.remove(user_id);
        if users.is_empty() {
            self.threads.remove(thread_id);
        }
        entry
    }
}

struct RegistryInner {
    config: RegistryConfig,
    runtime: Handle,
    state: Mutex<RegistryState>,
    changes: broadcast::Sender<RegistryChange>,
}

/// Auto-expiring map of who is typing or recording in which thread.
///
/// Cloning is cheap and every clone observes the same state. Expiry timers run on the
/// runtime the registry was built on and only hold a weak reference back to it, so
/// dropping the last clone aborts whatever is still pending.
#[derive(Clone)]
pub struct IndicatorRegistry {
    inner: Arc<RegistryInner>,
}

impl IndicatorRegistry {
    /// Builds a registry bound to the current tokio runtime.
    pub fn new(config: RegistryConfig) -> PresenceResult<Self> {
        let runtime = Handle::try_current().context(NoRuntimeSnafu {
            stage: "registry-new",
        })?;
        Ok(Self::with_runtime(config, runtime))
    }

    pub fn with_runtime(config: RegistryConfig, runtime: Handle) -> Self {
        let (changes, _) = broadcast::channel(config.change_buffer.max(1));
        Self {
            inner: Arc::new(RegistryInner {
                config,
                runtime,
                state: Mutex::new(RegistryState::default()),
                changes,
            }),
        }
    }

    /// Receives a [`RegistryChange`] after every mutation.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryChange> {
        self.inner.changes.subscribe()
    }

    /// Merges `patch` onto the current indicator and re-arms its expiry timer.
    ///
    /// A merged state with neither flag set removes the entry outright.
    pub fn update(&self, thread_id: &ThreadId, user_id: &UserId, patch: IndicatorPatch) {
        let now = Instant::now();
        let kind = {
            let mut state = self.lock();
            let existing = state.take_entry(thread_id, user_id);
            let existed = existing.is_some();
            let mut entry = existing.unwrap_or_else(|| {
                Entry::new(Indicator::idle(thread_id.clone(), user_id.clone(), now))
            });
            entry.indicator.apply(&patch, now);

            match entry.indicator.mode() {
                Some(mode) => {
                    entry.cancel_timer();
                    entry.timer = Some(self.arm_timer(thread_id, user_id, mode, now));
                    state
                        .threads
                        .entry(thread_id.clone())
                        .or_default()
                        .insert(user_id.clone(), entry);
                    Some(ChangeKind::Updated)
                }
                // Dropping the entry aborts its timer.
                None => existed.then_some(ChangeKind::Removed),
            }
        };

        if let Some(kind) = kind {
            tracing::debug!(
                thread_id = %thread_id,
                user_id = %user_id,
                ?kind,
                "indicator updated"
            );
            self.publish(RegistryChange::user(thread_id, user_id, kind));
        }
    }

    pub fn get(&self, thread_id: &ThreadId, user_id: &UserId) -> Option<Indicator> {
        self.lock()
            .threads
            .get(thread_id)
            .and_then(|users| users.get(user_id))
            .map(|entry| entry.indicator.clone())
    }

    /// Returns every active indicator of a thread in no particular order.
    pub fn list_for_thread(&self, thread_id: &ThreadId) -> Vec<Indicator> {
        self.lock()
            .threads
            .get(thread_id)
            .map(|users| {
                users
                    .values()
                    .map(|entry| entry.indicator.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_activity(&self, thread_id: &ThreadId) -> bool {
        self.lock().threads.get(thread_id).is_some_and(|users| {
            users.values().any(|entry| entry.indicator.is_active())
        })
    }

    /// Threads that currently hold at least one active indicator.
    pub fn active_threads(&self) -> Vec<ThreadId> {
        self.lock()
            .threads
            .iter()
            .filter(|(_, users)| users.values().any(|entry| entry.indicator.is_active()))
            .map(|(thread_id, _)| thread_id.clone())
            .collect()
    }

    pub fn snapshot(&self) -> Vec<Indicator> {
        self.lock()
            .threads
            .values()
            .flat_map(|users| users.values().map(|entry| entry.indicator.clone()))
            .collect()
    }

    /// Deletes one indicator and cancels its timer. Missing entries are a no-op.
    pub fn remove(&self, thread_id: &ThreadId, user_id: &UserId) {
        if self.lock().take_entry(thread_id, user_id).is_none() {
            return;
        }
        tracing::debug!(thread_id = %thread_id, user_id = %user_id, "indicator removed");
        self.publish(RegistryChange::user(thread_id, user_id, ChangeKind::Removed));
    }

    /// Cancels every timer of a thread and forgets all of its indicators.
    pub fn clear_thread(&self, thread_id: &ThreadId) {
        let removed = self.lock().threads.remove(thread_id);
        if let Some(users) = removed {
            let cleared = users.len();
            drop(users);
            tracing::debug!(thread_id = %thread_id, cleared, "thread indicators cleared");
            self.publish(RegistryChange::thread_cleared(thread_id));
        }
    }

    /// Tears down every thread, e.g. when the session ends.
    pub fn clear_all(&self) {
        let threads = std::mem::take(&mut self.lock().threads);
        let thread_ids = threads.keys().cloned().collect::<Vec<_>>();
        drop(threads);

        for thread_id in &thread_ids {
            self.publish(RegistryChange::thread_cleared(thread_id));
        }
        if !thread_ids.is_empty() {
            tracing::debug!(threads = thread_ids.len(), "registry cleared");
        }
    }

    fn arm_timer(
        &self,
        thread_id: &ThreadId,
        user_id: &UserId,
        mode: ActivityMode,
        armed_at: Instant,
    ) -> JoinHandle<()> {
        let deadline = armed_at + self.inner.config.timeout_for(mode);
        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let thread_id = thread_id.clone();
        let user_id = user_id.clone();

        self.inner.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(inner) = registry.upgrade() {
                IndicatorRegistry { inner }.expire(&thread_id, &user_id, mode);
            }
        })
    }

    /// Timer callback. Only removes the indicator if it is still in `mode` and has not
    /// been refreshed since the timer was armed.
    fn expire(&self, thread_id: &ThreadId, user_id: &UserId, mode: ActivityMode) {
        let now = Instant::now();
        let threshold = self.inner.config.timeout_for(mode);
        {
            let mut state = self.lock();
            let Some(entry) = state
                .threads
                .get_mut(thread_id)
                .and_then(|users| users.get_mut(user_id))
            else {
                return;
            };

            let elapsed = now.saturating_duration_since(entry.indicator.updated_at);
            if entry.indicator.mode() != Some(mode) || elapsed < threshold {
                tracing::trace!(
                    thread_id = %thread_id,
                    user_id = %user_id,
                    ?mode,
                    "ignoring stale expiry timer"
                );
                return;
            }

            // Detach our own handle so dropping the entry does not abort the running task.
            entry.timer = None;
            entry.indicator.apply(&IndicatorPatch::stopped(), now);
            if !entry.indicator.is_active() {
                state.take_entry(thread_id, user_id);
            }
        }

        tracing::debug!(thread_id = %thread_id, user_id = %user_id, ?mode, "indicator expired");
        self.publish(RegistryChange::user(thread_id, user_id, ChangeKind::Expired));
    }

    fn publish(&self, change: RegistryChange) {
        // No subscribers is fine; views come and go.
        let _ = self.inner.changes.send(change);
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;
    use tokio::time::sleep;

    use super::*;

    fn ids(thread: &str, user: &str) -> (ThreadId, UserId) {
        (
            ThreadId::parse(thread).expect("thread id"),
            UserId::parse(user).expect("user id"),
        )
    }

    fn registry() -> IndicatorRegistry {
        IndicatorRegistry::new(RegistryConfig::default()).expect("tokio runtime")
    }

    #[test]
    fn new_requires_a_runtime() {
        let error = IndicatorRegistry::new(RegistryConfig::default())
            .err()
            .expect("no runtime outside tokio");
        assert!(matches!(
            error,
            crate::PresenceError::NoRuntime {
                stage: "registry-new",
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn typing_then_recording_then_stop() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");

        registry.update(&thread, &user, IndicatorPatch::typing(true).with_name("Alice"));
        let indicator = registry.get(&thread, &user).expect("typing indicator");
        assert!(indicator.is_typing);
        assert!(!indicator.is_recording);
        assert_eq!(indicator.user_name.as_deref(), Some("Alice"));

        registry.update(&thread, &user, IndicatorPatch::recording(true, Some(5)));
        let indicator = registry.get(&thread, &user).expect("recording indicator");
        assert!(!indicator.is_typing);
        assert!(indicator.is_recording);
        assert_eq!(indicator.recording_duration, Some(5));
        assert_eq!(indicator.user_name.as_deref(), Some("Alice"));

        registry.update(&thread, &user, IndicatorPatch::recording(false, None));
        assert_eq!(registry.get(&thread, &user), None);
        assert!(!registry.has_activity(&thread));
    }

    #[tokio::test(start_paused = true)]
    async fn both_flags_false_removes_entry_and_thread() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");

        registry.update(&thread, &user, IndicatorPatch::typing(true));
        registry.update(&thread, &user, IndicatorPatch::stopped());

        assert_eq!(registry.get(&thread, &user), None);
        assert!(registry.list_for_thread(&thread).is_empty());
        assert!(registry.active_threads().is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn exclusive_flags_hold_for_any_update_sequence() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");
        let patches = [
            IndicatorPatch::typing(true),
            IndicatorPatch::recording(true, Some(1)),
            IndicatorPatch::typing(true),
            IndicatorPatch::recording(false, None),
            IndicatorPatch::typing(true),
            IndicatorPatch {
                is_typing: Some(true),
                is_recording: Some(true),
                ..IndicatorPatch::default()
            },
            IndicatorPatch::typing(false),
        ];

        for patch in patches {
            registry.update(&thread, &user, patch);
            if let Some(indicator) = registry.get(&thread, &user) {
                assert!(!(indicator.is_typing && indicator.is_recording));
                assert!(indicator.is_active());
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn typing_expires_after_three_seconds() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");

        registry.update(&thread, &user, IndicatorPatch::typing(true));
        sleep(Duration::from_millis(2_900)).await;
        assert!(registry.get(&thread, &user).is_some());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(registry.get(&thread, &user), None);
        assert!(!registry.has_activity(&thread));
    }

    #[tokio::test(start_paused = true)]
    async fn refreshed_typing_expires_relative_to_last_refresh() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");

        registry.update(&thread, &user, IndicatorPatch::typing(true));
        sleep(Duration::from_millis(2_000)).await;
        registry.update(&thread, &user, IndicatorPatch::typing(true));
        sleep(Duration::from_millis(500)).await;
        registry.update(&thread, &user, IndicatorPatch::typing(true));

        // 3100ms since the first update, 600ms since the last refresh.
        sleep(Duration::from_millis(600)).await;
        assert!(registry.get(&thread, &user).is_some());

        // 5400ms: still inside the window opened at 2500ms.
        sleep(Duration::from_millis(2_300)).await;
        assert!(registry.get(&thread, &user).is_some());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(registry.get(&thread, &user), None);
    }

    #[tokio::test(start_paused = true)]
    async fn recording_expires_after_ten_seconds() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");

        registry.update(&thread, &user, IndicatorPatch::recording(true, Some(1)));
        sleep(Duration::from_millis(9_900)).await;
        assert!(registry.get(&thread, &user).is_some());

        sleep(Duration::from_millis(200)).await;
        assert_eq!(registry.get(&thread, &user), None);
    }

    #[tokio::test(start_paused = true)]
    async fn switching_to_recording_rearms_with_longer_timeout() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");

        registry.update(&thread, &user, IndicatorPatch::typing(true));
        sleep(Duration::from_millis(1_000)).await;
        registry.update(&thread, &user, IndicatorPatch::recording(true, None));

        sleep(Duration::from_millis(5_000)).await;
        let indicator = registry.get(&thread, &user).expect("still recording");
        assert!(indicator.is_recording);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_timer_does_not_clobber_refreshed_state() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");

        registry.update(&thread, &user, IndicatorPatch::typing(true));
        sleep(Duration::from_millis(2_000)).await;
        registry.update(&thread, &user, IndicatorPatch::typing(true));
        sleep(Duration::from_millis(1_500)).await;

        // A callback queued against the first update fires late.
        registry.expire(&thread, &user, ActivityMode::Typing);
        assert!(registry.get(&thread, &user).is_some());

        // A timer for a mode the indicator has left is ignored too.
        sleep(Duration::from_millis(1_000)).await;
        registry.update(&thread, &user, IndicatorPatch::recording(true, None));
        sleep(Duration::from_millis(4_000)).await;
        registry.expire(&thread, &user, ActivityMode::Typing);
        assert!(registry.get(&thread, &user).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn clear_thread_cancels_pending_timers() {
        let registry = registry();
        let (thread, alice) = ids("T1", "alice");
        let (other_thread, bob) = ids("T2", "bob");
        let mut changes = registry.subscribe();

        registry.update(&thread, &alice, IndicatorPatch::typing(true));
        registry.update(&thread, &bob, IndicatorPatch::recording(true, None));
        registry.update(&other_thread, &bob, IndicatorPatch::typing(true));
        registry.clear_thread(&thread);
        assert!(registry.list_for_thread(&thread).is_empty());
        assert!(registry.has_activity(&other_thread));

        let mut kinds = Vec::new();
        while let Ok(change) = changes.try_recv() {
            kinds.push((change.thread_id, change.kind));
        }
        assert_eq!(kinds.last(), Some(&(thread.clone(), ChangeKind::ThreadCleared)));

        sleep(Duration::from_millis(11_000)).await;
        // Only the untouched thread's own expiry is observed.
        let change = changes.try_recv().expect("expiry of the other thread");
        assert_eq!(change.thread_id, other_thread);
        assert_eq!(change.kind, ChangeKind::Expired);
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn two_users_typing_then_both_expire() {
        let registry = registry();
        let (thread, alice) = ids("T1", "alice");
        let (_, bob) = ids("T1", "bob");

        registry.update(&thread, &alice, IndicatorPatch::typing(true).with_name("Alice"));
        registry.update(&thread, &bob, IndicatorPatch::typing(true).with_name("Bob"));

        let mut users = registry
            .list_for_thread(&thread)
            .into_iter()
            .map(|indicator| indicator.user_id)
            .collect::<Vec<_>>();
        users.sort();
        assert_eq!(users, vec![alice.clone(), bob.clone()]);
        assert!(registry.has_activity(&thread));
        assert_eq!(registry.active_threads(), vec![thread.clone()]);

        sleep(Duration::from_millis(3_100)).await;
        assert!(registry.list_for_thread(&thread).is_empty());
        assert!(!registry.has_activity(&thread));
        assert!(registry.active_threads().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn change_feed_reports_each_mutation() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");
        let mut changes = registry.subscribe();

        registry.update(&thread, &user, IndicatorPatch::typing(true));
        registry.update(&thread, &user, IndicatorPatch::typing(false));
        // Removing an absent entry and stopping an unknown user publish nothing.
        registry.remove(&thread, &user);
        registry.update(&thread, &user, IndicatorPatch::stopped());

        let first = changes.try_recv().expect("update");
        assert_eq!(first, RegistryChange::user(&thread, &user, ChangeKind::Updated));
        let second = changes.try_recv().expect("removal");
        assert_eq!(second, RegistryChange::user(&thread, &user, ChangeKind::Removed));
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn remove_cancels_timer_and_clear_all_empties_registry() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");
        let (other_thread, _) = ids("T2", "U1");

        registry.update(&thread, &user, IndicatorPatch::typing(true));
        registry.remove(&thread, &user);
        assert_eq!(registry.get(&thread, &user), None);

        registry.update(&thread, &user, IndicatorPatch::typing(true));
        registry.update(&other_thread, &user, IndicatorPatch::recording(true, None));
        let mut changes = registry.subscribe();
        registry.clear_all();

        assert!(registry.snapshot().is_empty());
        let mut cleared = vec![
            changes.try_recv().expect("first clear").thread_id,
            changes.try_recv().expect("second clear").thread_id,
        ];
        cleared.sort();
        assert_eq!(cleared, vec![thread, other_thread]);

        sleep(Duration::from_millis(11_000)).await;
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_last_clone_aborts_pending_timers() {
        let registry = registry();
        let (thread, user) = ids("T1", "U1");
        let (other_thread, other_user) = ids("T2", "U2");
        let mut changes = registry.subscribe();

        registry.update(&thread, &user, IndicatorPatch::typing(true));
        registry.update(&other_thread, &other_user, IndicatorPatch::recording(true, None));
        let metrics = Handle::current().metrics();
        assert_eq!(metrics.num_alive_tasks(), 2);

        drop(registry);
        sleep(Duration::from_millis(11_000)).await;

        assert_eq!(metrics.num_alive_tasks(), 0);
        assert_eq!(changes.try_recv().expect("first update").kind, ChangeKind::Updated);
        assert_eq!(changes.try_recv().expect("second update").kind, ChangeKind::Updated);
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Closed)));
    }
}
