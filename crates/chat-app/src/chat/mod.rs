/// Chat list row badges.
pub mod sidebar;
/// Open conversation header.
pub mod view;

use bazaar_presence::RegistryChange;
use tokio::sync::{broadcast, watch};

pub use sidebar::ChatListBadges;
pub use view::ConversationPane;

/// A render surface that re-renders from registry change notifications.
pub trait Surface: Send + 'static {
    fn name(&self) -> &'static str;

    /// Applies one change; returns whether anything visible changed.
    fn on_change(&mut self, change: &RegistryChange) -> bool;

    /// Rebuilds from the registry after notifications were missed.
    fn resync(&mut self);
}

/// Runs `surface` until the change feed closes or `shutdown` flips to true.
pub async fn drive<S: Surface>(
    mut surface: S,
    mut changes: broadcast::Receiver<RegistryChange>,
    mut shutdown: watch::Receiver<bool>,
) -> S {
    surface.resync();
    loop {
        tokio::select! {
            received = changes.recv() => match received {
                Ok(change) => {
                    surface.on_change(&change);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        surface = surface.name(),
                        skipped,
                        "surface lagged behind registry, resyncing"
                    );
                    surface.resync();
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    tracing::debug!(surface = surface.name(), "surface stopped");
    surface
}
