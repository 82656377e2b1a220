use std::io::BufRead;
use std::sync::Arc;

use bazaar_presence::{IndicatorRegistry, PresenceError};
use bazaar_realtime::{EventHub, IndicatorBridge, RealtimeEvent};
use snafu::{ResultExt, Snafu};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::chat::{ChatListBadges, ConversationPane, drive};
use crate::settings::PresenceSettings;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("failed to build indicator registry on `{stage}`: {source}"))]
    Registry {
        stage: &'static str,
        source: PresenceError,
    },
    #[snafu(display("failed to read realtime feed on `{stage}`: {source}"))]
    ReadFeed {
        stage: &'static str,
        source: std::io::Error,
    },
    #[snafu(display("failed to start feed reader thread on `{stage}`: {source}"))]
    SpawnReader {
        stage: &'static str,
        source: std::io::Error,
    },
}

pub type AppResult<T> = Result<T, AppError>;

/// Counters for one pass over a realtime feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FeedStats {
    pub published: usize,
    pub skipped: usize,
}

const LINE_BUFFER: usize = 64;

/// Reads `reader` line by line on its own thread.
///
/// A blocking read such as an interactive stdin cannot be cancelled, so it must not sit
/// on the runtime's blocking pool where it would hold up runtime shutdown. The thread
/// ends after its next line once the receiver is gone.
pub fn spawn_line_reader<R>(reader: R) -> AppResult<mpsc::Receiver<std::io::Result<String>>>
where
    R: BufRead + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel(LINE_BUFFER);
    std::thread::Builder::new()
        .name("feed-reader".to_string())
        .spawn(move || {
            for line in reader.lines() {
                let failed = line.is_err();
                if line_tx.blocking_send(line).is_err() || failed {
                    break;
                }
            }
        })
        .context(SpawnReaderSnafu {
            stage: "spawn-feed-reader",
        })?;
    Ok(line_rx)
}

/// One signed-in session: registry, event hub, bridge and both render surfaces.
///
/// Everything is owned here rather than in globals, so a new session starts clean and
/// [`PresenceApp::shutdown`] leaves no timers or subscribers behind.
pub struct PresenceApp {
    registry: IndicatorRegistry,
    hub: EventHub,
    bridge: Option<IndicatorBridge>,
    shutdown_tx: watch::Sender<bool>,
    conversation: JoinHandle<ConversationPane>,
    chat_list: JoinHandle<ChatListBadges>,
}

impl PresenceApp {
    pub fn start(settings: Arc<PresenceSettings>) -> AppResult<Self> {
        let registry = IndicatorRegistry::new(settings.registry_config()).context(RegistrySnafu {
            stage: "app-start-registry",
        })?;
        let hub = EventHub::new();
        let bridge = IndicatorBridge::attach(&hub, registry.clone(), settings.local_user());
        let names = Arc::new(settings.directory());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let conversation = tokio::spawn(drive(
            ConversationPane::new(registry.clone(), names, settings.open_thread()),
            registry.subscribe(),
            shutdown_rx.clone(),
        ));
        let chat_list = tokio::spawn(drive(
            ChatListBadges::new(registry.clone()),
            registry.subscribe(),
            shutdown_rx,
        ));

        tracing::info!(
            open_thread = settings.open_thread.as_deref().unwrap_or(""),
            local_user = settings.local_user_id.as_deref().unwrap_or(""),
            typing_timeout_ms = settings.typing_timeout_ms,
            recording_timeout_ms = settings.recording_timeout_ms,
            "presence session started"
        );

        Ok(Self {
            registry,
            hub,
            bridge: Some(bridge),
            shutdown_tx,
            conversation,
            chat_list,
        })
    }

    pub fn registry(&self) -> &IndicatorRegistry {
        &self.registry
    }

    pub fn hub(&self) -> &EventHub {
        &self.hub
    }

    /// Publishes newline-delimited JSON events until `reader` hits EOF.
    ///
    /// Lines that fail to decode are logged and skipped; blank lines are ignored.
    pub async fn run_feed<R>(&self, reader: R) -> AppResult<FeedStats>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = reader.lines();
        let mut stats = FeedStats::default();

        while let Some(line) = lines.next_line().await.context(ReadFeedSnafu {
            stage: "read-feed-line",
        })? {
            self.publish_line(&line, &mut stats);
        }

        Ok(stats)
    }

    /// [`PresenceApp::run_feed`] over lines coming from [`spawn_line_reader`].
    pub async fn run_lines(
        &self,
        mut lines: mpsc::Receiver<std::io::Result<String>>,
    ) -> AppResult<FeedStats> {
        let mut stats = FeedStats::default();
        while let Some(line) = lines.recv().await {
            let line = line.context(ReadFeedSnafu {
                stage: "receive-feed-line",
            })?;
            self.publish_line(&line, &mut stats);
        }

        Ok(stats)
    }

    fn publish_line(&self, line: &str, stats: &mut FeedStats) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        match RealtimeEvent::decode(line) {
            Ok(event) => {
                self.hub.publish(&event);
                stats.published += 1;
            }
            Err(error) => {
                tracing::warn!("skipping realtime feed line: {error}");
                stats.skipped += 1;
            }
        }
    }

    /// Stops both surfaces, then detaches from the feed and drops every pending timer.
    ///
    /// Returns the surfaces' final state.
    pub async fn shutdown(mut self) -> (Option<ConversationPane>, Option<ChatListBadges>) {
        let _ = self.shutdown_tx.send(true);
        let (conversation, chat_list) =
            futures::future::join(self.conversation, self.chat_list).await;

        if let Some(bridge) = self.bridge.take() {
            bridge.detach();
        }
        let conversation = conversation
            .inspect_err(|error| tracing::error!("conversation pane task failed: {error}"))
            .ok();
        let chat_list = chat_list
            .inspect_err(|error| tracing::error!("chat list task failed: {error}"))
            .ok();

        tracing::info!("presence session closed");
        (conversation, chat_list)
    }
}
