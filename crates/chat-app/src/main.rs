use std::process::ExitCode;
use std::sync::Arc;

use bazaar_chat::app::{AppResult, PresenceApp, spawn_line_reader};
use bazaar_chat::settings::{PresenceSettings, SettingsStore};
use tracing_subscriber::EnvFilter;

/// Presence console entry point.
///
/// 1. Logging from `RUST_LOG` (defaults to `info`)
/// 2. Settings from the config file and `BAZAAR_*` environment
/// 3. Optional first argument opens that conversation and is remembered in the file
/// 4. Realtime events are read as JSON lines from stdin until EOF or Ctrl-C
#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let store = SettingsStore::load();
    let mut settings = (*store.settings()).clone();
    if let Some(thread) = std::env::args().nth(1) {
        let remembered = store.stored().open_thread.as_deref() == Some(thread.trim());
        settings.open_thread = Some(thread.clone());
        // Only the file layer is written; `BAZAAR_*` overrides stay with this process.
        if !remembered
            && let Err(error) = store.edit(|stored| stored.open_thread = Some(thread))
        {
            tracing::warn!("failed to remember open conversation: {error}");
        }
    }

    match run(Arc::new(settings.normalized())).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!("presence console failed: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Arc<PresenceSettings>) -> AppResult<()> {
    let app = PresenceApp::start(settings)?;
    let stdin = spawn_line_reader(std::io::BufReader::new(std::io::stdin()))?;

    let outcome = tokio::select! {
        stats = app.run_lines(stdin) => stats.map(Some),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
            Ok(None)
        }
    };

    app.shutdown().await;

    if let Some(stats) = outcome? {
        tracing::info!(
            published = stats.published,
            skipped = stats.skipped,
            "realtime feed finished"
        );
    }
    Ok(())
}
