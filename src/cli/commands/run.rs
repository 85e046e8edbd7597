//! Run command - the foreground sync daemon.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use crate::api::ApiClient;
use crate::config::SettingsSource;
use crate::watcher::Daemon;

/// Run the daemon until SIGINT or SIGTERM.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    let source = SettingsSource::open(config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    let snapshot = source.snapshot();

    crate::logging::init_with_config(&snapshot.logging);

    if snapshot.api_key.is_empty() {
        tracing::warn!("[daemon] no api_key configured, uploads will fail until one is set");
    }

    let client = ApiClient::new(source.shared()).context("creating HTTP client")?;

    let daemon = Daemon::builder()
        .source(source)
        .uploader(Arc::new(client))
        .quiet_period(snapshot.quiet_period())
        .shutdown_policy(snapshot.daemon.on_shutdown)
        .build()
        .context("starting watcher")?;

    let ct = CancellationToken::new();
    let signal_ct = ct.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_ct.cancel();
    });

    daemon.run(ct.cancelled()).await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("[daemon] failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("[daemon] failed to listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
