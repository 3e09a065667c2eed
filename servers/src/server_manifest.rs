use anyhow::Result;
use lib_common::configs::{Settings, SettingsConfig};
use lib_common::core::{Dispatcher, DropzoneState};
use std::sync::Arc;
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod manifest_logic;
use manifest_logic::{config, downstream, logger, state};

#[tokio::main]
async fn main() -> Result<()> {
    let config = config::load_config();
    logger::setup_logging(&config.log_dir(), config.log_level(), config.log_keep.unwrap_or(1))?;

    let settings = match &config.settings_path {
        Some(path) => {
            log::info!("Loading settings from {}", path.display());
            Settings::load(path)?
        }
        None => {
            log::info!("No settings file given. Using defaults.");
            Settings::new(SettingsConfig::default())?
        }
    };
    log::info!(
        "Dropzone {} in {}",
        settings.burble_dropzone_id(),
        settings.location()
    );

    let shutdown = CancellationToken::new();
    let dropzone = DropzoneState::new(Arc::new(settings))?;

    // The dispatcher registers for changes before any source starts refreshing.
    let (dispatcher, dispatcher_handle) = Dispatcher::start(Arc::clone(&dropzone), shutdown.clone());
    let source_handles = dropzone.start(&shutdown);

    let app_state = state::AppState::new(Arc::clone(&dropzone), dispatcher);
    let downstream_handle = tokio::spawn(downstream::run(config.clone(), app_state, shutdown.clone()));

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            log::info!("Ctrl-C received, initiating shutdown.");
        }
        _ = terminate() => {
            log::info!("SIGTERM received, initiating shutdown.");
        }
    }

    // Stop every component
    shutdown.cancel();

    // Wait for components to shut down
    match downstream_handle.await {
        Ok(Err(e)) => log::error!("Downstream server failed: {}", e),
        Err(e) => log::error!("Downstream task panicked: {}", e),
        Ok(Ok(())) => {}
    }
    join_logged("Dispatcher", dispatcher_handle).await;
    for handle in source_handles {
        join_logged("Source", handle).await;
    }

    log::info!("Shutdown complete.");
    Ok(())
}

async fn terminate() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term_signal) => {
                term_signal.recv().await;
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        // On non-unix platforms, just wait forever.
        std::future::pending::<()>().await;
    }
}

/// Awaits a background task, logging a panic or cancellation instead of dropping it.
async fn join_logged(name: &str, handle: JoinHandle<()>) -> bool {
    match handle.await {
        Ok(()) => true,
        Err(e) => {
            log::error!("{} task panicked: {}", name, e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn join_failures_are_reported() {
        assert!(join_logged("Quiet", tokio::spawn(async {})).await);
        let failing: JoinHandle<()> = tokio::spawn(async { panic!("source blew up") });
        assert!(!join_logged("Failing", failing).await);
    }
}
