use tatara_core::{StopSignal, stop_channel};

/// Raise a stop when the process receives SIGINT or SIGTERM.
#[cfg(unix)]
pub(crate) fn stop_on_signal() -> anyhow::Result<StopSignal> {
    use anyhow::Context;
    use tokio::signal::unix::{SignalKind, signal};

    let (handle, stop) = stop_channel();
    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("failed to register SIGINT handler")?;

    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("received SIGTERM, stopping"),
            _ = sigint.recv() => tracing::info!("received SIGINT, stopping"),
        }
        handle.stop();
    });

    Ok(stop)
}

#[cfg(not(unix))]
pub(crate) fn stop_on_signal() -> anyhow::Result<StopSignal> {
    let (handle, stop) = stop_channel();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("received Ctrl+C, stopping");
                handle.stop();
            }
            Err(e) => tracing::warn!(error = %e, "Ctrl+C handler unavailable"),
        }
    });
    Ok(stop)
}
