use anyhow::Result;
use tokio::signal;

/// Resolve once the process receives Ctrl+C or SIGTERM.
pub async fn wait_for_shutdown() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await };

    #[cfg(unix)]
    let terminate = async {
        let mut handler = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        handler.recv().await;
        Ok::<(), std::io::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<()>>();

    let (which, result) = tokio::select! {
        r = ctrl_c => ("Ctrl+C", r),
        r = terminate => ("SIGTERM", r),
    };

    if let Err(e) = result {
        tracing::error!(%e, signal = which, "Failed to listen for shutdown signal");
        return Err(e.into());
    }

    tracing::info!(signal = which, "Shutdown signal received");
    Ok(())
}
