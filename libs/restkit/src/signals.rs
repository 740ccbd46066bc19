use anyhow::Result;
use tokio::signal;

/// OS signal that ended a [`wait_for_shutdown`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
}

/// Wait for SIGINT (Ctrl+C) or SIGTERM.
pub async fn wait_for_shutdown() -> Result<ShutdownSignal> {
    let received = tokio::select! {
        result = wait_interrupt() => result?,
        result = wait_terminate() => result?,
    };
    tracing::info!(signal = ?received, "Shutdown signal received");
    Ok(received)
}

async fn wait_interrupt() -> Result<ShutdownSignal> {
    signal::ctrl_c().await.inspect_err(|e| {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
    })?;
    Ok(ShutdownSignal::Interrupt)
}

#[cfg(unix)]
async fn wait_terminate() -> Result<ShutdownSignal> {
    let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())
        .inspect_err(|e| tracing::error!(error = %e, "Failed to install SIGTERM handler"))?;
    terminate.recv().await;
    Ok(ShutdownSignal::Terminate)
}

#[cfg(not(unix))]
async fn wait_terminate() -> Result<ShutdownSignal> {
    std::future::pending().await
}
