//! Process signal handling.

/// Wait for Ctrl+C. If the handler cannot be installed this never resolves,
/// leaving shutdown to end-of-input instead.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
