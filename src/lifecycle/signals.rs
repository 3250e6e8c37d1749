//! OS signal handling.

/// Resolve once the process is asked to stop.
///
/// If the handler cannot be installed the error is logged and this never
/// resolves, so the proxy keeps serving.
pub async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Interrupt received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}
