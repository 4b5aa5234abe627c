//! Graceful shutdown handling.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Waits until a shutdown signal arrives.
///
/// On Unix this is Ctrl+C (SIGINT) or SIGTERM; elsewhere Ctrl+C only.
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let term_signal = match signal(SignalKind::terminate()) {
            Ok(sig) => Some(sig),
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}. Only Ctrl+C will trigger shutdown");
                None
            },
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = async {
                match term_signal {
                    Some(mut sig) => { sig.recv().await; },
                    None => std::future::pending::<()>().await,
                }
            } => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Spawns a task that cancels `token` once a shutdown signal arrives.
pub fn cancel_on_shutdown(token: &CancellationToken) {
    let token = token.clone();
    tokio::spawn(async move {
        wait_for_shutdown().await;
        info!("Shutdown signal received");
        token.cancel();
    });
}
