//! Process signals that stop the scheduler.

use tokio_util::sync::CancellationToken;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Cancels `token` on the first SIGTERM or SIGINT (Ctrl-C elsewhere).
///
/// Handlers are registered before this returns, so a signal arriving right
/// after the call is not lost. Must be called inside a tokio runtime.
pub fn cancel_on_signal(token: CancellationToken) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down gracefully"),
                _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down gracefully"),
            }
            token.cancel();
        });
    }

    #[cfg(not(unix))]
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Received Ctrl-C, shutting down gracefully");
                token.cancel();
            }
            Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    Ok(())
}
