//! ==============================================================================
//! shutdown.rs - process shutdown signal
//! ==============================================================================
//!
//! purpose:
//!     turns a one-shot signal future (ctrl-c in main.rs) into the
//!     `watch::Receiver<bool>` the long-running loops select on.
//!
//! relationships:
//!     - used by: main.rs (node and coordinator roles)
//!
//! ==============================================================================

use std::future::Future;

use tokio::sync::watch;
use tracing::{error, info};

/// flips the returned receiver to `true` once `signal` resolves.
///
/// if the listener itself fails the error is logged and the receiver never
/// changes; the sender is held for the life of the process, since a dropped
/// sender would wake every `changed()` as if shutdown had been requested.
pub fn shutdown_on<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = std::io::Result<()>> + Send + 'static,
{
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match signal.await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = tx.send(true);
            }
            Err(e) => {
                error!("cannot listen for shutdown signal, running until killed: {}", e);
                std::future::pending::<()>().await;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_flips_receiver() {
        let mut rx = shutdown_on(async { Ok(()) });
        rx.changed().await.unwrap();
        assert!(*rx.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_listener_never_signals_shutdown() {
        let mut rx = shutdown_on(async { Err(std::io::Error::other("no signal handler")) });

        let waited = tokio::time::timeout(Duration::from_secs(3600), rx.changed()).await;
        assert!(waited.is_err(), "receiver woke: {:?}", waited);
        assert!(!*rx.borrow());
    }
}
