// Pipelines — the long-running services and one-shot jobs behind each
// subcommand.

pub mod feed;
pub mod hydration;
pub mod intake;
pub mod link_aggregation;
pub mod normalization;
pub mod publish;
pub mod site_aggregation;

use tokio::sync::watch;

/// Resolve once `shutdown` flips to true. A dropped sender never resolves.
pub async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Flip the shutdown flag on SIGTERM or Ctrl-C.
pub fn spawn_signal_handler() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        terminate_signal().await;
        tracing::info!("Shutdown signal received");
        let _ = tx.send(true);
        // Keep the sender alive so receivers don't see a closed channel
        std::future::pending::<()>().await;
    });
    rx
}

#[cfg(unix)]
async fn terminate_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = sigterm.recv() => {}
                _ = tokio::signal::ctrl_c() => {}
            }
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn terminate_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_for_shutdown_resolves_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { wait_for_shutdown(&mut rx).await });
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_sender_does_not_signal() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        let result =
            tokio::time::timeout(Duration::from_secs(5), wait_for_shutdown(&mut rx)).await;
        assert!(result.is_err());
    }
}
