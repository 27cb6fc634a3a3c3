// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Shutdown coordination.
//!
//! Long running commands (`watch`, the interactive write mode) stop when
//! Ctrl+C or SIGTERM arrives, after which the session is closed cleanly.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

// =============================================================================
// ShutdownCoordinator
// =============================================================================

/// Broadcasts a one-shot shutdown request to every waiter.
///
/// ```ignore
/// let shutdown = ShutdownCoordinator::new();
/// let _signals = shutdown.listen_for_signals();
///
/// tokio::select! {
///     _ = shutdown.wait() => println!("interrupted"),
///     _ = work() => {}
/// }
/// ```
#[derive(Clone)]
pub struct ShutdownCoordinator {
    sender: Arc<watch::Sender<bool>>,
}

impl ShutdownCoordinator {
    /// Creates a coordinator that has not been triggered.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Requests shutdown. Later calls are no-ops.
    pub fn initiate_shutdown(&self) {
        let first = self.sender.send_if_modified(|initiated| {
            let first = !*initiated;
            *initiated = true;
            first
        });
        if first {
            info!("Shutdown initiated");
        }
    }

    /// Returns true if shutdown has been requested.
    pub fn is_shutdown_initiated(&self) -> bool {
        *self.sender.borrow()
    }

    /// Resolves once shutdown has been requested.
    pub async fn wait(&self) {
        let mut receiver = self.sender.subscribe();
        // The sender lives in `self`, so this only returns on shutdown.
        let _ = receiver.wait_for(|initiated| *initiated).await;
    }

    /// Spawns a task that requests shutdown on Ctrl+C or SIGTERM.
    pub fn listen_for_signals(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            info!(signal, "Received shutdown signal");
            coordinator.initiate_shutdown();
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Waits for the first termination signal and returns its name.
pub async fn wait_for_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => return "SIGTERM",
                    result = tokio::signal::ctrl_c() => {
                        if let Err(e) = result {
                            warn!(error = %e, "Ctrl+C handler failed");
                        }
                        return "SIGINT";
                    }
                }
            }
            Err(e) => warn!(error = %e, "SIGTERM handler unavailable"),
        }
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Ctrl+C handler failed");
        std::future::pending::<()>().await;
    }
    "Ctrl+C"
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initiate_wakes_waiters() {
        let coordinator = ShutdownCoordinator::new();
        assert!(!coordinator.is_shutdown_initiated());

        let waiter = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.wait().await })
        };
        tokio::task::yield_now().await;

        coordinator.initiate_shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(coordinator.is_shutdown_initiated());
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_returns_immediately() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate_shutdown();
        coordinator.initiate_shutdown();

        tokio::time::timeout(Duration::from_millis(100), coordinator.wait())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_pends_without_shutdown() {
        let coordinator = ShutdownCoordinator::new();
        let result = tokio::time::timeout(Duration::from_millis(50), coordinator.wait()).await;
        assert!(result.is_err());
    }
}
