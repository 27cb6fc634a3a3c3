// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Harness runtime.
//!
//! [`Harness`] owns the client built from the configuration together with
//! the shutdown coordinator, and gives commands a connect/close lifecycle.

use std::future::Future;
use std::sync::Arc;

use tracing::{info, warn};

use ualink_opcua::OpcUaClient;

use crate::config::HarnessConfig;
use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

// =============================================================================
// Harness
// =============================================================================

/// A configured client and its shutdown coordinator.
pub struct Harness {
    config: Arc<HarnessConfig>,
    client: OpcUaClient,
    shutdown: ShutdownCoordinator,
}

impl Harness {
    /// Creates a harness; nothing is connected yet.
    pub fn new(config: HarnessConfig) -> Self {
        let client = OpcUaClient::with_retry(config.client_config(), config.retry_config());
        Self {
            config: Arc::new(config),
            client,
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Uses an existing shutdown coordinator.
    pub fn with_shutdown(mut self, shutdown: ShutdownCoordinator) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// The client.
    pub fn client(&self) -> &OpcUaClient {
        &self.client
    }

    /// The configuration.
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// The shutdown coordinator.
    pub fn shutdown(&self) -> &ShutdownCoordinator {
        &self.shutdown
    }

    /// Connects and opens a session, retrying per configuration.
    pub async fn connect(&self) -> BinResult<()> {
        let endpoint = &self.client.config().endpoint;
        info!(%endpoint, "Connecting");

        let connect = self.client.connect();
        match self.until_shutdown(connect).await {
            Some(Ok(())) => {
                info!(
                    %endpoint,
                    session_id = ?self.client.session_id(),
                    "Connected"
                );
                Ok(())
            }
            Some(Err(e)) => {
                e.log("connect");
                Err(BinError::Connection(e).with_context(format!("connecting to {endpoint}")))
            }
            None => Err(BinError::runtime("interrupted while connecting")),
        }
    }

    /// Closes the session and the channel.
    pub async fn close(&self) {
        if !self.client.is_connected() {
            warn!("Closing a harness that is not connected");
        }
        self.client.disconnect().await;

        let stats = self.client.stats();
        info!(
            reads = stats.reads(),
            writes = stats.writes(),
            errors = stats.errors(),
            reconnections = stats.reconnections(),
            "Connection closed"
        );
    }

    /// Runs `future` unless shutdown is requested first.
    pub async fn until_shutdown<F: Future>(&self, future: F) -> Option<F::Output> {
        tokio::select! {
            output = future => Some(output),
            _ = self.shutdown.wait() => None,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ualink_opcua::RetryConfig;

    fn unreachable_config() -> HarnessConfig {
        let mut config = HarnessConfig::default().with_endpoint("opc.tcp://127.0.0.1:1");
        config.client.connect_timeout = Duration::from_millis(200);
        config.retry = Some(RetryConfig::no_retry());
        config
    }

    #[tokio::test]
    async fn test_connect_failure_is_connection_error() {
        let harness = Harness::new(unreachable_config());
        let err = harness.connect().await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().starts_with("connecting to opc.tcp://127.0.0.1:1"));
        assert!(!harness.client().is_connected());
    }

    #[tokio::test]
    async fn test_until_shutdown() {
        let harness = Harness::new(HarnessConfig::default());
        assert_eq!(harness.until_shutdown(async { 5 }).await, Some(5));

        harness.shutdown().initiate_shutdown();
        let pending = std::future::pending::<()>();
        assert_eq!(harness.until_shutdown(pending).await, None);
    }

    #[tokio::test]
    async fn test_client_uses_harness_defaults() {
        let harness = Harness::new(HarnessConfig::default());
        let config = harness.client().config();
        assert_eq!(config.endpoint, crate::config::DEFAULT_ENDPOINT);
        assert_eq!(
            config.subscription.publishing_interval,
            Duration::from_millis(250)
        );
    }
}
