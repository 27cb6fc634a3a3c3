// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Harness configuration schema.
//!
//! ```yaml
//! client:
//!   endpoint: opc.tcp://localhost:48010
//!   request_timeout: 15s
//! retry:
//!   max_retries: 5
//!   strategy: exponential
//! harness:
//!   publishing_interval: 250ms
//!   watch:
//!     - name: Static Boolean
//!       node: ns=3;s=Demo.Static.Scalar.Boolean
//! logging:
//!   level: info
//! ```

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use ualink_opcua::types::humantime_serde;
use ualink_opcua::{NodeId, OpcUaConfig, OpcUaDataType, RetryConfig};

use super::error::{ConfigError, ConfigResult};
use crate::cli::LogFormat;
use crate::logging::is_valid_level;

/// Endpoint used when neither the file nor the command line names one.
pub const DEFAULT_ENDPOINT: &str = "opc.tcp://localhost:48010";

// =============================================================================
// HarnessConfig
// =============================================================================

/// Root configuration of the `ualink` binary.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// OPC UA client settings.
    pub client: OpcUaConfig,

    /// Connection retry settings; derived from `client` when omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryConfig>,

    /// Test scenario settings.
    pub harness: HarnessSettings,

    /// Logging settings.
    pub logging: LoggingSettings,
}

impl HarnessConfig {
    /// Overrides the endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.client.endpoint = endpoint.into();
        self
    }

    /// Client configuration with harness defaults applied.
    pub fn client_config(&self) -> OpcUaConfig {
        let mut config = self.client.clone();
        if config.endpoint.is_empty() {
            config.endpoint = DEFAULT_ENDPOINT.to_string();
        }
        config.subscription.publishing_interval = self.harness.publishing_interval;
        config
    }

    /// Effective retry configuration.
    pub fn retry_config(&self) -> RetryConfig {
        self.retry
            .clone()
            .unwrap_or_else(|| RetryConfig::from(&self.client))
    }

    /// Validates every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.client_config().validate()?;

        if let Some(retry) = &self.retry {
            if retry.max_delay < retry.base_delay {
                return Err(ConfigError::validation(
                    "retry.max_delay",
                    "must not be shorter than retry.base_delay",
                ));
            }
        }

        self.harness.validate()?;

        if !is_valid_level(&self.logging.level) {
            return Err(ConfigError::validation(
                "logging.level",
                format!("unknown level '{}'", self.logging.level),
            ));
        }

        Ok(())
    }
}

// =============================================================================
// HarnessSettings
// =============================================================================

/// Nodes and timings of the test scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessSettings {
    /// Node browsed by `run`.
    pub browse_root: String,

    /// Nodes read by `run` after the standard server nodes.
    pub test_nodes: Vec<String>,

    /// Nodes watched by `run` and by `watch` without arguments.
    pub watch: Vec<WatchTarget>,

    /// Menu entries of the interactive write mode.
    pub write_targets: Vec<WriteTarget>,

    /// Publishing interval of harness subscriptions.
    #[serde(with = "humantime_serde")]
    pub publishing_interval: Duration,

    /// Pause between a write and the read back.
    #[serde(with = "humantime_serde")]
    pub write_settle: Duration,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            browse_root: "i=85".to_string(),
            test_nodes: vec![
                "ns=3;s=Demo.Static.Scalar.Boolean".to_string(),
                "ns=3;s=Demo.Dynamic.Scalar.UInt32".to_string(),
                "ns=3;s=Demo.Dynamic.Scalar.Boolean".to_string(),
                "ns=3;s=Demo.Static.Scalar.UInt32".to_string(),
            ],
            watch: vec![
                WatchTarget::new("Static Boolean", "ns=3;s=Demo.Static.Scalar.Boolean"),
                WatchTarget::new("Static UInt32", "ns=3;s=Demo.Static.Scalar.UInt32"),
            ],
            write_targets: vec![
                WriteTarget::new("Static Boolean", "ns=3;s=Demo.Static.Scalar.Boolean", "boolean"),
                WriteTarget::new("Dynamic UInt32", "ns=3;s=Demo.Dynamic.Scalar.UInt32", "uint32"),
                WriteTarget::new("Dynamic Boolean", "ns=3;s=Demo.Dynamic.Scalar.Boolean", "boolean"),
                WriteTarget::new("Static UInt32", "ns=3;s=Demo.Static.Scalar.UInt32", "uint32"),
            ],
            publishing_interval: Duration::from_millis(250),
            write_settle: Duration::from_millis(100),
        }
    }
}

impl HarnessSettings {
    fn validate(&self) -> ConfigResult<()> {
        parse_node("harness.browse_root", &self.browse_root)?;

        for node in &self.test_nodes {
            parse_node("harness.test_nodes", node)?;
        }

        let mut names = HashSet::new();
        for target in &self.watch {
            target.node_id()?;
            if !names.insert(target.name.as_str()) {
                return Err(ConfigError::validation(
                    "harness.watch",
                    format!("duplicate name '{}'", target.name),
                ));
            }
        }

        for target in &self.write_targets {
            target.node_id()?;
            target.data_type()?;
        }

        if self.publishing_interval.is_zero() {
            return Err(ConfigError::validation(
                "harness.publishing_interval",
                "must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn parse_node(field: &str, text: &str) -> ConfigResult<NodeId> {
    text.parse()
        .map_err(|e| ConfigError::validation(field, format!("'{text}': {e}")))
}

/// A watched node with a display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchTarget {
    /// Name printed with each change.
    pub name: String,
    /// Node id in text form.
    pub node: String,
}

impl WatchTarget {
    /// Creates a watch target.
    pub fn new(name: impl Into<String>, node: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node: node.into(),
        }
    }

    /// Parses the node id.
    pub fn node_id(&self) -> ConfigResult<NodeId> {
        parse_node("harness.watch", &self.node)
    }
}

/// An entry of the interactive write menu.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteTarget {
    /// Label shown in the menu.
    pub name: String,
    /// Node id in text form.
    pub node: String,
    /// Type name the input is parsed as.
    pub data_type: String,
}

impl WriteTarget {
    /// Creates a write target.
    pub fn new(
        name: impl Into<String>,
        node: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            node: node.into(),
            data_type: data_type.into(),
        }
    }

    /// Parses the node id.
    pub fn node_id(&self) -> ConfigResult<NodeId> {
        parse_node("harness.write_targets", &self.node)
    }

    /// Parses the data type name.
    pub fn data_type(&self) -> ConfigResult<OpcUaDataType> {
        self.data_type.parse().map_err(|e| {
            ConfigError::validation(
                "harness.write_targets",
                format!("'{}': {e}", self.data_type),
            )
        })
    }
}

// =============================================================================
// LoggingSettings
// =============================================================================

/// Logging defaults, overridden by the command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level.
    pub level: String,
    /// Log format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HarnessConfig::default();
        config.validate().unwrap();

        let client = config.client_config();
        assert_eq!(client.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(
            client.subscription.publishing_interval,
            Duration::from_millis(250)
        );
        assert_eq!(config.harness.write_targets.len(), 4);
        assert_eq!(config.harness.watch.len(), 2);
    }

    #[test]
    fn test_retry_derived_from_client() {
        let mut config = HarnessConfig::default();
        config.client.max_retries = 7;
        config.client.retry_delay = Duration::from_millis(20);

        let retry = config.retry_config();
        assert_eq!(retry.max_retries, 7);
        assert_eq!(retry.base_delay, Duration::from_millis(20));

        config.retry = Some(RetryConfig::new(1));
        assert_eq!(config.retry_config().max_retries, 1);
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = HarnessConfig::default().with_endpoint("http://localhost:80");
        assert!(matches!(config.validate(), Err(ConfigError::Client(_))));
    }

    #[test]
    fn test_invalid_write_target_type() {
        let mut config = HarnessConfig::default();
        config.harness.write_targets[0].data_type = "quaternion".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Validation { ref field, .. } if field == "harness.write_targets"));
    }

    #[test]
    fn test_duplicate_watch_names() {
        let mut config = HarnessConfig::default();
        config.harness.watch[1].name = config.harness.watch[0].name.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_delay_order() {
        let mut config = HarnessConfig::default();
        config.retry = Some(
            RetryConfig::new(2)
                .with_base_delay(Duration::from_secs(10))
                .with_max_delay(Duration::from_secs(1)),
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_log_level() {
        let mut config = HarnessConfig::default();
        config.logging.level = "chatty".to_string();
        assert!(config.validate().is_err());
    }
}
