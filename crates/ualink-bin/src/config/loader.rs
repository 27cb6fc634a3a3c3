// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration loading.
//!
//! Loading runs in this order:
//!
//! 1. Read the file and pick the format from its extension
//! 2. Replace `${VAR}` and `${VAR:default}` placeholders
//! 3. Deserialize (YAML through the `config` crate, TOML, JSON)
//! 4. Apply `UALINK_*` environment overrides
//! 5. Validate

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use ualink_opcua::UserIdentity;

use super::error::{ConfigError, ConfigResult};
use super::schema::HarnessConfig;
use crate::logging::is_valid_level;

/// Default prefix of override variables.
pub const DEFAULT_ENV_PREFIX: &str = "UALINK";

// =============================================================================
// ConfigLoader
// =============================================================================

/// Loads [`HarnessConfig`] from files or strings.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    env_prefix: String,
    resolve_env_vars: bool,
    env_override: Option<HashMap<String, String>>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self {
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            resolve_env_vars: true,
            env_override: None,
        }
    }
}

impl ConfigLoader {
    /// Creates a loader reading the process environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the prefix of override variables.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Enables or disables placeholders and overrides.
    pub fn with_env_vars(mut self, enabled: bool) -> Self {
        self.resolve_env_vars = enabled;
        self
    }

    /// Reads variables from `vars` instead of the process environment.
    pub fn with_env_source(mut self, vars: HashMap<String, String>) -> Self {
        self.env_override = Some(vars);
        self
    }

    /// Loads a configuration file.
    pub fn load(&self, path: impl AsRef<Path>) -> ConfigResult<HarnessConfig> {
        let path = path.as_ref();
        info!("Loading configuration from: {}", path.display());

        let content = self.read_file(path)?;
        let format = ConfigFormat::from_path(path)?;
        let content = self.resolve_placeholders(&content);

        let config = self
            .parse_str(&content, format)
            .map_err(|e| match e {
                ConfigError::Serialization { message } => ConfigError::parse(path, message),
                other => other,
            })?;

        let config = self.finish(config)?;
        debug!(
            endpoint = %config.client_config().endpoint,
            watch = config.harness.watch.len(),
            write_targets = config.harness.write_targets.len(),
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Loads a configuration from a string.
    pub fn load_from_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<HarnessConfig> {
        let content = self.resolve_placeholders(content);
        let config = self.parse_str(&content, format)?;
        self.finish(config)
    }

    /// Loads `path` when given, otherwise the built-in defaults.
    pub fn load_or_default(&self, path: Option<&Path>) -> ConfigResult<HarnessConfig> {
        match path {
            Some(path) => self.load(path),
            None => {
                debug!("No configuration file given, using defaults");
                self.finish(HarnessConfig::default())
            }
        }
    }

    fn finish(&self, mut config: HarnessConfig) -> ConfigResult<HarnessConfig> {
        if self.resolve_env_vars {
            self.apply_env_overrides(&mut config)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn read_file(&self, path: &Path) -> ConfigResult<String> {
        if !path.exists() {
            return Err(ConfigError::file_not_found(path));
        }
        fs::read_to_string(path).map_err(|e| ConfigError::io(path, e))
    }

    fn parse_str(&self, content: &str, format: ConfigFormat) -> ConfigResult<HarnessConfig> {
        match format {
            ConfigFormat::Yaml => parse_yaml(content),
            ConfigFormat::Toml => {
                toml::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
            }
            ConfigFormat::Json => {
                serde_json::from_str(content).map_err(|e| ConfigError::serialization(e.to_string()))
            }
        }
    }

    fn var(&self, name: &str) -> Option<String> {
        match &self.env_override {
            Some(vars) => vars.get(name).cloned(),
            None => env::var(name).ok(),
        }
    }

    /// Replaces `${VAR}` and `${VAR:default}`. Unknown variables without a
    /// default are left in place.
    fn resolve_placeholders(&self, content: &str) -> String {
        if !self.resolve_env_vars {
            return content.to_string();
        }

        let mut result = String::with_capacity(content.len());
        let mut rest = content;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];

            let Some(end) = after.find('}') else {
                result.push_str(&rest[start..]);
                return result;
            };

            let body = &after[..end];
            let (name, default) = match body.split_once(':') {
                Some((name, default)) => (name, Some(default)),
                None => (body, None),
            };

            match (self.var(name), default) {
                (Some(value), _) => result.push_str(&value),
                (None, Some(default)) => result.push_str(default),
                (None, None) => {
                    warn!("Environment variable '{}' not found", name);
                    result.push_str(&rest[start..start + 2 + end + 1]);
                }
            }
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        result
    }

    fn apply_env_overrides(&self, config: &mut HarnessConfig) -> ConfigResult<()> {
        let key = |suffix: &str| format!("{}_{}", self.env_prefix, suffix);

        if let Some(value) = self.var(&key("ENDPOINT")) {
            config.client.endpoint = value;
        }

        for (suffix, target) in [
            ("REQUEST_TIMEOUT", &mut config.client.request_timeout),
            ("SESSION_TIMEOUT", &mut config.client.session_timeout),
            ("CONNECT_TIMEOUT", &mut config.client.connect_timeout),
        ] {
            if let Some(value) = self.var(&key(suffix)) {
                *target = parse_duration(&key(suffix), &value)?;
            }
        }

        if let Some(value) = self.var(&key("MAX_RETRIES")) {
            let retries = value
                .parse()
                .map_err(|_| ConfigError::invalid_env_var(key("MAX_RETRIES"), "expected a number"))?;
            config.client.max_retries = retries;
            if let Some(retry) = config.retry.as_mut() {
                retry.max_retries = retries;
            }
        }

        if let Some(value) = self.var(&key("AUTO_RECONNECT")) {
            config.client.auto_reconnect = parse_bool(&value);
        }

        if let Some(username) = self.var(&key("USERNAME")) {
            let password = self.var(&key("PASSWORD")).unwrap_or_default();
            config.client.user_identity = UserIdentity::UserName { username, password };
        }

        if let Some(value) = self.var(&key("LOG_LEVEL")) {
            if !is_valid_level(&value) {
                return Err(ConfigError::invalid_env_var(
                    key("LOG_LEVEL"),
                    format!("unknown level '{value}'"),
                ));
            }
            config.logging.level = value.to_lowercase();
        }

        Ok(())
    }
}

// =============================================================================
// ConfigFormat
// =============================================================================

/// Supported configuration file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format.
    Yaml,
    /// TOML format.
    Toml,
    /// JSON format.
    Json,
}

impl ConfigFormat {
    /// Determines the format from a file path.
    pub fn from_path(path: &Path) -> ConfigResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase());

        match ext.as_deref() {
            Some("yaml") | Some("yml") => Ok(Self::Yaml),
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            Some(other) => Err(ConfigError::unsupported_format(other)),
            None => Err(ConfigError::unsupported_format("(no extension)")),
        }
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "enabled"
    )
}

fn parse_duration(name: &str, value: &str) -> ConfigResult<Duration> {
    humantime::parse_duration(value)
        .map_err(|e| ConfigError::invalid_env_var(name, format!("expected a duration: {e}")))
}

fn parse_yaml<T: DeserializeOwned>(content: &str) -> ConfigResult<T> {
    config::Config::builder()
        .add_source(config::File::from_str(content, config::FileFormat::Yaml))
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigError::serialization(e.to_string()))
}

/// Loads `path` when given, otherwise the defaults, reading the process
/// environment.
pub fn load_config(path: Option<&Path>) -> ConfigResult<HarnessConfig> {
    ConfigLoader::new().load_or_default(path)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;
    use ualink_opcua::RetryStrategy;

    fn isolated() -> ConfigLoader {
        ConfigLoader::new().with_env_source(HashMap::new())
    }

    fn with_vars(vars: &[(&str, &str)]) -> ConfigLoader {
        ConfigLoader::new().with_env_source(
            vars.iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    fn temp_file(suffix: &str, content: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const YAML: &str = r#"
client:
  endpoint: opc.tcp://plc.local:4840
  request_timeout: 5s
retry:
  max_retries: 2
  base_delay: 100ms
  max_delay: 2s
  strategy: linear
harness:
  publishing_interval: 500ms
  watch:
    - name: Speed
      node: ns=2;s=Line1.Speed
  write_targets:
    - name: Setpoint
      node: ns=2;s=Line1.Setpoint
      data_type: double
logging:
  level: debug
"#;

    #[test]
    fn test_load_yaml() {
        let file = temp_file(".yaml", YAML);
        let config = isolated().load(file.path()).unwrap();

        assert_eq!(config.client.endpoint, "opc.tcp://plc.local:4840");
        assert_eq!(config.client.request_timeout, Duration::from_secs(5));
        assert_eq!(config.harness.watch[0].name, "Speed");
        assert_eq!(config.harness.write_targets[0].data_type, "double");
        assert_eq!(
            config.client_config().subscription.publishing_interval,
            Duration::from_millis(500)
        );
        assert_eq!(config.logging.level, "debug");

        let retry = config.retry_config();
        assert_eq!(retry.max_retries, 2);
        assert_eq!(retry.strategy, RetryStrategy::Linear);
        assert_eq!(retry.max_delay, Duration::from_secs(2));
    }

    #[test]
    fn test_load_toml() {
        let file = temp_file(
            ".toml",
            r#"
[client]
endpoint = "opc.tcp://10.0.0.5:48010"
session_timeout = "2m"

[harness]
test_nodes = ["ns=3;s=Demo.Static.Scalar.Double"]
"#,
        );
        let config = isolated().load(file.path()).unwrap();
        assert_eq!(config.client.session_timeout, Duration::from_secs(120));
        assert_eq!(config.harness.test_nodes, ["ns=3;s=Demo.Static.Scalar.Double"]);
        // untouched sections keep their defaults
        assert_eq!(config.harness.write_targets.len(), 4);
        assert!(config.retry.is_none());
    }

    #[test]
    fn test_load_json() {
        let file = temp_file(
            ".json",
            r#"{"client": {"endpoint": "opc.tcp://localhost:4840", "user_identity": {"type": "user_name", "username": "op", "password": "pw"}}}"#,
        );
        let config = isolated().load(file.path()).unwrap();
        assert!(!config.client.user_identity.is_anonymous());
    }

    #[test]
    fn test_missing_endpoint_uses_default() {
        let config = isolated()
            .load_from_str("client:\n  request_timeout: 3s\n", ConfigFormat::Yaml)
            .unwrap();
        assert!(config.client.endpoint.is_empty());
        assert_eq!(config.client_config().endpoint, crate::config::DEFAULT_ENDPOINT);
    }

    #[test]
    fn test_config_format_from_path() {
        assert_eq!(ConfigFormat::from_path(Path::new("a.yml")).unwrap(), ConfigFormat::Yaml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.TOML")).unwrap(), ConfigFormat::Toml);
        assert_eq!(ConfigFormat::from_path(Path::new("a.json")).unwrap(), ConfigFormat::Json);
        assert!(ConfigFormat::from_path(Path::new("a.ini")).is_err());
        assert!(ConfigFormat::from_path(Path::new("ualink")).is_err());
    }

    #[test]
    fn test_placeholders() {
        let loader = with_vars(&[("PLC_HOST", "10.1.2.3")]);
        assert_eq!(
            loader.resolve_placeholders("opc.tcp://${PLC_HOST}:${PLC_PORT:4840}"),
            "opc.tcp://10.1.2.3:4840"
        );
        assert_eq!(loader.resolve_placeholders("${MISSING}/x"), "${MISSING}/x");
        assert_eq!(loader.resolve_placeholders("tail ${OPEN"), "tail ${OPEN");
    }

    #[test]
    fn test_placeholders_in_file() {
        let file = temp_file(".yaml", "client:\n  endpoint: opc.tcp://${PLC_HOST:localhost}:4840\n");
        let config = isolated().load(file.path()).unwrap();
        assert_eq!(config.client.endpoint, "opc.tcp://localhost:4840");
    }

    #[test]
    fn test_env_overrides() {
        let loader = with_vars(&[
            ("UALINK_ENDPOINT", "opc.tcp://override:4840"),
            ("UALINK_REQUEST_TIMEOUT", "750ms"),
            ("UALINK_AUTO_RECONNECT", "off"),
            ("UALINK_MAX_RETRIES", "9"),
            ("UALINK_USERNAME", "operator"),
            ("UALINK_LOG_LEVEL", "WARN"),
        ]);
        let config = loader.load_or_default(None).unwrap();

        assert_eq!(config.client.endpoint, "opc.tcp://override:4840");
        assert_eq!(config.client.request_timeout, Duration::from_millis(750));
        assert!(!config.client.auto_reconnect);
        assert_eq!(config.retry_config().max_retries, 9);
        assert!(!config.client.user_identity.is_anonymous());
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_custom_prefix() {
        let loader = with_vars(&[("LAB_ENDPOINT", "opc.tcp://lab:4840")]).with_env_prefix("LAB");
        let config = loader.load_or_default(None).unwrap();
        assert_eq!(config.client.endpoint, "opc.tcp://lab:4840");
    }

    #[test]
    fn test_invalid_env_values() {
        let err = with_vars(&[("UALINK_REQUEST_TIMEOUT", "soon")])
            .load_or_default(None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));

        let err = with_vars(&[("UALINK_LOG_LEVEL", "loud")])
            .load_or_default(None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnvVar { .. }));
    }

    #[test]
    fn test_env_disabled() {
        let loader = with_vars(&[("UALINK_ENDPOINT", "opc.tcp://override:4840")]).with_env_vars(false);
        let config = loader.load_or_default(None).unwrap();
        assert!(config.client.endpoint.is_empty());
    }

    #[test]
    fn test_file_not_found() {
        let err = isolated().load("/nonexistent/ualink.yaml").unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_parse_error_names_file() {
        let file = temp_file(".json", "{ not json");
        let err = isolated().load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validation_runs_after_load() {
        let file = temp_file(".toml", "[client]\nendpoint = \"tcp://nope\"\n");
        let err = isolated().load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Client(_)));
    }
}
