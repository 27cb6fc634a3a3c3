// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Error types for the ualink binary.

use thiserror::Error;

use ualink_opcua::OpcUaError;

use crate::config::ConfigError;

/// Result type alias for ualink-bin operations.
pub type BinResult<T> = Result<T, BinError>;

/// Errors that can occur in the ualink binary.
#[derive(Debug, Error)]
pub enum BinError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Config file loading error.
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Connection could not be established.
    #[error("Connection failed: {0}")]
    Connection(#[source] OpcUaError),

    /// Client error after the connection was established.
    #[error("Client error: {0}")]
    Client(#[from] OpcUaError),

    /// Invalid command line input.
    #[error("Invalid input: {0}")]
    Input(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Runtime error.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        /// The context description.
        context: String,
        /// The underlying error.
        #[source]
        source: Box<BinError>,
    },
}

impl BinError {
    /// Creates a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Creates an input error.
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    /// Creates a runtime error.
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    /// Creates an I/O error.
    pub fn io(msg: impl Into<String>) -> Self {
        Self::Io(msg.into())
    }

    /// Adds context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Returns the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) | Self::Config(_) => 1,
            Self::Connection(_) => 2,
            Self::Client(_) => 3,
            Self::Input(_) => 4,
            Self::Io(_) => 5,
            Self::Runtime(_) => 6,
            Self::WithContext { source, .. } => source.exit_code(),
        }
    }

    /// Recovery hints from the underlying client error, if any.
    pub fn hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(e) | Self::Client(e) => e.recovery_hints(),
            Self::WithContext { source, .. } => source.hints(),
            _ => Vec::new(),
        }
    }
}

impl From<std::io::Error> for BinError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BinError {
    fn from(err: serde_json::Error) -> Self {
        Self::Runtime(format!("JSON output: {err}"))
    }
}

impl From<anyhow::Error> for BinError {
    fn from(err: anyhow::Error) -> Self {
        Self::Runtime(format!("{err:#}"))
    }
}

// =============================================================================
// Error Reporting
// =============================================================================

/// Reports an error with its cause chain and hints.
pub fn report_error(error: &BinError) {
    eprintln!("Error: {}", error);

    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        eprintln!("  Caused by: {}", cause);
        source = cause.source();
    }

    let hints = error.hints();
    if !hints.is_empty() {
        eprintln!();
        eprintln!("Hints:");
        for hint in hints {
            eprintln!("  - {}", hint);
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
    fn test_error_creation() {
        let err = BinError::config("missing endpoint");
        assert_eq!(err.to_string(), "Configuration error: missing endpoint");
    }

    #[test]
    fn test_error_with_context() {
        let err = BinError::input("bad node id").with_context("read");
        assert_eq!(err.to_string(), "read: Invalid input: bad node id");
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(BinError::config("x").exit_code(), 1);
        assert_eq!(BinError::Connection(OpcUaError::not_connected()).exit_code(), 2);
        assert_eq!(BinError::from(OpcUaError::not_connected()).exit_code(), 3);
        assert_eq!(BinError::io("x").exit_code(), 5);
        assert_eq!(BinError::runtime("x").exit_code(), 6);
    }

    #[test]
    fn test_client_errors_carry_hints() {
        let err = BinError::Connection(OpcUaError::not_connected()).with_context("read");
        assert!(!err.hints().is_empty());
        assert!(BinError::input("x").hints().is_empty());
    }

    #[test]
    fn test_anyhow_keeps_chain() {
        let err = anyhow::anyhow!("inner").context("outer");
        assert_eq!(BinError::from(err).to_string(), "Runtime error: outer: inner");
    }
}
