// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # ualink-bin
//!
//! Console harness for the ualink OPC UA client core.
//!
//! This crate provides the `ualink` binary, including:
//!
//! - CLI argument parsing with clap
//! - Configuration loading (YAML, TOML, JSON) with environment overrides
//! - Logging initialization
//! - Graceful shutdown on Ctrl+C and SIGTERM
//! - Command implementations (run, info, browse, read, write, watch, ...)
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         main.rs                              │
//! │                    (Entry Point)                             │
//! └─────────────────────────┬───────────────────────────────────┘
//!                           │
//!                    ┌──────▼──────┐
//!                    │    cli.rs   │
//!                    │ (Argument   │
//!                    │  Parsing)   │
//!                    └──────┬──────┘
//!                           │
//!               ┌───────────┼───────────┐
//!               ▼           ▼           ▼
//!        ┌──────────┐ ┌──────────┐ ┌──────────┐
//!        │ commands │ │  config  │ │ logging  │
//!        │          │ │          │ │          │
//!        └────┬─────┘ └──────────┘ └──────────┘
//!             │
//!      ┌──────▼──────┐     ┌─────────────┐
//!      │   runtime   │────▶│  shutdown   │
//!      │  (Harness)  │     │ (Graceful)  │
//!      └──────┬──────┘     └─────────────┘
//!             │
//!      ┌──────▼──────┐
//!      │ualink-opcua │
//!      │  (client)   │
//!      └─────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Full scenario against the default endpoint
//! ualink
//!
//! # Another server, configuration from a file
//! ualink -e opc.tcp://plc:4840 -c ualink.yaml
//!
//! # Single operations
//! ualink read "ns=3;s=Demo.Static.Scalar.UInt32" i=2259
//! ualink write "ns=3;s=Demo.Static.Scalar.UInt32" 42 --type uint32
//! ualink browse i=85 --format json
//! ualink watch "ns=3;s=Demo.Dynamic.Scalar.UInt32" -d 30s
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

// =============================================================================
// Modules
// =============================================================================

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod logging;
pub mod output;
pub mod runtime;
pub mod shutdown;

// =============================================================================
// Re-exports
// =============================================================================

use std::time::Duration;

pub use cli::{Cli, Commands};
pub use config::{ConfigLoader, HarnessConfig};
pub use error::{BinError, BinResult, report_error};
pub use logging::init_logging;
pub use runtime::Harness;
pub use shutdown::ShutdownCoordinator;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Longest wait for leftover tasks, such as a stdin reader blocked in
/// interactive mode, once the command has finished.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// Runs the command on a new runtime and returns the process exit code.
///
/// Errors are reported on stderr. Blocking tasks still running when the
/// command ends do not hold the process open.
pub fn run_to_exit_code(cli: Cli) -> i32 {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            let error = BinError::io(format!("cannot start the async runtime: {e}"));
            report_error(&error);
            return error.exit_code();
        }
    };

    let result = runtime.block_on(run(cli));
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    match result {
        Ok(()) => 0,
        Err(e) => {
            report_error(&e);
            e.exit_code()
        }
    }
}

/// Loads the configuration, initializes logging and executes the command.
pub async fn run(cli: Cli) -> BinResult<()> {
    if let Some(Commands::Version) = cli.command {
        return commands::version(&cli);
    }

    let config = load(&cli)?;
    init_logging(
        cli.effective_log_level(&config.logging.level),
        cli.effective_log_format(config.logging.format),
    );
    tracing::debug!(endpoint = %config.client.endpoint, "Configuration loaded");

    commands::execute(&cli, config).await
}

/// Configuration from the file given on the command line, or the defaults,
/// with the `--endpoint` override applied.
fn load(cli: &Cli) -> BinResult<HarnessConfig> {
    let mut config = ConfigLoader::new().load_or_default(cli.config.as_deref())?;
    if let Some(endpoint) = &cli.endpoint {
        config = config.with_endpoint(endpoint.clone());
        config.validate()?;
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_exit_code_success() {
        let cli = Cli::parse_from(["ualink", "version"]);
        assert_eq!(run_to_exit_code(cli), 0);
    }

    #[test]
    fn test_exit_code_from_error() {
        let cli = Cli::parse_from(["ualink", "-c", "/nonexistent/ualink.yaml", "info"]);
        assert_eq!(run_to_exit_code(cli), 1);
    }

    #[test]
    fn test_endpoint_override() {
        let cli = Cli::parse_from(["ualink", "-e", "opc.tcp://plc:4840", "info"]);
        let config = load(&cli).unwrap();
        assert_eq!(config.client.endpoint, "opc.tcp://plc:4840");
    }

    #[test]
    fn test_invalid_endpoint_override() {
        let cli = Cli::parse_from(["ualink", "-e", "http://plc", "info"]);
        let err = load(&cli).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_missing_config_file() {
        let cli = Cli::parse_from(["ualink", "-c", "/nonexistent/ualink.yaml", "info"]);
        assert!(matches!(load(&cli), Err(BinError::Config(_))));
    }
}
