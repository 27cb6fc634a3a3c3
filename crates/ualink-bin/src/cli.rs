// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI argument parsing and command definitions.
//!
//! - `run`: Full test scenario (default)
//! - `info`: Server status and build information
//! - `browse`: List the children of a node
//! - `read`: Read node values
//! - `write`: Write one value
//! - `watch`: Print data changes until interrupted
//! - `interactive`: Menu driven write mode
//! - `version`: Show version information

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

// =============================================================================
// Main CLI Structure
// =============================================================================

/// ualink - OPC UA client test harness
///
/// Connects to an OPC UA server over opc.tcp, reads and writes nodes,
/// browses the address space and watches values for changes.
#[derive(Parser, Debug)]
#[command(
    name = "ualink",
    author = "Sylvex <contact@sylvex.io>",
    version = ualink_opcua::VERSION,
    about = "OPC UA client test harness",
    long_about = None,
    propagate_version = true
)]
pub struct Cli {
    /// Configuration file path (yaml, toml or json)
    #[arg(short, long, env = "UALINK_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Server endpoint, overrides the configuration file
    #[arg(short, long, env = "UALINK_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "UALINK_LOG_LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Log format (text, json, compact)
    #[arg(long, env = "UALINK_LOG_FORMAT", global = true)]
    pub log_format: Option<LogFormat>,

    /// Enable quiet mode (warnings and errors only)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

// =============================================================================
// Subcommands
// =============================================================================

/// Available subcommands for the ualink CLI.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run the full test scenario
    ///
    /// Connects, prints server information, browses the Objects folder,
    /// reads the standard and configured test nodes, starts the configured
    /// watches and enters the interactive write mode.
    /// This is the default command when no subcommand is specified.
    Run(RunArgs),

    /// Show server status and build information
    Info(OutputArgs),

    /// Browse the children of a node
    Browse(BrowseArgs),

    /// Read the Value attribute of one or more nodes
    Read(ReadArgs),

    /// Write a value to a node
    Write(WriteArgs),

    /// Watch nodes and print data changes until interrupted
    Watch(WatchArgs),

    /// Menu driven write mode over the configured write targets
    Interactive,

    /// Show version information
    Version,
}

// =============================================================================
// Command Arguments
// =============================================================================

/// Arguments for the `run` command.
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Skip the interactive write mode
    #[arg(long)]
    pub no_interactive: bool,

    /// Do not start the configured watches
    #[arg(long)]
    pub no_watch: bool,
}

/// Output selection shared by read style commands.
#[derive(Args, Debug, Default, Clone)]
pub struct OutputArgs {
    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `browse` command.
#[derive(Args, Debug, Clone)]
pub struct BrowseArgs {
    /// Node to browse
    #[arg(default_value = "i=85")]
    pub node: String,

    /// Include every node class instead of objects and variables
    #[arg(long)]
    pub all_classes: bool,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `read` command.
#[derive(Args, Debug, Clone)]
pub struct ReadArgs {
    /// Nodes to read, e.g. "ns=3;s=Demo.Static.Scalar.UInt32"
    #[arg(required = true)]
    pub nodes: Vec<String>,

    /// Output format
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Arguments for the `write` command.
#[derive(Args, Debug, Clone)]
pub struct WriteArgs {
    /// Node to write
    pub node: String,

    /// Value in text form
    pub value: String,

    /// Data type of the value (boolean, uint32, int32, float, double, string, ...)
    #[arg(short = 't', long = "type", default_value = "string")]
    pub data_type: String,
}

/// Arguments for the `watch` command.
#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Nodes to watch, defaults to the configured watch list
    pub nodes: Vec<String>,

    /// Stop after this long (e.g. "30s"), otherwise run until Ctrl+C
    #[arg(short, long, value_parser = humantime::parse_duration)]
    pub duration: Option<Duration>,
}

// =============================================================================
// Enums
// =============================================================================

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for structured logging
    Json,
    /// Compact format for minimal output
    Compact,
}

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format
    #[default]
    Text,
    /// JSON format for programmatic parsing
    Json,
}

// =============================================================================
// Helper Methods
// =============================================================================

impl Cli {
    /// Parse CLI arguments from the command line.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the effective command, defaulting to `Run` if none specified.
    pub fn effective_command(&self) -> Commands {
        self.command
            .clone()
            .unwrap_or_else(|| Commands::Run(RunArgs::default()))
    }

    /// Get the effective log level based on flags, falling back to the
    /// level from the configuration file.
    pub fn effective_log_level<'a>(&'a self, configured: &'a str) -> &'a str {
        if self.quiet {
            "warn"
        } else if self.verbose {
            "debug"
        } else {
            self.log_level.as_deref().unwrap_or(configured)
        }
    }

    /// Get the effective log format, falling back to the configured one.
    pub fn effective_log_format(&self, configured: LogFormat) -> LogFormat {
        self.log_format.unwrap_or(configured)
    }
}

impl Default for BrowseArgs {
    fn default() -> Self {
        Self {
            node: "i=85".to_string(),
            all_classes: false,
            format: OutputFormat::Text,
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
    fn test_default_command() {
        let cli = Cli::parse_from(["ualink"]);
        assert!(cli.command.is_none());
        assert!(matches!(cli.effective_command(), Commands::Run(_)));
    }

    #[test]
    fn test_run_flags() {
        let cli = Cli::parse_from(["ualink", "run", "--no-interactive"]);
        match cli.command {
            Some(Commands::Run(args)) => {
                assert!(args.no_interactive);
                assert!(!args.no_watch);
            }
            other => panic!("expected Run, got {other:?}"),
        }
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::parse_from([
            "ualink",
            "info",
            "-e",
            "opc.tcp://plc:4840",
            "-c",
            "/etc/ualink.yaml",
        ]);
        assert_eq!(cli.endpoint.as_deref(), Some("opc.tcp://plc:4840"));
        assert_eq!(cli.config, Some(PathBuf::from("/etc/ualink.yaml")));
    }

    #[test]
    fn test_browse_defaults_to_objects_folder() {
        let cli = Cli::parse_from(["ualink", "browse"]);
        match cli.command {
            Some(Commands::Browse(args)) => {
                assert_eq!(args.node, "i=85");
                assert!(!args.all_classes);
            }
            other => panic!("expected Browse, got {other:?}"),
        }
    }

    #[test]
    fn test_read_requires_nodes() {
        assert!(Cli::try_parse_from(["ualink", "read"]).is_err());

        let cli = Cli::parse_from(["ualink", "read", "i=2259", "i=2258", "-f", "json"]);
        match cli.command {
            Some(Commands::Read(args)) => {
                assert_eq!(args.nodes, ["i=2259", "i=2258"]);
                assert_eq!(args.format, OutputFormat::Json);
            }
            other => panic!("expected Read, got {other:?}"),
        }
    }

    #[test]
    fn test_write_command() {
        let cli = Cli::parse_from([
            "ualink",
            "write",
            "ns=3;s=Demo.Static.Scalar.UInt32",
            "42",
            "--type",
            "uint32",
        ]);
        match cli.command {
            Some(Commands::Write(args)) => {
                assert_eq!(args.node, "ns=3;s=Demo.Static.Scalar.UInt32");
                assert_eq!(args.value, "42");
                assert_eq!(args.data_type, "uint32");
            }
            other => panic!("expected Write, got {other:?}"),
        }
    }

    #[test]
    fn test_watch_duration() {
        let cli = Cli::parse_from(["ualink", "watch", "i=2258", "-d", "1m 30s"]);
        match cli.command {
            Some(Commands::Watch(args)) => {
                assert_eq!(args.duration, Some(Duration::from_secs(90)));
            }
            other => panic!("expected Watch, got {other:?}"),
        }
    }

    #[test]
    fn test_effective_log_level() {
        let cli = Cli::parse_from(["ualink"]);
        assert_eq!(cli.effective_log_level("info"), "info");

        let cli = Cli::parse_from(["ualink", "-l", "trace"]);
        assert_eq!(cli.effective_log_level("info"), "trace");

        let cli = Cli::parse_from(["ualink", "-q", "-l", "trace"]);
        assert_eq!(cli.effective_log_level("info"), "warn");

        let cli = Cli::parse_from(["ualink", "-v"]);
        assert_eq!(cli.effective_log_level("info"), "debug");
    }

    #[test]
    fn test_effective_log_format() {
        let cli = Cli::parse_from(["ualink"]);
        assert_eq!(cli.effective_log_format(LogFormat::Json), LogFormat::Json);

        let cli = Cli::parse_from(["ualink", "--log-format", "compact"]);
        assert_eq!(cli.effective_log_format(LogFormat::Json), LogFormat::Compact);
    }
}
