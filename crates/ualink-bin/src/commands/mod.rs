// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! CLI command implementations.
//!
//! - `run`: Full test scenario against the configured server
//! - `info`: Server status and build information
//! - `browse`: List the children of a node
//! - `read`: Read node values
//! - `write`: Write one value
//! - `watch`: Print data changes until interrupted
//! - `interactive`: Menu driven write mode
//! - `version`: Show version information
//!
//! Every command except `version` runs on a connected [`Harness`].

mod browse;
mod info;
mod interactive;
mod read;
mod run;
mod version;
mod watch;
mod write;

pub use browse::browse;
pub use info::info;
pub use interactive::{MenuChoice, WriteMenu, interactive};
pub use read::read;
pub use run::run;
pub use version::version;
pub use watch::{ChangePrinter, watch};
pub use write::write;

use ualink_opcua::NodeId;

use crate::cli::{Cli, Commands};
use crate::config::HarnessConfig;
use crate::error::{BinError, BinResult};
use crate::runtime::Harness;
use crate::shutdown::ShutdownCoordinator;

/// Executes the appropriate command based on CLI arguments.
pub async fn execute(cli: &Cli, config: HarnessConfig) -> BinResult<()> {
    let command = cli.effective_command();
    if let Commands::Version = command {
        return version::version(cli);
    }

    let shutdown = ShutdownCoordinator::new();
    let signals = shutdown.listen_for_signals();
    let harness = Harness::new(config).with_shutdown(shutdown);

    let result = match harness.connect().await {
        Ok(()) => {
            let result = dispatch(&harness, command).await;
            harness.close().await;
            result
        }
        Err(e) => Err(e),
    };

    signals.abort();
    result
}

async fn dispatch(harness: &Harness, command: Commands) -> BinResult<()> {
    match command {
        Commands::Run(args) => run::run(harness, args).await,
        Commands::Info(args) => info::info(harness, args).await,
        Commands::Browse(args) => browse::browse(harness, args).await,
        Commands::Read(args) => read::read(harness, args).await,
        Commands::Write(args) => write::write(harness, args).await,
        Commands::Watch(args) => watch::watch(harness, args).await,
        Commands::Interactive => interactive::interactive(harness).await,
        Commands::Version => Ok(()),
    }
}

/// Parses a node id given on the command line or in the configuration.
pub(crate) fn parse_node(text: &str) -> BinResult<NodeId> {
    text.trim()
        .parse()
        .map_err(|e| BinError::input(format!("invalid node id '{text}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_node() {
        assert_eq!(parse_node(" i=85 ").unwrap(), NodeId::numeric(0, 85));
        assert_eq!(
            parse_node("ns=3;s=Demo.Static.Scalar.UInt32").unwrap(),
            NodeId::string(3, "Demo.Static.Scalar.UInt32")
        );

        let err = parse_node("not a node").unwrap_err();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("not a node"));
    }
}
