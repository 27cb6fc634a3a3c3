// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::config::DEFAULT_ENDPOINT;
use crate::error::BinResult;

/// Executes the `version` command to display version information.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("ualink - OPC UA client test harness");
    println!();
    println!("Version Information:");
    println!("  ualink-bin:    {}", env!("CARGO_PKG_VERSION"));
    println!("  ualink-opcua:  {}", ualink_opcua::VERSION);
    println!();
    println!("Protocol:");
    println!("  Transport:        opc.tcp (UA Binary)");
    println!("  Security policy:  None");
    println!("  Default endpoint: {}", DEFAULT_ENDPOINT);
    println!();
    println!("Build Information:");
    println!("  Rust Edition: 2024");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
