// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! ualink - OPC UA client test harness
//!
//! Main binary entry point.

use std::process::ExitCode;

use ualink_bin::Cli;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    let code = ualink_bin::run_to_exit_code(cli);
    ExitCode::from(u8::try_from(code).unwrap_or(1))
}
