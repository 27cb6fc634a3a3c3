// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `info` command.

use crate::cli::{OutputArgs, OutputFormat};
use crate::error::BinResult;
use crate::output::{server_info_json, server_info_text};
use crate::runtime::Harness;

/// Executes the `info` command to display server status and build information.
pub async fn info(harness: &Harness, args: OutputArgs) -> BinResult<()> {
    let server = harness.client().server_info().await?;

    match args.format {
        OutputFormat::Text => {
            println!("Server at {}", harness.client().config().endpoint);
            println!("{}", server_info_text(&server));
        }
        OutputFormat::Json => {
            let mut value = server_info_json(&server);
            value["endpoint"] = harness.client().config().endpoint.clone().into();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(())
}
