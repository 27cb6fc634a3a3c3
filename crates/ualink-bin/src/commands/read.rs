// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `read` command.

use serde_json::Value;

use super::parse_node;
use crate::cli::{OutputFormat, ReadArgs};
use crate::error::{BinError, BinResult};
use crate::output::{read_json, read_text};
use crate::runtime::Harness;

/// Executes the `read` command.
///
/// All nodes go out in one request. The command fails when any of them
/// comes back with a bad status, after printing every result.
pub async fn read(harness: &Harness, args: ReadArgs) -> BinResult<()> {
    let nodes = args
        .nodes
        .iter()
        .map(|node| parse_node(node))
        .collect::<BinResult<Vec<_>>>()?;

    let results = harness.client().read_values(&nodes).await?;

    match args.format {
        OutputFormat::Text => {
            for (label, result) in args.nodes.iter().zip(&results) {
                println!("{}", read_text(label.trim(), result));
            }
        }
        OutputFormat::Json => {
            let items: Vec<Value> = results.iter().map(read_json).collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    let failed = results.iter().filter(|r| !r.is_good()).count();
    if failed > 0 {
        return Err(BinError::runtime(format!(
            "{} of {} read(s) failed",
            failed,
            results.len()
        )));
    }
    Ok(())
}
