// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `write` command.

use tracing::info;

use super::parse_node;
use crate::cli::WriteArgs;
use crate::error::{BinError, BinResult};
use crate::runtime::Harness;

/// Executes the `write` command.
pub async fn write(harness: &Harness, args: WriteArgs) -> BinResult<()> {
    let node = parse_node(&args.node)?;

    let result = harness
        .client()
        .write_typed(&node, &args.value, &args.data_type)
        .await
        .map_err(|e| BinError::from(e).with_context(format!("writing {}", node)))?;
    result.check()?;

    info!(node_id = %node, value = %args.value, data_type = %args.data_type, "Value written");
    println!("  ✓ {} = {} ({}) written", node, args.value, args.data_type);
    Ok(())
}
