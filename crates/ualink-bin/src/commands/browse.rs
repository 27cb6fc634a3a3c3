// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `browse` command.

use serde_json::Value;

use ualink_opcua::client::BrowseOptions;

use super::parse_node;
use crate::cli::{BrowseArgs, OutputFormat};
use crate::error::BinResult;
use crate::output::{reference_json, reference_text};
use crate::runtime::Harness;

/// Executes the `browse` command.
pub async fn browse(harness: &Harness, args: BrowseArgs) -> BinResult<()> {
    let node = parse_node(&args.node)?;
    let options = browse_options(args.all_classes);
    let references = harness.client().browse_all(&node, &options).await?;

    match args.format {
        OutputFormat::Text => {
            println!("{} ({} reference(s))", node, references.len());
            for reference in &references {
                println!("{}", reference_text(reference));
            }
        }
        OutputFormat::Json => {
            let items: Vec<Value> = references.iter().map(reference_json).collect();
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }
    Ok(())
}

fn browse_options(all_classes: bool) -> BrowseOptions {
    if all_classes {
        BrowseOptions::default()
    } else {
        BrowseOptions::objects_and_variables()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browse_options() {
        assert_eq!(browse_options(true).node_class_mask(), 0);
        // Object (1) | Variable (2)
        assert_eq!(browse_options(false).node_class_mask(), 3);
    }
}
