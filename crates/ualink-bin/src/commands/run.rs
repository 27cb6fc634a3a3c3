// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `run` command.

use tracing::{info, warn};

use ualink_opcua::client::BrowseOptions;
use ualink_opcua::types::ids;
use ualink_opcua::NodeId;

use super::interactive::interactive;
use super::parse_node;
use super::watch::{release_watch, start_watches};
use crate::cli::RunArgs;
use crate::error::BinResult;
use crate::output::{read_text, reference_text, server_info_text};
use crate::runtime::Harness;

/// Standard server nodes read by the scenario.
const STANDARD_NODES: [(&str, u32); 3] = [
    ("Server State", ids::SERVER_SERVER_STATUS_STATE),
    ("Current Time", ids::SERVER_SERVER_STATUS_CURRENT_TIME),
    ("Build Info", ids::SERVER_SERVER_STATUS_BUILD_INFO),
];

/// Executes the `run` command: the full scenario on a connected harness.
pub async fn run(harness: &Harness, args: RunArgs) -> BinResult<()> {
    let client = harness.client();
    let settings = &harness.config().harness;
    info!("Starting test scenario");

    section("Connection");
    println!("  Endpoint:      {}", client.config().endpoint);
    match client.session_id() {
        Some(id) => println!("  Session:       {}", id),
        None => println!("  Session:       -"),
    }

    section("Server");
    match client.server_info().await {
        Ok(server) => println!("{}", server_info_text(&server)),
        Err(e) => {
            e.log("server info");
            println!("  ✗ Server information unavailable: {}", e);
        }
    }

    let root = parse_node(&settings.browse_root)?;
    section(&format!("Browse {}", root));
    let options = BrowseOptions::objects_and_variables()
        .with_reference_type(NodeId::numeric(0, ids::HIERARCHICAL_REFERENCES))
        .with_include_subtypes(true);
    match client.browse_all(&root, &options).await {
        Ok(references) if references.is_empty() => println!("  (no references)"),
        Ok(references) => {
            for reference in &references {
                println!("{}", reference_text(reference));
            }
            println!("  {} reference(s)", references.len());
        }
        Err(e) => {
            e.log("browse");
            println!("  ✗ Browse failed: {}", e);
        }
    }

    section("Standard nodes");
    let standard: Vec<NodeId> = STANDARD_NODES
        .iter()
        .map(|(_, id)| NodeId::numeric(0, *id))
        .collect();
    let labels: Vec<String> = STANDARD_NODES.iter().map(|(label, _)| label.to_string()).collect();
    read_and_print(harness, &labels, &standard).await;

    if !settings.test_nodes.is_empty() {
        section("Test nodes");
        let nodes = settings
            .test_nodes
            .iter()
            .map(|node| parse_node(node))
            .collect::<BinResult<Vec<_>>>()?;
        read_and_print(harness, &settings.test_nodes, &nodes).await;
    }

    let watch = if args.no_watch || settings.watch.is_empty() {
        None
    } else {
        section("Watches");
        match start_watches(harness, &settings.watch).await {
            Ok(watch) => Some(watch),
            Err(e) => {
                warn!(error = %e, "Could not start watches");
                println!("  ✗ Watches not started: {}", e);
                None
            }
        }
    };

    if !args.no_interactive {
        println!();
        interactive(harness).await?;
    } else if watch.is_some() {
        println!();
        println!("Watching until Ctrl+C");
        harness.shutdown().wait().await;
    }

    if let Some(watch) = watch {
        release_watch(harness, watch.subscription_id).await;
    }

    info!("Test scenario finished");
    Ok(())
}

async fn read_and_print(harness: &Harness, labels: &[String], nodes: &[NodeId]) {
    match harness.client().read_values(nodes).await {
        Ok(results) => {
            for (label, result) in labels.iter().zip(&results) {
                println!("{}", read_text(label, result));
            }
        }
        Err(e) => {
            e.log("read");
            println!("  ✗ Read failed: {}", e);
        }
    }
}

fn section(title: &str) {
    println!();
    println!("{}", title);
    println!("{}", "-".repeat(title.chars().count()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_nodes() {
        let ids: Vec<u32> = STANDARD_NODES.iter().map(|(_, id)| *id).collect();
        assert_eq!(ids, [2259, 2258, 2260]);
    }
}
