// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `watch` command.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use ualink_opcua::client::{DataChange, SubscriptionCallback, SubscriptionId, Watch};
use ualink_opcua::{NodeId, StatusCode};

use super::parse_node;
use crate::cli::WatchArgs;
use crate::config::WatchTarget;
use crate::error::{BinError, BinResult};
use crate::output::change_text;
use crate::runtime::Harness;

/// Executes the `watch` command on a connected harness.
pub async fn watch(harness: &Harness, args: WatchArgs) -> BinResult<()> {
    let targets = if args.nodes.is_empty() {
        harness.config().harness.watch.clone()
    } else {
        args.nodes
            .iter()
            .map(|node| WatchTarget::new(node.clone(), node.clone()))
            .collect()
    };

    let watch = start_watches(harness, &targets).await?;
    if watch.items.is_empty() {
        release_watch(harness, watch.subscription_id).await;
        return Err(BinError::runtime("no node could be watched"));
    }

    match args.duration {
        Some(duration) => {
            println!(
                "Watching for {} (Ctrl+C to stop)",
                humantime::format_duration(duration)
            );
            if harness.until_shutdown(tokio::time::sleep(duration)).await.is_some() {
                debug!("Watch duration elapsed");
            }
        }
        None => {
            println!("Watching until Ctrl+C");
            harness.shutdown().wait().await;
        }
    }

    harness.client().unsubscribe(watch.subscription_id).await?;
    Ok(())
}

/// Subscribes to `targets` with the configured settings and prints
/// a line per started or failed item.
pub(crate) async fn start_watches(harness: &Harness, targets: &[WatchTarget]) -> BinResult<Watch> {
    let mut nodes = Vec::with_capacity(targets.len());
    let mut names = HashMap::with_capacity(targets.len());
    for target in targets {
        let node = parse_node(&target.node)?;
        names.insert(node.clone(), target.name.clone());
        nodes.push(node);
    }

    let printer = Arc::new(ChangePrinter::new(names.clone()));
    let watch = harness.client().watch(&nodes, printer).await?;

    for item in &watch.items {
        let name = names.get(&item.node_id).map(String::as_str).unwrap_or("?");
        println!(
            "  ✓ Watching {} ({}) every {}",
            name,
            item.node_id,
            humantime::format_duration(item.revised_sampling_interval)
        );
    }
    for (node, error) in &watch.failures {
        let name = names.get(node).map(String::as_str).unwrap_or("?");
        println!("  ⚠ Could not watch {} ({}): {}", name, node, error);
    }
    Ok(watch)
}

/// Deletes a subscription that is no longer used. Failures are logged;
/// returns whether the subscription was deleted.
pub(crate) async fn release_watch(harness: &Harness, subscription_id: SubscriptionId) -> bool {
    match harness.client().unsubscribe(subscription_id).await {
        Ok(()) => true,
        Err(e) => {
            warn!(%subscription_id, error = %e, "Could not delete subscription");
            false
        }
    }
}

// =============================================================================
// ChangePrinter
// =============================================================================

/// Prints every delivered data change on its own line.
pub struct ChangePrinter {
    names: HashMap<NodeId, String>,
}

impl ChangePrinter {
    /// Creates a printer with display names per node.
    pub fn new(names: HashMap<NodeId, String>) -> Self {
        Self { names }
    }

    fn line(&self, change: &DataChange) -> String {
        let fallback = change.node_id.to_string();
        let name = self
            .names
            .get(&change.node_id)
            .map(String::as_str)
            .unwrap_or(&fallback);
        change_text(name, change)
    }
}

#[async_trait]
impl SubscriptionCallback for ChangePrinter {
    async fn on_data_change(&self, change: DataChange) {
        println!();
        println!("{}", self.line(&change));
    }

    async fn on_status_change(&self, subscription_id: SubscriptionId, status: StatusCode) {
        warn!(%subscription_id, %status, "Subscription status changed");
        println!("  ⚠ Subscription {} status: {}", subscription_id, status);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ualink_opcua::OpcUaValue;
    use ualink_opcua::client::TypedValue;

    fn change(node: NodeId) -> DataChange {
        DataChange {
            subscription_id: SubscriptionId(3),
            client_handle: 1,
            node_id: node,
            value: TypedValue::new(OpcUaValue::UInt32(12)),
            sequence_number: 9,
        }
    }

    #[tokio::test]
    async fn test_release_unknown_watch_is_logged() {
        let harness = Harness::new(crate::config::HarnessConfig::default());
        assert!(!release_watch(&harness, SubscriptionId(42)).await);
    }

    #[test]
    fn test_printer_uses_names() {
        let node = NodeId::string(3, "Demo.Static.Scalar.UInt32");
        let printer = ChangePrinter::new(HashMap::from([(node.clone(), "Static UInt32".to_string())]));

        assert!(printer.line(&change(node)).starts_with("• Static UInt32 changed: 12"));

        let other = NodeId::string(3, "Demo.Other");
        assert!(printer.line(&change(other)).starts_with("• ns=3;s=Demo.Other changed: 12"));
    }
}
