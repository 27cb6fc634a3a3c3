// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Data change notification filter.
//!
//! Servers send the current value as the first notification of a new
//! monitored item and echo back values the client has just written.
//! [`NotificationFilter`] decides which data changes are worth reporting:
//!
//! 1. the first notification per node is skipped (the node is "primed"),
//! 2. a value equal to one this client wrote within the echo window is
//!    suppressed,
//! 3. a value equal to the last reported value is suppressed.
//!
//! Only delivered values update the last reported value; the primed
//! snapshot is never compared against.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::trace;

use crate::types::NodeId;
use crate::value::OpcUaValue;

/// Window in which an echo of our own write is suppressed.
pub const DEFAULT_ECHO_WINDOW: Duration = Duration::from_millis(800);

/// Outcome of [`NotificationFilter::check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// Report the value.
    Deliver,
    /// First value for the node.
    Primed,
    /// Echo of a recent write by this client.
    OwnWrite,
    /// Same as the last reported value.
    Unchanged,
}

impl FilterDecision {
    /// Returns `true` if the value should be reported.
    #[inline]
    pub fn is_deliver(&self) -> bool {
        matches!(self, Self::Deliver)
    }
}

#[derive(Debug, Default)]
struct NodeFilterState {
    primed: bool,
    last_notified: Option<OpcUaValue>,
    last_write: Option<(OpcUaValue, Instant)>,
}

/// Per-node notification filter.
#[derive(Debug)]
pub struct NotificationFilter {
    echo_window: Duration,
    nodes: Mutex<HashMap<NodeId, NodeFilterState>>,
}

impl Default for NotificationFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationFilter {
    /// Creates a filter with the default echo window.
    pub fn new() -> Self {
        Self::with_echo_window(DEFAULT_ECHO_WINDOW)
    }

    /// Creates a filter with a custom echo window.
    pub fn with_echo_window(echo_window: Duration) -> Self {
        Self {
            echo_window,
            nodes: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the echo window.
    pub fn echo_window(&self) -> Duration {
        self.echo_window
    }

    /// Remembers a value this client wrote to `node_id`.
    pub fn record_write(&self, node_id: &NodeId, value: OpcUaValue) {
        let mut nodes = self.nodes.lock();
        nodes.entry(node_id.clone()).or_default().last_write = Some((value, Instant::now()));
    }

    /// Drops a remembered write, e.g. after the server rejected it.
    pub fn forget_write(&self, node_id: &NodeId) {
        if let Some(state) = self.nodes.lock().get_mut(node_id) {
            state.last_write = None;
        }
    }

    /// Classifies a data change and updates the filter state.
    pub fn check(&self, node_id: &NodeId, value: &OpcUaValue) -> FilterDecision {
        let now = Instant::now();
        let mut nodes = self.nodes.lock();
        let state = nodes.entry(node_id.clone()).or_default();

        let decision = if !state.primed {
            state.primed = true;
            FilterDecision::Primed
        } else if state.last_write.as_ref().is_some_and(|(written, at)| {
            written == value && now.duration_since(*at) <= self.echo_window
        }) {
            FilterDecision::OwnWrite
        } else if state.last_notified.as_ref() == Some(value) {
            FilterDecision::Unchanged
        } else {
            state.last_notified = Some(value.clone());
            FilterDecision::Deliver
        };

        trace!(node_id = %node_id, ?decision, "Notification filtered");
        decision
    }

    /// Returns `true` if the data change should be reported.
    pub fn should_deliver(&self, node_id: &NodeId, value: &OpcUaValue) -> bool {
        self.check(node_id, value).is_deliver()
    }

    /// Forgets a node, so its next notification primes it again.
    pub fn reset(&self, node_id: &NodeId) {
        self.nodes.lock().remove(node_id);
    }

    /// Forgets every node.
    pub fn clear(&self) {
        self.nodes.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> NodeId {
        NodeId::string(3, "Demo.Dynamic.Scalar.UInt32")
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_value_primes() {
        let filter = NotificationFilter::new();
        assert_eq!(filter.check(&node(), &OpcUaValue::UInt32(1)), FilterDecision::Primed);
        assert_eq!(filter.check(&node(), &OpcUaValue::UInt32(1)), FilterDecision::Deliver);
        assert_eq!(filter.check(&node(), &OpcUaValue::UInt32(1)), FilterDecision::Unchanged);
        assert!(filter.should_deliver(&node(), &OpcUaValue::UInt32(2)));
        assert!(!filter.should_deliver(&node(), &OpcUaValue::UInt32(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_change_back_to_primed_value_is_delivered() {
        let filter = NotificationFilter::new();
        assert_eq!(filter.check(&node(), &OpcUaValue::Boolean(false)), FilterDecision::Primed);
        assert_eq!(filter.check(&node(), &OpcUaValue::Boolean(false)), FilterDecision::Deliver);
        assert_eq!(filter.check(&node(), &OpcUaValue::Boolean(true)), FilterDecision::Deliver);
        assert_eq!(filter.check(&node(), &OpcUaValue::Boolean(false)), FilterDecision::Deliver);
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_write_suppressed_within_window() {
        let filter = NotificationFilter::new();
        filter.check(&node(), &OpcUaValue::UInt32(0));

        filter.record_write(&node(), OpcUaValue::UInt32(7));
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(filter.check(&node(), &OpcUaValue::UInt32(7)), FilterDecision::OwnWrite);

        // A different value is still reported.
        assert!(filter.should_deliver(&node(), &OpcUaValue::UInt32(8)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_write_delivered_after_window() {
        let filter = NotificationFilter::new();
        filter.check(&node(), &OpcUaValue::Boolean(false));

        filter.record_write(&node(), OpcUaValue::Boolean(true));
        tokio::time::advance(Duration::from_millis(801)).await;
        assert!(filter.should_deliver(&node(), &OpcUaValue::Boolean(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forgotten_write_is_delivered() {
        let filter = NotificationFilter::new();
        filter.check(&node(), &OpcUaValue::UInt32(0));
        filter.record_write(&node(), OpcUaValue::UInt32(3));
        filter.forget_write(&node());
        assert!(filter.should_deliver(&node(), &OpcUaValue::UInt32(3)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_primes_again() {
        let filter = NotificationFilter::new();
        filter.check(&node(), &OpcUaValue::UInt32(1));
        filter.reset(&node());
        assert_eq!(filter.check(&node(), &OpcUaValue::UInt32(5)), FilterDecision::Primed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nodes_are_independent() {
        let filter = NotificationFilter::new();
        let other = NodeId::string(3, "Demo.Static.Scalar.Boolean");
        filter.check(&node(), &OpcUaValue::UInt32(1));
        assert_eq!(filter.check(&other, &OpcUaValue::Boolean(true)), FilterDecision::Primed);
        assert!(filter.should_deliver(&node(), &OpcUaValue::UInt32(2)));
    }
}
