// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client.
//!
//! - **Dispatcher**: owns the secure channel, correlates responses by
//!   request id and renews the channel token
//! - **Session Management**: create, activate, keep alive, re-activate
//! - **Node Service**: read, write, browse and server information
//! - **Subscriptions**: publish loop, acknowledgements and data change
//!   filtering
//! - **Client Wrapper**: high-level API with retry and reconnection
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        OpcUaClient                              │
//! │          (read/write/browse/watch, reconnect supervisor)        │
//! └─────────────────────────────────────────────────────────────────┘
//!            │                    │                    │
//!            ▼                    ▼                    ▼
//! ┌──────────────────┐ ┌──────────────────┐ ┌──────────────────────┐
//! │   NodeService    │ │ SessionManager   │ │ SubscriptionManager  │
//! │ (attribute/view) │ │ (session life)   │ │ (publish loop,       │
//! │                  │ │                  │ │  NotificationFilter) │
//! └──────────────────┘ └──────────────────┘ └──────────────────────┘
//!            │                    │                    │
//!            └────────────────────┼────────────────────┘
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    RequestDispatcher                            │
//! │        (request ids, pending table, timeouts, OPN renew)        │
//! └─────────────────────────────────────────────────────────────────┘
//!                                 │
//!                                 ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  transport (TCP, chunks)                        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ualink_opcua::client::{ChannelCallback, OpcUaClient};
//! use ualink_opcua::types::OpcUaConfig;
//!
//! let client = OpcUaClient::new(OpcUaConfig::new("opc.tcp://localhost:48010"));
//! client.connect().await?;
//!
//! let (callback, mut changes) = ChannelCallback::with_channel(64);
//! let nodes = ["ns=3;s=Demo.Dynamic.Scalar.UInt32".parse()?];
//! client.watch(&nodes, Arc::new(callback)).await?;
//!
//! while let Some(change) = changes.recv().await {
//!     println!("{} = {}", change.node_id, change.value);
//! }
//! ```

mod conversion;
mod dispatcher;
mod filter;
mod node;
mod session;
pub mod subscription;
mod wrapper;

pub use conversion::{DataConverter, Quality, TypedValue, parse_bool, parse_typed, parse_value};
pub use dispatcher::{DispatcherStats, RequestDispatcher};
pub use filter::{DEFAULT_ECHO_WINDOW, FilterDecision, NotificationFilter};
pub use node::{BrowseOptions, BrowsePage, NodeService, ReadResult, ServerInfo, WriteResult};
pub use session::{
    CLIENT_NONCE_LENGTH, Reactivation, SessionInfo, SessionManager, SessionState, SessionStats,
};
pub use subscription::{
    ChannelCallback, DataChange, MonitoredItem, SubscriptionCallback, SubscriptionId,
    SubscriptionInfo, SubscriptionManager, SubscriptionState, SubscriptionStats,
};
pub use wrapper::{ClientStats, OpcUaClient, RetryConfig, RetryStrategy, Watch};
