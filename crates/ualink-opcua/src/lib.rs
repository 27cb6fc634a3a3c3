// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA binary client core.
//!
//! This crate speaks OPC UA over `opc.tcp` without security: it encodes
//! the built-in types, frames and chunks messages, opens and renews a
//! secure channel, manages a session, and offers read, write, browse and
//! subscription services on top.
//!
//! # Features
//!
//! - OPC UA binary codec for built-in types, Variants and DataValues
//! - Hello/Acknowledge handshake with negotiated buffer and chunk limits
//! - Secure channel (SecurityPolicy None) with token renewal
//! - Concurrent requests correlated by request id, with timeouts
//! - Session create/activate, keep-alive and re-activation
//! - Read, Write, Browse/BrowseNext and server status
//! - Subscriptions with a publish loop and data change filtering
//! - Automatic reconnection with configurable retry
//!
//! # Error Handling
//!
//! ```text
//! OpcUaError
//! ├── Connection    - Socket, handshake and channel failures
//! ├── Protocol      - Malformed or unexpected messages
//! ├── Session       - Session lifecycle errors
//! ├── Service       - ServiceFault and bad service results
//! ├── Operation     - Per-node read/write/browse failures
//! ├── Subscription  - Subscription and monitored item errors
//! ├── Conversion    - Value parsing and coercion errors
//! ├── Configuration - Invalid settings
//! └── Timeout       - Request and connect timeouts
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use ualink_opcua::{OpcUaClient, OpcUaConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = OpcUaClient::new(OpcUaConfig::new("opc.tcp://localhost:48010"));
//!     client.connect().await?;
//!
//!     let info = client.server_info().await?;
//!     println!("{} ({:?})", info.product(), info.state);
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod codec;
pub mod error;
pub mod messages;
pub mod status;
pub mod transport;
pub mod types;
pub mod value;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use error::{
    ConfigurationError, ConnectionError, ConversionError, ErrorCode, ErrorSeverity, OpcUaError,
    OpcUaResult, OperationError, ProtocolError, ServiceError, SessionError, SubscriptionError,
    TimeoutError,
};

pub use status::StatusCode;

pub use types::{
    AttributeId, BrowseDirection, ByteString, LocalizedText, MonitoredItemSettings,
    MonitoringMode, NodeClass, NodeId, NodeIdentifier, OpcUaConfig, OpcUaConfigBuilder,
    OpcUaDataType, QualifiedName, ServerState, SubscriptionSettings, UserIdentity,
};

pub use value::{DataValue, OpcUaValue};

pub use transport::TransportState;

pub use client::{
    BrowseOptions, BrowsePage, ChannelCallback, ClientStats, DataChange, DataConverter,
    MonitoredItem, NotificationFilter, OpcUaClient, ReadResult, RetryConfig, RetryStrategy,
    ServerInfo, SessionState, SubscriptionCallback, SubscriptionId, TypedValue, Watch,
    WriteResult,
};
