// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA TCP transport and secure channel layer.
//!
//! # Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  tcp        connect, Hello/Acknowledge, OpenSecureChannel       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  chunk      Chunker (outgoing) / Reassembler (incoming)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  frame      8-byte headers, HEL/ACK/ERR bodies                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only SecurityPolicy `None` is implemented: chunks carry no signature
//! or padding.

pub mod chunk;
pub mod frame;
pub mod tcp;

pub use chunk::{Chunker, Incoming, Reassembler, SecureMessage};
pub use frame::{
    AcknowledgeMessage, ChunkType, ErrorMessage, FrameHeader, HelloMessage, MessageType, RawFrame,
};
pub use tcp::{ChannelReader, ChannelWriter, Connection, connect};

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{ConnectionError, OpcUaResult};
use crate::messages::ChannelSecurityToken;
use crate::status::StatusCode;
use crate::types::ClientLimits;

/// Security policy URI of the `None` policy.
pub const SECURITY_POLICY_NONE_URI: &str = "http://opcfoundation.org/UA/SecurityPolicy#None";

/// Transport protocol version.
pub const PROTOCOL_VERSION: u32 = 0;

// =============================================================================
// TransportState
// =============================================================================

/// Connection state of the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportState {
    /// Transport is not connected.
    #[default]
    Disconnected,

    /// Transport is establishing connection.
    Connecting,

    /// Transport is connected and ready.
    Connected,

    /// Transport is reconnecting after a failure.
    Reconnecting,

    /// Transport connection has failed.
    Failed,
}

impl TransportState {
    /// Returns `true` if the transport is connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Returns `true` if the transport is in a transitional state.
    #[inline]
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Reconnecting)
    }

    /// Returns `true` if the transport has failed.
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

// =============================================================================
// TransportLimits
// =============================================================================

/// Buffer and message limits exchanged in Hello/Acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportLimits {
    /// Protocol version.
    pub protocol_version: u32,
    /// Largest chunk this side receives.
    pub receive_buffer_size: u32,
    /// Largest chunk this side sends.
    pub send_buffer_size: u32,
    /// Largest message this side receives (0 = unlimited).
    pub max_message_size: u32,
    /// Most chunks per message this side receives (0 = unlimited).
    pub max_chunk_count: u32,
}

impl Default for TransportLimits {
    fn default() -> Self {
        Self::from(&ClientLimits::default())
    }
}

impl From<&ClientLimits> for TransportLimits {
    fn from(limits: &ClientLimits) -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION,
            receive_buffer_size: limits.receive_buffer_size,
            send_buffer_size: limits.send_buffer_size,
            max_message_size: limits.max_message_size,
            max_chunk_count: limits.max_chunk_count,
        }
    }
}

impl TransportLimits {
    /// Smallest buffer size either side may announce.
    pub const MIN_BUFFER_SIZE: u32 = 8192;

    /// Combines local limits with the server's Acknowledge.
    pub fn negotiate(&self, ack: &AcknowledgeMessage) -> OpcUaResult<NegotiatedLimits> {
        if ack.receive_buffer_size < Self::MIN_BUFFER_SIZE
            || ack.send_buffer_size < Self::MIN_BUFFER_SIZE
        {
            return Err(ConnectionError::server_error(
                StatusCode::BAD_TCP_NOT_ENOUGH_RESOURCES,
                format!(
                    "server buffer sizes {}/{} below minimum {}",
                    ack.receive_buffer_size,
                    ack.send_buffer_size,
                    Self::MIN_BUFFER_SIZE
                ),
            )
            .into());
        }

        Ok(NegotiatedLimits {
            send_buffer_size: self.send_buffer_size.min(ack.receive_buffer_size),
            receive_buffer_size: self.receive_buffer_size.min(ack.send_buffer_size),
            local_max_message_size: self.max_message_size,
            local_max_chunk_count: self.max_chunk_count,
            remote_max_message_size: ack.max_message_size,
            remote_max_chunk_count: ack.max_chunk_count,
        })
    }
}

/// Limits in effect after the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedLimits {
    /// Largest chunk sent.
    pub send_buffer_size: u32,
    /// Largest chunk received.
    pub receive_buffer_size: u32,
    /// Largest message accepted from the peer (0 = unlimited).
    pub local_max_message_size: u32,
    /// Most chunks accepted from the peer (0 = unlimited).
    pub local_max_chunk_count: u32,
    /// Largest message the peer accepts (0 = unlimited).
    pub remote_max_message_size: u32,
    /// Most chunks the peer accepts (0 = unlimited).
    pub remote_max_chunk_count: u32,
}

impl NegotiatedLimits {
    /// Both sides use the same limits. Used by tests and servers.
    pub fn symmetric(limits: &TransportLimits) -> Self {
        Self {
            send_buffer_size: limits.send_buffer_size,
            receive_buffer_size: limits.receive_buffer_size,
            local_max_message_size: limits.max_message_size,
            local_max_chunk_count: limits.max_chunk_count,
            remote_max_message_size: limits.max_message_size,
            remote_max_chunk_count: limits.max_chunk_count,
        }
    }
}

// =============================================================================
// ChannelToken
// =============================================================================

/// Secure channel token in use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelToken {
    /// Secure channel id.
    pub channel_id: u32,
    /// Token id.
    pub token_id: u32,
    /// Creation time reported by the server.
    pub created_at: DateTime<Utc>,
    /// Lifetime granted by the server.
    pub revised_lifetime: Duration,
}

impl ChannelToken {
    /// Time after creation when renewal is due.
    pub fn renew_after(&self) -> Duration {
        self.revised_lifetime.mul_f64(0.75)
    }
}

impl From<&ChannelSecurityToken> for ChannelToken {
    fn from(token: &ChannelSecurityToken) -> Self {
        Self {
            channel_id: token.channel_id,
            token_id: token.token_id,
            created_at: token.created_at.unwrap_or_else(Utc::now),
            revised_lifetime: Duration::from_millis(token.revised_lifetime as u64),
        }
    }
}
