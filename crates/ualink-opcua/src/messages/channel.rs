// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure channel service messages.

use chrono::{DateTime, Utc};

use super::{RequestHeader, ResponseHeader, impl_service};
use crate::transport::MessageType;
use crate::types::{ByteString, MessageSecurityMode};
use crate::{binary_enum, binary_struct};

binary_enum! {
    /// Whether a channel token is issued or renewed.
    pub enum SecurityTokenRequestType {
        /// New channel.
        #[default]
        Issue = 0,
        /// New token on an existing channel.
        Renew = 1,
    }
}

binary_struct! {
    /// Token identifying the keys of a secure channel.
    pub struct ChannelSecurityToken {
        /// Secure channel id.
        pub channel_id: u32,
        /// Token id.
        pub token_id: u32,
        /// Creation time on the server.
        pub created_at: Option<DateTime<Utc>>,
        /// Lifetime in milliseconds.
        pub revised_lifetime: u32,
    }
}

binary_struct! {
    /// OpenSecureChannel request.
    pub struct OpenSecureChannelRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Client protocol version.
        pub client_protocol_version: u32,
        /// Issue or renew.
        pub request_type: SecurityTokenRequestType,
        /// Security mode.
        pub security_mode: MessageSecurityMode,
        /// Client nonce, empty for policy None.
        pub client_nonce: ByteString,
        /// Requested token lifetime in milliseconds.
        pub requested_lifetime: u32,
    }
}

binary_struct! {
    /// OpenSecureChannel response.
    pub struct OpenSecureChannelResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// Server protocol version.
        pub server_protocol_version: u32,
        /// Issued token.
        pub security_token: ChannelSecurityToken,
        /// Server nonce.
        pub server_nonce: ByteString,
    }
}

binary_struct! {
    /// CloseSecureChannel request.
    pub struct CloseSecureChannelRequest {
        /// Header.
        pub request_header: RequestHeader,
    }
}

binary_struct! {
    /// CloseSecureChannel response. Servers normally just close the socket.
    pub struct CloseSecureChannelResponse {
        /// Header.
        pub response_header: ResponseHeader,
    }
}

impl_service! {
    OpenSecureChannelRequest => OpenSecureChannelResponse, 446, 449, "OpenSecureChannel",
        message_type = MessageType::Open, authenticated = false;
    CloseSecureChannelRequest => CloseSecureChannelResponse, 452, 455, "CloseSecureChannel",
        message_type = MessageType::Close, authenticated = false;
}

impl OpenSecureChannelRequest {
    /// Request for policy `None` with the given lifetime.
    pub fn new(request_type: SecurityTokenRequestType, requested_lifetime: std::time::Duration) -> Self {
        Self {
            request_header: RequestHeader::default(),
            client_protocol_version: crate::transport::PROTOCOL_VERSION,
            request_type,
            security_mode: MessageSecurityMode::None,
            client_nonce: ByteString::null(),
            requested_lifetime: requested_lifetime.as_millis().min(u32::MAX as u128) as u32,
        }
    }
}
