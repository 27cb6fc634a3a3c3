// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! TCP connection and secure channel establishment.
//!
//! [`connect`] performs the whole handshake and returns a [`Connection`]
//! split into a [`ChannelReader`] and a [`ChannelWriter`]. The request
//! dispatcher owns both halves afterwards.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, info, instrument, trace, warn};

use super::chunk::{Chunker, Incoming, Reassembler};
use super::frame::{
    AcknowledgeMessage, ErrorMessage, HelloMessage, MessageType, encode_message, read_frame,
};
use super::{ChannelToken, NegotiatedLimits, TransportLimits};
use crate::codec::{BinaryDecode, BinaryReader, DecodeLimits};
use crate::error::{ConnectionError, OpcUaError, OpcUaResult, ProtocolError, TimeoutError};
use crate::messages::{
    CloseSecureChannelRequest, OpenSecureChannelRequest, SecurityTokenRequestType,
    decode_response, encode_request,
};
use crate::types::{EndpointUrl, OpcUaConfig};

/// Request id used for the initial OpenSecureChannel.
pub const OPEN_REQUEST_ID: u32 = 1;

// =============================================================================
// ChannelWriter
// =============================================================================

/// Sending half of a secure channel.
#[derive(Debug)]
pub struct ChannelWriter {
    stream: OwnedWriteHalf,
    chunker: Chunker,
}

impl ChannelWriter {
    pub(crate) fn new(stream: OwnedWriteHalf, limits: &NegotiatedLimits) -> Self {
        Self {
            stream,
            chunker: Chunker::new(limits),
        }
    }

    /// Switches to a new channel token.
    pub fn set_token(&mut self, token: &ChannelToken) {
        self.chunker.set_channel(token.channel_id, token.token_id);
    }

    /// Returns the secure channel id.
    pub fn channel_id(&self) -> u32 {
        self.chunker.channel_id()
    }

    /// Writes one message as a contiguous run of chunks.
    ///
    /// Fails before writing anything if the peer limits would be exceeded.
    pub async fn write_message(
        &mut self,
        message_type: MessageType,
        request_id: u32,
        body: &[u8],
    ) -> OpcUaResult<()> {
        let chunks = self.chunker.encode(message_type, request_id, body)?;
        for chunk in &chunks {
            self.stream.write_all(chunk).await?;
        }
        self.stream.flush().await?;
        Ok(())
    }

    /// Sends CloseSecureChannel and shuts the socket down. Errors are logged.
    pub async fn close(&mut self, request_id: u32) {
        let mut request = CloseSecureChannelRequest::default();
        request.request_header.timestamp = Some(Utc::now());
        request.request_header.request_handle = request_id;
        let body = encode_request(&request);
        if let Err(e) = self
            .write_message(MessageType::Close, request_id, &body)
            .await
        {
            debug!(error = %e, "CloseSecureChannel not sent");
        }
        if let Err(e) = self.stream.shutdown().await {
            trace!(error = %e, "Socket shutdown failed");
        }
    }
}

// =============================================================================
// ChannelReader
// =============================================================================

/// Receiving half of a secure channel.
#[derive(Debug)]
pub struct ChannelReader {
    stream: BufReader<OwnedReadHalf>,
    reassembler: Reassembler,
    receive_buffer_size: u32,
}

impl ChannelReader {
    fn new(stream: BufReader<OwnedReadHalf>, limits: &NegotiatedLimits) -> Self {
        Self {
            stream,
            reassembler: Reassembler::new(limits),
            receive_buffer_size: limits.receive_buffer_size,
        }
    }

    /// Sets the expected secure channel id.
    pub fn set_channel_id(&mut self, channel_id: u32) {
        self.reassembler.set_channel_id(channel_id);
    }

    /// Reads frames until a complete message or an abort is available.
    pub async fn read_message(&mut self) -> OpcUaResult<Incoming> {
        loop {
            let frame = read_frame(&mut self.stream, self.receive_buffer_size).await?;
            trace!(
                message_type = %frame.header.message_type,
                chunk_type = ?frame.header.chunk_type,
                size = frame.header.size,
                "Frame received"
            );
            if let Some(incoming) = self.reassembler.push(frame)? {
                return Ok(incoming);
            }
        }
    }
}

// =============================================================================
// Connection
// =============================================================================

/// An open secure channel.
#[derive(Debug)]
pub struct Connection {
    /// Receiving half.
    pub reader: ChannelReader,
    /// Sending half.
    pub writer: ChannelWriter,
    /// Token issued by the server.
    pub token: ChannelToken,
    /// Limits after the handshake.
    pub limits: NegotiatedLimits,
}

/// Connects to the configured endpoint and opens a secure channel.
///
/// The whole handshake is bounded by `connect_timeout`.
#[instrument(skip(config), fields(endpoint = %config.endpoint))]
pub async fn connect(config: &OpcUaConfig) -> OpcUaResult<Connection> {
    let endpoint = config.endpoint_url()?;
    match tokio::time::timeout(config.connect_timeout, establish(config, &endpoint)).await {
        Ok(result) => result,
        Err(_) => {
            warn!(timeout = ?config.connect_timeout, "Connect timed out");
            Err(TimeoutError::connection(config.connect_timeout).into())
        }
    }
}

async fn establish(config: &OpcUaConfig, endpoint: &EndpointUrl) -> OpcUaResult<Connection> {
    let stream = open_socket(config, endpoint).await?;
    let (read_half, mut write_half) = stream.into_split();
    let mut read_half = BufReader::new(read_half);

    let local = TransportLimits::from(&config.limits);
    let limits = handshake(config, &local, &mut read_half, &mut write_half).await?;
    debug!(
        send_buffer = limits.send_buffer_size,
        receive_buffer = limits.receive_buffer_size,
        remote_max_message = limits.remote_max_message_size,
        remote_max_chunks = limits.remote_max_chunk_count,
        "Transport limits negotiated"
    );

    let mut writer = ChannelWriter::new(write_half, &limits);
    let mut reader = ChannelReader::new(read_half, &limits);
    let token = open_channel(config, &mut reader, &mut writer).await?;

    info!(
        channel_id = token.channel_id,
        token_id = token.token_id,
        lifetime = ?token.revised_lifetime,
        "Secure channel opened"
    );

    Ok(Connection {
        reader,
        writer,
        token,
        limits,
    })
}

async fn open_socket(config: &OpcUaConfig, endpoint: &EndpointUrl) -> OpcUaResult<TcpStream> {
    let authority = endpoint.authority();
    let addresses: Vec<_> = tokio::net::lookup_host(&authority)
        .await
        .map_err(|_| ConnectionError::Unresolved {
            host: endpoint.host.clone(),
        })?
        .collect();
    if addresses.is_empty() {
        return Err(ConnectionError::Unresolved {
            host: endpoint.host.clone(),
        }
        .into());
    }

    let mut last_error = None;
    for address in addresses {
        trace!(%address, "Opening TCP connection");
        match TcpStream::connect(address).await {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(match last_error {
        Some(e) => ConnectionError::refused_with(config.endpoint.clone(), e),
        None => ConnectionError::refused(config.endpoint.clone()),
    }
    .into())
}

async fn handshake(
    config: &OpcUaConfig,
    local: &TransportLimits,
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> OpcUaResult<NegotiatedLimits> {
    let hello = HelloMessage {
        protocol_version: local.protocol_version,
        receive_buffer_size: local.receive_buffer_size,
        send_buffer_size: local.send_buffer_size,
        max_message_size: local.max_message_size,
        max_chunk_count: local.max_chunk_count,
        endpoint_url: Some(config.endpoint.clone()),
    };
    writer
        .write_all(&encode_message(MessageType::Hello, &hello))
        .await?;
    writer.flush().await?;

    let frame = read_frame(reader, local.receive_buffer_size).await?;
    match frame.header.message_type {
        MessageType::Acknowledge => {
            let ack = AcknowledgeMessage::decode(&mut BinaryReader::with_defaults(frame.body))?;
            local.negotiate(&ack)
        }
        MessageType::Error => {
            let err = ErrorMessage::parse(frame.body)?;
            let reason = err.reason.unwrap_or_default();
            warn!(status = %err.error, %reason, "Server rejected Hello");
            Err(ConnectionError::server_error(err.error, reason).into())
        }
        other => Err(ProtocolError::UnexpectedMessage {
            found: other.to_string(),
        }
        .into()),
    }
}

async fn open_channel(
    config: &OpcUaConfig,
    reader: &mut ChannelReader,
    writer: &mut ChannelWriter,
) -> OpcUaResult<ChannelToken> {
    let mut request =
        OpenSecureChannelRequest::new(SecurityTokenRequestType::Issue, config.channel_lifetime);
    request.request_header.timestamp = Some(Utc::now());
    request.request_header.request_handle = OPEN_REQUEST_ID;
    request.request_header.timeout_hint = timeout_hint(config.connect_timeout);

    writer
        .write_message(MessageType::Open, OPEN_REQUEST_ID, &encode_request(&request))
        .await?;

    let body: Bytes = match reader.read_message().await? {
        Incoming::Message(message) if message.message_type == MessageType::Open => message.body,
        Incoming::Message(message) => {
            return Err(ProtocolError::UnexpectedMessage {
                found: message.message_type.to_string(),
            }
            .into());
        }
        Incoming::Aborted {
            request_id,
            status,
            reason,
        } => {
            return Err(ProtocolError::Aborted {
                request_id,
                status,
                reason,
            }
            .into());
        }
    };

    let response =
        decode_response::<OpenSecureChannelRequest>(body, DecodeLimits::from(&config.limits))?;
    let token = ChannelToken::from(&response.security_token);
    if token.channel_id == 0 {
        return Err(OpcUaError::decoding("server issued secure channel id 0"));
    }

    writer.set_token(&token);
    reader.set_channel_id(token.channel_id);
    Ok(token)
}

/// Converts a timeout into the millisecond hint of a request header.
pub fn timeout_hint(timeout: Duration) -> u32 {
    timeout.as_millis().min(u32::MAX as u128) as u32
}
