// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Secure channel chunking.
//!
//! A secure channel chunk looks like this under SecurityPolicy `None`:
//!
//! ```text
//! ┌──────────────┬────────────┬─────────────────┬──────────────────┬──────┐
//! │ frame header │ channel id │ security header │ sequence number, │ body │
//! │   8 bytes    │    u32     │ OPN: policy URI │ request id       │      │
//! │              │            │ MSG/CLO: token  │ 2 x u32          │      │
//! └──────────────┴────────────┴─────────────────┴──────────────────┴──────┘
//! ```
//!
//! [`Chunker`] splits outgoing messages, [`Reassembler`] joins incoming
//! chunks. Both are pure: no I/O happens here.

use std::collections::HashMap;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use super::frame::{ChunkType, ErrorMessage, FrameHeader, HEADER_SIZE, MessageType, RawFrame};
use super::{NegotiatedLimits, SECURITY_POLICY_NONE_URI};
use crate::codec::{BinaryDecode, BinaryEncode, BinaryReader};
use crate::error::{ConnectionError, OpcUaResult, ProtocolError};
use crate::status::StatusCode;
use crate::types::ByteString;

/// Sequence numbers above this value may wrap.
pub const SEQUENCE_WRAP_THRESHOLD: u32 = 4_294_966_271;

/// A wrapped sequence number is below this value.
pub const SEQUENCE_WRAP_LIMIT: u32 = 1024;

const SEQUENCE_HEADER_SIZE: usize = 8;

// =============================================================================
// Sequence numbers
// =============================================================================

/// Outgoing sequence numbers.
#[derive(Debug, Clone)]
pub struct SequenceCounter {
    next: u32,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl SequenceCounter {
    /// Starts at `first`.
    pub fn starting_at(first: u32) -> Self {
        Self { next: first }
    }

    /// Returns the next sequence number.
    pub fn next(&mut self) -> u32 {
        let current = self.next;
        self.next = if current >= SEQUENCE_WRAP_THRESHOLD {
            1
        } else {
            current + 1
        };
        current
    }
}

/// Returns `true` if `received` may follow `previous`.
pub fn is_next_sequence(previous: u32, received: u32) -> bool {
    if previous >= SEQUENCE_WRAP_THRESHOLD {
        received < SEQUENCE_WRAP_LIMIT || received == previous.wrapping_add(1)
    } else {
        received == previous + 1
    }
}

// =============================================================================
// Security header
// =============================================================================

fn security_header_size(message_type: MessageType) -> usize {
    match message_type {
        // policy URI, null sender certificate, null receiver thumbprint
        MessageType::Open => 4 + SECURITY_POLICY_NONE_URI.len() + 4 + 4,
        _ => 4,
    }
}

fn write_security_header(buf: &mut BytesMut, message_type: MessageType, token_id: u32) {
    match message_type {
        MessageType::Open => {
            Some(SECURITY_POLICY_NONE_URI.to_string()).encode(buf);
            ByteString::null().encode(buf);
            ByteString::null().encode(buf);
        }
        _ => buf.put_u32_le(token_id),
    }
}

// =============================================================================
// Chunker
// =============================================================================

/// Splits outgoing messages into chunks.
#[derive(Debug, Clone)]
pub struct Chunker {
    send_buffer_size: usize,
    max_message_size: usize,
    max_chunk_count: usize,
    channel_id: u32,
    token_id: u32,
    sequence: SequenceCounter,
}

impl Chunker {
    /// Creates a chunker for the negotiated limits.
    pub fn new(limits: &NegotiatedLimits) -> Self {
        Self {
            send_buffer_size: limits.send_buffer_size as usize,
            max_message_size: limits.remote_max_message_size as usize,
            max_chunk_count: limits.remote_max_chunk_count as usize,
            channel_id: 0,
            token_id: 0,
            sequence: SequenceCounter::default(),
        }
    }

    /// Switches to a channel and token.
    pub fn set_channel(&mut self, channel_id: u32, token_id: u32) {
        self.channel_id = channel_id;
        self.token_id = token_id;
    }

    /// Returns the secure channel id.
    pub fn channel_id(&self) -> u32 {
        self.channel_id
    }

    /// Returns the token id.
    pub fn token_id(&self) -> u32 {
        self.token_id
    }

    fn max_body_per_chunk(&self, message_type: MessageType) -> usize {
        self.send_buffer_size
            - HEADER_SIZE
            - 4
            - security_header_size(message_type)
            - SEQUENCE_HEADER_SIZE
    }

    /// Splits `body` into chunks.
    ///
    /// Limit violations are reported before any sequence number is used.
    pub fn encode(
        &mut self,
        message_type: MessageType,
        request_id: u32,
        body: &[u8],
    ) -> OpcUaResult<Vec<Bytes>> {
        if self.max_message_size != 0 && body.len() > self.max_message_size {
            return Err(ProtocolError::MessageTooLarge {
                size: body.len(),
                max: self.max_message_size,
            }
            .into());
        }

        let per_chunk = self.max_body_per_chunk(message_type);
        let count = body.len().div_ceil(per_chunk).max(1);
        if self.max_chunk_count != 0 && count > self.max_chunk_count {
            return Err(ProtocolError::TooManyChunks {
                count,
                max: self.max_chunk_count,
            }
            .into());
        }

        let mut chunks = Vec::with_capacity(count);
        let mut pieces: Vec<&[u8]> = body.chunks(per_chunk).collect();
        if pieces.is_empty() {
            pieces.push(&[]);
        }
        let last = pieces.len() - 1;
        for (i, piece) in pieces.into_iter().enumerate() {
            let chunk_type = if i == last {
                ChunkType::Final
            } else {
                ChunkType::Intermediate
            };
            chunks.push(self.build_chunk(message_type, chunk_type, request_id, piece));
        }

        trace!(
            message_type = %message_type,
            request_id,
            chunks = chunks.len(),
            size = body.len(),
            "Encoded message"
        );
        Ok(chunks)
    }

    /// Builds an abort chunk for `request_id`.
    pub fn abort(
        &mut self,
        message_type: MessageType,
        request_id: u32,
        status: StatusCode,
        reason: &str,
    ) -> Bytes {
        let body = ErrorMessage {
            error: status,
            reason: Some(reason.to_string()),
        }
        .to_bytes();
        self.build_chunk(message_type, ChunkType::Abort, request_id, &body)
    }

    fn build_chunk(
        &mut self,
        message_type: MessageType,
        chunk_type: ChunkType,
        request_id: u32,
        piece: &[u8],
    ) -> Bytes {
        let size = HEADER_SIZE
            + 4
            + security_header_size(message_type)
            + SEQUENCE_HEADER_SIZE
            + piece.len();
        let mut buf = BytesMut::with_capacity(size);
        FrameHeader {
            message_type,
            chunk_type,
            size: size as u32,
        }
        .write(&mut buf);
        buf.put_u32_le(self.channel_id);
        write_security_header(&mut buf, message_type, self.token_id);
        buf.put_u32_le(self.sequence.next());
        buf.put_u32_le(request_id);
        buf.put_slice(piece);
        buf.freeze()
    }
}

// =============================================================================
// Reassembler
// =============================================================================

/// A complete secure channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecureMessage {
    /// Message type.
    pub message_type: MessageType,
    /// Secure channel id from the chunk headers.
    pub channel_id: u32,
    /// Token id, 0 for OPN.
    pub token_id: u32,
    /// Request id.
    pub request_id: u32,
    /// Message body.
    pub body: Bytes,
}

/// Result of feeding a chunk to the reassembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incoming {
    /// A complete message.
    Message(SecureMessage),
    /// The peer aborted the message for `request_id`.
    Aborted {
        /// Request id of the aborted message.
        request_id: u32,
        /// Status sent with the abort.
        status: StatusCode,
        /// Reason sent with the abort.
        reason: String,
    },
}

#[derive(Debug)]
struct Partial {
    message_type: MessageType,
    token_id: u32,
    body: BytesMut,
    chunks: usize,
}

/// Joins incoming chunks into messages.
#[derive(Debug)]
pub struct Reassembler {
    channel_id: Option<u32>,
    last_sequence: Option<u32>,
    max_message_size: usize,
    max_chunk_count: usize,
    partial: HashMap<u32, Partial>,
}

impl Reassembler {
    /// Creates a reassembler enforcing the local limits.
    pub fn new(limits: &NegotiatedLimits) -> Self {
        Self {
            channel_id: None,
            last_sequence: None,
            max_message_size: limits.local_max_message_size as usize,
            max_chunk_count: limits.local_max_chunk_count as usize,
            partial: HashMap::new(),
        }
    }

    /// Sets the expected secure channel id.
    pub fn set_channel_id(&mut self, channel_id: u32) {
        self.channel_id = Some(channel_id);
    }

    /// Number of messages being reassembled.
    pub fn pending(&self) -> usize {
        self.partial.len()
    }

    /// Feeds one frame. Returns a message or abort once complete.
    ///
    /// `ERR` frames become a connection error with the peer's status.
    pub fn push(&mut self, frame: RawFrame) -> OpcUaResult<Option<Incoming>> {
        let message_type = frame.header.message_type;
        match message_type {
            MessageType::Error => {
                let err = ErrorMessage::parse(frame.body)?;
                return Err(ConnectionError::server_error(
                    err.error,
                    err.reason.unwrap_or_default(),
                )
                .into());
            }
            MessageType::Hello | MessageType::Acknowledge => {
                return Err(ProtocolError::UnexpectedMessage {
                    found: message_type.to_string(),
                }
                .into());
            }
            MessageType::Open | MessageType::Message | MessageType::Close => {}
        }

        let mut reader = BinaryReader::with_defaults(frame.body);
        let channel_id = reader.read_u32()?;
        if let Some(expected) = self.channel_id {
            if channel_id != expected {
                return Err(ProtocolError::ChannelMismatch {
                    expected,
                    received: channel_id,
                }
                .into());
            }
        }

        let token_id = if message_type == MessageType::Open {
            let policy = Option::<String>::decode(&mut reader)?;
            if policy.as_deref() != Some(SECURITY_POLICY_NONE_URI) {
                return Err(ProtocolError::decoding(format!(
                    "unsupported security policy {}",
                    policy.unwrap_or_default()
                ))
                .into());
            }
            ByteString::decode(&mut reader)?;
            ByteString::decode(&mut reader)?;
            0
        } else {
            reader.read_u32()?
        };

        let sequence = reader.read_u32()?;
        let request_id = reader.read_u32()?;
        if let Some(previous) = self.last_sequence {
            if !is_next_sequence(previous, sequence) {
                return Err(ProtocolError::SequenceMismatch {
                    previous,
                    received: sequence,
                }
                .into());
            }
        }
        self.last_sequence = Some(sequence);

        let piece = reader.into_remaining();
        match frame.header.chunk_type {
            ChunkType::Abort => {
                self.partial.remove(&request_id);
                let err = ErrorMessage::parse(piece)?;
                Ok(Some(Incoming::Aborted {
                    request_id,
                    status: err.error,
                    reason: err.reason.unwrap_or_default(),
                }))
            }
            ChunkType::Intermediate => {
                let partial = self.partial.entry(request_id).or_insert_with(|| Partial {
                    message_type,
                    token_id,
                    body: BytesMut::new(),
                    chunks: 0,
                });
                partial.body.extend_from_slice(&piece);
                partial.chunks += 1;
                let (size, chunks) = (partial.body.len(), partial.chunks);
                self.check_limits(request_id, size, chunks)?;
                Ok(None)
            }
            ChunkType::Final => {
                let (body, size, chunks) = match self.partial.remove(&request_id) {
                    Some(mut partial) => {
                        partial.body.extend_from_slice(&piece);
                        let size = partial.body.len();
                        (partial.body.freeze(), size, partial.chunks + 1)
                    }
                    None => {
                        let size = piece.len();
                        (piece, size, 1)
                    }
                };
                self.check_limits(request_id, size, chunks)?;
                Ok(Some(Incoming::Message(SecureMessage {
                    message_type,
                    channel_id,
                    token_id,
                    request_id,
                    body,
                })))
            }
        }
    }

    fn check_limits(&mut self, request_id: u32, size: usize, chunks: usize) -> OpcUaResult<()> {
        if self.max_message_size != 0 && size > self.max_message_size {
            self.partial.remove(&request_id);
            return Err(ProtocolError::MessageTooLarge {
                size,
                max: self.max_message_size,
            }
            .into());
        }
        if self.max_chunk_count != 0 && chunks > self.max_chunk_count {
            self.partial.remove(&request_id);
            return Err(ProtocolError::TooManyChunks {
                count: chunks,
                max: self.max_chunk_count,
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OpcUaError;
    use crate::transport::TransportLimits;

    fn limits(send_buffer: u32, max_message: u32, max_chunks: u32) -> NegotiatedLimits {
        NegotiatedLimits::symmetric(&TransportLimits {
            protocol_version: 0,
            receive_buffer_size: send_buffer,
            send_buffer_size: send_buffer,
            max_message_size: max_message,
            max_chunk_count: max_chunks,
        })
    }

    fn frames(chunks: Vec<Bytes>) -> Vec<RawFrame> {
        chunks
            .into_iter()
            .map(|c| RawFrame {
                header: FrameHeader::parse(c[..8].try_into().unwrap()).unwrap(),
                body: c.slice(8..),
            })
            .collect()
    }

    #[test]
    fn test_sequence_counter_wraps() {
        let mut counter = SequenceCounter::starting_at(SEQUENCE_WRAP_THRESHOLD);
        assert_eq!(counter.next(), SEQUENCE_WRAP_THRESHOLD);
        assert_eq!(counter.next(), 1);
        assert!(is_next_sequence(SEQUENCE_WRAP_THRESHOLD, 1));
        assert!(is_next_sequence(5, 6));
        assert!(!is_next_sequence(5, 7));
        assert!(!is_next_sequence(5, 1));
    }

    #[test]
    fn test_single_chunk_message() {
        let l = limits(8192, 0, 0);
        let mut chunker = Chunker::new(&l);
        chunker.set_channel(7, 3);
        let chunks = chunker.encode(MessageType::Message, 42, b"hello").unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][..4], b"MSGF");
        assert_eq!(chunks[0].len(), 8 + 4 + 4 + 8 + 5);

        let mut reassembler = Reassembler::new(&l);
        reassembler.set_channel_id(7);
        let frame = frames(chunks).remove(0);
        match reassembler.push(frame).unwrap() {
            Some(Incoming::Message(msg)) => {
                assert_eq!(msg.request_id, 42);
                assert_eq!(msg.token_id, 3);
                assert_eq!(&msg.body[..], b"hello");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_multi_chunk_message() {
        let l = limits(8192, 0, 0);
        let mut chunker = Chunker::new(&l);
        chunker.set_channel(1, 1);
        let body: Vec<u8> = (0..20_000u32).map(|i| i as u8).collect();
        let chunks = chunker.encode(MessageType::Message, 9, &body).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.len() <= 8192));
        assert_eq!(chunks[0][3], b'C');
        assert_eq!(chunks[2][3], b'F');

        let mut reassembler = Reassembler::new(&l);
        let mut result = None;
        for frame in frames(chunks) {
            result = reassembler.push(frame).unwrap();
        }
        match result {
            Some(Incoming::Message(msg)) => assert_eq!(&msg.body[..], &body[..]),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_open_chunk_carries_policy_uri() {
        let l = limits(8192, 0, 0);
        let mut chunker = Chunker::new(&l);
        let chunks = chunker.encode(MessageType::Open, 1, b"x").unwrap();
        let chunk = &chunks[0];
        assert_eq!(&chunk[..4], b"OPNF");
        let uri_len = u32::from_le_bytes(chunk[12..16].try_into().unwrap()) as usize;
        assert_eq!(&chunk[16..16 + uri_len], SECURITY_POLICY_NONE_URI.as_bytes());

        let mut reassembler = Reassembler::new(&l);
        assert!(matches!(
            reassembler.push(frames(chunks).remove(0)).unwrap(),
            Some(Incoming::Message(SecureMessage { message_type: MessageType::Open, .. }))
        ));
    }

    #[test]
    fn test_limits_checked_before_sending() {
        let mut chunker = Chunker::new(&limits(8192, 100, 0));
        assert!(matches!(
            chunker.encode(MessageType::Message, 1, &[0; 101]),
            Err(OpcUaError::Protocol(ProtocolError::MessageTooLarge { .. }))
        ));

        let mut chunker = Chunker::new(&limits(8192, 0, 2));
        assert!(matches!(
            chunker.encode(MessageType::Message, 1, &[0; 20_000]),
            Err(OpcUaError::Protocol(ProtocolError::TooManyChunks { count: 3, max: 2 }))
        ));
        // No sequence number was consumed by the failed attempt.
        let chunks = chunker.encode(MessageType::Message, 1, b"ok").unwrap();
        assert_eq!(u32::from_le_bytes(chunks[0][16..20].try_into().unwrap()), 1);
    }

    #[test]
    fn test_reassembler_enforces_local_limits() {
        let mut chunker = Chunker::new(&limits(8192, 0, 0));
        let chunks = chunker.encode(MessageType::Message, 1, &[0; 20_000]).unwrap();
        let mut reassembler = Reassembler::new(&limits(8192, 10_000, 0));
        let mut outcome = Ok(None);
        for frame in frames(chunks) {
            outcome = reassembler.push(frame);
            if outcome.is_err() {
                break;
            }
        }
        assert!(matches!(
            outcome,
            Err(OpcUaError::Protocol(ProtocolError::MessageTooLarge { .. }))
        ));
    }

    #[test]
    fn test_sequence_gap_rejected() {
        let l = limits(8192, 0, 0);
        let mut chunker = Chunker::new(&l);
        let mut first = frames(chunker.encode(MessageType::Message, 1, b"a").unwrap());
        let _skipped = chunker.encode(MessageType::Message, 2, b"b").unwrap();
        let mut third = frames(chunker.encode(MessageType::Message, 3, b"c").unwrap());

        let mut reassembler = Reassembler::new(&l);
        reassembler.push(first.remove(0)).unwrap();
        assert!(matches!(
            reassembler.push(third.remove(0)),
            Err(OpcUaError::Protocol(ProtocolError::SequenceMismatch { previous: 1, received: 3 }))
        ));
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let l = limits(8192, 0, 0);
        let mut chunker = Chunker::new(&l);
        chunker.set_channel(5, 1);
        let mut reassembler = Reassembler::new(&l);
        reassembler.set_channel_id(6);
        let frame = frames(chunker.encode(MessageType::Message, 1, b"a").unwrap()).remove(0);
        assert!(matches!(
            reassembler.push(frame),
            Err(OpcUaError::Protocol(ProtocolError::ChannelMismatch { expected: 6, received: 5 }))
        ));
    }

    #[test]
    fn test_abort_discards_partial_message() {
        let l = limits(8192, 0, 0);
        let mut chunker = Chunker::new(&l);
        let mut fork = chunker.clone();
        let mut parts = frames(chunker.encode(MessageType::Message, 4, &[1; 10_000]).unwrap());
        assert_eq!(parts.len(), 2);
        // The abort replaces the final chunk and reuses its sequence number.
        fork.sequence.next();
        let abort = fork.abort(
            MessageType::Message,
            4,
            StatusCode::BAD_ENCODING_LIMITS_EXCEEDED,
            "too big",
        );

        let mut reassembler = Reassembler::new(&l);
        assert!(reassembler.push(parts.remove(0)).unwrap().is_none());
        assert_eq!(reassembler.pending(), 1);
        match reassembler.push(frames(vec![abort]).remove(0)).unwrap() {
            Some(Incoming::Aborted { request_id, status, reason }) => {
                assert_eq!(request_id, 4);
                assert_eq!(status, StatusCode::BAD_ENCODING_LIMITS_EXCEEDED);
                assert_eq!(reason, "too big");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(reassembler.pending(), 0);
    }

    #[test]
    fn test_error_frame_is_connection_error() {
        let l = limits(8192, 0, 0);
        let body = ErrorMessage {
            error: StatusCode::BAD_TCP_INTERNAL_ERROR,
            reason: Some("boom".into()),
        }
        .to_bytes();
        let frame = RawFrame {
            header: FrameHeader {
                message_type: MessageType::Error,
                chunk_type: ChunkType::Final,
                size: (8 + body.len()) as u32,
            },
            body,
        };
        let err = Reassembler::new(&l).push(frame).unwrap_err();
        assert_eq!(err.status_code(), Some(StatusCode::BAD_TCP_INTERNAL_ERROR));
    }
}
