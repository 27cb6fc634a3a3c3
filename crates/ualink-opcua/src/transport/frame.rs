// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Frame headers and the connection protocol messages (HEL, ACK, ERR).
//!
//! Every frame starts with an 8-byte header: three ASCII bytes for the
//! message type, one byte for the chunk type and a `u32` total size that
//! includes the header itself.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::binary_struct;
use crate::codec::{BinaryDecode, BinaryEncode, BinaryReader};
use crate::error::{CodecResult, OpcUaResult, ProtocolError};
use crate::status::StatusCode;

/// Size of a frame header.
pub const HEADER_SIZE: usize = 8;

// =============================================================================
// MessageType / ChunkType
// =============================================================================

/// Frame message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// `HEL` client hello.
    Hello,
    /// `ACK` server acknowledge.
    Acknowledge,
    /// `ERR` fatal error.
    Error,
    /// `OPN` open secure channel.
    Open,
    /// `MSG` service message.
    Message,
    /// `CLO` close secure channel.
    Close,
}

impl MessageType {
    /// Returns the three ASCII bytes of the type.
    pub const fn as_bytes(&self) -> &'static [u8; 3] {
        match self {
            Self::Hello => b"HEL",
            Self::Acknowledge => b"ACK",
            Self::Error => b"ERR",
            Self::Open => b"OPN",
            Self::Message => b"MSG",
            Self::Close => b"CLO",
        }
    }

    /// Parses the three ASCII bytes of a header.
    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        match bytes {
            b"HEL" => Ok(Self::Hello),
            b"ACK" => Ok(Self::Acknowledge),
            b"ERR" => Ok(Self::Error),
            b"OPN" => Ok(Self::Open),
            b"MSG" => Ok(Self::Message),
            b"CLO" => Ok(Self::Close),
            other => Err(ProtocolError::UnexpectedMessage {
                found: String::from_utf8_lossy(other).into_owned(),
            }),
        }
    }

    /// Returns `true` for the secure channel types (OPN, MSG, CLO).
    pub const fn is_secure(&self) -> bool {
        matches!(self, Self::Open | Self::Message | Self::Close)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Position of a chunk within its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// `F` last chunk.
    Final,
    /// `C` more chunks follow.
    Intermediate,
    /// `A` the sender aborted the message.
    Abort,
}

impl ChunkType {
    /// Returns the header byte.
    pub const fn as_byte(&self) -> u8 {
        match self {
            Self::Final => b'F',
            Self::Intermediate => b'C',
            Self::Abort => b'A',
        }
    }

    /// Parses the header byte.
    pub fn from_byte(byte: u8) -> CodecResult<Self> {
        match byte {
            b'F' => Ok(Self::Final),
            b'C' => Ok(Self::Intermediate),
            b'A' => Ok(Self::Abort),
            other => Err(ProtocolError::decoding(format!(
                "invalid chunk type 0x{other:02X}"
            ))),
        }
    }
}

// =============================================================================
// FrameHeader / RawFrame
// =============================================================================

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Message type.
    pub message_type: MessageType,
    /// Chunk type.
    pub chunk_type: ChunkType,
    /// Total frame size including the header.
    pub size: u32,
}

impl FrameHeader {
    /// Parses an 8-byte header.
    pub fn parse(bytes: &[u8; HEADER_SIZE]) -> CodecResult<Self> {
        let message_type = MessageType::from_bytes(&bytes[..3])?;
        let chunk_type = ChunkType::from_byte(bytes[3])?;
        let size = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if (size as usize) < HEADER_SIZE {
            return Err(ProtocolError::decoding(format!("frame size {size} below header size")));
        }
        Ok(Self {
            message_type,
            chunk_type,
            size,
        })
    }

    /// Writes the header.
    pub fn write(&self, buf: &mut BytesMut) {
        buf.put_slice(self.message_type.as_bytes());
        buf.put_u8(self.chunk_type.as_byte());
        buf.put_u32_le(self.size);
    }
}

/// One frame as read from the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    /// Header.
    pub header: FrameHeader,
    /// Bytes after the header.
    pub body: Bytes,
}

/// Builds a complete frame around `body`.
pub fn encode_frame(message_type: MessageType, chunk_type: ChunkType, body: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + body.len());
    FrameHeader {
        message_type,
        chunk_type,
        size: (HEADER_SIZE + body.len()) as u32,
    }
    .write(&mut buf);
    buf.put_slice(body);
    buf.freeze()
}

/// Builds a frame from an encodable connection message.
pub fn encode_message<T: BinaryEncode>(message_type: MessageType, message: &T) -> Bytes {
    encode_frame(message_type, ChunkType::Final, &message.to_bytes())
}

/// Reads one frame, rejecting frames larger than `max_size`.
pub async fn read_frame<R>(reader: &mut R, max_size: u32) -> OpcUaResult<RawFrame>
where
    R: AsyncRead + Unpin,
{
    let mut header_bytes = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_bytes).await?;
    let header = FrameHeader::parse(&header_bytes)?;

    if max_size != 0 && header.size > max_size {
        return Err(ProtocolError::MessageTooLarge {
            size: header.size as usize,
            max: max_size as usize,
        }
        .into());
    }

    let mut body = vec![0u8; header.size as usize - HEADER_SIZE];
    reader.read_exact(&mut body).await?;
    Ok(RawFrame {
        header,
        body: Bytes::from(body),
    })
}

// =============================================================================
// Connection protocol messages
// =============================================================================

binary_struct! {
    /// `HEL` body.
    pub struct HelloMessage {
        /// Protocol version.
        pub protocol_version: u32,
        /// Largest chunk the client receives.
        pub receive_buffer_size: u32,
        /// Largest chunk the client sends.
        pub send_buffer_size: u32,
        /// Largest response message (0 = unlimited).
        pub max_message_size: u32,
        /// Most chunks per response (0 = unlimited).
        pub max_chunk_count: u32,
        /// Endpoint URL.
        pub endpoint_url: Option<String>,
    }
}

binary_struct! {
    /// `ACK` body.
    pub struct AcknowledgeMessage {
        /// Protocol version.
        pub protocol_version: u32,
        /// Largest chunk the server receives.
        pub receive_buffer_size: u32,
        /// Largest chunk the server sends.
        pub send_buffer_size: u32,
        /// Largest request message (0 = unlimited).
        pub max_message_size: u32,
        /// Most chunks per request (0 = unlimited).
        pub max_chunk_count: u32,
    }
}

binary_struct! {
    /// `ERR` body.
    pub struct ErrorMessage {
        /// Error status.
        pub error: StatusCode,
        /// Reason.
        pub reason: Option<String>,
    }
}

impl ErrorMessage {
    /// Decodes an `ERR` body.
    pub fn parse(body: Bytes) -> CodecResult<Self> {
        Self::decode(&mut BinaryReader::with_defaults(body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConnectionError, OpcUaError};

    #[test]
    fn test_header_roundtrip() {
        let frame = encode_frame(MessageType::Message, ChunkType::Intermediate, &[1, 2, 3]);
        assert_eq!(&frame[..8], b"MSGC\x0b\x00\x00\x00");
        let header = FrameHeader::parse(frame[..8].try_into().unwrap()).unwrap();
        assert_eq!(header.message_type, MessageType::Message);
        assert_eq!(header.chunk_type, ChunkType::Intermediate);
        assert_eq!(header.size, 11);
    }

    #[test]
    fn test_header_rejects_unknown_type() {
        assert!(matches!(
            FrameHeader::parse(b"XYZF\x08\x00\x00\x00"),
            Err(ProtocolError::UnexpectedMessage { .. })
        ));
        assert!(FrameHeader::parse(b"MSGQ\x08\x00\x00\x00").is_err());
        assert!(FrameHeader::parse(b"MSGF\x04\x00\x00\x00").is_err());
    }

    #[test]
    fn test_hello_layout() {
        let hello = HelloMessage {
            protocol_version: 0,
            receive_buffer_size: 65535,
            send_buffer_size: 65535,
            max_message_size: 4_194_304,
            max_chunk_count: 0,
            endpoint_url: Some("opc.tcp://a:1".into()),
        };
        let frame = encode_message(MessageType::Hello, &hello);
        assert_eq!(&frame[..4], b"HELF");
        assert_eq!(frame.len(), 8 + 20 + 4 + 13);
    }

    #[tokio::test]
    async fn test_read_frame() {
        let frame = encode_frame(MessageType::Acknowledge, ChunkType::Final, &[0; 20]);
        let mut input = &frame[..];
        let raw = read_frame(&mut input, 65535).await.unwrap();
        assert_eq!(raw.header.message_type, MessageType::Acknowledge);
        assert_eq!(raw.body.len(), 20);
    }

    #[tokio::test]
    async fn test_read_frame_too_large() {
        let frame = encode_frame(MessageType::Message, ChunkType::Final, &[0; 100]);
        let mut input = &frame[..];
        let err = read_frame(&mut input, 64).await.unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Protocol(ProtocolError::MessageTooLarge { size: 108, max: 64 })
        ));
    }

    #[tokio::test]
    async fn test_read_frame_eof_is_connection_closed() {
        let mut input: &[u8] = b"MSGF\x10\x00";
        let err = read_frame(&mut input, 65535).await.unwrap_err();
        assert!(matches!(err, OpcUaError::Connection(ConnectionError::Closed { .. })));
    }

    #[test]
    fn test_error_message() {
        let err = ErrorMessage {
            error: StatusCode::BAD_TCP_ENDPOINT_URL_INVALID,
            reason: Some("unknown endpoint".into()),
        };
        let parsed = ErrorMessage::parse(err.to_bytes()).unwrap();
        assert_eq!(parsed, err);
    }
}
