// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service request and response messages.
//!
//! Every message body starts with the NodeId of its binary encoding,
//! followed by the structure fields. Requests carry a [`RequestHeader`],
//! responses a [`ResponseHeader`].
//!
//! [`ServiceRequest`] ties a request to its response type so the dispatcher
//! can check the response encoding id and decode it generically.

pub mod attribute;
pub mod channel;
pub mod server;
pub mod session;
pub mod subscription;
pub mod view;

pub use attribute::*;
pub use channel::*;
pub use server::*;
pub use session::*;
pub use subscription::*;
pub use view::*;

use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};

use crate::binary_struct;
use crate::codec::{BinaryDecode, BinaryEncode, BinaryReader, DecodeLimits};
use crate::error::{OpcUaError, OpcUaResult, ProtocolError};
use crate::status::StatusCode;
use crate::transport::MessageType;
use crate::types::NodeId;
use crate::value::{DiagnosticInfo, ExtensionObject};

/// Binary encoding id of `ServiceFault`.
pub const SERVICE_FAULT_ENCODING_ID: u32 = 397;

// =============================================================================
// Headers
// =============================================================================

binary_struct! {
    /// Common header of every service request.
    pub struct RequestHeader {
        /// Session authentication token, null before CreateSession.
        pub authentication_token: NodeId,
        /// Time the request was sent.
        pub timestamp: Option<DateTime<Utc>>,
        /// Handle echoed in the response.
        pub request_handle: u32,
        /// Requested diagnostics bit mask.
        pub return_diagnostics: u32,
        /// Audit log entry id.
        pub audit_entry_id: Option<String>,
        /// Timeout hint in milliseconds.
        pub timeout_hint: u32,
        /// Reserved.
        pub additional_header: ExtensionObject,
    }
}

binary_struct! {
    /// Common header of every service response.
    pub struct ResponseHeader {
        /// Time the response was sent.
        pub timestamp: Option<DateTime<Utc>>,
        /// Handle from the request.
        pub request_handle: u32,
        /// Overall result of the service call.
        pub service_result: StatusCode,
        /// Service level diagnostics.
        pub service_diagnostics: DiagnosticInfo,
        /// Strings referenced by diagnostics.
        pub string_table: Vec<String>,
        /// Reserved.
        pub additional_header: ExtensionObject,
    }
}

binary_struct! {
    /// Response sent instead of the expected one when a service fails.
    pub struct ServiceFault {
        /// Header carrying the failure status.
        pub response_header: ResponseHeader,
    }
}

impl ResponseHeader {
    /// Header answering `request_handle` with `status`.
    pub fn for_request(request_handle: u32, status: StatusCode) -> Self {
        Self {
            timestamp: Some(Utc::now()),
            request_handle,
            service_result: status,
            ..Default::default()
        }
    }
}

// =============================================================================
// Service traits
// =============================================================================

/// A request message with its response type.
pub trait ServiceRequest: BinaryEncode + Send + Sync {
    /// Binary encoding id of the request.
    const ENCODING_ID: u32;

    /// Service name used in logs and errors.
    const NAME: &'static str;

    /// Secure channel message type carrying this request.
    const MESSAGE_TYPE: MessageType = MessageType::Message;

    /// Whether the session authentication token goes into the header.
    const AUTHENTICATED: bool = true;

    /// The matching response.
    type Response: ServiceResponse;

    /// Mutable access to the request header.
    fn request_header_mut(&mut self) -> &mut RequestHeader;
}

/// A response message.
pub trait ServiceResponse: BinaryDecode + Send + 'static {
    /// Binary encoding id of the response.
    const ENCODING_ID: u32;

    /// The response header.
    fn response_header(&self) -> &ResponseHeader;
}

/// Implements the service traits for request/response pairs.
macro_rules! impl_service {
    ($(
        $req:ident => $resp:ident, $req_id:literal, $resp_id:literal, $name:literal
        $(, message_type = $mt:expr)? $(, authenticated = $auth:literal)?;
    )*) => {
        $(
            impl $crate::messages::ServiceRequest for $req {
                const ENCODING_ID: u32 = $req_id;
                const NAME: &'static str = $name;
                $(const MESSAGE_TYPE: $crate::transport::MessageType = $mt;)?
                $(const AUTHENTICATED: bool = $auth;)?
                type Response = $resp;

                fn request_header_mut(&mut self) -> &mut $crate::messages::RequestHeader {
                    &mut self.request_header
                }
            }

            impl $crate::messages::ServiceResponse for $resp {
                const ENCODING_ID: u32 = $resp_id;

                fn response_header(&self) -> &$crate::messages::ResponseHeader {
                    &self.response_header
                }
            }
        )*
    };
}

pub(crate) use impl_service;

// =============================================================================
// Message bodies
// =============================================================================

/// Encodes a request body: encoding id followed by the request.
pub fn encode_request<R: ServiceRequest>(request: &R) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);
    NodeId::numeric(0, R::ENCODING_ID).encode(&mut buf);
    request.encode(&mut buf);
    buf.freeze()
}

/// Encodes a response body, used by servers and tests.
pub fn encode_response<T: ServiceResponse + BinaryEncode>(response: &T) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);
    NodeId::numeric(0, T::ENCODING_ID).encode(&mut buf);
    response.encode(&mut buf);
    buf.freeze()
}

/// Encodes a `ServiceFault` body answering `request_handle`.
pub fn encode_service_fault(request_handle: u32, status: StatusCode) -> Bytes {
    let mut buf = BytesMut::with_capacity(64);
    NodeId::numeric(0, SERVICE_FAULT_ENCODING_ID).encode(&mut buf);
    ServiceFault {
        response_header: ResponseHeader::for_request(request_handle, status),
    }
    .encode(&mut buf);
    buf.freeze()
}

/// Reads the encoding id at the start of a message body.
pub fn peek_encoding_id(body: &Bytes) -> OpcUaResult<u32> {
    let mut reader = BinaryReader::with_defaults(body.clone());
    let id = NodeId::decode(&mut reader)?;
    id.as_numeric()
        .filter(|_| id.namespace_index == 0)
        .ok_or_else(|| OpcUaError::decoding(format!("unexpected body type id {id}")))
}

/// Decodes the response to `R`.
///
/// A `ServiceFault` or a bad `serviceResult` becomes a service error, an
/// unexpected encoding id a protocol error.
pub fn decode_response<R: ServiceRequest>(
    body: Bytes,
    limits: DecodeLimits,
) -> OpcUaResult<R::Response> {
    let mut reader = BinaryReader::new(body, limits);
    let type_id = NodeId::decode(&mut reader)?;
    let received = match (type_id.namespace_index, type_id.as_numeric()) {
        (0, Some(id)) => id,
        _ => return Err(OpcUaError::decoding(format!("unexpected body type id {type_id}"))),
    };

    if received == SERVICE_FAULT_ENCODING_ID {
        let fault = ServiceFault::decode(&mut reader)?;
        return Err(OpcUaError::service_fault(
            R::NAME,
            fault.response_header.service_result,
        ));
    }

    let expected = <R::Response as ServiceResponse>::ENCODING_ID;
    if received != expected {
        return Err(ProtocolError::UnexpectedResponse { expected, received }.into());
    }

    let response = R::Response::decode(&mut reader)?;
    let status = response.response_header().service_result;
    if status.is_bad() {
        return Err(OpcUaError::service_fault(R::NAME, status));
    }
    Ok(response)
}

/// Checks that a response carries one result per operation.
pub fn check_result_count(
    service: &'static str,
    expected: usize,
    received: usize,
) -> OpcUaResult<()> {
    if expected == received {
        Ok(())
    } else {
        Err(ProtocolError::ResultCountMismatch {
            service,
            expected,
            received,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_from;
    use crate::error::ServiceError;

    #[test]
    fn test_request_header_layout() {
        let header = RequestHeader {
            request_handle: 5,
            timeout_hint: 1000,
            ..Default::default()
        };
        let bytes = header.to_bytes();
        // null token (2), null timestamp (8), handle, diagnostics, null audit id,
        // timeout hint, empty extension object (2 + 1).
        assert_eq!(bytes.len(), 2 + 8 + 4 + 4 + 4 + 4 + 3);
        assert_eq!(&bytes[10..14], &[5, 0, 0, 0]);
        assert_eq!(decode_from::<RequestHeader>(bytes).unwrap(), header);
    }

    #[test]
    fn test_decode_response_checks_type() {
        let response = ReadResponse {
            response_header: ResponseHeader::for_request(1, StatusCode::GOOD),
            ..Default::default()
        };
        let body = encode_response(&response);
        assert_eq!(peek_encoding_id(&body).unwrap(), 634);

        let decoded = decode_response::<ReadRequest>(body.clone(), DecodeLimits::default()).unwrap();
        assert_eq!(decoded.response_header.request_handle, 1);

        let err = decode_response::<WriteRequest>(body, DecodeLimits::default()).unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Protocol(ProtocolError::UnexpectedResponse {
                expected: 676,
                received: 634
            })
        ));
    }

    #[test]
    fn test_service_fault_becomes_service_error() {
        let body = encode_service_fault(9, StatusCode::BAD_TOO_MANY_OPERATIONS);
        let err = decode_response::<ReadRequest>(body, DecodeLimits::default()).unwrap_err();
        match err {
            OpcUaError::Service(ServiceError { service, status }) => {
                assert_eq!(service, "Read");
                assert_eq!(status, StatusCode::BAD_TOO_MANY_OPERATIONS);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_bad_service_result_becomes_service_error() {
        let response = ReadResponse {
            response_header: ResponseHeader::for_request(1, StatusCode::BAD_SESSION_ID_INVALID),
            ..Default::default()
        };
        let err = decode_response::<ReadRequest>(encode_response(&response), DecodeLimits::default())
            .unwrap_err();
        assert!(err.is_session_invalid());
    }

    #[test]
    fn test_result_count() {
        assert!(check_result_count("Read", 2, 2).is_ok());
        assert!(check_result_count("Read", 2, 1).is_err());
    }
}
