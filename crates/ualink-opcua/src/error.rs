// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA client error types with diagnostics.
//!
//! Every fallible operation in this crate returns [`OpcUaResult`]. Errors are
//! grouped by the layer that produced them so callers can decide quickly
//! whether to retry, reconnect or give up.
//!
//! # Error Categories
//!
//! ```text
//! OpcUaError
//! ├── Connection    - TCP connect, handshake, connection loss, ERR messages
//! ├── Protocol      - Encoding/decoding, framing, chunking, correlation
//! ├── Session       - Session create/activate/re-activate
//! ├── Service       - ServiceFault or bad serviceResult from the server
//! ├── Operation     - Per-node read/write failures
//! ├── Subscription  - Subscription and monitored item failures
//! ├── Conversion    - Value conversion errors
//! ├── Configuration - Invalid settings
//! └── Timeout       - Connect or request deadline exceeded
//! ```
//!
//! # Examples
//!
//! ```
//! use ualink_opcua::error::{ConnectionError, OpcUaError};
//!
//! let error = OpcUaError::connection(ConnectionError::refused("opc.tcp://localhost:4840"));
//! assert!(error.is_retryable());
//! assert!(error.is_connection_loss());
//! ```

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;
use tracing::Level;

use crate::status::StatusCode;

// =============================================================================
// OpcUaError - Main Error Type
// =============================================================================

/// The main error type for OPC UA client operations.
#[derive(Debug, Error)]
pub enum OpcUaError {
    /// Connection-related errors.
    #[error("{0}")]
    Connection(#[from] ConnectionError),

    /// Wire protocol errors.
    #[error("{0}")]
    Protocol(#[from] ProtocolError),

    /// Session lifecycle errors.
    #[error("{0}")]
    Session(#[from] SessionError),

    /// Service level failures reported by the server.
    #[error("{0}")]
    Service(#[from] ServiceError),

    /// Read/write operation errors.
    #[error("{0}")]
    Operation(#[from] OperationError),

    /// Subscription and monitoring errors.
    #[error("{0}")]
    Subscription(#[from] SubscriptionError),

    /// Data conversion errors.
    #[error("{0}")]
    Conversion(#[from] ConversionError),

    /// Configuration errors.
    #[error("{0}")]
    Configuration(#[from] ConfigurationError),

    /// Timeout errors.
    #[error("{0}")]
    Timeout(#[from] TimeoutError),
}

impl OpcUaError {
    // =========================================================================
    // Factory Methods
    // =========================================================================

    /// Creates a connection error.
    #[inline]
    pub fn connection(error: ConnectionError) -> Self {
        Self::Connection(error)
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(error: ProtocolError) -> Self {
        Self::Protocol(error)
    }

    /// Creates a session error.
    #[inline]
    pub fn session(error: SessionError) -> Self {
        Self::Session(error)
    }

    /// Creates a service error.
    #[inline]
    pub fn service(error: ServiceError) -> Self {
        Self::Service(error)
    }

    /// Creates an operation error.
    #[inline]
    pub fn operation(error: OperationError) -> Self {
        Self::Operation(error)
    }

    /// Creates a subscription error.
    #[inline]
    pub fn subscription(error: SubscriptionError) -> Self {
        Self::Subscription(error)
    }

    /// Creates a conversion error.
    #[inline]
    pub fn conversion(error: ConversionError) -> Self {
        Self::Conversion(error)
    }

    /// Creates a configuration error.
    #[inline]
    pub fn configuration(error: ConfigurationError) -> Self {
        Self::Configuration(error)
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(error: TimeoutError) -> Self {
        Self::Timeout(error)
    }

    /// Creates a "not connected" error.
    pub fn not_connected() -> Self {
        Self::Connection(ConnectionError::NotConnected)
    }

    /// Creates a "connection closed" error.
    pub fn connection_closed(reason: impl Into<String>) -> Self {
        Self::Connection(ConnectionError::closed(Some(reason.into())))
    }

    /// Creates a decoding error.
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Protocol(ProtocolError::decoding(message))
    }

    /// Creates a service fault error.
    pub fn service_fault(service: &'static str, status: StatusCode) -> Self {
        Self::Service(ServiceError::fault(service, status))
    }

    // =========================================================================
    // Error Properties
    // =========================================================================

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_retryable(),
            Self::Session(e) => e.is_retryable(),
            Self::Service(e) => e.is_retryable(),
            Self::Operation(e) => e.is_retryable(),
            Self::Subscription(e) => e.is_retryable(),
            Self::Timeout(_) => true,
            Self::Protocol(_) | Self::Conversion(_) | Self::Configuration(_) => false,
        }
    }

    /// Returns `true` if this error means the underlying connection is gone
    /// and a reconnect is required before further requests can succeed.
    pub fn is_connection_loss(&self) -> bool {
        match self {
            Self::Connection(e) => e.is_connection_loss(),
            Self::Service(e) => e.status().is_channel_loss(),
            _ => false,
        }
    }

    /// Returns `true` if the session is no longer valid on the server.
    pub fn is_session_invalid(&self) -> bool {
        match self {
            Self::Session(SessionError::Expired { .. }) => true,
            Self::Service(e) => e.status().is_session_loss(),
            _ => false,
        }
    }

    /// Returns the OPC UA status code carried by this error, if any.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Connection(ConnectionError::ServerError { status, .. }) => Some(*status),
            Self::Service(e) => Some(e.status()),
            Self::Operation(e) => e.status(),
            Self::Session(SessionError::ActivationFailed { status, .. }) => *status,
            Self::Timeout(_) => Some(StatusCode::BAD_TIMEOUT),
            _ => None,
        }
    }

    /// Returns the suggested retry delay for this error.
    pub fn suggested_retry_delay(&self) -> Option<Duration> {
        if !self.is_retryable() {
            return None;
        }

        match self {
            Self::Connection(e) => Some(e.suggested_retry_delay()),
            Self::Timeout(e) => Some(e.suggested_retry_delay()),
            Self::Session(_) => Some(Duration::from_secs(1)),
            _ => Some(Duration::from_millis(500)),
        }
    }

    /// Returns the severity level of this error.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Connection(e) => e.severity(),
            Self::Protocol(_) => ErrorSeverity::Error,
            Self::Session(_) => ErrorSeverity::Error,
            Self::Service(e) => e.severity(),
            Self::Operation(_) => ErrorSeverity::Warning,
            Self::Subscription(_) => ErrorSeverity::Warning,
            Self::Timeout(_) => ErrorSeverity::Warning,
            Self::Conversion(_) => ErrorSeverity::Error,
            Self::Configuration(_) => ErrorSeverity::Critical,
        }
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Protocol(_) => "protocol",
            Self::Session(_) => "session",
            Self::Service(_) => "service",
            Self::Operation(_) => "operation",
            Self::Subscription(_) => "subscription",
            Self::Conversion(_) => "conversion",
            Self::Configuration(_) => "configuration",
            Self::Timeout(_) => "timeout",
        }
    }

    /// Returns a unique error code for this error.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection(e) => e.error_code(),
            Self::Protocol(e) => e.error_code(),
            Self::Session(e) => e.error_code(),
            Self::Service(_) => ErrorCode::new(4, 1),
            Self::Operation(e) => e.error_code(),
            Self::Subscription(e) => e.error_code(),
            Self::Conversion(_) => ErrorCode::new(7, 1),
            Self::Configuration(e) => e.error_code(),
            Self::Timeout(e) => e.error_code(),
        }
    }

    /// Returns recovery hints for this error.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Connection(e) => e.recovery_hints(),
            Self::Protocol(_) => vec![
                "The server sent data outside the supported binary subset",
                "Enable debug logging to inspect the offending message",
            ],
            Self::Session(_) => vec![
                "Check the user identity configured for the session",
                "The client re-creates the session automatically after reconnecting",
            ],
            Self::Service(_) => vec!["Inspect the status code returned by the server"],
            Self::Operation(_) => vec![
                "Verify the node id exists on the server",
                "Check the node's access level",
            ],
            Self::Subscription(_) => vec!["Check the subscription and item settings"],
            Self::Conversion(_) => vec!["Check the requested data type against the node's type"],
            Self::Configuration(e) => e.recovery_hints(),
            Self::Timeout(_) => vec![
                "Check network connectivity",
                "Increase the request timeout",
            ],
        }
    }

    /// Returns the tracing level for this error.
    pub fn tracing_level(&self) -> Level {
        self.severity().to_tracing_level()
    }

    /// Logs this error with appropriate level and context.
    pub fn log(&self, context: &str) {
        let code = self.error_code();

        match self.tracing_level() {
            Level::ERROR => tracing::error!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            Level::WARN => tracing::warn!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
            _ => tracing::debug!(
                error_code = %code,
                category = self.category(),
                context = context,
                retryable = self.is_retryable(),
                "{self}"
            ),
        }
    }
}

impl From<io::Error> for OpcUaError {
    fn from(error: io::Error) -> Self {
        Self::Connection(ConnectionError::from(error))
    }
}

// =============================================================================
// ConnectionError
// =============================================================================

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Connection refused.
    #[error("Connection refused to '{endpoint}'")]
    Refused {
        /// Target endpoint.
        endpoint: String,
        /// Underlying error.
        #[source]
        source: Option<io::Error>,
    },

    /// Connection timed out.
    #[error("Connection timed out to '{endpoint}' after {duration:?}")]
    TimedOut {
        /// Target endpoint.
        endpoint: String,
        /// Timeout duration.
        duration: Duration,
    },

    /// Host name could not be resolved.
    #[error("Could not resolve '{host}'")]
    Unresolved {
        /// Host name.
        host: String,
    },

    /// Invalid endpoint URL.
    #[error("Invalid endpoint URL: '{url}' - {reason}")]
    InvalidEndpoint {
        /// The invalid URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// The server answered with an ERR message.
    #[error("Server error {status}: {reason}")]
    ServerError {
        /// Status code sent by the server.
        status: StatusCode,
        /// Reason text sent by the server.
        reason: String,
    },

    /// Connection closed.
    #[error("Connection closed{}", reason.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    Closed {
        /// Reason for closure.
        reason: Option<String>,
    },

    /// Not connected.
    #[error("Not connected to OPC UA server")]
    NotConnected,

    /// Generic I/O error.
    #[error("I/O error: {message}")]
    Io {
        /// Error message.
        message: String,
        /// Underlying error.
        #[source]
        source: io::Error,
    },
}

impl ConnectionError {
    /// Creates a connection refused error.
    pub fn refused(endpoint: impl Into<String>) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            source: None,
        }
    }

    /// Creates a connection refused error with the underlying I/O error.
    pub fn refused_with(endpoint: impl Into<String>, source: io::Error) -> Self {
        Self::Refused {
            endpoint: endpoint.into(),
            source: Some(source),
        }
    }

    /// Creates a connection timeout error.
    pub fn timed_out(endpoint: impl Into<String>, duration: Duration) -> Self {
        Self::TimedOut {
            endpoint: endpoint.into(),
            duration,
        }
    }

    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a server error from an ERR message.
    pub fn server_error(status: StatusCode, reason: impl Into<String>) -> Self {
        Self::ServerError {
            status,
            reason: reason.into(),
        }
    }

    /// Creates a connection closed error.
    pub fn closed(reason: Option<String>) -> Self {
        Self::Closed { reason }
    }

    /// Creates an I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Refused { .. }
            | Self::TimedOut { .. }
            | Self::Closed { .. }
            | Self::NotConnected
            | Self::Io { .. } => true,
            Self::ServerError { status, .. } => !matches!(
                *status,
                StatusCode::BAD_TCP_ENDPOINT_URL_INVALID
                    | StatusCode::BAD_PROTOCOL_VERSION_UNSUPPORTED
                    | StatusCode::BAD_SECURITY_POLICY_REJECTED
            ),
            Self::Unresolved { .. } | Self::InvalidEndpoint { .. } => false,
        }
    }

    /// Returns `true` if the transport is unusable after this error.
    pub fn is_connection_loss(&self) -> bool {
        !matches!(self, Self::InvalidEndpoint { .. } | Self::Unresolved { .. })
    }

    /// Returns the suggested retry delay.
    pub fn suggested_retry_delay(&self) -> Duration {
        match self {
            Self::Refused { .. } => Duration::from_secs(5),
            Self::TimedOut { .. } => Duration::from_secs(2),
            Self::ServerError { .. } => Duration::from_secs(3),
            _ => Duration::from_secs(1),
        }
    }

    /// Returns the severity level.
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::InvalidEndpoint { .. } | Self::Unresolved { .. } => ErrorSeverity::Critical,
            Self::NotConnected => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Refused { .. } => ErrorCode::new(1, 1),
            Self::TimedOut { .. } => ErrorCode::new(1, 2),
            Self::Unresolved { .. } => ErrorCode::new(1, 3),
            Self::InvalidEndpoint { .. } => ErrorCode::new(1, 4),
            Self::ServerError { .. } => ErrorCode::new(1, 5),
            Self::Closed { .. } => ErrorCode::new(1, 6),
            Self::NotConnected => ErrorCode::new(1, 7),
            Self::Io { .. } => ErrorCode::new(1, 8),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::Refused { .. } => vec![
                "Verify the OPC UA server is running",
                "Check the port in the endpoint URL",
            ],
            Self::TimedOut { .. } => vec![
                "Check network connectivity",
                "Increase connect_timeout",
            ],
            Self::Unresolved { .. } => vec!["Check the host name or use an IP address"],
            Self::InvalidEndpoint { .. } => vec!["Use format: opc.tcp://hostname:port/path"],
            Self::ServerError { .. } => vec!["Read the reason reported by the server"],
            Self::Closed { .. } | Self::Io { .. } => vec![
                "The client reconnects automatically",
                "Check server logs for the disconnect reason",
            ],
            Self::NotConnected => vec!["Call connect() first or wait for reconnection"],
        }
    }
}

impl From<io::Error> for ConnectionError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::ConnectionRefused => Self::Refused {
                endpoint: String::new(),
                source: Some(error),
            },
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::Closed {
                reason: Some(error.to_string()),
            },
            _ => Self::Io {
                message: error.to_string(),
                source: error,
            },
        }
    }
}

// =============================================================================
// ProtocolError
// =============================================================================

/// Binary encoding, framing and correlation errors.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed or truncated binary data.
    #[error("Decoding error: {message}")]
    Decoding {
        /// Description.
        message: String,
    },

    /// A decode limit was exceeded.
    #[error("{what} length {length} exceeds limit {max}")]
    LimitExceeded {
        /// Kind of value being decoded.
        what: &'static str,
        /// Length announced on the wire.
        length: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Unknown or unexpected message type in a frame header.
    #[error("Unexpected message type '{found}'")]
    UnexpectedMessage {
        /// Message type found.
        found: String,
    },

    /// A message would exceed the negotiated size limits.
    #[error("Message of {size} bytes exceeds limit of {max} bytes")]
    MessageTooLarge {
        /// Message size.
        size: usize,
        /// Allowed size.
        max: usize,
    },

    /// A message would need more chunks than allowed.
    #[error("Message needs {count} chunks, limit is {max}")]
    TooManyChunks {
        /// Required chunk count.
        count: usize,
        /// Allowed chunk count.
        max: usize,
    },

    /// Sequence number did not follow the previous one.
    #[error("Sequence number {received} does not follow {previous}")]
    SequenceMismatch {
        /// Previous sequence number.
        previous: u32,
        /// Received sequence number.
        received: u32,
    },

    /// Secure channel id of an incoming chunk does not match.
    #[error("Secure channel id {received} does not match {expected}")]
    ChannelMismatch {
        /// Expected channel id.
        expected: u32,
        /// Received channel id.
        received: u32,
    },

    /// Response type does not match the request.
    #[error("Expected response type i={expected}, received i={received}")]
    UnexpectedResponse {
        /// Expected binary encoding id.
        expected: u32,
        /// Received binary encoding id.
        received: u32,
    },

    /// Response request handle does not match the request.
    #[error("Response handle {received} does not match request handle {expected}")]
    HandleMismatch {
        /// Request handle sent.
        expected: u32,
        /// Request handle received.
        received: u32,
    },

    /// Response carried a different number of results than requested.
    #[error("{service} returned {received} results for {expected} operations")]
    ResultCountMismatch {
        /// Service name.
        service: &'static str,
        /// Operations sent.
        expected: usize,
        /// Results received.
        received: usize,
    },

    /// The server aborted a multi-chunk message.
    #[error("Message for request {request_id} aborted by peer: {status} {reason}")]
    Aborted {
        /// Request id of the aborted message.
        request_id: u32,
        /// Status code sent in the abort chunk.
        status: StatusCode,
        /// Reason text sent in the abort chunk.
        reason: String,
    },
}

impl ProtocolError {
    /// Creates a decoding error.
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }

    /// Creates a truncated-input error.
    pub fn truncated(needed: usize, remaining: usize) -> Self {
        Self::Decoding {
            message: format!("needed {needed} bytes, {remaining} remaining"),
        }
    }

    /// Creates a limit exceeded error.
    pub fn limit_exceeded(what: &'static str, length: usize, max: usize) -> Self {
        Self::LimitExceeded { what, length, max }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Decoding { .. } => ErrorCode::new(2, 1),
            Self::LimitExceeded { .. } => ErrorCode::new(2, 2),
            Self::UnexpectedMessage { .. } => ErrorCode::new(2, 3),
            Self::MessageTooLarge { .. } => ErrorCode::new(2, 4),
            Self::TooManyChunks { .. } => ErrorCode::new(2, 5),
            Self::SequenceMismatch { .. } => ErrorCode::new(2, 6),
            Self::ChannelMismatch { .. } => ErrorCode::new(2, 7),
            Self::UnexpectedResponse { .. } => ErrorCode::new(2, 8),
            Self::HandleMismatch { .. } => ErrorCode::new(2, 9),
            Self::ResultCountMismatch { .. } => ErrorCode::new(2, 10),
            Self::Aborted { .. } => ErrorCode::new(2, 11),
        }
    }

    /// Returns the status code that best describes this error on the wire.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Decoding { .. } => StatusCode::BAD_DECODING_ERROR,
            Self::LimitExceeded { .. } => StatusCode::BAD_ENCODING_LIMITS_EXCEEDED,
            Self::UnexpectedMessage { .. } => StatusCode::BAD_TCP_MESSAGE_TYPE_INVALID,
            Self::MessageTooLarge { .. } | Self::TooManyChunks { .. } => {
                StatusCode::BAD_TCP_MESSAGE_TOO_LARGE
            }
            Self::SequenceMismatch { .. } => StatusCode::BAD_SEQUENCE_NUMBER_INVALID,
            Self::ChannelMismatch { .. } => StatusCode::BAD_TCP_SECURE_CHANNEL_UNKNOWN,
            Self::UnexpectedResponse { .. } | Self::HandleMismatch { .. } => {
                StatusCode::BAD_UNKNOWN_RESPONSE
            }
            Self::ResultCountMismatch { .. } => StatusCode::BAD_UNEXPECTED_ERROR,
            Self::Aborted { status, .. } => *status,
        }
    }

    /// Returns `true` if the channel cannot be trusted after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnexpectedMessage { .. }
                | Self::SequenceMismatch { .. }
                | Self::ChannelMismatch { .. }
                | Self::MessageTooLarge { .. }
                | Self::TooManyChunks { .. }
        )
    }
}

// =============================================================================
// SessionError
// =============================================================================

/// Session lifecycle errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session creation failed.
    #[error("Session creation failed: {message}")]
    CreationFailed {
        /// Error message.
        message: String,
    },

    /// Session activation failed.
    #[error("Session activation failed: {message}")]
    ActivationFailed {
        /// Error message.
        message: String,
        /// Status code returned by the server, if any.
        status: Option<StatusCode>,
    },

    /// Session expired or was dropped by the server.
    #[error("Session expired{}", session_id.as_ref().map(|s| format!(": {s}")).unwrap_or_default())]
    Expired {
        /// Session ID.
        session_id: Option<String>,
    },

    /// Session is not active.
    #[error("Session not active (state: {state})")]
    NotActive {
        /// Current state name.
        state: String,
    },

    /// The session was closed and cannot be used again.
    #[error("Session closed")]
    Closed,
}

impl SessionError {
    /// Creates a creation failed error.
    pub fn creation_failed(message: impl Into<String>) -> Self {
        Self::CreationFailed {
            message: message.into(),
        }
    }

    /// Creates an activation failed error.
    pub fn activation_failed(message: impl Into<String>, status: Option<StatusCode>) -> Self {
        Self::ActivationFailed {
            message: message.into(),
            status,
        }
    }

    /// Creates a session expired error.
    pub fn expired(session_id: Option<String>) -> Self {
        Self::Expired { session_id }
    }

    /// Creates a not active error.
    pub fn not_active(state: impl fmt::Display) -> Self {
        Self::NotActive {
            state: state.to_string(),
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CreationFailed { .. } | Self::Expired { .. } | Self::NotActive { .. }
        )
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::CreationFailed { .. } => ErrorCode::new(3, 1),
            Self::ActivationFailed { .. } => ErrorCode::new(3, 2),
            Self::Expired { .. } => ErrorCode::new(3, 3),
            Self::NotActive { .. } => ErrorCode::new(3, 4),
            Self::Closed => ErrorCode::new(3, 5),
        }
    }
}

// =============================================================================
// ServiceError
// =============================================================================

/// A service call was rejected by the server.
#[derive(Debug, Error)]
#[error("{service} failed: {status}")]
pub struct ServiceError {
    /// Name of the service.
    pub service: &'static str,
    /// Service result sent by the server.
    pub status: StatusCode,
}

impl ServiceError {
    /// Creates a service fault.
    pub fn fault(service: &'static str, status: StatusCode) -> Self {
        Self { service, status }
    }

    /// Returns the status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns `true` if the call may succeed when repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.status,
            StatusCode::BAD_TIMEOUT
                | StatusCode::BAD_TOO_MANY_OPERATIONS
                | StatusCode::BAD_RESOURCE_UNAVAILABLE
                | StatusCode::BAD_SERVER_HALTED
                | StatusCode::BAD_TCP_SERVER_TOO_BUSY
        ) || self.status.is_session_loss()
    }

    /// Returns the severity.
    pub fn severity(&self) -> ErrorSeverity {
        if self.status.is_session_loss() || self.status.is_channel_loss() {
            ErrorSeverity::Error
        } else {
            ErrorSeverity::Warning
        }
    }
}

// =============================================================================
// OperationError
// =============================================================================

/// Per-node read/write errors.
#[derive(Debug, Error)]
pub enum OperationError {
    /// Read failed.
    #[error("Read failed for node '{node_id}': {message}")]
    ReadFailed {
        /// Node ID.
        node_id: String,
        /// Error message.
        message: String,
        /// Status code, if any.
        status: Option<StatusCode>,
    },

    /// Write failed.
    #[error("Write failed for node '{node_id}': {message}")]
    WriteFailed {
        /// Node ID.
        node_id: String,
        /// Error message.
        message: String,
        /// Status code, if any.
        status: Option<StatusCode>,
    },

    /// Browse failed.
    #[error("Browse failed for node '{node_id}': {status}")]
    BrowseFailed {
        /// Node ID.
        node_id: String,
        /// Status code.
        status: StatusCode,
    },

    /// Invalid node id text.
    #[error("Invalid node ID '{node_id}': {reason}")]
    InvalidNodeId {
        /// Node id text.
        node_id: String,
        /// Reason.
        reason: String,
    },
}

impl OperationError {
    /// Creates a read failed error with a status code.
    pub fn read_failed(node_id: impl fmt::Display, status: StatusCode) -> Self {
        Self::ReadFailed {
            node_id: node_id.to_string(),
            message: status.to_string(),
            status: Some(status),
        }
    }

    /// Creates a write failed error with a status code.
    pub fn write_failed(node_id: impl fmt::Display, status: StatusCode) -> Self {
        Self::WriteFailed {
            node_id: node_id.to_string(),
            message: status.to_string(),
            status: Some(status),
        }
    }

    /// Creates a browse failed error.
    pub fn browse_failed(node_id: impl fmt::Display, status: StatusCode) -> Self {
        Self::BrowseFailed {
            node_id: node_id.to_string(),
            status,
        }
    }

    /// Creates an invalid node id error.
    pub fn invalid_node_id(node_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidNodeId {
            node_id: node_id.into(),
            reason: reason.into(),
        }
    }

    /// Returns the status code, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::ReadFailed { status, .. } | Self::WriteFailed { status, .. } => *status,
            Self::BrowseFailed { status, .. } => Some(*status),
            Self::InvalidNodeId { .. } => None,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        self.status().is_some_and(|s| {
            matches!(
                s,
                StatusCode::BAD_TIMEOUT
                    | StatusCode::BAD_RESOURCE_UNAVAILABLE
                    | StatusCode::BAD_WAITING_FOR_INITIAL_DATA
                    | StatusCode::BAD_NO_COMMUNICATION
            )
        })
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::ReadFailed { .. } => ErrorCode::new(5, 1),
            Self::WriteFailed { .. } => ErrorCode::new(5, 2),
            Self::BrowseFailed { .. } => ErrorCode::new(5, 3),
            Self::InvalidNodeId { .. } => ErrorCode::new(5, 4),
        }
    }
}

// =============================================================================
// SubscriptionError
// =============================================================================

/// Subscription and monitored item errors.
#[derive(Debug, Error)]
pub enum SubscriptionError {
    /// Subscription not found.
    #[error("Subscription {subscription_id} not found")]
    NotFound {
        /// Subscription ID.
        subscription_id: u32,
    },

    /// Monitored item creation was rejected.
    #[error("Monitored item for '{node_id}' rejected: {status}")]
    MonitoredItemFailed {
        /// Node ID.
        node_id: String,
        /// Status code.
        status: StatusCode,
    },

    /// The publish loop is not running.
    #[error("Publish loop is not running")]
    PublishStopped,
}

impl SubscriptionError {
    /// Creates a not found error.
    pub fn not_found(subscription_id: u32) -> Self {
        Self::NotFound { subscription_id }
    }

    /// Creates a monitored item failed error.
    pub fn monitored_item_failed(node_id: impl fmt::Display, status: StatusCode) -> Self {
        Self::MonitoredItemFailed {
            node_id: node_id.to_string(),
            status,
        }
    }

    /// Returns `true` if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PublishStopped)
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::new(6, 1),
            Self::MonitoredItemFailed { .. } => ErrorCode::new(6, 2),
            Self::PublishStopped => ErrorCode::new(6, 3),
        }
    }
}

// =============================================================================
// ConversionError
// =============================================================================

/// Value conversion errors.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Text could not be parsed as the target type.
    #[error("Cannot convert '{input}' to {target_type}: {reason}")]
    InvalidValue {
        /// Input text.
        input: String,
        /// Target type name.
        target_type: String,
        /// Reason.
        reason: String,
    },

    /// Value does not have the expected type.
    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// Data type name not recognized.
    #[error("Unsupported data type '{type_name}'")]
    UnsupportedType {
        /// Type name.
        type_name: String,
    },
}

impl ConversionError {
    /// Creates an invalid value error.
    pub fn invalid_value(
        input: impl Into<String>,
        target_type: impl fmt::Display,
        reason: impl fmt::Display,
    ) -> Self {
        Self::InvalidValue {
            input: input.into(),
            target_type: target_type.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates an unsupported type error.
    pub fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }
}

// =============================================================================
// ConfigurationError
// =============================================================================

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// Invalid endpoint URL.
    #[error("Invalid endpoint '{url}': {reason}")]
    InvalidEndpoint {
        /// Endpoint URL.
        url: String,
        /// Reason.
        reason: String,
    },

    /// Invalid timeout value.
    #[error("Invalid {field}: {reason}")]
    InvalidTimeout {
        /// Field name.
        field: &'static str,
        /// Reason.
        reason: String,
    },

    /// Invalid limit value.
    #[error("Invalid {field}: {reason}")]
    InvalidLimit {
        /// Field name.
        field: &'static str,
        /// Reason.
        reason: String,
    },

    /// Required field missing.
    #[error("Missing required field '{field}'")]
    MissingField {
        /// Field name.
        field: &'static str,
    },
}

impl ConfigurationError {
    /// Creates an invalid endpoint error.
    pub fn invalid_endpoint(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEndpoint {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates an invalid timeout error.
    pub fn invalid_timeout(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidTimeout {
            field,
            reason: reason.into(),
        }
    }

    /// Creates an invalid limit error.
    pub fn invalid_limit(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidLimit {
            field,
            reason: reason.into(),
        }
    }

    /// Creates a missing field error.
    pub fn missing_field(field: &'static str) -> Self {
        Self::MissingField { field }
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::InvalidEndpoint { .. } => ErrorCode::new(8, 1),
            Self::InvalidTimeout { .. } => ErrorCode::new(8, 2),
            Self::InvalidLimit { .. } => ErrorCode::new(8, 3),
            Self::MissingField { .. } => ErrorCode::new(8, 4),
        }
    }

    /// Returns recovery hints.
    pub fn recovery_hints(&self) -> Vec<&'static str> {
        match self {
            Self::InvalidEndpoint { .. } => vec![
                "Use format: opc.tcp://hostname:port/path",
                "Standard OPC UA port is 4840",
            ],
            Self::InvalidTimeout { .. } => vec!["Timeouts must be greater than zero"],
            Self::InvalidLimit { .. } => vec!["Buffer sizes must be at least 8192 bytes"],
            Self::MissingField { .. } => vec!["Check the configuration file for required fields"],
        }
    }
}

// =============================================================================
// TimeoutError
// =============================================================================

/// Timeout errors.
#[derive(Debug, Error)]
pub enum TimeoutError {
    /// Connect and handshake timeout.
    #[error("Connection timed out after {duration:?}")]
    Connection {
        /// Timeout duration.
        duration: Duration,
    },

    /// Request timeout.
    #[error("{service} request {request_id} timed out after {duration:?}")]
    Request {
        /// Service name.
        service: &'static str,
        /// Secure channel request id.
        request_id: u32,
        /// Timeout duration.
        duration: Duration,
    },
}

impl TimeoutError {
    /// Creates a connection timeout.
    pub fn connection(duration: Duration) -> Self {
        Self::Connection { duration }
    }

    /// Creates a request timeout.
    pub fn request(service: &'static str, request_id: u32, duration: Duration) -> Self {
        Self::Request {
            service,
            request_id,
            duration,
        }
    }

    /// Returns the timeout duration.
    pub fn duration(&self) -> Duration {
        match self {
            Self::Connection { duration } | Self::Request { duration, .. } => *duration,
        }
    }

    /// Returns the suggested retry delay.
    pub fn suggested_retry_delay(&self) -> Duration {
        self.duration().mul_f32(0.5).max(Duration::from_millis(500))
    }

    /// Returns the error code.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::Connection { .. } => ErrorCode::new(9, 1),
            Self::Request { .. } => ErrorCode::new(9, 2),
        }
    }
}

// =============================================================================
// ErrorSeverity
// =============================================================================

/// Error severity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ErrorSeverity {
    /// Informational, not really an error.
    Info,
    /// Warning, operation may succeed on retry.
    Warning,
    /// Error, operation failed.
    Error,
    /// Critical, requires immediate attention.
    Critical,
}

impl ErrorSeverity {
    /// Converts to a tracing level.
    pub fn to_tracing_level(&self) -> Level {
        match self {
            Self::Info => Level::INFO,
            Self::Warning => Level::WARN,
            Self::Error | Self::Critical => Level::ERROR,
        }
    }
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

// =============================================================================
// ErrorCode
// =============================================================================

/// Unique error code for identification in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode {
    /// Category code.
    pub category: u8,
    /// Specific error code within category.
    pub code: u8,
}

impl ErrorCode {
    /// Creates a new error code.
    pub const fn new(category: u8, code: u8) -> Self {
        Self { category, code }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UA-{:02X}{:02X}", self.category, self.code)
    }
}

// =============================================================================
// Result Types
// =============================================================================

/// Result type for OPC UA client operations.
pub type OpcUaResult<T> = Result<T, OpcUaError>;

/// Result type for binary decoding.
pub type CodecResult<T> = Result<T, ProtocolError>;

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_error_properties() {
        let error = OpcUaError::connection(ConnectionError::refused("opc.tcp://localhost:4840"));
        assert!(error.is_retryable());
        assert!(error.is_connection_loss());
        assert_eq!(error.category(), "connection");
        assert_eq!(error.error_code().to_string(), "UA-0101");
    }

    #[test]
    fn test_invalid_endpoint_is_not_connection_loss() {
        let error = OpcUaError::connection(ConnectionError::invalid_endpoint("http://x", "scheme"));
        assert!(!error.is_retryable());
        assert!(!error.is_connection_loss());
        assert_eq!(error.severity(), ErrorSeverity::Critical);
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        let error: OpcUaError = io_err.into();
        assert!(matches!(
            error,
            OpcUaError::Connection(ConnectionError::Closed { .. })
        ));
        assert!(error.is_connection_loss());
    }

    #[test]
    fn test_service_error_session_loss() {
        let error = OpcUaError::service_fault("Read", StatusCode::BAD_SESSION_ID_INVALID);
        assert!(error.is_session_invalid());
        assert!(!error.is_connection_loss());
        assert_eq!(error.status_code(), Some(StatusCode::BAD_SESSION_ID_INVALID));
        assert!(error.to_string().contains("BadSessionIdInvalid"));
    }

    #[test]
    fn test_timeout_error() {
        let error = TimeoutError::request("Read", 7, Duration::from_secs(4));
        assert_eq!(error.duration(), Duration::from_secs(4));
        assert_eq!(error.suggested_retry_delay(), Duration::from_secs(2));
        assert!(error.to_string().contains("request 7"));

        let wrapped = OpcUaError::timeout(error);
        assert!(wrapped.is_retryable());
        assert_eq!(wrapped.status_code(), Some(StatusCode::BAD_TIMEOUT));
    }

    #[test]
    fn test_protocol_error_status() {
        let error = ProtocolError::SequenceMismatch {
            previous: 10,
            received: 12,
        };
        assert!(error.is_fatal());
        assert_eq!(error.status_code(), StatusCode::BAD_SEQUENCE_NUMBER_INVALID);
        assert!(!ProtocolError::decoding("x").is_fatal());
    }

    #[test]
    fn test_closed_display() {
        assert_eq!(
            ConnectionError::closed(Some("reset".into())).to_string(),
            "Connection closed: reset"
        );
        assert_eq!(ConnectionError::closed(None).to_string(), "Connection closed");
    }

    #[test]
    fn test_severity_ordering() {
        assert!(ErrorSeverity::Info < ErrorSeverity::Warning);
        assert!(ErrorSeverity::Error < ErrorSeverity::Critical);
        assert_eq!(ErrorSeverity::Critical.to_tracing_level(), Level::ERROR);
    }
}
