// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA status codes.
//!
//! A status code is a 32-bit value: the top two bits carry the severity
//! (00 good, 01 uncertain, 10/11 bad), bits 16..28 the sub-code and the low
//! 16 bits optional info flags. Names are resolved on the severity and
//! sub-code only.

use std::fmt;

use serde::{Deserialize, Serialize};

/// OPC UA status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(pub u32);

macro_rules! status_codes {
    ($($konst:ident = $value:literal => $name:literal,)*) => {
        impl StatusCode {
            $(
                #[doc = $name]
                pub const $konst: StatusCode = StatusCode($value);
            )*

            /// Returns the symbolic name, or the severity name for codes
            /// outside the known table.
            pub fn name(&self) -> &'static str {
                match self.0 & 0xFFFF_0000 {
                    $($value => $name,)*
                    _ if self.is_good() => "Good",
                    _ if self.is_uncertain() => "Uncertain",
                    _ => "Bad",
                }
            }
        }
    };
}

status_codes! {
    GOOD = 0x0000_0000 => "Good",
    GOOD_SUBSCRIPTION_TRANSFERRED = 0x002D_0000 => "GoodSubscriptionTransferred",
    GOOD_COMPLETES_ASYNCHRONOUSLY = 0x002E_0000 => "GoodCompletesAsynchronously",
    GOOD_OVERLOAD = 0x002F_0000 => "GoodOverload",
    GOOD_CLAMPED = 0x0030_0000 => "GoodClamped",
    UNCERTAIN = 0x4000_0000 => "Uncertain",
    UNCERTAIN_LAST_USABLE_VALUE = 0x4090_0000 => "UncertainLastUsableValue",
    UNCERTAIN_INITIAL_VALUE = 0x4092_0000 => "UncertainInitialValue",
    BAD = 0x8000_0000 => "Bad",
    BAD_UNEXPECTED_ERROR = 0x8001_0000 => "BadUnexpectedError",
    BAD_INTERNAL_ERROR = 0x8002_0000 => "BadInternalError",
    BAD_OUT_OF_MEMORY = 0x8003_0000 => "BadOutOfMemory",
    BAD_RESOURCE_UNAVAILABLE = 0x8004_0000 => "BadResourceUnavailable",
    BAD_COMMUNICATION_ERROR = 0x8005_0000 => "BadCommunicationError",
    BAD_ENCODING_ERROR = 0x8006_0000 => "BadEncodingError",
    BAD_DECODING_ERROR = 0x8007_0000 => "BadDecodingError",
    BAD_ENCODING_LIMITS_EXCEEDED = 0x8008_0000 => "BadEncodingLimitsExceeded",
    BAD_UNKNOWN_RESPONSE = 0x8009_0000 => "BadUnknownResponse",
    BAD_TIMEOUT = 0x800A_0000 => "BadTimeout",
    BAD_SERVICE_UNSUPPORTED = 0x800B_0000 => "BadServiceUnsupported",
    BAD_SHUTDOWN = 0x800C_0000 => "BadShutdown",
    BAD_SERVER_NOT_CONNECTED = 0x800D_0000 => "BadServerNotConnected",
    BAD_SERVER_HALTED = 0x800E_0000 => "BadServerHalted",
    BAD_NOTHING_TO_DO = 0x800F_0000 => "BadNothingToDo",
    BAD_TOO_MANY_OPERATIONS = 0x8010_0000 => "BadTooManyOperations",
    BAD_DATA_TYPE_ID_UNKNOWN = 0x8011_0000 => "BadDataTypeIdUnknown",
    BAD_CERTIFICATE_INVALID = 0x8012_0000 => "BadCertificateInvalid",
    BAD_SECURITY_CHECKS_FAILED = 0x8013_0000 => "BadSecurityChecksFailed",
    BAD_USER_ACCESS_DENIED = 0x801F_0000 => "BadUserAccessDenied",
    BAD_IDENTITY_TOKEN_INVALID = 0x8020_0000 => "BadIdentityTokenInvalid",
    BAD_IDENTITY_TOKEN_REJECTED = 0x8021_0000 => "BadIdentityTokenRejected",
    BAD_SECURE_CHANNEL_ID_INVALID = 0x8022_0000 => "BadSecureChannelIdInvalid",
    BAD_INVALID_TIMESTAMP = 0x8023_0000 => "BadInvalidTimestamp",
    BAD_NONCE_INVALID = 0x8024_0000 => "BadNonceInvalid",
    BAD_SESSION_ID_INVALID = 0x8025_0000 => "BadSessionIdInvalid",
    BAD_SESSION_CLOSED = 0x8026_0000 => "BadSessionClosed",
    BAD_SESSION_NOT_ACTIVATED = 0x8027_0000 => "BadSessionNotActivated",
    BAD_SUBSCRIPTION_ID_INVALID = 0x8028_0000 => "BadSubscriptionIdInvalid",
    BAD_REQUEST_HEADER_INVALID = 0x802A_0000 => "BadRequestHeaderInvalid",
    BAD_TIMESTAMPS_TO_RETURN_INVALID = 0x802B_0000 => "BadTimestampsToReturnInvalid",
    BAD_REQUEST_CANCELLED_BY_CLIENT = 0x802C_0000 => "BadRequestCancelledByClient",
    BAD_NO_COMMUNICATION = 0x8031_0000 => "BadNoCommunication",
    BAD_WAITING_FOR_INITIAL_DATA = 0x8032_0000 => "BadWaitingForInitialData",
    BAD_NODE_ID_INVALID = 0x8033_0000 => "BadNodeIdInvalid",
    BAD_NODE_ID_UNKNOWN = 0x8034_0000 => "BadNodeIdUnknown",
    BAD_ATTRIBUTE_ID_INVALID = 0x8035_0000 => "BadAttributeIdInvalid",
    BAD_INDEX_RANGE_INVALID = 0x8036_0000 => "BadIndexRangeInvalid",
    BAD_INDEX_RANGE_NO_DATA = 0x8037_0000 => "BadIndexRangeNoData",
    BAD_DATA_ENCODING_INVALID = 0x8038_0000 => "BadDataEncodingInvalid",
    BAD_DATA_ENCODING_UNSUPPORTED = 0x8039_0000 => "BadDataEncodingUnsupported",
    BAD_NOT_READABLE = 0x803A_0000 => "BadNotReadable",
    BAD_NOT_WRITABLE = 0x803B_0000 => "BadNotWritable",
    BAD_OUT_OF_RANGE = 0x803C_0000 => "BadOutOfRange",
    BAD_NOT_SUPPORTED = 0x803D_0000 => "BadNotSupported",
    BAD_NOT_FOUND = 0x803E_0000 => "BadNotFound",
    BAD_OBJECT_DELETED = 0x803F_0000 => "BadObjectDeleted",
    BAD_NOT_IMPLEMENTED = 0x8040_0000 => "BadNotImplemented",
    BAD_MONITORING_MODE_INVALID = 0x8041_0000 => "BadMonitoringModeInvalid",
    BAD_MONITORED_ITEM_ID_INVALID = 0x8042_0000 => "BadMonitoredItemIdInvalid",
    BAD_MONITORED_ITEM_FILTER_INVALID = 0x8043_0000 => "BadMonitoredItemFilterInvalid",
    BAD_CONTINUATION_POINT_INVALID = 0x804A_0000 => "BadContinuationPointInvalid",
    BAD_NO_CONTINUATION_POINTS = 0x804B_0000 => "BadNoContinuationPoints",
    BAD_REFERENCE_TYPE_ID_INVALID = 0x804C_0000 => "BadReferenceTypeIdInvalid",
    BAD_BROWSE_DIRECTION_INVALID = 0x804D_0000 => "BadBrowseDirectionInvalid",
    BAD_NODE_NOT_IN_VIEW = 0x804E_0000 => "BadNodeNotInView",
    BAD_SECURITY_MODE_REJECTED = 0x8054_0000 => "BadSecurityModeRejected",
    BAD_SECURITY_POLICY_REJECTED = 0x8055_0000 => "BadSecurityPolicyRejected",
    BAD_TOO_MANY_SESSIONS = 0x8056_0000 => "BadTooManySessions",
    BAD_WRITE_NOT_SUPPORTED = 0x8073_0000 => "BadWriteNotSupported",
    BAD_TYPE_MISMATCH = 0x8074_0000 => "BadTypeMismatch",
    BAD_TOO_MANY_PUBLISH_REQUESTS = 0x8078_0000 => "BadTooManyPublishRequests",
    BAD_NO_SUBSCRIPTION = 0x8079_0000 => "BadNoSubscription",
    BAD_SEQUENCE_NUMBER_UNKNOWN = 0x807A_0000 => "BadSequenceNumberUnknown",
    BAD_MESSAGE_NOT_AVAILABLE = 0x807B_0000 => "BadMessageNotAvailable",
    BAD_TCP_SERVER_TOO_BUSY = 0x807D_0000 => "BadTcpServerTooBusy",
    BAD_TCP_MESSAGE_TYPE_INVALID = 0x807E_0000 => "BadTcpMessageTypeInvalid",
    BAD_TCP_SECURE_CHANNEL_UNKNOWN = 0x807F_0000 => "BadTcpSecureChannelUnknown",
    BAD_TCP_MESSAGE_TOO_LARGE = 0x8080_0000 => "BadTcpMessageTooLarge",
    BAD_TCP_NOT_ENOUGH_RESOURCES = 0x8081_0000 => "BadTcpNotEnoughResources",
    BAD_TCP_INTERNAL_ERROR = 0x8082_0000 => "BadTcpInternalError",
    BAD_TCP_ENDPOINT_URL_INVALID = 0x8083_0000 => "BadTcpEndpointUrlInvalid",
    BAD_REQUEST_INTERRUPTED = 0x8084_0000 => "BadRequestInterrupted",
    BAD_REQUEST_TIMEOUT = 0x8085_0000 => "BadRequestTimeout",
    BAD_SECURE_CHANNEL_CLOSED = 0x8086_0000 => "BadSecureChannelClosed",
    BAD_SECURE_CHANNEL_TOKEN_UNKNOWN = 0x8087_0000 => "BadSecureChannelTokenUnknown",
    BAD_SEQUENCE_NUMBER_INVALID = 0x8088_0000 => "BadSequenceNumberInvalid",
    BAD_CONFIGURATION_ERROR = 0x8089_0000 => "BadConfigurationError",
    BAD_NOT_CONNECTED = 0x808A_0000 => "BadNotConnected",
    BAD_DEVICE_FAILURE = 0x808B_0000 => "BadDeviceFailure",
    BAD_SENSOR_FAILURE = 0x808C_0000 => "BadSensorFailure",
    BAD_OUT_OF_SERVICE = 0x808D_0000 => "BadOutOfService",
    BAD_CONNECTION_CLOSED = 0x80AE_0000 => "BadConnectionClosed",
    BAD_INVALID_STATE = 0x80AF_0000 => "BadInvalidState",
    BAD_PROTOCOL_VERSION_UNSUPPORTED = 0x80BE_0000 => "BadProtocolVersionUnsupported",
}

impl StatusCode {
    /// Returns the raw value.
    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Returns `true` for good severity.
    #[inline]
    pub const fn is_good(&self) -> bool {
        self.0 & 0xC000_0000 == 0
    }

    /// Returns `true` for uncertain severity.
    #[inline]
    pub const fn is_uncertain(&self) -> bool {
        self.0 & 0xC000_0000 == 0x4000_0000
    }

    /// Returns `true` for bad severity.
    #[inline]
    pub const fn is_bad(&self) -> bool {
        self.0 & 0x8000_0000 != 0
    }

    /// Returns `true` if the code says the session is gone on the server.
    pub fn is_session_loss(&self) -> bool {
        matches!(
            self.0 & 0xFFFF_0000,
            0x8025_0000 | 0x8026_0000 | 0x8027_0000
        )
    }

    /// Returns `true` if the code says the secure channel is gone.
    pub fn is_channel_loss(&self) -> bool {
        matches!(
            self.0 & 0xFFFF_0000,
            0x8022_0000 | 0x807F_0000 | 0x8086_0000 | 0x8087_0000 | 0x80AE_0000
        )
    }
}

impl From<u32> for StatusCode {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:08X})", self.name(), self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity() {
        assert!(StatusCode::GOOD.is_good());
        assert!(StatusCode::UNCERTAIN_INITIAL_VALUE.is_uncertain());
        assert!(StatusCode::BAD_NODE_ID_UNKNOWN.is_bad());
        assert!(!StatusCode::BAD_NODE_ID_UNKNOWN.is_good());
        assert!(!StatusCode::GOOD_CLAMPED.is_bad());
    }

    #[test]
    fn test_names_ignore_info_bits() {
        assert_eq!(StatusCode(0x8034_0000).name(), "BadNodeIdUnknown");
        assert_eq!(StatusCode(0x8034_0400).name(), "BadNodeIdUnknown");
        assert_eq!(StatusCode(0x80FF_0000).name(), "Bad");
        assert_eq!(StatusCode(0x40FF_0000).name(), "Uncertain");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            StatusCode::BAD_NOT_WRITABLE.to_string(),
            "BadNotWritable (0x803B0000)"
        );
    }

    #[test]
    fn test_loss_classification() {
        assert!(StatusCode::BAD_SESSION_CLOSED.is_session_loss());
        assert!(StatusCode::BAD_SECURE_CHANNEL_ID_INVALID.is_channel_loss());
        assert!(!StatusCode::BAD_TIMEOUT.is_session_loss());
    }
}
