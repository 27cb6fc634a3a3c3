// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Server status structures read from the Server object.

use bytes::BytesMut;
use chrono::{DateTime, Utc};

use super::subscription::expect_body;
use crate::binary_struct;
use crate::codec::{BinaryDecode, BinaryEncode, BinaryReader, DecodeLimits};
use crate::error::CodecResult;
use crate::types::{LocalizedText, NodeId, ServerState};
use crate::value::ExtensionObject;

/// Encoding id of `ServerStatusDataType`.
pub const SERVER_STATUS_ENCODING_ID: u32 = 864;

/// Encoding id of `BuildInfo`.
pub const BUILD_INFO_ENCODING_ID: u32 = 340;

binary_struct! {
    /// Server build information.
    pub struct BuildInfo {
        /// Product URI.
        pub product_uri: Option<String>,
        /// Manufacturer.
        pub manufacturer_name: Option<String>,
        /// Product name.
        pub product_name: Option<String>,
        /// Software version.
        pub software_version: Option<String>,
        /// Build number.
        pub build_number: Option<String>,
        /// Build date.
        pub build_date: Option<DateTime<Utc>>,
    }
}

binary_struct! {
    /// Value of `Server_ServerStatus`.
    pub struct ServerStatusDataType {
        /// Server start time.
        pub start_time: Option<DateTime<Utc>>,
        /// Current server time.
        pub current_time: Option<DateTime<Utc>>,
        /// Raw server state.
        pub state: i32,
        /// Build information.
        pub build_info: BuildInfo,
        /// Seconds until a scheduled shutdown.
        pub seconds_till_shutdown: u32,
        /// Shutdown reason.
        pub shutdown_reason: LocalizedText,
    }
}

macro_rules! extension_codec {
    ($($ty:ident = $id:ident;)*) => {
        $(
            impl $ty {
                /// Decodes from an extension object.
                pub fn from_extension_object(
                    object: &ExtensionObject,
                    limits: DecodeLimits,
                ) -> CodecResult<Self> {
                    let body = expect_body(object, $id)?;
                    Self::decode(&mut BinaryReader::new(body.to_vec(), limits))
                }

                /// Wraps into an extension object.
                pub fn to_extension_object(&self) -> ExtensionObject {
                    let mut buf = BytesMut::new();
                    self.encode(&mut buf);
                    ExtensionObject::binary(NodeId::numeric(0, $id), buf.to_vec())
                }
            }
        )*
    };
}

extension_codec! {
    ServerStatusDataType = SERVER_STATUS_ENCODING_ID;
    BuildInfo = BUILD_INFO_ENCODING_ID;
}

impl ServerStatusDataType {
    /// Typed server state.
    pub fn server_state(&self) -> ServerState {
        ServerState::from_value(self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_status_extension_object() {
        let status = ServerStatusDataType {
            start_time: Some(Utc::now()),
            state: 0,
            build_info: BuildInfo {
                product_name: Some("Demo Server".into()),
                software_version: Some("1.8.0".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let object = status.to_extension_object();
        let decoded =
            ServerStatusDataType::from_extension_object(&object, DecodeLimits::default()).unwrap();
        assert_eq!(decoded.server_state(), ServerState::Running);
        assert_eq!(decoded.build_info.product_name.as_deref(), Some("Demo Server"));
        assert!(BuildInfo::from_extension_object(&object, DecodeLimits::default()).is_err());
    }
}
