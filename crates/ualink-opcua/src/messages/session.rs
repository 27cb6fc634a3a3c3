// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Session service messages and identity tokens.

use bytes::BytesMut;

use super::{RequestHeader, ResponseHeader, impl_service};
use crate::codec::BinaryEncode;
use crate::status::StatusCode;
use crate::types::{ByteString, LocalizedText, MessageSecurityMode, NodeId, UserIdentity};
use crate::value::{DiagnosticInfo, ExtensionObject};
use crate::{binary_enum, binary_struct};

/// Encoding id of `AnonymousIdentityToken`.
pub const ANONYMOUS_IDENTITY_TOKEN_ID: u32 = 321;

/// Encoding id of `UserNameIdentityToken`.
pub const USER_NAME_IDENTITY_TOKEN_ID: u32 = 324;

// =============================================================================
// Descriptions
// =============================================================================

binary_enum! {
    /// Kind of OPC UA application.
    pub enum ApplicationType {
        /// Server.
        #[default]
        Server = 0,
        /// Client.
        Client = 1,
        /// Client and server.
        ClientAndServer = 2,
        /// Discovery server.
        DiscoveryServer = 3,
    }
}

binary_enum! {
    /// Kind of user identity token.
    pub enum UserTokenType {
        /// No credentials.
        #[default]
        Anonymous = 0,
        /// User name and password.
        UserName = 1,
        /// X.509 certificate.
        Certificate = 2,
        /// WS-Security token.
        IssuedToken = 3,
    }
}

binary_struct! {
    /// Application description.
    pub struct ApplicationDescription {
        /// Application URI.
        pub application_uri: Option<String>,
        /// Product URI.
        pub product_uri: Option<String>,
        /// Display name.
        pub application_name: LocalizedText,
        /// Application type.
        pub application_type: ApplicationType,
        /// Gateway server URI.
        pub gateway_server_uri: Option<String>,
        /// Discovery profile URI.
        pub discovery_profile_uri: Option<String>,
        /// Discovery URLs.
        pub discovery_urls: Option<Vec<String>>,
    }
}

binary_struct! {
    /// User token policy advertised by an endpoint.
    pub struct UserTokenPolicy {
        /// Policy id to put into identity tokens.
        pub policy_id: Option<String>,
        /// Token type.
        pub token_type: UserTokenType,
        /// Issued token type URI.
        pub issued_token_type: Option<String>,
        /// Issuer endpoint URL.
        pub issuer_endpoint_url: Option<String>,
        /// Security policy for the token.
        pub security_policy_uri: Option<String>,
    }
}

binary_struct! {
    /// Endpoint description.
    pub struct EndpointDescription {
        /// Endpoint URL.
        pub endpoint_url: Option<String>,
        /// Server description.
        pub server: ApplicationDescription,
        /// Server certificate.
        pub server_certificate: ByteString,
        /// Security mode.
        pub security_mode: MessageSecurityMode,
        /// Security policy URI.
        pub security_policy_uri: Option<String>,
        /// Accepted user tokens.
        pub user_identity_tokens: Vec<UserTokenPolicy>,
        /// Transport profile URI.
        pub transport_profile_uri: Option<String>,
        /// Relative security level.
        pub security_level: u8,
    }
}

binary_struct! {
    /// Software certificate with signature.
    pub struct SignedSoftwareCertificate {
        /// Certificate.
        pub certificate_data: ByteString,
        /// Signature.
        pub signature: ByteString,
    }
}

binary_struct! {
    /// Signature with its algorithm.
    pub struct SignatureData {
        /// Algorithm URI.
        pub algorithm: Option<String>,
        /// Signature.
        pub signature: ByteString,
    }
}

// =============================================================================
// CreateSession / ActivateSession / CloseSession
// =============================================================================

binary_struct! {
    /// CreateSession request.
    pub struct CreateSessionRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Client description.
        pub client_description: ApplicationDescription,
        /// Server URI.
        pub server_uri: Option<String>,
        /// Endpoint URL.
        pub endpoint_url: Option<String>,
        /// Session name.
        pub session_name: Option<String>,
        /// Client nonce.
        pub client_nonce: ByteString,
        /// Client certificate.
        pub client_certificate: ByteString,
        /// Requested timeout in milliseconds.
        pub requested_session_timeout: f64,
        /// Largest response the client accepts (0 = no limit).
        pub max_response_message_size: u32,
    }
}

binary_struct! {
    /// CreateSession response.
    pub struct CreateSessionResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// Session id.
        pub session_id: NodeId,
        /// Token to put into request headers.
        pub authentication_token: NodeId,
        /// Revised timeout in milliseconds.
        pub revised_session_timeout: f64,
        /// Server nonce.
        pub server_nonce: ByteString,
        /// Server certificate.
        pub server_certificate: ByteString,
        /// Server endpoints.
        pub server_endpoints: Vec<EndpointDescription>,
        /// Server software certificates.
        pub server_software_certificates: Vec<SignedSoftwareCertificate>,
        /// Server signature.
        pub server_signature: SignatureData,
        /// Largest request the server accepts.
        pub max_request_message_size: u32,
    }
}

binary_struct! {
    /// ActivateSession request.
    pub struct ActivateSessionRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Client signature.
        pub client_signature: SignatureData,
        /// Client software certificates.
        pub client_software_certificates: Vec<SignedSoftwareCertificate>,
        /// Preferred locales.
        pub locale_ids: Vec<String>,
        /// Identity token.
        pub user_identity_token: ExtensionObject,
        /// Identity token signature.
        pub user_token_signature: SignatureData,
    }
}

binary_struct! {
    /// ActivateSession response.
    pub struct ActivateSessionResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// New server nonce.
        pub server_nonce: ByteString,
        /// Software certificate results.
        pub results: Vec<StatusCode>,
        /// Diagnostics.
        pub diagnostic_infos: Vec<DiagnosticInfo>,
    }
}

binary_struct! {
    /// CloseSession request.
    pub struct CloseSessionRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Delete the session's subscriptions.
        pub delete_subscriptions: bool,
    }
}

binary_struct! {
    /// CloseSession response.
    pub struct CloseSessionResponse {
        /// Header.
        pub response_header: ResponseHeader,
    }
}

impl_service! {
    CreateSessionRequest => CreateSessionResponse, 461, 464, "CreateSession", authenticated = false;
    ActivateSessionRequest => ActivateSessionResponse, 467, 470, "ActivateSession";
    CloseSessionRequest => CloseSessionResponse, 473, 476, "CloseSession";
}

// =============================================================================
// Identity tokens
// =============================================================================

binary_struct! {
    /// Anonymous identity token.
    pub struct AnonymousIdentityToken {
        /// Policy id.
        pub policy_id: Option<String>,
    }
}

binary_struct! {
    /// User name identity token.
    pub struct UserNameIdentityToken {
        /// Policy id.
        pub policy_id: Option<String>,
        /// User name.
        pub user_name: Option<String>,
        /// Password bytes, unencrypted under policy None.
        pub password: ByteString,
        /// Encryption algorithm, null when not encrypted.
        pub encryption_algorithm: Option<String>,
    }
}

fn wrap<T: BinaryEncode>(encoding_id: u32, token: &T) -> ExtensionObject {
    let mut buf = BytesMut::new();
    token.encode(&mut buf);
    ExtensionObject::binary(NodeId::numeric(0, encoding_id), buf.to_vec())
}

/// Finds the policy id for `token_type` among the endpoints.
pub fn find_policy_id(endpoints: &[EndpointDescription], token_type: UserTokenType) -> Option<String> {
    endpoints
        .iter()
        .filter(|e| e.security_mode == MessageSecurityMode::None)
        .chain(endpoints.iter())
        .flat_map(|e| e.user_identity_tokens.iter())
        .find(|p| p.token_type == token_type)
        .and_then(|p| p.policy_id.clone())
}

/// Builds the identity token extension object for `identity`.
pub fn identity_token(identity: &UserIdentity, endpoints: &[EndpointDescription]) -> ExtensionObject {
    match identity {
        UserIdentity::Anonymous => {
            let policy_id = find_policy_id(endpoints, UserTokenType::Anonymous)
                .unwrap_or_else(|| "anonymous".to_string());
            wrap(
                ANONYMOUS_IDENTITY_TOKEN_ID,
                &AnonymousIdentityToken {
                    policy_id: Some(policy_id),
                },
            )
        }
        UserIdentity::UserName { username, password } => {
            let policy_id = find_policy_id(endpoints, UserTokenType::UserName)
                .unwrap_or_else(|| "username".to_string());
            wrap(
                USER_NAME_IDENTITY_TOKEN_ID,
                &UserNameIdentityToken {
                    policy_id: Some(policy_id),
                    user_name: Some(username.clone()),
                    password: ByteString::from(password.as_bytes()),
                    encryption_algorithm: None,
                },
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_from;

    fn endpoint(mode: MessageSecurityMode, policies: &[(&str, UserTokenType)]) -> EndpointDescription {
        EndpointDescription {
            security_mode: mode,
            user_identity_tokens: policies
                .iter()
                .map(|(id, t)| UserTokenPolicy {
                    policy_id: Some(id.to_string()),
                    token_type: *t,
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_policy_id_prefers_none_endpoint() {
        let endpoints = vec![
            endpoint(MessageSecurityMode::SignAndEncrypt, &[("secure_anon", UserTokenType::Anonymous)]),
            endpoint(MessageSecurityMode::None, &[("0", UserTokenType::Anonymous), ("1", UserTokenType::UserName)]),
        ];
        assert_eq!(find_policy_id(&endpoints, UserTokenType::Anonymous).as_deref(), Some("0"));
        assert_eq!(find_policy_id(&endpoints, UserTokenType::UserName).as_deref(), Some("1"));
        assert_eq!(find_policy_id(&endpoints, UserTokenType::Certificate), None);
    }

    #[test]
    fn test_anonymous_token_fallback_policy() {
        let token = identity_token(&UserIdentity::Anonymous, &[]);
        assert_eq!(token.type_id, NodeId::numeric(0, ANONYMOUS_IDENTITY_TOKEN_ID));
        let body = token.binary_body().unwrap().to_vec();
        let decoded: AnonymousIdentityToken = decode_from(body).unwrap();
        assert_eq!(decoded.policy_id.as_deref(), Some("anonymous"));
    }

    #[test]
    fn test_user_name_token() {
        let identity = UserIdentity::UserName {
            username: "operator".into(),
            password: "pw".into(),
        };
        let token = identity_token(&identity, &[]);
        let decoded: UserNameIdentityToken =
            decode_from(token.binary_body().unwrap().to_vec()).unwrap();
        assert_eq!(decoded.policy_id.as_deref(), Some("username"));
        assert_eq!(decoded.user_name.as_deref(), Some("operator"));
        assert_eq!(decoded.password.as_bytes(), b"pw");
    }
}
