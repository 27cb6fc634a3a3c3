// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA identifiers, enumerations and client configuration.
//!
//! - **NodeId / ExpandedNodeId**: node identifiers with the standard string form
//! - **QualifiedName / LocalizedText / ByteString**: small built-in types
//! - **Enumerations**: browse direction, node class, attribute ids, timestamps
//! - **OpcUaConfig**: client configuration with builder and validation
//!
//! # Examples
//!
//! ```
//! use ualink_opcua::types::{NodeId, OpcUaConfig};
//!
//! let node: NodeId = "ns=3;s=Demo.Static.Scalar.Boolean".parse().unwrap();
//! assert_eq!(node.namespace_index, 3);
//!
//! let config = OpcUaConfig::builder()
//!     .endpoint("opc.tcp://localhost:48010")
//!     .build()
//!     .unwrap();
//! assert_eq!(config.endpoint_url().unwrap().port, 48010);
//! ```

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ConfigurationError, OpcUaError, OperationError};

// =============================================================================
// NodeId
// =============================================================================

/// OPC UA Node Identifier.
///
/// A NodeId consists of a namespace index and an identifier which can be
/// numeric, string, GUID, or opaque (byte string).
///
/// ```
/// use ualink_opcua::types::NodeId;
///
/// let parsed: NodeId = "i=2259".parse().unwrap();
/// assert_eq!(parsed, NodeId::numeric(0, 2259));
/// assert_eq!(parsed.to_string(), "i=2259");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId {
    /// Namespace index (0 = OPC UA standard namespace).
    pub namespace_index: u16,

    /// The node identifier.
    pub identifier: NodeIdentifier,
}

impl NodeId {
    /// Creates a numeric node ID.
    #[inline]
    pub fn numeric(namespace_index: u16, value: u32) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Numeric(value),
        }
    }

    /// Creates a string node ID.
    #[inline]
    pub fn string(namespace_index: u16, value: impl Into<String>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::String(value.into()),
        }
    }

    /// Creates a GUID node ID.
    #[inline]
    pub fn guid(namespace_index: u16, value: Uuid) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Guid(value),
        }
    }

    /// Creates an opaque node ID.
    #[inline]
    pub fn opaque(namespace_index: u16, value: Vec<u8>) -> Self {
        Self {
            namespace_index,
            identifier: NodeIdentifier::Opaque(value),
        }
    }

    /// The null node id (`i=0`).
    #[inline]
    pub fn null() -> Self {
        Self::numeric(0, 0)
    }

    /// Returns `true` if this is the null node id.
    pub fn is_null(&self) -> bool {
        self.namespace_index == 0
            && match &self.identifier {
                NodeIdentifier::Numeric(v) => *v == 0,
                NodeIdentifier::String(s) => s.is_empty(),
                NodeIdentifier::Guid(g) => g.is_nil(),
                NodeIdentifier::Opaque(b) => b.is_empty(),
            }
    }

    /// Returns the numeric identifier if this is a numeric node id.
    pub fn as_numeric(&self) -> Option<u32> {
        match self.identifier {
            NodeIdentifier::Numeric(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` if this is the numeric node `ns=0;i=value`.
    pub fn is_ns0(&self, value: u32) -> bool {
        self.namespace_index == 0 && self.as_numeric() == Some(value)
    }

    /// Converts to the OPC UA string form. `ns=0;` is omitted.
    pub fn to_opc_string(&self) -> String {
        if self.namespace_index == 0 {
            self.identifier.to_string()
        } else {
            format!("ns={};{}", self.namespace_index, self.identifier)
        }
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_opc_string())
    }
}

impl FromStr for NodeId {
    type Err = OpcUaError;

    /// Parses `ns=<n>;i=|s=|g=|b=<id>`; the namespace part is optional.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let invalid = |reason: &str| {
            OpcUaError::operation(OperationError::invalid_node_id(s, reason))
        };

        let (namespace_index, identifier_part) = match s.strip_prefix("ns=") {
            Some(rest) => {
                let (ns, id) = rest
                    .split_once(';')
                    .ok_or_else(|| invalid("missing identifier after namespace"))?;
                let ns: u16 = ns.parse().map_err(|_| invalid("invalid namespace index"))?;
                (ns, id)
            }
            None => (0, s),
        };

        let identifier = if let Some(id) = identifier_part.strip_prefix("i=") {
            NodeIdentifier::Numeric(id.parse().map_err(|_| invalid("invalid numeric identifier"))?)
        } else if let Some(id) = identifier_part.strip_prefix("s=") {
            NodeIdentifier::String(id.to_string())
        } else if let Some(id) = identifier_part.strip_prefix("g=") {
            NodeIdentifier::Guid(Uuid::parse_str(id).map_err(|e| invalid(&format!("invalid GUID: {e}")))?)
        } else if let Some(id) = identifier_part.strip_prefix("b=") {
            NodeIdentifier::Opaque(BASE64.decode(id).map_err(|e| invalid(&format!("invalid base64: {e}")))?)
        } else {
            return Err(invalid("expected i=, s=, g= or b="));
        };

        Ok(Self {
            namespace_index,
            identifier,
        })
    }
}

/// OPC UA node identifier kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum NodeIdentifier {
    /// Numeric identifier.
    Numeric(u32),
    /// String identifier.
    String(String),
    /// GUID identifier.
    Guid(Uuid),
    /// Opaque identifier.
    Opaque(Vec<u8>),
}

impl fmt::Display for NodeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "i={v}"),
            Self::String(v) => write!(f, "s={v}"),
            Self::Guid(v) => write!(f, "g={v}"),
            Self::Opaque(v) => write!(f, "b={}", BASE64.encode(v)),
        }
    }
}

// =============================================================================
// Well-known node ids
// =============================================================================

/// Numeric identifiers of standard nodes in namespace 0.
pub mod ids {
    /// Root folder.
    pub const ROOT_FOLDER: u32 = 84;
    /// Objects folder.
    pub const OBJECTS_FOLDER: u32 = 85;
    /// Types folder.
    pub const TYPES_FOLDER: u32 = 86;
    /// Views folder.
    pub const VIEWS_FOLDER: u32 = 87;
    /// HierarchicalReferences reference type.
    pub const HIERARCHICAL_REFERENCES: u32 = 33;
    /// Server object.
    pub const SERVER: u32 = 2253;
    /// Server_ServerArray.
    pub const SERVER_SERVER_ARRAY: u32 = 2254;
    /// Server_NamespaceArray.
    pub const SERVER_NAMESPACE_ARRAY: u32 = 2255;
    /// Server_ServerStatus.
    pub const SERVER_SERVER_STATUS: u32 = 2256;
    /// Server_ServerStatus_StartTime.
    pub const SERVER_SERVER_STATUS_START_TIME: u32 = 2257;
    /// Server_ServerStatus_CurrentTime.
    pub const SERVER_SERVER_STATUS_CURRENT_TIME: u32 = 2258;
    /// Server_ServerStatus_State.
    pub const SERVER_SERVER_STATUS_STATE: u32 = 2259;
    /// Server_ServerStatus_BuildInfo.
    pub const SERVER_SERVER_STATUS_BUILD_INFO: u32 = 2260;
}

// =============================================================================
// ExpandedNodeId
// =============================================================================

/// Node id that may point into another server or namespace URI.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ExpandedNodeId {
    /// The node id.
    pub node_id: NodeId,
    /// Namespace URI replacing the namespace index, if set.
    pub namespace_uri: Option<String>,
    /// Server index, 0 for the local server.
    pub server_index: u32,
}

impl ExpandedNodeId {
    /// Returns `true` if the node lives on the local server.
    pub fn is_local(&self) -> bool {
        self.server_index == 0 && self.namespace_uri.is_none()
    }
}

impl From<NodeId> for ExpandedNodeId {
    fn from(node_id: NodeId) -> Self {
        Self {
            node_id,
            namespace_uri: None,
            server_index: 0,
        }
    }
}

impl fmt::Display for ExpandedNodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.server_index != 0 {
            write!(f, "svr={};", self.server_index)?;
        }
        match &self.namespace_uri {
            Some(uri) => write!(f, "nsu={uri};{}", self.node_id.identifier),
            None => write!(f, "{}", self.node_id),
        }
    }
}

// =============================================================================
// QualifiedName / LocalizedText / ByteString
// =============================================================================

/// Name qualified by a namespace index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct QualifiedName {
    /// Namespace index.
    pub namespace_index: u16,
    /// Name; `None` encodes as a null string.
    pub name: Option<String>,
}

impl QualifiedName {
    /// Creates a qualified name.
    pub fn new(namespace_index: u16, name: impl Into<String>) -> Self {
        Self {
            namespace_index,
            name: Some(name.into()),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.name.as_deref().unwrap_or_default();
        if self.namespace_index == 0 {
            f.write_str(name)
        } else {
            write!(f, "{}:{}", self.namespace_index, name)
        }
    }
}

/// Human readable text with an optional locale.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LocalizedText {
    /// Locale id, e.g. `en-US`.
    pub locale: Option<String>,
    /// Text.
    pub text: Option<String>,
}

impl LocalizedText {
    /// Creates a text without locale.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            locale: None,
            text: Some(text.into()),
        }
    }
}

impl fmt::Display for LocalizedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.text.as_deref().unwrap_or_default())
    }
}

/// Byte string that distinguishes null from empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ByteString(pub Option<Vec<u8>>);

impl ByteString {
    /// The null byte string.
    pub const fn null() -> Self {
        Self(None)
    }

    /// Returns `true` if null or empty.
    pub fn is_empty(&self) -> bool {
        self.0.as_ref().is_none_or(|b| b.is_empty())
    }

    /// Returns the bytes, empty for null.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_deref().unwrap_or_default()
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Some(bytes))
    }
}

impl From<&[u8]> for ByteString {
    fn from(bytes: &[u8]) -> Self {
        Self(Some(bytes.to_vec()))
    }
}

// =============================================================================
// OpcUaDataType
// =============================================================================

/// Built-in data types, used to pick the wire type of written values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OpcUaDataType {
    /// Boolean value.
    Boolean,
    /// Signed 8-bit integer.
    SByte,
    /// Unsigned 8-bit integer.
    Byte,
    /// Signed 16-bit integer.
    Int16,
    /// Unsigned 16-bit integer.
    UInt16,
    /// Signed 32-bit integer.
    Int32,
    /// Unsigned 32-bit integer.
    #[default]
    UInt32,
    /// Signed 64-bit integer.
    Int64,
    /// Unsigned 64-bit integer.
    UInt64,
    /// 32-bit IEEE 754 float.
    Float,
    /// 64-bit IEEE 754 double.
    Double,
    /// UTF-8 string.
    String,
    /// Date and time.
    DateTime,
    /// GUID.
    Guid,
    /// Raw byte string.
    ByteString,
    /// XML element.
    XmlElement,
    /// Node ID.
    NodeId,
    /// Expanded node ID.
    ExpandedNodeId,
    /// Status code.
    StatusCode,
    /// Qualified name.
    QualifiedName,
    /// Localized text.
    LocalizedText,
    /// Extension object.
    ExtensionObject,
    /// Variant (any type).
    Variant,
}

impl OpcUaDataType {
    /// Returns the built-in type id used in Variant encoding.
    pub const fn type_id(&self) -> u8 {
        match self {
            Self::Boolean => 1,
            Self::SByte => 2,
            Self::Byte => 3,
            Self::Int16 => 4,
            Self::UInt16 => 5,
            Self::Int32 => 6,
            Self::UInt32 => 7,
            Self::Int64 => 8,
            Self::UInt64 => 9,
            Self::Float => 10,
            Self::Double => 11,
            Self::String => 12,
            Self::DateTime => 13,
            Self::Guid => 14,
            Self::ByteString => 15,
            Self::XmlElement => 16,
            Self::NodeId => 17,
            Self::ExpandedNodeId => 18,
            Self::StatusCode => 19,
            Self::QualifiedName => 20,
            Self::LocalizedText => 21,
            Self::ExtensionObject => 22,
            Self::Variant => 24,
        }
    }

    /// Returns the display name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::SByte => "SByte",
            Self::Byte => "Byte",
            Self::Int16 => "Int16",
            Self::UInt16 => "UInt16",
            Self::Int32 => "Int32",
            Self::UInt32 => "UInt32",
            Self::Int64 => "Int64",
            Self::UInt64 => "UInt64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::String => "String",
            Self::DateTime => "DateTime",
            Self::Guid => "Guid",
            Self::ByteString => "ByteString",
            Self::XmlElement => "XmlElement",
            Self::NodeId => "NodeId",
            Self::ExpandedNodeId => "ExpandedNodeId",
            Self::StatusCode => "StatusCode",
            Self::QualifiedName => "QualifiedName",
            Self::LocalizedText => "LocalizedText",
            Self::ExtensionObject => "ExtensionObject",
            Self::Variant => "Variant",
        }
    }
}

impl fmt::Display for OpcUaDataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OpcUaDataType {
    type Err = OpcUaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "bool" | "boolean" => Ok(Self::Boolean),
            "sbyte" | "int8" | "i8" => Ok(Self::SByte),
            "byte" | "uint8" | "u8" => Ok(Self::Byte),
            "int16" | "i16" | "short" => Ok(Self::Int16),
            "uint16" | "u16" | "ushort" => Ok(Self::UInt16),
            "int32" | "i32" | "int" => Ok(Self::Int32),
            "uint32" | "u32" | "uint" => Ok(Self::UInt32),
            "int64" | "i64" | "long" => Ok(Self::Int64),
            "uint64" | "u64" | "ulong" => Ok(Self::UInt64),
            "float" | "f32" | "single" => Ok(Self::Float),
            "double" | "f64" => Ok(Self::Double),
            "string" | "str" => Ok(Self::String),
            "datetime" => Ok(Self::DateTime),
            "guid" | "uuid" => Ok(Self::Guid),
            "bytestring" | "bytes" => Ok(Self::ByteString),
            "nodeid" => Ok(Self::NodeId),
            "statuscode" => Ok(Self::StatusCode),
            "localizedtext" | "text" => Ok(Self::LocalizedText),
            _ => Err(OpcUaError::conversion(
                crate::error::ConversionError::unsupported_type(s),
            )),
        }
    }
}

// =============================================================================
// Enumerations
// =============================================================================

/// Message security mode. Only `None` is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MessageSecurityMode {
    /// Invalid (0).
    Invalid,
    /// No security.
    #[default]
    None,
    /// Signed messages.
    Sign,
    /// Signed and encrypted messages.
    SignAndEncrypt,
}

impl MessageSecurityMode {
    /// Returns the wire value.
    pub const fn value(&self) -> i32 {
        match self {
            Self::Invalid => 0,
            Self::None => 1,
            Self::Sign => 2,
            Self::SignAndEncrypt => 3,
        }
    }

    /// Creates from the wire value.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Invalid),
            1 => Some(Self::None),
            2 => Some(Self::Sign),
            3 => Some(Self::SignAndEncrypt),
            _ => None,
        }
    }
}

/// OPC UA browse direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BrowseDirection {
    /// Browse forward references.
    #[default]
    Forward,
    /// Browse inverse references.
    Inverse,
    /// Browse both directions.
    Both,
}

impl BrowseDirection {
    /// Returns the wire value.
    pub const fn value(&self) -> i32 {
        match self {
            Self::Forward => 0,
            Self::Inverse => 1,
            Self::Both => 2,
        }
    }

    /// Creates from the wire value.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Forward),
            1 => Some(Self::Inverse),
            2 => Some(Self::Both),
            _ => None,
        }
    }
}

/// OPC UA node class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeClass {
    /// No class given.
    #[default]
    Unspecified,
    /// Object node.
    Object,
    /// Variable node.
    Variable,
    /// Method node.
    Method,
    /// Object type node.
    ObjectType,
    /// Variable type node.
    VariableType,
    /// Reference type node.
    ReferenceType,
    /// Data type node.
    DataType,
    /// View node.
    View,
}

impl NodeClass {
    /// Returns the wire value, also usable as a browse mask bit.
    pub const fn value(&self) -> i32 {
        match self {
            Self::Unspecified => 0,
            Self::Object => 1,
            Self::Variable => 2,
            Self::Method => 4,
            Self::ObjectType => 8,
            Self::VariableType => 16,
            Self::ReferenceType => 32,
            Self::DataType => 64,
            Self::View => 128,
        }
    }

    /// Creates from the wire value.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Unspecified),
            1 => Some(Self::Object),
            2 => Some(Self::Variable),
            4 => Some(Self::Method),
            8 => Some(Self::ObjectType),
            16 => Some(Self::VariableType),
            32 => Some(Self::ReferenceType),
            64 => Some(Self::DataType),
            128 => Some(Self::View),
            _ => None,
        }
    }

    /// Builds a browse node class mask from a set of classes.
    pub fn mask(classes: &[NodeClass]) -> u32 {
        classes.iter().fold(0, |mask, c| mask | c.value() as u32)
    }
}

impl fmt::Display for NodeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// OPC UA attribute IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AttributeId {
    /// Node ID attribute.
    NodeId,
    /// Node class attribute.
    NodeClass,
    /// Browse name attribute.
    BrowseName,
    /// Display name attribute.
    DisplayName,
    /// Description attribute.
    Description,
    /// Value attribute.
    #[default]
    Value,
    /// Data type attribute.
    DataType,
    /// Value rank attribute.
    ValueRank,
    /// Access level attribute.
    AccessLevel,
    /// User access level attribute.
    UserAccessLevel,
}

impl AttributeId {
    /// Returns the OPC UA numeric value.
    pub const fn value(&self) -> u32 {
        match self {
            Self::NodeId => 1,
            Self::NodeClass => 2,
            Self::BrowseName => 3,
            Self::DisplayName => 4,
            Self::Description => 5,
            Self::Value => 13,
            Self::DataType => 14,
            Self::ValueRank => 15,
            Self::AccessLevel => 17,
            Self::UserAccessLevel => 18,
        }
    }
}

/// Which timestamps the server returns with values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum TimestampsToReturn {
    /// Source timestamp only.
    Source,
    /// Server timestamp only.
    Server,
    /// Both timestamps.
    #[default]
    Both,
    /// No timestamps.
    Neither,
}

impl TimestampsToReturn {
    /// Returns the wire value.
    pub const fn value(&self) -> i32 {
        match self {
            Self::Source => 0,
            Self::Server => 1,
            Self::Both => 2,
            Self::Neither => 3,
        }
    }

    /// Creates from the wire value.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Source),
            1 => Some(Self::Server),
            2 => Some(Self::Both),
            3 => Some(Self::Neither),
            _ => None,
        }
    }
}

/// Monitoring mode of a monitored item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MonitoringMode {
    /// Not sampling.
    Disabled,
    /// Sampling without reporting.
    Sampling,
    /// Sampling and reporting.
    #[default]
    Reporting,
}

impl MonitoringMode {
    /// Returns the wire value.
    pub const fn value(&self) -> i32 {
        match self {
            Self::Disabled => 0,
            Self::Sampling => 1,
            Self::Reporting => 2,
        }
    }

    /// Creates from the wire value.
    pub fn from_value(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Disabled),
            1 => Some(Self::Sampling),
            2 => Some(Self::Reporting),
            _ => None,
        }
    }
}

/// Server state reported in `Server_ServerStatus_State`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ServerState {
    /// Running normally.
    Running,
    /// Failed.
    Failed,
    /// Not configured.
    NoConfiguration,
    /// Suspended.
    Suspended,
    /// Shutting down.
    Shutdown,
    /// Test mode.
    Test,
    /// Communication fault.
    CommunicationFault,
    /// Unknown state.
    #[default]
    Unknown,
}

impl ServerState {
    /// Creates from the wire value.
    pub fn from_value(value: i32) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Failed,
            2 => Self::NoConfiguration,
            3 => Self::Suspended,
            4 => Self::Shutdown,
            5 => Self::Test,
            6 => Self::CommunicationFault,
            _ => Self::Unknown,
        }
    }

    /// Returns the wire value.
    pub const fn value(&self) -> i32 {
        match self {
            Self::Running => 0,
            Self::Failed => 1,
            Self::NoConfiguration => 2,
            Self::Suspended => 3,
            Self::Shutdown => 4,
            Self::Test => 5,
            Self::CommunicationFault => 6,
            Self::Unknown => 7,
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// =============================================================================
// UserIdentity
// =============================================================================

/// Identity presented when activating a session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UserIdentity {
    /// Anonymous identity.
    #[default]
    Anonymous,
    /// User name and password, sent in clear text over a None channel.
    UserName {
        /// User name.
        username: String,
        /// Password.
        password: String,
    },
}

impl UserIdentity {
    /// Returns `true` for the anonymous identity.
    pub fn is_anonymous(&self) -> bool {
        matches!(self, Self::Anonymous)
    }
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous => f.write_str("Anonymous"),
            Self::UserName { username, .. } => f
                .debug_struct("UserName")
                .field("username", username)
                .field("password", &"***")
                .finish(),
        }
    }
}

// =============================================================================
// EndpointUrl
// =============================================================================

/// Parsed `opc.tcp://host:port/path` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointUrl {
    /// Host name or IP address (IPv6 without brackets).
    pub host: String,
    /// TCP port.
    pub port: u16,
    /// Path including the leading slash, may be empty.
    pub path: String,
}

impl EndpointUrl {
    /// Default OPC UA TCP port.
    pub const DEFAULT_PORT: u16 = 4840;

    /// Returns `host:port` for socket address resolution.
    pub fn authority(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl FromStr for EndpointUrl {
    type Err = OpcUaError;

    fn from_str(url: &str) -> Result<Self, Self::Err> {
        let invalid =
            |reason: &str| OpcUaError::configuration(ConfigurationError::invalid_endpoint(url, reason));

        let rest = url
            .strip_prefix("opc.tcp://")
            .ok_or_else(|| invalid("endpoint must start with opc.tcp://"))?;

        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, ""),
        };
        if authority.is_empty() {
            return Err(invalid("missing host"));
        }

        let (host, port) = if let Some(v6) = authority.strip_prefix('[') {
            let (host, after) = v6
                .split_once(']')
                .ok_or_else(|| invalid("unterminated IPv6 address"))?;
            let port = match after.strip_prefix(':') {
                Some(p) => Some(p),
                None if after.is_empty() => None,
                None => return Err(invalid("unexpected text after IPv6 address")),
            };
            (host, port)
        } else {
            match authority.rsplit_once(':') {
                Some((h, p)) => (h, Some(p)),
                None => (authority, None),
            }
        };

        let port = match port {
            Some(p) => p.parse().map_err(|_| invalid("invalid port"))?,
            None => Self::DEFAULT_PORT,
        };

        Ok(Self {
            host: host.to_string(),
            port,
            path: path.to_string(),
        })
    }
}

// =============================================================================
// OpcUaConfig
// =============================================================================

/// OPC UA client configuration.
///
/// ```
/// use std::time::Duration;
/// use ualink_opcua::types::OpcUaConfig;
///
/// let config = OpcUaConfig::builder()
///     .endpoint("opc.tcp://localhost:4840")
///     .request_timeout(Duration::from_secs(5))
///     .username("operator", "secret")
///     .build()
///     .unwrap();
/// assert!(!config.user_identity.is_anonymous());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpcUaConfig {
    /// Server endpoint URL (e.g., "opc.tcp://localhost:4840").
    #[serde(default)]
    pub endpoint: String,

    /// Application name sent in CreateSession.
    #[serde(default = "default_application_name")]
    pub application_name: String,

    /// Application URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_uri: Option<String>,

    /// Product URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_uri: Option<String>,

    /// Session name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_name: Option<String>,

    /// Identity used to activate sessions.
    #[serde(default)]
    pub user_identity: UserIdentity,

    /// Requested session timeout.
    #[serde(default = "default_session_timeout", with = "humantime_serde")]
    pub session_timeout: Duration,

    /// Default per-request timeout.
    #[serde(default = "default_request_timeout", with = "humantime_serde")]
    pub request_timeout: Duration,

    /// TCP connect and handshake timeout.
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    /// Requested secure channel token lifetime.
    #[serde(default = "default_channel_lifetime", with = "humantime_serde")]
    pub channel_lifetime: Duration,

    /// Initial connection attempts before giving up.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay between connection attempts.
    #[serde(default = "default_retry_delay", with = "humantime_serde")]
    pub retry_delay: Duration,

    /// Reconnect automatically after connection loss.
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Session keep-alive interval.
    #[serde(default = "default_keepalive_interval", with = "humantime_serde")]
    pub keepalive_interval: Duration,

    /// Consecutive keep-alive failures before the connection is dropped.
    #[serde(default = "default_max_keepalive_failures")]
    pub max_keepalive_failures: u32,

    /// Maximum number of requests in flight.
    #[serde(default = "default_max_pending_requests")]
    pub max_pending_requests: usize,

    /// Transport and decoding limits.
    #[serde(default)]
    pub limits: ClientLimits,

    /// Default subscription settings.
    #[serde(default)]
    pub subscription: SubscriptionSettings,

    /// Default monitored item settings.
    #[serde(default)]
    pub monitored_item: MonitoredItemSettings,
}

fn default_application_name() -> String {
    "ualink OPC UA Client".to_string()
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_channel_lifetime() -> Duration {
    Duration::from_secs(3600)
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_true() -> bool {
    true
}

fn default_keepalive_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_keepalive_failures() -> u32 {
    3
}

fn default_max_pending_requests() -> usize {
    64
}

impl OpcUaConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> OpcUaConfigBuilder {
        OpcUaConfigBuilder::default()
    }

    /// Creates a configuration with just the endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Parses the endpoint URL.
    pub fn endpoint_url(&self) -> Result<EndpointUrl, OpcUaError> {
        self.endpoint.parse()
    }

    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), OpcUaError> {
        if self.endpoint.is_empty() {
            return Err(OpcUaError::configuration(ConfigurationError::missing_field(
                "endpoint",
            )));
        }
        self.endpoint_url()?;

        for (field, value) in [
            ("session_timeout", self.session_timeout),
            ("request_timeout", self.request_timeout),
            ("connect_timeout", self.connect_timeout),
            ("keepalive_interval", self.keepalive_interval),
            ("channel_lifetime", self.channel_lifetime),
        ] {
            if value.is_zero() {
                return Err(OpcUaError::configuration(
                    ConfigurationError::invalid_timeout(field, "must be greater than 0"),
                ));
            }
        }

        if self.max_pending_requests == 0 {
            return Err(OpcUaError::configuration(ConfigurationError::invalid_limit(
                "max_pending_requests",
                "must be greater than 0",
            )));
        }

        self.limits.validate()
    }

    /// Returns the effective application URI.
    pub fn effective_application_uri(&self) -> String {
        self.application_uri
            .clone()
            .unwrap_or_else(|| format!("urn:ualink:{}", self.application_name.replace(' ', "")))
    }

    /// Returns the effective session name.
    pub fn effective_session_name(&self) -> String {
        self.session_name
            .clone()
            .unwrap_or_else(|| format!("{} Session", self.application_name))
    }
}

impl Default for OpcUaConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            application_name: default_application_name(),
            application_uri: None,
            product_uri: None,
            session_name: None,
            user_identity: UserIdentity::default(),
            session_timeout: default_session_timeout(),
            request_timeout: default_request_timeout(),
            connect_timeout: default_connect_timeout(),
            channel_lifetime: default_channel_lifetime(),
            max_retries: default_max_retries(),
            retry_delay: default_retry_delay(),
            auto_reconnect: true,
            keepalive_interval: default_keepalive_interval(),
            max_keepalive_failures: default_max_keepalive_failures(),
            max_pending_requests: default_max_pending_requests(),
            limits: ClientLimits::default(),
            subscription: SubscriptionSettings::default(),
            monitored_item: MonitoredItemSettings::default(),
        }
    }
}

// =============================================================================
// ClientLimits
// =============================================================================

/// Transport buffer sizes and decoding limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientLimits {
    /// Largest chunk this client accepts.
    pub receive_buffer_size: u32,
    /// Largest chunk this client sends.
    pub send_buffer_size: u32,
    /// Largest reassembled message accepted (0 = unlimited).
    pub max_message_size: u32,
    /// Largest number of chunks per message accepted (0 = unlimited).
    pub max_chunk_count: u32,
    /// Longest string decoded.
    pub max_string_length: usize,
    /// Longest byte string decoded.
    pub max_byte_string_length: usize,
    /// Longest array decoded.
    pub max_array_length: usize,
}

impl ClientLimits {
    /// Smallest buffer size allowed by the TCP mapping.
    pub const MIN_BUFFER_SIZE: u32 = 8192;

    fn validate(&self) -> Result<(), OpcUaError> {
        for (field, value) in [
            ("receive_buffer_size", self.receive_buffer_size),
            ("send_buffer_size", self.send_buffer_size),
        ] {
            if value < Self::MIN_BUFFER_SIZE {
                return Err(OpcUaError::configuration(ConfigurationError::invalid_limit(
                    field,
                    format!("must be at least {}", Self::MIN_BUFFER_SIZE),
                )));
            }
        }
        Ok(())
    }
}

impl Default for ClientLimits {
    fn default() -> Self {
        Self {
            receive_buffer_size: 65535,
            send_buffer_size: 65535,
            max_message_size: 4_194_304,
            max_chunk_count: 0,
            max_string_length: 1_048_576,
            max_byte_string_length: 1_048_576,
            max_array_length: 65535,
        }
    }
}

// =============================================================================
// OpcUaConfigBuilder
// =============================================================================

/// Builder for `OpcUaConfig`.
#[derive(Debug, Default)]
pub struct OpcUaConfigBuilder {
    config: OpcUaConfig,
}

impl OpcUaConfigBuilder {
    /// Sets the endpoint URL.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    /// Uses user name authentication.
    pub fn username(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.user_identity = UserIdentity::UserName {
            username: username.into(),
            password: password.into(),
        };
        self
    }

    /// Uses anonymous authentication.
    pub fn anonymous(mut self) -> Self {
        self.config.user_identity = UserIdentity::Anonymous;
        self
    }

    /// Sets the application name.
    pub fn application_name(mut self, name: impl Into<String>) -> Self {
        self.config.application_name = name.into();
        self
    }

    /// Sets the application URI.
    pub fn application_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.application_uri = Some(uri.into());
        self
    }

    /// Sets the session name.
    pub fn session_name(mut self, name: impl Into<String>) -> Self {
        self.config.session_name = Some(name.into());
        self
    }

    /// Sets the session timeout.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.config.session_timeout = timeout;
        self
    }

    /// Sets the request timeout.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the secure channel lifetime.
    pub fn channel_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.channel_lifetime = lifetime;
        self
    }

    /// Sets the initial connection attempts.
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Sets the base retry delay.
    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    /// Enables or disables automatic reconnection.
    pub fn auto_reconnect(mut self, enabled: bool) -> Self {
        self.config.auto_reconnect = enabled;
        self
    }

    /// Sets the keep-alive interval.
    pub fn keepalive_interval(mut self, interval: Duration) -> Self {
        self.config.keepalive_interval = interval;
        self
    }

    /// Sets the maximum number of requests in flight.
    pub fn max_pending_requests(mut self, max: usize) -> Self {
        self.config.max_pending_requests = max;
        self
    }

    /// Sets transport and decoding limits.
    pub fn limits(mut self, limits: ClientLimits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Sets default subscription settings.
    pub fn subscription(mut self, settings: SubscriptionSettings) -> Self {
        self.config.subscription = settings;
        self
    }

    /// Sets default monitored item settings.
    pub fn monitored_item(mut self, settings: MonitoredItemSettings) -> Self {
        self.config.monitored_item = settings;
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<OpcUaConfig, OpcUaError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// =============================================================================
// SubscriptionSettings
// =============================================================================

/// Subscription settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionSettings {
    /// Requested publishing interval.
    #[serde(with = "humantime_serde")]
    pub publishing_interval: Duration,
    /// Lifetime count (publishing intervals without a publish request).
    pub lifetime_count: u32,
    /// Maximum keep-alive count.
    pub max_keepalive_count: u32,
    /// Maximum notifications per publish (0 = unlimited).
    pub max_notifications_per_publish: u32,
    /// Subscription priority.
    pub priority: u8,
}

impl Default for SubscriptionSettings {
    fn default() -> Self {
        Self {
            publishing_interval: Duration::from_millis(1000),
            lifetime_count: 60,
            max_keepalive_count: 10,
            max_notifications_per_publish: 0,
            priority: 0,
        }
    }
}

impl SubscriptionSettings {
    /// Settings with the given publishing interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            publishing_interval: interval,
            ..Default::default()
        }
    }
}

/// Monitored item settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoredItemSettings {
    /// Sampling interval.
    #[serde(with = "humantime_serde")]
    pub sampling_interval: Duration,
    /// Server side queue size.
    pub queue_size: u32,
    /// Discard oldest value on queue overflow.
    pub discard_oldest: bool,
}

impl Default for MonitoredItemSettings {
    fn default() -> Self {
        Self {
            sampling_interval: Duration::from_millis(200),
            queue_size: 10,
            discard_oldest: true,
        }
    }
}

// =============================================================================
// humantime_serde helper
// =============================================================================

/// Serde adapter for durations in humantime form ("250ms", "1m 30s").
///
/// Use with `#[serde(with = "ualink_opcua::types::humantime_serde")]`.
pub mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializes a duration as a humantime string.
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        humantime::format_duration(*duration)
            .to_string()
            .serialize(serializer)
    }

    /// Deserializes a duration from a humantime string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
