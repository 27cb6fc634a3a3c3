// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Variant values, data values and extension objects.

use std::fmt;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::status::StatusCode;
use crate::types::{ExpandedNodeId, LocalizedText, NodeId, OpcUaDataType, QualifiedName};

// =============================================================================
// OpcUaValue
// =============================================================================

/// OPC UA Variant.
///
/// Arrays are one dimensional; matrix dimensions are flattened on decode.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum OpcUaValue {
    /// Empty variant.
    #[default]
    Null,

    /// Boolean value.
    Boolean(bool),

    /// Signed byte.
    SByte(i8),

    /// Unsigned byte.
    Byte(u8),

    /// 16-bit signed integer.
    Int16(i16),

    /// 16-bit unsigned integer.
    UInt16(u16),

    /// 32-bit signed integer.
    Int32(i32),

    /// 32-bit unsigned integer.
    UInt32(u32),

    /// 64-bit signed integer.
    Int64(i64),

    /// 64-bit unsigned integer.
    UInt64(u64),

    /// 32-bit float.
    Float(f32),

    /// 64-bit double.
    Double(f64),

    /// String value.
    String(String),

    /// Date/time value.
    DateTime(DateTime<Utc>),

    /// GUID value.
    Guid(Uuid),

    /// Byte string.
    ByteString(Vec<u8>),

    /// XML element as text.
    XmlElement(String),

    /// Node id.
    NodeId(Box<NodeId>),

    /// Expanded node id.
    ExpandedNodeId(Box<ExpandedNodeId>),

    /// Status code.
    StatusCode(StatusCode),

    /// Qualified name.
    QualifiedName(Box<QualifiedName>),

    /// Localized text.
    LocalizedText(Box<LocalizedText>),

    /// Structure the client does not decode.
    ExtensionObject(Box<ExtensionObject>),

    /// Nested data value.
    DataValue(Box<DataValue>),

    /// Diagnostic info.
    DiagnosticInfo(Box<DiagnosticInfo>),

    /// Array of values.
    Array(Vec<OpcUaValue>),
}

impl OpcUaValue {
    /// Returns the built-in type id, 0 for null.
    ///
    /// Arrays report the type of their first element, or Variant when empty.
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::SByte(_) => 2,
            Self::Byte(_) => 3,
            Self::Int16(_) => 4,
            Self::UInt16(_) => 5,
            Self::Int32(_) => 6,
            Self::UInt32(_) => 7,
            Self::Int64(_) => 8,
            Self::UInt64(_) => 9,
            Self::Float(_) => 10,
            Self::Double(_) => 11,
            Self::String(_) => 12,
            Self::DateTime(_) => 13,
            Self::Guid(_) => 14,
            Self::ByteString(_) => 15,
            Self::XmlElement(_) => 16,
            Self::NodeId(_) => 17,
            Self::ExpandedNodeId(_) => 18,
            Self::StatusCode(_) => 19,
            Self::QualifiedName(_) => 20,
            Self::LocalizedText(_) => 21,
            Self::ExtensionObject(_) => 22,
            Self::DataValue(_) => 23,
            Self::DiagnosticInfo(_) => 25,
            Self::Array(items) => Self::array_element_type(items),
        }
    }

    /// Element type used when encoding an array.
    ///
    /// Homogeneous scalar arrays keep their element type; anything else
    /// (empty, mixed, nested, null elements) is encoded as an array of Variants.
    pub(crate) fn array_element_type(items: &[OpcUaValue]) -> u8 {
        let Some(first) = items.first() else {
            return 24;
        };
        if matches!(first, Self::Array(_) | Self::Null) {
            return 24;
        }
        let id = first.type_id();
        if items.iter().all(|v| !matches!(v, Self::Array(_)) && v.type_id() == id) {
            id
        } else {
            24
        }
    }

    /// Returns the data type of this value.
    pub fn data_type(&self) -> OpcUaDataType {
        match self {
            Self::Boolean(_) => OpcUaDataType::Boolean,
            Self::SByte(_) => OpcUaDataType::SByte,
            Self::Byte(_) => OpcUaDataType::Byte,
            Self::Int16(_) => OpcUaDataType::Int16,
            Self::UInt16(_) => OpcUaDataType::UInt16,
            Self::Int32(_) => OpcUaDataType::Int32,
            Self::UInt32(_) => OpcUaDataType::UInt32,
            Self::Int64(_) => OpcUaDataType::Int64,
            Self::UInt64(_) => OpcUaDataType::UInt64,
            Self::Float(_) => OpcUaDataType::Float,
            Self::Double(_) => OpcUaDataType::Double,
            Self::String(_) => OpcUaDataType::String,
            Self::DateTime(_) => OpcUaDataType::DateTime,
            Self::Guid(_) => OpcUaDataType::Guid,
            Self::ByteString(_) => OpcUaDataType::ByteString,
            Self::XmlElement(_) => OpcUaDataType::XmlElement,
            Self::NodeId(_) => OpcUaDataType::NodeId,
            Self::ExpandedNodeId(_) => OpcUaDataType::ExpandedNodeId,
            Self::StatusCode(_) => OpcUaDataType::StatusCode,
            Self::QualifiedName(_) => OpcUaDataType::QualifiedName,
            Self::LocalizedText(_) => OpcUaDataType::LocalizedText,
            Self::ExtensionObject(_) => OpcUaDataType::ExtensionObject,
            Self::DataValue(_) | Self::DiagnosticInfo(_) | Self::Array(_) | Self::Null => {
                OpcUaDataType::Variant
            }
        }
    }

    /// Returns `true` if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns `true` if this is an array.
    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self, Self::Array(_))
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Attempts to get an integer value as i64.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::SByte(v) => Some(*v as i64),
            Self::Byte(v) => Some(*v as i64),
            Self::Int16(v) => Some(*v as i64),
            Self::UInt16(v) => Some(*v as i64),
            Self::Int32(v) => Some(*v as i64),
            Self::UInt32(v) => Some(*v as i64),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    /// Attempts to get a numeric value as f64.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            Self::UInt64(v) => Some(*v as f64),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Attempts to get the value as a string slice.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) | Self::XmlElement(v) => Some(v),
            _ => None,
        }
    }

    /// Attempts to get the value as a node id.
    pub fn as_node_id(&self) -> Option<&NodeId> {
        match self {
            Self::NodeId(v) => Some(v),
            _ => None,
        }
    }

    /// Attempts to get the value as an extension object.
    pub fn as_extension_object(&self) -> Option<&ExtensionObject> {
        match self {
            Self::ExtensionObject(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for OpcUaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::SByte(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Int16(v) => write!(f, "{v}"),
            Self::UInt16(v) => write!(f, "{v}"),
            Self::Int32(v) => write!(f, "{v}"),
            Self::UInt32(v) => write!(f, "{v}"),
            Self::Int64(v) => write!(f, "{v}"),
            Self::UInt64(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) | Self::XmlElement(v) => f.write_str(v),
            Self::DateTime(v) => f.write_str(&v.to_rfc3339()),
            Self::Guid(v) => write!(f, "{v}"),
            Self::ByteString(v) => write!(f, "<{} bytes>", v.len()),
            Self::NodeId(v) => write!(f, "{v}"),
            Self::ExpandedNodeId(v) => write!(f, "{v}"),
            Self::StatusCode(v) => write!(f, "{v}"),
            Self::QualifiedName(v) => write!(f, "{v}"),
            Self::LocalizedText(v) => write!(f, "{v}"),
            Self::ExtensionObject(v) => write!(f, "<ExtensionObject {}>", v.type_id),
            Self::DataValue(v) => write!(f, "{}", v.value),
            Self::DiagnosticInfo(_) => f.write_str("<DiagnosticInfo>"),
            Self::Array(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for OpcUaValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar! {
    bool => Boolean,
    i8 => SByte,
    u8 => Byte,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
    String => String,
    DateTime<Utc> => DateTime,
    Uuid => Guid,
    StatusCode => StatusCode,
}

impl From<&str> for OpcUaValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<NodeId> for OpcUaValue {
    fn from(v: NodeId) -> Self {
        Self::NodeId(Box::new(v))
    }
}

impl From<LocalizedText> for OpcUaValue {
    fn from(v: LocalizedText) -> Self {
        Self::LocalizedText(Box::new(v))
    }
}

impl<T: Into<OpcUaValue>> From<Vec<T>> for OpcUaValue {
    fn from(v: Vec<T>) -> Self {
        Self::Array(v.into_iter().map(Into::into).collect())
    }
}

// =============================================================================
// DataValue
// =============================================================================

/// Value with status and timestamps.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value, `Null` when absent.
    pub value: OpcUaValue,
    /// Status of the value.
    pub status: StatusCode,
    /// Timestamp from the data source.
    pub source_timestamp: Option<DateTime<Utc>>,
    /// Timestamp from the server.
    pub server_timestamp: Option<DateTime<Utc>>,
    /// Source timestamp picoseconds.
    pub source_picoseconds: Option<u16>,
    /// Server timestamp picoseconds.
    pub server_picoseconds: Option<u16>,
}

impl DataValue {
    /// Creates a good data value without timestamps.
    pub fn new(value: impl Into<OpcUaValue>) -> Self {
        Self {
            value: value.into(),
            ..Default::default()
        }
    }

    /// Creates a data value carrying only a status.
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Returns `true` if the status is good.
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }

    /// Source timestamp if present, otherwise the server timestamp.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.source_timestamp.or(self.server_timestamp)
    }
}

// =============================================================================
// ExtensionObject
// =============================================================================

/// Encoded structure with its type id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExtensionObject {
    /// Binary encoding id of the body.
    pub type_id: NodeId,
    /// Body.
    pub body: ExtensionObjectBody,
}

/// Body of an extension object.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ExtensionObjectBody {
    /// No body.
    #[default]
    None,
    /// Binary encoded body.
    Binary(Vec<u8>),
    /// XML encoded body.
    Xml(String),
}

impl ExtensionObject {
    /// Creates an empty extension object.
    pub fn null() -> Self {
        Self::default()
    }

    /// Creates a binary extension object.
    pub fn binary(type_id: NodeId, body: Vec<u8>) -> Self {
        Self {
            type_id,
            body: ExtensionObjectBody::Binary(body),
        }
    }

    /// Returns the binary body when present.
    pub fn binary_body(&self) -> Option<&[u8]> {
        match &self.body {
            ExtensionObjectBody::Binary(b) => Some(b),
            _ => None,
        }
    }

    /// Returns `true` if the object has no type and no body.
    pub fn is_null(&self) -> bool {
        self.type_id.is_null() && matches!(self.body, ExtensionObjectBody::None)
    }
}

// =============================================================================
// DiagnosticInfo
// =============================================================================

/// Vendor diagnostics attached to results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagnosticInfo {
    /// Index into the string table of the symbolic id.
    pub symbolic_id: Option<i32>,
    /// Index into the string table of the namespace URI.
    pub namespace_uri: Option<i32>,
    /// Index into the string table of the locale.
    pub locale: Option<i32>,
    /// Index into the string table of the localized text.
    pub localized_text: Option<i32>,
    /// Additional information.
    pub additional_info: Option<String>,
    /// Inner status code.
    pub inner_status_code: Option<StatusCode>,
    /// Inner diagnostic info.
    pub inner_diagnostic_info: Option<Box<DiagnosticInfo>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_array_element_type() {
        assert_eq!(OpcUaValue::from(vec![1i32, 2, 3]).type_id(), 6);
        assert_eq!(OpcUaValue::Array(vec![]).type_id(), 24);
        assert_eq!(
            OpcUaValue::Array(vec![OpcUaValue::Int32(1), OpcUaValue::Double(2.0)]).type_id(),
            24
        );
    }

    #[test]
    fn test_numeric_accessors() {
        assert_eq!(OpcUaValue::UInt16(7).as_i64(), Some(7));
        assert_eq!(OpcUaValue::UInt64(u64::MAX).as_i64(), None);
        assert_eq!(OpcUaValue::Float(1.5).as_f64(), Some(1.5));
        assert_eq!(OpcUaValue::String("x".into()).as_f64(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(OpcUaValue::from(vec![true, false]).to_string(), "[true, false]");
        assert_eq!(OpcUaValue::Null.to_string(), "null");
        assert_eq!(OpcUaValue::ByteString(vec![1, 2]).to_string(), "<2 bytes>");
    }

    #[test]
    fn test_data_value_timestamp_fallback() {
        let now = Utc::now();
        let dv = DataValue {
            server_timestamp: Some(now),
            ..DataValue::new(1u32)
        };
        assert_eq!(dv.timestamp(), Some(now));
        assert!(dv.is_good());
        assert!(!DataValue::with_status(StatusCode::BAD_NOT_READABLE).is_good());
    }
}
