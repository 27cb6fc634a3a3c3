// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Encoders and decoders for the built-in types.

use bytes::{BufMut, BytesMut};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{BinaryDecode, BinaryEncode, BinaryReader, write_array};
use crate::error::{CodecResult, ProtocolError};
use crate::status::StatusCode;
use crate::types::{
    BrowseDirection, ByteString, ExpandedNodeId, LocalizedText, MessageSecurityMode, MonitoringMode,
    NodeClass, NodeId, NodeIdentifier, QualifiedName, TimestampsToReturn,
};
use crate::value::{DataValue, DiagnosticInfo, ExtensionObject, ExtensionObjectBody, OpcUaValue};

// =============================================================================
// Primitives
// =============================================================================

macro_rules! impl_primitive {
    ($($ty:ty => $put:ident, $read:ident;)*) => {
        $(
            impl BinaryEncode for $ty {
                #[inline]
                fn encode(&self, buf: &mut BytesMut) {
                    buf.$put(*self);
                }
            }

            impl BinaryDecode for $ty {
                #[inline]
                fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
                    r.$read()
                }
            }
        )*
    };
}

impl_primitive! {
    u8 => put_u8, read_u8;
    i8 => put_i8, read_i8;
    u16 => put_u16_le, read_u16;
    i16 => put_i16_le, read_i16;
    u32 => put_u32_le, read_u32;
    i32 => put_i32_le, read_i32;
    u64 => put_u64_le, read_u64;
    i64 => put_i64_le, read_i64;
    f32 => put_f32_le, read_f32;
    f64 => put_f64_le, read_f64;
}

impl BinaryEncode for bool {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u8(u8::from(*self));
    }
}

impl BinaryDecode for bool {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        Ok(r.read_u8()? != 0)
    }
}

// =============================================================================
// Arrays
// =============================================================================

impl<T: BinaryEncode> BinaryEncode for Vec<T> {
    fn encode(&self, buf: &mut BytesMut) {
        write_array(buf, self);
    }
}

impl<T: BinaryDecode> BinaryDecode for Vec<T> {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        r.read_array()
    }
}

impl<T: BinaryEncode> BinaryEncode for Option<Vec<T>> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Some(items) => write_array(buf, items),
            None => buf.put_i32_le(-1),
        }
    }
}

impl<T: BinaryDecode> BinaryDecode for Option<Vec<T>> {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        r.read_nullable_array()
    }
}

// =============================================================================
// Strings
// =============================================================================

fn write_str(buf: &mut BytesMut, s: &str) {
    buf.put_i32_le(s.len() as i32);
    buf.put_slice(s.as_bytes());
}

fn read_opt_string(r: &mut BinaryReader) -> CodecResult<Option<String>> {
    let max = r.limits().max_string_length;
    let Some(len) = r.read_length("string", max)? else {
        return Ok(None);
    };
    let bytes = r.read_bytes(len)?;
    String::from_utf8(bytes.to_vec())
        .map(Some)
        .map_err(|e| ProtocolError::decoding(format!("invalid UTF-8 in string: {e}")))
}

/// Null strings decode as empty.
impl BinaryEncode for String {
    fn encode(&self, buf: &mut BytesMut) {
        write_str(buf, self);
    }
}

impl BinaryDecode for String {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        Ok(read_opt_string(r)?.unwrap_or_default())
    }
}

impl BinaryEncode for Option<String> {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Some(s) => write_str(buf, s),
            None => buf.put_i32_le(-1),
        }
    }
}

impl BinaryDecode for Option<String> {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        read_opt_string(r)
    }
}

impl BinaryEncode for ByteString {
    fn encode(&self, buf: &mut BytesMut) {
        match &self.0 {
            Some(bytes) => {
                buf.put_i32_le(bytes.len() as i32);
                buf.put_slice(bytes);
            }
            None => buf.put_i32_le(-1),
        }
    }
}

impl BinaryDecode for ByteString {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        let max = r.limits().max_byte_string_length;
        match r.read_length("byte string", max)? {
            Some(len) => Ok(ByteString(Some(r.read_bytes(len)?.to_vec()))),
            None => Ok(ByteString(None)),
        }
    }
}

// =============================================================================
// DateTime
// =============================================================================

/// 100 ns intervals between 1601-01-01 and 1970-01-01.
pub const UNIX_EPOCH_TICKS: i64 = 116_444_736_000_000_000;

/// Converts OPC UA ticks to a timestamp. 0 and out-of-range values are `None`.
pub fn ticks_to_datetime(ticks: i64) -> Option<DateTime<Utc>> {
    if ticks <= 0 || ticks == i64::MAX {
        return None;
    }
    let since_unix = ticks - UNIX_EPOCH_TICKS;
    let secs = since_unix.div_euclid(10_000_000);
    let nanos = (since_unix.rem_euclid(10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

/// Converts a timestamp to OPC UA ticks, clamped to the representable range.
pub fn datetime_to_ticks(dt: &DateTime<Utc>) -> i64 {
    let ticks = (dt.timestamp() as i128) * 10_000_000
        + (dt.timestamp_subsec_nanos() as i128) / 100
        + UNIX_EPOCH_TICKS as i128;
    ticks.clamp(0, i64::MAX as i128) as i64
}

fn min_datetime() -> DateTime<Utc> {
    DateTime::from_timestamp(-UNIX_EPOCH_TICKS / 10_000_000, 0).unwrap_or_default()
}

impl BinaryEncode for Option<DateTime<Utc>> {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(self.as_ref().map_or(0, datetime_to_ticks));
    }
}

impl BinaryDecode for Option<DateTime<Utc>> {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        Ok(ticks_to_datetime(r.read_i64()?))
    }
}

impl BinaryEncode for DateTime<Utc> {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i64_le(datetime_to_ticks(self));
    }
}

/// Null decodes as 1601-01-01.
impl BinaryDecode for DateTime<Utc> {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        Ok(ticks_to_datetime(r.read_i64()?).unwrap_or_else(min_datetime))
    }
}

// =============================================================================
// Guid / StatusCode
// =============================================================================

impl BinaryEncode for Uuid {
    fn encode(&self, buf: &mut BytesMut) {
        let (d1, d2, d3, d4) = self.as_fields();
        buf.put_u32_le(d1);
        buf.put_u16_le(d2);
        buf.put_u16_le(d3);
        buf.put_slice(d4);
    }
}

impl BinaryDecode for Uuid {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        let d1 = r.read_u32()?;
        let d2 = r.read_u16()?;
        let d3 = r.read_u16()?;
        let tail = r.read_bytes(8)?;
        let mut d4 = [0u8; 8];
        d4.copy_from_slice(&tail);
        Ok(Uuid::from_fields(d1, d2, d3, &d4))
    }
}

impl BinaryEncode for StatusCode {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u32_le(self.0);
    }
}

impl BinaryDecode for StatusCode {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        Ok(StatusCode(r.read_u32()?))
    }
}

// =============================================================================
// NodeId / ExpandedNodeId
// =============================================================================

const NODE_ID_TWO_BYTE: u8 = 0x00;
const NODE_ID_FOUR_BYTE: u8 = 0x01;
const NODE_ID_NUMERIC: u8 = 0x02;
const NODE_ID_STRING: u8 = 0x03;
const NODE_ID_GUID: u8 = 0x04;
const NODE_ID_BYTE_STRING: u8 = 0x05;
const EXPANDED_NAMESPACE_URI: u8 = 0x80;
const EXPANDED_SERVER_INDEX: u8 = 0x40;

fn encode_node_id(node: &NodeId, flags: u8, buf: &mut BytesMut) {
    let ns = node.namespace_index;
    match &node.identifier {
        NodeIdentifier::Numeric(v) if ns == 0 && *v <= 0xFF => {
            buf.put_u8(NODE_ID_TWO_BYTE | flags);
            buf.put_u8(*v as u8);
        }
        NodeIdentifier::Numeric(v) if ns <= 0xFF && *v <= 0xFFFF => {
            buf.put_u8(NODE_ID_FOUR_BYTE | flags);
            buf.put_u8(ns as u8);
            buf.put_u16_le(*v as u16);
        }
        NodeIdentifier::Numeric(v) => {
            buf.put_u8(NODE_ID_NUMERIC | flags);
            buf.put_u16_le(ns);
            buf.put_u32_le(*v);
        }
        NodeIdentifier::String(s) => {
            buf.put_u8(NODE_ID_STRING | flags);
            buf.put_u16_le(ns);
            write_str(buf, s);
        }
        NodeIdentifier::Guid(g) => {
            buf.put_u8(NODE_ID_GUID | flags);
            buf.put_u16_le(ns);
            g.encode(buf);
        }
        NodeIdentifier::Opaque(b) => {
            buf.put_u8(NODE_ID_BYTE_STRING | flags);
            buf.put_u16_le(ns);
            ByteString(Some(b.clone())).encode(buf);
        }
    }
}

/// Returns the node id and the expanded flags of the encoding byte.
fn decode_node_id(r: &mut BinaryReader) -> CodecResult<(NodeId, u8)> {
    let encoding = r.read_u8()?;
    let flags = encoding & (EXPANDED_NAMESPACE_URI | EXPANDED_SERVER_INDEX);
    let node = match encoding & 0x3F {
        NODE_ID_TWO_BYTE => NodeId::numeric(0, r.read_u8()? as u32),
        NODE_ID_FOUR_BYTE => {
            let ns = r.read_u8()? as u16;
            NodeId::numeric(ns, r.read_u16()? as u32)
        }
        NODE_ID_NUMERIC => {
            let ns = r.read_u16()?;
            NodeId::numeric(ns, r.read_u32()?)
        }
        NODE_ID_STRING => {
            let ns = r.read_u16()?;
            NodeId::string(ns, String::decode(r)?)
        }
        NODE_ID_GUID => {
            let ns = r.read_u16()?;
            NodeId::guid(ns, Uuid::decode(r)?)
        }
        NODE_ID_BYTE_STRING => {
            let ns = r.read_u16()?;
            NodeId::opaque(ns, ByteString::decode(r)?.0.unwrap_or_default())
        }
        other => {
            return Err(ProtocolError::decoding(format!(
                "invalid NodeId encoding 0x{other:02X}"
            )));
        }
    };
    Ok((node, flags))
}

impl BinaryEncode for NodeId {
    fn encode(&self, buf: &mut BytesMut) {
        encode_node_id(self, 0, buf);
    }
}

impl BinaryDecode for NodeId {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        let (node, flags) = decode_node_id(r)?;
        if flags != 0 {
            return Err(ProtocolError::decoding(
                "expanded node id flags set on plain NodeId",
            ));
        }
        Ok(node)
    }
}

impl BinaryEncode for ExpandedNodeId {
    fn encode(&self, buf: &mut BytesMut) {
        let mut flags = 0;
        if self.namespace_uri.is_some() {
            flags |= EXPANDED_NAMESPACE_URI;
        }
        if self.server_index != 0 {
            flags |= EXPANDED_SERVER_INDEX;
        }
        encode_node_id(&self.node_id, flags, buf);
        if let Some(uri) = &self.namespace_uri {
            write_str(buf, uri);
        }
        if self.server_index != 0 {
            buf.put_u32_le(self.server_index);
        }
    }
}

impl BinaryDecode for ExpandedNodeId {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        let (node_id, flags) = decode_node_id(r)?;
        let namespace_uri = if flags & EXPANDED_NAMESPACE_URI != 0 {
            Option::<String>::decode(r)?
        } else {
            None
        };
        let server_index = if flags & EXPANDED_SERVER_INDEX != 0 {
            r.read_u32()?
        } else {
            0
        };
        Ok(Self {
            node_id,
            namespace_uri,
            server_index,
        })
    }
}

// =============================================================================
// QualifiedName / LocalizedText
// =============================================================================

impl BinaryEncode for QualifiedName {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16_le(self.namespace_index);
        self.name.encode(buf);
    }
}

impl BinaryDecode for QualifiedName {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        Ok(Self {
            namespace_index: r.read_u16()?,
            name: Option::<String>::decode(r)?,
        })
    }
}

impl BinaryEncode for LocalizedText {
    fn encode(&self, buf: &mut BytesMut) {
        let mut mask = 0u8;
        if self.locale.is_some() {
            mask |= 0x01;
        }
        if self.text.is_some() {
            mask |= 0x02;
        }
        buf.put_u8(mask);
        if let Some(locale) = &self.locale {
            write_str(buf, locale);
        }
        if let Some(text) = &self.text {
            write_str(buf, text);
        }
    }
}

impl BinaryDecode for LocalizedText {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        let mask = r.read_u8()?;
        let locale = if mask & 0x01 != 0 {
            Option::<String>::decode(r)?
        } else {
            None
        };
        let text = if mask & 0x02 != 0 {
            Option::<String>::decode(r)?
        } else {
            None
        };
        Ok(Self { locale, text })
    }
}

// =============================================================================
// ExtensionObject
// =============================================================================

impl BinaryEncode for ExtensionObject {
    fn encode(&self, buf: &mut BytesMut) {
        self.type_id.encode(buf);
        match &self.body {
            ExtensionObjectBody::None => buf.put_u8(0x00),
            ExtensionObjectBody::Binary(bytes) => {
                buf.put_u8(0x01);
                buf.put_i32_le(bytes.len() as i32);
                buf.put_slice(bytes);
            }
            ExtensionObjectBody::Xml(xml) => {
                buf.put_u8(0x02);
                write_str(buf, xml);
            }
        }
    }
}

impl BinaryDecode for ExtensionObject {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        let type_id = NodeId::decode(r)?;
        let body = match r.read_u8()? {
            0x00 => ExtensionObjectBody::None,
            0x01 => ExtensionObjectBody::Binary(ByteString::decode(r)?.0.unwrap_or_default()),
            0x02 => ExtensionObjectBody::Xml(String::decode(r)?),
            other => {
                return Err(ProtocolError::decoding(format!(
                    "invalid ExtensionObject encoding 0x{other:02X}"
                )));
            }
        };
        Ok(Self { type_id, body })
    }
}

// =============================================================================
// DataValue
// =============================================================================

const DV_VALUE: u8 = 0x01;
const DV_STATUS: u8 = 0x02;
const DV_SOURCE_TIMESTAMP: u8 = 0x04;
const DV_SERVER_TIMESTAMP: u8 = 0x08;
const DV_SOURCE_PICOSECONDS: u8 = 0x10;
const DV_SERVER_PICOSECONDS: u8 = 0x20;

impl BinaryEncode for DataValue {
    fn encode(&self, buf: &mut BytesMut) {
        let mut mask = 0u8;
        if !self.value.is_null() {
            mask |= DV_VALUE;
        }
        if self.status != StatusCode::GOOD {
            mask |= DV_STATUS;
        }
        if self.source_timestamp.is_some() {
            mask |= DV_SOURCE_TIMESTAMP;
        }
        if self.server_timestamp.is_some() {
            mask |= DV_SERVER_TIMESTAMP;
        }
        if self.source_picoseconds.is_some() {
            mask |= DV_SOURCE_PICOSECONDS;
        }
        if self.server_picoseconds.is_some() {
            mask |= DV_SERVER_PICOSECONDS;
        }

        buf.put_u8(mask);
        if mask & DV_VALUE != 0 {
            self.value.encode(buf);
        }
        if mask & DV_STATUS != 0 {
            self.status.encode(buf);
        }
        if let Some(ts) = &self.source_timestamp {
            ts.encode(buf);
        }
        if let Some(ps) = self.source_picoseconds {
            buf.put_u16_le(ps);
        }
        if let Some(ts) = &self.server_timestamp {
            ts.encode(buf);
        }
        if let Some(ps) = self.server_picoseconds {
            buf.put_u16_le(ps);
        }
    }
}

impl BinaryDecode for DataValue {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        r.nested(|r| {
            let mask = r.read_u8()?;
            let mut dv = DataValue::default();
            if mask & DV_VALUE != 0 {
                dv.value = OpcUaValue::decode(r)?;
            }
            if mask & DV_STATUS != 0 {
                dv.status = StatusCode::decode(r)?;
            }
            if mask & DV_SOURCE_TIMESTAMP != 0 {
                dv.source_timestamp = Option::<DateTime<Utc>>::decode(r)?;
            }
            if mask & DV_SOURCE_PICOSECONDS != 0 {
                dv.source_picoseconds = Some(r.read_u16()?);
            }
            if mask & DV_SERVER_TIMESTAMP != 0 {
                dv.server_timestamp = Option::<DateTime<Utc>>::decode(r)?;
            }
            if mask & DV_SERVER_PICOSECONDS != 0 {
                dv.server_picoseconds = Some(r.read_u16()?);
            }
            Ok(dv)
        })
    }
}

// =============================================================================
// DiagnosticInfo
// =============================================================================

const DI_SYMBOLIC_ID: u8 = 0x01;
const DI_NAMESPACE_URI: u8 = 0x02;
const DI_LOCALIZED_TEXT: u8 = 0x04;
const DI_LOCALE: u8 = 0x08;
const DI_ADDITIONAL_INFO: u8 = 0x10;
const DI_INNER_STATUS_CODE: u8 = 0x20;
const DI_INNER_DIAGNOSTIC_INFO: u8 = 0x40;

impl BinaryEncode for DiagnosticInfo {
    fn encode(&self, buf: &mut BytesMut) {
        let mut mask = 0u8;
        for (present, bit) in [
            (self.symbolic_id.is_some(), DI_SYMBOLIC_ID),
            (self.namespace_uri.is_some(), DI_NAMESPACE_URI),
            (self.localized_text.is_some(), DI_LOCALIZED_TEXT),
            (self.locale.is_some(), DI_LOCALE),
            (self.additional_info.is_some(), DI_ADDITIONAL_INFO),
            (self.inner_status_code.is_some(), DI_INNER_STATUS_CODE),
            (self.inner_diagnostic_info.is_some(), DI_INNER_DIAGNOSTIC_INFO),
        ] {
            if present {
                mask |= bit;
            }
        }
        buf.put_u8(mask);
        for v in [self.symbolic_id, self.namespace_uri, self.locale, self.localized_text]
            .into_iter()
            .flatten()
        {
            buf.put_i32_le(v);
        }
        if let Some(info) = &self.additional_info {
            write_str(buf, info);
        }
        if let Some(status) = self.inner_status_code {
            status.encode(buf);
        }
        if let Some(inner) = &self.inner_diagnostic_info {
            inner.encode(buf);
        }
    }
}

impl BinaryDecode for DiagnosticInfo {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        r.nested(|r| {
            let mask = r.read_u8()?;
            let read_index = |bit: u8, r: &mut BinaryReader| -> CodecResult<Option<i32>> {
                if mask & bit != 0 {
                    Ok(Some(r.read_i32()?))
                } else {
                    Ok(None)
                }
            };
            let symbolic_id = read_index(DI_SYMBOLIC_ID, r)?;
            let namespace_uri = read_index(DI_NAMESPACE_URI, r)?;
            let locale = read_index(DI_LOCALE, r)?;
            let localized_text = read_index(DI_LOCALIZED_TEXT, r)?;
            let additional_info = if mask & DI_ADDITIONAL_INFO != 0 {
                Option::<String>::decode(r)?
            } else {
                None
            };
            let inner_status_code = if mask & DI_INNER_STATUS_CODE != 0 {
                Some(StatusCode::decode(r)?)
            } else {
                None
            };
            let inner_diagnostic_info = if mask & DI_INNER_DIAGNOSTIC_INFO != 0 {
                Some(Box::new(DiagnosticInfo::decode(r)?))
            } else {
                None
            };
            Ok(Self {
                symbolic_id,
                namespace_uri,
                locale,
                localized_text,
                additional_info,
                inner_status_code,
                inner_diagnostic_info,
            })
        })
    }
}

// =============================================================================
// Variant
// =============================================================================

const VARIANT_ARRAY: u8 = 0x80;
const VARIANT_DIMENSIONS: u8 = 0x40;
const VARIANT_TYPE_MASK: u8 = 0x3F;
const VARIANT_TYPE_VARIANT: u8 = 24;

fn encode_scalar(value: &OpcUaValue, buf: &mut BytesMut) {
    match value {
        OpcUaValue::Null | OpcUaValue::Array(_) => {}
        OpcUaValue::Boolean(v) => v.encode(buf),
        OpcUaValue::SByte(v) => v.encode(buf),
        OpcUaValue::Byte(v) => v.encode(buf),
        OpcUaValue::Int16(v) => v.encode(buf),
        OpcUaValue::UInt16(v) => v.encode(buf),
        OpcUaValue::Int32(v) => v.encode(buf),
        OpcUaValue::UInt32(v) => v.encode(buf),
        OpcUaValue::Int64(v) => v.encode(buf),
        OpcUaValue::UInt64(v) => v.encode(buf),
        OpcUaValue::Float(v) => v.encode(buf),
        OpcUaValue::Double(v) => v.encode(buf),
        OpcUaValue::String(v) | OpcUaValue::XmlElement(v) => write_str(buf, v),
        OpcUaValue::DateTime(v) => v.encode(buf),
        OpcUaValue::Guid(v) => v.encode(buf),
        OpcUaValue::ByteString(v) => {
            buf.put_i32_le(v.len() as i32);
            buf.put_slice(v);
        }
        OpcUaValue::NodeId(v) => v.encode(buf),
        OpcUaValue::ExpandedNodeId(v) => v.encode(buf),
        OpcUaValue::StatusCode(v) => v.encode(buf),
        OpcUaValue::QualifiedName(v) => v.encode(buf),
        OpcUaValue::LocalizedText(v) => v.encode(buf),
        OpcUaValue::ExtensionObject(v) => v.encode(buf),
        OpcUaValue::DataValue(v) => v.encode(buf),
        OpcUaValue::DiagnosticInfo(v) => v.encode(buf),
    }
}

fn decode_scalar(type_id: u8, r: &mut BinaryReader) -> CodecResult<OpcUaValue> {
    Ok(match type_id {
        0 => OpcUaValue::Null,
        1 => OpcUaValue::Boolean(bool::decode(r)?),
        2 => OpcUaValue::SByte(r.read_i8()?),
        3 => OpcUaValue::Byte(r.read_u8()?),
        4 => OpcUaValue::Int16(r.read_i16()?),
        5 => OpcUaValue::UInt16(r.read_u16()?),
        6 => OpcUaValue::Int32(r.read_i32()?),
        7 => OpcUaValue::UInt32(r.read_u32()?),
        8 => OpcUaValue::Int64(r.read_i64()?),
        9 => OpcUaValue::UInt64(r.read_u64()?),
        10 => OpcUaValue::Float(r.read_f32()?),
        11 => OpcUaValue::Double(r.read_f64()?),
        12 => OpcUaValue::String(String::decode(r)?),
        13 => OpcUaValue::DateTime(DateTime::<Utc>::decode(r)?),
        14 => OpcUaValue::Guid(Uuid::decode(r)?),
        15 => OpcUaValue::ByteString(ByteString::decode(r)?.0.unwrap_or_default()),
        16 => OpcUaValue::XmlElement(String::decode(r)?),
        17 => OpcUaValue::NodeId(Box::new(NodeId::decode(r)?)),
        18 => OpcUaValue::ExpandedNodeId(Box::new(ExpandedNodeId::decode(r)?)),
        19 => OpcUaValue::StatusCode(StatusCode::decode(r)?),
        20 => OpcUaValue::QualifiedName(Box::new(QualifiedName::decode(r)?)),
        21 => OpcUaValue::LocalizedText(Box::new(LocalizedText::decode(r)?)),
        22 => OpcUaValue::ExtensionObject(Box::new(ExtensionObject::decode(r)?)),
        23 => OpcUaValue::DataValue(Box::new(DataValue::decode(r)?)),
        VARIANT_TYPE_VARIANT => OpcUaValue::decode(r)?,
        25 => OpcUaValue::DiagnosticInfo(Box::new(DiagnosticInfo::decode(r)?)),
        other => {
            return Err(ProtocolError::decoding(format!(
                "unknown Variant type id {other}"
            )));
        }
    })
}

impl BinaryEncode for OpcUaValue {
    fn encode(&self, buf: &mut BytesMut) {
        match self {
            OpcUaValue::Array(items) => {
                let element_type = OpcUaValue::array_element_type(items);
                buf.put_u8(element_type | VARIANT_ARRAY);
                buf.put_i32_le(items.len() as i32);
                for item in items {
                    if element_type == VARIANT_TYPE_VARIANT {
                        item.encode(buf);
                    } else {
                        encode_scalar(item, buf);
                    }
                }
            }
            scalar => {
                buf.put_u8(scalar.type_id());
                encode_scalar(scalar, buf);
            }
        }
    }
}

impl BinaryDecode for OpcUaValue {
    fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
        r.nested(|r| {
            let encoding = r.read_u8()?;
            let type_id = encoding & VARIANT_TYPE_MASK;
            if type_id > 25 {
                return Err(ProtocolError::decoding(format!(
                    "unknown Variant type id {type_id}"
                )));
            }

            if encoding & VARIANT_ARRAY == 0 {
                if type_id == VARIANT_TYPE_VARIANT {
                    return Err(ProtocolError::decoding("scalar Variant may not contain a Variant"));
                }
                return decode_scalar(type_id, r);
            }

            let len = r.read_array_length()?.unwrap_or(0);
            r.ensure(len)?;
            let mut items = Vec::with_capacity(len);
            for _ in 0..len {
                items.push(decode_scalar(type_id, r)?);
            }

            if encoding & VARIANT_DIMENSIONS != 0 {
                // Matrix dimensions are read and dropped; values stay flat.
                let _dimensions: Vec<i32> = r.read_array()?;
            }

            Ok(OpcUaValue::Array(items))
        })
    }
}

// =============================================================================
// Enumerations
// =============================================================================

macro_rules! impl_enum_codec {
    ($($ty:ty),* $(,)?) => {
        $(
            impl BinaryEncode for $ty {
                fn encode(&self, buf: &mut BytesMut) {
                    buf.put_i32_le(self.value() as i32);
                }
            }

            impl BinaryDecode for $ty {
                fn decode(r: &mut BinaryReader) -> CodecResult<Self> {
                    let value = r.read_i32()?;
                    <$ty>::from_value(value as _).ok_or_else(|| {
                        ProtocolError::decoding(format!(
                            "invalid {} value {}",
                            stringify!($ty),
                            value
                        ))
                    })
                }
            }
        )*
    };
}

impl_enum_codec!(
    BrowseDirection,
    NodeClass,
    TimestampsToReturn,
    MonitoringMode,
    MessageSecurityMode,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DecodeLimits, decode_from};
    use chrono::TimeZone;

    fn encoded<T: BinaryEncode>(value: &T) -> Vec<u8> {
        value.to_bytes().to_vec()
    }

    #[test]
    fn test_node_id_compact_forms() {
        assert_eq!(encoded(&NodeId::numeric(0, 85)), vec![0x00, 85]);
        assert_eq!(encoded(&NodeId::numeric(2, 1025)), vec![0x01, 2, 0x01, 0x04]);
        assert_eq!(
            encoded(&NodeId::numeric(0, 70000)),
            vec![0x02, 0, 0, 0x70, 0x11, 0x01, 0x00]
        );
        assert_eq!(
            encoded(&NodeId::string(3, "ab")),
            vec![0x03, 3, 0, 2, 0, 0, 0, b'a', b'b']
        );
    }

    #[test]
    fn test_node_id_decodes_any_numeric_form() {
        // Four-byte form of ns=0;i=5 is valid even though two-byte would do.
        let node: NodeId = decode_from(vec![0x01, 0, 5, 0]).unwrap();
        assert_eq!(node, NodeId::numeric(0, 5));
        assert!(decode_from::<NodeId>(vec![0x07, 0]).is_err());
    }

    #[test]
    fn test_expanded_node_id_flags() {
        let expanded = ExpandedNodeId {
            node_id: NodeId::numeric(0, 1),
            namespace_uri: Some("urn:x".into()),
            server_index: 2,
        };
        let bytes = encoded(&expanded);
        assert_eq!(bytes[0], 0xC0);
        assert_eq!(decode_from::<ExpandedNodeId>(bytes).unwrap(), expanded);
    }

    #[test]
    fn test_guid_layout() {
        let guid = Uuid::parse_str("72962B91-FA75-4AE6-8D28-B404DC7DAF63").unwrap();
        assert_eq!(
            encoded(&guid),
            vec![
                0x91, 0x2B, 0x96, 0x72, 0x75, 0xFA, 0xE6, 0x4A, 0x8D, 0x28, 0xB4, 0x04, 0xDC,
                0x7D, 0xAF, 0x63
            ]
        );
    }

    #[test]
    fn test_datetime_ticks() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(datetime_to_ticks(&epoch), UNIX_EPOCH_TICKS);
        assert_eq!(ticks_to_datetime(UNIX_EPOCH_TICKS), Some(epoch));
        assert_eq!(ticks_to_datetime(0), None);
        assert_eq!(encoded(&Option::<DateTime<Utc>>::None), vec![0; 8]);

        let dt = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let back: Option<DateTime<Utc>> = decode_from(encoded(&Some(dt))).unwrap();
        assert_eq!(back, Some(dt));
    }

    #[test]
    fn test_null_and_empty_strings_differ() {
        assert_eq!(encoded(&Option::<String>::None), vec![0xFF; 4]);
        assert_eq!(encoded(&Some(String::new())), vec![0; 4]);
        let s: String = decode_from(vec![0xFF; 4]).unwrap();
        assert!(s.is_empty());
    }

    #[test]
    fn test_string_rejects_bad_utf8_and_limits() {
        assert!(decode_from::<String>(vec![2, 0, 0, 0, 0xC3, 0x28]).is_err());

        let limits = DecodeLimits {
            max_string_length: 4,
            ..Default::default()
        };
        let mut r = BinaryReader::new(encoded(&"hello".to_string()), limits);
        assert!(matches!(
            String::decode(&mut r),
            Err(ProtocolError::LimitExceeded { what: "string", .. })
        ));
    }

    #[test]
    fn test_localized_text_mask() {
        let text = LocalizedText::new("Pump");
        assert_eq!(encoded(&text)[0], 0x02);
        let empty = LocalizedText::default();
        assert_eq!(encoded(&empty), vec![0x00]);
    }

    #[test]
    fn test_variant_scalar_layout() {
        assert_eq!(encoded(&OpcUaValue::Boolean(true)), vec![1, 1]);
        assert_eq!(encoded(&OpcUaValue::UInt32(5)), vec![7, 5, 0, 0, 0]);
        assert_eq!(encoded(&OpcUaValue::Null), vec![0]);
    }

    #[test]
    fn test_variant_arrays() {
        let array = OpcUaValue::from(vec![1i16, 2]);
        assert_eq!(encoded(&array), vec![0x84, 2, 0, 0, 0, 1, 0, 2, 0]);
        assert_eq!(decode_from::<OpcUaValue>(encoded(&array)).unwrap(), array);

        let empty = OpcUaValue::Array(vec![]);
        assert_eq!(encoded(&empty), vec![0x98, 0, 0, 0, 0]);

        let mixed = OpcUaValue::Array(vec![OpcUaValue::Int32(1), OpcUaValue::from("x")]);
        assert_eq!(decode_from::<OpcUaValue>(encoded(&mixed)).unwrap(), mixed);
    }

    #[test]
    fn test_variant_matrix_is_flattened() {
        // Int32 2x2 matrix with dimensions.
        let mut bytes = vec![0xC6, 4, 0, 0, 0];
        for v in 1i32..=4 {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        bytes.extend_from_slice(&[2, 0, 0, 0, 2, 0, 0, 0, 2, 0, 0, 0]);
        let value: OpcUaValue = decode_from(bytes).unwrap();
        assert_eq!(value, OpcUaValue::from(vec![1i32, 2, 3, 4]));
    }

    #[test]
    fn test_variant_unknown_type_fails() {
        assert!(decode_from::<OpcUaValue>(vec![30]).is_err());
        assert!(decode_from::<OpcUaValue>(vec![24]).is_err());
    }

    #[test]
    fn test_data_value_mask() {
        let dv = DataValue::new(OpcUaValue::Double(1.5));
        assert_eq!(encoded(&dv)[0], DV_VALUE);

        let bad = DataValue::with_status(StatusCode::BAD_NODE_ID_UNKNOWN);
        let bytes = encoded(&bad);
        assert_eq!(bytes, vec![DV_STATUS, 0, 0, 0x34, 0x80]);
        assert_eq!(decode_from::<DataValue>(bytes).unwrap(), bad);
    }

    #[test]
    fn test_nested_variant_depth_guard() {
        // A Variant array of Variants, nested deeper than the limit.
        let mut bytes = Vec::new();
        for _ in 0..40 {
            bytes.extend_from_slice(&[0x98, 1, 0, 0, 0]);
        }
        bytes.push(0);
        assert!(matches!(
            decode_from::<OpcUaValue>(bytes),
            Err(ProtocolError::LimitExceeded { what: "nesting depth", .. })
        ));
    }

    #[test]
    fn test_diagnostic_info_order() {
        let info = DiagnosticInfo {
            symbolic_id: Some(1),
            locale: Some(2),
            additional_info: Some("x".into()),
            inner_status_code: Some(StatusCode::BAD),
            ..Default::default()
        };
        let bytes = encoded(&info);
        assert_eq!(bytes[0], DI_SYMBOLIC_ID | DI_LOCALE | DI_ADDITIONAL_INFO | DI_INNER_STATUS_CODE);
        assert_eq!(&bytes[1..9], &[1, 0, 0, 0, 2, 0, 0, 0]);
        assert_eq!(decode_from::<DiagnosticInfo>(bytes).unwrap(), info);
    }

    #[test]
    fn test_enum_codec() {
        assert_eq!(encoded(&BrowseDirection::Both), vec![2, 0, 0, 0]);
        assert_eq!(decode_from::<NodeClass>(vec![2, 0, 0, 0]).unwrap(), NodeClass::Variable);
        assert!(decode_from::<NodeClass>(vec![3, 0, 0, 0]).is_err());
    }
}
