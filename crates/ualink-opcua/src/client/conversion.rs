// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Value conversion between text, typed values and the wire representation.
//!
//! - [`parse_value`] turns user input into an [`OpcUaValue`] of a named type.
//! - [`DataConverter`] coerces an existing value into another built-in type
//!   with range checks.
//! - [`TypedValue`] pairs a value with its [`Quality`] and timestamps.

use std::fmt;
use std::str::FromStr;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{ConversionError, OpcUaError, OpcUaResult};
use crate::status::StatusCode;
use crate::types::{LocalizedText, NodeId, OpcUaDataType};
use crate::value::{DataValue, OpcUaValue};

// =============================================================================
// Text parsing
// =============================================================================

/// Parses boolean text: `true/false`, `1/0`, `on/off`, `yes/no`.
pub fn parse_bool(text: &str) -> OpcUaResult<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Ok(true),
        "false" | "0" | "off" | "no" => Ok(false),
        _ => Err(invalid(text, OpcUaDataType::Boolean, "expected true/false, 1/0, on/off or yes/no")),
    }
}

/// Parses `text` as a value of `data_type`.
///
/// ```
/// use ualink_opcua::client::parse_value;
/// use ualink_opcua::types::OpcUaDataType;
/// use ualink_opcua::value::OpcUaValue;
///
/// assert_eq!(parse_value("42", OpcUaDataType::UInt32).unwrap(), OpcUaValue::UInt32(42));
/// assert_eq!(parse_value("on", OpcUaDataType::Boolean).unwrap(), OpcUaValue::Boolean(true));
/// assert!(parse_value("-1", OpcUaDataType::UInt32).is_err());
/// ```
pub fn parse_value(text: &str, data_type: OpcUaDataType) -> OpcUaResult<OpcUaValue> {
    let trimmed = text.trim();
    let value = match data_type {
        OpcUaDataType::Boolean => OpcUaValue::Boolean(parse_bool(trimmed)?),
        OpcUaDataType::SByte => OpcUaValue::SByte(parse_number(trimmed, data_type)?),
        OpcUaDataType::Byte => OpcUaValue::Byte(parse_number(trimmed, data_type)?),
        OpcUaDataType::Int16 => OpcUaValue::Int16(parse_number(trimmed, data_type)?),
        OpcUaDataType::UInt16 => OpcUaValue::UInt16(parse_number(trimmed, data_type)?),
        OpcUaDataType::Int32 => OpcUaValue::Int32(parse_number(trimmed, data_type)?),
        OpcUaDataType::UInt32 => OpcUaValue::UInt32(parse_number(trimmed, data_type)?),
        OpcUaDataType::Int64 => OpcUaValue::Int64(parse_number(trimmed, data_type)?),
        OpcUaDataType::UInt64 => OpcUaValue::UInt64(parse_number(trimmed, data_type)?),
        OpcUaDataType::Float => {
            let v: f32 = parse_number(trimmed, data_type)?;
            if !v.is_finite() {
                return Err(invalid(text, data_type, "value out of range"));
            }
            OpcUaValue::Float(v)
        }
        OpcUaDataType::Double => OpcUaValue::Double(parse_number(trimmed, data_type)?),
        // Strings keep their surrounding whitespace.
        OpcUaDataType::String => OpcUaValue::String(text.to_string()),
        OpcUaDataType::XmlElement => OpcUaValue::XmlElement(text.to_string()),
        OpcUaDataType::LocalizedText => OpcUaValue::LocalizedText(Box::new(LocalizedText::new(text))),
        OpcUaDataType::DateTime => {
            let dt = DateTime::parse_from_rfc3339(trimmed)
                .map_err(|e| invalid(text, data_type, e))?
                .with_timezone(&Utc);
            OpcUaValue::DateTime(dt)
        }
        OpcUaDataType::Guid => {
            OpcUaValue::Guid(Uuid::parse_str(trimmed).map_err(|e| invalid(text, data_type, e))?)
        }
        OpcUaDataType::ByteString => OpcUaValue::ByteString(
            BASE64
                .decode(trimmed)
                .map_err(|e| invalid(text, data_type, e))?,
        ),
        OpcUaDataType::NodeId => OpcUaValue::NodeId(Box::new(NodeId::from_str(trimmed)?)),
        OpcUaDataType::StatusCode => {
            let raw = trimmed.trim_start_matches("0x").trim_start_matches("0X");
            let code = u32::from_str_radix(raw, 16).map_err(|e| invalid(text, data_type, e))?;
            OpcUaValue::StatusCode(StatusCode(code))
        }
        other => {
            return Err(OpcUaError::conversion(ConversionError::unsupported_type(
                other.name(),
            )));
        }
    };
    Ok(value)
}

/// Parses `text` with a type name such as `uint32` or `bool`.
pub fn parse_typed(text: &str, type_name: &str) -> OpcUaResult<OpcUaValue> {
    parse_value(text, type_name.parse()?)
}

fn parse_number<T>(text: &str, data_type: OpcUaDataType) -> OpcUaResult<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    text.parse().map_err(|e| invalid(text, data_type, e))
}

fn invalid(text: &str, data_type: OpcUaDataType, reason: impl fmt::Display) -> OpcUaError {
    OpcUaError::conversion(ConversionError::invalid_value(text, data_type, reason))
}

// =============================================================================
// DataConverter
// =============================================================================

/// Coerces values between built-in types.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataConverter {
    /// Allow float to integer conversion by truncation.
    pub allow_truncation: bool,
}

impl DataConverter {
    /// Creates a strict converter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allows float to integer conversion by truncation.
    pub fn with_truncation(mut self, allow: bool) -> Self {
        self.allow_truncation = allow;
        self
    }

    /// Converts `value` into `target`.
    pub fn convert(&self, value: &OpcUaValue, target: OpcUaDataType) -> OpcUaResult<OpcUaValue> {
        if value.data_type() == target && !value.is_array() {
            return Ok(value.clone());
        }

        let mismatch =
            || OpcUaError::conversion(ConversionError::type_mismatch(target.name(), value.data_type().name()));

        match target {
            OpcUaDataType::Boolean => match value {
                OpcUaValue::String(s) => Ok(OpcUaValue::Boolean(parse_bool(s)?)),
                other => other.as_i64().map(|v| OpcUaValue::Boolean(v != 0)).ok_or_else(mismatch),
            },
            OpcUaDataType::Float | OpcUaDataType::Double => {
                let v = match value {
                    OpcUaValue::Boolean(b) => f64::from(u8::from(*b)),
                    OpcUaValue::String(s) => return parse_value(s, target),
                    other => other.as_f64().ok_or_else(mismatch)?,
                };
                if target == OpcUaDataType::Float {
                    if v.is_finite() && v.abs() > f32::MAX as f64 {
                        return Err(range_error(value, target));
                    }
                    Ok(OpcUaValue::Float(v as f32))
                } else {
                    Ok(OpcUaValue::Double(v))
                }
            }
            OpcUaDataType::String => match value {
                OpcUaValue::Null | OpcUaValue::Array(_) => Err(mismatch()),
                other => Ok(OpcUaValue::String(other.to_string())),
            },
            OpcUaDataType::SByte
            | OpcUaDataType::Byte
            | OpcUaDataType::Int16
            | OpcUaDataType::UInt16
            | OpcUaDataType::Int32
            | OpcUaDataType::UInt32
            | OpcUaDataType::Int64
            | OpcUaDataType::UInt64 => {
                if let OpcUaValue::String(s) = value {
                    return parse_value(s, target);
                }
                if let OpcUaValue::UInt64(v) = value {
                    return integer_from_u64(*v, target).ok_or_else(|| range_error(value, target));
                }
                let v = match value {
                    OpcUaValue::Boolean(b) => i64::from(*b),
                    OpcUaValue::Float(_) | OpcUaValue::Double(_) => {
                        let f = value.as_f64().ok_or_else(mismatch)?;
                        if !self.allow_truncation && f.fract() != 0.0 {
                            return Err(OpcUaError::conversion(ConversionError::invalid_value(
                                value.to_string(),
                                target,
                                "fractional value",
                            )));
                        }
                        if !f.is_finite() || f < i64::MIN as f64 || f > i64::MAX as f64 {
                            return Err(range_error(value, target));
                        }
                        f.trunc() as i64
                    }
                    other => other.as_i64().ok_or_else(mismatch)?,
                };
                integer_from_i64(v, target).ok_or_else(|| range_error(value, target))
            }
            _ => Err(mismatch()),
        }
    }
}

fn integer_from_i64(v: i64, target: OpcUaDataType) -> Option<OpcUaValue> {
    Some(match target {
        OpcUaDataType::SByte => OpcUaValue::SByte(i8::try_from(v).ok()?),
        OpcUaDataType::Byte => OpcUaValue::Byte(u8::try_from(v).ok()?),
        OpcUaDataType::Int16 => OpcUaValue::Int16(i16::try_from(v).ok()?),
        OpcUaDataType::UInt16 => OpcUaValue::UInt16(u16::try_from(v).ok()?),
        OpcUaDataType::Int32 => OpcUaValue::Int32(i32::try_from(v).ok()?),
        OpcUaDataType::UInt32 => OpcUaValue::UInt32(u32::try_from(v).ok()?),
        OpcUaDataType::Int64 => OpcUaValue::Int64(v),
        OpcUaDataType::UInt64 => OpcUaValue::UInt64(u64::try_from(v).ok()?),
        _ => return None,
    })
}

fn integer_from_u64(v: u64, target: OpcUaDataType) -> Option<OpcUaValue> {
    match target {
        OpcUaDataType::UInt64 => Some(OpcUaValue::UInt64(v)),
        other => integer_from_i64(i64::try_from(v).ok()?, other),
    }
}

fn range_error(value: &OpcUaValue, target: OpcUaDataType) -> OpcUaError {
    OpcUaError::conversion(ConversionError::invalid_value(
        value.to_string(),
        target,
        "value out of range",
    ))
}

// =============================================================================
// TypedValue
// =============================================================================

/// A value with quality and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedValue {
    /// The underlying value.
    pub value: OpcUaValue,

    /// Quality derived from the status code.
    pub quality: Quality,

    /// Raw status code.
    pub status: StatusCode,

    /// Server timestamp.
    pub server_timestamp: Option<DateTime<Utc>>,

    /// Source timestamp.
    pub source_timestamp: Option<DateTime<Utc>>,
}

impl TypedValue {
    /// Creates a good value without timestamps.
    pub fn new(value: OpcUaValue) -> Self {
        Self {
            value,
            quality: Quality::Good,
            status: StatusCode::GOOD,
            server_timestamp: None,
            source_timestamp: None,
        }
    }

    /// Creates a null typed value.
    pub fn null() -> Self {
        Self::new(OpcUaValue::Null)
    }

    /// Returns `true` if the value quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.quality.is_good()
    }

    /// Returns `true` if the value is null.
    #[inline]
    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    /// Returns the data type.
    pub fn data_type(&self) -> OpcUaDataType {
        self.value.data_type()
    }

    /// Attempts to get the value as a boolean.
    pub fn as_bool(&self) -> OpcUaResult<bool> {
        self.value.as_bool().ok_or_else(|| self.mismatch("Boolean"))
    }

    /// Attempts to get the value as an i64.
    pub fn as_i64(&self) -> OpcUaResult<i64> {
        self.value.as_i64().ok_or_else(|| self.mismatch("Integer"))
    }

    /// Attempts to get the value as an f64.
    pub fn as_f64(&self) -> OpcUaResult<f64> {
        self.value.as_f64().ok_or_else(|| self.mismatch("Float"))
    }

    /// Attempts to get the value as a string.
    pub fn as_str(&self) -> OpcUaResult<&str> {
        self.value.as_str().ok_or_else(|| self.mismatch("String"))
    }

    fn mismatch(&self, expected: &str) -> OpcUaError {
        OpcUaError::conversion(ConversionError::type_mismatch(expected, self.data_type().name()))
    }
}

impl From<DataValue> for TypedValue {
    fn from(data: DataValue) -> Self {
        Self {
            quality: Quality::from_status_code(data.status),
            status: data.status,
            server_timestamp: data.server_timestamp,
            source_timestamp: data.source_timestamp,
            value: data.value,
        }
    }
}

impl Default for TypedValue {
    fn default() -> Self {
        Self::null()
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.value, self.quality)
    }
}

// =============================================================================
// Quality
// =============================================================================

/// OPC UA data quality indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Quality {
    /// Good quality - value is usable.
    #[default]
    Good,

    /// Good with local override.
    GoodLocalOverride,

    /// Uncertain quality - value may be usable.
    Uncertain,

    /// Uncertain with last usable value.
    UncertainLastUsable,

    /// Uncertain with sensor not accurate.
    UncertainSensorNotAccurate,

    /// Bad quality - value should not be used.
    Bad,

    /// Bad with communication failure.
    BadCommFailure,

    /// Bad with sensor failure.
    BadSensorFailure,

    /// Bad with out of service.
    BadOutOfService,

    /// Bad with configuration error.
    BadConfigError,
}

impl Quality {
    /// Derives the quality from a status code.
    pub fn from_status_code(status: StatusCode) -> Self {
        match status.bits() {
            0 => Self::Good,
            0x0096_0000 => Self::GoodLocalOverride,
            0x4090_0000 => Self::UncertainLastUsable,
            0x4093_0000 => Self::UncertainSensorNotAccurate,
            0x8005_0000 | 0x8031_0000 | 0x808A_0000 => Self::BadCommFailure,
            0x808C_0000 => Self::BadSensorFailure,
            0x808D_0000 => Self::BadOutOfService,
            0x8089_0000 => Self::BadConfigError,
            _ if status.is_bad() => Self::Bad,
            _ if status.is_uncertain() => Self::Uncertain,
            _ => Self::Good,
        }
    }

    /// Returns `true` if the quality is good.
    #[inline]
    pub fn is_good(&self) -> bool {
        matches!(self, Self::Good | Self::GoodLocalOverride)
    }

    /// Returns `true` if the quality is uncertain.
    #[inline]
    pub fn is_uncertain(&self) -> bool {
        matches!(
            self,
            Self::Uncertain | Self::UncertainLastUsable | Self::UncertainSensorNotAccurate
        )
    }

    /// Returns `true` if the quality is bad.
    #[inline]
    pub fn is_bad(&self) -> bool {
        !self.is_good() && !self.is_uncertain()
    }

    /// Returns `true` if the value is usable (good or uncertain).
    #[inline]
    pub fn is_usable(&self) -> bool {
        !self.is_bad()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Good => write!(f, "Good"),
            Self::GoodLocalOverride => write!(f, "Good (Local Override)"),
            Self::Uncertain => write!(f, "Uncertain"),
            Self::UncertainLastUsable => write!(f, "Uncertain (Last Usable)"),
            Self::UncertainSensorNotAccurate => write!(f, "Uncertain (Sensor Not Accurate)"),
            Self::Bad => write!(f, "Bad"),
            Self::BadCommFailure => write!(f, "Bad (Communication Failure)"),
            Self::BadSensorFailure => write!(f, "Bad (Sensor Failure)"),
            Self::BadOutOfService => write!(f, "Bad (Out of Service)"),
            Self::BadConfigError => write!(f, "Bad (Configuration Error)"),
        }
    }
}
