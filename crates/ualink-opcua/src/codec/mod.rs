// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA binary encoding.
//!
//! All values are little endian. Strings, byte strings and arrays carry an
//! `i32` length prefix where `-1` means null.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────┐   encode(&mut BytesMut)   ┌──────────────┐
//! │  Rust value   │ ────────────────────────▶ │    bytes     │
//! │ (BinaryEncode │                           │              │
//! │  BinaryDecode)│ ◀──────────────────────── │ BinaryReader │
//! └───────────────┘   decode(&mut reader)     └──────────────┘
//! ```
//!
//! Decoding is bounds checked: truncated input, oversized lengths and
//! unknown type ids produce [`ProtocolError`] rather than panics.

mod builtin;

pub use builtin::{datetime_to_ticks, ticks_to_datetime, UNIX_EPOCH_TICKS};

use bytes::{Buf, Bytes, BytesMut};

use crate::error::{CodecResult, ProtocolError};
use crate::types::ClientLimits;

// =============================================================================
// Traits
// =============================================================================

/// Types that can be written in OPC UA binary form.
pub trait BinaryEncode {
    /// Appends the binary form of `self` to `buf`.
    fn encode(&self, buf: &mut BytesMut);

    /// Encodes into a fresh buffer.
    fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }
}

/// Types that can be read from OPC UA binary form.
pub trait BinaryDecode: Sized {
    /// Reads a value, advancing the reader.
    fn decode(r: &mut BinaryReader) -> CodecResult<Self>;
}

// =============================================================================
// DecodeLimits
// =============================================================================

/// Upper bounds applied while decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Longest string accepted.
    pub max_string_length: usize,
    /// Longest byte string accepted.
    pub max_byte_string_length: usize,
    /// Longest array accepted.
    pub max_array_length: usize,
    /// Deepest nesting of variants and diagnostic infos.
    pub max_depth: usize,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_string_length: 1_048_576,
            max_byte_string_length: 1_048_576,
            max_array_length: 65535,
            max_depth: 32,
        }
    }
}

impl From<&ClientLimits> for DecodeLimits {
    fn from(limits: &ClientLimits) -> Self {
        Self {
            max_string_length: limits.max_string_length,
            max_byte_string_length: limits.max_byte_string_length,
            max_array_length: limits.max_array_length,
            ..Default::default()
        }
    }
}

// =============================================================================
// BinaryReader
// =============================================================================

/// Bounds-checked cursor over a binary message.
#[derive(Debug)]
pub struct BinaryReader {
    buf: Bytes,
    limits: DecodeLimits,
    depth: usize,
}

macro_rules! read_primitive {
    ($($name:ident -> $ty:ty = $get:ident, $size:expr;)*) => {
        $(
            #[doc = concat!("Reads a little endian `", stringify!($ty), "`.")]
            #[inline]
            pub fn $name(&mut self) -> CodecResult<$ty> {
                self.ensure($size)?;
                Ok(self.buf.$get())
            }
        )*
    };
}

impl BinaryReader {
    /// Creates a reader with the given limits.
    pub fn new(buf: impl Into<Bytes>, limits: DecodeLimits) -> Self {
        Self {
            buf: buf.into(),
            limits,
            depth: 0,
        }
    }

    /// Creates a reader with default limits.
    pub fn with_defaults(buf: impl Into<Bytes>) -> Self {
        Self::new(buf, DecodeLimits::default())
    }

    /// Returns the active limits.
    pub fn limits(&self) -> &DecodeLimits {
        &self.limits
    }

    /// Returns the number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Returns `true` when all bytes were consumed.
    #[inline]
    pub fn is_empty(&self) -> bool {
        !self.buf.has_remaining()
    }

    /// Consumes the reader and returns the unread bytes.
    pub fn into_remaining(self) -> Bytes {
        self.buf
    }

    /// Fails unless `n` bytes are available.
    #[inline]
    pub fn ensure(&self, n: usize) -> CodecResult<()> {
        if self.buf.remaining() < n {
            Err(ProtocolError::truncated(n, self.buf.remaining()))
        } else {
            Ok(())
        }
    }

    read_primitive! {
        read_u8 -> u8 = get_u8, 1;
        read_i8 -> i8 = get_i8, 1;
        read_u16 -> u16 = get_u16_le, 2;
        read_i16 -> i16 = get_i16_le, 2;
        read_u32 -> u32 = get_u32_le, 4;
        read_i32 -> i32 = get_i32_le, 4;
        read_u64 -> u64 = get_u64_le, 8;
        read_i64 -> i64 = get_i64_le, 8;
        read_f32 -> f32 = get_f32_le, 4;
        read_f64 -> f64 = get_f64_le, 8;
    }

    /// Reads `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> CodecResult<Bytes> {
        self.ensure(n)?;
        Ok(self.buf.split_to(n))
    }

    /// Reads an `i32` length prefix. `None` for null (-1 or any negative).
    pub fn read_length(&mut self, what: &'static str, max: usize) -> CodecResult<Option<usize>> {
        let len = self.read_i32()?;
        if len < 0 {
            return Ok(None);
        }
        let len = len as usize;
        if len > max {
            return Err(ProtocolError::limit_exceeded(what, len, max));
        }
        Ok(Some(len))
    }

    /// Reads an array length prefix checked against the array limit.
    pub fn read_array_length(&mut self) -> CodecResult<Option<usize>> {
        let max = self.limits.max_array_length;
        self.read_length("array", max)
    }

    /// Reads an array; null decodes as empty.
    pub fn read_array<T: BinaryDecode>(&mut self) -> CodecResult<Vec<T>> {
        Ok(self.read_nullable_array()?.unwrap_or_default())
    }

    /// Reads an array keeping the null distinction.
    pub fn read_nullable_array<T: BinaryDecode>(&mut self) -> CodecResult<Option<Vec<T>>> {
        let Some(len) = self.read_array_length()? else {
            return Ok(None);
        };
        // Each element takes at least one byte.
        self.ensure(len)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::decode(self)?);
        }
        Ok(Some(items))
    }

    /// Runs `f` one nesting level deeper, failing past the depth limit.
    pub fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> CodecResult<T>,
    ) -> CodecResult<T> {
        if self.depth >= self.limits.max_depth {
            return Err(ProtocolError::limit_exceeded(
                "nesting depth",
                self.depth + 1,
                self.limits.max_depth,
            ));
        }
        self.depth += 1;
        let result = f(self);
        self.depth -= 1;
        result
    }
}

/// Decodes a complete value from `bytes`.
pub fn decode_from<T: BinaryDecode>(bytes: impl Into<Bytes>) -> CodecResult<T> {
    let mut reader = BinaryReader::with_defaults(bytes);
    T::decode(&mut reader)
}

/// Writes an array with its length prefix.
pub fn write_array<T: BinaryEncode>(buf: &mut BytesMut, items: &[T]) {
    (items.len() as i32).encode(buf);
    for item in items {
        item.encode(buf);
    }
}

// =============================================================================
// Struct and enum generators
// =============================================================================

/// Declares a structure whose binary form is its fields in order.
#[macro_export]
macro_rules! binary_struct {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fmeta:meta])*
                pub $field:ident : $ty:ty,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Default)]
        pub struct $name {
            $(
                $(#[$fmeta])*
                pub $field: $ty,
            )*
        }

        impl $crate::codec::BinaryEncode for $name {
            #[allow(unused_variables)]
            fn encode(&self, buf: &mut ::bytes::BytesMut) {
                $( $crate::codec::BinaryEncode::encode(&self.$field, buf); )*
            }
        }

        impl $crate::codec::BinaryDecode for $name {
            #[allow(unused_variables)]
            fn decode(
                r: &mut $crate::codec::BinaryReader,
            ) -> $crate::error::CodecResult<Self> {
                Ok(Self {
                    $( $field: $crate::codec::BinaryDecode::decode(r)?, )*
                })
            }
        }
    };
}

/// Declares an enumeration encoded as `i32`.
#[macro_export]
macro_rules! binary_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $value:literal,
            )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant = $value,
            )*
        }

        impl $crate::codec::BinaryEncode for $name {
            fn encode(&self, buf: &mut ::bytes::BytesMut) {
                $crate::codec::BinaryEncode::encode(&(*self as i32), buf);
            }
        }

        impl $crate::codec::BinaryDecode for $name {
            fn decode(
                r: &mut $crate::codec::BinaryReader,
            ) -> $crate::error::CodecResult<Self> {
                match r.read_i32()? {
                    $( $value => Ok(Self::$variant), )*
                    other => Err($crate::error::ProtocolError::decoding(format!(
                        "invalid {} value {}",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }
    };
}
