// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Read and Write service messages.

use super::{RequestHeader, ResponseHeader, impl_service};
use crate::binary_struct;
use crate::status::StatusCode;
use crate::types::{NodeId, QualifiedName, TimestampsToReturn};
use crate::value::{DataValue, DiagnosticInfo};

binary_struct! {
    /// Node attribute to read.
    pub struct ReadValueId {
        /// Node.
        pub node_id: NodeId,
        /// Attribute id.
        pub attribute_id: u32,
        /// Index range for arrays.
        pub index_range: Option<String>,
        /// Data encoding, null for the default.
        pub data_encoding: QualifiedName,
    }
}

impl ReadValueId {
    /// Reads `attribute_id` of `node_id`.
    pub fn new(node_id: NodeId, attribute_id: u32) -> Self {
        Self {
            node_id,
            attribute_id,
            ..Default::default()
        }
    }
}

binary_struct! {
    /// Read request.
    pub struct ReadRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Maximum age of cached values in milliseconds.
        pub max_age: f64,
        /// Timestamps to return.
        pub timestamps_to_return: TimestampsToReturn,
        /// Attributes to read.
        pub nodes_to_read: Vec<ReadValueId>,
    }
}

binary_struct! {
    /// Read response.
    pub struct ReadResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// One data value per attribute.
        pub results: Vec<DataValue>,
        /// Diagnostics.
        pub diagnostic_infos: Vec<DiagnosticInfo>,
    }
}

binary_struct! {
    /// Attribute value to write.
    pub struct WriteValue {
        /// Node.
        pub node_id: NodeId,
        /// Attribute id.
        pub attribute_id: u32,
        /// Index range for arrays.
        pub index_range: Option<String>,
        /// Value to write.
        pub value: DataValue,
    }
}

binary_struct! {
    /// Write request.
    pub struct WriteRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Values to write.
        pub nodes_to_write: Vec<WriteValue>,
    }
}

binary_struct! {
    /// Write response.
    pub struct WriteResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// One status per write.
        pub results: Vec<StatusCode>,
        /// Diagnostics.
        pub diagnostic_infos: Vec<DiagnosticInfo>,
    }
}

impl_service! {
    ReadRequest => ReadResponse, 631, 634, "Read";
    WriteRequest => WriteResponse, 673, 676, "Write";
}
