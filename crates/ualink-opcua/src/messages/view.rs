// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Browse and BrowseNext service messages.

use chrono::{DateTime, Utc};

use super::{RequestHeader, ResponseHeader, impl_service};
use crate::binary_struct;
use crate::status::StatusCode;
use crate::types::{
    BrowseDirection, ByteString, ExpandedNodeId, LocalizedText, NodeClass, NodeId, QualifiedName,
};
use crate::value::DiagnosticInfo;

binary_struct! {
    /// View to browse in; null for the whole address space.
    pub struct ViewDescription {
        /// View node.
        pub view_id: NodeId,
        /// View timestamp.
        pub timestamp: Option<DateTime<Utc>>,
        /// View version.
        pub view_version: u32,
    }
}

binary_struct! {
    /// Node and filter to browse.
    pub struct BrowseDescription {
        /// Starting node.
        pub node_id: NodeId,
        /// Direction.
        pub browse_direction: BrowseDirection,
        /// Reference type to follow.
        pub reference_type_id: NodeId,
        /// Follow subtypes of the reference type.
        pub include_subtypes: bool,
        /// Node class mask, 0 for all.
        pub node_class_mask: u32,
        /// Fields to return.
        pub result_mask: u32,
    }
}

binary_struct! {
    /// One reference found by browsing.
    pub struct ReferenceDescription {
        /// Reference type.
        pub reference_type_id: NodeId,
        /// Forward reference.
        pub is_forward: bool,
        /// Target node.
        pub node_id: ExpandedNodeId,
        /// Target browse name.
        pub browse_name: QualifiedName,
        /// Target display name.
        pub display_name: LocalizedText,
        /// Target node class.
        pub node_class: NodeClass,
        /// Target type definition.
        pub type_definition: ExpandedNodeId,
    }
}

binary_struct! {
    /// Browse result for one node.
    pub struct BrowseResult {
        /// Status for this node.
        pub status_code: StatusCode,
        /// Set when more references are available.
        pub continuation_point: ByteString,
        /// References.
        pub references: Vec<ReferenceDescription>,
    }
}

binary_struct! {
    /// Browse request.
    pub struct BrowseRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// View.
        pub view: ViewDescription,
        /// Per-node reference limit, 0 for server default.
        pub requested_max_references_per_node: u32,
        /// Nodes to browse.
        pub nodes_to_browse: Vec<BrowseDescription>,
    }
}

binary_struct! {
    /// Browse response.
    pub struct BrowseResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// Results.
        pub results: Vec<BrowseResult>,
        /// Diagnostics.
        pub diagnostic_infos: Vec<DiagnosticInfo>,
    }
}

binary_struct! {
    /// BrowseNext request.
    pub struct BrowseNextRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Release the points instead of continuing.
        pub release_continuation_points: bool,
        /// Continuation points.
        pub continuation_points: Vec<ByteString>,
    }
}

binary_struct! {
    /// BrowseNext response.
    pub struct BrowseNextResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// Results.
        pub results: Vec<BrowseResult>,
        /// Diagnostics.
        pub diagnostic_infos: Vec<DiagnosticInfo>,
    }
}

impl_service! {
    BrowseRequest => BrowseResponse, 527, 530, "Browse";
    BrowseNextRequest => BrowseNextResponse, 533, 536, "BrowseNext";
}
