// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Attribute and view services.
//!
//! [`NodeService`] wraps the Read, Write, Browse and BrowseNext services
//! on top of the request dispatcher and turns their per-operation results
//! into [`ReadResult`], [`WriteResult`] and [`BrowsePage`] values.
//!
//! # Examples
//!
//! ```rust,ignore
//! use ualink_opcua::client::{BrowseOptions, NodeService};
//!
//! let nodes = NodeService::new(dispatcher);
//! let result = nodes.read_value(&"ns=3;s=Demo.Dynamic.Scalar.UInt32".parse()?).await?;
//! println!("{} = {}", result.node_id, result.value);
//!
//! let references = nodes
//!     .browse_all(&NodeId::numeric(0, 85), &BrowseOptions::objects_and_variables())
//!     .await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, trace, warn};

use super::conversion::{TypedValue, parse_typed};
use super::dispatcher::RequestDispatcher;
use crate::error::{OpcUaError, OpcUaResult, OperationError};
use crate::messages::{
    BrowseDescription, BrowseNextRequest, BrowseRequest, BrowseResult, BuildInfo, ReadRequest,
    ReadValueId, ReferenceDescription, ServerStatusDataType, WriteRequest, WriteValue,
    check_result_count,
};
use crate::status::StatusCode;
use crate::types::{
    AttributeId, BrowseDirection, ByteString, NodeClass, NodeId, ServerState, TimestampsToReturn,
    ids,
};
use crate::value::{DataValue, OpcUaValue};

/// Result mask requesting every ReferenceDescription field.
const BROWSE_RESULT_MASK_ALL: u32 = 0x3F;

// =============================================================================
// ReadResult / WriteResult
// =============================================================================

/// Result of reading one attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    /// The node that was read.
    pub node_id: NodeId,

    /// The attribute that was read.
    pub attribute: AttributeId,

    /// The value, `Null` when the read failed.
    pub value: OpcUaValue,

    /// Status code of the operation.
    pub status: StatusCode,

    /// Timestamp from the data source.
    pub source_timestamp: Option<DateTime<Utc>>,

    /// Timestamp from the server.
    pub server_timestamp: Option<DateTime<Utc>>,
}

impl ReadResult {
    fn from_data_value(node_id: NodeId, attribute: AttributeId, data: DataValue) -> Self {
        Self {
            node_id,
            attribute,
            value: data.value,
            status: data.status,
            source_timestamp: data.source_timestamp,
            server_timestamp: data.server_timestamp,
        }
    }

    /// Returns `true` if the read was successful.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }

    /// Converts into a value with quality.
    pub fn to_typed(&self) -> TypedValue {
        TypedValue::from(DataValue {
            value: self.value.clone(),
            status: self.status,
            source_timestamp: self.source_timestamp,
            server_timestamp: self.server_timestamp,
            ..Default::default()
        })
    }

    /// Returns the value or an operation error for a bad status.
    pub fn into_value(self) -> OpcUaResult<OpcUaValue> {
        if self.status.is_bad() {
            Err(OperationError::read_failed(&self.node_id, self.status).into())
        } else {
            Ok(self.value)
        }
    }
}

/// Result of writing one value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// The node that was written.
    pub node_id: NodeId,

    /// Status code of the operation.
    pub status: StatusCode,
}

impl WriteResult {
    /// Returns `true` if the write was successful.
    #[inline]
    pub fn is_good(&self) -> bool {
        self.status.is_good()
    }

    /// Converts a bad status into an operation error.
    pub fn check(self) -> OpcUaResult<()> {
        if self.status.is_good() {
            Ok(())
        } else {
            Err(OperationError::write_failed(&self.node_id, self.status).into())
        }
    }
}

// =============================================================================
// BrowseOptions
// =============================================================================

/// Options for browse operations.
///
/// # Examples
///
/// ```rust
/// use ualink_opcua::client::BrowseOptions;
/// use ualink_opcua::types::{BrowseDirection, NodeClass};
///
/// let options = BrowseOptions::default()
///     .with_direction(BrowseDirection::Both)
///     .add_node_class(NodeClass::Variable);
/// assert_eq!(options.node_class_mask(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrowseOptions {
    /// Browse direction.
    #[serde(default)]
    pub direction: BrowseDirection,

    /// Filter by node class (empty = all classes).
    #[serde(default)]
    pub node_class_filter: Vec<NodeClass>,

    /// Reference type to follow (None = hierarchical references).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference_type_id: Option<NodeId>,

    /// Include subtypes of the reference type.
    #[serde(default = "default_true")]
    pub include_subtypes: bool,

    /// Maximum references per node and request, 0 for the server default.
    #[serde(default = "default_max_references")]
    pub max_references_per_node: u32,
}

fn default_true() -> bool {
    true
}

fn default_max_references() -> u32 {
    1000
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            direction: BrowseDirection::Forward,
            node_class_filter: Vec::new(),
            reference_type_id: None,
            include_subtypes: true,
            max_references_per_node: default_max_references(),
        }
    }
}

impl BrowseOptions {
    /// Creates new browse options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the browse direction.
    pub fn with_direction(mut self, direction: BrowseDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Sets the node class filter.
    pub fn with_node_class_filter(mut self, classes: Vec<NodeClass>) -> Self {
        self.node_class_filter = classes;
        self
    }

    /// Adds a node class to the filter.
    pub fn add_node_class(mut self, class: NodeClass) -> Self {
        self.node_class_filter.push(class);
        self
    }

    /// Sets the reference type to follow.
    pub fn with_reference_type(mut self, reference_type: NodeId) -> Self {
        self.reference_type_id = Some(reference_type);
        self
    }

    /// Sets whether to include subtypes.
    pub fn with_include_subtypes(mut self, include: bool) -> Self {
        self.include_subtypes = include;
        self
    }

    /// Sets the maximum references per node.
    pub fn with_max_references(mut self, max: u32) -> Self {
        self.max_references_per_node = max;
        self
    }

    /// Creates options for browsing objects and variables.
    pub fn objects_and_variables() -> Self {
        Self::default().with_node_class_filter(vec![NodeClass::Object, NodeClass::Variable])
    }

    /// Returns the node class mask, 0 selecting all classes.
    pub fn node_class_mask(&self) -> u32 {
        NodeClass::mask(&self.node_class_filter)
    }

    /// Reference type sent to the server.
    pub fn reference_type(&self) -> NodeId {
        self.reference_type_id
            .clone()
            .unwrap_or_else(|| NodeId::numeric(0, ids::HIERARCHICAL_REFERENCES))
    }

    fn describe(&self, node_id: &NodeId) -> BrowseDescription {
        BrowseDescription {
            node_id: node_id.clone(),
            browse_direction: self.direction,
            reference_type_id: self.reference_type(),
            include_subtypes: self.include_subtypes,
            node_class_mask: self.node_class_mask(),
            result_mask: BROWSE_RESULT_MASK_ALL,
        }
    }
}

// =============================================================================
// BrowsePage
// =============================================================================

/// One page of browse results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BrowsePage {
    /// References on this page.
    pub references: Vec<ReferenceDescription>,

    /// Continuation point for the next page, if any.
    pub continuation_point: Option<ByteString>,
}

impl BrowsePage {
    fn from_result(node_id: &NodeId, result: BrowseResult) -> OpcUaResult<Self> {
        if result.status_code.is_bad() {
            return Err(OperationError::browse_failed(node_id, result.status_code).into());
        }
        let continuation_point =
            (!result.continuation_point.is_empty()).then_some(result.continuation_point);
        Ok(Self {
            references: result.references,
            continuation_point,
        })
    }

    /// Returns `true` if more references are available.
    pub fn has_more(&self) -> bool {
        self.continuation_point.is_some()
    }
}

// =============================================================================
// ServerInfo
// =============================================================================

/// Server status and identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerInfo {
    /// Server start time.
    pub start_time: Option<DateTime<Utc>>,

    /// Current server time.
    pub current_time: Option<DateTime<Utc>>,

    /// Server state.
    pub state: ServerState,

    /// Build information.
    pub build_info: BuildInfo,

    /// Seconds until a scheduled shutdown, 0 if none.
    pub seconds_till_shutdown: u32,

    /// Server URIs from `Server_ServerArray`.
    pub server_array: Vec<String>,
}

impl ServerInfo {
    fn from_status(status: ServerStatusDataType, server_array: Vec<String>) -> Self {
        Self {
            start_time: status.start_time,
            current_time: status.current_time,
            state: status.server_state(),
            build_info: status.build_info,
            seconds_till_shutdown: status.seconds_till_shutdown,
            server_array,
        }
    }

    /// Product name and version, for display.
    pub fn product(&self) -> String {
        let name = self.build_info.product_name.as_deref().unwrap_or("unknown");
        match self.build_info.software_version.as_deref() {
            Some(version) => format!("{name} {version}"),
            None => name.to_string(),
        }
    }
}

// =============================================================================
// NodeService
// =============================================================================

/// Read, write and browse operations.
#[derive(Debug, Clone)]
pub struct NodeService {
    dispatcher: Arc<RequestDispatcher>,
}

impl NodeService {
    /// Creates a node service over a dispatcher.
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self { dispatcher }
    }

    fn ready(&self) -> OpcUaResult<()> {
        if !self.dispatcher.state().is_connected() {
            return Err(OpcUaError::not_connected());
        }
        self.dispatcher.session().ensure_active()
    }

    // =========================================================================
    // Read
    // =========================================================================

    /// Reads the Value attribute of a node.
    pub async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<ReadResult> {
        self.read_attribute(node_id, AttributeId::Value).await
    }

    /// Reads one attribute of a node.
    pub async fn read_attribute(
        &self,
        node_id: &NodeId,
        attribute: AttributeId,
    ) -> OpcUaResult<ReadResult> {
        let mut results = self.read(&[(node_id.clone(), attribute)]).await?;
        results
            .pop()
            .ok_or_else(|| OpcUaError::decoding("empty read response"))
    }

    /// Reads the Value attribute of several nodes in one request.
    pub async fn read_values(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<ReadResult>> {
        let items: Vec<_> = node_ids
            .iter()
            .map(|node| (node.clone(), AttributeId::Value))
            .collect();
        self.read(&items).await
    }

    /// Reads arbitrary node attributes in one request.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn read(&self, items: &[(NodeId, AttributeId)]) -> OpcUaResult<Vec<ReadResult>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.ready()?;

        let request = ReadRequest {
            max_age: 0.0,
            timestamps_to_return: TimestampsToReturn::Both,
            nodes_to_read: items
                .iter()
                .map(|(node, attribute)| ReadValueId::new(node.clone(), attribute.value()))
                .collect(),
            ..Default::default()
        };
        let response = self.dispatcher.call(request).await?;
        check_result_count("Read", items.len(), response.results.len())?;

        let results: Vec<_> = items
            .iter()
            .zip(response.results)
            .map(|((node, attribute), data)| {
                ReadResult::from_data_value(node.clone(), *attribute, data)
            })
            .collect();
        for result in results.iter().filter(|r| !r.is_good()) {
            debug!(node_id = %result.node_id, status = %result.status, "Read returned non-good status");
        }
        trace!(count = results.len(), "Read complete");
        Ok(results)
    }

    // =========================================================================
    // Write
    // =========================================================================

    /// Writes the Value attribute of a node.
    pub async fn write_value(
        &self,
        node_id: &NodeId,
        value: OpcUaValue,
    ) -> OpcUaResult<WriteResult> {
        let mut results = self.write_values(&[(node_id.clone(), value)]).await?;
        results
            .pop()
            .ok_or_else(|| OpcUaError::decoding("empty write response"))
    }

    /// Writes the Value attribute of several nodes in one request.
    #[instrument(skip(self, items), fields(count = items.len()))]
    pub async fn write_values(
        &self,
        items: &[(NodeId, OpcUaValue)],
    ) -> OpcUaResult<Vec<WriteResult>> {
        if items.is_empty() {
            return Ok(Vec::new());
        }
        self.ready()?;

        let request = WriteRequest {
            nodes_to_write: items
                .iter()
                .map(|(node, value)| WriteValue {
                    node_id: node.clone(),
                    attribute_id: AttributeId::Value.value(),
                    index_range: None,
                    value: DataValue::new(value.clone()),
                })
                .collect(),
            ..Default::default()
        };
        let response = self.dispatcher.call(request).await?;
        check_result_count("Write", items.len(), response.results.len())?;

        let results: Vec<_> = items
            .iter()
            .zip(response.results)
            .map(|((node, _), status)| WriteResult {
                node_id: node.clone(),
                status,
            })
            .collect();
        for result in results.iter().filter(|r| !r.is_good()) {
            warn!(node_id = %result.node_id, status = %result.status, "Write rejected");
        }
        Ok(results)
    }

    /// Parses `text` as the named type and writes it.
    pub async fn write_typed(
        &self,
        node_id: &NodeId,
        text: &str,
        type_name: &str,
    ) -> OpcUaResult<WriteResult> {
        let value = parse_typed(text, type_name)?;
        debug!(node_id = %node_id, %value, type_name, "Writing typed value");
        self.write_value(node_id, value).await
    }

    // =========================================================================
    // Browse
    // =========================================================================

    /// Browses one node and returns the first page of references.
    #[instrument(skip(self, options), fields(node_id = %node_id))]
    pub async fn browse(&self, node_id: &NodeId, options: &BrowseOptions) -> OpcUaResult<BrowsePage> {
        self.ready()?;
        let request = BrowseRequest {
            requested_max_references_per_node: options.max_references_per_node,
            nodes_to_browse: vec![options.describe(node_id)],
            ..Default::default()
        };
        let response = self.dispatcher.call(request).await?;
        check_result_count("Browse", 1, response.results.len())?;
        let page = response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| OpcUaError::decoding("empty browse response"))
            .and_then(|result| BrowsePage::from_result(node_id, result))?;
        trace!(references = page.references.len(), more = page.has_more(), "Browse page");
        Ok(page)
    }

    /// Continues a browse, or releases the continuation point if `release`.
    pub async fn browse_next(
        &self,
        node_id: &NodeId,
        continuation_point: &ByteString,
        release: bool,
    ) -> OpcUaResult<BrowsePage> {
        self.ready()?;
        let request = BrowseNextRequest {
            release_continuation_points: release,
            continuation_points: vec![continuation_point.clone()],
            ..Default::default()
        };
        let response = self.dispatcher.call(request).await?;
        check_result_count("BrowseNext", 1, response.results.len())?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| OpcUaError::decoding("empty browse next response"))
            .and_then(|result| BrowsePage::from_result(node_id, result))
    }

    /// Browses a node, following continuation points until none remain.
    pub async fn browse_all(
        &self,
        node_id: &NodeId,
        options: &BrowseOptions,
    ) -> OpcUaResult<Vec<ReferenceDescription>> {
        let mut page = self.browse(node_id, options).await?;
        let mut references = std::mem::take(&mut page.references);
        let mut pages = 1usize;

        while let Some(point) = page.continuation_point.take() {
            page = match self.browse_next(node_id, &point, false).await {
                Ok(page) => page,
                Err(e) => {
                    // Free the server side point before giving up.
                    if let Err(release) = self.browse_next(node_id, &point, true).await {
                        trace!(error = %release, "Continuation point release failed");
                    }
                    return Err(e);
                }
            };
            references.append(&mut page.references);
            pages += 1;
        }

        debug!(node_id = %node_id, references = references.len(), pages, "Browse complete");
        Ok(references)
    }

    // =========================================================================
    // Server information
    // =========================================================================

    /// Reads `Server_ServerStatus` and `Server_ServerArray`.
    #[instrument(skip(self))]
    pub async fn server_info(&self) -> OpcUaResult<ServerInfo> {
        let status_node = NodeId::numeric(0, ids::SERVER_SERVER_STATUS);
        let array_node = NodeId::numeric(0, ids::SERVER_SERVER_ARRAY);
        let mut results = self
            .read_values(&[status_node, array_node])
            .await?
            .into_iter();

        let (Some(status), Some(servers)) = (results.next(), results.next()) else {
            return Err(OpcUaError::decoding("incomplete server status read"));
        };

        let status_value = status.into_value()?;
        let object = status_value.as_extension_object().ok_or_else(|| {
            OpcUaError::decoding(format!(
                "ServerStatus is {}, not a structure",
                status_value.data_type()
            ))
        })?;
        let status = ServerStatusDataType::from_extension_object(object, self.dispatcher.decode_limits())?;

        let server_array = match servers.into_value() {
            Ok(OpcUaValue::Array(items)) => items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .collect(),
            Ok(OpcUaValue::String(uri)) => vec![uri],
            Ok(_) => Vec::new(),
            Err(e) => {
                debug!(error = %e, "Server array not readable");
                Vec::new()
            }
        };

        Ok(ServerInfo::from_status(status, server_array))
    }
}

// =============================================================================
// Tests
// =============================================================================
