// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Subscription, monitored item and publish messages.

use bytes::BytesMut;
use chrono::{DateTime, Utc};

use super::{ReadValueId, RequestHeader, ResponseHeader, impl_service};
use crate::binary_struct;
use crate::codec::{BinaryDecode, BinaryEncode, BinaryReader, DecodeLimits};
use crate::error::{CodecResult, ProtocolError};
use crate::status::StatusCode;
use crate::types::{MonitoringMode, NodeId, TimestampsToReturn};
use crate::value::{DataValue, DiagnosticInfo, ExtensionObject};

/// Encoding id of `DataChangeNotification`.
pub const DATA_CHANGE_NOTIFICATION_ID: u32 = 811;

/// Encoding id of `StatusChangeNotification`.
pub const STATUS_CHANGE_NOTIFICATION_ID: u32 = 820;

/// Encoding id of `EventNotificationList`.
pub const EVENT_NOTIFICATION_LIST_ID: u32 = 916;

// =============================================================================
// CreateSubscription / DeleteSubscriptions
// =============================================================================

binary_struct! {
    /// CreateSubscription request.
    pub struct CreateSubscriptionRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Publishing interval in milliseconds.
        pub requested_publishing_interval: f64,
        /// Lifetime count.
        pub requested_lifetime_count: u32,
        /// Keep-alive count.
        pub requested_max_keep_alive_count: u32,
        /// Notifications per publish, 0 for no limit.
        pub max_notifications_per_publish: u32,
        /// Start publishing immediately.
        pub publishing_enabled: bool,
        /// Priority.
        pub priority: u8,
    }
}

binary_struct! {
    /// CreateSubscription response.
    pub struct CreateSubscriptionResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// Subscription id.
        pub subscription_id: u32,
        /// Revised publishing interval in milliseconds.
        pub revised_publishing_interval: f64,
        /// Revised lifetime count.
        pub revised_lifetime_count: u32,
        /// Revised keep-alive count.
        pub revised_max_keep_alive_count: u32,
    }
}

binary_struct! {
    /// DeleteSubscriptions request.
    pub struct DeleteSubscriptionsRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Subscriptions to delete.
        pub subscription_ids: Vec<u32>,
    }
}

binary_struct! {
    /// DeleteSubscriptions response.
    pub struct DeleteSubscriptionsResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// One status per subscription.
        pub results: Vec<StatusCode>,
        /// Diagnostics.
        pub diagnostic_infos: Vec<DiagnosticInfo>,
    }
}

// =============================================================================
// CreateMonitoredItems
// =============================================================================

binary_struct! {
    /// Sampling and queueing parameters.
    pub struct MonitoringParameters {
        /// Handle reported in notifications.
        pub client_handle: u32,
        /// Sampling interval in milliseconds.
        pub sampling_interval: f64,
        /// Filter, null for the default data change filter.
        pub filter: ExtensionObject,
        /// Queue size.
        pub queue_size: u32,
        /// Discard the oldest value on overflow.
        pub discard_oldest: bool,
    }
}

binary_struct! {
    /// One monitored item to create.
    pub struct MonitoredItemCreateRequest {
        /// Attribute to monitor.
        pub item_to_monitor: ReadValueId,
        /// Monitoring mode.
        pub monitoring_mode: MonitoringMode,
        /// Parameters.
        pub requested_parameters: MonitoringParameters,
    }
}

binary_struct! {
    /// Result of creating one monitored item.
    pub struct MonitoredItemCreateResult {
        /// Status.
        pub status_code: StatusCode,
        /// Server assigned id.
        pub monitored_item_id: u32,
        /// Revised sampling interval.
        pub revised_sampling_interval: f64,
        /// Revised queue size.
        pub revised_queue_size: u32,
        /// Filter result.
        pub filter_result: ExtensionObject,
    }
}

binary_struct! {
    /// CreateMonitoredItems request.
    pub struct CreateMonitoredItemsRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Subscription.
        pub subscription_id: u32,
        /// Timestamps to return.
        pub timestamps_to_return: TimestampsToReturn,
        /// Items.
        pub items_to_create: Vec<MonitoredItemCreateRequest>,
    }
}

binary_struct! {
    /// CreateMonitoredItems response.
    pub struct CreateMonitoredItemsResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// One result per item.
        pub results: Vec<MonitoredItemCreateResult>,
        /// Diagnostics.
        pub diagnostic_infos: Vec<DiagnosticInfo>,
    }
}

// =============================================================================
// Publish
// =============================================================================

binary_struct! {
    /// Acknowledges a received notification message.
    pub struct SubscriptionAcknowledgement {
        /// Subscription.
        pub subscription_id: u32,
        /// Sequence number of the notification message.
        pub sequence_number: u32,
    }
}

binary_struct! {
    /// Publish request.
    pub struct PublishRequest {
        /// Header.
        pub request_header: RequestHeader,
        /// Acknowledgements.
        pub subscription_acknowledgements: Vec<SubscriptionAcknowledgement>,
    }
}

binary_struct! {
    /// Notifications of one publishing cycle.
    pub struct NotificationMessage {
        /// Sequence number.
        pub sequence_number: u32,
        /// Publish time.
        pub publish_time: Option<DateTime<Utc>>,
        /// Notification data; empty for keep-alives.
        pub notification_data: Vec<ExtensionObject>,
    }
}

binary_struct! {
    /// Publish response.
    pub struct PublishResponse {
        /// Header.
        pub response_header: ResponseHeader,
        /// Subscription the notifications belong to.
        pub subscription_id: u32,
        /// Sequence numbers still available for republish.
        pub available_sequence_numbers: Vec<u32>,
        /// More notifications are queued.
        pub more_notifications: bool,
        /// Notifications.
        pub notification_message: NotificationMessage,
        /// Acknowledgement results.
        pub results: Vec<StatusCode>,
        /// Diagnostics.
        pub diagnostic_infos: Vec<DiagnosticInfo>,
    }
}

impl_service! {
    CreateSubscriptionRequest => CreateSubscriptionResponse, 787, 790, "CreateSubscription";
    DeleteSubscriptionsRequest => DeleteSubscriptionsResponse, 847, 850, "DeleteSubscriptions";
    CreateMonitoredItemsRequest => CreateMonitoredItemsResponse, 751, 754, "CreateMonitoredItems";
    PublishRequest => PublishResponse, 826, 829, "Publish";
}

// =============================================================================
// Notifications
// =============================================================================

binary_struct! {
    /// Value change of one monitored item.
    pub struct MonitoredItemNotification {
        /// Client handle of the item.
        pub client_handle: u32,
        /// New value.
        pub value: DataValue,
    }
}

binary_struct! {
    /// Data changes of a publishing cycle.
    pub struct DataChangeNotification {
        /// Changed items.
        pub monitored_items: Vec<MonitoredItemNotification>,
        /// Diagnostics.
        pub diagnostic_infos: Vec<DiagnosticInfo>,
    }
}

binary_struct! {
    /// Subscription status change.
    pub struct StatusChangeNotification {
        /// New status.
        pub status: StatusCode,
        /// Diagnostics.
        pub diagnostic_info: DiagnosticInfo,
    }
}

/// Decoded notification data entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Data changes.
    DataChange(DataChangeNotification),
    /// Status change.
    StatusChange(StatusChangeNotification),
    /// Events, not decoded.
    Events,
    /// Unknown notification type.
    Unknown(NodeId),
}

impl Notification {
    /// Decodes a notification data entry.
    pub fn decode(object: &ExtensionObject, limits: DecodeLimits) -> CodecResult<Self> {
        let Some(body) = object.binary_body() else {
            return Ok(Self::Unknown(object.type_id.clone()));
        };
        let mut reader = BinaryReader::new(body.to_vec(), limits);
        let id = match (object.type_id.namespace_index, object.type_id.as_numeric()) {
            (0, Some(id)) => id,
            _ => return Ok(Self::Unknown(object.type_id.clone())),
        };
        match id {
            DATA_CHANGE_NOTIFICATION_ID => {
                Ok(Self::DataChange(DataChangeNotification::decode(&mut reader)?))
            }
            STATUS_CHANGE_NOTIFICATION_ID => {
                Ok(Self::StatusChange(StatusChangeNotification::decode(&mut reader)?))
            }
            EVENT_NOTIFICATION_LIST_ID => Ok(Self::Events),
            _ => Ok(Self::Unknown(object.type_id.clone())),
        }
    }
}

impl DataChangeNotification {
    /// Wraps into an extension object.
    pub fn to_extension_object(&self) -> ExtensionObject {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        ExtensionObject::binary(NodeId::numeric(0, DATA_CHANGE_NOTIFICATION_ID), buf.to_vec())
    }
}

impl StatusChangeNotification {
    /// Wraps into an extension object.
    pub fn to_extension_object(&self) -> ExtensionObject {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        ExtensionObject::binary(NodeId::numeric(0, STATUS_CHANGE_NOTIFICATION_ID), buf.to_vec())
    }
}

/// Fails unless `object` has the given binary encoding id.
pub fn expect_body<'a>(object: &'a ExtensionObject, encoding_id: u32) -> CodecResult<&'a [u8]> {
    if !object.type_id.is_ns0(encoding_id) {
        return Err(ProtocolError::decoding(format!(
            "expected extension object i={encoding_id}, found {}",
            object.type_id
        )));
    }
    object
        .binary_body()
        .ok_or_else(|| ProtocolError::decoding("extension object has no binary body"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::OpcUaValue;

    #[test]
    fn test_data_change_notification_decodes() {
        let notification = DataChangeNotification {
            monitored_items: vec![MonitoredItemNotification {
                client_handle: 3,
                value: DataValue::new(OpcUaValue::UInt32(42)),
            }],
            diagnostic_infos: vec![],
        };
        let object = notification.to_extension_object();
        match Notification::decode(&object, DecodeLimits::default()).unwrap() {
            Notification::DataChange(decoded) => assert_eq!(decoded, notification),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_unknown_notification() {
        let object = ExtensionObject::binary(NodeId::numeric(0, 9999), vec![]);
        assert!(matches!(
            Notification::decode(&object, DecodeLimits::default()).unwrap(),
            Notification::Unknown(_)
        ));
        assert!(expect_body(&object, 811).is_err());
    }
}
