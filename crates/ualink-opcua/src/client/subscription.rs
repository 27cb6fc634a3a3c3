// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! OPC UA subscription manager.
//!
//! Subscriptions are identified locally by a [`SubscriptionId`] that stays
//! the same when a subscription is recreated on a new session; the server
//! assigned id is tracked alongside it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    SubscriptionManager                          │
//! │        (subscriptions, monitored items, one publish loop)       │
//! └─────────────────────────────────────────────────────────────────┘
//!          │                   │                        │
//!          ▼                   ▼                        ▼
//! ┌─────────────────┐ ┌─────────────────┐   ┌──────────────────────┐
//! │  Subscription   │ │  Subscription   │   │     Publish loop     │
//! │  items by       │ │  items by       │   │  one request in      │
//! │  client handle  │ │  client handle  │   │  flight, acks, keep  │
//! └─────────────────┘ └─────────────────┘   │  alives, dispatch    │
//!                                           └──────────────────────┘
//!                                                      │
//!                                  NotificationFilter ─┤
//!                                                      ▼
//!                                           SubscriptionCallback
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let manager = Arc::new(SubscriptionManager::new(dispatcher));
//! let (callback, mut receiver) = ChannelCallback::with_channel(100);
//!
//! let id = manager
//!     .create_subscription(&SubscriptionSettings::default(), Arc::new(callback))
//!     .await?;
//! manager
//!     .monitor(id, &NodeId::string(3, "Demo.Dynamic.Scalar.UInt32"), &MonitoredItemSettings::default())
//!     .await?;
//!
//! while let Some(change) = receiver.recv().await {
//!     println!("{} = {}", change.node_id, change.value);
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, trace, warn};

use super::conversion::TypedValue;
use super::dispatcher::RequestDispatcher;
use super::filter::NotificationFilter;
use crate::error::{OpcUaError, OpcUaResult, SubscriptionError};
use crate::messages::{
    CreateMonitoredItemsRequest, CreateSubscriptionRequest, DataChangeNotification,
    DeleteSubscriptionsRequest, MonitoredItemCreateRequest, MonitoringParameters,
    NotificationMessage, Notification, PublishRequest, PublishResponse, ReadValueId,
    SubscriptionAcknowledgement, check_result_count,
};
use crate::status::StatusCode;
use crate::types::{
    AttributeId, MonitoredItemSettings, MonitoringMode, NodeId, SubscriptionSettings,
    TimestampsToReturn,
};

/// Pause after a failed publish before the next attempt.
const PUBLISH_RETRY_DELAY: Duration = Duration::from_secs(1);

// =============================================================================
// Ids and state
// =============================================================================

/// Local subscription id, stable across recreation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(pub u32);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Subscription state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Created on the server and publishing.
    #[default]
    Active,

    /// Connection lost; waiting for the session to come back.
    Suspended,

    /// The server reported the subscription as gone.
    Expired,
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "Active"),
            Self::Suspended => write!(f, "Suspended"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

// =============================================================================
// DataChange
// =============================================================================

/// A reported value change of a monitored node.
#[derive(Debug, Clone, PartialEq)]
pub struct DataChange {
    /// Subscription the item belongs to.
    pub subscription_id: SubscriptionId,

    /// Client handle of the monitored item.
    pub client_handle: u32,

    /// Monitored node.
    pub node_id: NodeId,

    /// New value with quality and timestamps.
    pub value: TypedValue,

    /// Sequence number of the notification message.
    pub sequence_number: u32,
}

// =============================================================================
// Subscription Callback
// =============================================================================

/// Receiver of subscription notifications.
#[async_trait]
pub trait SubscriptionCallback: Send + Sync {
    /// Called for every data change that passes the filter.
    async fn on_data_change(&self, change: DataChange);

    /// Called when the server reports a subscription status change.
    async fn on_status_change(&self, _subscription_id: SubscriptionId, _status: StatusCode) {}

    /// Called when a keep-alive arrives.
    async fn on_keep_alive(&self, _subscription_id: SubscriptionId) {}
}

/// Forwards data changes into an mpsc channel.
pub struct ChannelCallback {
    sender: mpsc::Sender<DataChange>,
}

impl ChannelCallback {
    /// Creates a callback over an existing sender.
    pub fn new(sender: mpsc::Sender<DataChange>) -> Self {
        Self { sender }
    }

    /// Creates a callback and the matching receiver.
    pub fn with_channel(capacity: usize) -> (Self, mpsc::Receiver<DataChange>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl SubscriptionCallback for ChannelCallback {
    async fn on_data_change(&self, change: DataChange) {
        if self.sender.send(change).await.is_err() {
            trace!("Data change receiver dropped");
        }
    }
}

// =============================================================================
// MonitoredItem / Subscription
// =============================================================================

/// A monitored Value attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoredItem {
    /// Client handle used in notifications.
    pub client_handle: u32,

    /// Server assigned id.
    pub monitored_item_id: u32,

    /// Monitored node.
    pub node_id: NodeId,

    /// Requested settings.
    pub settings: MonitoredItemSettings,

    /// Sampling interval chosen by the server.
    pub revised_sampling_interval: Duration,

    /// Queue size chosen by the server.
    pub revised_queue_size: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct RevisedParameters {
    publishing_interval: Duration,
    lifetime_count: u32,
    max_keepalive_count: u32,
}

struct Subscription {
    id: SubscriptionId,
    server_id: AtomicU32,
    settings: SubscriptionSettings,
    revised: Mutex<RevisedParameters>,
    state: RwLock<SubscriptionState>,
    items: RwLock<HashMap<u32, MonitoredItem>>,
    callback: Arc<dyn SubscriptionCallback>,
    last_sequence: AtomicU32,
}

impl Subscription {
    fn server_id(&self) -> u32 {
        self.server_id.load(Ordering::Acquire)
    }

    fn apply(&self, server_id: u32, revised: RevisedParameters) {
        self.server_id.store(server_id, Ordering::Release);
        *self.revised.lock() = revised;
        self.last_sequence.store(0, Ordering::Relaxed);
        *self.state.write() = SubscriptionState::Active;
    }

    fn publish_timeout(&self) -> Duration {
        let revised = *self.revised.lock();
        revised
            .publishing_interval
            .saturating_mul(revised.max_keepalive_count.max(1))
    }

    fn info(&self) -> SubscriptionInfo {
        let revised = *self.revised.lock();
        SubscriptionInfo {
            id: self.id,
            server_id: self.server_id(),
            state: *self.state.read(),
            publishing_interval: revised.publishing_interval,
            lifetime_count: revised.lifetime_count,
            max_keepalive_count: revised.max_keepalive_count,
            monitored_items: self.items.read().values().cloned().collect(),
        }
    }
}

/// Snapshot of a subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    /// Local id.
    pub id: SubscriptionId,
    /// Current server id.
    pub server_id: u32,
    /// State.
    pub state: SubscriptionState,
    /// Revised publishing interval.
    pub publishing_interval: Duration,
    /// Revised lifetime count.
    pub lifetime_count: u32,
    /// Revised keep-alive count.
    pub max_keepalive_count: u32,
    /// Monitored items.
    pub monitored_items: Vec<MonitoredItem>,
}

// =============================================================================
// Statistics
// =============================================================================

/// Publish and notification counters.
#[derive(Debug, Default)]
pub struct SubscriptionStats {
    publishes: AtomicU64,
    keep_alives: AtomicU64,
    notifications: AtomicU64,
    suppressed: AtomicU64,
    publish_errors: AtomicU64,
}

impl SubscriptionStats {
    /// Publish responses received.
    pub fn publishes(&self) -> u64 {
        self.publishes.load(Ordering::Relaxed)
    }

    /// Keep-alive messages received.
    pub fn keep_alives(&self) -> u64 {
        self.keep_alives.load(Ordering::Relaxed)
    }

    /// Data changes delivered to callbacks.
    pub fn notifications(&self) -> u64 {
        self.notifications.load(Ordering::Relaxed)
    }

    /// Data changes dropped by the filter.
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// Failed publish requests.
    pub fn publish_errors(&self) -> u64 {
        self.publish_errors.load(Ordering::Relaxed)
    }
}

// =============================================================================
// Subscription Manager
// =============================================================================

/// Manages subscriptions, monitored items and the publish loop.
pub struct SubscriptionManager {
    dispatcher: Arc<RequestDispatcher>,
    filter: Option<Arc<NotificationFilter>>,
    subscriptions: DashMap<SubscriptionId, Arc<Subscription>>,
    acknowledgements: Mutex<Vec<SubscriptionAcknowledgement>>,
    next_local_id: AtomicU32,
    next_client_handle: AtomicU32,
    publishing: AtomicBool,
    publish_task: Mutex<Option<JoinHandle<()>>>,
    stats: SubscriptionStats,
}

impl SubscriptionManager {
    /// Creates a manager without a notification filter.
    pub fn new(dispatcher: Arc<RequestDispatcher>) -> Self {
        Self {
            dispatcher,
            filter: None,
            subscriptions: DashMap::new(),
            acknowledgements: Mutex::new(Vec::new()),
            next_local_id: AtomicU32::new(1),
            next_client_handle: AtomicU32::new(1),
            publishing: AtomicBool::new(false),
            publish_task: Mutex::new(None),
            stats: SubscriptionStats::default(),
        }
    }

    /// Routes data changes through `filter` before the callbacks.
    pub fn with_filter(mut self, filter: Arc<NotificationFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Returns the notification filter.
    pub fn filter(&self) -> Option<&Arc<NotificationFilter>> {
        self.filter.as_ref()
    }

    /// Returns the counters.
    pub fn stats(&self) -> &SubscriptionStats {
        &self.stats
    }

    /// Number of subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Snapshots of all subscriptions.
    pub fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        let mut infos: Vec<_> = self.subscriptions.iter().map(|s| s.info()).collect();
        infos.sort_by_key(|info| info.id);
        infos
    }

    /// Snapshot of one subscription.
    pub fn subscription(&self, id: SubscriptionId) -> OpcUaResult<SubscriptionInfo> {
        Ok(self.get(id)?.info())
    }

    /// Returns `true` while the publish loop runs.
    pub fn is_publishing(&self) -> bool {
        self.publishing.load(Ordering::Acquire)
    }

    fn get(&self, id: SubscriptionId) -> OpcUaResult<Arc<Subscription>> {
        self.subscriptions
            .get(&id)
            .map(|s| Arc::clone(&s))
            .ok_or_else(|| SubscriptionError::not_found(id.0).into())
    }

    fn find_by_server_id(&self, server_id: u32) -> Option<Arc<Subscription>> {
        self.subscriptions
            .iter()
            .find(|s| s.server_id() == server_id)
            .map(|s| Arc::clone(&s))
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Creates a subscription and starts publishing.
    #[instrument(skip(self, settings, callback), fields(interval = ?settings.publishing_interval))]
    pub async fn create_subscription(
        self: &Arc<Self>,
        settings: &SubscriptionSettings,
        callback: Arc<dyn SubscriptionCallback>,
    ) -> OpcUaResult<SubscriptionId> {
        let (server_id, revised) = self.create_on_server(settings).await?;
        let id = SubscriptionId(self.next_local_id.fetch_add(1, Ordering::Relaxed));

        let subscription = Arc::new(Subscription {
            id,
            server_id: AtomicU32::new(0),
            settings: settings.clone(),
            revised: Mutex::new(RevisedParameters::default()),
            state: RwLock::new(SubscriptionState::Active),
            items: RwLock::new(HashMap::new()),
            callback,
            last_sequence: AtomicU32::new(0),
        });
        subscription.apply(server_id, revised);
        self.subscriptions.insert(id, subscription);

        info!(
            subscription = %id,
            server_id,
            publishing_interval = ?revised.publishing_interval,
            keepalive_count = revised.max_keepalive_count,
            "Subscription created"
        );
        self.ensure_publishing();
        Ok(id)
    }

    async fn create_on_server(
        &self,
        settings: &SubscriptionSettings,
    ) -> OpcUaResult<(u32, RevisedParameters)> {
        let request = CreateSubscriptionRequest {
            requested_publishing_interval: settings.publishing_interval.as_secs_f64() * 1000.0,
            requested_lifetime_count: settings.lifetime_count,
            requested_max_keep_alive_count: settings.max_keepalive_count,
            max_notifications_per_publish: settings.max_notifications_per_publish,
            publishing_enabled: true,
            priority: settings.priority,
            ..Default::default()
        };
        let response = self.dispatcher.call(request).await?;
        let revised = RevisedParameters {
            publishing_interval: millis(response.revised_publishing_interval),
            lifetime_count: response.revised_lifetime_count,
            max_keepalive_count: response.revised_max_keep_alive_count,
        };
        Ok((response.subscription_id, revised))
    }

    /// Deletes a subscription. Local state is dropped even if the server call fails.
    #[instrument(skip(self), fields(subscription = %id))]
    pub async fn delete_subscription(&self, id: SubscriptionId) -> OpcUaResult<()> {
        let (_, subscription) = self
            .subscriptions
            .remove(&id)
            .ok_or_else(|| OpcUaError::from(SubscriptionError::not_found(id.0)))?;
        let server_id = subscription.server_id();
        self.acknowledgements
            .lock()
            .retain(|ack| ack.subscription_id != server_id);
        if let Some(filter) = &self.filter {
            for item in subscription.items.read().values() {
                filter.reset(&item.node_id);
            }
        }

        if !self.dispatcher.state().is_connected() {
            debug!("Not connected; subscription dropped locally");
            return Ok(());
        }
        let request = DeleteSubscriptionsRequest {
            subscription_ids: vec![server_id],
            ..Default::default()
        };
        let response = self.dispatcher.call(request).await?;
        check_result_count("DeleteSubscriptions", 1, response.results.len())?;
        if let Some(status) = response.results.first().filter(|s| s.is_bad()) {
            debug!(%status, "Server did not delete subscription");
        }
        info!("Subscription deleted");
        Ok(())
    }

    // =========================================================================
    // Monitored items
    // =========================================================================

    /// Monitors the Value attribute of a node.
    #[instrument(skip(self, settings), fields(subscription = %id, node_id = %node_id))]
    pub async fn monitor(
        &self,
        id: SubscriptionId,
        node_id: &NodeId,
        settings: &MonitoredItemSettings,
    ) -> OpcUaResult<MonitoredItem> {
        let subscription = self.get(id)?;
        let item = MonitoredItem {
            client_handle: self.next_client_handle.fetch_add(1, Ordering::Relaxed),
            monitored_item_id: 0,
            node_id: node_id.clone(),
            settings: settings.clone(),
            revised_sampling_interval: settings.sampling_interval,
            revised_queue_size: settings.queue_size,
        };

        // Registered before the request so notifications that race the
        // response are routed by client handle.
        let client_handle = item.client_handle;
        subscription
            .items
            .write()
            .insert(client_handle, item.clone());

        let created = self
            .create_items(subscription.server_id(), std::slice::from_ref(&item))
            .await
            .and_then(|mut created| {
                created
                    .pop()
                    .ok_or_else(|| OpcUaError::decoding("empty monitored item response"))?
            });
        let item = match created {
            Ok(item) => item,
            Err(e) => {
                subscription.items.write().remove(&client_handle);
                return Err(e);
            }
        };

        debug!(
            client_handle = item.client_handle,
            monitored_item_id = item.monitored_item_id,
            sampling = ?item.revised_sampling_interval,
            "Monitoring node"
        );
        subscription
            .items
            .write()
            .insert(client_handle, item.clone());
        Ok(item)
    }

    async fn create_items(
        &self,
        server_id: u32,
        items: &[MonitoredItem],
    ) -> OpcUaResult<Vec<OpcUaResult<MonitoredItem>>> {
        let request = CreateMonitoredItemsRequest {
            subscription_id: server_id,
            timestamps_to_return: TimestampsToReturn::Both,
            items_to_create: items
                .iter()
                .map(|item| MonitoredItemCreateRequest {
                    item_to_monitor: ReadValueId::new(
                        item.node_id.clone(),
                        AttributeId::Value.value(),
                    ),
                    monitoring_mode: MonitoringMode::Reporting,
                    requested_parameters: MonitoringParameters {
                        client_handle: item.client_handle,
                        sampling_interval: item.settings.sampling_interval.as_secs_f64() * 1000.0,
                        queue_size: item.settings.queue_size,
                        discard_oldest: item.settings.discard_oldest,
                        ..Default::default()
                    },
                })
                .collect(),
            ..Default::default()
        };
        let response = self.dispatcher.call(request).await?;
        check_result_count("CreateMonitoredItems", items.len(), response.results.len())?;

        Ok(items
            .iter()
            .zip(response.results)
            .map(|(item, result)| {
                if result.status_code.is_bad() {
                    warn!(node_id = %item.node_id, status = %result.status_code, "Monitored item rejected");
                    return Err(SubscriptionError::monitored_item_failed(
                        &item.node_id,
                        result.status_code,
                    )
                    .into());
                }
                Ok(MonitoredItem {
                    monitored_item_id: result.monitored_item_id,
                    revised_sampling_interval: millis(result.revised_sampling_interval),
                    revised_queue_size: result.revised_queue_size,
                    ..item.clone()
                })
            })
            .collect())
    }

    // =========================================================================
    // Session changes
    // =========================================================================

    /// Marks every subscription suspended and drops pending acknowledgements.
    pub fn suspend_all(&self) {
        for subscription in self.subscriptions.iter() {
            *subscription.state.write() = SubscriptionState::Suspended;
        }
        self.acknowledgements.lock().clear();
    }

    /// Resumes publishing after the session was re-activated.
    pub fn resume(self: &Arc<Self>) {
        for subscription in self.subscriptions.iter() {
            let mut state = subscription.state.write();
            if *state == SubscriptionState::Suspended {
                *state = SubscriptionState::Active;
            }
        }
        self.ensure_publishing();
    }

    /// Recreates every subscription and its items on a new session.
    ///
    /// Local ids and client handles are kept. Returns how many
    /// subscriptions were recreated.
    #[instrument(skip(self))]
    pub async fn recreate_all(self: &Arc<Self>) -> OpcUaResult<usize> {
        self.acknowledgements.lock().clear();
        let subscriptions: Vec<_> = self.subscriptions.iter().map(|s| Arc::clone(&s)).collect();
        let mut recreated = 0;

        for subscription in subscriptions {
            let (server_id, revised) = self.create_on_server(&subscription.settings).await?;
            subscription.apply(server_id, revised);

            let items: Vec<_> = subscription.items.read().values().cloned().collect();
            if !items.is_empty() {
                let results = self.create_items(server_id, &items).await?;
                let mut table = subscription.items.write();
                for (item, result) in items.iter().zip(results) {
                    match result {
                        Ok(item) => {
                            table.insert(item.client_handle, item);
                        }
                        Err(e) => {
                            warn!(node_id = %item.node_id, error = %e, "Monitored item not recreated");
                            table.remove(&item.client_handle);
                        }
                    }
                }
            }

            info!(subscription = %subscription.id, server_id, "Subscription recreated");
            recreated += 1;
        }

        self.ensure_publishing();
        Ok(recreated)
    }

    /// Stops the publish loop and forgets every subscription.
    pub fn clear(&self) {
        if let Some(task) = self.publish_task.lock().take() {
            task.abort();
        }
        self.publishing.store(false, Ordering::Release);
        self.subscriptions.clear();
        self.acknowledgements.lock().clear();
        if let Some(filter) = &self.filter {
            filter.clear();
        }
    }

    // =========================================================================
    // Publish loop
    // =========================================================================

    fn ensure_publishing(self: &Arc<Self>) {
        if self.subscriptions.is_empty() {
            return;
        }
        if self
            .publishing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        let manager = Arc::clone(self);
        let task = tokio::spawn(async move { manager.publish_loop().await });
        *self.publish_task.lock() = Some(task);
    }

    fn publish_timeout(&self) -> Duration {
        let longest = self
            .subscriptions
            .iter()
            .map(|s| s.publish_timeout())
            .max()
            .unwrap_or_default();
        longest + self.dispatcher.config().request_timeout
    }

    async fn publish_loop(&self) {
        debug!("Publish loop started");
        loop {
            if self.subscriptions.is_empty() {
                self.publishing.store(false, Ordering::Release);
                // A subscription created meanwhile may have seen the flag still set.
                if self.subscriptions.is_empty()
                    || self
                        .publishing
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_err()
                {
                    debug!("No subscriptions left");
                    break;
                }
                continue;
            }
            let acknowledgements = std::mem::take(&mut *self.acknowledgements.lock());
            let request = PublishRequest {
                subscription_acknowledgements: acknowledgements,
                ..Default::default()
            };

            match self
                .dispatcher
                .call_with_timeout(request, self.publish_timeout())
                .await
            {
                Ok(response) => self.handle_publish(response).await,
                Err(e) if e.is_connection_loss() || e.is_session_invalid() => {
                    debug!(error = %e, "Publish loop stopped");
                    self.suspend_all();
                    self.publishing.store(false, Ordering::Release);
                    break;
                }
                Err(OpcUaError::Timeout(_)) => {
                    self.stats.publish_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("Publish timed out");
                }
                Err(e) => {
                    self.stats.publish_errors.fetch_add(1, Ordering::Relaxed);
                    if e.status_code() == Some(StatusCode::BAD_NO_SUBSCRIPTION) {
                        debug!("Server has no subscriptions");
                    } else {
                        e.log("Publish failed");
                    }
                    tokio::time::sleep(PUBLISH_RETRY_DELAY).await;
                }
            }
        }
        debug!("Publish loop finished");
    }

    async fn handle_publish(&self, response: PublishResponse) {
        self.stats.publishes.fetch_add(1, Ordering::Relaxed);
        for (index, status) in response.results.iter().enumerate() {
            if status.is_bad() {
                debug!(index, %status, "Acknowledgement rejected");
            }
        }

        let Some(subscription) = self.find_by_server_id(response.subscription_id) else {
            debug!(server_id = response.subscription_id, "Publish for unknown subscription");
            return;
        };
        self.process_message(&subscription, response.notification_message)
            .await;
        if response.more_notifications {
            trace!(subscription = %subscription.id, "More notifications queued");
        }
    }

    async fn process_message(&self, subscription: &Subscription, message: NotificationMessage) {
        if message.notification_data.is_empty() {
            self.stats.keep_alives.fetch_add(1, Ordering::Relaxed);
            trace!(subscription = %subscription.id, "Keep-alive");
            subscription.callback.on_keep_alive(subscription.id).await;
            return;
        }

        let sequence = message.sequence_number;
        self.acknowledgements
            .lock()
            .push(SubscriptionAcknowledgement {
                subscription_id: subscription.server_id(),
                sequence_number: sequence,
            });
        let previous = subscription.last_sequence.swap(sequence, Ordering::Relaxed);
        if previous != 0 && sequence != previous.wrapping_add(1) {
            debug!(
                subscription = %subscription.id,
                previous,
                sequence,
                "Notification sequence gap"
            );
        }

        let limits = self.dispatcher.decode_limits();
        for object in &message.notification_data {
            match Notification::decode(object, limits) {
                Ok(Notification::DataChange(data)) => {
                    self.dispatch_data_change(subscription, sequence, data)
                        .await
                }
                Ok(Notification::StatusChange(change)) => {
                    warn!(subscription = %subscription.id, status = %change.status, "Subscription status changed");
                    if change.status == StatusCode::BAD_TIMEOUT {
                        *subscription.state.write() = SubscriptionState::Expired;
                    }
                    subscription
                        .callback
                        .on_status_change(subscription.id, change.status)
                        .await;
                }
                Ok(Notification::Events) => trace!("Event notification ignored"),
                Ok(Notification::Unknown(type_id)) => {
                    debug!(%type_id, "Unknown notification type")
                }
                Err(e) => warn!(error = %e, "Notification not decodable"),
            }
        }
    }

    async fn dispatch_data_change(
        &self,
        subscription: &Subscription,
        sequence_number: u32,
        data: DataChangeNotification,
    ) {
        for notification in data.monitored_items {
            let node_id = match subscription.items.read().get(&notification.client_handle) {
                Some(item) => item.node_id.clone(),
                None => {
                    debug!(client_handle = notification.client_handle, "Unknown client handle");
                    continue;
                }
            };

            if let Some(filter) = &self.filter {
                if !filter.should_deliver(&node_id, &notification.value.value) {
                    self.stats.suppressed.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            }

            self.stats.notifications.fetch_add(1, Ordering::Relaxed);
            subscription
                .callback
                .on_data_change(DataChange {
                    subscription_id: subscription.id,
                    client_handle: notification.client_handle,
                    node_id,
                    value: TypedValue::from(notification.value),
                    sequence_number,
                })
                .await;
        }
    }
}

impl fmt::Debug for SubscriptionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionManager")
            .field("subscriptions", &self.subscriptions.len())
            .field("publishing", &self.is_publishing())
            .field("filtered", &self.filter.is_some())
            .finish()
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        if let Some(task) = self.publish_task.get_mut().take() {
            task.abort();
        }
    }
}

fn millis(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value / 1000.0)
    } else {
        Duration::ZERO
    }
}

// =============================================================================
// Tests
// =============================================================================
