// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! High-level OPC UA client.
//!
//! [`OpcUaClient`] composes the dispatcher, session manager, node service
//! and subscription manager, and supervises reconnection with a
//! [`RetryConfig`].

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use super::conversion::{DataConverter, TypedValue, parse_typed};
use super::dispatcher::{DispatcherStats, RequestDispatcher};
use super::filter::NotificationFilter;
use super::node::{BrowseOptions, BrowsePage, NodeService, ReadResult, ServerInfo, WriteResult};
use super::session::{Reactivation, SessionManager, SessionState, SessionStats};
use super::subscription::{
    MonitoredItem, SubscriptionCallback, SubscriptionId, SubscriptionManager, SubscriptionStats,
};
use crate::error::{OpcUaError, OpcUaResult};
use crate::messages::ReferenceDescription;
use crate::transport::{ChannelToken, TransportState};
use crate::types::{
    AttributeId, ByteString, MonitoredItemSettings, NodeId, OpcUaConfig, OpcUaDataType,
    SubscriptionSettings,
};
use crate::value::OpcUaValue;

// =============================================================================
// RetryStrategy
// =============================================================================

/// Strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Fixed delay between retries.
    Fixed,

    /// Linear backoff (delay * attempt).
    Linear,

    /// Exponential backoff (delay * 2^attempt).
    #[default]
    Exponential,
}

impl RetryStrategy {
    /// Calculates the delay for a given attempt, counting from 0.
    pub fn delay(&self, base_delay: Duration, attempt: u32) -> Duration {
        match self {
            Self::Fixed => base_delay,
            Self::Linear => base_delay.saturating_mul(attempt.saturating_add(1)),
            Self::Exponential => base_delay.saturating_mul(2u32.saturating_pow(attempt)),
        }
    }
}

impl fmt::Display for RetryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "Fixed"),
            Self::Linear => write!(f, "Linear"),
            Self::Exponential => write!(f, "Exponential"),
        }
    }
}

// =============================================================================
// RetryConfig
// =============================================================================

/// Connection retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,

    /// Base delay between retries.
    #[serde(with = "crate::types::humantime_serde")]
    pub base_delay: Duration,

    /// Maximum delay between retries.
    #[serde(with = "crate::types::humantime_serde")]
    pub max_delay: Duration,

    /// Retry strategy.
    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            strategy: RetryStrategy::Exponential,
        }
    }
}

impl From<&OpcUaConfig> for RetryConfig {
    fn from(config: &OpcUaConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_delay,
            ..Default::default()
        }
    }
}

impl RetryConfig {
    /// Creates a new retry configuration.
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Sets the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the retry strategy.
    pub fn with_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Disables retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Calculates the delay for a given attempt, capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.strategy
            .delay(self.base_delay, attempt)
            .min(self.max_delay)
    }
}

// =============================================================================
// ClientStats
// =============================================================================

/// Statistics for client operations.
#[derive(Debug, Default)]
pub struct ClientStats {
    reads: AtomicU64,
    writes: AtomicU64,
    browses: AtomicU64,
    errors: AtomicU64,
    retries: AtomicU64,
    connections: AtomicU64,
    reconnections: AtomicU64,
    total_response_time_us: AtomicU64,
}

impl ClientStats {
    /// Creates new statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a completed read request.
    pub fn record_read(&self, duration: Duration) {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.add_time(duration);
    }

    /// Records a completed write request.
    pub fn record_write(&self, duration: Duration) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        self.add_time(duration);
    }

    /// Records a browse operation.
    pub fn record_browse(&self) {
        self.browses.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a failed operation.
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a retried connection attempt.
    pub fn record_retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    /// Records an established connection.
    pub fn record_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a recovered connection.
    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    fn add_time(&self, duration: Duration) {
        let micros = u64::try_from(duration.as_micros()).unwrap_or(u64::MAX);
        self.total_response_time_us
            .fetch_add(micros, Ordering::Relaxed);
    }

    /// Returns the total number of reads.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Returns the total number of writes.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Returns the total number of browses.
    pub fn browses(&self) -> u64 {
        self.browses.load(Ordering::Relaxed)
    }

    /// Returns the total number of errors.
    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Returns the total number of retries.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    /// Returns the number of connections.
    pub fn connections(&self) -> u64 {
        self.connections.load(Ordering::Relaxed)
    }

    /// Returns the number of recovered connections.
    pub fn reconnections(&self) -> u64 {
        self.reconnections.load(Ordering::Relaxed)
    }

    /// Returns the success rate of reads and writes.
    pub fn success_rate(&self) -> f64 {
        let total = self.reads() + self.writes();
        if total == 0 {
            return 1.0;
        }
        let errors = self.errors();
        (total - errors.min(total)) as f64 / total as f64
    }

    /// Returns the average read/write response time.
    pub fn average_response_time(&self) -> Duration {
        let total_ops = self.reads() + self.writes();
        if total_ops == 0 {
            return Duration::ZERO;
        }
        let total_us = self.total_response_time_us.load(Ordering::Relaxed);
        Duration::from_micros(total_us / total_ops)
    }

    /// Resets all statistics.
    pub fn reset(&self) {
        for counter in [
            &self.reads,
            &self.writes,
            &self.browses,
            &self.errors,
            &self.retries,
            &self.connections,
            &self.reconnections,
            &self.total_response_time_us,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

// =============================================================================
// Watch
// =============================================================================

/// Result of [`OpcUaClient::watch`].
#[derive(Debug)]
pub struct Watch {
    /// Subscription carrying the items.
    pub subscription_id: SubscriptionId,

    /// Items that were created.
    pub items: Vec<MonitoredItem>,

    /// Nodes the server refused to monitor.
    pub failures: Vec<(NodeId, OpcUaError)>,
}

// =============================================================================
// OpcUaClient
// =============================================================================

#[derive(Default)]
struct BackgroundTasks {
    keep_alive: Option<JoinHandle<()>>,
    renewal: Option<JoinHandle<()>>,
    supervisor: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    fn abort_all(&mut self) {
        for task in [
            self.keep_alive.take(),
            self.renewal.take(),
            self.supervisor.take(),
        ]
        .into_iter()
        .flatten()
        {
            task.abort();
        }
    }
}

struct ClientInner {
    config: OpcUaConfig,
    retry: RetryConfig,
    session: Arc<SessionManager>,
    dispatcher: Arc<RequestDispatcher>,
    nodes: NodeService,
    subscriptions: Arc<SubscriptionManager>,
    filter: Arc<NotificationFilter>,
    converter: DataConverter,
    stats: ClientStats,
    closing: AtomicBool,
    tasks: Mutex<BackgroundTasks>,
}

/// High-level OPC UA client with session management and reconnection.
///
/// Cloning is cheap; clones share the same connection.
///
/// # Examples
///
/// ```rust,ignore
/// use ualink_opcua::client::OpcUaClient;
/// use ualink_opcua::types::OpcUaConfig;
///
/// let client = OpcUaClient::new(OpcUaConfig::new("opc.tcp://localhost:48010"));
/// client.connect().await?;
///
/// let value = client.read("ns=3;s=Demo.Dynamic.Scalar.UInt32").await?;
/// println!("UInt32: {value}");
///
/// client.write_typed(&"ns=3;s=Demo.Static.Scalar.Boolean".parse()?, "on", "bool").await?;
/// client.disconnect().await;
/// ```
#[derive(Clone)]
pub struct OpcUaClient {
    inner: Arc<ClientInner>,
}

impl OpcUaClient {
    /// Creates a client; retries follow `max_retries` and `retry_delay`.
    pub fn new(config: OpcUaConfig) -> Self {
        let retry = RetryConfig::from(&config);
        Self::with_retry(config, retry)
    }

    /// Creates a client with a custom retry configuration.
    pub fn with_retry(config: OpcUaConfig, retry: RetryConfig) -> Self {
        let session = Arc::new(SessionManager::new(config.clone()));
        let dispatcher = Arc::new(RequestDispatcher::new(config.clone(), Arc::clone(&session)));
        let filter = Arc::new(NotificationFilter::new());
        let subscriptions = Arc::new(
            SubscriptionManager::new(Arc::clone(&dispatcher)).with_filter(Arc::clone(&filter)),
        );

        Self {
            inner: Arc::new(ClientInner {
                nodes: NodeService::new(Arc::clone(&dispatcher)),
                config,
                retry,
                session,
                dispatcher,
                subscriptions,
                filter,
                converter: DataConverter::new(),
                stats: ClientStats::new(),
                closing: AtomicBool::new(false),
                tasks: Mutex::new(BackgroundTasks::default()),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OpcUaConfig {
        &self.inner.config
    }

    /// Returns the retry configuration.
    pub fn retry_config(&self) -> &RetryConfig {
        &self.inner.retry
    }

    /// Returns the client statistics.
    pub fn stats(&self) -> &ClientStats {
        &self.inner.stats
    }

    /// Returns the request counters.
    pub fn dispatcher_stats(&self) -> &DispatcherStats {
        self.inner.dispatcher.stats()
    }

    /// Returns the session counters.
    pub fn session_stats(&self) -> &SessionStats {
        self.inner.session.stats()
    }

    /// Returns the publish counters.
    pub fn subscription_stats(&self) -> &SubscriptionStats {
        self.inner.subscriptions.stats()
    }

    /// Returns the node service.
    pub fn nodes(&self) -> &NodeService {
        &self.inner.nodes
    }

    /// Returns the subscription manager.
    pub fn subscriptions(&self) -> &Arc<SubscriptionManager> {
        &self.inner.subscriptions
    }

    /// Returns the notification filter.
    pub fn filter(&self) -> &Arc<NotificationFilter> {
        &self.inner.filter
    }

    // =========================================================================
    // Connection Management
    // =========================================================================

    /// Connects, opens a secure channel and activates a session.
    ///
    /// Failed attempts are retried according to the retry configuration.
    #[instrument(skip(self), fields(endpoint = %self.inner.config.endpoint))]
    pub async fn connect(&self) -> OpcUaResult<()> {
        let inner = &self.inner;
        if inner.dispatcher.state().is_connected() && inner.session.state().is_active() {
            return Ok(());
        }
        inner.config.validate()?;
        inner.closing.store(false, Ordering::Release);

        inner.with_retry("connect", move || inner.establish()).await?;
        inner.stats.record_connection();

        let mut tasks = inner.tasks.lock();
        tasks.abort_all();
        tasks.keep_alive = Some(
            inner
                .session
                .spawn_keep_alive(Arc::clone(&inner.dispatcher)),
        );
        tasks.renewal = Some(inner.dispatcher.spawn_channel_renewal());
        if inner.config.auto_reconnect {
            tasks.supervisor = Some(tokio::spawn(supervise(Arc::clone(inner))));
        }
        drop(tasks);

        info!(
            session_id = ?inner.session.session_id(),
            "OPC UA client connected"
        );
        Ok(())
    }

    /// Closes the session and the secure channel.
    #[instrument(skip(self), fields(endpoint = %self.inner.config.endpoint))]
    pub async fn disconnect(&self) {
        let inner = &self.inner;
        inner.closing.store(true, Ordering::Release);
        inner.tasks.lock().abort_all();

        inner.subscriptions.clear();
        if let Err(e) = inner.session.close(&inner.dispatcher).await {
            debug!(error = %e, "Session close failed");
        }
        inner.dispatcher.close().await;
        info!("OPC UA client disconnected");
    }

    /// Returns `true` if the channel is open and the session active.
    pub fn is_connected(&self) -> bool {
        self.inner.dispatcher.state().is_connected() && self.inner.session.state().is_active()
    }

    /// Returns the transport state.
    pub fn transport_state(&self) -> TransportState {
        self.inner.dispatcher.state()
    }

    /// Watches transport state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.inner.dispatcher.subscribe_state()
    }

    /// Returns the session state.
    pub fn session_state(&self) -> SessionState {
        self.inner.session.state()
    }

    /// Returns the session id, once created.
    pub fn session_id(&self) -> Option<NodeId> {
        self.inner.session.session_id()
    }

    /// Returns the secure channel token in use.
    pub fn channel_token(&self) -> Option<ChannelToken> {
        self.inner.dispatcher.token()
    }

    /// Renews the secure channel token now instead of waiting for the
    /// renewal task.
    pub async fn renew_channel(&self) -> OpcUaResult<ChannelToken> {
        self.inner.dispatcher.renew_channel().await
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Reads a node given in text form; bad statuses become errors.
    pub async fn read(&self, node_id: &str) -> OpcUaResult<TypedValue> {
        let node: NodeId = node_id.parse()?;
        let result = self.read_value(&node).await?;
        if result.status.is_bad() {
            self.inner.stats.record_error();
            return Err(crate::error::OperationError::read_failed(&node, result.status).into());
        }
        Ok(result.to_typed())
    }

    /// Reads the Value attribute of a node.
    pub async fn read_value(&self, node_id: &NodeId) -> OpcUaResult<ReadResult> {
        let started = Instant::now();
        let result = self.inner.nodes.read_value(node_id).await;
        self.track_read(started, &result);
        result
    }

    /// Reads the Value attribute of several nodes.
    pub async fn read_values(&self, node_ids: &[NodeId]) -> OpcUaResult<Vec<ReadResult>> {
        let started = Instant::now();
        let result = self.inner.nodes.read_values(node_ids).await;
        self.track_read(started, &result);
        result
    }

    /// Reads one attribute of a node.
    pub async fn read_attribute(
        &self,
        node_id: &NodeId,
        attribute: AttributeId,
    ) -> OpcUaResult<ReadResult> {
        let started = Instant::now();
        let result = self.inner.nodes.read_attribute(node_id, attribute).await;
        self.track_read(started, &result);
        result
    }

    /// Reads a value and converts it to `target`.
    pub async fn read_as(&self, node_id: &NodeId, target: OpcUaDataType) -> OpcUaResult<OpcUaValue> {
        let value = self.read_value(node_id).await?.into_value()?;
        self.inner.converter.convert(&value, target)
    }

    fn track_read<T>(&self, started: Instant, result: &OpcUaResult<T>) {
        match result {
            Ok(_) => self.inner.stats.record_read(started.elapsed()),
            Err(_) => self.inner.stats.record_error(),
        }
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Writes the Value attribute of a node.
    pub async fn write_value(&self, node_id: &NodeId, value: OpcUaValue) -> OpcUaResult<WriteResult> {
        let mut results = self
            .write_values(&[(node_id.clone(), value)])
            .await?;
        results
            .pop()
            .ok_or_else(|| OpcUaError::decoding("empty write response"))
    }

    /// Writes several values.
    ///
    /// Values are handed to the notification filter before the request is
    /// sent, since the server's echo may overtake the write response.
    /// Rejected values are forgotten again.
    pub async fn write_values(
        &self,
        items: &[(NodeId, OpcUaValue)],
    ) -> OpcUaResult<Vec<WriteResult>> {
        let filter = &self.inner.filter;
        for (node_id, value) in items {
            filter.record_write(node_id, value.clone());
        }

        let started = Instant::now();
        let results = match self.inner.nodes.write_values(items).await {
            Ok(results) => results,
            Err(e) => {
                for (node_id, _) in items {
                    filter.forget_write(node_id);
                }
                self.inner.stats.record_error();
                return Err(e);
            }
        };
        self.inner.stats.record_write(started.elapsed());

        for ((node_id, _), result) in items.iter().zip(&results) {
            if !result.is_good() {
                filter.forget_write(node_id);
                self.inner.stats.record_error();
            }
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
    // Browse Operations
    // =========================================================================

    /// Browses one node and returns the first page.
    pub async fn browse(&self, node_id: &NodeId, options: &BrowseOptions) -> OpcUaResult<BrowsePage> {
        self.inner.stats.record_browse();
        self.inner.nodes.browse(node_id, options).await
    }

    /// Continues or releases a browse.
    pub async fn browse_next(
        &self,
        node_id: &NodeId,
        continuation_point: &ByteString,
        release: bool,
    ) -> OpcUaResult<BrowsePage> {
        self.inner
            .nodes
            .browse_next(node_id, continuation_point, release)
            .await
    }

    /// Browses a node and follows continuation points.
    pub async fn browse_all(
        &self,
        node_id: &NodeId,
        options: &BrowseOptions,
    ) -> OpcUaResult<Vec<ReferenceDescription>> {
        self.inner.stats.record_browse();
        self.inner.nodes.browse_all(node_id, options).await
    }

    /// Reads server status, build information and server URIs.
    pub async fn server_info(&self) -> OpcUaResult<ServerInfo> {
        self.inner.nodes.server_info().await
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Creates a subscription.
    pub async fn subscribe(
        &self,
        settings: &SubscriptionSettings,
        callback: Arc<dyn SubscriptionCallback>,
    ) -> OpcUaResult<SubscriptionId> {
        self.inner
            .subscriptions
            .create_subscription(settings, callback)
            .await
    }

    /// Adds a monitored item to a subscription.
    pub async fn monitor(
        &self,
        subscription_id: SubscriptionId,
        node_id: &NodeId,
        settings: &MonitoredItemSettings,
    ) -> OpcUaResult<MonitoredItem> {
        self.inner
            .subscriptions
            .monitor(subscription_id, node_id, settings)
            .await
    }

    /// Creates one subscription with the configured settings and monitors
    /// every node in it. Per-node failures are returned, not raised.
    pub async fn watch(
        &self,
        node_ids: &[NodeId],
        callback: Arc<dyn SubscriptionCallback>,
    ) -> OpcUaResult<Watch> {
        let subscription_id = self
            .subscribe(&self.inner.config.subscription, callback)
            .await?;
        let mut watch = Watch {
            subscription_id,
            items: Vec::with_capacity(node_ids.len()),
            failures: Vec::new(),
        };
        for node_id in node_ids {
            match self
                .monitor(subscription_id, node_id, &self.inner.config.monitored_item)
                .await
            {
                Ok(item) => watch.items.push(item),
                Err(e) if e.is_connection_loss() => return Err(e),
                Err(e) => watch.failures.push((node_id.clone(), e)),
            }
        }
        Ok(watch)
    }

    /// Deletes a subscription.
    pub async fn unsubscribe(&self, subscription_id: SubscriptionId) -> OpcUaResult<()> {
        self.inner
            .subscriptions
            .delete_subscription(subscription_id)
            .await
    }
}

impl fmt::Debug for OpcUaClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpcUaClient")
            .field("endpoint", &self.inner.config.endpoint)
            .field("transport", &self.inner.dispatcher.state())
            .field("session", &self.inner.session.state())
            .finish()
    }
}

// =============================================================================
// Connection establishment and supervision
// =============================================================================

impl ClientInner {
    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// Runs `attempt` until it succeeds, retries are exhausted, or the
    /// error is not retryable.
    async fn with_retry<T, F, Fut>(&self, what: &'static str, attempt: F) -> OpcUaResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = OpcUaResult<T>>,
    {
        let mut tries = 0u32;
        loop {
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if tries >= self.retry.max_retries || !e.is_retryable() || self.is_closing() {
                        e.log(what);
                        return Err(e);
                    }
                    let delay = self.retry.delay_for_attempt(tries);
                    warn!(
                        attempt = tries + 1,
                        max_retries = self.retry.max_retries,
                        ?delay,
                        error = %e,
                        "{what} failed, retrying"
                    );
                    self.stats.record_retry();
                    tokio::time::sleep(delay).await;
                    tries += 1;
                }
            }
        }
    }

    /// Opens the channel and creates a new session.
    async fn establish(&self) -> OpcUaResult<()> {
        let token = self.dispatcher.connect().await?;
        debug!(channel_id = token.channel_id, "Secure channel open");
        if let Err(e) = self.session.create_and_activate(&self.dispatcher).await {
            self.dispatcher.close().await;
            return Err(e);
        }
        Ok(())
    }

    /// Opens a new channel and moves the session onto it.
    async fn reestablish(&self) -> OpcUaResult<Reactivation> {
        self.dispatcher.connect().await?;
        match self.session.reactivate(&self.dispatcher).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                self.dispatcher.close().await;
                Err(e)
            }
        }
    }

    async fn recover(self: &Arc<Self>) -> OpcUaResult<()> {
        let outcome = self
            .with_retry("reconnect", move || self.reestablish())
            .await?;

        match outcome {
            Reactivation::Resumed => self.subscriptions.resume(),
            Reactivation::Recreated => {
                if self.subscriptions.subscription_count() > 0 {
                    match self.subscriptions.recreate_all().await {
                        Ok(count) => info!(count, "Subscriptions recreated"),
                        Err(e) => e.log("subscription recreation"),
                    }
                }
            }
        }

        let mut tasks = self.tasks.lock();
        if let Some(previous) = tasks.renewal.replace(self.dispatcher.spawn_channel_renewal()) {
            previous.abort();
        }
        drop(tasks);

        self.stats.record_reconnection();
        Ok(())
    }
}

/// Waits for unexpected disconnects and recovers the connection.
async fn supervise(inner: Arc<ClientInner>) {
    let mut state = inner.dispatcher.subscribe_state();
    loop {
        if !wait_for_loss(&inner, &mut state).await {
            debug!("Connection supervisor stopped");
            return;
        }

        warn!(endpoint = %inner.config.endpoint, "Connection lost, reconnecting");
        inner.session.suspend();
        inner.subscriptions.suspend_all();

        loop {
            match inner.recover().await {
                Ok(()) => {
                    info!(session_id = ?inner.session.session_id(), "Connection recovered");
                    break;
                }
                Err(_) if inner.is_closing() => return,
                Err(_) => tokio::time::sleep(inner.retry.max_delay).await,
            }
            if inner.is_closing() {
                return;
            }
        }
    }
}

async fn wait_for_loss(inner: &ClientInner, state: &mut watch::Receiver<TransportState>) -> bool {
    loop {
        if inner.is_closing() {
            return false;
        }
        if *state.borrow_and_update() == TransportState::Disconnected {
            return !inner.is_closing();
        }
        if state.changed().await.is_err() {
            return false;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
