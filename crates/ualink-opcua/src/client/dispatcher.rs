// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Request dispatch over a single secure channel.
//!
//! Many tasks issue requests concurrently. Each request gets a unique
//! request id and a one-shot completion in the pending table. A background
//! reader task completes entries as responses arrive, in any order.
//!
//! ```text
//!  call() ──► stamp header ──► pending.insert(id) ──► writer lock ──► chunks
//!                                      ▲
//!  reader task ◄── Reassembler ◄── socket
//!       └──────── pending.remove(id).send(body)
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex as SyncMutex, RwLock};
use tokio::sync::{Mutex, Semaphore, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use super::session::SessionManager;
use crate::codec::DecodeLimits;
use crate::error::{OpcUaError, OpcUaResult, ProtocolError, TimeoutError};
use crate::messages::{
    OpenSecureChannelRequest, SecurityTokenRequestType, ServiceRequest, ServiceResponse,
    decode_response, encode_request,
};
use crate::transport::tcp::{OPEN_REQUEST_ID, timeout_hint};
use crate::transport::{
    self, ChannelReader, ChannelToken, ChannelWriter, Connection, Incoming, MessageType,
    TransportState,
};
use crate::types::OpcUaConfig;

type Completion = oneshot::Sender<OpcUaResult<Bytes>>;

// =============================================================================
// DispatcherStats
// =============================================================================

/// Request counters.
#[derive(Debug, Default)]
pub struct DispatcherStats {
    requests: AtomicU64,
    responses: AtomicU64,
    timeouts: AtomicU64,
    late_responses: AtomicU64,
    failures: AtomicU64,
}

impl DispatcherStats {
    /// Requests written to the channel.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Responses matched to a pending request.
    pub fn responses(&self) -> u64 {
        self.responses.load(Ordering::Relaxed)
    }

    /// Requests that timed out.
    pub fn timeouts(&self) -> u64 {
        self.timeouts.load(Ordering::Relaxed)
    }

    /// Responses that arrived after their request was abandoned.
    pub fn late_responses(&self) -> u64 {
        self.late_responses.load(Ordering::Relaxed)
    }

    /// Requests failed by a connection loss.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}

// =============================================================================
// RequestDispatcher
// =============================================================================

/// Correlates requests and responses on one secure channel.
pub struct RequestDispatcher {
    config: OpcUaConfig,
    session: Arc<SessionManager>,
    decode_limits: DecodeLimits,
    writer: Mutex<Option<ChannelWriter>>,
    pending: DashMap<u32, Completion>,
    slots: Semaphore,
    next_request_id: AtomicU32,
    next_handle: AtomicU32,
    // Bumped on every attach and close so a stale reader task cannot
    // tear down a newer connection.
    generation: AtomicU64,
    token: RwLock<Option<ChannelToken>>,
    reader_task: SyncMutex<Option<JoinHandle<()>>>,
    state: watch::Sender<TransportState>,
    stats: DispatcherStats,
}

impl RequestDispatcher {
    /// Creates a dispatcher without a connection.
    pub fn new(config: OpcUaConfig, session: Arc<SessionManager>) -> Self {
        let (state, _) = watch::channel(TransportState::Disconnected);
        Self {
            decode_limits: DecodeLimits::from(&config.limits),
            slots: Semaphore::new(config.max_pending_requests.max(1)),
            config,
            session,
            writer: Mutex::new(None),
            pending: DashMap::new(),
            next_request_id: AtomicU32::new(OPEN_REQUEST_ID + 1),
            next_handle: AtomicU32::new(1),
            generation: AtomicU64::new(0),
            token: RwLock::new(None),
            reader_task: SyncMutex::new(None),
            state,
            stats: DispatcherStats::default(),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &OpcUaConfig {
        &self.config
    }

    /// Returns the session manager.
    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Returns the decode limits used for responses.
    pub fn decode_limits(&self) -> DecodeLimits {
        self.decode_limits
    }

    /// Returns the transport state.
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Watches transport state changes.
    pub fn subscribe_state(&self) -> watch::Receiver<TransportState> {
        self.state.subscribe()
    }

    /// Returns the current channel token.
    pub fn token(&self) -> Option<ChannelToken> {
        self.token.read().clone()
    }

    /// Returns the number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Returns the request counters.
    pub fn stats(&self) -> &DispatcherStats {
        &self.stats
    }

    fn set_state(&self, state: TransportState) {
        let old = self.state.send_replace(state);
        if old != state {
            trace!(old_state = %old, new_state = %state, "Transport state changed");
        }
    }

    fn next_request_id(&self) -> u32 {
        loop {
            let id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }

    fn next_handle(&self) -> u32 {
        loop {
            let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
            if handle != 0 {
                return handle;
            }
        }
    }

    // =========================================================================
    // Connection lifecycle
    // =========================================================================

    /// Opens a connection and secure channel, then attaches it.
    pub async fn connect(self: &Arc<Self>) -> OpcUaResult<ChannelToken> {
        self.set_state(TransportState::Connecting);
        match transport::connect(&self.config).await {
            Ok(connection) => {
                let token = connection.token.clone();
                self.attach(connection).await;
                Ok(token)
            }
            Err(e) => {
                self.set_state(TransportState::Failed);
                Err(e)
            }
        }
    }

    /// Takes ownership of an open connection and starts the reader task.
    pub async fn attach(self: &Arc<Self>, connection: Connection) {
        let Connection {
            reader,
            writer,
            token,
            ..
        } = connection;

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.writer.lock().await = Some(writer);
        *self.token.write() = Some(token);

        let this = Arc::clone(self);
        let task = tokio::spawn(async move { this.read_loop(reader, generation).await });
        if let Some(previous) = self.reader_task.lock().replace(task) {
            previous.abort();
        }
        self.set_state(TransportState::Connected);
    }

    async fn read_loop(self: Arc<Self>, mut reader: ChannelReader, generation: u64) {
        let error = loop {
            match reader.read_message().await {
                Ok(Incoming::Message(message)) => {
                    self.complete(message.request_id, Ok(message.body));
                }
                Ok(Incoming::Aborted {
                    request_id,
                    status,
                    reason,
                }) => {
                    warn!(request_id, %status, %reason, "Server aborted response");
                    self.complete(
                        request_id,
                        Err(ProtocolError::Aborted {
                            request_id,
                            status,
                            reason,
                        }
                        .into()),
                    );
                }
                Err(e) => break e,
            }
        };
        self.connection_lost(generation, &error.to_string()).await;
    }

    fn complete(&self, request_id: u32, result: OpcUaResult<Bytes>) {
        match self.pending.remove(&request_id) {
            Some((_, completion)) => {
                self.stats.responses.fetch_add(1, Ordering::Relaxed);
                // The caller may have given up between removal and send.
                let _ = completion.send(result);
            }
            None => {
                self.stats.late_responses.fetch_add(1, Ordering::Relaxed);
                debug!(request_id, "Discarding response without pending request");
            }
        }
    }

    fn fail_pending(&self, reason: &str) -> usize {
        let ids: Vec<u32> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut failed = 0;
        for id in ids {
            if let Some((_, completion)) = self.pending.remove(&id) {
                let _ = completion.send(Err(OpcUaError::connection_closed(reason)));
                failed += 1;
            }
        }
        self.stats.failures.fetch_add(failed as u64, Ordering::Relaxed);
        failed
    }

    async fn connection_lost(&self, generation: u64, reason: &str) {
        if self.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        self.writer.lock().await.take();
        let failed = self.fail_pending(reason);
        self.set_state(TransportState::Disconnected);
        warn!(reason, failed_requests = failed, "Connection lost");
    }

    /// Tears the connection down as if the socket had failed.
    pub async fn mark_connection_lost(&self, reason: &str) {
        let generation = self.generation.load(Ordering::SeqCst);
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.close(self.next_request_id()).await;
        }
        self.connection_lost(generation, reason).await;
    }

    /// Closes the secure channel and fails outstanding requests.
    pub async fn close(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(mut writer) = self.writer.lock().await.take() {
            writer.close(self.next_request_id()).await;
        }
        if let Some(task) = self.reader_task.lock().take() {
            task.abort();
        }
        self.fail_pending("connection closed by client");
        self.token.write().take();
        self.set_state(TransportState::Disconnected);
        debug!("Secure channel closed");
    }

    // =========================================================================
    // Requests
    // =========================================================================

    /// Sends a request and waits for its response with the configured timeout.
    pub async fn call<R: ServiceRequest>(&self, request: R) -> OpcUaResult<R::Response> {
        self.call_with_timeout(request, self.config.request_timeout)
            .await
    }

    /// Sends a request and waits at most `timeout` for its response.
    ///
    /// The timeout covers waiting for a request slot and the writer as well
    /// as the response.
    pub async fn call_with_timeout<R: ServiceRequest>(
        &self,
        mut request: R,
        timeout: Duration,
    ) -> OpcUaResult<R::Response> {
        if !self.state().is_connected() {
            return Err(OpcUaError::not_connected());
        }

        let handle = self.next_handle();
        {
            let header = request.request_header_mut();
            if R::AUTHENTICATED {
                header.authentication_token = self.session.authentication_token();
            }
            header.timestamp = Some(Utc::now());
            header.request_handle = handle;
            header.timeout_hint = timeout_hint(timeout);
        }
        let body = encode_request(&request);
        let request_id = self.next_request_id();

        let (completion, response) = oneshot::channel();
        self.pending.insert(request_id, completion);
        let mut writing = false;
        let exchange = async {
            let _permit = self
                .slots
                .acquire()
                .await
                .map_err(|_| OpcUaError::not_connected())?;
            writing = true;
            self.send(R::MESSAGE_TYPE, request_id, &body).await?;
            writing = false;
            self.stats.requests.fetch_add(1, Ordering::Relaxed);
            trace!(service = R::NAME, request_id, handle, size = body.len(), "Request sent");
            match response.await {
                Ok(result) => result,
                Err(_) => Err(OpcUaError::connection_closed("request abandoned")),
            }
        };
        let outcome = tokio::time::timeout(timeout, exchange).await;

        let body = match outcome {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                self.pending.remove(&request_id);
                return Err(e);
            }
            Err(_) => {
                self.pending.remove(&request_id);
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(service = R::NAME, request_id, ?timeout, "Request timed out");
                if writing {
                    // A partly written message leaves the framing unknown.
                    self.writer.lock().await.take();
                    self.mark_connection_lost("request write timed out").await;
                }
                return Err(TimeoutError::request(R::NAME, request_id, timeout).into());
            }
        };

        let response = decode_response::<R>(body, self.decode_limits)?;
        let echoed = response.response_header().request_handle;
        if echoed != handle {
            return Err(ProtocolError::HandleMismatch {
                expected: handle,
                received: echoed,
            }
            .into());
        }
        self.session.touch();
        Ok(response)
    }

    async fn send(
        &self,
        message_type: MessageType,
        request_id: u32,
        body: &[u8],
    ) -> OpcUaResult<()> {
        let mut guard = self.writer.lock().await;
        let Some(writer) = guard.as_mut() else {
            return Err(OpcUaError::not_connected());
        };
        match writer.write_message(message_type, request_id, body).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_connection_loss() => {
                // The socket is unusable; do not try CloseSecureChannel on it.
                guard.take();
                drop(guard);
                self.mark_connection_lost(&e.to_string()).await;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    // =========================================================================
    // Channel renewal
    // =========================================================================

    /// Renews the channel token and switches to the new one.
    pub async fn renew_channel(&self) -> OpcUaResult<ChannelToken> {
        let request = OpenSecureChannelRequest::new(
            SecurityTokenRequestType::Renew,
            self.config.channel_lifetime,
        );
        let response = self.call(request).await?;
        let token = ChannelToken::from(&response.security_token);
        if let Some(writer) = self.writer.lock().await.as_mut() {
            writer.set_token(&token);
        }
        *self.token.write() = Some(token.clone());
        info!(
            channel_id = token.channel_id,
            token_id = token.token_id,
            lifetime = ?token.revised_lifetime,
            "Secure channel token renewed"
        );
        Ok(token)
    }

    /// Renews the channel token at 75% of each token lifetime.
    ///
    /// The task ends when the transport disconnects.
    pub fn spawn_channel_renewal(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut state = this.subscribe_state();
            loop {
                let Some(token) = this.token() else { return };
                let wait = token.renew_after().max(Duration::from_secs(1));
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    changed = state.changed() => {
                        if changed.is_err() || !state.borrow().is_connected() {
                            return;
                        }
                        continue;
                    }
                }
                if !this.state().is_connected() {
                    return;
                }
                if let Err(e) = this.renew_channel().await {
                    e.log("secure channel renewal");
                    if e.is_connection_loss() {
                        return;
                    }
                }
            }
        })
    }
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("endpoint", &self.config.endpoint)
            .field("state", &self.state())
            .field("pending", &self.pending.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dispatcher() -> Arc<RequestDispatcher> {
        let config = OpcUaConfig::new("opc.tcp://127.0.0.1:4840");
        let session = Arc::new(SessionManager::new(config.clone()));
        Arc::new(RequestDispatcher::new(config, session))
    }

    #[tokio::test]
    async fn test_call_fails_fast_when_disconnected() {
        let dispatcher = dispatcher();
        let err = dispatcher
            .call(crate::messages::ReadRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpcUaError::Connection(crate::error::ConnectionError::NotConnected)
        ));
        assert_eq!(dispatcher.pending_requests(), 0);
    }

    #[test]
    fn test_late_response_is_counted() {
        let dispatcher = dispatcher();
        dispatcher.complete(99, Ok(Bytes::new()));
        assert_eq!(dispatcher.stats().late_responses(), 1);
    }

    #[tokio::test]
    async fn test_fail_pending_empties_table() {
        let dispatcher = dispatcher();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();
        dispatcher.pending.insert(5, tx1);
        dispatcher.pending.insert(6, tx2);

        assert_eq!(dispatcher.fail_pending("gone"), 2);
        assert_eq!(dispatcher.pending_requests(), 0);
        for rx in [rx1, rx2] {
            let err = rx.await.unwrap().unwrap_err();
            assert!(err.is_connection_loss());
        }
    }

    /// A writer whose socket no longer accepts writes, and the peer socket.
    async fn broken_writer() -> (ChannelWriter, tokio::net::TcpStream) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = tokio::net::TcpStream::connect(listener.local_addr().unwrap())
            .await
            .unwrap();
        let (server, _) = listener.accept().await.unwrap();
        let (_read, mut write) = client.into_split();
        tokio::io::AsyncWriteExt::shutdown(&mut write).await.unwrap();
        let limits = crate::transport::NegotiatedLimits::symmetric(
            &crate::transport::TransportLimits::default(),
        );
        (ChannelWriter::new(write, &limits), server)
    }

    #[tokio::test]
    async fn test_timeout_covers_busy_writer() {
        let dispatcher = dispatcher();
        dispatcher.set_state(TransportState::Connected);
        let _held = dispatcher.writer.lock().await;

        let timeout = Duration::from_millis(50);
        let started = std::time::Instant::now();
        let err = dispatcher
            .call_with_timeout(crate::messages::ReadRequest::default(), timeout)
            .await
            .unwrap_err();
        assert!(matches!(err, OpcUaError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(dispatcher.pending_requests(), 0);
        assert_eq!(dispatcher.stats().timeouts(), 1);
    }

    #[tokio::test]
    async fn test_timeout_covers_slot_wait() {
        let dispatcher = dispatcher();
        dispatcher.set_state(TransportState::Connected);
        let slots = dispatcher.config.max_pending_requests.max(1) as u32;
        let _all = dispatcher.slots.acquire_many(slots).await.unwrap();

        let err = dispatcher
            .call_with_timeout(
                crate::messages::ReadRequest::default(),
                Duration::from_millis(50),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, OpcUaError::Timeout(_)));
        assert_eq!(dispatcher.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_write_failure_marks_connection_lost() {
        let dispatcher = dispatcher();
        let (writer, _server) = broken_writer().await;
        *dispatcher.writer.lock().await = Some(writer);
        dispatcher.set_state(TransportState::Connected);

        let err = dispatcher
            .call_with_timeout(
                crate::messages::ReadRequest::default(),
                Duration::from_secs(2),
            )
            .await
            .unwrap_err();
        assert!(err.is_connection_loss());
        assert_eq!(dispatcher.state(), TransportState::Disconnected);
        assert!(dispatcher.writer.lock().await.is_none());
        assert_eq!(dispatcher.pending_requests(), 0);
    }

    #[test]
    fn test_request_ids_skip_zero() {
        let dispatcher = dispatcher();
        dispatcher.next_request_id.store(u32::MAX, Ordering::Relaxed);
        assert_eq!(dispatcher.next_request_id(), u32::MAX);
        assert_eq!(dispatcher.next_request_id(), 1);
    }
}
