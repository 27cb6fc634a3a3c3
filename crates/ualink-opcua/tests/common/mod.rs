// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! In-process OPC UA server for integration tests.
//!
//! The server speaks the binary protocol with SecurityPolicy None and
//! implements just enough of the session, attribute, view and
//! subscription services to drive the client. Tests shape its behavior
//! through [`MockServer`] (delays, faults, dropped connections).

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use ualink_opcua::codec::{BinaryDecode, BinaryReader};
use ualink_opcua::error::OpcUaResult;
use ualink_opcua::messages::{
    ActivateSessionResponse, BrowseNextRequest, BrowseNextResponse, BrowseRequest,
    BrowseResponse, BrowseResult, BuildInfo, ChannelSecurityToken, CloseSessionResponse,
    CreateMonitoredItemsRequest, CreateMonitoredItemsResponse, CreateSessionRequest,
    CreateSessionResponse, CreateSubscriptionRequest, CreateSubscriptionResponse,
    DataChangeNotification, DeleteSubscriptionsRequest, DeleteSubscriptionsResponse,
    MonitoredItemCreateResult, MonitoredItemNotification, NotificationMessage,
    OpenSecureChannelRequest, OpenSecureChannelResponse, PublishRequest, PublishResponse,
    ReadRequest, ReadResponse, ReferenceDescription, RequestHeader, ResponseHeader,
    ServerStatusDataType, WriteRequest, WriteResponse, encode_response, encode_service_fault,
    peek_encoding_id,
};
use ualink_opcua::transport::frame::{
    AcknowledgeMessage, ErrorMessage, HelloMessage, MessageType, encode_message, read_frame,
};
use ualink_opcua::transport::{Chunker, Incoming, NegotiatedLimits, Reassembler};
use ualink_opcua::types::{
    ByteString, LocalizedText, NodeClass, NodeId, OpcUaConfig, QualifiedName,
    SubscriptionSettings, ids,
};
use ualink_opcua::value::{DataValue, OpcUaValue};
use ualink_opcua::{AttributeId, StatusCode};

/// Chunk size the server announces and uses.
pub const SERVER_BUFFER_SIZE: u32 = 8192;

/// Encoding ids of the services the server implements.
pub mod service {
    pub const OPEN_SECURE_CHANNEL: u32 = 446;
    pub const CREATE_SESSION: u32 = 461;
    pub const ACTIVATE_SESSION: u32 = 467;
    pub const CLOSE_SESSION: u32 = 473;
    pub const BROWSE: u32 = 527;
    pub const BROWSE_NEXT: u32 = 533;
    pub const READ: u32 = 631;
    pub const WRITE: u32 = 673;
    pub const CREATE_MONITORED_ITEMS: u32 = 751;
    pub const CREATE_SUBSCRIPTION: u32 = 787;
    pub const PUBLISH: u32 = 826;
    pub const DELETE_SUBSCRIPTIONS: u32 = 847;
}

/// Scalar nodes every server starts with.
pub fn demo_node(name: &str) -> NodeId {
    NodeId::string(3, format!("Demo.{name}"))
}

/// Installs a test subscriber once; respects `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Server state
// =============================================================================

#[derive(Debug, Default)]
struct Behavior {
    reject_hello: Option<StatusCode>,
    faults: HashMap<u32, StatusCode>,
    read_delays: HashMap<NodeId, Duration>,
    read_only: HashSet<NodeId>,
    hold_publish: bool,
}

/// A Publish request held back until the next CreateMonitoredItems.
#[derive(Debug)]
struct HeldPublish {
    session: NodeId,
    handle: u32,
    ack_results: Vec<StatusCode>,
    request_id: u32,
    tx: Sender,
}

#[derive(Debug)]
struct ServerSubscription {
    session: NodeId,
    keep_alive: Duration,
    items: Vec<(u32, NodeId)>,
    queue: Vec<MonitoredItemNotification>,
    sequence: u32,
}

#[derive(Debug, Default)]
struct ServerState {
    values: Mutex<HashMap<NodeId, DataValue>>,
    references: Mutex<HashMap<NodeId, Vec<ReferenceDescription>>>,
    continuation_points: Mutex<HashMap<Vec<u8>, Vec<ReferenceDescription>>>,
    sessions: Mutex<HashSet<NodeId>>,
    subscriptions: Mutex<HashMap<u32, ServerSubscription>>,
    behavior: Mutex<Behavior>,
    requests: Mutex<HashMap<u32, usize>>,
    acknowledgements: Mutex<Vec<(u32, u32)>>,
    held_publishes: Mutex<Vec<HeldPublish>>,
    connections: AtomicUsize,
    next_id: AtomicU32,
}

impl ServerState {
    fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn fault_for(&self, encoding_id: u32) -> Option<StatusCode> {
        self.behavior.lock().faults.get(&encoding_id).copied()
    }

    fn set_value(&self, node_id: NodeId, value: OpcUaValue) {
        let data_value = DataValue {
            value,
            source_timestamp: Some(Utc::now()),
            server_timestamp: Some(Utc::now()),
            ..Default::default()
        };
        for subscription in self.subscriptions.lock().values_mut() {
            for (client_handle, monitored) in &subscription.items {
                if *monitored == node_id {
                    subscription.queue.push(MonitoredItemNotification {
                        client_handle: *client_handle,
                        value: data_value.clone(),
                    });
                }
            }
        }
        self.values.lock().insert(node_id, data_value);
    }

    fn populate(&self) {
        let status = ServerStatusDataType {
            start_time: Some(Utc::now() - chrono::Duration::hours(1)),
            current_time: Some(Utc::now()),
            state: 0,
            build_info: BuildInfo {
                product_uri: Some("urn:ualink:mock".into()),
                manufacturer_name: Some("ualink".into()),
                product_name: Some("Mock Server".into()),
                software_version: Some("1.0.0".into()),
                build_number: Some("42".into()),
                build_date: Some(Utc::now()),
            },
            seconds_till_shutdown: 0,
            shutdown_reason: LocalizedText::default(),
        };
        let defaults: Vec<(NodeId, OpcUaValue)> = vec![
            (
                NodeId::numeric(0, ids::SERVER_SERVER_STATUS),
                OpcUaValue::ExtensionObject(Box::new(status.to_extension_object())),
            ),
            (
                NodeId::numeric(0, ids::SERVER_SERVER_ARRAY),
                OpcUaValue::Array(vec![OpcUaValue::String("urn:ualink:mock".into())]),
            ),
            (
                NodeId::numeric(0, ids::SERVER_SERVER_STATUS_STATE),
                OpcUaValue::Int32(0),
            ),
            (
                NodeId::numeric(0, ids::SERVER_SERVER_STATUS_CURRENT_TIME),
                OpcUaValue::DateTime(Utc::now()),
            ),
            (demo_node("Boolean"), OpcUaValue::Boolean(false)),
            (demo_node("Int32"), OpcUaValue::Int32(-5)),
            (demo_node("UInt32"), OpcUaValue::UInt32(7)),
            (demo_node("Double"), OpcUaValue::Double(1.5)),
            (demo_node("String"), OpcUaValue::String("hello".into())),
        ];
        for (node_id, value) in defaults {
            self.set_value(node_id, value);
        }
    }

    fn browse_page(
        &self,
        references: Vec<ReferenceDescription>,
        max_references: u32,
    ) -> BrowseResult {
        let max = if max_references == 0 {
            usize::MAX
        } else {
            max_references as usize
        };
        if references.len() <= max {
            return BrowseResult {
                status_code: StatusCode::GOOD,
                continuation_point: ByteString::null(),
                references,
            };
        }
        let mut first = references;
        let rest = first.split_off(max);
        let point = self.next_id().to_le_bytes().to_vec();
        self.continuation_points.lock().insert(point.clone(), rest);
        BrowseResult {
            status_code: StatusCode::GOOD,
            continuation_point: ByteString::from(point),
            references: first,
        }
    }
}

// =============================================================================
// MockServer
// =============================================================================

/// A running test server bound to an ephemeral port.
pub struct MockServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    kill: watch::Sender<u64>,
    task: JoinHandle<()>,
}

impl MockServer {
    /// Binds to 127.0.0.1 and starts accepting connections.
    pub async fn start() -> Self {
        init_tracing();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());
        state.populate();
        let (kill, _) = watch::channel(0u64);

        let task = tokio::spawn(accept_loop(listener, Arc::clone(&state), kill.clone()));
        Self {
            addr,
            state,
            kill,
            task,
        }
    }

    /// Endpoint URL of the server.
    pub fn endpoint(&self) -> String {
        format!("opc.tcp://{}", self.addr)
    }

    /// Client configuration with short timeouts for tests.
    pub fn config(&self) -> OpcUaConfig {
        let mut config = OpcUaConfig::new(self.endpoint());
        config.request_timeout = Duration::from_secs(2);
        config.connect_timeout = Duration::from_secs(2);
        config.retry_delay = Duration::from_millis(50);
        config.max_retries = 5;
        config.subscription = SubscriptionSettings {
            publishing_interval: Duration::from_millis(50),
            max_keepalive_count: 4,
            ..Default::default()
        };
        config
    }

    /// Sets a node value and queues data changes for monitoring items.
    pub fn set_value(&self, node_id: NodeId, value: impl Into<OpcUaValue>) {
        self.state.set_value(node_id, value.into());
    }

    /// Current value of a node.
    pub fn value(&self, node_id: &NodeId) -> Option<OpcUaValue> {
        self.state
            .values
            .lock()
            .get(node_id)
            .map(|data_value| data_value.value.clone())
    }

    /// Adds forward references below `parent`, one per child name.
    pub fn add_children(&self, parent: &NodeId, children: &[&str]) {
        let references = children.iter().map(|name| ReferenceDescription {
            reference_type_id: NodeId::numeric(0, 35),
            is_forward: true,
            node_id: NodeId::string(3, format!("{parent}.{name}")).into(),
            browse_name: QualifiedName::new(3, *name),
            display_name: LocalizedText::new(*name),
            node_class: NodeClass::Variable,
            type_definition: NodeId::numeric(0, 63).into(),
        });
        self.state
            .references
            .lock()
            .entry(parent.clone())
            .or_default()
            .extend(references);
    }

    /// Delays Read responses that include `node_id`.
    pub fn delay_reads(&self, node_id: NodeId, delay: Duration) {
        self.state.behavior.lock().read_delays.insert(node_id, delay);
    }

    /// Answers every request of a service with a ServiceFault.
    pub fn fault_service(&self, encoding_id: u32, status: StatusCode) {
        self.state.behavior.lock().faults.insert(encoding_id, status);
    }

    /// Stops answering a service with faults.
    pub fn clear_faults(&self) {
        self.state.behavior.lock().faults.clear();
    }

    /// Holds the next Publish request and answers it with the initial
    /// values as soon as CreateMonitoredItems arrives, before the
    /// CreateMonitoredItems response itself.
    pub fn hold_publish_until_monitored(&self) {
        self.state.behavior.lock().hold_publish = true;
    }

    /// Rejects Hello with an ERR message.
    pub fn reject_hello(&self, status: StatusCode) {
        self.state.behavior.lock().reject_hello = Some(status);
    }

    /// Makes writes to `node_id` fail with BadNotWritable.
    pub fn make_read_only(&self, node_id: NodeId) {
        self.state.behavior.lock().read_only.insert(node_id);
    }

    /// Closes every open socket.
    pub fn drop_connections(&self) {
        self.kill.send_modify(|generation| *generation += 1);
    }

    /// Forgets all sessions and subscriptions, as after a restart.
    pub fn forget_sessions(&self) {
        self.state.sessions.lock().clear();
        self.state.subscriptions.lock().clear();
    }

    /// Number of requests received for a service.
    pub fn requests(&self, encoding_id: u32) -> usize {
        self.state
            .requests
            .lock()
            .get(&encoding_id)
            .copied()
            .unwrap_or(0)
    }

    /// Number of accepted TCP connections.
    pub fn connections(&self) -> usize {
        self.state.connections.load(Ordering::Relaxed)
    }

    /// Number of live sessions.
    pub fn session_count(&self) -> usize {
        self.state.sessions.lock().len()
    }

    /// Number of live subscriptions.
    pub fn subscription_count(&self) -> usize {
        self.state.subscriptions.lock().len()
    }

    /// Acknowledged `(subscription_id, sequence_number)` pairs.
    pub fn acknowledgements(&self) -> Vec<(u32, u32)> {
        self.state.acknowledgements.lock().clone()
    }

    /// Number of continuation points held.
    pub fn continuation_points(&self) -> usize {
        self.state.continuation_points.lock().len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.drop_connections();
        self.task.abort();
    }
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// =============================================================================
// Connections
// =============================================================================

enum Outgoing {
    Open {
        channel_id: u32,
        token_id: u32,
        request_id: u32,
        body: Bytes,
    },
    Message {
        request_id: u32,
        body: Bytes,
    },
}

type Sender = mpsc::UnboundedSender<Outgoing>;

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn accept_loop(listener: TcpListener, state: Arc<ServerState>, kill: watch::Sender<u64>) {
    while let Ok((stream, _)) = listener.accept().await {
        state.connections.fetch_add(1, Ordering::Relaxed);
        let state = Arc::clone(&state);
        let mut kill = kill.subscribe();
        tokio::spawn(async move {
            tokio::select! {
                result = serve_connection(stream, state) => {
                    if let Err(e) = result {
                        tracing::debug!(error = %e, "Mock connection ended");
                    }
                }
                _ = kill.changed() => {}
            }
        });
    }
}

async fn serve_connection(stream: TcpStream, state: Arc<ServerState>) -> OpcUaResult<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let frame = read_frame(&mut reader, SERVER_BUFFER_SIZE).await?;
    if frame.header.message_type != MessageType::Hello {
        return Ok(());
    }
    let hello = HelloMessage::decode(&mut BinaryReader::with_defaults(frame.body))?;

    let rejection = state.behavior.lock().reject_hello;
    if let Some(status) = rejection {
        let error = ErrorMessage {
            error: status,
            reason: Some("rejected by test server".into()),
        };
        write_half
            .write_all(&encode_message(MessageType::Error, &error))
            .await?;
        return Ok(());
    }

    let ack = AcknowledgeMessage {
        protocol_version: 0,
        receive_buffer_size: SERVER_BUFFER_SIZE,
        send_buffer_size: SERVER_BUFFER_SIZE,
        max_message_size: 0,
        max_chunk_count: 0,
    };
    write_half
        .write_all(&encode_message(MessageType::Acknowledge, &ack))
        .await?;

    let limits = NegotiatedLimits {
        send_buffer_size: SERVER_BUFFER_SIZE.min(hello.receive_buffer_size),
        receive_buffer_size: SERVER_BUFFER_SIZE,
        local_max_message_size: 0,
        local_max_chunk_count: 0,
        remote_max_message_size: hello.max_message_size,
        remote_max_chunk_count: hello.max_chunk_count,
    };
    let (tx, rx) = mpsc::unbounded_channel();
    let _writer = AbortOnDrop(tokio::spawn(write_loop(write_half, Chunker::new(&limits), rx)));

    let mut reassembler = Reassembler::new(&limits);
    let mut channel_id = None;
    loop {
        let frame = read_frame(&mut reader, SERVER_BUFFER_SIZE).await?;
        let Some(Incoming::Message(message)) = reassembler.push(frame)? else {
            continue;
        };
        match message.message_type {
            MessageType::Open => {
                let request: OpenSecureChannelRequest = decode_request(&message.body)?;
                let id = *channel_id.get_or_insert_with(|| state.next_id());
                reassembler.set_channel_id(id);
                let token_id = state.next_id();
                let response = OpenSecureChannelResponse {
                    response_header: ResponseHeader::for_request(
                        request.request_header.request_handle,
                        StatusCode::GOOD,
                    ),
                    server_protocol_version: 0,
                    security_token: ChannelSecurityToken {
                        channel_id: id,
                        token_id,
                        created_at: Some(Utc::now()),
                        revised_lifetime: request.requested_lifetime,
                    },
                    server_nonce: ByteString::null(),
                };
                let _ = tx.send(Outgoing::Open {
                    channel_id: id,
                    token_id,
                    request_id: message.request_id,
                    body: encode_response(&response),
                });
            }
            MessageType::Close => return Ok(()),
            _ => handle_service(&state, message.request_id, message.body, &tx)?,
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut chunker: Chunker,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
) {
    while let Some(outgoing) = rx.recv().await {
        let chunks = match outgoing {
            Outgoing::Open {
                channel_id,
                token_id,
                request_id,
                body,
            } => {
                chunker.set_channel(channel_id, token_id);
                chunker.encode(MessageType::Open, request_id, &body)
            }
            Outgoing::Message { request_id, body } => {
                chunker.encode(MessageType::Message, request_id, &body)
            }
        };
        let Ok(chunks) = chunks else { return };
        for chunk in chunks {
            if writer.write_all(&chunk).await.is_err() {
                return;
            }
        }
    }
}

fn decode_request<T: BinaryDecode>(body: &Bytes) -> OpcUaResult<T> {
    let mut reader = BinaryReader::with_defaults(body.clone());
    NodeId::decode(&mut reader)?;
    Ok(T::decode(&mut reader)?)
}

fn reply(tx: &Sender, request_id: u32, body: Bytes) {
    let _ = tx.send(Outgoing::Message { request_id, body });
}

// =============================================================================
// Services
// =============================================================================

fn handle_service(
    state: &Arc<ServerState>,
    request_id: u32,
    body: Bytes,
    tx: &Sender,
) -> OpcUaResult<()> {
    let encoding_id = peek_encoding_id(&body)?;
    *state.requests.lock().entry(encoding_id).or_default() += 1;

    let header: RequestHeader = decode_request(&body)?;
    let handle = header.request_handle;
    if let Some(status) = state.fault_for(encoding_id) {
        reply(tx, request_id, encode_service_fault(handle, status));
        return Ok(());
    }

    if encoding_id != service::CREATE_SESSION
        && !state.sessions.lock().contains(&header.authentication_token)
    {
        reply(
            tx,
            request_id,
            encode_service_fault(handle, StatusCode::BAD_SESSION_ID_INVALID),
        );
        return Ok(());
    }
    let ok = ResponseHeader::for_request(handle, StatusCode::GOOD);

    match encoding_id {
        service::CREATE_SESSION => {
            let request: CreateSessionRequest = decode_request(&body)?;
            let id = state.next_id();
            let token = NodeId::numeric(0, 100_000 + id);
            state.sessions.lock().insert(token.clone());
            let response = CreateSessionResponse {
                response_header: ok,
                session_id: NodeId::numeric(1, id),
                authentication_token: token,
                revised_session_timeout: request.requested_session_timeout,
                server_nonce: ByteString::from(vec![7u8; 32]),
                max_request_message_size: 0,
                ..Default::default()
            };
            reply(tx, request_id, encode_response(&response));
        }
        service::ACTIVATE_SESSION => {
            let response = ActivateSessionResponse {
                response_header: ok,
                server_nonce: ByteString::from(vec![9u8; 32]),
                ..Default::default()
            };
            reply(tx, request_id, encode_response(&response));
        }
        service::CLOSE_SESSION => {
            state.sessions.lock().remove(&header.authentication_token);
            state
                .subscriptions
                .lock()
                .retain(|_, s| s.session != header.authentication_token);
            let response = CloseSessionResponse { response_header: ok };
            reply(tx, request_id, encode_response(&response));
        }
        service::READ => {
            let request: ReadRequest = decode_request(&body)?;
            let delay = {
                let behavior = state.behavior.lock();
                request
                    .nodes_to_read
                    .iter()
                    .filter_map(|r| behavior.read_delays.get(&r.node_id).copied())
                    .max()
            };
            let results = {
                let values = state.values.lock();
                request
                    .nodes_to_read
                    .iter()
                    .map(|r| match values.get(&r.node_id) {
                        None => DataValue::with_status(StatusCode::BAD_NODE_ID_UNKNOWN),
                        Some(value) if r.attribute_id == AttributeId::Value.value() => {
                            value.clone()
                        }
                        Some(_) if r.attribute_id == AttributeId::DisplayName.value() => {
                            DataValue::new(LocalizedText::new(r.node_id.to_string()))
                        }
                        Some(_) => DataValue::with_status(StatusCode::BAD_ATTRIBUTE_ID_INVALID),
                    })
                    .collect()
            };
            let body = encode_response(&ReadResponse {
                response_header: ok,
                results,
                diagnostic_infos: vec![],
            });
            match delay {
                Some(delay) => {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        reply(&tx, request_id, body);
                    });
                }
                None => reply(tx, request_id, body),
            }
        }
        service::WRITE => {
            let request: WriteRequest = decode_request(&body)?;
            let mut results = Vec::with_capacity(request.nodes_to_write.len());
            for write in request.nodes_to_write {
                let known = state.values.lock().contains_key(&write.node_id);
                let read_only = state.behavior.lock().read_only.contains(&write.node_id);
                let status = if !known {
                    StatusCode::BAD_NODE_ID_UNKNOWN
                } else if read_only {
                    StatusCode::BAD_NOT_WRITABLE
                } else if write.attribute_id != AttributeId::Value.value() {
                    StatusCode::BAD_WRITE_NOT_SUPPORTED
                } else {
                    state.set_value(write.node_id, write.value.value);
                    StatusCode::GOOD
                };
                results.push(status);
            }
            reply(
                tx,
                request_id,
                encode_response(&WriteResponse {
                    response_header: ok,
                    results,
                    diagnostic_infos: vec![],
                }),
            );
        }
        service::BROWSE => {
            let request: BrowseRequest = decode_request(&body)?;
            let results = request
                .nodes_to_browse
                .iter()
                .map(|description| {
                    let references = state.references.lock().get(&description.node_id).cloned();
                    match references {
                        Some(references) => state
                            .browse_page(references, request.requested_max_references_per_node),
                        None => BrowseResult {
                            status_code: StatusCode::BAD_NODE_ID_UNKNOWN,
                            ..Default::default()
                        },
                    }
                })
                .collect();
            reply(
                tx,
                request_id,
                encode_response(&BrowseResponse {
                    response_header: ok,
                    results,
                    diagnostic_infos: vec![],
                }),
            );
        }
        service::BROWSE_NEXT => {
            let request: BrowseNextRequest = decode_request(&body)?;
            let results = request
                .continuation_points
                .iter()
                .map(|point| {
                    let rest = state
                        .continuation_points
                        .lock()
                        .remove(point.as_bytes());
                    match rest {
                        None => BrowseResult {
                            status_code: StatusCode::BAD_CONTINUATION_POINT_INVALID,
                            ..Default::default()
                        },
                        Some(_) if request.release_continuation_points => BrowseResult::default(),
                        Some(rest) => state.browse_page(rest, 2),
                    }
                })
                .collect();
            reply(
                tx,
                request_id,
                encode_response(&BrowseNextResponse {
                    response_header: ok,
                    results,
                    diagnostic_infos: vec![],
                }),
            );
        }
        service::CREATE_SUBSCRIPTION => {
            let request: CreateSubscriptionRequest = decode_request(&body)?;
            let id = state.next_id();
            let keep_alive = Duration::from_secs_f64(
                request.requested_publishing_interval.max(10.0) / 1000.0,
            ) * request.requested_max_keep_alive_count.max(1);
            state.subscriptions.lock().insert(
                id,
                ServerSubscription {
                    session: header.authentication_token.clone(),
                    keep_alive,
                    items: Vec::new(),
                    queue: Vec::new(),
                    sequence: 0,
                },
            );
            reply(
                tx,
                request_id,
                encode_response(&CreateSubscriptionResponse {
                    response_header: ok,
                    subscription_id: id,
                    revised_publishing_interval: request.requested_publishing_interval,
                    revised_lifetime_count: request.requested_lifetime_count,
                    revised_max_keep_alive_count: request.requested_max_keep_alive_count,
                }),
            );
        }
        service::CREATE_MONITORED_ITEMS => {
            let request: CreateMonitoredItemsRequest = decode_request(&body)?;
            if !state
                .subscriptions
                .lock()
                .contains_key(&request.subscription_id)
            {
                reply(
                    tx,
                    request_id,
                    encode_service_fault(handle, StatusCode::BAD_SUBSCRIPTION_ID_INVALID),
                );
                return Ok(());
            }
            let mut results = Vec::with_capacity(request.items_to_create.len());
            for item in request.items_to_create {
                let node_id = item.item_to_monitor.node_id;
                let current = state.values.lock().get(&node_id).cloned();
                let Some(current) = current else {
                    results.push(MonitoredItemCreateResult {
                        status_code: StatusCode::BAD_NODE_ID_UNKNOWN,
                        ..Default::default()
                    });
                    continue;
                };
                let client_handle = item.requested_parameters.client_handle;
                if let Some(subscription) =
                    state.subscriptions.lock().get_mut(&request.subscription_id)
                {
                    subscription.items.push((client_handle, node_id));
                    // Servers report the current value first.
                    subscription.queue.push(MonitoredItemNotification {
                        client_handle,
                        value: current,
                    });
                }
                results.push(MonitoredItemCreateResult {
                    status_code: StatusCode::GOOD,
                    monitored_item_id: state.next_id(),
                    revised_sampling_interval: item.requested_parameters.sampling_interval,
                    revised_queue_size: item.requested_parameters.queue_size,
                    ..Default::default()
                });
            }
            release_held_publishes(state);
            reply(
                tx,
                request_id,
                encode_response(&CreateMonitoredItemsResponse {
                    response_header: ok,
                    results,
                    diagnostic_infos: vec![],
                }),
            );
        }
        service::DELETE_SUBSCRIPTIONS => {
            let request: DeleteSubscriptionsRequest = decode_request(&body)?;
            let results = request
                .subscription_ids
                .iter()
                .map(|id| match state.subscriptions.lock().remove(id) {
                    Some(_) => StatusCode::GOOD,
                    None => StatusCode::BAD_SUBSCRIPTION_ID_INVALID,
                })
                .collect();
            reply(
                tx,
                request_id,
                encode_response(&DeleteSubscriptionsResponse {
                    response_header: ok,
                    results,
                    diagnostic_infos: vec![],
                }),
            );
        }
        service::PUBLISH => {
            let request: PublishRequest = decode_request(&body)?;
            state.acknowledgements.lock().extend(
                request
                    .subscription_acknowledgements
                    .iter()
                    .map(|ack| (ack.subscription_id, ack.sequence_number)),
            );
            let ack_results = vec![StatusCode::GOOD; request.subscription_acknowledgements.len()];
            if state.behavior.lock().hold_publish {
                state.held_publishes.lock().push(HeldPublish {
                    session: header.authentication_token,
                    handle,
                    ack_results,
                    request_id,
                    tx: tx.clone(),
                });
                return Ok(());
            }
            tokio::spawn(publish(
                Arc::clone(state),
                header.authentication_token,
                handle,
                ack_results,
                request_id,
                tx.clone(),
            ));
        }
        _ => reply(
            tx,
            request_id,
            encode_service_fault(handle, StatusCode::BAD_SERVICE_UNSUPPORTED),
        ),
    }
    Ok(())
}

/// Answers a Publish with queued notifications or, after the keep-alive
/// period, a keep-alive.
async fn publish(
    state: Arc<ServerState>,
    session: NodeId,
    handle: u32,
    ack_results: Vec<StatusCode>,
    request_id: u32,
    tx: Sender,
) {
    let keep_alive = state
        .subscriptions
        .lock()
        .values()
        .filter(|s| s.session == session)
        .map(|s| s.keep_alive)
        .min();
    let Some(keep_alive) = keep_alive else {
        reply(
            &tx,
            request_id,
            encode_service_fault(handle, StatusCode::BAD_NO_SUBSCRIPTION),
        );
        return;
    };
    let deadline = Instant::now() + keep_alive;

    loop {
        if tx.is_closed() {
            return;
        }
        let due = Instant::now() >= deadline;
        let ready = ready_response(&state, &session, handle, &ack_results, due);
        if let Some(response) = ready {
            reply(&tx, request_id, encode_response(&response));
            return;
        }
        if state
            .subscriptions
            .lock()
            .values()
            .all(|s| s.session != session)
        {
            reply(
                &tx,
                request_id,
                encode_service_fault(handle, StatusCode::BAD_NO_SUBSCRIPTION),
            );
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Takes the queued notifications of one subscription of `session`, or a
/// keep-alive when `due`.
fn ready_response(
    state: &ServerState,
    session: &NodeId,
    handle: u32,
    ack_results: &[StatusCode],
    due: bool,
) -> Option<PublishResponse> {
    let mut subscriptions = state.subscriptions.lock();
    subscriptions
        .iter_mut()
        .filter(|(_, s)| s.session == *session)
        .find(|(_, s)| due || !s.queue.is_empty())
        .map(|(id, s)| {
            let notification_data = if s.queue.is_empty() {
                Vec::new()
            } else {
                s.sequence += 1;
                vec![
                    DataChangeNotification {
                        monitored_items: std::mem::take(&mut s.queue),
                        diagnostic_infos: vec![],
                    }
                    .to_extension_object(),
                ]
            };
            let sequence_number = if notification_data.is_empty() {
                s.sequence + 1
            } else {
                s.sequence
            };
            PublishResponse {
                response_header: ResponseHeader::for_request(handle, StatusCode::GOOD),
                subscription_id: *id,
                available_sequence_numbers: if notification_data.is_empty() {
                    vec![]
                } else {
                    vec![sequence_number]
                },
                more_notifications: false,
                notification_message: NotificationMessage {
                    sequence_number,
                    publish_time: Some(Utc::now()),
                    notification_data,
                },
                results: ack_results.to_vec(),
                diagnostic_infos: vec![],
            }
        })
}

/// Answers held Publish requests with whatever is queued now and lets
/// later ones through.
fn release_held_publishes(state: &Arc<ServerState>) {
    let held = {
        let mut behavior = state.behavior.lock();
        if !behavior.hold_publish {
            return;
        }
        behavior.hold_publish = false;
        std::mem::take(&mut *state.held_publishes.lock())
    };
    for publish_request in held {
        match ready_response(
            state,
            &publish_request.session,
            publish_request.handle,
            &publish_request.ack_results,
            false,
        ) {
            Some(response) => reply(
                &publish_request.tx,
                publish_request.request_id,
                encode_response(&response),
            ),
            None => {
                tokio::spawn(publish(
                    Arc::clone(state),
                    publish_request.session,
                    publish_request.handle,
                    publish_request.ack_results,
                    publish_request.request_id,
                    publish_request.tx,
                ));
            }
        }
    }
}
