// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Client scenarios against the in-process test server.

mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{MockServer, demo_node, service, wait_until};
use ualink_opcua::client::{BrowseOptions, ChannelCallback, DataChange, OpcUaClient, RetryConfig};
use ualink_opcua::error::{ConnectionError, OpcUaError};
use ualink_opcua::types::{NodeId, OpcUaDataType, ServerState};
use ualink_opcua::value::OpcUaValue;
use ualink_opcua::{StatusCode, TransportState};

async fn connected(server: &MockServer) -> OpcUaClient {
    let client = OpcUaClient::new(server.config());
    client.connect().await.unwrap();
    client
}

async fn next_change(rx: &mut tokio::sync::mpsc::Receiver<DataChange>) -> DataChange {
    tokio::time::timeout(Duration::from_secs(3), rx.recv())
        .await
        .expect("no data change within 3s")
        .expect("callback channel closed")
}

// =============================================================================
// Connection and session
// =============================================================================

#[tokio::test]
async fn test_connect_read_disconnect() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    assert!(client.is_connected());
    assert!(client.session_id().is_some());
    assert_eq!(server.session_count(), 1);

    let value = client.read("ns=3;s=Demo.UInt32").await.unwrap();
    assert_eq!(value.value, OpcUaValue::UInt32(7));
    assert!(value.is_good());

    client.disconnect().await;
    assert_eq!(client.transport_state(), TransportState::Disconnected);
    assert!(wait_until(Duration::from_secs(1), || server.session_count() == 0).await);
    assert_eq!(server.requests(service::CLOSE_SESSION), 1);
}

#[tokio::test]
async fn test_hello_rejected() {
    let server = MockServer::start().await;
    server.reject_hello(StatusCode::BAD_TCP_SERVER_TOO_BUSY);

    let client = OpcUaClient::with_retry(server.config(), RetryConfig::no_retry());
    let err = client.connect().await.unwrap_err();
    assert!(matches!(
        err,
        OpcUaError::Connection(ConnectionError::ServerError { .. })
    ));
    assert_eq!(err.status_code(), Some(StatusCode::BAD_TCP_SERVER_TOO_BUSY));
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_channel_renewal_keeps_channel() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let before = client.channel_token().unwrap();
    let after = client.renew_channel().await.unwrap();
    assert_eq!(after.channel_id, before.channel_id);
    assert_ne!(after.token_id, before.token_id);
    assert_eq!(server.requests(service::OPEN_SECURE_CHANNEL), 1);

    let value = client.read("ns=3;s=Demo.Int32").await.unwrap();
    assert_eq!(value.value, OpcUaValue::Int32(-5));
}

#[tokio::test]
async fn test_reconnect_resumes_session() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let session_id = client.session_id();

    server.drop_connections();
    assert!(
        wait_until(Duration::from_secs(5), || server.connections() == 2
            && client.is_connected())
        .await
    );

    assert_eq!(client.session_id(), session_id);
    assert_eq!(client.stats().reconnections(), 1);
    assert_eq!(server.requests(service::CREATE_SESSION), 1);
    assert_eq!(server.requests(service::ACTIVATE_SESSION), 2);

    let value = client.read("ns=3;s=Demo.Double").await.unwrap();
    assert_eq!(value.value, OpcUaValue::Double(1.5));
}

// =============================================================================
// Read / Write
// =============================================================================

#[tokio::test]
async fn test_read_unknown_node() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let node = NodeId::string(3, "Demo.Missing");

    let result = client.read_value(&node).await.unwrap();
    assert_eq!(result.status, StatusCode::BAD_NODE_ID_UNKNOWN);
    assert!(!result.is_good());

    let err = client.read("ns=3;s=Demo.Missing").await.unwrap_err();
    assert_eq!(err.status_code(), Some(StatusCode::BAD_NODE_ID_UNKNOWN));
}

#[tokio::test]
async fn test_read_many_keeps_order() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let nodes = [demo_node("String"), demo_node("Boolean"), demo_node("Int32")];
    let results = client.read_values(&nodes).await.unwrap();
    let values: Vec<_> = results.into_iter().map(|r| r.value).collect();
    assert_eq!(
        values,
        vec![
            OpcUaValue::String("hello".into()),
            OpcUaValue::Boolean(false),
            OpcUaValue::Int32(-5),
        ]
    );
}

#[tokio::test]
async fn test_read_as_converts() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let value = client
        .read_as(&demo_node("UInt32"), OpcUaDataType::Double)
        .await
        .unwrap();
    assert_eq!(value, OpcUaValue::Double(7.0));
}

#[tokio::test]
async fn test_write_typed() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let node = demo_node("Boolean");

    let result = client.write_typed(&node, "on", "bool").await.unwrap();
    assert!(result.is_good());
    assert_eq!(server.value(&node), Some(OpcUaValue::Boolean(true)));

    let result = client.write_typed(&demo_node("Int32"), "-42", "int32").await.unwrap();
    assert!(result.is_good());
    assert_eq!(server.value(&demo_node("Int32")), Some(OpcUaValue::Int32(-42)));
    assert_eq!(client.stats().writes(), 2);
}

#[tokio::test]
async fn test_write_rejected_by_server() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let node = demo_node("Double");
    server.make_read_only(node.clone());

    let result = client.write_value(&node, OpcUaValue::Double(2.0)).await.unwrap();
    assert_eq!(result.status, StatusCode::BAD_NOT_WRITABLE);
    assert!(result.check().is_err());
    assert_eq!(server.value(&node), Some(OpcUaValue::Double(1.5)));
}

#[tokio::test]
async fn test_large_values_span_chunks() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let node = demo_node("String");

    let big = "x".repeat(100_000);
    server.set_value(node.clone(), big.clone());
    let value = client.read_value(&node).await.unwrap();
    assert_eq!(value.value, OpcUaValue::String(big));

    let upload = "y".repeat(50_000);
    let result = client
        .write_value(&node, OpcUaValue::String(upload.clone()))
        .await
        .unwrap();
    assert!(result.is_good());
    assert_eq!(server.value(&node), Some(OpcUaValue::String(upload)));
}

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn test_timeout_discards_late_response() {
    let server = MockServer::start().await;
    let mut config = server.config();
    config.request_timeout = Duration::from_millis(200);
    let client = OpcUaClient::new(config);
    client.connect().await.unwrap();

    let slow = demo_node("Double");
    server.delay_reads(slow.clone(), Duration::from_millis(500));

    let err = client.read_value(&slow).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Timeout(_)));
    assert_eq!(client.dispatcher_stats().timeouts(), 1);

    assert!(
        wait_until(Duration::from_secs(2), || client
            .dispatcher_stats()
            .late_responses()
            == 1)
        .await
    );
    assert!(client.is_connected());
    let value = client.read("ns=3;s=Demo.UInt32").await.unwrap();
    assert_eq!(value.value, OpcUaValue::UInt32(7));
}

#[tokio::test]
async fn test_concurrent_requests_complete_out_of_order() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    server.delay_reads(demo_node("Double"), Duration::from_millis(400));

    let slow_client = client.clone();
    let started = Instant::now();
    let slow = tokio::spawn(async move { slow_client.read_value(&demo_node("Double")).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    let fast = client.read_value(&demo_node("Int32")).await.unwrap();
    let fast_elapsed = started.elapsed();
    assert_eq!(fast.value, OpcUaValue::Int32(-5));
    assert!(fast_elapsed < Duration::from_millis(350));

    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.value, OpcUaValue::Double(1.5));
    assert_eq!(client.dispatcher_stats().late_responses(), 0);
}

#[tokio::test]
async fn test_service_fault() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    server.fault_service(service::READ, StatusCode::BAD_TOO_MANY_OPERATIONS);

    let err = client.read_value(&demo_node("Int32")).await.unwrap_err();
    assert!(matches!(err, OpcUaError::Service(_)));
    assert_eq!(err.status_code(), Some(StatusCode::BAD_TOO_MANY_OPERATIONS));
    assert!(client.is_connected());

    server.clear_faults();
    assert!(client.read_value(&demo_node("Int32")).await.unwrap().is_good());
}

// =============================================================================
// Browse / server info
// =============================================================================

#[tokio::test]
async fn test_browse_follows_continuation_points() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let parent = NodeId::string(3, "Demo.Folder");
    server.add_children(&parent, &["A", "B", "C", "D", "E"]);

    let options = BrowseOptions::default().with_max_references(2);
    let page = client.browse(&parent, &options).await.unwrap();
    assert_eq!(page.references.len(), 2);
    assert!(page.has_more());

    let all = client.browse_all(&parent, &options).await.unwrap();
    let names: Vec<_> = all
        .iter()
        .filter_map(|r| r.browse_name.name.as_deref())
        .collect();
    assert_eq!(names, ["A", "B", "C", "D", "E"]);

    // The first page's point is still held; release it.
    let point = page.continuation_point.unwrap();
    let released = client.browse_next(&parent, &point, true).await.unwrap();
    assert!(released.references.is_empty());
    assert_eq!(server.continuation_points(), 0);
}

#[tokio::test]
async fn test_browse_unknown_node() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let result = client
        .browse(&NodeId::string(3, "Demo.Nowhere"), &BrowseOptions::default())
        .await;
    assert_eq!(
        result.unwrap_err().status_code(),
        Some(StatusCode::BAD_NODE_ID_UNKNOWN)
    );
}

#[tokio::test]
async fn test_server_info() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let info = client.server_info().await.unwrap();
    assert_eq!(info.state, ServerState::Running);
    assert_eq!(info.product(), "Mock Server 1.0.0");
    assert_eq!(info.server_array, vec!["urn:ualink:mock".to_string()]);
    assert!(info.start_time.is_some());
}

// =============================================================================
// Subscriptions
// =============================================================================

#[tokio::test]
async fn test_watch_delivers_changes() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let node = demo_node("UInt32");

    let (callback, mut rx) = ChannelCallback::with_channel(16);
    let watch = client.watch(&[node.clone()], Arc::new(callback)).await.unwrap();
    assert_eq!(watch.items.len(), 1);
    assert!(watch.failures.is_empty());

    // The initial value only primes the filter.
    assert!(
        wait_until(Duration::from_secs(2), || client.subscription_stats().suppressed() == 1).await
    );

    server.set_value(node.clone(), 8u32);
    let change = next_change(&mut rx).await;
    assert_eq!(change.node_id, node);
    assert_eq!(change.value.value, OpcUaValue::UInt32(8));
    assert_eq!(change.subscription_id, watch.subscription_id);

    // Same value again is not reported.
    server.set_value(node.clone(), 8u32);
    server.set_value(node.clone(), 9u32);
    let change = next_change(&mut rx).await;
    assert_eq!(change.value.value, OpcUaValue::UInt32(9));

    assert!(wait_until(Duration::from_secs(2), || !server.acknowledgements().is_empty()).await);
}

#[tokio::test]
async fn test_initial_value_ahead_of_monitor_response() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let node = demo_node("UInt32");
    server.hold_publish_until_monitored();

    let (callback, mut rx) = ChannelCallback::with_channel(16);
    let id = client
        .subscribe(&client.config().subscription, Arc::new(callback))
        .await
        .unwrap();
    assert!(wait_until(Duration::from_secs(2), || server.requests(service::PUBLISH) >= 1).await);

    client
        .monitor(id, &node, &client.config().monitored_item)
        .await
        .unwrap();

    // Delivered before the CreateMonitoredItems response, still routed.
    assert!(
        wait_until(Duration::from_secs(2), || client.subscription_stats().suppressed() == 1).await
    );

    server.set_value(node.clone(), 11u32);
    let change = next_change(&mut rx).await;
    assert_eq!(change.node_id, node);
    assert_eq!(change.value.value, OpcUaValue::UInt32(11));
}

#[tokio::test]
async fn test_own_write_echo_suppressed() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let node = demo_node("Int32");

    let (callback, mut rx) = ChannelCallback::with_channel(16);
    client.watch(&[node.clone()], Arc::new(callback)).await.unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || client.subscription_stats().suppressed() == 1).await
    );

    client.write_value(&node, OpcUaValue::Int32(42)).await.unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || client.subscription_stats().suppressed() == 2).await
    );

    server.set_value(node.clone(), 43i32);
    let change = next_change(&mut rx).await;
    assert_eq!(change.value.value, OpcUaValue::Int32(43));
}

#[tokio::test]
async fn test_watch_reports_failed_items() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let (callback, _rx) = ChannelCallback::with_channel(4);
    let missing = NodeId::string(3, "Demo.Missing");
    let watch = client
        .watch(&[demo_node("Boolean"), missing.clone()], Arc::new(callback))
        .await
        .unwrap();
    assert_eq!(watch.items.len(), 1);
    assert_eq!(watch.failures.len(), 1);
    assert_eq!(watch.failures[0].0, missing);
}

#[tokio::test]
async fn test_keep_alives_without_changes() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let (callback, _rx) = ChannelCallback::with_channel(4);
    client
        .watch(&[demo_node("Boolean")], Arc::new(callback))
        .await
        .unwrap();
    assert!(
        wait_until(Duration::from_secs(3), || client.subscription_stats().keep_alives() >= 2)
            .await
    );
}

#[tokio::test]
async fn test_unsubscribe() {
    let server = MockServer::start().await;
    let client = connected(&server).await;

    let (callback, _rx) = ChannelCallback::with_channel(4);
    let watch = client
        .watch(&[demo_node("Boolean")], Arc::new(callback))
        .await
        .unwrap();
    assert_eq!(server.subscription_count(), 1);

    client.unsubscribe(watch.subscription_id).await.unwrap();
    assert_eq!(server.subscription_count(), 0);
    assert_eq!(client.subscriptions().subscription_count(), 0);
}

#[tokio::test]
async fn test_reconnect_recreates_session_and_subscriptions() {
    let server = MockServer::start().await;
    let client = connected(&server).await;
    let node = demo_node("UInt32");
    let first_session = client.session_id();

    let (callback, mut rx) = ChannelCallback::with_channel(16);
    let watch = client.watch(&[node.clone()], Arc::new(callback)).await.unwrap();
    assert!(
        wait_until(Duration::from_secs(2), || client.subscription_stats().suppressed() == 1).await
    );

    server.forget_sessions();
    server.drop_connections();
    assert!(
        wait_until(Duration::from_secs(5), || server.connections() == 2
            && client.is_connected()
            && server.subscription_count() == 1)
        .await
    );
    assert_ne!(client.session_id(), first_session);
    assert_eq!(server.requests(service::CREATE_SESSION), 2);

    // The re-sent initial value equals the last seen one and is dropped.
    server.set_value(node.clone(), 99u32);
    let change = next_change(&mut rx).await;
    assert_eq!(change.subscription_id, watch.subscription_id);
    assert_eq!(change.value.value, OpcUaValue::UInt32(99));
}
