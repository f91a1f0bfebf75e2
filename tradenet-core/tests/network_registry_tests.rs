// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for network::registry and network::node over loopback TCP

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tradenet_core::network::{
    Address, ApplicationMessage, BannedAddresses, ClearNetTransport, CloseReason, Connection,
    ConnectionDirection, EnvelopePayload, NetworkError, Node, NodeListener, NodeState, NodesById,
    RegistryConfig, RegistryListener, SendTarget,
};

use common::fixtures::{
    eventually, recv_within, registry, registry_with, unreachable_address, ChannelListener,
};

const WAIT: Duration = Duration::from_secs(5);

fn application(body: &[u8]) -> EnvelopePayload {
    EnvelopePayload::Application(ApplicationMessage::new("offers", body.to_vec()))
}

#[derive(Default)]
struct CountingListener {
    added: AtomicUsize,
    removed: AtomicUsize,
    disconnects: AtomicUsize,
}

impl RegistryListener for CountingListener {
    fn on_node_added(&self, _node: &Arc<Node>) {
        self.added.fetch_add(1, Ordering::SeqCst);
    }

    fn on_node_removed(&self, _node: &Arc<Node>) {
        self.removed.fetch_add(1, Ordering::SeqCst);
    }
}

impl NodeListener for CountingListener {
    fn on_message(&self, _payload: &EnvelopePayload, _connection: &Arc<Connection>, _node_id: &str) {}

    fn on_disconnect(&self, _connection: &Arc<Connection>, _reason: CloseReason) {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocks the node's shutdown thread.
struct HangingShutdown(Duration);

impl NodeListener for HangingShutdown {
    fn on_message(&self, _payload: &EnvelopePayload, _connection: &Arc<Connection>, _node_id: &str) {}

    fn on_shutdown(&self, _node: &Arc<Node>) {
        std::thread::sleep(self.0);
    }
}

// =============================================================================
// Node lifecycle
// =============================================================================

#[test]
fn test_concurrent_get_or_create_yields_one_node() {
    let registry = registry();
    let counter = Arc::new(CountingListener::default());
    registry.add_listener(counter.clone());

    let nodes: Vec<Arc<Node>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| registry.get_or_create("default").unwrap()))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert!(nodes.iter().all(|n| Arc::ptr_eq(n, &nodes[0])));
    assert_eq!(counter.added.load(Ordering::SeqCst), 1);
    assert_eq!(registry.all_nodes().len(), 1);
}

#[test]
fn test_initialize_is_idempotent() {
    let registry = registry();
    let node = registry.initialize("default", 0).unwrap();
    let address = node.find_my_address().unwrap();

    registry.initialize("default", 0).unwrap();

    assert_eq!(node.state(), NodeState::Running);
    assert_eq!(registry.find_my_address("default"), Some(address));
}

#[test]
fn test_initialization_queries() {
    let registry = registry();
    registry.get_or_create("idle").unwrap();
    registry.initialize("live", 0).unwrap();

    assert!(!registry.is_node_initialized("idle"));
    assert!(registry.is_node_initialized("live"));
    assert!(!registry.is_node_initialized("unknown"));
    assert!(matches!(
        registry.assert_node_initialized("idle"),
        Err(NetworkError::NotInitialized(_))
    ));

    let addresses = registry.addresses_by_node_id();
    assert_eq!(addresses.len(), 1);
    assert!(addresses.contains_key("live"));
}

#[test]
fn test_send_from_uninitialized_node_fails() {
    let registry = registry();
    let result = registry.send(
        "idle",
        application(b"hi"),
        SendTarget::Address(&Address::localhost(1)),
    );
    assert!(matches!(result, Err(NetworkError::NotInitialized(_))));
}

// =============================================================================
// Connections and messages
// =============================================================================

#[tokio::test]
async fn test_message_reaches_node_listener() {
    let registry = registry();
    let (listener, mut rx) = ChannelListener::<(EnvelopePayload, String)>::new();
    registry.add_node_listener(listener);
    registry.initialize("alice", 0).unwrap();
    let bob = registry.initialize("bob", 0).unwrap();
    let bob_address = bob.find_my_address().unwrap();

    let connection = registry
        .send("alice", application(b"offer"), SendTarget::Address(&bob_address))
        .unwrap();
    assert_eq!(connection.direction(), ConnectionDirection::Outbound);
    assert_eq!(connection.peer_node_id(), Some("bob"));

    let (payload, node_id) = recv_within(&mut rx, WAIT).await.unwrap();
    assert_eq!(payload, application_with_id(&payload, b"offer"));
    assert_eq!(node_id, "bob");
}

/// Application messages carry a random id; compare everything else.
fn application_with_id(received: &EnvelopePayload, body: &[u8]) -> EnvelopePayload {
    match received {
        EnvelopePayload::Application(msg) => {
            let mut expected = ApplicationMessage::new("offers", body.to_vec());
            expected.message_id = msg.message_id.clone();
            EnvelopePayload::Application(expected)
        }
        other => panic!("Expected application message, got {:?}", other),
    }
}

#[tokio::test]
async fn test_reply_reuses_inbound_connection() {
    let registry = registry();
    let alice = registry.initialize("alice", 0).unwrap();
    let bob = registry.initialize("bob", 0).unwrap();
    let alice_address = alice.find_my_address().unwrap();
    let bob_address = bob.find_my_address().unwrap();

    alice.send(application(b"ping"), &bob_address).unwrap();
    assert!(eventually(WAIT, || bob.find_connection(&alice_address).is_some()).await);

    let inbound = bob.find_connection(&alice_address).unwrap();
    assert_eq!(inbound.direction(), ConnectionDirection::Inbound);
    let reply = bob.send(application(b"pong"), &alice_address).unwrap();
    assert_eq!(reply.id(), inbound.id());
}

#[tokio::test]
async fn test_closed_connection_is_not_returned() {
    let registry = registry();
    let alice = registry.initialize("alice", 0).unwrap();
    let bob = registry.initialize("bob", 0).unwrap();
    let bob_address = bob.find_my_address().unwrap();

    let first = alice.get_connection(&bob_address).unwrap();
    alice.close_connection(&first, CloseReason::Explicit);

    assert!(first.is_closed());
    assert_eq!(first.close_reason(), Some(CloseReason::Explicit));
    assert!(alice.find_connection(&bob_address).is_none());
    assert_eq!(
        alice.send_on(application(b"late"), &first).err(),
        Some(NetworkError::ConnectionClosed)
    );

    let second = alice.get_connection(&bob_address).unwrap();
    assert_ne!(first.id(), second.id());
}

#[tokio::test]
async fn test_disconnect_notified_once() {
    let registry = registry();
    let counter = Arc::new(CountingListener::default());
    let alice = registry.initialize("alice", 0).unwrap();
    alice.add_listener(counter.clone());
    let bob = registry.initialize("bob", 0).unwrap();

    let connection = alice.get_connection(&bob.find_my_address().unwrap()).unwrap();
    alice.close_connection(&connection, CloseReason::Explicit);
    alice.close_connection(&connection, CloseReason::Explicit);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(counter.disconnects.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_connection_stays_with_its_owning_node() {
    let registry = registry();
    let counter = Arc::new(CountingListener::default());
    let alice = registry.initialize("alice", 0).unwrap();
    alice.add_listener(counter.clone());
    let bob = registry.initialize("bob", 0).unwrap();
    let carol = registry.initialize("carol", 0).unwrap();
    let bob_address = bob.find_my_address().unwrap();

    let connection = alice.get_connection(&bob_address).unwrap();

    let sent = registry.send(
        "carol",
        application(b"not mine"),
        SendTarget::Connection(&connection),
    );
    assert!(matches!(sent, Err(NetworkError::ConnectionFailed(_))));
    carol.close_connection(&connection, CloseReason::Explicit);

    assert!(!connection.is_closed());
    // Only the handshake went out.
    assert_eq!(connection.metrics().num_messages_sent(), 1);

    alice.close_connection(&connection, CloseReason::Explicit);

    assert!(alice.find_connection(&bob_address).is_none());
    assert_eq!(alice.num_connections(), 0);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(counter.disconnects.load(Ordering::SeqCst), 1);
    assert_eq!(connection.close_reason(), Some(CloseReason::Explicit));
}

#[test]
fn test_dial_locks_released_after_dialing() {
    let registry = registry();
    let alice = registry.initialize("alice", 0).unwrap();
    let bob = registry.initialize("bob", 0).unwrap();

    alice.get_connection(&bob.find_my_address().unwrap()).unwrap();
    assert_eq!(alice.num_pending_dials(), 0);

    assert!(alice.get_connection(&unreachable_address()).is_err());
    assert_eq!(alice.num_pending_dials(), 0);
}

#[tokio::test]
async fn test_peer_close_detected() {
    let registry = registry();
    let alice = registry.initialize("alice", 0).unwrap();
    let bob = registry.initialize("bob", 0).unwrap();
    let alice_address = alice.find_my_address().unwrap();

    let outbound = alice.get_connection(&bob.find_my_address().unwrap()).unwrap();
    assert!(eventually(WAIT, || bob.find_connection(&alice_address).is_some()).await);
    let inbound = bob.find_connection(&alice_address).unwrap();

    bob.close_connection(&inbound, CloseReason::Explicit);

    assert!(eventually(WAIT, || outbound.is_closed()).await);
    assert_eq!(outbound.close_reason(), Some(CloseReason::ClosedByPeer));
}

#[tokio::test]
async fn test_ping_records_rtt() {
    let registry = registry();
    let alice = registry.initialize("alice", 0).unwrap();
    let bob = registry.initialize("bob", 0).unwrap();

    let connection = alice.get_connection(&bob.find_my_address().unwrap()).unwrap();
    connection.ping().unwrap();

    assert!(eventually(WAIT, || connection.metrics().num_rtt_samples() == 1).await);
    assert_eq!(alice.network_load().num_connections, 1);
}

#[tokio::test]
async fn test_metrics_count_sent_messages() {
    let registry = registry();
    let alice = registry.initialize("alice", 0).unwrap();
    let bob = registry.initialize("bob", 0).unwrap();
    let bob_address = bob.find_my_address().unwrap();

    let connection = alice.send(application(b"one"), &bob_address).unwrap();
    alice.send(application(b"two"), &bob_address).unwrap();

    // Handshake plus two messages
    assert_eq!(connection.metrics().num_messages_sent(), 3);
    assert!(connection.metrics().sent_bytes_of_last_hour() > 0);
    assert_eq!(alice.network_load().num_messages_sent_of_last_hour, 3);
}

#[test]
fn test_banned_peer_is_not_dialed() {
    let bans = Arc::new(BannedAddresses::new());
    let registry = NodesById::with_ban_list(
        RegistryConfig::default(),
        Arc::new(ClearNetTransport::new()),
        bans.clone(),
    );
    registry.initialize("alice", 0).unwrap();
    let bob = registry.initialize("bob", 0).unwrap();
    let bob_address = bob.find_my_address().unwrap();
    bans.ban(bob_address.clone());

    let result = registry.get_connection("alice", &bob_address);
    assert!(matches!(result, Err(NetworkError::Banned(_))));
}

#[test]
fn test_unreachable_peer_fails() {
    let registry = registry();
    registry.initialize("alice", 0).unwrap();
    let result = registry.get_connection("alice", &common::fixtures::unreachable_address());
    assert!(matches!(result, Err(NetworkError::ConnectionFailed(_))));
}

// =============================================================================
// Shutdown
// =============================================================================

#[tokio::test]
async fn test_shutdown_closes_everything() {
    let registry = registry();
    let counter = Arc::new(CountingListener::default());
    registry.add_listener(counter.clone());
    let alice = registry.initialize("alice", 0).unwrap();
    let bob = registry.initialize("bob", 0).unwrap();
    let connection = alice.get_connection(&bob.find_my_address().unwrap()).unwrap();

    assert!(registry.shutdown().await);

    assert!(registry.all_nodes().is_empty());
    assert_eq!(alice.state(), NodeState::Terminated);
    assert_eq!(bob.state(), NodeState::Terminated);
    assert!(connection.is_closed());
    assert_eq!(counter.removed.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_registry_refuses_nodes_after_shutdown() {
    let registry = registry();
    registry.initialize("alice", 0).unwrap();
    assert!(registry.shutdown().await);

    assert_eq!(
        registry.get_or_create("alice").err(),
        Some(NetworkError::RegistryShutDown)
    );
}

#[tokio::test]
async fn test_shutdown_is_bounded_by_timeout() {
    let registry = registry_with(RegistryConfig {
        shutdown_timeout_ms: 200,
        ..RegistryConfig::default()
    });
    let node = registry.initialize("stuck", 0).unwrap();
    node.add_listener(Arc::new(HangingShutdown(Duration::from_secs(5))));

    let started = Instant::now();
    let completed = registry.shutdown().await;

    assert!(!completed);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert!(registry.all_nodes().is_empty());
}

#[tokio::test]
async fn test_repeated_shutdown_reports_first_outcome() {
    let registry = registry_with(RegistryConfig {
        shutdown_timeout_ms: 200,
        ..RegistryConfig::default()
    });
    let node = registry.initialize("stuck", 0).unwrap();
    node.add_listener(Arc::new(HangingShutdown(Duration::from_secs(5))));

    assert!(!registry.shutdown().await);
    assert!(!registry.shutdown().await);

    let clean = common::fixtures::registry();
    clean.initialize("alice", 0).unwrap();
    assert!(clean.shutdown().await);
    assert!(clean.shutdown().await);
}

#[tokio::test]
async fn test_node_shutdown_removes_it_from_registry() {
    let registry = registry();
    let node = registry.initialize("alice", 0).unwrap();

    assert!(node.shutdown().await);

    assert!(registry.find_node("alice").is_none());
    assert!(matches!(
        node.initialize(0),
        Err(NetworkError::NotInitialized(_))
    ));
}
