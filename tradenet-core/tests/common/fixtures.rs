// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Test Fixtures
//!
//! In-memory stand-ins for the mailbox store, key store and delivery
//! tracker, plus registry helpers bound to loopback ports.

use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, FutureExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tradenet_core::confidential::{
    BroadcastFuture, BroadcastResult, ConfidentialMessageListener, DeliveryStatus,
    DeliveryStatusTracker, KeyPairStore, MailboxData, MailboxStore, MailboxStoreListener,
    MessageListener, StoreError,
};
use tradenet_core::crypto::{KeyPair, PubKey, PublicKey};
use tradenet_core::network::{
    Address, ClearNetTransport, Connection, EnvelopePayload, ListenerId, Listeners, NodeListener,
    NodesById, RegistryConfig,
};

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn registry() -> Arc<NodesById> {
    registry_with(RegistryConfig::default())
}

pub fn registry_with(config: RegistryConfig) -> Arc<NodesById> {
    init_tracing();
    NodesById::new(config, Arc::new(ClearNetTransport::new()))
}

/// A loopback address nobody listens on.
pub fn unreachable_address() -> Address {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    Address::localhost(port)
}

/// Polls `condition` until it holds or `timeout` passes.
pub async fn eventually(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================================
// Key Store
// ============================================================

#[derive(Default)]
pub struct InMemoryKeyPairStore {
    key_pairs: Mutex<HashMap<String, Arc<KeyPair>>>,
}

impl InMemoryKeyPairStore {
    pub fn with(key_pair: Arc<KeyPair>) -> Arc<Self> {
        let store = Self::default();
        store
            .key_pairs
            .lock()
            .insert(key_pair.key_id().to_string(), key_pair);
        Arc::new(store)
    }
}

impl KeyPairStore for InMemoryKeyPairStore {
    fn find_key_pair(&self, key_id: &str) -> Option<Arc<KeyPair>> {
        self.key_pairs.lock().get(key_id).cloned()
    }
}

// ============================================================
// Mailbox Store
// ============================================================

/// Mailbox store that keeps entries in memory and notifies listeners
/// synchronously, as if replication had already happened.
#[derive(Default)]
pub struct InMemoryMailboxStore {
    entries: Mutex<Vec<MailboxData>>,
    removed: Mutex<Vec<MailboxData>>,
    listeners: Listeners<dyn MailboxStoreListener>,
}

impl InMemoryMailboxStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<MailboxData> {
        self.entries.lock().clone()
    }

    pub fn num_removed(&self) -> usize {
        self.removed.lock().len()
    }

    /// Simulates an entry arriving from a peer.
    pub fn publish(&self, data: MailboxData) {
        self.entries.lock().push(data.clone());
        self.listeners.for_each(|l| l.on_mailbox_data_added(&data));
    }
}

impl MailboxStore for InMemoryMailboxStore {
    fn add_mailbox_data(
        &self,
        data: MailboxData,
        _sender_key_pair: &KeyPair,
        receiver_public_key: &PubKey,
    ) -> BroadcastFuture {
        assert_eq!(data.receiver_key_id(), receiver_public_key.key_id());
        self.publish(data);
        future::ready(Ok(BroadcastResult { num_peers: 1 })).boxed()
    }

    fn remove_mailbox_data(&self, data: &MailboxData, owner_key_pair: &KeyPair) -> BroadcastFuture {
        if data.receiver_key_id() != owner_key_pair.key_id() {
            return future::ready(Err(StoreError::Unauthorized)).boxed();
        }
        let mut entries = self.entries.lock();
        let Some(index) = entries.iter().position(|e| e == data) else {
            return future::ready(Err(StoreError::NotFound)).boxed();
        };
        let removed = entries.remove(index);
        self.removed.lock().push(removed);
        future::ready(Ok(BroadcastResult { num_peers: 1 })).boxed()
    }

    fn add_listener(&self, listener: Arc<dyn MailboxStoreListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }
}

// ============================================================
// Delivery Tracker
// ============================================================

#[derive(Default)]
pub struct RecordingTracker {
    statuses: Mutex<Vec<(String, DeliveryStatus)>>,
}

impl RecordingTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn statuses(&self) -> Vec<(String, DeliveryStatus)> {
        self.statuses.lock().clone()
    }
}

impl DeliveryStatusTracker for RecordingTracker {
    fn on_message_sent_status(&self, message_id: &str, status: DeliveryStatus) {
        self.statuses.lock().push((message_id.to_string(), status));
    }
}

// ============================================================
// Listeners
// ============================================================

/// Forwards every callback into an unbounded channel.
pub struct ChannelListener<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> ChannelListener<T> {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelListener { tx }), rx)
    }
}

impl MessageListener for ChannelListener<EnvelopePayload> {
    fn on_message(&self, payload: &EnvelopePayload) {
        let _ = self.tx.send(payload.clone());
    }
}

impl ConfidentialMessageListener for ChannelListener<(EnvelopePayload, PublicKey)> {
    fn on_message(&self, payload: &EnvelopePayload, sender: &PublicKey) {
        let _ = self.tx.send((payload.clone(), *sender));
    }
}

impl NodeListener for ChannelListener<(EnvelopePayload, String)> {
    fn on_message(&self, payload: &EnvelopePayload, _connection: &Arc<Connection>, node_id: &str) {
        let _ = self.tx.send((payload.clone(), node_id.to_string()));
    }
}

/// Receives the next value or gives up after `timeout`.
pub async fn recv_within<T>(rx: &mut mpsc::UnboundedReceiver<T>, timeout: Duration) -> Option<T> {
    tokio::time::timeout(timeout, rx.recv()).await.ok().flatten()
}
