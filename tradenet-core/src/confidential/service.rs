// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Confidential Message Service
//!
//! Sends payloads encrypted and signed for one receiver, falling back to
//! the mailbox store when the receiver cannot be reached, and decrypts
//! inbound confidential messages from peers or from the store.
//!
//! Decryption runs on a dedicated runtime and listener callbacks on a
//! separate dispatch runtime, so slow handlers never hold up decryption
//! and network reader threads never block on either.

use std::sync::{Arc, Weak};

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::delivery::{DeliveryResult, DeliveryStatus};
use super::error::ConfidentialError;
use super::message::{ConfidentialMessage, MailboxData};
use super::store::{DeliveryStatusTracker, KeyPairStore, MailboxStore, MailboxStoreListener};
use crate::crypto::{decrypt_and_verify, encrypt_and_sign, KeyPair, PubKey, PublicKey};
use crate::network::{
    Address, Connection, EnvelopePayload, ListenerId, Listeners, MetaData, NetworkError,
    NodeListener, NodesById, SendTarget,
};

/// Receives decrypted payloads.
pub trait MessageListener: Send + Sync {
    fn on_message(&self, payload: &EnvelopePayload);
}

/// Receives decrypted payloads together with the sender's signing key.
pub trait ConfidentialMessageListener: Send + Sync {
    fn on_message(&self, payload: &EnvelopePayload, sender: &PublicKey);
}

#[derive(Default)]
struct Registrations {
    node_listener: Option<ListenerId>,
    store_listener: Option<ListenerId>,
}

pub struct ConfidentialMessageService {
    nodes_by_id: Arc<NodesById>,
    key_pair_store: Arc<dyn KeyPairStore>,
    mailbox_store: Option<Arc<dyn MailboxStore>>,
    delivery_tracker: Option<Arc<dyn DeliveryStatusTracker>>,
    decrypt_pool: Handle,
    dispatcher: Handle,
    listeners: Arc<Listeners<dyn MessageListener>>,
    confidential_listeners: Arc<Listeners<dyn ConfidentialMessageListener>>,
    registrations: Mutex<Registrations>,
}

/// Builder for [`ConfidentialMessageService`].
pub struct ConfidentialMessageServiceBuilder {
    nodes_by_id: Arc<NodesById>,
    key_pair_store: Arc<dyn KeyPairStore>,
    decrypt_pool: Handle,
    dispatcher: Handle,
    mailbox_store: Option<Arc<dyn MailboxStore>>,
    delivery_tracker: Option<Arc<dyn DeliveryStatusTracker>>,
}

impl ConfidentialMessageServiceBuilder {
    /// Enables the mailbox fallback and the mailbox receive path.
    pub fn mailbox_store(mut self, store: Arc<dyn MailboxStore>) -> Self {
        self.mailbox_store = Some(store);
        self
    }

    pub fn delivery_tracker(mut self, tracker: Arc<dyn DeliveryStatusTracker>) -> Self {
        self.delivery_tracker = Some(tracker);
        self
    }

    /// Creates the service and subscribes it to node messages and mailbox
    /// additions.
    pub fn build(self) -> Arc<ConfidentialMessageService> {
        let service = Arc::new(ConfidentialMessageService {
            nodes_by_id: self.nodes_by_id,
            key_pair_store: self.key_pair_store,
            mailbox_store: self.mailbox_store,
            delivery_tracker: self.delivery_tracker,
            decrypt_pool: self.decrypt_pool,
            dispatcher: self.dispatcher,
            listeners: Arc::new(Listeners::new()),
            confidential_listeners: Arc::new(Listeners::new()),
            registrations: Mutex::new(Registrations::default()),
        });

        let events = Arc::new(InboundEvents {
            service: Arc::downgrade(&service),
        });
        let node_listener = service.nodes_by_id.add_node_listener(events.clone());
        let store_listener = service
            .mailbox_store
            .as_ref()
            .map(|store| store.add_listener(events));
        *service.registrations.lock() = Registrations {
            node_listener: Some(node_listener),
            store_listener,
        };
        service
    }
}

impl ConfidentialMessageService {
    /// `decrypt_pool` runs decryption, `dispatcher` runs listener
    /// callbacks.
    pub fn builder(
        nodes_by_id: Arc<NodesById>,
        key_pair_store: Arc<dyn KeyPairStore>,
        decrypt_pool: Handle,
        dispatcher: Handle,
    ) -> ConfidentialMessageServiceBuilder {
        ConfidentialMessageServiceBuilder {
            nodes_by_id,
            key_pair_store,
            decrypt_pool,
            dispatcher,
            mailbox_store: None,
            delivery_tracker: None,
        }
    }

    /// Unsubscribes from nodes and the store and drops all listeners.
    pub fn shutdown(&self) -> bool {
        let registrations = std::mem::take(&mut *self.registrations.lock());
        if let Some(id) = registrations.node_listener {
            self.nodes_by_id.remove_node_listener(id);
        }
        if let (Some(id), Some(store)) = (registrations.store_listener, &self.mailbox_store) {
            store.remove_listener(id);
        }
        self.listeners.clear();
        self.confidential_listeners.clear();
        debug!("Confidential message service shut down");
        true
    }

    // === Sending ===

    /// Encrypts `payload` for `receiver` and sends it from `sender_node_id`
    /// to `address`.
    ///
    /// Encryption always happens first, so a crypto failure is an `Err`
    /// and nothing touches the network. Network failures are reported in
    /// the returned result: mailbox payloads are handed to the mailbox
    /// store, everything else fails.
    pub fn send(
        &self,
        payload: &EnvelopePayload,
        address: &Address,
        receiver: &PubKey,
        sender_key_pair: &KeyPair,
        sender_node_id: &str,
    ) -> Result<DeliveryResult, ConfidentialError> {
        self.send_to(
            payload,
            SendTarget::Address(address),
            receiver,
            sender_key_pair,
            sender_node_id,
        )
    }

    /// Same as [`send`](Self::send) over an existing connection.
    pub fn send_on_connection(
        &self,
        payload: &EnvelopePayload,
        connection: &Arc<Connection>,
        receiver: &PubKey,
        sender_key_pair: &KeyPair,
        sender_node_id: &str,
    ) -> Result<DeliveryResult, ConfidentialError> {
        self.send_to(
            payload,
            SendTarget::Connection(connection),
            receiver,
            sender_key_pair,
            sender_node_id,
        )
    }

    fn send_to(
        &self,
        payload: &EnvelopePayload,
        target: SendTarget<'_>,
        receiver: &PubKey,
        sender_key_pair: &KeyPair,
        sender_node_id: &str,
    ) -> Result<DeliveryResult, ConfidentialError> {
        let message = seal(payload, receiver, sender_key_pair)?;

        let sent = self
            .nodes_by_id
            .assert_node_initialized(sender_node_id)
            .and_then(|_| {
                self.nodes_by_id.send(
                    sender_node_id,
                    EnvelopePayload::Confidential(message.clone()),
                    target,
                )
            });
        let result = match sent {
            Ok(connection) => {
                debug!(
                    "Sent {} to {}",
                    payload.kind(),
                    connection.peer_address()
                );
                DeliveryResult::arrived()
            }
            Err(e) => self.on_send_failed(payload, message, e, receiver, sender_key_pair),
        };

        self.report_status(payload, result.status());
        Ok(result)
    }

    fn on_send_failed(
        &self,
        payload: &EnvelopePayload,
        message: ConfidentialMessage,
        error: NetworkError,
        receiver: &PubKey,
        sender_key_pair: &KeyPair,
    ) -> DeliveryResult {
        match payload.mailbox_meta_data() {
            Some(meta_data) => {
                info!(
                    "Sending {} failed ({}), trying to add it to the mailbox",
                    payload.kind(),
                    error
                );
                self.store_in_mailbox(message, meta_data.clone(), receiver, sender_key_pair)
            }
            None => {
                warn!(
                    "Sending {} failed and it is not a mailbox message: {}",
                    payload.kind(),
                    error
                );
                DeliveryResult::failed(format!(
                    "Sending message failed and message is not a mailbox message: {}",
                    error
                ))
            }
        }
    }

    fn store_in_mailbox(
        &self,
        message: ConfidentialMessage,
        meta_data: MetaData,
        receiver: &PubKey,
        sender_key_pair: &KeyPair,
    ) -> DeliveryResult {
        let Some(store) = &self.mailbox_store else {
            warn!("No mailbox store available, message is lost");
            return DeliveryResult::failed("Mailbox store not available");
        };
        let data = MailboxData::new(message, meta_data);
        DeliveryResult::added_to_mailbox(store.add_mailbox_data(data, sender_key_pair, receiver))
    }

    fn report_status(&self, payload: &EnvelopePayload, status: DeliveryStatus) {
        if let (Some(tracker), Some(message_id)) = (&self.delivery_tracker, payload.ack_request_id())
        {
            tracker.on_message_sent_status(message_id, status);
        }
    }

    // === Receiving ===

    /// Decrypts `message` if one of our key pairs is the receiver and
    /// dispatches the payload to listeners.
    ///
    /// Resolves to `Ok(false)` when the message is for someone else, and
    /// to `Ok(true)` once decryption succeeded; callbacks run afterwards on
    /// the dispatch runtime.
    pub fn process_confidential_message(
        &self,
        message: ConfidentialMessage,
    ) -> BoxFuture<'static, Result<bool, ConfidentialError>> {
        self.process(message, None)
    }

    fn process(
        &self,
        message: ConfidentialMessage,
        mailbox_data: Option<MailboxData>,
    ) -> BoxFuture<'static, Result<bool, ConfidentialError>> {
        let Some(key_pair) = self.key_pair_store.find_key_pair(&message.receiver_key_id) else {
            debug!(
                "No key pair for receiver key id {}, message is not for us",
                message.receiver_key_id
            );
            return future::ready(Ok(false)).boxed();
        };

        let dispatcher = self.dispatcher.clone();
        let listeners = Arc::clone(&self.listeners);
        let confidential_listeners = Arc::clone(&self.confidential_listeners);
        let mailbox_store = self.mailbox_store.clone();

        let task = self.decrypt_pool.spawn(async move {
            info!("Found a matching key for processing confidential message");
            let (payload, sender) = open(&message, &key_pair).map_err(|e| {
                error!("Could not open confidential message: {}", e);
                e
            })?;
            info!("Decrypted {} from {}", payload.kind(), sender.fingerprint());

            if let (Some(data), Some(store)) = (mailbox_data, mailbox_store) {
                let removal = store.remove_mailbox_data(&data, &key_pair);
                dispatcher.spawn(async move {
                    if let Err(e) = removal.await {
                        warn!("Removing mailbox entry failed: {}", e);
                    }
                });
            }

            dispatcher.spawn(async move {
                listeners.for_each(|l| l.on_message(&payload));
                confidential_listeners.for_each(|l| l.on_message(&payload, &sender));
            });
            Ok::<_, ConfidentialError>(true)
        });

        task.map(|joined| match joined {
            Ok(result) => result,
            Err(e) => Err(ConfidentialError::WorkerFailed(e.to_string())),
        })
        .boxed()
    }

    // === Listeners ===

    pub fn add_message_listener(&self, listener: Arc<dyn MessageListener>) -> ListenerId {
        self.listeners.add(listener)
    }

    pub fn remove_message_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove(id)
    }

    pub fn add_confidential_message_listener(
        &self,
        listener: Arc<dyn ConfidentialMessageListener>,
    ) -> ListenerId {
        self.confidential_listeners.add(listener)
    }

    pub fn remove_confidential_message_listener(&self, id: ListenerId) -> bool {
        self.confidential_listeners.remove(id)
    }
}

fn seal(
    payload: &EnvelopePayload,
    receiver: &PubKey,
    sender_key_pair: &KeyPair,
) -> Result<ConfidentialMessage, ConfidentialError> {
    let plaintext = bincode::serialize(payload)?;
    let data = encrypt_and_sign(&plaintext, receiver, sender_key_pair).map_err(|e| {
        error!("Encrypting {} failed: {}", payload.kind(), e);
        e
    })?;
    Ok(ConfidentialMessage::new(data, receiver.key_id()))
}

fn open(
    message: &ConfidentialMessage,
    key_pair: &KeyPair,
) -> Result<(EnvelopePayload, PublicKey), ConfidentialError> {
    let plaintext = decrypt_and_verify(&message.confidential_data, key_pair)?;
    let payload = bincode::deserialize(&plaintext)?;
    Ok((payload, message.confidential_data.sender_public_key))
}

/// Routes node messages and mailbox additions into the service.
struct InboundEvents {
    service: Weak<ConfidentialMessageService>,
}

impl NodeListener for InboundEvents {
    fn on_message(&self, payload: &EnvelopePayload, _connection: &Arc<Connection>, _node_id: &str) {
        if let (EnvelopePayload::Confidential(message), Some(service)) =
            (payload, self.service.upgrade())
        {
            // Outcome is logged by the decrypt task.
            drop(service.process_confidential_message(message.clone()));
        }
    }
}

impl MailboxStoreListener for InboundEvents {
    fn on_mailbox_data_added(&self, data: &MailboxData) {
        if let Some(service) = self.service.upgrade() {
            drop(service.process(data.confidential_message.clone(), Some(data.clone())));
        }
    }
}
