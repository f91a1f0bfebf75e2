// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Collaborator Seams
//!
//! The confidential service depends on three external components: the
//! distributed mailbox store, the local key store and the delivery status
//! tracker. Their internals live elsewhere; only the contracts are here.

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::delivery::DeliveryStatus;
use super::message::MailboxData;
use crate::crypto::{KeyPair, PubKey};
use crate::network::ListenerId;

/// Errors reported by a mailbox store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Broadcast failed: {0}")]
    BroadcastFailed(String),

    #[error("Not authorized to modify entry")]
    Unauthorized,

    #[error("Entry not found")]
    NotFound,
}

/// Outcome of replicating a store change to peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastResult {
    /// Peers the change was sent to.
    pub num_peers: usize,
}

/// Completion of a store broadcast.
pub type BroadcastFuture = BoxFuture<'static, Result<BroadcastResult, StoreError>>;

/// Generic signed entry of the distributed store. Only mailbox entries are
/// relevant here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedData {
    pub class_name: String,
    pub payload: Vec<u8>,
}

/// Distributed store holding mailbox entries for offline receivers.
pub trait MailboxStore: Send + Sync {
    /// Stores `data`, signed by the sender, and starts replicating it.
    fn add_mailbox_data(
        &self,
        data: MailboxData,
        sender_key_pair: &KeyPair,
        receiver_public_key: &PubKey,
    ) -> BroadcastFuture;

    /// Removes `data`; only the receiver (its owner) may do so.
    fn remove_mailbox_data(&self, data: &MailboxData, owner_key_pair: &KeyPair) -> BroadcastFuture;

    fn add_listener(&self, listener: Arc<dyn MailboxStoreListener>) -> ListenerId;

    fn remove_listener(&self, id: ListenerId) -> bool;
}

/// Observer of store additions, local or replicated from peers.
pub trait MailboxStoreListener: Send + Sync {
    fn on_mailbox_data_added(&self, data: &MailboxData);

    fn on_authenticated_data_added(&self, _data: &AuthenticatedData) {}
}

/// Lookup of the local identity key pairs.
pub trait KeyPairStore: Send + Sync {
    fn find_key_pair(&self, key_id: &str) -> Option<Arc<KeyPair>>;
}

/// Receives the send status of messages that requested an acknowledgment.
pub trait DeliveryStatusTracker: Send + Sync {
    fn on_message_sent_status(&self, message_id: &str, status: DeliveryStatus);
}
