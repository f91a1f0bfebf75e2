// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Confidential Messaging
//!
//! End-to-end encrypted and signed delivery between key pairs, with a
//! store-and-forward fallback through the mailbox store.

pub mod config;
pub mod delivery;
pub mod error;
pub mod message;
pub mod service;
pub mod store;

pub use crate::crypto::ConfidentialData;
pub use config::ConfidentialConfig;
pub use delivery::{DeliveryResult, DeliveryStatus};
pub use error::ConfidentialError;
pub use message::{ConfidentialMessage, MailboxData};
pub use service::{
    ConfidentialMessageListener, ConfidentialMessageService, ConfidentialMessageServiceBuilder,
    MessageListener,
};
pub use store::{
    AuthenticatedData, BroadcastFuture, BroadcastResult, DeliveryStatusTracker, KeyPairStore,
    MailboxStore, MailboxStoreListener, StoreError,
};
