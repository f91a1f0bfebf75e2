// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tradenet Core Library
//!
//! Peer-to-peer transport and confidential messaging for a trading
//! network: local node registry, framed peer connections with traffic
//! metrics, and end-to-end encrypted messages with mailbox fallback.
//! All signing and key derivation use the audited `ring` crate.

pub mod confidential;
pub mod crypto;
pub mod network;
mod serde_arrays;

pub use confidential::{
    ConfidentialError, ConfidentialMessage, ConfidentialMessageService, DeliveryResult,
    DeliveryStatus, MailboxData, MailboxStore,
};
pub use crypto::{ConfidentialData, CryptoError, KeyPair, PubKey, PublicKey, Signature};
pub use network::{
    Address, ClearNetTransport, Connection, ConnectionMetrics, EnvelopePayload, NetworkEnvelope,
    NetworkError, Node, NodesById, RegistryConfig, TransportType,
};
