// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Message Types
//!
//! Wire protocol messages exchanged between nodes.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::address::Address;
use super::error::NetworkError;
use crate::confidential::ConfidentialMessage;

/// Unique message identifier for acknowledgment tracking.
pub type MessageId = String;

/// Wire protocol version.
pub const PROTOCOL_VERSION: u8 = 1;

/// Unit of wire transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEnvelope {
    /// Protocol version for compatibility checking.
    pub version: u8,
    pub payload: EnvelopePayload,
}

impl NetworkEnvelope {
    pub fn new(payload: EnvelopePayload) -> Self {
        NetworkEnvelope {
            version: PROTOCOL_VERSION,
            payload,
        }
    }

    /// Serialized body size in bytes, excluding the frame length prefix.
    pub fn serialized_size(&self) -> u64 {
        bincode::serialized_size(self).unwrap_or(0)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, NetworkError> {
        Ok(bincode::serialize(self)?)
    }

    /// Parses an envelope and rejects unsupported protocol versions.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetworkError> {
        let envelope: NetworkEnvelope = bincode::deserialize(bytes)
            .map_err(|e| NetworkError::InvalidMessage(e.to_string()))?;
        if envelope.version != PROTOCOL_VERSION {
            return Err(NetworkError::InvalidMessage(format!(
                "Unsupported protocol version: {} (expected {})",
                envelope.version, PROTOCOL_VERSION
            )));
        }
        Ok(envelope)
    }
}

/// Messages carried inside an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EnvelopePayload {
    /// Connection setup, first frame in each direction.
    Handshake(ConnectionHandshake),
    /// Keep-alive probe used for RTT sampling.
    Ping(Ping),
    Pong(Pong),
    /// Encrypted and signed wrapper around another payload.
    Confidential(ConfidentialMessage),
    /// Domain message; its schema belongs to the application layer.
    Application(ApplicationMessage),
}

impl EnvelopePayload {
    /// Mailbox metadata if this payload may be stored and forwarded.
    pub fn mailbox_meta_data(&self) -> Option<&MetaData> {
        match self {
            EnvelopePayload::Application(msg) => msg.mailbox.as_ref(),
            _ => None,
        }
    }

    pub fn is_mailbox_message(&self) -> bool {
        self.mailbox_meta_data().is_some()
    }

    /// Message id if the sender wants delivery status reported.
    pub fn ack_request_id(&self) -> Option<&str> {
        match self {
            EnvelopePayload::Application(msg) if msg.requests_ack => Some(&msg.message_id),
            _ => None,
        }
    }

    /// Short variant name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EnvelopePayload::Handshake(_) => "Handshake",
            EnvelopePayload::Ping(_) => "Ping",
            EnvelopePayload::Pong(_) => "Pong",
            EnvelopePayload::Confidential(_) => "Confidential",
            EnvelopePayload::Application(_) => "Application",
        }
    }
}

/// Opaque application payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationMessage {
    pub message_id: MessageId,
    /// Routing key for the application layer (e.g. "trade.offer").
    pub topic: String,
    pub body: Vec<u8>,
    /// Present for messages that may fall back to mailbox delivery.
    pub mailbox: Option<MetaData>,
    /// Whether the sender tracks the delivery status of this message.
    pub requests_ack: bool,
}

impl ApplicationMessage {
    /// Creates a direct-only message with a fresh id.
    pub fn new(topic: impl Into<String>, body: Vec<u8>) -> Self {
        ApplicationMessage {
            message_id: uuid::Uuid::new_v4().to_string(),
            topic: topic.into(),
            body,
            mailbox: None,
            requests_ack: false,
        }
    }

    /// Allows mailbox fallback with the given metadata.
    pub fn with_mailbox(mut self, meta_data: MetaData) -> Self {
        self.mailbox = Some(meta_data);
        self
    }

    pub fn with_ack_request(mut self) -> Self {
        self.requests_ack = true;
        self
    }
}

impl From<ApplicationMessage> for EnvelopePayload {
    fn from(msg: ApplicationMessage) -> Self {
        EnvelopePayload::Application(msg)
    }
}

/// Storage hints used when a message is persisted as mailbox data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetaData {
    /// Time to live in milliseconds.
    pub ttl_ms: u64,
    /// Higher values are kept longer under storage pressure.
    pub priority: u8,
    /// Name of the payload type, for store-side bookkeeping.
    pub class_name: String,
}

impl MetaData {
    /// Ten days, the usual lifetime of trade-related mailbox entries.
    pub const DEFAULT_TTL_MS: u64 = 10 * 24 * 60 * 60 * 1000;

    pub fn new(class_name: impl Into<String>) -> Self {
        MetaData {
            ttl_ms: Self::DEFAULT_TTL_MS,
            priority: 0,
            class_name: class_name.into(),
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Whether an entry created at `created_ms` (unix millis) has expired.
    pub fn is_expired(&self, created_ms: u64) -> bool {
        self.is_expired_at(created_ms, now_millis())
    }

    pub fn is_expired_at(&self, created_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(created_ms) > self.ttl_ms
    }
}

/// First frame sent by each side of a new connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionHandshake {
    pub node_id: String,
    /// Advertised server address; `None` for nodes without a server.
    pub address: Option<Address>,
    pub protocol_version: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub nonce: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    pub request_nonce: u64,
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
