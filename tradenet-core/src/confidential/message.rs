// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Confidential wire types.

use serde::{Deserialize, Serialize};

use crate::crypto::{ConfidentialData, KeyId};
use crate::network::message::now_millis;
use crate::network::MetaData;

/// Encrypted payload addressed to the holder of `receiver_key_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidentialMessage {
    pub confidential_data: ConfidentialData,
    pub receiver_key_id: KeyId,
}

impl ConfidentialMessage {
    pub fn new(confidential_data: ConfidentialData, receiver_key_id: impl Into<KeyId>) -> Self {
        ConfidentialMessage {
            confidential_data,
            receiver_key_id: receiver_key_id.into(),
        }
    }
}

/// A confidential message parked in the distributed mailbox store until
/// its receiver comes online.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxData {
    pub confidential_message: ConfidentialMessage,
    pub meta_data: MetaData,
    /// Creation time in Unix milliseconds.
    pub created_ms: u64,
}

impl MailboxData {
    pub fn new(confidential_message: ConfidentialMessage, meta_data: MetaData) -> Self {
        MailboxData {
            confidential_message,
            meta_data,
            created_ms: now_millis(),
        }
    }

    pub fn receiver_key_id(&self) -> &str {
        &self.confidential_message.receiver_key_id
    }

    pub fn is_expired(&self) -> bool {
        self.meta_data.is_expired(self.created_ms)
    }
}
