// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

use serde::{Deserialize, Serialize};

use super::store::BroadcastFuture;

/// How far a confidential send got.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeliveryStatus {
    /// Written to a live connection to the receiver.
    Arrived,
    /// Receiver unreachable; the message was handed to the mailbox store.
    AddedToMailbox,
    Failed,
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeliveryStatus::Arrived => "ARRIVED",
            DeliveryStatus::AddedToMailbox => "ADDED_TO_MAILBOX",
            DeliveryStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// Result of `ConfidentialMessageService::send`.
///
/// For [`DeliveryStatus::AddedToMailbox`] the store replication may still
/// be running; await [`DeliveryResult::take_mailbox_broadcast`] to observe
/// it.
pub struct DeliveryResult {
    status: DeliveryStatus,
    error_message: Option<String>,
    mailbox_broadcast: Option<BroadcastFuture>,
}

impl fmt::Debug for DeliveryResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryResult")
            .field("status", &self.status)
            .field("error_message", &self.error_message)
            .field("has_mailbox_broadcast", &self.mailbox_broadcast.is_some())
            .finish()
    }
}

impl DeliveryResult {
    pub fn arrived() -> Self {
        DeliveryResult {
            status: DeliveryStatus::Arrived,
            error_message: None,
            mailbox_broadcast: None,
        }
    }

    pub fn added_to_mailbox(broadcast: BroadcastFuture) -> Self {
        DeliveryResult {
            status: DeliveryStatus::AddedToMailbox,
            error_message: None,
            mailbox_broadcast: Some(broadcast),
        }
    }

    pub fn failed(error_message: impl Into<String>) -> Self {
        DeliveryResult {
            status: DeliveryStatus::Failed,
            error_message: Some(error_message.into()),
            mailbox_broadcast: None,
        }
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Takes the pending mailbox broadcast, if any.
    pub fn take_mailbox_broadcast(&mut self) -> Option<BroadcastFuture> {
        self.mailbox_broadcast.take()
    }
}
