// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Proptest Strategies
//!
//! Reusable proptest strategies for property-based testing.

use proptest::prelude::*;
use tradenet_core::network::{ApplicationMessage, EnvelopePayload, MetaData};

// ============================================================
// Payload Strategies
// ============================================================

/// Topic names as used by application services.
pub fn topic_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_.]{0,31}"
}

/// Message bodies, including empty ones.
pub fn body_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..2048)
}

/// Application payloads with and without mailbox metadata.
pub fn application_payload_strategy() -> impl Strategy<Value = EnvelopePayload> {
    (topic_strategy(), body_strategy(), any::<bool>(), any::<bool>()).prop_map(
        |(topic, body, mailbox, ack)| {
            let mut message = ApplicationMessage::new(topic, body);
            if mailbox {
                message = message.with_mailbox(MetaData::new("TradeMessage"));
            }
            if ack {
                message = message.with_ack_request();
            }
            EnvelopePayload::Application(message)
        },
    )
}

// ============================================================
// Metrics Strategies
// ============================================================

/// Sends as (minute offset, bytes) pairs within the bucket cap.
pub fn traffic_strategy() -> impl Strategy<Value = Vec<(u64, u64)>> {
    prop::collection::vec((0u64..600, 1u64..100_000), 1..64)
}
