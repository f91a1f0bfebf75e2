// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Connection
//!
//! One established, handshaken link to a peer. The owning [`Node`]
//! drives the read loop and is the only party that closes connections,
//! so disconnect notifications fire exactly once.
//!
//! [`Node`]: super::node::Node

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::address::Address;
use super::error::NetworkError;
use super::framing::{EnvelopeSocket, ReceivedEnvelope};
use super::message::{EnvelopePayload, NetworkEnvelope, Ping, Pong};
use super::metrics::ConnectionMetrics;

/// Which side opened the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionDirection {
    Outbound,
    Inbound,
}

/// Why a connection was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseReason {
    /// The owning node is shutting down.
    Shutdown,
    /// The peer ended the stream.
    ClosedByPeer,
    ReadError,
    WriteError,
    HandshakeRejected,
    Banned,
    /// Closed on request of the application.
    Explicit,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::Shutdown => "shutdown",
            CloseReason::ClosedByPeer => "closed by peer",
            CloseReason::ReadError => "read error",
            CloseReason::WriteError => "write error",
            CloseReason::HandshakeRejected => "handshake rejected",
            CloseReason::Banned => "banned",
            CloseReason::Explicit => "explicit",
        };
        f.write_str(s)
    }
}

pub struct Connection {
    id: String,
    node_id: String,
    peer_address: Address,
    peer_node_id: Option<String>,
    direction: ConnectionDirection,
    socket: EnvelopeSocket,
    metrics: ConnectionMetrics,
    close_reason: Mutex<Option<CloseReason>>,
    pending_pings: Mutex<HashMap<u64, Instant>>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("node_id", &self.node_id)
            .field("peer_address", &self.peer_address)
            .field("direction", &self.direction)
            .field("close_reason", &*self.close_reason.lock())
            .finish()
    }
}

impl Connection {
    pub(crate) fn new(
        node_id: &str,
        peer_address: Address,
        peer_node_id: Option<String>,
        direction: ConnectionDirection,
        socket: EnvelopeSocket,
    ) -> Self {
        Connection {
            id: uuid::Uuid::new_v4().to_string(),
            node_id: node_id.to_string(),
            peer_address,
            peer_node_id,
            direction,
            socket,
            metrics: ConnectionMetrics::new(),
            close_reason: Mutex::new(None),
            pending_pings: Mutex::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Id of the local node owning this connection.
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn peer_address(&self) -> &Address {
        &self.peer_address
    }

    /// Node id the peer announced in its handshake.
    pub fn peer_node_id(&self) -> Option<&str> {
        self.peer_node_id.as_deref()
    }

    pub fn direction(&self) -> ConnectionDirection {
        self.direction
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == ConnectionDirection::Outbound
    }

    pub fn metrics(&self) -> &ConnectionMetrics {
        &self.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.close_reason.lock().is_some()
    }

    pub fn close_reason(&self) -> Option<CloseReason> {
        *self.close_reason.lock()
    }

    /// Writes `payload` to the peer and records the send in the metrics.
    ///
    /// Callers normally go through `Node::send_on`, which also closes the
    /// connection when the write fails.
    pub(crate) fn send(&self, payload: EnvelopePayload) -> Result<(), NetworkError> {
        if self.is_closed() {
            return Err(NetworkError::ConnectionClosed);
        }
        let envelope = NetworkEnvelope::new(payload);
        let started = Instant::now();
        let size = self.socket.send(&envelope)?;
        self.metrics
            .record_sent(size, started.elapsed(), Instant::now());
        Ok(())
    }

    pub(crate) fn receive_next(&self) -> Result<Option<ReceivedEnvelope>, NetworkError> {
        let received = self.socket.receive_next()?;
        if let Some(r) = &received {
            self.metrics
                .record_received(r.size, r.deserialize_time, Instant::now());
        }
        Ok(received)
    }

    /// Sends a ping; the matching pong adds an RTT sample to the metrics.
    pub fn ping(&self) -> Result<u64, NetworkError> {
        let nonce = rand::random::<u64>();
        self.pending_pings.lock().insert(nonce, Instant::now());
        if let Err(e) = self.send(EnvelopePayload::Ping(Ping { nonce })) {
            self.pending_pings.lock().remove(&nonce);
            return Err(e);
        }
        Ok(nonce)
    }

    /// Matches a pong to its ping. Unsolicited pongs are ignored.
    pub(crate) fn on_pong(&self, pong: &Pong) -> Option<Duration> {
        let sent = self.pending_pings.lock().remove(&pong.request_nonce)?;
        let rtt = sent.elapsed();
        self.metrics.add_rtt(rtt);
        Some(rtt)
    }

    pub(crate) fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), NetworkError> {
        self.socket.set_read_timeout(timeout)
    }

    /// Marks the connection closed and shuts the socket down.
    /// Returns `false` if it was already closed.
    pub(crate) fn mark_closed(&self, reason: CloseReason) -> bool {
        {
            let mut close_reason = self.close_reason.lock();
            if close_reason.is_some() {
                return false;
            }
            *close_reason = Some(reason);
        }
        self.pending_pings.lock().clear();
        self.socket.close();
        true
    }
}
