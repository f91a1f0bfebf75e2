// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network + Transport Layer
//!
//! Node identities, peer connections and the envelope wire format.
//!
//! # Architecture
//!
//! - **Registry** ([`NodesById`]): owns all local nodes, keyed by node id
//! - **Node**: one server plus its live connections
//! - **Connection**: a handshaken link carrying length-prefixed envelopes
//! - **Transport trait**: how servers are bound and peers are reached
//! - **Metrics**: per-connection traffic counters in minute buckets
//!
//! # Example
//!
//! ```ignore
//! use tradenet_core::network::{
//!     Address, ClearNetTransport, EnvelopePayload, NodesById, RegistryConfig, SendTarget,
//! };
//!
//! let registry = NodesById::new(RegistryConfig::default(), Arc::new(ClearNetTransport::new()));
//! registry.initialize("default", 0)?;
//! registry.send("default", payload, SendTarget::Address(&peer))?;
//! ```

pub mod address;
pub mod ban;
pub mod config;
pub mod connection;
pub mod error;
pub mod framing;
pub mod listeners;
pub mod message;
pub mod metrics;
pub mod node;
pub mod registry;
pub mod transport;

pub use address::{Address, TransportType};
pub use ban::{BanList, BannedAddresses, NoBans};
pub use config::{NodeConfig, RegistryConfig};
pub use connection::{CloseReason, Connection, ConnectionDirection};
pub use error::NetworkError;
pub use framing::{
    encode_frame, read_frame, write_frame, EnvelopeSocket, ReceivedEnvelope,
    DEFAULT_MAX_FRAME_SIZE, FRAME_HEADER_SIZE,
};
pub use listeners::{ListenerId, Listeners};
pub use message::{
    ApplicationMessage, ConnectionHandshake, EnvelopePayload, MessageId, MetaData,
    NetworkEnvelope, Ping, Pong, PROTOCOL_VERSION,
};
pub use metrics::{ConnectionMetrics, NetworkLoad, MAX_MINUTE_BUCKETS};
pub use node::{Node, NodeListener, NodeState};
pub use registry::{NodesById, RegistryListener, SendTarget};
pub use transport::{ClearNetTransport, ServerSocket, TransportService};
