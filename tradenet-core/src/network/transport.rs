// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Transport Trait
//!
//! Abstraction over how a node binds its server and reaches peers.
//! Tor and I2P transports bootstrap their own proxies and live outside
//! this crate; [`ClearNetTransport`] covers plain TCP.

use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use super::address::{Address, TransportType};
use super::error::NetworkError;

/// A bound listening socket and the address peers should use for it.
#[derive(Debug)]
pub struct ServerSocket {
    listener: TcpListener,
    address: Address,
}

impl ServerSocket {
    pub fn new(listener: TcpListener, address: Address) -> Self {
        ServerSocket { listener, address }
    }

    /// Advertised address (may differ from the local bind address for
    /// hidden services).
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        Ok(self.listener.local_addr()?)
    }

    pub(crate) fn into_listener(self) -> TcpListener {
        self.listener
    }
}

/// Transport used by a node.
///
/// Implementations block the calling thread while binding or connecting.
pub trait TransportService: Send + Sync {
    fn transport_type(&self) -> TransportType;

    /// Binds the server for `node_id` on `port` (0 picks a free port).
    fn bind(&self, node_id: &str, port: u16) -> Result<ServerSocket, NetworkError>;

    /// Opens a stream to `address`, giving up after `timeout`.
    fn connect(&self, address: &Address, timeout: Duration) -> Result<TcpStream, NetworkError>;
}

/// Plain TCP transport.
#[derive(Debug, Clone)]
pub struct ClearNetTransport {
    bind_host: String,
}

impl Default for ClearNetTransport {
    fn default() -> Self {
        ClearNetTransport {
            bind_host: "127.0.0.1".to_string(),
        }
    }
}

impl ClearNetTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds servers on `bind_host` instead of the loopback interface.
    pub fn with_bind_host(bind_host: &str) -> Self {
        ClearNetTransport {
            bind_host: bind_host.to_string(),
        }
    }
}

impl TransportService for ClearNetTransport {
    fn transport_type(&self) -> TransportType {
        TransportType::ClearNet
    }

    fn bind(&self, node_id: &str, port: u16) -> Result<ServerSocket, NetworkError> {
        let listener = TcpListener::bind((self.bind_host.as_str(), port))
            .map_err(|e| NetworkError::ConnectionFailed(format!("bind failed: {}", e)))?;
        let local = listener.local_addr()?;
        debug!(node_id, local = %local, "Bound clear-net server");
        Ok(ServerSocket::new(
            listener,
            Address::new(self.bind_host.clone(), local.port()),
        ))
    }

    fn connect(&self, address: &Address, timeout: Duration) -> Result<TcpStream, NetworkError> {
        if !address.is_clear_net() {
            return Err(NetworkError::ConnectionFailed(format!(
                "{} transport cannot reach {}",
                TransportType::ClearNet,
                address
            )));
        }

        let candidates = address
            .socket_addr_string()
            .to_socket_addrs()
            .map_err(|e| NetworkError::InvalidAddress(format!("{}: {}", address, e)))?;

        let mut last_error = NetworkError::InvalidAddress(format!("{}: no addresses", address));
        for candidate in candidates {
            match TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    return Ok(stream);
                }
                Err(e) => last_error = NetworkError::ConnectionFailed(e.to_string()),
            }
        }
        Err(last_error)
    }
}
