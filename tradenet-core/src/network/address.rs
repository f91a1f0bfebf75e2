// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Peer Addresses
//!
//! Transport-qualified peer locators. The transport is derived from the
//! host: `.onion` hosts are Tor hidden services, `.i2p` hosts are I2P
//! destinations, anything else is clear-net.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::NetworkError;

/// Transport a peer is reachable over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransportType {
    #[default]
    ClearNet,
    Tor,
    I2P,
}

impl TransportType {
    fn for_host(host: &str) -> Self {
        if host.ends_with(".onion") {
            TransportType::Tor
        } else if host.ends_with(".i2p") {
            TransportType::I2P
        } else {
            TransportType::ClearNet
        }
    }
}

impl fmt::Display for TransportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportType::ClearNet => f.write_str("clear"),
            TransportType::Tor => f.write_str("tor"),
            TransportType::I2P => f.write_str("i2p"),
        }
    }
}

/// Immutable peer locator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    host: String,
    port: u16,
}

impl Address {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Address {
            host: host.into(),
            port,
        }
    }

    pub fn localhost(port: u16) -> Self {
        Address::new("127.0.0.1", port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn transport_type(&self) -> TransportType {
        TransportType::for_host(&self.host)
    }

    pub fn is_clear_net(&self) -> bool {
        self.transport_type() == TransportType::ClearNet
    }

    /// `host:port` form for socket APIs; IPv6 hosts are bracketed.
    pub fn socket_addr_string(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

impl From<std::net::SocketAddr> for Address {
    fn from(addr: std::net::SocketAddr) -> Self {
        Address::new(addr.ip().to_string(), addr.port())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.socket_addr_string())
    }
}

impl FromStr for Address {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let colon = s
            .rfind(':')
            .ok_or_else(|| NetworkError::InvalidAddress(format!("missing port: {}", s)))?;
        let (host, port_str) = (&s[..colon], &s[colon + 1..]);
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(NetworkError::InvalidAddress(format!("missing host: {}", s)));
        }
        let port: u16 = port_str
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(format!("invalid port: {}", port_str)))?;
        Ok(Address::new(host, port))
    }
}
