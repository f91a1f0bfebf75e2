// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Node and registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::NetworkError;
use super::framing::DEFAULT_MAX_FRAME_SIZE;

/// Configuration shared by all nodes of a registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Outbound connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Read timeout on established connections; 0 waits indefinitely.
    pub io_timeout_ms: u64,
    /// Time allowed for the peer's handshake frame.
    pub handshake_timeout_ms: u64,
    /// Largest accepted envelope body.
    pub max_frame_size: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            connect_timeout_ms: 10_000,
            io_timeout_ms: 0,
            handshake_timeout_ms: 15_000,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl NodeConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn io_timeout(&self) -> Option<Duration> {
        (self.io_timeout_ms > 0).then(|| Duration::from_millis(self.io_timeout_ms))
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Registry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Upper bound for the concurrent shutdown of all nodes.
    pub shutdown_timeout_ms: u64,
    pub node: NodeConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            shutdown_timeout_ms: 10_000,
            node: NodeConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Parses a JSON config section; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, NetworkError> {
        serde_json::from_str(json).map_err(|e| NetworkError::Serialization(e.to_string()))
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
