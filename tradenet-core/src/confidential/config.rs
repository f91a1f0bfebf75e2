// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};

/// Sizing of the runtime used for decryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidentialConfig {
    /// Worker threads of the decryption runtime.
    pub decrypt_threads: usize,
}

impl Default for ConfidentialConfig {
    fn default() -> Self {
        ConfidentialConfig {
            decrypt_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(2),
        }
    }
}

impl ConfidentialConfig {
    /// Builds a dedicated multi-threaded runtime for decryption work.
    pub fn build_decrypt_runtime(&self) -> std::io::Result<Runtime> {
        Builder::new_multi_thread()
            .worker_threads(self.decrypt_threads.max(1))
            .thread_name("confidential-decrypt")
            .build()
    }
}
