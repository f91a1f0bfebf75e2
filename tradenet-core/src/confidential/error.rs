// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors of the confidential message service.
///
/// Network failures are not errors here; they end up in the
/// `DeliveryResult` of a send.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfidentialError {
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Worker failed: {0}")]
    WorkerFailed(String),
}

impl From<bincode::Error> for ConfidentialError {
    fn from(e: bincode::Error) -> Self {
        ConfidentialError::Serialization(e.to_string())
    }
}
