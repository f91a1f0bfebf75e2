// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

use thiserror::Error;

/// Cryptographic error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Key generation failed")]
    KeyGeneration,

    #[error("Invalid key material")]
    InvalidKey,

    #[error("Encryption failed")]
    EncryptionFailed,

    #[error("Decryption failed: data may be corrupted or wrong key")]
    DecryptionFailed,

    #[error("Ciphertext too short")]
    CiphertextTooShort,

    #[error("Signature verification failed")]
    InvalidSignature,
}
