// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hybrid Encryption
//!
//! Encrypt-then-sign construction for confidential messages:
//!
//! 1. A fresh ephemeral X25519 key agrees a secret with the receiver's
//!    static encryption key.
//! 2. HKDF-SHA256 derives a one-time XChaCha20-Poly1305 key, salted with
//!    both public keys.
//! 3. The sender signs `ephemeral_public || ciphertext` with Ed25519.
//!
//! The receiver verifies the signature before attempting decryption, so a
//! forged or tampered message never reaches the AEAD.

use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519PublicKey};

use super::encryption::{decrypt, encrypt, SymmetricKey};
use super::error::CryptoError;
use super::kdf::HKDF;
use super::keys::{KeyPair, PubKey};
use super::signing::{PublicKey, Signature};

const HYBRID_INFO: &[u8] = b"tradenet-confidential-v1";

/// Encrypted and signed payload of a confidential message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfidentialData {
    /// Sender's Ed25519 key; recovered by the receiver after verification.
    pub sender_public_key: PublicKey,
    /// Ephemeral X25519 key used for this message only.
    pub ephemeral_public_key: [u8; 32],
    /// `encrypt()` output: tag || nonce || ciphertext || tag.
    pub cipher_text: Vec<u8>,
    /// Signature over `ephemeral_public_key || cipher_text`.
    pub signature: Signature,
}

impl ConfidentialData {
    fn signed_bytes(ephemeral_public_key: &[u8; 32], cipher_text: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 + cipher_text.len());
        bytes.extend_from_slice(ephemeral_public_key);
        bytes.extend_from_slice(cipher_text);
        bytes
    }
}

fn derive_message_key(
    shared_secret: &[u8; 32],
    ephemeral_public_key: &[u8; 32],
    receiver_encryption_key: &[u8; 32],
) -> SymmetricKey {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public_key);
    salt[32..].copy_from_slice(receiver_encryption_key);
    SymmetricKey::from_bytes(HKDF::derive_key(Some(&salt), shared_secret, HYBRID_INFO))
}

/// Encrypts `plaintext` to `receiver` and signs the result with `sender`.
pub fn encrypt_and_sign(
    plaintext: &[u8],
    receiver: &PubKey,
    sender: &KeyPair,
) -> Result<ConfidentialData, CryptoError> {
    let ephemeral = EphemeralSecret::random_from_rng(OsRng);
    let ephemeral_public_key = *X25519PublicKey::from(&ephemeral).as_bytes();

    let shared = ephemeral.diffie_hellman(&X25519PublicKey::from(*receiver.encryption_key()));
    if !shared.was_contributory() {
        return Err(CryptoError::InvalidKey);
    }

    let key = derive_message_key(
        shared.as_bytes(),
        &ephemeral_public_key,
        receiver.encryption_key(),
    );
    let cipher_text = encrypt(&key, plaintext)?;
    let signature = sender
        .signing()
        .sign(&ConfidentialData::signed_bytes(&ephemeral_public_key, &cipher_text));

    Ok(ConfidentialData {
        sender_public_key: sender.signing().public_key(),
        ephemeral_public_key,
        cipher_text,
        signature,
    })
}

/// Verifies the sender signature, then decrypts with the receiver's keys.
pub fn decrypt_and_verify(
    data: &ConfidentialData,
    receiver: &KeyPair,
) -> Result<Vec<u8>, CryptoError> {
    let signed = ConfidentialData::signed_bytes(&data.ephemeral_public_key, &data.cipher_text);
    if !data.sender_public_key.verify(&signed, &data.signature) {
        return Err(CryptoError::InvalidSignature);
    }

    let shared = receiver.agree(&data.ephemeral_public_key)?;
    let key = derive_message_key(
        shared.as_bytes(),
        &data.ephemeral_public_key,
        receiver.encryption_public_key(),
    );
    decrypt(&key, &data.cipher_text)
}
