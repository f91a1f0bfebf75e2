// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Network Identity Keys
//!
//! A [`KeyPair`] combines an Ed25519 signing key with an X25519 key
//! agreement key. Its public half, [`PubKey`], is what peers use to
//! address confidential messages; the `key_id` lets a receiver find the
//! matching private half without trial decryption.

use rand::rngs::OsRng;
use ring::digest;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, SharedSecret, StaticSecret};

use super::error::CryptoError;
use super::signing::{PublicKey, SigningKeyPair};

/// Length of a key id in bytes before hex encoding.
const KEY_ID_LEN: usize = 20;

/// Symbolic identifier of a keypair: hex(SHA-256(signing || encryption)[..20]).
pub type KeyId = String;

fn compute_key_id(signing: &PublicKey, encryption: &[u8; 32]) -> KeyId {
    let mut ctx = digest::Context::new(&digest::SHA256);
    ctx.update(signing.as_bytes());
    ctx.update(encryption);
    hex::encode(&ctx.finish().as_ref()[..KEY_ID_LEN])
}

/// Private identity keys of one network identity.
pub struct KeyPair {
    signing: SigningKeyPair,
    encryption: StaticSecret,
    encryption_public: X25519PublicKey,
    key_id: KeyId,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    pub fn generate() -> Result<Self, CryptoError> {
        let signing = SigningKeyPair::generate()?;
        Ok(Self::from_parts(signing, StaticSecret::random_from_rng(OsRng)))
    }

    /// Restores a keypair from its two 32-byte secrets.
    pub fn from_secrets(
        signing_seed: &[u8; 32],
        encryption_secret: [u8; 32],
    ) -> Result<Self, CryptoError> {
        let signing = SigningKeyPair::from_seed(signing_seed)?;
        Ok(Self::from_parts(signing, StaticSecret::from(encryption_secret)))
    }

    fn from_parts(signing: SigningKeyPair, encryption: StaticSecret) -> Self {
        let encryption_public = X25519PublicKey::from(&encryption);
        let key_id = compute_key_id(&signing.public_key(), encryption_public.as_bytes());
        KeyPair {
            signing,
            encryption,
            encryption_public,
            key_id,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn signing(&self) -> &SigningKeyPair {
        &self.signing
    }

    pub fn encryption_public_key(&self) -> &[u8; 32] {
        self.encryption_public.as_bytes()
    }

    pub fn pub_key(&self) -> PubKey {
        PubKey {
            signing_key: self.signing.public_key(),
            encryption_key: *self.encryption_public.as_bytes(),
            key_id: self.key_id.clone(),
        }
    }

    /// X25519 agreement with a peer's (ephemeral) public key.
    ///
    /// Fails on low-order peer points, which would yield a predictable secret.
    pub(crate) fn agree(&self, their_public: &[u8; 32]) -> Result<SharedSecret, CryptoError> {
        let shared = self
            .encryption
            .diffie_hellman(&X25519PublicKey::from(*their_public));
        if !shared.was_contributory() {
            return Err(CryptoError::InvalidKey);
        }
        Ok(shared)
    }
}

/// Public half of a [`KeyPair`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PubKey {
    signing_key: PublicKey,
    encryption_key: [u8; 32],
    key_id: KeyId,
}

impl PubKey {
    /// Builds a public key, deriving its id from the key material.
    pub fn new(signing_key: PublicKey, encryption_key: [u8; 32]) -> Self {
        let key_id = compute_key_id(&signing_key, &encryption_key);
        PubKey {
            signing_key,
            encryption_key,
            key_id,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn signing_key(&self) -> &PublicKey {
        &self.signing_key
    }

    pub fn encryption_key(&self) -> &[u8; 32] {
        &self.encryption_key
    }
}
