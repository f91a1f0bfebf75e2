// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

pub mod encryption;
pub mod error;
pub mod hybrid;
pub mod kdf;
pub mod keys;
pub mod signing;

pub use encryption::{decrypt, encrypt, SymmetricKey};
pub use error::CryptoError;
pub use hybrid::{decrypt_and_verify, encrypt_and_sign, ConfidentialData};
pub use kdf::HKDF;
pub use keys::{KeyId, KeyPair, PubKey};
pub use signing::{PublicKey, Signature, SigningKeyPair};
