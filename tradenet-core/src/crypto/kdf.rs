// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! HKDF-SHA256 Key Derivation (RFC 5869)
//!
//! Turns an X25519 shared secret into a symmetric key. Only single-block
//! output (32 bytes) is needed, so expand runs exactly one HMAC round.

use ring::hmac;

/// HKDF-SHA256 limited to 32-byte output.
pub struct HKDF;

impl HKDF {
    /// PRK = HMAC-SHA256(salt, IKM). A missing salt is HashLen zeros.
    pub fn extract(salt: Option<&[u8]>, ikm: &[u8]) -> [u8; 32] {
        let zero_salt = [0u8; 32];
        let key = hmac::Key::new(hmac::HMAC_SHA256, salt.unwrap_or(&zero_salt));
        let mut prk = [0u8; 32];
        prk.copy_from_slice(hmac::sign(&key, ikm).as_ref());
        prk
    }

    /// OKM = T(1) = HMAC-SHA256(PRK, info || 0x01).
    pub fn expand(prk: &[u8; 32], info: &[u8]) -> [u8; 32] {
        let key = hmac::Key::new(hmac::HMAC_SHA256, prk);
        let mut ctx = hmac::Context::with_key(&key);
        ctx.update(info);
        ctx.update(&[0x01]);
        let mut okm = [0u8; 32];
        okm.copy_from_slice(ctx.sign().as_ref());
        okm
    }

    /// Extract-then-expand in one step.
    pub fn derive_key(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> [u8; 32] {
        Self::expand(&Self::extract(salt, ikm), info)
    }
}
