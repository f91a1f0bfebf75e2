// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Tests for crypto::hybrid and crypto::keys

use proptest::prelude::*;
use tradenet_core::crypto::{
    decrypt_and_verify, encrypt_and_sign, CryptoError, KeyPair, PubKey, Signature,
};

fn key_pair() -> KeyPair {
    KeyPair::generate().unwrap()
}

// =============================================================================
// Key pairs
// =============================================================================

#[test]
fn test_key_id_is_stable_across_restore() {
    let original = KeyPair::from_secrets(&[1u8; 32], [2u8; 32]).unwrap();
    let restored = KeyPair::from_secrets(&[1u8; 32], [2u8; 32]).unwrap();

    assert_eq!(original.key_id(), restored.key_id());
    assert_eq!(original.pub_key(), restored.pub_key());
    assert_eq!(original.key_id().len(), 40);
}

#[test]
fn test_key_ids_differ_between_key_pairs() {
    assert_ne!(key_pair().key_id(), key_pair().key_id());
}

#[test]
fn test_pub_key_matches_key_pair() {
    let kp = key_pair();
    let pub_key = kp.pub_key();
    assert_eq!(pub_key.key_id(), kp.key_id());
    assert_eq!(pub_key.signing_key(), &kp.signing().public_key());
    assert_eq!(pub_key.encryption_key(), kp.encryption_public_key());
}

#[test]
fn test_pub_key_serde_roundtrip() {
    let pub_key = key_pair().pub_key();
    let json = serde_json::to_string(&pub_key).unwrap();
    let restored: PubKey = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, pub_key);
}

// =============================================================================
// Encrypt and sign
// =============================================================================

#[test]
fn test_receiver_decrypts_and_recovers_sender() {
    let sender = key_pair();
    let receiver = key_pair();

    let data = encrypt_and_sign(b"take offer 42", &receiver.pub_key(), &sender).unwrap();

    assert_eq!(data.sender_public_key, sender.signing().public_key());
    assert_eq!(decrypt_and_verify(&data, &receiver).unwrap(), b"take offer 42");
}

#[test]
fn test_ciphertext_is_fresh_per_message() {
    let sender = key_pair();
    let receiver = key_pair();

    let a = encrypt_and_sign(b"same", &receiver.pub_key(), &sender).unwrap();
    let b = encrypt_and_sign(b"same", &receiver.pub_key(), &sender).unwrap();

    assert_ne!(a.ephemeral_public_key, b.ephemeral_public_key);
    assert_ne!(a.cipher_text, b.cipher_text);
}

#[test]
fn test_other_receiver_cannot_decrypt() {
    let sender = key_pair();
    let receiver = key_pair();
    let eavesdropper = key_pair();

    let data = encrypt_and_sign(b"secret", &receiver.pub_key(), &sender).unwrap();

    assert_eq!(
        decrypt_and_verify(&data, &eavesdropper),
        Err(CryptoError::DecryptionFailed)
    );
}

#[test]
fn test_tampered_ciphertext_fails_verification() {
    let sender = key_pair();
    let receiver = key_pair();
    let mut data = encrypt_and_sign(b"secret", &receiver.pub_key(), &sender).unwrap();

    let last = data.cipher_text.len() - 1;
    data.cipher_text[last] ^= 0x01;

    assert_eq!(
        decrypt_and_verify(&data, &receiver),
        Err(CryptoError::InvalidSignature)
    );
}

#[test]
fn test_tampered_signature_fails_verification() {
    let sender = key_pair();
    let receiver = key_pair();
    let mut data = encrypt_and_sign(b"secret", &receiver.pub_key(), &sender).unwrap();

    let mut bytes = *data.signature.as_bytes();
    bytes[0] ^= 0x01;
    data.signature = Signature::from_bytes(bytes);

    assert_eq!(
        decrypt_and_verify(&data, &receiver),
        Err(CryptoError::InvalidSignature)
    );
}

#[test]
fn test_substituted_sender_key_fails_verification() {
    let sender = key_pair();
    let impostor = key_pair();
    let receiver = key_pair();
    let mut data = encrypt_and_sign(b"secret", &receiver.pub_key(), &sender).unwrap();

    data.sender_public_key = impostor.signing().public_key();

    assert_eq!(
        decrypt_and_verify(&data, &receiver),
        Err(CryptoError::InvalidSignature)
    );
}

#[test]
fn test_low_order_receiver_key_rejected() {
    let sender = key_pair();
    let receiver = key_pair();
    // The all-zero point has small order
    let bogus = PubKey::new(receiver.signing().public_key(), [0u8; 32]);

    assert_eq!(
        encrypt_and_sign(b"secret", &bogus, &sender),
        Err(CryptoError::InvalidKey)
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_any_plaintext_survives(plaintext in prop::collection::vec(any::<u8>(), 0..4096)) {
        let sender = key_pair();
        let receiver = key_pair();
        let data = encrypt_and_sign(&plaintext, &receiver.pub_key(), &sender).unwrap();
        prop_assert_eq!(decrypt_and_verify(&data, &receiver).unwrap(), plaintext);
    }

    #[test]
    fn prop_any_ciphertext_byte_flip_is_rejected(
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let sender = key_pair();
        let receiver = key_pair();
        let mut data = encrypt_and_sign(b"limit order", &receiver.pub_key(), &sender).unwrap();

        let at = index.index(data.cipher_text.len());
        data.cipher_text[at] ^= flip;

        prop_assert_eq!(
            decrypt_and_verify(&data, &receiver),
            Err(CryptoError::InvalidSignature)
        );
    }

    #[test]
    fn prop_any_signature_byte_flip_is_rejected(
        index in any::<prop::sample::Index>(),
        flip in 1u8..=255,
    ) {
        let sender = key_pair();
        let receiver = key_pair();
        let mut data = encrypt_and_sign(b"limit order", &receiver.pub_key(), &sender).unwrap();

        let mut bytes = *data.signature.as_bytes();
        bytes[index.index(bytes.len())] ^= flip;
        data.signature = Signature::from_bytes(bytes);

        prop_assert_eq!(
            decrypt_and_verify(&data, &receiver),
            Err(CryptoError::InvalidSignature)
        );
    }
}
