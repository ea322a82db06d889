// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! AEAD tamper detection scenario: a single flipped ciphertext byte must
//! fail authentication without exposing any plaintext.

use emberlink::crypto::{Aes128Gcm, ChaCha20Poly1305, CryptoError, RingProvider, CryptoProvider};

#[test]
fn flipped_ciphertext_byte_is_detected() {
    let key = [0xaa; 16];
    let nonce = [0xbb; 12];
    let plaintext = b"tamper test data";

    let sealed = Aes128Gcm::seal(&key, &nonce, b"", plaintext).unwrap();
    let mut tampered = sealed.clone();
    tampered[0] ^= 0xff;

    let result = Aes128Gcm::open(&key, &nonce, b"", &tampered);
    assert_eq!(result, Err(CryptoError::AuthenticationFailed));

    // The untampered ciphertext still decrypts: the failure carried no
    // state over.
    assert_eq!(Aes128Gcm::open(&key, &nonce, b"", &sealed).unwrap(), plaintext);
}

#[test]
fn flipped_tag_byte_is_detected() {
    let key = [0xaa; 16];
    let nonce = [0xbb; 12];
    let sealed = Aes128Gcm::seal(&key, &nonce, b"", b"tamper test data").unwrap();
    let mut tampered = sealed;
    let last = tampered.len() - 1;
    tampered[last] ^= 0x01;
    assert_eq!(
        Aes128Gcm::open(&key, &nonce, b"", &tampered),
        Err(CryptoError::AuthenticationFailed)
    );
}

#[test]
fn provider_dispatch_rejects_tampering_for_every_aead() {
    use emberlink::crypto::AeadAlg;
    let provider = RingProvider::new();
    for alg in [
        AeadAlg::Aes128Gcm,
        AeadAlg::Aes256Gcm,
        AeadAlg::ChaCha20Poly1305,
    ] {
        let key = vec![0x0f; alg.key_len()];
        let nonce = vec![0xf0; alg.nonce_len()];
        let sealed = provider.seal(alg, &key, &nonce, b"aad", b"payload").unwrap();
        for i in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[i] ^= 0x80;
            assert_eq!(
                provider.open(alg, &key, &nonce, b"aad", &tampered),
                Err(CryptoError::AuthenticationFailed),
                "{:?}: flip at byte {} slipped through",
                alg,
                i
            );
        }
    }
}

#[test]
fn chacha20poly1305_decrypt_never_partial() {
    let key = [0x42; 32];
    let nonce = [0x24; 12];
    let sealed = ChaCha20Poly1305::seal(&key, &nonce, b"", b"all or nothing").unwrap();
    // Truncate mid-ciphertext: the result is an error carrying no bytes.
    let truncated = &sealed[..sealed.len() - 1];
    assert_eq!(
        ChaCha20Poly1305::open(&key, &nonce, b"", truncated),
        Err(CryptoError::AuthenticationFailed)
    );
}
