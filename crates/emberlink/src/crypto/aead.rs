// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! AEAD ciphers over `ring::aead`.
//!
//! AES-128/256-GCM (NIST SP 800-38D) and ChaCha20-Poly1305 (RFC 8439),
//! with explicit caller-supplied nonces (the TLS record layer derives them
//! from sequence numbers). `open` authenticates before returning plaintext
//! and never exposes a partial decryption: on tag mismatch the caller's
//! buffers are untouched and the only output is
//! [`CryptoError::AuthenticationFailed`].

use super::error::{CryptoError, Result};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey};

/// AEAD algorithm selector for runtime-negotiated suites.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AeadAlg {
    /// AES-128-GCM.
    Aes128Gcm,
    /// AES-256-GCM.
    Aes256Gcm,
    /// ChaCha20-Poly1305.
    ChaCha20Poly1305,
}

impl AeadAlg {
    /// Key length in bytes.
    #[must_use]
    pub const fn key_len(self) -> usize {
        match self {
            Self::Aes128Gcm => 16,
            Self::Aes256Gcm | Self::ChaCha20Poly1305 => 32,
        }
    }

    /// Nonce length in bytes (96-bit for all three).
    #[must_use]
    pub const fn nonce_len(self) -> usize {
        12
    }

    /// Authentication tag length in bytes.
    #[must_use]
    pub const fn tag_len(self) -> usize {
        16
    }

    fn ring(self) -> &'static ring::aead::Algorithm {
        match self {
            Self::Aes128Gcm => &ring::aead::AES_128_GCM,
            Self::Aes256Gcm => &ring::aead::AES_256_GCM,
            Self::ChaCha20Poly1305 => &ring::aead::CHACHA20_POLY1305,
        }
    }
}

fn make_key(alg: AeadAlg, key: &[u8]) -> Result<LessSafeKey> {
    if key.len() != alg.key_len() {
        return Err(CryptoError::InvalidLength("AEAD key"));
    }
    let unbound =
        UnboundKey::new(alg.ring(), key).map_err(|_| CryptoError::InvalidLength("AEAD key"))?;
    Ok(LessSafeKey::new(unbound))
}

fn make_nonce(alg: AeadAlg, nonce: &[u8]) -> Result<Nonce> {
    if nonce.len() != alg.nonce_len() {
        return Err(CryptoError::InvalidLength("AEAD nonce"));
    }
    let mut bytes = [0u8; 12];
    bytes.copy_from_slice(nonce);
    Ok(Nonce::assume_unique_for_key(bytes))
}

/// Encrypt `plaintext`; returns `ciphertext || tag`.
///
/// The nonce must be unique per key. The record layers derive it from a
/// monotonic sequence number, which guarantees that.
pub fn seal(alg: AeadAlg, key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
    let key = make_key(alg, key)?;
    let nonce = make_nonce(alg, nonce)?;
    let mut in_out = plaintext.to_vec();
    key.seal_in_place_append_tag(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::InvalidLength("AEAD plaintext"))?;
    Ok(in_out)
}

/// Decrypt `ciphertext || tag`; returns the plaintext.
///
/// # Errors
///
/// [`CryptoError::AuthenticationFailed`] on any tag mismatch; no partial
/// plaintext is ever returned.
pub fn open(alg: AeadAlg, key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < alg.tag_len() {
        return Err(CryptoError::AuthenticationFailed);
    }
    let key = make_key(alg, key)?;
    let nonce = make_nonce(alg, nonce)?;
    let mut in_out = ciphertext.to_vec();
    let plaintext_len = key
        .open_in_place(nonce, Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::AuthenticationFailed)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

macro_rules! aead_type {
    ($(#[$doc:meta])* $name:ident, $alg:expr) => {
        $(#[$doc])*
        pub struct $name;

        impl $name {
            /// Key length in bytes.
            pub const KEY_LEN: usize = $alg.key_len();
            /// Nonce length in bytes.
            pub const NONCE_LEN: usize = $alg.nonce_len();
            /// Tag length in bytes.
            pub const TAG_LEN: usize = $alg.tag_len();

            /// Encrypt; returns `ciphertext || tag`.
            pub fn seal(key: &[u8], nonce: &[u8], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
                seal($alg, key, nonce, aad, plaintext)
            }

            /// Decrypt `ciphertext || tag`.
            pub fn open(key: &[u8], nonce: &[u8], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
                open($alg, key, nonce, aad, ciphertext)
            }
        }
    };
}

aead_type!(
    /// AES-128-GCM (NIST SP 800-38D).
    Aes128Gcm,
    AeadAlg::Aes128Gcm
);
aead_type!(
    /// AES-256-GCM (NIST SP 800-38D).
    Aes256Gcm,
    AeadAlg::Aes256Gcm
);
aead_type!(
    /// ChaCha20-Poly1305 (RFC 8439).
    ChaCha20Poly1305,
    AeadAlg::ChaCha20Poly1305
);

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn roundtrip_all_algorithms() {
        for alg in [
            AeadAlg::Aes128Gcm,
            AeadAlg::Aes256Gcm,
            AeadAlg::ChaCha20Poly1305,
        ] {
            let key = vec![0x42u8; alg.key_len()];
            let nonce = vec![0x24u8; alg.nonce_len()];
            let sealed = seal(alg, &key, &nonce, b"aad", b"payload").unwrap();
            assert_eq!(sealed.len(), 7 + alg.tag_len());
            let opened = open(alg, &key, &nonce, b"aad", &sealed).unwrap();
            assert_eq!(opened, b"payload");
        }
    }

    #[test]
    fn any_flipped_bit_fails_authentication() {
        let key = [0xAA; 16];
        let nonce = [0xBB; 12];
        let sealed = Aes128Gcm::seal(&key, &nonce, b"", b"tamper test data").unwrap();
        for byte in 0..sealed.len() {
            let mut tampered = sealed.clone();
            tampered[byte] ^= 0xFF;
            assert_eq!(
                Aes128Gcm::open(&key, &nonce, b"", &tampered),
                Err(CryptoError::AuthenticationFailed),
                "byte {} tamper went undetected",
                byte
            );
        }
    }

    #[test]
    fn wrong_aad_fails_authentication() {
        let key = [0u8; 32];
        let nonce = [0u8; 12];
        let sealed = Aes256Gcm::seal(&key, &nonce, b"context-a", b"data").unwrap();
        assert_eq!(
            Aes256Gcm::open(&key, &nonce, b"context-b", &sealed),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    // NIST GCM known answers: empty plaintext, zero key and IV.
    #[test]
    fn aes_gcm_empty_known_tags() {
        let sealed = Aes128Gcm::seal(&[0u8; 16], &[0u8; 12], b"", b"").unwrap();
        assert_eq!(hex(&sealed), "58e2fccefa7e3061367f1d57a4e7455a");
        let sealed = Aes256Gcm::seal(&[0u8; 32], &[0u8; 12], b"", b"").unwrap();
        assert_eq!(hex(&sealed), "530f8afbc74536b9a963b4f1c4cb738b");
    }

    // RFC 8439 Sec.2.8.2 AEAD test vector.
    #[test]
    fn chacha20poly1305_rfc8439_vector() {
        let key: Vec<u8> = (0x80..=0x9f).collect();
        let nonce = [
            0x07, 0x00, 0x00, 0x00, 0x40, 0x41, 0x42, 0x43, 0x44, 0x45, 0x46, 0x47,
        ];
        let aad = [
            0x50, 0x51, 0x52, 0x53, 0xc0, 0xc1, 0xc2, 0xc3, 0xc4, 0xc5, 0xc6, 0xc7,
        ];
        let plaintext = b"Ladies and Gentlemen of the class of '99: If I could offer you \
                          only one tip for the future, sunscreen would be it.";
        let sealed = ChaCha20Poly1305::seal(&key, &nonce, &aad, plaintext).unwrap();
        let (ciphertext, tag) = sealed.split_at(sealed.len() - 16);
        assert_eq!(hex(tag), "1ae10b594f09e26a7e902ecbd0600691");
        assert_eq!(
            hex(&ciphertext[..16]),
            "d31a8d34648e60db7b86afbc53ef7ec2"
        );
        let opened = ChaCha20Poly1305::open(&key, &nonce, &aad, &sealed).unwrap();
        assert_eq!(opened, plaintext);
    }
}
