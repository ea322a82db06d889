// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Crypto capability.
//!
//! One spec enumerates every primitive the TLS core requires. The default
//! required set:
//!
//! | Class | Members |
//! |-------|---------|
//! | Hash | SHA-256, SHA-384 |
//! | AEAD | AES-128-GCM, AES-256-GCM, ChaCha20-Poly1305 |
//! | Key exchange | X25519 |
//! | KDF | HKDF-SHA-256, HKDF-SHA-384 |
//! | MAC | HMAC-SHA-256, HMAC-SHA-384 |
//!
//! Optional members (declared through [`CryptoConfig`], never stubbed at
//! runtime): P-256, P-384, SHA-1-era TLS 1.2 legacy, ECDSA/RSA signature
//! verification.
//!
//! Each primitive is also exposed as a standalone type with constant
//! declarations (`KEY_LEN`, `NONCE_LEN`, `TAG_LEN`, `MAC_LEN`, ...) and a
//! one-shot interface; [`CryptoProvider`] is the runtime-dispatch surface
//! the TLS core drives after suite negotiation.
//!
//! # References
//!
//! - [FIPS 180-4](https://nvlpubs.nist.gov/nistpubs/FIPS/NIST.FIPS.180-4.pdf) -- SHA-2
//! - [NIST SP 800-38D](https://nvlpubs.nist.gov/nistpubs/Legacy/SP/nistspecialpublication800-38d.pdf) -- GCM
//! - [RFC 8439](https://www.rfc-editor.org/rfc/rfc8439) -- ChaCha20-Poly1305
//! - [RFC 7748](https://www.rfc-editor.org/rfc/rfc7748) -- X25519
//! - [RFC 5869](https://www.rfc-editor.org/rfc/rfc5869) -- HKDF
//! - [RFC 4231](https://www.rfc-editor.org/rfc/rfc4231) -- HMAC vectors

pub mod aead;
pub mod agreement;
mod error;
pub mod hash;
pub mod kdf;
pub mod mac;
pub mod signature;

pub use aead::{AeadAlg, Aes128Gcm, Aes256Gcm, ChaCha20Poly1305};
pub use agreement::{KeyExchangeState, KxGroup, NistKx, X25519};
pub use error::{CryptoError, Result};
pub use hash::{Digest, HashAlg, HashCtx, Sha256, Sha384, Sha512};
pub use kdf::{HkdfSha256, HkdfSha384};
pub use mac::{HmacSha256, HmacSha384};
pub use signature::SigScheme;

use crate::cap::{facts, Cap, Contract, Meta};
use ring::rand::SecureRandom;

/// The crypto capability: every primitive class the TLS core consumes,
/// dispatched at runtime after suite negotiation.
pub trait CryptoProvider: Send + Sync + 'static {
    /// Fill `out` with cryptographically secure random bytes.
    fn random(&self, out: &mut [u8]) -> Result<()>;

    /// One-shot hash.
    fn hash(&self, alg: HashAlg, data: &[u8]) -> Digest;

    /// Streaming hash context (transcript hashing).
    fn hash_ctx(&self, alg: HashAlg) -> HashCtx;

    /// One-shot HMAC tag.
    fn hmac(&self, alg: HashAlg, key: &[u8], data: &[u8]) -> Digest;

    /// Constant-time HMAC verification.
    fn hmac_verify(&self, alg: HashAlg, key: &[u8], data: &[u8], tag: &[u8]) -> Result<()>;

    /// `HKDF-Extract`.
    fn hkdf_extract(&self, alg: HashAlg, salt: &[u8], ikm: &[u8]) -> Digest;

    /// `HKDF-Expand` into `out`.
    fn hkdf_expand(&self, alg: HashAlg, prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<()>;

    /// AEAD encrypt; returns `ciphertext || tag`.
    fn seal(
        &self,
        alg: AeadAlg,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>>;

    /// AEAD decrypt of `ciphertext || tag`; fails with
    /// [`CryptoError::AuthenticationFailed`] and no partial plaintext.
    fn open(
        &self,
        alg: AeadAlg,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>>;

    /// Begin a key exchange on `group`.
    fn kx_generate(&self, group: KxGroup) -> Result<Box<dyn KeyExchangeState>>;

    /// Verify a signature (optional member; see [`Self::has_signatures`]).
    fn verify_signature(
        &self,
        scheme: SigScheme,
        public_key: &[u8],
        message: &[u8],
        sig: &[u8],
    ) -> Result<()>;

    /// Whether the signature-verification set is present.
    fn has_signatures(&self) -> bool;

    /// Whether the TLS 1.2 legacy set (P-256 exchange, SHA-1 chains) is
    /// present.
    fn has_tls12_legacy(&self) -> bool;
}

/// Capability marker for [`CryptoProvider`] implementations.
pub struct CryptoCap;

/// Which optional member sets the caller requires.
#[derive(Clone, Copy, Debug, Default)]
pub struct CryptoConfig {
    /// Require ECDSA/RSA signature verification (certificate chains).
    pub require_signatures: bool,
    /// Require the TLS 1.2 legacy set.
    pub require_tls12_legacy: bool,
}

impl<T: CryptoProvider> Contract<T> for CryptoCap {
    type Config = CryptoConfig;

    fn derive(imp: &T, meta: Meta, config: &CryptoConfig) -> Meta {
        assert!(
            !config.require_signatures || imp.has_signatures(),
            "crypto capability '{}' lacks the required signature set",
            meta.id()
        );
        assert!(
            !config.require_tls12_legacy || imp.has_tls12_legacy(),
            "crypto capability '{}' lacks the required TLS 1.2 legacy set",
            meta.id()
        );
        let mut meta = meta;
        if imp.has_signatures() {
            meta = meta.with_fact(facts::HAS_SIGNATURES);
        }
        if imp.has_tls12_legacy() {
            meta = meta.with_fact(facts::HAS_TLS12_LEGACY);
        }
        meta
    }
}

/// Crypto capability wrapper alias.
pub type Crypto<T> = Cap<CryptoCap, T>;

/// The default provider: `ring` for everything except X25519, which needs
/// raw-scalar loading and rides on `x25519-dalek`.
pub struct RingProvider {
    rng: ring::rand::SystemRandom,
}

impl RingProvider {
    /// Create a provider with a fresh system RNG handle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: ring::rand::SystemRandom::new(),
        }
    }
}

impl Default for RingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoProvider for RingProvider {
    fn random(&self, out: &mut [u8]) -> Result<()> {
        self.rng.fill(out).map_err(|_| CryptoError::RandomFailed)
    }

    fn hash(&self, alg: HashAlg, data: &[u8]) -> Digest {
        match alg {
            HashAlg::Sha256 => Sha256::digest(data),
            HashAlg::Sha384 => Sha384::digest(data),
        }
    }

    fn hash_ctx(&self, alg: HashAlg) -> HashCtx {
        HashCtx::new(alg)
    }

    fn hmac(&self, alg: HashAlg, key: &[u8], data: &[u8]) -> Digest {
        mac::sign(alg, key, data)
    }

    fn hmac_verify(&self, alg: HashAlg, key: &[u8], data: &[u8], tag: &[u8]) -> Result<()> {
        mac::verify(alg, key, data, tag)
    }

    fn hkdf_extract(&self, alg: HashAlg, salt: &[u8], ikm: &[u8]) -> Digest {
        kdf::extract(alg, salt, ikm)
    }

    fn hkdf_expand(&self, alg: HashAlg, prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
        kdf::expand(alg, prk, info, out)
    }

    fn seal(
        &self,
        alg: AeadAlg,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        aead::seal(alg, key, nonce, aad, plaintext)
    }

    fn open(
        &self,
        alg: AeadAlg,
        key: &[u8],
        nonce: &[u8],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        aead::open(alg, key, nonce, aad, ciphertext)
    }

    fn kx_generate(&self, group: KxGroup) -> Result<Box<dyn KeyExchangeState>> {
        match group {
            KxGroup::X25519 => Ok(Box::new(X25519::generate(&self.rng)?)),
            KxGroup::P256 | KxGroup::P384 => Ok(Box::new(NistKx::generate(group, &self.rng)?)),
        }
    }

    fn verify_signature(
        &self,
        scheme: SigScheme,
        public_key: &[u8],
        message: &[u8],
        sig: &[u8],
    ) -> Result<()> {
        signature::verify(scheme, public_key, message, sig)
    }

    fn has_signatures(&self) -> bool {
        true
    }

    fn has_tls12_legacy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::Spec;

    #[test]
    fn ring_provider_wraps_with_full_config() {
        let cap = Crypto::from_with(
            Spec::new(RingProvider::new(), Meta::new("ring-suite")),
            CryptoConfig {
                require_signatures: true,
                require_tls12_legacy: true,
            },
        );
        assert_eq!(cap.meta().id(), "ring-suite");
        assert!(cap.meta().has(facts::HAS_SIGNATURES));
        assert!(cap.meta().has(facts::HAS_TLS12_LEGACY));
    }

    #[test]
    fn provider_dispatch_matches_typed_primitives() {
        let provider = RingProvider::new();
        assert_eq!(
            provider.hash(HashAlg::Sha256, b"abc"),
            Sha256::digest(b"abc")
        );
        let sealed = provider
            .seal(AeadAlg::Aes128Gcm, &[0u8; 16], &[0u8; 12], b"", b"x")
            .unwrap();
        assert_eq!(
            provider
                .open(AeadAlg::Aes128Gcm, &[0u8; 16], &[0u8; 12], b"", &sealed)
                .unwrap(),
            b"x"
        );
    }

    #[test]
    fn kx_generate_x25519_agrees() {
        let provider = RingProvider::new();
        let a = provider.kx_generate(KxGroup::X25519).unwrap();
        let b = provider.kx_generate(KxGroup::X25519).unwrap();
        let a_pub = a.public().to_vec();
        let b_pub = b.public().to_vec();
        let s1 = a.agree(&b_pub).unwrap();
        let s2 = b.agree(&a_pub).unwrap();
        assert_eq!(&*s1, &*s2);
    }

    #[test]
    fn random_fills_buffer() {
        let provider = RingProvider::new();
        let mut buf = [0u8; 32];
        provider.random(&mut buf).unwrap();
        // 32 zero bytes from a healthy RNG is a 2^-256 event.
        assert!(buf.iter().any(|&b| b != 0));
    }
}
