// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Key exchange: X25519 (RFC 7748) and the optional NIST groups.
//!
//! X25519 uses `x25519-dalek` because a TLS client must be able to load
//! raw private scalars; the optional P-256/P-384 members ride on
//! `ring::agreement` with ephemeral keys.

use super::error::{CryptoError, Result};
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

/// Supported key-exchange groups (TLS NamedGroup values).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KxGroup {
    /// X25519 (0x001d).
    X25519,
    /// secp256r1 (0x0017). Optional member.
    P256,
    /// secp384r1 (0x0018). Optional member.
    P384,
}

impl KxGroup {
    /// TLS NamedGroup code point (RFC 8446 Sec.4.2.7).
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::X25519 => 0x001d,
            Self::P256 => 0x0017,
            Self::P384 => 0x0018,
        }
    }

    /// Decode a NamedGroup code point.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x001d => Some(Self::X25519),
            0x0017 => Some(Self::P256),
            0x0018 => Some(Self::P384),
            _ => None,
        }
    }

    /// Public key encoding length for this group.
    #[must_use]
    pub const fn public_len(self) -> usize {
        match self {
            Self::X25519 => 32,
            Self::P256 => 65,
            Self::P384 => 97,
        }
    }
}

/// An in-progress key exchange: holds the private part, exposes the public
/// encoding, agrees once.
pub trait KeyExchangeState: Send {
    /// The group this exchange runs in.
    fn group(&self) -> KxGroup;

    /// Our public key encoding (sent to the peer).
    fn public(&self) -> &[u8];

    /// Complete the exchange with the peer's public encoding.
    ///
    /// # Errors
    ///
    /// [`CryptoError::InvalidKey`] on a malformed peer key,
    /// [`CryptoError::DegenerateSharedSecret`] on an all-zero result.
    fn agree(self: Box<Self>, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>>;
}

/// X25519 key exchange (RFC 7748).
pub struct X25519 {
    secret: x25519_dalek::StaticSecret,
    public: [u8; 32],
}

impl X25519 {
    /// Public and shared secret length in bytes.
    pub const KEY_LEN: usize = 32;

    /// Generate a keypair from system entropy.
    pub fn generate(rng: &SystemRandom) -> Result<Self> {
        let mut scalar = [0u8; 32];
        rng.fill(&mut scalar).map_err(|_| CryptoError::RandomFailed)?;
        Ok(Self::from_scalar(scalar))
    }

    /// Build from a raw private scalar (clamped per RFC 7748).
    #[must_use]
    pub fn from_scalar(scalar: [u8; 32]) -> Self {
        let secret = x25519_dalek::StaticSecret::from(scalar);
        let public = *x25519_dalek::PublicKey::from(&secret).as_bytes();
        Self { secret, public }
    }

    /// Compute the shared secret with a peer public key.
    ///
    /// Rejects the all-zero output produced by small-order peer points.
    pub fn diffie_hellman(self, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let peer: [u8; 32] = peer_public
            .try_into()
            .map_err(|_| CryptoError::InvalidKey("X25519 public key length"))?;
        let shared = self
            .secret
            .diffie_hellman(&x25519_dalek::PublicKey::from(peer));
        if shared.as_bytes().iter().all(|&b| b == 0) {
            return Err(CryptoError::DegenerateSharedSecret);
        }
        Ok(Zeroizing::new(shared.as_bytes().to_vec()))
    }

    /// Our public key.
    #[must_use]
    pub fn public(&self) -> &[u8; 32] {
        &self.public
    }
}

impl KeyExchangeState for X25519 {
    fn group(&self) -> KxGroup {
        KxGroup::X25519
    }

    fn public(&self) -> &[u8] {
        &self.public
    }

    fn agree(self: Box<Self>, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        (*self).diffie_hellman(peer_public)
    }
}

/// NIST-curve exchange over `ring::agreement` (optional members).
pub struct NistKx {
    group: KxGroup,
    private: ring::agreement::EphemeralPrivateKey,
    public: Vec<u8>,
}

impl NistKx {
    /// Generate an ephemeral keypair on `group` (P-256 or P-384).
    pub fn generate(group: KxGroup, rng: &SystemRandom) -> Result<Self> {
        let alg = match group {
            KxGroup::P256 => &ring::agreement::ECDH_P256,
            KxGroup::P384 => &ring::agreement::ECDH_P384,
            KxGroup::X25519 => return Err(CryptoError::Unsupported("use X25519 type")),
        };
        let private = ring::agreement::EphemeralPrivateKey::generate(alg, rng)
            .map_err(|_| CryptoError::RandomFailed)?;
        let public = private
            .compute_public_key()
            .map_err(|_| CryptoError::RandomFailed)?
            .as_ref()
            .to_vec();
        Ok(Self {
            group,
            private,
            public,
        })
    }
}

impl KeyExchangeState for NistKx {
    fn group(&self) -> KxGroup {
        self.group
    }

    fn public(&self) -> &[u8] {
        &self.public
    }

    fn agree(self: Box<Self>, peer_public: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        let alg = match self.group {
            KxGroup::P256 => &ring::agreement::ECDH_P256,
            KxGroup::P384 => &ring::agreement::ECDH_P384,
            KxGroup::X25519 => unreachable!("constructed via generate"),
        };
        let peer = ring::agreement::UnparsedPublicKey::new(alg, peer_public);
        ring::agreement::agree_ephemeral(self.private, &peer, |shared| {
            Zeroizing::new(shared.to_vec())
        })
        .map_err(|_| CryptoError::InvalidKey("EC peer public key"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    // RFC 7748 Sec.6.1: Alice and Bob arrive at the same, published secret.
    #[test]
    fn rfc7748_diffie_hellman_vector() {
        let alice_scalar: [u8; 32] =
            unhex("77076d0a7318a57d3c16c17251b26645df4c2f87ebc0992ab177fba51db92c2a")
                .try_into()
                .unwrap();
        let bob_scalar: [u8; 32] =
            unhex("5dab087e624a8a4b79e17f8b83800ee66f3bb1292618b6fd1c2f8b27ff88e0eb")
                .try_into()
                .unwrap();

        let alice = X25519::from_scalar(alice_scalar);
        let bob = X25519::from_scalar(bob_scalar);
        assert_eq!(
            hex(alice.public()),
            "8520f0098930a754748b7ddcb43ef75a0dbf3a0d26381af4eba4a98eaa9b4e6a"
        );
        assert_eq!(
            hex(bob.public()),
            "de9edb7d7b7dc1b4d35b61c2ece435373f8343c85b78674dadfc7e146f882b4f"
        );

        let bob_public = *bob.public();
        let alice_public = *alice.public();
        let shared_a = alice.diffie_hellman(&bob_public).unwrap();
        let shared_b = bob.diffie_hellman(&alice_public).unwrap();
        assert_eq!(&*shared_a, &*shared_b);
        assert_eq!(
            hex(&shared_a),
            "4a5d9d5ba4ce2de1728e3bf480350f25e07e21c947d19e3376f09b3c1e161742"
        );
        assert!(shared_a.iter().any(|&b| b != 0));
    }

    #[test]
    fn x25519_rejects_small_order_point() {
        let rng = SystemRandom::new();
        let kx = X25519::generate(&rng).unwrap();
        // The identity point forces an all-zero shared secret.
        assert!(matches!(
            kx.diffie_hellman(&[0u8; 32]),
            Err(CryptoError::DegenerateSharedSecret)
        ));
    }

    #[test]
    fn p256_agreement_both_directions() {
        let rng = SystemRandom::new();
        let a = NistKx::generate(KxGroup::P256, &rng).unwrap();
        let b = NistKx::generate(KxGroup::P256, &rng).unwrap();
        let a_pub = a.public().to_vec();
        let b_pub = b.public().to_vec();
        let s1 = Box::new(a).agree(&b_pub).unwrap();
        let s2 = Box::new(b).agree(&a_pub).unwrap();
        assert_eq!(&*s1, &*s2);
    }

    #[test]
    fn named_group_codes_roundtrip() {
        for group in [KxGroup::X25519, KxGroup::P256, KxGroup::P384] {
            assert_eq!(KxGroup::from_code(group.code()), Some(group));
        }
        assert_eq!(KxGroup::from_code(0x9999), None);
    }
}
