// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! HMAC (RFC 2104 / RFC 4231) over `ring::hmac`.

use super::error::{CryptoError, Result};
use super::hash::{Digest, HashAlg};
use ring::hmac;

fn ring_alg(alg: HashAlg) -> hmac::Algorithm {
    match alg {
        HashAlg::Sha256 => hmac::HMAC_SHA256,
        HashAlg::Sha384 => hmac::HMAC_SHA384,
    }
}

/// HMAC tag over `data` with `key`.
#[must_use]
pub fn sign(alg: HashAlg, key: &[u8], data: &[u8]) -> Digest {
    let key = hmac::Key::new(ring_alg(alg), key);
    Digest::from_slice(hmac::sign(&key, data).as_ref())
}

/// Constant-time verification of an HMAC tag.
///
/// # Errors
///
/// [`CryptoError::AuthenticationFailed`] on mismatch.
pub fn verify(alg: HashAlg, key: &[u8], data: &[u8], tag: &[u8]) -> Result<()> {
    let key = hmac::Key::new(ring_alg(alg), key);
    hmac::verify(&key, data, tag).map_err(|_| CryptoError::AuthenticationFailed)
}

/// HMAC-SHA-256.
pub struct HmacSha256;

impl HmacSha256 {
    /// MAC length in bytes.
    pub const MAC_LEN: usize = 32;

    /// One-shot tag.
    #[must_use]
    pub fn sign(key: &[u8], data: &[u8]) -> Digest {
        sign(HashAlg::Sha256, key, data)
    }

    /// Constant-time verification.
    pub fn verify(key: &[u8], data: &[u8], tag: &[u8]) -> Result<()> {
        verify(HashAlg::Sha256, key, data, tag)
    }
}

/// HMAC-SHA-384.
pub struct HmacSha384;

impl HmacSha384 {
    /// MAC length in bytes.
    pub const MAC_LEN: usize = 48;

    /// One-shot tag.
    #[must_use]
    pub fn sign(key: &[u8], data: &[u8]) -> Digest {
        sign(HashAlg::Sha384, key, data)
    }

    /// Constant-time verification.
    pub fn verify(key: &[u8], data: &[u8], tag: &[u8]) -> Result<()> {
        verify(HashAlg::Sha384, key, data, tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    // RFC 4231 Test Case 2.
    #[test]
    fn rfc4231_case2() {
        let tag = HmacSha256::sign(b"Jefe", b"what do ya want for nothing?");
        assert_eq!(
            hex(tag.as_ref()),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        HmacSha256::verify(b"Jefe", b"what do ya want for nothing?", tag.as_ref()).unwrap();
    }

    // RFC 4231 Test Case 1 (0x0b*20 key, "Hi There").
    #[test]
    fn rfc4231_case1() {
        let key = [0x0b; 20];
        let tag = HmacSha256::sign(&key, b"Hi There");
        assert_eq!(
            hex(tag.as_ref()),
            "b0344c61d8db38535ca8afceaf0bf12b881dc200c9833da726e9376c2e32cff7"
        );
    }

    #[test]
    fn verify_rejects_flipped_tag() {
        let mut tag = HmacSha256::sign(b"key", b"data").as_ref().to_vec();
        tag[0] ^= 0x01;
        assert_eq!(
            HmacSha256::verify(b"key", b"data", &tag),
            Err(CryptoError::AuthenticationFailed)
        );
    }

    #[test]
    fn sha384_tag_length() {
        let tag = HmacSha384::sign(b"key", b"data");
        assert_eq!(tag.len(), HmacSha384::MAC_LEN);
    }
}
