// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! HKDF (RFC 5869) built on HMAC.
//!
//! The extract output (PRK) is needed as raw bytes by the TLS key schedule,
//! so extract/expand are expressed over [`crate::crypto::mac`] rather than
//! `ring::hkdf` (whose `Prk` is opaque). Byte-exact against the RFC 5869
//! test vectors.

use super::error::{CryptoError, Result};
use super::hash::{Digest, HashAlg};
use super::mac;

/// `HKDF-Extract(salt, ikm)`; an empty salt means a zero-filled one of
/// hash length, per RFC 5869 Sec.2.2.
#[must_use]
pub fn extract(alg: HashAlg, salt: &[u8], ikm: &[u8]) -> Digest {
    let zero_salt = [0u8; 48];
    let salt = if salt.is_empty() {
        &zero_salt[..alg.digest_len()]
    } else {
        salt
    };
    mac::sign(alg, salt, ikm)
}

/// `HKDF-Expand(prk, info, out.len())` into `out`.
///
/// # Errors
///
/// [`CryptoError::InvalidLength`] when `out` exceeds `255 * HashLen`.
pub fn expand(alg: HashAlg, prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
    let hash_len = alg.digest_len();
    if out.len() > 255 * hash_len {
        return Err(CryptoError::InvalidLength("HKDF output too long"));
    }
    let mut t: Vec<u8> = Vec::with_capacity(hash_len + info.len() + 1);
    let mut offset = 0;
    let mut counter = 1u8;
    while offset < out.len() {
        t.extend_from_slice(info);
        t.push(counter);
        let block = mac::sign(alg, prk, &t);
        let take = (out.len() - offset).min(hash_len);
        out[offset..offset + take].copy_from_slice(&block.as_ref()[..take]);
        offset += take;
        counter += 1;
        t.clear();
        t.extend_from_slice(block.as_ref());
    }
    Ok(())
}

/// HKDF-SHA-256.
pub struct HkdfSha256;

impl HkdfSha256 {
    /// PRK length in bytes.
    pub const PRK_LEN: usize = 32;

    /// `HKDF-Extract` with SHA-256.
    #[must_use]
    pub fn extract(salt: &[u8], ikm: &[u8]) -> Digest {
        extract(HashAlg::Sha256, salt, ikm)
    }

    /// `HKDF-Expand` with SHA-256.
    pub fn expand(prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
        expand(HashAlg::Sha256, prk, info, out)
    }
}

/// HKDF-SHA-384.
pub struct HkdfSha384;

impl HkdfSha384 {
    /// PRK length in bytes.
    pub const PRK_LEN: usize = 48;

    /// `HKDF-Extract` with SHA-384.
    #[must_use]
    pub fn extract(salt: &[u8], ikm: &[u8]) -> Digest {
        extract(HashAlg::Sha384, salt, ikm)
    }

    /// `HKDF-Expand` with SHA-384.
    pub fn expand(prk: &[u8], info: &[u8], out: &mut [u8]) -> Result<()> {
        expand(HashAlg::Sha384, prk, info, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    // RFC 5869 Test Case 1.
    #[test]
    fn rfc5869_case1() {
        let ikm = [0x0b; 22];
        let salt: Vec<u8> = (0x00..=0x0c).collect();
        let info: Vec<u8> = (0xf0..=0xf9).collect();

        let prk = HkdfSha256::extract(&salt, &ikm);
        assert_eq!(
            hex(prk.as_ref()),
            "077709362c2e32df0ddc3f0dc47bba6390b6c73bb50f9c3122ec844ad7c2b3e5"
        );

        let mut okm = [0u8; 42];
        HkdfSha256::expand(prk.as_ref(), &info, &mut okm).unwrap();
        assert_eq!(
            hex(&okm),
            "3cb25f25faacd57a90434f64d0362f2a2d2d0a90cf1a5a4c5db02d56ecc4c5bf\
             34007208d5b887185865"
        );
    }

    // RFC 5869 Test Case 3 (zero-length salt and info).
    #[test]
    fn rfc5869_case3() {
        let ikm = [0x0b; 22];
        let prk = HkdfSha256::extract(&[], &ikm);
        let mut okm = [0u8; 42];
        HkdfSha256::expand(prk.as_ref(), &[], &mut okm).unwrap();
        assert_eq!(
            hex(&okm),
            "8da4e775a563c18f715f802a063c5a31b8a11f5c5ee1879ec3454e5f3c738d2d\
             9d201395faa4b61a96c8"
        );
    }

    #[test]
    fn expand_rejects_oversized_output() {
        let prk = HkdfSha256::extract(b"salt", b"ikm");
        let mut out = vec![0u8; 255 * 32 + 1];
        assert!(HkdfSha256::expand(prk.as_ref(), b"", &mut out).is_err());
    }

    #[test]
    fn multi_block_expand_is_continuous() {
        let prk = HkdfSha384::extract(b"salt", b"ikm");
        let mut long = vec![0u8; 100];
        let mut short = vec![0u8; 48];
        HkdfSha384::expand(prk.as_ref(), b"info", &mut long).unwrap();
        HkdfSha384::expand(prk.as_ref(), b"info", &mut short).unwrap();
        assert_eq!(&long[..48], &short[..]);
    }
}
