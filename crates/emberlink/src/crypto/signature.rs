// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Signature verification (optional capability set) over `ring::signature`.
//!
//! Verification only - the TLS client and certificate chain walker never
//! sign anything.

use super::error::{CryptoError, Result};

/// Supported verification schemes (TLS SignatureScheme code points).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigScheme {
    /// ecdsa_secp256r1_sha256 (0x0403).
    EcdsaP256Sha256,
    /// ecdsa_secp384r1_sha384 (0x0503).
    EcdsaP384Sha384,
    /// rsa_pkcs1_sha256 (0x0401).
    RsaPkcs1Sha256,
    /// rsa_pkcs1_sha384 (0x0501).
    RsaPkcs1Sha384,
    /// rsa_pss_rsae_sha256 (0x0804).
    RsaPssSha256,
    /// rsa_pss_rsae_sha384 (0x0805).
    RsaPssSha384,
}

impl SigScheme {
    /// TLS SignatureScheme code point (RFC 8446 Sec.4.2.3).
    #[must_use]
    pub const fn code(self) -> u16 {
        match self {
            Self::EcdsaP256Sha256 => 0x0403,
            Self::EcdsaP384Sha384 => 0x0503,
            Self::RsaPkcs1Sha256 => 0x0401,
            Self::RsaPkcs1Sha384 => 0x0501,
            Self::RsaPssSha256 => 0x0804,
            Self::RsaPssSha384 => 0x0805,
        }
    }

    /// Decode a SignatureScheme code point.
    #[must_use]
    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0403 => Some(Self::EcdsaP256Sha256),
            0x0503 => Some(Self::EcdsaP384Sha384),
            0x0401 => Some(Self::RsaPkcs1Sha256),
            0x0501 => Some(Self::RsaPkcs1Sha384),
            0x0804 => Some(Self::RsaPssSha256),
            0x0805 => Some(Self::RsaPssSha384),
            _ => None,
        }
    }

    fn ring(self) -> &'static dyn ring::signature::VerificationAlgorithm {
        match self {
            Self::EcdsaP256Sha256 => &ring::signature::ECDSA_P256_SHA256_ASN1,
            Self::EcdsaP384Sha384 => &ring::signature::ECDSA_P384_SHA384_ASN1,
            Self::RsaPkcs1Sha256 => &ring::signature::RSA_PKCS1_2048_8192_SHA256,
            Self::RsaPkcs1Sha384 => &ring::signature::RSA_PKCS1_2048_8192_SHA384,
            Self::RsaPssSha256 => &ring::signature::RSA_PSS_2048_8192_SHA256,
            Self::RsaPssSha384 => &ring::signature::RSA_PSS_2048_8192_SHA384,
        }
    }
}

/// Verify `signature` over `message` with `public_key`.
///
/// `public_key` is the subjectPublicKey BIT STRING contents from the
/// signer's SPKI: an uncompressed point for ECDSA, a PKCS#1
/// `RSAPublicKey` for RSA.
///
/// # Errors
///
/// [`CryptoError::BadSignature`] when verification fails.
pub fn verify(scheme: SigScheme, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<()> {
    let key = ring::signature::UnparsedPublicKey::new(scheme.ring(), public_key);
    key.verify(message, signature)
        .map_err(|_| CryptoError::BadSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_codes_roundtrip() {
        for scheme in [
            SigScheme::EcdsaP256Sha256,
            SigScheme::EcdsaP384Sha384,
            SigScheme::RsaPkcs1Sha256,
            SigScheme::RsaPkcs1Sha384,
            SigScheme::RsaPssSha256,
            SigScheme::RsaPssSha384,
        ] {
            assert_eq!(SigScheme::from_code(scheme.code()), Some(scheme));
        }
        assert_eq!(SigScheme::from_code(0x0201), None);
    }

    #[test]
    fn garbage_signature_is_rejected() {
        let result = verify(SigScheme::EcdsaP256Sha256, &[0x04; 65], b"msg", &[0u8; 70]);
        assert_eq!(result, Err(CryptoError::BadSignature));
    }
}
