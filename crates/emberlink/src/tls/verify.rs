// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! X.509 chain verification (RFC 5280 subset).
//!
//! Parsing rides on `x509-parser`; signature checks go through the crypto
//! capability. The chain walk enforces: each certificate signed by the
//! next, validity windows against a caller-supplied clock, termination at
//! either the caller's single custom anchor or the `webpki-roots` platform
//! bundle, and leaf-name coverage of the target hostname (wildcard in the
//! leftmost label only).

use super::config::TrustSource;
use super::error::CertificateError;
use crate::crypto::{CryptoProvider, SigScheme};
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;
use x509_parser::oid_registry;
use x509_parser::prelude::FromDer;

/// Verify a server chain against `trust` for `server_name`.
///
/// `now_unix` of `None` explicitly skips the validity-window check (for
/// clockless targets).
pub fn verify_chain<P: CryptoProvider>(
    provider: &P,
    chain_der: &[Vec<u8>],
    trust: &TrustSource,
    server_name: &str,
    now_unix: Option<i64>,
) -> Result<(), CertificateError> {
    if chain_der.is_empty() {
        return Err(CertificateError::EmptyChain);
    }
    let mut chain = Vec::with_capacity(chain_der.len());
    for der in chain_der {
        let (rest, cert) =
            X509Certificate::from_der(der).map_err(|_| CertificateError::ParseFailed)?;
        if !rest.is_empty() {
            return Err(CertificateError::ParseFailed);
        }
        chain.push(cert);
    }

    if let Some(now) = now_unix {
        for cert in &chain {
            check_validity(cert, now)?;
        }
    }

    // Each certificate is signed by the next one up.
    for pair in chain.windows(2) {
        verify_signed_by(provider, &pair[0], spki_bits(&pair[1]))?;
    }

    // The last chain element must be signed by a trust anchor (or be the
    // anchor itself in custom-CA mode).
    let last = chain.last().expect("non-empty checked above");
    match trust {
        TrustSource::CustomCa(anchor_der) => {
            let (_, anchor) = X509Certificate::from_der(anchor_der)
                .map_err(|_| CertificateError::ParseFailed)?;
            if last.tbs_certificate.as_ref() == anchor.tbs_certificate.as_ref() {
                return check_hostname(&chain[0], server_name);
            }
            verify_signed_by(provider, last, spki_bits(&anchor))?;
        }
        TrustSource::PlatformBundle => {
            let issuer_raw = last.tbs_certificate.issuer.as_raw();
            let mut anchored = false;
            for anchor in webpki_roots::TLS_SERVER_ROOTS {
                if anchor.subject.as_ref() != issuer_raw {
                    continue;
                }
                let Ok((_, spki)) = x509_parser::x509::SubjectPublicKeyInfo::from_der(
                    anchor.subject_public_key_info.as_ref(),
                ) else {
                    continue;
                };
                if verify_signed_by(provider, last, spki.subject_public_key.data.as_ref()).is_ok()
                {
                    anchored = true;
                    break;
                }
            }
            if !anchored {
                return Err(CertificateError::UnknownIssuer);
            }
        }
    }

    check_hostname(&chain[0], server_name)
}

fn check_validity(cert: &X509Certificate<'_>, now: i64) -> Result<(), CertificateError> {
    let validity = cert.validity();
    if now < validity.not_before.timestamp() {
        return Err(CertificateError::NotYetValid);
    }
    if now > validity.not_after.timestamp() {
        return Err(CertificateError::Expired);
    }
    Ok(())
}

fn spki_bits<'a>(cert: &'a X509Certificate<'_>) -> &'a [u8] {
    cert.tbs_certificate
        .subject_pki
        .subject_public_key
        .data
        .as_ref()
}

/// Verify `cert`'s signature with the signer's public key bits.
fn verify_signed_by<P: CryptoProvider>(
    provider: &P,
    cert: &X509Certificate<'_>,
    signer_spki_bits: &[u8],
) -> Result<(), CertificateError> {
    let scheme = scheme_for(cert)?;
    provider
        .verify_signature(
            scheme,
            signer_spki_bits,
            cert.tbs_certificate.as_ref(),
            cert.signature_value.data.as_ref(),
        )
        .map_err(|_| CertificateError::BadSignature)
}

fn scheme_for(cert: &X509Certificate<'_>) -> Result<SigScheme, CertificateError> {
    let oid = &cert.signature_algorithm.algorithm;
    if *oid == oid_registry::OID_PKCS1_SHA256WITHRSA {
        Ok(SigScheme::RsaPkcs1Sha256)
    } else if *oid == oid_registry::OID_PKCS1_SHA384WITHRSA {
        Ok(SigScheme::RsaPkcs1Sha384)
    } else if *oid == oid_registry::OID_SIG_ECDSA_WITH_SHA256 {
        Ok(SigScheme::EcdsaP256Sha256)
    } else if *oid == oid_registry::OID_SIG_ECDSA_WITH_SHA384 {
        Ok(SigScheme::EcdsaP384Sha384)
    } else {
        Err(CertificateError::UnsupportedAlgorithm)
    }
}

fn check_hostname(
    leaf: &X509Certificate<'_>,
    server_name: &str,
) -> Result<(), CertificateError> {
    let mut saw_san = false;
    if let Ok(Some(san)) = leaf.subject_alternative_name() {
        for name in &san.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                saw_san = true;
                if hostname_matches(dns, server_name) {
                    return Ok(());
                }
            }
        }
    }
    if !saw_san {
        // Legacy CN fallback.
        if let Some(cn) = leaf
            .subject()
            .iter_common_name()
            .next()
            .and_then(|attr| attr.as_str().ok())
        {
            if hostname_matches(cn, server_name) {
                return Ok(());
            }
        }
    }
    Err(CertificateError::NameMismatch)
}

/// Case-insensitive DNS name match with wildcard support in the leftmost
/// label only (`*.example.com` covers `a.example.com`, not
/// `a.b.example.com` and not `example.com`).
#[must_use]
pub fn hostname_matches(pattern: &str, hostname: &str) -> bool {
    let pattern = pattern.trim_end_matches('.');
    let hostname = hostname.trim_end_matches('.');
    if let Some(suffix) = pattern.strip_prefix("*.") {
        let Some(dot) = hostname.find('.') else {
            return false;
        };
        let host_suffix = &hostname[dot + 1..];
        !suffix.is_empty() && host_suffix.eq_ignore_ascii_case(suffix)
    } else {
        pattern.eq_ignore_ascii_case(hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::RingProvider;

    #[test]
    fn hostname_exact_and_case() {
        assert!(hostname_matches("example.com", "example.com"));
        assert!(hostname_matches("Example.COM", "example.com"));
        assert!(!hostname_matches("example.com", "other.com"));
    }

    #[test]
    fn hostname_wildcard_leftmost_only() {
        assert!(hostname_matches("*.example.com", "a.example.com"));
        assert!(hostname_matches("*.example.com", "B.EXAMPLE.com"));
        assert!(!hostname_matches("*.example.com", "a.b.example.com"));
        assert!(!hostname_matches("*.example.com", "example.com"));
        assert!(!hostname_matches("*.", "a."));
    }

    #[test]
    fn trailing_dots_are_ignored() {
        assert!(hostname_matches("example.com.", "example.com"));
        assert!(hostname_matches("*.example.com", "a.example.com."));
    }

    #[test]
    fn garbage_der_is_parse_failed() {
        let provider = RingProvider::new();
        let result = verify_chain(
            &provider,
            &[vec![0xde, 0xad, 0xbe, 0xef]],
            &TrustSource::PlatformBundle,
            "example.com",
            None,
        );
        assert_eq!(result, Err(CertificateError::ParseFailed));
    }

    #[test]
    fn empty_chain_is_rejected() {
        let provider = RingProvider::new();
        let result = verify_chain(
            &provider,
            &[],
            &TrustSource::PlatformBundle,
            "example.com",
            None,
        );
        assert_eq!(result, Err(CertificateError::EmptyChain));
    }
}
