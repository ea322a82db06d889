// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! TLS error types.

use crate::crypto::CryptoError;
use crate::net::IoError;
use std::fmt;

/// Certificate verification failures, surfaced as one typed error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    /// Chain or certificate DER did not parse.
    ParseFailed,
    /// The chain is empty.
    EmptyChain,
    /// A certificate's validity window excludes the supplied time.
    Expired,
    /// A certificate is not yet valid at the supplied time.
    NotYetValid,
    /// No path to a configured or platform trust anchor.
    UnknownIssuer,
    /// A signature in the chain did not verify.
    BadSignature,
    /// The leaf's names do not cover the target hostname.
    NameMismatch,
    /// A certificate uses an algorithm outside the crypto capability.
    UnsupportedAlgorithm,
}

impl fmt::Display for CertificateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ParseFailed => write!(f, "certificate parse failed"),
            Self::EmptyChain => write!(f, "empty certificate chain"),
            Self::Expired => write!(f, "certificate expired"),
            Self::NotYetValid => write!(f, "certificate not yet valid"),
            Self::UnknownIssuer => write!(f, "no path to a trust anchor"),
            Self::BadSignature => write!(f, "certificate signature invalid"),
            Self::NameMismatch => write!(f, "hostname does not match certificate"),
            Self::UnsupportedAlgorithm => write!(f, "unsupported certificate algorithm"),
        }
    }
}

/// TLS client failures.
#[derive(Debug)]
pub enum TlsError {
    /// Transport failure; the connection is `Closed`.
    Io(IoError),

    /// Record decryption failed. Fatal; no plaintext was exposed.
    AuthenticationFailed,

    /// A handshake message arrived out of the expected state, or its
    /// contents were unacceptable. Fatal; no keys are retained.
    HandshakeFailed(String),

    /// Certificate verification failed; the connection is aborted.
    Certificate(CertificateError),

    /// Malformed peer record or message outside the handshake.
    Protocol(String),

    /// A required crypto primitive failed or is absent.
    Crypto(CryptoError),

    /// The peer sent a fatal alert.
    PeerAlert(u8),

    /// Operation on a closed connection.
    Closed,
}

impl fmt::Display for TlsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "transport error: {}", e),
            Self::AuthenticationFailed => write!(f, "record authentication failed"),
            Self::HandshakeFailed(msg) => write!(f, "handshake failed: {}", msg),
            Self::Certificate(e) => write!(f, "certificate error: {}", e),
            Self::Protocol(msg) => write!(f, "protocol violation: {}", msg),
            Self::Crypto(e) => write!(f, "crypto failure: {}", e),
            Self::PeerAlert(code) => write!(f, "peer sent fatal alert {}", code),
            Self::Closed => write!(f, "connection is closed"),
        }
    }
}

impl std::error::Error for TlsError {}

impl From<IoError> for TlsError {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

impl From<CryptoError> for TlsError {
    fn from(e: CryptoError) -> Self {
        match e {
            CryptoError::AuthenticationFailed => Self::AuthenticationFailed,
            other => Self::Crypto(other),
        }
    }
}

impl From<CertificateError> for TlsError {
    fn from(e: CertificateError) -> Self {
        Self::Certificate(e)
    }
}

/// Result alias for TLS operations.
pub type Result<T> = std::result::Result<T, TlsError>;
