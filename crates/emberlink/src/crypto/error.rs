// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Crypto error types.

use std::fmt;

/// Crypto-operation failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// AEAD tag or MAC mismatch. No plaintext is ever exposed alongside
    /// this error.
    AuthenticationFailed,

    /// Key, nonce or output length outside the primitive's contract.
    InvalidLength(&'static str),

    /// Malformed public key or signature encoding.
    InvalidKey(&'static str),

    /// Signature verification failed.
    BadSignature,

    /// The provider does not carry the requested optional member.
    Unsupported(&'static str),

    /// Entropy source failure.
    RandomFailed,

    /// Key agreement produced a degenerate (all-zero) shared secret.
    DegenerateSharedSecret,
}

impl fmt::Display for CryptoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AuthenticationFailed => write!(f, "authentication failed"),
            Self::InvalidLength(what) => write!(f, "invalid length: {}", what),
            Self::InvalidKey(what) => write!(f, "invalid key: {}", what),
            Self::BadSignature => write!(f, "signature verification failed"),
            Self::Unsupported(what) => write!(f, "unsupported primitive: {}", what),
            Self::RandomFailed => write!(f, "entropy source failure"),
            Self::DegenerateSharedSecret => write!(f, "degenerate shared secret"),
        }
    }
}

impl std::error::Error for CryptoError {}

/// Result alias for crypto operations.
pub type Result<T> = std::result::Result<T, CryptoError>;
