// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Cryptographic hashes (FIPS 180-4) over `ring::digest`.

use ring::digest;

/// Maximum digest length carried by [`Digest`] (SHA-512).
pub const MAX_DIGEST_LEN: usize = 64;

/// A fixed-size hash output.
#[derive(Clone, Copy)]
pub struct Digest {
    buf: [u8; MAX_DIGEST_LEN],
    len: usize,
}

impl Digest {
    /// Wrap raw digest bytes (at most [`MAX_DIGEST_LEN`]).
    #[must_use]
    pub fn from_slice(bytes: &[u8]) -> Self {
        debug_assert!(bytes.len() <= MAX_DIGEST_LEN);
        let mut buf = [0u8; MAX_DIGEST_LEN];
        buf[..bytes.len()].copy_from_slice(bytes);
        Self {
            buf,
            len: bytes.len(),
        }
    }

    /// Digest length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length digest (never produced by the hashes here).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl AsRef<[u8]> for Digest {
    fn as_ref(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl std::fmt::Debug for Digest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Digest(")?;
        for b in self.as_ref() {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl PartialEq for Digest {
    fn eq(&self, other: &Self) -> bool {
        self.as_ref() == other.as_ref()
    }
}

impl Eq for Digest {}

/// Hash algorithm selector for runtime-negotiated contexts (TLS suites).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HashAlg {
    /// SHA-256 (32-byte digest).
    Sha256,
    /// SHA-384 (48-byte digest).
    Sha384,
}

impl HashAlg {
    /// Digest length in bytes.
    #[must_use]
    pub const fn digest_len(self) -> usize {
        match self {
            Self::Sha256 => 32,
            Self::Sha384 => 48,
        }
    }

    pub(crate) fn ring(self) -> &'static digest::Algorithm {
        match self {
            Self::Sha256 => &digest::SHA256,
            Self::Sha384 => &digest::SHA384,
        }
    }
}

/// Streaming hash context (transcript hashing).
#[derive(Clone)]
pub struct HashCtx {
    inner: digest::Context,
    alg: HashAlg,
}

impl HashCtx {
    /// Start a streaming hash.
    #[must_use]
    pub fn new(alg: HashAlg) -> Self {
        Self {
            inner: digest::Context::new(alg.ring()),
            alg,
        }
    }

    /// Absorb more input.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finish, consuming the context.
    #[must_use]
    pub fn finish(self) -> Digest {
        Digest::from_slice(self.inner.finish().as_ref())
    }

    /// Digest of everything absorbed so far, without consuming the context.
    #[must_use]
    pub fn snapshot(&self) -> Digest {
        self.clone().finish()
    }

    /// The context's algorithm.
    #[must_use]
    pub fn alg(&self) -> HashAlg {
        self.alg
    }
}

/// SHA-256 (FIPS 180-4).
pub struct Sha256;

impl Sha256 {
    /// Digest length in bytes.
    pub const DIGEST_LEN: usize = 32;
    /// Internal block length in bytes.
    pub const BLOCK_LEN: usize = 64;

    /// One-shot digest.
    #[must_use]
    pub fn digest(data: &[u8]) -> Digest {
        Digest::from_slice(digest::digest(&digest::SHA256, data).as_ref())
    }
}

/// SHA-384 (FIPS 180-4).
pub struct Sha384;

impl Sha384 {
    /// Digest length in bytes.
    pub const DIGEST_LEN: usize = 48;
    /// Internal block length in bytes.
    pub const BLOCK_LEN: usize = 128;

    /// One-shot digest.
    #[must_use]
    pub fn digest(data: &[u8]) -> Digest {
        Digest::from_slice(digest::digest(&digest::SHA384, data).as_ref())
    }
}

/// SHA-512 (FIPS 180-4). Optional member; not used by the TLS core.
pub struct Sha512;

impl Sha512 {
    /// Digest length in bytes.
    pub const DIGEST_LEN: usize = 64;
    /// Internal block length in bytes.
    pub const BLOCK_LEN: usize = 128;

    /// One-shot digest.
    #[must_use]
    pub fn digest(data: &[u8]) -> Digest {
        Digest::from_slice(digest::digest(&digest::SHA512, data).as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    // FIPS 180-4 "abc" vectors.
    #[test]
    fn sha256_abc() {
        assert_eq!(
            hex(Sha256::digest(b"abc").as_ref()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn sha384_abc() {
        assert_eq!(
            hex(Sha384::digest(b"abc").as_ref()),
            "cb00753f45a35e8bb5a03d699ac65007272c32ab0eded1631a8b605a43ff5bed\
             8086072ba1e7cc2358baeca134c825a7"
        );
    }

    #[test]
    fn sha512_abc() {
        assert_eq!(
            hex(Sha512::digest(b"abc").as_ref()),
            "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a\
             2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let mut ctx = HashCtx::new(HashAlg::Sha256);
        ctx.update(b"ab");
        ctx.update(b"c");
        assert_eq!(ctx.finish(), Sha256::digest(b"abc"));
    }

    #[test]
    fn snapshot_does_not_consume() {
        let mut ctx = HashCtx::new(HashAlg::Sha384);
        ctx.update(b"abc");
        let snap = ctx.snapshot();
        assert_eq!(snap, Sha384::digest(b"abc"));
        ctx.update(b"def");
        assert_eq!(ctx.finish(), Sha384::digest(b"abcdef"));
    }
}
