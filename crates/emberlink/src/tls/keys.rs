// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Key derivation: the TLS 1.3 schedule (RFC 8446 Sec.7.1) and the TLS 1.2
//! PRF (RFC 5246 Sec.5).
//!
//! The 1.3 schedule advances `early -> handshake -> master`; each traffic
//! secret is a Derive-Secret over the running transcript hash, and traffic
//! keys/IVs expand from the secrets with `HKDF-Expand-Label`. Secrets are
//! zeroized on drop.

use super::error::{Result, TlsError};
use crate::crypto::{CryptoProvider, HashAlg};
use zeroize::Zeroizing;

/// `HKDF-Expand-Label(secret, label, context, out.len())` with the
/// "tls13 " prefix (RFC 8446 Sec.7.1).
pub(crate) fn hkdf_expand_label<P: CryptoProvider>(
    provider: &P,
    hash: HashAlg,
    secret: &[u8],
    label: &[u8],
    context: &[u8],
    out: &mut [u8],
) -> Result<()> {
    let mut info = Vec::with_capacity(4 + 6 + label.len() + 1 + context.len());
    info.extend_from_slice(&(out.len() as u16).to_be_bytes());
    info.push((6 + label.len()) as u8);
    info.extend_from_slice(b"tls13 ");
    info.extend_from_slice(label);
    info.push(context.len() as u8);
    info.extend_from_slice(context);
    provider
        .hkdf_expand(hash, secret, &info, out)
        .map_err(TlsError::from)
}

/// `Derive-Secret(secret, label, transcript_hash)`.
pub(crate) fn derive_secret<P: CryptoProvider>(
    provider: &P,
    hash: HashAlg,
    secret: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let mut out = Zeroizing::new(vec![0u8; hash.digest_len()]);
    hkdf_expand_label(provider, hash, secret, label, transcript_hash, &mut out)?;
    Ok(out)
}

/// The TLS 1.3 key schedule for one connection.
pub(crate) struct Schedule13 {
    hash: HashAlg,
    master_secret: Zeroizing<Vec<u8>>,
    /// Client/server handshake traffic secrets, kept for finished keys.
    pub client_hs: Zeroizing<Vec<u8>>,
    pub server_hs: Zeroizing<Vec<u8>>,
    /// Application traffic secrets, kept for key updates.
    pub client_app: Zeroizing<Vec<u8>>,
    pub server_app: Zeroizing<Vec<u8>>,
}

impl Schedule13 {
    /// Run the schedule up to the handshake traffic secrets.
    ///
    /// `hello_transcript` is the transcript hash through ServerHello.
    pub fn after_server_hello<P: CryptoProvider>(
        provider: &P,
        hash: HashAlg,
        shared_secret: &[u8],
        hello_transcript: &[u8],
    ) -> Result<Self> {
        let hash_len = hash.digest_len();
        let zeros = vec![0u8; hash_len];
        let empty_hash = provider.hash(hash, b"");

        // early_secret = HKDF-Extract(0, 0) - no PSK in this client.
        let early_secret = provider.hkdf_extract(hash, &zeros, &zeros);
        let derived = derive_secret(
            provider,
            hash,
            early_secret.as_ref(),
            b"derived",
            empty_hash.as_ref(),
        )?;
        let handshake_secret =
            Zeroizing::new(provider.hkdf_extract(hash, &derived, shared_secret).as_ref().to_vec());

        let client_hs = derive_secret(
            provider,
            hash,
            &handshake_secret,
            b"c hs traffic",
            hello_transcript,
        )?;
        let server_hs = derive_secret(
            provider,
            hash,
            &handshake_secret,
            b"s hs traffic",
            hello_transcript,
        )?;

        let derived = derive_secret(
            provider,
            hash,
            &handshake_secret,
            b"derived",
            empty_hash.as_ref(),
        )?;
        let master_secret =
            Zeroizing::new(provider.hkdf_extract(hash, &derived, &zeros).as_ref().to_vec());

        Ok(Self {
            hash,
            master_secret,
            client_hs,
            server_hs,
            client_app: Zeroizing::new(Vec::new()),
            server_app: Zeroizing::new(Vec::new()),
        })
    }

    /// Derive the application traffic secrets once the transcript covers
    /// the server Finished.
    pub fn install_app_secrets<P: CryptoProvider>(
        &mut self,
        provider: &P,
        finished_transcript: &[u8],
    ) -> Result<()> {
        self.client_app = derive_secret(
            provider,
            self.hash,
            &self.master_secret,
            b"c ap traffic",
            finished_transcript,
        )?;
        self.server_app = derive_secret(
            provider,
            self.hash,
            &self.master_secret,
            b"s ap traffic",
            finished_transcript,
        )?;
        Ok(())
    }

    /// The finished key for a handshake traffic secret.
    pub fn finished_key<P: CryptoProvider>(
        &self,
        provider: &P,
        traffic_secret: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let mut key = Zeroizing::new(vec![0u8; self.hash.digest_len()]);
        hkdf_expand_label(provider, self.hash, traffic_secret, b"finished", b"", &mut key)?;
        Ok(key)
    }

    /// Next-generation application secret (RFC 8446 Sec.7.2 key update).
    pub fn next_generation<P: CryptoProvider>(
        &self,
        provider: &P,
        secret: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let mut next = Zeroizing::new(vec![0u8; self.hash.digest_len()]);
        hkdf_expand_label(provider, self.hash, secret, b"traffic upd", b"", &mut next)?;
        Ok(next)
    }

    /// The suite hash this schedule runs on.
    pub fn hash(&self) -> HashAlg {
        self.hash
    }
}

/// TLS 1.2 PRF (RFC 5246 Sec.5): `P_hash(secret, label || seed)`.
pub(crate) fn prf12<P: CryptoProvider>(
    provider: &P,
    hash: HashAlg,
    secret: &[u8],
    label: &[u8],
    seed: &[u8],
    out: &mut [u8],
) {
    let mut label_seed = Vec::with_capacity(label.len() + seed.len());
    label_seed.extend_from_slice(label);
    label_seed.extend_from_slice(seed);

    // A(1) = HMAC(secret, seed); A(i) = HMAC(secret, A(i-1))
    let mut a = provider.hmac(hash, secret, &label_seed);
    let mut offset = 0;
    while offset < out.len() {
        let mut block_input = Vec::with_capacity(a.len() + label_seed.len());
        block_input.extend_from_slice(a.as_ref());
        block_input.extend_from_slice(&label_seed);
        let block = provider.hmac(hash, secret, &block_input);
        let take = (out.len() - offset).min(block.len());
        out[offset..offset + take].copy_from_slice(&block.as_ref()[..take]);
        offset += take;
        a = provider.hmac(hash, secret, a.as_ref());
    }
}

/// TLS 1.2 master secret and key block for an AES-GCM suite.
pub(crate) struct KeyBlock12 {
    pub client_key: Zeroizing<Vec<u8>>,
    pub server_key: Zeroizing<Vec<u8>>,
    pub client_iv: [u8; 4],
    pub server_iv: [u8; 4],
}

/// Derive the TLS 1.2 master secret.
pub(crate) fn master_secret12<P: CryptoProvider>(
    provider: &P,
    hash: HashAlg,
    pre_master: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
) -> Zeroizing<Vec<u8>> {
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(client_random);
    seed[32..].copy_from_slice(server_random);
    let mut master = Zeroizing::new(vec![0u8; 48]);
    prf12(provider, hash, pre_master, b"master secret", &seed, &mut master);
    master
}

/// Expand the TLS 1.2 key block (GCM: no MAC keys, 4-byte fixed IVs).
pub(crate) fn key_block12<P: CryptoProvider>(
    provider: &P,
    hash: HashAlg,
    master: &[u8],
    client_random: &[u8; 32],
    server_random: &[u8; 32],
    key_len: usize,
) -> KeyBlock12 {
    // Key expansion seeds server_random || client_random.
    let mut seed = [0u8; 64];
    seed[..32].copy_from_slice(server_random);
    seed[32..].copy_from_slice(client_random);
    let mut block = Zeroizing::new(vec![0u8; 2 * key_len + 8]);
    prf12(provider, hash, master, b"key expansion", &seed, &mut block);

    let client_key = Zeroizing::new(block[..key_len].to_vec());
    let server_key = Zeroizing::new(block[key_len..2 * key_len].to_vec());
    let mut client_iv = [0u8; 4];
    let mut server_iv = [0u8; 4];
    client_iv.copy_from_slice(&block[2 * key_len..2 * key_len + 4]);
    server_iv.copy_from_slice(&block[2 * key_len + 4..2 * key_len + 8]);
    KeyBlock12 {
        client_key,
        server_key,
        client_iv,
        server_iv,
    }
}

/// TLS 1.2 Finished verify_data (12 bytes).
pub(crate) fn verify_data12<P: CryptoProvider>(
    provider: &P,
    hash: HashAlg,
    master: &[u8],
    label: &[u8],
    transcript_hash: &[u8],
) -> [u8; 12] {
    let mut out = [0u8; 12];
    prf12(provider, hash, master, label, transcript_hash, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{HkdfSha256, RingProvider};

    #[test]
    fn expand_label_matches_manual_construction() {
        let provider = RingProvider::new();
        let secret = [0x42u8; 32];
        let mut via_label = [0u8; 16];
        hkdf_expand_label(
            &provider,
            HashAlg::Sha256,
            &secret,
            b"key",
            b"",
            &mut via_label,
        )
        .unwrap();

        // HkdfLabel { length=16, label="tls13 key", context="" }
        let info: Vec<u8> = [
            &16u16.to_be_bytes()[..],
            &[9u8],
            b"tls13 key",
            &[0u8],
        ]
        .concat();
        let mut manual = [0u8; 16];
        HkdfSha256::expand(&secret, &info, &mut manual).unwrap();
        assert_eq!(via_label, manual);
    }

    #[test]
    fn schedule_is_deterministic_and_symmetric() {
        let provider = RingProvider::new();
        let shared = [0x13u8; 32];
        let transcript = crate::crypto::Sha256::digest(b"hello-transcript");
        let a = Schedule13::after_server_hello(
            &provider,
            HashAlg::Sha256,
            &shared,
            transcript.as_ref(),
        )
        .unwrap();
        let b = Schedule13::after_server_hello(
            &provider,
            HashAlg::Sha256,
            &shared,
            transcript.as_ref(),
        )
        .unwrap();
        assert_eq!(&*a.client_hs, &*b.client_hs);
        assert_eq!(&*a.server_hs, &*b.server_hs);
        assert_ne!(&*a.client_hs, &*a.server_hs);
    }

    #[test]
    fn app_secrets_depend_on_transcript() {
        let provider = RingProvider::new();
        let shared = [0x13u8; 32];
        let t1 = crate::crypto::Sha256::digest(b"one");
        let mut schedule = Schedule13::after_server_hello(
            &provider,
            HashAlg::Sha256,
            &shared,
            t1.as_ref(),
        )
        .unwrap();
        schedule
            .install_app_secrets(&provider, t1.as_ref())
            .unwrap();
        let first = schedule.client_app.clone();
        let t2 = crate::crypto::Sha256::digest(b"two");
        schedule
            .install_app_secrets(&provider, t2.as_ref())
            .unwrap();
        assert_ne!(&*first, &*schedule.client_app);
    }

    #[test]
    fn prf12_is_deterministic_and_expands() {
        let provider = RingProvider::new();
        let mut out1 = [0u8; 72];
        let mut out2 = [0u8; 72];
        prf12(
            &provider,
            HashAlg::Sha256,
            b"secret",
            b"master secret",
            b"seed",
            &mut out1,
        );
        prf12(
            &provider,
            HashAlg::Sha256,
            b"secret",
            b"master secret",
            b"seed",
            &mut out2,
        );
        assert_eq!(out1, out2);
        // A prefix must match a shorter expansion (streaming property).
        let mut short = [0u8; 32];
        prf12(
            &provider,
            HashAlg::Sha256,
            b"secret",
            b"master secret",
            b"seed",
            &mut short,
        );
        assert_eq!(&out1[..32], &short[..]);
    }

    #[test]
    fn key_block_partitions_are_disjoint() {
        let provider = RingProvider::new();
        let master = [0x55u8; 48];
        let block = key_block12(
            &provider,
            HashAlg::Sha256,
            &master,
            &[1u8; 32],
            &[2u8; 32],
            16,
        );
        assert_ne!(&*block.client_key, &*block.server_key);
        assert_ne!(block.client_iv, block.server_iv);
    }
}
