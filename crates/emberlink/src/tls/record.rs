// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! TLS record layer.
//!
//! Frames payloads under the 5-byte header, encrypts under the current
//! write keys and decrypts under the current read keys, maintaining
//! per-direction sequence numbers. Nonce construction follows the
//! RFC-mandated schemes: IV XOR sequence for TLS 1.3 (RFC 8446 Sec.5.3),
//! implicit-salt + explicit 8-byte nonce for TLS 1.2 AES-GCM (RFC 5288).
//!
//! Any decryption failure poisons the layer: the connection is `Closed`
//! and the failing record's plaintext is never exposed.

use super::error::{Result, TlsError};
use crate::config::TLS_MAX_FRAGMENT;
use crate::crypto::{AeadAlg, CryptoProvider};
use crate::net::{IoError, PollFlags, Transport};
use zeroize::Zeroizing;

/// ChangeCipherSpec content type.
pub const CONTENT_CCS: u8 = 20;
/// Alert content type.
pub const CONTENT_ALERT: u8 = 21;
/// Handshake content type.
pub const CONTENT_HANDSHAKE: u8 = 22;
/// Application data content type.
pub const CONTENT_APPDATA: u8 = 23;

/// Record header length.
const HEADER_LEN: usize = 5;
/// Ciphertext expansion bound accepted from the peer.
const MAX_CIPHERTEXT: usize = TLS_MAX_FRAGMENT + 256;

/// Keys for one direction.
struct DirectionKeys {
    alg: AeadAlg,
    key: Zeroizing<Vec<u8>>,
    /// 12-byte IV for TLS 1.3; 4-byte implicit salt for TLS 1.2 GCM.
    iv: Zeroizing<Vec<u8>>,
    tls13: bool,
}

/// One decoded record.
#[derive(Debug)]
pub struct Record {
    /// Content type (after TLS 1.3 inner-type recovery).
    pub content_type: u8,
    /// Decrypted payload.
    pub payload: Vec<u8>,
}

/// The record layer over a transport.
pub struct RecordLayer {
    read_keys: Option<DirectionKeys>,
    write_keys: Option<DirectionKeys>,
    read_seq: u64,
    write_seq: u64,
    closed: bool,
}

impl RecordLayer {
    /// A fresh, plaintext record layer.
    #[must_use]
    pub fn new() -> Self {
        Self {
            read_keys: None,
            write_keys: None,
            read_seq: 0,
            write_seq: 0,
            closed: false,
        }
    }

    /// Install read-direction keys; resets the read sequence number.
    pub fn install_read_keys(&mut self, alg: AeadAlg, key: &[u8], iv: &[u8], tls13: bool) {
        self.read_keys = Some(DirectionKeys {
            alg,
            key: Zeroizing::new(key.to_vec()),
            iv: Zeroizing::new(iv.to_vec()),
            tls13,
        });
        self.read_seq = 0;
    }

    /// Install write-direction keys; resets the write sequence number.
    pub fn install_write_keys(&mut self, alg: AeadAlg, key: &[u8], iv: &[u8], tls13: bool) {
        self.write_keys = Some(DirectionKeys {
            alg,
            key: Zeroizing::new(key.to_vec()),
            iv: Zeroizing::new(iv.to_vec()),
            tls13,
        });
        self.write_seq = 0;
    }

    /// Whether a decryption failure or close poisoned the layer.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Mark the layer closed (alert paths).
    pub fn close(&mut self) {
        self.closed = true;
    }

    /// Write one record, encrypting when write keys are installed.
    ///
    /// `payload` must not exceed the plaintext fragment limit; the
    /// handshake layer fragments above this call.
    pub fn write_record<T: Transport>(
        &mut self,
        transport: &mut T,
        content_type: u8,
        payload: &[u8],
    ) -> Result<()> {
        if self.closed {
            return Err(TlsError::Closed);
        }
        debug_assert!(payload.len() <= TLS_MAX_FRAGMENT);

        let wire = match &self.write_keys {
            None => {
                let mut wire = Vec::with_capacity(HEADER_LEN + payload.len());
                wire.push(content_type);
                wire.extend_from_slice(&0x0303u16.to_be_bytes());
                wire.extend_from_slice(&(payload.len() as u16).to_be_bytes());
                wire.extend_from_slice(payload);
                wire
            }
            Some(keys) if keys.tls13 => {
                // Inner plaintext: content || real type; outer type 23.
                let mut inner = Vec::with_capacity(payload.len() + 1);
                inner.extend_from_slice(payload);
                inner.push(content_type);

                let nonce = nonce_13(&keys.iv, self.write_seq);
                let ct_len = inner.len() + keys.alg.tag_len();
                let mut aad = Vec::with_capacity(HEADER_LEN);
                aad.push(CONTENT_APPDATA);
                aad.extend_from_slice(&0x0303u16.to_be_bytes());
                aad.extend_from_slice(&(ct_len as u16).to_be_bytes());

                let sealed =
                    crate::crypto::aead::seal(keys.alg, &keys.key, &nonce, &aad, &inner)?;
                let mut wire = Vec::with_capacity(HEADER_LEN + sealed.len());
                wire.push(CONTENT_APPDATA);
                wire.extend_from_slice(&0x0303u16.to_be_bytes());
                wire.extend_from_slice(&(sealed.len() as u16).to_be_bytes());
                wire.extend_from_slice(&sealed);
                self.write_seq += 1;
                wire
            }
            Some(keys) => {
                // TLS 1.2 AES-GCM: explicit nonce = sequence number.
                let explicit = self.write_seq.to_be_bytes();
                let mut nonce = [0u8; 12];
                nonce[..4].copy_from_slice(&keys.iv);
                nonce[4..].copy_from_slice(&explicit);

                let mut aad = Vec::with_capacity(13);
                aad.extend_from_slice(&self.write_seq.to_be_bytes());
                aad.push(content_type);
                aad.extend_from_slice(&0x0303u16.to_be_bytes());
                aad.extend_from_slice(&(payload.len() as u16).to_be_bytes());

                let sealed =
                    crate::crypto::aead::seal(keys.alg, &keys.key, &nonce, &aad, payload)?;
                let body_len = 8 + sealed.len();
                let mut wire = Vec::with_capacity(HEADER_LEN + body_len);
                wire.push(content_type);
                wire.extend_from_slice(&0x0303u16.to_be_bytes());
                wire.extend_from_slice(&(body_len as u16).to_be_bytes());
                wire.extend_from_slice(&explicit);
                wire.extend_from_slice(&sealed);
                self.write_seq += 1;
                wire
            }
        };
        write_all(transport, &wire)?;
        Ok(())
    }

    /// Read and decrypt one record.
    pub fn read_record<T: Transport>(&mut self, transport: &mut T) -> Result<Record> {
        if self.closed {
            return Err(TlsError::Closed);
        }
        let mut header = [0u8; HEADER_LEN];
        read_full(transport, &mut header)?;
        let content_type = header[0];
        let length = usize::from(u16::from_be_bytes([header[3], header[4]]));
        if length == 0 || length > MAX_CIPHERTEXT {
            self.closed = true;
            return Err(TlsError::Protocol(format!(
                "record length {} outside limits",
                length
            )));
        }
        let mut body = vec![0u8; length];
        read_full(transport, &mut body)?;

        let Some(keys) = &self.read_keys else {
            return Ok(Record {
                content_type,
                payload: body,
            });
        };

        // Unencrypted ChangeCipherSpec is tolerated mid-handshake (1.3
        // compatibility mode).
        if keys.tls13 && content_type == CONTENT_CCS {
            return Ok(Record {
                content_type,
                payload: body,
            });
        }

        if keys.tls13 {
            let nonce = nonce_13(&keys.iv, self.read_seq);
            let mut aad = Vec::with_capacity(HEADER_LEN);
            aad.extend_from_slice(&header);
            match crate::crypto::aead::open(keys.alg, &keys.key, &nonce, &aad, &body) {
                Ok(mut inner) => {
                    self.read_seq += 1;
                    // Strip zero padding, recover the inner content type.
                    while inner.last() == Some(&0) {
                        inner.pop();
                    }
                    let Some(real_type) = inner.pop() else {
                        self.closed = true;
                        return Err(TlsError::Protocol("empty inner plaintext".into()));
                    };
                    Ok(Record {
                        content_type: real_type,
                        payload: inner,
                    })
                }
                Err(_) => {
                    self.closed = true;
                    Err(TlsError::AuthenticationFailed)
                }
            }
        } else {
            if body.len() < 8 + keys.alg.tag_len() {
                self.closed = true;
                return Err(TlsError::AuthenticationFailed);
            }
            let (explicit, ciphertext) = body.split_at(8);
            let mut nonce = [0u8; 12];
            nonce[..4].copy_from_slice(&keys.iv);
            nonce[4..].copy_from_slice(explicit);

            let plaintext_len = ciphertext.len() - keys.alg.tag_len();
            let mut aad = Vec::with_capacity(13);
            aad.extend_from_slice(&self.read_seq.to_be_bytes());
            aad.push(content_type);
            aad.extend_from_slice(&0x0303u16.to_be_bytes());
            aad.extend_from_slice(&(plaintext_len as u16).to_be_bytes());

            match crate::crypto::aead::open(keys.alg, &keys.key, &nonce, &aad, ciphertext) {
                Ok(payload) => {
                    self.read_seq += 1;
                    Ok(Record {
                        content_type,
                        payload,
                    })
                }
                Err(_) => {
                    self.closed = true;
                    Err(TlsError::AuthenticationFailed)
                }
            }
        }
    }
}

impl Default for RecordLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// TLS 1.3 per-record nonce: static IV XOR big-endian sequence number.
fn nonce_13(iv: &[u8], seq: u64) -> [u8; 12] {
    let mut nonce = [0u8; 12];
    nonce.copy_from_slice(iv);
    for (i, byte) in seq.to_be_bytes().iter().enumerate() {
        nonce[4 + i] ^= byte;
    }
    nonce
}

fn read_full<T: Transport>(transport: &mut T, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        match transport.read(&mut buf[filled..]) {
            Ok(0) => return Err(TlsError::Io(IoError::ConnectionClosed)),
            Ok(n) => filled += n,
            Err(e) if e.is_would_block() => {
                transport.poll(PollFlags::READABLE, 1_000)?;
            }
            Err(e) => return Err(TlsError::Io(e)),
        }
    }
    Ok(())
}

fn write_all<T: Transport>(transport: &mut T, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        match transport.write(buf) {
            Ok(0) => return Err(TlsError::Io(IoError::ConnectionClosed)),
            Ok(n) => buf = &buf[n..],
            Err(e) if e.is_would_block() => {
                transport.poll(PollFlags::WRITABLE, 1_000)?;
            }
            Err(e) => return Err(TlsError::Io(e)),
        }
    }
    Ok(())
}

/// A provider-independent helper: derive and install TLS 1.3 traffic keys
/// from a traffic secret.
pub(crate) fn traffic_keys<P: CryptoProvider>(
    provider: &P,
    suite_hash: crate::crypto::HashAlg,
    alg: AeadAlg,
    secret: &[u8],
) -> Result<(Zeroizing<Vec<u8>>, Zeroizing<Vec<u8>>)> {
    let mut key = Zeroizing::new(vec![0u8; alg.key_len()]);
    let mut iv = Zeroizing::new(vec![0u8; alg.nonce_len()]);
    super::keys::hkdf_expand_label(provider, suite_hash, secret, b"key", b"", &mut key)?;
    super::keys::hkdf_expand_label(provider, suite_hash, secret, b"iv", b"", &mut iv)?;
    Ok((key, iv))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::MemoryStream;

    fn keyed_pair(tls13: bool) -> (RecordLayer, RecordLayer, MemoryStream, MemoryStream) {
        let (a, b) = MemoryStream::pair();
        let key = [0x11u8; 16];
        let iv = if tls13 { vec![0x22u8; 12] } else { vec![0x22u8; 4] };
        let mut writer = RecordLayer::new();
        writer.install_write_keys(AeadAlg::Aes128Gcm, &key, &iv, tls13);
        let mut reader = RecordLayer::new();
        reader.install_read_keys(AeadAlg::Aes128Gcm, &key, &iv, tls13);
        (writer, reader, a, b)
    }

    #[test]
    fn plaintext_record_roundtrip() {
        let (mut a, mut b) = MemoryStream::pair();
        let mut writer = RecordLayer::new();
        let mut reader = RecordLayer::new();
        writer
            .write_record(&mut a, CONTENT_HANDSHAKE, b"hello")
            .unwrap();
        let record = reader.read_record(&mut b).unwrap();
        assert_eq!(record.content_type, CONTENT_HANDSHAKE);
        assert_eq!(record.payload, b"hello");
    }

    #[test]
    fn tls13_encrypted_roundtrip_recovers_inner_type() {
        let (mut writer, mut reader, mut a, mut b) = keyed_pair(true);
        writer
            .write_record(&mut a, CONTENT_HANDSHAKE, b"finished-ish")
            .unwrap();
        let record = reader.read_record(&mut b).unwrap();
        assert_eq!(record.content_type, CONTENT_HANDSHAKE);
        assert_eq!(record.payload, b"finished-ish");
    }

    #[test]
    fn tls12_encrypted_roundtrip() {
        let (mut writer, mut reader, mut a, mut b) = keyed_pair(false);
        writer
            .write_record(&mut a, CONTENT_APPDATA, b"legacy data")
            .unwrap();
        let record = reader.read_record(&mut b).unwrap();
        assert_eq!(record.content_type, CONTENT_APPDATA);
        assert_eq!(record.payload, b"legacy data");
    }

    #[test]
    fn sequence_numbers_advance() {
        let (mut writer, mut reader, mut a, mut b) = keyed_pair(true);
        for i in 0..3u8 {
            writer
                .write_record(&mut a, CONTENT_APPDATA, &[i])
                .unwrap();
        }
        for i in 0..3u8 {
            assert_eq!(reader.read_record(&mut b).unwrap().payload, vec![i]);
        }
    }

    #[test]
    fn tampered_record_closes_layer_without_plaintext() {
        let (mut writer, mut reader, mut a, mut b) = keyed_pair(true);
        writer
            .write_record(&mut a, CONTENT_APPDATA, b"secret payload")
            .unwrap();

        // Intercept the wire bytes and flip one ciphertext bit.
        let mut raw = MemoryStream::pair();
        let mut wire = Vec::new();
        let mut chunk = [0u8; 256];
        loop {
            match b.poll(PollFlags::READABLE, 10) {
                Ok(flags) if flags.contains(PollFlags::READABLE) => {
                    let n = b.read(&mut chunk).unwrap();
                    if n == 0 {
                        break;
                    }
                    wire.extend_from_slice(&chunk[..n]);
                }
                _ => break,
            }
        }
        wire[HEADER_LEN] ^= 0xff;
        raw.0.write(&wire).unwrap();

        let result = reader.read_record(&mut raw.1);
        assert!(matches!(result, Err(TlsError::AuthenticationFailed)));
        assert!(reader.is_closed());
        assert!(matches!(
            reader.read_record(&mut raw.1),
            Err(TlsError::Closed)
        ));
    }

    #[test]
    fn out_of_order_ciphertext_is_rejected() {
        let (mut writer, mut reader, mut a, mut b) = keyed_pair(true);
        writer.write_record(&mut a, CONTENT_APPDATA, b"one").unwrap();
        writer.write_record(&mut a, CONTENT_APPDATA, b"two").unwrap();

        // Skip the first record on the wire: the reader's sequence number
        // no longer matches and the nonce check must fail.
        let mut header = [0u8; HEADER_LEN];
        read_full(&mut b, &mut header).unwrap();
        let skip = usize::from(u16::from_be_bytes([header[3], header[4]]));
        let mut discard = vec![0u8; skip];
        read_full(&mut b, &mut discard).unwrap();

        assert!(matches!(
            reader.read_record(&mut b),
            Err(TlsError::AuthenticationFailed)
        ));
    }

    #[test]
    fn oversized_record_is_protocol_error() {
        let (mut a, mut b) = MemoryStream::pair();
        let mut reader = RecordLayer::new();
        let mut wire = vec![CONTENT_APPDATA, 0x03, 0x03];
        wire.extend_from_slice(&0xffffu16.to_be_bytes());
        wire.extend_from_slice(&[0u8; 64]);
        a.write(&wire).unwrap();
        drop(a);
        assert!(matches!(
            reader.read_record(&mut b),
            Err(TlsError::Protocol(_))
        ));
    }
}
