// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Handshake message framing and codecs (RFC 8446 Sec.4, RFC 5246 Sec.7.4).

use super::error::{Result, TlsError};
use super::suites::{CipherSuite, Version};
use crate::crypto::{KxGroup, SigScheme};

/// ClientHello message type.
pub const HS_CLIENT_HELLO: u8 = 1;
/// ServerHello message type.
pub const HS_SERVER_HELLO: u8 = 2;
/// NewSessionTicket message type (TLS 1.3; ignored by this client).
pub const HS_NEW_SESSION_TICKET: u8 = 4;
/// EncryptedExtensions message type (TLS 1.3).
pub const HS_ENCRYPTED_EXTENSIONS: u8 = 8;
/// Certificate message type.
pub const HS_CERTIFICATE: u8 = 11;
/// ServerKeyExchange message type (TLS 1.2).
pub const HS_SERVER_KEY_EXCHANGE: u8 = 12;
/// ServerHelloDone message type (TLS 1.2).
pub const HS_SERVER_HELLO_DONE: u8 = 14;
/// CertificateVerify message type (TLS 1.3).
pub const HS_CERTIFICATE_VERIFY: u8 = 15;
/// ClientKeyExchange message type (TLS 1.2).
pub const HS_CLIENT_KEY_EXCHANGE: u8 = 16;
/// Finished message type.
pub const HS_FINISHED: u8 = 20;
/// KeyUpdate message type (TLS 1.3).
pub const HS_KEY_UPDATE: u8 = 24;

const EXT_SERVER_NAME: u16 = 0;
const EXT_SUPPORTED_GROUPS: u16 = 10;
const EXT_EC_POINT_FORMATS: u16 = 11;
const EXT_SIGNATURE_ALGORITHMS: u16 = 13;
const EXT_ALPN: u16 = 16;
const EXT_SUPPORTED_VERSIONS: u16 = 43;
const EXT_KEY_SHARE: u16 = 51;

/// One complete handshake message, with its framed bytes for transcripts.
#[derive(Clone, Debug)]
pub struct HandshakeMsg {
    /// Message type byte.
    pub msg_type: u8,
    /// Message body (after the 4-byte header).
    pub body: Vec<u8>,
    /// The full framed message (header + body).
    pub raw: Vec<u8>,
}

/// Frame a handshake body: type + 24-bit length + body.
#[must_use]
pub fn frame(msg_type: u8, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + body.len());
    out.push(msg_type);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(body);
    out
}

/// Accumulates handshake-record payloads and yields complete messages;
/// messages may span records and records may carry several messages.
#[derive(Default)]
pub struct MsgBuffer {
    buf: Vec<u8>,
}

impl MsgBuffer {
    /// Append a handshake record payload.
    pub fn push(&mut self, payload: &[u8]) {
        self.buf.extend_from_slice(payload);
    }

    /// Pop the next complete message, if any.
    pub fn next(&mut self) -> Option<HandshakeMsg> {
        if self.buf.len() < 4 {
            return None;
        }
        let body_len =
            usize::from(self.buf[1]) << 16 | usize::from(self.buf[2]) << 8 | usize::from(self.buf[3]);
        let total = 4 + body_len;
        if self.buf.len() < total {
            return None;
        }
        let raw: Vec<u8> = self.buf.drain(..total).collect();
        Some(HandshakeMsg {
            msg_type: raw[0],
            body: raw[4..].to_vec(),
            raw,
        })
    }

    /// Bytes of an incomplete trailing message.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Bounds-checked big-endian reader.
struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(TlsError::Protocol("truncated handshake message".into()));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u24(&mut self) -> Result<usize> {
        let b = self.take(3)?;
        Ok(usize::from(b[0]) << 16 | usize::from(b[1]) << 8 | usize::from(b[2]))
    }

    fn vec8(&mut self) -> Result<&'a [u8]> {
        let len = usize::from(self.u8()?);
        self.take(len)
    }

    fn vec16(&mut self) -> Result<&'a [u8]> {
        let len = usize::from(self.u16()?);
        self.take(len)
    }
}

/// Inputs to the ClientHello builder.
pub struct ClientHelloParams<'a> {
    /// 32-byte client random.
    pub random: [u8; 32],
    /// Legacy session id (32 random bytes for middlebox compatibility).
    pub session_id: [u8; 32],
    /// Offered suites, preference order.
    pub suites: &'a [CipherSuite],
    /// SNI hostname.
    pub server_name: &'a str,
    /// X25519 key-share public key.
    pub key_share_x25519: &'a [u8],
    /// Offer TLS 1.3.
    pub offer_tls13: bool,
    /// Offer TLS 1.2.
    pub offer_tls12: bool,
    /// ALPN protocol names; empty omits the extension.
    pub alpn: &'a [Vec<u8>],
}

/// Build a framed ClientHello.
#[must_use]
pub fn build_client_hello(params: &ClientHelloParams<'_>) -> Vec<u8> {
    let mut body = Vec::with_capacity(256);
    body.extend_from_slice(&Version::Tls12.wire().to_be_bytes()); // legacy_version
    body.extend_from_slice(&params.random);
    body.push(32);
    body.extend_from_slice(&params.session_id);

    body.extend_from_slice(&((params.suites.len() * 2) as u16).to_be_bytes());
    for suite in params.suites {
        body.extend_from_slice(&suite.code().to_be_bytes());
    }
    body.extend_from_slice(&[1, 0]); // null compression only

    let mut exts = Vec::with_capacity(128);

    // server_name: one host_name entry.
    let name = params.server_name.as_bytes();
    let mut sni = Vec::with_capacity(5 + name.len());
    sni.extend_from_slice(&((name.len() + 3) as u16).to_be_bytes());
    sni.push(0); // host_name
    sni.extend_from_slice(&(name.len() as u16).to_be_bytes());
    sni.extend_from_slice(name);
    push_extension(&mut exts, EXT_SERVER_NAME, &sni);

    // supported_groups.
    let groups = [KxGroup::X25519, KxGroup::P256, KxGroup::P384];
    let mut body_groups = Vec::with_capacity(2 + groups.len() * 2);
    body_groups.extend_from_slice(&((groups.len() * 2) as u16).to_be_bytes());
    for group in groups {
        body_groups.extend_from_slice(&group.code().to_be_bytes());
    }
    push_extension(&mut exts, EXT_SUPPORTED_GROUPS, &body_groups);

    // ec_point_formats: uncompressed (TLS 1.2 interop).
    push_extension(&mut exts, EXT_EC_POINT_FORMATS, &[1, 0]);

    // signature_algorithms.
    let schemes = [
        SigScheme::EcdsaP256Sha256,
        SigScheme::EcdsaP384Sha384,
        SigScheme::RsaPssSha256,
        SigScheme::RsaPssSha384,
        SigScheme::RsaPkcs1Sha256,
        SigScheme::RsaPkcs1Sha384,
    ];
    let mut body_sig = Vec::with_capacity(2 + schemes.len() * 2);
    body_sig.extend_from_slice(&((schemes.len() * 2) as u16).to_be_bytes());
    for scheme in schemes {
        body_sig.extend_from_slice(&scheme.code().to_be_bytes());
    }
    push_extension(&mut exts, EXT_SIGNATURE_ALGORITHMS, &body_sig);

    // alpn.
    if !params.alpn.is_empty() {
        let mut list = Vec::new();
        for proto in params.alpn {
            list.push(proto.len() as u8);
            list.extend_from_slice(proto);
        }
        let mut body_alpn = Vec::with_capacity(2 + list.len());
        body_alpn.extend_from_slice(&(list.len() as u16).to_be_bytes());
        body_alpn.extend_from_slice(&list);
        push_extension(&mut exts, EXT_ALPN, &body_alpn);
    }

    // supported_versions.
    if params.offer_tls13 {
        let mut versions = Vec::with_capacity(5);
        let mut list = Vec::with_capacity(4);
        list.extend_from_slice(&Version::Tls13.wire().to_be_bytes());
        if params.offer_tls12 {
            list.extend_from_slice(&Version::Tls12.wire().to_be_bytes());
        }
        versions.push(list.len() as u8);
        versions.extend_from_slice(&list);
        push_extension(&mut exts, EXT_SUPPORTED_VERSIONS, &versions);

        // key_share: a single X25519 entry.
        let share = params.key_share_x25519;
        let mut body_ks = Vec::with_capacity(6 + share.len());
        body_ks.extend_from_slice(&((share.len() + 4) as u16).to_be_bytes());
        body_ks.extend_from_slice(&KxGroup::X25519.code().to_be_bytes());
        body_ks.extend_from_slice(&(share.len() as u16).to_be_bytes());
        body_ks.extend_from_slice(share);
        push_extension(&mut exts, EXT_KEY_SHARE, &body_ks);
    }

    body.extend_from_slice(&(exts.len() as u16).to_be_bytes());
    body.extend_from_slice(&exts);
    frame(HS_CLIENT_HELLO, &body)
}

fn push_extension(out: &mut Vec<u8>, ext_type: u16, body: &[u8]) {
    out.extend_from_slice(&ext_type.to_be_bytes());
    out.extend_from_slice(&(body.len() as u16).to_be_bytes());
    out.extend_from_slice(body);
}

/// Parsed ServerHello.
#[derive(Debug)]
pub struct ServerHello {
    /// Negotiated version (supported_versions extension, else legacy).
    pub version: Version,
    /// Server random.
    pub random: [u8; 32],
    /// Selected suite.
    pub suite: CipherSuite,
    /// TLS 1.3 key share: group and server public key.
    pub key_share: Option<(KxGroup, Vec<u8>)>,
}

/// Parse a ServerHello body.
pub fn parse_server_hello(body: &[u8]) -> Result<ServerHello> {
    let mut r = Reader::new(body);
    let legacy_version = r.u16()?;
    let mut random = [0u8; 32];
    random.copy_from_slice(r.take(32)?);
    let _session_id = r.vec8()?;
    let suite_code = r.u16()?;
    let suite = CipherSuite::from_code(suite_code).ok_or_else(|| {
        TlsError::HandshakeFailed(format!("server selected unknown suite 0x{:04x}", suite_code))
    })?;
    let _compression = r.u8()?;

    let mut version = match legacy_version {
        0x0303 => Version::Tls12,
        other => {
            return Err(TlsError::HandshakeFailed(format!(
                "unsupported legacy version 0x{:04x}",
                other
            )))
        }
    };
    let mut key_share = None;

    if r.remaining() > 0 {
        let mut exts = Reader::new(r.vec16()?);
        while exts.remaining() >= 4 {
            let ext_type = exts.u16()?;
            let ext_body = exts.vec16()?;
            match ext_type {
                EXT_SUPPORTED_VERSIONS => {
                    let mut er = Reader::new(ext_body);
                    if er.u16()? == Version::Tls13.wire() {
                        version = Version::Tls13;
                    }
                }
                EXT_KEY_SHARE => {
                    let mut er = Reader::new(ext_body);
                    let group_code = er.u16()?;
                    let group = KxGroup::from_code(group_code).ok_or_else(|| {
                        TlsError::HandshakeFailed(format!(
                            "server key share on unknown group 0x{:04x}",
                            group_code
                        ))
                    })?;
                    key_share = Some((group, er.vec16()?.to_vec()));
                }
                _ => {}
            }
        }
    }

    Ok(ServerHello {
        version,
        random,
        suite,
        key_share,
    })
}

/// Parse a TLS 1.3 Certificate body into DER certificates, dropping the
/// per-certificate extensions.
pub fn parse_certificates_13(body: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut r = Reader::new(body);
    let _context = r.vec8()?;
    let total = r.u24()?;
    let mut list = Reader::new(r.take(total)?);
    let mut certs = Vec::new();
    while list.remaining() > 0 {
        let len = list.u24()?;
        certs.push(list.take(len)?.to_vec());
        let _extensions = list.vec16()?;
    }
    Ok(certs)
}

/// Parse a TLS 1.2 Certificate body into DER certificates.
pub fn parse_certificates_12(body: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut r = Reader::new(body);
    let total = r.u24()?;
    let mut list = Reader::new(r.take(total)?);
    let mut certs = Vec::new();
    while list.remaining() > 0 {
        let len = list.u24()?;
        certs.push(list.take(len)?.to_vec());
    }
    Ok(certs)
}

/// Parsed CertificateVerify (TLS 1.3).
#[derive(Debug)]
pub struct CertificateVerify {
    /// Signature scheme.
    pub scheme: SigScheme,
    /// Signature bytes.
    pub signature: Vec<u8>,
}

/// Parse a CertificateVerify body.
pub fn parse_certificate_verify(body: &[u8]) -> Result<CertificateVerify> {
    let mut r = Reader::new(body);
    let code = r.u16()?;
    let scheme = SigScheme::from_code(code).ok_or_else(|| {
        TlsError::HandshakeFailed(format!("unknown signature scheme 0x{:04x}", code))
    })?;
    let signature = r.vec16()?.to_vec();
    Ok(CertificateVerify { scheme, signature })
}

/// Parsed TLS 1.2 ECDHE ServerKeyExchange.
#[derive(Debug)]
pub struct ServerKeyExchange {
    /// Selected curve.
    pub group: KxGroup,
    /// Server ephemeral public key.
    pub public_key: Vec<u8>,
    /// Signature scheme over the params.
    pub scheme: SigScheme,
    /// Signature bytes.
    pub signature: Vec<u8>,
    /// The raw `ServerECDHParams` bytes covered by the signature.
    pub params_raw: Vec<u8>,
}

/// Parse a TLS 1.2 ServerKeyExchange body (named-curve ECDHE only).
pub fn parse_server_key_exchange(body: &[u8]) -> Result<ServerKeyExchange> {
    let mut r = Reader::new(body);
    let params_start = 0;
    let curve_type = r.u8()?;
    if curve_type != 3 {
        return Err(TlsError::HandshakeFailed(
            "non-named-curve ECDHE params".into(),
        ));
    }
    let group_code = r.u16()?;
    let group = KxGroup::from_code(group_code).ok_or_else(|| {
        TlsError::HandshakeFailed(format!("unknown named curve 0x{:04x}", group_code))
    })?;
    let public_key = r.vec8()?.to_vec();
    let params_end = r.pos;
    let scheme_code = r.u16()?;
    let scheme = SigScheme::from_code(scheme_code).ok_or_else(|| {
        TlsError::HandshakeFailed(format!("unknown signature scheme 0x{:04x}", scheme_code))
    })?;
    let signature = r.vec16()?.to_vec();
    Ok(ServerKeyExchange {
        group,
        public_key,
        scheme,
        signature,
        params_raw: body[params_start..params_end].to_vec(),
    })
}

/// Build a framed TLS 1.2 ClientKeyExchange carrying an EC point.
#[must_use]
pub fn build_client_key_exchange(public_key: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(1 + public_key.len());
    body.push(public_key.len() as u8);
    body.extend_from_slice(public_key);
    frame(HS_CLIENT_KEY_EXCHANGE, &body)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_hello_params<'a>(share: &'a [u8], alpn: &'a [Vec<u8>]) -> ClientHelloParams<'a> {
        ClientHelloParams {
            random: [7u8; 32],
            session_id: [9u8; 32],
            suites: CipherSuite::ALL,
            server_name: "sensor.example",
            key_share_x25519: share,
            offer_tls13: true,
            offer_tls12: true,
            alpn,
        }
    }

    #[test]
    fn msg_buffer_reassembles_split_messages() {
        let framed = frame(HS_FINISHED, &[0xab; 32]);
        let mut buf = MsgBuffer::default();
        buf.push(&framed[..10]);
        assert!(buf.next().is_none());
        buf.push(&framed[10..]);
        let msg = buf.next().unwrap();
        assert_eq!(msg.msg_type, HS_FINISHED);
        assert_eq!(msg.body, vec![0xab; 32]);
        assert_eq!(msg.raw, framed);
        assert_eq!(buf.pending(), 0);
    }

    #[test]
    fn msg_buffer_yields_coalesced_messages() {
        let mut wire = frame(HS_SERVER_HELLO_DONE, &[]);
        wire.extend_from_slice(&frame(HS_FINISHED, &[1, 2, 3]));
        let mut buf = MsgBuffer::default();
        buf.push(&wire);
        assert_eq!(buf.next().unwrap().msg_type, HS_SERVER_HELLO_DONE);
        assert_eq!(buf.next().unwrap().msg_type, HS_FINISHED);
        assert!(buf.next().is_none());
    }

    #[test]
    fn client_hello_carries_sni_and_key_share() {
        let share = [0x55u8; 32];
        let hello = build_client_hello(&sample_hello_params(&share, &[]));
        assert_eq!(hello[0], HS_CLIENT_HELLO);
        let hay = &hello[..];
        let needle = b"sensor.example";
        assert!(hay.windows(needle.len()).any(|w| w == needle));
        assert!(hay.windows(share.len()).any(|w| w == share));
    }

    #[test]
    fn certificates_12_parse() {
        // Two fake "certificates".
        let c1 = vec![0xde; 5];
        let c2 = vec![0xad; 3];
        let mut list = Vec::new();
        for c in [&c1, &c2] {
            list.extend_from_slice(&(c.len() as u32).to_be_bytes()[1..]);
            list.extend_from_slice(c);
        }
        let mut body = Vec::new();
        body.extend_from_slice(&(list.len() as u32).to_be_bytes()[1..]);
        body.extend_from_slice(&list);
        assert_eq!(parse_certificates_12(&body).unwrap(), vec![c1, c2]);
    }

    #[test]
    fn server_key_exchange_roundtrip() {
        let mut body = vec![3u8]; // named curve
        body.extend_from_slice(&KxGroup::X25519.code().to_be_bytes());
        body.push(32);
        body.extend_from_slice(&[0x11; 32]);
        body.extend_from_slice(&SigScheme::RsaPkcs1Sha256.code().to_be_bytes());
        body.extend_from_slice(&4u16.to_be_bytes());
        body.extend_from_slice(&[0xaa; 4]);
        let ske = parse_server_key_exchange(&body).unwrap();
        assert_eq!(ske.group, KxGroup::X25519);
        assert_eq!(ske.public_key, vec![0x11; 32]);
        assert_eq!(ske.scheme, SigScheme::RsaPkcs1Sha256);
        assert_eq!(ske.params_raw, &body[..36]);
    }

    #[test]
    fn certificates_13_parse_with_extensions() {
        let cert = vec![0x30, 0x82, 0x01, 0x00];
        let mut entry = Vec::new();
        entry.extend_from_slice(&(cert.len() as u32).to_be_bytes()[1..]);
        entry.extend_from_slice(&cert);
        entry.extend_from_slice(&0u16.to_be_bytes()); // no extensions
        let mut body = vec![0u8]; // empty context
        body.extend_from_slice(&(entry.len() as u32).to_be_bytes()[1..]);
        body.extend_from_slice(&entry);
        assert_eq!(parse_certificates_13(&body).unwrap(), vec![cert]);
    }

    #[test]
    fn truncated_server_hello_is_rejected() {
        assert!(parse_server_hello(&[0x03]).is_err());
    }
}
