// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! The TLS client handshake state machine.
//!
//! TLS 1.3 path:
//! `idle -> client_hello -> server_hello -> encrypted_extensions ->
//! certificate -> certificate_verify -> finished -> established`.
//!
//! TLS 1.2 path:
//! `idle -> client_hello -> server_hello -> certificate ->
//! server_key_exchange -> server_hello_done -> client_key_exchange ->
//! change_cipher_spec -> finished -> established`.
//!
//! Every inbound message is accepted only when it matches the next
//! expected state; anything else aborts the connection with
//! `HandshakeFailed` and no keys installed.

use super::config::TlsConfig;
use super::error::{Result, TlsError};
use super::keys::{self, Schedule13};
use super::messages::{self, HandshakeMsg, MsgBuffer};
use super::record::{
    traffic_keys, RecordLayer, CONTENT_ALERT, CONTENT_APPDATA, CONTENT_CCS, CONTENT_HANDSHAKE,
};
use super::suites::{CipherSuite, Version};
use super::verify;
use crate::config::TLS_MAX_FRAGMENT;
use crate::crypto::{CryptoProvider, Digest, HashCtx, KeyExchangeState, KxGroup};
use crate::net::Transport;
use zeroize::Zeroizing;

/// Connection state (the coarse, observable machine).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TlsState {
    /// Nothing sent yet.
    Idle,
    /// ClientHello on the wire.
    ClientHelloSent,
    /// ServerHello accepted; keys may be installed (1.3).
    ServerHelloReceived,
    /// Certificate chain accepted.
    CertVerified,
    /// Peer Finished verified.
    Finished,
    /// Application data may flow.
    Established,
    /// Torn down; nothing may flow.
    Closed,
}

/// The next handshake message the machine will accept.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Expect {
    ServerHello,
    // TLS 1.3
    EncryptedExtensions,
    Certificate13,
    CertificateVerify,
    Finished13,
    // TLS 1.2
    Certificate12,
    ServerKeyExchange,
    ServerHelloDone,
    ChangeCipherSpec,
    Finished12,
    // Post-handshake
    None,
}

/// Transcript hash: buffers until the suite fixes the hash, then streams.
enum Transcript {
    Buffering(Vec<u8>),
    Hashing(HashCtx),
}

impl Transcript {
    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Buffering(buf) => buf.extend_from_slice(data),
            Self::Hashing(ctx) => ctx.update(data),
        }
    }

    fn start_hash<P: CryptoProvider>(&mut self, provider: &P, alg: crate::crypto::HashAlg) {
        if let Self::Buffering(buf) = self {
            let mut ctx = provider.hash_ctx(alg);
            ctx.update(buf);
            *self = Self::Hashing(ctx);
        }
    }

    fn hash(&self) -> Digest {
        match self {
            Self::Hashing(ctx) => ctx.snapshot(),
            Self::Buffering(_) => unreachable!("transcript hash requested before suite selection"),
        }
    }
}

/// An authenticated, confidential byte stream over a transport capability.
pub struct TlsClient<T: Transport, P: CryptoProvider> {
    transport: T,
    provider: P,
    config: TlsConfig,
    record: RecordLayer,
    state: TlsState,
    expect: Expect,
    version: Version,
    suite: Option<CipherSuite>,
    transcript: Transcript,
    msgs: MsgBuffer,
    kx: Option<Box<dyn KeyExchangeState>>,
    schedule: Option<Schedule13>,
    // TLS 1.2 material.
    client_random: [u8; 32],
    server_random: [u8; 32],
    master12: Option<Zeroizing<Vec<u8>>>,
    pending_ske: Option<messages::ServerKeyExchange>,
    pending_block12: Option<(Zeroizing<Vec<u8>>, [u8; 4])>,
    chain: Vec<Vec<u8>>,
}

impl<T: Transport, P: CryptoProvider> TlsClient<T, P> {
    /// Connect: run the full handshake to `Established`.
    pub fn connect(transport: T, provider: P, config: TlsConfig) -> Result<Self> {
        let mut client = Self {
            transport,
            provider,
            config,
            record: RecordLayer::new(),
            state: TlsState::Idle,
            expect: Expect::ServerHello,
            version: Version::Tls13,
            suite: None,
            transcript: Transcript::Buffering(Vec::new()),
            msgs: MsgBuffer::default(),
            kx: None,
            schedule: None,
            client_random: [0u8; 32],
            server_random: [0u8; 32],
            master12: None,
            pending_ske: None,
            pending_block12: None,
            chain: Vec::new(),
        };
        match client.handshake() {
            Ok(()) => Ok(client),
            Err(e) => {
                client.record.close();
                client.state = TlsState::Closed;
                log::debug!("[TLS] handshake aborted: {}", e);
                Err(e)
            }
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> TlsState {
        self.state
    }

    /// The negotiated version (meaningful once established).
    #[must_use]
    pub fn version(&self) -> Version {
        self.version
    }

    /// The negotiated suite, once the ServerHello was accepted.
    #[must_use]
    pub fn suite(&self) -> Option<CipherSuite> {
        self.suite
    }

    // ------------------------------------------------------------ handshake

    fn handshake(&mut self) -> Result<()> {
        let mut session_id = [0u8; 32];
        self.provider.random(&mut self.client_random)?;
        self.provider.random(&mut session_id)?;
        self.kx = Some(self.provider.kx_generate(KxGroup::X25519)?);

        let offer_tls13 = self.config.max_version >= Version::Tls13;
        let offer_tls12 = self.config.min_version <= Version::Tls12;
        let key_share = self.kx.as_ref().expect("generated above").public().to_vec();
        let hello = messages::build_client_hello(&messages::ClientHelloParams {
            random: self.client_random,
            session_id,
            suites: CipherSuite::ALL,
            server_name: &self.config.server_name,
            key_share_x25519: &key_share,
            offer_tls13,
            offer_tls12,
            alpn: &self.config.alpn,
        });
        self.transcript.update(&hello);
        self.record
            .write_record(&mut self.transport, CONTENT_HANDSHAKE, &hello)?;
        self.state = TlsState::ClientHelloSent;
        log::debug!(
            "[TLS] ClientHello sent (sni={}, 1.3={}, 1.2={})",
            self.config.server_name,
            offer_tls13,
            offer_tls12
        );

        while self.state != TlsState::Established {
            let record = self.record.read_record(&mut self.transport)?;
            match record.content_type {
                CONTENT_HANDSHAKE => {
                    self.msgs.push(&record.payload);
                    while let Some(msg) = self.msgs.next() {
                        self.handle_handshake_message(&msg)?;
                    }
                }
                CONTENT_CCS => {
                    if self.expect == Expect::ChangeCipherSpec {
                        self.install_read_keys_12()?;
                        self.expect = Expect::Finished12;
                    }
                    // TLS 1.3 compatibility CCS is ignored.
                }
                CONTENT_ALERT => return Err(alert_error(&record.payload)),
                other => {
                    return Err(TlsError::Protocol(format!(
                        "content type {} during handshake",
                        other
                    )))
                }
            }
        }
        Ok(())
    }

    fn handle_handshake_message(&mut self, msg: &HandshakeMsg) -> Result<()> {
        use messages::*;
        match (self.expect, msg.msg_type) {
            (Expect::ServerHello, HS_SERVER_HELLO) => self.on_server_hello(msg),
            (Expect::EncryptedExtensions, HS_ENCRYPTED_EXTENSIONS) => {
                self.transcript.update(&msg.raw);
                self.expect = Expect::Certificate13;
                Ok(())
            }
            (Expect::Certificate13, HS_CERTIFICATE) => {
                self.transcript.update(&msg.raw);
                self.chain = parse_certificates_13(&msg.body)?;
                self.expect = Expect::CertificateVerify;
                Ok(())
            }
            (Expect::CertificateVerify, HS_CERTIFICATE_VERIFY) => self.on_certificate_verify(msg),
            (Expect::Finished13, HS_FINISHED) => self.on_finished_13(msg),
            (Expect::Certificate12, HS_CERTIFICATE) => {
                self.transcript.update(&msg.raw);
                self.chain = parse_certificates_12(&msg.body)?;
                self.verify_chain()?;
                self.state = TlsState::CertVerified;
                self.expect = Expect::ServerKeyExchange;
                Ok(())
            }
            (Expect::ServerKeyExchange, HS_SERVER_KEY_EXCHANGE) => self.on_server_key_exchange(msg),
            (Expect::ServerHelloDone, HS_SERVER_HELLO_DONE) => self.on_server_hello_done(msg),
            (Expect::Finished12, HS_FINISHED) => self.on_finished_12(msg),
            (expected, got) => Err(TlsError::HandshakeFailed(format!(
                "message type {} while expecting {:?}",
                got, expected
            ))),
        }
    }

    fn on_server_hello(&mut self, msg: &HandshakeMsg) -> Result<()> {
        let hello = messages::parse_server_hello(&msg.body)?;
        if hello.version > self.config.max_version || hello.version < self.config.min_version {
            return Err(TlsError::HandshakeFailed(format!(
                "server selected {:?} outside the configured range",
                hello.version
            )));
        }
        if hello.suite.is_tls13() != (hello.version == Version::Tls13) {
            return Err(TlsError::HandshakeFailed(
                "suite does not match negotiated version".into(),
            ));
        }
        self.version = hello.version;
        self.suite = Some(hello.suite);
        self.server_random = hello.random;
        self.transcript.update(&msg.raw);
        self.transcript.start_hash(&self.provider, hello.suite.hash());
        self.state = TlsState::ServerHelloReceived;
        log::debug!(
            "[TLS] ServerHello: {:?} suite {:?}",
            hello.version,
            hello.suite
        );

        if hello.version == Version::Tls13 {
            let (group, server_share) = hello.key_share.ok_or_else(|| {
                TlsError::HandshakeFailed("TLS 1.3 ServerHello without key share".into())
            })?;
            let kx = self
                .kx
                .take()
                .ok_or_else(|| TlsError::HandshakeFailed("key exchange consumed".into()))?;
            if group != kx.group() {
                // HelloRetryRequest-style group switching is not supported.
                return Err(TlsError::HandshakeFailed(format!(
                    "server key share on {:?}, offered {:?}",
                    group,
                    kx.group()
                )));
            }
            let shared = kx.agree(&server_share)?;
            let suite = hello.suite;
            let schedule = Schedule13::after_server_hello(
                &self.provider,
                suite.hash(),
                &shared,
                self.transcript.hash().as_ref(),
            )?;
            let (key, iv) =
                traffic_keys(&self.provider, suite.hash(), suite.aead(), &schedule.server_hs)?;
            self.record
                .install_read_keys(suite.aead(), &key, &iv, true);
            let (key, iv) =
                traffic_keys(&self.provider, suite.hash(), suite.aead(), &schedule.client_hs)?;
            self.record
                .install_write_keys(suite.aead(), &key, &iv, true);
            self.schedule = Some(schedule);
            self.expect = Expect::EncryptedExtensions;
        } else {
            self.expect = Expect::Certificate12;
        }
        Ok(())
    }

    fn on_certificate_verify(&mut self, msg: &HandshakeMsg) -> Result<()> {
        let cv = messages::parse_certificate_verify(&msg.body)?;
        if !self.config.skip_cert_verify {
            self.verify_chain()?;
            // Signed content: 64 spaces, context string, NUL, transcript
            // hash through Certificate (RFC 8446 Sec.4.4.3).
            let mut content = Vec::with_capacity(98 + 48);
            content.extend_from_slice(&[0x20u8; 64]);
            content.extend_from_slice(b"TLS 1.3, server CertificateVerify");
            content.push(0);
            content.extend_from_slice(self.transcript.hash().as_ref());
            let leaf_spki = leaf_spki_bits(&self.chain)?;
            self.provider
                .verify_signature(cv.scheme, &leaf_spki, &content, &cv.signature)
                .map_err(|_| {
                    TlsError::HandshakeFailed("CertificateVerify signature invalid".into())
                })?;
        }
        self.transcript.update(&msg.raw);
        self.state = TlsState::CertVerified;
        self.expect = Expect::Finished13;
        Ok(())
    }

    fn on_finished_13(&mut self, msg: &HandshakeMsg) -> Result<()> {
        let suite = self.suite.expect("set at ServerHello");
        let schedule = self.schedule.as_mut().expect("set at ServerHello");

        let th = self.transcript.hash();
        let finished_key = schedule.finished_key(&self.provider, &schedule.server_hs)?;
        self.provider
            .hmac_verify(suite.hash(), &finished_key, th.as_ref(), &msg.body)
            .map_err(|_| TlsError::HandshakeFailed("server Finished verify_data mismatch".into()))?;
        self.transcript.update(&msg.raw);
        self.state = TlsState::Finished;

        // Application secrets derive from the transcript through the
        // server Finished; the client Finished is sent under the
        // handshake keys.
        let th_server_finished = self.transcript.hash();
        schedule.install_app_secrets(&self.provider, th_server_finished.as_ref())?;

        let finished_key = schedule.finished_key(&self.provider, &schedule.client_hs)?;
        let verify_data = self
            .provider
            .hmac(suite.hash(), &finished_key, th_server_finished.as_ref());
        let finished = messages::frame(messages::HS_FINISHED, verify_data.as_ref());
        self.transcript.update(&finished);
        self.record
            .write_record(&mut self.transport, CONTENT_HANDSHAKE, &finished)?;

        let schedule = self.schedule.as_ref().expect("still set");
        let (key, iv) =
            traffic_keys(&self.provider, suite.hash(), suite.aead(), &schedule.server_app)?;
        self.record
            .install_read_keys(suite.aead(), &key, &iv, true);
        let (key, iv) =
            traffic_keys(&self.provider, suite.hash(), suite.aead(), &schedule.client_app)?;
        self.record
            .install_write_keys(suite.aead(), &key, &iv, true);

        self.state = TlsState::Established;
        self.expect = Expect::None;
        log::info!(
            "[TLS] established: TLS 1.3, suite {:?}, sni {}",
            suite,
            self.config.server_name
        );
        Ok(())
    }

    fn on_server_key_exchange(&mut self, msg: &HandshakeMsg) -> Result<()> {
        let ske = messages::parse_server_key_exchange(&msg.body)?;
        if !self.config.skip_cert_verify {
            // Signature covers client_random || server_random || params.
            let mut signed = Vec::with_capacity(64 + ske.params_raw.len());
            signed.extend_from_slice(&self.client_random);
            signed.extend_from_slice(&self.server_random);
            signed.extend_from_slice(&ske.params_raw);
            let leaf_spki = leaf_spki_bits(&self.chain)?;
            self.provider
                .verify_signature(ske.scheme, &leaf_spki, &signed, &ske.signature)
                .map_err(|_| {
                    TlsError::HandshakeFailed("ServerKeyExchange signature invalid".into())
                })?;
        }
        let kx = self.provider.kx_generate(ske.group)?;
        self.transcript.update(&msg.raw);
        // The ClientKeyExchange goes out at ServerHelloDone; stash the
        // exchange state until then.
        self.kx = Some(kx);
        self.expect = Expect::ServerHelloDone;
        self.pending_ske = Some(ske);
        Ok(())
    }

    fn on_server_hello_done(&mut self, msg: &HandshakeMsg) -> Result<()> {
        let suite = self.suite.expect("set at ServerHello");
        self.transcript.update(&msg.raw);
        let ske = self
            .pending_ske
            .take()
            .ok_or_else(|| TlsError::HandshakeFailed("missing ServerKeyExchange".into()))?;
        let kx = self
            .kx
            .take()
            .ok_or_else(|| TlsError::HandshakeFailed("key exchange consumed".into()))?;
        let public = kx.public().to_vec();
        let pre_master = kx.agree(&ske.public_key)?;

        let cke = messages::build_client_key_exchange(&public);
        self.transcript.update(&cke);
        self.record
            .write_record(&mut self.transport, CONTENT_HANDSHAKE, &cke)?;

        let master = keys::master_secret12(
            &self.provider,
            suite.hash(),
            &pre_master,
            &self.client_random,
            &self.server_random,
        );
        let block = keys::key_block12(
            &self.provider,
            suite.hash(),
            &master,
            &self.client_random,
            &self.server_random,
            suite.aead().key_len(),
        );

        // ChangeCipherSpec, then Finished under the new write keys.
        self.record
            .write_record(&mut self.transport, CONTENT_CCS, &[1])?;
        self.record
            .install_write_keys(suite.aead(), &block.client_key, &block.client_iv, false);

        let verify_data = keys::verify_data12(
            &self.provider,
            suite.hash(),
            &master,
            b"client finished",
            self.transcript.hash().as_ref(),
        );
        let finished = messages::frame(messages::HS_FINISHED, &verify_data);
        self.transcript.update(&finished);
        self.record
            .write_record(&mut self.transport, CONTENT_HANDSHAKE, &finished)?;

        self.master12 = Some(master);
        self.pending_block12 = Some((block.server_key, block.server_iv));
        self.expect = Expect::ChangeCipherSpec;
        Ok(())
    }

    fn install_read_keys_12(&mut self) -> Result<()> {
        let suite = self.suite.expect("set at ServerHello");
        let (server_key, server_iv) = self
            .pending_block12
            .take()
            .ok_or_else(|| TlsError::HandshakeFailed("CCS before key material".into()))?;
        self.record
            .install_read_keys(suite.aead(), &server_key, &server_iv, false);
        Ok(())
    }

    fn on_finished_12(&mut self, msg: &HandshakeMsg) -> Result<()> {
        let suite = self.suite.expect("set at ServerHello");
        let master = self
            .master12
            .as_ref()
            .ok_or_else(|| TlsError::HandshakeFailed("Finished before master secret".into()))?;
        let expected = keys::verify_data12(
            &self.provider,
            suite.hash(),
            master,
            b"server finished",
            self.transcript.hash().as_ref(),
        );
        if expected.as_slice() != msg.body.as_slice() {
            return Err(TlsError::HandshakeFailed(
                "server Finished verify_data mismatch".into(),
            ));
        }
        self.transcript.update(&msg.raw);
        self.state = TlsState::Established;
        self.expect = Expect::None;
        log::info!(
            "[TLS] established: TLS 1.2, suite {:?}, sni {}",
            suite,
            self.config.server_name
        );
        Ok(())
    }

    fn verify_chain(&self) -> Result<()> {
        if self.config.skip_cert_verify {
            log::warn!("[TLS] certificate verification skipped by configuration");
            return Ok(());
        }
        verify::verify_chain(
            &self.provider,
            &self.chain,
            &self.config.trust,
            &self.config.server_name,
            self.config.now_unix,
        )?;
        Ok(())
    }

    // ---------------------------------------------------------- application

    /// Send application data (fragmented per the record limit).
    pub fn send(&mut self, data: &[u8]) -> Result<()> {
        if self.state != TlsState::Established {
            return Err(TlsError::Closed);
        }
        for chunk in data.chunks(TLS_MAX_FRAGMENT) {
            self.record
                .write_record(&mut self.transport, CONTENT_APPDATA, chunk)?;
        }
        Ok(())
    }

    /// Receive one record's worth of application data.
    pub fn recv(&mut self) -> Result<Vec<u8>> {
        if self.state != TlsState::Established {
            return Err(TlsError::Closed);
        }
        loop {
            let record = match self.record.read_record(&mut self.transport) {
                Ok(record) => record,
                Err(e) => {
                    self.state = TlsState::Closed;
                    return Err(e);
                }
            };
            match record.content_type {
                CONTENT_APPDATA => {
                    if record.payload.is_empty() {
                        continue;
                    }
                    return Ok(record.payload);
                }
                CONTENT_HANDSHAKE => self.on_post_handshake(&record.payload)?,
                CONTENT_ALERT => {
                    self.state = TlsState::Closed;
                    self.record.close();
                    return Err(alert_error(&record.payload));
                }
                CONTENT_CCS => {}
                other => {
                    return Err(TlsError::Protocol(format!(
                        "unexpected content type {}",
                        other
                    )))
                }
            }
        }
    }

    fn on_post_handshake(&mut self, payload: &[u8]) -> Result<()> {
        self.msgs.push(payload);
        while let Some(msg) = self.msgs.next() {
            match msg.msg_type {
                messages::HS_NEW_SESSION_TICKET => {
                    // Session resumption is not implemented; tickets drop.
                }
                messages::HS_KEY_UPDATE => self.on_key_update(&msg.body)?,
                other => {
                    return Err(TlsError::Protocol(format!(
                        "post-handshake message type {}",
                        other
                    )))
                }
            }
        }
        Ok(())
    }

    fn on_key_update(&mut self, body: &[u8]) -> Result<()> {
        let suite = self.suite.expect("established");
        let schedule = self.schedule.as_mut().ok_or_else(|| {
            TlsError::Protocol("KeyUpdate on a TLS 1.2 connection".into())
        })?;
        let next = schedule.next_generation(&self.provider, &schedule.server_app)?;
        schedule.server_app = next;
        let (key, iv) =
            traffic_keys(&self.provider, suite.hash(), suite.aead(), &schedule.server_app)?;
        self.record
            .install_read_keys(suite.aead(), &key, &iv, true);

        if body.first() == Some(&1) {
            // update_requested: answer with our own KeyUpdate and roll the
            // write direction.
            let msg = messages::frame(messages::HS_KEY_UPDATE, &[0]);
            self.record
                .write_record(&mut self.transport, CONTENT_HANDSHAKE, &msg)?;
            let schedule = self.schedule.as_mut().expect("checked above");
            let next = schedule.next_generation(&self.provider, &schedule.client_app)?;
            schedule.client_app = next;
            let (key, iv) = traffic_keys(
                &self.provider,
                suite.hash(),
                suite.aead(),
                &schedule.client_app,
            )?;
            self.record
                .install_write_keys(suite.aead(), &key, &iv, true);
        }
        Ok(())
    }

    /// Send close_notify and close the connection.
    pub fn close(&mut self) {
        if self.state == TlsState::Established {
            // warning(1) close_notify(0)
            let _ = self
                .record
                .write_record(&mut self.transport, CONTENT_ALERT, &[1, 0]);
        }
        self.state = TlsState::Closed;
        self.record.close();
        self.transport.close();
    }
}

fn alert_error(payload: &[u8]) -> TlsError {
    match payload {
        [_, 0] => TlsError::Io(crate::net::IoError::ConnectionClosed),
        [_, desc] => TlsError::PeerAlert(*desc),
        _ => TlsError::Protocol("malformed alert".into()),
    }
}

fn leaf_spki_bits(chain: &[Vec<u8>]) -> Result<Vec<u8>> {
    use x509_parser::prelude::FromDer;
    let leaf = chain
        .first()
        .ok_or_else(|| TlsError::HandshakeFailed("empty certificate chain".into()))?;
    let (_, cert) = x509_parser::certificate::X509Certificate::from_der(leaf)
        .map_err(|_| TlsError::Certificate(super::error::CertificateError::ParseFailed))?;
    Ok(cert
        .tbs_certificate
        .subject_pki
        .subject_public_key
        .data
        .as_ref()
        .to_vec())
}
