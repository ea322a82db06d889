// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! TLS 1.2/1.3 client core.
//!
//! An authenticated, confidential byte stream over a transport capability,
//! generic over the crypto capability (Sec. [`crate::crypto`]):
//!
//! - **Record layer**: 5-byte framing, per-direction sequence numbers used
//!   in the AEAD nonce construction, tamper-fatal decryption.
//! - **Handshake state machine**: the 1.3 and 1.2 paths, each inbound
//!   message accepted only in its expected state.
//! - **X.509 verification**: chain signatures, validity windows against a
//!   caller-supplied clock, custom single anchor or the platform bundle,
//!   SNI hostname matching with leftmost-label wildcards.
//!
//! # Example
//!
//! ```no_run
//! use emberlink::net::TcpSocket;
//! use emberlink::crypto::RingProvider;
//! use emberlink::tls::{TlsClient, TlsConfig};
//!
//! # fn main() -> emberlink::tls::Result<()> {
//! let socket = TcpSocket::connect([93, 184, 216, 34], 443, None)
//!     .map_err(emberlink::tls::TlsError::Io)?;
//! let config = TlsConfig::new("example.com").with_clock(1_754_000_000);
//! let mut tls = TlsClient::connect(socket, RingProvider::new(), config)?;
//! tls.send(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n")?;
//! let response = tls.recv()?;
//! # let _ = response;
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - [RFC 8446](https://www.rfc-editor.org/rfc/rfc8446) -- TLS 1.3
//! - [RFC 5246](https://www.rfc-editor.org/rfc/rfc5246) -- TLS 1.2
//! - [RFC 5280](https://www.rfc-editor.org/rfc/rfc5280) -- X.509 PKI

mod client;
mod config;
mod error;
mod keys;
mod messages;
mod record;
mod suites;
mod verify;

pub use client::{TlsClient, TlsState};
pub use config::{TlsConfig, TrustSource};
pub use error::{CertificateError, Result, TlsError};
pub use record::{Record, RecordLayer};
pub use suites::{CipherSuite, Version};
pub use verify::hostname_matches;
