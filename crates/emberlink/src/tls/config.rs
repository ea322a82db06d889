// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! TLS client configuration.

use super::suites::Version;

/// Where the chain's trust anchor comes from.
#[derive(Clone, Debug, Default)]
pub enum TrustSource {
    /// The platform bundle (`webpki-roots`).
    #[default]
    PlatformBundle,
    /// A single caller-supplied CA certificate (DER).
    CustomCa(Vec<u8>),
}

/// Client configuration for one connection.
#[derive(Clone, Debug)]
pub struct TlsConfig {
    /// Target hostname: sent as SNI and matched against the leaf
    /// certificate (leftmost-label wildcard supported).
    pub server_name: String,

    /// Lowest acceptable protocol version.
    pub min_version: Version,

    /// Highest offered protocol version.
    pub max_version: Version,

    /// Trust anchor source for chain verification.
    pub trust: TrustSource,

    /// Skip certificate verification entirely. Test harnesses only.
    pub skip_cert_verify: bool,

    /// ALPN protocols, preference order; empty offers none.
    pub alpn: Vec<Vec<u8>>,

    /// Wall-clock time (unix seconds) for validity checks. `None` skips
    /// the window check explicitly, for targets without a clock.
    pub now_unix: Option<i64>,
}

impl TlsConfig {
    /// Config for `server_name` with platform trust and both versions.
    #[must_use]
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            server_name: server_name.into(),
            min_version: Version::Tls12,
            max_version: Version::Tls13,
            trust: TrustSource::PlatformBundle,
            skip_cert_verify: false,
            alpn: Vec::new(),
            now_unix: None,
        }
    }

    /// Pin a single custom CA (DER) as the only trust anchor.
    #[must_use]
    pub fn with_custom_ca(mut self, ca_der: Vec<u8>) -> Self {
        self.trust = TrustSource::CustomCa(ca_der);
        self
    }

    /// Supply the current time for validity-window checks.
    #[must_use]
    pub fn with_clock(mut self, now_unix: i64) -> Self {
        self.now_unix = Some(now_unix);
        self
    }

    /// Restrict to TLS 1.3 only.
    #[must_use]
    pub fn tls13_only(mut self) -> Self {
        self.min_version = Version::Tls13;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults() {
        let cfg = TlsConfig::new("example.com");
        assert_eq!(cfg.server_name, "example.com");
        assert_eq!(cfg.min_version, Version::Tls12);
        assert_eq!(cfg.max_version, Version::Tls13);
        assert!(!cfg.skip_cert_verify);
        assert!(cfg.now_unix.is_none());
    }

    #[test]
    fn tls13_only_raises_floor() {
        let cfg = TlsConfig::new("example.com").tls13_only();
        assert_eq!(cfg.min_version, Version::Tls13);
    }
}
