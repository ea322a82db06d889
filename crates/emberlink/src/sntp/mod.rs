// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! SNTP client (RFC 5905 subset).
//!
//! Fixed 48-byte packets, client mode, version 4. The Transmit Timestamp
//! of every request is a high-entropy nonce; a response is accepted only
//! if its Origin Timestamp echoes that nonce exactly. When the socket
//! capability reports source addresses ([`Datagram::HAS_SOURCE_ADDR`]),
//! packets from unexpected IPs are discarded silently - they neither
//! count as retries nor abort the exchange.

use crate::crypto::CryptoError;
use crate::net::{Datagram, IoError};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use std::time::{Duration, Instant};

/// NTP port.
pub const NTP_PORT: u16 = 123;
/// NTP packet size (no extensions, no MAC).
pub const PACKET_LEN: usize = 48;
/// Offset between the NTP era (1900) and the unix epoch (1970), seconds.
pub const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// SNTP client failures.
#[derive(Debug)]
pub enum SntpError {
    /// Socket failure.
    Io(IoError),
    /// No acceptable response within the time budget.
    Timeout,
    /// A response from a legitimate server failed the origin-timestamp
    /// echo check. Surfaced separately from transport errors.
    OriginMismatch,
    /// The server answered with stratum 0 (kiss-of-death).
    KissOfDeath,
    /// Malformed or non-server-mode packet.
    Protocol(&'static str),
    /// Entropy source failure while generating the nonce.
    Random(CryptoError),
}

impl fmt::Display for SntpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "socket error: {}", e),
            Self::Timeout => write!(f, "no acceptable NTP response"),
            Self::OriginMismatch => write!(f, "origin timestamp mismatch"),
            Self::KissOfDeath => write!(f, "server sent kiss-of-death (stratum 0)"),
            Self::Protocol(what) => write!(f, "malformed NTP packet: {}", what),
            Self::Random(e) => write!(f, "nonce generation failed: {}", e),
        }
    }
}

impl std::error::Error for SntpError {}

impl From<IoError> for SntpError {
    fn from(e: IoError) -> Self {
        match e {
            IoError::Timeout => Self::Timeout,
            other => Self::Io(other),
        }
    }
}

/// Result alias for SNTP operations.
pub type Result<T> = std::result::Result<T, SntpError>;

/// A 64-bit NTP timestamp: seconds since 1900 plus a binary fraction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NtpTimestamp {
    /// Seconds since the NTP era.
    pub seconds: u32,
    /// Fractional seconds (1/2^32 units).
    pub fraction: u32,
}

impl NtpTimestamp {
    /// Raw 64-bit representation.
    #[must_use]
    pub const fn to_bits(self) -> u64 {
        (self.seconds as u64) << 32 | self.fraction as u64
    }

    /// From the raw 64-bit representation.
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self {
            seconds: (bits >> 32) as u32,
            fraction: bits as u32,
        }
    }

    /// Unix seconds, truncating the fraction. Era-0 times before 1970
    /// saturate at zero.
    #[must_use]
    pub const fn unix_seconds(self) -> u64 {
        (self.seconds as u64).saturating_sub(NTP_UNIX_OFFSET)
    }
}

/// A decoded NTP packet (header fields only; no extensions).
#[derive(Clone, Copy, Debug, Default)]
pub struct NtpPacket {
    /// Leap indicator (2 bits).
    pub leap: u8,
    /// Protocol version (3 bits).
    pub version: u8,
    /// Association mode (3 bits); 3 = client, 4 = server.
    pub mode: u8,
    /// Server stratum; 0 is kiss-of-death.
    pub stratum: u8,
    /// Poll exponent.
    pub poll: i8,
    /// Precision exponent.
    pub precision: i8,
    /// Root delay (NTP short format).
    pub root_delay: u32,
    /// Root dispersion (NTP short format).
    pub root_dispersion: u32,
    /// Reference identifier.
    pub reference_id: u32,
    /// Reference timestamp.
    pub reference_ts: NtpTimestamp,
    /// Origin timestamp (echo of the client's transmit).
    pub origin_ts: NtpTimestamp,
    /// Receive timestamp.
    pub receive_ts: NtpTimestamp,
    /// Transmit timestamp.
    pub transmit_ts: NtpTimestamp,
}

impl NtpPacket {
    /// Encode into the 48-byte wire format.
    #[must_use]
    pub fn encode(&self) -> [u8; PACKET_LEN] {
        let mut out = [0u8; PACKET_LEN];
        out[0] = (self.leap & 0b11) << 6 | (self.version & 0b111) << 3 | (self.mode & 0b111);
        out[1] = self.stratum;
        out[2] = self.poll as u8;
        out[3] = self.precision as u8;
        out[4..8].copy_from_slice(&self.root_delay.to_be_bytes());
        out[8..12].copy_from_slice(&self.root_dispersion.to_be_bytes());
        out[12..16].copy_from_slice(&self.reference_id.to_be_bytes());
        out[16..24].copy_from_slice(&self.reference_ts.to_bits().to_be_bytes());
        out[24..32].copy_from_slice(&self.origin_ts.to_bits().to_be_bytes());
        out[32..40].copy_from_slice(&self.receive_ts.to_bits().to_be_bytes());
        out[40..48].copy_from_slice(&self.transmit_ts.to_bits().to_be_bytes());
        out
    }

    /// Decode from wire bytes (at least 48).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PACKET_LEN {
            return Err(SntpError::Protocol("short packet"));
        }
        let u32_at = |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let ts_at = |i: usize| {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(&bytes[i..i + 8]);
            NtpTimestamp::from_bits(u64::from_be_bytes(raw))
        };
        Ok(Self {
            leap: bytes[0] >> 6,
            version: (bytes[0] >> 3) & 0b111,
            mode: bytes[0] & 0b111,
            stratum: bytes[1],
            poll: bytes[2] as i8,
            precision: bytes[3] as i8,
            root_delay: u32_at(4),
            root_dispersion: u32_at(8),
            reference_id: u32_at(12),
            reference_ts: ts_at(16),
            origin_ts: ts_at(24),
            receive_ts: ts_at(32),
            transmit_ts: ts_at(40),
        })
    }
}

/// A validated server response.
#[derive(Clone, Copy, Debug)]
pub struct SntpResponse {
    /// The responding server.
    pub server: [u8; 4],
    /// Server stratum (>= 1).
    pub stratum: u8,
    /// Server transmit time.
    pub transmit_ts: NtpTimestamp,
    /// Round-trip time observed by this client.
    pub round_trip: Duration,
}

/// Query a single server.
pub fn query<S: Datagram>(
    socket: &mut S,
    server: [u8; 4],
    port: u16,
    timeout: Duration,
) -> Result<SntpResponse> {
    query_race(socket, &[server], port, timeout)
}

/// Query several servers at once; the first legitimate responder wins.
///
/// All servers receive the same nonce'd request. Responses are validated
/// in arrival order: source-IP (when the capability reports sources),
/// mode, origin-timestamp echo, stratum.
pub fn query_race<S: Datagram>(
    socket: &mut S,
    servers: &[[u8; 4]],
    port: u16,
    timeout: Duration,
) -> Result<SntpResponse> {
    if servers.is_empty() {
        return Err(SntpError::Protocol("no servers"));
    }
    let nonce = transmit_nonce()?;
    let request = NtpPacket {
        version: 4,
        mode: 3,
        transmit_ts: nonce,
        ..NtpPacket::default()
    };
    let wire = request.encode();
    for server in servers {
        socket.send_to(*server, port, &wire).map_err(SntpError::from)?;
        log::debug!(
            "[SNTP] query -> {}.{}.{}.{}:{}",
            server[0],
            server[1],
            server[2],
            server[3],
            port
        );
    }

    let started = Instant::now();
    let deadline = started + timeout;
    let mut buf = [0u8; 128];
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(SntpError::Timeout);
        }
        let (n, source) = if S::HAS_SOURCE_ADDR {
            let (n, addr, _) = recv_with_deadline(socket, &mut buf, remaining, true)?;
            (n, Some(addr))
        } else {
            let (n, _, _) = recv_with_deadline(socket, &mut buf, remaining, false)?;
            (n, None)
        };

        if let Some(source) = source {
            if !servers.contains(&source) {
                // RFC 5905-style source validation: silent discard, no
                // retry charge.
                log::debug!(
                    "[SNTP] discarding packet from unexpected source {}.{}.{}.{}",
                    source[0],
                    source[1],
                    source[2],
                    source[3]
                );
                continue;
            }
        }

        let packet = NtpPacket::decode(&buf[..n])?;
        if packet.mode != 4 {
            return Err(SntpError::Protocol("not a server-mode packet"));
        }
        if packet.origin_ts != nonce {
            return Err(SntpError::OriginMismatch);
        }
        if packet.stratum == 0 {
            return Err(SntpError::KissOfDeath);
        }
        let server = source.unwrap_or(servers[0]);
        log::debug!(
            "[SNTP] accepted response from {}.{}.{}.{} stratum {}",
            server[0],
            server[1],
            server[2],
            server[3],
            packet.stratum
        );
        return Ok(SntpResponse {
            server,
            stratum: packet.stratum,
            transmit_ts: packet.transmit_ts,
            round_trip: started.elapsed(),
        });
    }
}

fn recv_with_deadline<S: Datagram>(
    socket: &mut S,
    buf: &mut [u8],
    remaining: Duration,
    with_addr: bool,
) -> Result<(usize, [u8; 4], u16)> {
    use crate::net::{PollFlags, Transport};
    let ready = socket.poll(
        PollFlags::READABLE,
        u32::try_from(remaining.as_millis()).unwrap_or(u32::MAX),
    )?;
    if !ready.contains(PollFlags::READABLE) {
        return Err(SntpError::Timeout);
    }
    if with_addr {
        let (n, addr, port) = socket.recv_from_addr(buf)?;
        Ok((n, addr, port))
    } else {
        let n = socket.recv_from(buf)?;
        Ok((n, [0, 0, 0, 0], 0))
    }
}

fn transmit_nonce() -> Result<NtpTimestamp> {
    let rng = SystemRandom::new();
    let mut raw = [0u8; 8];
    rng.fill(&mut raw)
        .map_err(|_| SntpError::Random(CryptoError::RandomFailed))?;
    Ok(NtpTimestamp::from_bits(u64::from_be_bytes(raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_roundtrip() {
        let packet = NtpPacket {
            leap: 0,
            version: 4,
            mode: 3,
            stratum: 2,
            poll: 6,
            precision: -20,
            root_delay: 0x0001_0203,
            root_dispersion: 0x0405_0607,
            reference_id: u32::from_be_bytes(*b"GPS\0"),
            reference_ts: NtpTimestamp::from_bits(0x1122_3344_5566_7788),
            origin_ts: NtpTimestamp::from_bits(0xaabb_ccdd_eeff_0011),
            receive_ts: NtpTimestamp::from_bits(1),
            transmit_ts: NtpTimestamp::from_bits(2),
        };
        let wire = packet.encode();
        let decoded = NtpPacket::decode(&wire).unwrap();
        assert_eq!(decoded.version, 4);
        assert_eq!(decoded.mode, 3);
        assert_eq!(decoded.stratum, 2);
        assert_eq!(decoded.precision, -20);
        assert_eq!(decoded.origin_ts, packet.origin_ts);
        assert_eq!(decoded.transmit_ts, packet.transmit_ts);
    }

    #[test]
    fn short_packet_is_rejected() {
        assert!(matches!(
            NtpPacket::decode(&[0u8; 47]),
            Err(SntpError::Protocol(_))
        ));
    }

    #[test]
    fn unix_conversion() {
        // 2024-01-01T00:00:00Z = unix 1704067200 = ntp 3913056000
        let ts = NtpTimestamp {
            seconds: 3_913_056_000,
            fraction: 0,
        };
        assert_eq!(ts.unix_seconds(), 1_704_067_200);
    }

    #[test]
    fn nonce_is_high_entropy() {
        let a = transmit_nonce().unwrap();
        let b = transmit_nonce().unwrap();
        assert_ne!(a, b);
        assert_ne!(a.to_bits(), 0);
    }
}
