// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Transport and socket capabilities.
//!
//! The [`Transport`] trait is the byte-stream contract every protocol core
//! (TLS records, SNTP datagram exchange) is generic over. Socket
//! implementations are built with `socket2` and converted into `std::net`
//! types for I/O; readiness polling goes through `poll(2)`.
//!
//! # Modules
//!
//! - `tcp` - TCP stream socket
//! - `udp` - UDP datagram socket with optional source-address reporting
//! - `memory` - in-process duplex stream for intra-process links
//! - `addr` - textual address parsing helpers

mod addr;
mod memory;
mod tcp;
mod udp;

pub use addr::parse_ipv4;
pub use memory::MemoryStream;
pub use tcp::TcpSocket;
pub use udp::UdpSocket;

use crate::cap::{facts, Cap, Contract, Meta};
use std::fmt;
use std::io;

/// Readiness interest / result flags for [`Transport::poll`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PollFlags(u8);

impl PollFlags {
    /// Readable: a `read` will not block.
    pub const READABLE: Self = Self(0x1);
    /// Writable: a `write` will not block.
    pub const WRITABLE: Self = Self(0x2);
    /// Error or hang-up condition on the descriptor.
    pub const ERROR: Self = Self(0x4);

    /// No flags set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Union of two flag sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// True iff every bit of `other` is set.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// True iff no flag is set.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Transport-level failures.
#[derive(Debug)]
pub enum IoError {
    /// A timed operation expired.
    Timeout,

    /// The operation would block (non-blocking mode); retryable.
    WouldBlock,

    /// The peer closed the connection.
    ConnectionClosed,

    /// Any other I/O failure.
    Io(io::Error),
}

impl IoError {
    /// Classify an `std::io::Error` into the transport taxonomy.
    #[must_use]
    pub fn from_io(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::WouldBlock => Self::WouldBlock,
            io::ErrorKind::TimedOut => Self::Timeout,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => Self::ConnectionClosed,
            _ => Self::Io(e),
        }
    }

    /// True for [`IoError::WouldBlock`].
    #[must_use]
    pub fn is_would_block(&self) -> bool {
        matches!(self, Self::WouldBlock)
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "operation timed out"),
            Self::WouldBlock => write!(f, "operation would block"),
            Self::ConnectionClosed => write!(f, "connection closed by peer"),
            Self::Io(e) => write!(f, "i/o error: {}", e),
        }
    }
}

impl std::error::Error for IoError {}

impl From<io::Error> for IoError {
    fn from(e: io::Error) -> Self {
        Self::from_io(e)
    }
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, IoError>;

/// Cooperative blocking byte transport.
///
/// `read` returning 0 means the peer closed the stream. `WouldBlock` is
/// distinct from fatal errors and is retryable after a `poll`.
pub trait Transport {
    /// Read up to `buf.len()` bytes; 0 means closed.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write up to `buf.len()` bytes; returns the count accepted.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Wait up to `timeout_ms` for any of `interest`; returns the ready set
    /// (empty on timeout).
    fn poll(&mut self, interest: PollFlags, timeout_ms: u32) -> Result<PollFlags>;

    /// Close the transport; subsequent operations fail.
    fn close(&mut self);
}

/// Datagram extension of [`Transport`] for connectionless sockets.
pub trait Datagram: Transport {
    /// Whether `recv_from_addr` reports real source addresses. When false,
    /// source validation in protocols like SNTP is skipped.
    const HAS_SOURCE_ADDR: bool;

    /// Send to an explicit destination.
    fn send_to(&mut self, addr: [u8; 4], port: u16, buf: &[u8]) -> Result<usize>;

    /// Receive a datagram, discarding the source.
    fn recv_from(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Receive a datagram together with its source address and port.
    fn recv_from_addr(&mut self, buf: &mut [u8]) -> Result<(usize, [u8; 4], u16)>;
}

/// Capability marker for stream transports.
pub struct TransportCap;

/// Transport capability config; no optional members today.
#[derive(Default)]
pub struct TransportConfig;

impl<T: Transport> Contract<T> for TransportCap {
    type Config = TransportConfig;
}

/// Stream transport capability wrapper.
pub type Stream<T> = Cap<TransportCap, T>;

/// Capability marker for datagram sockets.
pub struct DatagramCap;

/// Datagram capability config; no optional members today.
#[derive(Default)]
pub struct DatagramConfig;

impl<T: Datagram> Contract<T> for DatagramCap {
    type Config = DatagramConfig;

    fn derive(_imp: &T, meta: Meta, _config: &DatagramConfig) -> Meta {
        if T::HAS_SOURCE_ADDR {
            meta.with_fact(facts::HAS_SOURCE_ADDR)
        } else {
            meta
        }
    }
}

/// Datagram socket capability wrapper.
pub type Dgram<T> = Cap<DatagramCap, T>;

/// `poll(2)` on a raw descriptor; shared by the socket implementations.
#[cfg(unix)]
pub(crate) fn poll_fd(fd: std::os::unix::io::RawFd, interest: PollFlags, timeout_ms: u32) -> Result<PollFlags> {
    let mut events: libc::c_short = 0;
    if interest.contains(PollFlags::READABLE) {
        events |= libc::POLLIN;
    }
    if interest.contains(PollFlags::WRITABLE) {
        events |= libc::POLLOUT;
    }
    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    let timeout = i32::try_from(timeout_ms).unwrap_or(i32::MAX);
    // SAFETY: pfd points at a valid pollfd for the duration of the call.
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout) };
    if rc < 0 {
        return Err(IoError::from_io(io::Error::last_os_error()));
    }
    let mut ready = PollFlags::empty();
    if pfd.revents & libc::POLLIN != 0 {
        ready = ready.union(PollFlags::READABLE);
    }
    if pfd.revents & libc::POLLOUT != 0 {
        ready = ready.union(PollFlags::WRITABLE);
    }
    if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
        ready = ready.union(PollFlags::ERROR);
    }
    Ok(ready)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_flags_union_and_contains() {
        let rw = PollFlags::READABLE.union(PollFlags::WRITABLE);
        assert!(rw.contains(PollFlags::READABLE));
        assert!(rw.contains(PollFlags::WRITABLE));
        assert!(!rw.contains(PollFlags::ERROR));
        assert!(PollFlags::empty().is_empty());
    }

    #[test]
    fn io_error_classification() {
        let e = IoError::from_io(io::Error::new(io::ErrorKind::WouldBlock, "wb"));
        assert!(e.is_would_block());
        let e = IoError::from_io(io::Error::new(io::ErrorKind::ConnectionReset, "rst"));
        assert!(matches!(e, IoError::ConnectionClosed));
    }
}
