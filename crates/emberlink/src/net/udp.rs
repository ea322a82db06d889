// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! UDP datagram socket with source-address reporting.

use super::{poll_fd, Datagram, IoError, PollFlags, Result, Transport};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// A UDP socket, optionally "connected" to a default peer.
pub struct UdpSocket {
    socket: Option<std::net::UdpSocket>,
}

impl UdpSocket {
    /// Bind to `addr:port` (use `[0,0,0,0]` / port 0 for wildcard).
    pub fn bind(addr: [u8; 4], port: u16) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        let bind_addr = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(addr), port));
        socket.bind(&bind_addr.into())?;
        let socket: std::net::UdpSocket = socket.into();
        Ok(Self {
            socket: Some(socket),
        })
    }

    /// Set the default peer for `write`/`read`.
    pub fn connect(&self, addr: [u8; 4], port: u16) -> Result<()> {
        self.socket()?
            .connect(SocketAddrV4::new(Ipv4Addr::from(addr), port))?;
        Ok(())
    }

    /// Bound receive timeout; `None` blocks indefinitely.
    pub fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket()?.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Bound send timeout; `None` blocks indefinitely.
    pub fn set_send_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket()?.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Kernel receive buffer size.
    pub fn set_recv_buffer_size(&self, bytes: usize) -> Result<()> {
        let socket = socket2::SockRef::from(self.socket()?);
        socket.set_recv_buffer_size(bytes)?;
        Ok(())
    }

    /// Kernel send buffer size.
    pub fn set_send_buffer_size(&self, bytes: usize) -> Result<()> {
        let socket = socket2::SockRef::from(self.socket()?);
        socket.set_send_buffer_size(bytes)?;
        Ok(())
    }

    /// Local bound port (useful after wildcard bind).
    pub fn local_port(&self) -> Result<u16> {
        Ok(self.socket()?.local_addr()?.port())
    }

    fn socket(&self) -> Result<&std::net::UdpSocket> {
        self.socket.as_ref().ok_or(IoError::ConnectionClosed)
    }
}

impl Transport for UdpSocket {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.socket()?.recv(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        Ok(self.socket()?.send(buf)?)
    }

    fn poll(&mut self, interest: PollFlags, timeout_ms: u32) -> Result<PollFlags> {
        let socket = self.socket()?;
        poll_fd(socket.as_raw_fd(), interest, timeout_ms)
    }

    fn close(&mut self) {
        self.socket = None;
    }
}

impl Datagram for UdpSocket {
    const HAS_SOURCE_ADDR: bool = true;

    fn send_to(&mut self, addr: [u8; 4], port: u16, buf: &[u8]) -> Result<usize> {
        Ok(self
            .socket()?
            .send_to(buf, SocketAddrV4::new(Ipv4Addr::from(addr), port))?)
    }

    fn recv_from(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.socket()?.recv_from(buf)?.0)
    }

    fn recv_from_addr(&mut self, buf: &mut [u8]) -> Result<(usize, [u8; 4], u16)> {
        let (n, src) = self.socket()?.recv_from(buf)?;
        match src {
            SocketAddr::V4(v4) => Ok((n, v4.ip().octets(), v4.port())),
            SocketAddr::V6(v6) => {
                // v4-mapped peers still resolve to octets; anything else is
                // outside this stack's address model.
                match v6.ip().to_ipv4_mapped() {
                    Some(ip) => Ok((n, ip.octets(), v6.port())),
                    None => Err(IoError::Io(std::io::Error::new(
                        std::io::ErrorKind::Unsupported,
                        "IPv6 source address",
                    ))),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cap::{facts, Meta, Spec};
    use crate::net::Dgram;

    #[test]
    fn datagram_roundtrip_with_source() {
        let mut a = UdpSocket::bind([127, 0, 0, 1], 0).unwrap();
        let mut b = UdpSocket::bind([127, 0, 0, 1], 0).unwrap();
        let port_b = b.local_port().unwrap();
        let port_a = a.local_port().unwrap();

        a.send_to([127, 0, 0, 1], port_b, b"hello").unwrap();
        let mut buf = [0u8; 16];
        let (n, src_ip, src_port) = b.recv_from_addr(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(src_ip, [127, 0, 0, 1]);
        assert_eq!(src_port, port_a);
    }

    #[test]
    fn capability_records_source_addr_fact() {
        let sock = UdpSocket::bind([127, 0, 0, 1], 0).unwrap();
        let cap: Dgram<UdpSocket> = Dgram::from(Spec::new(sock, Meta::new("udp-socket2")));
        assert!(cap.meta().has(facts::HAS_SOURCE_ADDR));
    }
}
