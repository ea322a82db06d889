// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! TCP stream socket.
//!
//! Built with `socket2` for option configuration, converted into
//! `std::net::TcpStream` for I/O.

use super::{poll_fd, IoError, PollFlags, Result, Transport};
use socket2::{Domain, Protocol, Socket, Type};
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

/// A connected TCP socket.
pub struct TcpSocket {
    stream: Option<TcpStream>,
}

impl TcpSocket {
    /// Connect to `addr:port` with an optional timeout.
    ///
    /// # Errors
    ///
    /// [`IoError::Timeout`] if the connect deadline expires, otherwise the
    /// classified socket error.
    pub fn connect(addr: [u8; 4], port: u16, timeout: Option<Duration>) -> Result<Self> {
        let socket = Socket::new(Domain::IPV4, Type::STREAM, Some(Protocol::TCP))?;
        let dest = SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::from(addr), port));
        match timeout {
            Some(t) => socket.connect_timeout(&dest.into(), t)?,
            None => socket.connect(&dest.into())?,
        }
        let stream: TcpStream = socket.into();
        Ok(Self {
            stream: Some(stream),
        })
    }

    /// Wrap an already-connected stream (listener accept path, tests).
    #[must_use]
    pub fn from_stream(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Bound read timeout; `None` blocks indefinitely.
    pub fn set_recv_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream()?.set_read_timeout(timeout)?;
        Ok(())
    }

    /// Bound write timeout; `None` blocks indefinitely.
    pub fn set_send_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.stream()?.set_write_timeout(timeout)?;
        Ok(())
    }

    /// Disable (or re-enable) Nagle's algorithm.
    pub fn set_nodelay(&self, nodelay: bool) -> Result<()> {
        self.stream()?.set_nodelay(nodelay)?;
        Ok(())
    }

    /// Kernel receive buffer size.
    pub fn set_recv_buffer_size(&self, bytes: usize) -> Result<()> {
        let socket = socket2::SockRef::from(self.stream()?);
        socket.set_recv_buffer_size(bytes)?;
        Ok(())
    }

    /// Kernel send buffer size.
    pub fn set_send_buffer_size(&self, bytes: usize) -> Result<()> {
        let socket = socket2::SockRef::from(self.stream()?);
        socket.set_send_buffer_size(bytes)?;
        Ok(())
    }

    fn stream(&self) -> Result<&TcpStream> {
        self.stream.as_ref().ok_or(IoError::ConnectionClosed)
    }
}

impl Transport for TcpSocket {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(IoError::ConnectionClosed)?;
        Ok(stream.read(buf)?)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(IoError::ConnectionClosed)?;
        Ok(stream.write(buf)?)
    }

    fn poll(&mut self, interest: PollFlags, timeout_ms: u32) -> Result<PollFlags> {
        let stream = self.stream.as_ref().ok_or(IoError::ConnectionClosed)?;
        poll_fd(stream.as_raw_fd(), interest, timeout_ms)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn connect_write_read_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 4];
            conn.read_exact(&mut buf).unwrap();
            conn.write_all(&buf).unwrap();
        });

        let mut sock =
            TcpSocket::connect([127, 0, 0, 1], port, Some(Duration::from_secs(1))).unwrap();
        sock.set_nodelay(true).unwrap();
        assert_eq!(sock.write(b"ping").unwrap(), 4);
        let mut buf = [0u8; 4];
        let ready = sock
            .poll(PollFlags::READABLE, 1_000)
            .unwrap();
        assert!(ready.contains(PollFlags::READABLE));
        assert_eq!(sock.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"ping");
        server.join().unwrap();
    }

    #[test]
    fn read_after_close_is_connection_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut sock =
            TcpSocket::connect([127, 0, 0, 1], port, Some(Duration::from_secs(1))).unwrap();
        sock.close();
        let mut buf = [0u8; 1];
        assert!(matches!(
            sock.read(&mut buf),
            Err(IoError::ConnectionClosed)
        ));
    }
}
