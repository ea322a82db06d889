// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! In-process duplex byte stream.
//!
//! A connected pair of [`Transport`] endpoints backed by two byte queues.
//! Used for intra-process links in tests and examples, where a protocol
//! core (TLS, SNTP framing) needs a peer without touching the network.

use super::{IoError, PollFlags, Result, Transport};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Pipe {
    data: Mutex<VecDeque<u8>>,
    cv: Condvar,
    closed: Mutex<bool>,
}

impl Pipe {
    fn new() -> Self {
        Self {
            data: Mutex::new(VecDeque::new()),
            cv: Condvar::new(),
            closed: Mutex::new(false),
        }
    }

    fn close(&self) {
        *self.closed.lock() = true;
        self.cv.notify_all();
    }

    fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

/// One endpoint of an in-memory duplex stream.
pub struct MemoryStream {
    rx: Arc<Pipe>,
    tx: Arc<Pipe>,
}

impl MemoryStream {
    /// Create a connected pair.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let a = Arc::new(Pipe::new());
        let b = Arc::new(Pipe::new());
        (
            Self {
                rx: a.clone(),
                tx: b.clone(),
            },
            Self { rx: b, tx: a },
        )
    }
}

impl Transport for MemoryStream {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut data = self.rx.data.lock();
        while data.is_empty() {
            if self.rx.is_closed() {
                return Ok(0);
            }
            // Block like a socket would; writers and close() wake us.
            self.rx.cv.wait(&mut data);
        }
        let n = buf.len().min(data.len());
        for slot in buf.iter_mut().take(n) {
            *slot = data.pop_front().expect("checked non-empty");
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        if self.tx.is_closed() {
            return Err(IoError::ConnectionClosed);
        }
        let mut data = self.tx.data.lock();
        data.extend(buf.iter().copied());
        drop(data);
        self.tx.cv.notify_all();
        Ok(buf.len())
    }

    fn poll(&mut self, interest: PollFlags, timeout_ms: u32) -> Result<PollFlags> {
        let deadline = Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        let mut data = self.rx.data.lock();
        loop {
            let mut ready = PollFlags::empty();
            if interest.contains(PollFlags::READABLE) && (!data.is_empty() || self.rx.is_closed())
            {
                ready = ready.union(PollFlags::READABLE);
            }
            if interest.contains(PollFlags::WRITABLE) && !self.tx.is_closed() {
                ready = ready.union(PollFlags::WRITABLE);
            }
            if !ready.is_empty() {
                return Ok(ready);
            }
            if self.rx.cv.wait_until(&mut data, deadline).timed_out() {
                return Ok(PollFlags::empty());
            }
        }
    }

    fn close(&mut self) {
        self.rx.close();
        self.tx.close();
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.rx.close();
        self.tx.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplex_roundtrip() {
        let (mut a, mut b) = MemoryStream::pair();
        a.write(b"ping").unwrap();
        let mut buf = [0u8; 8];
        let n = b.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");
        b.write(b"pong").unwrap();
        let n = a.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"pong");
    }

    #[test]
    fn read_after_peer_close_returns_zero() {
        let (mut a, b) = MemoryStream::pair();
        drop(b);
        let mut buf = [0u8; 4];
        assert_eq!(a.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn blocking_read_wakes_on_write() {
        let (mut a, mut b) = MemoryStream::pair();
        let reader = std::thread::spawn(move || {
            let mut buf = [0u8; 4];
            let n = a.read(&mut buf).unwrap();
            buf[..n].to_vec()
        });
        std::thread::sleep(Duration::from_millis(20));
        b.write(b"wake").unwrap();
        assert_eq!(reader.join().unwrap(), b"wake");
    }
}
