// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Host error types.

use crate::host::att::AttErrorCode;
use crate::net::IoError;
use std::fmt;

/// BLE host failures.
#[derive(Debug)]
pub enum HostError {
    /// HCI transport failure (fatal transports also surface a synthetic
    /// `Disconnected` event).
    Io(IoError),

    /// The peer answered an ATT request with an Error Response. The
    /// connection stays up.
    Att(AttErrorCode),

    /// A request did not complete within the configured budget. The
    /// connection stays up unless the supervision timeout also fired.
    Timeout,

    /// The referenced connection does not exist (never established or torn
    /// down).
    NotConnected,

    /// The operation is invalid in the current connection state.
    InvalidState(&'static str),

    /// Notification refused: the peer has not enabled the CCCD.
    NotSubscribed,

    /// Malformed or unexpected peer PDU; the offending session is aborted.
    Protocol(String),

    /// A bounded queue is full.
    QueueFull,

    /// The host task is no longer running.
    HostDown,

    /// Cooperative cancellation was observed.
    Cancelled,
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "transport error: {}", e),
            Self::Att(code) => write!(f, "ATT error response: {}", code),
            Self::Timeout => write!(f, "request timed out"),
            Self::NotConnected => write!(f, "no such connection"),
            Self::InvalidState(what) => write!(f, "invalid state: {}", what),
            Self::NotSubscribed => write!(f, "peer has not enabled notifications"),
            Self::Protocol(msg) => write!(f, "protocol violation: {}", msg),
            Self::QueueFull => write!(f, "queue full"),
            Self::HostDown => write!(f, "host task is not running"),
            Self::Cancelled => write!(f, "operation cancelled"),
        }
    }
}

impl std::error::Error for HostError {}

impl From<IoError> for HostError {
    fn from(e: IoError) -> Self {
        Self::Io(e)
    }
}

/// Result alias for host operations.
pub type Result<T> = std::result::Result<T, HostError>;
