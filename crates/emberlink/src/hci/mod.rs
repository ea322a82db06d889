// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! HCI transport capability and packet layer.
//!
//! The transport delivers whole HCI packets (a UART driver that reframes,
//! an SDIO slot, or the in-process [`LoopbackController`]); packet framing
//! beyond that is the host's responsibility and lives in [`packet`].
//!
//! # Modules
//!
//! - `packet` - H4 packet codec (command / ACL / event) and constant tables
//! - `loopback` - two-port virtual LE controller for tests and examples

pub mod loopback;
pub mod packet;

pub use loopback::{LoopbackController, LoopbackPort};
pub use packet::{
    AclPacket, HciCommand, HciEvent, HciPacket, Opcode, PacketBoundary, EVT_COMMAND_COMPLETE,
    EVT_COMMAND_STATUS, EVT_DISCONNECTION_COMPLETE, EVT_LE_META, EVT_NUM_COMPLETED_PACKETS,
    LE_SUB_ADVERTISING_REPORT, LE_SUB_CONNECTION_COMPLETE, LE_SUB_DATA_LENGTH_CHANGE,
    LE_SUB_PHY_UPDATE_COMPLETE,
};

use crate::cap::{Cap, Contract};
use crate::net::{IoError, PollFlags};

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, IoError>;

/// The HCI transport capability.
///
/// Four operations plus lifecycle. `WouldBlock` is distinct from fatal
/// errors; implementations deliver whole packets and never split them.
pub trait HciTransport: Send {
    /// Bring the transport up. Idempotent.
    fn init(&mut self) -> Result<()>;

    /// Read one whole HCI packet into `buf`; returns its length.
    ///
    /// [`IoError::WouldBlock`] when no packet is pending.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write one whole HCI packet; returns the count accepted (always the
    /// full packet for a healthy transport).
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Wait up to `timeout_ms` for readiness.
    fn poll(&mut self, interest: PollFlags, timeout_ms: u32) -> Result<PollFlags>;

    /// Tear the transport down; subsequent operations fail.
    fn deinit(&mut self);
}

/// Capability marker for [`HciTransport`] implementations.
pub struct HciCap;

/// HCI capability config; no optional members today.
#[derive(Default)]
pub struct HciConfig;

impl<T: HciTransport> Contract<T> for HciCap {
    type Config = HciConfig;
}

/// HCI transport capability wrapper.
pub type Hci<T> = Cap<HciCap, T>;
