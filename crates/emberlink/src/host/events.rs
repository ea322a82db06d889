// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Application-facing host events.
//!
//! The pump publishes a discriminated union into a bounded thread-safe
//! queue; `next_event` blocks, `try_next_event` does not. Events from a
//! single connection are delivered in HCI arrival order.

use super::gap::{BdAddr, Role};

/// Why a connection went away.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The local host asked for the disconnection.
    LocalHost,
    /// The remote device terminated the link.
    Remote,
    /// Supervision timeout fired.
    SupervisionTimeout,
    /// The HCI transport failed; the disconnect is synthetic.
    TransportFailed,
    /// Any other controller-reported reason code.
    Controller(u8),
}

impl DisconnectReason {
    pub(crate) fn from_hci(reason: u8) -> Self {
        match reason {
            0x16 => Self::LocalHost,
            0x13 => Self::Remote,
            0x08 => Self::SupervisionTimeout,
            other => Self::Controller(other),
        }
    }
}

/// A scan result.
#[derive(Clone, Debug)]
pub struct DeviceFound {
    /// Advertiser address.
    pub addr: BdAddr,
    /// Complete local name, when advertised.
    pub name: Option<String>,
    /// Raw advertising data.
    pub adv_data: Vec<u8>,
    /// Received signal strength in dBm.
    pub rssi: i8,
}

/// Host events delivered to the application.
#[derive(Clone, Debug)]
pub enum HostEvent {
    /// A connection reached the `Connected` state.
    Connected {
        /// Controller-assigned connection handle.
        conn: u16,
        /// Our role on the link.
        role: Role,
        /// Peer address.
        peer: BdAddr,
    },
    /// A connection was torn down (or its transport died).
    Disconnected {
        /// The former connection handle.
        conn: u16,
        /// Why.
        reason: DisconnectReason,
    },
    /// A scan produced a report.
    DeviceFound(DeviceFound),
    /// The PHY changed.
    PhyUpdated {
        /// Connection handle.
        conn: u16,
        /// TX PHY (1 = 1M, 2 = 2M).
        tx_phy: u8,
        /// RX PHY.
        rx_phy: u8,
    },
    /// Data Length Extension completed.
    DataLengthChanged {
        /// Connection handle.
        conn: u16,
        /// New maximum ACL payload octets.
        max_octets: u16,
    },
    /// ATT MTU exchange completed.
    MtuExchanged {
        /// Connection handle.
        conn: u16,
        /// Effective MTU (minimum of both sides).
        mtu: u16,
    },
    /// A peer notification or indication arrived.
    Notification {
        /// Connection handle.
        conn: u16,
        /// Characteristic value handle.
        handle: u16,
        /// Value.
        value: Vec<u8>,
        /// True for an indication (already confirmed by the host).
        indicated: bool,
    },
    /// The peer flipped a CCCD on our server.
    NotificationsEnabled {
        /// Connection handle.
        conn: u16,
        /// The characteristic value handle the CCCD belongs to.
        handle: u16,
        /// Notifications enabled.
        notify: bool,
        /// Indications enabled.
        indicate: bool,
    },
}

/// Receiving side of the host event queue.
pub struct EventQueue {
    rx: crossbeam::channel::Receiver<HostEvent>,
}

impl EventQueue {
    pub(crate) fn channel(depth: usize) -> (crossbeam::channel::Sender<HostEvent>, Self) {
        let (tx, rx) = crossbeam::channel::bounded(depth);
        (tx, Self { rx })
    }

    /// Block until the next event; `None` when the host task exited.
    pub fn next(&self) -> Option<HostEvent> {
        self.rx.recv().ok()
    }

    /// Non-blocking variant of [`Self::next`].
    pub fn try_next(&self) -> Option<HostEvent> {
        self.rx.try_recv().ok()
    }

    /// Block up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: std::time::Duration) -> Option<HostEvent> {
        self.rx.recv_timeout(timeout).ok()
    }
}
