// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Per-link connection record and state machine.

use super::flow::BlockAckWindow;
use super::gap::{AddrType, BdAddr, Role};
use super::l2cap::Reassembler;
use crate::config::{ACL_DEFAULT_OCTETS, ATT_MTU_DEFAULT};
use std::collections::{HashMap, VecDeque};

/// Connection lifecycle states.
///
/// `Idle -> Scanning/Advertising -> Connecting -> Connected ->
/// Disconnecting -> Idle`; the scanning/advertising states are host-global
/// and tracked by the pump, the rest live here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnState {
    /// LE Create Connection issued, Connection Complete pending.
    Connecting,
    /// Link established.
    Connected,
    /// Disconnect issued, Disconnection Complete pending.
    Disconnecting,
}

/// CCCD bits per characteristic (Core 5.4 Vol 3 Part G Sec.3.3.3.3).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CccdState(pub u16);

impl CccdState {
    /// Notifications bit.
    #[must_use]
    pub fn notify(self) -> bool {
        self.0 & 0x0001 != 0
    }

    /// Indications bit.
    #[must_use]
    pub fn indicate(self) -> bool {
        self.0 & 0x0002 != 0
    }
}

/// A queued outbound notification awaiting window space.
pub(crate) struct QueuedNotification {
    pub value_handle: u16,
    pub value: Vec<u8>,
    pub indicate: bool,
}

/// Post-connect autoconfiguration progress (central side).
///
/// Each step is optional and awaited before the next: data-length request,
/// then PHY request, then ATT MTU exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum AutoStep {
    DataLength,
    Phy,
    Mtu,
    Done,
}

/// State for one active link.
pub struct Connection {
    /// Controller-assigned handle.
    pub handle: u16,
    /// Our role.
    pub role: Role,
    /// Lifecycle state.
    pub state: ConnState,
    /// Peer address.
    pub peer: BdAddr,
    /// Peer address type.
    pub peer_type: AddrType,
    /// Connection interval in 1.25 ms units.
    pub interval: u16,
    /// Peripheral latency.
    pub latency: u16,
    /// Supervision timeout in 10 ms units.
    pub supervision_timeout: u16,
    /// Negotiated ACL max data length.
    pub acl_max_len: u16,
    /// Current PHY (1 = 1M, 2 = 2M).
    pub phy: u8,
    /// Effective ATT MTU.
    pub mtu: u16,
    /// Block-ack TX window.
    pub tx_window: BlockAckWindow,
    /// CCCD state per characteristic value handle (our server role).
    pub cccd: HashMap<u16, CccdState>,
    /// Inbound L2CAP reassembly.
    pub reassembler: Reassembler,
    /// Notifications waiting for TX window space.
    pub(crate) notify_queue: VecDeque<QueuedNotification>,
    /// Prepared writes queued by the peer, in arrival order.
    pub(crate) prepare_queue: Vec<(u16, u16, Vec<u8>)>,
    /// Autoconfiguration progress.
    pub(crate) auto: AutoStep,
    /// Client receive MTU we announced in an outstanding MTU exchange.
    pub(crate) pending_mtu: Option<u16>,
}

impl Connection {
    /// Fresh record in the `Connecting` state.
    #[must_use]
    pub fn new(handle: u16, role: Role, peer: BdAddr, peer_type: AddrType, tx_window: u8) -> Self {
        Self {
            handle,
            role,
            state: ConnState::Connecting,
            peer,
            peer_type,
            interval: 0,
            latency: 0,
            supervision_timeout: 0,
            acl_max_len: ACL_DEFAULT_OCTETS,
            phy: 1,
            mtu: ATT_MTU_DEFAULT,
            tx_window: BlockAckWindow::new(tx_window),
            cccd: HashMap::new(),
            reassembler: Reassembler::new(),
            notify_queue: VecDeque::new(),
            prepare_queue: Vec::new(),
            auto: AutoStep::Done,
            pending_mtu: None,
        }
    }

    /// CCCD state for a characteristic value handle.
    #[must_use]
    pub fn cccd_for(&self, value_handle: u16) -> CccdState {
        self.cccd.get(&value_handle).copied().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_connection_defaults() {
        let conn = Connection::new(
            0x0040,
            Role::Central,
            BdAddr([0; 6]),
            AddrType::Public,
            4,
        );
        assert_eq!(conn.state, ConnState::Connecting);
        assert_eq!(conn.mtu, ATT_MTU_DEFAULT);
        assert_eq!(conn.acl_max_len, ACL_DEFAULT_OCTETS);
        assert_eq!(conn.phy, 1);
        assert!(!conn.cccd_for(0x0007).notify());
    }

    #[test]
    fn cccd_bits() {
        assert!(CccdState(0x0001).notify());
        assert!(!CccdState(0x0001).indicate());
        assert!(CccdState(0x0002).indicate());
        assert!(CccdState(0x0003).notify());
    }
}
