// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Two-port virtual LE controller.
//!
//! An in-memory controller pair for tests, examples and intra-process
//! links: each [`LoopbackPort`] implements [`HciTransport`](super::HciTransport)
//! and behaves like a minimal LE controller wired point-to-point to its
//! peer. Supported procedures: advertising/scanning with reports, connection
//! establishment, ACL forwarding with Number-of-Completed-Packets crediting,
//! data-length update, PHY update and disconnection.
//!
//! The model is deliberately instant: command effects and peer events are
//! visible as soon as the command write returns.

use super::packet::{
    command_complete, command_status, AclPacket, HciCommand, HciEvent, HciPacket, Opcode,
    EVT_DISCONNECTION_COMPLETE, EVT_LE_META, EVT_NUM_COMPLETED_PACKETS, LE_SUB_ADVERTISING_REPORT,
    LE_SUB_CONNECTION_COMPLETE, LE_SUB_DATA_LENGTH_CHANGE, LE_SUB_PHY_UPDATE_COMPLETE,
};
use super::HciTransport;
use crate::net::{IoError, PollFlags};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// ACL buffer count advertised by LE Read Buffer Size.
const NUM_ACL_BUFFERS: u8 = 8;
/// ACL buffer payload length advertised by LE Read Buffer Size.
const ACL_BUFFER_LEN: u16 = 251;
/// First connection handle assigned by the controller.
const FIRST_CONN_HANDLE: u16 = 0x0040;

/// HCI status codes used by the model.
const STATUS_SUCCESS: u8 = 0x00;
const STATUS_UNKNOWN_COMMAND: u8 = 0x01;
const STATUS_COMMAND_DISALLOWED: u8 = 0x0c;
const REASON_LOCAL_TERMINATION: u8 = 0x16;
const REASON_REMOTE_TERMINATION: u8 = 0x13;

struct PendingConnect {
    initiator: usize,
    peer_addr: [u8; 6],
    interval: u16,
    latency: u16,
    timeout: u16,
}

#[derive(Default)]
struct PortState {
    inbound: VecDeque<Vec<u8>>,
    adv_enabled: bool,
    adv_data: Vec<u8>,
    scan_enabled: bool,
    open: bool,
}

struct NetState {
    ports: [PortState; 2],
    addrs: [[u8; 6]; 2],
    link: Option<u16>,
    next_handle: u16,
    pending: Option<PendingConnect>,
}

struct Shared {
    state: Mutex<NetState>,
    cv: Condvar,
}

/// Factory for loopback controller pairs.
pub struct LoopbackController;

impl LoopbackController {
    /// Create a connected pair of controller ports.
    ///
    /// Port addresses are fixed: `C0:DE:C0:DE:00:01` and `..:02`.
    #[must_use]
    pub fn pair() -> (LoopbackPort, LoopbackPort) {
        let shared = Arc::new(Shared {
            state: Mutex::new(NetState {
                ports: [
                    PortState {
                        open: true,
                        ..PortState::default()
                    },
                    PortState {
                        open: true,
                        ..PortState::default()
                    },
                ],
                addrs: [
                    [0x01, 0x00, 0xde, 0xc0, 0xde, 0xc0],
                    [0x02, 0x00, 0xde, 0xc0, 0xde, 0xc0],
                ],
                link: None,
                next_handle: FIRST_CONN_HANDLE,
                pending: None,
            }),
            cv: Condvar::new(),
        });
        (
            LoopbackPort {
                shared: shared.clone(),
                index: 0,
            },
            LoopbackPort { shared, index: 1 },
        )
    }
}

/// One port of a [`LoopbackController`] pair.
pub struct LoopbackPort {
    shared: Arc<Shared>,
    index: usize,
}

impl LoopbackPort {
    /// The port's public device address (little-endian byte order).
    #[must_use]
    pub fn address(&self) -> [u8; 6] {
        self.shared.state.lock().addrs[self.index]
    }

    /// The peer port's public device address.
    #[must_use]
    pub fn peer_address(&self) -> [u8; 6] {
        self.shared.state.lock().addrs[1 - self.index]
    }

    fn process_command(&self, state: &mut NetState, cmd: &HciCommand) {
        let me = self.index;
        let peer = 1 - me;
        match cmd.opcode {
            Opcode::RESET
            | Opcode::SET_EVENT_MASK
            | Opcode::LE_SET_EVENT_MASK
            | Opcode::LE_SET_ADV_PARAMS
            | Opcode::LE_SET_SCAN_PARAMS => {
                push_event(state, me, &command_complete(cmd.opcode, &[STATUS_SUCCESS]));
            }
            Opcode::LE_READ_BUFFER_SIZE => {
                let mut ret = vec![STATUS_SUCCESS];
                ret.extend_from_slice(&ACL_BUFFER_LEN.to_le_bytes());
                ret.push(NUM_ACL_BUFFERS);
                push_event(state, me, &command_complete(cmd.opcode, &ret));
            }
            Opcode::LE_SET_ADV_DATA => {
                // params: significant length + 31-byte field
                let data = cmd.params.get(1..).unwrap_or_default();
                let significant = usize::from(cmd.params.first().copied().unwrap_or(0));
                state.ports[me].adv_data = data.get(..significant).unwrap_or(data).to_vec();
                push_event(state, me, &command_complete(cmd.opcode, &[STATUS_SUCCESS]));
            }
            Opcode::LE_SET_ADV_ENABLE => {
                let enable = cmd.params.first().copied().unwrap_or(0) == 1;
                state.ports[me].adv_enabled = enable;
                push_event(state, me, &command_complete(cmd.opcode, &[STATUS_SUCCESS]));
                if enable {
                    if state.ports[peer].scan_enabled {
                        let report = advertising_report(state.addrs[me], &state.ports[me].adv_data);
                        push_event(state, peer, &report);
                    }
                    self.try_complete_pending(state);
                }
            }
            Opcode::LE_SET_SCAN_ENABLE => {
                let enable = cmd.params.first().copied().unwrap_or(0) == 1;
                state.ports[me].scan_enabled = enable;
                push_event(state, me, &command_complete(cmd.opcode, &[STATUS_SUCCESS]));
                if enable && state.ports[peer].adv_enabled {
                    let report = advertising_report(state.addrs[peer], &state.ports[peer].adv_data);
                    push_event(state, me, &report);
                }
            }
            Opcode::LE_CREATE_CONNECTION => {
                if cmd.params.len() < 25 || state.link.is_some() {
                    push_event(
                        state,
                        me,
                        &command_status(cmd.opcode, STATUS_COMMAND_DISALLOWED),
                    );
                    return;
                }
                let mut peer_addr = [0u8; 6];
                peer_addr.copy_from_slice(&cmd.params[6..12]);
                let interval = u16::from_le_bytes([cmd.params[15], cmd.params[16]]);
                let latency = u16::from_le_bytes([cmd.params[17], cmd.params[18]]);
                let timeout = u16::from_le_bytes([cmd.params[19], cmd.params[20]]);
                push_event(state, me, &command_status(cmd.opcode, STATUS_SUCCESS));
                state.pending = Some(PendingConnect {
                    initiator: me,
                    peer_addr,
                    interval,
                    latency,
                    timeout,
                });
                self.try_complete_pending(state);
            }
            Opcode::LE_CREATE_CONNECTION_CANCEL => {
                state.pending = None;
                push_event(state, me, &command_complete(cmd.opcode, &[STATUS_SUCCESS]));
            }
            Opcode::LE_SET_DATA_LENGTH => {
                if cmd.params.len() < 6 {
                    push_event(
                        state,
                        me,
                        &command_complete(cmd.opcode, &[STATUS_COMMAND_DISALLOWED, 0, 0]),
                    );
                    return;
                }
                let handle = u16::from_le_bytes([cmd.params[0], cmd.params[1]]);
                let tx_octets = u16::from_le_bytes([cmd.params[2], cmd.params[3]]);
                let tx_time = u16::from_le_bytes([cmd.params[4], cmd.params[5]]);
                let mut ret = vec![STATUS_SUCCESS];
                ret.extend_from_slice(&handle.to_le_bytes());
                push_event(state, me, &command_complete(cmd.opcode, &ret));
                for port in [me, peer] {
                    push_event(
                        state,
                        port,
                        &data_length_change(handle, tx_octets, tx_time),
                    );
                }
            }
            Opcode::LE_SET_PHY => {
                if cmd.params.len() < 4 {
                    push_event(state, me, &command_status(cmd.opcode, STATUS_COMMAND_DISALLOWED));
                    return;
                }
                let handle = u16::from_le_bytes([cmd.params[0], cmd.params[1]]);
                let tx_phys = cmd.params[3];
                let phy = if tx_phys & 0x02 != 0 { 0x02 } else { 0x01 };
                push_event(state, me, &command_status(cmd.opcode, STATUS_SUCCESS));
                for port in [me, peer] {
                    push_event(state, port, &phy_update_complete(handle, phy));
                }
            }
            Opcode::DISCONNECT => {
                if cmd.params.len() < 3 {
                    push_event(state, me, &command_status(cmd.opcode, STATUS_COMMAND_DISALLOWED));
                    return;
                }
                let handle = u16::from_le_bytes([cmd.params[0], cmd.params[1]]);
                push_event(state, me, &command_status(cmd.opcode, STATUS_SUCCESS));
                if state.link.take() == Some(handle) {
                    push_event(
                        state,
                        me,
                        &disconnection_complete(handle, REASON_LOCAL_TERMINATION),
                    );
                    push_event(
                        state,
                        peer,
                        &disconnection_complete(handle, REASON_REMOTE_TERMINATION),
                    );
                }
            }
            _ => {
                push_event(
                    state,
                    me,
                    &command_complete(cmd.opcode, &[STATUS_UNKNOWN_COMMAND]),
                );
            }
        }
    }

    fn try_complete_pending(&self, state: &mut NetState) {
        let Some(pending) = state.pending.as_ref() else {
            return;
        };
        let advertiser = 1 - pending.initiator;
        if !state.ports[advertiser].adv_enabled || state.addrs[advertiser] != pending.peer_addr {
            return;
        }
        let pending = state.pending.take().expect("checked above");
        let handle = state.next_handle;
        state.next_handle += 1;
        state.link = Some(handle);
        state.ports[advertiser].adv_enabled = false;

        let central = connection_complete(
            handle,
            0x00,
            state.addrs[advertiser],
            pending.interval,
            pending.latency,
            pending.timeout,
        );
        let peripheral = connection_complete(
            handle,
            0x01,
            state.addrs[pending.initiator],
            pending.interval,
            pending.latency,
            pending.timeout,
        );
        push_event(state, pending.initiator, &central);
        push_event(state, advertiser, &peripheral);
    }

    fn process_acl(&self, state: &mut NetState, acl: &AclPacket, wire: &[u8]) {
        let me = self.index;
        let peer = 1 - me;
        if state.link != Some(acl.handle) {
            return;
        }
        state.ports[peer].inbound.push_back(wire.to_vec());
        // Credit the sender immediately: the virtual link never congests.
        let mut params = vec![1u8];
        params.extend_from_slice(&acl.handle.to_le_bytes());
        params.extend_from_slice(&1u16.to_le_bytes());
        let nocp = HciEvent {
            code: EVT_NUM_COMPLETED_PACKETS,
            params,
        };
        push_event(state, me, &nocp);
    }
}

fn push_event(state: &mut NetState, port: usize, event: &HciEvent) {
    let wire = HciPacket::Event(event.clone())
        .encode()
        .expect("loopback events are well-formed");
    state.ports[port].inbound.push_back(wire);
}

fn connection_complete(
    handle: u16,
    role: u8,
    peer_addr: [u8; 6],
    interval: u16,
    latency: u16,
    timeout: u16,
) -> HciEvent {
    let mut params = vec![LE_SUB_CONNECTION_COMPLETE, STATUS_SUCCESS];
    params.extend_from_slice(&handle.to_le_bytes());
    params.push(role);
    params.push(0x00); // public address type
    params.extend_from_slice(&peer_addr);
    params.extend_from_slice(&interval.to_le_bytes());
    params.extend_from_slice(&latency.to_le_bytes());
    params.extend_from_slice(&timeout.to_le_bytes());
    params.push(0x00); // central clock accuracy
    HciEvent {
        code: EVT_LE_META,
        params,
    }
}

fn advertising_report(addr: [u8; 6], data: &[u8]) -> HciEvent {
    let mut params = vec![LE_SUB_ADVERTISING_REPORT, 1, 0x00, 0x00];
    params.extend_from_slice(&addr);
    params.push(data.len() as u8);
    params.extend_from_slice(data);
    params.push(0xc8); // RSSI -56 dBm as two's complement
    HciEvent {
        code: EVT_LE_META,
        params,
    }
}

fn data_length_change(handle: u16, octets: u16, time: u16) -> HciEvent {
    let mut params = vec![LE_SUB_DATA_LENGTH_CHANGE];
    params.extend_from_slice(&handle.to_le_bytes());
    params.extend_from_slice(&octets.to_le_bytes());
    params.extend_from_slice(&time.to_le_bytes());
    params.extend_from_slice(&octets.to_le_bytes());
    params.extend_from_slice(&time.to_le_bytes());
    HciEvent {
        code: EVT_LE_META,
        params,
    }
}

fn phy_update_complete(handle: u16, phy: u8) -> HciEvent {
    let mut params = vec![LE_SUB_PHY_UPDATE_COMPLETE, STATUS_SUCCESS];
    params.extend_from_slice(&handle.to_le_bytes());
    params.push(phy);
    params.push(phy);
    HciEvent {
        code: EVT_LE_META,
        params,
    }
}

fn disconnection_complete(handle: u16, reason: u8) -> HciEvent {
    let mut params = vec![STATUS_SUCCESS];
    params.extend_from_slice(&handle.to_le_bytes());
    params.push(reason);
    HciEvent {
        code: EVT_DISCONNECTION_COMPLETE,
        params,
    }
}

impl HciTransport for LoopbackPort {
    fn init(&mut self) -> super::Result<()> {
        let mut state = self.shared.state.lock();
        state.ports[self.index].open = true;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> super::Result<usize> {
        let mut state = self.shared.state.lock();
        if !state.ports[self.index].open {
            return Err(IoError::ConnectionClosed);
        }
        match state.ports[self.index].inbound.pop_front() {
            Some(packet) => {
                if packet.len() > buf.len() {
                    // Whole-packet contract: the caller's buffer must fit it.
                    state.ports[self.index].inbound.push_front(packet);
                    return Err(IoError::Io(std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "read buffer smaller than pending HCI packet",
                    )));
                }
                buf[..packet.len()].copy_from_slice(&packet);
                Ok(packet.len())
            }
            None => Err(IoError::WouldBlock),
        }
    }

    fn write(&mut self, buf: &[u8]) -> super::Result<usize> {
        let packet = HciPacket::decode(buf).map_err(|e| {
            IoError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                e.to_string(),
            ))
        })?;
        let mut state = self.shared.state.lock();
        if !state.ports[self.index].open {
            return Err(IoError::ConnectionClosed);
        }
        match &packet {
            HciPacket::Command(cmd) => self.process_command(&mut state, cmd),
            HciPacket::Acl(acl) => self.process_acl(&mut state, acl, buf),
            HciPacket::Event(_) => {
                return Err(IoError::Io(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "hosts do not send events",
                )))
            }
        }
        drop(state);
        self.shared.cv.notify_all();
        Ok(buf.len())
    }

    fn poll(&mut self, interest: PollFlags, timeout_ms: u32) -> super::Result<PollFlags> {
        let deadline = std::time::Instant::now() + Duration::from_millis(u64::from(timeout_ms));
        let mut state = self.shared.state.lock();
        loop {
            if !state.ports[self.index].open {
                return Ok(PollFlags::ERROR);
            }
            let mut ready = PollFlags::empty();
            if interest.contains(PollFlags::READABLE)
                && !state.ports[self.index].inbound.is_empty()
            {
                ready = ready.union(PollFlags::READABLE);
            }
            if interest.contains(PollFlags::WRITABLE) {
                ready = ready.union(PollFlags::WRITABLE);
            }
            if !ready.is_empty() {
                return Ok(ready);
            }
            if self.shared.cv.wait_until(&mut state, deadline).timed_out() {
                return Ok(PollFlags::empty());
            }
        }
    }

    fn deinit(&mut self) {
        let mut state = self.shared.state.lock();
        state.ports[self.index].open = false;
        // Drop the link and tell the peer, modelling a dead controller.
        if let Some(handle) = state.link.take() {
            let peer = 1 - self.index;
            push_event(
                &mut state,
                peer,
                &disconnection_complete(handle, REASON_REMOTE_TERMINATION),
            );
        }
        drop(state);
        self.shared.cv.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hci::packet::{EVT_COMMAND_COMPLETE, EVT_COMMAND_STATUS};

    fn read_event(port: &mut LoopbackPort) -> HciEvent {
        let mut buf = [0u8; 512];
        let n = port.read(&mut buf).expect("event pending");
        match HciPacket::decode(&buf[..n]).unwrap() {
            HciPacket::Event(e) => e,
            other => panic!("expected event, got {:?}", other),
        }
    }

    fn write_cmd(port: &mut LoopbackPort, opcode: Opcode, params: &[u8]) {
        let wire = HciPacket::Command(HciCommand {
            opcode,
            params: params.to_vec(),
        })
        .encode()
        .unwrap();
        port.write(&wire).unwrap();
    }

    fn create_connection_params(peer: [u8; 6]) -> Vec<u8> {
        let mut p = vec![0x60, 0x00, 0x30, 0x00, 0x00, 0x00];
        p.extend_from_slice(&peer);
        p.push(0x00);
        p.extend_from_slice(&6u16.to_le_bytes()); // min interval (7.5 ms)
        p.extend_from_slice(&6u16.to_le_bytes()); // max interval
        p.extend_from_slice(&0u16.to_le_bytes()); // latency
        p.extend_from_slice(&100u16.to_le_bytes()); // supervision timeout
        p.extend_from_slice(&0u16.to_le_bytes());
        p.extend_from_slice(&0u16.to_le_bytes());
        p
    }

    #[test]
    fn scan_sees_advertiser() {
        let (mut central, mut peripheral) = LoopbackController::pair();
        write_cmd(&mut peripheral, Opcode::LE_SET_ADV_DATA, &[3, 2, 0x01, 0x06]);
        read_event(&mut peripheral);
        write_cmd(&mut peripheral, Opcode::LE_SET_ADV_ENABLE, &[1]);
        read_event(&mut peripheral);

        write_cmd(&mut central, Opcode::LE_SET_SCAN_ENABLE, &[1, 0]);
        let cc = read_event(&mut central);
        assert_eq!(cc.code, EVT_COMMAND_COMPLETE);
        let report = read_event(&mut central);
        assert_eq!(report.le_subevent(), Some(LE_SUB_ADVERTISING_REPORT));
    }

    #[test]
    fn connect_emits_complete_on_both_ports() {
        let (mut central, mut peripheral) = LoopbackController::pair();
        let peer_addr = peripheral.address();
        write_cmd(&mut peripheral, Opcode::LE_SET_ADV_ENABLE, &[1]);
        read_event(&mut peripheral);

        write_cmd(
            &mut central,
            Opcode::LE_CREATE_CONNECTION,
            &create_connection_params(peer_addr),
        );
        let status = read_event(&mut central);
        assert_eq!(status.code, EVT_COMMAND_STATUS);
        let conn = read_event(&mut central);
        assert_eq!(conn.le_subevent(), Some(LE_SUB_CONNECTION_COMPLETE));
        assert_eq!(conn.params[4], 0x00); // central role

        let conn = read_event(&mut peripheral);
        assert_eq!(conn.le_subevent(), Some(LE_SUB_CONNECTION_COMPLETE));
        assert_eq!(conn.params[4], 0x01); // peripheral role
    }

    #[test]
    fn acl_forwarding_credits_sender() {
        let (mut central, mut peripheral) = LoopbackController::pair();
        write_cmd(&mut peripheral, Opcode::LE_SET_ADV_ENABLE, &[1]);
        read_event(&mut peripheral);
        write_cmd(
            &mut central,
            Opcode::LE_CREATE_CONNECTION,
            &create_connection_params(peripheral.address()),
        );
        read_event(&mut central); // status
        let conn = read_event(&mut central);
        let handle = u16::from_le_bytes([conn.params[2], conn.params[3]]);
        read_event(&mut peripheral);

        let acl = HciPacket::Acl(AclPacket {
            handle,
            boundary: crate::hci::PacketBoundary::FirstNonFlushable,
            broadcast: 0,
            data: vec![0xab; 8],
        })
        .encode()
        .unwrap();
        central.write(&acl).unwrap();

        let nocp = read_event(&mut central);
        assert_eq!(nocp.code, EVT_NUM_COMPLETED_PACKETS);

        let mut buf = [0u8; 512];
        let n = peripheral.read(&mut buf).unwrap();
        match HciPacket::decode(&buf[..n]).unwrap() {
            HciPacket::Acl(forwarded) => assert_eq!(forwarded.data, vec![0xab; 8]),
            other => panic!("expected ACL, got {:?}", other),
        }
    }

    #[test]
    fn poll_times_out_when_idle() {
        let (mut central, _peripheral) = LoopbackController::pair();
        let ready = central.poll(PollFlags::READABLE, 10).unwrap();
        assert!(ready.is_empty());
    }

    #[test]
    fn deinit_notifies_peer_of_teardown() {
        let (mut central, mut peripheral) = LoopbackController::pair();
        write_cmd(&mut peripheral, Opcode::LE_SET_ADV_ENABLE, &[1]);
        read_event(&mut peripheral);
        write_cmd(
            &mut central,
            Opcode::LE_CREATE_CONNECTION,
            &create_connection_params(peripheral.address()),
        );
        read_event(&mut central);
        read_event(&mut central);
        read_event(&mut peripheral);

        central.deinit();
        let evt = read_event(&mut peripheral);
        assert_eq!(evt.code, EVT_DISCONNECTION_COMPLETE);
    }
}
