// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! The host event pump.
//!
//! One thread owns the HCI transport. Each iteration drains application
//! work, services the outbound queues (commands under the
//! one-outstanding-command rule, ACL fragments under controller credits,
//! notifications under the per-connection block-ack window), then polls
//! the transport and dispatches whatever arrived: GAP meta-events to the
//! connection machine, ACL data to L2CAP/ATT, completions to the command
//! tracker.
//!
//! `WouldBlock` from the transport requeues work; a fatal transport error
//! tears every connection down with a synthetic `Disconnected`.

use super::att::AttPdu;
use super::gatt::client::{ActiveRequest, OutboundRequest, RequestSlot};
use super::connection::{AutoStep, ConnState, Connection, QueuedNotification};
use super::events::{DeviceFound, DisconnectReason, HostEvent};
use super::flow::AclCredits;
use super::gap::{self, AddrType, AdvParams, BdAddr, ConnectParams, Role};
use super::l2cap::{self, Reassembly, CID_ATT};
use super::{error::HostError, error::Result};
use crate::config::{RuntimeConfig, DLE_MAX_OCTETS, DLE_MAX_TIME_US};
use crate::hci::packet::{
    AclPacket, HciCommand, HciEvent, HciPacket, Opcode, EVT_COMMAND_COMPLETE, EVT_COMMAND_STATUS,
    EVT_DISCONNECTION_COMPLETE, EVT_LE_META, EVT_NUM_COMPLETED_PACKETS, LE_SUB_ADVERTISING_REPORT,
    LE_SUB_CONNECTION_COMPLETE, LE_SUB_DATA_LENGTH_CHANGE, LE_SUB_PHY_UPDATE_COMPLETE,
};
use crate::hci::HciTransport;
use crate::host::gatt::client::request_handle;
use crate::host::gatt::GattServer;
use crate::net::PollFlags;
use crate::rt::Cancel;
use crossbeam::channel::{Receiver, Sender};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Read buffer large enough for any H4 packet.
const READ_BUF_LEN: usize = 1 + 4 + 0xffff;

/// Application work submitted to the pump.
pub(crate) enum WorkItem {
    StartAdvertising {
        params: AdvParams,
        reply: Sender<Result<()>>,
    },
    StopAdvertising {
        reply: Sender<Result<()>>,
    },
    StartScan {
        reply: Sender<Result<()>>,
    },
    StopScan {
        reply: Sender<Result<()>>,
    },
    Connect {
        peer: BdAddr,
        peer_type: AddrType,
        params: ConnectParams,
        reply: Sender<Result<u16>>,
    },
    Disconnect {
        conn: u16,
        reply: Sender<Result<()>>,
    },
    AttRequest {
        conn: u16,
        pdu: AttPdu,
        reply: Sender<Result<AttPdu>>,
    },
    AttCommand {
        conn: u16,
        pdu: AttPdu,
        reply: Sender<Result<()>>,
    },
    Notify {
        conn: u16,
        value_handle: u16,
        value: Vec<u8>,
        indicate: bool,
        reply: Sender<Result<()>>,
    },
    Shutdown,
}

/// What to do when a queued command completes.
enum CmdCtx {
    /// Nothing; completion only frees the command slot.
    Plain,
    /// Ack the caller with the completion status.
    Reply(Sender<Result<()>>),
    /// LE Read Buffer Size: install the credit pool.
    ReadBufferSize,
    /// LE Create Connection: completion arrives as a meta-event.
    CreateConn,
}

pub(crate) struct Pump<T: HciTransport> {
    transport: T,
    work_rx: Receiver<WorkItem>,
    events_tx: Sender<HostEvent>,
    server: Arc<GattServer>,
    cfg: Arc<RuntimeConfig>,
    cancel: Cancel,

    credits: AclCredits,
    cmd_queue: VecDeque<(HciCommand, CmdCtx)>,
    pending_cmd: Option<(Opcode, CmdCtx, Instant)>,
    acl_out: VecDeque<AclPacket>,

    scanning: bool,
    pending_connect: Option<(BdAddr, Sender<Result<u16>>, Instant)>,
    connections: HashMap<u16, Connection>,
    slots: HashMap<u16, RequestSlot>,
    disconnect_waiters: HashMap<u16, Vec<Sender<Result<()>>>>,
    shutting_down: bool,
}

impl<T: HciTransport> Pump<T> {
    pub(crate) fn new(
        transport: T,
        work_rx: Receiver<WorkItem>,
        events_tx: Sender<HostEvent>,
        server: Arc<GattServer>,
        cfg: Arc<RuntimeConfig>,
        cancel: Cancel,
    ) -> Self {
        Self {
            transport,
            work_rx,
            events_tx,
            server,
            cfg,
            cancel,
            credits: AclCredits::new(),
            cmd_queue: VecDeque::new(),
            pending_cmd: None,
            acl_out: VecDeque::new(),
            scanning: false,
            pending_connect: None,
            connections: HashMap::new(),
            slots: HashMap::new(),
            disconnect_waiters: HashMap::new(),
            shutting_down: false,
        }
    }

    pub(crate) fn run(mut self) {
        if let Err(e) = self.transport.init() {
            log::error!("[HOST] transport init failed: {}", e);
            return;
        }
        self.enqueue_cmd(
            HciCommand {
                opcode: Opcode::RESET,
                params: vec![],
            },
            CmdCtx::Plain,
        );
        self.enqueue_cmd(
            HciCommand {
                opcode: Opcode::LE_READ_BUFFER_SIZE,
                params: vec![],
            },
            CmdCtx::ReadBufferSize,
        );

        loop {
            if self.cancel.is_cancelled() || self.shutting_down {
                break;
            }
            self.drain_work();
            if !self.service_outbound() {
                break;
            }
            match self
                .transport
                .poll(PollFlags::READABLE, self.cfg.pump_poll_ms)
            {
                Ok(ready) if ready.contains(PollFlags::ERROR) => {
                    self.on_transport_fatal();
                    break;
                }
                Ok(ready) if ready.contains(PollFlags::READABLE) => {
                    if !self.drain_transport() {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_would_block() => {}
                Err(e) => {
                    log::error!("[HOST] transport poll failed: {}", e);
                    self.on_transport_fatal();
                    break;
                }
            }
            self.check_timeouts();
        }
        self.teardown();
    }

    // ---------------------------------------------------------------- work

    fn drain_work(&mut self) {
        while let Ok(item) = self.work_rx.try_recv() {
            self.handle_work(item);
        }
    }

    fn handle_work(&mut self, item: WorkItem) {
        match item {
            WorkItem::StartAdvertising { params, reply } => {
                let data = gap::build_adv_data(&params.name);
                self.enqueue_cmd(gap::set_adv_params(&params), CmdCtx::Plain);
                self.enqueue_cmd(gap::set_adv_data(&data), CmdCtx::Plain);
                self.enqueue_cmd(gap::set_adv_enable(true), CmdCtx::Reply(reply));
            }
            WorkItem::StopAdvertising { reply } => {
                self.enqueue_cmd(gap::set_adv_enable(false), CmdCtx::Reply(reply));
            }
            WorkItem::StartScan { reply } => {
                self.scanning = true;
                self.enqueue_cmd(gap::set_scan_params(), CmdCtx::Plain);
                self.enqueue_cmd(gap::set_scan_enable(true), CmdCtx::Reply(reply));
            }
            WorkItem::StopScan { reply } => {
                self.scanning = false;
                self.enqueue_cmd(gap::set_scan_enable(false), CmdCtx::Reply(reply));
            }
            WorkItem::Connect {
                peer,
                peer_type,
                params,
                reply,
            } => {
                if self.pending_connect.is_some() {
                    let _ = reply.send(Err(HostError::InvalidState("connect already pending")));
                    return;
                }
                let deadline = Instant::now() + self.cfg.request_timeout;
                self.pending_connect = Some((peer, reply, deadline));
                self.enqueue_cmd(
                    gap::create_connection(peer, peer_type, params),
                    CmdCtx::CreateConn,
                );
            }
            WorkItem::Disconnect { conn, reply } => {
                if let Some(connection) = self.connections.get_mut(&conn) {
                    connection.state = ConnState::Disconnecting;
                    self.disconnect_waiters.entry(conn).or_default().push(reply);
                    self.enqueue_cmd(gap::disconnect(conn, 0x13), CmdCtx::Plain);
                } else {
                    let _ = reply.send(Err(HostError::NotConnected));
                }
            }
            WorkItem::AttRequest { conn, pdu, reply } => {
                if !self.connections.contains_key(&conn) {
                    let _ = reply.send(Err(HostError::NotConnected));
                    return;
                }
                if let AttPdu::MtuReq { mtu } = &pdu {
                    if let Some(connection) = self.connections.get_mut(&conn) {
                        connection.pending_mtu = Some(*mtu);
                    }
                }
                self.slots
                    .entry(conn)
                    .or_default()
                    .queue
                    .push_back(OutboundRequest { pdu, reply });
            }
            WorkItem::AttCommand { conn, pdu, reply } => {
                let result = self.send_att_pdu(conn, &pdu);
                let _ = reply.send(result);
            }
            WorkItem::Notify {
                conn,
                value_handle,
                value,
                indicate,
                reply,
            } => {
                let result = self.notify(conn, value_handle, value, indicate);
                let _ = reply.send(result);
            }
            WorkItem::Shutdown => {
                self.shutting_down = true;
            }
        }
    }

    fn notify(
        &mut self,
        conn: u16,
        value_handle: u16,
        value: Vec<u8>,
        indicate: bool,
    ) -> Result<()> {
        let connection = self
            .connections
            .get_mut(&conn)
            .ok_or(HostError::NotConnected)?;
        let cccd = connection.cccd_for(value_handle);
        let enabled = if indicate {
            cccd.indicate()
        } else {
            cccd.notify()
        };
        if !enabled {
            return Err(HostError::NotSubscribed);
        }
        // Fragment per MTU: one notification carries at most MTU - 3 bytes.
        let cap = usize::from(connection.mtu).saturating_sub(3).max(1);
        let value = if value.len() > cap {
            value[..cap].to_vec()
        } else {
            value
        };
        if connection.tx_window.can_send() {
            connection.tx_window.on_sent();
            let pdu = if indicate {
                AttPdu::Indicate {
                    handle: value_handle,
                    value,
                }
            } else {
                AttPdu::Notify {
                    handle: value_handle,
                    value,
                }
            };
            self.send_att_pdu(conn, &pdu)
        } else {
            connection.notify_queue.push_back(QueuedNotification {
                value_handle,
                value,
                indicate,
            });
            log::debug!(
                "[HOST] conn 0x{:04x} notify queued behind TX window ({} waiting)",
                conn,
                connection.notify_queue.len()
            );
            Ok(())
        }
    }

    // ------------------------------------------------------------ outbound

    fn enqueue_cmd(&mut self, cmd: HciCommand, ctx: CmdCtx) {
        self.cmd_queue.push_back((cmd, ctx));
    }

    fn send_att_pdu(&mut self, conn: u16, pdu: &AttPdu) -> Result<()> {
        let connection = self
            .connections
            .get_mut(&conn)
            .ok_or(HostError::NotConnected)?;
        let fragments = l2cap::fragment(
            conn,
            CID_ATT,
            &pdu.encode(),
            usize::from(connection.acl_max_len),
        );
        self.acl_out.extend(fragments);
        Ok(())
    }

    /// Returns false on a fatal transport error.
    fn service_outbound(&mut self) -> bool {
        // One outstanding command at a time.
        if self.pending_cmd.is_none() {
            if let Some((cmd, ctx)) = self.cmd_queue.pop_front() {
                let wire = HciPacket::Command(cmd.clone())
                    .encode()
                    .expect("well-formed command");
                match self.transport.write(&wire) {
                    Ok(_) => {
                        self.pending_cmd =
                            Some((cmd.opcode, ctx, Instant::now() + self.cfg.request_timeout));
                    }
                    Err(e) if e.is_would_block() => {
                        self.cmd_queue.push_front((cmd, ctx));
                    }
                    Err(e) => {
                        log::error!("[HOST] command write failed: {}", e);
                        self.on_transport_fatal();
                        return false;
                    }
                }
            }
        }

        // Promote queued ATT requests into free slots.
        let conns: Vec<u16> = self.slots.keys().copied().collect();
        for conn in conns {
            self.promote_request(conn);
        }

        // Drain queued notifications into open windows.
        let conns: Vec<u16> = self.connections.keys().copied().collect();
        for conn in conns {
            loop {
                let Some(connection) = self.connections.get_mut(&conn) else {
                    break;
                };
                if !connection.tx_window.can_send() || connection.notify_queue.is_empty() {
                    break;
                }
                let queued = connection.notify_queue.pop_front().expect("checked above");
                connection.tx_window.on_sent();
                let pdu = if queued.indicate {
                    AttPdu::Indicate {
                        handle: queued.value_handle,
                        value: queued.value,
                    }
                } else {
                    AttPdu::Notify {
                        handle: queued.value_handle,
                        value: queued.value,
                    }
                };
                if self.send_att_pdu(conn, &pdu).is_err() {
                    break;
                }
            }
        }

        // ACL fragments, gated by controller credits.
        while let Some(packet) = self.acl_out.pop_front() {
            if !self.credits.try_consume() {
                self.acl_out.push_front(packet);
                break;
            }
            let wire = HciPacket::Acl(packet.clone())
                .encode()
                .expect("well-formed ACL");
            match self.transport.write(&wire) {
                Ok(_) => {}
                Err(e) if e.is_would_block() => {
                    self.credits.replenish(1);
                    self.acl_out.push_front(packet);
                    break;
                }
                Err(e) => {
                    log::error!("[HOST] ACL write failed: {}", e);
                    self.on_transport_fatal();
                    return false;
                }
            }
        }
        true
    }

    fn promote_request(&mut self, conn: u16) {
        let Some(slot) = self.slots.get_mut(&conn) else {
            return;
        };
        if slot.active.is_some() || slot.queue.is_empty() {
            return;
        }
        let outbound = slot.queue.pop_front().expect("checked above");
        let request_opcode = outbound.pdu.opcode();
        let Some(expected_rsp) = AttPdu::expected_response(request_opcode) else {
            let _ = outbound
                .reply
                .send(Err(HostError::InvalidState("not a request opcode")));
            return;
        };
        let deadline = Instant::now() + self.cfg.request_timeout;
        slot.active = Some(ActiveRequest {
            request_opcode,
            expected_rsp,
            handle: request_handle(&outbound.pdu),
            reply: outbound.reply,
            deadline,
        });
        let pdu = outbound.pdu;
        if let Err(e) = self.send_att_pdu(conn, &pdu) {
            if let Some(slot) = self.slots.get_mut(&conn) {
                if let Some(active) = slot.active.take() {
                    let _ = active.reply.send(Err(e));
                }
            }
        }
    }

    // ------------------------------------------------------------- inbound

    /// Returns false on a fatal transport error.
    fn drain_transport(&mut self) -> bool {
        let mut buf = vec![0u8; READ_BUF_LEN];
        loop {
            match self.transport.read(&mut buf) {
                Ok(0) => return true,
                Ok(n) => match HciPacket::decode(&buf[..n]) {
                    Ok(packet) => self.dispatch(packet),
                    Err(e) => log::warn!("[HOST] dropping malformed HCI packet: {}", e),
                },
                Err(e) if e.is_would_block() => return true,
                Err(e) => {
                    log::error!("[HOST] transport read failed: {}", e);
                    self.on_transport_fatal();
                    return false;
                }
            }
        }
    }

    fn dispatch(&mut self, packet: HciPacket) {
        match packet {
            HciPacket::Event(event) => self.dispatch_event(&event),
            HciPacket::Acl(acl) => self.dispatch_acl(&acl),
            HciPacket::Command(_) => {
                log::warn!("[HOST] controller sent a command packet, dropping");
            }
        }
    }

    fn dispatch_event(&mut self, event: &HciEvent) {
        match event.code {
            EVT_COMMAND_COMPLETE => self.on_command_complete(event),
            EVT_COMMAND_STATUS => self.on_command_status(event),
            EVT_DISCONNECTION_COMPLETE => self.on_disconnection(event),
            EVT_NUM_COMPLETED_PACKETS => self.on_completed_packets(event),
            EVT_LE_META => self.on_le_meta(event),
            other => log::debug!("[HOST] ignoring HCI event 0x{:02x}", other),
        }
    }

    fn on_command_complete(&mut self, event: &HciEvent) {
        if event.params.len() < 3 {
            return;
        }
        let opcode = Opcode(u16::from_le_bytes([event.params[1], event.params[2]]));
        let status = event.params.get(3).copied().unwrap_or(0);
        let Some((pending_opcode, ctx, _)) = self.pending_cmd.take() else {
            return;
        };
        if pending_opcode != opcode {
            log::warn!(
                "[HOST] completion for {:?} while {:?} outstanding",
                opcode,
                pending_opcode
            );
            self.pending_cmd = Some((pending_opcode, ctx, Instant::now()));
            return;
        }
        match ctx {
            CmdCtx::Plain | CmdCtx::CreateConn => {}
            CmdCtx::Reply(reply) => {
                let result = if status == 0 {
                    Ok(())
                } else {
                    Err(HostError::Protocol(format!(
                        "command {:?} failed with status 0x{:02x}",
                        opcode, status
                    )))
                };
                let _ = reply.send(result);
            }
            CmdCtx::ReadBufferSize => {
                if status == 0 && event.params.len() >= 7 {
                    let total = u16::from(event.params[6]);
                    self.credits.configure(total);
                    log::info!(
                        "[HOST] controller ACL buffers: {} x {} bytes",
                        total,
                        u16::from_le_bytes([event.params[4], event.params[5]])
                    );
                }
            }
        }
    }

    fn on_command_status(&mut self, event: &HciEvent) {
        if event.params.len() < 4 {
            return;
        }
        let status = event.params[0];
        let opcode = Opcode(u16::from_le_bytes([event.params[2], event.params[3]]));
        if let Some((pending_opcode, ctx, deadline)) = self.pending_cmd.take() {
            if pending_opcode != opcode {
                self.pending_cmd = Some((pending_opcode, ctx, deadline));
                return;
            }
            match ctx {
                CmdCtx::CreateConn if status != 0 => {
                    if let Some((_, reply, _)) = self.pending_connect.take() {
                        let _ = reply.send(Err(HostError::Protocol(format!(
                            "LE Create Connection rejected: 0x{:02x}",
                            status
                        ))));
                    }
                }
                CmdCtx::Reply(reply) => {
                    let result = if status == 0 {
                        Ok(())
                    } else {
                        Err(HostError::Protocol(format!(
                            "command {:?} rejected: 0x{:02x}",
                            opcode, status
                        )))
                    };
                    let _ = reply.send(result);
                }
                _ => {}
            }
        }
    }

    fn on_disconnection(&mut self, event: &HciEvent) {
        if event.params.len() < 4 {
            return;
        }
        let handle = u16::from_le_bytes([event.params[1], event.params[2]]);
        let reason = DisconnectReason::from_hci(event.params[3]);
        self.teardown_connection(handle, reason);
    }

    fn teardown_connection(&mut self, handle: u16, reason: DisconnectReason) {
        if self.connections.remove(&handle).is_none() {
            return;
        }
        if let Some(mut slot) = self.slots.remove(&handle) {
            slot.fail_all(|| HostError::NotConnected);
        }
        if let Some(waiters) = self.disconnect_waiters.remove(&handle) {
            for waiter in waiters {
                let _ = waiter.send(Ok(()));
            }
        }
        self.acl_out.retain(|packet| packet.handle != handle);
        log::info!("[HOST] conn 0x{:04x} disconnected: {:?}", handle, reason);
        self.publish(HostEvent::Disconnected {
            conn: handle,
            reason,
        });
    }

    fn on_completed_packets(&mut self, event: &HciEvent) {
        let Some(&count) = event.params.first() else {
            return;
        };
        let mut offset = 1;
        for _ in 0..count {
            if event.params.len() < offset + 4 {
                return;
            }
            let handle =
                u16::from_le_bytes([event.params[offset], event.params[offset + 1]]);
            let completed =
                u16::from_le_bytes([event.params[offset + 2], event.params[offset + 3]]);
            offset += 4;
            self.credits.replenish(completed);
            if let Some(connection) = self.connections.get_mut(&handle) {
                connection
                    .tx_window
                    .on_acked(completed.min(u16::from(u8::MAX)) as u8);
            }
        }
    }

    fn on_le_meta(&mut self, event: &HciEvent) {
        match event.le_subevent() {
            Some(LE_SUB_CONNECTION_COMPLETE) => self.on_connection_complete(&event.params[1..]),
            Some(LE_SUB_ADVERTISING_REPORT) => self.on_adv_report(&event.params[1..]),
            Some(LE_SUB_DATA_LENGTH_CHANGE) => self.on_data_length_change(&event.params[1..]),
            Some(LE_SUB_PHY_UPDATE_COMPLETE) => self.on_phy_update(&event.params[1..]),
            Some(other) => log::debug!("[HOST] ignoring LE subevent 0x{:02x}", other),
            None => {}
        }
    }

    fn on_connection_complete(&mut self, params: &[u8]) {
        if params.len() < 18 {
            return;
        }
        let status = params[0];
        let handle = u16::from_le_bytes([params[1], params[2]]);
        let role = if params[3] == 0 {
            Role::Central
        } else {
            Role::Peripheral
        };
        let peer_type = AddrType::from_wire(params[4]);
        let mut peer = [0u8; 6];
        peer.copy_from_slice(&params[5..11]);
        let peer = BdAddr(peer);
        let interval = u16::from_le_bytes([params[11], params[12]]);
        let latency = u16::from_le_bytes([params[13], params[14]]);
        let timeout = u16::from_le_bytes([params[15], params[16]]);

        if status != 0 {
            if let Some((_, reply, _)) = self.pending_connect.take() {
                let _ = reply.send(Err(HostError::Protocol(format!(
                    "connection failed: 0x{:02x}",
                    status
                ))));
            }
            return;
        }

        let mut connection = Connection::new(handle, role, peer, peer_type, self.cfg.tx_window);
        connection.state = ConnState::Connected;
        connection.interval = interval;
        connection.latency = latency;
        connection.supervision_timeout = timeout;
        connection.auto = if role == Role::Central {
            AutoStep::DataLength
        } else {
            AutoStep::Done
        };
        self.connections.insert(handle, connection);
        self.slots.entry(handle).or_default();

        log::info!(
            "[HOST] conn 0x{:04x} established: role={:?} peer={} interval={}x1.25ms",
            handle,
            role,
            peer,
            interval
        );
        if role == Role::Central {
            if let Some((_, reply, _)) = self.pending_connect.take() {
                let _ = reply.send(Ok(handle));
            }
        }
        self.publish(HostEvent::Connected {
            conn: handle,
            role,
            peer,
        });
        self.advance_auto(handle);
    }

    fn on_adv_report(&mut self, params: &[u8]) {
        if !self.scanning || params.len() < 11 {
            return;
        }
        // Single-report parsing; the loopback controller never batches.
        let mut addr = [0u8; 6];
        addr.copy_from_slice(&params[3..9]);
        let data_len = usize::from(params[9]);
        let Some(adv_data) = params.get(10..10 + data_len) else {
            return;
        };
        let rssi = params
            .get(10 + data_len)
            .map(|&b| b as i8)
            .unwrap_or(0);
        let found = DeviceFound {
            addr: BdAddr(addr),
            name: gap::parse_adv_name(adv_data),
            adv_data: adv_data.to_vec(),
            rssi,
        };
        self.publish(HostEvent::DeviceFound(found));
    }

    fn on_data_length_change(&mut self, params: &[u8]) {
        if params.len() < 8 {
            return;
        }
        let handle = u16::from_le_bytes([params[0], params[1]]);
        let max_tx = u16::from_le_bytes([params[2], params[3]]);
        if let Some(connection) = self.connections.get_mut(&handle) {
            connection.acl_max_len = max_tx;
        }
        self.publish(HostEvent::DataLengthChanged {
            conn: handle,
            max_octets: max_tx,
        });
        self.advance_auto_past(handle, AutoStep::DataLength);
    }

    fn on_phy_update(&mut self, params: &[u8]) {
        if params.len() < 5 {
            return;
        }
        let handle = u16::from_le_bytes([params[1], params[2]]);
        let tx_phy = params[3];
        let rx_phy = params[4];
        if let Some(connection) = self.connections.get_mut(&handle) {
            connection.phy = tx_phy;
        }
        self.publish(HostEvent::PhyUpdated {
            conn: handle,
            tx_phy,
            rx_phy,
        });
        self.advance_auto_past(handle, AutoStep::Phy);
    }

    /// Run the next enabled autoconfiguration step for `conn`.
    fn advance_auto(&mut self, conn: u16) {
        loop {
            let step = {
                let Some(connection) = self.connections.get_mut(&conn) else {
                    return;
                };
                let step = connection.auto;
                connection.auto = match step {
                    AutoStep::DataLength => AutoStep::Phy,
                    AutoStep::Phy => AutoStep::Mtu,
                    AutoStep::Mtu | AutoStep::Done => AutoStep::Done,
                };
                if step == AutoStep::Mtu {
                    connection.pending_mtu = Some(self.cfg.preferred_mtu);
                }
                step
            };
            match step {
                AutoStep::DataLength => {
                    if self.cfg.auto_data_length {
                        self.enqueue_cmd(
                            gap::set_data_length(conn, DLE_MAX_OCTETS, DLE_MAX_TIME_US),
                            CmdCtx::Plain,
                        );
                        return;
                    }
                }
                AutoStep::Phy => {
                    if self.cfg.auto_phy_2m {
                        self.enqueue_cmd(gap::set_phy_2m(conn), CmdCtx::Plain);
                        return;
                    }
                }
                AutoStep::Mtu => {
                    let mtu = self.cfg.preferred_mtu;
                    // Internal request: nobody waits on the reply channel;
                    // completion is observed via the MtuExchanged event.
                    let (tx, _rx) = crossbeam::channel::bounded(1);
                    self.slots
                        .entry(conn)
                        .or_default()
                        .queue
                        .push_back(OutboundRequest {
                            pdu: AttPdu::MtuReq { mtu },
                            reply: tx,
                        });
                    return;
                }
                AutoStep::Done => return,
            }
        }
    }

    /// Advance past `completed` if that is where the machine stands.
    fn advance_auto_past(&mut self, conn: u16, completed: AutoStep) {
        let Some(connection) = self.connections.get(&conn) else {
            return;
        };
        // The machine was already moved to the *next* step when the command
        // was issued; completion of DataLength finds it at Phy, etc.
        let expected_next = match completed {
            AutoStep::DataLength => AutoStep::Phy,
            AutoStep::Phy => AutoStep::Mtu,
            _ => return,
        };
        if connection.auto == expected_next {
            self.advance_auto(conn);
        }
    }

    fn dispatch_acl(&mut self, acl: &AclPacket) {
        let Some(connection) = self.connections.get_mut(&acl.handle) else {
            log::debug!("[HOST] ACL for unknown conn 0x{:04x}", acl.handle);
            return;
        };
        match connection.reassembler.push(acl) {
            Reassembly::Incomplete => {}
            Reassembly::Invalid(why) => {
                log::warn!("[HOST] conn 0x{:04x} L2CAP framing error: {}", acl.handle, why);
            }
            Reassembly::Complete { cid, payload } => match cid {
                CID_ATT => self.on_att_pdu(acl.handle, &payload),
                other => {
                    log::debug!("[HOST] conn 0x{:04x} PDU on unhandled CID 0x{:04x}", acl.handle, other);
                }
            },
        }
    }

    fn on_att_pdu(&mut self, conn: u16, payload: &[u8]) {
        let Some(pdu) = AttPdu::decode(payload) else {
            log::warn!("[HOST] conn 0x{:04x} undecodable ATT PDU, dropping", conn);
            return;
        };

        // Client role: does this answer the outstanding request?
        let is_response = self
            .slots
            .get(&conn)
            .map(|slot| slot.matches(&pdu))
            .unwrap_or(false);
        if is_response {
            if let AttPdu::MtuRsp { mtu: server_mtu } = &pdu {
                if let Some(connection) = self.connections.get_mut(&conn) {
                    let ours = connection.pending_mtu.take().unwrap_or(self.cfg.preferred_mtu);
                    let effective = ours.min(*server_mtu).max(crate::config::ATT_MTU_DEFAULT);
                    connection.mtu = effective;
                    self.publish(HostEvent::MtuExchanged {
                        conn,
                        mtu: effective,
                    });
                }
            }
            if let Some(slot) = self.slots.get_mut(&conn) {
                slot.complete(pdu);
            }
            self.promote_request(conn);
            return;
        }

        match &pdu {
            AttPdu::Notify { handle, value } => {
                self.publish(HostEvent::Notification {
                    conn,
                    handle: *handle,
                    value: value.clone(),
                    indicated: false,
                });
            }
            AttPdu::Indicate { handle, value } => {
                self.publish(HostEvent::Notification {
                    conn,
                    handle: *handle,
                    value: value.clone(),
                    indicated: true,
                });
                let _ = self.send_att_pdu(conn, &AttPdu::Confirm);
            }
            AttPdu::Confirm => {
                // Confirmation for a server indication; the slot machinery
                // handled correlation above when one was outstanding.
                log::debug!("[HOST] conn 0x{:04x} stray confirmation", conn);
            }
            _ => {
                // Server role.
                let server = self.server.clone();
                let Some(connection) = self.connections.get_mut(&conn) else {
                    return;
                };
                let outcome = server.process(connection, &pdu);
                if let Some(new_mtu) = outcome.mtu_changed {
                    log::debug!("[HOST] conn 0x{:04x} MTU now {}", conn, new_mtu);
                }
                if let Some(response) = outcome.response {
                    let _ = self.send_att_pdu(conn, &response);
                }
                if let Some(event) = outcome.event {
                    self.publish(event);
                }
            }
        }
    }

    // ------------------------------------------------------------- plumbing

    fn check_timeouts(&mut self) {
        let now = Instant::now();
        if let Some((opcode, _, deadline)) = &self.pending_cmd {
            if now >= *deadline {
                log::error!("[HOST] command {:?} timed out", opcode);
                self.pending_cmd = None;
            }
        }
        if let Some((_, _, deadline)) = &self.pending_connect {
            if now >= *deadline {
                let (_, reply, _) = self.pending_connect.take().expect("checked above");
                let _ = reply.send(Err(HostError::Timeout));
                self.enqueue_cmd(
                    HciCommand {
                        opcode: Opcode::LE_CREATE_CONNECTION_CANCEL,
                        params: vec![],
                    },
                    CmdCtx::Plain,
                );
            }
        }
        for slot in self.slots.values_mut() {
            slot.expire(now);
        }
    }

    fn on_transport_fatal(&mut self) {
        let handles: Vec<u16> = self.connections.keys().copied().collect();
        for handle in handles {
            self.teardown_connection(handle, DisconnectReason::TransportFailed);
        }
        self.shutting_down = true;
    }

    fn teardown(&mut self) {
        if let Some((_, reply, _)) = self.pending_connect.take() {
            let _ = reply.send(Err(HostError::HostDown));
        }
        for (_, mut slot) in self.slots.drain() {
            slot.fail_all(|| HostError::HostDown);
        }
        for (_, waiters) in self.disconnect_waiters.drain() {
            for waiter in waiters {
                let _ = waiter.send(Ok(()));
            }
        }
        self.transport.deinit();
        log::debug!("[HOST] pump exited");
    }

    fn publish(&self, event: HostEvent) {
        // Block briefly on a full queue; if the app still is not draining,
        // drop the event rather than wedging the pump.
        if self
            .events_tx
            .send_timeout(event, Duration::from_millis(100))
            .is_err()
        {
            log::warn!("[HOST] event queue full, dropping event");
        }
    }
}
