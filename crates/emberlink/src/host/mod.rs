// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! BLE host: GAP + GATT over an HCI transport capability.
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------------------------------+
//! |  Application: Host API calls + HostEvent queue                   |
//! +------------------------------------------------------------------+
//! |  GATT  | server dispatch, client correlation, attribute tables   |
//! |  ATT   | PDU codec, one outstanding request per connection       |
//! |  L2CAP | framing, fragmentation, per-(conn,CID) reassembly       |
//! |  GAP   | advertising, scanning, connection lifecycle             |
//! +------------------------------------------------------------------+
//! |  Event pump (one thread, owns the transport, owns flow control)  |
//! +------------------------------------------------------------------+
//! |  HCI transport capability                                        |
//! +------------------------------------------------------------------+
//! ```
//!
//! The pump thread owns the transport exclusively; every API call becomes
//! a work item on a mutex-free channel and parks the caller on a reply
//! channel. Synchronous GATT client calls therefore cost one round trip
//! through the pump plus the air time.
//!
//! # Example
//!
//! ```no_run
//! use emberlink::cap::{Meta, Spec};
//! use emberlink::hci::{Hci, LoopbackController};
//! use emberlink::host::{AdvParams, Host, HostConfig};
//!
//! # fn main() -> emberlink::host::Result<()> {
//! let (port, _peer) = LoopbackController::pair();
//! let hci = Hci::from(Spec::new(port, Meta::new("loopback-hci")));
//! let host = Host::start(hci, HostConfig::default())?;
//! host.start_advertising(AdvParams {
//!     name: "sensor-7".into(),
//!     ..AdvParams::default()
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod att;
mod connection;
mod error;
mod events;
mod flow;
pub mod gap;
pub mod gatt;
pub mod l2cap;
mod pump;
mod uuid;

pub use att::{AttErrorCode, AttPdu};
pub use connection::{CccdState, ConnState, Connection};
pub use error::{HostError, Result};
pub use events::{DeviceFound, DisconnectReason, EventQueue, HostEvent};
pub use flow::{AclCredits, BlockAckWindow};
pub use gap::{AddrType, AdvParams, BdAddr, ConnectParams, Role};
pub use gatt::{AttributeTable, GattServer};
pub use uuid::{Uuid, UUID_CCCD, UUID_CHARACTERISTIC, UUID_PRIMARY_SERVICE};

use crate::cap::Cap;
use crate::config::RuntimeConfig;
use crate::hci::{HciCap, HciTransport};
use crate::rt::{Cancel, Runtime, StdRuntime, Thread};
use att::{OP_MTU_REQ, OP_READ_REQ, OP_WRITE_REQ};
use crossbeam::channel::Sender;
use pump::{Pump, WorkItem};
use std::sync::Arc;
use std::time::Duration;

/// Host construction options.
pub struct HostConfig {
    /// Attribute table served in the server role.
    pub services: AttributeTable,
    /// Tunables; defaults to the process-wide [`crate::config::active`].
    pub runtime_config: Option<RuntimeConfig>,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            services: AttributeTable::empty(),
            runtime_config: None,
        }
    }
}

/// The BLE host.
///
/// Dropping the host cancels and joins the pump thread.
pub struct Host<R: Runtime = StdRuntime> {
    work_tx: Sender<WorkItem>,
    events: EventQueue,
    server: Arc<GattServer>,
    cancel: Cancel,
    pump_thread: Option<R::JoinHandle>,
    cfg: Arc<RuntimeConfig>,
}

impl Host<StdRuntime> {
    /// Start a host over `transport` with the std runtime.
    pub fn start<T>(transport: Cap<HciCap, T>, config: HostConfig) -> Result<Self>
    where
        T: HciTransport + Send + 'static,
    {
        Self::start_on(StdRuntime::new(), transport, config)
    }
}

impl<R: Runtime> Host<R> {
    /// Start a host over `transport`, spawning the pump on `runtime`.
    pub fn start_on<T>(
        runtime: R,
        transport: Cap<HciCap, T>,
        config: HostConfig,
    ) -> Result<Self>
    where
        T: HciTransport + Send + 'static,
    {
        let cfg = Arc::new(
            config
                .runtime_config
                .unwrap_or_else(|| crate::config::active().as_ref().clone()),
        );
        let server = Arc::new(GattServer::new(config.services));
        let cancel = Cancel::new();
        let (work_tx, work_rx) = crossbeam::channel::unbounded();
        let (events_tx, events) = EventQueue::channel(cfg.event_queue_depth);

        log::debug!(
            "[HOST] starting over transport '{}'",
            transport.meta().id()
        );
        let pump = Pump::new(
            transport.into_inner(),
            work_rx,
            events_tx,
            server.clone(),
            cfg.clone(),
            cancel.child(),
        );
        let pump_thread = runtime
            .spawn("emberlink-host", move || pump.run())
            .map_err(|e| HostError::Protocol(format!("pump spawn failed: {}", e)))?;

        Ok(Self {
            work_tx,
            events,
            server,
            cancel,
            pump_thread: Some(pump_thread),
            cfg,
        })
    }

    /// The GATT server (register handlers, seed values).
    #[must_use]
    pub fn server(&self) -> &GattServer {
        &self.server
    }

    /// Block for the next host event; `None` once the host is down.
    pub fn next_event(&self) -> Option<HostEvent> {
        self.events.next()
    }

    /// Non-blocking event poll.
    pub fn try_next_event(&self) -> Option<HostEvent> {
        self.events.try_next()
    }

    /// Block up to `timeout` for the next host event.
    pub fn next_event_timeout(&self, timeout: Duration) -> Option<HostEvent> {
        self.events.next_timeout(timeout)
    }

    // ----------------------------------------------------------------- GAP

    /// Start advertising as a connectable peripheral.
    pub fn start_advertising(&self, params: AdvParams) -> Result<()> {
        self.roundtrip(|reply| WorkItem::StartAdvertising { params, reply })
    }

    /// Stop advertising.
    pub fn stop_advertising(&self) -> Result<()> {
        self.roundtrip(|reply| WorkItem::StopAdvertising { reply })
    }

    /// Start passive scanning; results arrive as `DeviceFound` events.
    pub fn start_scan(&self) -> Result<()> {
        self.roundtrip(|reply| WorkItem::StartScan { reply })
    }

    /// Stop scanning.
    pub fn stop_scan(&self) -> Result<()> {
        self.roundtrip(|reply| WorkItem::StopScan { reply })
    }

    /// Connect to `peer`; returns the connection handle once the link is
    /// up. Data-length, PHY and MTU negotiation then run per the runtime
    /// config, surfacing `DataLengthChanged` / `PhyUpdated` /
    /// `MtuExchanged` events.
    pub fn connect(&self, peer: BdAddr, params: ConnectParams) -> Result<u16> {
        let (reply, rx) = crossbeam::channel::bounded(1);
        self.submit(WorkItem::Connect {
            peer,
            peer_type: AddrType::Public,
            params,
            reply,
        })?;
        self.await_reply(rx)
    }

    /// Tear a connection down.
    pub fn disconnect(&self, conn: u16) -> Result<()> {
        self.roundtrip(|reply| WorkItem::Disconnect { conn, reply })
    }

    // ---------------------------------------------------------- GATT client

    /// Read a characteristic value by handle.
    pub fn gatt_read(&self, conn: u16, handle: u16) -> Result<Vec<u8>> {
        match self.att_request(conn, AttPdu::ReadReq { handle })? {
            AttPdu::ReadRsp { value } => Ok(value),
            other => Err(unexpected_response(OP_READ_REQ, &other)),
        }
    }

    /// Acknowledged write to a characteristic value handle.
    pub fn gatt_write(&self, conn: u16, handle: u16, value: &[u8]) -> Result<()> {
        match self.att_request(
            conn,
            AttPdu::WriteReq {
                handle,
                value: value.to_vec(),
            },
        )? {
            AttPdu::WriteRsp => Ok(()),
            other => Err(unexpected_response(OP_WRITE_REQ, &other)),
        }
    }

    /// Unacknowledged write; returns once the outbound fragment is queued.
    pub fn gatt_write_cmd(&self, conn: u16, handle: u16, value: &[u8]) -> Result<()> {
        self.roundtrip(|reply| WorkItem::AttCommand {
            conn,
            pdu: AttPdu::WriteCmd {
                handle,
                value: value.to_vec(),
            },
            reply,
        })
    }

    /// Enable notifications (and optionally indications) by writing the
    /// CCCD that sits one handle after `value_handle`.
    pub fn gatt_subscribe(&self, conn: u16, value_handle: u16, indicate: bool) -> Result<()> {
        let bits: u16 = if indicate { 0x0002 } else { 0x0001 };
        self.gatt_write(conn, value_handle + 1, &bits.to_le_bytes())
    }

    /// Disable notifications and indications for `value_handle`.
    pub fn gatt_unsubscribe(&self, conn: u16, value_handle: u16) -> Result<()> {
        self.gatt_write(conn, value_handle + 1, &0u16.to_le_bytes())
    }

    /// Exchange the ATT MTU; returns the effective (minimum) MTU.
    pub fn gatt_exchange_mtu(&self, conn: u16, mtu: u16) -> Result<u16> {
        match self.att_request(conn, AttPdu::MtuReq { mtu })? {
            AttPdu::MtuRsp { mtu: server_mtu } => Ok(mtu.min(server_mtu)),
            other => Err(unexpected_response(OP_MTU_REQ, &other)),
        }
    }

    // ---------------------------------------------------------- GATT server

    /// Notify subscribed peers of a characteristic value change. Returns
    /// once the first fragment is queued (or the notification parked
    /// behind the TX window).
    pub fn notify(&self, conn: u16, value_handle: u16, value: &[u8]) -> Result<()> {
        self.roundtrip(|reply| WorkItem::Notify {
            conn,
            value_handle,
            value: value.to_vec(),
            indicate: false,
            reply,
        })
    }

    /// Indicate a characteristic value change (confirmed delivery).
    pub fn indicate(&self, conn: u16, value_handle: u16, value: &[u8]) -> Result<()> {
        self.roundtrip(|reply| WorkItem::Notify {
            conn,
            value_handle,
            value: value.to_vec(),
            indicate: true,
            reply,
        })
    }

    // ------------------------------------------------------------ plumbing

    fn att_request(&self, conn: u16, pdu: AttPdu) -> Result<AttPdu> {
        let (reply, rx) = crossbeam::channel::bounded(1);
        self.submit(WorkItem::AttRequest { conn, pdu, reply })?;
        self.await_reply(rx)
    }

    fn roundtrip<F, V>(&self, make: F) -> Result<V>
    where
        F: FnOnce(Sender<Result<V>>) -> WorkItem,
    {
        let (reply, rx) = crossbeam::channel::bounded(1);
        self.submit(make(reply))?;
        self.await_reply(rx)
    }

    fn submit(&self, item: WorkItem) -> Result<()> {
        self.work_tx.send(item).map_err(|_| HostError::HostDown)
    }

    fn await_reply<V>(&self, rx: crossbeam::channel::Receiver<Result<V>>) -> Result<V> {
        // The pump enforces the request deadline; the margin here only
        // catches a wedged pump.
        let budget = self.cfg.request_timeout + Duration::from_secs(1);
        match rx.recv_timeout(budget) {
            Ok(result) => result,
            Err(crossbeam::channel::RecvTimeoutError::Timeout) => Err(HostError::Timeout),
            Err(crossbeam::channel::RecvTimeoutError::Disconnected) => Err(HostError::HostDown),
        }
    }

    /// Stop the pump and join it.
    pub fn shutdown(mut self) {
        self.shutdown_inner();
    }

    fn shutdown_inner(&mut self) {
        self.cancel.cancel();
        let _ = self.work_tx.send(WorkItem::Shutdown);
        if let Some(handle) = self.pump_thread.take() {
            let _ = handle.join();
        }
    }
}

impl<R: Runtime> Drop for Host<R> {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

fn unexpected_response(request: u8, response: &AttPdu) -> HostError {
    HostError::Protocol(format!(
        "request 0x{:02x} answered by unexpected opcode 0x{:02x}",
        request,
        response.opcode()
    ))
}
