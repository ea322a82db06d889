// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! GATT server: attribute lookup, handler dispatch and CCCD bookkeeping.
//!
//! The server is driven by the event pump with inbound ATT PDUs; it
//! produces at most one response PDU plus optionally one application event
//! per request (the transaction model of ATT). Value rows resolve to an
//! app-registered handler, or to the built-in value store when no handler
//! is registered.

use super::table::{AttributeTable, CharProps, RowKind};
use crate::config::ATT_MTU_MAX;
use crate::host::att::{AttErrorCode, AttPdu};
use crate::host::connection::{CccdState, Connection};
use crate::host::events::HostEvent;
use dashmap::DashMap;

/// The operation a [`Request`] describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttOp {
    /// Read the value.
    Read,
    /// Write the value.
    Write,
    /// Queue a partial write.
    PrepareWrite,
    /// Commit (or cancel) queued writes.
    ExecuteWrite,
}

/// An attribute access forwarded to an app handler.
#[derive(Debug)]
pub struct Request<'a> {
    /// Operation kind.
    pub op: AttOp,
    /// Connection the request arrived on.
    pub conn: u16,
    /// Attribute handle.
    pub handle: u16,
    /// Value offset (prepare writes).
    pub offset: u16,
    /// Inbound value bytes (writes) or empty (reads).
    pub data: &'a [u8],
}

/// Collects the handler's answer.
pub struct ResponseWriter {
    value: Vec<u8>,
    error: Option<AttErrorCode>,
    done: bool,
}

impl ResponseWriter {
    fn new() -> Self {
        Self {
            value: Vec::new(),
            error: None,
            done: false,
        }
    }

    /// Append response bytes (reads).
    pub fn write(&mut self, bytes: &[u8]) {
        self.value.extend_from_slice(bytes);
    }

    /// Complete successfully.
    pub fn ok(&mut self) {
        self.done = true;
    }

    /// Fail with an ATT error code.
    pub fn error(&mut self, code: AttErrorCode) {
        self.error = Some(code);
        self.done = true;
    }
}

/// App callback for value-row access.
pub type Handler = Box<dyn Fn(&Request<'_>, &mut ResponseWriter) + Send + Sync>;

/// Outcome of processing one inbound server-role PDU.
pub(crate) struct ServerOutcome {
    /// Response PDU to send back, if the request demands one.
    pub response: Option<AttPdu>,
    /// Application event to publish.
    pub event: Option<HostEvent>,
    /// New effective MTU when an MTU exchange completed.
    pub mtu_changed: Option<u16>,
}

impl ServerOutcome {
    fn respond(pdu: AttPdu) -> Self {
        Self {
            response: Some(pdu),
            event: None,
            mtu_changed: None,
        }
    }

    fn silent() -> Self {
        Self {
            response: None,
            event: None,
            mtu_changed: None,
        }
    }

    fn error(request: u8, handle: u16, code: AttErrorCode) -> Self {
        Self::respond(AttPdu::ErrorRsp {
            request,
            handle,
            code,
        })
    }
}

/// The GATT server state.
pub struct GattServer {
    table: AttributeTable,
    handlers: DashMap<u16, Handler>,
    values: DashMap<u16, Vec<u8>>,
    /// Server receive MTU announced in the MTU exchange.
    preferred_mtu: u16,
}

impl GattServer {
    /// Server over a compile-time attribute table.
    #[must_use]
    pub fn new(table: AttributeTable) -> Self {
        Self {
            table,
            handlers: DashMap::new(),
            values: DashMap::new(),
            preferred_mtu: ATT_MTU_MAX,
        }
    }

    /// The attribute table.
    #[must_use]
    pub fn table(&self) -> &AttributeTable {
        &self.table
    }

    /// Register a handler for a characteristic value handle. Replaces the
    /// built-in value store for that handle.
    pub fn on_request<F>(&self, value_handle: u16, handler: F)
    where
        F: Fn(&Request<'_>, &mut ResponseWriter) + Send + Sync + 'static,
    {
        self.handlers.insert(value_handle, Box::new(handler));
    }

    /// Seed (or replace) the built-in store for a value handle.
    pub fn set_value(&self, value_handle: u16, value: &[u8]) {
        self.values.insert(value_handle, value.to_vec());
    }

    /// Read back the built-in store.
    #[must_use]
    pub fn value(&self, value_handle: u16) -> Option<Vec<u8>> {
        self.values.get(&value_handle).map(|v| v.value().clone())
    }

    fn dispatch(&self, request: &Request<'_>) -> Result<Vec<u8>, AttErrorCode> {
        if let Some(handler) = self.handlers.get(&request.handle) {
            let mut writer = ResponseWriter::new();
            (handler.value())(request, &mut writer);
            if !writer.done {
                log::debug!(
                    "[GATT] handler for handle {} finished without ok()/error()",
                    request.handle
                );
            }
            if let Some(code) = writer.error {
                return Err(code);
            }
            return Ok(writer.value);
        }
        // Built-in store fallback.
        match request.op {
            AttOp::Read => Ok(self.value(request.handle).unwrap_or_default()),
            AttOp::Write | AttOp::ExecuteWrite => {
                self.values.insert(request.handle, request.data.to_vec());
                Ok(Vec::new())
            }
            AttOp::PrepareWrite => Ok(Vec::new()),
        }
    }

    /// Process one inbound server-role PDU on `conn`.
    pub(crate) fn process(&self, conn: &mut Connection, pdu: &AttPdu) -> ServerOutcome {
        match pdu {
            AttPdu::MtuReq { mtu: client_mtu } => {
                let server_mtu = self.preferred_mtu;
                let effective = (*client_mtu).min(server_mtu).max(crate::config::ATT_MTU_DEFAULT);
                conn.mtu = effective;
                let mut outcome = ServerOutcome::respond(AttPdu::MtuRsp { mtu: server_mtu });
                outcome.mtu_changed = Some(effective);
                outcome.event = Some(HostEvent::MtuExchanged {
                    conn: conn.handle,
                    mtu: effective,
                });
                outcome
            }
            AttPdu::ReadReq { handle } => self.process_read(conn, *handle),
            AttPdu::WriteReq { handle, value } => self.process_write(conn, *handle, value, true),
            AttPdu::WriteCmd { handle, value } => self.process_write(conn, *handle, value, false),
            AttPdu::PrepareWriteReq {
                handle,
                offset,
                value,
            } => self.process_prepare(conn, *handle, *offset, value),
            AttPdu::ExecuteWriteReq { commit } => self.process_execute(conn, *commit),
            _ => ServerOutcome::silent(),
        }
    }

    fn process_read(&self, conn: &mut Connection, handle: u16) -> ServerOutcome {
        use crate::host::att::OP_READ_REQ;
        let Some(row) = self.table.find(handle) else {
            return ServerOutcome::error(OP_READ_REQ, handle, AttErrorCode::InvalidHandle);
        };
        let value = match row.kind {
            RowKind::ServiceDecl => {
                // Value is the service UUID.
                let mut v = Vec::with_capacity(16);
                row.att_type.encode_into(&mut v);
                v
            }
            RowKind::CharDecl {
                value_handle,
                props,
            } => {
                // [properties | value handle | characteristic UUID]
                let value_row = self
                    .table
                    .find(value_handle)
                    .expect("declaration always precedes its value row");
                let mut v = Vec::with_capacity(3 + value_row.att_type.wire_len());
                v.push(props.0);
                v.extend_from_slice(&value_handle.to_le_bytes());
                value_row.att_type.encode_into(&mut v);
                v
            }
            RowKind::Value { props } => {
                if !props.contains(CharProps::READ) {
                    return ServerOutcome::error(
                        OP_READ_REQ,
                        handle,
                        AttErrorCode::ReadNotPermitted,
                    );
                }
                let request = Request {
                    op: AttOp::Read,
                    conn: conn.handle,
                    handle,
                    offset: 0,
                    data: &[],
                };
                match self.dispatch(&request) {
                    Ok(value) => value,
                    Err(code) => return ServerOutcome::error(OP_READ_REQ, handle, code),
                }
            }
            RowKind::Cccd { value_handle } => conn.cccd_for(value_handle).0.to_le_bytes().to_vec(),
        };
        // Long values need Read Blob; truncate to what one PDU carries.
        let cap = usize::from(conn.mtu) - 1;
        let value = if value.len() > cap {
            value[..cap].to_vec()
        } else {
            value
        };
        ServerOutcome::respond(AttPdu::ReadRsp { value })
    }

    fn process_write(
        &self,
        conn: &mut Connection,
        handle: u16,
        value: &[u8],
        acknowledged: bool,
    ) -> ServerOutcome {
        use crate::host::att::{OP_WRITE_CMD, OP_WRITE_REQ};
        let request_op = if acknowledged {
            OP_WRITE_REQ
        } else {
            OP_WRITE_CMD
        };
        let fail = |code| {
            if acknowledged {
                ServerOutcome::error(request_op, handle, code)
            } else {
                // Write commands fail silently.
                ServerOutcome::silent()
            }
        };

        let Some(row) = self.table.find(handle) else {
            return fail(AttErrorCode::InvalidHandle);
        };
        match row.kind {
            RowKind::Cccd { value_handle } => {
                if value.len() != 2 {
                    return fail(AttErrorCode::InvalidAttributeValueLength);
                }
                let bits = u16::from_le_bytes([value[0], value[1]]);
                let state = CccdState(bits);
                conn.cccd.insert(value_handle, state);
                log::debug!(
                    "[GATT] conn 0x{:04x} CCCD for value handle {} -> notify={} indicate={}",
                    conn.handle,
                    value_handle,
                    state.notify(),
                    state.indicate()
                );
                let mut outcome = if acknowledged {
                    ServerOutcome::respond(AttPdu::WriteRsp)
                } else {
                    ServerOutcome::silent()
                };
                outcome.event = Some(HostEvent::NotificationsEnabled {
                    conn: conn.handle,
                    handle: value_handle,
                    notify: state.notify(),
                    indicate: state.indicate(),
                });
                outcome
            }
            RowKind::Value { props } => {
                let permitted = if acknowledged {
                    props.contains(CharProps::WRITE)
                } else {
                    props.contains(CharProps::WRITE_NO_RSP) || props.contains(CharProps::WRITE)
                };
                if !permitted {
                    return fail(AttErrorCode::WriteNotPermitted);
                }
                let request = Request {
                    op: AttOp::Write,
                    conn: conn.handle,
                    handle,
                    offset: 0,
                    data: value,
                };
                match self.dispatch(&request) {
                    Ok(_) => {
                        if acknowledged {
                            ServerOutcome::respond(AttPdu::WriteRsp)
                        } else {
                            ServerOutcome::silent()
                        }
                    }
                    Err(code) => fail(code),
                }
            }
            _ => fail(AttErrorCode::WriteNotPermitted),
        }
    }

    fn process_prepare(
        &self,
        conn: &mut Connection,
        handle: u16,
        offset: u16,
        value: &[u8],
    ) -> ServerOutcome {
        use crate::host::att::OP_PREPARE_WRITE_REQ;
        let Some(row) = self.table.find(handle) else {
            return ServerOutcome::error(OP_PREPARE_WRITE_REQ, handle, AttErrorCode::InvalidHandle);
        };
        let writable = matches!(row.kind, RowKind::Value { props } if props.contains(CharProps::WRITE));
        if !writable {
            return ServerOutcome::error(
                OP_PREPARE_WRITE_REQ,
                handle,
                AttErrorCode::WriteNotPermitted,
            );
        }
        conn.prepare_queue.push((handle, offset, value.to_vec()));
        ServerOutcome::respond(AttPdu::PrepareWriteRsp {
            handle,
            offset,
            value: value.to_vec(),
        })
    }

    fn process_execute(&self, conn: &mut Connection, commit: bool) -> ServerOutcome {
        let queued = std::mem::take(&mut conn.prepare_queue);
        if commit {
            // Apply per handle, parts in arrival order at their offsets.
            let mut touched: Vec<u16> = Vec::new();
            for (handle, _, _) in &queued {
                if !touched.contains(handle) {
                    touched.push(*handle);
                }
            }
            for handle in touched {
                let mut assembled = self.value(handle).unwrap_or_default();
                for (h, offset, part) in &queued {
                    if *h != handle {
                        continue;
                    }
                    let end = usize::from(*offset) + part.len();
                    if assembled.len() < end {
                        assembled.resize(end, 0);
                    }
                    assembled[usize::from(*offset)..end].copy_from_slice(part);
                }
                let request = Request {
                    op: AttOp::ExecuteWrite,
                    conn: conn.handle,
                    handle,
                    offset: 0,
                    data: &assembled,
                };
                if let Err(code) = self.dispatch(&request) {
                    use crate::host::att::OP_EXECUTE_WRITE_REQ;
                    return ServerOutcome::error(OP_EXECUTE_WRITE_REQ, handle, code);
                }
            }
        }
        ServerOutcome::respond(AttPdu::ExecuteWriteRsp)
    }
}
