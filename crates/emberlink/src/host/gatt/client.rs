// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! GATT client request correlation.
//!
//! ATT allows one outstanding request per connection. Each caller parks on
//! a reply channel; the pump matches inbound PDUs against the active slot
//! by opcode (+ handle where the response carries one) and wakes exactly
//! one caller. Additional requests queue behind the slot.

use crate::host::att::AttPdu;
use crate::host::error::{HostError, Result};
use crossbeam::channel::Sender;
use std::collections::VecDeque;
use std::time::Instant;

/// A request the pump has not yet put on the air.
pub(crate) struct OutboundRequest {
    /// The request PDU.
    pub pdu: AttPdu,
    /// Where the caller waits.
    pub reply: Sender<Result<AttPdu>>,
}

/// The in-flight request occupying the connection's slot.
pub(crate) struct ActiveRequest {
    /// Opcode of the request (Error Response correlation).
    pub request_opcode: u8,
    /// Expected response opcode.
    pub expected_rsp: u8,
    /// Handle the request addressed (0 when the request carries none).
    pub handle: u16,
    /// Where the caller waits.
    pub reply: Sender<Result<AttPdu>>,
    /// Expiry for the round trip.
    pub deadline: Instant,
}

/// Per-connection client-role state: one slot plus an overflow queue.
#[derive(Default)]
pub(crate) struct RequestSlot {
    pub active: Option<ActiveRequest>,
    pub queue: VecDeque<OutboundRequest>,
}

impl RequestSlot {
    /// Whether an inbound PDU answers the active request.
    pub fn matches(&self, pdu: &AttPdu) -> bool {
        let Some(active) = &self.active else {
            return false;
        };
        match pdu {
            AttPdu::ErrorRsp {
                request, handle, ..
            } => {
                *request == active.request_opcode
                    && (active.handle == 0 || *handle == active.handle)
            }
            other => other.opcode() == active.expected_rsp,
        }
    }

    /// Complete the active request with `pdu`, waking the caller.
    pub fn complete(&mut self, pdu: AttPdu) {
        if let Some(active) = self.active.take() {
            let result = match pdu {
                AttPdu::ErrorRsp { code, .. } => Err(HostError::Att(code)),
                other => Ok(other),
            };
            // A dropped receiver means the caller gave up (timeout); the
            // slot is simply freed.
            let _ = active.reply.send(result);
        }
    }

    /// Expire the active request if its deadline passed.
    pub fn expire(&mut self, now: Instant) {
        if let Some(active) = &self.active {
            if now >= active.deadline {
                let active = self.active.take().expect("checked above");
                let _ = active.reply.send(Err(HostError::Timeout));
            }
        }
    }

    /// Fail everything (disconnect, host shutdown).
    pub fn fail_all(&mut self, mk_err: impl Fn() -> HostError) {
        if let Some(active) = self.active.take() {
            let _ = active.reply.send(Err(mk_err()));
        }
        while let Some(queued) = self.queue.pop_front() {
            let _ = queued.reply.send(Err(mk_err()));
        }
    }
}

/// Extract the handle a request PDU addresses, for correlation.
#[must_use]
pub(crate) fn request_handle(pdu: &AttPdu) -> u16 {
    match pdu {
        AttPdu::ReadReq { handle }
        | AttPdu::WriteReq { handle, .. }
        | AttPdu::PrepareWriteReq { handle, .. } => *handle,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::att::{AttErrorCode, OP_READ_REQ, OP_READ_RSP};
    use std::time::Duration;

    fn active(reply: Sender<Result<AttPdu>>) -> ActiveRequest {
        ActiveRequest {
            request_opcode: OP_READ_REQ,
            expected_rsp: OP_READ_RSP,
            handle: 3,
            reply,
            deadline: Instant::now() + Duration::from_secs(5),
        }
    }

    #[test]
    fn response_matches_and_wakes_caller() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let mut slot = RequestSlot::default();
        slot.active = Some(active(tx));

        let rsp = AttPdu::ReadRsp {
            value: vec![1, 2, 3],
        };
        assert!(slot.matches(&rsp));
        slot.complete(rsp);
        assert!(slot.active.is_none());
        assert!(matches!(rx.try_recv(), Ok(Ok(AttPdu::ReadRsp { .. }))));
    }

    #[test]
    fn error_response_correlates_by_request_opcode() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let mut slot = RequestSlot::default();
        slot.active = Some(active(tx));

        let rsp = AttPdu::ErrorRsp {
            request: OP_READ_REQ,
            handle: 3,
            code: AttErrorCode::ReadNotPermitted,
        };
        assert!(slot.matches(&rsp));
        slot.complete(rsp);
        assert!(matches!(
            rx.try_recv(),
            Ok(Err(HostError::Att(AttErrorCode::ReadNotPermitted)))
        ));
    }

    #[test]
    fn unrelated_pdu_does_not_match() {
        let (tx, _rx) = crossbeam::channel::bounded(1);
        let mut slot = RequestSlot::default();
        slot.active = Some(active(tx));
        assert!(!slot.matches(&AttPdu::WriteRsp));
        assert!(!slot.matches(&AttPdu::Notify {
            handle: 3,
            value: vec![],
        }));
    }

    #[test]
    fn expiry_fails_with_timeout() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let mut slot = RequestSlot::default();
        let mut req = active(tx);
        req.deadline = Instant::now() - Duration::from_millis(1);
        slot.active = Some(req);
        slot.expire(Instant::now());
        assert!(matches!(rx.try_recv(), Ok(Err(HostError::Timeout))));
        assert!(slot.active.is_none());
    }

    #[test]
    fn fail_all_drains_queue() {
        let (tx1, rx1) = crossbeam::channel::bounded(1);
        let (tx2, rx2) = crossbeam::channel::bounded(1);
        let mut slot = RequestSlot::default();
        slot.active = Some(active(tx1));
        slot.queue.push_back(OutboundRequest {
            pdu: AttPdu::ReadReq { handle: 5 },
            reply: tx2,
        });
        slot.fail_all(|| HostError::NotConnected);
        assert!(matches!(rx1.try_recv(), Ok(Err(HostError::NotConnected))));
        assert!(matches!(rx2.try_recv(), Ok(Err(HostError::NotConnected))));
    }
}
