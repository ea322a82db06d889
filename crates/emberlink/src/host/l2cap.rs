// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! L2CAP basic-mode framing (Bluetooth Core 5.4 Vol 3 Part A).
//!
//! Outbound PDUs are framed with the 4-byte basic header and fragmented
//! into ACL packets sized by the connection's negotiated data length;
//! inbound ACL fragments are reassembled per (connection, CID).

use crate::config::L2CAP_HEADER_LEN;
use crate::hci::packet::{AclPacket, PacketBoundary};

/// Fixed channel ID for the Attribute Protocol.
pub const CID_ATT: u16 = 0x0004;
/// Fixed channel ID for LE signaling.
pub const CID_LE_SIGNALING: u16 = 0x0005;
/// Fixed channel ID for the Security Manager Protocol.
pub const CID_SMP: u16 = 0x0006;

/// Frame `payload` for `cid` and split into ACL packets of at most
/// `acl_max_len` bytes each.
#[must_use]
pub fn fragment(handle: u16, cid: u16, payload: &[u8], acl_max_len: usize) -> Vec<AclPacket> {
    let mut frame = Vec::with_capacity(L2CAP_HEADER_LEN + payload.len());
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(&cid.to_le_bytes());
    frame.extend_from_slice(payload);

    let mut packets = Vec::new();
    let mut first = true;
    for chunk in frame.chunks(acl_max_len.max(1)) {
        packets.push(AclPacket {
            handle,
            boundary: if first {
                PacketBoundary::FirstNonFlushable
            } else {
                PacketBoundary::Continuation
            },
            broadcast: 0,
            data: chunk.to_vec(),
        });
        first = false;
    }
    packets
}

/// Per-connection reassembly of inbound ACL fragments into L2CAP PDUs.
#[derive(Default)]
pub struct Reassembler {
    buffer: Vec<u8>,
    expected: usize,
}

/// Reassembly outcome for one ACL packet.
#[derive(Debug, PartialEq, Eq)]
pub enum Reassembly {
    /// More fragments outstanding.
    Incomplete,
    /// A complete PDU: channel ID and payload.
    Complete {
        /// Destination channel.
        cid: u16,
        /// PDU payload.
        payload: Vec<u8>,
    },
    /// The fragment violated framing; the PDU in progress was dropped.
    Invalid(&'static str),
}

impl Reassembler {
    /// Create an empty reassembler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one inbound ACL packet.
    pub fn push(&mut self, acl: &AclPacket) -> Reassembly {
        if acl.boundary.is_first() {
            if !self.buffer.is_empty() {
                log::warn!("[L2CAP] first fragment while PDU in progress, dropping partial");
            }
            self.buffer.clear();
            if acl.data.len() < L2CAP_HEADER_LEN {
                // The basic header may not be split across fragments.
                return Reassembly::Invalid("short first fragment");
            }
            let pdu_len = u16::from_le_bytes([acl.data[0], acl.data[1]]) as usize;
            self.expected = L2CAP_HEADER_LEN + pdu_len;
            self.buffer.extend_from_slice(&acl.data);
        } else {
            if self.buffer.is_empty() {
                return Reassembly::Invalid("continuation without first fragment");
            }
            self.buffer.extend_from_slice(&acl.data);
        }

        if self.buffer.len() < self.expected {
            return Reassembly::Incomplete;
        }
        if self.buffer.len() > self.expected {
            self.buffer.clear();
            return Reassembly::Invalid("fragment overrun");
        }
        let cid = u16::from_le_bytes([self.buffer[2], self.buffer[3]]);
        let payload = self.buffer.split_off(L2CAP_HEADER_LEN);
        self.buffer.clear();
        Reassembly::Complete { cid, payload }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_fragment_roundtrip() {
        let packets = fragment(0x0040, CID_ATT, &[1, 2, 3], 27);
        assert_eq!(packets.len(), 1);
        let mut reasm = Reassembler::new();
        match reasm.push(&packets[0]) {
            Reassembly::Complete { cid, payload } => {
                assert_eq!(cid, CID_ATT);
                assert_eq!(payload, vec![1, 2, 3]);
            }
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn multi_fragment_roundtrip() {
        let payload: Vec<u8> = (0..200).collect();
        let packets = fragment(0x0040, CID_ATT, &payload, 27);
        assert!(packets.len() > 1);
        assert!(packets[0].boundary.is_first());
        assert!(packets[1..]
            .iter()
            .all(|p| p.boundary == PacketBoundary::Continuation));

        let mut reasm = Reassembler::new();
        let mut done = None;
        for packet in &packets {
            match reasm.push(packet) {
                Reassembly::Incomplete => {}
                Reassembly::Complete { cid, payload } => done = Some((cid, payload)),
                Reassembly::Invalid(why) => panic!("invalid: {}", why),
            }
        }
        let (cid, out) = done.expect("reassembly completed");
        assert_eq!(cid, CID_ATT);
        assert_eq!(out, payload);
    }

    #[test]
    fn fragments_respect_max_len() {
        let payload = vec![0u8; 500];
        for packet in fragment(0x0040, CID_ATT, &payload, 251) {
            assert!(packet.data.len() <= 251);
        }
    }

    #[test]
    fn continuation_without_first_is_invalid() {
        let mut reasm = Reassembler::new();
        let orphan = AclPacket {
            handle: 0x0040,
            boundary: PacketBoundary::Continuation,
            broadcast: 0,
            data: vec![1, 2, 3],
        };
        assert!(matches!(reasm.push(&orphan), Reassembly::Invalid(_)));
    }

    #[test]
    fn new_first_fragment_resets_partial_pdu() {
        let payload: Vec<u8> = (0..60).collect();
        let packets = fragment(0x0040, CID_ATT, &payload, 27);
        let mut reasm = Reassembler::new();
        assert_eq!(reasm.push(&packets[0]), Reassembly::Incomplete);
        // Abandon that PDU; a fresh small one must still parse.
        let fresh = fragment(0x0040, CID_ATT, &[9, 9], 27);
        match reasm.push(&fresh[0]) {
            Reassembly::Complete { payload, .. } => assert_eq!(payload, vec![9, 9]),
            other => panic!("{:?}", other),
        }
    }
}
