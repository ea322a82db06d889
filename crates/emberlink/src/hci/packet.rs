// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! H4 HCI packet codec (Bluetooth Core 5.4 Vol 4 Part A).
//!
//! The first byte of every packet is the type indicator; commands carry a
//! 16-bit opcode (OGF:6 | OCF:10), ACL data a 12-bit connection handle with
//! packet-boundary and broadcast flags, events a code byte. All multi-byte
//! fields are little-endian.

use std::fmt;

/// Packet type indicators.
pub const IND_COMMAND: u8 = 0x01;
/// ACL data indicator.
pub const IND_ACL_DATA: u8 = 0x02;
/// Synchronous (SCO) data indicator; never used on LE links.
pub const IND_SYNC_DATA: u8 = 0x03;
/// Event indicator.
pub const IND_EVENT: u8 = 0x04;

/// Command Complete event code.
pub const EVT_COMMAND_COMPLETE: u8 = 0x0e;
/// Command Status event code.
pub const EVT_COMMAND_STATUS: u8 = 0x0f;
/// Disconnection Complete event code.
pub const EVT_DISCONNECTION_COMPLETE: u8 = 0x05;
/// Number Of Completed Packets event code.
pub const EVT_NUM_COMPLETED_PACKETS: u8 = 0x13;
/// LE Meta event code; the subevent byte selects the LE event.
pub const EVT_LE_META: u8 = 0x3e;

/// LE Connection Complete subevent.
pub const LE_SUB_CONNECTION_COMPLETE: u8 = 0x01;
/// LE Advertising Report subevent.
pub const LE_SUB_ADVERTISING_REPORT: u8 = 0x02;
/// LE Data Length Change subevent.
pub const LE_SUB_DATA_LENGTH_CHANGE: u8 = 0x07;
/// LE PHY Update Complete subevent.
pub const LE_SUB_PHY_UPDATE_COMPLETE: u8 = 0x0c;

/// HCI command opcode: OGF in the upper 6 bits, OCF in the lower 10.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Opcode(pub u16);

impl Opcode {
    /// Disconnect (Link Control).
    pub const DISCONNECT: Self = Self::new(0x01, 0x0006);
    /// Set Event Mask (Controller & Baseband).
    pub const SET_EVENT_MASK: Self = Self::new(0x03, 0x0001);
    /// Reset (Controller & Baseband).
    pub const RESET: Self = Self::new(0x03, 0x0003);
    /// LE Set Event Mask.
    pub const LE_SET_EVENT_MASK: Self = Self::new(0x08, 0x0001);
    /// LE Read Buffer Size.
    pub const LE_READ_BUFFER_SIZE: Self = Self::new(0x08, 0x0002);
    /// LE Set Advertising Parameters.
    pub const LE_SET_ADV_PARAMS: Self = Self::new(0x08, 0x0006);
    /// LE Set Advertising Data.
    pub const LE_SET_ADV_DATA: Self = Self::new(0x08, 0x0008);
    /// LE Set Advertise Enable.
    pub const LE_SET_ADV_ENABLE: Self = Self::new(0x08, 0x000a);
    /// LE Set Scan Parameters.
    pub const LE_SET_SCAN_PARAMS: Self = Self::new(0x08, 0x000b);
    /// LE Set Scan Enable.
    pub const LE_SET_SCAN_ENABLE: Self = Self::new(0x08, 0x000c);
    /// LE Create Connection.
    pub const LE_CREATE_CONNECTION: Self = Self::new(0x08, 0x000d);
    /// LE Create Connection Cancel.
    pub const LE_CREATE_CONNECTION_CANCEL: Self = Self::new(0x08, 0x000e);
    /// LE Connection Update.
    pub const LE_CONNECTION_UPDATE: Self = Self::new(0x08, 0x0013);
    /// LE Set Data Length.
    pub const LE_SET_DATA_LENGTH: Self = Self::new(0x08, 0x0022);
    /// LE Set PHY.
    pub const LE_SET_PHY: Self = Self::new(0x08, 0x0032);

    /// Build an opcode from OGF and OCF.
    #[must_use]
    pub const fn new(ogf: u8, ocf: u16) -> Self {
        Self(((ogf as u16) << 10) | (ocf & 0x03ff))
    }

    /// Opcode Group Field.
    #[must_use]
    pub const fn ogf(self) -> u8 {
        (self.0 >> 10) as u8
    }

    /// Opcode Command Field.
    #[must_use]
    pub const fn ocf(self) -> u16 {
        self.0 & 0x03ff
    }
}

impl fmt::Debug for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opcode(0x{:04x})", self.0)
    }
}

/// ACL packet-boundary flag (2 bits).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PacketBoundary {
    /// First fragment of a non-flushable PDU (host to controller).
    FirstNonFlushable,
    /// Continuation fragment.
    Continuation,
    /// First fragment of a flushable PDU (controller to host on LE).
    FirstFlushable,
    /// Complete PDU (legacy).
    Complete,
}

impl PacketBoundary {
    const fn bits(self) -> u16 {
        match self {
            Self::FirstNonFlushable => 0b00,
            Self::Continuation => 0b01,
            Self::FirstFlushable => 0b10,
            Self::Complete => 0b11,
        }
    }

    const fn from_bits(bits: u16) -> Self {
        match bits & 0b11 {
            0b00 => Self::FirstNonFlushable,
            0b01 => Self::Continuation,
            0b10 => Self::FirstFlushable,
            _ => Self::Complete,
        }
    }

    /// True for either first-fragment variant.
    #[must_use]
    pub const fn is_first(self) -> bool {
        matches!(self, Self::FirstNonFlushable | Self::FirstFlushable)
    }
}

/// An HCI command packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HciCommand {
    /// Command opcode.
    pub opcode: Opcode,
    /// Command parameters, laid out per the Core spec.
    pub params: Vec<u8>,
}

/// An ACL data packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AclPacket {
    /// 12-bit connection handle.
    pub handle: u16,
    /// Packet-boundary flag.
    pub boundary: PacketBoundary,
    /// Broadcast flag (2 bits); always 0 on LE.
    pub broadcast: u8,
    /// ACL payload (L2CAP fragment).
    pub data: Vec<u8>,
}

/// An HCI event packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HciEvent {
    /// Event code.
    pub code: u8,
    /// Event parameters.
    pub params: Vec<u8>,
}

impl HciEvent {
    /// For LE Meta events, the subevent code.
    #[must_use]
    pub fn le_subevent(&self) -> Option<u8> {
        if self.code == EVT_LE_META {
            self.params.first().copied()
        } else {
            None
        }
    }
}

/// A decoded HCI packet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HciPacket {
    /// Command (host to controller).
    Command(HciCommand),
    /// ACL data (either direction).
    Acl(AclPacket),
    /// Event (controller to host).
    Event(HciEvent),
}

/// Packet codec failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// Fewer bytes than the header demands.
    Truncated,
    /// Unknown packet-type indicator byte.
    UnknownIndicator(u8),
    /// Header length field disagrees with the byte count.
    LengthMismatch,
    /// Payload exceeds the 8-bit / 16-bit length field.
    Oversized,
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => write!(f, "truncated HCI packet"),
            Self::UnknownIndicator(b) => write!(f, "unknown HCI packet indicator 0x{:02x}", b),
            Self::LengthMismatch => write!(f, "HCI length field mismatch"),
            Self::Oversized => write!(f, "HCI payload exceeds length field"),
        }
    }
}

impl std::error::Error for PacketError {}

impl HciPacket {
    /// Encode into H4 wire bytes (indicator byte first).
    ///
    /// # Errors
    ///
    /// [`PacketError::Oversized`] when a payload exceeds its length field.
    pub fn encode(&self) -> Result<Vec<u8>, PacketError> {
        match self {
            Self::Command(cmd) => {
                if cmd.params.len() > u8::MAX as usize {
                    return Err(PacketError::Oversized);
                }
                let mut out = Vec::with_capacity(4 + cmd.params.len());
                out.push(IND_COMMAND);
                out.extend_from_slice(&cmd.opcode.0.to_le_bytes());
                out.push(cmd.params.len() as u8);
                out.extend_from_slice(&cmd.params);
                Ok(out)
            }
            Self::Acl(acl) => {
                if acl.data.len() > u16::MAX as usize || acl.handle > 0x0fff {
                    return Err(PacketError::Oversized);
                }
                let word =
                    acl.handle | (acl.boundary.bits() << 12) | (u16::from(acl.broadcast & 0b11) << 14);
                let mut out = Vec::with_capacity(5 + acl.data.len());
                out.push(IND_ACL_DATA);
                out.extend_from_slice(&word.to_le_bytes());
                out.extend_from_slice(&(acl.data.len() as u16).to_le_bytes());
                out.extend_from_slice(&acl.data);
                Ok(out)
            }
            Self::Event(evt) => {
                if evt.params.len() > u8::MAX as usize {
                    return Err(PacketError::Oversized);
                }
                let mut out = Vec::with_capacity(3 + evt.params.len());
                out.push(IND_EVENT);
                out.push(evt.code);
                out.push(evt.params.len() as u8);
                out.extend_from_slice(&evt.params);
                Ok(out)
            }
        }
    }

    /// Decode one whole H4 packet.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        let (&indicator, rest) = bytes.split_first().ok_or(PacketError::Truncated)?;
        match indicator {
            IND_COMMAND => {
                if rest.len() < 3 {
                    return Err(PacketError::Truncated);
                }
                let opcode = Opcode(u16::from_le_bytes([rest[0], rest[1]]));
                let plen = rest[2] as usize;
                let params = &rest[3..];
                if params.len() != plen {
                    return Err(PacketError::LengthMismatch);
                }
                Ok(Self::Command(HciCommand {
                    opcode,
                    params: params.to_vec(),
                }))
            }
            IND_ACL_DATA => {
                if rest.len() < 4 {
                    return Err(PacketError::Truncated);
                }
                let word = u16::from_le_bytes([rest[0], rest[1]]);
                let dlen = u16::from_le_bytes([rest[2], rest[3]]) as usize;
                let data = &rest[4..];
                if data.len() != dlen {
                    return Err(PacketError::LengthMismatch);
                }
                Ok(Self::Acl(AclPacket {
                    handle: word & 0x0fff,
                    boundary: PacketBoundary::from_bits(word >> 12),
                    broadcast: ((word >> 14) & 0b11) as u8,
                    data: data.to_vec(),
                }))
            }
            IND_EVENT => {
                if rest.len() < 2 {
                    return Err(PacketError::Truncated);
                }
                let code = rest[0];
                let plen = rest[1] as usize;
                let params = &rest[2..];
                if params.len() != plen {
                    return Err(PacketError::LengthMismatch);
                }
                Ok(Self::Event(HciEvent {
                    code,
                    params: params.to_vec(),
                }))
            }
            IND_SYNC_DATA => Err(PacketError::UnknownIndicator(IND_SYNC_DATA)),
            other => Err(PacketError::UnknownIndicator(other)),
        }
    }
}

/// Build a Command Complete event for `opcode` with `return_params`.
#[must_use]
pub fn command_complete(opcode: Opcode, return_params: &[u8]) -> HciEvent {
    let mut params = Vec::with_capacity(3 + return_params.len());
    params.push(1); // num HCI command packets the host may send
    params.extend_from_slice(&opcode.0.to_le_bytes());
    params.extend_from_slice(return_params);
    HciEvent {
        code: EVT_COMMAND_COMPLETE,
        params,
    }
}

/// Build a Command Status event for `opcode`.
#[must_use]
pub fn command_status(opcode: Opcode, status: u8) -> HciEvent {
    let mut params = Vec::with_capacity(4);
    params.push(status);
    params.push(1);
    params.extend_from_slice(&opcode.0.to_le_bytes());
    HciEvent {
        code: EVT_COMMAND_STATUS,
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_ogf_ocf_split() {
        let op = Opcode::LE_CREATE_CONNECTION;
        assert_eq!(op.ogf(), 0x08);
        assert_eq!(op.ocf(), 0x000d);
        assert_eq!(op.0, 0x200d);
    }

    #[test]
    fn command_roundtrip() {
        let cmd = HciPacket::Command(HciCommand {
            opcode: Opcode::LE_SET_SCAN_ENABLE,
            params: vec![0x01, 0x00],
        });
        let wire = cmd.encode().unwrap();
        assert_eq!(wire[0], IND_COMMAND);
        assert_eq!(HciPacket::decode(&wire).unwrap(), cmd);
    }

    #[test]
    fn acl_roundtrip_with_flags() {
        let acl = HciPacket::Acl(AclPacket {
            handle: 0x0040,
            boundary: PacketBoundary::Continuation,
            broadcast: 0,
            data: vec![1, 2, 3, 4, 5],
        });
        let wire = acl.encode().unwrap();
        assert_eq!(HciPacket::decode(&wire).unwrap(), acl);
    }

    #[test]
    fn event_roundtrip_and_subevent() {
        let evt = HciPacket::Event(HciEvent {
            code: EVT_LE_META,
            params: vec![LE_SUB_PHY_UPDATE_COMPLETE, 0x00, 0x40, 0x00, 0x02, 0x02],
        });
        let wire = evt.encode().unwrap();
        match HciPacket::decode(&wire).unwrap() {
            HciPacket::Event(e) => {
                assert_eq!(e.le_subevent(), Some(LE_SUB_PHY_UPDATE_COMPLETE));
            }
            other => panic!("decoded {:?}", other),
        }
    }

    #[test]
    fn length_mismatch_is_rejected() {
        let mut wire = HciPacket::Command(HciCommand {
            opcode: Opcode::RESET,
            params: vec![],
        })
        .encode()
        .unwrap();
        wire.push(0xff); // trailing garbage
        assert_eq!(HciPacket::decode(&wire), Err(PacketError::LengthMismatch));
    }

    #[test]
    fn unknown_indicator_is_rejected() {
        assert_eq!(
            HciPacket::decode(&[0x09, 0x00]),
            Err(PacketError::UnknownIndicator(0x09))
        );
    }

    #[test]
    fn command_complete_layout() {
        let evt = command_complete(Opcode::LE_READ_BUFFER_SIZE, &[0x00, 0xfb, 0x00, 0x08]);
        assert_eq!(evt.code, EVT_COMMAND_COMPLETE);
        assert_eq!(evt.params[0], 1);
        assert_eq!(u16::from_le_bytes([evt.params[1], evt.params[2]]), 0x2002);
        assert_eq!(evt.params[3], 0x00);
    }
}
