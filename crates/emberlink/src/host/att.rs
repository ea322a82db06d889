// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! ATT PDU codec (Bluetooth Core 5.4 Vol 3 Part F).
//!
//! Only the PDUs the host actually exchanges are modelled; discovery-by-type
//! requests are absent because attribute handles are compile-time stable on
//! both ends of an Emberlink link.

use std::fmt;

/// Error Response opcode.
pub const OP_ERROR_RSP: u8 = 0x01;
/// Exchange MTU Request opcode.
pub const OP_MTU_REQ: u8 = 0x02;
/// Exchange MTU Response opcode.
pub const OP_MTU_RSP: u8 = 0x03;
/// Read Request opcode.
pub const OP_READ_REQ: u8 = 0x0a;
/// Read Response opcode.
pub const OP_READ_RSP: u8 = 0x0b;
/// Write Request opcode.
pub const OP_WRITE_REQ: u8 = 0x12;
/// Write Response opcode.
pub const OP_WRITE_RSP: u8 = 0x13;
/// Prepare Write Request opcode.
pub const OP_PREPARE_WRITE_REQ: u8 = 0x16;
/// Prepare Write Response opcode.
pub const OP_PREPARE_WRITE_RSP: u8 = 0x17;
/// Execute Write Request opcode.
pub const OP_EXECUTE_WRITE_REQ: u8 = 0x18;
/// Execute Write Response opcode.
pub const OP_EXECUTE_WRITE_RSP: u8 = 0x19;
/// Handle Value Notification opcode.
pub const OP_NOTIFY: u8 = 0x1b;
/// Handle Value Indication opcode.
pub const OP_INDICATE: u8 = 0x1d;
/// Handle Value Confirmation opcode.
pub const OP_CONFIRM: u8 = 0x1e;
/// Write Command opcode.
pub const OP_WRITE_CMD: u8 = 0x52;

/// ATT Error Response codes (Core 5.4 Vol 3 Part F Sec.3.4.1.1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttErrorCode {
    /// 0x01: handle outside the attribute table.
    InvalidHandle,
    /// 0x02: attribute cannot be read.
    ReadNotPermitted,
    /// 0x03: attribute cannot be written.
    WriteNotPermitted,
    /// 0x04: malformed PDU.
    InvalidPdu,
    /// 0x06: the server does not support this request.
    RequestNotSupported,
    /// 0x07: offset past the end of the value.
    InvalidOffset,
    /// 0x0d: value length does not fit the attribute.
    InvalidAttributeValueLength,
    /// 0x0e: unlikely error (catch-all server failure).
    UnlikelyError,
    /// 0x11: server out of resources.
    InsufficientResources,
    /// 0xfd: CCCD improperly configured for the operation.
    CccdImproperlyConfigured,
    /// Any other code from the reserved/profile ranges.
    Other(u8),
}

impl AttErrorCode {
    /// Wire value.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::InvalidHandle => 0x01,
            Self::ReadNotPermitted => 0x02,
            Self::WriteNotPermitted => 0x03,
            Self::InvalidPdu => 0x04,
            Self::RequestNotSupported => 0x06,
            Self::InvalidOffset => 0x07,
            Self::InvalidAttributeValueLength => 0x0d,
            Self::UnlikelyError => 0x0e,
            Self::InsufficientResources => 0x11,
            Self::CccdImproperlyConfigured => 0xfd,
            Self::Other(code) => code,
        }
    }

    /// Decode a wire value.
    #[must_use]
    pub const fn from_code(code: u8) -> Self {
        match code {
            0x01 => Self::InvalidHandle,
            0x02 => Self::ReadNotPermitted,
            0x03 => Self::WriteNotPermitted,
            0x04 => Self::InvalidPdu,
            0x06 => Self::RequestNotSupported,
            0x07 => Self::InvalidOffset,
            0x0d => Self::InvalidAttributeValueLength,
            0x0e => Self::UnlikelyError,
            0x11 => Self::InsufficientResources,
            0xfd => Self::CccdImproperlyConfigured,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for AttErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.code())
    }
}

/// A decoded ATT PDU.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttPdu {
    /// Error Response: the request opcode it answers, the handle, the code.
    ErrorRsp {
        /// Opcode of the failed request.
        request: u8,
        /// Attribute handle in error.
        handle: u16,
        /// Error code.
        code: AttErrorCode,
    },
    /// Exchange MTU Request (client Rx MTU).
    MtuReq {
        /// Client receive MTU.
        mtu: u16,
    },
    /// Exchange MTU Response (server Rx MTU).
    MtuRsp {
        /// Server receive MTU.
        mtu: u16,
    },
    /// Read Request.
    ReadReq {
        /// Attribute handle.
        handle: u16,
    },
    /// Read Response.
    ReadRsp {
        /// Attribute value.
        value: Vec<u8>,
    },
    /// Write Request (acknowledged).
    WriteReq {
        /// Attribute handle.
        handle: u16,
        /// Value to write.
        value: Vec<u8>,
    },
    /// Write Response.
    WriteRsp,
    /// Write Command (unacknowledged).
    WriteCmd {
        /// Attribute handle.
        handle: u16,
        /// Value to write.
        value: Vec<u8>,
    },
    /// Prepare Write Request.
    PrepareWriteReq {
        /// Attribute handle.
        handle: u16,
        /// Value offset.
        offset: u16,
        /// Part value.
        value: Vec<u8>,
    },
    /// Prepare Write Response (echo of the request).
    PrepareWriteRsp {
        /// Attribute handle.
        handle: u16,
        /// Value offset.
        offset: u16,
        /// Part value.
        value: Vec<u8>,
    },
    /// Execute Write Request.
    ExecuteWriteReq {
        /// True commits the queued writes, false cancels them.
        commit: bool,
    },
    /// Execute Write Response.
    ExecuteWriteRsp,
    /// Handle Value Notification.
    Notify {
        /// Characteristic value handle.
        handle: u16,
        /// Notified value.
        value: Vec<u8>,
    },
    /// Handle Value Indication.
    Indicate {
        /// Characteristic value handle.
        handle: u16,
        /// Indicated value.
        value: Vec<u8>,
    },
    /// Handle Value Confirmation.
    Confirm,
}

impl AttPdu {
    /// The PDU's opcode byte.
    #[must_use]
    pub fn opcode(&self) -> u8 {
        match self {
            Self::ErrorRsp { .. } => OP_ERROR_RSP,
            Self::MtuReq { .. } => OP_MTU_REQ,
            Self::MtuRsp { .. } => OP_MTU_RSP,
            Self::ReadReq { .. } => OP_READ_REQ,
            Self::ReadRsp { .. } => OP_READ_RSP,
            Self::WriteReq { .. } => OP_WRITE_REQ,
            Self::WriteRsp => OP_WRITE_RSP,
            Self::WriteCmd { .. } => OP_WRITE_CMD,
            Self::PrepareWriteReq { .. } => OP_PREPARE_WRITE_REQ,
            Self::PrepareWriteRsp { .. } => OP_PREPARE_WRITE_RSP,
            Self::ExecuteWriteReq { .. } => OP_EXECUTE_WRITE_REQ,
            Self::ExecuteWriteRsp => OP_EXECUTE_WRITE_RSP,
            Self::Notify { .. } => OP_NOTIFY,
            Self::Indicate { .. } => OP_INDICATE,
            Self::Confirm => OP_CONFIRM,
        }
    }

    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.opcode()];
        match self {
            Self::ErrorRsp {
                request,
                handle,
                code,
            } => {
                out.push(*request);
                out.extend_from_slice(&handle.to_le_bytes());
                out.push(code.code());
            }
            Self::MtuReq { mtu } | Self::MtuRsp { mtu } => {
                out.extend_from_slice(&mtu.to_le_bytes());
            }
            Self::ReadReq { handle } => {
                out.extend_from_slice(&handle.to_le_bytes());
            }
            Self::ReadRsp { value } => {
                out.extend_from_slice(value);
            }
            Self::WriteReq { handle, value }
            | Self::WriteCmd { handle, value }
            | Self::Notify { handle, value }
            | Self::Indicate { handle, value } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(value);
            }
            Self::PrepareWriteReq {
                handle,
                offset,
                value,
            }
            | Self::PrepareWriteRsp {
                handle,
                offset,
                value,
            } => {
                out.extend_from_slice(&handle.to_le_bytes());
                out.extend_from_slice(&offset.to_le_bytes());
                out.extend_from_slice(value);
            }
            Self::ExecuteWriteReq { commit } => {
                out.push(u8::from(*commit));
            }
            Self::WriteRsp | Self::ExecuteWriteRsp | Self::Confirm => {}
        }
        out
    }

    /// Decode wire bytes.
    ///
    /// Returns `None` for truncated PDUs or opcodes outside the supported
    /// set; the caller answers with `RequestNotSupported` or drops.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let (&opcode, rest) = bytes.split_first()?;
        let u16_at = |i: usize| -> Option<u16> {
            Some(u16::from_le_bytes([*rest.get(i)?, *rest.get(i + 1)?]))
        };
        match opcode {
            OP_ERROR_RSP => Some(Self::ErrorRsp {
                request: *rest.first()?,
                handle: u16_at(1)?,
                code: AttErrorCode::from_code(*rest.get(3)?),
            }),
            OP_MTU_REQ => Some(Self::MtuReq { mtu: u16_at(0)? }),
            OP_MTU_RSP => Some(Self::MtuRsp { mtu: u16_at(0)? }),
            OP_READ_REQ => Some(Self::ReadReq { handle: u16_at(0)? }),
            OP_READ_RSP => Some(Self::ReadRsp {
                value: rest.to_vec(),
            }),
            OP_WRITE_REQ => Some(Self::WriteReq {
                handle: u16_at(0)?,
                value: rest.get(2..)?.to_vec(),
            }),
            OP_WRITE_RSP => Some(Self::WriteRsp),
            OP_WRITE_CMD => Some(Self::WriteCmd {
                handle: u16_at(0)?,
                value: rest.get(2..)?.to_vec(),
            }),
            OP_PREPARE_WRITE_REQ => Some(Self::PrepareWriteReq {
                handle: u16_at(0)?,
                offset: u16_at(2)?,
                value: rest.get(4..)?.to_vec(),
            }),
            OP_PREPARE_WRITE_RSP => Some(Self::PrepareWriteRsp {
                handle: u16_at(0)?,
                offset: u16_at(2)?,
                value: rest.get(4..)?.to_vec(),
            }),
            OP_EXECUTE_WRITE_REQ => Some(Self::ExecuteWriteReq {
                commit: *rest.first()? == 1,
            }),
            OP_EXECUTE_WRITE_RSP => Some(Self::ExecuteWriteRsp),
            OP_NOTIFY => Some(Self::Notify {
                handle: u16_at(0)?,
                value: rest.get(2..)?.to_vec(),
            }),
            OP_INDICATE => Some(Self::Indicate {
                handle: u16_at(0)?,
                value: rest.get(2..)?.to_vec(),
            }),
            OP_CONFIRM => Some(Self::Confirm),
            _ => None,
        }
    }

    /// The response opcode expected for a request opcode, if any.
    #[must_use]
    pub fn expected_response(request_opcode: u8) -> Option<u8> {
        match request_opcode {
            OP_MTU_REQ => Some(OP_MTU_RSP),
            OP_READ_REQ => Some(OP_READ_RSP),
            OP_WRITE_REQ => Some(OP_WRITE_RSP),
            OP_PREPARE_WRITE_REQ => Some(OP_PREPARE_WRITE_RSP),
            OP_EXECUTE_WRITE_REQ => Some(OP_EXECUTE_WRITE_RSP),
            OP_INDICATE => Some(OP_CONFIRM),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_req_roundtrip() {
        let pdu = AttPdu::WriteReq {
            handle: 0x0005,
            value: vec![0x42, 0x43],
        };
        let wire = pdu.encode();
        assert_eq!(wire, vec![0x12, 0x05, 0x00, 0x42, 0x43]);
        assert_eq!(AttPdu::decode(&wire), Some(pdu));
    }

    #[test]
    fn error_rsp_roundtrip() {
        let pdu = AttPdu::ErrorRsp {
            request: OP_READ_REQ,
            handle: 0x0042,
            code: AttErrorCode::ReadNotPermitted,
        };
        let wire = pdu.encode();
        assert_eq!(AttPdu::decode(&wire), Some(pdu));
    }

    #[test]
    fn truncated_pdus_are_rejected() {
        assert_eq!(AttPdu::decode(&[]), None);
        assert_eq!(AttPdu::decode(&[OP_READ_REQ, 0x01]), None);
        assert_eq!(AttPdu::decode(&[OP_WRITE_REQ, 0x01]), None);
    }

    #[test]
    fn unknown_opcode_is_rejected() {
        assert_eq!(AttPdu::decode(&[0x7f, 0x00]), None);
    }

    #[test]
    fn response_correlation_table() {
        assert_eq!(AttPdu::expected_response(OP_READ_REQ), Some(OP_READ_RSP));
        assert_eq!(AttPdu::expected_response(OP_WRITE_CMD), None);
        assert_eq!(AttPdu::expected_response(OP_NOTIFY), None);
    }

    #[test]
    fn error_code_roundtrip() {
        for code in [0x01, 0x02, 0x03, 0x06, 0x0e, 0xfd, 0x80] {
            assert_eq!(AttErrorCode::from_code(code).code(), code);
        }
    }
}
