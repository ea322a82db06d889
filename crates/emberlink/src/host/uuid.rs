// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 emberlink.dev

//! Attribute type UUIDs (16- and 128-bit).

use std::fmt;

/// Primary Service declaration UUID (0x2800).
pub const UUID_PRIMARY_SERVICE: Uuid = Uuid::from_u16(0x2800);
/// Characteristic declaration UUID (0x2803).
pub const UUID_CHARACTERISTIC: Uuid = Uuid::from_u16(0x2803);
/// Client Characteristic Configuration Descriptor UUID (0x2902).
pub const UUID_CCCD: Uuid = Uuid::from_u16(0x2902);

/// A 16- or 128-bit attribute UUID.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub enum Uuid {
    /// Bluetooth SIG assigned 16-bit UUID.
    Uuid16(u16),
    /// Full 128-bit UUID, little-endian byte order (wire order).
    Uuid128([u8; 16]),
}

impl Uuid {
    /// Construct a 16-bit UUID (const-friendly).
    #[must_use]
    pub const fn from_u16(value: u16) -> Self {
        Self::Uuid16(value)
    }

    /// Construct a 128-bit UUID from wire-order bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self::Uuid128(bytes)
    }

    /// Encoded length on the wire (2 or 16).
    #[must_use]
    pub const fn wire_len(&self) -> usize {
        match self {
            Self::Uuid16(_) => 2,
            Self::Uuid128(_) => 16,
        }
    }

    /// Append the wire encoding (little-endian) to `out`.
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            Self::Uuid16(v) => out.extend_from_slice(&v.to_le_bytes()),
            Self::Uuid128(b) => out.extend_from_slice(b),
        }
    }
}

impl fmt::Debug for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uuid16(v) => write!(f, "Uuid16(0x{:04x})", v),
            Self::Uuid128(b) => {
                write!(f, "Uuid128(")?;
                for byte in b.iter().rev() {
                    write!(f, "{:02x}", byte)?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_lengths() {
        assert_eq!(Uuid::from_u16(0x2800).wire_len(), 2);
        assert_eq!(Uuid::from_bytes([0; 16]).wire_len(), 16);
    }

    #[test]
    fn uuid16_encodes_little_endian() {
        let mut out = Vec::new();
        UUID_CCCD.encode_into(&mut out);
        assert_eq!(out, vec![0x02, 0x29]);
    }
}
