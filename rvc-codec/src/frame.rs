//! CAN frame and identifier types
//!
//! RV-C uses 29-bit extended identifiers laid out as 3 bits of priority,
//! 18 bits of DGN and 8 bits of source address. The same layout is used for
//! frames read from the bus and frames built for transmission.

use crate::types::{format_payload_hex, CodecError, Dgn, Result, Timestamp};
use chrono::DateTime;
use std::fmt;

/// Decomposed 29-bit RV-C identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanId {
    /// Message priority (0 = highest, 7 = lowest)
    pub priority: u8,
    /// Data Group Number
    pub dgn: Dgn,
    /// Source address of the sending node
    pub source: u8,
}

impl CanId {
    /// Default priority for commands sent by the bridge
    pub const DEFAULT_PRIORITY: u8 = 6;

    /// Create an identifier
    pub fn new(priority: u8, dgn: Dgn, source: u8) -> Result<Self> {
        if priority > 7 {
            return Err(CodecError::InvalidPayload(format!(
                "Priority {} exceeds 3 bits",
                priority
            )));
        }
        Ok(Self {
            priority,
            dgn,
            source,
        })
    }

    /// Split a raw 29-bit identifier
    pub fn from_raw(raw: u32) -> Result<Self> {
        if raw > 0x1FFF_FFFF {
            return Err(CodecError::InvalidPayload(format!(
                "CAN ID 0x{:X} exceeds 29 bits",
                raw
            )));
        }
        Ok(Self {
            priority: ((raw >> 26) & 0x7) as u8,
            dgn: Dgn::new((raw >> 8) & Dgn::MAX)?,
            source: (raw & 0xFF) as u8,
        })
    }

    /// Assemble the raw 29-bit identifier
    pub fn to_raw(self) -> u32 {
        ((self.priority as u32) << 26) | (self.dgn.value() << 8) | self.source as u32
    }
}

impl fmt::Display for CanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08X}", self.to_raw())
    }
}

/// A CAN frame as read from or written to the bus
#[derive(Debug, Clone, PartialEq)]
pub struct CanFrame {
    /// Capture timestamp in nanoseconds since epoch, if known
    pub timestamp_ns: Option<u64>,
    /// Interface name (e.g. "can0")
    pub interface: String,
    /// Decomposed identifier
    pub id: CanId,
    /// Payload bytes (0-8)
    pub data: Vec<u8>,
}

impl CanFrame {
    /// Create a frame without a timestamp
    pub fn new(interface: impl Into<String>, id: CanId, data: Vec<u8>) -> Self {
        Self {
            timestamp_ns: None,
            interface: interface.into(),
            id,
            data,
        }
    }

    /// Convert timestamp from nanoseconds to DateTime<Utc>
    pub fn timestamp(&self) -> Option<Timestamp> {
        let ns = self.timestamp_ns?;
        let secs = (ns / 1_000_000_000) as i64;
        let nsecs = (ns % 1_000_000_000) as u32;
        DateTime::from_timestamp(secs, nsecs)
    }

    /// Get the data length code (DLC) - number of data bytes
    pub fn dlc(&self) -> usize {
        self.data.len()
    }

    /// Render in `cansend` syntax: `can0 19FEDB9C#01FF...`
    pub fn to_cansend(&self) -> String {
        format!(
            "{} {}#{}",
            self.interface,
            self.id,
            format_payload_hex(&self.data)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_id_split() {
        let id = CanId::from_raw(0x19FEDA9C).unwrap();
        assert_eq!(id.priority, 6);
        assert_eq!(id.dgn.to_string(), "1FEDA");
        assert_eq!(id.source, 0x9C);
        assert_eq!(id.to_raw(), 0x19FEDA9C);
    }

    #[test]
    fn test_can_id_full_dgn_width() {
        // Bit 25 belongs to the DGN, not to a pad bit
        let id = CanId::new(3, Dgn::new(0x3FFFF).unwrap(), 0x01).unwrap();
        assert_eq!(id.to_raw(), 0x0FFFFF01);
        assert_eq!(CanId::from_raw(0x0FFFFF01).unwrap(), id);
    }

    #[test]
    fn test_can_id_limits() {
        assert!(CanId::from_raw(0x2000_0000).is_err());
        assert!(CanId::new(8, Dgn::new(0x1FEDA).unwrap(), 0).is_err());
    }

    #[test]
    fn test_cansend_rendering() {
        let id = CanId::new(6, Dgn::new(0x1FEDB).unwrap(), 0x9C).unwrap();
        let frame = CanFrame::new("can0", id, vec![0x01, 0xFF, 0xC8, 0x00, 0xFF, 0x00, 0xFF, 0xFF]);
        assert_eq!(frame.to_cansend(), "can0 19FEDB9C#01FFC800FF00FFFF");
        assert_eq!(frame.dlc(), 8);
        assert!(frame.timestamp().is_none());
    }
}
