//! Specification table
//!
//! The immutable DGN → decoder definition mapping the codec works from. Built
//! once (see `loader`) and shared behind an `Arc`.

use crate::types::{CodecError, Dgn, Result};
use crate::units::{all_ones, Conversion};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Number of payload bytes in a classic CAN frame
pub const PAYLOAD_LEN: usize = 8;

/// Declared data type of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Uint8,
    Uint16,
    Uint32,
    /// Raw bit field of the given width (1-8)
    Bits(u8),
}

impl DataType {
    /// Width of the type in bits
    pub fn width_bits(self) -> u32 {
        match self {
            DataType::Uint8 => 8,
            DataType::Uint16 => 16,
            DataType::Uint32 => 32,
            DataType::Bits(n) => n as u32,
        }
    }
}

impl FromStr for DataType {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_ascii_lowercase();
        match lower.as_str() {
            "uint8" => Ok(DataType::Uint8),
            "uint16" => Ok(DataType::Uint16),
            "uint32" => Ok(DataType::Uint32),
            "bit" => Ok(DataType::Bits(1)),
            other => other
                .strip_prefix("bit")
                .and_then(|n| n.parse::<u8>().ok())
                .filter(|n| (1..=8).contains(n))
                .map(DataType::Bits)
                .ok_or_else(|| {
                    CodecError::SpecIntegrityDefect(format!("Unknown field type: {:?}", s))
                }),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Uint8 => write!(f, "uint8"),
            DataType::Uint16 => write!(f, "uint16"),
            DataType::Uint32 => write!(f, "uint32"),
            DataType::Bits(1) => write!(f, "bit"),
            DataType::Bits(n) => write!(f, "bit{}", n),
        }
    }
}

/// Inclusive range, written as `3` or `"2-3"` in the specification document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Result<Self> {
        if end < start {
            return Err(CodecError::SpecIntegrityDefect(format!(
                "Range end {} before start {}",
                end, start
            )));
        }
        Ok(Self { start, end })
    }

    pub fn single(offset: usize) -> Self {
        Self {
            start: offset,
            end: offset,
        }
    }

    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }
}

impl FromStr for Span {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CodecError::SpecIntegrityDefect(format!("Invalid range: {:?}", s));
        match s.split_once('-') {
            Some((start, end)) => Span::new(
                start.trim().parse().map_err(|_| invalid())?,
                end.trim().parse().map_err(|_| invalid())?,
            ),
            None => Ok(Span::single(s.trim().parse().map_err(|_| invalid())?)),
        }
    }
}

/// Code → definition table attached to a field
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueTable {
    entries: Vec<(String, String)>,
}

impl ValueTable {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Definition for an exact code key
    pub fn get(&self, code: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(key, _)| key == code)
            .map(|(_, definition)| definition.as_str())
    }

    /// Code whose definition matches (case-insensitively)
    pub fn code_for(&self, definition: &str) -> Option<&str> {
        let wanted = definition.trim();
        self.entries
            .iter()
            .find(|(_, def)| def.eq_ignore_ascii_case(wanted))
            .map(|(key, _)| key.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A field within a decoder definition
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDefinition {
    /// Key written into decoded records
    pub name: String,
    /// Byte offsets within the payload
    pub bytes: Span,
    /// Bit offsets within the first byte of `bytes`
    pub bits: Option<Span>,
    /// Declared data type
    pub data_type: DataType,
    /// Engineering conversion, if the field declares a unit
    pub conversion: Option<Conversion>,
    /// Enumerated definitions, if any
    pub values: Option<ValueTable>,
}

impl FieldDefinition {
    /// Number of raw bits the field occupies on the wire
    pub fn raw_width_bits(&self) -> u32 {
        match self.bits {
            Some(bits) => bits.len() as u32,
            None => (self.bytes.len() as u32 * 8).min(64),
        }
    }

    /// "Not available" raw value for this field
    pub fn sentinel(&self) -> u64 {
        match self.conversion {
            Some(conversion) => conversion.sentinel(),
            None => all_ones(self.raw_width_bits().min(self.data_type.width_bits())),
        }
    }

    /// Bits of a payload byte claimed by this field
    pub fn claimed_mask(&self, byte_index: usize) -> u8 {
        match self.bits {
            Some(bits) if byte_index == self.bytes.start => {
                (all_ones(bits.len() as u32) as u8) << bits.start
            }
            Some(_) => 0,
            None if (self.bytes.start..=self.bytes.end).contains(&byte_index) => 0xFF,
            None => 0,
        }
    }

    /// True if the field fits inside a payload of `len` bytes
    pub fn fits(&self, len: usize) -> bool {
        self.bytes.end < len
    }
}

/// Per-byte claimed bit masks for a field list
pub fn claimed_masks(fields: &[FieldDefinition]) -> [u8; PAYLOAD_LEN] {
    let mut masks = [0u8; PAYLOAD_LEN];
    for field in fields {
        for (index, mask) in masks.iter_mut().enumerate() {
            *mask |= field.claimed_mask(index);
        }
    }
    masks
}

/// A complete decoder definition
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderDefinition {
    /// DGN key
    pub dgn: Dgn,
    /// Display name (topic type segment)
    pub name: String,
    /// DGN whose fields are prepended to this entry's own
    pub alias: Option<Dgn>,
    /// Inclusive DGN bound this entry also covers
    pub range: Option<(u32, u32)>,
    /// Effective fields: alias fields first, then own fields
    pub fields: Vec<FieldDefinition>,
}

impl DecoderDefinition {
    /// True if this entry's range covers the DGN
    pub fn covers(&self, dgn: Dgn) -> bool {
        self.range
            .map(|(start, end)| (start..=end).contains(&dgn.value()))
            .unwrap_or(false)
    }
}

/// The specification table
#[derive(Debug, Clone, Default)]
pub struct SpecTable {
    /// Definitions by DGN
    definitions: HashMap<Dgn, DecoderDefinition>,
    /// Range-bound entries, ordered by range start
    ranged: Vec<Dgn>,
    /// Display name → DGN (lowest DGN wins on duplicate names)
    names: HashMap<String, Dgn>,
}

impl SpecTable {
    /// Build a table from already-resolved definitions
    ///
    /// Duplicate DGNs and overlapping field regions are integrity defects.
    pub fn from_definitions(definitions: Vec<DecoderDefinition>) -> Result<Self> {
        let mut table = Self::default();

        for definition in definitions {
            check_overlaps(&definition)?;

            let dgn = definition.dgn;
            if table.definitions.contains_key(&dgn) {
                return Err(CodecError::SpecIntegrityDefect(format!(
                    "Duplicate DGN key: {}",
                    dgn
                )));
            }
            if definition.range.is_some() {
                table.ranged.push(dgn);
            }
            table.definitions.insert(dgn, definition);
        }

        table.ranged.sort_by_key(|dgn| {
            table.definitions[dgn]
                .range
                .map(|(start, _)| start)
                .unwrap_or_default()
        });

        let mut dgns: Vec<Dgn> = table.definitions.keys().copied().collect();
        dgns.sort_unstable();
        for dgn in dgns {
            let name = table.definitions[&dgn].name.to_ascii_uppercase();
            if let Some(existing) = table.names.get(&name) {
                log::warn!(
                    "Display name {} used by {} and {}; encoding by name uses {}",
                    name,
                    existing,
                    dgn,
                    existing
                );
                continue;
            }
            table.names.insert(name, dgn);
        }

        Ok(table)
    }

    /// Exact DGN lookup
    pub fn get(&self, dgn: Dgn) -> Option<&DecoderDefinition> {
        self.definitions.get(&dgn)
    }

    /// Exact lookup, then the first range-bound entry containing the DGN
    pub fn resolve(&self, dgn: Dgn) -> Option<&DecoderDefinition> {
        self.get(dgn).or_else(|| {
            self.ranged
                .iter()
                .map(|key| &self.definitions[key])
                .find(|definition| definition.covers(dgn))
        })
    }

    /// Lookup by display name (case-insensitive)
    pub fn get_by_name(&self, name: &str) -> Option<&DecoderDefinition> {
        self.names
            .get(&name.trim().to_ascii_uppercase())
            .and_then(|dgn| self.definitions.get(dgn))
    }

    /// All DGNs, sorted
    pub fn dgns(&self) -> Vec<Dgn> {
        let mut dgns: Vec<Dgn> = self.definitions.keys().copied().collect();
        dgns.sort_unstable();
        dgns
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Table statistics
    pub fn stats(&self) -> SpecStats {
        SpecStats {
            num_definitions: self.definitions.len(),
            num_fields: self.definitions.values().map(|d| d.fields.len()).sum(),
            num_ranges: self.ranged.len(),
            num_pending: self
                .definitions
                .values()
                .filter(|d| d.fields.is_empty())
                .count(),
        }
    }
}

/// Specification table statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecStats {
    /// Number of decoder definitions
    pub num_definitions: usize,
    /// Total effective fields across definitions
    pub num_fields: usize,
    /// Definitions carrying a DGN range
    pub num_ranges: usize,
    /// Placeholder definitions without fields
    pub num_pending: usize,
}

/// Reject definitions where two fields claim the same bit
fn check_overlaps(definition: &DecoderDefinition) -> Result<()> {
    for (i, a) in definition.fields.iter().enumerate() {
        for b in &definition.fields[i + 1..] {
            let clash = (0..PAYLOAD_LEN).any(|idx| a.claimed_mask(idx) & b.claimed_mask(idx) != 0);
            if clash {
                return Err(CodecError::SpecIntegrityDefect(format!(
                    "{} ({}): fields '{}' and '{}' overlap",
                    definition.dgn, definition.name, a.name, b.name
                )));
            }
        }
    }
    Ok(())
}
