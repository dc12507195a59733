//! Compatibility override table
//!
//! Some devices reject or misread the payload the generic encoder produces
//! for a handful of DGNs. For those DGNs a hand-verified byte pattern replaces
//! the generic result after encoding. An override only ever sees the
//! caller's `instance` and, where the pattern needs it, one variable quantity
//! that distinguishes "on" from "off".
//!
//! ## Entries
//!
//! - `1FFB2` GENERATOR_DEMAND_COMMAND: whole payload, `FD FF..` (on) or
//!   `FC FF..` (off). Devices ignore the generic `FF FF..` sent when the
//!   demand field is omitted.
//! - `1FEF9` THERMOSTAT_COMMAND_1: whole payload. With a setpoint: cool mode,
//!   both setpoints equal. Without: off.
//! - `1FEDB` DC_DIMMER_COMMAND_2: bytes 4-5 only. Delay/duration is sent as
//!   `FF` and the interlock byte as `00`.

use crate::spec::PAYLOAD_LEN;
use crate::types::{CodecError, Dgn, FieldInput, InputValue, Result};
use crate::units::Conversion;
use std::collections::HashMap;
use std::fmt;

/// Replacement bytes produced by an override
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OverridePatch {
    bytes: [Option<u8>; PAYLOAD_LEN],
}

impl OverridePatch {
    /// Patch replacing the whole payload
    pub fn whole(payload: [u8; PAYLOAD_LEN]) -> Self {
        Self {
            bytes: payload.map(Some),
        }
    }

    /// Empty patch; add positions with `set`
    pub fn partial() -> Self {
        Self::default()
    }

    /// Builder method: replace one byte position
    pub fn set(mut self, index: usize, value: u8) -> Self {
        if index < PAYLOAD_LEN {
            self.bytes[index] = Some(value);
        }
        self
    }

    /// Overwrite the patched positions of a payload
    pub fn apply(&self, payload: &mut [u8; PAYLOAD_LEN]) {
        for (byte, patch) in payload.iter_mut().zip(self.bytes) {
            if let Some(value) = patch {
                *byte = value;
            }
        }
    }

    /// Which positions this patch replaces
    pub fn patched(&self) -> [bool; PAYLOAD_LEN] {
        self.bytes.map(|b| b.is_some())
    }

    /// True if every position is replaced
    pub fn is_whole(&self) -> bool {
        self.bytes.iter().all(Option::is_some)
    }
}

/// Function computing an override patch from the encode input
pub type OverrideFn = fn(&FieldInput) -> Result<OverridePatch>;

/// One override table entry
#[derive(Clone, Copy)]
pub struct OverrideEntry {
    /// DGN the override applies to
    pub dgn: Dgn,
    /// Display name, for logging
    pub name: &'static str,
    /// Pattern builder
    pub apply: OverrideFn,
}

impl fmt::Debug for OverrideEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverrideEntry")
            .field("dgn", &self.dgn)
            .field("name", &self.name)
            .finish()
    }
}

/// DGN-keyed override table
#[derive(Debug, Clone)]
pub struct OverrideTable {
    entries: HashMap<Dgn, OverrideEntry>,
}

impl OverrideTable {
    /// Table without overrides
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// The hand-verified device overrides
    pub fn standard() -> Self {
        Self::empty()
            .with_entry(0x1FFB2, "GENERATOR_DEMAND_COMMAND", generator_demand)
            .with_entry(0x1FEF9, "THERMOSTAT_COMMAND_1", thermostat_command)
            .with_entry(0x1FEDB, "DC_DIMMER_COMMAND_2", dimmer_command)
    }

    /// Builder method: add or replace an entry
    ///
    /// DGNs above 18 bits are ignored.
    pub fn with_entry(mut self, dgn: u32, name: &'static str, apply: OverrideFn) -> Self {
        match Dgn::new(dgn) {
            Ok(dgn) => {
                self.entries.insert(dgn, OverrideEntry { dgn, name, apply });
            }
            Err(e) => log::warn!("Ignoring override {}: {}", name, e),
        }
        self
    }

    /// Override for a DGN, if any
    pub fn get(&self, dgn: Dgn) -> Option<&OverrideEntry> {
        self.entries.get(&dgn)
    }

    pub fn contains(&self, dgn: Dgn) -> bool {
        self.entries.contains_key(&dgn)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for OverrideTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// Caller-supplied instance, required by instance-addressed patterns
fn instance_of(input: &FieldInput) -> Result<u8> {
    let value = input
        .get("instance")
        .ok_or_else(|| CodecError::InvalidPayload("Missing required field 'instance'".into()))?;

    value
        .as_f64()
        .filter(|v| v.fract() == 0.0 && (0.0..=254.0).contains(v))
        .map(|v| v as u8)
        .ok_or_else(|| CodecError::InvalidPayload(format!("Invalid instance: {}", value)))
}

/// True for the usual spellings of "on"
fn is_on(value: &InputValue) -> bool {
    match value {
        InputValue::Integer(v) => *v == 1,
        InputValue::Decimal(v) => *v == 1.0,
        InputValue::Text(s) => {
            let s = s.trim();
            ["on", "1", "01", "true"]
                .iter()
                .any(|on| s.eq_ignore_ascii_case(on))
        }
    }
}

fn generator_demand(input: &FieldInput) -> Result<OverridePatch> {
    let on = input.get("generator demand").map(is_on).unwrap_or(false);
    let status = if on { 0xFD } else { 0xFC };
    Ok(OverridePatch::whole([
        status, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
    ]))
}

fn thermostat_command(input: &FieldInput) -> Result<OverridePatch> {
    let instance = instance_of(input)?;

    let setpoint = ["setpoint temp cool", "setpoint temp heat"]
        .iter()
        .filter_map(|name| input.get(name))
        .find(|value| !value.is_not_available());

    let pattern = match setpoint {
        Some(value) => {
            let celsius = value.as_f64().ok_or_else(|| {
                CodecError::InvalidPayload(format!("Invalid setpoint: {}", value))
            })?;
            let [lo, hi] = (Conversion::Celsius16.encode(celsius)? as u16).to_le_bytes();
            [instance, 0xF1, 0xFF, lo, hi, lo, hi, 0xFF]
        }
        None => [instance, 0xF0, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF],
    };

    Ok(OverridePatch::whole(pattern))
}

fn dimmer_command(_input: &FieldInput) -> Result<OverridePatch> {
    Ok(OverridePatch::partial().set(4, 0xFF).set(5, 0x00))
}
