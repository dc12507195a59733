//! Engineering unit conversions
//!
//! RV-C fixes the resolution and offset of every unit per field width. Each
//! supported unit × width pair is one `Conversion` variant, so decode and
//! encode match exhaustively and a specification entry with an unsupported
//! pair is rejected when the table is built.
//!
//! The all-ones raw value of the field width is the "not available" sentinel
//! for every conversion except `Bitmap8`, where all ones is a valid bitmap.

use crate::types::{CodecError, RecordValue, Result};
use std::fmt;
use std::str::FromStr;

/// Engineering unit declared on a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Unit {
    Percent,
    Celsius,
    Volts,
    Amps,
    Hertz,
    Seconds,
    Bitmap,
}

impl FromStr for Unit {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pct" | "%" => Ok(Unit::Percent),
            "deg c" | "degc" | "c" => Ok(Unit::Celsius),
            "v" => Ok(Unit::Volts),
            "a" => Ok(Unit::Amps),
            "hz" => Ok(Unit::Hertz),
            "sec" | "s" => Ok(Unit::Seconds),
            "bitmap" => Ok(Unit::Bitmap),
            other => Err(CodecError::SpecIntegrityDefect(format!(
                "Unknown unit: {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Unit::Percent => "pct",
            Unit::Celsius => "deg c",
            Unit::Volts => "v",
            Unit::Amps => "a",
            Unit::Hertz => "hz",
            Unit::Seconds => "sec",
            Unit::Bitmap => "bitmap",
        };
        write!(f, "{}", s)
    }
}

/// A supported unit × width conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Conversion {
    Percent8,
    Celsius8,
    Celsius16,
    Volts8,
    Volts16,
    Amps8,
    Amps16,
    Amps32,
    Hertz8,
    Hertz16,
    Seconds8,
    Seconds16,
    Bitmap8,
}

impl Conversion {
    /// Resolve the conversion for a unit applied to a field of the given width
    ///
    /// Returns `None` for pairs the protocol does not define.
    pub fn resolve(unit: Unit, width_bits: u32) -> Option<Self> {
        match (unit, width_bits) {
            (Unit::Percent, 8) => Some(Conversion::Percent8),
            (Unit::Celsius, 8) => Some(Conversion::Celsius8),
            (Unit::Celsius, 16) => Some(Conversion::Celsius16),
            (Unit::Volts, 8) => Some(Conversion::Volts8),
            (Unit::Volts, 16) => Some(Conversion::Volts16),
            (Unit::Amps, 8) => Some(Conversion::Amps8),
            (Unit::Amps, 16) => Some(Conversion::Amps16),
            (Unit::Amps, 32) => Some(Conversion::Amps32),
            (Unit::Hertz, 8) => Some(Conversion::Hertz8),
            (Unit::Hertz, 16) => Some(Conversion::Hertz16),
            (Unit::Seconds, 8) => Some(Conversion::Seconds8),
            (Unit::Seconds, 16) => Some(Conversion::Seconds16),
            (Unit::Bitmap, 8) => Some(Conversion::Bitmap8),
            _ => None,
        }
    }

    /// Unit this conversion belongs to
    pub fn unit(self) -> Unit {
        match self {
            Conversion::Percent8 => Unit::Percent,
            Conversion::Celsius8 | Conversion::Celsius16 => Unit::Celsius,
            Conversion::Volts8 | Conversion::Volts16 => Unit::Volts,
            Conversion::Amps8 | Conversion::Amps16 | Conversion::Amps32 => Unit::Amps,
            Conversion::Hertz8 | Conversion::Hertz16 => Unit::Hertz,
            Conversion::Seconds8 | Conversion::Seconds16 => Unit::Seconds,
            Conversion::Bitmap8 => Unit::Bitmap,
        }
    }

    /// Raw field width in bits
    pub fn width_bits(self) -> u32 {
        match self {
            Conversion::Percent8
            | Conversion::Celsius8
            | Conversion::Volts8
            | Conversion::Amps8
            | Conversion::Hertz8
            | Conversion::Seconds8
            | Conversion::Bitmap8 => 8,
            Conversion::Celsius16
            | Conversion::Volts16
            | Conversion::Amps16
            | Conversion::Hertz16
            | Conversion::Seconds16 => 16,
            Conversion::Amps32 => 32,
        }
    }

    /// All-ones raw value for the width
    pub fn sentinel(self) -> u64 {
        all_ones(self.width_bits())
    }

    /// Convert a raw field value into its engineering value
    pub fn decode(self, raw: u64) -> RecordValue {
        if self != Conversion::Bitmap8 && raw == self.sentinel() {
            return RecordValue::NotAvailable;
        }

        let r = raw as f64;
        match self {
            Conversion::Percent8 => RecordValue::Float(round_half_away(r / 2.0, 1)),
            Conversion::Celsius8 => RecordValue::Integer(raw as i64 - 40),
            Conversion::Celsius16 => RecordValue::Float(round_half_away(r * 0.03125 - 273.0, 2)),
            Conversion::Volts8 | Conversion::Amps8 | Conversion::Hertz8 => {
                RecordValue::Integer(raw as i64)
            }
            Conversion::Volts16 => RecordValue::Float(round_half_away(r * 0.05, 2)),
            Conversion::Amps16 => RecordValue::Float(round_half_away(r * 0.05 - 1600.0, 2)),
            Conversion::Amps32 => {
                RecordValue::Float(round_half_away(r * 0.001 - 2_000_000.0, 3))
            }
            Conversion::Hertz16 => RecordValue::Float(round_half_away(r / 128.0, 2)),
            Conversion::Seconds8 => {
                if (241..=250).contains(&raw) {
                    RecordValue::Integer((raw as i64 - 240 + 4) * 60)
                } else {
                    RecordValue::Integer(raw as i64)
                }
            }
            Conversion::Seconds16 => RecordValue::Integer(raw as i64 * 2),
            Conversion::Bitmap8 => RecordValue::Text(format!("{:08b}", raw & 0xFF)),
        }
    }

    /// Convert an engineering value back into its raw field value
    ///
    /// Values that land on the sentinel or outside the field width are
    /// rejected; the sentinel is only produced from an explicit "n/a".
    pub fn encode(self, value: f64) -> Result<u64> {
        if !value.is_finite() {
            return Err(CodecError::InvalidPayload(format!(
                "Non-finite value {} for unit {}",
                value,
                self.unit()
            )));
        }

        let raw = match self {
            Conversion::Percent8 => (value * 2.0).round(),
            Conversion::Celsius8 => value.round() + 40.0,
            Conversion::Celsius16 => ((value + 273.0) * 32.0).round(),
            Conversion::Volts8 | Conversion::Amps8 | Conversion::Hertz8 | Conversion::Bitmap8 => {
                value.round()
            }
            Conversion::Volts16 => (value * 20.0).round(),
            Conversion::Amps16 => ((value + 1600.0) * 20.0).round(),
            Conversion::Amps32 => ((value + 2_000_000.0) * 1000.0).round(),
            Conversion::Hertz16 => (value * 128.0).round(),
            Conversion::Seconds8 => return encode_seconds8(value),
            Conversion::Seconds16 => (value / 2.0).round(),
        };

        let limit = if self == Conversion::Bitmap8 {
            self.sentinel()
        } else {
            self.sentinel() - 1
        };
        if raw < 0.0 || raw > limit as f64 {
            return Err(CodecError::InvalidPayload(format!(
                "Value {} out of range for {}-bit {} field",
                value,
                self.width_bits(),
                self.unit()
            )));
        }
        Ok(raw as u64)
    }
}

/// Seconds in an 8-bit field: 0-240 and 251-254 are literal, 241-250 encode
/// whole minutes from 5 to 14.
fn encode_seconds8(value: f64) -> Result<u64> {
    let seconds = value.round();
    if (0.0..=240.0).contains(&seconds) || (251.0..=254.0).contains(&seconds) {
        return Ok(seconds as u64);
    }
    if (300.0..=840.0).contains(&seconds) && seconds % 60.0 == 0.0 {
        return Ok((seconds / 60.0) as u64 - 4 + 240);
    }
    Err(CodecError::InvalidPayload(format!(
        "Duration {} s is not representable in an 8-bit seconds field",
        value
    )))
}

/// All-ones value for a bit width (capped at 64 bits)
pub fn all_ones(width_bits: u32) -> u64 {
    if width_bits >= 64 {
        u64::MAX
    } else {
        (1u64 << width_bits) - 1
    }
}

/// Round to `decimals` places, halves away from zero
pub fn round_half_away(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    let scaled = value * scale;
    // Absorb binary representation error so 2.675 rounds like the decimal literal.
    let nudged = scaled + scaled.signum() * 1e-9;
    nudged.round() / scale
}

/// Mirror a Celsius value in Fahrenheit, one decimal place
pub fn celsius_to_fahrenheit(value: &RecordValue) -> RecordValue {
    let celsius = match value {
        RecordValue::Integer(v) => *v as f64,
        RecordValue::Float(v) => *v,
        _ => return RecordValue::NotAvailable,
    };
    RecordValue::Float(round_half_away(celsius * 9.0 / 5.0 + 32.0, 1))
}
