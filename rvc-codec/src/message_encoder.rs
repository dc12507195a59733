//! Message Encoding Engine
//!
//! Builds an RV-C payload from named field values. The payload starts as all
//! `0xFF`, each supplied field is written into the bits it claims, and a
//! formatting pass sets every unclaimed bit to `1`. Fields absent from the
//! input therefore stay "not available" while fields supplied as zero are
//! written as zero.

use crate::spec::{claimed_masks, DecoderDefinition, FieldDefinition, PAYLOAD_LEN};
use crate::types::{CodecError, FieldInput, InputValue, Result};
use crate::units::{all_ones, Conversion};
use byteorder::{ByteOrder, LittleEndian};

/// Command name → code table for text commands on fields without a value table
pub const COMMAND_CODES: &[(&str, u8)] = &[
    ("stop", 4),
    ("forward", 129),
    ("reverse", 65),
    ("toggle forward", 133),
    ("toggle reverse", 69),
];

/// Code used when a text command is not recognized
pub const DEFAULT_COMMAND: u8 = 4;

/// Look up a command code by name (case-insensitive)
pub fn command_code(name: &str) -> Option<u8> {
    let name = name.trim();
    COMMAND_CODES
        .iter()
        .find(|(command, _)| command.eq_ignore_ascii_case(name))
        .map(|(_, code)| *code)
}

/// Look up a command name by code
pub fn command_name(code: u8) -> Option<&'static str> {
    COMMAND_CODES
        .iter()
        .find(|(_, c)| *c == code)
        .map(|(command, _)| *command)
}

/// Message encoder - turns named values into payloads
pub struct MessageEncoder;

impl MessageEncoder {
    /// Generic encode: initialise, write supplied fields, format
    pub fn encode_fields(
        definition: &DecoderDefinition,
        input: &FieldInput,
    ) -> Result<[u8; PAYLOAD_LEN]> {
        let mut payload = [0xFFu8; PAYLOAD_LEN];

        for field in &definition.fields {
            let value = match input.get(&field.name) {
                Some(value) => value,
                None => continue,
            };

            if !field.fits(PAYLOAD_LEN) {
                log::warn!(
                    "{}: field '{}' lies outside the payload, skipping",
                    definition.name,
                    field.name
                );
                continue;
            }

            let raw = Self::raw_value(field, value)?;
            Self::write_field(&mut payload, field, raw);
        }

        Self::apply_formatting(&definition.fields, &mut payload);
        Ok(payload)
    }

    /// Convert one input value into the field's raw encoded value
    pub fn raw_value(field: &FieldDefinition, value: &InputValue) -> Result<u64> {
        if value.is_not_available() {
            return Ok(field.sentinel());
        }

        let raw = match value {
            InputValue::Text(text) => Self::text_to_raw(field, text)?,
            InputValue::Integer(v) => Self::number_to_raw(field, *v as f64)?,
            InputValue::Decimal(v) => Self::number_to_raw(field, *v)?,
        };

        let max = all_ones(field.raw_width_bits());
        if raw > max {
            return Err(CodecError::InvalidPayload(format!(
                "Field '{}': value {} does not fit in {} bits",
                field.name,
                value,
                field.raw_width_bits()
            )));
        }
        Ok(raw)
    }

    /// Text input: value-table definition, bitmap, numeric text, then command name
    fn text_to_raw(field: &FieldDefinition, text: &str) -> Result<u64> {
        if let Some(code) = field.values.as_ref().and_then(|v| v.code_for(text)) {
            return Self::parse_code(field, code);
        }

        let trimmed = text.trim();
        if field.conversion == Some(Conversion::Bitmap8)
            && !trimmed.is_empty()
            && trimmed.len() <= 8
            && trimmed.chars().all(|c| c == '0' || c == '1')
        {
            return u64::from_str_radix(trimmed, 2).map_err(|e| {
                CodecError::InvalidPayload(format!("Field '{}': {}", field.name, e))
            });
        }

        if let Ok(number) = trimmed.parse::<f64>() {
            return Self::number_to_raw(field, number);
        }

        if let Some(code) = command_code(trimmed) {
            return Ok(code as u64);
        }

        if (DEFAULT_COMMAND as u64) > all_ones(field.raw_width_bits()) {
            return Err(CodecError::InvalidPayload(format!(
                "Field '{}': unrecognized value {:?}",
                field.name, text
            )));
        }
        log::warn!(
            "Field '{}': unrecognized command {:?}, sending stop",
            field.name,
            text
        );
        Ok(DEFAULT_COMMAND as u64)
    }

    /// Numeric input: inverse unit conversion, or the integer itself
    fn number_to_raw(field: &FieldDefinition, number: f64) -> Result<u64> {
        match field.conversion {
            Some(conversion) => conversion.encode(number).map_err(|e| match e {
                CodecError::InvalidPayload(msg) => {
                    CodecError::InvalidPayload(format!("Field '{}': {}", field.name, msg))
                }
                other => other,
            }),
            None => {
                if !number.is_finite() || number < 0.0 || number.fract() != 0.0 {
                    return Err(CodecError::InvalidPayload(format!(
                        "Field '{}' expects a non-negative integer, got {}",
                        field.name, number
                    )));
                }
                Ok(number as u64)
            }
        }
    }

    /// Parse a value-table code: fixed-width binary if it matches the field
    /// width, decimal otherwise
    fn parse_code(field: &FieldDefinition, code: &str) -> Result<u64> {
        let width = field.raw_width_bits() as usize;
        let parsed = if code.len() == width && code.chars().all(|c| c == '0' || c == '1') {
            u64::from_str_radix(code, 2)
        } else {
            code.parse::<u64>()
        };
        parsed.map_err(|_| {
            CodecError::InvalidPayload(format!(
                "Field '{}': value-table code {:?} is not numeric",
                field.name, code
            ))
        })
    }

    /// Write a raw value into the bytes/bits the field claims
    fn write_field(payload: &mut [u8; PAYLOAD_LEN], field: &FieldDefinition, raw: u64) {
        let start = field.bytes.start;
        match field.bits {
            Some(bits) => {
                let mask = field.claimed_mask(start);
                let shifted = ((raw as u8) << bits.start) & mask;
                payload[start] = (payload[start] & !mask) | shifted;
            }
            None if field.bytes.len() > 1 => {
                let n = field.bytes.len().min(8);
                LittleEndian::write_uint(&mut payload[start..start + n], raw, n);
            }
            None => payload[start] = raw as u8,
        }
    }

    /// Set every bit no field claims to `1`
    pub fn apply_formatting(fields: &[FieldDefinition], payload: &mut [u8; PAYLOAD_LEN]) {
        let masks = claimed_masks(fields);
        for (byte, mask) in payload.iter_mut().zip(masks) {
            *byte |= !mask;
        }
    }

    /// Force every byte no field claims to `0xFF`
    ///
    /// Running this twice gives the same payload as running it once.
    pub fn validate(fields: &[FieldDefinition], payload: &mut [u8; PAYLOAD_LEN]) {
        let masks = claimed_masks(fields);
        for (byte, mask) in payload.iter_mut().zip(masks) {
            if mask == 0 {
                *byte = 0xFF;
            }
        }
    }
}
