//! Message Decoding Engine
//!
//! Extracts field values from an RV-C payload according to a decoder
//! definition. Handles byte slicing, bit extraction, little-endian assembly,
//! unit conversion and value-table lookup.

use crate::spec::{DecoderDefinition, FieldDefinition, ValueTable};
use crate::types::{DecodedRecord, Dgn, RecordValue};
use crate::units::{all_ones, celsius_to_fahrenheit, Unit};
use byteorder::{ByteOrder, LittleEndian};

/// Definition written when a value table has no entry for the value
pub const UNDEFINED_DEFINITION: &str = "undefined";

/// Message decoder - turns payloads into decoded records
pub struct MessageDecoder;

impl MessageDecoder {
    /// Decode a payload into a record
    ///
    /// # Arguments
    /// * `dgn` - DGN the payload was received with
    /// * `data` - Payload bytes (normally 8)
    /// * `definition` - Resolved decoder definition, `None` if the DGN is unknown
    ///
    /// Unknown DGNs produce a record named `UNKNOWN-<dgn>`; definitions without
    /// fields produce a record flagged `decoder pending`.
    pub fn decode_message(
        dgn: Dgn,
        data: &[u8],
        definition: Option<&DecoderDefinition>,
    ) -> DecodedRecord {
        let definition = match definition {
            Some(definition) => definition,
            None => {
                return DecodedRecord::with_header(dgn, data, &format!("UNKNOWN-{}", dgn));
            }
        };

        let mut record = DecodedRecord::with_header(dgn, data, &definition.name);

        if definition.fields.is_empty() {
            record.insert("decoder pending", 1i64);
            return record;
        }

        for field in &definition.fields {
            Self::decode_field(&mut record, data, field);
        }

        record
    }

    /// Decode a single field into the record
    fn decode_field(record: &mut DecodedRecord, data: &[u8], field: &FieldDefinition) {
        let raw = match Self::extract_raw(data, field) {
            Some(raw) => raw,
            None => {
                log::debug!(
                    "Field '{}' (bytes {}-{}) lies outside the {}-byte payload",
                    field.name,
                    field.bytes.start,
                    field.bytes.end,
                    data.len()
                );
                return;
            }
        };

        let value = match field.conversion {
            Some(conversion) => conversion.decode(raw),
            None => RecordValue::Integer(raw as i64),
        };

        let definition = field
            .values
            .as_ref()
            .map(|values| Self::lookup_definition(values, &value, field.raw_width_bits()));

        let fahrenheit = match field.conversion {
            Some(conversion) if conversion.unit() == Unit::Celsius => {
                Some(celsius_to_fahrenheit(&value))
            }
            _ => None,
        };

        record.insert(field.name.clone(), value);
        if let Some(fahrenheit) = fahrenheit {
            record.insert(format!("{} F", field.name), fahrenheit);
        }
        if let Some(definition) = definition {
            record.insert(format!("{} definition", field.name), definition);
        }
    }

    /// Extract the raw field value from payload data
    ///
    /// Returns `None` if the field's byte range runs past the payload.
    pub(crate) fn extract_raw(data: &[u8], field: &FieldDefinition) -> Option<u64> {
        if !field.fits(data.len()) {
            return None;
        }

        let slice = &data[field.bytes.start..=field.bytes.end];
        match field.bits {
            Some(bits) => Some((slice[0] >> bits.start) as u64 & all_ones(bits.len() as u32)),
            None => {
                let n = slice.len().min(8);
                Some(LittleEndian::read_uint(&slice[..n], n))
            }
        }
    }

    /// Find the definition text for a value
    ///
    /// Tries the value as written, then zero-padded decimal and fixed-width
    /// binary spellings matching the field width.
    fn lookup_definition(values: &ValueTable, value: &RecordValue, width_bits: u32) -> String {
        Self::lookup_keys(value, width_bits)
            .iter()
            .find_map(|key| values.get(key))
            .unwrap_or(UNDEFINED_DEFINITION)
            .to_string()
    }

    /// Candidate value-table keys for a value, most specific first
    fn lookup_keys(value: &RecordValue, width_bits: u32) -> Vec<String> {
        let mut keys = vec![value.to_string()];

        let v = match value.as_i64() {
            Some(v) if v >= 0 => v,
            _ => return keys,
        };

        match width_bits {
            2 => {
                keys.push(format!("{:02}", v));
                keys.push(format!("{:02b}", v));
            }
            4 => {
                keys.push(format!("{:04}", v));
                keys.push(format!("{:04b}", v));
            }
            width => {
                keys.push(format!("{:02}", v));
                keys.push(format!("{:03}", v));
                keys.push(format!("{:0w$b}", v, w = width as usize));
                keys.push(format!("{:08b}", v));
            }
        }

        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::{DataType, Span};
    use crate::units::Conversion;

    fn field(name: &str, bytes: Span, bits: Option<Span>) -> FieldDefinition {
        FieldDefinition {
            name: name.to_string(),
            bytes,
            bits,
            data_type: DataType::Uint8,
            conversion: None,
            values: None,
        }
    }

    #[test]
    fn test_extract_single_byte() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        let f = field("a", Span::single(0), None);
        assert_eq!(MessageDecoder::extract_raw(&data, &f), Some(0xAB));
    }

    #[test]
    fn test_extract_multi_byte_little_endian() {
        let data = [0xAB, 0xCD, 0xEF, 0x12];
        let f = field("a", Span { start: 0, end: 1 }, None);
        assert_eq!(MessageDecoder::extract_raw(&data, &f), Some(0xCDAB));

        let f = field("b", Span { start: 0, end: 3 }, None);
        assert_eq!(MessageDecoder::extract_raw(&data, &f), Some(0x12EFCDAB));
    }

    #[test]
    fn test_extract_bits() {
        let data = [0b1011_0110];
        let f = field("a", Span::single(0), Some(Span { start: 2, end: 3 }));
        assert_eq!(MessageDecoder::extract_raw(&data, &f), Some(0b01));

        let f = field("b", Span::single(0), Some(Span { start: 4, end: 7 }));
        assert_eq!(MessageDecoder::extract_raw(&data, &f), Some(0b1011));
    }

    #[test]
    fn test_extract_past_payload() {
        let data = [0x01, 0x02];
        let f = field("a", Span { start: 1, end: 2 }, None);
        assert_eq!(MessageDecoder::extract_raw(&data, &f), None);
    }

    #[test]
    fn test_lookup_ladder() {
        let values = ValueTable::new(vec![
            ("00".to_string(), "off".to_string()),
            ("01".to_string(), "on".to_string()),
        ]);
        assert_eq!(
            MessageDecoder::lookup_definition(&values, &RecordValue::Integer(1), 2),
            "on"
        );
        assert_eq!(
            MessageDecoder::lookup_definition(&values, &RecordValue::Integer(3), 2),
            "undefined"
        );

        let binary = ValueTable::new(vec![("0110".to_string(), "defrost".to_string())]);
        assert_eq!(
            MessageDecoder::lookup_definition(&binary, &RecordValue::Integer(6), 4),
            "defrost"
        );

        let decimal = ValueTable::new(vec![("17".to_string(), "ramp".to_string())]);
        assert_eq!(
            MessageDecoder::lookup_definition(&decimal, &RecordValue::Integer(17), 8),
            "ramp"
        );

        let wide = ValueTable::new(vec![("00000101".to_string(), "group 0 and 2".to_string())]);
        assert_eq!(
            MessageDecoder::lookup_definition(&wide, &RecordValue::Integer(5), 8),
            "group 0 and 2"
        );
    }

    #[test]
    fn test_unknown_dgn_record() {
        let dgn = Dgn::new(0x1F123).unwrap();
        let record = MessageDecoder::decode_message(dgn, &[0xFF; 8], None);
        assert_eq!(record.name(), Some("UNKNOWN-1F123"));
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_pending_definition() {
        let definition = DecoderDefinition {
            dgn: Dgn::new(0x1FECA).unwrap(),
            name: "DM_RV".to_string(),
            alias: None,
            range: None,
            fields: vec![],
        };
        let record = MessageDecoder::decode_message(definition.dgn, &[0; 8], Some(&definition));
        assert_eq!(record.get("decoder pending"), Some(&RecordValue::Integer(1)));
    }

    #[test]
    fn test_celsius_field_mirrors_fahrenheit() {
        let mut f = field("temp", Span { start: 0, end: 1 }, None);
        f.data_type = DataType::Uint16;
        f.conversion = Some(Conversion::Celsius16);
        let definition = DecoderDefinition {
            dgn: Dgn::new(0x1FF9C).unwrap(),
            name: "AMBIENT".to_string(),
            alias: None,
            range: None,
            fields: vec![f],
        };

        // 9424 * 0.03125 - 273 = 21.5
        let data = [0xD0, 0x24, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let record = MessageDecoder::decode_message(definition.dgn, &data, Some(&definition));
        assert_eq!(record.get("temp"), Some(&RecordValue::Float(21.5)));
        assert_eq!(record.get("temp F"), Some(&RecordValue::Float(70.7)));
    }
}
