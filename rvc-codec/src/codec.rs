//! Main codec API
//!
//! The [`Codec`] is the entry point for translating between RV-C payloads and
//! named values. It owns a shared specification table and override table and
//! is itself immutable, so one instance can be shared across threads.

use crate::formats::{CandumpFileIterator, CaptureParser};
use crate::frame::CanFrame;
use crate::message_decoder::MessageDecoder;
use crate::message_encoder::MessageEncoder;
use crate::overrides::OverrideTable;
use crate::spec::{bundled_spec, load_spec_file, DecoderDefinition, SpecStats, SpecTable, PAYLOAD_LEN};
use crate::types::{parse_payload_hex, CodecError, DecodedRecord, Dgn, FieldInput, Result};
use crate::units::Unit;
use std::path::Path;
use std::sync::Arc;

/// The codec - entry point for all decode and encode operations
#[derive(Debug, Clone)]
pub struct Codec {
    table: Arc<SpecTable>,
    overrides: Arc<OverrideTable>,
    fahrenheit: bool,
}

impl Codec {
    /// Create a codec over a table, with the standard device overrides
    pub fn new(table: Arc<SpecTable>) -> Self {
        Self::with_overrides(table, Arc::new(OverrideTable::standard()))
    }

    /// Create a codec with an explicit override table
    pub fn with_overrides(table: Arc<SpecTable>, overrides: Arc<OverrideTable>) -> Self {
        Self {
            table,
            overrides,
            fahrenheit: true,
        }
    }

    /// Codec over the specification bundled with the library
    pub fn bundled() -> Result<Self> {
        Ok(Self::new(Arc::new(bundled_spec()?)))
    }

    /// Codec over a specification document on disk
    ///
    /// # Example
    /// ```no_run
    /// use rvc_codec::Codec;
    /// use std::path::Path;
    ///
    /// let codec = Codec::from_spec_file(Path::new("rvc-spec.json")).unwrap();
    /// println!("{} decoders", codec.stats().num_definitions);
    /// ```
    pub fn from_spec_file(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(load_spec_file(path)?)))
    }

    /// Builder method: enable or disable the `"<name> F"` entries
    pub fn with_fahrenheit(mut self, enabled: bool) -> Self {
        self.fahrenheit = enabled;
        self
    }

    pub fn table(&self) -> &SpecTable {
        &self.table
    }

    pub fn overrides(&self) -> &OverrideTable {
        &self.overrides
    }

    /// Get statistics about the loaded specification
    pub fn stats(&self) -> SpecStats {
        self.table.stats()
    }

    /// Decode a payload
    ///
    /// Never fails: unknown DGNs produce an `UNKNOWN-<dgn>` record and fields
    /// beyond a short payload are skipped.
    pub fn decode(&self, dgn: Dgn, data: &[u8]) -> DecodedRecord {
        let definition = self.table.resolve(dgn);
        match definition {
            Some(definition) => log::debug!("Decoding {} ({})", definition.name, dgn),
            None => log::trace!("Unknown DGN: {}", dgn),
        }

        let mut record = MessageDecoder::decode_message(dgn, data, definition);
        if !self.fahrenheit {
            if let Some(definition) = definition {
                strip_fahrenheit(&mut record, definition);
            }
        }
        record
    }

    /// Decode a DGN and payload given as hex text
    ///
    /// Payloads shorter than 8 bytes are zero-padded.
    pub fn decode_hex(&self, dgn: &str, payload: &str) -> Result<DecodedRecord> {
        let dgn: Dgn = dgn.parse()?;
        let data = parse_payload_hex(payload)?;
        Ok(self.decode(dgn, &data))
    }

    /// Decode the payload of a CAN frame
    pub fn decode_frame(&self, frame: &CanFrame) -> DecodedRecord {
        self.decode(frame.id.dgn, &frame.data)
    }

    /// Encode named values into a payload for a DGN
    ///
    /// Only exact DGN matches are accepted; range entries are decode-only.
    pub fn encode(&self, dgn: Dgn, input: &FieldInput) -> Result<[u8; PAYLOAD_LEN]> {
        let definition = self
            .table
            .get(dgn)
            .ok_or_else(|| CodecError::UnknownMessageType(format!("DGN {}", dgn)))?;
        self.encode_definition(definition, input)
    }

    /// Encode named values for a message given by display name
    pub fn encode_by_name(&self, name: &str, input: &FieldInput) -> Result<(Dgn, [u8; PAYLOAD_LEN])> {
        let definition = self
            .table
            .get_by_name(name)
            .ok_or_else(|| CodecError::UnknownMessageType(name.to_string()))?;
        let payload = self.encode_definition(definition, input)?;
        Ok((definition.dgn, payload))
    }

    fn encode_definition(
        &self,
        definition: &DecoderDefinition,
        input: &FieldInput,
    ) -> Result<[u8; PAYLOAD_LEN]> {
        let mut payload = MessageEncoder::encode_fields(definition, input)?;

        if let Some(entry) = self.overrides.get(definition.dgn) {
            let patch = (entry.apply)(input)?;
            log::debug!("{}: applying compatibility override", entry.name);
            patch.apply(&mut payload);
        }

        MessageEncoder::validate(&definition.fields, &mut payload);
        log::debug!("Encoded {} ({}): {:02X?}", definition.name, definition.dgn, payload);
        Ok(payload)
    }

    /// Force every byte the DGN's fields do not claim to `0xFF`
    ///
    /// Accepts payloads from any source. Idempotent.
    pub fn validate(&self, dgn: Dgn, mut payload: [u8; PAYLOAD_LEN]) -> Result<[u8; PAYLOAD_LEN]> {
        let definition = self
            .table
            .get(dgn)
            .ok_or_else(|| CodecError::UnknownMessageType(format!("DGN {}", dgn)))?;
        MessageEncoder::validate(&definition.fields, &mut payload);
        Ok(payload)
    }

    /// Decode a candump capture file and return an iterator of decoded frames
    ///
    /// The iterator is lazy: frames are read and decoded as it advances.
    /// Unparseable lines surface as `Err` items without ending iteration.
    pub fn decode_file(&self, path: &Path) -> Result<DecodingIterator<'_, CandumpFileIterator>> {
        log::info!("Decoding capture file: {:?}", path);
        let frames = CandumpFileIterator::parse(path)?;
        Ok(DecodingIterator::new(frames, self))
    }
}

/// Drop the Fahrenheit mirrors of a definition's Celsius fields
fn strip_fahrenheit(record: &mut DecodedRecord, definition: &DecoderDefinition) {
    for field in &definition.fields {
        if field.conversion.map(|c| c.unit()) == Some(Unit::Celsius) {
            record.remove(&format!("{} F", field.name));
        }
    }
}

/// A frame together with its decoded record
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame: CanFrame,
    pub record: DecodedRecord,
}

/// Iterator that decodes CAN frames into records
pub struct DecodingIterator<'a, I>
where
    I: Iterator<Item = Result<CanFrame>>,
{
    frame_iter: I,
    codec: &'a Codec,
}

impl<'a, I> DecodingIterator<'a, I>
where
    I: Iterator<Item = Result<CanFrame>>,
{
    pub fn new(frame_iter: I, codec: &'a Codec) -> Self {
        Self { frame_iter, codec }
    }
}

impl<'a, I> Iterator for DecodingIterator<'a, I>
where
    I: Iterator<Item = Result<CanFrame>>,
{
    type Item = Result<DecodedFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        let frame = match self.frame_iter.next()? {
            Ok(frame) => frame,
            Err(e) => return Some(Err(e)),
        };
        let record = self.codec.decode_frame(&frame);
        Some(Ok(DecodedFrame { frame, record }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordValue;
    use std::io::Write;

    fn codec() -> Codec {
        Codec::bundled().unwrap()
    }

    #[test]
    fn test_codec_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Codec>();
    }

    #[test]
    fn test_decode_dimmer_status() {
        let record = codec()
            .decode_hex("1FEDA", "01FFC8FCFF04FFFF")
            .unwrap();
        assert_eq!(record.name(), Some("DC_DIMMER_STATUS_3"));
        assert_eq!(record.get("data"), Some(&RecordValue::from("01FFC8FCFF04FFFF")));
        assert_eq!(record.instance(), Some(1));
        assert_eq!(record.get("group"), Some(&RecordValue::from("11111111")));
        assert_eq!(
            record.get("operating status (brightness)"),
            Some(&RecordValue::Float(100.0))
        );
        assert_eq!(record.definition("lock status"), Some("load is unlocked"));
        assert_eq!(record.get("delay/duration"), Some(&RecordValue::NotAvailable));
        assert_eq!(record.definition("last command"), Some("stop"));
    }

    #[test]
    fn test_decode_range_entry() {
        let record = codec().decode_hex("0EF42", "1122").unwrap();
        assert_eq!(record.name(), Some("PROPRIETARY_DGN"));
        assert_eq!(record.get("dgn"), Some(&RecordValue::from("0EF42")));
        assert_eq!(record.get("manufacturer code"), Some(&RecordValue::Integer(0x11)));
    }

    #[test]
    fn test_decode_unknown_and_pending() {
        let unknown = codec().decode_hex("1F123", "").unwrap();
        assert_eq!(unknown.name(), Some("UNKNOWN-1F123"));
        assert_eq!(unknown.get("data"), Some(&RecordValue::from("0000000000000000")));

        let pending = codec().decode_hex("1FECA", "FFFFFFFFFFFFFFFF").unwrap();
        assert_eq!(pending.get("decoder pending"), Some(&RecordValue::Integer(1)));
    }

    #[test]
    fn test_decode_short_frame_skips_fields() {
        let codec = codec();
        let record = codec.decode(Dgn::new(0x1FFFD).unwrap(), &[0x02, 0x01, 0x10]);
        assert_eq!(record.instance(), Some(2));
        assert!(!record.contains_key("dc voltage"));
        assert!(!record.contains_key("dc current"));
    }

    #[test]
    fn test_fahrenheit_toggle() {
        let with = codec().decode_hex("1FF9C", "00D024").unwrap();
        assert_eq!(with.get("ambient temp F"), Some(&RecordValue::Float(70.7)));

        let without = codec()
            .with_fahrenheit(false)
            .decode_hex("1FF9C", "00D024")
            .unwrap();
        assert_eq!(without.get("ambient temp"), Some(&RecordValue::Float(21.5)));
        assert!(!without.contains_key("ambient temp F"));
    }

    #[test]
    fn test_encode_dimmer_command_with_override() {
        let input = FieldInput::new()
            .with("instance", 1i64)
            .with("desired level", 100i64)
            .with("command", "set level");
        let payload = codec().encode("1FEDB".parse().unwrap(), &input).unwrap();
        assert_eq!(payload, [0x01, 0xFF, 0xC8, 0x00, 0xFF, 0x00, 0xFF, 0xFF]);
    }

    #[test]
    fn test_encode_by_name() {
        let input = FieldInput::new()
            .with("instance", 2i64)
            .with("setpoint temp cool", 21.5);
        let (dgn, payload) = codec().encode_by_name("THERMOSTAT_COMMAND_1", &input).unwrap();
        assert_eq!(dgn.to_string(), "1FEF9");
        assert_eq!(payload, [0x02, 0xF1, 0xFF, 0xD0, 0x24, 0xD0, 0x24, 0xFF]);
    }

    #[test]
    fn test_encode_without_overrides() {
        let codec = Codec::with_overrides(
            Arc::new(bundled_spec().unwrap()),
            Arc::new(OverrideTable::empty()),
        );
        let payload = codec
            .encode("1FFB2".parse().unwrap(), &FieldInput::new())
            .unwrap();
        assert_eq!(payload, [0xFF; PAYLOAD_LEN]);
    }

    #[test]
    fn test_override_cannot_leave_unclaimed_bytes() {
        use crate::overrides::OverridePatch;

        let overrides = OverrideTable::empty().with_entry(0x1FFE2, "THERMOSTAT_STATUS_1", |_| {
            Ok(OverridePatch::partial().set(7, 0x00))
        });
        let codec = Codec::with_overrides(Arc::new(bundled_spec().unwrap()), Arc::new(overrides));

        let payload = codec
            .encode("1FFE2".parse().unwrap(), &FieldInput::new().with("instance", 1i64))
            .unwrap();
        assert_eq!(payload[0], 0x01);
        assert_eq!(payload[7], 0xFF);
    }

    #[test]
    fn test_encode_unknown_message() {
        let codec = codec();
        assert!(matches!(
            codec.encode_by_name("NO_SUCH_MESSAGE", &FieldInput::new()),
            Err(CodecError::UnknownMessageType(_))
        ));
        // Range entries do not resolve for encode
        assert!(matches!(
            codec.encode("0EF42".parse().unwrap(), &FieldInput::new()),
            Err(CodecError::UnknownMessageType(_))
        ));
    }

    #[test]
    fn test_validate_standalone() {
        let codec = codec();
        let dgn: Dgn = "1FFE2".parse().unwrap();
        let payload = codec.validate(dgn, [0x00; PAYLOAD_LEN]).unwrap();
        // Byte 7 is the only position no THERMOSTAT_STATUS_1 field claims
        assert_eq!(payload, [0, 0, 0, 0, 0, 0, 0, 0xFF]);
        assert_eq!(codec.validate(dgn, payload).unwrap(), payload);
    }

    #[test]
    fn test_decode_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "(0.1) can0 19FFB29C#FDFFFFFFFFFFFFFF").unwrap();
        writeln!(file, "garbage").unwrap();
        writeln!(file, "(0.2) can0 19FFB29C#FCFFFFFFFFFFFFFF").unwrap();

        let codec = codec();
        let results: Vec<_> = codec.decode_file(file.path()).unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[1].is_err());

        let first = results[0].as_ref().unwrap();
        assert_eq!(first.frame.id.source, 0x9C);
        assert_eq!(first.record.definition("generator demand"), Some("on"));
        let last = results[2].as_ref().unwrap();
        assert_eq!(last.record.definition("generator demand"), Some("off"));
    }
}
