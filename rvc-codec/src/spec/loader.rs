//! Specification document loader
//!
//! Parses the JSON specification document (DGN key → decoder definition) and
//! converts it into a `SpecTable`. Every integrity problem found here stops
//! the load: duplicate DGN keys, unknown or cyclic aliases, unknown types and
//! units, unit/width pairs without a defined conversion, and overlapping
//! field regions.

use crate::spec::table::{
    DataType, DecoderDefinition, FieldDefinition, Span, SpecTable, ValueTable,
};
use crate::types::{CodecError, Dgn, Result};
use crate::units::{Conversion, Unit};
use serde::de::{self, Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

/// Specification document bundled with the library
const BUNDLED_SPEC: &str = include_str!("../../data/rvc-spec.json");

/// Load and validate a specification document from disk
pub fn load_spec_file(path: &Path) -> Result<SpecTable> {
    log::info!("Loading specification document: {:?}", path);

    let content = std::fs::read_to_string(path)?;
    let table = parse_spec_str(&content)?;

    log::info!(
        "Loaded {} decoder definitions from {:?}",
        table.len(),
        path
    );
    Ok(table)
}

/// Parse and validate a specification document held in memory
pub fn parse_spec_str(content: &str) -> Result<SpecTable> {
    let document: SpecDocument = serde_json::from_str(content).map_err(|e| {
        CodecError::SpecIntegrityDefect(format!("Failed to parse specification document: {}", e))
    })?;
    build_table(document)
}

/// The specification document bundled with the library
pub fn bundled_spec() -> Result<SpecTable> {
    parse_spec_str(BUNDLED_SPEC)
}

/// Raw document: entries in document order, duplicates rejected while reading
#[derive(Debug)]
struct SpecDocument {
    entries: Vec<(String, RawDefinition)>,
}

impl<'de> Deserialize<'de> for SpecDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = SpecDocument;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of DGN keys to decoder definitions")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<Self::Value, A::Error> {
                let mut seen = HashSet::new();
                let mut entries = Vec::new();

                while let Some((key, definition)) = map.next_entry::<String, RawDefinition>()? {
                    // Keys are compared by numeric value so "1feda" and "1FEDA" collide.
                    let normalized = u32::from_str_radix(key.trim(), 16)
                        .map(|v| format!("{:05X}", v))
                        .unwrap_or_else(|_| key.clone());
                    if !seen.insert(normalized) {
                        return Err(de::Error::custom(format!("duplicate DGN key {:?}", key)));
                    }
                    entries.push((key, definition));
                }

                Ok(SpecDocument { entries })
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    name: String,
    #[serde(default)]
    alias: Option<String>,
    #[serde(default)]
    range: Option<[RawNumber; 2]>,
    #[serde(default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawField {
    name: String,
    byte: RawNumber,
    #[serde(default)]
    bit: Option<RawNumber>,
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    unit: Option<String>,
    #[serde(default)]
    values: Option<indexmap::IndexMap<String, String>>,
}

/// A number written either as a JSON integer or as text (`"2-3"`, `"0EF00"`)
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Int(u64),
    Text(String),
}

impl RawNumber {
    fn to_span(&self) -> Result<Span> {
        match self {
            RawNumber::Int(v) => Ok(Span::single(*v as usize)),
            RawNumber::Text(s) => s.parse(),
        }
    }

    fn to_dgn_value(&self) -> Result<u32> {
        let parsed = match self {
            RawNumber::Int(v) => u32::try_from(*v)
                .map_err(|_| CodecError::InvalidPayload(format!("{} exceeds 32 bits", v)))
                .and_then(Dgn::new),
            RawNumber::Text(s) => s.parse::<Dgn>(),
        };
        parsed
            .map(Dgn::value)
            .map_err(|_| CodecError::SpecIntegrityDefect(format!("Invalid DGN bound: {:?}", self)))
    }
}

/// Resolve aliases and field types, then build the table
fn build_table(document: SpecDocument) -> Result<SpecTable> {
    let mut raw: HashMap<Dgn, RawDefinition> = HashMap::new();
    let mut order = Vec::with_capacity(document.entries.len());

    for (key, definition) in document.entries {
        let dgn: Dgn = key
            .parse()
            .map_err(|_| CodecError::SpecIntegrityDefect(format!("Invalid DGN key: {:?}", key)))?;
        order.push(dgn);
        raw.insert(dgn, definition);
    }

    let mut resolved: HashMap<Dgn, Vec<FieldDefinition>> = HashMap::new();
    let mut definitions = Vec::with_capacity(order.len());

    for dgn in &order {
        let fields = resolve_fields(*dgn, &raw, &mut resolved, &mut Vec::new())?;
        let entry = &raw[dgn];

        let alias = entry
            .alias
            .as_deref()
            .map(str::parse::<Dgn>)
            .transpose()?;

        let range = match &entry.range {
            Some([start, end]) => {
                let (start, end) = (start.to_dgn_value()?, end.to_dgn_value()?);
                if end < start {
                    return Err(CodecError::SpecIntegrityDefect(format!(
                        "{}: range end {:05X} before start {:05X}",
                        dgn, end, start
                    )));
                }
                Some((start, end))
            }
            None => None,
        };

        definitions.push(DecoderDefinition {
            dgn: *dgn,
            name: entry.name.clone(),
            alias,
            range,
            fields,
        });
    }

    SpecTable::from_definitions(definitions)
}

/// Effective field list of `dgn`, following aliases depth-first
fn resolve_fields(
    dgn: Dgn,
    raw: &HashMap<Dgn, RawDefinition>,
    resolved: &mut HashMap<Dgn, Vec<FieldDefinition>>,
    visiting: &mut Vec<Dgn>,
) -> Result<Vec<FieldDefinition>> {
    if let Some(fields) = resolved.get(&dgn) {
        return Ok(fields.clone());
    }
    if visiting.contains(&dgn) {
        return Err(CodecError::SpecIntegrityDefect(format!(
            "Alias cycle through {}",
            dgn
        )));
    }

    let entry = raw.get(&dgn).ok_or_else(|| {
        CodecError::SpecIntegrityDefect(format!("Alias refers to unknown DGN {}", dgn))
    })?;

    visiting.push(dgn);
    let mut fields = match &entry.alias {
        Some(alias) => {
            let alias: Dgn = alias.parse().map_err(|_| {
                CodecError::SpecIntegrityDefect(format!("{}: invalid alias {:?}", dgn, alias))
            })?;
            resolve_fields(alias, raw, resolved, visiting)?
        }
        None => Vec::new(),
    };
    visiting.pop();

    for raw_field in &entry.fields {
        fields.push(convert_field(dgn, raw_field)?);
    }

    resolved.insert(dgn, fields.clone());
    Ok(fields)
}

/// Convert one raw field into its typed definition
fn convert_field(dgn: Dgn, raw: &RawField) -> Result<FieldDefinition> {
    let context = |msg: String| {
        CodecError::SpecIntegrityDefect(format!("{} field '{}': {}", dgn, raw.name, msg))
    };

    let bytes = raw.byte.to_span().map_err(|e| context(e.to_string()))?;
    let bits = raw
        .bit
        .as_ref()
        .map(RawNumber::to_span)
        .transpose()
        .map_err(|e| context(e.to_string()))?;
    if let Some(bits) = bits {
        if bits.end > 7 {
            return Err(context(format!("bit range {}-{} exceeds a byte", bits.start, bits.end)));
        }
    }

    let data_type: DataType = raw.data_type.parse().map_err(|e: CodecError| context(e.to_string()))?;

    let conversion = match &raw.unit {
        Some(unit) => {
            let unit: Unit = unit.parse().map_err(|e: CodecError| context(e.to_string()))?;
            let conversion = Conversion::resolve(unit, data_type.width_bits()).ok_or_else(|| {
                context(format!("unit {} is not defined for {}", unit, data_type))
            })?;
            Some(conversion)
        }
        None => None,
    };

    let values = raw.values.as_ref().map(|values| {
        ValueTable::new(
            values
                .iter()
                .map(|(code, definition)| (code.clone(), definition.clone()))
                .collect(),
        )
    });

    Ok(FieldDefinition {
        name: raw.name.clone(),
        bytes,
        bits,
        data_type,
        conversion,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SMALL_SPEC: &str = r#"{
        "1FFE2": {
            "name": "THERMOSTAT_STATUS_1",
            "fields": [
                { "name": "instance", "byte": 0, "type": "uint8" },
                { "name": "operating mode", "byte": 1, "bit": "0-3", "type": "bit4",
                  "values": { "0000": "off", "0001": "cool" } },
                { "name": "setpoint temp heat", "byte": "3-4", "type": "uint16", "unit": "deg c" }
            ]
        },
        "1FEF9": { "name": "THERMOSTAT_COMMAND_1", "alias": "1FFE2",
                   "fields": [ { "name": "extra", "byte": 7, "type": "uint8" } ] },
        "0EF00": { "name": "PROPRIETARY_DGN", "range": ["0EF00", "0EFFF"] }
    }"#;

    #[test]
    fn test_parse_small_spec() {
        let table = parse_spec_str(SMALL_SPEC).unwrap();
        assert_eq!(table.len(), 3);

        let status = table.get("1FFE2".parse().unwrap()).unwrap();
        assert_eq!(status.fields.len(), 3);
        assert_eq!(status.fields[1].bits, Some(Span { start: 0, end: 3 }));
        assert_eq!(status.fields[2].conversion, Some(Conversion::Celsius16));

        let command = table.get("1FEF9".parse().unwrap()).unwrap();
        let names: Vec<_> = command.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["instance", "operating mode", "setpoint temp heat", "extra"]
        );

        let ranged = table.resolve("0EF42".parse().unwrap()).unwrap();
        assert_eq!(ranged.name, "PROPRIETARY_DGN");
    }

    #[test]
    fn test_duplicate_keys_rejected() {
        let doc = r#"{
            "1FEDA": { "name": "A" },
            "1feda": { "name": "B" }
        }"#;
        let err = parse_spec_str(doc).unwrap_err();
        assert!(matches!(err, CodecError::SpecIntegrityDefect(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn test_unknown_alias_rejected() {
        let doc = r#"{ "1FEF9": { "name": "A", "alias": "1FFE2" } }"#;
        assert!(matches!(
            parse_spec_str(doc),
            Err(CodecError::SpecIntegrityDefect(_))
        ));
    }

    #[test]
    fn test_alias_cycle_rejected() {
        let doc = r#"{
            "1FEF9": { "name": "A", "alias": "1FFE2" },
            "1FFE2": { "name": "B", "alias": "1FEF9" }
        }"#;
        let err = parse_spec_str(doc).unwrap_err();
        assert!(matches!(err, CodecError::SpecIntegrityDefect(ref m) if m.contains("cycle")));
    }

    #[test]
    fn test_undefined_unit_width_rejected() {
        let doc = r#"{ "1FFFD": { "name": "A", "fields": [
            { "name": "x", "byte": "0-1", "type": "uint16", "unit": "pct" } ] } }"#;
        assert!(matches!(
            parse_spec_str(doc),
            Err(CodecError::SpecIntegrityDefect(_))
        ));
    }

    #[test]
    fn test_bit_range_past_byte_rejected() {
        let doc = r#"{ "1FFFD": { "name": "A", "fields": [
            { "name": "x", "byte": 0, "bit": "6-8", "type": "bit2" } ] } }"#;
        assert!(parse_spec_str(doc).is_err());
    }

    #[test]
    fn test_alias_overlap_rejected() {
        let doc = r#"{
            "1FFE2": { "name": "A", "fields": [ { "name": "x", "byte": 0, "type": "uint8" } ] },
            "1FEF9": { "name": "B", "alias": "1FFE2",
                       "fields": [ { "name": "y", "byte": 0, "type": "uint8" } ] }
        }"#;
        assert!(matches!(
            parse_spec_str(doc),
            Err(CodecError::SpecIntegrityDefect(_))
        ));
    }

    #[test]
    fn test_load_spec_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SMALL_SPEC.as_bytes()).unwrap();

        let table = load_spec_file(file.path()).unwrap();
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_spec_file(Path::new("/nonexistent/rvc-spec.json"));
        assert!(matches!(result, Err(CodecError::IoError(_))));
    }

    #[test]
    fn test_bundled_spec_loads() {
        let table = bundled_spec().unwrap();
        assert!(table.len() > 10);
        assert!(table.get_by_name("DC_DIMMER_STATUS_3").is_some());
        assert!(table.stats().num_pending >= 1);
    }
}
