//! Core types for the RV-C codec library
//!
//! This module defines the fundamental types that flow through the codec: the
//! DGN identifier, decoded records, typed encode input, and the error taxonomy.
//! The codec itself is stateless; a decoded record is built fresh for every
//! frame and handed to the caller.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Timestamp type used throughout the codec
pub type Timestamp = DateTime<Utc>;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Literal published for values the protocol marks as "not available"
pub const NOT_AVAILABLE: &str = "n/a";

/// Errors that can occur while loading, decoding, encoding or correlating
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Specification integrity defect: {0}")]
    SpecIntegrityDefect(String),

    #[error("Malformed correlation input: {0}")]
    MalformedCorrelationInput(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// RV-C Data Group Number
///
/// Displayed and parsed as five uppercase hex digits (e.g. `1FEDA`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Dgn(u32);

impl Dgn {
    /// Largest DGN that fits the 18-bit identifier field
    pub const MAX: u32 = 0x3FFFF;

    /// Create a DGN from its numeric value
    pub fn new(value: u32) -> Result<Self> {
        if value > Self::MAX {
            return Err(CodecError::InvalidPayload(format!(
                "DGN 0x{:X} exceeds 18 bits",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Numeric value of the DGN
    pub fn value(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Dgn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:05X}", self.0)
    }
}

impl FromStr for Dgn {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        let value = u32::from_str_radix(trimmed, 16)
            .map_err(|_| CodecError::InvalidPayload(format!("Invalid DGN: {:?}", s)))?;
        Self::new(value)
    }
}

impl Serialize for Dgn {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Dgn {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a hex payload string into bytes
///
/// Whitespace is ignored. Payloads shorter than 8 bytes are zero-padded so
/// every field of a standard frame can be read.
pub fn parse_payload_hex(hex: &str) -> Result<Vec<u8>> {
    let digits: String = hex.chars().filter(|c| !c.is_whitespace()).collect();
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(CodecError::InvalidPayload(format!(
            "Invalid hex in payload: {:?}",
            hex
        )));
    }
    if digits.len() % 2 != 0 {
        return Err(CodecError::InvalidPayload(format!(
            "Odd number of hex digits in payload: {:?}",
            hex
        )));
    }

    let mut bytes = Vec::with_capacity(8);
    for i in (0..digits.len()).step_by(2) {
        let byte = u8::from_str_radix(&digits[i..i + 2], 16).map_err(|_| {
            CodecError::InvalidPayload(format!("Invalid hex in payload: {:?}", hex))
        })?;
        bytes.push(byte);
    }

    if bytes.len() > 8 {
        return Err(CodecError::InvalidPayload(format!(
            "Payload longer than 8 bytes: {:?}",
            hex
        )));
    }
    bytes.resize(8, 0x00);
    Ok(bytes)
}

/// Render payload bytes as uppercase hex without separators
pub fn format_payload_hex(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect()
}

/// A single value inside a decoded or composite record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordValue {
    /// Unsigned or signed integer value
    Integer(i64),
    /// Engineering value after scaling
    Float(f64),
    /// Text (definitions, binary renderings, identifiers)
    Text(String),
    /// The protocol's "not available" sentinel
    NotAvailable,
}

impl RecordValue {
    /// Integer view of the value, if it has one
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            RecordValue::Integer(v) => Some(*v),
            RecordValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    /// Text view of the value, if it is text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RecordValue::Text(s) => Some(s),
            RecordValue::NotAvailable => Some(NOT_AVAILABLE),
            _ => None,
        }
    }

    /// True if this is the "not available" marker
    pub fn is_not_available(&self) -> bool {
        matches!(self, RecordValue::NotAvailable)
    }
}

impl fmt::Display for RecordValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordValue::Integer(v) => write!(f, "{}", v),
            RecordValue::Float(v) => write!(f, "{}", v),
            RecordValue::Text(s) => write!(f, "{}", s),
            RecordValue::NotAvailable => write!(f, "{}", NOT_AVAILABLE),
        }
    }
}

impl Serialize for RecordValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            RecordValue::Integer(v) => serializer.serialize_i64(*v),
            RecordValue::Float(v) => serializer.serialize_f64(*v),
            RecordValue::Text(s) => serializer.serialize_str(s),
            RecordValue::NotAvailable => serializer.serialize_str(NOT_AVAILABLE),
        }
    }
}

impl From<i64> for RecordValue {
    fn from(v: i64) -> Self {
        RecordValue::Integer(v)
    }
}

impl From<&str> for RecordValue {
    fn from(v: &str) -> Self {
        RecordValue::Text(v.to_string())
    }
}

impl From<String> for RecordValue {
    fn from(v: String) -> Self {
        RecordValue::Text(v)
    }
}

/// Decoded record - the primary output of the codec
///
/// An insertion-ordered flat mapping from key to value. Decoded frames always
/// start with `dgn`, `data` and `name`; composite records start with
/// `instance`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DecodedRecord {
    entries: IndexMap<String, RecordValue>,
}

impl DecodedRecord {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the header every decoded frame carries
    pub fn with_header(dgn: Dgn, data: &[u8], name: &str) -> Self {
        let mut record = Self::new();
        record.insert("dgn", dgn.to_string());
        record.insert("data", format_payload_hex(data));
        record.insert("name", name);
        record
    }

    /// Insert or replace a value, keeping the original position on replace
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<RecordValue>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<&RecordValue> {
        self.entries.get(key)
    }

    /// Remove a value by key
    pub fn remove(&mut self, key: &str) -> Option<RecordValue> {
        self.entries.shift_remove(key)
    }

    /// True if the key is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &RecordValue)> {
        self.entries.iter()
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the record has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display name of the decoded message (`name` entry)
    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(RecordValue::as_str)
    }

    /// Instance number carried by the record, if any
    pub fn instance(&self) -> Option<i64> {
        self.get("instance").and_then(RecordValue::as_i64)
    }

    /// Definition text written next to a field with a value table
    pub fn definition(&self, field: &str) -> Option<&str> {
        self.get(&format!("{} definition", field))
            .and_then(RecordValue::as_str)
    }

    /// Serialize the record as a flat JSON object
    pub fn to_json(&self) -> String {
        // Only strings, integers and finite floats are stored, which always serialize.
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A record ready to hand to the pub/sub client
#[derive(Debug, Clone, PartialEq)]
pub struct Publication {
    /// Topic path, e.g. `RVC/DC_DIMMER_STATUS_3/1`
    pub topic: String,
    /// Record body, serialized as a flat JSON object
    pub record: DecodedRecord,
    /// Whether the broker should keep the last value for late subscribers
    pub retain: bool,
}

impl Publication {
    pub fn new(topic: impl Into<String>, record: DecodedRecord, retain: bool) -> Self {
        Self {
            topic: topic.into(),
            record,
            retain,
        }
    }

    /// Payload text for the broker
    pub fn payload(&self) -> String {
        self.record.to_json()
    }
}

/// A typed value supplied for one field of an encode request
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    /// Whole number
    Integer(i64),
    /// Number with a fractional part
    Decimal(f64),
    /// Text: a value-table definition, a command name or numeric text
    Text(String),
}

impl InputValue {
    /// True if the input is the literal "not available" marker
    pub fn is_not_available(&self) -> bool {
        matches!(self, InputValue::Text(s) if s.trim().eq_ignore_ascii_case(NOT_AVAILABLE))
    }

    /// Numeric view, parsing numeric text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            InputValue::Integer(v) => Some(*v as f64),
            InputValue::Decimal(v) => Some(*v),
            InputValue::Text(s) => s.trim().parse::<f64>().ok(),
        }
    }

    /// Convert a JSON value into an input value
    pub fn from_json(key: &str, value: &serde_json::Value) -> Result<Self> {
        match value {
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Ok(InputValue::Integer(i))
                } else if let Some(f) = n.as_f64() {
                    Ok(InputValue::Decimal(f))
                } else {
                    Err(CodecError::InvalidPayload(format!(
                        "Field '{}' has an unrepresentable number: {}",
                        key, n
                    )))
                }
            }
            serde_json::Value::String(s) => Ok(InputValue::Text(s.clone())),
            other => Err(CodecError::InvalidPayload(format!(
                "Field '{}' must be a number or string, got {}",
                key, other
            ))),
        }
    }
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Integer(v) => write!(f, "{}", v),
            InputValue::Decimal(v) => write!(f, "{}", v),
            InputValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for InputValue {
    fn from(v: i64) -> Self {
        InputValue::Integer(v)
    }
}

impl From<f64> for InputValue {
    fn from(v: f64) -> Self {
        InputValue::Decimal(v)
    }
}

impl From<&str> for InputValue {
    fn from(v: &str) -> Self {
        InputValue::Text(v.to_string())
    }
}

/// Named field values for an encode request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldInput {
    values: IndexMap<String, InputValue>,
}

impl FieldInput {
    /// Create an empty input
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: add a field value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Insert a field value
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<InputValue>) {
        self.values.insert(name.into(), value.into());
    }

    /// Parse a JSON object command body (e.g. `{"instance": 1, "command": "on"}`)
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(json)
            .map_err(|e| CodecError::InvalidPayload(format!("Malformed JSON: {}", e)))?;

        let object = value.as_object().ok_or_else(|| {
            CodecError::InvalidPayload(format!("Expected a JSON object, got {}", value))
        })?;

        let mut input = Self::new();
        for (key, value) in object {
            input.insert(key.clone(), InputValue::from_json(key, value)?);
        }
        Ok(input)
    }

    /// Case-insensitive lookup by field name
    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.values
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Number of supplied fields
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if no fields were supplied
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
