//! Cross-source status correlator
//!
//! Window-shade motors report their state over four independent DGNs, each
//! tagged with the driver's `driver_index`. The correlator keeps the latest
//! record of each stream per driver, rebuilds a composite status record after
//! every update and publishes it only when the composite actually changed.
//!
//! State is held in a [`DashMap`] keyed by `driver_index`. An update holds its
//! key's entry for the whole replace/recompute/compare sequence, so updates
//! for one driver are serialized while other drivers proceed.

use crate::config::{BridgeConfig, StatusStreams};
use crate::message_encoder::command_name;
use crate::types::{
    CodecError, DecodedRecord, Publication, RecordValue, Result, Timestamp,
};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::BTreeMap;

/// Instance value meaning "not yet assigned"
pub const UNASSIGNED_INSTANCE: u8 = 255;

/// Code for a two-bit status nobody has reported
const STATUS_UNAVAILABLE: i64 = 3;
/// Code for an unavailable duty cycle or duration
const VALUE_UNAVAILABLE: i64 = 255;
/// Last command inferred when no direction is known (stop)
const DEFAULT_LAST_COMMAND: u8 = 4;

/// The four correlated status streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusStream {
    Output,
    Fault,
    Motor,
    Info,
}

impl StatusStream {
    /// Identify a stream by record display name
    pub fn from_name(name: &str, streams: &StatusStreams) -> Option<Self> {
        if name == streams.output {
            Some(StatusStream::Output)
        } else if name == streams.fault {
            Some(StatusStream::Fault)
        } else if name == streams.motor {
            Some(StatusStream::Motor)
        } else if name == streams.info {
            Some(StatusStream::Info)
        } else {
            None
        }
    }
}

/// Per-driver state: last record of each stream plus the published baseline
#[derive(Debug, Default)]
struct DriverState {
    output: Option<DecodedRecord>,
    fault: Option<DecodedRecord>,
    motor: Option<DecodedRecord>,
    info: Option<DecodedRecord>,
    last_published: Option<String>,
}

impl DriverState {
    fn slot(&mut self, stream: StatusStream) -> &mut Option<DecodedRecord> {
        match stream {
            StatusStream::Output => &mut self.output,
            StatusStream::Fault => &mut self.fault,
            StatusStream::Motor => &mut self.motor,
            StatusStream::Info => &mut self.info,
        }
    }
}

/// Composite status codes before serialization
#[derive(Debug, Clone, PartialEq)]
struct Composite {
    instance: u8,
    motor_duty: RecordValue,
    lock_status: i64,
    motor_status: i64,
    forward_status: i64,
    reverse_status: i64,
    duration: RecordValue,
    last_command: u8,
    overcurrent_status: i64,
    override_status: i64,
}

impl Composite {
    fn unavailable(instance: u8) -> Self {
        Self {
            instance,
            motor_duty: RecordValue::Integer(VALUE_UNAVAILABLE),
            lock_status: STATUS_UNAVAILABLE,
            motor_status: STATUS_UNAVAILABLE,
            forward_status: STATUS_UNAVAILABLE,
            reverse_status: STATUS_UNAVAILABLE,
            duration: RecordValue::Integer(VALUE_UNAVAILABLE),
            last_command: DEFAULT_LAST_COMMAND,
            overcurrent_status: STATUS_UNAVAILABLE,
            override_status: STATUS_UNAVAILABLE,
        }
    }

    fn to_record(&self) -> DecodedRecord {
        let mut record = DecodedRecord::new();
        record.insert("instance", self.instance as i64);
        record.insert("motor duty", self.motor_duty.clone());
        insert_status(&mut record, "lock status", self.lock_status, "unlocked", "locked");
        insert_status(&mut record, "motor status", self.motor_status, "inactive", "active");
        insert_status(&mut record, "forward status", self.forward_status, "inactive", "active");
        insert_status(&mut record, "reverse status", self.reverse_status, "inactive", "active");
        record.insert("duration", self.duration.clone());
        record.insert("last command", self.last_command as i64);
        record.insert(
            "last command definition",
            command_name(self.last_command).unwrap_or("unknown"),
        );
        insert_status(
            &mut record,
            "overcurrent status",
            self.overcurrent_status,
            "not in overcurrent",
            "in overcurrent",
        );
        insert_status(&mut record, "override status", self.override_status, "inactive", "active");
        record
    }
}

fn insert_status(record: &mut DecodedRecord, name: &str, code: i64, zero: &str, one: &str) {
    let definition = match code {
        0 => zero,
        1 => one,
        _ => "unavailable",
    };
    record.insert(name, code);
    record.insert(format!("{} definition", name), definition);
}

/// Stateful joiner of the driver status streams
pub struct StatusCorrelator {
    config: BridgeConfig,
    state: DashMap<u8, DriverState>,
}

impl StatusCorrelator {
    /// Create a correlator with default stream names and namespace
    pub fn new() -> Self {
        Self::from_config(&BridgeConfig::default())
    }

    /// Create a correlator from bridge configuration
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            config: config.clone(),
            state: DashMap::new(),
        }
    }

    /// Number of drivers seen so far
    pub fn len(&self) -> usize {
        self.state.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Feed a decoded record, stamping any publication with the current time
    pub fn update(&self, record: &DecodedRecord) -> Result<Option<Publication>> {
        self.update_at(record, Utc::now())
    }

    /// Feed a decoded record
    ///
    /// Returns `Ok(None)` for records of other streams and for updates that
    /// leave the composite unchanged. A record without a valid
    /// `driver_index` is rejected and no state is touched.
    pub fn update_at(&self, record: &DecodedRecord, now: Timestamp) -> Result<Option<Publication>> {
        let stream = match record
            .name()
            .and_then(|name| StatusStream::from_name(name, &self.config.streams))
        {
            Some(stream) => stream,
            None => return Ok(None),
        };

        let key = driver_index(record)?;

        let mut state = self.state.entry(key).or_default();
        *state.slot(stream) = Some(record.clone());

        let composite = recompute(&state, key);
        if composite.instance == UNASSIGNED_INSTANCE {
            log::debug!("Driver {}: instance not assigned, not publishing", key);
            return Ok(None);
        }

        let mut body = composite.to_record();
        let snapshot = canonical_snapshot(&body);
        if state.last_published.as_deref() == Some(snapshot.as_str()) {
            log::trace!("Driver {}: composite unchanged", key);
            return Ok(None);
        }
        state.last_published = Some(snapshot);

        body.insert("timestamp", now.to_rfc3339());
        let topic = self.config.status_topic(composite.instance);
        log::debug!("Driver {}: publishing composite to {}", key, topic);
        Ok(Some(Publication::new(topic, body, self.config.retain_status)))
    }
}

impl Default for StatusCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

/// Extract and range-check the correlation key
fn driver_index(record: &DecodedRecord) -> Result<u8> {
    let value = record.get("driver_index").ok_or_else(|| {
        CodecError::MalformedCorrelationInput(format!(
            "{} record without driver_index",
            record.name().unwrap_or("unnamed")
        ))
    })?;

    value
        .as_i64()
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| {
            CodecError::MalformedCorrelationInput(format!("Invalid driver_index: {}", value))
        })
}

/// Build the composite from whatever streams have reported
fn recompute(state: &DriverState, key: u8) -> Composite {
    let mut composite = Composite::unavailable(key);

    if let Some(output) = &state.output {
        match output.definition("output state") {
            Some("on") => composite.motor_status = 1,
            Some("off") => composite.motor_status = 0,
            _ => {}
        }
    }

    if let Some(fault) = &state.fault {
        composite.overcurrent_status = match fault.definition("fault status") {
            Some("normal") => 0,
            Some("undercurrent condition") => 1,
            _ => STATUS_UNAVAILABLE,
        };
    }

    if let Some(motor) = &state.motor {
        composite.motor_duty = passthrough(motor.get("motor duty"));
        composite.duration = passthrough(motor.get("duration"));

        composite.lock_status = match motor.definition("lock status") {
            Some("unlocked") => 0,
            Some("locked") => 1,
            _ => STATUS_UNAVAILABLE,
        };

        let (forward, reverse, command) = match motor.definition("direction") {
            Some("forward") => (1, 0, 129),
            Some("reverse") => (0, 1, 65),
            Some("toggle forward") => (1, 0, 133),
            Some("toggle reverse") => (0, 1, 69),
            Some("not active") => (0, 0, DEFAULT_LAST_COMMAND),
            _ => (STATUS_UNAVAILABLE, STATUS_UNAVAILABLE, DEFAULT_LAST_COMMAND),
        };
        composite.forward_status = forward;
        composite.reverse_status = reverse;
        composite.last_command = command;

        composite.override_status = match motor.definition("override status") {
            Some("inactive") => 0,
            Some("active") => 1,
            _ => STATUS_UNAVAILABLE,
        };
    }

    let declared = [&state.motor, &state.output, &state.info, &state.fault]
        .into_iter()
        .flatten()
        .filter_map(|record| record.instance())
        .filter_map(|instance| u8::try_from(instance).ok())
        .find(|instance| *instance != UNASSIGNED_INSTANCE);
    if let Some(instance) = declared {
        composite.instance = instance;
    }

    composite
}

/// Duty and duration pass through; "n/a" or a missing field becomes 255
fn passthrough(value: Option<&RecordValue>) -> RecordValue {
    match value {
        Some(RecordValue::NotAvailable) | None => RecordValue::Integer(VALUE_UNAVAILABLE),
        Some(value) => value.clone(),
    }
}

/// Sorted-key JSON of a composite, used for change detection
fn canonical_snapshot(record: &DecodedRecord) -> String {
    let sorted: BTreeMap<&str, &RecordValue> =
        record.iter().map(|(k, v)| (k.as_str(), v)).collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Dgn;
    use chrono::TimeZone;

    fn record(name: &str, fields: &[(&str, RecordValue)]) -> DecodedRecord {
        let mut record = DecodedRecord::with_header(Dgn::new(0x1FE82).unwrap(), &[0; 8], name);
        for (key, value) in fields {
            record.insert(*key, value.clone());
        }
        record
    }

    fn motor(driver: i64, instance: i64, direction: &str) -> DecodedRecord {
        record(
            "DC_MOTOR_DRIVER_STATUS",
            &[
                ("driver_index", driver.into()),
                ("instance", instance.into()),
                ("motor duty", RecordValue::Float(100.0)),
                ("lock status definition", "unlocked".into()),
                ("direction definition", direction.into()),
                ("duration", RecordValue::NotAvailable),
                ("override status definition", "inactive".into()),
            ],
        )
    }

    fn at(seconds: i64) -> Timestamp {
        Utc.timestamp_opt(seconds, 0).unwrap()
    }

    #[test]
    fn test_unrelated_records_ignored() {
        let correlator = StatusCorrelator::new();
        let other = record("DC_DIMMER_STATUS_3", &[("instance", 1i64.into())]);
        assert!(correlator.update(&other).unwrap().is_none());
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_missing_driver_index() {
        let correlator = StatusCorrelator::new();
        let bad = record("DC_MOTOR_DRIVER_STATUS", &[("instance", 1i64.into())]);
        assert!(matches!(
            correlator.update(&bad),
            Err(CodecError::MalformedCorrelationInput(_))
        ));

        let text = record("DC_MOTOR_DRIVER_STATUS", &[("driver_index", "one".into())]);
        assert!(correlator.update(&text).is_err());
        assert!(correlator.is_empty());
    }

    #[test]
    fn test_defaults_for_missing_streams() {
        let correlator = StatusCorrelator::new();
        let output = record(
            "DC_DRIVER_OUTPUT_STATUS",
            &[
                ("driver_index", 2i64.into()),
                ("instance", 5i64.into()),
                ("output state definition", "on".into()),
            ],
        );
        let publication = correlator.update_at(&output, at(0)).unwrap().unwrap();
        assert_eq!(publication.topic, "RVC/WINDOW_SHADE_CONTROL_STATUS/5");
        assert!(publication.retain);

        let body = &publication.record;
        assert_eq!(body.instance(), Some(5));
        assert_eq!(body.get("motor status"), Some(&RecordValue::Integer(1)));
        assert_eq!(body.definition("motor status"), Some("active"));
        assert_eq!(body.get("motor duty"), Some(&RecordValue::Integer(255)));
        assert_eq!(body.get("duration"), Some(&RecordValue::Integer(255)));
        assert_eq!(body.get("lock status"), Some(&RecordValue::Integer(3)));
        assert_eq!(body.definition("lock status"), Some("unavailable"));
        assert_eq!(body.get("last command"), Some(&RecordValue::Integer(4)));
        assert_eq!(body.definition("last command"), Some("stop"));
        assert_eq!(body.get("overcurrent status"), Some(&RecordValue::Integer(3)));
        assert_eq!(
            body.get("timestamp"),
            Some(&RecordValue::from("1970-01-01T00:00:00+00:00"))
        );
    }

    #[test]
    fn test_motor_direction_mapping() {
        let correlator = StatusCorrelator::new();
        let publication = correlator
            .update_at(&motor(1, 7, "toggle reverse"), at(0))
            .unwrap()
            .unwrap();
        let body = &publication.record;
        assert_eq!(body.get("forward status"), Some(&RecordValue::Integer(0)));
        assert_eq!(body.get("reverse status"), Some(&RecordValue::Integer(1)));
        assert_eq!(body.get("last command"), Some(&RecordValue::Integer(69)));
        assert_eq!(body.get("motor duty"), Some(&RecordValue::Float(100.0)));
        assert_eq!(body.get("duration"), Some(&RecordValue::Integer(255)));
        assert_eq!(body.get("lock status"), Some(&RecordValue::Integer(0)));
        assert_eq!(body.get("override status"), Some(&RecordValue::Integer(0)));
    }

    #[test]
    fn test_change_detection() {
        let correlator = StatusCorrelator::new();
        assert!(correlator.update_at(&motor(1, 7, "forward"), at(0)).unwrap().is_some());
        assert!(correlator.update_at(&motor(1, 7, "forward"), at(1)).unwrap().is_none());

        let changed = correlator.update_at(&motor(1, 7, "reverse"), at(2)).unwrap();
        assert!(changed.is_some());
        assert!(correlator.update_at(&motor(1, 7, "reverse"), at(3)).unwrap().is_none());
    }

    #[test]
    fn test_instance_fallback_and_unassigned() {
        let correlator = StatusCorrelator::new();

        // Declared instance 255 falls back to the key
        let publication = correlator
            .update_at(&motor(4, 255, "forward"), at(0))
            .unwrap()
            .unwrap();
        assert_eq!(publication.topic, "RVC/WINDOW_SHADE_CONTROL_STATUS/4");

        // Key 255 with no declared instance never publishes
        let unassigned = record(
            "DC_DRIVER_FAULT_STATUS",
            &[
                ("driver_index", 255i64.into()),
                ("fault status definition", "normal".into()),
            ],
        );
        assert!(correlator.update_at(&unassigned, at(0)).unwrap().is_none());
    }

    #[test]
    fn test_fault_mapping() {
        let correlator = StatusCorrelator::new();
        let fault = record(
            "DC_DRIVER_FAULT_STATUS",
            &[
                ("driver_index", 3i64.into()),
                ("fault status definition", "undercurrent condition".into()),
            ],
        );
        let publication = correlator.update_at(&fault, at(0)).unwrap().unwrap();
        assert_eq!(
            publication.record.get("overcurrent status"),
            Some(&RecordValue::Integer(1))
        );
        assert_eq!(
            publication.record.definition("overcurrent status"),
            Some("in overcurrent")
        );
    }

    #[test]
    fn test_custom_streams_and_namespace() {
        let config = BridgeConfig::new()
            .with_status_namespace("HOME/SHADES")
            .with_retain_status(false)
            .with_streams(StatusStreams {
                motor: "SHADE_MOTOR".to_string(),
                ..StatusStreams::default()
            });
        let correlator = StatusCorrelator::from_config(&config);

        let mut renamed = motor(1, 2, "forward");
        renamed.insert("name", "SHADE_MOTOR");
        let publication = correlator.update_at(&renamed, at(0)).unwrap().unwrap();
        assert_eq!(publication.topic, "HOME/SHADES/2");
        assert!(!publication.retain);

        assert!(correlator.update_at(&motor(1, 2, "forward"), at(0)).unwrap().is_none());
    }
}
