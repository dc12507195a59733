//! Bridge configuration types
//!
//! This module defines the configuration the library needs to turn decoded
//! records into publications: topic namespaces, the status streams the
//! correlator joins, and an optional DGN filter. Transport settings live in
//! the application layer.

use crate::types::{DecodedRecord, Dgn};
use serde::{Deserialize, Serialize};

/// Configuration for topic composition and status correlation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Namespace for decoded records: `<namespace>/<name>[/<instance>]`
    #[serde(default = "default_topic_namespace")]
    pub topic_namespace: String,

    /// Namespace for composite status records: `<namespace>/<instance>`
    #[serde(default = "default_status_namespace")]
    pub status_namespace: String,

    /// Whether composite status records are published retained
    #[serde(default = "default_true")]
    pub retain_status: bool,

    /// Whether Celsius fields get a `"<name> F"` mirror
    #[serde(default = "default_true")]
    pub fahrenheit: bool,

    /// Display names of the correlated status streams
    #[serde(default)]
    pub streams: StatusStreams,

    /// Optional: only process these DGNs
    #[serde(default)]
    pub dgn_filter: Option<Vec<Dgn>>,
}

fn default_topic_namespace() -> String {
    "RVC".to_string()
}

fn default_status_namespace() -> String {
    "RVC/WINDOW_SHADE_CONTROL_STATUS".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            topic_namespace: default_topic_namespace(),
            status_namespace: default_status_namespace(),
            retain_status: true,
            fahrenheit: true,
            streams: StatusStreams::default(),
            dgn_filter: None,
        }
    }
}

/// Display names of the four streams joined by the status correlator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusStreams {
    /// Driver output on/off state
    pub output: String,
    /// Driver fault / undercurrent state
    pub fault: String,
    /// Motor duty, lock, direction and override state
    pub motor: String,
    /// Driver information
    pub info: String,
}

impl Default for StatusStreams {
    fn default() -> Self {
        Self {
            output: "DC_DRIVER_OUTPUT_STATUS".to_string(),
            fault: "DC_DRIVER_FAULT_STATUS".to_string(),
            motor: "DC_MOTOR_DRIVER_STATUS".to_string(),
            info: "DC_DRIVER_INFO_STATUS".to_string(),
        }
    }
}

impl BridgeConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the decoded record namespace
    pub fn with_topic_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.topic_namespace = namespace.into();
        self
    }

    /// Builder method: set the composite status namespace
    pub fn with_status_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.status_namespace = namespace.into();
        self
    }

    /// Builder method: publish composite records retained or not
    pub fn with_retain_status(mut self, retain: bool) -> Self {
        self.retain_status = retain;
        self
    }

    /// Builder method: enable or disable Fahrenheit mirrors
    pub fn with_fahrenheit(mut self, enabled: bool) -> Self {
        self.fahrenheit = enabled;
        self
    }

    /// Builder method: set the correlated stream names
    pub fn with_streams(mut self, streams: StatusStreams) -> Self {
        self.streams = streams;
        self
    }

    /// Builder method: set DGN filter
    pub fn with_dgn_filter(mut self, dgns: Vec<Dgn>) -> Self {
        self.dgn_filter = Some(dgns);
        self
    }

    /// Check if a DGN should be processed
    pub fn should_process_dgn(&self, dgn: Dgn) -> bool {
        match &self.dgn_filter {
            Some(dgns) => dgns.contains(&dgn),
            None => true,
        }
    }

    /// Topic for a decoded record
    pub fn record_topic(&self, record: &DecodedRecord) -> String {
        let name = record.name().unwrap_or("UNKNOWN");
        match record.instance() {
            Some(instance) => format!("{}/{}/{}", self.topic_namespace, name, instance),
            None => format!("{}/{}", self.topic_namespace, name),
        }
    }

    /// Topic for a composite status record
    pub fn status_topic(&self, instance: u8) -> String {
        format!("{}/{}", self.status_namespace, instance)
    }
}
