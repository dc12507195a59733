//! Configuration loading and parsing

use anyhow::{Context, Result};
use rvc_codec::{BridgeConfig, Dgn, StatusStreams};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from bridge.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub spec: SpecConfig,
    #[serde(default)]
    pub topics: TopicsConfig,
    #[serde(default)]
    pub can: CanConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SpecConfig {
    /// Specification document; the bundled one is used when absent
    pub file: Option<PathBuf>,
    #[serde(default = "default_true")]
    pub fahrenheit: bool,
}

impl Default for SpecConfig {
    fn default() -> Self {
        Self {
            file: None,
            fahrenheit: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TopicsConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_status_namespace")]
    pub status_namespace: String,
    #[serde(default = "default_true")]
    pub retain_status: bool,
    #[serde(default)]
    pub streams: StatusStreams,
    pub dgn_filter: Option<Vec<Dgn>>,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        let defaults = BridgeConfig::default();
        Self {
            namespace: defaults.topic_namespace,
            status_namespace: defaults.status_namespace,
            retain_status: defaults.retain_status,
            streams: defaults.streams,
            dgn_filter: None,
        }
    }
}

/// Addressing used when composing outbound frames
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CanConfig {
    #[serde(default = "default_interface")]
    pub interface: String,
    #[serde(default = "default_priority")]
    pub priority: u8,
    #[serde(default = "default_source_address")]
    pub source_address: u8,
}

impl Default for CanConfig {
    fn default() -> Self {
        Self {
            interface: default_interface(),
            priority: default_priority(),
            source_address: default_source_address(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_namespace() -> String {
    BridgeConfig::default().topic_namespace
}

fn default_status_namespace() -> String {
    BridgeConfig::default().status_namespace
}

fn default_interface() -> String {
    "can0".to_string()
}

fn default_priority() -> u8 {
    rvc_codec::CanId::DEFAULT_PRIORITY
}

fn default_source_address() -> u8 {
    0x9C
}

impl AppConfig {
    /// Library configuration for topic composition and correlation
    pub fn bridge_config(&self) -> BridgeConfig {
        let mut config = BridgeConfig::new()
            .with_topic_namespace(self.topics.namespace.clone())
            .with_status_namespace(self.topics.status_namespace.clone())
            .with_retain_status(self.topics.retain_status)
            .with_fahrenheit(self.spec.fahrenheit)
            .with_streams(self.topics.streams.clone());
        if let Some(dgns) = &self.topics.dgn_filter {
            config = config.with_dgn_filter(dgns.clone());
        }
        config
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    if config.can.priority > 7 {
        anyhow::bail!("CAN priority {} exceeds 3 bits", config.can.priority);
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [spec]
            file = "rvc-spec.json"
            fahrenheit = false

            [topics]
            namespace = "HOME/RVC"
            dgn_filter = ["1FEDA", "1FE82"]

            [topics.streams]
            info = "DRIVER_INFO"

            [can]
            priority = 3
            source_address = 153
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.spec.file, Some(PathBuf::from("rvc-spec.json")));
        assert_eq!(config.can.priority, 3);
        assert_eq!(config.can.source_address, 0x99);
        assert_eq!(config.can.interface, "can0");

        let bridge = config.bridge_config();
        assert_eq!(bridge.topic_namespace, "HOME/RVC");
        assert_eq!(bridge.status_namespace, "RVC/WINDOW_SHADE_CONTROL_STATUS");
        assert!(!bridge.fahrenheit);
        assert_eq!(bridge.streams.info, "DRIVER_INFO");
        assert_eq!(bridge.streams.motor, "DC_MOTOR_DRIVER_STATUS");
        assert!(bridge.should_process_dgn("1FE82".parse().unwrap()));
        assert!(!bridge.should_process_dgn("1FFB2".parse().unwrap()));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert!(config.spec.file.is_none());
        assert!(config.spec.fahrenheit);
        assert_eq!(config.can.priority, 6);
        assert_eq!(config.bridge_config(), BridgeConfig::default());
    }

    #[test]
    fn test_load_config_rejects_bad_priority() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[can]\npriority = 9").unwrap();
        assert!(load_config(file.path()).is_err());

        assert!(load_config(Path::new("/nonexistent/bridge.toml")).is_err());
    }
}
