// MIT License

//! Configuration file loading.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, TexecomError};

/// Top-level configuration, loaded from a TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub texecom: TexecomConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub homeassistant: HomeAssistantConfig,
    /// Per-zone overrides, keyed by the zone id (e.g. "Z3").
    #[serde(default)]
    pub zones: Vec<ZoneConfig>,
    /// Per-area overrides, keyed by the area id (e.g. "A1").
    #[serde(default)]
    pub areas: Vec<AreaConfig>,
    /// Log level filter (trace/debug/info/warn/error).
    #[serde(default = "default_log")]
    pub log: String,
    /// Whether to persist the panel model to the cache file.
    #[serde(default)]
    pub cache: bool,
}

/// Connection details for the panel itself.
#[derive(Debug, Clone, Deserialize)]
pub struct TexecomConfig {
    pub host: String,
    #[serde(default = "default_texecom_port")]
    pub port: u16,
    #[serde(default = "default_udl_password")]
    pub udl_password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    #[serde(default = "default_mqtt_host")]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_keepalive")]
    pub keepalive: u16,
    #[serde(default)]
    pub qos: u8,
    #[serde(default = "default_true")]
    pub retain: bool,
    #[serde(default)]
    pub retain_log: bool,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_true")]
    pub clean: bool,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            host: default_mqtt_host(),
            port: default_mqtt_port(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keepalive: default_keepalive(),
            qos: 0,
            retain: true,
            retain_log: false,
            prefix: default_prefix(),
            clean: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HomeAssistantConfig {
    #[serde(default)]
    pub discovery: bool,
    #[serde(default = "default_ha_prefix")]
    pub prefix: String,
}

impl Default for HomeAssistantConfig {
    fn default() -> Self {
        Self {
            discovery: false,
            prefix: default_ha_prefix(),
        }
    }
}

/// Per-zone override: display name and Home Assistant device class.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub device_class: Option<String>,
}

/// Per-area override: display name and custom command payload aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct AreaConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub full_arm: Option<String>,
    #[serde(default)]
    pub part_arm_1: Option<String>,
    #[serde(default)]
    pub part_arm_2: Option<String>,
    #[serde(default)]
    pub part_arm_3: Option<String>,
}

fn default_log() -> String {
    "info".to_string()
}
fn default_texecom_port() -> u16 {
    10001
}
fn default_udl_password() -> String {
    "1234".to_string()
}
fn default_mqtt_host() -> String {
    "localhost".to_string()
}
fn default_mqtt_port() -> u16 {
    1883
}
fn default_client_id() -> String {
    "texecom2mqtt".to_string()
}
fn default_keepalive() -> u16 {
    60
}
fn default_prefix() -> String {
    "texecom2mqtt".to_string()
}
fn default_ha_prefix() -> String {
    "homeassistant".to_string()
}
fn default_true() -> bool {
    true
}

impl Config {
    /// Load and parse the configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            TexecomError::Config(format!(
                "cannot read {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&text)
            .map_err(|e| TexecomError::Config(format!("cannot parse config: {}", e)))?;
        if config.mqtt.qos > 2 {
            return Err(TexecomError::Config(format!(
                "invalid MQTT QoS {}",
                config.mqtt.qos
            )));
        }
        Ok(config)
    }

    /// Zone overrides indexed by zone id.
    pub fn zone_overrides(&self) -> HashMap<&str, &ZoneConfig> {
        self.zones.iter().map(|z| (z.id.as_str(), z)).collect()
    }

    /// Area overrides indexed by area id.
    pub fn area_overrides(&self) -> HashMap<&str, &AreaConfig> {
        self.areas.iter().map(|a| (a.id.as_str(), a)).collect()
    }
}
