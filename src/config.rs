use reqwest::Url;
use serde::Deserialize;
use snafu::Snafu;

pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_DEVICE: u32 = 0;
pub const DEFAULT_INVERTER_DEVICE: u32 = 1;
const DEFAULT_BASE_TOPIC: &str = "homeassistant";

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("Invalid resource url '{resource}': {reason}"))]
    InvalidResource { resource: String, reason: String },

    #[snafu(display("No monitored conditions configured"))]
    NoMonitoredConditions,
}

#[derive(Deserialize, Debug)]
pub struct Config {
    pub fronius: FroniusConfig,
    pub mqtt: MqttConfig,
}

#[derive(Deserialize, Debug)]
pub struct FroniusConfig {
    pub resource: String,
    pub monitored_conditions: Vec<ConditionConfig>,
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
}

#[derive(Deserialize, Debug)]
pub struct ConditionConfig {
    pub sensor_type: SensorType,
    #[serde(default)]
    pub scope: Scope,
    pub device: Option<u32>,
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorType {
    #[serde(rename = "inverter")]
    Inverter,
    #[serde(rename = "storage")]
    Storage,
    #[serde(rename = "meter")]
    Meter,
    #[serde(rename = "power_flow")]
    PowerFlow,
    #[serde(rename = "logger_info")]
    LoggerInfo,
}

impl SensorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorType::Inverter => "inverter",
            SensorType::Storage => "storage",
            SensorType::Meter => "meter",
            SensorType::PowerFlow => "power_flow",
            SensorType::LoggerInfo => "logger_info",
        }
    }
}

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scope {
    #[serde(rename = "device")]
    #[default]
    Device,
    #[serde(rename = "system")]
    System,
}

impl ConditionConfig {
    /// Configured device index, or 1 for inverters and 0 for everything else.
    pub fn device_or_default(&self) -> u32 {
        self.device.unwrap_or(match self.sensor_type {
            SensorType::Inverter => DEFAULT_INVERTER_DEVICE,
            _ => DEFAULT_DEVICE,
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct MqttConfig {
    pub address: String,
    pub auth: Option<MqttAuth>,
    #[serde(default = "default_base_topic")]
    pub base_topic: String,
}

#[derive(Deserialize, Debug)]
pub struct MqttAuth {
    pub user: String,
    pub password: String,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        Url::parse(&self.fronius.resource)
            .map_err(|e| ConfigError::InvalidResource {
                resource: self.fronius.resource.clone(),
                reason: e.to_string(),
            })?;
        if self.fronius.monitored_conditions.is_empty() {
            return Err(ConfigError::NoMonitoredConditions);
        }
        Ok(())
    }
}

fn default_scan_interval() -> u64 {
    DEFAULT_SCAN_INTERVAL_SECS
}

fn default_base_topic() -> String {
    DEFAULT_BASE_TOPIC.to_string()
}
