use std::collections::HashSet;

use crate::config::{ConditionConfig, Scope, SensorType};
use crate::fronius::{Field, FieldMap, FieldValue, Fronius, FroniusError, TelemetryTransport};

/// Host-platform side of an adapter: entity registration and state delivery.
/// Implemented over MQTT discovery in main, as a recording fake in tests.
pub trait EntitySink {
    fn register_sensor(&mut self, adapter_id: &str, adapter_name: &str, field: &str, unit: Option<&str>);
    fn publish_state(&mut self, adapter_id: &str, field: &str, state: &str);
    fn set_availability(&mut self, adapter_id: &str, available: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    InverterDevice,
    InverterSystem,
    Storage,
    MeterDevice,
    MeterSystem,
    PowerFlow,
    LoggerInfo,
}

impl AdapterKind {
    /// Storage is always device scoped; power flow and logger info are
    /// system wide whatever the configured scope says.
    fn for_condition(condition: &ConditionConfig) -> Self {
        match (condition.sensor_type, condition.scope) {
            (SensorType::Inverter, Scope::System) => AdapterKind::InverterSystem,
            (SensorType::Inverter, Scope::Device) => AdapterKind::InverterDevice,
            (SensorType::Meter, Scope::System) => AdapterKind::MeterSystem,
            (SensorType::Meter, Scope::Device) => AdapterKind::MeterDevice,
            (SensorType::Storage, _) => AdapterKind::Storage,
            (SensorType::PowerFlow, _) => AdapterKind::PowerFlow,
            (SensorType::LoggerInfo, _) => AdapterKind::LoggerInfo,
        }
    }

    fn fetch<T: TelemetryTransport>(
        &self,
        bridge: &Fronius<T>,
        device: u32,
    ) -> Result<FieldMap, FroniusError> {
        match self {
            AdapterKind::InverterDevice => bridge.current_inverter_data(device),
            AdapterKind::InverterSystem => bridge.current_system_inverter_data(),
            AdapterKind::Storage => bridge.current_storage_data(device),
            AdapterKind::MeterDevice => bridge.current_meter_data(device),
            AdapterKind::MeterSystem => bridge.current_system_meter_data(),
            AdapterKind::PowerFlow => bridge.current_power_flow(),
            AdapterKind::LoggerInfo => bridge.current_logger_info(),
        }
    }
}

/// One adapter per monitored condition. Owns the last fetched snapshot, the
/// availability flag and the set of fields already materialized as entities.
pub struct Adapter {
    kind: AdapterKind,
    id: String,
    name: String,
    device: u32,
    fetched: FieldMap,
    available: bool,
    sensors: HashSet<String>,
}

impl Adapter {
    pub fn new(condition: &ConditionConfig, resource: &str) -> Self {
        let device = condition.device_or_default();
        let suffix = match condition.scope {
            Scope::Device => device.to_string(),
            Scope::System => "system".to_string(),
        };
        Self {
            kind: AdapterKind::for_condition(condition),
            id: format!("fronius_{}_{suffix}", condition.sensor_type.as_str()),
            name: format!(
                "Fronius {} {suffix} {resource}",
                crate::hass::capitalize(condition.sensor_type.as_str()).replace('_', " ")
            ),
            device,
            fetched: FieldMap::new(),
            available: true,
            sensors: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn available(&self) -> bool {
        self.available
    }

    /// Fetch the latest snapshot and push it to the sink. A fetch failure
    /// skips this cycle; the device is often powered off overnight, so the
    /// error is logged only on the first failure of a streak.
    pub fn update<T: TelemetryTransport, S: EntitySink>(
        &mut self,
        bridge: &Fronius<T>,
        sink: &mut S,
    ) {
        let values = match self.kind.fetch(bridge, self.device) {
            Ok(values) => values,
            Err(err) => {
                if self.available {
                    self.available = false;
                    log::error!("Failed to update {}: {err}", self.name);
                    sink.set_availability(&self.id, false);
                }
                return;
            }
        };

        let recovered = !self.available;
        self.available = true;

        for (key, field) in values {
            self.fetched.insert(key, field);
        }

        // Materialize newly discovered fields exactly once; some fields are
        // only sent temporarily, so the snapshot keeps them alive afterwards.
        let mut new_sensors: Vec<String> = self.fetched.keys()
            .filter(|key| !self.sensors.contains(*key))
            .cloned()
            .collect();
        new_sensors.sort();
        for key in &new_sensors {
            self.sensors.insert(key.clone());
            log::info!("Discovered {key}, adding as sensor");
            let unit = self.fetched[key].unit.as_deref();
            sink.register_sensor(&self.id, &self.name, key, unit);
        }

        if recovered || !new_sensors.is_empty() {
            sink.set_availability(&self.id, true);
        }

        for (key, field) in &self.fetched {
            sink.publish_state(&self.id, key, &format_state(field));
        }
    }
}

pub fn format_state(field: &Field) -> String {
    match &field.value {
        FieldValue::Integer(v) => v.to_string(),
        FieldValue::Float(v) => ((v * 100.0).round() / 100.0).to_string(),
        FieldValue::Text(v) => v.clone(),
    }
}
