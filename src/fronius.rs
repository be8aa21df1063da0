use std::collections::HashMap;

use serde_json::Value;

use snafu::Snafu;
use snafu::prelude::*;

const SOLAR_API_BASE: &str = "solar_api/v1";

#[derive(Debug, PartialEq, Snafu)]
pub enum TransportError {
    #[snafu(display("HTTP request failed: {msg}"))]
    Http { msg: String },
}

#[derive(Debug, PartialEq, Snafu)]
pub enum FroniusError {
    #[snafu(display("Transport error: {source}"))]
    Transport { source: TransportError },

    #[snafu(display("Invalid JSON in response: {msg}"))]
    InvalidJson { msg: String },

    #[snafu(display("Device returned status {code}: {reason}"))]
    Status { code: i64, reason: String },

    #[snafu(display("Unexpected payload: {detail}"))]
    UnexpectedPayload { detail: &'static str },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub value: FieldValue,
    pub unit: Option<String>,
}

impl Field {
    fn add_numeric(&mut self, other: &Field) {
        self.value = match (&self.value, &other.value) {
            (FieldValue::Integer(a), FieldValue::Integer(b)) => FieldValue::Integer(a + b),
            (FieldValue::Integer(a), FieldValue::Float(b)) => FieldValue::Float(*a as f64 + b),
            (FieldValue::Float(a), FieldValue::Integer(b)) => FieldValue::Float(a + *b as f64),
            (FieldValue::Float(a), FieldValue::Float(b)) => FieldValue::Float(a + b),
            _ => return,
        };
    }
}

pub type FieldMap = HashMap<String, Field>;

/// Seam to the device's HTTP API. `path` is relative to the resource url.
pub trait TelemetryTransport {
    fn fetch(&self, path: &str) -> Result<String, TransportError>;
}

// (api key, field name, fallback unit)
type FieldSpec = (&'static str, &'static str, Option<&'static str>);

// GetInverterRealtimeData.cgi, DataCollection=CommonInverterData.
// Values come wrapped as {"Value": .., "Unit": ..}.
const COMMON_INVERTER_FIELDS: &[FieldSpec] = &[
    ("DAY_ENERGY", "energy_day", Some("Wh")),
    ("YEAR_ENERGY", "energy_year", Some("Wh")),
    ("TOTAL_ENERGY", "energy_total", Some("Wh")),
    ("PAC", "power_ac", Some("W")),
    ("SAC", "power_apparent", Some("VA")),
    ("IAC", "current_ac", Some("A")),
    ("IDC", "current_dc", Some("A")),
    ("UAC", "voltage_ac", Some("V")),
    ("UDC", "voltage_dc", Some("V")),
    ("FAC", "frequency_ac", Some("Hz")),
];

// Scope=System carries per-device {"Values": {id: value}} maps instead.
const SYSTEM_INVERTER_FIELDS: &[FieldSpec] = &[
    ("DAY_ENERGY", "energy_day", Some("Wh")),
    ("YEAR_ENERGY", "energy_year", Some("Wh")),
    ("TOTAL_ENERGY", "energy_total", Some("Wh")),
    ("PAC", "power_ac", Some("W")),
];

const STORAGE_FIELDS: &[FieldSpec] = &[
    ("StateOfCharge_Relative", "state_of_charge", Some("%")),
    ("Capacity_Maximum", "capacity_maximum", Some("Ah")),
    ("DesignedCapacity", "capacity_designed", Some("Ah")),
    ("Current_DC", "current_dc", Some("A")),
    ("Voltage_DC", "voltage_dc", Some("V")),
    ("Temperature_Cell", "temperature_cell", Some("°C")),
    ("Enable", "enable", None),
];

const METER_FIELDS: &[FieldSpec] = &[
    ("PowerReal_P_Sum", "power_real", Some("W")),
    ("PowerApparent_S_Sum", "power_apparent", Some("VA")),
    ("PowerReactive_Q_Sum", "power_reactive", Some("var")),
    ("PowerFactor_Sum", "power_factor", None),
    ("Current_AC_Phase_1", "current_ac_phase_1", Some("A")),
    ("Current_AC_Phase_2", "current_ac_phase_2", Some("A")),
    ("Current_AC_Phase_3", "current_ac_phase_3", Some("A")),
    ("Voltage_AC_Phase_1", "voltage_ac_phase_1", Some("V")),
    ("Voltage_AC_Phase_2", "voltage_ac_phase_2", Some("V")),
    ("Voltage_AC_Phase_3", "voltage_ac_phase_3", Some("V")),
    ("Frequency_Phase_Average", "frequency_phase_average", Some("Hz")),
    ("EnergyReal_WAC_Sum_Consumed", "energy_real_consumed", Some("Wh")),
    ("EnergyReal_WAC_Sum_Produced", "energy_real_produced", Some("Wh")),
];

const POWER_FLOW_FIELDS: &[FieldSpec] = &[
    ("P_Grid", "power_grid", Some("W")),
    ("P_Load", "power_load", Some("W")),
    ("P_Akku", "power_battery", Some("W")),
    ("P_PV", "power_photovoltaics", Some("W")),
    ("rel_Autonomy", "relative_autonomy", Some("%")),
    ("rel_SelfConsumption", "relative_self_consumption", Some("%")),
    ("E_Day", "energy_day", Some("Wh")),
    ("E_Year", "energy_year", Some("Wh")),
    ("E_Total", "energy_total", Some("Wh")),
    ("Meter_Location", "meter_location", None),
    ("Mode", "mode", None),
];

const LOGGER_INFO_FIELDS: &[FieldSpec] = &[
    ("CO2Factor", "co2_factor", None),
    ("CashFactor", "cash_factor", None),
    ("DeliveryFactor", "delivery_factor", None),
    ("HWVersion", "hardware_version", None),
    ("SWVersion", "software_version", None),
    ("TimezoneName", "time_zone", None),
    ("UTCOffset", "utc_offset", None),
];

/// Client for the Solar API realtime endpoints.
pub struct Fronius<T: TelemetryTransport> {
    transport: T,
}

impl<T: TelemetryTransport> Fronius<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    fn fetch_body(&self, path: &str) -> Result<Value, FroniusError> {
        let raw = self.transport.fetch(path).context(TransportSnafu)?;
        let json: Value = serde_json::from_str(&raw)
            .map_err(|e| FroniusError::InvalidJson { msg: e.to_string() })?;
        match json.pointer("/Head/Status/Code").and_then(Value::as_i64) {
            Some(0) => {}
            Some(code) => {
                let reason = json.pointer("/Head/Status/Reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                return Err(FroniusError::Status { code, reason });
            }
            None => return Err(FroniusError::UnexpectedPayload { detail: "missing status code" }),
        }
        json.get("Body")
            .cloned()
            .ok_or(FroniusError::UnexpectedPayload { detail: "missing body" })
    }

    fn fetch_data(&self, path: &str) -> Result<Value, FroniusError> {
        let body = self.fetch_body(path)?;
        body.get("Data")
            .cloned()
            .ok_or(FroniusError::UnexpectedPayload { detail: "missing data" })
    }

    pub fn current_inverter_data(&self, device: u32) -> Result<FieldMap, FroniusError> {
        let data = self.fetch_data(&format!(
            "{SOLAR_API_BASE}/GetInverterRealtimeData.cgi?Scope=Device&DeviceId={device}&DataCollection=CommonInverterData"
        ))?;
        Ok(collect_wrapped(&data, COMMON_INVERTER_FIELDS))
    }

    pub fn current_system_inverter_data(&self) -> Result<FieldMap, FroniusError> {
        let data = self.fetch_data(&format!(
            "{SOLAR_API_BASE}/GetInverterRealtimeData.cgi?Scope=System"
        ))?;
        Ok(collect_aggregate(&data, SYSTEM_INVERTER_FIELDS))
    }

    pub fn current_storage_data(&self, device: u32) -> Result<FieldMap, FroniusError> {
        let data = self.fetch_data(&format!(
            "{SOLAR_API_BASE}/GetStorageRealtimeData.cgi?Scope=Device&DeviceId={device}"
        ))?;
        let controller = data.get("Controller")
            .ok_or(FroniusError::UnexpectedPayload { detail: "missing storage controller" })?;
        Ok(collect_plain(controller, STORAGE_FIELDS))
    }

    pub fn current_meter_data(&self, device: u32) -> Result<FieldMap, FroniusError> {
        let data = self.fetch_data(&format!(
            "{SOLAR_API_BASE}/GetMeterRealtimeData.cgi?Scope=Device&DeviceId={device}"
        ))?;
        Ok(collect_plain(&data, METER_FIELDS))
    }

    /// System scope returns one object per meter id; numeric fields are
    /// summed across meters.
    pub fn current_system_meter_data(&self) -> Result<FieldMap, FroniusError> {
        let data = self.fetch_data(&format!(
            "{SOLAR_API_BASE}/GetMeterRealtimeData.cgi?Scope=System"
        ))?;
        let meters = data.as_object()
            .ok_or(FroniusError::UnexpectedPayload { detail: "meter system data is not a map" })?;
        let mut out = FieldMap::new();
        for meter in meters.values() {
            for (name, field) in collect_plain(meter, METER_FIELDS) {
                match out.get_mut(&name) {
                    Some(existing) => existing.add_numeric(&field),
                    None => {
                        out.insert(name, field);
                    }
                }
            }
        }
        Ok(out)
    }

    pub fn current_power_flow(&self) -> Result<FieldMap, FroniusError> {
        let data = self.fetch_data(&format!(
            "{SOLAR_API_BASE}/GetPowerFlowRealtimeData.fcgi"
        ))?;
        let site = data.get("Site")
            .ok_or(FroniusError::UnexpectedPayload { detail: "missing power flow site" })?;
        Ok(collect_plain(site, POWER_FLOW_FIELDS))
    }

    pub fn current_logger_info(&self) -> Result<FieldMap, FroniusError> {
        // The logger endpoint nests its payload under Body.LoggerInfo, not Body.Data.
        let body = self.fetch_body(&format!("{SOLAR_API_BASE}/GetLoggerInfo.cgi"))?;
        let info = body.get("LoggerInfo")
            .ok_or(FroniusError::UnexpectedPayload { detail: "missing logger info" })?;
        Ok(collect_plain(info, LOGGER_INFO_FIELDS))
    }
}

fn to_field_value(value: &Value) -> Option<FieldValue> {
    match value {
        Value::Number(n) if n.is_i64() => n.as_i64().map(FieldValue::Integer),
        Value::Number(n) => n.as_f64().map(FieldValue::Float),
        Value::String(s) => Some(FieldValue::Text(s.clone())),
        _ => None,
    }
}

fn collect_wrapped(data: &Value, specs: &[FieldSpec]) -> FieldMap {
    let mut out = FieldMap::new();
    for &(key, name, fallback_unit) in specs {
        let Some(entry) = data.get(key) else { continue };
        let Some(value) = entry.get("Value").and_then(to_field_value) else { continue };
        let unit = entry.get("Unit")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| fallback_unit.map(str::to_string));
        out.insert(name.to_string(), Field { value, unit });
    }
    out
}

fn collect_aggregate(data: &Value, specs: &[FieldSpec]) -> FieldMap {
    let mut out = FieldMap::new();
    for &(key, name, fallback_unit) in specs {
        let Some(entry) = data.get(key) else { continue };
        let Some(values) = entry.get("Values").and_then(Value::as_object) else { continue };
        let Some(value) = sum_values(values.values()) else { continue };
        let unit = entry.get("Unit")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| fallback_unit.map(str::to_string));
        out.insert(name.to_string(), Field { value, unit });
    }
    out
}

fn collect_plain(data: &Value, specs: &[FieldSpec]) -> FieldMap {
    let mut out = FieldMap::new();
    for &(key, name, unit) in specs {
        let Some(value) = data.get(key).and_then(to_field_value) else { continue };
        out.insert(name.to_string(), Field { value, unit: unit.map(str::to_string) });
    }
    out
}

fn sum_values<'a, I: Iterator<Item = &'a Value>>(values: I) -> Option<FieldValue> {
    let mut int_sum: i64 = 0;
    let mut float_sum: f64 = 0.0;
    let mut all_integers = true;
    let mut any = false;
    for value in values {
        let Some(f) = value.as_f64() else { continue };
        any = true;
        float_sum += f;
        match value.as_i64() {
            Some(i) => int_sum += i,
            None => all_integers = false,
        }
    }
    if !any {
        None
    } else if all_integers {
        Some(FieldValue::Integer(int_sum))
    } else {
        Some(FieldValue::Float(float_sum))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestTransport {
        expected_path: &'static str,
        response: String,
    }

    impl TelemetryTransport for TestTransport {
        fn fetch(&self, path: &str) -> Result<String, TransportError> {
            assert_eq!(path, self.expected_path);
            Ok(self.response.clone())
        }
    }

    struct FailingTransport;

    impl TelemetryTransport for FailingTransport {
        fn fetch(&self, _path: &str) -> Result<String, TransportError> {
            Err(TransportError::Http { msg: "connection refused".to_string() })
        }
    }

    fn ok_envelope(body: &str) -> String {
        format!(r#"{{"Head": {{"Status": {{"Code": 0, "Reason": ""}}}}, "Body": {body}}}"#)
    }

    #[test]
    fn test_inverter_data_wrapped_fields() {
        let response = ok_envelope(r#"{"Data": {
            "PAC": {"Value": 1234, "Unit": "W"},
            "DAY_ENERGY": {"Value": 8000.5, "Unit": "Wh"},
            "UNKNOWN": {"Value": 1, "Unit": "X"},
            "UAC": {"Value": null, "Unit": "V"}
        }}"#);
        let fronius = Fronius::new(TestTransport {
            expected_path: "solar_api/v1/GetInverterRealtimeData.cgi?Scope=Device&DeviceId=1&DataCollection=CommonInverterData",
            response,
        });
        let fields = fronius.current_inverter_data(1).unwrap();
        assert_eq!(
            fields.get("power_ac"),
            Some(&Field { value: FieldValue::Integer(1234), unit: Some("W".to_string()) })
        );
        assert_eq!(
            fields.get("energy_day"),
            Some(&Field { value: FieldValue::Float(8000.5), unit: Some("Wh".to_string()) })
        );
        // unlisted keys and null values do not survive
        assert_eq!(fields.len(), 2);
    }

    #[test]
    fn test_system_inverter_data_sums_devices() {
        let response = ok_envelope(r#"{"Data": {
            "PAC": {"Unit": "W", "Values": {"1": 500, "2": 600}},
            "DAY_ENERGY": {"Unit": "Wh", "Values": {"1": 100.5, "2": 200}}
        }}"#);
        let fronius = Fronius::new(TestTransport {
            expected_path: "solar_api/v1/GetInverterRealtimeData.cgi?Scope=System",
            response,
        });
        let fields = fronius.current_system_inverter_data().unwrap();
        assert_eq!(
            fields.get("power_ac"),
            Some(&Field { value: FieldValue::Integer(1100), unit: Some("W".to_string()) })
        );
        assert_eq!(
            fields.get("energy_day"),
            Some(&Field { value: FieldValue::Float(300.5), unit: Some("Wh".to_string()) })
        );
    }

    #[test]
    fn test_storage_data_units_from_table() {
        let response = ok_envelope(r#"{"Data": {"Controller": {
            "StateOfCharge_Relative": 77,
            "Temperature_Cell": 21.5,
            "Enable": 1
        }}}"#);
        let fronius = Fronius::new(TestTransport {
            expected_path: "solar_api/v1/GetStorageRealtimeData.cgi?Scope=Device&DeviceId=0",
            response,
        });
        let fields = fronius.current_storage_data(0).unwrap();
        assert_eq!(
            fields.get("state_of_charge"),
            Some(&Field { value: FieldValue::Integer(77), unit: Some("%".to_string()) })
        );
        assert_eq!(
            fields.get("enable"),
            Some(&Field { value: FieldValue::Integer(1), unit: None })
        );
    }

    #[test]
    fn test_system_meter_data_sums_meters() {
        let response = ok_envelope(r#"{"Data": {
            "0": {"PowerReal_P_Sum": 100, "Frequency_Phase_Average": 50.0},
            "1": {"PowerReal_P_Sum": 150}
        }}"#);
        let fronius = Fronius::new(TestTransport {
            expected_path: "solar_api/v1/GetMeterRealtimeData.cgi?Scope=System",
            response,
        });
        let fields = fronius.current_system_meter_data().unwrap();
        assert_eq!(
            fields.get("power_real"),
            Some(&Field { value: FieldValue::Integer(250), unit: Some("W".to_string()) })
        );
        assert_eq!(
            fields.get("frequency_phase_average"),
            Some(&Field { value: FieldValue::Float(50.0), unit: Some("Hz".to_string()) })
        );
    }

    #[test]
    fn test_logger_info_nested_under_body() {
        let response = ok_envelope(r#"{"LoggerInfo": {
            "CO2Factor": 0.53,
            "TimezoneName": "CET"
        }}"#);
        let fronius = Fronius::new(TestTransport {
            expected_path: "solar_api/v1/GetLoggerInfo.cgi",
            response,
        });
        let fields = fronius.current_logger_info().unwrap();
        assert_eq!(
            fields.get("co2_factor"),
            Some(&Field { value: FieldValue::Float(0.53), unit: None })
        );
        assert_eq!(
            fields.get("time_zone"),
            Some(&Field { value: FieldValue::Text("CET".to_string()), unit: None })
        );
    }

    #[test]
    fn test_error_status_code() {
        let fronius = Fronius::new(TestTransport {
            expected_path: "solar_api/v1/GetPowerFlowRealtimeData.fcgi",
            response: r#"{"Head": {"Status": {"Code": 255, "Reason": "Inverter not reachable"}}, "Body": {}}"#.to_string(),
        });
        assert_eq!(
            fronius.current_power_flow().unwrap_err(),
            FroniusError::Status { code: 255, reason: "Inverter not reachable".to_string() }
        );
    }

    #[test]
    fn test_transport_error_propagates() {
        let fronius = Fronius::new(FailingTransport);
        assert_eq!(
            fronius.current_logger_info().unwrap_err(),
            FroniusError::Transport {
                source: TransportError::Http { msg: "connection refused".to_string() }
            }
        );
    }

    #[test]
    fn test_missing_data_rejected() {
        let fronius = Fronius::new(TestTransport {
            expected_path: "solar_api/v1/GetMeterRealtimeData.cgi?Scope=Device&DeviceId=0",
            response: r#"{"Head": {"Status": {"Code": 0, "Reason": ""}}, "Body": {}}"#.to_string(),
        });
        assert_eq!(
            fronius.current_meter_data(0).unwrap_err(),
            FroniusError::UnexpectedPayload { detail: "missing data" }
        );
    }
}
