use serde::Serialize;

// Ordered: first matching prefix wins, so power_factor must stay ahead of
// power and state_of_charge ahead of everything it shadows.
pub const PREFIX_DEVICE_CLASS: &[(&str, &str)] = &[
    ("state_of_charge", "battery"),
    ("temperature", "temperature"),
    ("power_factor", "power_factor"),
    ("power", "power"),
    ("energy", "energy"),
    ("current", "current"),
    ("timestamp", "timestamp"),
    ("voltage", "voltage"),
];

pub const PREFIX_STATE_CLASS: &[(&str, &str)] = &[
    ("state_of_charge", "measurement"),
    ("temperature", "measurement"),
    ("power_factor", "measurement"),
    ("power", "measurement"),
    ("energy", "total_increasing"),
    ("current", "measurement"),
    ("timestamp", "measurement"),
    ("voltage", "measurement"),
];

pub fn device_class_for(field: &str) -> Option<&'static str> {
    first_prefix_match(PREFIX_DEVICE_CLASS, field)
}

pub fn state_class_for(field: &str) -> Option<&'static str> {
    first_prefix_match(PREFIX_STATE_CLASS, field)
}

fn first_prefix_match(table: &[(&str, &'static str)], field: &str) -> Option<&'static str> {
    table.iter()
        .find(|(prefix, _)| field.starts_with(prefix))
        .map(|(_, class)| *class)
}

#[derive(Serialize, Debug)]
pub struct Discovery {
    pub name: String,
    pub object_id: String,
    pub unique_id: String,
    pub state_topic: String,
    pub availability_topic: String,
    pub device: Device,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state_class: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<String>,
}

#[derive(Clone, Serialize, Debug)]
pub struct Device {
    pub name: String,
    pub identifiers: Vec<String>,
    pub manufacturer: String,
}

pub fn entity_base_topic(base_topic: &str, adapter_id: &str, field: &str) -> String {
    format!("{base_topic}/sensor/{adapter_id}/{field}")
}

pub fn availability_topic(base_topic: &str, adapter_id: &str) -> String {
    format!("{base_topic}/sensor/{adapter_id}/availability")
}

/// "power_ac" under adapter "Fronius Inverter 1 ..." becomes
/// "Power ac Fronius Inverter 1 ...".
pub fn display_name(field: &str, adapter_name: &str) -> String {
    format!("{} {adapter_name}", capitalize(&field.replace('_', " ")))
}

pub fn capitalize(s: &str) -> String {
    let mut c = s.chars();
    match c.next() {
        None => String::new(),
        Some(f) => f.to_uppercase().collect::<String>() + c.as_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_matching_prefix_wins() {
        assert_eq!(device_class_for("power_factor_sum"), Some("power_factor"));
        assert_eq!(device_class_for("power_ac"), Some("power"));
        assert_eq!(device_class_for("state_of_charge"), Some("battery"));
        assert_eq!(device_class_for("relative_autonomy"), None);
    }

    #[test]
    fn test_energy_is_total_increasing() {
        assert_eq!(state_class_for("energy_day"), Some("total_increasing"));
        assert_eq!(state_class_for("power_ac"), Some("measurement"));
        assert_eq!(state_class_for("mode"), None);
    }

    #[test]
    fn test_display_name() {
        assert_eq!(
            display_name("power_ac", "Fronius Inverter 1 http://10.0.0.10"),
            "Power ac Fronius Inverter 1 http://10.0.0.10"
        );
    }

    #[test]
    fn test_discovery_skips_empty_classes() {
        let discovery = Discovery {
            name: "Mode Fronius Power flow system".to_string(),
            object_id: "fronius_power_flow_system_mode".to_string(),
            unique_id: "fronius_power_flow_system_mode".to_string(),
            state_topic: "homeassistant/sensor/fronius_power_flow_system/mode/state".to_string(),
            availability_topic: "homeassistant/sensor/fronius_power_flow_system/availability".to_string(),
            device: Device {
                name: "Fronius Power flow system".to_string(),
                identifiers: vec!["fronius_power_flow_system".to_string()],
                manufacturer: "Fronius".to_string(),
            },
            device_class: None,
            state_class: None,
            unit_of_measurement: None,
        };
        let json = serde_json::to_value(&discovery).unwrap();
        assert!(json.get("device_class").is_none());
        assert!(json.get("state_class").is_none());
        assert!(json.get("unit_of_measurement").is_none());
        assert_eq!(
            json["availability_topic"],
            "homeassistant/sensor/fronius_power_flow_system/availability"
        );
    }
}
