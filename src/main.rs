use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::thread::sleep;
use std::time::Duration;

use clap::Parser;

use paho_mqtt as mqtt;
use snafu::{Whatever, ResultExt};

mod adapter;
mod config;
mod fronius;
mod hass;

use adapter::{Adapter, EntitySink};
use config::{Config, MqttConfig};
use fronius::{Fronius, TelemetryTransport, TransportError};

const REQUEST_TIMEOUT_SECS: u64 = 10;
const MQTT_RETRY_DELAY_SECS: u64 = 10;
const MQTT_MIN_RETRY_INTERVAL_SECS: u64 = 1;
const MQTT_MAX_RETRY_INTERVAL_SECS: u64 = 60;

#[derive(Parser, Debug)]
struct Args {
    config: PathBuf,
}

struct HttpTransport {
    client: reqwest::blocking::Client,
    resource: String,
}

impl HttpTransport {
    fn new(resource: &str) -> Result<Self, Whatever> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .with_whatever_context(|e| format!("Cannot build http client: {e}"))?;
        Ok(Self {
            client,
            resource: resource.trim_end_matches('/').to_string(),
        })
    }
}

impl TelemetryTransport for HttpTransport {
    fn fetch(&self, path: &str) -> Result<String, TransportError> {
        let url = format!("{}/{path}", self.resource);
        log::trace!("GET {url}");
        self.client.get(&url)
            .send()
            .and_then(|resp| resp.error_for_status())
            .and_then(|resp| resp.text())
            .map_err(|e| TransportError::Http { msg: e.to_string() })
    }
}

fn main() -> Result<(), Whatever> {
    env_logger::init();

    let args = Args::parse();

    let config_file = File::open(args.config)
        .with_whatever_context(|e| format!("Cannot open config file: {e}"))?;
    let config_reader = BufReader::new(config_file);
    let config: Config = serde_yaml::from_reader(config_reader)
        .with_whatever_context(|e| format!("Error when parsing config file: {e}"))?;
    config.validate()
        .with_whatever_context(|e| format!("Invalid configuration: {e}"))?;

    let transport = HttpTransport::new(&config.fronius.resource)?;
    let bridge = Fronius::new(transport);

    let scan_interval = Duration::from_secs(config.fronius.scan_interval_secs);
    let mqtt_client = establish_mqtt_conn(&config.mqtt, scan_interval)?;

    let mut adapters: Vec<Adapter> = config.fronius.monitored_conditions.iter()
        .map(|condition| Adapter::new(condition, &config.fronius.resource))
        .collect();
    log::info!(
        "Polling {} at {}s intervals for {} conditions",
        config.fronius.resource,
        scan_interval.as_secs(),
        adapters.len(),
    );

    run(&mut adapters, &bridge, &mqtt_client, &config.mqtt.base_topic, scan_interval)
}

fn establish_mqtt_conn(cfg: &MqttConfig, scan_interval: Duration) -> Result<mqtt::Client, Whatever> {
    let client = mqtt::Client::new(format!("tcp://{}", cfg.address))
        .with_whatever_context(|e| format!("Error creating mqtt client: {e}"))?;
    let mut conn_opts_builder = mqtt::ConnectOptionsBuilder::new();
    conn_opts_builder
        .keep_alive_interval(scan_interval * 2)
        .automatic_reconnect(
            Duration::from_secs(MQTT_MIN_RETRY_INTERVAL_SECS),
            Duration::from_secs(MQTT_MAX_RETRY_INTERVAL_SECS)
        )
        .clean_session(true);
    if let Some(auth) = &cfg.auth {
        conn_opts_builder
            .user_name(&auth.user)
            .password(&auth.password);
    }
    let conn_opts = conn_opts_builder.finalize();

    loop {
        if let Err(e) = client.connect(conn_opts.clone()) {
            log::warn!("Unable to connect to mqtt server. Waiting:\n\t{e}");
            sleep(Duration::from_secs(MQTT_RETRY_DELAY_SECS));
        } else {
            return Ok(client);
        }
    }
}

struct MqttSink<'a> {
    client: &'a mqtt::Client,
    base_topic: &'a str,
}

impl EntitySink for MqttSink<'_> {
    fn register_sensor(&mut self, adapter_id: &str, adapter_name: &str, field: &str, unit: Option<&str>) {
        let entity_base = hass::entity_base_topic(self.base_topic, adapter_id, field);
        let entity_config_topic = format!("{entity_base}/config");
        let discovery = hass::Discovery {
            name: hass::display_name(field, adapter_name),
            object_id: format!("{adapter_id}_{field}"),
            unique_id: format!("{adapter_id}_{field}"),
            state_topic: format!("{entity_base}/state"),
            availability_topic: hass::availability_topic(self.base_topic, adapter_id),
            device: hass::Device {
                name: adapter_name.to_string(),
                identifiers: vec![adapter_id.to_string()],
                manufacturer: "Fronius".to_string(),
            },
            device_class: hass::device_class_for(field).map(str::to_string),
            state_class: hass::state_class_for(field).map(str::to_string),
            unit_of_measurement: unit.map(str::to_string),
        };
        let entity_msg = match serde_json::to_string(&discovery) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("Error when serializing discovery message: {e}");
                return;
            }
        };
        let discovery_msg = mqtt::Message::new_retained(
            entity_config_topic.clone(),
            entity_msg.clone(),
            0
        );
        loop {
            log::trace!("Sending message to {entity_config_topic}: {entity_msg}");
            match self.client.publish(discovery_msg.clone()) {
                Ok(()) => break,
                Err(e) => {
                    log::warn!("Error when creating entity: {e}");
                    sleep(Duration::from_secs(MQTT_RETRY_DELAY_SECS));
                    continue;
                }
            }
        }
    }

    fn publish_state(&mut self, adapter_id: &str, field: &str, state: &str) {
        let entity_state_topic = format!(
            "{}/state",
            hass::entity_base_topic(self.base_topic, adapter_id, field)
        );
        let entity_state_msg = mqtt::Message::new(entity_state_topic.clone(), state, 0);
        log::trace!("Sending message to {entity_state_topic}: {state}");
        if let Err(e) = self.client.publish(entity_state_msg) {
            log::warn!("Cannot publish entity state: {e}");
        }
    }

    fn set_availability(&mut self, adapter_id: &str, available: bool) {
        let topic = hass::availability_topic(self.base_topic, adapter_id);
        let payload = if available { "online" } else { "offline" };
        let msg = mqtt::Message::new_retained(topic.clone(), payload, 0);
        log::trace!("Sending message to {topic}: {payload}");
        if let Err(e) = self.client.publish(msg) {
            log::warn!("Cannot publish availability: {e}");
        }
    }
}

fn run(
    adapters: &mut [Adapter],
    bridge: &Fronius<HttpTransport>,
    mqtt_client: &mqtt::Client,
    base_topic: &str,
    scan_interval: Duration,
) -> Result<(), Whatever> {
    let mut sink = MqttSink {
        client: mqtt_client,
        base_topic,
    };

    loop {
        for adapter in adapters.iter_mut() {
            adapter.update(bridge, &mut sink);
        }
        sleep(scan_interval);
    }
}
