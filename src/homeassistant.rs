// MIT License

//! Home Assistant MQTT discovery: retained config messages that let a
//! discovery-enabled controller create entities for the panel, each area,
//! and each zone. A pure function of the panel model.

use serde_json::json;
use tracing::info;

use crate::config::{Config, HomeAssistantConfig};
use crate::devices::{Area, Device, Zone};
use crate::mqtt::MqttBridge;
use crate::panel::Panel;
use crate::util::slugify;

/// Publish the discovery config for the panel and all of its devices.
pub async fn publish_discovery(bridge: &MqttBridge, config: &Config, panel: &Panel) {
    info!("Publishing Home Assistant discovery configuration");
    let ha = &config.homeassistant;
    let prefix = &config.mqtt.prefix;

    publish_panel_config(bridge, ha, prefix, &panel.device()).await;
    for area in panel.areas() {
        publish_area_config(bridge, ha, prefix, &area).await;
    }
    for zone in panel.zones() {
        publish_zone_config(bridge, config, prefix, &zone).await;
    }
}

fn discovery_topic(
    ha: &HomeAssistantConfig,
    component: &str,
    prefix: &str,
    object_id: &str,
) -> String {
    format!("{}/{}/{}/{}/config", ha.prefix, component, prefix, object_id)
}

async fn publish_panel_config(
    bridge: &MqttBridge,
    ha: &HomeAssistantConfig,
    prefix: &str,
    device: &Device,
) {
    let payload = json!({
        "name": format!("Texecom {}", device.model),
        "unique_id": format!("{}_panel_{}", prefix, device.serial_number),
        "state_topic": bridge.topics().status(),
        "payload_on": crate::mqtt::ONLINE_PAYLOAD,
        "payload_off": crate::mqtt::OFFLINE_PAYLOAD,
        "device_class": "connectivity",
        "device": {
            "identifiers": [device.serial_number],
            "manufacturer": "Texecom",
            "model": device.model,
            "sw_version": device.firmware_version,
        },
    });
    let topic = discovery_topic(ha, "binary_sensor", prefix, "panel");
    bridge.publish_json(topic, &payload, true).await;
}

async fn publish_area_config(
    bridge: &MqttBridge,
    ha: &HomeAssistantConfig,
    prefix: &str,
    area: &Area,
) {
    let name = bridge.area_name(area);
    let payload = json!({
        "name": name,
        "unique_id": format!("{}_area_{}", prefix, slugify(name)),
        "state_topic": bridge.topics().area(name),
        "command_topic": bridge.topics().area_command(name),
        "payload_disarm": "disarm",
        "payload_arm_home": "part_arm_1",
        "payload_arm_away": "full_arm",
        "value_template": "{{ value_json.status }}",
    });
    let topic = discovery_topic(ha, "alarm_control_panel", prefix, &area.id);
    bridge.publish_json(topic, &payload, true).await;
}

async fn publish_zone_config(
    bridge: &MqttBridge,
    config: &Config,
    prefix: &str,
    zone: &Zone,
) {
    let name = bridge.zone_name(zone);
    let payload = json!({
        "name": name,
        "unique_id": format!("{}_zone_{}", prefix, slugify(name)),
        "state_topic": bridge.topics().zone(name),
        "device_class": device_class(config, zone, name),
        "value_template": "{{ value_json.status }}",
        "payload_on": "Active",
        "payload_off": "Secure",
    });
    let topic = discovery_topic(&config.homeassistant, "binary_sensor", prefix, &zone.id);
    bridge.publish_json(topic, &payload, true).await;
}

/// The device class for a zone: config override first, otherwise a guess
/// from the zone name.
fn device_class(config: &Config, zone: &Zone, name: &str) -> String {
    if let Some(zc) = config.zones.iter().find(|z| z.id == zone.id)
        && let Some(class) = &zc.device_class
    {
        return class.clone();
    }

    let name = name.to_lowercase();
    let guessed = if name.contains("pir") {
        "motion"
    } else if name.contains("door") {
        "door"
    } else if name.contains("window") {
        "window"
    } else if name.contains("smoke") || name.contains("fire") {
        "smoke"
    } else if name.contains("gas") {
        "gas"
    } else if name.contains("water") {
        "moisture"
    } else {
        "motion"
    };
    guessed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::ZoneType;

    fn base_config() -> Config {
        toml::from_str(
            r#"
            [texecom]
            host = "panel.local"

            [homeassistant]
            discovery = true

            [[zones]]
            id = "Z9"
            device_class = "garage_door"
            "#,
        )
        .unwrap()
    }

    #[test]
    fn test_device_class_guessing() {
        let config = base_config();
        let checks = [
            ("Landing PIR", "motion"),
            ("Front Door", "door"),
            ("Kitchen Window", "window"),
            ("Smoke Hall", "smoke"),
            ("Garage Gas", "gas"),
            ("Cellar Water", "moisture"),
            ("Mystery", "motion"),
        ];
        for (name, expected) in checks {
            let zone = Zone::new(1, name.into(), ZoneType::Guard);
            assert_eq!(device_class(&config, &zone, name), expected, "{}", name);
        }
    }

    #[test]
    fn test_device_class_override() {
        let config = base_config();
        let zone = Zone::new(9, "Garage Door".into(), ZoneType::Guard);
        assert_eq!(device_class(&config, &zone, "Garage Door"), "garage_door");
    }

    #[test]
    fn test_discovery_topic_shape() {
        let ha = HomeAssistantConfig::default();
        assert_eq!(
            discovery_topic(&ha, "binary_sensor", "texecom2mqtt", "Z3"),
            "homeassistant/binary_sensor/texecom2mqtt/Z3/config"
        );
    }
}
