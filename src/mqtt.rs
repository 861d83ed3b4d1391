// MIT License

//! MQTT side of the bridge: topic scheme, retained state publishing, and
//! inbound command routing.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, EventLoop, LastWill, MqttOptions, QoS};
use serde_json::json;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::constants::log_group_description;
use crate::devices::{Area, AreaState, ArmType, Device, Zone};
use crate::error::{Result, TexecomError};
use crate::event::LogEvent;
use crate::panel::Panel;
use crate::util::slugify;

pub const ONLINE_PAYLOAD: &str = "online";
pub const OFFLINE_PAYLOAD: &str = "offline";

/// Topic layout under the configured prefix.
#[derive(Debug, Clone)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn status(&self) -> String {
        format!("{}/status", self.prefix)
    }

    pub fn config(&self) -> String {
        format!("{}/config", self.prefix)
    }

    pub fn area(&self, name: &str) -> String {
        format!("{}/area/{}", self.prefix, slugify(name))
    }

    pub fn area_command(&self, name: &str) -> String {
        format!("{}/area/{}/command", self.prefix, slugify(name))
    }

    pub fn zone(&self, name: &str) -> String {
        format!("{}/zone/{}", self.prefix, slugify(name))
    }

    pub fn log(&self) -> String {
        format!("{}/log", self.prefix)
    }

    pub fn text(&self) -> String {
        format!("{}/text", self.prefix)
    }

    pub fn datetime(&self) -> String {
        format!("{}/datetime", self.prefix)
    }
}

/// Command payload aliases for one area, from config.
#[derive(Debug, Clone, Default)]
struct AreaAliases {
    full_arm: Option<String>,
    part_arm_1: Option<String>,
    part_arm_2: Option<String>,
    part_arm_3: Option<String>,
}

/// Publishes panel state and routes inbound commands.
pub struct MqttBridge {
    client: AsyncClient,
    topics: Topics,
    qos: QoS,
    retain: bool,
    retain_log: bool,
    /// Display-name overrides keyed by device id ("A1", "Z3").
    name_overrides: HashMap<String, String>,
    area_aliases: HashMap<String, AreaAliases>,
}

fn qos_from_u8(qos: u8) -> QoS {
    match qos {
        2 => QoS::ExactlyOnce,
        1 => QoS::AtLeastOnce,
        _ => QoS::AtMostOnce,
    }
}

impl MqttBridge {
    /// Build the client with LWT on the status topic. The returned event
    /// loop must be polled by the caller.
    pub fn connect(config: &Config) -> (Self, EventLoop) {
        let mqtt = &config.mqtt;
        let topics = Topics::new(&mqtt.prefix);
        let qos = qos_from_u8(mqtt.qos);

        let mut options = MqttOptions::new(&mqtt.client_id, &mqtt.host, mqtt.port);
        options.set_keep_alive(Duration::from_secs(mqtt.keepalive as u64));
        options.set_clean_session(mqtt.clean);
        options.set_last_will(LastWill::new(
            topics.status(),
            OFFLINE_PAYLOAD,
            qos,
            mqtt.retain,
        ));
        if let (Some(user), Some(pass)) = (&mqtt.username, &mqtt.password) {
            options.set_credentials(user, pass);
        }

        let (client, event_loop) = AsyncClient::new(options, 64);
        info!("MQTT client targeting {}:{}", mqtt.host, mqtt.port);

        let mut name_overrides = HashMap::new();
        for zone in &config.zones {
            if let Some(name) = &zone.name {
                name_overrides.insert(zone.id.clone(), name.clone());
            }
        }
        let mut area_aliases = HashMap::new();
        for area in &config.areas {
            if let Some(name) = &area.name {
                name_overrides.insert(area.id.clone(), name.clone());
            }
            area_aliases.insert(
                area.id.clone(),
                AreaAliases {
                    full_arm: area.full_arm.clone(),
                    part_arm_1: area.part_arm_1.clone(),
                    part_arm_2: area.part_arm_2.clone(),
                    part_arm_3: area.part_arm_3.clone(),
                },
            );
        }

        (
            Self {
                client,
                topics,
                qos,
                retain: mqtt.retain,
                retain_log: mqtt.retain_log,
                name_overrides,
                area_aliases,
            },
            event_loop,
        )
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Display name for an area, honoring config overrides.
    pub fn area_name<'a>(&'a self, area: &'a Area) -> &'a str {
        self.name_overrides
            .get(&area.id)
            .map(String::as_str)
            .unwrap_or(&area.name)
    }

    /// Display name for a zone, honoring config overrides.
    pub fn zone_name<'a>(&'a self, zone: &'a Zone) -> &'a str {
        self.name_overrides
            .get(&zone.id)
            .map(String::as_str)
            .unwrap_or(&zone.name)
    }

    pub async fn publish_json(
        &self,
        topic: String,
        payload: &serde_json::Value,
        retain: bool,
    ) {
        let body = payload.to_string();
        debug!("Publishing to {}: {}", topic, body);
        if let Err(e) = self.client.publish(topic, self.qos, retain, body).await {
            error!("MQTT publish failed: {}", e);
        }
    }

    pub async fn publish_status(&self, online: bool) {
        let payload = if online { ONLINE_PAYLOAD } else { OFFLINE_PAYLOAD };
        if let Err(e) = self
            .client
            .publish(self.topics.status(), self.qos, true, payload)
            .await
        {
            error!("MQTT publish failed: {}", e);
        }
    }

    pub async fn publish_device(&self, device: &Device) {
        let payload = json!({
            "model": device.model,
            "serial_number": device.serial_number,
            "firmware_version": device.firmware_version,
        });
        self.publish_json(self.topics.config(), &payload, true).await;
    }

    pub async fn publish_area(&self, area: &Area) {
        let name = self.area_name(area);
        let mut payload = json!({
            "id": area.id,
            "name": name,
            "number": area.number,
            "status": area.state.description(),
        });
        if area.state == AreaState::PartArmed {
            payload["part_arm"] = json!(area.part_arm);
        }
        self.publish_json(self.topics.area(name), &payload, self.retain)
            .await;
    }

    pub async fn publish_zone(&self, zone: &Zone) {
        let name = self.zone_name(zone);
        let payload = json!({
            "id": zone.id,
            "name": name,
            "number": zone.number,
            "status": zone.state.description(),
            "type": zone.zone_type.description(),
        });
        self.publish_json(self.topics.zone(name), &payload, self.retain)
            .await;
    }

    pub async fn publish_log(&self, event: &LogEvent) {
        match serde_json::to_value(event) {
            Ok(mut payload) => {
                payload["group_description"] =
                    json!(log_group_description(event.group_type));
                self.publish_json(self.topics.log(), &payload, self.retain_log)
                    .await;
            }
            Err(e) => error!("Cannot serialize log event: {}", e),
        }
    }

    /// Publish the whole model: device identity plus every area and zone.
    pub async fn publish_snapshot(&self, panel: &Panel) {
        self.publish_device(&panel.device()).await;
        for area in panel.areas() {
            self.publish_area(&area).await;
        }
        for zone in panel.zones() {
            self.publish_zone(&zone).await;
        }
    }

    /// Subscribe to the command topics: text, datetime, and one command
    /// topic per area. Safe to repeat after reconnects.
    pub async fn subscribe_commands(&self, panel: &Panel) -> Result<()> {
        let mut topics = vec![self.topics.text(), self.topics.datetime()];
        for area in panel.areas() {
            topics.push(self.topics.area_command(self.area_name(&area)));
        }
        for topic in topics {
            debug!("Subscribing to {}", topic);
            self.client
                .subscribe(topic, self.qos)
                .await
                .map_err(|e| TexecomError::Config(format!("MQTT subscribe failed: {}", e)))?;
        }
        Ok(())
    }

    /// Route one inbound message to the panel.
    pub async fn handle_message(&self, topic: &str, payload: &str, panel: &Panel) {
        debug!("Message on {}: {}", topic, payload);

        if topic == self.topics.text() {
            if let Err(e) = panel.set_lcd(payload).await {
                error!("Set LCD failed: {}", e);
            }
            return;
        }

        if topic == self.topics.datetime() {
            match DateTime::parse_from_rfc3339(payload) {
                Ok(t) => {
                    if let Err(e) = panel.set_datetime(&t.with_timezone(&Utc)).await {
                        error!("Set date/time failed: {}", e);
                    }
                }
                Err(_) => warn!("Invalid datetime payload: {}", payload),
            }
            return;
        }

        for area in panel.areas() {
            if topic == self.topics.area_command(self.area_name(&area)) {
                self.handle_area_command(&area, payload, panel).await;
                return;
            }
        }

        warn!("Message on unexpected topic: {}", topic);
    }

    async fn handle_area_command(&self, area: &Area, command: &str, panel: &Panel) {
        let aliases = self.area_aliases.get(&area.id);
        let matches = |builtin: &str, alias: Option<&String>| {
            command == builtin || alias.is_some_and(|a| a == command)
        };

        let result = if matches("full_arm", aliases.and_then(|a| a.full_arm.as_ref())) {
            panel.arm(area.number, ArmType::Full).await
        } else if matches("part_arm_1", aliases.and_then(|a| a.part_arm_1.as_ref())) {
            panel.arm(area.number, ArmType::PartArm1).await
        } else if matches("part_arm_2", aliases.and_then(|a| a.part_arm_2.as_ref())) {
            panel.arm(area.number, ArmType::PartArm2).await
        } else if matches("part_arm_3", aliases.and_then(|a| a.part_arm_3.as_ref())) {
            panel.arm(area.number, ArmType::PartArm3).await
        } else if command == "disarm" {
            panel.disarm(area.number).await
        } else if command == "reset" {
            panel.reset(area.number).await
        } else {
            warn!("Unknown command for area {}: {}", area.id, command);
            return;
        };

        match result {
            Ok(()) => info!("Command '{}' for area {} accepted", command, area.id),
            Err(e) => error!("Command '{}' for area {} failed: {}", command, area.id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_shapes() {
        let topics = Topics::new("texecom2mqtt");
        assert_eq!(topics.status(), "texecom2mqtt/status");
        assert_eq!(topics.config(), "texecom2mqtt/config");
        assert_eq!(topics.area("Downstairs"), "texecom2mqtt/area/downstairs");
        assert_eq!(
            topics.area_command("Downstairs"),
            "texecom2mqtt/area/downstairs/command"
        );
        assert_eq!(topics.zone("Front Door"), "texecom2mqtt/zone/front-door");
        assert_eq!(topics.log(), "texecom2mqtt/log");
        assert_eq!(topics.text(), "texecom2mqtt/text");
        assert_eq!(topics.datetime(), "texecom2mqtt/datetime");
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(qos_from_u8(0), QoS::AtMostOnce);
        assert_eq!(qos_from_u8(1), QoS::AtLeastOnce);
        assert_eq!(qos_from_u8(2), QoS::ExactlyOnce);
    }
}
