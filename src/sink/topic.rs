//! Topic names and discovery metadata for published sensors

use crate::classifier::ActionKind;
use crate::keyboard::KeyId;
use serde::{Deserialize, Serialize};

/// Make a key name safe to embed in a topic path
pub fn sanitize_key_name(key: &str) -> String {
    const REPLACEMENTS: &[(&str, &str)] = &[
        (" ", "_"),
        ("+", "plus"),
        ("-", "minus"),
        ("*", "asterisk"),
        ("/", "slash"),
        ("\\", "backslash"),
        (".", "dot"),
        (",", "comma"),
        ("=", "equals"),
        ("'", "quote"),
        ("[", "lbracket"),
        ("]", "rbracket"),
    ];

    REPLACEMENTS
        .iter()
        .fold(key.trim().to_lowercase(), |name, (from, to)| name.replace(from, to))
}

fn suffix(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Single => "",
        ActionKind::Double => "_double",
        ActionKind::Long => "_long",
    }
}

fn display_name(key: &KeyId, kind: ActionKind) -> String {
    match kind {
        ActionKind::Single => key.to_string(),
        ActionKind::Double => format!("{} (Double Press)", key),
        ActionKind::Long => format!("{} (Long Press)", key),
    }
}

/// Device block shared by every discovery announcement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceBlock {
    pub identifiers: Vec<String>,
    pub name: String,
    pub manufacturer: String,
    pub model: String,
}

/// Discovery announcement for one binary sensor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryPayload {
    pub name: String,
    pub state_topic: String,
    pub payload_on: String,
    pub payload_off: String,
    pub unique_id: String,
    pub device: DeviceBlock,
}

/// Builds topics and discovery payloads for `(key, kind)` pairs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicBuilder {
    pub prefix: String,
    pub device_id: String,
    pub device_name: String,
    pub manufacturer: String,
    pub model: String,
}

impl TopicBuilder {
    pub fn new(prefix: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            device_id: device_id.into(),
            device_name: "Keyboard Pulse".to_string(),
            manufacturer: "keypulse".to_string(),
            model: "Realtime Keyboard".to_string(),
        }
    }

    fn object_id(&self, key: &KeyId, kind: ActionKind) -> String {
        format!(
            "{}_{}{}",
            self.device_id,
            sanitize_key_name(key.as_str()),
            suffix(kind)
        )
    }

    /// Topic the ON/OFF state is published to
    pub fn state_topic(&self, key: &KeyId, kind: ActionKind) -> String {
        format!(
            "{}/binary_sensor/{}/state",
            self.prefix,
            self.object_id(key, kind)
        )
    }

    /// Topic the retained discovery announcement is published to
    pub fn discovery_topic(&self, key: &KeyId, kind: ActionKind) -> String {
        format!(
            "{}/binary_sensor/{}/config",
            self.prefix,
            self.object_id(key, kind)
        )
    }

    pub fn discovery_payload(&self, key: &KeyId, kind: ActionKind) -> DiscoveryPayload {
        DiscoveryPayload {
            name: display_name(key, kind),
            state_topic: self.state_topic(key, kind),
            payload_on: "ON".to_string(),
            payload_off: "OFF".to_string(),
            unique_id: self.object_id(key, kind),
            device: DeviceBlock {
                identifiers: vec![self.device_id.clone()],
                name: self.device_name.clone(),
                manufacturer: self.manufacturer.clone(),
                model: self.model.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_symbols() {
        assert_eq!(sanitize_key_name("  Left Shift "), "left_shift");
        assert_eq!(sanitize_key_name("KP+"), "kpplus");
        assert_eq!(sanitize_key_name("a-b*c/d\\e"), "aminusbasteriskcslashdbackslashe");
        assert_eq!(sanitize_key_name(".,='[]"), "dotcommaequalsquotelbracketrbracket");
    }

    #[test]
    fn topics_follow_binary_sensor_layout() {
        let topics = TopicBuilder::new("homeassistant", "desk");
        let key = KeyId::from("ENTER");

        assert_eq!(
            topics.state_topic(&key, ActionKind::Single),
            "homeassistant/binary_sensor/desk_enter/state"
        );
        assert_eq!(
            topics.state_topic(&key, ActionKind::Double),
            "homeassistant/binary_sensor/desk_enter_double/state"
        );
        assert_eq!(
            topics.discovery_topic(&key, ActionKind::Long),
            "homeassistant/binary_sensor/desk_enter_long/config"
        );
    }

    #[test]
    fn discovery_payload_describes_sensor() {
        let topics = TopicBuilder::new("homeassistant", "desk");
        let payload = topics.discovery_payload(&KeyId::from("A"), ActionKind::Double);

        assert_eq!(payload.name, "A (Double Press)");
        assert_eq!(payload.unique_id, "desk_a_double");
        assert_eq!(payload.state_topic, "homeassistant/binary_sensor/desk_a_double/state");
        assert_eq!(payload.device.identifiers, vec!["desk".to_string()]);

        let json = serde_json::to_value(&payload).expect("serialize");
        assert_eq!(json["payload_on"], "ON");
        assert_eq!(json["payload_off"], "OFF");
        assert_eq!(json["device"]["model"], "Realtime Keyboard");
    }
}
