use std::collections::HashMap;

use hive_common::Value;
use uuid::Uuid;

use crate::error::NetError;

/// Reserved `type` values defined in §6. `NODE_HANDSHAKE` is never framed as
/// JSON: it is carried as a raw UTF-8 node-id during connection setup,
/// before any [`Message`] is exchanged.
pub const TYPE_SERVICE_REGISTRATION: &str = "service-registration";
pub const TYPE_SERVICE_REQUEST: &str = "service-request";
pub const TYPE_SERVICE_RESPONSE: &str = "service-response";

const PARAM_PREFIX: &str = "p:";
const RESULT_PREFIX: &str = "r:";

/// Wire-level message: a type, a uuid, and a flat string attribute map.
/// Serialized as one JSON object per binary WebSocket frame (§4.3):
/// `{ "type": ..., "uuid": ..., "<attr-key>": "<attr-value>", ... }`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: String,
    pub uuid: Uuid,
    pub attributes: HashMap<String, String>,
}

impl Message {
    pub fn new(message_type: impl Into<String>) -> Self {
        Self {
            message_type: message_type.into(),
            uuid: Uuid::new_v4(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn set_param(&mut self, name: &str, value: &Value) {
        self.attributes
            .insert(format!("{PARAM_PREFIX}{name}"), value.to_attribute_string());
    }

    pub fn set_result(&mut self, name: &str, value: &Value) {
        self.attributes
            .insert(format!("{RESULT_PREFIX}{name}"), value.to_attribute_string());
    }

    /// Parameters carried by a `service-request` message, stripped of the
    /// reserved `p:` prefix.
    pub fn params(&self) -> HashMap<String, String> {
        self.prefixed(PARAM_PREFIX)
    }

    /// Results carried by a `service-response` message, stripped of the
    /// reserved `r:` prefix.
    pub fn results(&self) -> HashMap<String, String> {
        self.prefixed(RESULT_PREFIX)
    }

    fn prefixed(&self, prefix: &str) -> HashMap<String, String> {
        self.attributes
            .iter()
            .filter_map(|(k, v)| k.strip_prefix(prefix).map(|name| (name.to_string(), v.clone())))
            .collect()
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, NetError> {
        let mut map = serde_json::Map::new();
        map.insert(
            "type".to_string(),
            serde_json::Value::String(self.message_type.clone()),
        );
        map.insert(
            "uuid".to_string(),
            serde_json::Value::String(self.uuid.to_string()),
        );
        for (k, v) in &self.attributes {
            map.insert(k.clone(), serde_json::Value::String(v.clone()));
        }
        Ok(serde_json::to_vec(&serde_json::Value::Object(map))?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, NetError> {
        let value: serde_json::Value = serde_json::from_slice(bytes)?;
        let obj = value
            .as_object()
            .ok_or_else(|| NetError::InvalidMessage("frame is not a JSON object".to_string()))?;

        let message_type = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NetError::InvalidMessage("missing \"type\"".to_string()))?
            .to_string();

        let uuid = obj
            .get("uuid")
            .and_then(|v| v.as_str())
            .ok_or_else(|| NetError::InvalidMessage("missing \"uuid\"".to_string()))?;
        let uuid = Uuid::parse_str(uuid)
            .map_err(|e| NetError::InvalidMessage(format!("invalid uuid: {e}")))?;

        let mut attributes = HashMap::new();
        for (k, v) in obj {
            if k == "type" || k == "uuid" {
                continue;
            }
            if let Some(s) = v.as_str() {
                attributes.insert(k.clone(), s.to_string());
            }
        }

        Ok(Self {
            message_type,
            uuid,
            attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let msg = Message::new(TYPE_SERVICE_REGISTRATION).with_attribute("service-name", "add");
        let bytes = msg.to_json_bytes().unwrap();
        let decoded = Message::from_json_bytes(&bytes).unwrap();
        assert_eq!(decoded.message_type, TYPE_SERVICE_REGISTRATION);
        assert_eq!(decoded.attributes.get("service-name").unwrap(), "add");
        assert_eq!(decoded.uuid, msg.uuid);
    }

    #[test]
    fn params_and_results_strip_reserved_prefixes() {
        let mut msg = Message::new(TYPE_SERVICE_REQUEST);
        msg.set_param("a", &Value::Int(5));
        msg.set_param("b", &Value::Int(6));
        let params = msg.params();
        assert_eq!(params.get("a").unwrap(), "5");
        assert_eq!(params.get("b").unwrap(), "6");

        let mut response = Message::new(TYPE_SERVICE_RESPONSE);
        response.set_result("sum", &Value::Int(11));
        assert_eq!(response.results().get("sum").unwrap(), "11");
    }
}
