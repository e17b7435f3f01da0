/// Analytics event records and the upload envelope.
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Account flavor an action was performed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountType {
    EvmServer,
    EvmSmart,
    Solana,
}

/// Raised when an instrumented method returns a trackable error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEventData {
    /// Registered method name, e.g. `create_end_user`.
    pub method: String,
    pub message: String,
    pub stack: Option<String>,
}

/// A usage record for a public operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionEventData {
    pub action: String,
    pub account_type: Option<AccountType>,
    pub properties: Option<Map<String, Value>>,
}

/// Everything the sink accepts. Serializes with a `name` tag of
/// `"error"` or `"action"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "lowercase")]
pub enum EventData {
    Error(ErrorEventData),
    Action(ActionEventData),
}

impl EventData {
    pub fn name(&self) -> &'static str {
        match self {
            EventData::Error(_) => "error",
            EventData::Action(_) => "action",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, EventData::Error(_))
    }

    pub fn as_error(&self) -> Option<&ErrorEventData> {
        match self {
            EventData::Error(data) => Some(data),
            EventData::Action(_) => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionEventData> {
        match self {
            EventData::Action(data) => Some(data),
            EventData::Error(_) => None,
        }
    }
}

/// Language tag sent with every event.
pub const SDK_LANGUAGE: &str = "rust";

/// Build the JSON body posted to the analytics endpoint.
///
/// `e` carries the one-element event array as a string and `checksum` is the
/// hex MD5 of `e` followed by the decimal millisecond timestamp.
pub fn build_payload(
    event: &EventData,
    identifier: &str,
    client_id: &str,
    timestamp_ms: u64,
) -> Result<Value, serde_json::Error> {
    let mut properties = match serde_json::to_value(event)? {
        Value::Object(map) => map,
        other => {
            let mut map = Map::new();
            map.insert("event".into(), other);
            map
        }
    };
    properties.insert("project_name".into(), json!("cdp-sdk"));
    properties.insert("cdp_sdk_language".into(), json!(SDK_LANGUAGE));
    properties.insert("version".into(), json!(env!("CARGO_PKG_VERSION")));

    let events = json!([{
        "user_id": identifier,
        "event_type": event.name(),
        "platform": "server",
        "timestamp": timestamp_ms,
        "event_properties": properties,
    }]);
    let stringified = serde_json::to_string(&events)?;
    let checksum = checksum(&stringified, timestamp_ms);

    Ok(json!({
        "client": client_id,
        "e": stringified,
        "checksum": checksum,
    }))
}

/// Hex MD5 of the stringified events followed by the upload time.
pub fn checksum(stringified_events: &str, timestamp_ms: u64) -> String {
    use md5::{Digest, Md5};

    let mut hasher = Md5::new();
    hasher.update(stringified_events.as_bytes());
    hasher.update(timestamp_ms.to_string().as_bytes());
    hex::encode(hasher.finalize())
}
