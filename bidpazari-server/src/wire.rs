use bidpazari_runtime::errors::CommandFailed;
use chrono::Utc;
use serde_json::{json, Value};

use crate::errors::WireError;

pub struct Request {
    pub command: String,
    pub params: Value,
}

/// Parses one inbound message. JSON and shape errors are both FATAL per
/// the wire protocol -- the caller closes the connection after sending
/// the resulting error response.
pub fn decode_request(raw: &str) -> Result<Request, WireError> {
    let value: Value = serde_json::from_str(raw)?;
    let command = value
        .get("command")
        .and_then(Value::as_str)
        .ok_or(WireError::MissingCommand)?
        .to_string();
    let params = value.get("params").cloned().unwrap_or(json!({}));
    Ok(Request { command, params })
}

/// `code: 0` success envelope.
pub fn encode_ok(event: &str, result: Value) -> Value {
    json!({
        "event": event,
        "timestamp": Utc::now().to_rfc3339(),
        "code": 0,
        "result": result,
    })
}

/// `code: 1` (recoverable) or `code: 2` (fatal) depending on the kind of
/// `CommandFailed` -- an unrecognised command is surfaced as FATAL, the
/// same as a decode failure, even though the dispatcher models it as part
/// of the same enum as every other user-visible error for convenience.
pub fn encode_command_failed(event: &str, err: &CommandFailed) -> (Value, bool) {
    if let CommandFailed::InvalidCommand(name) = err {
        let body = json!({
            "event": event,
            "timestamp": Utc::now().to_rfc3339(),
            "code": 2,
            "error": { "exception": "InvalidCommand", "message": format!("unknown command: {}", name) },
        });
        return (body, true);
    }

    let body = json!({
        "event": event,
        "timestamp": Utc::now().to_rfc3339(),
        "code": 1,
        "error": { "message": err.to_string() },
    });
    (body, false)
}

/// `code: 2` envelope for transport-level failures (decode errors,
/// unrecognised request shape). The connection is always closed after.
pub fn encode_wire_error(event: &str, err: &WireError) -> Value {
    json!({
        "event": event,
        "timestamp": Utc::now().to_rfc3339(),
        "code": 2,
        "error": { "exception": err.exception_name(), "message": err.to_string() },
    })
}

/// Server-initiated push, WS-only. Reuses the same envelope shape with a
/// fixed `notification` event name.
pub fn encode_notification(result: Value) -> Value {
    json!({
        "event": "notification",
        "timestamp": Utc::now().to_rfc3339(),
        "code": 0,
        "result": result,
    })
}

/// Serialises a response with object keys sorted, for a stable wire
/// representation regardless of field insertion order.
pub fn to_wire_string(value: &Value) -> String {
    serde_json::to_string(&sort_object_keys(value)).expect("JSON values are always serialisable")
}

fn sort_object_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                sorted.insert(key.clone(), sort_object_keys(&map[key]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_object_keys).collect()),
        other => other.clone(),
    }
}
