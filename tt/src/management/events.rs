//! Client and server events on the streaming session
//!
//! Every message is a JSON object tagged by its `type` field.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::filter::StreamingFilters;

/// Messages sent from this client to the management endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Begin streaming logs, optionally restricted by filters
    StartStreaming {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filters: Option<StreamingFilters>,
    },
}

/// One log line produced by the remote connector
///
/// Missing and `null` values both decode as empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub time: String,
    #[serde(deserialize_with = "null_as_default")]
    pub level: String,
    #[serde(deserialize_with = "null_as_default")]
    pub event: String,
    #[serde(deserialize_with = "null_as_default")]
    pub message: String,
    #[serde(deserialize_with = "null_as_default")]
    pub fields: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Messages received from the management endpoint
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// A batch of log records, in the order the remote produced them
    Logs(Vec<LogRecord>),

    /// A `logs` event whose payload did not match the record schema
    Invalid { event_type: String, error: String },

    /// Any type this client does not handle
    Unknown { event_type: String },
}

impl ServerEvent {
    pub const LOGS: &'static str = "logs";

    /// The `type` tag this event arrived with
    pub fn event_type(&self) -> &str {
        match self {
            ServerEvent::Logs(_) => Self::LOGS,
            ServerEvent::Invalid { event_type, .. } | ServerEvent::Unknown { event_type } => event_type,
        }
    }
}

#[derive(Deserialize)]
struct LogsPayload {
    #[serde(default, deserialize_with = "null_as_default")]
    logs: Vec<LogRecord>,
}

/// Decode one server message
///
/// Fails only when the payload is not a JSON object. A missing or unrecognized
/// `type` tag decodes as [`ServerEvent::Unknown`].
pub fn decode_server_event(payload: &[u8]) -> Result<ServerEvent, serde_json::Error> {
    let value: Map<String, Value> = serde_json::from_slice(payload)?;
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    debug!(%event_type, "decode_server_event: decoded envelope");

    if event_type != ServerEvent::LOGS {
        return Ok(ServerEvent::Unknown { event_type });
    }

    match serde_json::from_value::<LogsPayload>(Value::Object(value)) {
        Ok(payload) => Ok(ServerEvent::Logs(payload.logs)),
        Err(e) => {
            debug!(error = %e, "decode_server_event: logs payload did not match schema");
            Ok(ServerEvent::Invalid {
                event_type,
                error: e.to_string(),
            })
        }
    }
}
