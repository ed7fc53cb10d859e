//! WebSocket wire protocol
//!
//! Client → server: `{"type": "ping"|"subscribe"|"unsubscribe", "channel"?, "timestamp"?}`
//!
//! Server → client: `{"type", "channel"?, "authenticated"?, "data"?, "message"?, "timestamp"?}`
//! where `type` is `connected`, `pong`, `subscribed`, `unsubscribed`,
//! `subscribe_failed`, `error`, or an event kind such as `book.created`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::events::DomainEvent;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Ping {
        #[serde(default)]
        timestamp: Option<String>,
    },
    Subscribe {
        #[serde(default)]
        channel: Option<String>,
    },
    Unsubscribe {
        #[serde(default)]
        channel: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authenticated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl ServerMessage {
    fn bare(kind: &str) -> Self {
        Self {
            kind: kind.to_string(),
            channel: None,
            authenticated: None,
            data: None,
            message: None,
            timestamp: None,
        }
    }

    pub fn connected(channel: &str, authenticated: bool) -> Self {
        Self {
            channel: Some(channel.to_string()),
            authenticated: Some(authenticated),
            message: Some(format!("Connected to channel '{}'", channel)),
            ..Self::bare("connected")
        }
    }

    /// Echoes the client's timestamp.
    pub fn pong(timestamp: Option<String>) -> Self {
        Self {
            timestamp,
            ..Self::bare("pong")
        }
    }

    pub fn subscribed(channel: &str) -> Self {
        Self {
            channel: Some(channel.to_string()),
            message: Some(format!("Subscribed to channel '{}'", channel)),
            ..Self::bare("subscribed")
        }
    }

    pub fn unsubscribed(channel: &str) -> Self {
        Self {
            channel: Some(channel.to_string()),
            message: Some(format!("Unsubscribed from channel '{}'", channel)),
            ..Self::bare("unsubscribed")
        }
    }

    pub fn subscribe_failed(channel: &str, message: impl Into<String>) -> Self {
        Self {
            channel: Some(channel.to_string()),
            message: Some(message.into()),
            ..Self::bare("subscribe_failed")
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::bare("error")
        }
    }

    pub fn event(event: &DomainEvent, channel: &str) -> Self {
        Self {
            channel: Some(channel.to_string()),
            data: Some(event.data.clone()),
            timestamp: Some(event.timestamp.to_rfc3339()),
            ..Self::bare(&event.kind)
        }
    }

    pub fn to_json(&self) -> String {
        // A struct of strings, bools and `Value`s always serializes.
        serde_json::to_string(self).unwrap_or_else(|_| String::from("{}"))
    }
}

/// Parse an inbound frame, mapping failures to the `error` reply.
pub fn parse_client_message(text: &str) -> Result<ClientMessage, ServerMessage> {
    let value: Value = serde_json::from_str(text)
        .map_err(|_| ServerMessage::error("Invalid JSON message"))?;

    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    serde_json::from_value(value)
        .map_err(|_| ServerMessage::error(format!("Unknown message type: {}", kind)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_parse_known_types() {
        assert_eq!(
            parse_client_message(r#"{"type":"ping","timestamp":"t1"}"#).unwrap(),
            ClientMessage::Ping { timestamp: Some("t1".into()) }
        );
        assert_eq!(
            parse_client_message(r#"{"type":"subscribe","channel":"books"}"#).unwrap(),
            ClientMessage::Subscribe { channel: Some("books".into()) }
        );
        assert_eq!(
            parse_client_message(r#"{"type":"unsubscribe"}"#).unwrap(),
            ClientMessage::Unsubscribe { channel: None }
        );
    }

    #[test]
    fn test_parse_failures() {
        let reply = parse_client_message("not json").unwrap_err();
        assert_eq!(reply.kind, "error");

        let reply = parse_client_message(r#"{"type":"auth","token":"x"}"#).unwrap_err();
        assert_eq!(reply.message.as_deref(), Some("Unknown message type: auth"));
    }

    #[test]
    fn test_connected_shape() {
        let text = ServerMessage::connected("books", false).to_json();
        let json: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "connected",
                "channel": "books",
                "authenticated": false,
                "message": "Connected to channel 'books'"
            })
        );
    }

    #[test]
    fn test_pong_omits_absent_timestamp() {
        assert_eq!(ServerMessage::pong(None).to_json(), r#"{"type":"pong"}"#);
        assert_eq!(
            ServerMessage::pong(Some("t1".into())).to_json(),
            r#"{"type":"pong","timestamp":"t1"}"#
        );
    }
}
