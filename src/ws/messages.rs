//! Hub wire messages: client commands and server events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Commands a client sends over the hub connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Fan live trainer metrics to all other connections. Never appends
    /// to the event store; persisted metrics go through the HTTP append
    /// route.
    #[serde(rename_all = "camelCase")]
    SendMetrics {
        /// Power output in watts.
        #[serde(default)]
        watts: f64,
        /// Cadence in rpm.
        #[serde(default)]
        cadence: f64,
        /// Heart rate in bpm.
        #[serde(default)]
        heart_rate: f64,
    },
    /// Join a stream group and receive its current derived state.
    #[serde(rename_all = "camelCase")]
    SubscribeToStream {
        /// Stream to subscribe to. Empty logs a warning and does nothing.
        stream_id: String,
    },
}

/// Server-to-client envelope.
///
/// `event` is one of the wire names in [`crate::domain::hub_event`]
/// (plus `"error"` for malformed client input).
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    /// Event name, e.g. `matchState`.
    #[serde(rename = "type")]
    pub event: String,
    /// Event-specific payload.
    pub payload: Value,
    /// Server send time.
    pub ts: DateTime<Utc>,
}

impl ServerMessage {
    /// Builds an envelope stamped with the current time.
    #[must_use]
    pub fn new(event: impl Into<String>, payload: Value) -> Self {
        Self {
            event: event.into(),
            payload,
            ts: Utc::now(),
        }
    }

    /// Serialises the envelope, falling back to an empty string on the
    /// (unreachable) serialisation failure.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn send_metrics_parses() {
        let msg: Result<ClientMessage, _> = serde_json::from_str(
            r#"{ "type": "sendMetrics", "watts": 310, "cadence": 92, "heartRate": 148 }"#,
        );
        let Ok(ClientMessage::SendMetrics {
            watts,
            cadence,
            heart_rate,
        }) = msg
        else {
            panic!("expected sendMetrics");
        };
        assert!((watts - 310.0).abs() < f64::EPSILON);
        assert!((cadence - 92.0).abs() < f64::EPSILON);
        assert!((heart_rate - 148.0).abs() < f64::EPSILON);
    }

    #[test]
    fn send_metrics_defaults_missing_fields() {
        let msg: Result<ClientMessage, _> = serde_json::from_str(r#"{ "type": "sendMetrics" }"#);
        let Ok(ClientMessage::SendMetrics { watts, .. }) = msg else {
            panic!("expected sendMetrics");
        };
        assert!((watts - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn subscribe_to_stream_parses() {
        let msg: Result<ClientMessage, _> =
            serde_json::from_str(r#"{ "type": "subscribeToStream", "streamId": "m1" }"#);
        let Ok(ClientMessage::SubscribeToStream { stream_id }) = msg else {
            panic!("expected subscribeToStream");
        };
        assert_eq!(stream_id, "m1");
    }

    #[test]
    fn unknown_command_is_rejected() {
        let msg: Result<ClientMessage, _> =
            serde_json::from_str(r#"{ "type": "teleport", "to": "mars" }"#);
        assert!(msg.is_err());
    }

    #[test]
    fn server_message_envelope_shape() {
        let msg = ServerMessage::new("matchState", json!({ "scoreHome": 1 }));
        let value: Value = serde_json::from_str(&msg.to_json()).ok().unwrap_or_else(|| {
            panic!("round trip failed");
        });
        assert_eq!(value["type"], "matchState");
        assert_eq!(value["payload"]["scoreHome"], 1);
        assert!(value.get("ts").is_some());
    }
}
