//! Wire protocol for the WebSocket API
//!
//! Versioned envelope around tagged client/server payloads. Camera frames
//! travel base64-encoded with their content type; the cadence of polling is
//! a client concern.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scene::schema::SceneSummary;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MessageEnvelope<T> {
    pub v: u32,
    #[serde(rename = "type")]
    pub msg_type: String,
    pub request_id: Option<Uuid>,
    pub event_id: Option<u64>,
    pub payload: T,
}

impl<T> MessageEnvelope<T> {
    pub fn event(event_id: u64, payload: T) -> Self {
        Self {
            v: 1,
            msg_type: "event".to_string(),
            request_id: None,
            event_id: Some(event_id),
            payload,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        client: ClientInfo,
    },
    /// Chat turn; omitting session_id creates a session
    ChatTurn {
        session_id: Option<Uuid>,
        message: String,
    },
    ReadSensors {
        session_id: Uuid,
    },
    ReadCamera {
        session_id: Uuid,
        camera: Option<String>,
    },
    SetControl {
        session_id: Uuid,
        throttle: f64,
        steering: f64,
    },
    DescribeSession {
        session_id: Uuid,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    HelloAck {
        server: ServerInfo,
    },
    ChatReply {
        session_id: Uuid,
        is_new_session: bool,
        user_message: String,
        assistant_message: String,
        scene_summary: Option<SceneSummary>,
        scene_spec: Option<serde_json::Value>,
    },
    Sensors {
        session_id: Uuid,
        values: serde_json::Value,
        sim_time: f64,
        stale: bool,
    },
    CameraFrame {
        session_id: Uuid,
        camera: String,
        content_type: String,
        /// base64-encoded image bytes
        data: String,
    },
    /// Expected transient condition, not an error
    CameraUnavailable {
        session_id: Uuid,
        reason: String,
    },
    ControlAck {
        session_id: Uuid,
        throttle: f64,
        steering: f64,
    },
    SessionInfo {
        session_id: Uuid,
        created_at: String,
        last_active: String,
        scene_summary: Option<SceneSummary>,
        simulation_running: bool,
    },
    Error {
        code: String,
        message: String,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_round_trip() {
        let msg = ClientMessage::SetControl {
            session_id: Uuid::new_v4(),
            throttle: 1.0,
            steering: -0.5,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"set_control\""));
        let parsed: ClientMessage = serde_json::from_str(&json).unwrap();
        assert!(matches!(parsed, ClientMessage::SetControl { .. }));
    }

    #[test]
    fn test_chat_turn_without_session_id() {
        let json = r#"{"type": "chat_turn", "session_id": null, "message": "an orchard"}"#;
        let parsed: ClientMessage = serde_json::from_str(json).unwrap();
        match parsed {
            ClientMessage::ChatTurn {
                session_id,
                message,
            } => {
                assert!(session_id.is_none());
                assert_eq!(message, "an orchard");
            }
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn test_envelope_shape() {
        let envelope = MessageEnvelope::event(
            7,
            ServerEvent::Error {
                code: "session_not_found".to_string(),
                message: "start a new session".to_string(),
            },
        );
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains("\"event_id\":7"));
        assert!(json.contains("\"type\":\"error\""));
    }
}
