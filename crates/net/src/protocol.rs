//! Wire protocol types
//!
//! HTTP request/response bodies and WebSocket frames. Everything is
//! JSON; auth failures are bare JSON strings so clients can display the
//! body verbatim.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the session cookie set on login/registration
pub const SESSION_COOKIE: &str = "session_token";

/// Credentials for login and registration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Successful login/registration response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub message: String,
    pub user_id: Uuid,
    pub session_token: String,
}

/// Identity of the authenticated user (`GET /api/me`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeResponse {
    pub user_id: Uuid,
    pub username: String,
}

/// Query parameters for `GET /api/get_chat_history`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: u32,
}

fn default_history_limit() -> u32 {
    50
}

/// Frame sent by a client over the WebSocket
///
/// The sender never names itself; the server resolves the token to a
/// user and attributes the message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientFrame {
    pub session_token: String,
    pub content: String,
}

/// Frame broadcast by the server to every connected client
///
/// Also the element type of history responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    pub username: String,
    pub content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_roundtrip() {
        let frame = ClientFrame {
            session_token: "tok".to_string(),
            content: "Hello".to_string(),
        };

        let json = serde_json::to_string(&frame).unwrap();
        let decoded: ClientFrame = serde_json::from_str(&json).unwrap();

        assert_eq!(decoded.session_token, "tok");
        assert_eq!(decoded.content, "Hello");
    }

    #[test]
    fn test_wire_message_field_names() {
        // Browser clients read these two fields by name
        let wire = WireMessage {
            username: "alice".to_string(),
            content: "hi".to_string(),
        };
        let value = serde_json::to_value(&wire).unwrap();
        assert_eq!(value["username"], "alice");
        assert_eq!(value["content"], "hi");
    }

    #[test]
    fn test_history_limit_defaults() {
        let query: HistoryQuery = serde_json::from_str("{}").unwrap();
        assert_eq!(query.limit, 50);

        let query: HistoryQuery = serde_json::from_str(r#"{"limit": 10}"#).unwrap();
        assert_eq!(query.limit, 10);
    }

    #[test]
    fn test_frame_missing_token_rejected() {
        let result = serde_json::from_str::<ClientFrame>(r#"{"content": "hi"}"#);
        assert!(result.is_err());
    }
}
