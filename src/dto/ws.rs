//! Inbound WebSocket messages.
//!
//! Every frame is a JSON object with a `message_type`; the remaining fields
//! form the payload of the handler registered for that type.

use std::collections::HashMap;

use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::dto::validation::{validate_nickname, validate_room_code};

/// Fields shared by every inbound frame.
#[derive(Debug, Default, Deserialize)]
pub struct Envelope {
    /// Handler key.
    pub message_type: String,
    /// Free-form headers; `X-Test-Name` is honoured.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Test harness metadata.
    #[serde(default)]
    pub test_context: Option<TestContext>,
    /// Client side trace identifiers.
    #[serde(default)]
    pub trace: Option<TraceFields>,
}

impl Envelope {
    /// `X-Test-Name` header, matched case-insensitively.
    pub fn test_name_header(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case("x-test-name"))
            .map(|(_, value)| value.as_str())
    }
}

/// Test harness metadata.
#[derive(Debug, Default, Deserialize)]
pub struct TestContext {
    /// Name of the end-to-end test.
    pub test_name: Option<String>,
}

/// Client side trace identifiers.
#[derive(Debug, Default, Deserialize)]
pub struct TraceFields {
    /// 32 hex characters.
    pub trace_id: String,
    /// 16 hex characters.
    pub span_id: String,
}

/// Query string accepted by the subscription endpoint.
#[derive(Debug, Default, Deserialize, Validate, IntoParams)]
pub struct SubscribeQuery {
    /// End-to-end test name used for trace correlation.
    #[validate(length(max = 200))]
    pub test_name: Option<String>,
}

/// `create_room`
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoomRequest {
    /// Ruleset to play.
    #[validate(length(min = 1))]
    pub game_name: String,
    /// Host nickname; a random one is generated when omitted.
    #[validate(custom(function = "validate_nickname"))]
    #[serde(default)]
    pub player_nickname: Option<String>,
}

/// `join_lobby`
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct JoinLobbyRequest {
    /// Code of the room to join.
    #[validate(custom(function = "validate_room_code"))]
    pub room_code: String,
    /// Nickname; a random one is generated when omitted.
    #[validate(custom(function = "validate_nickname"))]
    #[serde(default)]
    pub player_nickname: Option<String>,
}

/// `start_game`
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct StartGameRequest {
    /// Room to start.
    #[validate(custom(function = "validate_room_code"))]
    pub room_code: String,
}

/// `kick_player`
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct KickPlayerRequest {
    /// Room of the host.
    #[validate(custom(function = "validate_room_code"))]
    pub room_code: String,
    /// Nickname of the player to remove.
    #[validate(custom(function = "validate_nickname"))]
    pub player_nickname_to_kick: String,
}

/// `update_player_nickname`
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateNicknameRequest {
    /// New nickname.
    #[validate(custom(function = "validate_nickname"))]
    pub player_nickname: String,
}

/// `submit_answer`
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitAnswerRequest {
    /// Answer text.
    #[validate(length(min = 1, max = 500))]
    pub answer: String,
}

/// `submit_vote`
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SubmitVoteRequest {
    /// Nickname of the suspected fibber.
    #[validate(length(min = 1))]
    pub voted_player_nickname: String,
}

/// Payload of messages that carry no fields.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct EmptyRequest {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_reads_optional_fields() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"message_type":"join_lobby","room_code":"ABCDE",
                "headers":{"X-Test-Name":"lobby"},"trace":{"trace_id":"a","span_id":"b"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.message_type, "join_lobby");
        assert_eq!(envelope.test_name_header(), Some("lobby"));
        assert_eq!(envelope.trace.unwrap().span_id, "b");
    }

    #[test]
    fn create_room_nickname_is_optional_but_checked() {
        let request: CreateRoomRequest =
            serde_json::from_str(r#"{"game_name":"fibbing_it"}"#).unwrap();
        assert!(request.validate().is_ok());

        let request: CreateRoomRequest = serde_json::from_value(serde_json::json!({
            "game_name": "fibbing_it",
            "player_nickname": "x".repeat(31),
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }

    #[test]
    fn answers_are_bounded() {
        let empty = SubmitAnswerRequest { answer: String::new() };
        assert!(empty.validate().is_err());
        let long = SubmitAnswerRequest { answer: "a".repeat(501) };
        assert!(long.validate().is_err());
    }
}
