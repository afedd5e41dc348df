//! Outbound view payloads pushed to players.

use serde::Serialize;
use serde_with::skip_serializing_none;
use time::OffsetDateTime;
use utoipa::ToSchema;

use crate::dao::models::{PlayerRole, RoundType};

/// Every payload a client can receive, discriminated by `message_type`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "message_type", rename_all = "snake_case")]
pub enum View {
    /// Lobby screen.
    Lobby(LobbyView),
    /// Answering screen.
    Question(QuestionView),
    /// Voting screen.
    Voting(VotingView),
    /// Role reveal screen.
    RevealRole(RevealView),
    /// Scoreboard between round types.
    Scoring(ScoreboardView),
    /// Final scoreboard.
    Winner(ScoreboardView),
    /// Sent to a player the host removed.
    Kicked(KickedView),
    /// A request failed.
    Error(ErrorView),
}

impl View {
    /// Value of the `message_type` discriminator.
    pub fn message_type(&self) -> &'static str {
        match self {
            View::Lobby(_) => "lobby",
            View::Question(_) => "question",
            View::Voting(_) => "voting",
            View::RevealRole(_) => "reveal_role",
            View::Scoring(_) => "scoring",
            View::Winner(_) => "winner",
            View::Kicked(_) => "kicked",
            View::Error(_) => "error",
        }
    }
}

/// A player as shown in the lobby.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LobbyPlayer {
    /// Display name.
    pub nickname: String,
    /// SVG avatar.
    pub avatar: String,
    /// Ready flag.
    pub is_ready: bool,
    /// Whether this player hosts the room.
    pub is_host: bool,
}

/// Lobby screen for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LobbyView {
    /// Join code.
    pub room_code: String,
    /// Members in join order.
    pub players: Vec<LobbyPlayer>,
    /// Whether the viewer hosts the room.
    pub is_host: bool,
    /// Viewer's ready flag.
    pub is_ready: bool,
    /// Whether the viewer may start the game now.
    pub can_start: bool,
}

/// Answering screen for one player.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuestionView {
    /// Join code.
    pub room_code: String,
    /// Current round type.
    pub round_type: RoundType,
    /// Round within the round type, starting at 1.
    pub round_number: i32,
    /// Viewer's role.
    pub role: PlayerRole,
    /// Question text in the viewer's locale.
    pub question: String,
    /// Allowed answers; empty for free text.
    pub answer_options: Vec<String>,
    /// Viewer's current answer.
    pub current_answer: Option<String>,
    /// Whether the viewer locked the answer.
    pub is_answer_ready: bool,
    /// End of the answering window.
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
}

/// A candidate on the voting screen.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VotingPlayer {
    /// Display name.
    pub nickname: String,
    /// SVG avatar.
    pub avatar: String,
    /// Answer they gave.
    pub answer: Option<String>,
    /// Votes received so far.
    pub votes: u32,
    /// Whether this entry is the viewer.
    pub is_self: bool,
}

/// Voting screen for one player.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct VotingView {
    /// Join code.
    pub room_code: String,
    /// Current round type.
    pub round_type: RoundType,
    /// Round within the round type.
    pub round_number: i32,
    /// Question normal players answered, in the viewer's locale.
    pub question: String,
    /// Candidates in join order.
    pub players: Vec<VotingPlayer>,
    /// Nickname the viewer voted for.
    pub voted_for: Option<String>,
    /// Whether the viewer locked the vote.
    pub is_vote_ready: bool,
    /// End of the voting window.
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
}

/// Role reveal screen.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RevealView {
    /// Join code.
    pub room_code: String,
    /// Current round type.
    pub round_type: RoundType,
    /// Round within the round type.
    pub round_number: i32,
    /// Most voted player.
    pub voted_for_player_nickname: Option<String>,
    /// Avatar of the most voted player.
    pub voted_for_player_avatar: Option<String>,
    /// Role of the most voted player; only present when revealed.
    pub voted_for_player_role: Option<PlayerRole>,
    /// False on ties or when nobody voted.
    pub should_reveal: bool,
    /// End of the reveal screen.
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
}

/// One line of a scoreboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScoreLine {
    /// Display name.
    pub nickname: String,
    /// SVG avatar.
    pub avatar: String,
    /// Points earned during the round type just played.
    pub points_this_round: i32,
    /// Total points in this game.
    pub total: i32,
    /// 1-based rank; ties share a rank.
    pub rank: u32,
}

/// Scoreboard screen, used for both intermediate scoring and the winner screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ScoreboardView {
    /// Join code.
    pub room_code: String,
    /// Round type the scores were computed after.
    pub round_type: RoundType,
    /// Lines sorted by total, best first.
    pub players: Vec<ScoreLine>,
    /// End of the screen.
    #[serde(with = "time::serde::rfc3339")]
    pub deadline: OffsetDateTime,
}

/// Sent to the removed player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct KickedView {
    /// Room they were removed from.
    pub room_code: String,
}

/// Failure report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ErrorView {
    /// Stable error code.
    pub code: String,
    /// Human readable message.
    pub message: String,
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    #[test]
    fn views_are_tagged_by_message_type() {
        let view = View::Kicked(KickedView {
            room_code: "ABCDE".into(),
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["message_type"], "kicked");
        assert_eq!(json["room_code"], "ABCDE");
    }

    #[test]
    fn missing_optionals_are_omitted_and_deadlines_are_rfc3339() {
        let view = View::RevealRole(RevealView {
            room_code: "ABCDE".into(),
            round_type: RoundType::FreeForm,
            round_number: 1,
            voted_for_player_nickname: None,
            voted_for_player_avatar: None,
            voted_for_player_role: None,
            should_reveal: false,
            deadline: datetime!(2024-05-01 12:00:00 UTC),
        });
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["message_type"], "reveal_role");
        assert!(json.get("voted_for_player_role").is_none());
        assert_eq!(json["deadline"], "2024-05-01T12:00:00Z");
    }
}
