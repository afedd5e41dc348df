use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::storage::StorageError;

/// Lifecycle state stored on every room row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomState {
    /// Lobby is open; players may join, rename and ready up.
    Created,
    /// A game is running for this room.
    Playing,
    /// Progression was suspended out of band.
    Paused,
    /// The game reached its winner screen and ended.
    Finished,
    /// Every player left and the grace period expired.
    Abandoned,
}

impl RoomState {
    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomState::Created => "CREATED",
            RoomState::Playing => "PLAYING",
            RoomState::Paused => "PAUSED",
            RoomState::Finished => "FINISHED",
            RoomState::Abandoned => "ABANDONED",
        }
    }

    /// Terminal rooms no longer own their code and never change state again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RoomState::Finished | RoomState::Abandoned)
    }
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoomState {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CREATED" => Ok(RoomState::Created),
            "PLAYING" => Ok(RoomState::Playing),
            "PAUSED" => Ok(RoomState::Paused),
            "FINISHED" => Ok(RoomState::Finished),
            "ABANDONED" => Ok(RoomState::Abandoned),
            other => Err(StorageError::corrupt("room_state", other)),
        }
    }
}

/// Persisted phase of a running game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum GamePhase {
    /// Players are answering their question.
    #[serde(rename = "FIBBING_IT_QUESTION")]
    Question,
    /// Players vote for who they believe the fibber is.
    #[serde(rename = "FIBBING_IT_VOTING")]
    Voting,
    /// The most voted player's role is shown.
    #[serde(rename = "FIBBING_IT_REVEAL_ROLE")]
    Reveal,
    /// Scoreboard between round types.
    #[serde(rename = "FIBBING_IT_SCORING")]
    Scoring,
    /// Final scoreboard.
    #[serde(rename = "FIBBING_IT_WINNER")]
    Winner,
}

impl GamePhase {
    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            GamePhase::Question => "FIBBING_IT_QUESTION",
            GamePhase::Voting => "FIBBING_IT_VOTING",
            GamePhase::Reveal => "FIBBING_IT_REVEAL_ROLE",
            GamePhase::Scoring => "FIBBING_IT_SCORING",
            GamePhase::Winner => "FIBBING_IT_WINNER",
        }
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GamePhase {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "FIBBING_IT_QUESTION" => Ok(GamePhase::Question),
            "FIBBING_IT_VOTING" => Ok(GamePhase::Voting),
            "FIBBING_IT_REVEAL_ROLE" => Ok(GamePhase::Reveal),
            "FIBBING_IT_SCORING" => Ok(GamePhase::Scoring),
            "FIBBING_IT_WINNER" => Ok(GamePhase::Winner),
            other => Err(StorageError::corrupt("state", other)),
        }
    }
}

/// Kind of question asked during a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoundType {
    /// Open text answers.
    FreeForm,
    /// Agree/disagree scale.
    MultipleChoice,
    /// Answer is one of the players.
    MostLikely,
}

impl RoundType {
    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundType::FreeForm => "free_form",
            RoundType::MultipleChoice => "multiple_choice",
            RoundType::MostLikely => "most_likely",
        }
    }

    /// Round type played after this one, `None` once the game is complete.
    pub fn next(&self) -> Option<RoundType> {
        match self {
            RoundType::FreeForm => Some(RoundType::MultipleChoice),
            RoundType::MultipleChoice => Some(RoundType::MostLikely),
            RoundType::MostLikely => None,
        }
    }
}

impl fmt::Display for RoundType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoundType {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "free_form" => Ok(RoundType::FreeForm),
            "multiple_choice" => Ok(RoundType::MultipleChoice),
            "most_likely" => Ok(RoundType::MostLikely),
            other => Err(StorageError::corrupt("round_type", other)),
        }
    }
}

/// Role a player holds for a single round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRole {
    /// Received the odd question out.
    Fibber,
    /// Received the shared question.
    Normal,
}

impl PlayerRole {
    /// Persisted representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerRole::Fibber => "fibber",
            PlayerRole::Normal => "normal",
        }
    }
}

impl FromStr for PlayerRole {
    type Err = StorageError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "fibber" => Ok(PlayerRole::Fibber),
            "normal" => Ok(PlayerRole::Normal),
            other => Err(StorageError::corrupt("player_role", other)),
        }
    }
}

/// A player row. Players are owned by the room they joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Stable identifier, also used as the pub/sub topic.
    pub id: Uuid,
    /// Display name, unique within the room.
    pub nickname: String,
    /// Rendered avatar bytes.
    pub avatar: Vec<u8>,
    /// Preferred locale, if the client sent one.
    pub locale: Option<String>,
    /// Lobby ready flag.
    pub is_ready: bool,
    /// Set while no endpoint holds a connection for this player.
    pub disconnected_at: Option<OffsetDateTime>,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Last modification timestamp.
    pub updated_at: OffsetDateTime,
}

/// A room row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomEntity {
    /// Primary key.
    pub id: Uuid,
    /// Five character join code.
    pub code: String,
    /// Ruleset played in this room.
    pub game_name: String,
    /// Player allowed to kick and start.
    pub host_player_id: Uuid,
    /// Lifecycle state.
    pub state: RoomState,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Last modification timestamp.
    pub updated_at: OffsetDateTime,
}

/// The single game state row of a playing room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameStateEntity {
    /// Primary key, also the key of the phase machine.
    pub id: Uuid,
    /// Owning room.
    pub room_id: Uuid,
    /// Current phase.
    pub phase: GamePhase,
    /// Round number within the current round type.
    pub round_number: i32,
    /// Current round type.
    pub round_type: RoundType,
    /// End of the current phase.
    pub deadline: OffsetDateTime,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
    /// Last modification timestamp.
    pub updated_at: OffsetDateTime,
}

/// A round row; one per question asked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundEntity {
    /// Primary key.
    pub id: Uuid,
    /// Owning game.
    pub game_state_id: Uuid,
    /// Round number within its round type.
    pub round_number: i32,
    /// Round type.
    pub round_type: RoundType,
    /// Question shown to normal players.
    pub normal_question_id: Uuid,
    /// Question shown to the fibber.
    pub fibber_question_id: Uuid,
    /// Answers submitted after this instant are rejected.
    pub submit_deadline: OffsetDateTime,
    /// Creation timestamp.
    pub created_at: OffsetDateTime,
}

/// Role assignment of a player for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleEntity {
    /// Round the role belongs to.
    pub round_id: Uuid,
    /// Player holding the role.
    pub player_id: Uuid,
    /// Assigned role.
    pub role: PlayerRole,
}

/// An answer row, unique per (round, player).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Primary key.
    pub id: Uuid,
    /// Round answered.
    pub round_id: Uuid,
    /// Author.
    pub player_id: Uuid,
    /// Answer text.
    pub answer: String,
    /// Locked by the player.
    pub is_ready: bool,
    /// When the answer was accepted.
    pub submitted_at: OffsetDateTime,
}

/// A vote row, unique per (round, voter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoteEntity {
    /// Primary key.
    pub id: Uuid,
    /// Round voted in.
    pub round_id: Uuid,
    /// Player casting the vote.
    pub voter_id: Uuid,
    /// Player voted for.
    pub target_player_id: Uuid,
    /// Locked by the voter.
    pub is_ready: bool,
    /// When the vote was accepted.
    pub submitted_at: OffsetDateTime,
}

/// Points awarded to a player for a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntity {
    /// Primary key.
    pub id: Uuid,
    /// Scored round.
    pub round_id: Uuid,
    /// Scored player.
    pub player_id: Uuid,
    /// Points earned in this round.
    pub points_this_round: i32,
    /// Running total for the game including this round.
    pub cumulative: i32,
}

/// Localised text of a catalogue question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionTranslation {
    /// Locale code, e.g. `en-GB`.
    pub locale: String,
    /// Question text.
    pub text: String,
}

/// A catalogue question with all its translations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Primary key.
    pub id: Uuid,
    /// Ruleset the question belongs to.
    pub game_name: String,
    /// Round type it can be asked in.
    pub round_type: RoundType,
    /// Group of related questions; the fibber question comes from the same group.
    pub group_id: Uuid,
    /// Disabled questions are never picked.
    pub enabled: bool,
    /// Available translations.
    pub translations: Vec<QuestionTranslation>,
}

impl QuestionEntity {
    /// Pick the text for `locale`, falling back to `default_locale` then to any translation.
    pub fn text_for(&self, locale: Option<&str>, default_locale: &str) -> String {
        let exact = locale.and_then(|wanted| {
            self.translations
                .iter()
                .find(|translation| translation.locale == wanted)
        });
        exact
            .or_else(|| {
                self.translations
                    .iter()
                    .find(|translation| translation.locale == default_locale)
            })
            .or_else(|| self.translations.first())
            .map(|translation| translation.text.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn question() -> QuestionEntity {
        QuestionEntity {
            id: Uuid::nil(),
            game_name: "fibbing_it".into(),
            round_type: RoundType::FreeForm,
            group_id: Uuid::nil(),
            enabled: true,
            translations: vec![
                QuestionTranslation {
                    locale: "fr-FR".into(),
                    text: "bonjour".into(),
                },
                QuestionTranslation {
                    locale: "en-GB".into(),
                    text: "hello".into(),
                },
            ],
        }
    }

    #[test]
    fn text_for_prefers_player_locale() {
        assert_eq!(question().text_for(Some("fr-FR"), "en-GB"), "bonjour");
    }

    #[test]
    fn text_for_falls_back_to_default_locale() {
        assert_eq!(question().text_for(Some("de-DE"), "en-GB"), "hello");
        assert_eq!(question().text_for(None, "en-GB"), "hello");
    }

    #[test]
    fn text_for_uses_any_translation_last() {
        assert_eq!(question().text_for(None, "pt-PT"), "bonjour");
    }

    #[test]
    fn phase_round_trips_through_storage_names() {
        for phase in [
            GamePhase::Question,
            GamePhase::Voting,
            GamePhase::Reveal,
            GamePhase::Scoring,
            GamePhase::Winner,
        ] {
            assert_eq!(phase.as_str().parse::<GamePhase>().unwrap(), phase);
        }
        assert!("FIBBING_IT_LOBBY".parse::<GamePhase>().is_err());
    }

    #[test]
    fn round_types_progress_to_completion() {
        assert_eq!(RoundType::FreeForm.next(), Some(RoundType::MultipleChoice));
        assert_eq!(RoundType::MultipleChoice.next(), Some(RoundType::MostLikely));
        assert_eq!(RoundType::MostLikely.next(), None);
    }
}
