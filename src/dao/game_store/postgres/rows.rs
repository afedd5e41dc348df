//! Raw rows as returned by `sqlx`, converted into entities with checked enum columns.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dao::{
    models::{
        AnswerEntity, GameStateEntity, PlayerEntity, RoleEntity, RoomEntity, RoundEntity,
        ScoreEntity, VoteEntity,
    },
    storage::StorageError,
};

#[derive(Debug, FromRow)]
pub struct PlayerRow {
    pub id: Uuid,
    pub nickname: String,
    pub avatar: Vec<u8>,
    pub locale: Option<String>,
    pub is_ready: bool,
    pub disconnected_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl From<PlayerRow> for PlayerEntity {
    fn from(row: PlayerRow) -> Self {
        PlayerEntity {
            id: row.id,
            nickname: row.nickname,
            avatar: row.avatar,
            locale: row.locale,
            is_ready: row.is_ready,
            disconnected_at: row.disconnected_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct RoomRow {
    pub id: Uuid,
    pub room_code: String,
    pub game_name: String,
    pub host_player_id: Uuid,
    pub room_state: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<RoomRow> for RoomEntity {
    type Error = StorageError;

    fn try_from(row: RoomRow) -> Result<Self, Self::Error> {
        Ok(RoomEntity {
            id: row.id,
            code: row.room_code,
            game_name: row.game_name,
            host_player_id: row.host_player_id,
            state: row.room_state.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct GameStateRow {
    pub id: Uuid,
    pub room_id: Uuid,
    pub state: String,
    pub round_number: i32,
    pub round_type: String,
    pub deadline: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<GameStateRow> for GameStateEntity {
    type Error = StorageError;

    fn try_from(row: GameStateRow) -> Result<Self, Self::Error> {
        Ok(GameStateEntity {
            id: row.id,
            room_id: row.room_id,
            phase: row.state.parse()?,
            round_number: row.round_number,
            round_type: row.round_type.parse()?,
            deadline: row.deadline,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct RoundRow {
    pub id: Uuid,
    pub game_state_id: Uuid,
    pub round_number: i32,
    pub round_type: String,
    pub normal_question_id: Uuid,
    pub fibber_question_id: Uuid,
    pub submit_deadline: OffsetDateTime,
    pub created_at: OffsetDateTime,
}

impl TryFrom<RoundRow> for RoundEntity {
    type Error = StorageError;

    fn try_from(row: RoundRow) -> Result<Self, Self::Error> {
        Ok(RoundEntity {
            id: row.id,
            game_state_id: row.game_state_id,
            round_number: row.round_number,
            round_type: row.round_type.parse()?,
            normal_question_id: row.normal_question_id,
            fibber_question_id: row.fibber_question_id,
            submit_deadline: row.submit_deadline,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct RoleRow {
    pub round_id: Uuid,
    pub player_id: Uuid,
    pub role: String,
}

impl TryFrom<RoleRow> for RoleEntity {
    type Error = StorageError;

    fn try_from(row: RoleRow) -> Result<Self, Self::Error> {
        Ok(RoleEntity {
            round_id: row.round_id,
            player_id: row.player_id,
            role: row.role.parse()?,
        })
    }
}

#[derive(Debug, FromRow)]
pub struct AnswerRow {
    pub id: Uuid,
    pub round_id: Uuid,
    pub player_id: Uuid,
    pub answer: String,
    pub is_ready: bool,
    pub submitted_at: OffsetDateTime,
}

impl From<AnswerRow> for AnswerEntity {
    fn from(row: AnswerRow) -> Self {
        AnswerEntity {
            id: row.id,
            round_id: row.round_id,
            player_id: row.player_id,
            answer: row.answer,
            is_ready: row.is_ready,
            submitted_at: row.submitted_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct VoteRow {
    pub id: Uuid,
    pub round_id: Uuid,
    pub voter_id: Uuid,
    pub target_player_id: Uuid,
    pub is_ready: bool,
    pub submitted_at: OffsetDateTime,
}

impl From<VoteRow> for VoteEntity {
    fn from(row: VoteRow) -> Self {
        VoteEntity {
            id: row.id,
            round_id: row.round_id,
            voter_id: row.voter_id,
            target_player_id: row.target_player_id,
            is_ready: row.is_ready,
            submitted_at: row.submitted_at,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct ScoreRow {
    pub id: Uuid,
    pub round_id: Uuid,
    pub player_id: Uuid,
    pub points_this_round: i32,
    pub cumulative: i32,
}

impl From<ScoreRow> for ScoreEntity {
    fn from(row: ScoreRow) -> Self {
        ScoreEntity {
            id: row.id,
            round_id: row.round_id,
            player_id: row.player_id,
            points_this_round: row.points_this_round,
            cumulative: row.cumulative,
        }
    }
}

#[derive(Debug, FromRow)]
pub struct QuestionRow {
    pub id: Uuid,
    pub game_name: String,
    pub round_type: String,
    pub group_id: Uuid,
    pub enabled: bool,
}

#[derive(Debug, FromRow)]
pub struct TranslationRow {
    pub question_id: Uuid,
    pub locale: String,
    pub question: String,
}

/// Convert every row, stopping at the first corrupt one.
pub fn convert_all<R, E>(rows: Vec<R>) -> Result<Vec<E>, StorageError>
where
    E: TryFrom<R, Error = StorageError>,
{
    rows.into_iter().map(E::try_from).collect()
}
