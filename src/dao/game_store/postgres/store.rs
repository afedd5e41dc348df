use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use sqlx::{PgPool, Postgres, Transaction, postgres::PgPoolOptions};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::{
    config::PgConfig,
    error::{PgDaoError, PgResult, classify},
    rows::{
        AnswerRow, GameStateRow, PlayerRow, QuestionRow, RoleRow, RoomRow, RoundRow, ScoreRow,
        TranslationRow, VoteRow, convert_all,
    },
};
use crate::dao::{
    catalogue::default_catalogue,
    game_store::{GameStore, StoreTx, TxFuture},
    models::{
        AnswerEntity, GameStateEntity, PlayerEntity, QuestionEntity, QuestionTranslation,
        RoleEntity, RoomEntity, RoomState, RoundEntity, RoundType, ScoreEntity, VoteEntity,
    },
    storage::{StorageError, StorageResult},
};

const ROOM_COLUMNS: &str =
    "r.id, r.room_code, r.game_name, r.host_player_id, r.room_state, r.created_at, r.updated_at";
const PLAYER_COLUMNS: &str = "p.id, p.nickname, p.avatar, p.locale, p.is_ready, \
     p.disconnected_at, p.created_at, p.updated_at";
const GAME_STATE_COLUMNS: &str =
    "id, room_id, state, round_number, round_type, deadline, created_at, updated_at";
const ROUND_COLUMNS: &str = "id, game_state_id, round_number, round_type, normal_question_id, \
     fibber_question_id, submit_deadline, created_at";

/// PostgreSQL implementation of [`GameStore`].
#[derive(Clone)]
pub struct PgGameStore {
    inner: Arc<PgInner>,
}

struct PgInner {
    pool: RwLock<PgPool>,
    config: PgConfig,
}

impl PgInner {
    async fn pool(&self) -> PgPool {
        self.pool.read().await.clone()
    }

    async fn ping(&self) -> StorageResult<()> {
        let pool = self.pool().await;
        sqlx::query("SELECT 1")
            .execute(&pool)
            .await
            .map_err(|err| classify("health_check", err))?;
        Ok(())
    }

    async fn reconnect(&self) -> StorageResult<()> {
        let pool = open_pool(&self.config).await?;
        let previous = std::mem::replace(&mut *self.pool.write().await, pool);
        previous.close().await;
        Ok(())
    }
}

async fn open_pool(config: &PgConfig) -> PgResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.uri)
        .await
        .map_err(|source| PgDaoError::Connect { source })
}

impl PgGameStore {
    /// Open the pool, apply migrations and seed the built-in catalogue.
    pub async fn connect(config: PgConfig) -> PgResult<Self> {
        let pool = open_pool(&config).await?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|source| PgDaoError::Migrate { source })?;
        seed_catalogue(&pool, &default_catalogue(&config.game_name)).await?;
        info!(game = %config.game_name, "postgres store ready");

        Ok(Self {
            inner: Arc::new(PgInner {
                pool: RwLock::new(pool),
                config,
            }),
        })
    }
}

async fn seed_catalogue(pool: &PgPool, questions: &[QuestionEntity]) -> PgResult<()> {
    let seed = |source| PgDaoError::Seed { source };
    let mut tx = pool.begin().await.map_err(seed)?;
    for question in questions {
        sqlx::query(
            "INSERT INTO questions_groups (id, game_name, round_type) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(question.group_id)
        .bind(&question.game_name)
        .bind(question.round_type.as_str())
        .execute(&mut *tx)
        .await
        .map_err(seed)?;

        sqlx::query(
            "INSERT INTO questions (id, game_name, round_type, group_id, enabled) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (id) DO NOTHING",
        )
        .bind(question.id)
        .bind(&question.game_name)
        .bind(question.round_type.as_str())
        .bind(question.group_id)
        .bind(question.enabled)
        .execute(&mut *tx)
        .await
        .map_err(seed)?;

        for translation in &question.translations {
            sqlx::query(
                "INSERT INTO questions_i18n (question_id, locale, question) VALUES ($1, $2, $3) \
                 ON CONFLICT (question_id, locale) DO NOTHING",
            )
            .bind(question.id)
            .bind(&translation.locale)
            .bind(&translation.text)
            .execute(&mut *tx)
            .await
            .map_err(seed)?;
        }
    }
    tx.commit().await.map_err(seed)
}

impl GameStore for PgGameStore {
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StoreTx>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            let pool = inner.pool().await;
            let mut tx = pool.begin().await.map_err(|err| classify("begin", err))?;
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await
                .map_err(|err| classify("begin", err))?;
            Ok(Box::new(PgTx { tx }) as Box<dyn StoreTx>)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await })
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
}

fn assemble_questions(
    rows: Vec<QuestionRow>,
    translations: Vec<TranslationRow>,
) -> StorageResult<Vec<QuestionEntity>> {
    let mut by_question: HashMap<Uuid, Vec<QuestionTranslation>> = HashMap::new();
    for row in translations {
        by_question
            .entry(row.question_id)
            .or_default()
            .push(QuestionTranslation {
                locale: row.locale,
                text: row.question,
            });
    }
    rows.into_iter()
        .map(|row| {
            Ok(QuestionEntity {
                id: row.id,
                game_name: row.game_name,
                round_type: row.round_type.parse()?,
                group_id: row.group_id,
                enabled: row.enabled,
                translations: by_question.remove(&row.id).unwrap_or_default(),
            })
        })
        .collect()
}

impl PgTx {
    async fn load_questions(&mut self, rows: Vec<QuestionRow>) -> StorageResult<Vec<QuestionEntity>> {
        let ids: Vec<Uuid> = rows.iter().map(|row| row.id).collect();
        let translations: Vec<TranslationRow> = sqlx::query_as(
            "SELECT question_id, locale, question FROM questions_i18n \
             WHERE question_id = ANY($1) ORDER BY question_id, locale",
        )
        .bind(&ids)
        .fetch_all(&mut *self.tx)
        .await
        .map_err(|err| classify("questions_i18n", err))?;
        assemble_questions(rows, translations)
    }
}

impl StoreTx for PgTx {
    fn insert_room(&mut self, room: RoomEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO rooms (id, room_code, game_name, host_player_id, room_state, \
                 created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(room.id)
            .bind(room.code)
            .bind(room.game_name)
            .bind(room.host_player_id)
            .bind(room.state.as_str())
            .bind(room.created_at)
            .bind(room.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("insert_room", err))?;
            Ok(())
        })
    }

    fn room_by_id(&mut self, room_id: Uuid) -> TxFuture<'_, Option<RoomEntity>> {
        Box::pin(async move {
            let row: Option<RoomRow> =
                sqlx::query_as(&format!("SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.id = $1"))
                    .bind(room_id)
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(|err| classify("room_by_id", err))?;
            row.map(RoomEntity::try_from).transpose()
        })
    }

    fn active_room_by_code(&mut self, code: String) -> TxFuture<'_, Option<RoomEntity>> {
        Box::pin(async move {
            let row: Option<RoomRow> = sqlx::query_as(&format!(
                "SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.room_code = $1 \
                 AND r.room_state NOT IN ('FINISHED', 'ABANDONED')"
            ))
            .bind(code)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| classify("active_room_by_code", err))?;
            row.map(RoomEntity::try_from).transpose()
        })
    }

    fn room_by_player(&mut self, player_id: Uuid) -> TxFuture<'_, Option<RoomEntity>> {
        Box::pin(async move {
            let row: Option<RoomRow> = sqlx::query_as(&format!(
                "SELECT {ROOM_COLUMNS} FROM rooms r \
                 JOIN rooms_players rp ON rp.room_id = r.id WHERE rp.player_id = $1"
            ))
            .bind(player_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| classify("room_by_player", err))?;
            row.map(RoomEntity::try_from).transpose()
        })
    }

    fn rooms_in_state(&mut self, state: RoomState) -> TxFuture<'_, Vec<RoomEntity>> {
        Box::pin(async move {
            let rows: Vec<RoomRow> = sqlx::query_as(&format!(
                "SELECT {ROOM_COLUMNS} FROM rooms r WHERE r.room_state = $1 \
                 ORDER BY r.created_at, r.id"
            ))
            .bind(state.as_str())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| classify("rooms_in_state", err))?;
            convert_all(rows)
        })
    }

    fn update_room_state(
        &mut self,
        room_id: Uuid,
        state: RoomState,
        at: OffsetDateTime,
    ) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("UPDATE rooms SET room_state = $2, updated_at = $3 WHERE id = $1")
                .bind(room_id)
                .bind(state.as_str())
                .bind(at)
                .execute(&mut *self.tx)
                .await
                .map_err(|err| classify("update_room_state", err))?;
            Ok(())
        })
    }

    fn insert_player(&mut self, player: PlayerEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO players (id, nickname, avatar, locale, is_ready, disconnected_at, \
                 created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(player.id)
            .bind(player.nickname)
            .bind(player.avatar)
            .bind(player.locale)
            .bind(player.is_ready)
            .bind(player.disconnected_at)
            .bind(player.created_at)
            .bind(player.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("insert_player", err))?;
            Ok(())
        })
    }

    fn player_by_id(&mut self, player_id: Uuid) -> TxFuture<'_, Option<PlayerEntity>> {
        Box::pin(async move {
            let row: Option<PlayerRow> =
                sqlx::query_as(&format!("SELECT {PLAYER_COLUMNS} FROM players p WHERE p.id = $1"))
                    .bind(player_id)
                    .fetch_optional(&mut *self.tx)
                    .await
                    .map_err(|err| classify("player_by_id", err))?;
            Ok(row.map(PlayerEntity::from))
        })
    }

    fn update_player(&mut self, player: PlayerEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE players SET nickname = $2, avatar = $3, locale = $4, is_ready = $5, \
                 disconnected_at = $6, updated_at = $7 WHERE id = $1",
            )
            .bind(player.id)
            .bind(player.nickname)
            .bind(player.avatar)
            .bind(player.locale)
            .bind(player.is_ready)
            .bind(player.disconnected_at)
            .bind(player.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("update_player", err))?;
            Ok(())
        })
    }

    fn delete_player(&mut self, player_id: Uuid) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM players WHERE id = $1")
                .bind(player_id)
                .execute(&mut *self.tx)
                .await
                .map_err(|err| classify("delete_player", err))?;
            Ok(())
        })
    }

    fn players_in_room(&mut self, room_id: Uuid) -> TxFuture<'_, Vec<PlayerEntity>> {
        Box::pin(async move {
            let rows: Vec<PlayerRow> = sqlx::query_as(&format!(
                "SELECT {PLAYER_COLUMNS} FROM players p \
                 JOIN rooms_players rp ON rp.player_id = p.id \
                 WHERE rp.room_id = $1 ORDER BY rp.seq"
            ))
            .bind(room_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| classify("players_in_room", err))?;
            Ok(rows.into_iter().map(PlayerEntity::from).collect())
        })
    }

    fn add_membership(&mut self, room_id: Uuid, player_id: Uuid) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("INSERT INTO rooms_players (room_id, player_id) VALUES ($1, $2)")
                .bind(room_id)
                .bind(player_id)
                .execute(&mut *self.tx)
                .await
                .map_err(|err| classify("add_membership", err))?;
            Ok(())
        })
    }

    fn remove_membership(&mut self, room_id: Uuid, player_id: Uuid) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query("DELETE FROM rooms_players WHERE room_id = $1 AND player_id = $2")
                .bind(room_id)
                .bind(player_id)
                .execute(&mut *self.tx)
                .await
                .map_err(|err| classify("remove_membership", err))?;
            Ok(())
        })
    }

    fn insert_game_state(&mut self, game_state: GameStateEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(&format!(
                "INSERT INTO game_state ({GAME_STATE_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(game_state.id)
            .bind(game_state.room_id)
            .bind(game_state.phase.as_str())
            .bind(game_state.round_number)
            .bind(game_state.round_type.as_str())
            .bind(game_state.deadline)
            .bind(game_state.created_at)
            .bind(game_state.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("insert_game_state", err))?;
            Ok(())
        })
    }

    fn game_state_by_id(
        &mut self,
        game_state_id: Uuid,
    ) -> TxFuture<'_, Option<GameStateEntity>> {
        Box::pin(async move {
            let row: Option<GameStateRow> = sqlx::query_as(&format!(
                "SELECT {GAME_STATE_COLUMNS} FROM game_state WHERE id = $1"
            ))
            .bind(game_state_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| classify("game_state_by_id", err))?;
            row.map(GameStateEntity::try_from).transpose()
        })
    }

    fn game_state_by_room(&mut self, room_id: Uuid) -> TxFuture<'_, Option<GameStateEntity>> {
        Box::pin(async move {
            let row: Option<GameStateRow> = sqlx::query_as(&format!(
                "SELECT {GAME_STATE_COLUMNS} FROM game_state WHERE room_id = $1"
            ))
            .bind(room_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| classify("game_state_by_room", err))?;
            row.map(GameStateEntity::try_from).transpose()
        })
    }

    fn update_game_state(&mut self, game_state: GameStateEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "UPDATE game_state SET state = $2, round_number = $3, round_type = $4, \
                 deadline = $5, updated_at = $6 WHERE id = $1",
            )
            .bind(game_state.id)
            .bind(game_state.phase.as_str())
            .bind(game_state.round_number)
            .bind(game_state.round_type.as_str())
            .bind(game_state.deadline)
            .bind(game_state.updated_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("update_game_state", err))?;
            Ok(())
        })
    }

    fn insert_round(&mut self, round: RoundEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(&format!(
                "INSERT INTO fibbing_it_rounds ({ROUND_COLUMNS}) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
            ))
            .bind(round.id)
            .bind(round.game_state_id)
            .bind(round.round_number)
            .bind(round.round_type.as_str())
            .bind(round.normal_question_id)
            .bind(round.fibber_question_id)
            .bind(round.submit_deadline)
            .bind(round.created_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("insert_round", err))?;
            Ok(())
        })
    }

    fn latest_round(&mut self, game_state_id: Uuid) -> TxFuture<'_, Option<RoundEntity>> {
        Box::pin(async move {
            let row: Option<RoundRow> = sqlx::query_as(&format!(
                "SELECT {ROUND_COLUMNS} FROM fibbing_it_rounds WHERE game_state_id = $1 \
                 ORDER BY created_at DESC, id DESC LIMIT 1"
            ))
            .bind(game_state_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| classify("latest_round", err))?;
            row.map(RoundEntity::try_from).transpose()
        })
    }

    fn rounds_for_game(&mut self, game_state_id: Uuid) -> TxFuture<'_, Vec<RoundEntity>> {
        Box::pin(async move {
            let rows: Vec<RoundRow> = sqlx::query_as(&format!(
                "SELECT {ROUND_COLUMNS} FROM fibbing_it_rounds WHERE game_state_id = $1 \
                 ORDER BY created_at, id"
            ))
            .bind(game_state_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| classify("rounds_for_game", err))?;
            convert_all(rows)
        })
    }

    fn insert_role(&mut self, role: RoleEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO fibbing_it_player_roles (round_id, player_id, role) \
                 VALUES ($1, $2, $3) \
                 ON CONFLICT (round_id, player_id) DO UPDATE SET role = EXCLUDED.role",
            )
            .bind(role.round_id)
            .bind(role.player_id)
            .bind(role.role.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("insert_role", err))?;
            Ok(())
        })
    }

    fn roles_for_round(&mut self, round_id: Uuid) -> TxFuture<'_, Vec<RoleEntity>> {
        Box::pin(async move {
            let rows: Vec<RoleRow> = sqlx::query_as(
                "SELECT round_id, player_id, role FROM fibbing_it_player_roles \
                 WHERE round_id = $1",
            )
            .bind(round_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| classify("roles_for_round", err))?;
            convert_all(rows)
        })
    }

    fn upsert_answer(&mut self, answer: AnswerEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO fibbing_it_answers (id, round_id, player_id, answer, is_ready, \
                 submitted_at) VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (round_id, player_id) DO UPDATE SET answer = EXCLUDED.answer, \
                 is_ready = EXCLUDED.is_ready, submitted_at = EXCLUDED.submitted_at",
            )
            .bind(answer.id)
            .bind(answer.round_id)
            .bind(answer.player_id)
            .bind(answer.answer)
            .bind(answer.is_ready)
            .bind(answer.submitted_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("upsert_answer", err))?;
            Ok(())
        })
    }

    fn answer_for(
        &mut self,
        round_id: Uuid,
        player_id: Uuid,
    ) -> TxFuture<'_, Option<AnswerEntity>> {
        Box::pin(async move {
            let row: Option<AnswerRow> = sqlx::query_as(
                "SELECT id, round_id, player_id, answer, is_ready, submitted_at \
                 FROM fibbing_it_answers WHERE round_id = $1 AND player_id = $2",
            )
            .bind(round_id)
            .bind(player_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| classify("answer_for", err))?;
            Ok(row.map(AnswerEntity::from))
        })
    }

    fn answers_for_round(&mut self, round_id: Uuid) -> TxFuture<'_, Vec<AnswerEntity>> {
        Box::pin(async move {
            let rows: Vec<AnswerRow> = sqlx::query_as(
                "SELECT id, round_id, player_id, answer, is_ready, submitted_at \
                 FROM fibbing_it_answers WHERE round_id = $1 ORDER BY submitted_at, id",
            )
            .bind(round_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| classify("answers_for_round", err))?;
            Ok(rows.into_iter().map(AnswerEntity::from).collect())
        })
    }

    fn upsert_vote(&mut self, vote: VoteEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO fibbing_it_votes (id, round_id, voter_id, target_player_id, \
                 is_ready, submitted_at) VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (round_id, voter_id) DO UPDATE SET \
                 target_player_id = EXCLUDED.target_player_id, is_ready = EXCLUDED.is_ready, \
                 submitted_at = EXCLUDED.submitted_at",
            )
            .bind(vote.id)
            .bind(vote.round_id)
            .bind(vote.voter_id)
            .bind(vote.target_player_id)
            .bind(vote.is_ready)
            .bind(vote.submitted_at)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("upsert_vote", err))?;
            Ok(())
        })
    }

    fn vote_for(&mut self, round_id: Uuid, voter_id: Uuid) -> TxFuture<'_, Option<VoteEntity>> {
        Box::pin(async move {
            let row: Option<VoteRow> = sqlx::query_as(
                "SELECT id, round_id, voter_id, target_player_id, is_ready, submitted_at \
                 FROM fibbing_it_votes WHERE round_id = $1 AND voter_id = $2",
            )
            .bind(round_id)
            .bind(voter_id)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| classify("vote_for", err))?;
            Ok(row.map(VoteEntity::from))
        })
    }

    fn votes_for_round(&mut self, round_id: Uuid) -> TxFuture<'_, Vec<VoteEntity>> {
        Box::pin(async move {
            let rows: Vec<VoteRow> = sqlx::query_as(
                "SELECT id, round_id, voter_id, target_player_id, is_ready, submitted_at \
                 FROM fibbing_it_votes WHERE round_id = $1 ORDER BY submitted_at, id",
            )
            .bind(round_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| classify("votes_for_round", err))?;
            Ok(rows.into_iter().map(VoteEntity::from).collect())
        })
    }

    fn insert_score(&mut self, score: ScoreEntity) -> TxFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO fibbing_it_scores (id, round_id, player_id, points_this_round, \
                 cumulative) VALUES ($1, $2, $3, $4, $5)",
            )
            .bind(score.id)
            .bind(score.round_id)
            .bind(score.player_id)
            .bind(score.points_this_round)
            .bind(score.cumulative)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| classify("insert_score", err))?;
            Ok(())
        })
    }

    fn scores_for_game(&mut self, game_state_id: Uuid) -> TxFuture<'_, Vec<ScoreEntity>> {
        Box::pin(async move {
            let rows: Vec<ScoreRow> = sqlx::query_as(
                "SELECT s.id, s.round_id, s.player_id, s.points_this_round, s.cumulative \
                 FROM fibbing_it_scores s \
                 JOIN fibbing_it_rounds r ON r.id = s.round_id \
                 WHERE r.game_state_id = $1 ORDER BY r.created_at, r.id, s.id",
            )
            .bind(game_state_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| classify("scores_for_game", err))?;
            Ok(rows.into_iter().map(ScoreEntity::from).collect())
        })
    }

    fn questions_for(
        &mut self,
        game_name: String,
        round_type: RoundType,
    ) -> TxFuture<'_, Vec<QuestionEntity>> {
        Box::pin(async move {
            let rows: Vec<QuestionRow> = sqlx::query_as(
                "SELECT id, game_name, round_type, group_id, enabled FROM questions \
                 WHERE game_name = $1 AND round_type = $2 AND enabled ORDER BY id",
            )
            .bind(game_name)
            .bind(round_type.as_str())
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| classify("questions_for", err))?;
            self.load_questions(rows).await
        })
    }

    fn question_by_id(&mut self, question_id: Uuid) -> TxFuture<'_, Option<QuestionEntity>> {
        Box::pin(async move {
            let rows: Vec<QuestionRow> = sqlx::query_as(
                "SELECT id, game_name, round_type, group_id, enabled FROM questions WHERE id = $1",
            )
            .bind(question_id)
            .fetch_all(&mut *self.tx)
            .await
            .map_err(|err| classify("question_by_id", err))?;
            Ok(self.load_questions(rows).await?.into_iter().next())
        })
    }

    fn delete_room(&mut self, room_id: Uuid) -> TxFuture<'_, ()> {
        const ROUNDS_OF_ROOM: &str = "SELECT r.id FROM fibbing_it_rounds r \
             JOIN game_state g ON g.id = r.game_state_id WHERE g.room_id = $1";
        Box::pin(async move {
            let statements = [
                format!("DELETE FROM fibbing_it_scores WHERE round_id IN ({ROUNDS_OF_ROOM})"),
                format!("DELETE FROM fibbing_it_votes WHERE round_id IN ({ROUNDS_OF_ROOM})"),
                format!("DELETE FROM fibbing_it_answers WHERE round_id IN ({ROUNDS_OF_ROOM})"),
                format!(
                    "DELETE FROM fibbing_it_player_roles WHERE round_id IN ({ROUNDS_OF_ROOM})"
                ),
                "DELETE FROM fibbing_it_rounds WHERE game_state_id IN \
                 (SELECT id FROM game_state WHERE room_id = $1)"
                    .to_owned(),
                "DELETE FROM game_state WHERE room_id = $1".to_owned(),
                "DELETE FROM players WHERE id IN \
                 (SELECT player_id FROM rooms_players WHERE room_id = $1)"
                    .to_owned(),
                "DELETE FROM rooms_players WHERE room_id = $1".to_owned(),
                "DELETE FROM rooms WHERE id = $1".to_owned(),
            ];
            for statement in &statements {
                sqlx::query(statement)
                    .bind(room_id)
                    .execute(&mut *self.tx)
                    .await
                    .map_err(|err| classify("delete_room", err))?;
            }
            Ok(())
        })
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move {
            self.tx
                .commit()
                .await
                .map_err(|err| classify("commit", err))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn translations_are_attached_to_their_question() {
        let id = Uuid::now_v7();
        let rows = vec![QuestionRow {
            id,
            game_name: "fibbing_it".into(),
            round_type: "free_form".into(),
            group_id: Uuid::now_v7(),
            enabled: true,
        }];
        let translations = vec![TranslationRow {
            question_id: id,
            locale: "en-GB".into(),
            question: "hello".into(),
        }];

        let questions = assemble_questions(rows, translations).unwrap();
        assert_eq!(questions[0].translations[0].text, "hello");
    }

    #[test]
    fn unknown_round_type_is_corrupt() {
        let rows = vec![QuestionRow {
            id: Uuid::now_v7(),
            game_name: "fibbing_it".into(),
            round_type: "charades".into(),
            group_id: Uuid::now_v7(),
            enabled: true,
        }];
        assert!(matches!(
            assemble_questions(rows, Vec::new()),
            Err(StorageError::Corrupt { column: "round_type", .. })
        ));
    }
}
