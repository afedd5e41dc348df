pub mod memory;
#[cfg(feature = "postgres-store")]
pub mod postgres;

use futures::future::BoxFuture;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::dao::{
    models::{
        AnswerEntity, GameStateEntity, PlayerEntity, QuestionEntity, RoleEntity, RoomEntity,
        RoomState, RoundEntity, RoundType, ScoreEntity, VoteEntity,
    },
    storage::StorageResult,
};

/// Future returned by transaction operations, borrowing the transaction.
pub type TxFuture<'a, T> = BoxFuture<'a, StorageResult<T>>;

/// Abstraction over the persistence backend holding rooms, players and games.
pub trait GameStore: Send + Sync {
    /// Open a serializable transaction. Dropping it without [`StoreTx::commit`] rolls back.
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StoreTx>>>;
    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish connections after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Row level operations available inside one transaction.
///
/// Lookups return `Ok(None)` when the row does not exist; business rules are
/// enforced by the services composing these calls.
pub trait StoreTx: Send {
    /// Insert a new room.
    fn insert_room(&mut self, room: RoomEntity) -> TxFuture<'_, ()>;
    /// Fetch a room by primary key.
    fn room_by_id(&mut self, room_id: Uuid) -> TxFuture<'_, Option<RoomEntity>>;
    /// Fetch the non terminal room using `code`.
    fn active_room_by_code(&mut self, code: String) -> TxFuture<'_, Option<RoomEntity>>;
    /// Fetch the room a player is a member of.
    fn room_by_player(&mut self, player_id: Uuid) -> TxFuture<'_, Option<RoomEntity>>;
    /// All rooms currently in `state`, oldest first.
    fn rooms_in_state(&mut self, state: RoomState) -> TxFuture<'_, Vec<RoomEntity>>;
    /// Change a room state.
    fn update_room_state(
        &mut self,
        room_id: Uuid,
        state: RoomState,
        at: OffsetDateTime,
    ) -> TxFuture<'_, ()>;

    /// Insert a new player.
    fn insert_player(&mut self, player: PlayerEntity) -> TxFuture<'_, ()>;
    /// Fetch a player by primary key.
    fn player_by_id(&mut self, player_id: Uuid) -> TxFuture<'_, Option<PlayerEntity>>;
    /// Overwrite the mutable player columns.
    fn update_player(&mut self, player: PlayerEntity) -> TxFuture<'_, ()>;
    /// Delete a player; dependent rows go with it.
    fn delete_player(&mut self, player_id: Uuid) -> TxFuture<'_, ()>;
    /// Members of a room in join order.
    fn players_in_room(&mut self, room_id: Uuid) -> TxFuture<'_, Vec<PlayerEntity>>;

    /// Add a player to a room.
    fn add_membership(&mut self, room_id: Uuid, player_id: Uuid) -> TxFuture<'_, ()>;
    /// Remove a player from a room.
    fn remove_membership(&mut self, room_id: Uuid, player_id: Uuid) -> TxFuture<'_, ()>;

    /// Insert the game state of a room that just started playing.
    fn insert_game_state(&mut self, game_state: GameStateEntity) -> TxFuture<'_, ()>;
    /// Fetch a game state by primary key.
    fn game_state_by_id(&mut self, game_state_id: Uuid)
    -> TxFuture<'_, Option<GameStateEntity>>;
    /// Fetch the game state of a room.
    fn game_state_by_room(&mut self, room_id: Uuid) -> TxFuture<'_, Option<GameStateEntity>>;
    /// Overwrite phase, round and deadline columns.
    fn update_game_state(&mut self, game_state: GameStateEntity) -> TxFuture<'_, ()>;

    /// Insert a round.
    fn insert_round(&mut self, round: RoundEntity) -> TxFuture<'_, ()>;
    /// Most recently created round of a game.
    fn latest_round(&mut self, game_state_id: Uuid) -> TxFuture<'_, Option<RoundEntity>>;
    /// Every round of a game, oldest first.
    fn rounds_for_game(&mut self, game_state_id: Uuid) -> TxFuture<'_, Vec<RoundEntity>>;

    /// Insert a role assignment.
    fn insert_role(&mut self, role: RoleEntity) -> TxFuture<'_, ()>;
    /// Role assignments of a round.
    fn roles_for_round(&mut self, round_id: Uuid) -> TxFuture<'_, Vec<RoleEntity>>;

    /// Insert or replace the answer of (round, player).
    fn upsert_answer(&mut self, answer: AnswerEntity) -> TxFuture<'_, ()>;
    /// Answer of a player for a round.
    fn answer_for(&mut self, round_id: Uuid, player_id: Uuid)
    -> TxFuture<'_, Option<AnswerEntity>>;
    /// Every answer of a round.
    fn answers_for_round(&mut self, round_id: Uuid) -> TxFuture<'_, Vec<AnswerEntity>>;

    /// Insert or replace the vote of (round, voter).
    fn upsert_vote(&mut self, vote: VoteEntity) -> TxFuture<'_, ()>;
    /// Vote of a player for a round.
    fn vote_for(&mut self, round_id: Uuid, voter_id: Uuid) -> TxFuture<'_, Option<VoteEntity>>;
    /// Every vote of a round.
    fn votes_for_round(&mut self, round_id: Uuid) -> TxFuture<'_, Vec<VoteEntity>>;

    /// Insert a score row; (round, player) is unique.
    fn insert_score(&mut self, score: ScoreEntity) -> TxFuture<'_, ()>;
    /// Every score row of a game, in round order.
    fn scores_for_game(&mut self, game_state_id: Uuid) -> TxFuture<'_, Vec<ScoreEntity>>;

    /// Enabled catalogue questions for a ruleset and round type.
    fn questions_for(
        &mut self,
        game_name: String,
        round_type: RoundType,
    ) -> TxFuture<'_, Vec<QuestionEntity>>;
    /// Catalogue question by primary key, enabled or not.
    fn question_by_id(&mut self, question_id: Uuid) -> TxFuture<'_, Option<QuestionEntity>>;

    /// Delete a room and every row hanging off it, leaves first.
    fn delete_room(&mut self, room_id: Uuid) -> TxFuture<'_, ()>;

    /// Make the transaction's writes durable.
    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>>;
}
