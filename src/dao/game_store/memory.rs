//! In-process storage backend.
//!
//! Every transaction works on a private copy of the tables while holding the
//! single store lock, which makes transactions fully serialized. Commit swaps
//! the copy in; dropping the transaction discards it.

use std::sync::{
    Arc,
    atomic::{AtomicU32, Ordering},
};

use futures::future::BoxFuture;
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{GameStore, StoreTx, TxFuture};
use crate::dao::{
    models::{
        AnswerEntity, GameStateEntity, PlayerEntity, QuestionEntity, RoleEntity, RoomEntity,
        RoomState, RoundEntity, RoundType, ScoreEntity, VoteEntity,
    },
    storage::{StorageError, StorageResult},
};

#[derive(Debug, Clone, Default)]
struct Tables {
    players: Vec<PlayerEntity>,
    rooms: Vec<RoomEntity>,
    memberships: Vec<(Uuid, Uuid)>,
    game_states: Vec<GameStateEntity>,
    rounds: Vec<RoundEntity>,
    roles: Vec<RoleEntity>,
    answers: Vec<AnswerEntity>,
    votes: Vec<VoteEntity>,
    scores: Vec<ScoreEntity>,
    questions: Vec<QuestionEntity>,
}

/// Row counts per table, used by tests to assert on side effects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RowCounts {
    /// `players`
    pub players: usize,
    /// `rooms`
    pub rooms: usize,
    /// `rooms_players`
    pub rooms_players: usize,
    /// `game_state`
    pub game_states: usize,
    /// `fibbing_it_rounds`
    pub rounds: usize,
    /// `fibbing_it_player_roles`
    pub roles: usize,
    /// `fibbing_it_answers`
    pub answers: usize,
    /// `fibbing_it_votes`
    pub votes: usize,
    /// `fibbing_it_scores`
    pub scores: usize,
}

/// Storage backend keeping every table in memory.
#[derive(Clone, Default)]
pub struct MemoryGameStore {
    tables: Arc<Mutex<Tables>>,
    pending_failures: Arc<AtomicU32>,
}

impl MemoryGameStore {
    /// Empty store without any catalogue questions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the given catalogue.
    pub fn with_questions(questions: Vec<QuestionEntity>) -> Self {
        let tables = Tables {
            questions,
            ..Tables::default()
        };
        Self {
            tables: Arc::new(Mutex::new(tables)),
            pending_failures: Arc::default(),
        }
    }

    /// Make the next `count` calls to [`GameStore::begin`] fail with a transient error.
    pub fn fail_next_begins(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Count the rows of every game table.
    pub async fn row_counts(&self) -> RowCounts {
        let tables = self.tables.lock().await;
        RowCounts {
            players: tables.players.len(),
            rooms: tables.rooms.len(),
            rooms_players: tables.memberships.len(),
            game_states: tables.game_states.len(),
            rounds: tables.rounds.len(),
            roles: tables.roles.len(),
            answers: tables.answers.len(),
            votes: tables.votes.len(),
            scores: tables.scores.len(),
        }
    }

    fn take_failure(&self) -> bool {
        self.pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }
}

impl GameStore for MemoryGameStore {
    fn begin(&self) -> BoxFuture<'static, StorageResult<Box<dyn StoreTx>>> {
        let tables = self.tables.clone();
        let fail = self.take_failure();
        Box::pin(async move {
            if fail {
                return Err(StorageError::unavailable(
                    "injected failure".into(),
                    std::io::Error::other("memory store unavailable"),
                ));
            }
            let guard = tables.lock_owned().await;
            let working = guard.clone();
            Ok(Box::new(MemoryTx { guard, working }) as Box<dyn StoreTx>)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

impl MemoryTx {
    fn remove_player_rows(&mut self, player_id: Uuid) {
        let t = &mut self.working;
        t.memberships.retain(|(_, member)| *member != player_id);
        t.roles.retain(|role| role.player_id != player_id);
        t.answers.retain(|answer| answer.player_id != player_id);
        t.votes
            .retain(|vote| vote.voter_id != player_id && vote.target_player_id != player_id);
        t.scores.retain(|score| score.player_id != player_id);
        t.players.retain(|player| player.id != player_id);
    }
}

fn ready<'a, T: Send + 'a>(value: StorageResult<T>) -> TxFuture<'a, T> {
    Box::pin(futures::future::ready(value))
}

impl StoreTx for MemoryTx {
    fn insert_room(&mut self, room: RoomEntity) -> TxFuture<'_, ()> {
        let clash = !room.state.is_terminal()
            && self
                .working
                .rooms
                .iter()
                .any(|existing| existing.code == room.code && !existing.state.is_terminal());
        if clash {
            return ready(Err(StorageError::conflict(format!(
                "room code `{}` already in use",
                room.code
            ))));
        }
        self.working.rooms.push(room);
        ready(Ok(()))
    }

    fn room_by_id(&mut self, room_id: Uuid) -> TxFuture<'_, Option<RoomEntity>> {
        let room = self.working.rooms.iter().find(|r| r.id == room_id).cloned();
        ready(Ok(room))
    }

    fn active_room_by_code(&mut self, code: String) -> TxFuture<'_, Option<RoomEntity>> {
        let room = self
            .working
            .rooms
            .iter()
            .find(|r| r.code == code && !r.state.is_terminal())
            .cloned();
        ready(Ok(room))
    }

    fn room_by_player(&mut self, player_id: Uuid) -> TxFuture<'_, Option<RoomEntity>> {
        let room = self
            .working
            .memberships
            .iter()
            .find(|(_, member)| *member == player_id)
            .and_then(|(room_id, _)| self.working.rooms.iter().find(|r| r.id == *room_id))
            .cloned();
        ready(Ok(room))
    }

    fn rooms_in_state(&mut self, state: RoomState) -> TxFuture<'_, Vec<RoomEntity>> {
        let rooms = self
            .working
            .rooms
            .iter()
            .filter(|r| r.state == state)
            .cloned()
            .collect();
        ready(Ok(rooms))
    }

    fn update_room_state(
        &mut self,
        room_id: Uuid,
        state: RoomState,
        at: OffsetDateTime,
    ) -> TxFuture<'_, ()> {
        if let Some(room) = self.working.rooms.iter_mut().find(|r| r.id == room_id) {
            room.state = state;
            room.updated_at = at;
        }
        ready(Ok(()))
    }

    fn insert_player(&mut self, player: PlayerEntity) -> TxFuture<'_, ()> {
        if self.working.players.iter().any(|p| p.id == player.id) {
            return ready(Err(StorageError::conflict(format!(
                "player `{}` already exists",
                player.id
            ))));
        }
        self.working.players.push(player);
        ready(Ok(()))
    }

    fn player_by_id(&mut self, player_id: Uuid) -> TxFuture<'_, Option<PlayerEntity>> {
        let player = self
            .working
            .players
            .iter()
            .find(|p| p.id == player_id)
            .cloned();
        ready(Ok(player))
    }

    fn update_player(&mut self, player: PlayerEntity) -> TxFuture<'_, ()> {
        if let Some(existing) = self.working.players.iter_mut().find(|p| p.id == player.id) {
            *existing = player;
        }
        ready(Ok(()))
    }

    fn delete_player(&mut self, player_id: Uuid) -> TxFuture<'_, ()> {
        self.remove_player_rows(player_id);
        ready(Ok(()))
    }

    fn players_in_room(&mut self, room_id: Uuid) -> TxFuture<'_, Vec<PlayerEntity>> {
        let members: Vec<Uuid> = self
            .working
            .memberships
            .iter()
            .filter(|(room, _)| *room == room_id)
            .map(|(_, player)| *player)
            .collect();
        let players = members
            .iter()
            .filter_map(|id| self.working.players.iter().find(|p| p.id == *id))
            .cloned()
            .collect();
        ready(Ok(players))
    }

    fn add_membership(&mut self, room_id: Uuid, player_id: Uuid) -> TxFuture<'_, ()> {
        if self
            .working
            .memberships
            .iter()
            .any(|(_, member)| *member == player_id)
        {
            return ready(Err(StorageError::conflict(format!(
                "player `{player_id}` already belongs to a room"
            ))));
        }
        self.working.memberships.push((room_id, player_id));
        ready(Ok(()))
    }

    fn remove_membership(&mut self, room_id: Uuid, player_id: Uuid) -> TxFuture<'_, ()> {
        self.working
            .memberships
            .retain(|membership| *membership != (room_id, player_id));
        ready(Ok(()))
    }

    fn insert_game_state(&mut self, game_state: GameStateEntity) -> TxFuture<'_, ()> {
        if self
            .working
            .game_states
            .iter()
            .any(|gs| gs.room_id == game_state.room_id)
        {
            return ready(Err(StorageError::conflict(format!(
                "room `{}` already has a game state",
                game_state.room_id
            ))));
        }
        self.working.game_states.push(game_state);
        ready(Ok(()))
    }

    fn game_state_by_id(
        &mut self,
        game_state_id: Uuid,
    ) -> TxFuture<'_, Option<GameStateEntity>> {
        let gs = self
            .working
            .game_states
            .iter()
            .find(|gs| gs.id == game_state_id)
            .cloned();
        ready(Ok(gs))
    }

    fn game_state_by_room(&mut self, room_id: Uuid) -> TxFuture<'_, Option<GameStateEntity>> {
        let gs = self
            .working
            .game_states
            .iter()
            .find(|gs| gs.room_id == room_id)
            .cloned();
        ready(Ok(gs))
    }

    fn update_game_state(&mut self, game_state: GameStateEntity) -> TxFuture<'_, ()> {
        if let Some(existing) = self
            .working
            .game_states
            .iter_mut()
            .find(|gs| gs.id == game_state.id)
        {
            *existing = game_state;
        }
        ready(Ok(()))
    }

    fn insert_round(&mut self, round: RoundEntity) -> TxFuture<'_, ()> {
        self.working.rounds.push(round);
        ready(Ok(()))
    }

    fn latest_round(&mut self, game_state_id: Uuid) -> TxFuture<'_, Option<RoundEntity>> {
        let round = self
            .working
            .rounds
            .iter()
            .rev()
            .find(|r| r.game_state_id == game_state_id)
            .cloned();
        ready(Ok(round))
    }

    fn rounds_for_game(&mut self, game_state_id: Uuid) -> TxFuture<'_, Vec<RoundEntity>> {
        let rounds = self
            .working
            .rounds
            .iter()
            .filter(|r| r.game_state_id == game_state_id)
            .cloned()
            .collect();
        ready(Ok(rounds))
    }

    fn insert_role(&mut self, role: RoleEntity) -> TxFuture<'_, ()> {
        self.working
            .roles
            .retain(|r| !(r.round_id == role.round_id && r.player_id == role.player_id));
        self.working.roles.push(role);
        ready(Ok(()))
    }

    fn roles_for_round(&mut self, round_id: Uuid) -> TxFuture<'_, Vec<RoleEntity>> {
        let roles = self
            .working
            .roles
            .iter()
            .filter(|r| r.round_id == round_id)
            .cloned()
            .collect();
        ready(Ok(roles))
    }

    fn upsert_answer(&mut self, answer: AnswerEntity) -> TxFuture<'_, ()> {
        match self
            .working
            .answers
            .iter_mut()
            .find(|a| a.round_id == answer.round_id && a.player_id == answer.player_id)
        {
            Some(existing) => {
                existing.answer = answer.answer;
                existing.is_ready = answer.is_ready;
                existing.submitted_at = answer.submitted_at;
            }
            None => self.working.answers.push(answer),
        }
        ready(Ok(()))
    }

    fn answer_for(
        &mut self,
        round_id: Uuid,
        player_id: Uuid,
    ) -> TxFuture<'_, Option<AnswerEntity>> {
        let answer = self
            .working
            .answers
            .iter()
            .find(|a| a.round_id == round_id && a.player_id == player_id)
            .cloned();
        ready(Ok(answer))
    }

    fn answers_for_round(&mut self, round_id: Uuid) -> TxFuture<'_, Vec<AnswerEntity>> {
        let answers = self
            .working
            .answers
            .iter()
            .filter(|a| a.round_id == round_id)
            .cloned()
            .collect();
        ready(Ok(answers))
    }

    fn upsert_vote(&mut self, vote: VoteEntity) -> TxFuture<'_, ()> {
        match self
            .working
            .votes
            .iter_mut()
            .find(|v| v.round_id == vote.round_id && v.voter_id == vote.voter_id)
        {
            Some(existing) => {
                existing.target_player_id = vote.target_player_id;
                existing.is_ready = vote.is_ready;
                existing.submitted_at = vote.submitted_at;
            }
            None => self.working.votes.push(vote),
        }
        ready(Ok(()))
    }

    fn vote_for(&mut self, round_id: Uuid, voter_id: Uuid) -> TxFuture<'_, Option<VoteEntity>> {
        let vote = self
            .working
            .votes
            .iter()
            .find(|v| v.round_id == round_id && v.voter_id == voter_id)
            .cloned();
        ready(Ok(vote))
    }

    fn votes_for_round(&mut self, round_id: Uuid) -> TxFuture<'_, Vec<VoteEntity>> {
        let votes = self
            .working
            .votes
            .iter()
            .filter(|v| v.round_id == round_id)
            .cloned()
            .collect();
        ready(Ok(votes))
    }

    fn insert_score(&mut self, score: ScoreEntity) -> TxFuture<'_, ()> {
        if self
            .working
            .scores
            .iter()
            .any(|s| s.round_id == score.round_id && s.player_id == score.player_id)
        {
            return ready(Err(StorageError::conflict(format!(
                "round `{}` already scored for player `{}`",
                score.round_id, score.player_id
            ))));
        }
        self.working.scores.push(score);
        ready(Ok(()))
    }

    fn scores_for_game(&mut self, game_state_id: Uuid) -> TxFuture<'_, Vec<ScoreEntity>> {
        let round_ids: Vec<Uuid> = self
            .working
            .rounds
            .iter()
            .filter(|r| r.game_state_id == game_state_id)
            .map(|r| r.id)
            .collect();
        let mut scores: Vec<ScoreEntity> = self
            .working
            .scores
            .iter()
            .filter(|s| round_ids.contains(&s.round_id))
            .cloned()
            .collect();
        scores.sort_by_key(|s| round_ids.iter().position(|id| *id == s.round_id));
        ready(Ok(scores))
    }

    fn questions_for(
        &mut self,
        game_name: String,
        round_type: RoundType,
    ) -> TxFuture<'_, Vec<QuestionEntity>> {
        let questions = self
            .working
            .questions
            .iter()
            .filter(|q| q.enabled && q.game_name == game_name && q.round_type == round_type)
            .cloned()
            .collect();
        ready(Ok(questions))
    }

    fn question_by_id(&mut self, question_id: Uuid) -> TxFuture<'_, Option<QuestionEntity>> {
        let question = self
            .working
            .questions
            .iter()
            .find(|q| q.id == question_id)
            .cloned();
        ready(Ok(question))
    }

    fn delete_room(&mut self, room_id: Uuid) -> TxFuture<'_, ()> {
        let t = &mut self.working;
        let game_ids: Vec<Uuid> = t
            .game_states
            .iter()
            .filter(|gs| gs.room_id == room_id)
            .map(|gs| gs.id)
            .collect();
        let round_ids: Vec<Uuid> = t
            .rounds
            .iter()
            .filter(|r| game_ids.contains(&r.game_state_id))
            .map(|r| r.id)
            .collect();
        let player_ids: Vec<Uuid> = t
            .memberships
            .iter()
            .filter(|(room, _)| *room == room_id)
            .map(|(_, player)| *player)
            .collect();

        t.scores.retain(|s| !round_ids.contains(&s.round_id));
        t.votes.retain(|v| !round_ids.contains(&v.round_id));
        t.answers.retain(|a| !round_ids.contains(&a.round_id));
        t.roles.retain(|r| !round_ids.contains(&r.round_id));
        t.rounds.retain(|r| !round_ids.contains(&r.id));
        t.game_states.retain(|gs| gs.room_id != room_id);
        t.memberships.retain(|(room, _)| *room != room_id);
        t.players.retain(|p| !player_ids.contains(&p.id));
        t.rooms.retain(|r| r.id != room_id);
        ready(Ok(()))
    }

    fn commit(self: Box<Self>) -> BoxFuture<'static, StorageResult<()>> {
        let MemoryTx { mut guard, working } = *self;
        *guard = working;
        Box::pin(async { Ok(()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room(code: &str, state: RoomState) -> RoomEntity {
        let now = OffsetDateTime::now_utc();
        RoomEntity {
            id: Uuid::now_v7(),
            code: code.into(),
            game_name: "fibbing_it".into(),
            host_player_id: Uuid::now_v7(),
            state,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn dropped_transaction_rolls_back() {
        let store = MemoryGameStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            tx.insert_room(room("ABCDE", RoomState::Created)).await.unwrap();
        }
        assert_eq!(store.row_counts().await.rooms, 0);

        let mut tx = store.begin().await.unwrap();
        tx.insert_room(room("ABCDE", RoomState::Created)).await.unwrap();
        tx.commit().await.unwrap();
        assert_eq!(store.row_counts().await.rooms, 1);
    }

    #[tokio::test]
    async fn active_codes_are_unique_but_terminal_rooms_are_shadowed() {
        let store = MemoryGameStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_room(room("ABCDE", RoomState::Finished)).await.unwrap();
        tx.insert_room(room("ABCDE", RoomState::Created)).await.unwrap();
        let err = tx
            .insert_room(room("ABCDE", RoomState::Created))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));

        let active = tx.active_room_by_code("ABCDE".into()).await.unwrap().unwrap();
        assert_eq!(active.state, RoomState::Created);
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let store = MemoryGameStore::new();
        store.fail_next_begins(1);
        assert!(matches!(
            store.begin().await,
            Err(StorageError::Unavailable { .. })
        ));
        assert!(store.begin().await.is_ok());
    }
}
