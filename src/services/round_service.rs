//! Answers, votes and phase transitions of a running game.
//!
//! Every `update_state_to_*` transition is idempotent: when the game already
//! sits in the target phase the stored snapshot is returned untouched, which
//! keeps deadlines stable across restarts.

use std::collections::HashMap;

use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::StoreTx,
        models::{
            AnswerEntity, GamePhase, GameStateEntity, PlayerEntity, PlayerRole, QuestionEntity,
            RoleEntity, RoomEntity, RoomState, RoundEntity, RoundType, ScoreEntity, VoteEntity,
        },
        storage::StorageError,
    },
    error::ServiceError,
    services::{
        GameContext, in_transaction,
        lobby_service::{require_room_state, room_of},
        scoring,
        snapshots::{
            PhaseSnapshot, QuestionSeat, QuestionSnapshot, RevealSnapshot, ScoreEntry,
            ScoreboardSnapshot, VotedFor, VotingSeat, VotingSnapshot,
        },
    },
    state::SharedState,
};

/// Answers accepted in a multiple choice round.
pub const MULTIPLE_CHOICE_OPTIONS: [&str; 5] = [
    "Strongly Agree",
    "Agree",
    "Neutral",
    "Disagree",
    "Strongly Disagree",
];
/// Longest accepted answer, in characters.
pub const MAX_ANSWER_CHARS: usize = 500;

/// Result of moving a game to its next question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionOutcome {
    /// A round is open.
    Question(QuestionSnapshot),
    /// Every round type has been played.
    GameCompleted,
}

/// Snapshot after a ready toggle, with whether the whole room is now locked in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toggled<S> {
    /// Refreshed phase snapshot.
    pub snapshot: S,
    /// Every member is ready.
    pub all_ready: bool,
}

/// A PLAYING game and the phase it is stored in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveGame {
    /// Game state key.
    pub game_state_id: Uuid,
    /// Room code, for logs.
    pub room_code: String,
    /// Stored phase.
    pub phase: GamePhase,
}

struct Game {
    room: RoomEntity,
    state: GameStateEntity,
}

/// Store or replace the player's answer for the open round.
pub async fn submit_answer(
    state: &SharedState,
    player_id: Uuid,
    answer: String,
    at: OffsetDateTime,
) -> Result<QuestionSnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    in_transaction(state, "submit_answer", |tx| {
        Box::pin(submit_answer_tx(tx, ctx.clone(), player_id, answer.clone(), at))
    })
    .await
}

async fn submit_answer_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    player_id: Uuid,
    answer: String,
    at: OffsetDateTime,
) -> Result<QuestionSnapshot, ServiceError> {
    let game = playing_game_of(tx, player_id).await?;
    require_phase(&game.state, GamePhase::Question)?;
    let round = current_round(tx, &game.state).await?;
    if at > round.submit_deadline {
        return Err(ServiceError::InvalidState(
            "the answering deadline has passed".into(),
        ));
    }

    let answer = answer.trim().to_owned();
    let length = answer.chars().count();
    if length == 0 || length > MAX_ANSWER_CHARS {
        return Err(ServiceError::InvalidInput(format!(
            "answers must be 1 to {MAX_ANSWER_CHARS} characters"
        )));
    }
    let members = tx.players_in_room(game.room.id).await?;
    let options = answer_options(round.round_type, &members);
    if !options.is_empty() && !options.contains(&answer) {
        return Err(ServiceError::InvalidInput(format!(
            "`{answer}` is not one of the allowed answers"
        )));
    }

    let existing = tx.answer_for(round.id, player_id).await?;
    if existing.as_ref().is_some_and(|a| a.is_ready) {
        return Err(ServiceError::InvalidState(
            "the answer is locked in".into(),
        ));
    }
    tx.upsert_answer(AnswerEntity {
        id: existing.map_or_else(Uuid::now_v7, |a| a.id),
        round_id: round.id,
        player_id,
        answer,
        is_ready: false,
        submitted_at: at,
    })
    .await?;
    question_snapshot(tx, &ctx, &game.room, &game.state).await
}

/// Lock or unlock the player's answer.
pub async fn toggle_answer_is_ready(
    state: &SharedState,
    player_id: Uuid,
    at: OffsetDateTime,
) -> Result<Toggled<QuestionSnapshot>, ServiceError> {
    let ctx = GameContext::from_state(state);
    in_transaction(state, "toggle_answer_is_ready", |tx| {
        Box::pin(toggle_answer_is_ready_tx(tx, ctx.clone(), player_id, at))
    })
    .await
}

async fn toggle_answer_is_ready_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    player_id: Uuid,
    at: OffsetDateTime,
) -> Result<Toggled<QuestionSnapshot>, ServiceError> {
    let game = playing_game_of(tx, player_id).await?;
    require_phase(&game.state, GamePhase::Question)?;
    let round = current_round(tx, &game.state).await?;
    if at > round.submit_deadline {
        return Err(ServiceError::InvalidState(
            "the answering deadline has passed".into(),
        ));
    }
    let answer = tx
        .answer_for(round.id, player_id)
        .await?
        .ok_or_else(|| ServiceError::InvalidState("submit an answer first".into()))?;
    tx.upsert_answer(AnswerEntity {
        is_ready: !answer.is_ready,
        ..answer
    })
    .await?;

    let snapshot = question_snapshot(tx, &ctx, &game.room, &game.state).await?;
    let all_ready = snapshot.seats.iter().all(|s| s.is_answer_ready);
    Ok(Toggled {
        snapshot,
        all_ready,
    })
}

/// Vote for the player named `nickname`.
pub async fn submit_vote(
    state: &SharedState,
    player_id: Uuid,
    nickname: String,
    at: OffsetDateTime,
) -> Result<VotingSnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    in_transaction(state, "submit_vote", |tx| {
        Box::pin(submit_vote_tx(tx, ctx.clone(), player_id, nickname.clone(), at))
    })
    .await
}

async fn submit_vote_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    player_id: Uuid,
    nickname: String,
    at: OffsetDateTime,
) -> Result<VotingSnapshot, ServiceError> {
    let game = playing_game_of(tx, player_id).await?;
    require_phase(&game.state, GamePhase::Voting)?;
    if at > game.state.deadline {
        return Err(ServiceError::InvalidState(
            "the voting deadline has passed".into(),
        ));
    }
    let round = current_round(tx, &game.state).await?;
    let target = tx
        .players_in_room(game.room.id)
        .await?
        .into_iter()
        .find(|p| p.nickname == nickname)
        .ok_or_else(|| ServiceError::NotFound(format!("player `{nickname}`")))?;
    if target.id == player_id {
        return Err(ServiceError::InvalidInput(
            "players cannot vote for themselves".into(),
        ));
    }
    if tx.vote_for(round.id, player_id).await?.is_some() {
        return Err(ServiceError::InvalidState(
            "a vote was already cast this round".into(),
        ));
    }
    tx.upsert_vote(VoteEntity {
        id: Uuid::now_v7(),
        round_id: round.id,
        voter_id: player_id,
        target_player_id: target.id,
        is_ready: false,
        submitted_at: at,
    })
    .await?;
    voting_snapshot(tx, &ctx, &game.room, &game.state).await
}

/// Lock or unlock the player's vote.
pub async fn toggle_voting_is_ready(
    state: &SharedState,
    player_id: Uuid,
    at: OffsetDateTime,
) -> Result<Toggled<VotingSnapshot>, ServiceError> {
    let ctx = GameContext::from_state(state);
    in_transaction(state, "toggle_voting_is_ready", |tx| {
        Box::pin(toggle_voting_is_ready_tx(tx, ctx.clone(), player_id, at))
    })
    .await
}

async fn toggle_voting_is_ready_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    player_id: Uuid,
    at: OffsetDateTime,
) -> Result<Toggled<VotingSnapshot>, ServiceError> {
    let game = playing_game_of(tx, player_id).await?;
    require_phase(&game.state, GamePhase::Voting)?;
    if at > game.state.deadline {
        return Err(ServiceError::InvalidState(
            "the voting deadline has passed".into(),
        ));
    }
    let round = current_round(tx, &game.state).await?;
    let vote = tx
        .vote_for(round.id, player_id)
        .await?
        .ok_or_else(|| ServiceError::InvalidState("vote for a player first".into()))?;
    tx.upsert_vote(VoteEntity {
        is_ready: !vote.is_ready,
        ..vote
    })
    .await?;

    let snapshot = voting_snapshot(tx, &ctx, &game.room, &game.state).await?;
    let all_ready = snapshot.seats.iter().all(|s| s.is_vote_ready);
    Ok(Toggled {
        snapshot,
        all_ready,
    })
}

/// Open the next round, moving to the next round type when `next_round` is
/// set or the current type has used up its rounds.
pub async fn update_state_to_question(
    state: &SharedState,
    game_state_id: Uuid,
    deadline: OffsetDateTime,
    next_round: bool,
) -> Result<QuestionOutcome, ServiceError> {
    let ctx = GameContext::from_state(state);
    let outcome = in_transaction(state, "update_state_to_question", |tx| {
        Box::pin(to_question_tx(tx, ctx.clone(), game_state_id, deadline, next_round))
    })
    .await?;
    if let QuestionOutcome::Question(question) = &outcome {
        info!(
            %game_state_id,
            round_type = %question.round_type,
            round_number = question.round_number,
            "question phase"
        );
    }
    Ok(outcome)
}

async fn to_question_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    game_state_id: Uuid,
    deadline: OffsetDateTime,
    next_round: bool,
) -> Result<QuestionOutcome, ServiceError> {
    let Game { room, state } = load_game(tx, game_state_id).await?;
    match state.phase {
        GamePhase::Question => {
            let question = question_snapshot(tx, &ctx, &room, &state).await?;
            return Ok(QuestionOutcome::Question(question));
        }
        GamePhase::Reveal | GamePhase::Scoring => {}
        other => return Err(illegal_transition(other, GamePhase::Question)),
    }

    let previous = current_round(tx, &state).await?;
    let members = tx.players_in_room(room.id).await?;
    let mut next = GameStateEntity {
        phase: GamePhase::Question,
        deadline,
        updated_at: OffsetDateTime::now_utc(),
        ..state.clone()
    };
    let round_number = state.round_number + 1;
    let fibber = if next_round || round_number > ctx.rules.max_rounds {
        let Some(round_type) = state.round_type.next() else {
            return Ok(QuestionOutcome::GameCompleted);
        };
        next.round_type = round_type;
        next.round_number = 1;
        None
    } else {
        next.round_number = round_number;
        fibber_of(&tx.roles_for_round(previous.id).await?)
    };

    tx.update_game_state(next.clone()).await?;
    open_round(tx, &ctx, &room, &next, &members, fibber).await?;
    let question = question_snapshot(tx, &ctx, &room, &next).await?;
    Ok(QuestionOutcome::Question(question))
}

/// Close answering and open the vote.
pub async fn update_state_to_voting(
    state: &SharedState,
    game_state_id: Uuid,
    deadline: OffsetDateTime,
) -> Result<VotingSnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    in_transaction(state, "update_state_to_voting", |tx| {
        Box::pin(to_voting_tx(tx, ctx.clone(), game_state_id, deadline))
    })
    .await
}

async fn to_voting_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    game_state_id: Uuid,
    deadline: OffsetDateTime,
) -> Result<VotingSnapshot, ServiceError> {
    let Game { room, state } = load_game(tx, game_state_id).await?;
    let state = match state.phase {
        GamePhase::Voting => state,
        GamePhase::Question => advance(tx, state, GamePhase::Voting, deadline).await?,
        other => return Err(illegal_transition(other, GamePhase::Voting)),
    };
    voting_snapshot(tx, &ctx, &room, &state).await
}

/// Close the vote and reveal the most voted player.
pub async fn update_state_to_reveal(
    state: &SharedState,
    game_state_id: Uuid,
    deadline: OffsetDateTime,
) -> Result<RevealSnapshot, ServiceError> {
    let reveal = in_transaction(state, "update_state_to_reveal", |tx| {
        Box::pin(to_reveal_tx(tx, game_state_id, deadline))
    })
    .await?;
    info!(
        %game_state_id,
        should_reveal = reveal.should_reveal(),
        fibber_found = reveal.fibber_found(),
        "reveal phase"
    );
    Ok(reveal)
}

async fn to_reveal_tx(
    tx: &mut dyn StoreTx,
    game_state_id: Uuid,
    deadline: OffsetDateTime,
) -> Result<RevealSnapshot, ServiceError> {
    let Game { room, state } = load_game(tx, game_state_id).await?;
    let state = match state.phase {
        GamePhase::Reveal => state,
        GamePhase::Voting => advance(tx, state, GamePhase::Reveal, deadline).await?,
        other => return Err(illegal_transition(other, GamePhase::Reveal)),
    };
    reveal_snapshot(tx, &room, &state).await
}

/// Score the finished rounds and show the intermediate scoreboard.
pub async fn update_state_to_score(
    state: &SharedState,
    game_state_id: Uuid,
    deadline: OffsetDateTime,
) -> Result<ScoreboardSnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    in_transaction(state, "update_state_to_score", |tx| {
        Box::pin(to_scoreboard_tx(
            tx,
            ctx.clone(),
            game_state_id,
            deadline,
            GamePhase::Scoring,
        ))
    })
    .await
}

/// Score any unscored round and show the final scoreboard.
pub async fn update_state_to_winner(
    state: &SharedState,
    game_state_id: Uuid,
    deadline: OffsetDateTime,
) -> Result<ScoreboardSnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    let board = in_transaction(state, "update_state_to_winner", |tx| {
        Box::pin(to_scoreboard_tx(
            tx,
            ctx.clone(),
            game_state_id,
            deadline,
            GamePhase::Winner,
        ))
    })
    .await?;
    info!(%game_state_id, room_code = %board.room_code, "winner phase");
    Ok(board)
}

async fn to_scoreboard_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    game_state_id: Uuid,
    deadline: OffsetDateTime,
    target: GamePhase,
) -> Result<ScoreboardSnapshot, ServiceError> {
    let Game { room, state } = load_game(tx, game_state_id).await?;
    let allowed = match target {
        GamePhase::Winner => matches!(state.phase, GamePhase::Reveal | GamePhase::Scoring),
        _ => state.phase == GamePhase::Reveal,
    };
    let state = if state.phase == target {
        state
    } else if allowed {
        score_pending_rounds(tx, &ctx, &state).await?;
        advance(tx, state, target, deadline).await?
    } else {
        return Err(illegal_transition(state.phase, target));
    };
    scoreboard_snapshot(tx, &room, &state).await
}

/// Snapshot of the phase the game is stored in.
pub async fn get_phase_snapshot(
    state: &SharedState,
    game_state_id: Uuid,
) -> Result<PhaseSnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    in_transaction(state, "get_phase_snapshot", |tx| {
        let ctx = ctx.clone();
        Box::pin(async move {
            let Game { room, state } = load_game(tx, game_state_id).await?;
            phase_snapshot(tx, &ctx, &room, &state).await
        })
    })
    .await
}

/// Mark the room of a game FINISHED. Terminal rooms are left alone.
pub async fn finish_game(state: &SharedState, game_state_id: Uuid) -> Result<(), ServiceError> {
    let room_code = in_transaction(state, "finish_game", |tx| {
        Box::pin(async move {
            let game_state = tx
                .game_state_by_id(game_state_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("game {game_state_id}")))?;
            let room = tx
                .room_by_id(game_state.room_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("room {}", game_state.room_id)))?;
            if !room.state.is_terminal() {
                tx.update_room_state(room.id, RoomState::Finished, OffsetDateTime::now_utc())
                    .await?;
            }
            Ok::<_, ServiceError>(room.code)
        })
    })
    .await?;
    info!(%game_state_id, %room_code, "game finished");
    Ok(())
}

/// Mark a room ABANDONED and return the game to stop, if any.
pub async fn abandon_room(
    state: &SharedState,
    room_id: Uuid,
) -> Result<Option<Uuid>, ServiceError> {
    in_transaction(state, "abandon_room", |tx| {
        Box::pin(async move {
            let room = tx
                .room_by_id(room_id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("room {room_id}")))?;
            if room.state.is_terminal() {
                return Ok(None);
            }
            tx.update_room_state(room_id, RoomState::Abandoned, OffsetDateTime::now_utc())
                .await?;
            Ok::<_, ServiceError>(tx.game_state_by_room(room_id).await?.map(|gs| gs.id))
        })
    })
    .await
}

/// Every PLAYING game with its stored phase. Games with a phase this server
/// does not know are skipped.
pub async fn active_games(state: &SharedState) -> Result<Vec<ActiveGame>, ServiceError> {
    in_transaction(state, "active_games", |tx| Box::pin(active_games_tx(tx))).await
}

async fn active_games_tx(tx: &mut dyn StoreTx) -> Result<Vec<ActiveGame>, ServiceError> {
    let mut games = Vec::new();
    for room in tx.rooms_in_state(RoomState::Playing).await? {
        match tx.game_state_by_room(room.id).await {
            Ok(Some(game_state)) => games.push(ActiveGame {
                game_state_id: game_state.id,
                room_code: room.code,
                phase: game_state.phase,
            }),
            Ok(None) => {}
            Err(err @ StorageError::Corrupt { .. }) => {
                warn!(room_code = %room.code, error = %err, "skipping game with unreadable state");
            }
            Err(err) => return Err(err.into()),
        }
    }
    Ok(games)
}

/// Snapshot of the stored phase of a loaded game.
pub(crate) async fn phase_snapshot(
    tx: &mut dyn StoreTx,
    ctx: &GameContext,
    room: &RoomEntity,
    state: &GameStateEntity,
) -> Result<PhaseSnapshot, ServiceError> {
    Ok(match state.phase {
        GamePhase::Question => {
            PhaseSnapshot::Question(question_snapshot(tx, ctx, room, state).await?)
        }
        GamePhase::Voting => PhaseSnapshot::Voting(voting_snapshot(tx, ctx, room, state).await?),
        GamePhase::Reveal => PhaseSnapshot::Reveal(reveal_snapshot(tx, room, state).await?),
        GamePhase::Scoring => PhaseSnapshot::Scoring(scoreboard_snapshot(tx, room, state).await?),
        GamePhase::Winner => PhaseSnapshot::Winner(scoreboard_snapshot(tx, room, state).await?),
    })
}

/// Create the round described by `state` and hand out the roles.
///
/// `fibber` is kept when still a member; otherwise one is drawn at random.
/// The fibber question comes from the normal question's group when it has
/// siblings, else from any other question of the round type.
pub(crate) async fn open_round(
    tx: &mut dyn StoreTx,
    ctx: &GameContext,
    room: &RoomEntity,
    state: &GameStateEntity,
    members: &[PlayerEntity],
    fibber: Option<Uuid>,
) -> Result<RoundEntity, ServiceError> {
    let questions = tx
        .questions_for(room.game_name.clone(), state.round_type)
        .await?;
    let normal = ctx
        .randomizer
        .index(questions.len())
        .map(|i| &questions[i])
        .ok_or_else(|| {
            ServiceError::Internal(format!("no {} questions available", state.round_type))
        })?;
    let fibber_question = pick_fibber_question(ctx, &questions, normal).ok_or_else(|| {
        ServiceError::Internal(format!("no fibber question for {}", state.round_type))
    })?;

    let fibber = fibber
        .filter(|id| members.iter().any(|p| p.id == *id))
        .or_else(|| ctx.randomizer.index(members.len()).map(|i| members[i].id))
        .ok_or_else(|| ServiceError::InvalidState("the room has no players".into()))?;

    let round = RoundEntity {
        id: Uuid::now_v7(),
        game_state_id: state.id,
        round_number: state.round_number,
        round_type: state.round_type,
        normal_question_id: normal.id,
        fibber_question_id: fibber_question.id,
        submit_deadline: state.deadline,
        created_at: OffsetDateTime::now_utc(),
    };
    tx.insert_round(round.clone()).await?;
    for member in members {
        let role = if member.id == fibber {
            PlayerRole::Fibber
        } else {
            PlayerRole::Normal
        };
        tx.insert_role(RoleEntity {
            round_id: round.id,
            player_id: member.id,
            role,
        })
        .await?;
    }
    Ok(round)
}

fn pick_fibber_question<'q>(
    ctx: &GameContext,
    questions: &'q [QuestionEntity],
    normal: &QuestionEntity,
) -> Option<&'q QuestionEntity> {
    let siblings: Vec<&QuestionEntity> = questions
        .iter()
        .filter(|q| q.group_id == normal.group_id && q.id != normal.id)
        .collect();
    let pool = if siblings.is_empty() {
        questions.iter().filter(|q| q.id != normal.id).collect()
    } else {
        siblings
    };
    ctx.randomizer.index(pool.len()).map(|i| pool[i])
}

/// Allowed answers for a round type; empty means free text.
pub fn answer_options(round_type: RoundType, members: &[PlayerEntity]) -> Vec<String> {
    match round_type {
        RoundType::FreeForm => Vec::new(),
        RoundType::MultipleChoice => MULTIPLE_CHOICE_OPTIONS
            .iter()
            .map(|option| (*option).to_owned())
            .collect(),
        RoundType::MostLikely => {
            let mut nicknames: Vec<String> = members.iter().map(|p| p.nickname.clone()).collect();
            nicknames.sort();
            nicknames
        }
    }
}

pub(crate) async fn question_snapshot(
    tx: &mut dyn StoreTx,
    ctx: &GameContext,
    room: &RoomEntity,
    state: &GameStateEntity,
) -> Result<QuestionSnapshot, ServiceError> {
    let round = current_round(tx, state).await?;
    let members = tx.players_in_room(room.id).await?;
    let roles = tx.roles_for_round(round.id).await?;
    let answers = tx.answers_for_round(round.id).await?;
    let normal = question(tx, round.normal_question_id).await?;
    let fibber = question(tx, round.fibber_question_id).await?;

    let seats = members
        .iter()
        .map(|player| {
            let role = role_of(&roles, player.id);
            let text = match role {
                PlayerRole::Fibber => &fibber,
                PlayerRole::Normal => &normal,
            }
            .text_for(player.locale.as_deref(), &ctx.rules.default_locale);
            let answer = answers.iter().find(|a| a.player_id == player.id);
            QuestionSeat {
                player_id: player.id,
                nickname: player.nickname.clone(),
                role,
                question: text,
                answer: answer.map(|a| a.answer.clone()),
                is_answer_ready: answer.is_some_and(|a| a.is_ready),
            }
        })
        .collect();

    Ok(QuestionSnapshot {
        room_code: room.code.clone(),
        game_state_id: state.id,
        round_id: round.id,
        round_type: round.round_type,
        round_number: round.round_number,
        deadline: state.deadline,
        answer_options: answer_options(round.round_type, &members),
        seats,
    })
}

async fn voting_snapshot(
    tx: &mut dyn StoreTx,
    ctx: &GameContext,
    room: &RoomEntity,
    state: &GameStateEntity,
) -> Result<VotingSnapshot, ServiceError> {
    let round = current_round(tx, state).await?;
    let members = tx.players_in_room(room.id).await?;
    let answers = tx.answers_for_round(round.id).await?;
    let votes = tx.votes_for_round(round.id).await?;
    let normal = question(tx, round.normal_question_id).await?;
    let counts = scoring::vote_counts(&votes);

    let seats = members
        .into_iter()
        .map(|player| {
            let vote = votes.iter().find(|v| v.voter_id == player.id);
            VotingSeat {
                player_id: player.id,
                question: normal.text_for(player.locale.as_deref(), &ctx.rules.default_locale),
                answer: answers
                    .iter()
                    .find(|a| a.player_id == player.id)
                    .map(|a| a.answer.clone()),
                votes: counts.get(&player.id).copied().unwrap_or(0),
                voted_for: vote.map(|v| v.target_player_id),
                is_vote_ready: vote.is_some_and(|v| v.is_ready),
                nickname: player.nickname,
                avatar: player.avatar,
            }
        })
        .collect();

    Ok(VotingSnapshot {
        room_code: room.code.clone(),
        game_state_id: state.id,
        round_id: round.id,
        round_type: round.round_type,
        round_number: round.round_number,
        deadline: state.deadline,
        seats,
    })
}

async fn reveal_snapshot(
    tx: &mut dyn StoreTx,
    room: &RoomEntity,
    state: &GameStateEntity,
) -> Result<RevealSnapshot, ServiceError> {
    let round = current_round(tx, state).await?;
    let members = tx.players_in_room(room.id).await?;
    let votes = tx.votes_for_round(round.id).await?;
    let roles = tx.roles_for_round(round.id).await?;

    let voted_for = scoring::top_voted(&votes).and_then(|leader| {
        members.iter().find(|p| p.id == leader).map(|p| VotedFor {
            player_id: p.id,
            nickname: p.nickname.clone(),
            avatar: p.avatar.clone(),
            role: role_of(&roles, p.id),
        })
    });

    Ok(RevealSnapshot {
        room_code: room.code.clone(),
        game_state_id: state.id,
        round_type: round.round_type,
        round_number: round.round_number,
        deadline: state.deadline,
        player_ids: members.iter().map(|p| p.id).collect(),
        voted_for,
    })
}

async fn scoreboard_snapshot(
    tx: &mut dyn StoreTx,
    room: &RoomEntity,
    state: &GameStateEntity,
) -> Result<ScoreboardSnapshot, ServiceError> {
    let members = tx.players_in_room(room.id).await?;
    let rounds = tx.rounds_for_game(state.id).await?;
    let scores = tx.scores_for_game(state.id).await?;

    let round_types: HashMap<Uuid, RoundType> =
        rounds.iter().map(|r| (r.id, r.round_type)).collect();
    let mut entries: Vec<ScoreEntry> = members
        .into_iter()
        .map(|player| {
            let own = scores.iter().filter(|s| s.player_id == player.id);
            let total = own.clone().map(|s| s.points_this_round).sum();
            let points_this_round = own
                .filter(|s| round_types.get(&s.round_id) == Some(&state.round_type))
                .map(|s| s.points_this_round)
                .sum();
            ScoreEntry {
                player_id: player.id,
                nickname: player.nickname,
                avatar: player.avatar,
                points_this_round,
                total,
            }
        })
        .collect();
    entries.sort_by(|a, b| b.total.cmp(&a.total));

    Ok(ScoreboardSnapshot {
        room_code: room.code.clone(),
        game_state_id: state.id,
        round_type: state.round_type,
        deadline: state.deadline,
        entries,
    })
}

/// Write score rows for every round of the game that has none yet.
async fn score_pending_rounds(
    tx: &mut dyn StoreTx,
    ctx: &GameContext,
    state: &GameStateEntity,
) -> Result<(), ServiceError> {
    let rounds = tx.rounds_for_game(state.id).await?;
    let scores = tx.scores_for_game(state.id).await?;
    let mut totals: HashMap<Uuid, i32> = HashMap::new();
    for score in &scores {
        *totals.entry(score.player_id).or_default() += score.points_this_round;
    }

    for round in rounds {
        if scores.iter().any(|s| s.round_id == round.id) {
            continue;
        }
        let roles = tx.roles_for_round(round.id).await?;
        let Some(fibber) = fibber_of(&roles) else {
            continue;
        };
        let players: Vec<Uuid> = roles.iter().map(|r| r.player_id).collect();
        let votes = tx.votes_for_round(round.id).await?;
        for (player_id, points) in scoring::score_round(&players, fibber, &votes, &ctx.rules.scoring)
        {
            let total = totals.entry(player_id).or_default();
            *total += points;
            tx.insert_score(ScoreEntity {
                id: Uuid::now_v7(),
                round_id: round.id,
                player_id,
                points_this_round: points,
                cumulative: *total,
            })
            .await?;
        }
    }
    Ok(())
}

async fn advance(
    tx: &mut dyn StoreTx,
    state: GameStateEntity,
    phase: GamePhase,
    deadline: OffsetDateTime,
) -> Result<GameStateEntity, ServiceError> {
    let next = GameStateEntity {
        phase,
        deadline,
        updated_at: OffsetDateTime::now_utc(),
        ..state
    };
    tx.update_game_state(next.clone()).await?;
    Ok(next)
}

async fn load_game(tx: &mut dyn StoreTx, game_state_id: Uuid) -> Result<Game, ServiceError> {
    let state = tx
        .game_state_by_id(game_state_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game {game_state_id}")))?;
    let room = tx
        .room_by_id(state.room_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room {}", state.room_id)))?;
    if room.state != RoomState::Playing {
        return Err(ServiceError::RoomNotActive(room.state));
    }
    Ok(Game { room, state })
}

async fn playing_game_of(tx: &mut dyn StoreTx, player_id: Uuid) -> Result<Game, ServiceError> {
    let room = room_of(tx, player_id).await?;
    require_room_state(&room, RoomState::Playing)?;
    let state = tx
        .game_state_by_room(room.id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("game of room {}", room.code)))?;
    Ok(Game { room, state })
}

async fn current_round(
    tx: &mut dyn StoreTx,
    state: &GameStateEntity,
) -> Result<RoundEntity, ServiceError> {
    tx.latest_round(state.id)
        .await?
        .ok_or_else(|| ServiceError::Internal(format!("game {} has no round", state.id)))
}

async fn question(tx: &mut dyn StoreTx, question_id: Uuid) -> Result<QuestionEntity, ServiceError> {
    tx.question_by_id(question_id)
        .await?
        .ok_or_else(|| ServiceError::Internal(format!("question {question_id} is missing")))
}

fn require_phase(state: &GameStateEntity, expected: GamePhase) -> Result<(), ServiceError> {
    if state.phase == expected {
        Ok(())
    } else {
        Err(ServiceError::InvalidState(format!(
            "the game is in {}, not {expected}",
            state.phase
        )))
    }
}

fn illegal_transition(from: GamePhase, to: GamePhase) -> ServiceError {
    ServiceError::InvalidState(format!("cannot move from {from} to {to}"))
}

fn role_of(roles: &[RoleEntity], player_id: Uuid) -> PlayerRole {
    roles
        .iter()
        .find(|r| r.player_id == player_id)
        .map_or(PlayerRole::Normal, |r| r.role)
}

fn fibber_of(roles: &[RoleEntity]) -> Option<Uuid> {
    roles
        .iter()
        .find(|r| r.role == PlayerRole::Fibber)
        .map(|r| r.player_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(nickname: &str) -> PlayerEntity {
        PlayerEntity {
            id: Uuid::now_v7(),
            nickname: nickname.into(),
            avatar: Vec::new(),
            locale: None,
            is_ready: true,
            disconnected_at: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
            updated_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn most_likely_options_are_sorted_nicknames() {
        let members = [member("zed"), member("amy"), member("Bob")];
        assert_eq!(
            answer_options(RoundType::MostLikely, &members),
            vec!["Bob", "amy", "zed"]
        );
    }

    #[test]
    fn free_form_accepts_any_text() {
        assert!(answer_options(RoundType::FreeForm, &[member("amy")]).is_empty());
        assert_eq!(answer_options(RoundType::MultipleChoice, &[]).len(), 5);
    }

    #[test]
    fn fibber_is_read_from_roles() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        let roles = [
            RoleEntity {
                round_id: Uuid::nil(),
                player_id: a,
                role: PlayerRole::Normal,
            },
            RoleEntity {
                round_id: Uuid::nil(),
                player_id: b,
                role: PlayerRole::Fibber,
            },
        ];
        assert_eq!(fibber_of(&roles), Some(b));
        assert_eq!(role_of(&roles, a), PlayerRole::Normal);
        assert_eq!(role_of(&roles, Uuid::nil()), PlayerRole::Normal);
    }
}
