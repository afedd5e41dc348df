//! Room lifecycle up to the first question.

use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use crate::{
    dao::{
        game_store::StoreTx,
        models::{GamePhase, GameStateEntity, PlayerEntity, RoomEntity, RoomState, RoundType},
    },
    dto::validation::{normalize_room_code, validate_nickname},
    error::ServiceError,
    services::{
        GameContext, avatar, in_transaction, round_service,
        snapshots::{LobbySnapshot, MIN_PLAYERS, QuestionSnapshot},
    },
    state::SharedState,
};

const MAX_CODE_ATTEMPTS: usize = 64;
const MAX_NICKNAME_ATTEMPTS: usize = 16;

/// Result of kicking a player out of a lobby.
#[derive(Debug, Clone)]
pub struct Kicked {
    /// Lobby without the kicked player.
    pub lobby: LobbySnapshot,
    /// Player that was removed.
    pub player_id: Uuid,
}

/// Create a room hosted by `player_id` and return its lobby.
///
/// A player still attached to a finished or abandoned room is moved out of it;
/// a player in a live room is rejected.
pub async fn create_room(
    state: &SharedState,
    player_id: Uuid,
    game_name: String,
    nickname: Option<String>,
    locale: Option<String>,
) -> Result<LobbySnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    let lobby = in_transaction(state, "create_room", |tx| {
        Box::pin(create_room_tx(
            tx,
            ctx.clone(),
            player_id,
            game_name.clone(),
            nickname.clone(),
            locale.clone(),
        ))
    })
    .await?;
    info!(%player_id, room_code = %lobby.room_code, "room created");
    Ok(lobby)
}

async fn create_room_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    player_id: Uuid,
    game_name: String,
    nickname: Option<String>,
    locale: Option<String>,
) -> Result<LobbySnapshot, ServiceError> {
    if game_name != ctx.rules.default_game {
        return Err(ServiceError::InvalidInput(format!(
            "unknown game `{game_name}`"
        )));
    }
    let nickname = match nickname {
        Some(nickname) => normalize_nickname(&nickname)?,
        None => ctx.randomizer.nickname(),
    };
    let code = free_room_code(tx, &ctx).await?;
    let now = OffsetDateTime::now_utc();
    claim_player(tx, &ctx, player_id, nickname, locale, now).await?;

    let room = RoomEntity {
        id: Uuid::now_v7(),
        code,
        game_name,
        host_player_id: player_id,
        state: RoomState::Created,
        created_at: now,
        updated_at: now,
    };
    tx.insert_room(room.clone()).await?;
    tx.add_membership(room.id, player_id).await?;
    load_lobby(tx, &room).await
}

/// Nickname without surrounding whitespace, checked against the length limits.
pub(crate) fn normalize_nickname(nickname: &str) -> Result<String, ServiceError> {
    validate_nickname(nickname).map_err(|err| {
        ServiceError::InvalidInput(
            err.message
                .map(|message| message.into_owned())
                .unwrap_or_else(|| "invalid nickname".into()),
        )
    })?;
    Ok(nickname.trim().to_owned())
}

/// Join the CREATED room using `room_code`.
pub async fn join_room(
    state: &SharedState,
    player_id: Uuid,
    room_code: String,
    nickname: Option<String>,
    locale: Option<String>,
) -> Result<LobbySnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    let lobby = in_transaction(state, "join_room", |tx| {
        Box::pin(join_room_tx(
            tx,
            ctx.clone(),
            player_id,
            room_code.clone(),
            nickname.clone(),
            locale.clone(),
        ))
    })
    .await?;
    info!(%player_id, room_code = %lobby.room_code, players = lobby.players.len(), "player joined");
    Ok(lobby)
}

async fn join_room_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    player_id: Uuid,
    room_code: String,
    nickname: Option<String>,
    locale: Option<String>,
) -> Result<LobbySnapshot, ServiceError> {
    let room = room_by_code(tx, &room_code).await?;
    require_room_state(&room, RoomState::Created)?;
    let members = tx.players_in_room(room.id).await?;

    let nickname = match nickname.as_deref().map(normalize_nickname).transpose()? {
        Some(nickname) if members.iter().any(|p| p.nickname == nickname) => {
            return Err(ServiceError::NicknameExists(nickname));
        }
        Some(nickname) => nickname,
        None => generated_nickname(&ctx, &members)?,
    };
    claim_player(tx, &ctx, player_id, nickname, locale, OffsetDateTime::now_utc()).await?;
    tx.add_membership(room.id, player_id).await?;
    load_lobby(tx, &room).await
}

/// Remove the player named `nickname` from the host's lobby.
pub async fn kick_player(
    state: &SharedState,
    host_id: Uuid,
    room_code: String,
    nickname: String,
) -> Result<Kicked, ServiceError> {
    let kicked = in_transaction(state, "kick_player", |tx| {
        Box::pin(kick_player_tx(tx, host_id, room_code.clone(), nickname.clone()))
    })
    .await?;
    info!(host_id = %host_id, kicked = %kicked.player_id, room_code = %kicked.lobby.room_code, "player kicked");
    Ok(kicked)
}

async fn kick_player_tx(
    tx: &mut dyn StoreTx,
    host_id: Uuid,
    room_code: String,
    nickname: String,
) -> Result<Kicked, ServiceError> {
    let room = room_by_code(tx, &room_code).await?;
    require_host(&room, host_id)?;
    require_room_state(&room, RoomState::Created)?;

    let target = tx
        .players_in_room(room.id)
        .await?
        .into_iter()
        .find(|p| p.nickname == nickname)
        .ok_or_else(|| ServiceError::NotFound(format!("player `{nickname}` in room {}", room.code)))?;
    if target.id == host_id {
        return Err(ServiceError::InvalidInput("the host cannot kick themselves".into()));
    }

    tx.delete_player(target.id).await?;
    Ok(Kicked {
        lobby: load_lobby(tx, &room).await?,
        player_id: target.id,
    })
}

/// Start the game of the host's room and open the first free form round.
pub async fn start_game(
    state: &SharedState,
    host_id: Uuid,
    room_code: String,
    deadline: OffsetDateTime,
) -> Result<QuestionSnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    let question = in_transaction(state, "start_game", |tx| {
        Box::pin(start_game_tx(tx, ctx.clone(), host_id, room_code.clone(), deadline))
    })
    .await?;
    info!(
        room_code = %question.room_code,
        game_state_id = %question.game_state_id,
        players = question.seats.len(),
        "game started"
    );
    Ok(question)
}

async fn start_game_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    host_id: Uuid,
    room_code: String,
    deadline: OffsetDateTime,
) -> Result<QuestionSnapshot, ServiceError> {
    let room = room_by_code(tx, &room_code).await?;
    require_host(&room, host_id)?;
    require_room_state(&room, RoomState::Created)?;

    let members = tx.players_in_room(room.id).await?;
    if members.len() < MIN_PLAYERS {
        return Err(ServiceError::InvalidState(format!(
            "at least {MIN_PLAYERS} players are needed to start"
        )));
    }
    if let Some(waiting) = members.iter().find(|p| !p.is_ready) {
        return Err(ServiceError::InvalidState(format!(
            "player `{}` is not ready",
            waiting.nickname
        )));
    }

    let now = OffsetDateTime::now_utc();
    tx.update_room_state(room.id, RoomState::Playing, now).await?;
    let game_state = GameStateEntity {
        id: Uuid::now_v7(),
        room_id: room.id,
        phase: GamePhase::Question,
        round_number: 1,
        round_type: RoundType::FreeForm,
        deadline,
        created_at: now,
        updated_at: now,
    };
    tx.insert_game_state(game_state.clone()).await?;
    round_service::open_round(tx, &ctx, &room, &game_state, &members, None).await?;
    round_service::question_snapshot(tx, &ctx, &room, &game_state).await
}

/// Mark CREATED and PLAYING rooms whose members have all been gone since
/// before `cutoff` as ABANDONED. Returns the game states to stop.
pub async fn abandon_idle_rooms(
    state: &SharedState,
    cutoff: OffsetDateTime,
) -> Result<Vec<(RoomEntity, Option<Uuid>)>, ServiceError> {
    let abandoned = in_transaction(state, "abandon_idle_rooms", |tx| {
        Box::pin(abandon_idle_rooms_tx(tx, cutoff))
    })
    .await?;
    for (room, _) in &abandoned {
        info!(room_code = %room.code, "room abandoned");
    }
    Ok(abandoned)
}

async fn abandon_idle_rooms_tx(
    tx: &mut dyn StoreTx,
    cutoff: OffsetDateTime,
) -> Result<Vec<(RoomEntity, Option<Uuid>)>, ServiceError> {
    let mut candidates = tx.rooms_in_state(RoomState::Created).await?;
    candidates.extend(tx.rooms_in_state(RoomState::Playing).await?);

    let mut abandoned = Vec::new();
    for room in candidates {
        let members = tx.players_in_room(room.id).await?;
        let idle = members
            .iter()
            .all(|p| p.disconnected_at.is_some_and(|at| at <= cutoff));
        if !idle {
            continue;
        }
        tx.update_room_state(room.id, RoomState::Abandoned, OffsetDateTime::now_utc())
            .await?;
        let game_state = tx.game_state_by_room(room.id).await?.map(|gs| gs.id);
        abandoned.push((room, game_state));
    }
    Ok(abandoned)
}

/// Lobby of `room` as currently stored.
pub(crate) async fn load_lobby(
    tx: &mut dyn StoreTx,
    room: &RoomEntity,
) -> Result<LobbySnapshot, ServiceError> {
    Ok(LobbySnapshot {
        room_id: room.id,
        room_code: room.code.clone(),
        host_player_id: room.host_player_id,
        players: tx.players_in_room(room.id).await?,
    })
}

/// Room the player belongs to.
pub(crate) async fn room_of(
    tx: &mut dyn StoreTx,
    player_id: Uuid,
) -> Result<RoomEntity, ServiceError> {
    tx.room_by_player(player_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id} is not in a room")))
}

/// Fail unless `room` is in `expected`.
pub(crate) fn require_room_state(
    room: &RoomEntity,
    expected: RoomState,
) -> Result<(), ServiceError> {
    if room.state == expected {
        Ok(())
    } else {
        Err(ServiceError::WrongRoomState {
            expected,
            actual: room.state,
        })
    }
}

fn require_host(room: &RoomEntity, player_id: Uuid) -> Result<(), ServiceError> {
    if room.host_player_id == player_id {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(
            "only the host can do this".into(),
        ))
    }
}

async fn room_by_code(tx: &mut dyn StoreTx, code: &str) -> Result<RoomEntity, ServiceError> {
    let code = normalize_room_code(code);
    tx.active_room_by_code(code.clone())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("room {code}")))
}

async fn free_room_code(tx: &mut dyn StoreTx, ctx: &GameContext) -> Result<String, ServiceError> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = ctx.randomizer.room_code();
        if tx.active_room_by_code(code.clone()).await?.is_none() {
            return Ok(code);
        }
    }
    Err(ServiceError::Internal(
        "could not find a free room code".into(),
    ))
}

fn generated_nickname(ctx: &GameContext, members: &[PlayerEntity]) -> Result<String, ServiceError> {
    (0..MAX_NICKNAME_ATTEMPTS)
        .map(|_| ctx.randomizer.nickname())
        .find(|candidate| members.iter().all(|p| &p.nickname != candidate))
        .ok_or_else(|| ServiceError::Internal("could not generate a free nickname".into()))
}

/// Write the player row for a player entering a room.
///
/// Rows left behind by a terminal room are reused so the old game's scores
/// keep their player.
async fn claim_player(
    tx: &mut dyn StoreTx,
    ctx: &GameContext,
    player_id: Uuid,
    nickname: String,
    locale: Option<String>,
    now: OffsetDateTime,
) -> Result<(), ServiceError> {
    if let Some(room) = tx.room_by_player(player_id).await? {
        if !room.state.is_terminal() {
            return Err(ServiceError::InvalidState(format!(
                "player is already in room {}",
                room.code
            )));
        }
        tx.remove_membership(room.id, player_id).await?;
    }

    let player = PlayerEntity {
        id: player_id,
        nickname,
        avatar: avatar::render(ctx.randomizer.avatar_seed()),
        locale,
        is_ready: false,
        disconnected_at: None,
        created_at: now,
        updated_at: now,
    };
    match tx.player_by_id(player_id).await? {
        Some(existing) => {
            tx.update_player(PlayerEntity {
                created_at: existing.created_at,
                locale: player.locale.or(existing.locale),
                ..player
            })
            .await?
        }
        None => tx.insert_player(player).await?,
    }
    Ok(())
}
