//! Lobby mutations of a single player and connection bookkeeping.

use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::StoreTx,
        models::{PlayerEntity, RoomEntity, RoomState},
    },
    error::ServiceError,
    services::{
        GameContext, avatar, in_transaction,
        lobby_service::{load_lobby, normalize_nickname, require_room_state, room_of},
        snapshots::LobbySnapshot,
    },
    state::SharedState,
};

/// Rename the player; the new nickname must be free in their room.
pub async fn update_nickname(
    state: &SharedState,
    player_id: Uuid,
    nickname: String,
) -> Result<LobbySnapshot, ServiceError> {
    let lobby = in_transaction(state, "update_nickname", |tx| {
        Box::pin(update_nickname_tx(tx, player_id, nickname.clone()))
    })
    .await?;
    info!(%player_id, room_code = %lobby.room_code, "nickname updated");
    Ok(lobby)
}

async fn update_nickname_tx(
    tx: &mut dyn StoreTx,
    player_id: Uuid,
    nickname: String,
) -> Result<LobbySnapshot, ServiceError> {
    let nickname = normalize_nickname(&nickname)?;
    let (room, player) = lobby_member(tx, player_id).await?;
    if player.nickname == nickname {
        return load_lobby(tx, &room).await;
    }
    let taken = tx
        .players_in_room(room.id)
        .await?
        .iter()
        .any(|p| p.id != player_id && p.nickname == nickname);
    if taken {
        return Err(ServiceError::NicknameExists(nickname));
    }
    tx.update_player(PlayerEntity {
        nickname,
        updated_at: OffsetDateTime::now_utc(),
        ..player
    })
    .await?;
    load_lobby(tx, &room).await
}

/// Replace the player's avatar with a freshly seeded one.
pub async fn generate_new_avatar(
    state: &SharedState,
    player_id: Uuid,
) -> Result<LobbySnapshot, ServiceError> {
    let ctx = GameContext::from_state(state);
    in_transaction(state, "generate_new_avatar", |tx| {
        Box::pin(generate_new_avatar_tx(tx, ctx.clone(), player_id))
    })
    .await
}

async fn generate_new_avatar_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    player_id: Uuid,
) -> Result<LobbySnapshot, ServiceError> {
    let (room, player) = lobby_member(tx, player_id).await?;
    tx.update_player(PlayerEntity {
        avatar: avatar::render(ctx.randomizer.avatar_seed()),
        updated_at: OffsetDateTime::now_utc(),
        ..player
    })
    .await?;
    load_lobby(tx, &room).await
}

/// Flip the lobby ready flag.
pub async fn toggle_player_is_ready(
    state: &SharedState,
    player_id: Uuid,
) -> Result<LobbySnapshot, ServiceError> {
    in_transaction(state, "toggle_player_is_ready", |tx| {
        Box::pin(toggle_player_is_ready_tx(tx, player_id))
    })
    .await
}

async fn toggle_player_is_ready_tx(
    tx: &mut dyn StoreTx,
    player_id: Uuid,
) -> Result<LobbySnapshot, ServiceError> {
    let (room, player) = lobby_member(tx, player_id).await?;
    tx.update_player(PlayerEntity {
        is_ready: !player.is_ready,
        updated_at: OffsetDateTime::now_utc(),
        ..player
    })
    .await?;
    load_lobby(tx, &room).await
}

/// Store the locale a client announced. Unknown players are ignored.
pub async fn update_locale(
    state: &SharedState,
    player_id: Uuid,
    locale: String,
) -> Result<(), ServiceError> {
    in_transaction(state, "update_locale", |tx| {
        let locale = locale.clone();
        Box::pin(async move {
            if let Some(player) = tx.player_by_id(player_id).await? {
                if player.locale.as_deref() != Some(locale.as_str()) {
                    tx.update_player(PlayerEntity {
                        locale: Some(locale),
                        updated_at: OffsetDateTime::now_utc(),
                        ..player
                    })
                    .await?;
                }
            }
            Ok::<_, ServiceError>(())
        })
    })
    .await
}

/// Clear the disconnection mark when an endpoint opens for the player.
pub async fn mark_connected(state: &SharedState, player_id: Uuid) -> Result<(), ServiceError> {
    set_disconnected_at(state, player_id, None).await
}

/// Record when the player's endpoint closed.
pub async fn mark_disconnected(
    state: &SharedState,
    player_id: Uuid,
    at: OffsetDateTime,
) -> Result<(), ServiceError> {
    set_disconnected_at(state, player_id, Some(at)).await
}

async fn set_disconnected_at(
    state: &SharedState,
    player_id: Uuid,
    disconnected_at: Option<OffsetDateTime>,
) -> Result<(), ServiceError> {
    in_transaction(state, "set_disconnected_at", |tx| {
        Box::pin(async move {
            if let Some(player) = tx.player_by_id(player_id).await? {
                tx.update_player(PlayerEntity {
                    disconnected_at,
                    ..player
                })
                .await?;
            }
            Ok::<_, ServiceError>(())
        })
    })
    .await?;
    debug!(%player_id, connected = disconnected_at.is_none(), "connection state recorded");
    Ok(())
}

/// Lobby of the player's room.
pub async fn get_lobby(state: &SharedState, player_id: Uuid) -> Result<LobbySnapshot, ServiceError> {
    in_transaction(state, "get_lobby", |tx| {
        Box::pin(async move {
            let room = room_of(tx, player_id).await?;
            load_lobby(tx, &room).await
        })
    })
    .await
}

/// Room the player currently belongs to.
pub async fn get_room_state(
    state: &SharedState,
    player_id: Uuid,
) -> Result<RoomEntity, ServiceError> {
    in_transaction(state, "get_room_state", |tx| {
        Box::pin(async move { room_of(tx, player_id).await })
    })
    .await
}

async fn lobby_member(
    tx: &mut dyn StoreTx,
    player_id: Uuid,
) -> Result<(RoomEntity, PlayerEntity), ServiceError> {
    let room = room_of(tx, player_id).await?;
    require_room_state(&room, RoomState::Created)?;
    let player = tx
        .player_by_id(player_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("player {player_id}")))?;
    Ok((room, player))
}
