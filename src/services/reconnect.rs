//! Views for players coming back on a new connection.
//!
//! Nothing here writes to storage or reads the clock, so with unchanged
//! storage two calls produce the same bytes.

use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    dao::{game_store::StoreTx, models::RoomState},
    dto::views::{ErrorView, View},
    error::ServiceError,
    services::{
        GameContext, in_transaction,
        lobby_service::{load_lobby, room_of},
        round_service,
    },
    state::SharedState,
};

/// The view the player would currently see.
pub async fn current_view(state: &SharedState, player_id: Uuid) -> Result<View, ServiceError> {
    let ctx = GameContext::from_state(state);
    in_transaction(state, "reconnect", |tx| {
        Box::pin(current_view_tx(tx, ctx.clone(), player_id))
    })
    .await
}

async fn current_view_tx(
    tx: &mut dyn StoreTx,
    ctx: GameContext,
    player_id: Uuid,
) -> Result<View, ServiceError> {
    let room = room_of(tx, player_id).await?;
    match room.state {
        RoomState::Created => Ok(load_lobby(tx, &room).await?.view_for(player_id)),
        RoomState::Playing => {
            let game_state = tx
                .game_state_by_room(room.id)
                .await?
                .ok_or_else(|| ServiceError::NotFound(format!("game of room {}", room.code)))?;
            round_service::phase_snapshot(tx, &ctx, &room, &game_state)
                .await?
                .view_for(player_id)
                .ok_or_else(|| {
                    ServiceError::NotFound(format!("player {player_id} has no seat in the game"))
                })
        }
        other => Err(ServiceError::RoomNotActive(other)),
    }
}

/// First frame for a new connection: the current view, or an error payload.
/// Players outside any room get nothing.
pub async fn payload(state: &SharedState, player_id: Uuid) -> Option<Vec<u8>> {
    let view = match current_view(state, player_id).await {
        Ok(view) => view,
        Err(ServiceError::NotFound(reason)) => {
            debug!(%player_id, reason, "nothing to restore");
            return None;
        }
        Err(err) => View::Error(ErrorView {
            code: err.code().to_owned(),
            message: err.to_string(),
        }),
    };
    match state.renderer().render(&view) {
        Ok(payload) => Some(payload),
        Err(err) => {
            error!(%player_id, error = %err, "failed to render reconnection view");
            None
        }
    }
}
