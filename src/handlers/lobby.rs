//! Room lifecycle messages.

use time::OffsetDateTime;

use super::{HandlerContext, HandlerError};
use crate::{
    dto::ws::{CreateRoomRequest, JoinLobbyRequest, KickPlayerRequest, StartGameRequest},
    services::{broadcast, lobby_service},
    state::{phase::Step, state_machine},
};

/// `create_room`: the sender hosts a new lobby.
pub async fn create_room(
    ctx: HandlerContext,
    request: CreateRoomRequest,
) -> Result<(), HandlerError> {
    let lobby = lobby_service::create_room(
        &ctx.state,
        ctx.player_id,
        request.game_name,
        request.player_nickname,
        ctx.locale.clone(),
    )
    .await?;
    broadcast::lobby(&ctx.state, &lobby).await;
    Ok(())
}

/// `join_lobby`: the sender joins an existing lobby.
pub async fn join_lobby(ctx: HandlerContext, request: JoinLobbyRequest) -> Result<(), HandlerError> {
    let lobby = lobby_service::join_room(
        &ctx.state,
        ctx.player_id,
        request.room_code,
        request.player_nickname,
        ctx.locale.clone(),
    )
    .await?;
    broadcast::lobby(&ctx.state, &lobby).await;
    Ok(())
}

/// `kick_player`: the host removes a member.
pub async fn kick_player(
    ctx: HandlerContext,
    request: KickPlayerRequest,
) -> Result<(), HandlerError> {
    let kicked = lobby_service::kick_player(
        &ctx.state,
        ctx.player_id,
        request.room_code,
        request.player_nickname_to_kick,
    )
    .await?;
    broadcast::kicked(&ctx.state, kicked.player_id, &kicked.lobby.room_code).await;
    broadcast::lobby(&ctx.state, &kicked.lobby).await;
    Ok(())
}

/// `start_game`: the host opens the first round.
///
/// The phase task re-enters the stored question and broadcasts it, then
/// drives the game until its winner screen.
pub async fn start_game(ctx: HandlerContext, request: StartGameRequest) -> Result<(), HandlerError> {
    let deadline = OffsetDateTime::now_utc() + ctx.state.config().timings.question;
    let question =
        lobby_service::start_game(&ctx.state, ctx.player_id, request.room_code, deadline).await?;
    state_machine::start(
        &ctx.state,
        question.game_state_id,
        Step::Question { next_round: false },
    );
    Ok(())
}
