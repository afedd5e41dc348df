//! Lobby member updates.

use super::{HandlerContext, HandlerError};
use crate::{
    dto::ws::{EmptyRequest, UpdateNicknameRequest},
    services::{broadcast, player_service},
};

/// `update_player_nickname`
pub async fn update_player_nickname(
    ctx: HandlerContext,
    request: UpdateNicknameRequest,
) -> Result<(), HandlerError> {
    let lobby =
        player_service::update_nickname(&ctx.state, ctx.player_id, request.player_nickname)
            .await?;
    broadcast::lobby(&ctx.state, &lobby).await;
    Ok(())
}

/// `generate_new_avatar`
pub async fn generate_new_avatar(
    ctx: HandlerContext,
    _request: EmptyRequest,
) -> Result<(), HandlerError> {
    let lobby = player_service::generate_new_avatar(&ctx.state, ctx.player_id).await?;
    broadcast::lobby(&ctx.state, &lobby).await;
    Ok(())
}

/// `toggle_player_is_ready`
pub async fn toggle_player_is_ready(
    ctx: HandlerContext,
    _request: EmptyRequest,
) -> Result<(), HandlerError> {
    let lobby = player_service::toggle_player_is_ready(&ctx.state, ctx.player_id).await?;
    broadcast::lobby(&ctx.state, &lobby).await;
    Ok(())
}
