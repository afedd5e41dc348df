//! Rendering and publishing of views to player topics.
//!
//! Delivery is best effort: a failed render or publish is logged and the
//! remaining players are still served.

use tracing::{error, warn};
use uuid::Uuid;

use crate::{
    dto::views::{ErrorView, KickedView, View},
    services::snapshots::{LobbySnapshot, PhaseSnapshot},
    state::SharedState,
};

/// Render `view` and publish it on the player's topic.
pub async fn send_view(state: &SharedState, player_id: Uuid, view: &View) {
    let payload = match state.renderer().render(view) {
        Ok(payload) => payload,
        Err(err) => {
            error!(%player_id, message_type = view.message_type(), error = %err, "failed to render view");
            return;
        }
    };
    if let Err(err) = state.pubsub().publish(player_id, payload).await {
        warn!(%player_id, message_type = view.message_type(), error = %err, "failed to publish view");
    }
}

/// Send every member their lobby.
pub async fn lobby(state: &SharedState, lobby: &LobbySnapshot) {
    for player_id in lobby.player_ids() {
        send_view(state, player_id, &lobby.view_for(player_id)).await;
    }
}

/// Send every member their view of the phase.
pub async fn phase(state: &SharedState, snapshot: &PhaseSnapshot) {
    for player_id in snapshot.player_ids() {
        if let Some(view) = snapshot.view_for(player_id) {
            send_view(state, player_id, &view).await;
        }
    }
}

/// Tell a player they were removed from a lobby.
pub async fn kicked(state: &SharedState, player_id: Uuid, room_code: &str) {
    let view = View::Kicked(KickedView {
        room_code: room_code.to_owned(),
    });
    send_view(state, player_id, &view).await;
}

/// Report a failed request to the player who sent it.
pub async fn error(state: &SharedState, player_id: Uuid, code: &str, message: String) {
    let view = View::Error(ErrorView {
        code: code.to_owned(),
        message,
    });
    send_view(state, player_id, &view).await;
}
