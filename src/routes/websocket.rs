use axum::{
    Router,
    extract::{Query, State, WebSocketUpgrade},
    http::{HeaderMap, HeaderValue, header::SET_COOKIE},
    response::{IntoResponse, Response},
    routing::get,
};
use axum_valid::Valid;
use tracing::warn;

use crate::{
    dto::ws::SubscribeQuery,
    services::websocket_service::{self, Session},
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/ws",
    tag = "players",
    params(SubscribeQuery),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a player session.
///
/// The player is resolved by the configured identity provider. The default
/// one uses the `player_id` cookie and sets it on the upgrade response when missing.
pub async fn ws_handler(
    State(state): State<SharedState>,
    Valid(Query(query)): Valid<Query<SubscribeQuery>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let session = Session::from_request(&headers, query.test_name, state.identity());
    let set_cookie = session.set_cookie.clone();

    let mut response = ws
        .on_upgrade(move |socket| websocket_service::handle_socket(state, socket, session))
        .into_response();
    if let Some(cookie) = set_cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                response.headers_mut().insert(SET_COOKIE, value);
            }
            Err(err) => warn!(error = %err, "invalid player cookie"),
        }
    }
    response
}

/// Configure the WebSocket endpoint.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/ws", get(ws_handler))
}
