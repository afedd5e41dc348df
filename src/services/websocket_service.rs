use std::time::{Duration, Instant};

use axum::{
    extract::ws::{Message, WebSocket},
    http::HeaderMap,
};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::timeout,
};
use tracing::{Instrument, debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::Envelope,
    handlers::{HandlerContext, HandlerError},
    pubsub::Subscription,
    services::{
        broadcast,
        identity::{IdentityProvider, cookie},
        player_service, reconnect,
    },
    state::SharedState,
    telemetry::TraceContext,
};

/// Frames buffered for one endpoint before new ones are dropped.
pub const OUTBOUND_CAPACITY: usize = 10;
const WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Cookie carrying the client locale.
pub const LOCALE_COOKIE: &str = "locale";

/// Identity of the client behind one connection.
#[derive(Debug, Clone)]
pub struct Session {
    /// Player id resolved by the identity provider.
    pub player_id: Uuid,
    /// Locale cookie.
    pub locale: Option<String>,
    /// Trace correlation of the upgrade request.
    pub trace: TraceContext,
    /// `Set-Cookie` value to return when the id was minted.
    pub set_cookie: Option<String>,
}

impl Session {
    /// Resolve the player through `identity` and read the locale cookie.
    pub fn from_request(
        headers: &HeaderMap,
        test_name: Option<String>,
        identity: &dyn IdentityProvider,
    ) -> Self {
        let resolved = identity.identify(headers);
        Self {
            player_id: resolved.player_id,
            locale: cookie(headers, LOCALE_COOKIE).filter(|value| !value.is_empty()),
            trace: TraceContext::from_request(headers, test_name).with_player(resolved.player_id),
            set_cookie: resolved.set_cookie,
        }
    }
}

/// Handle the full lifecycle of one player connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket, mut session: Session) {
    let player_id = session.player_id;
    if let Ok(room) = player_service::get_room_state(&state, player_id).await {
        session.trace = session.trace.with_room(&room.code);
    }
    let span = session.trace.span("subscribe");
    serve(state, socket, session).instrument(span).await;
}

async fn serve(state: SharedState, socket: WebSocket, session: Session) {
    let player_id = session.player_id;
    let started = Instant::now();
    let active = state.connection_opened(player_id);
    info!(%player_id, active, "player connected");

    if let Some(locale) = session.locale.clone() {
        if let Err(err) = player_service::update_locale(&state, player_id, locale).await {
            debug!(error = %err, "locale not recorded");
        }
    }
    if let Err(err) = player_service::mark_connected(&state, player_id).await {
        debug!(error = %err, "connection not recorded");
    }

    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<Message>(OUTBOUND_CAPACITY);

    let writer_task = tokio::spawn(
        async move {
            while let Some(message) = outbound_rx.recv().await {
                match timeout(WRITE_TIMEOUT, sender.send(message)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        debug!(error = %err, "websocket write failed");
                        break;
                    }
                    Err(_) => {
                        warn!("websocket write timed out");
                        break;
                    }
                }
            }
        }
        .in_current_span(),
    );

    let subscription = match state.pubsub().subscribe(player_id).await {
        Ok(subscription) => subscription,
        Err(err) => {
            warn!(error = %err, "failed to subscribe to player topic");
            let _ = outbound_tx.try_send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            close(&state, player_id, started).await;
            return;
        }
    };

    if state.config().auto_reconnect {
        if let Some(payload) = reconnect::payload(&state, player_id).await {
            let _ = outbound_tx.try_send(frame(payload));
        }
    }

    let forwarder = tokio::spawn(forward(subscription, outbound_tx.clone()).in_current_span());

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                handle_frame(&state, &session, text.as_str()).await;
            }
            Ok(Message::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                Ok(text) => handle_frame(&state, &session, text).await,
                Err(_) => {
                    broadcast::error(&state, player_id, "VALIDATION", "frames must be UTF-8 JSON".into())
                        .await;
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.try_send(Message::Pong(payload));
            }
            Ok(Message::Pong(_)) => {}
            Ok(Message::Close(_)) => break,
            Err(err) => {
                warn!(error = %err, "websocket error");
                break;
            }
        }
        if writer_task.is_finished() {
            break;
        }
    }

    forwarder.abort();
    finalize(writer_task, outbound_tx).await;
    close(&state, player_id, started).await;
}

/// Copy topic payloads into the endpoint's bounded queue.
async fn forward(mut subscription: Subscription, outbound: mpsc::Sender<Message>) {
    while let Some(payload) = subscription.next().await {
        match outbound.try_send(frame(payload)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => debug!("endpoint lagging; frame dropped"),
            Err(TrySendError::Closed(_)) => break,
        }
    }
}

fn frame(payload: Vec<u8>) -> Message {
    match String::from_utf8(payload) {
        Ok(text) => Message::Text(text.into()),
        Err(err) => Message::Binary(err.into_bytes().into()),
    }
}

/// Parse one inbound frame and dispatch it; failures are reported to the sender.
async fn handle_frame(state: &SharedState, session: &Session, text: &str) {
    let player_id = session.player_id;
    let result = match serde_json::from_str::<Value>(text) {
        Ok(payload) => dispatch(state, session, payload).await,
        Err(err) => Err(HandlerError::Validation(format!("malformed JSON: {err}"))),
    };
    if let Err(err) = result {
        if matches!(err, HandlerError::NotFound(_) | HandlerError::Validation(_)) {
            warn!(%player_id, code = err.code(), error = %err, "message rejected");
        }
        broadcast::error(state, player_id, err.code(), err.to_string()).await;
    }
}

async fn dispatch(state: &SharedState, session: &Session, payload: Value) -> Result<(), HandlerError> {
    let envelope: Envelope = serde_json::from_value(payload.clone())
        .map_err(|err| HandlerError::Validation(format!("invalid envelope: {err}")))?;
    let trace = session.trace.for_message(
        envelope
            .trace
            .as_ref()
            .map(|t| (t.trace_id.as_str(), t.span_id.as_str())),
        envelope.test_name_header(),
        envelope
            .test_context
            .as_ref()
            .and_then(|context| context.test_name.as_deref()),
    );
    let span = trace.span("message");
    let ctx = HandlerContext {
        state: state.clone(),
        player_id: session.player_id,
        locale: session.locale.clone(),
        trace,
    };
    state
        .handlers()
        .dispatch(ctx, &envelope.message_type, payload)
        .instrument(span)
        .await
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::Sender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

async fn close(state: &SharedState, player_id: Uuid, started: Instant) {
    let last = state.connection_closed(player_id);
    if last {
        if let Err(err) = state.pubsub().close(player_id).await {
            debug!(error = %err, "player topic already closed");
        }
        if let Err(err) = player_service::mark_disconnected(state, player_id, OffsetDateTime::now_utc()).await {
            debug!(error = %err, "disconnection not recorded");
        }
    }
    info!(
        %player_id,
        duration_ms = started.elapsed().as_millis() as u64,
        active = state.active_connections(),
        "player disconnected"
    );
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderValue, header::COOKIE};

    use super::*;
    use crate::services::identity::CookieIdentity;

    #[test]
    fn cookies_are_read_from_every_header() {
        let mut headers = HeaderMap::new();
        headers.append(COOKIE, HeaderValue::from_static("theme=dark; locale=fr-FR"));
        let id = Uuid::now_v7();
        headers.append(COOKIE, HeaderValue::from_str(&format!("player_id={id}")).unwrap());

        let session = Session::from_request(&headers, None, &CookieIdentity);
        assert_eq!(session.player_id, id);
        assert_eq!(session.locale.as_deref(), Some("fr-FR"));
        assert!(session.set_cookie.is_none());
    }

    #[test]
    fn invalid_player_cookie_mints_a_new_id() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("player_id=not-a-uuid"));

        let session = Session::from_request(&headers, Some("smoke".into()), &CookieIdentity);
        assert_eq!(session.player_id.get_version_num(), 7);
        let cookie = session.set_cookie.unwrap();
        assert!(cookie.starts_with(&format!("player_id={}", session.player_id)));
        assert!(cookie.contains("HttpOnly; Secure; SameSite=Strict; Path=/"));
        assert_eq!(session.trace.test_name(), Some("smoke"));
    }

    #[test]
    fn non_utf8_payloads_are_sent_as_binary() {
        assert!(matches!(frame(b"{}".to_vec()), Message::Text(_)));
        assert!(matches!(frame(vec![0xff, 0xfe]), Message::Binary(_)));
    }
}
