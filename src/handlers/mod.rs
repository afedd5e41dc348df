//! Dispatch of inbound WebSocket messages to their handlers.
//!
//! Each `message_type` maps to one handler. Handlers are wrapped by the
//! middleware [`Chain`] at registration time and receive their payload
//! already deserialized and validated.

pub mod lobby;
pub mod middleware;
pub mod player;
pub mod round;

use std::{collections::HashMap, future::Future, sync::Arc};

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;
use validator::Validate;

use crate::{
    error::{ErrorKind, ServiceError},
    state::SharedState,
    telemetry::TraceContext,
};

pub use self::middleware::{Chain, Logging, Middleware, Recovery};

/// Errors surfaced by dispatch and handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// No handler is registered for the message type.
    #[error("unknown message type `{0}`")]
    NotFound(String),
    /// The payload could not be parsed or failed validation.
    #[error("invalid payload: {0}")]
    Validation(String),
    /// The handler panicked; the connection survives.
    #[error("handler panicked: {0}")]
    PanicRecovered(String),
    /// The service call failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl HandlerError {
    /// Classification used for logging.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HandlerError::NotFound(_) | HandlerError::Validation(_) => ErrorKind::Validation,
            HandlerError::PanicRecovered(_) => ErrorKind::Fatal,
            HandlerError::Service(err) => err.kind(),
        }
    }

    /// Stable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::NotFound(_) => "HANDLER_NOT_FOUND",
            HandlerError::Validation(_) => "VALIDATION",
            HandlerError::PanicRecovered(_) => "PANIC_RECOVERED",
            HandlerError::Service(err) => err.code(),
        }
    }
}

/// Everything a handler knows about the message's sender.
#[derive(Clone)]
pub struct HandlerContext {
    /// Shared application state.
    pub state: SharedState,
    /// Sender of the message.
    pub player_id: Uuid,
    /// Locale announced by the sender's client.
    pub locale: Option<String>,
    /// Trace correlation of the message.
    pub trace: TraceContext,
}

/// Future returned by handlers.
pub type HandlerFuture = BoxFuture<'static, Result<(), HandlerError>>;

/// Handles one message type. `payload` is the whole inbound JSON object.
pub trait Handler: Send + Sync {
    /// Process one message.
    fn call(&self, ctx: HandlerContext, payload: Value) -> HandlerFuture;
}

impl<F> Handler for F
where
    F: Fn(HandlerContext, Value) -> HandlerFuture + Send + Sync,
{
    fn call(&self, ctx: HandlerContext, payload: Value) -> HandlerFuture {
        self(ctx, payload)
    }
}

/// Shared handler.
pub type BoxedHandler = Arc<dyn Handler>;

/// Adapt a typed handler: the payload is deserialized into `P` and checked
/// with `validator` before `handler` runs.
pub fn validated<P, F, Fut>(handler: F) -> BoxedHandler
where
    P: DeserializeOwned + Validate + Send + 'static,
    F: Fn(HandlerContext, P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    Arc::new(move |ctx: HandlerContext, payload: Value| -> HandlerFuture {
        match parse::<P>(payload) {
            Ok(request) => Box::pin(handler(ctx, request)),
            Err(err) => Box::pin(async move { Err(err) }),
        }
    })
}

fn parse<P: DeserializeOwned + Validate>(payload: Value) -> Result<P, HandlerError> {
    let request: P =
        serde_json::from_value(payload).map_err(|err| HandlerError::Validation(err.to_string()))?;
    request
        .validate()
        .map_err(|err| HandlerError::Validation(err.to_string()))?;
    Ok(request)
}

/// Message type to handler table.
#[derive(Default)]
pub struct Registry {
    handlers: HashMap<&'static str, BoxedHandler>,
}

impl Registry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `message_type`, wrapped by `chain`.
    pub fn register(&mut self, chain: &Chain, message_type: &'static str, handler: BoxedHandler) {
        self.handlers
            .insert(message_type, chain.apply(message_type, handler));
    }

    /// Registered message types, sorted.
    pub fn message_types(&self) -> Vec<&'static str> {
        let mut types: Vec<&'static str> = self.handlers.keys().copied().collect();
        types.sort_unstable();
        types
    }

    /// Run the handler registered for `message_type`.
    pub async fn dispatch(
        &self,
        ctx: HandlerContext,
        message_type: &str,
        payload: Value,
    ) -> Result<(), HandlerError> {
        let handler = self
            .handlers
            .get(message_type)
            .cloned()
            .ok_or_else(|| HandlerError::NotFound(message_type.to_owned()))?;
        handler.call(ctx, payload).await
    }
}

/// Registry of every message type the server understands.
///
/// Each handler is wrapped by [`validated`], the innermost layer, so payload
/// failures pass through Logging and Recovery like any other error.
pub fn registry() -> Registry {
    let chain = Chain::new().then(Recovery).then(Logging);
    let mut registry = Registry::new();

    registry.register(&chain, "create_room", validated(lobby::create_room));
    registry.register(&chain, "join_lobby", validated(lobby::join_lobby));
    registry.register(&chain, "kick_player", validated(lobby::kick_player));
    registry.register(&chain, "start_game", validated(lobby::start_game));

    registry.register(
        &chain,
        "update_player_nickname",
        validated(player::update_player_nickname),
    );
    registry.register(
        &chain,
        "generate_new_avatar",
        validated(player::generate_new_avatar),
    );
    registry.register(
        &chain,
        "toggle_player_is_ready",
        validated(player::toggle_player_is_ready),
    );

    registry.register(&chain, "submit_answer", validated(round::submit_answer));
    registry.register(
        &chain,
        "toggle_answer_is_ready",
        validated(round::toggle_answer_is_ready),
    );
    registry.register(&chain, "submit_vote", validated(round::submit_vote));
    registry.register(
        &chain,
        "toggle_voting_is_ready",
        validated(round::toggle_voting_is_ready),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_message_type_is_registered() {
        assert_eq!(
            registry().message_types(),
            vec![
                "create_room",
                "generate_new_avatar",
                "join_lobby",
                "kick_player",
                "start_game",
                "submit_answer",
                "submit_vote",
                "toggle_answer_is_ready",
                "toggle_player_is_ready",
                "toggle_voting_is_ready",
                "update_player_nickname",
            ]
        );
    }

    #[test]
    fn payloads_are_validated() {
        use crate::dto::ws::SubmitAnswerRequest;

        let err = parse::<SubmitAnswerRequest>(serde_json::json!({
            "message_type": "submit_answer",
            "answer": "",
        }))
        .unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let ok = parse::<SubmitAnswerRequest>(serde_json::json!({
            "message_type": "submit_answer",
            "answer": "pizza",
        }))
        .unwrap();
        assert_eq!(ok.answer, "pizza");
    }

    #[tokio::test]
    async fn invalid_payloads_are_rejected_inside_the_chain() {
        use uuid::Uuid;

        use crate::{state::AppState, telemetry::TraceContext};

        let ctx = HandlerContext {
            state: AppState::for_tests(),
            player_id: Uuid::now_v7(),
            locale: None,
            trace: TraceContext::default(),
        };
        let err = registry()
            .dispatch(
                ctx,
                "update_player_nickname",
                serde_json::json!({"message_type": "update_player_nickname", "player_nickname": ""}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::Validation(_)));
    }

    #[test]
    fn missing_fields_are_validation_errors() {
        use crate::dto::ws::JoinLobbyRequest;

        let err = parse::<JoinLobbyRequest>(serde_json::json!({"message_type": "join_lobby"}))
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION");
    }
}
