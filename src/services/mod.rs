/// Deterministic identicon avatars.
pub mod avatar;
/// Rendering and fan-out of phase snapshots to players.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health and readiness checks.
pub mod health_service;
/// Player identity resolution.
pub mod identity;
/// Room creation, joining, kicking and starting.
pub mod lobby_service;
/// Per-player lobby mutations and connection tracking.
pub mod player_service;
/// Current view of a returning player.
pub mod reconnect;
/// Serialization of views into wire payloads.
pub mod renderer;
/// Answers, votes and phase transitions of a running game.
pub mod round_service;
/// Pure scoring rules.
pub mod scoring;
/// Phase snapshots shared by services, broadcasts and reconnection.
pub mod snapshots;
/// Storage connection supervisor.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{
    config::GameRules, dao::game_store::StoreTx, error::ServiceError, random::Randomizer,
    state::SharedState,
};

/// Owned inputs every transaction body may need.
#[derive(Clone)]
pub struct GameContext {
    /// Game rules.
    pub rules: GameRules,
    /// Randomness for codes, nicknames and role draws.
    pub randomizer: Arc<dyn Randomizer>,
}

impl GameContext {
    /// Context built from the shared state.
    pub fn from_state(state: &SharedState) -> Self {
        Self {
            rules: state.config().rules.clone(),
            randomizer: state.randomizer(),
        }
    }
}

/// Run `body` inside one storage transaction and commit it, retrying the whole
/// transaction on transient failures. `body` may therefore run more than once.
pub(crate) async fn in_transaction<T, F>(
    state: &SharedState,
    operation: &'static str,
    body: F,
) -> Result<T, ServiceError>
where
    F: for<'t> Fn(&'t mut dyn StoreTx) -> BoxFuture<'t, Result<T, ServiceError>>,
{
    let store = state.game_store().await.ok_or(ServiceError::Degraded)?;
    state
        .retry_policy()
        .run(operation, || async {
            let mut tx = store.begin().await?;
            let value = body(tx.as_mut()).await?;
            tx.commit().await?;
            Ok(value)
        })
        .await
}
