pub mod abandonment;
pub mod phase;
pub mod recovery;
pub mod state_machine;

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{game_store::GameStore, storage::RetryPolicy},
    handlers::{self, Registry},
    pubsub::PubSub,
    random::Randomizer,
    services::{identity::IdentityProvider, renderer::ViewRenderer},
};

pub use self::state_machine::PhaseMachines;

pub type SharedState = Arc<AppState>;

/// Collaborators chosen at startup.
pub struct Dependencies {
    /// Message bus.
    pub pubsub: Arc<dyn PubSub>,
    /// Outbound view encoding.
    pub renderer: Arc<dyn ViewRenderer>,
    /// Source of randomness.
    pub randomizer: Arc<dyn Randomizer>,
    /// Resolves the player behind a connection.
    pub identity: Arc<dyn IdentityProvider>,
}

/// Central application state shared by the HTTP layer, handlers and phase tasks.
pub struct AppState {
    config: AppConfig,
    game_store: RwLock<Option<Arc<dyn GameStore>>>,
    degraded: watch::Sender<bool>,
    pubsub: Arc<dyn PubSub>,
    renderer: Arc<dyn ViewRenderer>,
    randomizer: Arc<dyn Randomizer>,
    identity: Arc<dyn IdentityProvider>,
    handlers: Registry,
    machines: PhaseMachines,
    connections: AtomicUsize,
    endpoints: DashMap<Uuid, usize>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, dependencies: Dependencies) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            game_store: RwLock::new(None),
            degraded: degraded_tx,
            pubsub: dependencies.pubsub,
            renderer: dependencies.renderer,
            randomizer: dependencies.randomizer,
            identity: dependencies.identity,
            handlers: handlers::registry(),
            machines: PhaseMachines::new(),
            connections: AtomicUsize::new(0),
            endpoints: DashMap::new(),
        })
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Retry policy wrapping every storage transaction.
    pub fn retry_policy(&self) -> RetryPolicy {
        self.config.database.retry_policy()
    }

    /// Obtain a handle to the current game store, if one is installed.
    pub async fn game_store(&self) -> Option<Arc<dyn GameStore>> {
        let guard = self.game_store.read().await;
        guard.as_ref().cloned()
    }

    /// Install a new game store implementation and leave degraded mode.
    pub async fn install_game_store(&self, store: Arc<dyn GameStore>) {
        {
            let mut guard = self.game_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current game store and enter degraded mode.
    pub async fn clear_game_store(&self) {
        {
            let mut guard = self.game_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Enter or leave degraded mode, notifying watchers on change.
    pub fn update_degraded(&self, degraded: bool) {
        self.degraded.send_if_modified(|current| {
            let changed = *current != degraded;
            *current = degraded;
            changed
        });
    }

    /// Message bus carrying views to players.
    pub fn pubsub(&self) -> &Arc<dyn PubSub> {
        &self.pubsub
    }

    /// Outbound view encoding.
    pub fn renderer(&self) -> &dyn ViewRenderer {
        self.renderer.as_ref()
    }

    /// Source of randomness.
    pub fn randomizer(&self) -> Arc<dyn Randomizer> {
        self.randomizer.clone()
    }

    /// Player identity resolution.
    pub fn identity(&self) -> &dyn IdentityProvider {
        self.identity.as_ref()
    }

    /// Inbound message handlers.
    pub fn handlers(&self) -> &Registry {
        &self.handlers
    }

    /// Phase tasks of running games.
    pub fn machines(&self) -> &PhaseMachines {
        &self.machines
    }

    /// Record a new subscription endpoint of `player_id`; returns the process-wide count.
    pub fn connection_opened(&self, player_id: Uuid) -> usize {
        *self.endpoints.entry(player_id).or_insert(0) += 1;
        self.connections.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Record a closed endpoint of `player_id`; returns whether it was the player's last one.
    pub fn connection_closed(&self, player_id: Uuid) -> bool {
        let _ = self
            .connections
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        let remaining = self.endpoints.get_mut(&player_id).map(|mut count| {
            *count = count.saturating_sub(1);
            *count
        });
        self.endpoints.remove_if(&player_id, |_, count| *count == 0);
        remaining.unwrap_or(0) == 0
    }

    /// Open subscription endpoints.
    pub fn active_connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl AppState {
    /// State over the in-memory store and bus with default configuration.
    pub(crate) fn for_tests() -> SharedState {
        use crate::{
            dao::{catalogue::default_catalogue, game_store::memory::MemoryGameStore},
            pubsub::memory::MemoryPubSub,
            random::SeededRandomizer,
            services::{identity::CookieIdentity, renderer::JsonRenderer},
        };

        let state = Self::new(
            AppConfig::default(),
            Dependencies {
                pubsub: Arc::new(MemoryPubSub::new()),
                renderer: Arc::new(JsonRenderer),
                randomizer: Arc::new(SeededRandomizer::new(7)),
                identity: Arc::new(CookieIdentity),
            },
        );
        let store = MemoryGameStore::with_questions(default_catalogue(&state.config.rules.default_game));
        *state.game_store.try_write().expect("fresh lock") = Some(Arc::new(store));
        state.update_degraded(false);
        state
    }
}
