//! Fibbing It backend entrypoint wiring storage, the message bus and the HTTP layer.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, bail};
use fibbing_it_back::{
    build_router,
    config::{AppConfig, MEMORY_URI},
    dao::{
        catalogue::default_catalogue,
        game_store::{GameStore, memory::MemoryGameStore},
        storage::StorageError,
    },
    pubsub::{PubSub, memory::MemoryPubSub},
    random::ThreadRandomizer,
    services::{identity::CookieIdentity, renderer::JsonRenderer, storage_supervisor},
    state::{AppState, Dependencies, abandonment},
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("loading configuration")?;
    let addr = config.server.addr();
    let backend = StoreBackend::from_config(&config)?;
    let pubsub = connect_pubsub(&config.pubsub_address).await?;
    if let Some(jwks_url) = &config.auth.jwks_url {
        warn!(%jwks_url, "no token verifier is installed; players keep cookie identities");
    }

    let state = AppState::new(
        config,
        Dependencies {
            pubsub,
            renderer: Arc::new(JsonRenderer),
            randomizer: Arc::new(ThreadRandomizer),
            identity: Arc::new(CookieIdentity),
        },
    );

    tokio::spawn(storage_supervisor::run(state.clone(), move || {
        let backend = backend.clone();
        async move { backend.connect().await }
    }));
    tokio::spawn(abandonment::run(state.clone()));

    let app = build_router(state.clone());

    info!(%addr, "starting server");
    let listener = TcpListener::bind(addr).await.context("binding server")?;
    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    state.machines().cancel_all();
    if !state.machines().wait(SHUTDOWN_GRACE).await {
        warn!("phase tasks still running at shutdown");
    }
    info!("server stopped");
    Ok(())
}

/// Storage selected by `DB_URI`.
#[derive(Clone)]
enum StoreBackend {
    Memory(MemoryGameStore),
    #[cfg(feature = "postgres-store")]
    Postgres(fibbing_it_back::dao::game_store::postgres::PgConfig),
}

impl StoreBackend {
    fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let uri = config.database.uri.as_str();
        let game_name = config.rules.default_game.as_str();
        if uri == MEMORY_URI {
            return Ok(Self::Memory(MemoryGameStore::with_questions(
                default_catalogue(game_name),
            )));
        }
        if uri.starts_with("postgres://") || uri.starts_with("postgresql://") {
            #[cfg(feature = "postgres-store")]
            {
                return Ok(Self::Postgres(
                    fibbing_it_back::dao::game_store::postgres::PgConfig::from_uri(uri, game_name),
                ));
            }
            #[cfg(not(feature = "postgres-store"))]
            bail!("built without the `postgres-store` feature");
        }
        bail!("unsupported database URI scheme in `{uri}`")
    }

    async fn connect(&self) -> Result<Arc<dyn GameStore>, StorageError> {
        match self {
            Self::Memory(store) => Ok(Arc::new(store.clone())),
            #[cfg(feature = "postgres-store")]
            Self::Postgres(config) => {
                let store =
                    fibbing_it_back::dao::game_store::postgres::PgGameStore::connect(config.clone())
                        .await?;
                Ok(Arc::new(store))
            }
        }
    }
}

async fn connect_pubsub(address: &str) -> anyhow::Result<Arc<dyn PubSub>> {
    if address == MEMORY_URI {
        return Ok(Arc::new(MemoryPubSub::new()));
    }
    if address.starts_with("redis://") || address.starts_with("rediss://") {
        #[cfg(feature = "redis-bus")]
        {
            let bus = fibbing_it_back::pubsub::redis::RedisPubSub::connect(address)
                .await
                .context("connecting to the message bus")?;
            return Ok(Arc::new(bus));
        }
        #[cfg(not(feature = "redis-bus"))]
        bail!("built without the `redis-bus` feature");
    }
    bail!("unsupported pub/sub address `{address}`")
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "SIGTERM handler unavailable; waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
