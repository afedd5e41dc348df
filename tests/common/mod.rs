#![allow(dead_code)]

use std::{collections::BTreeSet, sync::Arc, time::Duration};

use fibbing_it_back::{
    config::{AppConfig, PhaseTimings},
    dao::{catalogue::default_catalogue, game_store::memory::MemoryGameStore},
    handlers::{HandlerContext, HandlerError},
    pubsub::{PubSub, Subscription, memory::MemoryPubSub},
    random::SeededRandomizer,
    services::{identity::CookieIdentity, renderer::JsonRenderer},
    state::{AppState, Dependencies, SharedState},
    telemetry::TraceContext,
};
use futures::StreamExt;
use serde_json::Value;
use tokio::time::timeout;
use uuid::Uuid;

const RECEIVE_TIMEOUT: Duration = Duration::from_secs(3);

/// Application state over the in-memory store and bus.
pub struct Harness {
    pub state: SharedState,
    pub bus: Arc<MemoryPubSub>,
    pub store: MemoryGameStore,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    /// Every phase lasts `phase`, one round per round type.
    pub async fn fast(phase: Duration) -> Self {
        let mut config = AppConfig::default();
        config.timings = PhaseTimings::uniform(phase);
        config.rules.max_rounds = 1;
        Self::with_config(config).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let bus = Arc::new(MemoryPubSub::new());
        let store = MemoryGameStore::with_questions(default_catalogue(&config.rules.default_game));
        let state = AppState::new(
            config,
            Dependencies {
                pubsub: bus.clone(),
                renderer: Arc::new(JsonRenderer),
                randomizer: Arc::new(SeededRandomizer::new(42)),
                identity: Arc::new(CookieIdentity),
            },
        );
        state.install_game_store(Arc::new(store.clone())).await;
        Self { state, bus, store }
    }

    /// A client subscribed to its own topic.
    pub async fn client(&self) -> Client {
        let id = Uuid::now_v7();
        let subscription = self.bus.subscribe(id).await.unwrap();
        Client {
            id,
            state: self.state.clone(),
            subscription,
        }
    }
}

/// One player with the views published to them.
pub struct Client {
    pub id: Uuid,
    state: SharedState,
    subscription: Subscription,
}

impl Client {
    /// Dispatch `message_type` as if it arrived on this player's socket.
    pub async fn send(&self, message_type: &str, mut payload: Value) -> Result<(), HandlerError> {
        if payload.is_null() {
            payload = serde_json::json!({});
        }
        payload["message_type"] = Value::from(message_type);
        let ctx = HandlerContext {
            state: self.state.clone(),
            player_id: self.id,
            locale: None,
            trace: TraceContext::default().with_player(self.id),
        };
        self.state
            .handlers()
            .dispatch(ctx, message_type, payload)
            .await
    }

    /// Next view published to this player.
    pub async fn next_view(&mut self) -> Value {
        let payload = timeout(RECEIVE_TIMEOUT, self.subscription.next())
            .await
            .expect("no view received in time")
            .expect("subscription closed");
        serde_json::from_slice(&payload).unwrap()
    }

    /// Skip views until one of `message_type` arrives.
    pub async fn next_of(&mut self, message_type: &str) -> Value {
        loop {
            let view = self.next_view().await;
            if view["message_type"] == message_type {
                return view;
            }
        }
    }

    /// Discard queued views until none arrives for a short while.
    pub async fn drain(&mut self) {
        while !self.is_quiet(Duration::from_millis(20)).await {}
    }

    /// Whether no view arrives within `wait`.
    pub async fn is_quiet(&mut self, wait: Duration) -> bool {
        timeout(wait, self.subscription.next()).await.is_err()
    }
}

/// Host plus `guests` players, all ready, in a fresh lobby. Returns the room code.
pub async fn ready_lobby(harness: &Harness, guests: usize) -> (String, Client, Vec<Client>) {
    let mut host = harness.client().await;
    host.send(
        "create_room",
        serde_json::json!({"game_name": "fibbing_it", "player_nickname": "host"}),
    )
    .await
    .unwrap();
    let room_code = host.next_of("lobby").await["room_code"]
        .as_str()
        .unwrap()
        .to_owned();

    let mut others = Vec::new();
    for n in 0..guests {
        let guest = harness.client().await;
        guest
            .send(
                "join_lobby",
                serde_json::json!({"room_code": room_code, "player_nickname": format!("guest{n}")}),
            )
            .await
            .unwrap();
        guest.send("toggle_player_is_ready", Value::Null).await.unwrap();
        others.push(guest);
    }
    host.send("toggle_player_is_ready", Value::Null).await.unwrap();
    (room_code, host, others)
}

/// Object keys of a view, recursively, ignoring values.
pub fn shape(view: &Value) -> BTreeSet<String> {
    let mut keys = BTreeSet::new();
    collect_keys(view, "", &mut keys);
    keys
}

fn collect_keys(value: &Value, prefix: &str, keys: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                let path = format!("{prefix}.{key}");
                keys.insert(path.clone());
                collect_keys(inner, &path, keys);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_keys(item, &format!("{prefix}[]"), keys);
            }
        }
        _ => {}
    }
}
