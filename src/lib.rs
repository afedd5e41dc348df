//! Multiplayer backend of the Fibbing It party game.
//!
//! Players talk to the server over one WebSocket each. Inbound frames are
//! dispatched to [`handlers`], which call the transactional [`services`] and
//! publish rendered views on per-player [`pubsub`] topics. Timed phases are
//! driven by the tasks in [`state::state_machine`].

pub mod config;
pub mod dao;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod pubsub;
pub mod random;
pub mod routes;
pub mod services;
pub mod state;
pub mod telemetry;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the top-level router and attach cross-cutting middleware layers.
pub fn build_router(state: state::SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
