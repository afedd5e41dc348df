//! Resume phase tasks of games that were running when the process stopped.

use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    services::round_service,
    state::{SharedState, phase::Step, state_machine},
};

const LIST_ATTEMPTS: u32 = 3;
const LIST_BACKOFF: Duration = Duration::from_millis(500);

/// Start a phase task for every PLAYING game at its stored phase.
///
/// Returns how many games were resumed. Games whose task is still running are left alone.
pub async fn resume_games(state: &SharedState) -> usize {
    let mut attempt = 0;
    let games = loop {
        attempt += 1;
        match round_service::active_games(state).await {
            Ok(games) => break games,
            Err(err) if attempt < LIST_ATTEMPTS => {
                warn!(attempt, error = %err, "listing active games failed; retrying");
                sleep(LIST_BACKOFF * attempt).await;
            }
            Err(err) => {
                warn!(attempt, error = %err, "giving up on resuming active games");
                return 0;
            }
        }
    };

    let mut resumed = 0;
    for game in &games {
        if state.machines().is_running(game.game_state_id) {
            continue;
        }
        info!(
            game_state_id = %game.game_state_id,
            room_code = %game.room_code,
            phase = %game.phase,
            "resuming game"
        );
        state_machine::start(state, game.game_state_id, Step::resume(game.phase));
        resumed += 1;
    }
    resumed
}
