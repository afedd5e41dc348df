//! Periodic sweep of rooms whose members have all left.

use time::OffsetDateTime;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::{
    error::ServiceError,
    services::lobby_service,
    state::SharedState,
};

/// Mark idle rooms ABANDONED and stop their phase tasks. Returns the number of rooms swept.
pub async fn sweep(state: &SharedState, now: OffsetDateTime) -> Result<usize, ServiceError> {
    let cutoff = now - state.config().abandon.grace_period;
    let abandoned = lobby_service::abandon_idle_rooms(state, cutoff).await?;
    for game_state_id in abandoned.iter().filter_map(|(_, game)| *game) {
        state.machines().stop(game_state_id);
    }
    Ok(abandoned.len())
}

/// Run [`sweep`] every `abandon.check_interval` for the lifetime of the process.
pub async fn run(state: SharedState) {
    let mut ticker = interval(state.config().abandon.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match sweep(&state, OffsetDateTime::now_utc()).await {
            Ok(_) => {}
            Err(ServiceError::Degraded) => debug!("storage unavailable; abandonment sweep skipped"),
            Err(err) => warn!(error = %err, "abandonment sweep failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use uuid::Uuid;

    use super::*;
    use crate::{
        services::{lobby_service, player_service},
        state::AppState,
    };

    #[tokio::test]
    async fn rooms_are_abandoned_after_the_grace_period() {
        let state = AppState::for_tests();
        let host = Uuid::now_v7();
        let lobby = lobby_service::create_room(&state, host, "fibbing_it".into(), None, None)
            .await
            .unwrap();

        let left_at = OffsetDateTime::now_utc();
        player_service::mark_disconnected(&state, host, left_at)
            .await
            .unwrap();

        let grace = state.config().abandon.grace_period;
        assert_eq!(sweep(&state, left_at + grace / 2).await.unwrap(), 0);
        assert_eq!(
            sweep(&state, left_at + grace + Duration::from_secs(1)).await.unwrap(),
            1
        );

        let room = player_service::get_room_state(&state, host).await.unwrap();
        assert_eq!(room.code, lobby.room_code);
        assert_eq!(room.state, crate::dao::models::RoomState::Abandoned);
    }

    #[tokio::test]
    async fn connected_members_keep_the_room_alive() {
        let state = AppState::for_tests();
        let host = Uuid::now_v7();
        lobby_service::create_room(&state, host, "fibbing_it".into(), None, None)
            .await
            .unwrap();

        let later = OffsetDateTime::now_utc() + Duration::from_secs(3600);
        assert_eq!(sweep(&state, later).await.unwrap(), 0);
    }
}
