use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Respond with the degraded flag while logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.game_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("storage unavailable (degraded mode)"),
    }

    if state.is_degraded() {
        HealthResponse::degraded()
    } else {
        HealthResponse::ok()
    }
}

/// Probe storage and the message bus.
pub async fn readiness(state: &SharedState) -> HealthResponse {
    let storage = match state.game_store().await {
        Some(store) => match store.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "storage not ready");
                false
            }
        },
        None => false,
    };
    let pubsub = match state.pubsub().health_check().await {
        Ok(()) => true,
        Err(err) => {
            warn!(error = %err, "message bus not ready");
            false
        }
    };
    HealthResponse::readiness(storage, pubsub)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;

    #[tokio::test]
    async fn memory_backends_are_ready() {
        let state = AppState::for_tests();
        assert_eq!(health_status(&state).await.status, "ok");
        assert!(readiness(&state).await.is_ready());
    }

    #[tokio::test]
    async fn missing_storage_is_degraded_and_not_ready() {
        let state = AppState::for_tests();
        state.clear_game_store().await;
        assert_eq!(health_status(&state).await.status, "degraded");
        let report = readiness(&state).await;
        assert!(!report.is_ready());
        assert_eq!(report.status, "unavailable");
    }
}
