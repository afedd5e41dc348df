use serde::Serialize;
use utoipa::ToSchema;

/// Body of the `/healthcheck` and `/readiness` routes.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", "degraded" or "unavailable".
    pub status: String,
    /// Storage reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub storage: Option<bool>,
    /// Message bus reachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pubsub: Option<bool>,
}

impl HealthResponse {
    /// The service is fully operational.
    pub fn ok() -> Self {
        Self::status("ok")
    }

    /// Storage is unavailable; requests fail fast.
    pub fn degraded() -> Self {
        Self::status("degraded")
    }

    /// Readiness report with the result of each dependency probe.
    pub fn readiness(storage: bool, pubsub: bool) -> Self {
        Self {
            status: if storage && pubsub { "ok" } else { "unavailable" }.to_owned(),
            storage: Some(storage),
            pubsub: Some(pubsub),
        }
    }

    /// Every probe succeeded.
    pub fn is_ready(&self) -> bool {
        self.storage.unwrap_or(false) && self.pubsub.unwrap_or(false)
    }

    fn status(status: &str) -> Self {
        Self {
            status: status.to_owned(),
            storage: None,
            pubsub: None,
        }
    }
}
