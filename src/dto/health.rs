use serde::Serialize;
use utoipa::ToSchema;

/// Payload of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok" while the session store is reachable, "degraded" otherwise.
    pub status: String,
    /// Whether battle operations are currently refused with 503.
    pub degraded: bool,
}

impl HealthResponse {
    /// Session store reachable.
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            degraded: false,
        }
    }

    /// Running without a session store.
    pub fn degraded() -> Self {
        Self {
            status: "degraded".to_string(),
            degraded: true,
        }
    }
}
