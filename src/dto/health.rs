use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Sessions currently held in memory.
    pub sessions: usize,
}

impl HealthResponse {
    /// Build a response; `degraded` means no quiz store is reachable.
    pub fn new(degraded: bool, sessions: usize) -> Self {
        let status = if degraded { "degraded" } else { "ok" };
        Self {
            status: status.to_string(),
            sessions,
        }
    }
}
