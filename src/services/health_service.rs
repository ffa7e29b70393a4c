use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Probe the quiz store and report the degraded flag with the live session count.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.quiz_store().await {
        Some(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "storage health check failed");
            }
        }
        None => warn!("storage unavailable (degraded mode)"),
    }

    HealthResponse::new(state.is_degraded().await, state.session_count())
}
