use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Smart Quiz Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::session_stream,
        crate::routes::sessions::start_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::tick,
        crate::routes::sessions::submit_answer,
        crate::routes::sessions::advance,
        crate::routes::sessions::toggle_bookmark,
        crate::routes::sessions::report_media_failure,
        crate::routes::sessions::restart,
        crate::routes::sessions::settle,
        crate::routes::sessions::abandon_session,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::StartSessionRequest,
            crate::dto::session::AnswerRequest,
            crate::dto::session::SessionSnapshot,
            crate::dto::session::SettlementResponse,
            crate::dto::sse::SessionClosedEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Quiz session lifecycle and gameplay"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_session_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/sessions",
            "/sessions/{id}",
            "/sessions/{id}/answer",
            "/sessions/{id}/settle",
            "/sessions/{id}/events",
            "/healthcheck",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
