/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Share-link rewriting for question media.
pub mod media;
/// Quiz session orchestration.
pub mod session_service;
/// Best-effort persistence of settled quizzes.
pub mod settlement;
/// Server-Sent Events broadcasting service.
pub mod sse_service;
/// Storage connection supervisor with degraded mode.
pub mod storage_supervisor;
/// Question supply with timeout and retry.
pub mod supply;
