#[cfg(feature = "couch-store")]
pub mod couchdb;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{QuizEntity, QuizResultEntity};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;

/// Abstraction over the document store holding quizzes, results and user counters.
pub trait QuizStore: Send + Sync {
    /// Read a pre-authored quiz document by identifier.
    fn find_quiz(&self, id: String) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
    /// Append a settled result to the results collection.
    fn save_result(&self, result: QuizResultEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Add `points` and `streak` to the counters of the user document, creating it if missing.
    fn increment_user_stats(
        &self,
        user_id: String,
        points: i64,
        streak: i64,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Lightweight liveness probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the underlying connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
