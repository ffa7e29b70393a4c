//! Process-local store used for development runs and tests.

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::BoxFuture;

use crate::dao::{
    models::{QuizEntity, QuizResultEntity, UserStatsEntity},
    quiz_store::QuizStore,
    storage::StorageResult,
};

/// In-memory implementation of [`QuizStore`]; cloning shares the same maps.
#[derive(Clone, Default)]
pub struct MemoryQuizStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    quizzes: DashMap<String, QuizEntity>,
    results: DashMap<uuid::Uuid, QuizResultEntity>,
    users: DashMap<String, UserStatsEntity>,
}

impl MemoryQuizStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pre-authored quiz under `id`.
    pub fn insert_quiz(&self, id: impl Into<String>, quiz: QuizEntity) {
        self.inner.quizzes.insert(id.into(), quiz);
    }

    /// All results saved so far.
    pub fn results(&self) -> Vec<QuizResultEntity> {
        self.inner
            .results
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Counters of `user_id`, if the user document exists.
    pub fn user_stats(&self, user_id: &str) -> Option<UserStatsEntity> {
        self.inner.users.get(user_id).map(|entry| *entry.value())
    }
}

impl QuizStore for MemoryQuizStore {
    fn find_quiz(&self, id: String) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .quizzes
                .get(&id)
                .map(|entry| entry.value().clone()))
        })
    }

    fn save_result(&self, result: QuizResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.results.insert(result.id, result);
            Ok(())
        })
    }

    fn increment_user_stats(
        &self,
        user_id: String,
        points: i64,
        streak: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut stats = store.inner.users.entry(user_id).or_default();
            stats.points += points;
            stats.streak += streak;
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
