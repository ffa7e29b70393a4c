use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Collection, Database, bson::doc, options::IndexOptions};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
};
use crate::dao::{
    models::{QuizEntity, QuizResultEntity},
    quiz_store::QuizStore,
    storage::StorageResult,
};

const QUIZ_COLLECTION_NAME: &str = "quizzes";
const RESULT_COLLECTION_NAME: &str = "results";
const USER_COLLECTION_NAME: &str = "users";

/// [`QuizStore`] backed by MongoDB; counters use the server-side `$inc` operator.
#[derive(Clone)]
pub struct MongoQuizStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoQuizStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let index = mongodb::IndexModel::builder()
            .keys(doc! {"userId": 1, "date": -1})
            .options(
                IndexOptions::builder()
                    .name(Some("result_user_date_idx".to_owned()))
                    .build(),
            )
            .build();

        self.results()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: RESULT_COLLECTION_NAME,
                index: "userId,date",
                source,
            })?;

        Ok(())
    }

    async fn quizzes(&self) -> Collection<QuizEntity> {
        let database = self.inner.database.read().await;
        database.collection::<QuizEntity>(QUIZ_COLLECTION_NAME)
    }

    async fn results(&self) -> Collection<QuizResultEntity> {
        let database = self.inner.database.read().await;
        database.collection::<QuizResultEntity>(RESULT_COLLECTION_NAME)
    }

    async fn users(&self) -> Collection<mongodb::bson::Document> {
        let database = self.inner.database.read().await;
        database.collection::<mongodb::bson::Document>(USER_COLLECTION_NAME)
    }

    async fn find_quiz(&self, id: String) -> MongoResult<Option<QuizEntity>> {
        self.quizzes()
            .await
            .find_one(doc! { "_id": &id })
            .await
            .map_err(|source| MongoDaoError::LoadQuiz { id, source })
    }

    async fn save_result(&self, result: QuizResultEntity) -> MongoResult<()> {
        let id = result.id;
        self.results()
            .await
            .insert_one(&result)
            .await
            .map_err(|source| MongoDaoError::SaveResult { id, source })?;
        Ok(())
    }

    async fn increment_user_stats(&self, user_id: String, points: i64, streak: i64) -> MongoResult<()> {
        self.users()
            .await
            .update_one(
                doc! { "_id": &user_id },
                doc! { "$inc": { "points": points, "streak": streak } },
            )
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::IncrementUser { user_id, source })?;
        Ok(())
    }
}

impl QuizStore for MongoQuizStore {
    fn find_quiz(&self, id: String) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_quiz(id).await.map_err(Into::into) })
    }

    fn save_result(&self, result: QuizResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_result(result).await.map_err(Into::into) })
    }

    fn increment_user_stats(
        &self,
        user_id: String,
        points: i64,
        streak: i64,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .increment_user_stats(user_id, points, streak)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
