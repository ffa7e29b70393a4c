use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use url::Url;

use crate::dao::{
    models::{QuizEntity, QuizResultEntity},
    quiz_store::QuizStore,
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{CouchResultDocument, CouchUserDocument, quiz_doc_id, user_doc_id},
};

/// [`QuizStore`] backed by a CouchDB database reached over HTTP.
#[derive(Clone)]
pub struct CouchQuizStore {
    client: Client,
    database_url: Url,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchQuizStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let database_url = database_url(&config.base_url, &config.database)?;
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            database_url,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, doc_id: &str) -> reqwest::RequestBuilder {
        let url = document_url(&self.database_url, doc_id);
        self.authorized(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database_url.to_string();
        let url = self.database_url.clone();

        let response = self
            .authorized(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authorized(self.client.put(url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    /// CouchDB has no increment primitive: read the user document, add, write back with its
    /// revision. A concurrent writer makes the PUT fail with 409 and the increment is lost.
    async fn increment_user_stats(&self, user_id: &str, points: i64, streak: i64) -> CouchResult<()> {
        let doc_id = user_doc_id(user_id);
        let mut doc = self
            .get_document::<CouchUserDocument>(&doc_id)
            .await?
            .unwrap_or_else(|| CouchUserDocument::empty(user_id));

        doc.stats.points += points;
        doc.stats.streak += streak;
        self.put_document(&doc_id, &doc).await
    }
}

/// Resolve the database endpoint under `base`, which may carry a path prefix.
fn database_url(base: &str, database: &str) -> CouchResult<Url> {
    let invalid = |source| CouchDaoError::InvalidBaseUrl {
        url: base.to_string(),
        source,
    };
    let mut url = Url::parse(base).map_err(|err| invalid(Some(err)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(None));
    }
    url.path_segments_mut()
        .map_err(|()| invalid(None))?
        .pop_if_empty()
        .push(database);
    Ok(url)
}

/// Document endpoint; the id is percent-encoded as a single path segment.
fn document_url(database_url: &Url, doc_id: &str) -> Url {
    let mut url = database_url.clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.push(doc_id);
    }
    url
}

impl QuizStore for CouchQuizStore {
    fn find_quiz(&self, id: String) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .get_document::<QuizEntity>(&quiz_doc_id(&id))
                .await
                .map_err(Into::into)
        })
    }

    fn save_result(&self, result: QuizResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc = CouchResultDocument::from(result);
            store.put_document(&doc.id, &doc).await.map_err(Into::into)
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
            store
                .increment_user_stats(&user_id, points, streak)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url.to_string();
            let response = store
                .authorized(store.client.get(store.database_url.clone()))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_url_keeps_path_prefix() {
        let url = database_url("http://localhost:5984", "smart_quiz").unwrap();
        assert_eq!(url.as_str(), "http://localhost:5984/smart_quiz");

        let url = database_url("https://couch.example.com/proxy/", "smart_quiz").unwrap();
        assert_eq!(url.as_str(), "https://couch.example.com/proxy/smart_quiz");
    }

    #[test]
    fn database_url_rejects_non_http_bases() {
        assert!(database_url("localhost:5984", "smart_quiz").is_err());
        assert!(database_url("not a url", "smart_quiz").is_err());
        assert!(database_url("mailto:admin@example.com", "smart_quiz").is_err());
    }

    #[test]
    fn document_ids_stay_inside_one_segment() {
        let base = database_url("http://localhost:5984", "smart_quiz").unwrap();

        let url = document_url(&base, &user_doc_id("a/b?rev=1#x"));
        assert_eq!(url.path(), "/smart_quiz/user::a%2Fb%3Frev=1%23x");
        assert_eq!(url.query(), None);
        assert_eq!(url.fragment(), None);

        let url = document_url(&base, &quiz_doc_id("bcs-44"));
        assert_eq!(url.as_str(), "http://localhost:5984/smart_quiz/quiz::bcs-44");
    }
}
