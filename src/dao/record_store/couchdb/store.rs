//! [`RecordStore`] over the CouchDB HTTP API.

use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, json};
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::dao::{
    models::{GameRecord, NewGameRecord, RecordEvent, RecordId, RecordPatch},
    record_store::{RecordStore, SUBSCRIPTION_CAPACITY, Subscription},
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        ChangeRow, ChangesResponse, CouchRecordDocument, FindResponse, WriteResponse, game_doc_id,
    },
};

const FIND: &str = "_find";
const CHANGES: &str = "_changes";
const INDEX: &str = "_index";
const MAX_WRITE_ATTEMPTS: u32 = 5;
const FEED_INITIAL_DELAY: Duration = Duration::from_millis(500);
const FEED_MAX_DELAY: Duration = Duration::from_secs(10);

/// Outcome of a revision-guarded document write.
enum WriteOutcome {
    Written(String),
    Conflict,
}

/// CouchDB implementation of [`RecordStore`].
#[derive(Clone)]
pub struct CouchRecordStore {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
    changes_timeout: Duration,
}

impl CouchRecordStore {
    /// Establish a connection to CouchDB and ensure the database and code index exist.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            base_url,
            database,
            auth,
            changes_timeout: config.changes_timeout,
        };

        store.ensure_database().await?;
        store.ensure_code_index().await?;
        Ok(store)
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.authorize(self.client.request(method, url))
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .authorize(self.client.get(&url))
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
                    .authorize(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412: another client created it in between.
                if create.status().is_success()
                    || create.status() == StatusCode::PRECONDITION_FAILED
                {
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

    async fn ensure_code_index(&self) -> CouchResult<()> {
        let body = json!({
            "index": { "fields": ["code"] },
            "name": "code-index",
            "type": "json",
        });
        let response = self
            .request(Method::POST, INDEX)
            .json(&body)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: INDEX.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: INDEX.to_string(),
                status: response.status(),
            })
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

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<WriteOutcome>
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

        match response.status() {
            StatusCode::CONFLICT => Ok(WriteOutcome::Conflict),
            status if status.is_success() => {
                let written = response.json::<WriteResponse>().await.map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })?;
                Ok(WriteOutcome::Written(written.rev))
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn load_record(&self, id: &str) -> CouchResult<Option<(GameRecord, Option<String>)>> {
        let doc_id = game_doc_id(id);
        match self.get_document::<CouchRecordDocument>(&doc_id).await? {
            Some(doc) => doc.into_record().map(Some),
            None => Ok(None),
        }
    }

    async fn find_by_code(&self, code: &str) -> CouchResult<Option<GameRecord>> {
        let body = json!({
            "selector": { "code": code },
            "limit": 1,
        });
        let response = self
            .request(Method::POST, FIND)
            .json(&body)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: FIND.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: FIND.to_string(),
                status: response.status(),
            });
        }

        let payload =
            response
                .json::<FindResponse>()
                .await
                .map_err(|source| CouchDaoError::DecodeResponse {
                    path: FIND.to_string(),
                    source,
                })?;

        let Some(doc) = payload.docs.into_iter().next() else {
            return Ok(None);
        };
        let doc: CouchRecordDocument =
            from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                path: FIND.to_string(),
                source,
            })?;
        let (record, _) = doc.into_record()?;
        Ok(Some(record))
    }

    async fn insert(&self, record: NewGameRecord) -> CouchResult<GameRecord> {
        if self.find_by_code(&record.code).await?.is_some() {
            return Err(CouchDaoError::DuplicateCode { code: record.code });
        }

        let id = Uuid::new_v4().to_string();
        let doc = CouchRecordDocument::from_new(&id, record);
        match self.put_document(&doc.id, &doc).await? {
            WriteOutcome::Written(rev) => {
                debug!(doc_id = %doc.id, %rev, "record inserted");
                let (record, _) = doc.into_record()?;
                Ok(record)
            }
            WriteOutcome::Conflict => Err(CouchDaoError::RevisionConflict {
                doc_id: doc.id,
                attempts: 1,
            }),
        }
    }

    /// Read-merge-write guarded by the document revision, retried on conflicts.
    async fn merge(&self, id: &str, patch: RecordPatch) -> CouchResult<GameRecord> {
        let doc_id = game_doc_id(id);
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let (mut record, rev) =
                self.load_record(id)
                    .await?
                    .ok_or_else(|| CouchDaoError::MissingDocument {
                        doc_id: doc_id.clone(),
                    })?;
            record.apply(patch.clone());

            let doc = CouchRecordDocument::from_record(record.clone(), rev);
            match self.put_document(&doc_id, &doc).await? {
                WriteOutcome::Written(rev) => {
                    debug!(doc_id = %doc_id, %rev, attempt, "record merged");
                    return Ok(record);
                }
                WriteOutcome::Conflict => {
                    debug!(doc_id = %doc_id, attempt, "revision conflict while merging update");
                }
            }
        }

        Err(CouchDaoError::RevisionConflict {
            doc_id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    async fn remove(&self, id: &str) -> CouchResult<()> {
        let doc_id = game_doc_id(id);
        for _ in 0..MAX_WRITE_ATTEMPTS {
            let Some((_, Some(rev))) = self.load_record(id).await? else {
                return Err(CouchDaoError::MissingDocument { doc_id });
            };

            let response = self
                .request(Method::DELETE, &doc_id)
                .query(&[("rev", rev)])
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: doc_id.clone(),
                    source,
                })?;

            match response.status() {
                StatusCode::CONFLICT => continue,
                StatusCode::NOT_FOUND => return Err(CouchDaoError::MissingDocument { doc_id }),
                status if status.is_success() => return Ok(()),
                other => {
                    return Err(CouchDaoError::RequestStatus {
                        path: doc_id,
                        status: other,
                    });
                }
            }
        }

        Err(CouchDaoError::RevisionConflict {
            doc_id,
            attempts: MAX_WRITE_ATTEMPTS,
        })
    }

    /// One long-poll round on the changes feed restricted to `doc_id`.
    async fn poll_changes(&self, doc_id: &str, since: &Value) -> CouchResult<ChangesResponse> {
        let since = match since {
            Value::String(seq) => seq.clone(),
            other => other.to_string(),
        };
        let query = [
            ("feed", "longpoll".to_string()),
            ("filter", "_doc_ids".to_string()),
            ("include_docs", "true".to_string()),
            ("since", since),
            ("timeout", self.changes_timeout.as_millis().to_string()),
        ];

        let response = self
            .request(Method::POST, CHANGES)
            .query(&query)
            .json(&json!({ "doc_ids": [doc_id] }))
            .timeout(self.changes_timeout + Duration::from_secs(10))
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: CHANGES.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: CHANGES.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<ChangesResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: CHANGES.to_string(),
                source,
            })
    }

    /// Follow the changes feed until the subscriber goes away, reconnecting with back-off.
    async fn follow_changes(self, id: RecordId, tx: mpsc::Sender<RecordEvent>) {
        let doc_id = game_doc_id(&id);
        let mut since = Value::String("now".into());
        let mut delay = FEED_INITIAL_DELAY;

        'feed: loop {
            tokio::select! {
                _ = tx.closed() => break 'feed,
                polled = self.poll_changes(&doc_id, &since) => match polled {
                    Ok(changes) => {
                        delay = FEED_INITIAL_DELAY;
                        since = changes.last_seq;
                        for row in changes.results {
                            let Some(event) = change_to_event(&doc_id, row) else {
                                continue;
                            };
                            if tx.send(event).await.is_err() {
                                break 'feed;
                            }
                        }
                    }
                    Err(err) => {
                        warn!(record_id = %id, error = %err, "changes feed failed; reconnecting");
                        tokio::select! {
                            _ = tx.closed() => break 'feed,
                            _ = sleep(delay) => {}
                        }
                        delay = (delay * 2).min(FEED_MAX_DELAY);
                    }
                }
            }
        }

        debug!(record_id = %id, "changes feed stopped");
    }
}

fn change_to_event(doc_id: &str, row: ChangeRow) -> Option<RecordEvent> {
    if row.id != doc_id {
        debug!(doc_id = %row.id, "ignoring change for another document");
        return None;
    }
    if row.deleted {
        return Some(RecordEvent::Deleted);
    }

    let parsed = from_value::<CouchRecordDocument>(row.doc?)
        .map_err(|source| CouchDaoError::DeserializeValue {
            path: doc_id.to_string(),
            source,
        })
        .and_then(CouchRecordDocument::into_record);

    match parsed {
        Ok((record, _)) => Some(RecordEvent::Snapshot(record)),
        Err(err) => {
            warn!(doc_id, error = %err, "skipping undecodable change");
            None
        }
    }
}

impl RecordStore for CouchRecordStore {
    fn create(&self, record: NewGameRecord) -> BoxFuture<'static, StorageResult<GameRecord>> {
        let store = self.clone();
        Box::pin(async move { store.insert(record).await.map_err(Into::into) })
    }

    fn fetch_by_id(&self, id: RecordId) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let store = self.clone();
        Box::pin(async move {
            let loaded = store.load_record(&id).await?;
            Ok(loaded.map(|(record, _)| record))
        })
    }

    fn fetch_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let store = self.clone();
        Box::pin(async move { store.find_by_code(&code).await.map_err(Into::into) })
    }

    fn update(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> BoxFuture<'static, StorageResult<GameRecord>> {
        let store = self.clone();
        Box::pin(async move { store.merge(&id, patch).await.map_err(Into::into) })
    }

    fn delete(&self, id: RecordId) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.remove(&id).await.map_err(Into::into) })
    }

    fn subscribe(&self, id: RecordId) -> BoxFuture<'static, StorageResult<Subscription>> {
        let store = self.clone();
        Box::pin(async move {
            let (tx, subscription) = Subscription::channel(SUBSCRIPTION_CAPACITY);
            tokio::spawn(store.follow_changes(id, tx));
            Ok(subscription)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", store.base_url, store.database);
            let response = store
                .authorize(store.client.get(&url))
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
}
