/// CouchDB backend.
#[cfg(feature = "couch-store")]
pub mod couchdb;
/// In-process backend used by tests and local runs.
pub mod memory;

use futures::future::BoxFuture;
use tokio::sync::mpsc;

use crate::dao::models::{GameRecord, NewGameRecord, RecordEvent, RecordId, RecordPatch};
use crate::dao::storage::StorageResult;

/// Buffer size of the channel backing a [`Subscription`].
pub const SUBSCRIPTION_CAPACITY: usize = 16;

/// Abstraction over the remote store holding shared game records.
///
/// Every call is applied atomically by the backend, but nothing serializes a
/// read-compute-write round trip performed by two independent clients.
pub trait RecordStore: Send + Sync {
    /// Insert a new record and return it with its assigned identifier.
    fn create(&self, record: NewGameRecord) -> BoxFuture<'static, StorageResult<GameRecord>>;
    fn fetch_by_id(&self, id: RecordId) -> BoxFuture<'static, StorageResult<Option<GameRecord>>>;
    fn fetch_by_code(&self, code: String)
    -> BoxFuture<'static, StorageResult<Option<GameRecord>>>;
    /// Merge `patch` into the record and return the new snapshot.
    fn update(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> BoxFuture<'static, StorageResult<GameRecord>>;
    fn delete(&self, id: RecordId) -> BoxFuture<'static, StorageResult<()>>;
    /// Start delivering change events for the record, whoever the writer is.
    fn subscribe(&self, id: RecordId) -> BoxFuture<'static, StorageResult<Subscription>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
}

/// Handle on a stream of [`RecordEvent`]s for one record.
///
/// Producers watch [`mpsc::Sender::closed`] to stop once the handle is closed or dropped.
#[derive(Debug)]
pub struct Subscription {
    events: mpsc::Receiver<RecordEvent>,
}

impl Subscription {
    /// Create a subscription together with the sender its producer feeds.
    pub fn channel(capacity: usize) -> (mpsc::Sender<RecordEvent>, Self) {
        let (tx, events) = mpsc::channel(capacity);
        (tx, Self { events })
    }

    /// Wait for the next event; `None` once the producer is gone.
    pub async fn next(&mut self) -> Option<RecordEvent> {
        self.events.recv().await
    }

    /// Stop delivery. Producers observe the closure and exit.
    pub fn close(&mut self) {
        self.events.close();
    }
}
