//! In-process record store with per-record change broadcasting.
//!
//! Used by tests and by the binary when no remote store is configured, in which
//! case every session hosted by the process shares the same records.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::debug;
use uuid::Uuid;

use crate::dao::{
    models::{GameRecord, NewGameRecord, RecordEvent, RecordId, RecordPatch},
    record_store::{RecordStore, SUBSCRIPTION_CAPACITY, Subscription},
    storage::{StorageError, StorageResult},
};

const BROADCAST_CAPACITY: usize = 64;

/// Record store kept in process memory.
///
/// Clones share the same records, so several clients can play against one instance.
#[derive(Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    records: DashMap<RecordId, GameRecord>,
    codes: DashMap<String, RecordId>,
    channels: DashMap<RecordId, broadcast::Sender<RecordEvent>>,
    offline: AtomicBool,
}

impl MemoryRecordStore {
    /// Empty, online store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a transport outage: every call fails while `offline` is set.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    /// Whether no record is currently stored.
    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }
}

impl Inner {
    fn ensure_online(&self) -> StorageResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                "memory store offline".into(),
                io::Error::new(io::ErrorKind::NotConnected, "offline"),
            ));
        }
        Ok(())
    }

    fn channel(&self, id: &RecordId) -> broadcast::Sender<RecordEvent> {
        self.channels
            .entry(id.clone())
            .or_insert_with(|| broadcast::channel(BROADCAST_CAPACITY).0)
            .clone()
    }

    /// Receiver on the record's change feed, or `None` if the record does not exist.
    ///
    /// The record entry stays locked while the feed is registered so a
    /// concurrent delete cannot leave an orphaned channel behind.
    fn subscribe_existing(&self, id: &RecordId) -> Option<broadcast::Receiver<RecordEvent>> {
        let _record = self.records.get(id)?;
        Some(self.channel(id).subscribe())
    }

    fn publish(&self, id: &RecordId, event: RecordEvent) {
        if let Some(sender) = self.channels.get(id) {
            let _ = sender.send(event);
        }
    }

    fn create(&self, record: NewGameRecord) -> StorageResult<GameRecord> {
        self.ensure_online()?;
        let id = Uuid::new_v4().to_string();
        match self.codes.entry(record.code.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(StorageError::Conflict {
                    message: format!("code `{}` already in use", record.code),
                });
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id.clone());
            }
        }

        let record = record.into_record(id.clone());
        self.records.insert(id, record.clone());
        Ok(record)
    }

    fn fetch_by_id(&self, id: &RecordId) -> StorageResult<Option<GameRecord>> {
        self.ensure_online()?;
        Ok(self.records.get(id).map(|entry| entry.value().clone()))
    }

    fn fetch_by_code(&self, code: &str) -> StorageResult<Option<GameRecord>> {
        self.ensure_online()?;
        let Some(id) = self.codes.get(code).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        self.fetch_by_id(&id)
    }

    fn update(&self, id: &RecordId, patch: RecordPatch) -> StorageResult<GameRecord> {
        self.ensure_online()?;
        let snapshot = {
            let mut entry = self
                .records
                .get_mut(id)
                .ok_or_else(|| StorageError::not_found(id.clone()))?;
            entry.apply(patch);
            entry.value().clone()
        };
        self.publish(id, RecordEvent::Snapshot(snapshot.clone()));
        Ok(snapshot)
    }

    fn delete(&self, id: &RecordId) -> StorageResult<()> {
        self.ensure_online()?;
        let (_, record) = self
            .records
            .remove(id)
            .ok_or_else(|| StorageError::not_found(id.clone()))?;
        self.codes.remove(&record.code);
        self.publish(id, RecordEvent::Deleted);
        self.channels.remove(id);
        Ok(())
    }
}

impl RecordStore for MemoryRecordStore {
    fn create(&self, record: NewGameRecord) -> BoxFuture<'static, StorageResult<GameRecord>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.create(record) })
    }

    fn fetch_by_id(&self, id: RecordId) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.fetch_by_id(&id) })
    }

    fn fetch_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameRecord>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.fetch_by_code(&code) })
    }

    fn update(
        &self,
        id: RecordId,
        patch: RecordPatch,
    ) -> BoxFuture<'static, StorageResult<GameRecord>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.update(&id, patch) })
    }

    fn delete(&self, id: RecordId) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.delete(&id) })
    }

    fn subscribe(&self, id: RecordId) -> BoxFuture<'static, StorageResult<Subscription>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            let (tx, subscription) = Subscription::channel(SUBSCRIPTION_CAPACITY);
            let Some(mut receiver) = inner.subscribe_existing(&id) else {
                // Already gone: report the deletion once and end the stream.
                let _ = tx.try_send(RecordEvent::Deleted);
                return Ok(subscription);
            };

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = tx.closed() => break,
                        received = receiver.recv() => match received {
                            Ok(event) => {
                                if tx.send(event).await.is_err() {
                                    break;
                                }
                            }
                            Err(RecvError::Lagged(skipped)) => {
                                debug!(record_id = %id, skipped, "memory subscription lagged");
                                continue;
                            }
                            Err(RecvError::Closed) => break,
                        }
                    }
                }
            });

            Ok(subscription)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ensure_online() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_fetch_by_code() {
        let store = MemoryRecordStore::new();
        let created = store
            .create(NewGameRecord::hosted_by("ABC123", "alice"))
            .await
            .unwrap();

        let found = store.fetch_by_code("ABC123".into()).await.unwrap();
        assert_eq!(found, Some(created));
        assert!(store.fetch_by_code("ZZZ999".into()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_codes_are_rejected() {
        let store = MemoryRecordStore::new();
        store
            .create(NewGameRecord::hosted_by("ABC123", "alice"))
            .await
            .unwrap();
        let err = store
            .create(NewGameRecord::hosted_by("ABC123", "carol"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict { .. }));
    }

    #[tokio::test]
    async fn subscribers_see_updates_and_deletion() {
        let store = MemoryRecordStore::new();
        let created = store
            .create(NewGameRecord::hosted_by("ABC123", "alice"))
            .await
            .unwrap();
        let mut subscription = store.subscribe(created.id.clone()).await.unwrap();

        let updated = store
            .update(created.id.clone(), RecordPatch::join("bob"))
            .await
            .unwrap();
        assert_eq!(subscription.next().await, Some(RecordEvent::Snapshot(updated)));

        store.delete(created.id.clone()).await.unwrap();
        assert_eq!(subscription.next().await, Some(RecordEvent::Deleted));
        assert_eq!(subscription.next().await, None);
    }

    #[tokio::test]
    async fn subscribing_to_a_deleted_record_reports_the_deletion() {
        let store = MemoryRecordStore::new();
        let created = store
            .create(NewGameRecord::hosted_by("ABC123", "alice"))
            .await
            .unwrap();
        store.delete(created.id.clone()).await.unwrap();

        let mut subscription = store.subscribe(created.id.clone()).await.unwrap();
        assert_eq!(subscription.next().await, Some(RecordEvent::Deleted));
        assert_eq!(subscription.next().await, None);
        assert!(store.inner.channels.is_empty());
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let store = MemoryRecordStore::new();
        let err = store
            .update("missing".into(), RecordPatch::join("bob"))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn offline_store_fails_every_call() {
        let store = MemoryRecordStore::new();
        store.set_offline(true);
        assert!(store.fetch_by_id("any".into()).await.is_err());
        assert!(store.health_check().await.is_err());
        store.set_offline(false);
        assert!(store.health_check().await.is_ok());
    }
}
