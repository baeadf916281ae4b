//! Deduplication of snapshots arriving through several channels.

use serde::Serialize;
use utoipa::ToSchema;

use crate::dao::models::{GameRecord, RecordId};

/// Channel a snapshot arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// Change notification from the record subscription.
    Push,
    /// Periodic or manual fetch.
    Poll,
    /// Result of this session's own write.
    Local,
}

/// What the reconciler did with an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciled {
    /// The snapshot differs from the last applied one and replaced it.
    Applied,
    /// Structurally equal to the last applied snapshot; dropped.
    Duplicate,
    /// Snapshot for another record, or arriving after the room closed.
    Ignored,
    /// First tombstone for the record.
    Closed,
}

/// Counters exposed in the session view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct ReconcileStats {
    /// Snapshots that replaced the previous one.
    pub applied: u64,
    /// Duplicates and ignored inputs.
    pub discarded: u64,
    /// Channel of the last applied snapshot.
    pub last_source: Option<Source>,
}

/// Single merge point for the push, poll and local-write channels of one record.
#[derive(Debug, Clone)]
pub struct Reconciler {
    record_id: RecordId,
    last: Option<GameRecord>,
    closed: bool,
    stats: ReconcileStats,
}

impl Reconciler {
    /// Empty reconciler for `record_id`.
    pub fn new(record_id: RecordId) -> Self {
        Self {
            record_id,
            last: None,
            closed: false,
            stats: ReconcileStats::default(),
        }
    }

    /// Start from a snapshot obtained by a local create/join.
    pub fn seeded(record: GameRecord) -> Self {
        let mut reconciler = Self::new(record.id.clone());
        reconciler.offer(Source::Local, record);
        reconciler
    }

    /// Record this reconciler follows.
    pub fn record_id(&self) -> &RecordId {
        &self.record_id
    }

    /// Last applied snapshot.
    pub fn current(&self) -> Option<&GameRecord> {
        self.last.as_ref()
    }

    /// Whether a tombstone was received.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Counters so far.
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    /// Offer a snapshot from any channel.
    pub fn offer(&mut self, source: Source, snapshot: GameRecord) -> Reconciled {
        if self.closed || snapshot.id != self.record_id {
            self.stats.discarded += 1;
            return Reconciled::Ignored;
        }

        if self.last.as_ref() == Some(&snapshot) {
            self.stats.discarded += 1;
            return Reconciled::Duplicate;
        }

        self.last = Some(snapshot);
        self.stats.applied += 1;
        self.stats.last_source = Some(source);
        Reconciled::Applied
    }

    /// Record that the record is gone (push deletion or poll not-found).
    ///
    /// The last snapshot is kept so the view can still show the final state.
    pub fn tombstone(&mut self, source: Source) -> Reconciled {
        if self.closed {
            self.stats.discarded += 1;
            return Reconciled::Duplicate;
        }
        self.closed = true;
        self.stats.last_source = Some(source);
        Reconciled::Closed
    }
}
