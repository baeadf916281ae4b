//! The two channels feeding a session's reconciler: the record subscription
//! (push) and the periodic fetch (poll).

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval, sleep},
};
use tracing::{debug, warn};

use crate::{
    dao::{
        models::{RecordEvent, RecordId},
        record_store::RecordStore,
        storage::StorageResult,
    },
    state::{
        reconciler::{Reconciled, Source},
        session::{PushStatus, Session},
    },
};

const RESUBSCRIBE_INITIAL_DELAY: Duration = Duration::from_millis(500);
const RESUBSCRIBE_MAX_DELAY: Duration = Duration::from_secs(10);

/// Keep a subscription open for `record_id` for as long as the session lives.
pub fn spawn_push(
    session: Weak<Session>,
    store: Arc<dyn RecordStore>,
    record_id: RecordId,
) -> JoinHandle<()> {
    tokio::spawn(run_push(session, store, record_id))
}

async fn run_push(session: Weak<Session>, store: Arc<dyn RecordStore>, record_id: RecordId) {
    let mut delay = RESUBSCRIBE_INITIAL_DELAY;

    loop {
        match store.subscribe(record_id.clone()).await {
            Ok(mut subscription) => {
                delay = RESUBSCRIBE_INITIAL_DELAY;
                match session.upgrade() {
                    Some(session) => session.set_push_status(PushStatus::Subscribed).await,
                    None => return,
                }

                while let Some(event) = subscription.next().await {
                    let Some(session) = session.upgrade() else {
                        return;
                    };
                    match event {
                        RecordEvent::Snapshot(record) => {
                            session.reconcile(Source::Push, record).await;
                        }
                        RecordEvent::Deleted => {
                            session.tombstone(Source::Push).await;
                        }
                    }
                }

                let Some(session) = session.upgrade() else {
                    return;
                };
                if session.is_room_closed().await {
                    session.set_push_status(PushStatus::Closed).await;
                    return;
                }
                warn!(%record_id, "push channel dropped; resubscribing");
                session.set_push_status(PushStatus::Pending).await;
            }
            Err(err) => {
                warn!(%record_id, error = %err, "subscribe failed; retrying");
                if session.upgrade().is_none() {
                    return;
                }
            }
        }

        sleep(delay).await;
        delay = (delay * 2).min(RESUBSCRIBE_MAX_DELAY);
    }
}

/// Fetch `record_id` immediately, then every `period`.
pub fn spawn_poll(
    session: Weak<Session>,
    store: Arc<dyn RecordStore>,
    record_id: RecordId,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(session) = session.upgrade() else {
                break;
            };
            // Failures keep the last applied snapshot; the next tick retries.
            if let Err(err) = fetch_into(&session, store.as_ref(), &record_id).await {
                warn!(%record_id, error = %err, "poll fetch failed");
            }
        }
    })
}

/// One fetch fed through the reconciler as a poll result.
pub async fn fetch_into(
    session: &Arc<Session>,
    store: &dyn RecordStore,
    record_id: &RecordId,
) -> StorageResult<Reconciled> {
    let outcome = match store.fetch_by_id(record_id.clone()).await? {
        Some(record) => session.reconcile(Source::Poll, record).await,
        None => session.tombstone(Source::Poll).await,
    };
    debug!(%record_id, ?outcome, "poll result reconciled");
    Ok(outcome)
}
