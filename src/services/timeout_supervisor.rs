//! Per-session turn countdown driver.

use std::{sync::Weak, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{info, warn};

use crate::{
    services::sse_events,
    state::{countdown::Tick, session::Session},
};

const TICK: Duration = Duration::from_secs(1);

/// Tick the session countdown every second until it stops.
///
/// On expiry the timed-out turn is queued on the session writer, which
/// auto-plays it unless the record already moved on. The turn owner is read
/// from the record, so either participant's timer may fire for it.
pub fn spawn(session: Weak<Session>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + TICK, TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(session) = session.upgrade() else {
                break;
            };
            let Some((tick, writer)) = session.tick_countdown().await else {
                break;
            };

            match tick {
                Tick::Running { remaining } => sse_events::broadcast_tick(session.hub(), remaining),
                Tick::Expired { turn } => {
                    sse_events::broadcast_tick(session.hub(), 0);
                    info!(session_id = %session.id(), timed_out = %turn.turn, "turn timed out");
                    if !writer.timeout(turn) {
                        warn!(session_id = %session.id(), "writer busy; timeout dropped");
                    }
                }
            }
        }
    })
}
