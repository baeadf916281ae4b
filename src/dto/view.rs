use serde::Serialize;
use serde_with::skip_serializing_none;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{GameRecord, Guess, Role, Warnings},
    state::{
        reconciler::ReconcileStats,
        session::{PushStatus, SessionInner},
        stage::Stage,
    },
};

/// Projection of a session sent to its participant.
///
/// Only the participant's own secret is exposed.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionView {
    /// Session identifier.
    pub session_id: Uuid,
    /// Current stage.
    pub stage: Stage,
    /// Display name once in a room.
    pub name: Option<String>,
    /// Seat once in a room.
    pub role: Option<Role>,
    /// State of the push channel.
    pub push_status: PushStatus,
    /// The room, if any.
    pub room: Option<RoomView>,
}

/// The reconciled record as seen from one seat.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoomView {
    /// Identifier of the shared record.
    pub record_id: String,
    /// Invite code to share with the opponent.
    pub code: String,
    /// Host display name.
    pub player1: String,
    /// Guest display name.
    pub player2: Option<String>,
    /// Seat expected to guess next.
    pub current_turn: Role,
    /// Whether the viewer may guess now.
    pub my_turn: bool,
    /// The viewer's own secret.
    pub my_secret: Option<String>,
    /// Whether the opponent picked a secret, without revealing it.
    pub opponent_secret_set: bool,
    /// Guess history, oldest first.
    pub guesses: Vec<Guess>,
    /// Expired-turn counters.
    pub warnings: Warnings,
    /// Winner display name.
    pub winner: Option<String>,
    /// Seconds left in the running turn.
    pub time_left: Option<u32>,
    /// The record was deleted by either participant.
    pub closed: bool,
    /// Guess counters.
    pub stats: GuessStats,
    /// Reconciler counters.
    pub reconcile: ReconcileStats,
}

/// Guess counters shown alongside the history.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct GuessStats {
    /// All guesses.
    pub total: usize,
    /// Guesses by the host.
    pub player1: usize,
    /// Guesses by the guest.
    pub player2: usize,
}

impl GuessStats {
    /// Count the guesses of `record` per seat.
    pub fn of(record: &GameRecord) -> Self {
        let count = |name: Option<&str>| {
            name.map_or(0, |name| {
                record.guesses.iter().filter(|g| g.player == name).count()
            })
        };
        Self {
            total: record.guesses.len(),
            player1: count(record.player(Role::Player1)),
            player2: count(record.player(Role::Player2)),
        }
    }
}

impl SessionView {
    pub(crate) fn build(session_id: Uuid, inner: &SessionInner) -> Self {
        let role = inner.identity.as_ref().map(|identity| identity.role);
        let push_status = inner
            .room
            .as_ref()
            .map_or(PushStatus::None, |room| room.push_status);

        let room = inner.room.as_ref().and_then(|room| {
            let record = room.reconciler.current()?;
            let role = role?;
            Some(RoomView {
                record_id: record.id.clone(),
                code: record.code.clone(),
                player1: record.player1.clone(),
                player2: record.player2.clone(),
                current_turn: record.current_turn,
                my_turn: record.current_turn == role && !record.is_finished(),
                my_secret: record.secret(role).map(str::to_string),
                opponent_secret_set: record.secret(role.other()).is_some(),
                guesses: record.guesses.clone(),
                warnings: record.warnings,
                winner: record.winner.clone(),
                time_left: room.countdown.remaining(),
                closed: room.reconciler.is_closed(),
                stats: GuessStats::of(record),
                reconcile: room.reconciler.stats(),
            })
        });

        Self {
            session_id,
            stage: inner.stage.stage(),
            name: inner.identity.as_ref().map(|identity| identity.name.clone()),
            role,
            push_status,
            room,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{Feedback, NewGameRecord, RecordPatch};

    #[test]
    fn stats_count_guesses_per_seat() {
        let mut record = NewGameRecord::hosted_by("ABC123", "alice").into_record("r1".into());
        record.apply(RecordPatch::join("bob"));
        for player in ["alice", "bob", "alice"] {
            record.guesses.push(Guess {
                player: player.into(),
                guess: "0000".into(),
                feedback: Feedback::default(),
                auto: false,
            });
        }

        assert_eq!(
            GuessStats::of(&record),
            GuessStats {
                total: 3,
                player1: 2,
                player2: 1
            }
        );
    }

    #[test]
    fn empty_session_hides_room() {
        let view = SessionView::build(Uuid::nil(), &SessionInner::default());
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["stage"], "login");
        assert_eq!(json["push_status"], "none");
        assert!(json.get("room").is_none());
        assert!(json.get("role").is_none());
    }
}
