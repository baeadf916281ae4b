//! Turn countdown bookkeeping.

use crate::dao::models::{GameRecord, Role};

/// Identifies one turn: whose it is and how many guesses preceded it.
///
/// A timeout carries the key of the turn it was armed for, so a timeout that
/// lost the race against a commit of that turn can be recognised as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TurnKey {
    /// Seat holding the turn.
    pub turn: Role,
    /// Guesses made before the turn started.
    pub guesses: usize,
}

impl TurnKey {
    /// Key of the turn `record` is currently in.
    pub fn of(record: &GameRecord) -> Self {
        Self {
            turn: record.current_turn,
            guesses: record.guesses.len(),
        }
    }
}

/// Result of one one-second tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The turn is still running.
    Running {
        /// Seconds left after this tick.
        remaining: u32,
    },
    /// The turn ran out; the countdown has already rearmed itself.
    Expired {
        /// Turn that ran out.
        turn: TurnKey,
    },
}

/// Per-turn countdown, advanced by the timeout supervisor once per second.
#[derive(Debug, Clone)]
pub struct Countdown {
    duration_secs: u32,
    remaining: u32,
    turn: Option<TurnKey>,
}

impl Countdown {
    /// Stopped countdown for turns of `duration_secs` (at least one).
    pub fn new(duration_secs: u32) -> Self {
        Self {
            duration_secs: duration_secs.max(1),
            remaining: 0,
            turn: None,
        }
    }

    /// Arm for `turn` with the full duration.
    pub fn start(&mut self, turn: TurnKey) {
        self.turn = Some(turn);
        self.remaining = self.duration_secs;
    }

    /// Restart when the reconciled record moved to another turn.
    pub fn observe(&mut self, turn: TurnKey) -> bool {
        match self.turn {
            Some(current) if current != turn => {
                self.start(turn);
                true
            }
            _ => false,
        }
    }

    /// Disarm until the next `start`.
    pub fn stop(&mut self) {
        self.turn = None;
        self.remaining = 0;
    }

    /// Whether a turn is armed.
    pub fn is_running(&self) -> bool {
        self.turn.is_some()
    }

    /// Seconds left in the current turn, `None` when stopped.
    pub fn remaining(&self) -> Option<u32> {
        self.turn.map(|_| self.remaining)
    }

    /// Advance one second; `None` while stopped.
    pub fn tick(&mut self) -> Option<Tick> {
        let turn = self.turn?;
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.remaining = self.duration_secs;
            return Some(Tick::Expired { turn });
        }
        Some(Tick::Running {
            remaining: self.remaining,
        })
    }
}
