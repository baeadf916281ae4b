//! The shared game record and the values embedded in it.
//!
//! Every field is serialised with the names other clients of the same store expect.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use utoipa::ToSchema;

/// Number of digits in a secret or a guess.
pub const CODE_LENGTH: usize = 4;

/// Opaque identifier assigned to a record by the store.
pub type RecordId = String;

/// One of the two fixed seats of a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The host seat; plays first.
    Player1,
    /// The seat taken by joining.
    Player2,
}

impl Role {
    /// The seat facing this one.
    pub fn other(self) -> Self {
        match self {
            Role::Player1 => Role::Player2,
            Role::Player2 => Role::Player1,
        }
    }

    /// Wire name of the seat (`player1` / `player2`).
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Player1 => "player1",
            Role::Player2 => "player2",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scored comparison of a guess against a secret.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    /// Digits present in the secret regardless of position (one-to-one matching).
    pub total_matches: u8,
    /// Digits present at the exact position.
    pub correct_positions: u8,
}

impl Feedback {
    /// Whether this feedback ends the game.
    pub fn is_win(&self) -> bool {
        usize::from(self.correct_positions) == CODE_LENGTH
    }
}

/// A single guess embedded in the record's guess history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Guess {
    /// Display name of the participant the guess is attributed to.
    pub player: String,
    /// The four guessed digits.
    pub guess: String,
    /// Score against the opponent's secret.
    pub feedback: Feedback,
    /// `true` when synthesized by the timeout path.
    #[serde(default)]
    pub auto: bool,
}

/// Per-seat timeout warning counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Warnings {
    /// Turns the host let expire.
    #[serde(default)]
    pub player1: u32,
    /// Turns the guest let expire.
    #[serde(default)]
    pub player2: u32,
}

impl Warnings {
    /// Return a copy with the counter of `role` bumped by one.
    pub fn incremented(mut self, role: Role) -> Self {
        match role {
            Role::Player1 => self.player1 += 1,
            Role::Player2 => self.player2 += 1,
        }
        self
    }
}

/// The shared row representing one game room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GameRecord {
    /// Identifier assigned by the store.
    pub id: RecordId,
    /// Invite code used to join.
    pub code: String,
    /// Host display name.
    pub player1: String,
    /// Guest display name once seated.
    #[serde(default)]
    pub player2: Option<String>,
    /// Host secret.
    #[serde(default)]
    pub secret_player1: Option<String>,
    /// Guest secret.
    #[serde(default)]
    pub secret_player2: Option<String>,
    /// Seat expected to guess next.
    pub current_turn: Role,
    /// Guess history, oldest first.
    #[serde(default)]
    pub guesses: Vec<Guess>,
    /// Expired-turn counters.
    #[serde(default)]
    pub warnings: Warnings,
    /// Display name of the winner.
    #[serde(default)]
    pub winner: Option<String>,
}

impl GameRecord {
    /// Display name seated at `role`, if that seat is taken.
    pub fn player(&self, role: Role) -> Option<&str> {
        match role {
            Role::Player1 => Some(self.player1.as_str()),
            Role::Player2 => self.player2.as_deref(),
        }
    }

    /// Secret owned by `role`, if already set.
    pub fn secret(&self, role: Role) -> Option<&str> {
        match role {
            Role::Player1 => self.secret_player1.as_deref(),
            Role::Player2 => self.secret_player2.as_deref(),
        }
    }

    /// Whether both seats picked a secret.
    pub fn both_secrets_set(&self) -> bool {
        self.secret_player1.is_some() && self.secret_player2.is_some()
    }

    /// Whether a winner was declared.
    pub fn is_finished(&self) -> bool {
        self.winner.is_some()
    }

    /// Merge the present fields of `patch` into this record.
    pub fn apply(&mut self, patch: RecordPatch) {
        let RecordPatch {
            player2,
            secret_player1,
            secret_player2,
            current_turn,
            guesses,
            warnings,
            winner,
        } = patch;

        if let Some(value) = player2 {
            self.player2 = Some(value);
        }
        if let Some(value) = secret_player1 {
            self.secret_player1 = Some(value);
        }
        if let Some(value) = secret_player2 {
            self.secret_player2 = Some(value);
        }
        if let Some(value) = current_turn {
            self.current_turn = value;
        }
        if let Some(value) = guesses {
            self.guesses = value;
        }
        if let Some(value) = warnings {
            self.warnings = value;
        }
        if let Some(value) = winner {
            self.winner = Some(value);
        }
    }
}

/// Fields supplied when inserting a brand-new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGameRecord {
    /// Invite code.
    pub code: String,
    /// Host display name.
    pub player1: String,
    /// First seat to guess.
    pub current_turn: Role,
    /// Initial history, normally empty.
    pub guesses: Vec<Guess>,
    /// Initial warning counters.
    pub warnings: Warnings,
}

impl NewGameRecord {
    /// Initial fields for a room hosted by `player1`.
    pub fn hosted_by(code: impl Into<String>, player1: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            player1: player1.into(),
            current_turn: Role::Player1,
            guesses: Vec::new(),
            warnings: Warnings::default(),
        }
    }

    /// Materialise the record once the store assigned its identifier.
    pub fn into_record(self, id: RecordId) -> GameRecord {
        GameRecord {
            id,
            code: self.code,
            player1: self.player1,
            player2: None,
            secret_player1: None,
            secret_player2: None,
            current_turn: self.current_turn,
            guesses: self.guesses,
            warnings: self.warnings,
            winner: None,
        }
    }
}

/// Partial update merged into a record; absent fields are left untouched.
#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordPatch {
    /// Seats the guest.
    pub player2: Option<String>,
    /// Sets the host secret.
    pub secret_player1: Option<String>,
    /// Sets the guest secret.
    pub secret_player2: Option<String>,
    /// Hands the turn over.
    pub current_turn: Option<Role>,
    /// Replaces the whole history.
    pub guesses: Option<Vec<Guess>>,
    /// Replaces both counters.
    pub warnings: Option<Warnings>,
    /// Declares the winner.
    pub winner: Option<String>,
}

impl RecordPatch {
    /// Patch setting the secret owned by `role`.
    pub fn secret(role: Role, secret: impl Into<String>) -> Self {
        let secret = Some(secret.into());
        match role {
            Role::Player1 => Self {
                secret_player1: secret,
                ..Self::default()
            },
            Role::Player2 => Self {
                secret_player2: secret,
                ..Self::default()
            },
        }
    }

    /// Patch seating the joining participant.
    pub fn join(player2: impl Into<String>) -> Self {
        Self {
            player2: Some(player2.into()),
            ..Self::default()
        }
    }
}

/// Change notification delivered by a record subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordEvent {
    /// Full snapshot after any writer changed the record.
    Snapshot(GameRecord),
    /// The record was deleted.
    Deleted,
}
