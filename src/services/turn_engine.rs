//! Validation and planning of every write a participant makes during a game.
//!
//! The functions here are pure: they look at the last reconciled snapshot and
//! produce the [`RecordPatch`] to commit, or the reason nothing may be written.

use rand::Rng;
use thiserror::Error;

use crate::{
    dao::models::{Feedback, GameRecord, Guess, RecordPatch, Role},
    services::feedback::{is_valid_code, score},
    state::{countdown::TurnKey, stage::Stage},
};

/// Reasons a guess or secret is refused before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TurnError {
    /// Not exactly four ASCII digits.
    #[error("enter exactly 4 digits")]
    InvalidDigits,
    /// The opponent holds the turn.
    #[error("it is not your turn")]
    NotYourTurn,
    /// The opponent has no secret to guess against.
    #[error("opponent has not set a secret yet")]
    OpponentNotReady,
    /// A winner was already declared.
    #[error("game already finished")]
    GameFinished,
    /// Secrets are write-once.
    #[error("secret already set")]
    SecretAlreadySet,
    /// The session stage does not allow this write.
    #[error("not allowed while in {0:?}")]
    WrongStage(Stage),
}

/// A validated guess ready to be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedGuess {
    /// Score of the guess.
    pub feedback: Feedback,
    /// Update to commit.
    pub patch: RecordPatch,
}

/// Source of auto-guess digits for timed-out turns.
pub trait GuessGenerator: Send + Sync {
    /// Four digits to play on the participant's behalf.
    fn next_guess(&self) -> String;
}

/// Uniform draw from `1000..=9999`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomGuess;

impl GuessGenerator for RandomGuess {
    fn next_guess(&self) -> String {
        rand::rng().random_range(1000..=9999).to_string()
    }
}

/// Always proposes the same digits.
#[derive(Debug, Clone)]
pub struct FixedGuess(pub String);

impl GuessGenerator for FixedGuess {
    fn next_guess(&self) -> String {
        self.0.clone()
    }
}

/// Check and plan a human guess by `role`.
pub fn plan_guess(
    record: &GameRecord,
    stage: Stage,
    role: Role,
    digits: &str,
) -> Result<PlannedGuess, TurnError> {
    if !is_valid_code(digits) {
        return Err(TurnError::InvalidDigits);
    }
    if record.is_finished() {
        return Err(TurnError::GameFinished);
    }
    if stage != Stage::Playing {
        return Err(TurnError::WrongStage(stage));
    }
    if record.current_turn != role {
        return Err(TurnError::NotYourTurn);
    }
    let (Some(secret), Some(name)) = (record.secret(role.other()), record.player(role)) else {
        return Err(TurnError::OpponentNotReady);
    };

    let feedback = score(digits, secret);
    Ok(append_guess(record, role, name, digits, feedback, false))
}

/// Plan the automatic guess for the turn identified by `expected`.
///
/// Returns `None` when there is nothing to do: the game is over, the record
/// already moved past that turn, or the opponent secret is missing.
pub fn plan_timeout(
    record: &GameRecord,
    expected: TurnKey,
    generator: &dyn GuessGenerator,
) -> Option<PlannedGuess> {
    if record.is_finished() || TurnKey::of(record) != expected {
        return None;
    }

    let role = record.current_turn;
    let secret = record.secret(role.other())?;
    let name = record.player(role)?;

    let digits = generator.next_guess();
    let feedback = score(&digits, secret);
    let mut planned = append_guess(record, role, name, &digits, feedback, true);
    planned.patch.warnings = Some(record.warnings.incremented(role));
    Some(planned)
}

/// Check and plan setting the secret owned by `role`.
pub fn plan_secret(
    record: &GameRecord,
    stage: Stage,
    role: Role,
    digits: &str,
) -> Result<RecordPatch, TurnError> {
    if !is_valid_code(digits) {
        return Err(TurnError::InvalidDigits);
    }
    if stage != Stage::Setup {
        return Err(TurnError::WrongStage(stage));
    }
    if record.secret(role).is_some() {
        return Err(TurnError::SecretAlreadySet);
    }
    Ok(RecordPatch::secret(role, digits))
}

fn append_guess(
    record: &GameRecord,
    role: Role,
    name: &str,
    digits: &str,
    feedback: Feedback,
    auto: bool,
) -> PlannedGuess {
    let mut guesses = record.guesses.clone();
    guesses.push(Guess {
        player: name.to_string(),
        guess: digits.to_string(),
        feedback,
        auto,
    });

    let mut patch = RecordPatch {
        guesses: Some(guesses),
        ..RecordPatch::default()
    };
    if feedback.is_win() {
        patch.winner = Some(name.to_string());
    } else {
        patch.current_turn = Some(role.other());
    }

    PlannedGuess { feedback, patch }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{NewGameRecord, Warnings};

    fn playing() -> GameRecord {
        let mut record = NewGameRecord::hosted_by("ABC123", "alice").into_record("r1".into());
        record.apply(RecordPatch::join("bob"));
        record.apply(RecordPatch::secret(Role::Player1, "1357"));
        record.apply(RecordPatch::secret(Role::Player2, "2468"));
        record
    }

    #[test]
    fn non_winning_guess_appends_and_flips_turn() {
        let mut record = playing();
        let planned = plan_guess(&record, Stage::Playing, Role::Player1, "2460").unwrap();
        assert_eq!(
            planned.feedback,
            Feedback {
                total_matches: 3,
                correct_positions: 3
            }
        );

        record.apply(planned.patch);
        assert_eq!(record.current_turn, Role::Player2);
        assert_eq!(record.guesses.len(), 1);
        assert_eq!(record.guesses[0].player, "alice");
        assert!(!record.guesses[0].auto);
        assert!(record.winner.is_none());
    }

    #[test]
    fn winning_guess_sets_winner_and_keeps_turn() {
        let mut record = playing();
        let planned = plan_guess(&record, Stage::Playing, Role::Player1, "2468").unwrap();
        assert!(planned.feedback.is_win());

        record.apply(planned.patch);
        assert_eq!(record.winner.as_deref(), Some("alice"));
        assert_eq!(record.current_turn, Role::Player1);
    }

    #[test]
    fn turns_alternate_over_a_sequence_of_misses() {
        let mut record = playing();
        let mut previous = record.current_turn;
        for digits in ["0000", "9999", "1111", "8888", "1234", "5678"] {
            let role = record.current_turn;
            let planned = plan_guess(&record, Stage::Playing, role, digits).unwrap();
            record.apply(planned.patch);
            assert_ne!(record.current_turn, previous);
            previous = record.current_turn;
        }
        assert_eq!(record.guesses.len(), 6);
    }

    #[test]
    fn guess_preconditions_are_reported_in_order() {
        let record = playing();
        assert_eq!(
            plan_guess(&record, Stage::Playing, Role::Player1, "12a4"),
            Err(TurnError::InvalidDigits)
        );
        assert_eq!(
            plan_guess(&record, Stage::Playing, Role::Player2, "1234"),
            Err(TurnError::NotYourTurn)
        );
        assert_eq!(
            plan_guess(&record, Stage::Setup, Role::Player1, "1234"),
            Err(TurnError::WrongStage(Stage::Setup))
        );

        let mut missing_secret = playing();
        missing_secret.secret_player2 = None;
        assert_eq!(
            plan_guess(&missing_secret, Stage::Playing, Role::Player1, "1234"),
            Err(TurnError::OpponentNotReady)
        );

        let mut finished = playing();
        finished.winner = Some("bob".into());
        assert_eq!(
            plan_guess(&finished, Stage::Finished, Role::Player1, "1234"),
            Err(TurnError::GameFinished)
        );
    }

    #[test]
    fn timeout_appends_auto_guess_and_warns_the_idle_seat() {
        let mut record = playing();
        record.apply(plan_guess(&record, Stage::Playing, Role::Player1, "0000").unwrap().patch);
        let expected = TurnKey::of(&record);

        let planned = plan_timeout(&record, expected, &FixedGuess("1350".into())).unwrap();
        record.apply(planned.patch);

        assert_eq!(record.guesses.len(), 2);
        let auto = &record.guesses[1];
        assert!(auto.auto);
        assert_eq!(auto.player, "bob");
        assert_eq!(auto.feedback.correct_positions, 3);
        assert_eq!(
            record.warnings,
            Warnings {
                player1: 0,
                player2: 1
            }
        );
        assert_eq!(record.current_turn, Role::Player1);
    }

    #[test]
    fn stale_timeout_is_skipped() {
        let mut record = playing();
        let armed = TurnKey::of(&record);
        record.apply(plan_guess(&record, Stage::Playing, Role::Player1, "0000").unwrap().patch);

        assert!(plan_timeout(&record, armed, &RandomGuess).is_none());
    }

    #[test]
    fn timeout_without_opponent_secret_does_nothing() {
        let mut record = playing();
        record.secret_player2 = None;
        assert!(plan_timeout(&record, TurnKey::of(&record), &RandomGuess).is_none());
    }

    #[test]
    fn auto_guess_matching_the_secret_wins() {
        let mut record = playing();
        let planned =
            plan_timeout(&record, TurnKey::of(&record), &FixedGuess("2468".into())).unwrap();
        record.apply(planned.patch);
        assert_eq!(record.winner.as_deref(), Some("alice"));
        assert_eq!(record.current_turn, Role::Player1);
        assert_eq!(record.warnings.player1, 1);
    }

    #[test]
    fn random_guesses_are_four_digits() {
        for _ in 0..100 {
            let digits = RandomGuess.next_guess();
            assert!(is_valid_code(&digits), "{digits}");
            assert!(!digits.starts_with('0'));
        }
    }

    #[test]
    fn secret_is_write_once_and_only_in_setup() {
        let mut record = NewGameRecord::hosted_by("ABC123", "alice").into_record("r1".into());
        record.apply(RecordPatch::join("bob"));

        let patch = plan_secret(&record, Stage::Setup, Role::Player2, "2468").unwrap();
        record.apply(patch);
        assert_eq!(
            plan_secret(&record, Stage::Setup, Role::Player2, "1111"),
            Err(TurnError::SecretAlreadySet)
        );
        assert_eq!(
            plan_secret(&record, Stage::Lobby, Role::Player1, "1111"),
            Err(TurnError::WrongStage(Stage::Lobby))
        );
        assert_eq!(
            plan_secret(&record, Stage::Setup, Role::Player1, "111"),
            Err(TurnError::InvalidDigits)
        );
    }
}
