//! Mastermind-style scoring of a guess against a secret.

use crate::dao::models::{CODE_LENGTH, Feedback};

/// Whether `value` is exactly [`CODE_LENGTH`] ASCII digits.
pub fn is_valid_code(value: &str) -> bool {
    value.len() == CODE_LENGTH && value.bytes().all(|b| b.is_ascii_digit())
}

/// Score `guess` against `secret`.
///
/// Exact-position matches are counted first and consume both slots; the
/// remaining guess digits then claim the leftmost unused secret slot holding the
/// same digit, so repeated digits are never counted more often than they occur
/// in the secret. Malformed input scores `{0, 0}`.
pub fn score(guess: &str, secret: &str) -> Feedback {
    if guess.len() != CODE_LENGTH || secret.len() != CODE_LENGTH {
        return Feedback::default();
    }

    let guess = guess.as_bytes();
    let secret = secret.as_bytes();
    let mut guess_used = [false; CODE_LENGTH];
    let mut secret_used = [false; CODE_LENGTH];

    // First pass: exact positions
    let mut correct_positions = 0u8;
    for i in 0..CODE_LENGTH {
        if guess[i] == secret[i] {
            correct_positions += 1;
            guess_used[i] = true;
            secret_used[i] = true;
        }
    }

    // Second pass: right digit, wrong place
    let mut misplaced = 0u8;
    for (i, digit) in guess.iter().enumerate() {
        if guess_used[i] {
            continue;
        }
        let slot = (0..CODE_LENGTH).find(|&j| !secret_used[j] && secret[j] == *digit);
        if let Some(j) = slot {
            secret_used[j] = true;
            misplaced += 1;
        }
    }

    Feedback {
        total_matches: correct_positions + misplaced,
        correct_positions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fb(total_matches: u8, correct_positions: u8) -> Feedback {
        Feedback {
            total_matches,
            correct_positions,
        }
    }

    #[test]
    fn identical_codes_win() {
        let result = score("1234", "1234");
        assert_eq!(result, fb(4, 4));
        assert!(result.is_win());
    }

    #[test]
    fn reversed_code_matches_every_digit_out_of_place() {
        assert_eq!(score("1234", "4321"), fb(4, 0));
    }

    #[test]
    fn repeated_guess_digits_are_not_over_counted() {
        assert_eq!(score("1122", "1234"), fb(2, 1));
        assert_eq!(score("1123", "1234"), fb(3, 1));
        assert_eq!(score("1111", "1234"), fb(1, 1));
    }

    #[test]
    fn repeated_secret_digits_each_match_once() {
        assert_eq!(score("1234", "1122"), fb(2, 1));
        assert_eq!(score("2211", "1122"), fb(4, 0));
        assert_eq!(score("1212", "1122"), fb(4, 2));
    }

    #[test]
    fn disjoint_codes_score_nothing() {
        assert_eq!(score("5678", "1234"), fb(0, 0));
    }

    #[test]
    fn malformed_input_scores_zero() {
        assert_eq!(score("123", "1234"), fb(0, 0));
        assert_eq!(score("1234", ""), fb(0, 0));
        assert_eq!(score("12345", "12345"), fb(0, 0));
    }

    #[test]
    fn code_validation() {
        assert!(is_valid_code("0042"));
        assert!(!is_valid_code("42"));
        assert!(!is_valid_code("12a4"));
        assert!(!is_valid_code("١٢٣٤"));
    }
}
