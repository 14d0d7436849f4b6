// Submission ledger: per-round player state and the running total.

use std::collections::BTreeMap;

use crate::domain::errors::DuelError;
use crate::domain::scoring::round_score;

/// A terminal, scored guess for one round.
#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    pub guess: String,
    pub hints_used: usize,
    pub time_left: f64,
    pub score: f64,
}

/// State of one player in one round. Created lazily on the first hint or
/// guess; frozen once a guess is submitted.
#[derive(Debug, Clone, Default)]
pub struct PlayerRoundState {
    pub(crate) revealed: Vec<String>,
    pub(crate) submission: Option<Submission>,
}

impl PlayerRoundState {
    pub fn revealed(&self) -> &[String] {
        &self.revealed
    }

    pub fn submission(&self) -> Option<&Submission> {
        self.submission.as_ref()
    }

    pub fn is_submitted(&self) -> bool {
        self.submission.is_some()
    }
}

/// State of one player across the whole session.
#[derive(Debug, Clone, Default)]
pub struct PlayerSessionState {
    total_score: f64,
    rounds: BTreeMap<u32, PlayerRoundState>,
}

impl PlayerSessionState {
    pub fn total_score(&self) -> f64 {
        self.total_score
    }

    pub fn round(&self, index: u32) -> Option<&PlayerRoundState> {
        self.rounds.get(&index)
    }

    pub(crate) fn round_mut(&mut self, index: u32) -> &mut PlayerRoundState {
        self.rounds.entry(index).or_default()
    }

    /// Rounds holding a terminal submission, in ascending order.
    pub fn submitted_rounds(&self) -> Vec<u32> {
        self.rounds
            .iter()
            .filter(|(_, state)| state.is_submitted())
            .map(|(index, _)| *index)
            .collect()
    }

    /// Hints revealed so far in a round (zero if the round was never touched).
    pub fn hints_revealed(&self, index: u32) -> usize {
        self.round(index).map_or(0, |state| state.revealed.len())
    }

    /// Scores a guess at most once per round and adds it to the total.
    pub fn submit_guess(
        &mut self,
        index: u32,
        guess: &str,
        hints_used: usize,
        time_left: f64,
        round_duration: u64,
    ) -> Result<Submission, DuelError> {
        let round = self.rounds.entry(index).or_default();
        if round.is_submitted() {
            return Err(DuelError::AlreadySubmitted);
        }

        let guess = guess.trim();
        if guess.is_empty() {
            return Err(DuelError::EmptyGuess);
        }

        let score = round_score(hints_used, time_left, round_duration);
        let submission = Submission {
            guess: guess.to_string(),
            hints_used,
            time_left,
            score,
        };
        round.submission = Some(submission.clone());
        self.total_score += score;

        Ok(submission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn when_guess_is_submitted_then_round_is_recorded_and_total_grows() {
        let mut state = PlayerSessionState::default();

        let submission = state
            .submit_guess(0, "  France ", 0, 25.0, 25)
            .expect("expected first guess to be scored");

        assert_eq!(submission.guess, "France");
        assert_eq!(submission.score, 1500.0);
        assert_eq!(state.total_score(), 1500.0);
        assert_eq!(state.submitted_rounds(), vec![0]);
    }

    #[test]
    fn when_round_is_submitted_twice_then_second_is_rejected_without_rescoring() {
        let mut state = PlayerSessionState::default();
        state
            .submit_guess(1, "Chile", 1, 12.5, 25)
            .expect("expected first guess to be scored");

        let again = state.submit_guess(1, "Peru", 0, 25.0, 25);

        assert_eq!(again, Err(DuelError::AlreadySubmitted));
        assert_eq!(state.total_score(), 675.0);
    }

    #[test]
    fn when_guess_is_blank_then_returns_empty_guess_and_round_stays_open() {
        let mut state = PlayerSessionState::default();

        assert_eq!(
            state.submit_guess(2, "   ", 0, 20.0, 25),
            Err(DuelError::EmptyGuess)
        );
        assert!(state.submitted_rounds().is_empty());
        assert!(state.submit_guess(2, "Japan", 0, 20.0, 25).is_ok());
    }

    #[test]
    fn when_rounds_are_scored_then_total_is_their_sum() {
        let mut state = PlayerSessionState::default();
        state.submit_guess(0, "a", 0, 25.0, 25).unwrap();
        state.submit_guess(3, "b", 1, 12.5, 25).unwrap();
        state.submit_guess(4, "c", 3, 0.0, 25).unwrap();

        assert_eq!(state.total_score(), 2175.0);
        assert_eq!(state.submitted_rounds(), vec![0, 3, 4]);
    }
}
