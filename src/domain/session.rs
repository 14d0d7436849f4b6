// Duel session aggregate: one clock, a fixed round sequence and the two
// players' ledgers. Only the session orchestrator holds a mutable reference.

use std::collections::HashMap;

use tracing::debug;

use crate::domain::clock::{ClockSample, RoundClock};
use crate::domain::entities::{FinalScore, Item, PlayerId, Round, SessionId, winner_of};
use crate::domain::errors::DuelError;
use crate::domain::hints::{hint_seed, reveal_hint};
use crate::domain::ledger::PlayerSessionState;

/// State change produced when the orchestrator applies the clock.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    RoundBoundary { from: u32, to: u32 },
    Finished { final_scores: Vec<FinalScore> },
}

/// A hint handed out to a player.
#[derive(Debug, Clone, PartialEq)]
pub struct HintReveal {
    pub round: u32,
    pub hint: String,
    pub hints_used: usize,
}

/// Outcome of a scored guess.
#[derive(Debug, Clone, PartialEq)]
pub struct GuessReceipt {
    pub round: u32,
    pub round_score: f64,
    pub total_score: f64,
    pub hints_used: usize,
}

/// A player's view of the session, rebuilt from server state on (re)join.
#[derive(Debug, Clone, PartialEq)]
pub struct RehydratedState {
    pub round_index: u32,
    pub time_left: u64,
    pub revealed_hints: Vec<String>,
    pub total_score: f64,
    pub submitted_rounds: Vec<u32>,
    /// Running totals of both participants, in participant order.
    pub scores: Vec<FinalScore>,
    pub finished: bool,
    /// Set only once finished; `None` on a tie.
    pub winner: Option<PlayerId>,
}

#[derive(Debug)]
pub struct DuelSession {
    id: SessionId,
    clock: RoundClock,
    rounds: Vec<Round>,
    participants: [PlayerId; 2],
    seed: u64,
    players: HashMap<PlayerId, PlayerSessionState>,
    // Last round whose boundary the orchestrator has applied.
    applied_round: u32,
    finished: bool,
}

impl DuelSession {
    /// Builds a session; the clock's round count follows the drawn items.
    pub fn new(
        id: SessionId,
        participants: [PlayerId; 2],
        items: Vec<Item>,
        started_at_ms: u64,
        unit_ms: u64,
        round_duration: u64,
        seed: u64,
    ) -> Self {
        let round_count = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let rounds = items
            .into_iter()
            .zip(0u32..)
            .map(|(item, index)| Round { index, item })
            .collect();
        let players = participants
            .iter()
            .map(|player| (player.clone(), PlayerSessionState::default()))
            .collect();

        Self {
            id,
            clock: RoundClock::new(started_at_ms, unit_ms, round_duration, round_count),
            rounds,
            participants,
            seed,
            players,
            applied_round: 0,
            finished: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn clock(&self) -> &RoundClock {
        &self.clock
    }

    pub fn rounds(&self) -> &[Round] {
        &self.rounds
    }

    pub fn participants(&self) -> &[PlayerId; 2] {
        &self.participants
    }

    pub fn is_participant(&self, player_id: &str) -> bool {
        self.players.contains_key(player_id)
    }

    pub fn applied_round(&self) -> u32 {
        self.applied_round
    }

    pub fn player(&self, player_id: &str) -> Option<&PlayerSessionState> {
        self.players.get(player_id)
    }

    pub fn sample(&self, now_ms: u64) -> ClockSample {
        self.clock.sample(now_ms)
    }

    /// Totals in participant order.
    pub fn final_scores(&self) -> Vec<FinalScore> {
        self.participants
            .iter()
            .map(|player_id| FinalScore {
                player_id: player_id.clone(),
                score: self
                    .players
                    .get(player_id)
                    .map_or(0.0, PlayerSessionState::total_score),
            })
            .collect()
    }

    /// Applies every round boundary due at `now_ms`. `Finished` is produced
    /// at most once over the session's life.
    pub fn advance(&mut self, now_ms: u64) -> Vec<Transition> {
        if self.finished {
            return Vec::new();
        }

        let sample = self.clock.sample(now_ms);
        let mut transitions = Vec::new();
        while self.applied_round < sample.round_index {
            transitions.push(Transition::RoundBoundary {
                from: self.applied_round,
                to: self.applied_round + 1,
            });
            self.applied_round += 1;
        }

        if sample.finished {
            self.finished = true;
            transitions.push(Transition::Finished {
                final_scores: self.final_scores(),
            });
        }

        transitions
    }

    // Commands are only valid for the round the orchestrator currently has open.
    fn ensure_current(&self, round: u32) -> Result<(), DuelError> {
        if self.finished || round != self.applied_round {
            return Err(DuelError::StaleRound);
        }
        Ok(())
    }

    pub fn request_hint(&mut self, player_id: &str, round: u32) -> Result<HintReveal, DuelError> {
        self.ensure_current(round)?;
        let seed_base = self.seed;
        let pool = self
            .rounds
            .get(round as usize)
            .map(|r| r.item.hints.as_slice())
            .ok_or(DuelError::StaleRound)?;
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(DuelError::NotParticipant)?;

        let state = player.round_mut(round);
        let slot = state.revealed().len();
        let hint = reveal_hint(state, pool, hint_seed(seed_base, player_id, round, slot))?;

        Ok(HintReveal {
            round,
            hint,
            hints_used: slot + 1,
        })
    }

    /// Scores a guess. The hint count and remaining time the client reports
    /// are reconciled against server state: the revealed count is used as is,
    /// and the remaining time never exceeds what the server clock allows.
    pub fn submit_guess(
        &mut self,
        player_id: &str,
        round: u32,
        guess: &str,
        reported_hints_used: usize,
        reported_time_left: f64,
        now_ms: u64,
    ) -> Result<GuessReceipt, DuelError> {
        self.ensure_current(round)?;
        let server_time_left = self.clock.sample(now_ms).time_left as f64;
        let round_duration = self.clock.round_duration();
        let player = self
            .players
            .get_mut(player_id)
            .ok_or(DuelError::NotParticipant)?;

        let hints_used = player.hints_revealed(round);
        if hints_used != reported_hints_used {
            debug!(
                player_id,
                round,
                reported_hints_used,
                hints_used,
                "client hint count differs from server"
            );
        }
        let time_left = if reported_time_left.is_finite() {
            reported_time_left.clamp(0.0, server_time_left)
        } else {
            server_time_left
        };

        let submission =
            player.submit_guess(round, guess, hints_used, time_left, round_duration)?;

        Ok(GuessReceipt {
            round,
            round_score: submission.score,
            total_score: player.total_score(),
            hints_used,
        })
    }

    /// Read-only reconstruction of a player's view at `now_ms`.
    pub fn rehydrate(&self, player_id: &str, now_ms: u64) -> Result<RehydratedState, DuelError> {
        let player = self
            .players
            .get(player_id)
            .ok_or(DuelError::NotParticipant)?;
        let sample = self.clock.sample(now_ms);
        let revealed_hints = player
            .round(sample.round_index)
            .map(|state| state.revealed().to_vec())
            .unwrap_or_default();

        let scores = self.final_scores();
        let winner = if sample.finished {
            winner_of(&scores)
        } else {
            None
        };

        Ok(RehydratedState {
            round_index: sample.round_index,
            time_left: sample.time_left,
            revealed_hints,
            total_score: player.total_score(),
            submitted_rounds: player.submitted_rounds(),
            scores,
            finished: sample.finished,
            winner,
        })
    }
}
