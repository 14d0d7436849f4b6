// Hint dispenser: bounded, non-repeating, seeded hint selection.
//
// The choice for a (session, player, round, slot) is drawn from an rng seeded
// with those four values and then stored in the player's round state, so a
// reconnecting client always sees the hints that were already picked.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hash::{DefaultHasher, Hash, Hasher};

use crate::domain::entities::HINT_QUOTA;
use crate::domain::errors::DuelError;
use crate::domain::ledger::PlayerRoundState;

/// Seed for one hint slot of one player in one round.
pub fn hint_seed(session_seed: u64, player_id: &str, round: u32, slot: usize) -> u64 {
    let mut hasher = DefaultHasher::new();
    session_seed.hash(&mut hasher);
    player_id.hash(&mut hasher);
    round.hash(&mut hasher);
    slot.hash(&mut hasher);
    hasher.finish()
}

/// Hints from the pool not yet revealed, in pool order, without duplicates.
pub fn unrevealed<'a>(pool: &'a [String], revealed: &[String]) -> Vec<&'a String> {
    let mut available: Vec<&String> = Vec::with_capacity(pool.len());
    for hint in pool {
        if !revealed.contains(hint) && !available.contains(&hint) {
            available.push(hint);
        }
    }
    available
}

/// Reveals the next hint for a round, or fails without touching the state.
pub fn reveal_hint(
    state: &mut PlayerRoundState,
    pool: &[String],
    seed: u64,
) -> Result<String, DuelError> {
    if state.revealed.len() >= HINT_QUOTA {
        return Err(DuelError::QuotaExceeded);
    }
    if state.is_submitted() {
        return Err(DuelError::AlreadySubmitted);
    }

    let available = unrevealed(pool, &state.revealed);
    if available.is_empty() {
        return Err(DuelError::HintPoolExhausted);
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let pick = available[rng.random_range(0..available.len())].clone();
    state.revealed.push(pick.clone());
    Ok(pick)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(hints: &[&str]) -> Vec<String> {
        hints.iter().map(|h| h.to_string()).collect()
    }

    #[test]
    fn when_hints_are_requested_then_each_is_new_until_quota() {
        let pool = pool(&["capital", "population", "last letter", "length", "continent"]);
        let mut state = PlayerRoundState::default();

        for slot in 0..HINT_QUOTA {
            let seed = hint_seed(7, "alice", 0, slot);
            reveal_hint(&mut state, &pool, seed).expect("expected hint within quota");
        }

        let mut seen = state.revealed().to_vec();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), HINT_QUOTA);
        assert_eq!(
            reveal_hint(&mut state, &pool, hint_seed(7, "alice", 0, 3)),
            Err(DuelError::QuotaExceeded)
        );
    }

    #[test]
    fn when_pool_is_smaller_than_quota_then_returns_pool_exhausted() {
        let pool = pool(&["capital", "capital", "length"]);
        let mut state = PlayerRoundState::default();

        assert!(reveal_hint(&mut state, &pool, 1).is_ok());
        assert!(reveal_hint(&mut state, &pool, 2).is_ok());
        assert_eq!(
            reveal_hint(&mut state, &pool, 3),
            Err(DuelError::HintPoolExhausted)
        );
        assert_eq!(state.revealed().len(), 2);
    }

    #[test]
    fn when_round_is_submitted_then_hints_are_refused() {
        let pool = pool(&["capital", "length"]);
        let mut state = PlayerRoundState::default();
        state.submission = Some(crate::domain::ledger::Submission {
            guess: "x".to_string(),
            hints_used: 0,
            time_left: 10.0,
            score: 600.0,
        });

        assert_eq!(
            reveal_hint(&mut state, &pool, 1),
            Err(DuelError::AlreadySubmitted)
        );
    }

    #[test]
    fn when_same_slot_is_replayed_then_same_hint_is_chosen() {
        let pool = pool(&["a", "b", "c", "d", "e", "f"]);
        let seed = hint_seed(99, "bob", 2, 0);

        let mut first = PlayerRoundState::default();
        let mut second = PlayerRoundState::default();

        assert_eq!(
            reveal_hint(&mut first, &pool, seed),
            reveal_hint(&mut second, &pool, seed)
        );
    }

    #[test]
    fn when_seed_inputs_differ_then_seed_differs() {
        let base = hint_seed(1, "alice", 0, 0);
        assert_ne!(base, hint_seed(1, "alice", 0, 1));
        assert_ne!(base, hint_seed(1, "alice", 1, 0));
        assert_ne!(base, hint_seed(1, "bob", 0, 0));
        assert_ne!(base, hint_seed(2, "alice", 0, 0));
    }
}
