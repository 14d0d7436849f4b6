// Domain-level identities and the fixed content a duel is played over.

use serde::Deserialize;

/// Canonical player identity announced on registration.
pub type PlayerId = String;

/// Session identifier handed to both players when an invitation is accepted.
pub type SessionId = String;

/// Number of rounds in every duel session.
pub const ROUND_COUNT: u32 = 5;

/// Maximum hints a player may reveal per round.
pub const HINT_QUOTA: usize = 3;

/// An unknown item a round asks players to guess.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Item {
    pub id: String,
    pub image_path: String,
    // Opaque, semantically distinct hint strings.
    #[serde(default)]
    pub hints: Vec<String>,
}

/// One timed challenge unit; its item never changes after session creation.
#[derive(Debug, Clone)]
pub struct Round {
    pub index: u32,
    pub item: Item,
}

/// Final total for one participant, emitted with game over.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalScore {
    pub player_id: PlayerId,
    pub score: f64,
}

/// Picks the strictly highest scorer; a tie has no winner.
pub fn winner_of(scores: &[FinalScore]) -> Option<PlayerId> {
    let best = scores
        .iter()
        .max_by(|a, b| a.score.total_cmp(&b.score))?;
    let tied = scores
        .iter()
        .filter(|s| s.score.total_cmp(&best.score).is_eq())
        .count();
    (tied == 1).then(|| best.player_id.clone())
}
