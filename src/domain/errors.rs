use std::fmt;

// Domain-level errors for duel commands. Every variant is a rejection of a
// single command; none of them end the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuelError {
    QuotaExceeded,
    HintPoolExhausted,
    AlreadySubmitted,
    EmptyGuess,
    StaleRound,
    SessionNotFound,
    TargetOffline,
    NotParticipant,
    InvitationNotFound,
    InvalidTarget,
    NotRegistered,
    CatalogUnavailable,
    MalformedRequest,
}

impl DuelError {
    // Stable machine-readable code sent to clients.
    pub fn code(self) -> &'static str {
        match self {
            DuelError::QuotaExceeded => "quota_exceeded",
            DuelError::HintPoolExhausted => "hint_pool_exhausted",
            DuelError::AlreadySubmitted => "already_submitted",
            DuelError::EmptyGuess => "empty_guess",
            DuelError::StaleRound => "stale_round",
            DuelError::SessionNotFound => "session_not_found",
            DuelError::TargetOffline => "target_offline",
            DuelError::NotParticipant => "not_participant",
            DuelError::InvitationNotFound => "invitation_not_found",
            DuelError::InvalidTarget => "invalid_target",
            DuelError::NotRegistered => "not_registered",
            DuelError::CatalogUnavailable => "catalog_unavailable",
            DuelError::MalformedRequest => "malformed_request",
        }
    }
}

impl fmt::Display for DuelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = match self {
            DuelError::QuotaExceeded => "hint quota exceeded for this round",
            DuelError::HintPoolExhausted => "no unrevealed hints remain for this round",
            DuelError::AlreadySubmitted => "a guess was already submitted for this round",
            DuelError::EmptyGuess => "guess must not be empty",
            DuelError::StaleRound => "round is no longer current",
            DuelError::SessionNotFound => "session not found",
            DuelError::TargetOffline => "player is not online",
            DuelError::NotParticipant => "player is not part of this session",
            DuelError::InvitationNotFound => "invitation not found",
            DuelError::InvalidTarget => "cannot invite yourself",
            DuelError::NotRegistered => "register before sending commands",
            DuelError::CatalogUnavailable => "no items available to start a duel",
            DuelError::MalformedRequest => "message could not be parsed",
        };
        f.write_str(message)
    }
}

impl std::error::Error for DuelError {}
