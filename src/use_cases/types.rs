// Use-case level inputs/outputs for session orchestrators and the lobby.

use crate::domain::{
    DuelError, FinalScore, GuessReceipt, HintReveal, PlayerId, RehydratedState, Round, SessionId,
};
use tokio::sync::oneshot;

pub type Reply<T> = oneshot::Sender<Result<T, DuelError>>;

/// Commands serialized through a session's orchestrator.
#[derive(Debug)]
pub enum SessionCommand {
    UseHint {
        player_id: PlayerId,
        round: u32,
        reply: Reply<HintReveal>,
    },
    SubmitGuess {
        player_id: PlayerId,
        round: u32,
        guess: String,
        hints_used: usize,
        time_left: f64,
        reply: Reply<GuessReceipt>,
    },
    Rehydrate {
        player_id: PlayerId,
        reply: Reply<RehydratedState>,
    },
    Snapshot {
        reply: oneshot::Sender<SessionSnapshot>,
    },
}

/// Events every participant of a session observes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Timer {
        round: u32,
        time_left: u64,
    },
    ScoreUpdate {
        player_id: PlayerId,
        total_score: f64,
    },
    GameOver {
        final_scores: Vec<FinalScore>,
        winner: Option<PlayerId>,
    },
}

/// Coarse lifecycle of a session, watched by archive and victory trackers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionPhase {
    Active {
        round: u32,
    },
    Finished {
        final_scores: Vec<FinalScore>,
        winner: Option<PlayerId>,
    },
}

/// Point-in-time, read-only view of a session's fixed content.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub started_at_ms: u64,
    pub time_unit_ms: u64,
    pub round_duration: u64,
    pub round_count: u32,
    pub participants: Vec<PlayerId>,
    pub rounds: Vec<Round>,
}

/// Public presence data for one online player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSummary {
    pub player_id: PlayerId,
    pub display_name: String,
    pub guest: bool,
    pub victories: u32,
}

/// Identity a client announces when it registers.
#[derive(Debug, Clone)]
pub struct PlayerProfile {
    pub player_id: PlayerId,
    pub display_name: String,
    pub guest: bool,
    pub client_id: String,
}

/// Events pushed to one online player outside of any session.
#[derive(Debug, Clone, PartialEq)]
pub enum LobbyEvent {
    OnlinePlayers(Vec<PlayerSummary>),
    InviteReceived {
        invitation_id: String,
        from: PlayerSummary,
    },
    InviteRejected {
        invitation_id: String,
        by: PlayerId,
    },
    InviteExpired {
        invitation_id: String,
        target: PlayerId,
    },
    StartDuel {
        session_id: SessionId,
        opponent: PlayerId,
    },
}
