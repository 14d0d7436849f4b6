// Wire protocol DTOs and conversions for public duel server messages.
// The HTTP snapshot DTO lives with the internal routes.

use crate::domain::{DuelError, FinalScore, GuessReceipt, HintReveal, RehydratedState};
use crate::use_cases::{LobbyEvent, PlayerSummary, SessionEvent};
use serde::{Deserialize, Serialize};

/// Messages the client sends to the server over the WebSocket.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    // Presence handshake; must be the first frame on a socket.
    Register(RegisterPayload),
    Invite {
        target: String,
    },
    AcceptInvite {
        inviter: String,
        #[serde(default)]
        invitation_id: Option<String>,
    },
    RejectInvite {
        inviter: String,
        #[serde(default)]
        invitation_id: Option<String>,
    },
    // Attach to a running session; answered with the authoritative state.
    JoinSession {
        session_id: String,
        #[serde(default)]
        client_id: String,
    },
    UseHint {
        session_id: String,
        round: u32,
    },
    SubmitGuess(SubmitGuessPayload),
}

impl ClientMessage {
    /// Command name used in rejections for a frame that failed to parse.
    /// Falls back to "unknown" when the frame carries no recognizable type.
    pub fn command_name_of(raw: &str) -> &'static str {
        let Ok(value) = serde_json::from_str::<serde_json::Value>(raw) else {
            return "unknown";
        };
        match value.get("type").and_then(serde_json::Value::as_str) {
            Some("Register") => "register",
            Some("Invite") => "invite",
            Some("AcceptInvite") => "accept_invite",
            Some("RejectInvite") => "reject_invite",
            Some("JoinSession") => "join_session",
            Some("UseHint") => "use_hint",
            Some("SubmitGuess") => "submit_guess",
            _ => "unknown",
        }
    }
}

/// Identity a client announces on connect.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterPayload {
    pub player_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub guest: bool,
    // Stable per-installation id, persisted by the client.
    #[serde(default)]
    pub client_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitGuessPayload {
    pub session_id: String,
    #[serde(default)]
    pub client_id: String,
    pub round: u32,
    pub guess: String,
    // Client-side view; the server reconciles both against its own state.
    #[serde(default)]
    pub hints_used: usize,
    // Required: a missing value must not silently score as zero time left.
    pub time_left: f64,
}

/// Messages the server sends to connected clients over the WebSocket.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    Registered {
        player_id: String,
    },
    OnlinePlayers(Vec<PlayerSummaryDto>),
    InviteSent {
        invitation_id: String,
        target: String,
    },
    InviteReceived {
        invitation_id: String,
        from: PlayerSummaryDto,
    },
    InviteRejected {
        invitation_id: String,
        by: String,
    },
    InviteExpired {
        invitation_id: String,
        target: String,
    },
    StartDuel {
        session_id: String,
        opponent: String,
    },
    // Redraw trigger; clients must not advance rounds on their own.
    Timer {
        session_id: String,
        round: u32,
        time_left: u64,
    },
    HintSelected(HintSelectedDto),
    GuessAccepted(GuessAcceptedDto),
    ScoreUpdate {
        session_id: String,
        player_id: String,
        total_score: f64,
    },
    GameOver(GameOverDto),
    RehydrateState(RehydrateStateDto),
    // Exactly one per refused command.
    CommandRejected {
        command: String,
        code: String,
        message: String,
    },
}

impl ServerMessage {
    pub fn rejected(command: &str, err: DuelError) -> Self {
        ServerMessage::CommandRejected {
            command: command.to_string(),
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }

    /// Wire form of an orchestrator event for the given session.
    pub fn session_event(session_id: &str, event: SessionEvent) -> Self {
        let session_id = session_id.to_string();
        match event {
            SessionEvent::Timer { round, time_left } => ServerMessage::Timer {
                session_id,
                round,
                time_left,
            },
            SessionEvent::ScoreUpdate {
                player_id,
                total_score,
            } => ServerMessage::ScoreUpdate {
                session_id,
                player_id,
                total_score,
            },
            SessionEvent::GameOver {
                final_scores,
                winner,
            } => ServerMessage::GameOver(GameOverDto {
                session_id,
                tie: winner.is_none(),
                winner,
                final_scores: final_scores.iter().map(FinalScoreDto::from).collect(),
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PlayerSummaryDto {
    pub player_id: String,
    pub display_name: String,
    pub guest: bool,
    pub victories: u32,
}

impl From<&PlayerSummary> for PlayerSummaryDto {
    fn from(summary: &PlayerSummary) -> Self {
        Self {
            player_id: summary.player_id.clone(),
            display_name: summary.display_name.clone(),
            guest: summary.guest,
            victories: summary.victories,
        }
    }
}

impl From<LobbyEvent> for ServerMessage {
    fn from(event: LobbyEvent) -> Self {
        match event {
            LobbyEvent::OnlinePlayers(players) => {
                ServerMessage::OnlinePlayers(players.iter().map(PlayerSummaryDto::from).collect())
            }
            LobbyEvent::InviteReceived {
                invitation_id,
                from,
            } => ServerMessage::InviteReceived {
                invitation_id,
                from: PlayerSummaryDto::from(&from),
            },
            LobbyEvent::InviteRejected { invitation_id, by } => {
                ServerMessage::InviteRejected { invitation_id, by }
            }
            LobbyEvent::InviteExpired {
                invitation_id,
                target,
            } => ServerMessage::InviteExpired {
                invitation_id,
                target,
            },
            LobbyEvent::StartDuel {
                session_id,
                opponent,
            } => ServerMessage::StartDuel {
                session_id,
                opponent,
            },
        }
    }
}

/// Hint reply; carries either the hint or the refusal code.
#[derive(Debug, Clone, Serialize)]
pub struct HintSelectedDto {
    pub session_id: String,
    pub round: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hints_used: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HintSelectedDto {
    pub fn revealed(session_id: &str, reveal: HintReveal) -> Self {
        Self {
            session_id: session_id.to_string(),
            round: reveal.round,
            hint: Some(reveal.hint),
            hints_used: Some(reveal.hints_used),
            error: None,
        }
    }

    pub fn refused(session_id: &str, round: u32, err: DuelError) -> Self {
        Self {
            session_id: session_id.to_string(),
            round,
            hint: None,
            hints_used: None,
            error: Some(err.code().to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GuessAcceptedDto {
    pub session_id: String,
    pub round: u32,
    pub round_score: f64,
    pub total_score: f64,
    pub hints_used: usize,
}

impl GuessAcceptedDto {
    pub fn new(session_id: &str, receipt: GuessReceipt) -> Self {
        Self {
            session_id: session_id.to_string(),
            round: receipt.round,
            round_score: receipt.round_score,
            total_score: receipt.total_score,
            hints_used: receipt.hints_used,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalScoreDto {
    pub player_id: String,
    pub score: f64,
}

impl From<&FinalScore> for FinalScoreDto {
    fn from(score: &FinalScore) -> Self {
        Self {
            player_id: score.player_id.clone(),
            score: score.score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GameOverDto {
    pub session_id: String,
    pub final_scores: Vec<FinalScoreDto>,
    pub winner: Option<String>,
    pub tie: bool,
}

/// Authoritative view pushed on (re)join; overwrites whatever the client holds.
#[derive(Debug, Clone, Serialize)]
pub struct RehydrateStateDto {
    pub session_id: String,
    pub round: u32,
    pub time_left: u64,
    pub revealed_hints: Vec<String>,
    pub total_score: f64,
    pub submitted_rounds: Vec<u32>,
    // Both players' totals, so a late joiner can render the opponent and the result.
    pub scores: Vec<FinalScoreDto>,
    pub finished: bool,
    pub winner: Option<String>,
}

impl RehydrateStateDto {
    pub fn new(session_id: &str, state: RehydratedState) -> Self {
        Self {
            session_id: session_id.to_string(),
            round: state.round_index,
            time_left: state.time_left,
            revealed_hints: state.revealed_hints,
            total_score: state.total_score,
            submitted_rounds: state.submitted_rounds,
            scores: state.scores.iter().map(FinalScoreDto::from).collect(),
            finished: state.finished,
            winner: state.winner,
        }
    }
}
