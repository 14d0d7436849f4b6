use crate::domain::DuelError;
use crate::interface_adapters::http::{ErrorResponse, error_response};
use crate::interface_adapters::protocol::PlayerSummaryDto;
use crate::interface_adapters::state::AppState;
use crate::use_cases::SessionSnapshot;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use std::sync::Arc;

/// Read-only snapshot of a session's fixed content.
#[derive(Debug, serde::Serialize)]
pub struct SessionSnapshotDto {
    pub session_id: String,
    pub started_at_ms: u64,
    pub time_unit_ms: u64,
    pub round_duration: u64,
    pub round_count: u32,
    pub participants: Vec<String>,
    pub rounds: Vec<RoundDto>,
}

#[derive(Debug, serde::Serialize)]
pub struct RoundDto {
    pub index: u32,
    pub image_path: String,
    pub hints: Vec<String>,
}

impl From<SessionSnapshot> for SessionSnapshotDto {
    fn from(snapshot: SessionSnapshot) -> Self {
        Self {
            session_id: snapshot.session_id,
            started_at_ms: snapshot.started_at_ms,
            time_unit_ms: snapshot.time_unit_ms,
            round_duration: snapshot.round_duration,
            round_count: snapshot.round_count,
            participants: snapshot.participants,
            rounds: snapshot
                .rounds
                .into_iter()
                .map(|round| RoundDto {
                    index: round.index,
                    image_path: round.item.image_path,
                    hints: round.item.hints,
                })
                .collect(),
        }
    }
}

pub async fn session_snapshot_handler(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionSnapshotDto>, (StatusCode, Json<ErrorResponse>)> {
    let handle = state
        .sessions
        .get_session(&session_id)
        .await
        .ok_or_else(|| error_response(DuelError::SessionNotFound))?;

    // The orchestrator may have been archived between lookup and request.
    let snapshot = handle.snapshot().await.map_err(error_response)?;
    Ok(Json(snapshot.into()))
}

pub async fn online_players_handler(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<PlayerSummaryDto>> {
    let players = state.matchmaker.online_players().await;
    Json(players.iter().map(PlayerSummaryDto::from).collect())
}
