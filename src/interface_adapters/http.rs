// Shared HTTP error envelope and the status each domain error maps to.

use crate::domain::DuelError;
use axum::{Json, http::StatusCode};

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    // Human-readable error string for consistent JSON error responses.
    pub error: String,
}

pub fn error_response(err: DuelError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match err {
        DuelError::SessionNotFound | DuelError::InvitationNotFound => StatusCode::NOT_FOUND,
        DuelError::NotParticipant | DuelError::NotRegistered => StatusCode::FORBIDDEN,
        DuelError::CatalogUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        DuelError::MalformedRequest => StatusCode::BAD_REQUEST,
        _ => StatusCode::CONFLICT,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
