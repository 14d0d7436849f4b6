use crate::domain::ports::Clock;
use crate::use_cases::{Matchmaker, SessionRegistry};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

#[derive(Clone)]
pub struct AppState {
    // Presence and invitations; also the entry point for starting sessions.
    pub matchmaker: Arc<Matchmaker>,
    // Running session orchestrators keyed by session id.
    pub sessions: Arc<SessionRegistry>,
}

// Wall-clock adapter; the server is the only authority for `now`.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
}
