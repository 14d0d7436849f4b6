use std::{env, path::PathBuf, time::Duration};

// Runtime/server constants (not duel rules).

pub const COMMAND_CHANNEL_CAPACITY: usize = 256;
pub const EVENT_BROADCAST_CAPACITY: usize = 128;
// Upper bound on how often an orchestrator samples the clock.
pub const MAX_TICK_INTERVAL: Duration = Duration::from_millis(100);

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

pub fn http_port() -> u16 {
    env::var("DUEL_SERVER_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3004)
}

pub fn time_unit_ms() -> u64 {
    env_u64("DUEL_TIME_UNIT_MS", 1000).max(1)
}

pub fn round_duration() -> u64 {
    env_u64("DUEL_ROUND_DURATION", 25).max(1)
}

pub fn invite_timeout() -> Duration {
    Duration::from_millis(env_u64("DUEL_INVITE_TIMEOUT_MS", 30_000))
}

pub fn session_retention() -> Duration {
    Duration::from_millis(env_u64("DUEL_SESSION_RETENTION_MS", 60_000))
}

pub fn catalog_path() -> Option<PathBuf> {
    env::var("DUEL_CATALOG_PATH")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

/// Effective server settings; tests build these directly with short timings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub time_unit_ms: u64,
    pub round_duration: u64,
    pub invite_timeout: Duration,
    pub session_retention: Duration,
    // Built-in flag set when unset.
    pub catalog_path: Option<PathBuf>,
}

impl ServerSettings {
    pub fn from_env() -> Self {
        Self {
            time_unit_ms: time_unit_ms(),
            round_duration: round_duration(),
            invite_timeout: invite_timeout(),
            session_retention: session_retention(),
            catalog_path: catalog_path(),
        }
    }

    // Sample several times per unit so timer frames land close to the change.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis((self.time_unit_ms / 4).max(1)).min(MAX_TICK_INTERVAL)
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            time_unit_ms: 1000,
            round_duration: 25,
            invite_timeout: Duration::from_secs(30),
            session_retention: Duration::from_secs(60),
            catalog_path: None,
        }
    }
}
