pub mod matchmaker;
pub mod orchestrator;
pub mod registry;
pub mod rehydrate;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use matchmaker::Matchmaker;
pub use registry::{SessionHandle, SessionHook, SessionRegistry, SessionSettings};
pub use rehydrate::RehydrateUseCase;
pub use types::{
    LobbyEvent, PlayerProfile, PlayerSummary, Reply, SessionCommand, SessionEvent, SessionPhase,
    SessionSnapshot,
};
