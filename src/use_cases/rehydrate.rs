use crate::domain::{DuelError, RehydratedState};
use crate::use_cases::registry::SessionRegistry;

// Rehydrate use case: rebuilds a (re)joining player's view purely from the
// orchestrator's state. Never mutates the session.
pub struct RehydrateUseCase<'a> {
    pub sessions: &'a SessionRegistry,
}

impl RehydrateUseCase<'_> {
    pub async fn execute(
        &self,
        session_id: &str,
        player_id: &str,
    ) -> Result<RehydratedState, DuelError> {
        let handle = self
            .sessions
            .get_session(session_id)
            .await
            .ok_or(DuelError::SessionNotFound)?;
        handle.rehydrate(player_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::test_support::{ManualClock, test_registry};
    use std::sync::Arc;

    #[tokio::test]
    async fn when_session_does_not_exist_then_returns_session_not_found() {
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = test_registry(clock);
        let use_case = RehydrateUseCase {
            sessions: &registry,
        };

        let result = use_case.execute("missing", "alice").await;

        assert_eq!(result, Err(DuelError::SessionNotFound));
    }

    #[tokio::test]
    async fn when_player_reconnects_mid_round_then_view_matches_connected_observer() {
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = test_registry(clock.clone());
        let handle = registry
            .create_session(["alice".to_string(), "bob".to_string()])
            .await
            .expect("expected session to start");

        // Alice plays round 0, then drops during round 1 after one hint.
        handle
            .submit_guess("alice", 0, "France".to_string(), 0, 25.0)
            .await
            .expect("expected guess to be scored");
        clock.advance_units(26);
        handle
            .use_hint("alice", 1)
            .await
            .expect("expected hint in round 1");
        clock.advance_units(4);

        let use_case = RehydrateUseCase {
            sessions: &registry,
        };
        let view = use_case
            .execute(&handle.session_id, "alice")
            .await
            .expect("expected rehydrate to succeed");

        assert_eq!(view.round_index, 1);
        assert_eq!(view.time_left, 20);
        assert_eq!(view.revealed_hints.len(), 1);
        assert_eq!(view.submitted_rounds, vec![0]);
        assert_eq!(view.total_score, 1500.0);

        // Calling again changes nothing.
        let again = use_case.execute(&handle.session_id, "alice").await.unwrap();
        assert_eq!(view, again);

        // The opponent's view carries Alice's running total too.
        let bob = use_case.execute(&handle.session_id, "bob").await.unwrap();
        assert_eq!(bob.total_score, 0.0);
        assert_eq!(bob.scores[0].player_id, "alice");
        assert_eq!(bob.scores[0].score, 1500.0);
        assert_eq!(bob.winner, None);
    }

    #[tokio::test]
    async fn when_session_is_archived_then_returns_session_not_found() {
        let clock = Arc::new(ManualClock::new(1_000));
        let registry = test_registry(clock);
        let handle = registry
            .create_session(["alice".to_string(), "bob".to_string()])
            .await
            .unwrap();
        registry.archive_session(&handle.session_id).await;

        let use_case = RehydrateUseCase {
            sessions: &registry,
        };
        assert_eq!(
            use_case.execute(&handle.session_id, "bob").await,
            Err(DuelError::SessionNotFound)
        );
    }
}
