// Presence and the invite/accept handshake that starts a duel.

use crate::domain::{DuelError, PlayerId};
use crate::use_cases::registry::{SessionHandle, SessionRegistry};
use crate::use_cases::{LobbyEvent, PlayerProfile, PlayerSummary, SessionPhase};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

// An online player and the connection currently owning the slot.
struct OnlinePlayer {
    display_name: String,
    guest: bool,
    client_id: String,
    conn_token: u64,
    outbox: mpsc::Sender<LobbyEvent>,
    replaced: Arc<Notify>,
}

// Pending invitation for one ordered (from, to) pair.
#[derive(Debug, Clone)]
struct Invitation {
    invitation_id: String,
}

#[derive(Default)]
struct MatchmakerState {
    online: HashMap<PlayerId, OnlinePlayer>,
    // Stable per-installation client id to the player it registered as.
    clients: HashMap<String, PlayerId>,
    // In-memory duel victories; not persisted.
    victories: HashMap<PlayerId, u32>,
    // At most one outstanding invitation per ordered pair; last invite wins.
    invitations: HashMap<(PlayerId, PlayerId), Invitation>,
}

impl MatchmakerState {
    fn summary(&self, player_id: &str) -> Option<PlayerSummary> {
        self.online.get(player_id).map(|player| PlayerSummary {
            player_id: player_id.to_string(),
            display_name: player.display_name.clone(),
            guest: player.guest,
            victories: self.victories.get(player_id).copied().unwrap_or(0),
        })
    }

    fn online_players(&self) -> Vec<PlayerSummary> {
        let mut players: Vec<PlayerSummary> = self
            .online
            .keys()
            .filter_map(|player_id| self.summary(player_id))
            .collect();
        players.sort_by(|a, b| a.player_id.cmp(&b.player_id));
        players
    }

    // Drops a client id binding, but only while it still points at this player.
    fn forget_client(&mut self, client_id: &str, player_id: &str) {
        if self.clients.get(client_id).is_some_and(|owner| owner == player_id) {
            self.clients.remove(client_id);
        }
    }

    fn push(&self, player_id: &str, event: LobbyEvent) {
        let Some(player) = self.online.get(player_id) else {
            return;
        };
        // Outboxes are drained by the socket loop; a full outbox means the
        // client is not reading, so the event is dropped rather than blocking.
        if let Err(err) = player.outbox.try_send(event) {
            warn!(player_id, error = %err, "lobby event dropped");
        }
    }

    fn broadcast_online(&self) {
        let players = self.online_players();
        for player_id in self.online.keys() {
            self.push(player_id, LobbyEvent::OnlinePlayers(players.clone()));
        }
    }
}

/// Pairs online players through invitations and starts their sessions.
pub struct Matchmaker {
    state: Mutex<MatchmakerState>,
    sessions: Arc<SessionRegistry>,
    invite_timeout: Duration,
}

impl Matchmaker {
    pub fn new(sessions: Arc<SessionRegistry>, invite_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(MatchmakerState::default()),
            sessions,
            invite_timeout,
        }
    }

    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Marks the player online on this connection. A previous connection for
    /// the same player is told to shut down. Returns that signal for the new
    /// connection.
    pub async fn register(
        &self,
        profile: PlayerProfile,
        conn_token: u64,
        outbox: mpsc::Sender<LobbyEvent>,
    ) -> Arc<Notify> {
        let replaced = Arc::new(Notify::new());
        let mut state = self.state.lock().await;

        let previous = state.online.insert(
            profile.player_id.clone(),
            OnlinePlayer {
                display_name: profile.display_name.clone(),
                guest: profile.guest,
                client_id: profile.client_id.clone(),
                conn_token,
                outbox,
                replaced: replaced.clone(),
            },
        );
        if let Some(previous) = previous {
            if previous.conn_token != conn_token {
                previous.replaced.notify_one();
                info!(player_id = %profile.player_id, "presence moved to newer connection");
            }
            if previous.client_id != profile.client_id {
                state.forget_client(&previous.client_id, &profile.player_id);
            }
        }

        if !profile.client_id.is_empty() {
            state
                .clients
                .insert(profile.client_id.clone(), profile.player_id.clone());
        }
        state.broadcast_online();
        replaced
    }

    /// Goes offline only if this connection still owns the player's slot.
    pub async fn unregister_if_owner(&self, player_id: &str, conn_token: u64) {
        let mut state = self.state.lock().await;
        let owns = state
            .online
            .get(player_id)
            .is_some_and(|player| player.conn_token == conn_token);
        if !owns {
            return;
        }
        if let Some(player) = state.online.remove(player_id) {
            state.forget_client(&player.client_id, player_id);
        }
        state.broadcast_online();
    }

    /// Resolves a stable client id to the player that registered with it.
    pub async fn resolve_client(&self, client_id: &str) -> Option<PlayerId> {
        self.state.lock().await.clients.get(client_id).cloned()
    }

    pub async fn online_players(&self) -> Vec<PlayerSummary> {
        self.state.lock().await.online_players()
    }

    pub async fn victories(&self, player_id: &str) -> u32 {
        let state = self.state.lock().await;
        state.victories.get(player_id).copied().unwrap_or(0)
    }

    /// Delivers an invitation to an online player. A newer invite for the
    /// same pair supersedes the older one.
    pub async fn invite(self: &Arc<Self>, from: &str, to: &str) -> Result<String, DuelError> {
        if from == to {
            return Err(DuelError::InvalidTarget);
        }

        let invitation_id = Uuid::new_v4().to_string();
        {
            let mut state = self.state.lock().await;
            let Some(inviter) = state.summary(from) else {
                return Err(DuelError::NotRegistered);
            };
            if !state.online.contains_key(to) {
                return Err(DuelError::TargetOffline);
            }

            let superseded = state.invitations.insert(
                (from.to_string(), to.to_string()),
                Invitation {
                    invitation_id: invitation_id.clone(),
                },
            );
            if let Some(old) = superseded {
                debug!(from, to, superseded = %old.invitation_id, "invitation superseded");
            }

            state.push(
                to,
                LobbyEvent::InviteReceived {
                    invitation_id: invitation_id.clone(),
                    from: inviter,
                },
            );
        }
        info!(from, to, %invitation_id, "invitation sent");

        // Auto-discard when neither accepted nor rejected in time.
        let matchmaker = Arc::clone(self);
        let (from, to, id) = (from.to_string(), to.to_string(), invitation_id.clone());
        tokio::spawn(async move {
            tokio::time::sleep(matchmaker.invite_timeout).await;
            matchmaker.expire(&from, &to, &id).await;
        });

        Ok(invitation_id)
    }

    async fn expire(&self, from: &str, to: &str, invitation_id: &str) {
        let mut state = self.state.lock().await;
        let key = (from.to_string(), to.to_string());
        let is_current = state
            .invitations
            .get(&key)
            .is_some_and(|inv| inv.invitation_id == invitation_id);
        if !is_current {
            return;
        }

        state.invitations.remove(&key);
        state.push(
            from,
            LobbyEvent::InviteExpired {
                invitation_id: invitation_id.to_string(),
                target: to.to_string(),
            },
        );
        info!(from, to, invitation_id, "invitation expired");
    }

    // Removes and returns the current invitation for a pair. When the caller
    // names a specific handle it must be the current one.
    fn take_invitation(
        state: &mut MatchmakerState,
        inviter: &str,
        invitee: &str,
        invitation_id: Option<&str>,
    ) -> Result<Invitation, DuelError> {
        let key = (inviter.to_string(), invitee.to_string());
        let current = state
            .invitations
            .get(&key)
            .ok_or(DuelError::InvitationNotFound)?;
        if invitation_id.is_some_and(|id| id != current.invitation_id) {
            return Err(DuelError::InvitationNotFound);
        }
        state
            .invitations
            .remove(&key)
            .ok_or(DuelError::InvitationNotFound)
    }

    /// Accepts an invitation and starts a session for both players.
    pub async fn accept(
        self: &Arc<Self>,
        invitee: &str,
        inviter: &str,
        invitation_id: Option<&str>,
    ) -> Result<SessionHandle, DuelError> {
        let invitation = {
            let mut state = self.state.lock().await;
            if !state.online.contains_key(inviter) {
                // Leave the invitation to its timeout; the inviter may reconnect.
                return Err(DuelError::TargetOffline);
            }
            Self::take_invitation(&mut state, inviter, invitee, invitation_id)?
        };

        let handle = self
            .sessions
            .create_session([inviter.to_string(), invitee.to_string()])
            .await?;
        info!(
            inviter,
            invitee,
            invitation_id = %invitation.invitation_id,
            session_id = %handle.session_id,
            "invitation accepted"
        );

        {
            let state = self.state.lock().await;
            for (player, opponent) in [(inviter, invitee), (invitee, inviter)] {
                state.push(
                    player,
                    LobbyEvent::StartDuel {
                        session_id: handle.session_id.to_string(),
                        opponent: opponent.to_string(),
                    },
                );
            }
        }
        self.spawn_victory_tracker(&handle);

        Ok(handle)
    }

    /// Rejects an invitation; no session is created.
    pub async fn reject(
        &self,
        invitee: &str,
        inviter: &str,
        invitation_id: Option<&str>,
    ) -> Result<(), DuelError> {
        let mut state = self.state.lock().await;
        let invitation = Self::take_invitation(&mut state, inviter, invitee, invitation_id)?;
        state.push(
            inviter,
            LobbyEvent::InviteRejected {
                invitation_id: invitation.invitation_id.clone(),
                by: invitee.to_string(),
            },
        );
        info!(inviter, invitee, invitation_id = %invitation.invitation_id, "invitation rejected");
        Ok(())
    }

    // Credits the winner once the session reports its final scores.
    fn spawn_victory_tracker(self: &Arc<Self>, handle: &SessionHandle) {
        let matchmaker = Arc::clone(self);
        let mut phase_rx = handle.phase_tx.subscribe();
        tokio::spawn(async move {
            let winner = loop {
                let finished = match &*phase_rx.borrow_and_update() {
                    SessionPhase::Finished { winner, .. } => Some(winner.clone()),
                    SessionPhase::Active { .. } => None,
                };
                if let Some(winner) = finished {
                    break winner;
                }
                if phase_rx.changed().await.is_err() {
                    return;
                }
            };

            let Some(winner) = winner else {
                return;
            };
            let mut state = matchmaker.state.lock().await;
            *state.victories.entry(winner).or_insert(0) += 1;
            state.broadcast_online();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::use_cases::test_support::{ManualClock, test_registry};
    use tokio::time::timeout;

    fn matchmaker(clock: Arc<ManualClock>, invite_timeout: Duration) -> Arc<Matchmaker> {
        Arc::new(Matchmaker::new(test_registry(clock), invite_timeout))
    }

    async fn connect(
        matchmaker: &Matchmaker,
        player_id: &str,
        conn_token: u64,
    ) -> (mpsc::Receiver<LobbyEvent>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(32);
        let profile = PlayerProfile {
            player_id: player_id.to_string(),
            display_name: player_id.to_uppercase(),
            guest: false,
            client_id: format!("client-{player_id}"),
        };
        let replaced = matchmaker.register(profile, conn_token, tx).await;
        (rx, replaced)
    }

    // Waits for the first event matching `pred`, skipping the rest.
    async fn wait_for(
        rx: &mut mpsc::Receiver<LobbyEvent>,
        pred: impl Fn(&LobbyEvent) -> bool,
    ) -> LobbyEvent {
        timeout(Duration::from_secs(1), async {
            loop {
                let event = rx.recv().await.expect("outbox closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for lobby event")
    }

    #[tokio::test]
    async fn when_player_registers_then_everyone_gets_online_list() {
        let mm = matchmaker(Arc::new(ManualClock::new(0)), Duration::from_secs(30));
        let (mut alice_rx, _) = connect(&mm, "alice", 1).await;
        let (_bob_rx, _) = connect(&mm, "bob", 2).await;

        let event = wait_for(&mut alice_rx, |e| {
            matches!(e, LobbyEvent::OnlinePlayers(players) if players.len() == 2)
        })
        .await;

        let LobbyEvent::OnlinePlayers(players) = event else {
            unreachable!();
        };
        assert_eq!(players[0].player_id, "alice");
        assert_eq!(players[1].display_name, "BOB");
        assert_eq!(mm.resolve_client("client-bob").await.as_deref(), Some("bob"));
    }

    #[tokio::test]
    async fn when_invite_is_invalid_then_returns_matching_error() {
        let mm = matchmaker(Arc::new(ManualClock::new(0)), Duration::from_secs(30));
        let (_alice_rx, _) = connect(&mm, "alice", 1).await;

        assert_eq!(mm.invite("alice", "alice").await, Err(DuelError::InvalidTarget));
        assert_eq!(mm.invite("alice", "carol").await, Err(DuelError::TargetOffline));
        assert_eq!(mm.invite("zed", "alice").await, Err(DuelError::NotRegistered));
    }

    #[tokio::test]
    async fn when_invite_is_superseded_then_only_latest_can_be_accepted() {
        let mm = matchmaker(Arc::new(ManualClock::new(0)), Duration::from_secs(30));
        let (mut alice_rx, _) = connect(&mm, "alice", 1).await;
        let (mut bob_rx, _) = connect(&mm, "bob", 2).await;

        let first = mm.invite("alice", "bob").await.unwrap();
        let second = mm.invite("alice", "bob").await.unwrap();
        assert_ne!(first, second);

        assert_eq!(
            mm.accept("bob", "alice", Some(&first)).await.unwrap_err(),
            DuelError::InvitationNotFound
        );
        let handle = mm.accept("bob", "alice", Some(&second)).await.unwrap();
        assert_eq!(handle.participants.as_ref(), &["alice".to_string(), "bob".to_string()]);

        for (rx, opponent) in [(&mut alice_rx, "bob"), (&mut bob_rx, "alice")] {
            let event = wait_for(rx, |e| matches!(e, LobbyEvent::StartDuel { .. })).await;
            assert_eq!(
                event,
                LobbyEvent::StartDuel {
                    session_id: handle.session_id.to_string(),
                    opponent: opponent.to_string(),
                }
            );
        }

        // Accepting consumed the invitation.
        assert_eq!(
            mm.accept("bob", "alice", None).await.unwrap_err(),
            DuelError::InvitationNotFound
        );
    }

    #[tokio::test]
    async fn when_inviter_went_offline_then_accept_returns_target_offline() {
        let mm = matchmaker(Arc::new(ManualClock::new(0)), Duration::from_secs(30));
        let (_alice_rx, _) = connect(&mm, "alice", 1).await;
        let (_bob_rx, _) = connect(&mm, "bob", 2).await;
        mm.invite("alice", "bob").await.unwrap();

        mm.unregister_if_owner("alice", 1).await;

        assert_eq!(
            mm.accept("bob", "alice", None).await.unwrap_err(),
            DuelError::TargetOffline
        );
        assert_eq!(mm.sessions().session_count().await, 0);
    }

    #[tokio::test]
    async fn when_invite_is_rejected_then_inviter_is_told_and_no_session_starts() {
        let mm = matchmaker(Arc::new(ManualClock::new(0)), Duration::from_secs(30));
        let (mut alice_rx, _) = connect(&mm, "alice", 1).await;
        let (_bob_rx, _) = connect(&mm, "bob", 2).await;
        let invitation_id = mm.invite("alice", "bob").await.unwrap();

        mm.reject("bob", "alice", Some(&invitation_id)).await.unwrap();

        let event = wait_for(&mut alice_rx, |e| matches!(e, LobbyEvent::InviteRejected { .. })).await;
        assert_eq!(
            event,
            LobbyEvent::InviteRejected {
                invitation_id,
                by: "bob".to_string()
            }
        );
        assert_eq!(mm.sessions().session_count().await, 0);
        assert_eq!(
            mm.accept("bob", "alice", None).await.unwrap_err(),
            DuelError::InvitationNotFound
        );
    }

    #[tokio::test]
    async fn when_invite_times_out_then_it_is_discarded() {
        let mm = matchmaker(Arc::new(ManualClock::new(0)), Duration::from_millis(30));
        let (mut alice_rx, _) = connect(&mm, "alice", 1).await;
        let (_bob_rx, _) = connect(&mm, "bob", 2).await;
        let invitation_id = mm.invite("alice", "bob").await.unwrap();

        let event = wait_for(&mut alice_rx, |e| matches!(e, LobbyEvent::InviteExpired { .. })).await;

        assert_eq!(
            event,
            LobbyEvent::InviteExpired {
                invitation_id,
                target: "bob".to_string()
            }
        );
        assert_eq!(
            mm.accept("bob", "alice", None).await.unwrap_err(),
            DuelError::InvitationNotFound
        );
    }

    #[tokio::test]
    async fn when_player_connects_again_then_old_connection_is_replaced() {
        let mm = matchmaker(Arc::new(ManualClock::new(0)), Duration::from_secs(30));
        let (_old_rx, old_replaced) = connect(&mm, "alice", 1).await;
        let (_new_rx, _) = connect(&mm, "alice", 2).await;

        timeout(Duration::from_secs(1), old_replaced.notified())
            .await
            .expect("expected old connection to be told to close");

        // The stale connection's cleanup must not take the player offline.
        mm.unregister_if_owner("alice", 1).await;
        assert_eq!(mm.online_players().await.len(), 1);

        mm.unregister_if_owner("alice", 2).await;
        assert!(mm.online_players().await.is_empty());
    }

    #[tokio::test]
    async fn when_player_goes_offline_then_client_binding_is_released() {
        let mm = matchmaker(Arc::new(ManualClock::new(0)), Duration::from_secs(30));
        let (_rx, _) = connect(&mm, "alice", 1).await;
        assert_eq!(mm.resolve_client("client-alice").await.as_deref(), Some("alice"));

        // A newer device replaces the old binding instead of adding to it.
        let (tx, _new_rx) = mpsc::channel(8);
        let profile = PlayerProfile {
            player_id: "alice".to_string(),
            display_name: "ALICE".to_string(),
            guest: false,
            client_id: "client-alice-laptop".to_string(),
        };
        mm.register(profile, 2, tx).await;
        assert_eq!(mm.resolve_client("client-alice").await, None);
        assert_eq!(
            mm.resolve_client("client-alice-laptop").await.as_deref(),
            Some("alice")
        );

        mm.unregister_if_owner("alice", 2).await;
        assert_eq!(mm.resolve_client("client-alice-laptop").await, None);
    }

    #[tokio::test]
    async fn when_duel_ends_with_a_winner_then_victory_is_credited() {
        let clock = Arc::new(ManualClock::new(0));
        let mm = matchmaker(clock.clone(), Duration::from_secs(30));
        let (_alice_rx, _) = connect(&mm, "alice", 1).await;
        let (_bob_rx, _) = connect(&mm, "bob", 2).await;
        mm.invite("alice", "bob").await.unwrap();
        let handle = mm.accept("bob", "alice", None).await.unwrap();

        handle
            .submit_guess("alice", 0, "France".to_string(), 0, 25.0)
            .await
            .unwrap();
        clock.advance_units(125);

        timeout(Duration::from_secs(1), async {
            while mm.victories("alice").await == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("expected alice to be credited");
        assert_eq!(mm.victories("bob").await, 0);
    }
}
