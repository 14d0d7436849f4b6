// Session registry for spawning and archiving duel orchestrators.

use crate::domain::ports::{Clock, ItemCatalog};
use crate::domain::{
    DuelError, DuelSession, GuessReceipt, HintReveal, PlayerId, RehydratedState, SessionId,
};
use crate::use_cases::orchestrator::session_task;
use crate::use_cases::{SessionCommand, SessionEvent, SessionPhase, SessionSnapshot};
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, RwLock, broadcast, mpsc, oneshot, watch};
use tracing::{info, warn};
use uuid::Uuid;

/// Shared configuration for spawning session orchestrators.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Capacity for inbound session commands.
    pub command_channel_capacity: usize,
    /// Capacity for broadcast session events.
    pub event_broadcast_capacity: usize,
    /// How often the orchestrator samples the clock.
    pub tick_interval: Duration,
    /// Length of one clock time unit in milliseconds.
    pub time_unit_ms: u64,
    /// Round length in time units.
    pub round_duration: u64,
    /// Rounds per session.
    pub round_count: u32,
    /// How long a finished session stays rehydratable before it is archived.
    pub retention: Duration,
}

/// Called once for every new session, before any player is told about it.
pub type SessionHook = Arc<dyn Fn(&SessionHandle) + Send + Sync>;

/// Per-session channels shared with connections.
#[derive(Clone)]
pub struct SessionHandle {
    /// Identifier clients use to target this session.
    pub session_id: Arc<str>,
    /// Sender for commands into the session orchestrator.
    pub command_tx: mpsc::Sender<SessionCommand>,
    /// Broadcast sender for raw session events.
    pub events_tx: broadcast::Sender<SessionEvent>,
    /// Broadcast sender for serialized session events.
    pub event_bytes_tx: broadcast::Sender<Utf8Bytes>,
    /// Watch sender holding the latest serialized timer frame.
    pub latest_timer_tx: watch::Sender<Utf8Bytes>,
    /// Watch sender for the session lifecycle.
    pub phase_tx: watch::Sender<SessionPhase>,
    /// The two players of the duel.
    pub participants: Arc<[PlayerId; 2]>,
    shutdown: Arc<Notify>,
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle")
            .field("session_id", &self.session_id)
            .field("participants", &self.participants)
            .finish()
    }
}

impl SessionHandle {
    pub fn is_participant(&self, player_id: &str) -> bool {
        self.participants.iter().any(|p| p == player_id)
    }

    // Sends a command and waits for the orchestrator's answer. A closed
    // orchestrator means the session has been archived.
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, DuelError>>) -> SessionCommand,
    ) -> Result<T, DuelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.command_tx
            .send(build(reply_tx))
            .await
            .map_err(|_| DuelError::SessionNotFound)?;
        reply_rx.await.map_err(|_| DuelError::SessionNotFound)?
    }

    pub async fn use_hint(&self, player_id: &str, round: u32) -> Result<HintReveal, DuelError> {
        let player_id = player_id.to_string();
        self.request(|reply| SessionCommand::UseHint {
            player_id,
            round,
            reply,
        })
        .await
    }

    pub async fn submit_guess(
        &self,
        player_id: &str,
        round: u32,
        guess: String,
        hints_used: usize,
        time_left: f64,
    ) -> Result<GuessReceipt, DuelError> {
        let player_id = player_id.to_string();
        self.request(|reply| SessionCommand::SubmitGuess {
            player_id,
            round,
            guess,
            hints_used,
            time_left,
            reply,
        })
        .await
    }

    pub async fn rehydrate(&self, player_id: &str) -> Result<RehydratedState, DuelError> {
        let player_id = player_id.to_string();
        self.request(|reply| SessionCommand::Rehydrate { player_id, reply })
            .await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, DuelError> {
        let (reply, reply_rx) = oneshot::channel();
        self.command_tx
            .send(SessionCommand::Snapshot { reply })
            .await
            .map_err(|_| DuelError::SessionNotFound)?;
        reply_rx.await.map_err(|_| DuelError::SessionNotFound)
    }
}

/// Thread-safe registry for active sessions.
pub struct SessionRegistry {
    /// Global settings applied to newly created sessions.
    settings: SessionSettings,
    clock: Arc<dyn Clock>,
    catalog: Arc<dyn ItemCatalog>,
    on_created: SessionHook,
    /// Map of session id to active handle.
    sessions: RwLock<HashMap<SessionId, SessionHandle>>,
}

impl SessionRegistry {
    /// Creates a new registry with the provided settings.
    pub fn new(
        settings: SessionSettings,
        clock: Arc<dyn Clock>,
        catalog: Arc<dyn ItemCatalog>,
        on_created: SessionHook,
    ) -> Self {
        Self {
            settings,
            clock,
            catalog,
            on_created,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Creates a new session starting now and spawns its orchestrator.
    pub async fn create_session(
        self: &Arc<Self>,
        participants: [PlayerId; 2],
    ) -> Result<SessionHandle, DuelError> {
        let seed: u64 = rand::random();
        let round_count = self.settings.round_count as usize;
        let items = self
            .catalog
            .draw(round_count, seed)
            .await
            .map_err(|error| {
                warn!(%error, "catalog draw failed");
                DuelError::CatalogUnavailable
            })?;
        if items.len() != round_count {
            warn!(drawn = items.len(), round_count, "catalog returned too few items");
            return Err(DuelError::CatalogUnavailable);
        }

        let session_id = Uuid::new_v4().to_string();
        // The start instant is fixed here and never changes.
        let started_at_ms = self.clock.now_millis();
        let session = DuelSession::new(
            session_id.clone(),
            participants.clone(),
            items,
            started_at_ms,
            self.settings.time_unit_ms,
            self.settings.round_duration,
            seed,
        );

        // Channel wiring for the session orchestrator.
        let (command_tx, command_rx) =
            mpsc::channel::<SessionCommand>(self.settings.command_channel_capacity);
        let (events_tx, _events_rx) =
            broadcast::channel::<SessionEvent>(self.settings.event_broadcast_capacity);
        let (event_bytes_tx, _event_bytes_rx) =
            broadcast::channel::<Utf8Bytes>(self.settings.event_broadcast_capacity);
        let (latest_timer_tx, _latest_timer_rx) = watch::channel::<Utf8Bytes>(Utf8Bytes::from(""));
        let (phase_tx, _phase_rx) = watch::channel(SessionPhase::Active { round: 0 });
        let shutdown = Arc::new(Notify::new());

        let handle = SessionHandle {
            session_id: Arc::from(session_id.as_str()),
            command_tx,
            events_tx: events_tx.clone(),
            event_bytes_tx,
            latest_timer_tx,
            phase_tx: phase_tx.clone(),
            participants: Arc::new(participants),
            shutdown: shutdown.clone(),
        };

        // Serializers subscribe before the orchestrator emits its first tick.
        (self.on_created)(&handle);

        // Spawn the authoritative loop for this session.
        tokio::spawn(session_task(
            session,
            command_rx,
            events_tx,
            phase_tx,
            self.clock.clone(),
            self.settings.tick_interval,
            shutdown,
        ));

        self.sessions
            .write()
            .await
            .insert(session_id.clone(), handle.clone());
        self.clone().spawn_archive_watcher(handle.clone());

        info!(
            %session_id,
            player_a = %handle.participants[0],
            player_b = %handle.participants[1],
            started_at_ms,
            "session created"
        );
        Ok(handle)
    }

    /// Returns a session handle for the provided id, if it still exists.
    pub async fn get_session(&self, session_id: &str) -> Option<SessionHandle> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    /// Removes a session and stops its orchestrator.
    pub async fn archive_session(&self, session_id: &str) {
        let removed = self.sessions.write().await.remove(session_id);
        if let Some(handle) = removed {
            handle.shutdown.notify_one();
            info!(session_id, "session archived");
        }
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Archives the session once it has finished and the retention window
    /// for late rehydration has passed.
    fn spawn_archive_watcher(self: Arc<Self>, handle: SessionHandle) {
        let mut phase_rx = handle.phase_tx.subscribe();
        tokio::spawn(async move {
            loop {
                let finished =
                    matches!(*phase_rx.borrow_and_update(), SessionPhase::Finished { .. });
                if finished {
                    break;
                }
                if phase_rx.changed().await.is_err() {
                    break;
                }
            }
            tokio::time::sleep(self.settings.retention).await;
            self.archive_session(&handle.session_id).await;
        });
    }
}
