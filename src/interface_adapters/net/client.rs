use crate::domain::{DuelError, GuessReceipt, HintReveal};
use crate::interface_adapters::protocol::{
    ClientMessage, GuessAcceptedDto, HintSelectedDto, RegisterPayload, RehydrateStateDto,
    ServerMessage, SubmitGuessPayload,
};
use crate::interface_adapters::state::AppState;
use crate::interface_adapters::utils::ids::next_conn_id;
use crate::use_cases::{
    LobbyEvent, Matchmaker, PlayerProfile, RehydrateUseCase, SessionEvent, SessionHandle,
    SessionRegistry,
};

use axum::{
    Error,
    extract::{
        State,
        ws::{CloseFrame, Message, Utf8Bytes, WebSocket, WebSocketUpgrade, close_code},
    },
    response::IntoResponse,
};
use futures::SinkExt;
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::time::timeout;
use tracing::{Instrument, Span, debug, error, info, info_span, warn};

#[derive(Debug)]
enum NetError {
    // Categorizes connection lifecycle failures so callers can decide policy.
    #[allow(dead_code)]
    Ws(axum::Error),
    #[allow(dead_code)]
    Serialization(serde_json::Error),
    RegisterRequired,
    RegisterTimeout,
    InvalidIdentity,
    ClosedBeforeRegister,
}

const LOG_THROTTLE: Duration = Duration::from_secs(2);
const MAX_INVALID_JSON: u32 = 10;
const REGISTER_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);
const LOBBY_OUTBOX_CAPACITY: usize = 64;
const MAX_PLAYER_ID_LEN: usize = 64;
const MAX_DISPLAY_NAME_LEN: usize = 32;
const MAX_CLIENT_ID_LEN: usize = 128;
const MAX_GUESS_CHARS: usize = 60;

pub async fn session_event_serializer(
    session_id: Arc<str>,
    mut events_rx: broadcast::Receiver<SessionEvent>,
    event_bytes_tx: broadcast::Sender<Utf8Bytes>,
    latest_timer_tx: watch::Sender<Utf8Bytes>,
) {
    // Serialize each session event once and broadcast the shared bytes.
    loop {
        match events_rx.recv().await {
            Ok(event) => {
                let is_timer = matches!(event, SessionEvent::Timer { .. });
                let msg = ServerMessage::session_event(&session_id, event);
                let txt = match serde_json::to_string(&msg) {
                    Ok(txt) => txt,
                    Err(e) => {
                        error!(%session_id, error = ?e, "failed to serialize session event");
                        continue;
                    }
                };

                let bytes = Utf8Bytes::from(txt);
                if is_timer {
                    // Latest timer frame for lag recovery and late joiners.
                    let _ = latest_timer_tx.send(bytes.clone());
                }
                let _ = event_bytes_tx.send(bytes);
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(%session_id, missed = n, "session serializer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                debug!(%session_id, "session events closed; serializer exiting");
                break;
            }
        }
    }
}

/// Session creation hook: one serializer per session, shared by every socket.
pub fn spawn_session_serializer(session: &SessionHandle) {
    tokio::spawn(session_event_serializer(
        session.session_id.clone(),
        session.events_tx.subscribe(),
        session.event_bytes_tx.clone(),
        session.latest_timer_tx.clone(),
    ));
}

impl From<axum::Error> for NetError {
    fn from(e: axum::Error) -> Self {
        NetError::Ws(e)
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    // Separate connection id for correlating logs before/after a player_id exists.
    let conn_id = next_conn_id();
    let span = info_span!("conn", conn_id, player_id = tracing::field::Empty);
    serve_connection(socket, state, conn_id, span.clone())
        .instrument(span)
        .await;
}

async fn serve_connection(mut socket: WebSocket, state: Arc<AppState>, conn_id: u64, span: Span) {
    let mut ctx = match bootstrap_connection(&mut socket, &state, conn_id).await {
        Ok(ctx) => ctx,
        Err(NetError::ClosedBeforeRegister) => {
            info!("client disconnected before register handshake");
            return;
        }
        Err(e) => {
            // Handshake failures have already sent their close frame.
            warn!(error = ?e, "failed to bootstrap connection");
            return;
        }
    };

    span.record("player_id", ctx.player_id.as_str());
    info!(player_id = %ctx.player_id, "client connected");

    if let Err(e) = run_client_loop(&mut socket, &mut ctx).await {
        warn!(error = ?e, "client loop exited with error");
    }
}

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<usize, NetError> {
    let txt = serde_json::to_string(msg).map_err(NetError::Serialization)?;
    let bytes = txt.len();
    socket
        .send(Message::Text(txt.into()))
        .await
        .map_err(NetError::Ws)?;
    Ok(bytes)
}

async fn send_close_with_reason(
    socket: &mut WebSocket,
    code: u16,
    reason: &'static str,
) -> Result<(), NetError> {
    socket
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
        .map_err(NetError::Ws)?;
    socket.close().await.map_err(NetError::Ws)
}

// A session this socket receives events for.
struct AttachedSession {
    handle: SessionHandle,
    bytes_rx: broadcast::Receiver<Utf8Bytes>,
    latest_timer_rx: watch::Receiver<Utf8Bytes>,
}

struct ConnCtx {
    pub player_id: String,
    // Token used to verify ownership of the player's presence slot.
    pub conn_token: u64,
    pub matchmaker: Arc<Matchmaker>,
    pub sessions: Arc<SessionRegistry>,
    pub lobby_rx: mpsc::Receiver<LobbyEvent>,
    // Fired when a newer connection registers the same player.
    pub replaced: Arc<Notify>,
    pub session: Option<AttachedSession>,
    // Count lag recovery resyncs sent to this client.
    pub lag_recovery_count: u64,
    pub rejected_commands: u64,

    pub msgs_in: u64,
    pub msgs_out: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,

    pub invalid_json: u32,

    pub last_session_lag_log: Instant,
    pub last_invalid_input_log: Instant,
    pub last_rejection_log: Instant,

    pub close_frame: Option<CloseFrame>,
}

impl ConnCtx {
    async fn send(&mut self, socket: &mut WebSocket, msg: &ServerMessage) -> LoopControl {
        match send_message(socket, msg).await {
            Ok(bytes) => {
                self.msgs_out += 1;
                self.bytes_out += bytes as u64;
                LoopControl::Continue
            }
            Err(err) => {
                // Disconnect follows immediately.
                warn!(error = ?err, "failed to send message");
                LoopControl::Disconnect
            }
        }
    }

    async fn forward(&mut self, socket: &mut WebSocket, frame: Utf8Bytes) -> LoopControl {
        let bytes_len = frame.len();
        match socket.send(Message::Text(frame)).await.map_err(NetError::Ws) {
            Ok(()) => {
                self.msgs_out += 1;
                self.bytes_out += bytes_len as u64;
                LoopControl::Continue
            }
            Err(err) => {
                warn!(error = ?err, "failed to forward session event");
                LoopControl::Disconnect
            }
        }
    }

    async fn reject(&mut self, socket: &mut WebSocket, command: &str, err: DuelError) -> LoopControl {
        self.note_rejection(command, err);
        self.send(socket, &ServerMessage::rejected(command, err))
            .await
    }

    fn note_rejection(&mut self, command: &str, err: DuelError) {
        self.rejected_commands += 1;
        if should_log(&mut self.last_rejection_log) {
            warn!(player_id = %self.player_id, command, code = err.code(), "command rejected");
        }
    }

    async fn send_latest_timer(&mut self, socket: &mut WebSocket) -> LoopControl {
        let latest = match &self.session {
            Some(attached) => attached.latest_timer_rx.borrow().clone(),
            None => return LoopControl::Continue,
        };
        if latest.is_empty() {
            return LoopControl::Continue;
        }
        self.forward(socket, latest).await
    }
}

async fn bootstrap_connection(
    socket: &mut WebSocket,
    state: &AppState,
    conn_id: u64,
) -> Result<ConnCtx, NetError> {
    // Nothing but a Register frame is accepted until the player is known.
    let (payload, bytes_in) =
        match timeout(REGISTER_HANDSHAKE_TIMEOUT, read_register_handshake(socket)).await {
            Ok(result) => result?,
            Err(_) => {
                let _ = send_close_with_reason(socket, close_code::POLICY, "register timeout").await;
                return Err(NetError::RegisterTimeout);
            }
        };

    let Some(profile) = profile_from(payload) else {
        let _ = send_close_with_reason(socket, close_code::POLICY, "invalid player id").await;
        return Err(NetError::InvalidIdentity);
    };
    let player_id = profile.player_id.clone();

    // The connection id doubles as the presence ownership token.
    let (outbox_tx, lobby_rx) = mpsc::channel(LOBBY_OUTBOX_CAPACITY);
    let replaced = state.matchmaker.register(profile, conn_id, outbox_tx).await;

    let registered = ServerMessage::Registered {
        player_id: player_id.clone(),
    };
    let bytes_out = match send_message(socket, &registered).await {
        Ok(bytes) => bytes as u64,
        Err(err) => {
            // Free the presence slot if the handshake fails this late.
            state
                .matchmaker
                .unregister_if_owner(&player_id, conn_id)
                .await;
            return Err(err);
        }
    };

    let now = Instant::now() - LOG_THROTTLE;
    Ok(ConnCtx {
        player_id,
        conn_token: conn_id,
        matchmaker: state.matchmaker.clone(),
        sessions: state.sessions.clone(),
        lobby_rx,
        replaced,
        session: None,
        lag_recovery_count: 0,
        rejected_commands: 0,

        msgs_in: 1,
        msgs_out: 1,
        bytes_in,
        bytes_out,

        invalid_json: 0,

        last_session_lag_log: now,
        last_invalid_input_log: now,
        last_rejection_log: now,

        close_frame: None,
    })
}

async fn read_register_handshake(
    socket: &mut WebSocket,
) -> Result<(RegisterPayload, u64), NetError> {
    loop {
        let Some(incoming) = socket.recv().await else {
            return Err(NetError::ClosedBeforeRegister);
        };

        match incoming.map_err(NetError::Ws)? {
            Message::Text(text) => {
                let bytes_in = text.len() as u64;
                return match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Register(payload)) => Ok((payload, bytes_in)),
                    Ok(_) => {
                        let _ = send_close_with_reason(socket, close_code::POLICY, "register required")
                            .await;
                        Err(NetError::RegisterRequired)
                    }
                    Err(_) => {
                        let _ = send_close_with_reason(
                            socket,
                            close_code::POLICY,
                            "invalid register payload",
                        )
                        .await;
                        Err(NetError::RegisterRequired)
                    }
                };
            }
            Message::Binary(_) => {
                let _ = send_close_with_reason(
                    socket,
                    close_code::UNSUPPORTED,
                    "binary messages not supported",
                )
                .await;
                return Err(NetError::RegisterRequired);
            }
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => return Err(NetError::ClosedBeforeRegister),
        }
    }
}

// Normalizes announced identity. Only the player id is mandatory.
fn profile_from(payload: RegisterPayload) -> Option<PlayerProfile> {
    let player_id = payload.player_id.trim();
    if player_id.is_empty() || player_id.len() > MAX_PLAYER_ID_LEN {
        return None;
    }

    let display_name = payload.display_name.trim();
    let display_name = if display_name.is_empty() || display_name.len() > MAX_DISPLAY_NAME_LEN {
        player_id
    } else {
        display_name
    };

    let client_id = payload.client_id.trim();
    let client_id = if client_id.len() > MAX_CLIENT_ID_LEN {
        ""
    } else {
        client_id
    };

    Some(PlayerProfile {
        player_id: player_id.to_string(),
        display_name: display_name.to_string(),
        guest: payload.guest,
        client_id: client_id.to_string(),
    })
}

enum LoopControl {
    Continue,
    Disconnect,
}

fn should_log(last: &mut Instant) -> bool {
    if last.elapsed() >= LOG_THROTTLE {
        *last = Instant::now();
        true
    } else {
        false
    }
}

fn replaced_frame() -> CloseFrame {
    CloseFrame {
        code: close_code::POLICY,
        reason: "connection replaced".into(),
    }
}

async fn recv_session_frame(
    session: &mut Option<AttachedSession>,
) -> Result<Utf8Bytes, broadcast::error::RecvError> {
    match session {
        Some(attached) => attached.bytes_rx.recv().await,
        None => futures::future::pending().await,
    }
}

async fn run_client_loop(socket: &mut WebSocket, ctx: &mut ConnCtx) -> Result<(), NetError> {
    let mut fatal: Option<NetError> = None;

    loop {
        let control = tokio::select! {
            // Incoming Message from Client
            incoming = socket.recv() => {
                match handle_incoming_ws(socket, incoming, ctx).await {
                    Ok(control) => control,
                    Err(e) => {
                        fatal = Some(e);
                        LoopControl::Disconnect
                    }
                }
            }

            // Presence and invitation events for this player.
            event = ctx.lobby_rx.recv() => {
                match event {
                    Some(event) => ctx.send(socket, &ServerMessage::from(event)).await,
                    None => {
                        // The matchmaker dropped our outbox for a newer connection.
                        ctx.close_frame = Some(replaced_frame());
                        LoopControl::Disconnect
                    }
                }
            }

            // Outgoing session events, serialized once per session.
            frame = recv_session_frame(&mut ctx.session) => {
                forward_session_frame(socket, ctx, frame).await
            }

            // Connection replacement signal for duplicate player ids.
            _ = ctx.replaced.notified() => {
                ctx.close_frame = Some(replaced_frame());
                info!(player_id = %ctx.player_id, "connection replaced by newer session");
                LoopControl::Disconnect
            }
        };

        if let LoopControl::Disconnect = control {
            if let Some(frame) = ctx.close_frame.take() {
                let _ = socket.send(Message::Close(Some(frame))).await;
            }
            if let Err(err) = socket.close().await.map_err(NetError::Ws) {
                debug!(error = ?err, "socket close error");
            }
            break;
        }
    }

    disconnect_cleanup(ctx).await;

    if let Some(err) = fatal {
        Err(err)
    } else {
        Ok(())
    }
}

async fn forward_session_frame(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    frame: Result<Utf8Bytes, broadcast::error::RecvError>,
) -> LoopControl {
    match frame {
        Ok(bytes) => ctx.forward(socket, bytes).await,
        Err(broadcast::error::RecvError::Lagged(n)) => {
            if should_log(&mut ctx.last_session_lag_log) {
                warn!(missed = n, "session events lagged; resyncing");
            }
            // Missed frames may include score updates; resend the timer and
            // the authoritative state instead of replaying them.
            ctx.lag_recovery_count += 1;
            if let LoopControl::Disconnect = ctx.send_latest_timer(socket).await {
                return LoopControl::Disconnect;
            }
            let Some(handle) = ctx.session.as_ref().map(|s| s.handle.clone()) else {
                return LoopControl::Continue;
            };
            match handle.rehydrate(&ctx.player_id).await {
                Ok(state) => {
                    let msg = ServerMessage::RehydrateState(RehydrateStateDto::new(
                        &handle.session_id,
                        state,
                    ));
                    ctx.send(socket, &msg).await
                }
                Err(err) => {
                    debug!(error = %err, "resync skipped");
                    LoopControl::Continue
                }
            }
        }
        Err(broadcast::error::RecvError::Closed) => {
            debug!("session event stream closed; detaching");
            ctx.session = None;
            LoopControl::Continue
        }
    }
}

async fn handle_incoming_ws(
    socket: &mut WebSocket,
    incoming: Option<Result<Message, Error>>,
    ctx: &mut ConnCtx,
) -> Result<LoopControl, NetError> {
    match incoming {
        Some(Ok(msg)) => match msg {
            Message::Text(text) => {
                ctx.msgs_in += 1;
                ctx.bytes_in += text.len() as u64;

                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(command) => Ok(handle_command(socket, ctx, command).await),
                    Err(parse_err) => {
                        ctx.invalid_json += 1;
                        if should_log(&mut ctx.last_invalid_input_log) {
                            warn!(
                                player_id = %ctx.player_id,
                                bytes = text.len(),
                                error = %parse_err,
                                "failed to parse client message"
                            );
                        }

                        // Every frame gets an answer, even one that cannot be read.
                        let command = ClientMessage::command_name_of(&text);
                        if let LoopControl::Disconnect =
                            ctx.reject(socket, command, DuelError::MalformedRequest).await
                        {
                            return Ok(LoopControl::Disconnect);
                        }

                        if ctx.invalid_json > MAX_INVALID_JSON {
                            ctx.close_frame = Some(CloseFrame {
                                code: close_code::POLICY,
                                reason: "too many invalid messages".into(),
                            });
                            return Ok(LoopControl::Disconnect);
                        }

                        Ok(LoopControl::Continue)
                    }
                }
            }
            Message::Binary(_) => {
                ctx.close_frame = Some(CloseFrame {
                    code: close_code::UNSUPPORTED,
                    reason: "binary messages not supported".into(),
                });
                Ok(LoopControl::Disconnect)
            }
            Message::Ping(_) | Message::Pong(_) => Ok(LoopControl::Continue),
            Message::Close(_) => Ok(LoopControl::Disconnect),
        },
        Some(Err(e)) => {
            warn!(player_id = %ctx.player_id, error = %e, "websocket recv error");
            Ok(LoopControl::Disconnect)
        }
        None => {
            info!(player_id = %ctx.player_id, "websocket closed");
            Ok(LoopControl::Disconnect)
        }
    }
}

async fn handle_command(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    command: ClientMessage,
) -> LoopControl {
    match command {
        ClientMessage::Register(_) => {
            // Identity is fixed for the life of the socket; acknowledge again.
            let msg = ServerMessage::Registered {
                player_id: ctx.player_id.clone(),
            };
            ctx.send(socket, &msg).await
        }
        ClientMessage::Invite { target } => {
            let target = target.trim().to_string();
            let result = ctx.matchmaker.invite(&ctx.player_id, &target).await;
            match result {
                Ok(invitation_id) => {
                    let msg = ServerMessage::InviteSent {
                        invitation_id,
                        target,
                    };
                    ctx.send(socket, &msg).await
                }
                Err(err) => ctx.reject(socket, "invite", err).await,
            }
        }
        ClientMessage::AcceptInvite {
            inviter,
            invitation_id,
        } => {
            let result = ctx
                .matchmaker
                .accept(&ctx.player_id, &inviter, invitation_id.as_deref())
                .await;
            match result {
                // StartDuel reaches both players through their lobby outboxes.
                Ok(_) => LoopControl::Continue,
                Err(err) => ctx.reject(socket, "accept_invite", err).await,
            }
        }
        ClientMessage::RejectInvite {
            inviter,
            invitation_id,
        } => {
            let result = ctx
                .matchmaker
                .reject(&ctx.player_id, &inviter, invitation_id.as_deref())
                .await;
            match result {
                Ok(()) => LoopControl::Continue,
                Err(err) => ctx.reject(socket, "reject_invite", err).await,
            }
        }
        ClientMessage::JoinSession {
            session_id,
            client_id,
        } => join_session(socket, ctx, &session_id, &client_id).await,
        ClientMessage::UseHint { session_id, round } => {
            let dto = match try_use_hint(ctx, &session_id, round).await {
                Ok(reveal) => HintSelectedDto::revealed(&session_id, reveal),
                Err(err) => {
                    ctx.note_rejection("use_hint", err);
                    HintSelectedDto::refused(&session_id, round, err)
                }
            };
            ctx.send(socket, &ServerMessage::HintSelected(dto)).await
        }
        ClientMessage::SubmitGuess(payload) => {
            let session_id = payload.session_id.clone();
            match try_submit_guess(ctx, payload).await {
                Ok(receipt) => {
                    let msg = ServerMessage::GuessAccepted(GuessAcceptedDto::new(&session_id, receipt));
                    ctx.send(socket, &msg).await
                }
                Err(err) => ctx.reject(socket, "submit_guess", err).await,
            }
        }
    }
}

// A stable client id may only speak for the player it registered as.
async fn check_client_id(ctx: &ConnCtx, client_id: &str) -> Result<(), DuelError> {
    if client_id.is_empty() {
        return Ok(());
    }
    match ctx.matchmaker.resolve_client(client_id).await {
        Some(owner) if owner != ctx.player_id => Err(DuelError::NotParticipant),
        _ => Ok(()),
    }
}

async fn session_for(ctx: &ConnCtx, session_id: &str) -> Result<SessionHandle, DuelError> {
    if let Some(attached) = &ctx.session
        && attached.handle.session_id.as_ref() == session_id
    {
        return Ok(attached.handle.clone());
    }
    let handle = ctx
        .sessions
        .get_session(session_id)
        .await
        .ok_or(DuelError::SessionNotFound)?;
    if !handle.is_participant(&ctx.player_id) {
        return Err(DuelError::NotParticipant);
    }
    Ok(handle)
}

async fn try_use_hint(ctx: &ConnCtx, session_id: &str, round: u32) -> Result<HintReveal, DuelError> {
    let handle = session_for(ctx, session_id).await?;
    handle.use_hint(&ctx.player_id, round).await
}

async fn try_submit_guess(
    ctx: &ConnCtx,
    payload: SubmitGuessPayload,
) -> Result<GuessReceipt, DuelError> {
    check_client_id(ctx, &payload.client_id).await?;
    let handle = session_for(ctx, &payload.session_id).await?;
    let guess: String = payload.guess.chars().take(MAX_GUESS_CHARS).collect();
    handle
        .submit_guess(
            &ctx.player_id,
            payload.round,
            guess,
            payload.hints_used,
            payload.time_left,
        )
        .await
}

async fn join_session(
    socket: &mut WebSocket,
    ctx: &mut ConnCtx,
    session_id: &str,
    client_id: &str,
) -> LoopControl {
    if let Err(err) = check_client_id(ctx, client_id).await {
        return ctx.reject(socket, "join_session", err).await;
    }
    let handle = match session_for(ctx, session_id).await {
        Ok(handle) => handle,
        Err(err) => return ctx.reject(socket, "join_session", err).await,
    };

    // Subscribe before reading state so no event falls between the two.
    let bytes_rx = handle.event_bytes_tx.subscribe();
    let latest_timer_rx = handle.latest_timer_tx.subscribe();

    let rehydrate = RehydrateUseCase {
        sessions: &ctx.sessions,
    };
    let state = match rehydrate.execute(session_id, &ctx.player_id).await {
        Ok(state) => state,
        Err(err) => return ctx.reject(socket, "join_session", err).await,
    };

    info!(
        player_id = %ctx.player_id,
        session_id,
        round = state.round_index,
        finished = state.finished,
        "session joined"
    );
    ctx.session = Some(AttachedSession {
        handle,
        bytes_rx,
        latest_timer_rx,
    });

    let msg = ServerMessage::RehydrateState(RehydrateStateDto::new(session_id, state));
    if let LoopControl::Disconnect = ctx.send(socket, &msg).await {
        return LoopControl::Disconnect;
    }
    ctx.send_latest_timer(socket).await
}

async fn disconnect_cleanup(ctx: &ConnCtx) {
    // Presence stays with a newer connection if one took over.
    ctx.matchmaker
        .unregister_if_owner(&ctx.player_id, ctx.conn_token)
        .await;

    debug!(
        player_id = %ctx.player_id,
        msgs_in = ctx.msgs_in,
        msgs_out = ctx.msgs_out,
        bytes_in = ctx.bytes_in,
        bytes_out = ctx.bytes_out,
        invalid_json = ctx.invalid_json,
        rejected_commands = ctx.rejected_commands,
        lag_recovery_count = ctx.lag_recovery_count,
        "connection stats"
    );
    info!(player_id = %ctx.player_id, "client disconnected");
}
