use super::types::{SessionCommand, SessionEvent, SessionPhase, SessionSnapshot};
use crate::domain::entities::winner_of;
use crate::domain::ports::Clock;
use crate::domain::{DuelSession, Transition};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Authoritative loop for one duel session.
///
/// The task owns the session exclusively; hint requests, guesses and round
/// boundaries are applied here one at a time, so a session never sees two
/// mutations out of order. Before any command is applied, every boundary due
/// at the orchestrator's own `now` is applied first: a command tagged with a
/// round that has already rolled over is rejected as stale.
pub async fn session_task(
    mut session: DuelSession,
    mut command_rx: mpsc::Receiver<SessionCommand>,
    events_tx: broadcast::Sender<SessionEvent>,
    phase_tx: watch::Sender<SessionPhase>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
    shutdown: Arc<Notify>,
) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_timer: Option<(u32, u64)> = None;

    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                // Exit cleanly when the session is archived.
                break;
            }
            _ = interval.tick() => {
                let now = clock.now_millis();
                apply_clock(&mut session, now, &events_tx, &phase_tx);

                // The timer is a redraw hint for clients; only publish changes.
                let sample = session.sample(now);
                let timer = (sample.round_index, sample.time_left);
                if last_timer != Some(timer) {
                    last_timer = Some(timer);
                    let _ = events_tx.send(SessionEvent::Timer {
                        round: sample.round_index,
                        time_left: sample.time_left,
                    });
                }
            }
            command = command_rx.recv() => {
                let Some(command) = command else {
                    break;
                };
                let now = clock.now_millis();
                apply_clock(&mut session, now, &events_tx, &phase_tx);
                handle_command(&mut session, command, now, &events_tx);
            }
        }
    }

    debug!(session_id = %session.id(), "session task exiting");
}

fn apply_clock(
    session: &mut DuelSession,
    now: u64,
    events_tx: &broadcast::Sender<SessionEvent>,
    phase_tx: &watch::Sender<SessionPhase>,
) {
    for transition in session.advance(now) {
        match transition {
            Transition::RoundBoundary { from, to } => {
                info!(session_id = %session.id(), from, to, "round boundary");
                let _ = phase_tx.send(SessionPhase::Active { round: to });
            }
            Transition::Finished { final_scores } => {
                let winner = winner_of(&final_scores);
                info!(
                    session_id = %session.id(),
                    winner = winner.as_deref().unwrap_or("tie"),
                    "game over"
                );
                let _ = events_tx.send(SessionEvent::GameOver {
                    final_scores: final_scores.clone(),
                    winner: winner.clone(),
                });
                let _ = phase_tx.send(SessionPhase::Finished {
                    final_scores,
                    winner,
                });
            }
        }
    }
}

fn handle_command(
    session: &mut DuelSession,
    command: SessionCommand,
    now: u64,
    events_tx: &broadcast::Sender<SessionEvent>,
) {
    match command {
        SessionCommand::UseHint {
            player_id,
            round,
            reply,
        } => {
            let result = session.request_hint(&player_id, round);
            if let Err(err) = &result {
                debug!(session_id = %session.id(), %player_id, round, error = %err, "hint refused");
            }
            let _ = reply.send(result);
        }
        SessionCommand::SubmitGuess {
            player_id,
            round,
            guess,
            hints_used,
            time_left,
            reply,
        } => {
            let result =
                session.submit_guess(&player_id, round, &guess, hints_used, time_left, now);
            match &result {
                Ok(receipt) => {
                    info!(
                        session_id = %session.id(),
                        %player_id,
                        round,
                        round_score = receipt.round_score,
                        total_score = receipt.total_score,
                        "guess scored"
                    );
                    // Both players see score movement, not only the submitter.
                    let _ = events_tx.send(SessionEvent::ScoreUpdate {
                        player_id: player_id.clone(),
                        total_score: receipt.total_score,
                    });
                }
                Err(err) => {
                    debug!(session_id = %session.id(), %player_id, round, error = %err, "guess refused");
                }
            }
            let _ = reply.send(result);
        }
        SessionCommand::Rehydrate { player_id, reply } => {
            let _ = reply.send(session.rehydrate(&player_id, now));
        }
        SessionCommand::Snapshot { reply } => {
            let clock = session.clock();
            let _ = reply.send(SessionSnapshot {
                session_id: session.id().to_string(),
                started_at_ms: clock.started_at_ms(),
                time_unit_ms: clock.unit_ms(),
                round_duration: clock.round_duration(),
                round_count: clock.round_count(),
                participants: session.participants().to_vec(),
                rounds: session.rounds().to_vec(),
            });
        }
    }
}
