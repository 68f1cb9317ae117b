//! Background loop driving one match through its question phases.
//!
//! One driver task runs per in-progress match: countdown, then for each
//! question an answer window, a reveal, and an interlude, and finally the
//! finalization. All waits race against the match's nudge channel so an
//! early-completed question or an owner finish takes effect immediately.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        battle::QuestionPublic,
        events::{self, AnswerRevealEvent, LeaderboardUpdateEvent, QuestionRevealedEvent},
    },
    error::ServiceError,
    services::{battle_service, event_service},
    state::SharedState,
};

/// Outcome of one interruptible wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitOutcome {
    /// The deadline passed.
    Elapsed,
    /// The match was finalized or torn down.
    Finished,
    /// Every player answered the open question.
    AllAnswered,
}

/// Entry point of the per-match driver task.
pub async fn run(state: SharedState, match_id: Uuid, mut nudges: watch::Receiver<bool>) {
    debug!(match_id = %match_id, "phase driver started");
    drive(&state, match_id, &mut nudges).await;
    state.clear_driver(match_id);
    debug!(match_id = %match_id, "phase driver stopped");
}

async fn drive(state: &SharedState, match_id: Uuid, nudges: &mut watch::Receiver<bool>) {
    let pre_countdown = Duration::from_secs(state.config().timing.pre_countdown_secs);
    let interlude = Duration::from_secs(state.config().timing.interlude_secs);

    if wait(state, match_id, nudges, Instant::now() + pre_countdown, false).await
        == WaitOutcome::Finished
    {
        return;
    }

    loop {
        let Some(handle) = state.sessions().get(match_id) else {
            return;
        };

        // Reveal the next question, or leave the loop when the set is done.
        let revealed = {
            let mut session = handle.lock().await;
            if session.is_finished() {
                return;
            }
            session.advance_question(Instant::now()).and_then(|index| {
                session.question_at(index).map(|question| {
                    (
                        index,
                        QuestionPublic::from(question),
                        session.window_ms(),
                    )
                })
            })
        };
        let Some((index, question, window_ms)) = revealed else {
            break;
        };

        event_service::broadcast(
            state,
            match_id,
            events::names::QUESTION_NEW,
            &QuestionRevealedEvent {
                index: index as u32,
                question,
                window_ms,
            },
        );

        let deadline = Instant::now() + Duration::from_millis(window_ms);
        if wait(state, match_id, nudges, deadline, true).await == WaitOutcome::Finished {
            return;
        }

        // Close the window: silent players lose their streak, then the
        // answer key goes out.
        let reveal = {
            let mut session = handle.lock().await;
            if session.is_finished() {
                return;
            }
            let silent: Vec<Uuid> = session
                .players()
                .filter(|(player_id, player)| {
                    !player.skipped_current && !session.has_answered(index, **player_id)
                })
                .map(|(player_id, _)| *player_id)
                .collect();
            for player_id in silent {
                session.update_streak(player_id, false);
            }
            session.question_at(index).map(|question| {
                (
                    AnswerRevealEvent {
                        index: index as u32,
                        correct_option: question.correct_option,
                        explanation: question.explanation.clone(),
                    },
                    battle_service::leaderboard_rows(&session),
                )
            })
        };
        if let Some((reveal_event, rows)) = reveal {
            event_service::broadcast(state, match_id, events::names::ANSWER_REVEAL, &reveal_event);
            event_service::broadcast(
                state,
                match_id,
                events::names::LEADERBOARD_UPDATE,
                &LeaderboardUpdateEvent { rows },
            );
        }

        if wait(state, match_id, nudges, Instant::now() + interlude, false).await
            == WaitOutcome::Finished
        {
            return;
        }
    }

    match battle_service::finalize(state, match_id).await {
        Ok(_) => {}
        // An already finished match replays as a success, so an error here
        // means the durable record itself is gone or inconsistent.
        Err(ServiceError::NotFound(_)) => {
            debug!(match_id = %match_id, "match record gone before finalization");
        }
        Err(err) => {
            warn!(match_id = %match_id, error = %err, "finalization failed");
        }
    }
}

/// Sleep until `deadline`, waking on nudges to re-check the session.
///
/// A nudge is only a hint; the session state under its lock decides whether
/// the wait ends. Spurious nudges resume waiting.
async fn wait(
    state: &SharedState,
    match_id: Uuid,
    nudges: &mut watch::Receiver<bool>,
    deadline: Instant,
    break_when_all_answered: bool,
) -> WaitOutcome {
    loop {
        tokio::select! {
            _ = sleep_until(deadline) => return WaitOutcome::Elapsed,
            changed = nudges.changed() => {
                if changed.is_err() {
                    return WaitOutcome::Finished;
                }
                let Some(handle) = state.sessions().get(match_id) else {
                    return WaitOutcome::Finished;
                };
                let session = handle.lock().await;
                if session.is_finished() {
                    return WaitOutcome::Finished;
                }
                if break_when_all_answered && session.all_answered() {
                    return WaitOutcome::AllAnswered;
                }
            }
        }
    }
}
