//! Match lifecycle operations: start, answer submission, state resync, and
//! exactly-once finalization.

use rand::seq::SliceRandom;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::models::{AnswerRecord, HistoryRecord, MatchRecord, MatchStatus},
    dto::{
        battle::{
            CurrentQuestionState, LeaderboardEntry, MatchResultResponse, MatchStateResponse,
            PlayerResult, QuestionPublic, SelfState, StartMatchResponse, SubmitAnswerRequest,
            SubmitAnswerResponse,
        },
        events::{
            self, LeaderboardUpdateEvent, MatchFinishedEvent, MatchStartedEvent, ScoreUpdateEvent,
        },
    },
    error::ServiceError,
    scoring::{self, RuleMode, Submission},
    services::{event_service, phase_driver},
    state::{BattleSession, SharedState, session::QuestionSnapshot},
};

/// Start a match: freeze its question set, build the live session, and spawn
/// the phase driver.
///
/// Only the room owner may start, and only from the waiting state.
pub async fn start_match(
    state: &SharedState,
    match_id: Uuid,
    actor_id: Uuid,
) -> Result<StartMatchResponse, ServiceError> {
    let collaborators = state.collaborators();

    let mut record = collaborators
        .matches
        .find(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no match with id {match_id}")))?;

    if record.owner_id != actor_id {
        return Err(ServiceError::Forbidden(
            "only the room owner can start the match".into(),
        ));
    }
    if record.status != MatchStatus::Waiting {
        return Err(ServiceError::InvalidState(format!(
            "match cannot start from status {:?}",
            record.status
        )));
    }
    if state.sessions().contains(match_id) {
        return Err(ServiceError::InvalidState(
            "a session for this match is already running".into(),
        ));
    }

    let roster = collaborators.roster.participants(match_id).await?;
    if roster.is_empty() {
        return Err(ServiceError::InvalidState(
            "cannot start a match with an empty roster".into(),
        ));
    }

    let mut questions = collaborators
        .questions
        .questions_for_set(record.question_set_id)
        .await?;
    if questions.is_empty() {
        return Err(ServiceError::InvalidState(
            "the question set of this match is empty".into(),
        ));
    }
    questions.shuffle(&mut rand::rng());

    let seconds_per_question = record
        .seconds_per_question
        .unwrap_or(state.config().timing.default_seconds_per_question);

    let session = BattleSession::new(
        match_id,
        record.rule,
        record.is_ranked(),
        seconds_per_question,
        questions.into_iter().map(QuestionSnapshot::from).collect(),
        roster
            .into_iter()
            .map(|participant| (participant.player_id, participant.name)),
    );
    let question_count = session.question_count() as u32;
    state.sessions().insert(session);

    record.status = MatchStatus::InProgress;
    record.started_at = Some(OffsetDateTime::now_utc());
    let room_name = record.room_name.clone();
    collaborators.matches.save(record).await?;

    let cancel = state.register_driver(match_id);
    tokio::spawn(phase_driver::run(state.clone(), match_id, cancel));

    let first_question_in_secs = state.config().timing.pre_countdown_secs;
    event_service::broadcast(
        state,
        match_id,
        events::names::MATCH_STARTED,
        &MatchStartedEvent {
            match_id,
            room_name,
            question_count,
            seconds_per_question,
            first_question_in_secs,
        },
    );
    info!(match_id = %match_id, questions = question_count, "match started");

    Ok(StartMatchResponse {
        match_id,
        question_count,
        first_question_in_secs,
    })
}

/// Score one answer submission.
///
/// The first submission per (question, player) pair wins; everything after
/// the session lock is taken is deterministic given the captured inputs.
pub async fn submit_answer(
    state: &SharedState,
    match_id: Uuid,
    request: &SubmitAnswerRequest,
) -> Result<SubmitAnswerResponse, ServiceError> {
    let handle = state
        .sessions()
        .get(match_id)
        .ok_or_else(|| ServiceError::NotFound(format!("no live match with id {match_id}")))?;

    // Late joiners known to the durable roster enter with a zero baseline;
    // their position in the map is the tie-break slot. The roster fetch stays
    // outside the session lock.
    let known = { handle.lock().await.player(request.player_id).is_some() };
    if !known {
        let roster = state.collaborators().roster.participants(match_id).await?;
        let participant = roster
            .into_iter()
            .find(|participant| participant.player_id == request.player_id)
            .ok_or_else(|| ServiceError::Forbidden("player is not on the roster".into()))?;
        let mut session = handle.lock().await;
        session.add_player(participant.player_id, participant.name);
    }

    let (response, record, correct_count, rows, all_answered) = {
        let mut session = handle.lock().await;

        let current = session
            .current_index()
            .ok_or_else(|| ServiceError::InvalidState("no question is open for answers".into()))?;
        let submitted = request.question_index as usize;
        if submitted != current {
            return Err(ServiceError::QuestionMismatch {
                submitted: submitted as i32,
                current: current as i32,
            });
        }

        let player = session
            .player(request.player_id)
            .ok_or_else(|| ServiceError::Forbidden("player is not on the roster".into()))?;
        if player.skipped_current {
            // A skipped question is already settled for this player: the
            // submission is acknowledged without scoring, leaving total and
            // streak untouched.
            return Ok(SubmitAnswerResponse {
                correct: false,
                base: 0,
                combo_multiplier: 0.0,
                powerup_multiplier: 1.0,
                gained: 0,
                streak: player.streak,
                shield_consumed: false,
                total_score: player.score,
            });
        }
        if player.hidden_options.contains(&request.chosen) {
            return Err(ServiceError::InvalidInput(
                "option was eliminated by a hint".into(),
            ));
        }

        if !session.record_answer(current, request.player_id) {
            return Err(ServiceError::DuplicateSubmission);
        }

        let elapsed_ms = session.elapsed_ms(Instant::now());
        let window_ms = session.window_ms();
        let within_time = elapsed_ms <= window_ms;
        let question = session
            .question_at(current)
            .ok_or_else(|| ServiceError::InvalidState("question index out of range".into()))?;
        let question_id = question.id;
        let option_matches = question.correct_option == request.chosen;
        let correct = within_time && option_matches;

        // The multiplier is spent by the act of answering.
        let multiplier = session.take_multiplier(request.player_id);
        let streak_update = session.update_streak(request.player_id, correct);

        let breakdown = scoring::score_answer(
            &state.config().scoring,
            session.rule,
            &Submission {
                within_time,
                option_matches,
                elapsed_ms,
                total_ms: window_ms,
                streak: streak_update.streak,
                multiplier,
                ranked: session.ranked,
            },
        );

        let ranked = session.ranked;
        let (total_score, correct_count) = {
            let player_state = session
                .player_mut(request.player_id)
                .ok_or_else(|| ServiceError::Forbidden("player is not on the roster".into()))?;
            player_state.score += breakdown.gained;
            if correct {
                player_state.correct_count += 1;
            }
            player_state.total_time_ms += elapsed_ms;
            (player_state.score, player_state.correct_count)
        };

        if ranked && streak_update.streak >= 3 {
            let progress = state.collaborators().progress.clone();
            let player_id = request.player_id;
            let streak = streak_update.streak;
            tokio::spawn(async move {
                progress.on_combo_achieved(player_id, streak).await;
            });
        }

        let response = SubmitAnswerResponse {
            correct,
            base: breakdown.base,
            combo_multiplier: breakdown.combo_multiplier,
            powerup_multiplier: breakdown.powerup_multiplier,
            gained: breakdown.gained,
            streak: streak_update.streak,
            shield_consumed: streak_update.shield_consumed,
            total_score,
        };
        let record = AnswerRecord {
            match_id,
            player_id: request.player_id,
            question_id,
            question_index: current,
            chosen: request.chosen,
            correct,
            elapsed_ms,
            answered_at: OffsetDateTime::now_utc(),
        };
        (
            response,
            record,
            correct_count,
            leaderboard_rows(&session),
            session.all_answered(),
        )
    };

    // Durable write-through. The in-memory state already changed and the
    // events must still go out, so backend failures are logged for
    // reconciliation instead of rolling the submission back.
    let collaborators = state.collaborators();
    if let Err(err) = collaborators.answers.append(record).await {
        warn!(match_id = %match_id, player_id = %request.player_id, error = %err,
            "failed to append answer log entry");
    }
    if let Err(err) = collaborators
        .roster
        .persist_score(match_id, request.player_id, response.total_score, correct_count)
        .await
    {
        warn!(match_id = %match_id, player_id = %request.player_id, error = %err,
            "failed to write score through to roster");
    }

    event_service::broadcast(
        state,
        match_id,
        events::names::SCORE_UPDATE,
        &ScoreUpdateEvent {
            player_id: request.player_id,
            correct: response.correct,
            gained: response.gained,
            total_score: response.total_score,
            streak: response.streak,
        },
    );
    event_service::broadcast(
        state,
        match_id,
        events::names::LEADERBOARD_UPDATE,
        &LeaderboardUpdateEvent { rows },
    );

    if all_answered {
        // Cut the answer window short once every player is accounted for.
        state.nudge_driver(match_id);
    }

    Ok(response)
}

/// Rebuild the full match view for a reconnecting client. When the caller
/// identifies themselves, their private per-player state rides along.
pub async fn sync_state(
    state: &SharedState,
    match_id: Uuid,
    player_id: Option<Uuid>,
) -> Result<MatchStateResponse, ServiceError> {
    let record = state
        .collaborators()
        .matches
        .find(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no match with id {match_id}")))?;

    let mut response = MatchStateResponse {
        match_id,
        status: record.status,
        rule: record.rule,
        ranked: record.is_ranked(),
        question_count: None,
        current: None,
        leaderboard: Vec::new(),
        you: None,
    };

    if let Some(handle) = state.sessions().get(match_id) {
        let session = handle.lock().await;
        response.question_count = Some(session.question_count() as u32);
        response.leaderboard = leaderboard_rows(&session);
        if !session.is_finished()
            && let Some(index) = session.current_index()
            && let Some(question) = session.question_at(index)
        {
            let remaining_ms = session
                .window_ms()
                .saturating_sub(session.elapsed_ms(Instant::now()));
            response.current = Some(CurrentQuestionState {
                index: index as u32,
                question: QuestionPublic::from(question),
                remaining_ms,
            });
        }
        if let Some(player_id) = player_id
            && let Some(player) = session.player(player_id)
        {
            let answered_current = session
                .current_index()
                .is_some_and(|index| session.has_answered(index, player_id));
            response.you = Some(SelfState {
                answered_current,
                skipped_current: player.skipped_current,
                streak: player.streak,
                shielded: player.shielded,
                multiplier_armed: player.pending_multiplier.is_some(),
                hidden_options: player.hidden_options.clone(),
            });
        }
    }

    Ok(response)
}

/// Owner-initiated early finish.
///
/// Finishing an already-finished match is not an error: the stored result is
/// replayed (or rebuilt from durable rows after a restart) without re-running
/// finalization or re-publishing events.
pub async fn finish_match(
    state: &SharedState,
    match_id: Uuid,
    actor_id: Uuid,
) -> Result<MatchResultResponse, ServiceError> {
    let record = state
        .collaborators()
        .matches
        .find(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no match with id {match_id}")))?;
    if record.owner_id != actor_id {
        return Err(ServiceError::Forbidden(
            "only the room owner can finish the match".into(),
        ));
    }

    finalize(state, match_id).await
}

/// Reconstruct a settled result from durable history rows, used when the
/// in-memory copy is gone.
async fn rebuild_result(
    state: &SharedState,
    match_id: Uuid,
    winner_id: Option<Uuid>,
) -> Result<MatchResultResponse, ServiceError> {
    let collaborators = state.collaborators();
    let mut rows = collaborators.history.rows_for_match(match_id).await?;
    rows.sort_by_key(|row| row.rank);
    let roster = collaborators.roster.participants(match_id).await?;

    let results = rows
        .into_iter()
        .map(|row| PlayerResult {
            player_id: row.player_id,
            name: roster
                .iter()
                .find(|participant| participant.player_id == row.player_id)
                .map(|participant| participant.name.clone())
                .unwrap_or_default(),
            rank: row.rank,
            total_score: row.total_score,
            correct_count: row.correct_count,
            total_time_ms: row.total_time_ms,
            max_combo: row.max_combo,
            reward: None,
        })
        .collect();

    Ok(MatchResultResponse {
        match_id,
        settled: true,
        winner_id,
        results,
    })
}

struct ResultRow {
    player_id: Uuid,
    name: String,
    score: i64,
    correct_count: u32,
    total_time_ms: u64,
    max_combo: u32,
}

/// Finalize a match exactly once: persist scores and history, flip the
/// durable status, compute rewards, fire progress hooks, and broadcast the
/// final results.
///
/// Every finish path (question set exhausted, owner finish, racing clients)
/// funnels through here; the session's one-shot flag under its lock decides
/// the single winner. Racing losers get `settled = false` back instead of an
/// error, so every caller observes finalization as a success.
pub(crate) async fn finalize(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchResultResponse, ServiceError> {
    let Some(handle) = state.sessions().get(match_id) else {
        // The live session is gone: already settled here, settled elsewhere,
        // or lost to a restart. The durable record decides which.
        return finalize_from_durable(state, match_id).await;
    };

    let collaborators = state.collaborators();
    let record = collaborators
        .matches
        .find(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no match with id {match_id}")))?;
    if record.status == MatchStatus::Finished {
        // The durable record was settled outside this process. Trust it,
        // drop the stale live state, and replay rather than re-publishing
        // events.
        state.nudge_driver(match_id);
        state.sessions().remove(match_id);
        state.events().remove(match_id);
        if let Some(result) = state.result_of(match_id) {
            return Ok(result);
        }
        return rebuild_result(state, match_id, record.winner_id).await;
    }

    let (rows, ranked, speed_mode, question_count) = {
        let mut session = handle.lock().await;
        if !session.mark_finished_once() {
            // Another caller claimed finalization; report without
            // double-processing.
            return Ok(MatchResultResponse {
                match_id,
                settled: false,
                winner_id: None,
                results: Vec::new(),
            });
        }

        let mut rows: Vec<ResultRow> = session
            .players()
            .map(|(player_id, player)| ResultRow {
                player_id: *player_id,
                name: player.name.clone(),
                score: player.score,
                correct_count: player.correct_count,
                total_time_ms: player.total_time_ms,
                max_combo: player.max_combo,
            })
            .collect();
        // Stable sort: equal scores keep roster join order.
        rows.sort_by(|a, b| b.score.cmp(&a.score));
        (
            rows,
            session.ranked,
            session.rule == RuleMode::SpeedWeighted,
            session.question_count() as u32,
        )
    };

    Ok(settle(state, record, rows, ranked, speed_mode, question_count).await)
}

/// Settle or replay a match whose live session is gone.
///
/// A missing session means the result was already settled (replay it) or the
/// process restarted mid-match; in the latter case the standings come from
/// the durable score write-through and the answer log.
async fn finalize_from_durable(
    state: &SharedState,
    match_id: Uuid,
) -> Result<MatchResultResponse, ServiceError> {
    if let Some(result) = state.result_of(match_id) {
        return Ok(result);
    }

    let collaborators = state.collaborators();
    let record = collaborators
        .matches
        .find(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no match with id {match_id}")))?;
    match record.status {
        MatchStatus::Finished => rebuild_result(state, match_id, record.winner_id).await,
        MatchStatus::InProgress => {
            let standings = collaborators.roster.standings(match_id).await?;
            let answers = collaborators.answers.entries_for_match(match_id).await?;
            let question_count = collaborators
                .questions
                .questions_for_set(record.question_set_id)
                .await?
                .len() as u32;
            let ranked = record.is_ranked();
            let speed_mode = record.rule == RuleMode::SpeedWeighted;

            let mut rows: Vec<ResultRow> = standings
                .into_iter()
                .map(|standing| {
                    // Replay the per-player answer trail to recover the time
                    // and combo figures the session used to track.
                    let mut total_time_ms = 0;
                    let mut streak = 0u32;
                    let mut max_combo = 0u32;
                    for answer in answers
                        .iter()
                        .filter(|answer| answer.player_id == standing.participant.player_id)
                    {
                        total_time_ms += answer.elapsed_ms;
                        streak = if answer.correct { streak + 1 } else { 0 };
                        max_combo = max_combo.max(streak);
                    }
                    ResultRow {
                        player_id: standing.participant.player_id,
                        name: standing.participant.name,
                        score: standing.score,
                        correct_count: standing.correct_count,
                        total_time_ms,
                        max_combo,
                    }
                })
                .collect();
            // Stable sort: equal scores keep roster join order.
            rows.sort_by(|a, b| b.score.cmp(&a.score));

            Ok(settle(state, record, rows, ranked, speed_mode, question_count).await)
        }
        status => Err(ServiceError::InvalidState(format!(
            "match cannot be finalized from status {status:?}"
        ))),
    }
}

/// Persist and publish a claimed finalization.
///
/// Durable writes are logged and skipped on failure rather than propagated:
/// the finalization claim has already been taken, so bailing out would leave
/// the match settled in memory but unfinished everywhere else.
async fn settle(
    state: &SharedState,
    mut record: MatchRecord,
    rows: Vec<ResultRow>,
    ranked: bool,
    speed_mode: bool,
    question_count: u32,
) -> MatchResultResponse {
    let collaborators = state.collaborators();
    let match_id = record.id;
    let finished_at = OffsetDateTime::now_utc();
    let winner_id = rows.first().map(|row| row.player_id);

    for row in &rows {
        if let Err(err) = collaborators
            .roster
            .persist_score(match_id, row.player_id, row.score, row.correct_count)
            .await
        {
            warn!(match_id = %match_id, player_id = %row.player_id, error = %err,
                "final score write failed");
        }
    }

    let history: Vec<HistoryRecord> = rows
        .iter()
        .enumerate()
        .map(|(index, row)| HistoryRecord {
            match_id,
            player_id: row.player_id,
            total_score: row.score,
            correct_count: row.correct_count,
            total_time_ms: row.total_time_ms,
            rank: index as u32 + 1,
            max_combo: row.max_combo,
            finished_at,
        })
        .collect();
    if let Err(err) = collaborators.history.append_all(history).await {
        warn!(match_id = %match_id, error = %err, "history write failed");
    }

    record.status = MatchStatus::Finished;
    record.ended_at = Some(finished_at);
    record.winner_id = winner_id;
    if let Err(err) = collaborators.matches.save(record).await {
        warn!(match_id = %match_id, error = %err, "match record write failed");
    }

    let mut results = Vec::with_capacity(rows.len());
    for (index, row) in rows.iter().enumerate() {
        let won = index == 0;
        let reward = if ranked {
            match collaborators
                .rewards
                .compute_match_reward(
                    row.player_id,
                    row.correct_count,
                    question_count,
                    won,
                    true,
                    speed_mode,
                )
                .await
            {
                Ok(reward) => Some(reward),
                Err(err) => {
                    // A reward outage must not block finalization.
                    warn!(match_id = %match_id, player_id = %row.player_id, error = %err,
                        "reward computation failed");
                    None
                }
            }
        } else {
            None
        };
        results.push(PlayerResult {
            player_id: row.player_id,
            name: row.name.clone(),
            rank: index as u32 + 1,
            total_score: row.score,
            correct_count: row.correct_count,
            total_time_ms: row.total_time_ms,
            max_combo: row.max_combo,
            reward,
        });
    }

    spawn_progress_hooks(state, &rows, ranked);

    let response = MatchResultResponse {
        match_id,
        settled: true,
        winner_id,
        results,
    };
    state.store_result(response.clone());
    event_service::broadcast(
        state,
        match_id,
        events::names::MATCH_FINISHED,
        &MatchFinishedEvent {
            match_id,
            winner_id,
            results: response.results.clone(),
        },
    );
    info!(match_id = %match_id, winner = ?winner_id, "match finalized");

    // Wake the driver so it observes the finished flag and exits, then tear
    // down the live state. Subscribers drain buffered events before their
    // streams close.
    state.nudge_driver(match_id);
    state.sessions().remove(match_id);
    state.events().remove(match_id);

    response
}

/// Notify the quest and achievement subsystems about the finished match.
///
/// Failures in these hooks never affect the match outcome, so they run on a
/// detached task.
fn spawn_progress_hooks(state: &SharedState, rows: &[ResultRow], ranked: bool) {
    let progress = state.collaborators().progress.clone();
    let entries: Vec<(Uuid, u32, u32)> = rows
        .iter()
        .map(|row| (row.player_id, row.correct_count, row.max_combo))
        .collect();
    let roster_size = entries.len();

    tokio::spawn(async move {
        for (index, (player_id, correct_count, max_combo)) in entries.iter().enumerate() {
            progress.on_match_played(*player_id, ranked).await;
            if index == 0 {
                progress.on_match_won(*player_id, ranked).await;
            }
            if *correct_count > 0 {
                progress.on_correct_answers(*player_id, *correct_count).await;
            }
            if *max_combo >= 3 {
                progress.on_combo_achieved(*player_id, *max_combo).await;
            }
            if roster_size >= 3 && index < 3 {
                progress.on_top_three(*player_id).await;
            }
        }
    });
}

/// Leaderboard rows of a live session, best first.
pub(crate) fn leaderboard_rows(session: &BattleSession) -> Vec<LeaderboardEntry> {
    session
        .leaderboard()
        .into_iter()
        .filter_map(|(player_id, score)| {
            session.player(player_id).map(|player| LeaderboardEntry {
                player_id,
                name: player.name.clone(),
                score,
                correct_count: player.correct_count,
                streak: player.streak,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            AnswerLog, HistoryStore, MatchRepository, RosterStore,
            memory::{
                FlatRewardService, MemoryAnswerLog, MemoryInventoryStore, MemoryMatchRepository,
                MemoryQuestionSource, MemoryRosterStore, RecordingProgressHooks,
            },
            models::{MatchKind, OptionKey},
            storage::{StorageError, StorageResult},
        },
        services::testutil::{self, TestWorld},
        state::{AppState, Collaborators},
    };

    /// Install a live session with the first question already open, bypassing
    /// the driver so submissions can be tested deterministically.
    async fn open_session(world: &TestWorld, question_count: usize, ranked: bool) {
        let questions: Vec<QuestionSnapshot> = (0..question_count)
            .map(|i| QuestionSnapshot::from(testutil::question(&format!("question {i}"))))
            .collect();
        let mut session = BattleSession::new(
            world.match_id,
            RuleMode::Standard,
            ranked,
            15,
            questions,
            world
                .players
                .iter()
                .enumerate()
                .map(|(i, id)| (*id, format!("player-{i}"))),
        );
        session.advance_question(Instant::now());
        world.state.sessions().insert(session);
    }

    fn answer(player_id: Uuid, chosen: OptionKey) -> crate::dto::battle::SubmitAnswerRequest {
        crate::dto::battle::SubmitAnswerRequest {
            player_id,
            question_index: 0,
            chosen,
        }
    }

    #[tokio::test]
    async fn start_rejects_non_owner() {
        let world = testutil::world(2, 2, MatchKind::Casual, RuleMode::Standard);
        let intruder = world.players[1];
        let result = start_match(&world.state, world.match_id, intruder).await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn start_rejects_unknown_match() {
        let world = testutil::world(1, 1, MatchKind::Casual, RuleMode::Standard);
        let result = start_match(&world.state, Uuid::new_v4(), world.owner).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn correct_answer_is_scored_and_logged() {
        let world = testutil::world(2, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        let response = submit_answer(
            &world.state,
            world.match_id,
            &answer(world.players[0], OptionKey::B),
        )
        .await
        .unwrap();

        // Instant submissions trip the plausibility threshold.
        assert!(response.correct);
        assert_eq!(response.gained, 30);
        assert_eq!(response.total_score, 30);
        assert_eq!(response.streak, 1);

        let log = world.answers.entries_for_match(world.match_id).await.unwrap();
        assert_eq!(log.len(), 1);
        assert!(log[0].correct);
        assert_eq!(log[0].question_index, 0);
    }

    #[tokio::test]
    async fn duplicate_submission_is_rejected_and_not_logged_twice() {
        let world = testutil::world(2, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        let request = answer(world.players[0], OptionKey::B);
        submit_answer(&world.state, world.match_id, &request)
            .await
            .unwrap();
        let second = submit_answer(&world.state, world.match_id, &request).await;
        assert!(matches!(second, Err(ServiceError::DuplicateSubmission)));

        let log = world.answers.entries_for_match(world.match_id).await.unwrap();
        assert_eq!(log.len(), 1);
    }

    #[tokio::test]
    async fn stale_question_index_is_rejected() {
        let world = testutil::world(1, 2, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 2, false).await;

        let mut request = answer(world.players[0], OptionKey::B);
        request.question_index = 1;
        let result = submit_answer(&world.state, world.match_id, &request).await;
        assert!(matches!(
            result,
            Err(ServiceError::QuestionMismatch {
                submitted: 1,
                current: 0
            })
        ));
    }

    #[tokio::test]
    async fn unknown_player_is_rejected() {
        let world = testutil::world(1, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        let result =
            submit_answer(&world.state, world.match_id, &answer(Uuid::new_v4(), OptionKey::A))
                .await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn wrong_answer_scores_zero_and_resets_streak() {
        let world = testutil::world(1, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        let response = submit_answer(
            &world.state,
            world.match_id,
            &answer(world.players[0], OptionKey::A),
        )
        .await
        .unwrap();
        assert!(!response.correct);
        assert_eq!(response.gained, 0);
        assert_eq!(response.streak, 0);
    }

    #[tokio::test]
    async fn concurrent_finalizations_settle_exactly_once() {
        let world = testutil::world(3, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        {
            let handle = world.state.sessions().get(world.match_id).unwrap();
            let mut session = handle.lock().await;
            session.player_mut(world.players[1]).unwrap().score = 500;
        }

        let first = finalize(&world.state, world.match_id);
        let second = finalize(&world.state, world.match_id);
        let (first, second) = tokio::join!(first, second);

        // Both callers succeed. The loser either yields to the claim holder
        // or replays the stored result; every settled view agrees on the
        // winner, and the history rows are written exactly once.
        let first = first.unwrap();
        let second = second.unwrap();
        assert!(first.settled || second.settled);
        for view in [&first, &second].into_iter().filter(|view| view.settled) {
            assert_eq!(view.winner_id, Some(world.players[1]));
        }

        let history = world.history.rows_for_match(world.match_id).await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].rank, 1);

        let record = world
            .matches
            .find(world.match_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.status, MatchStatus::Finished);
        assert_eq!(record.winner_id, Some(world.players[1]));

        // The live state is torn down after finalization.
        assert!(world.state.sessions().get(world.match_id).is_none());
    }

    #[tokio::test]
    async fn equal_scores_rank_by_join_order() {
        let world = testutil::world(2, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        let response = finalize(&world.state, world.match_id).await.unwrap();
        assert_eq!(response.winner_id, Some(world.players[0]));
        assert_eq!(response.results[0].player_id, world.players[0]);
        assert_eq!(response.results[1].player_id, world.players[1]);
    }

    #[tokio::test]
    async fn ranked_finalization_attaches_rewards() {
        let world = testutil::world(2, 1, MatchKind::Ranked, RuleMode::Standard);
        open_session(&world, 1, true).await;

        let response = finalize(&world.state, world.match_id).await.unwrap();
        assert!(response.results.iter().all(|row| row.reward.is_some()));
    }

    #[tokio::test]
    async fn casual_finalization_has_no_rewards() {
        let world = testutil::world(2, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        let response = finalize(&world.state, world.match_id).await.unwrap();
        assert!(response.results.iter().all(|row| row.reward.is_none()));
    }

    #[tokio::test]
    async fn finish_rejects_non_owner() {
        let world = testutil::world(2, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        let result = finish_match(&world.state, world.match_id, world.players[1]).await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn finish_after_settlement_replays_the_result() {
        let world = testutil::world(2, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        let settled = finish_match(&world.state, world.match_id, world.owner)
            .await
            .unwrap();
        assert!(settled.settled);

        // The session is torn down, yet a second finish still succeeds with
        // the same standings and no new history rows.
        let replay = finish_match(&world.state, world.match_id, world.owner)
            .await
            .unwrap();
        assert!(replay.settled);
        assert_eq!(replay.winner_id, settled.winner_id);
        assert_eq!(replay.results.len(), settled.results.len());
        assert_eq!(
            world
                .history
                .rows_for_match(world.match_id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn sync_state_reports_open_question_without_answer_key() {
        let world = testutil::world(1, 2, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 2, false).await;

        let view = sync_state(&world.state, world.match_id, None).await.unwrap();
        let current = view.current.unwrap();
        assert_eq!(current.index, 0);
        assert!(current.remaining_ms <= 15_000);
        assert_eq!(view.leaderboard.len(), 1);
        assert!(view.you.is_none());

        let serialized = serde_json::to_string(&current.question).unwrap();
        assert!(!serialized.contains("correct"));
    }

    #[tokio::test]
    async fn sync_state_carries_private_state_for_the_caller() {
        let world = testutil::world(1, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        submit_answer(
            &world.state,
            world.match_id,
            &answer(world.players[0], OptionKey::B),
        )
        .await
        .unwrap();

        let view = sync_state(&world.state, world.match_id, Some(world.players[0]))
            .await
            .unwrap();
        let you = view.you.unwrap();
        assert!(you.answered_current);
        assert_eq!(you.streak, 1);
        assert!(!you.multiplier_armed);
    }

    #[tokio::test]
    async fn submission_after_skip_succeeds_without_scoring() {
        let world = testutil::world(1, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        {
            let handle = world.state.sessions().get(world.match_id).unwrap();
            let mut session = handle.lock().await;
            session.player_mut(world.players[0]).unwrap().skipped_current = true;
        }

        // The question is already settled for the player, so the submission
        // is acknowledged without scoring.
        let response = submit_answer(
            &world.state,
            world.match_id,
            &answer(world.players[0], OptionKey::B),
        )
        .await
        .unwrap();
        assert!(!response.correct);
        assert_eq!(response.gained, 0);
        assert_eq!(response.total_score, 0);
        assert_eq!(response.streak, 0);

        let log = world.answers.entries_for_match(world.match_id).await.unwrap();
        assert!(log.is_empty());
    }

    #[tokio::test]
    async fn late_joiner_on_roster_can_submit() {
        let world = testutil::world(1, 1, MatchKind::Casual, RuleMode::Standard);
        open_session(&world, 1, false).await;

        let late = Uuid::new_v4();
        world.roster.join(world.match_id, late, "latecomer");

        let response = submit_answer(&world.state, world.match_id, &answer(late, OptionKey::B))
            .await
            .unwrap();
        assert!(response.correct);
        assert_eq!(response.total_score, response.gained);
        assert_eq!(response.streak, 1);
    }

    #[tokio::test]
    async fn finish_without_live_session_settles_from_durable_state() {
        let world = testutil::world(2, 1, MatchKind::Casual, RuleMode::Standard);

        // Simulate a restart: the record is in progress, scores were written
        // through, and the live session is gone.
        let mut record = world.matches.find(world.match_id).await.unwrap().unwrap();
        record.status = MatchStatus::InProgress;
        world.matches.insert(record);
        world
            .roster
            .persist_score(world.match_id, world.players[1], 70, 1)
            .await
            .unwrap();

        let result = finish_match(&world.state, world.match_id, world.owner)
            .await
            .unwrap();
        assert!(result.settled);
        assert_eq!(result.winner_id, Some(world.players[1]));
        assert_eq!(result.results.len(), 2);
        assert_eq!(result.results[0].total_score, 70);
        assert_eq!(result.results[0].correct_count, 1);

        let record = world.matches.find(world.match_id).await.unwrap().unwrap();
        assert_eq!(record.status, MatchStatus::Finished);
        assert_eq!(record.winner_id, Some(world.players[1]));
        assert_eq!(
            world
                .history
                .rows_for_match(world.match_id)
                .await
                .unwrap()
                .len(),
            2
        );
    }

    struct UnavailableHistoryStore;

    impl HistoryStore for UnavailableHistoryStore {
        fn append_all(
            &self,
            _records: Vec<HistoryRecord>,
        ) -> BoxFuture<'static, StorageResult<()>> {
            Box::pin(async {
                Err(StorageError::unavailable(
                    "history backend down".into(),
                    std::io::Error::other("connection refused"),
                ))
            })
        }

        fn rows_for_match(
            &self,
            _match_id: Uuid,
        ) -> BoxFuture<'static, StorageResult<Vec<HistoryRecord>>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    #[tokio::test]
    async fn finalization_completes_despite_history_write_failure() {
        let matches = Arc::new(MemoryMatchRepository::new());
        let match_id = Uuid::new_v4();
        let player = Uuid::new_v4();
        matches.insert(MatchRecord {
            id: match_id,
            room_name: "test room".to_string(),
            owner_id: player,
            question_set_id: Uuid::new_v4(),
            kind: MatchKind::Casual,
            rule: RuleMode::Standard,
            seconds_per_question: Some(15),
            status: MatchStatus::InProgress,
            started_at: None,
            ended_at: None,
            winner_id: None,
        });

        let state = AppState::new(
            AppConfig::default(),
            Collaborators {
                matches: matches.clone(),
                questions: Arc::new(MemoryQuestionSource::new()),
                roster: Arc::new(MemoryRosterStore::new()),
                answers: Arc::new(MemoryAnswerLog::new()),
                history: Arc::new(UnavailableHistoryStore),
                rewards: Arc::new(FlatRewardService::new()),
                progress: Arc::new(RecordingProgressHooks::new()),
                inventory: Arc::new(MemoryInventoryStore::new()),
            },
        );

        let mut session = BattleSession::new(
            match_id,
            RuleMode::Standard,
            false,
            15,
            vec![QuestionSnapshot::from(testutil::question("question 0"))],
            std::iter::once((player, "player-0".to_string())),
        );
        session.advance_question(Instant::now());
        state.sessions().insert(session);

        // The history outage is logged, not propagated: the match settles,
        // the record flips, and the live state is torn down.
        let result = finalize(&state, match_id).await.unwrap();
        assert!(result.settled);
        assert!(state.sessions().get(match_id).is_none());

        let record = matches.find(match_id).await.unwrap().unwrap();
        assert_eq!(record.status, MatchStatus::Finished);

        // Retries replay the stored result instead of failing forever.
        let replay = finalize(&state, match_id).await.unwrap();
        assert!(replay.settled);
        assert_eq!(replay.winner_id, Some(player));
    }

    #[tokio::test]
    async fn result_cache_evicts_when_full() {
        let world = testutil::world(1, 1, MatchKind::Casual, RuleMode::Standard);

        let oldest = Uuid::new_v4();
        let empty = |match_id| MatchResultResponse {
            match_id,
            settled: true,
            winner_id: None,
            results: Vec::new(),
        };
        world.state.store_result(empty(oldest));
        let newest = Uuid::new_v4();
        for _ in 0..1024 {
            world.state.store_result(empty(Uuid::new_v4()));
        }
        world.state.store_result(empty(newest));

        assert!(world.state.result_of(oldest).is_none());
        assert!(world.state.result_of(newest).is_some());
    }
}
