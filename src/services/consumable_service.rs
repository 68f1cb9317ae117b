//! Activation of limited-use items during a match.

use rand::seq::SliceRandom;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{TakeOutcome, models::{ConsumableKind, OptionKey}},
    dto::{
        battle::{UseConsumableRequest, UseConsumableResponse},
        events::{self, ItemUsedEvent},
    },
    error::ServiceError,
    services::event_service,
    state::{BattleSession, SharedState},
};

/// Multiplier armed by the double-points item.
const DOUBLE_MULTIPLIER: f64 = 2.0;
/// Multiplier armed by the triple-points item.
const TRIPLE_MULTIPLIER: f64 = 3.0;

/// Every in-match precondition for activating one consumable.
///
/// Returns the open question index for the kinds scoped to the current
/// question, `None` for the rest.
fn check_activation(
    session: &BattleSession,
    player_id: Uuid,
    kind: ConsumableKind,
) -> Result<Option<usize>, ServiceError> {
    if session.is_finished() {
        return Err(ServiceError::InvalidState("match is already over".into()));
    }

    let player = session
        .player(player_id)
        .ok_or_else(|| ServiceError::Forbidden("player is not on the roster".into()))?;
    if player.used_consumables.contains(&kind) {
        return Err(ServiceError::ConsumableUnavailable(format!(
            "{} already used this match",
            kind.label()
        )));
    }

    match kind {
        ConsumableKind::DoublePoints | ConsumableKind::TriplePoints => {
            if player.pending_multiplier.is_some() {
                return Err(ServiceError::ConsumableUnavailable(
                    "a point multiplier is already armed".into(),
                ));
            }
            Ok(None)
        }
        ConsumableKind::Shield => {
            if player.shielded {
                return Err(ServiceError::ConsumableUnavailable(
                    "a combo shield is already armed".into(),
                ));
            }
            Ok(None)
        }
        ConsumableKind::FiftyFifty
        | ConsumableKind::SkipQuestion
        | ConsumableKind::RevealAnswer => {
            let current = session.current_index().ok_or_else(|| {
                ServiceError::InvalidState("no question is open for answers".into())
            })?;
            if session.has_answered(current, player_id) {
                return Err(ServiceError::InvalidState(
                    "question was already answered".into(),
                ));
            }
            if player.skipped_current {
                return Err(ServiceError::InvalidState(
                    "question was already skipped".into(),
                ));
            }
            if kind == ConsumableKind::FiftyFifty && !player.hidden_options.is_empty() {
                return Err(ServiceError::ConsumableUnavailable(
                    "a hint is already active for this question".into(),
                ));
            }
            Ok(Some(current))
        }
    }
}

/// Activate one consumable for a player.
///
/// The inventory unit is only taken after every in-match precondition holds,
/// so a rejected activation never costs the player an item. The session lock
/// is dropped around the inventory call so a slow backend never stalls the
/// match; the preconditions are re-checked before the effect is applied.
pub async fn use_consumable(
    state: &SharedState,
    match_id: Uuid,
    request: &UseConsumableRequest,
) -> Result<UseConsumableResponse, ServiceError> {
    let handle = state
        .sessions()
        .get(match_id)
        .ok_or_else(|| ServiceError::NotFound(format!("no live match with id {match_id}")))?;

    let kind = request.kind;
    let scope = {
        let session = handle.lock().await;
        check_activation(&session, request.player_id, kind)?
    };

    let remaining = match state
        .collaborators()
        .inventory
        .take(request.player_id, kind)
        .await?
    {
        TakeOutcome::Taken { remaining } => remaining,
        TakeOutcome::Empty => {
            return Err(ServiceError::ConsumableUnavailable(format!(
                "no {} left in inventory",
                kind.label()
            )));
        }
        TakeOutcome::DailyLimitReached => {
            return Err(ServiceError::ConsumableUnavailable(format!(
                "daily limit for {} reached",
                kind.label()
            )));
        }
    };

    let mut session = handle.lock().await;
    // The lock was released while the unit was taken, so the match may have
    // moved on. Re-validate; a failure here costs the unit, which beats
    // holding the lock across a storage call.
    let revalidated = check_activation(&session, request.player_id, kind)
        .ok()
        .filter(|current| *current == scope)
        .is_some();
    if !revalidated {
        warn!(match_id = %match_id, player_id = %request.player_id, item = kind.label(),
            "match state changed during activation; unit consumed");
        return Err(ServiceError::ConsumableUnavailable(
            "match state changed during activation".into(),
        ));
    }

    let mut response = UseConsumableResponse {
        kind,
        remaining,
        hidden_options: Vec::new(),
        revealed_option: None,
    };
    let mut all_answered = false;

    match kind {
        ConsumableKind::DoublePoints | ConsumableKind::TriplePoints => {
            let multiplier = if kind == ConsumableKind::DoublePoints {
                DOUBLE_MULTIPLIER
            } else {
                TRIPLE_MULTIPLIER
            };
            if let Some(player) = session.player_mut(request.player_id) {
                player.pending_multiplier = Some(multiplier);
            }
        }
        ConsumableKind::Shield => {
            if let Some(player) = session.player_mut(request.player_id) {
                player.shielded = true;
            }
        }
        ConsumableKind::FiftyFifty => {
            let hidden = session
                .current_question()
                .map(|question| pick_hidden_options(question.correct_option))
                .unwrap_or_default();
            if let Some(player) = session.player_mut(request.player_id) {
                player.hidden_options = hidden.clone();
            }
            response.hidden_options = hidden;
        }
        ConsumableKind::SkipQuestion => {
            if let Some(player) = session.player_mut(request.player_id) {
                player.skipped_current = true;
            }
            all_answered = session.all_answered();
        }
        ConsumableKind::RevealAnswer => {
            response.revealed_option = session
                .current_question()
                .map(|question| question.correct_option);
        }
    }

    if let Some(player) = session.player_mut(request.player_id) {
        player.used_consumables.insert(kind);
    }
    drop(session);

    info!(match_id = %match_id, player_id = %request.player_id, item = kind.label(), "consumable used");
    event_service::broadcast(
        state,
        match_id,
        events::names::ITEM_USED,
        &ItemUsedEvent {
            player_id: request.player_id,
            kind,
        },
    );

    if all_answered {
        state.nudge_driver(match_id);
    }

    Ok(response)
}

/// Two wrong options chosen at random, leaving the correct one and one decoy.
fn pick_hidden_options(correct: OptionKey) -> Vec<OptionKey> {
    let mut wrong: Vec<OptionKey> = OptionKey::ALL
        .into_iter()
        .filter(|key| *key != correct)
        .collect();
    wrong.shuffle(&mut rand::rng());
    wrong.truncate(2);
    wrong
}
