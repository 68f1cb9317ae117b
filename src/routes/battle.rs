use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{get, post},
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::battle::{
        MatchResultResponse, MatchStateResponse, OwnerActionRequest, StartMatchResponse,
        SubmitAnswerRequest, SubmitAnswerResponse, UseConsumableRequest, UseConsumableResponse,
    },
    error::AppError,
    services::{battle_service, consumable_service},
    state::SharedState,
};

/// Routes handling match lifecycle and gameplay operations.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/matches/{id}/start", post(start_match))
        .route("/matches/{id}/answers", post(submit_answer))
        .route("/matches/{id}/consumables", post(use_consumable))
        .route("/matches/{id}/finish", post(finish_match))
        .route("/matches/{id}/state", get(match_state))
}

/// Start a waiting match and begin serving questions.
#[utoipa::path(
    post,
    path = "/matches/{id}/start",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Identifier of the match to start")),
    request_body = OwnerActionRequest,
    responses(
        (status = 200, description = "Match started", body = StartMatchResponse),
        (status = 403, description = "Actor is not the room owner"),
        (status = 409, description = "Match is not in the waiting state")
    )
)]
pub async fn start_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OwnerActionRequest>,
) -> Result<Json<StartMatchResponse>, AppError> {
    payload.validate()?;
    let response = battle_service::start_match(&state, id, payload.player_id).await?;
    Ok(Json(response))
}

/// Submit an answer to the question currently open.
#[utoipa::path(
    post,
    path = "/matches/{id}/answers",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Identifier of the match")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer scored", body = SubmitAnswerResponse),
        (status = 409, description = "Wrong question index or duplicate submission")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    payload.validate()?;
    let response = battle_service::submit_answer(&state, id, &payload).await?;
    Ok(Json(response))
}

/// Activate a consumable item during the match.
#[utoipa::path(
    post,
    path = "/matches/{id}/consumables",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Identifier of the match")),
    request_body = UseConsumableRequest,
    responses(
        (status = 200, description = "Consumable applied", body = UseConsumableResponse),
        (status = 409, description = "Item unavailable or not usable right now")
    )
)]
pub async fn use_consumable(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UseConsumableRequest>,
) -> Result<Json<UseConsumableResponse>, AppError> {
    payload.validate()?;
    let response = consumable_service::use_consumable(&state, id, &payload).await?;
    Ok(Json(response))
}

/// Finish the match early and publish the final results.
#[utoipa::path(
    post,
    path = "/matches/{id}/finish",
    tag = "matches",
    params(("id" = Uuid, Path, description = "Identifier of the match to finish")),
    request_body = OwnerActionRequest,
    responses(
        (status = 200, description = "Match finalized, or the stored result of an already finished match", body = MatchResultResponse),
        (status = 403, description = "Actor is not the room owner")
    )
)]
pub async fn finish_match(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<OwnerActionRequest>,
) -> Result<Json<MatchResultResponse>, AppError> {
    payload.validate()?;
    let response = battle_service::finish_match(&state, id, payload.player_id).await?;
    Ok(Json(response))
}

/// Query string of the state endpoint.
#[derive(Debug, Deserialize, IntoParams)]
pub struct StateQuery {
    /// Requesting player; when set, their private state is included.
    pub player_id: Option<Uuid>,
}

/// Resynchronize a client with the full state of a match.
#[utoipa::path(
    get,
    path = "/matches/{id}/state",
    tag = "matches",
    params(
        ("id" = Uuid, Path, description = "Identifier of the match"),
        StateQuery
    ),
    responses(
        (status = 200, description = "Current match state", body = MatchStateResponse),
        (status = 404, description = "Unknown match")
    )
)]
pub async fn match_state(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<StateQuery>,
) -> Result<Json<MatchStateResponse>, AppError> {
    let response = battle_service::sync_state(&state, id, query.player_id).await?;
    Ok(Json(response))
}
