use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::Sse,
    routing::get,
};
use futures::Stream;
use tracing::info;
use uuid::Uuid;

use crate::{error::AppError, services::event_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/matches/{id}/events",
    tag = "events",
    params(("id" = Uuid, Path, description = "Identifier of the match")),
    responses(
        (status = 200, description = "Match SSE stream", content_type = "text/event-stream", body = String),
        (status = 404, description = "No live match with this id")
    )
)]
/// Stream realtime match events to connected clients.
pub async fn match_stream(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>>, AppError> {
    let receiver = event_service::subscribe(&state, id).await?;
    info!(match_id = %id, "new match SSE connection");
    Ok(event_service::to_sse_stream(receiver, id))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/matches/{id}/events", get(match_stream))
}
