use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde::Serialize;
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    dao::models::MatchStatus, dto::events::ServerEvent, error::ServiceError, state::SharedState,
};

/// Subscribe to the event stream of one match.
///
/// Subscriptions are accepted from the waiting room onwards so clients catch
/// the start announcement; a finished or cancelled match rejects them, so
/// nobody can park subscribers on dead ids.
pub async fn subscribe(
    state: &SharedState,
    match_id: Uuid,
) -> Result<broadcast::Receiver<ServerEvent>, ServiceError> {
    let record = state
        .collaborators()
        .matches
        .find(match_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no match with id {match_id}")))?;
    if matches!(record.status, MatchStatus::Finished | MatchStatus::Cancelled) {
        return Err(ServiceError::InvalidState("match is over".into()));
    }
    Ok(state.events().subscribe(match_id))
}

/// Serialize a payload and push it onto a match's event stream.
///
/// Serialization failures are logged and swallowed; a malformed event must
/// never break the pipeline that produced it.
pub fn broadcast<T: Serialize>(state: &SharedState, match_id: Uuid, name: &str, payload: &T) {
    match ServerEvent::json(name, payload) {
        Ok(event) => state.events().broadcast(match_id, event),
        Err(err) => {
            tracing::warn!(match_id = %match_id, event = name, error = %err, "failed to serialize event");
        }
    }
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    match_id: Uuid,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    // forwarder task: reads from broadcast and pushes into mpsc
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            let mut event = Event::default().data(payload.data);
                            if let Some(name) = payload.event {
                                event = event.event(name);
                            }

                            if tx.send(Ok(event)).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(_)) => {
                            // Skip lagged messages but keep the stream alive.
                            continue;
                        }
                    }
                }
            }
        }

        tracing::info!(match_id = %match_id, "match event stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
