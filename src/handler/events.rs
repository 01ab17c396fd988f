use axum::extract::State;
use axum::response::sse::{Event, Sse};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::ScribeError;
use crate::hub::HubEvent;

/// Handler for GET /api/events
///
/// Each hub event becomes one SSE message named after its type whose data
/// is the whole `{type, data}` object.
pub async fn stream_events(
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ScribeError> {
    let subscriber = state.hub.register().await?;
    info!(subscriber_id = subscriber.id(), "event stream opened");

    let stream = subscriber
        .into_stream(state.settings.heartbeat())
        .filter_map(|event| async move { to_sse(&event).map(Ok::<_, Infallible>) });
    Ok(Sse::new(stream))
}

fn to_sse(event: &HubEvent) -> Option<Event> {
    match Event::default().event(event.kind.as_str()).json_data(event) {
        Ok(sse) => Some(sse),
        Err(e) => {
            warn!(kind = event.kind.as_str(), error = %e, "could not encode event");
            None
        }
    }
}
