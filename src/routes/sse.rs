use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, Query, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use uuid::Uuid;

use crate::{
    dto::session::ViewerQuery, error::AppError, services::sse_service, state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "sse",
    params(
        ("id" = Uuid, Path, description = "Session to follow"),
        ViewerQuery,
    ),
    responses(
        (status = 200, description = "Session document after every commit", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session"),
        (status = 503, description = "Session store unavailable"),
    )
)]
/// Stream the session document, including the viewer's targeted notices.
pub async fn session_events(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    Ok(sse_service::session_stream(&state, id, viewer.participant_id).await?)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sessions/{id}/events", get(session_events))
}
