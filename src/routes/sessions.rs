use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        actions::{ActionResponse, AdvanceResponse, CloseRoundResponse},
        session::{CreateSessionRequest, LifecycleRequest, SessionView, ViewerQuery},
    },
    error::AppError,
    services::{
        battle_service::{self, NewBattle},
        view_service,
    },
    state::SharedState,
};

/// Session creation, inspection and lifecycle routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions", post(create_session))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/start", post(start_battle))
        .route("/sessions/{id}/close-round", post(close_round))
        .route("/sessions/{id}/advance", post(advance))
        .route("/sessions/{id}/abandon", post(abandon))
}

/// Create a battle in the waiting phase.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Battle created", body = SessionView),
        (status = 400, description = "Invalid roster"),
        (status = 404, description = "Unknown template or participant"),
        (status = 503, description = "Session store unavailable"),
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionView>), AppError> {
    payload.validate()?;
    let entity = battle_service::create_session(
        &state,
        NewBattle {
            owner_id: payload.owner_id,
            template_id: payload.template_id,
            participant_ids: payload.participant_ids,
        },
    )
    .await?;
    let view = view_service::render(&state, &entity, None).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// Latest committed session document.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier"), ViewerQuery),
    responses(
        (status = 200, description = "Session document", body = SessionView),
        (status = 404, description = "Unknown session"),
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(viewer): Query<ViewerQuery>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(
        view_service::session_view(&state, id, viewer.participant_id).await?,
    ))
}

/// Open the first round.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = LifecycleRequest,
    responses(
        (status = 200, description = "Outcome of the request", body = ActionResponse),
        (status = 401, description = "Caller is not the session owner"),
    )
)]
pub async fn start_battle(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LifecycleRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let acted = battle_service::start(&state, id, Some(payload.requested_by)).await?;
    Ok(Json(ActionResponse::from(&acted)))
}

/// Close the open round before its deadline and resolve it.
#[utoipa::path(
    post,
    path = "/sessions/{id}/close-round",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = LifecycleRequest,
    responses(
        (status = 200, description = "Outcome with the round breakdown when resolved", body = CloseRoundResponse),
        (status = 401, description = "Caller is not the session owner"),
    )
)]
pub async fn close_round(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LifecycleRequest>,
) -> Result<Json<CloseRoundResponse>, AppError> {
    let acted = battle_service::close_round(&state, id, Some(payload.requested_by)).await?;
    Ok(Json(CloseRoundResponse::from(&acted)))
}

/// Leave the results: open the next round or end the battle.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = LifecycleRequest,
    responses(
        (status = 200, description = "Outcome, with the finish reason when the battle ended", body = AdvanceResponse),
        (status = 401, description = "Caller is not the session owner"),
    )
)]
pub async fn advance(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LifecycleRequest>,
) -> Result<Json<AdvanceResponse>, AppError> {
    let acted = battle_service::advance(&state, id, Some(payload.requested_by)).await?;
    Ok(Json(AdvanceResponse::from(&acted)))
}

/// End the battle without resolving pending strikes or votes.
#[utoipa::path(
    post,
    path = "/sessions/{id}/abandon",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = LifecycleRequest,
    responses(
        (status = 200, description = "Outcome of the request", body = ActionResponse),
        (status = 401, description = "Caller is not the session owner"),
    )
)]
pub async fn abandon(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<LifecycleRequest>,
) -> Result<Json<ActionResponse>, AppError> {
    let acted = battle_service::abandon(&state, id, Some(payload.requested_by)).await?;
    Ok(Json(ActionResponse::from(&acted)))
}
