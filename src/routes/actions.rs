use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::actions::{ActionResponse, ActivationInput, AnswerInput, AnswerResponse, VoteInput, VoteResponse},
    error::AppError,
    services::{activation_service, battle_service},
    state::SharedState,
};

/// Participant channels: powers, answers and ballots.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions/{id}/activations", post(activate_power))
        .route("/sessions/{id}/answers", post(submit_answer))
        .route("/sessions/{id}/votes", post(cast_vote))
}

/// Activate a power for the current round.
///
/// Refusals are reported in the body with a rejection code, not as HTTP errors.
#[utoipa::path(
    post,
    path = "/sessions/{id}/activations",
    tag = "actions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ActivationInput,
    responses(
        (status = 200, description = "Accepted, rejected or ignored", body = ActionResponse),
        (status = 400, description = "Malformed activation"),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Session too contended; retry"),
        (status = 503, description = "Session store unavailable"),
    )
)]
pub async fn activate_power(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActivationInput>,
) -> Result<Json<ActionResponse>, AppError> {
    payload.validate()?;
    let acted = activation_service::activate(&state, id, payload.into()).await?;
    Ok(Json(ActionResponse::from(&acted)))
}

/// Answer the current question. Only the first answer of a participant counts.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answers",
    tag = "actions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = AnswerInput,
    responses(
        (status = 200, description = "Accepted, rejected or ignored", body = AnswerResponse),
        (status = 404, description = "Unknown session"),
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AnswerInput>,
) -> Result<Json<AnswerResponse>, AppError> {
    let acted =
        battle_service::submit_answer(&state, id, payload.participant_id, payload.choice).await?;
    Ok(Json(AnswerResponse::from(&acted)))
}

/// Vote on the open group divination.
#[utoipa::path(
    post,
    path = "/sessions/{id}/votes",
    tag = "actions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = VoteInput,
    responses(
        (status = 200, description = "Accepted, rejected or ignored", body = VoteResponse),
        (status = 404, description = "Unknown session"),
    )
)]
pub async fn cast_vote(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<VoteInput>,
) -> Result<Json<VoteResponse>, AppError> {
    let acted = battle_service::cast_vote(&state, id, payload.participant_id, payload.approve).await?;
    Ok(Json(VoteResponse::from(&acted)))
}
