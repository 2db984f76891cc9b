use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, put},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::roster::{ParticipantInput, ParticipantView, TemplateInput, TemplateSummary},
    error::AppError,
    services::roster_service,
    state::SharedState,
};

/// Seeding routes standing in for the roster and authoring subsystems.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route(
            "/participants/{id}",
            get(get_participant).put(put_participant),
        )
        .route("/templates/{id}", put(put_template))
}

/// Create or replace a participant resource sheet.
#[utoipa::path(
    put,
    path = "/participants/{id}",
    tag = "roster",
    params(("id" = Uuid, Path, description = "Participant identifier")),
    request_body = ParticipantInput,
    responses(
        (status = 200, description = "Participant stored", body = ParticipantView),
        (status = 400, description = "Invalid resource sheet"),
    )
)]
pub async fn put_participant(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ParticipantInput>,
) -> Result<Json<ParticipantView>, AppError> {
    payload.validate()?;
    let entity = roster_service::save_participant(&state, id, payload).await?;
    Ok(Json(entity.into()))
}

/// Current resource sheet of a participant.
#[utoipa::path(
    get,
    path = "/participants/{id}",
    tag = "roster",
    params(("id" = Uuid, Path, description = "Participant identifier")),
    responses(
        (status = 200, description = "Participant", body = ParticipantView),
        (status = 404, description = "Unknown participant"),
    )
)]
pub async fn get_participant(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ParticipantView>, AppError> {
    let entity = roster_service::get_participant(&state, id).await?;
    Ok(Json(entity.into()))
}

/// Create or replace a battle template.
#[utoipa::path(
    put,
    path = "/templates/{id}",
    tag = "roster",
    params(("id" = Uuid, Path, description = "Template identifier")),
    request_body = TemplateInput,
    responses(
        (status = 200, description = "Template stored", body = TemplateSummary),
        (status = 400, description = "Invalid template"),
    )
)]
pub async fn put_template(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<TemplateInput>,
) -> Result<Json<TemplateSummary>, AppError> {
    payload.validate_all()?;
    Ok(Json(roster_service::save_template(&state, id, payload).await?))
}
