//! Seed plumbing for the participant and template collaborators the engine reads from.

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::ParticipantEntity,
    dto::roster::{ParticipantInput, TemplateInput, TemplateSummary},
    error::ServiceError,
    state::SharedState,
};

/// Create or replace a participant resource sheet.
pub async fn save_participant(
    state: &SharedState,
    id: Uuid,
    input: ParticipantInput,
) -> Result<ParticipantEntity, ServiceError> {
    let store = state.require_session_store().await?;
    let entity = store.save_participant(input.into_participant(id)).await?;
    info!(participant_id = %id, version = entity.version, "participant saved");
    Ok(entity)
}

/// Latest stored resource sheet of a participant.
pub async fn get_participant(state: &SharedState, id: Uuid) -> Result<ParticipantEntity, ServiceError> {
    let store = state.require_session_store().await?;
    store
        .find_participants(vec![id])
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ServiceError::NotFound(format!("participant `{id}` not found")))
}

/// Create or replace a battle template. Sessions already running keep the cached copy
/// until it is invalidated here.
pub async fn save_template(
    state: &SharedState,
    id: Uuid,
    input: TemplateInput,
) -> Result<TemplateSummary, ServiceError> {
    let store = state.require_session_store().await?;
    let template = input.into_template(id);
    let summary = TemplateSummary::from(&template);
    store.save_template(template).await?;
    state.template_cache().remove(&id);
    info!(template_id = %id, rounds = summary.rounds, "template saved");
    Ok(summary)
}
