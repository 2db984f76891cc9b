use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the battle engine.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::create_session,
        crate::routes::sessions::get_session,
        crate::routes::sessions::start_battle,
        crate::routes::sessions::close_round,
        crate::routes::sessions::advance,
        crate::routes::sessions::abandon,
        crate::routes::actions::activate_power,
        crate::routes::actions::submit_answer,
        crate::routes::actions::cast_vote,
        crate::routes::sse::session_events,
        crate::routes::roster::put_participant,
        crate::routes::roster::get_participant,
        crate::routes::roster::put_template,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::LifecycleRequest,
            crate::dto::session::SessionView,
            crate::dto::actions::ActivationInput,
            crate::dto::actions::AnswerInput,
            crate::dto::actions::VoteInput,
            crate::dto::actions::ActionResponse,
            crate::dto::actions::AnswerResponse,
            crate::dto::actions::VoteResponse,
            crate::dto::actions::CloseRoundResponse,
            crate::dto::actions::AdvanceResponse,
            crate::dto::roster::ParticipantInput,
            crate::dto::roster::ParticipantView,
            crate::dto::roster::TemplateInput,
            crate::dto::roster::TemplateSummary,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::state::battle::RoundBreakdown,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Battle session lifecycle"),
        (name = "actions", description = "Participant answers, powers and votes"),
        (name = "roster", description = "Participant and template seeding"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_describes_round_breakdown_rosters_as_uuids() {
        let doc = serde_json::to_value(ApiDoc::openapi()).unwrap();

        let breakdown = &doc["components"]["schemas"]["RoundBreakdown"]["properties"];
        for field in ["correct", "incorrect", "newly_defeated"] {
            assert_eq!(breakdown[field]["type"], "array");
            assert_eq!(breakdown[field]["items"]["format"], "uuid");
        }
        assert!(doc["paths"]["/sessions/{id}/events"].is_object());
        assert!(doc["components"]["schemas"]["TemplateInput"].is_object());
    }
}
