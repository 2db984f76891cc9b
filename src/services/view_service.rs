use uuid::Uuid;

use crate::{
    dao::models::SessionEntity,
    dto::session::SessionView,
    error::ServiceError,
    services::battle_service,
    state::SharedState,
};

/// Project a stored session for `viewer`, loading its template through the cache.
pub async fn render(
    state: &SharedState,
    entity: &SessionEntity,
    viewer: Option<Uuid>,
) -> Result<SessionView, ServiceError> {
    let store = state.require_session_store().await?;
    let template = battle_service::load_template(state, &store, entity.session.template_id).await?;
    Ok(SessionView::build(entity, &template, viewer))
}

/// Latest committed session, as seen by `viewer`.
pub async fn session_view(
    state: &SharedState,
    session_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<SessionView, ServiceError> {
    let entity = battle_service::get_session(state, session_id).await?;
    render(state, &entity, viewer).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dto::phase::VisiblePhase, services::battle_service::tests::arena};

    #[tokio::test]
    async fn view_follows_the_lifecycle() {
        let arena = arena(&[1, 1], 2, 3).await;
        let waiting = session_view(&arena.state, arena.session_id, None).await.unwrap();
        assert_eq!(waiting.phase, VisiblePhase::Waiting);
        assert!(waiting.question.is_none());
        assert_eq!(waiting.total_rounds, 2);

        battle_service::start(&arena.state, arena.session_id, Some(arena.owner))
            .await
            .unwrap();
        let open = session_view(&arena.state, arena.session_id, Some(arena.roster[0].id))
            .await
            .unwrap();
        assert_eq!(open.phase, VisiblePhase::InProgress);
        assert_eq!(open.question.unwrap().answers.len(), 4);
        assert_eq!(open.version, waiting.version + 1);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let arena = arena(&[1], 1, 1).await;
        let err = session_view(&arena.state, Uuid::new_v4(), None).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
