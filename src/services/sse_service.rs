use std::{convert::Infallible, sync::Arc, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{models::SessionEntity, session_store::SessionSubscription},
    dto::{
        session::SessionView,
        sse::{Handshake, ServerEvent, SystemStatus},
    },
    error::ServiceError,
    services::battle_service,
    state::{SharedState, battle::BattleTemplate},
};

/// Everything a stream forwarder needs once the request context is gone.
struct SessionFeed {
    session_id: Uuid,
    viewer: Option<Uuid>,
    template: Arc<BattleTemplate>,
    commits: SessionSubscription,
    degraded: tokio::sync::watch::Receiver<bool>,
    snapshot: SessionEntity,
}

/// Open an event stream of one session: a handshake, the current document, then one
/// document per commit until the battle ends or the client disconnects.
pub async fn session_stream(
    state: &SharedState,
    session_id: Uuid,
    viewer: Option<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>> + use<>>, ServiceError> {
    let store = state.require_session_store().await?;
    // Subscribe before reading so no commit falls between the snapshot and the first change.
    let mut commits = store.subscribe(session_id);
    commits.mark_unchanged();
    let snapshot = battle_service::get_session(state, session_id).await?;
    let template = battle_service::load_template(state, &store, snapshot.session.template_id).await?;

    let feed = SessionFeed {
        session_id,
        viewer,
        template,
        commits,
        degraded: state.degraded_watcher(),
        snapshot,
    };
    info!(session_id = %session_id, viewer = ?viewer, "session stream opened");
    Ok(to_sse_stream(feed))
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

fn session_event(feed: &SessionFeed, entity: &SessionEntity) -> Option<Event> {
    let view = SessionView::build(entity, &feed.template, feed.viewer);
    match ServerEvent::json(Some("session".to_string()), &view) {
        Ok(payload) => Some(to_event(payload)),
        Err(err) => {
            warn!(session_id = %feed.session_id, error = %err, "failed to serialise session view");
            None
        }
    }
}

fn to_sse_stream(mut feed: SessionFeed) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let handshake = Handshake {
            session_id: feed.session_id,
            participant_id: feed.viewer,
            degraded: *feed.degraded.borrow_and_update(),
        };
        let mut opening = Vec::new();
        if let Ok(payload) = ServerEvent::json(Some("handshake".to_string()), &handshake) {
            opening.push(to_event(payload));
        }
        opening.extend(session_event(&feed, &feed.snapshot));
        for event in opening {
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }

        let mut last_version = feed.snapshot.version;
        let mut finished = feed.snapshot.session.phase.is_terminal();
        while !finished {
            tokio::select! {
                _ = tx.closed() => break,
                changed = feed.commits.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let latest = feed.commits.borrow_and_update().clone();
                    let Some(entity) = latest else { continue };
                    // Commits published out of order are skipped.
                    if entity.version <= last_version {
                        continue;
                    }
                    last_version = entity.version;
                    finished = entity.session.phase.is_terminal();
                    if let Some(event) = session_event(&feed, &entity) {
                        if tx.send(Ok(event)).await.is_err() {
                            break;
                        }
                    }
                }
                changed = feed.degraded.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let degraded = *feed.degraded.borrow_and_update();
                    if let Ok(payload) = ServerEvent::json(Some("system_status".to_string()), &SystemStatus { degraded }) {
                        if tx.send(Ok(to_event(payload))).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        debug!(session_id = %feed.session_id, last_version, "session stream forwarder stopped");
        info!(session_id = %feed.session_id, "session stream disconnected");
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::battle_service::tests::arena;

    #[tokio::test]
    async fn stream_of_unknown_session_is_refused() {
        let arena = arena(&[1], 1, 1).await;
        let result = session_stream(&arena.state, Uuid::new_v4(), None).await;
        assert!(matches!(result, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn commits_reach_subscribers() {
        let arena = arena(&[1, 1], 2, 3).await;
        let store = arena.state.require_session_store().await.unwrap();
        let mut commits = store.subscribe(arena.session_id);

        battle_service::start(&arena.state, arena.session_id, Some(arena.owner))
            .await
            .unwrap();
        commits.changed().await.unwrap();
        let latest = commits.borrow_and_update().clone().unwrap();
        assert_eq!(latest.version, 2);
        assert!(latest.session.phase.accepts_submissions());
    }
}
