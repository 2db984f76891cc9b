use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::watch;
use uuid::Uuid;

use super::SessionSubscription;
use crate::dao::models::SessionEntity;

/// Per-session watch channels fed after every successful commit.
#[derive(Default)]
pub struct SessionWatchers {
    channels: DashMap<Uuid, watch::Sender<Option<Arc<SessionEntity>>>>,
}

impl SessionWatchers {
    /// Subscribe to commits of `session_id`, creating the channel on first use.
    pub fn subscribe(&self, session_id: Uuid) -> SessionSubscription {
        self.channels
            .entry(session_id)
            .or_insert_with(|| watch::channel(None).0)
            .subscribe()
    }

    /// Publish a committed session to its subscribers. Channels nobody listens to are dropped.
    pub fn publish(&self, entity: Arc<SessionEntity>) {
        let id = entity.id();
        let abandoned = match self.channels.get(&id) {
            Some(sender) => {
                sender.send_replace(Some(entity));
                sender.receiver_count() == 0
            }
            None => false,
        };
        if abandoned {
            self.channels.remove_if(&id, |_, sender| sender.receiver_count() == 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use super::*;
    use crate::state::battle::{BattleSession, fixtures};

    fn entity(version: u64) -> Arc<SessionEntity> {
        let template = fixtures::template(1, 1);
        let mut session = BattleSession::new(Uuid::new_v4(), &template, &[], UNIX_EPOCH);
        session.id = Uuid::nil();
        Arc::new(SessionEntity {
            session,
            version,
            updated_at: UNIX_EPOCH,
        })
    }

    #[test]
    fn subscribers_see_latest_commit() {
        let watchers = SessionWatchers::default();
        let rx = watchers.subscribe(Uuid::nil());
        watchers.publish(entity(1));
        watchers.publish(entity(2));
        assert_eq!(rx.borrow().as_ref().map(|e| e.version), Some(2));
    }

    #[test]
    fn channels_without_receivers_are_dropped() {
        let watchers = SessionWatchers::default();
        drop(watchers.subscribe(Uuid::nil()));
        watchers.publish(entity(1));
        assert!(watchers.channels.is_empty());
    }
}
