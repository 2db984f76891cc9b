use std::{
    sync::{Arc, Mutex, PoisonError},
    time::SystemTime,
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tracing::debug;
use uuid::Uuid;

use super::{SessionStore, SessionSubscription, SessionWatchers};
use crate::{
    dao::{
        models::{CommitBatch, CommitOutcome, ParticipantEntity, SessionEntity},
        storage::StorageResult,
    },
    state::battle::{BattleSession, BattleTemplate, Participant},
};

/// Process-local store offering the same atomic commit contract as the database backends.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<Uuid, SessionEntity>,
    participants: DashMap<Uuid, ParticipantEntity>,
    templates: DashMap<Uuid, BattleTemplate>,
    write_gate: Mutex<()>,
    watchers: SessionWatchers,
}

impl MemorySessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn commit_batch(&self, batch: CommitBatch) -> CommitOutcome {
        let _gate = self
            .inner
            .write_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let session_id = batch.session.document.id;
        let session_matches = self
            .inner
            .sessions
            .get(&session_id)
            .is_some_and(|stored| stored.version == batch.session.expected_version);
        let participants_match = batch.participants.iter().all(|write| {
            self.inner
                .participants
                .get(&write.document.id)
                .is_some_and(|stored| stored.version == write.expected_version)
        });
        if !session_matches || !participants_match {
            debug!(session_id = %session_id, "memory commit conflict");
            return CommitOutcome::Conflict;
        }

        for write in &batch.participants {
            self.inner.participants.insert(
                write.document.id,
                ParticipantEntity {
                    participant: write.document.clone(),
                    version: write.expected_version + 1,
                },
            );
        }
        let entity = batch.committed_session();
        self.inner.sessions.insert(session_id, entity.clone());

        let entity = Arc::new(entity);
        self.inner.watchers.publish(entity.clone());
        CommitOutcome::Committed(entity)
    }

    fn upsert_participant(&self, participant: Participant) -> ParticipantEntity {
        let _gate = self
            .inner
            .write_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let version = self
            .inner
            .participants
            .get(&participant.id)
            .map_or(1, |stored| stored.version + 1);
        let entity = ParticipantEntity {
            participant,
            version,
        };
        self.inner
            .participants
            .insert(entity.participant.id, entity.clone());
        entity
    }
}

impl SessionStore for MemorySessionStore {
    fn insert_session(&self, session: BattleSession) -> BoxFuture<'static, StorageResult<SessionEntity>> {
        let store = self.clone();
        Box::pin(async move {
            let entity = SessionEntity {
                session,
                version: 1,
                updated_at: SystemTime::now(),
            };
            store.inner.sessions.insert(entity.id(), entity.clone());
            store.inner.watchers.publish(Arc::new(entity.clone()));
            Ok(entity)
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.sessions.get(&id).map(|entry| entry.clone())) })
    }

    fn commit(&self, batch: CommitBatch) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.commit_batch(batch)) })
    }

    fn subscribe(&self, session_id: Uuid) -> SessionSubscription {
        self.inner.watchers.subscribe(session_id)
    }

    fn find_participants(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(ids
                .iter()
                .filter_map(|id| store.inner.participants.get(id).map(|entry| entry.clone()))
                .collect())
        })
    }

    fn save_participant(
        &self,
        participant: Participant,
    ) -> BoxFuture<'static, StorageResult<ParticipantEntity>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.upsert_participant(participant)) })
    }

    fn find_template(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BattleTemplate>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.templates.get(&id).map(|entry| entry.clone())) })
    }

    fn save_template(&self, template: BattleTemplate) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.templates.insert(template.id, template);
            Ok(())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
