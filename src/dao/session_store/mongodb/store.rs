use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, ClientSession, Collection, Database, IndexModel,
    bson::doc,
    error::{Error as MongoError, TRANSIENT_TRANSACTION_ERROR},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{ParticipantDocument, SessionDocument, TemplateDocument, doc_id, ids_in, versioned_id},
};
use crate::{
    dao::{
        models::{CommitBatch, CommitOutcome, ParticipantEntity, SessionEntity},
        session_store::{SessionStore, SessionSubscription, SessionWatchers},
        storage::StorageResult,
    },
    state::battle::{BattleSession, BattleTemplate, Participant},
};

const SESSION_COLLECTION: &str = "battle_sessions";
const PARTICIPANT_COLLECTION: &str = "participants";
const TEMPLATE_COLLECTION: &str = "battle_templates";
const SAVE_PARTICIPANT_ATTEMPTS: u32 = 5;

/// Session store backed by MongoDB. Commits run inside multi-document transactions,
/// which requires a replica set deployment.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
    watchers: SessionWatchers,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.state.read().await.database.clone();
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

enum BatchWrite {
    Applied,
    Stale,
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                config,
                watchers: SessionWatchers::default(),
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let collection = self.sessions().await;
        let index = IndexModel::builder()
            .keys(doc! { "session.template_id": 1 })
            .options(
                IndexOptions::builder()
                    .name(Some("session_template_idx".to_owned()))
                    .build(),
            )
            .build();

        collection
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION,
                index: "session.template_id",
                source,
            })?;
        Ok(())
    }

    async fn client(&self) -> Client {
        self.inner.state.read().await.client.clone()
    }

    async fn sessions(&self) -> Collection<SessionDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(SESSION_COLLECTION)
    }

    async fn participants(&self) -> Collection<ParticipantDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(PARTICIPANT_COLLECTION)
    }

    async fn templates(&self) -> Collection<TemplateDocument> {
        let guard = self.inner.state.read().await;
        guard.database.collection(TEMPLATE_COLLECTION)
    }

    async fn insert_session(&self, session: BattleSession) -> MongoResult<SessionEntity> {
        let id = session.id;
        let document = SessionDocument::new(session, 1, std::time::SystemTime::now());
        self.sessions()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::InsertSession {
                id: id.to_string(),
                source,
            })?;
        let entity = SessionEntity::try_from(document)?;
        self.inner.watchers.publish(Arc::new(entity.clone()));
        Ok(entity)
    }

    async fn find_session(&self, id: Uuid) -> MongoResult<Option<SessionEntity>> {
        let document = self
            .sessions()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession {
                id: id.to_string(),
                source,
            })?;
        document.map(SessionEntity::try_from).transpose()
    }

    async fn find_participants(&self, ids: Vec<Uuid>) -> MongoResult<Vec<ParticipantEntity>> {
        let documents: Vec<ParticipantDocument> = self
            .participants()
            .await
            .find(ids_in(&ids))
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { source })?;

        documents.into_iter().map(ParticipantEntity::try_from).collect()
    }

    async fn save_participant(&self, participant: Participant) -> MongoResult<ParticipantEntity> {
        let id = participant.id;
        let collection = self.participants().await;
        let save_error = |source| MongoDaoError::SaveParticipant {
            id: id.to_string(),
            source,
        };

        for _ in 0..SAVE_PARTICIPANT_ATTEMPTS {
            let current = collection.find_one(doc_id(id)).await.map_err(save_error)?;
            match current {
                Some(stored) => {
                    let stored = ParticipantEntity::try_from(stored)?;
                    let document = ParticipantDocument::new(participant.clone(), stored.version + 1);
                    let result = collection
                        .replace_one(versioned_id(id, stored.version), &document)
                        .await
                        .map_err(save_error)?;
                    if result.matched_count == 1 {
                        return ParticipantEntity::try_from(document);
                    }
                }
                None => {
                    let document = ParticipantDocument::new(participant.clone(), 1);
                    match collection.insert_one(&document).await {
                        Ok(_) => return ParticipantEntity::try_from(document),
                        Err(err) => debug!(participant_id = %id, error = %err, "participant insert raced; retrying"),
                    }
                }
            }
        }

        Err(MongoDaoError::ParticipantContended { id: id.to_string() })
    }

    async fn find_template(&self, id: Uuid) -> MongoResult<Option<BattleTemplate>> {
        let document = self
            .templates()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadTemplate {
                id: id.to_string(),
                source,
            })?;
        Ok(document.map(BattleTemplate::from))
    }

    async fn save_template(&self, template: BattleTemplate) -> MongoResult<()> {
        let id = template.id;
        let document = TemplateDocument::from(template);
        self.templates()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveTemplate {
                id: id.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn commit(&self, batch: CommitBatch) -> MongoResult<CommitOutcome> {
        let session_id = batch.session.document.id;
        let commit_error = |source| MongoDaoError::Commit {
            id: session_id.to_string(),
            source,
        };

        let client = self.client().await;
        let mut transaction = client.start_session().await.map_err(commit_error)?;
        transaction.start_transaction().await.map_err(commit_error)?;

        let written = self.write_batch(&mut transaction, &batch).await;
        let outcome = match written {
            Ok(BatchWrite::Applied) => match transaction.commit_transaction().await {
                Ok(()) => {
                    let entity = Arc::new(batch.committed_session());
                    self.inner.watchers.publish(entity.clone());
                    return Ok(CommitOutcome::Committed(entity));
                }
                Err(err) if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                    debug!(session_id = %session_id, error = %err, "transaction commit was transient");
                    return Ok(CommitOutcome::Conflict);
                }
                Err(err) => return Err(commit_error(err)),
            },
            Ok(BatchWrite::Stale) => Ok(CommitOutcome::Conflict),
            Err(err) if err.contains_label(TRANSIENT_TRANSACTION_ERROR) => {
                debug!(session_id = %session_id, error = %err, "transaction write conflict");
                Ok(CommitOutcome::Conflict)
            }
            Err(err) => Err(commit_error(err)),
        };

        if let Err(err) = transaction.abort_transaction().await {
            warn!(session_id = %session_id, error = %err, "failed to abort MongoDB transaction");
        }
        outcome
    }

    async fn write_batch(
        &self,
        transaction: &mut ClientSession,
        batch: &CommitBatch,
    ) -> Result<BatchWrite, MongoError> {
        let session = &batch.session;
        let document = SessionDocument::new(
            session.document.clone(),
            session.expected_version + 1,
            batch.updated_at,
        );
        let result = self
            .sessions()
            .await
            .replace_one(
                versioned_id(session.document.id, session.expected_version),
                &document,
            )
            .session(&mut *transaction)
            .await?;
        if result.matched_count == 0 {
            return Ok(BatchWrite::Stale);
        }

        let participants = self.participants().await;
        for write in &batch.participants {
            let document =
                ParticipantDocument::new(write.document.clone(), write.expected_version + 1);
            let result = participants
                .replace_one(
                    versioned_id(write.document.id, write.expected_version),
                    &document,
                )
                .session(&mut *transaction)
                .await?;
            if result.matched_count == 0 {
                return Ok(BatchWrite::Stale);
            }
        }

        Ok(BatchWrite::Applied)
    }
}

impl SessionStore for MongoSessionStore {
    fn insert_session(&self, session: BattleSession) -> BoxFuture<'static, StorageResult<SessionEntity>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await.map_err(Into::into) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session(id).await.map_err(Into::into) })
    }

    fn commit(&self, batch: CommitBatch) -> BoxFuture<'static, StorageResult<CommitOutcome>> {
        let store = self.clone();
        Box::pin(async move { store.commit(batch).await.map_err(Into::into) })
    }

    fn subscribe(&self, session_id: Uuid) -> SessionSubscription {
        self.inner.watchers.subscribe(session_id)
    }

    fn find_participants(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_participants(ids).await.map_err(Into::into) })
    }

    fn save_participant(
        &self,
        participant: Participant,
    ) -> BoxFuture<'static, StorageResult<ParticipantEntity>> {
        let store = self.clone();
        Box::pin(async move { store.save_participant(participant).await.map_err(Into::into) })
    }

    fn find_template(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BattleTemplate>>> {
        let store = self.clone();
        Box::pin(async move { store.find_template(id).await.map_err(Into::into) })
    }

    fn save_template(&self, template: BattleTemplate) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_template(template).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
