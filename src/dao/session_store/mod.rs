/// In-memory implementation used in tests and single-node deployments.
pub mod memory;
/// MongoDB implementation.
#[cfg(feature = "mongo-store")]
pub mod mongodb;
mod watchers;

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::watch;
use uuid::Uuid;

pub use self::watchers::SessionWatchers;
use crate::{
    dao::{
        models::{CommitBatch, CommitOutcome, ParticipantEntity, SessionEntity},
        storage::StorageResult,
    },
    state::battle::{BattleSession, BattleTemplate, Participant},
};

/// Receiver notified with the latest committed session document.
pub type SessionSubscription = watch::Receiver<Option<Arc<SessionEntity>>>;

/// Abstraction over the persistence layer for battle sessions and their collaborators.
///
/// `commit` is the only way the engine writes: every write of a batch is checked against the
/// version it was read at, and either all of them are applied or none.
pub trait SessionStore: Send + Sync {
    fn insert_session(&self, session: BattleSession) -> BoxFuture<'static, StorageResult<SessionEntity>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn commit(&self, batch: CommitBatch) -> BoxFuture<'static, StorageResult<CommitOutcome>>;
    fn subscribe(&self, session_id: Uuid) -> SessionSubscription;
    fn find_participants(
        &self,
        ids: Vec<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Create or replace a participant, bumping its version.
    fn save_participant(
        &self,
        participant: Participant,
    ) -> BoxFuture<'static, StorageResult<ParticipantEntity>>;
    fn find_template(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<BattleTemplate>>>;
    fn save_template(&self, template: BattleTemplate) -> BoxFuture<'static, StorageResult<()>>;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
