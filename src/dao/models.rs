//! Backend agnostic documents exchanged with the session store.

use std::{sync::Arc, time::SystemTime};

use uuid::Uuid;

use crate::state::battle::{BattleSession, Participant};

/// Stored battle session with its optimistic concurrency version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEntity {
    /// Session document.
    pub session: BattleSession,
    /// Incremented on every successful write.
    pub version: u64,
    /// Time of the last successful write.
    pub updated_at: SystemTime,
}

impl SessionEntity {
    /// Identifier of the stored session.
    pub fn id(&self) -> Uuid {
        self.session.id
    }
}

/// Stored participant resource sheet with its version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Participant record.
    pub participant: Participant,
    /// Incremented on every successful write.
    pub version: u64,
}

/// Replacement of a document, valid only if the stored version still matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedWrite<T> {
    /// Version observed when the document was read.
    pub expected_version: u64,
    /// New document content.
    pub document: T,
}

/// All-or-nothing set of writes produced by one engine operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitBatch {
    /// New session document.
    pub session: VersionedWrite<BattleSession>,
    /// Participants whose resource sheets changed.
    pub participants: Vec<VersionedWrite<Participant>>,
    /// Commit timestamp.
    pub updated_at: SystemTime,
}

impl CommitBatch {
    /// Session entity as it will be stored once this batch is committed.
    pub fn committed_session(&self) -> SessionEntity {
        SessionEntity {
            session: self.session.document.clone(),
            version: self.session.expected_version + 1,
            updated_at: self.updated_at,
        }
    }
}

/// Result of a commit attempt.
#[derive(Debug, Clone)]
pub enum CommitOutcome {
    /// Every write was applied.
    Committed(Arc<SessionEntity>),
    /// At least one document changed since it was read; nothing was written.
    Conflict,
}
