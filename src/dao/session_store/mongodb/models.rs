use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::{
    dao::models::{ParticipantEntity, SessionEntity},
    state::battle::{BattleSession, BattleTemplate, Participant},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDocument {
    #[serde(rename = "_id")]
    id: String,
    version: i64,
    updated_at: DateTime,
    session: BattleSession,
}

impl SessionDocument {
    pub fn new(session: BattleSession, version: u64, updated_at: std::time::SystemTime) -> Self {
        Self {
            id: session.id.to_string(),
            version: version as i64,
            updated_at: DateTime::from_system_time(updated_at),
            session,
        }
    }
}

impl TryFrom<SessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: SessionDocument) -> MongoResult<Self> {
        Ok(Self {
            version: checked_version(&value.id, value.version)?,
            updated_at: value.updated_at.to_system_time(),
            session: value.session,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantDocument {
    #[serde(rename = "_id")]
    id: String,
    pub version: i64,
    participant: Participant,
}

impl ParticipantDocument {
    pub fn new(participant: Participant, version: u64) -> Self {
        Self {
            id: participant.id.to_string(),
            version: version as i64,
            participant,
        }
    }
}

impl TryFrom<ParticipantDocument> for ParticipantEntity {
    type Error = MongoDaoError;

    fn try_from(value: ParticipantDocument) -> MongoResult<Self> {
        Ok(Self {
            version: checked_version(&value.id, value.version)?,
            participant: value.participant,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDocument {
    #[serde(rename = "_id")]
    id: String,
    template: BattleTemplate,
}

impl From<BattleTemplate> for TemplateDocument {
    fn from(template: BattleTemplate) -> Self {
        Self {
            id: template.id.to_string(),
            template,
        }
    }
}

impl From<TemplateDocument> for BattleTemplate {
    fn from(value: TemplateDocument) -> Self {
        value.template
    }
}

fn checked_version(id: &str, version: i64) -> MongoResult<u64> {
    u64::try_from(version).map_err(|_| MongoDaoError::InvalidVersion {
        id: id.to_owned(),
        version,
    })
}

pub fn doc_id(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

/// Filter matching a document only while it is still at `version`.
pub fn versioned_id(id: Uuid, version: u64) -> Document {
    doc! { "_id": id.to_string(), "version": version as i64 }
}

pub fn ids_in(ids: &[Uuid]) -> Document {
    let ids: Vec<String> = ids.iter().map(Uuid::to_string).collect();
    doc! { "_id": { "$in": ids } }
}
