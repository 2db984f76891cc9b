use mongodb::error::Error as MongoError;
use thiserror::Error;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to parse MongoDB connection URI")]
    InvalidUri {
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to insert session `{id}`")]
    InsertSession {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load session `{id}`")]
    LoadSession {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load participants")]
    LoadParticipants {
        #[source]
        source: MongoError,
    },
    #[error("failed to save participant `{id}`")]
    SaveParticipant {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("participant `{id}` kept changing while being saved")]
    ParticipantContended { id: String },
    #[error("failed to load template `{id}`")]
    LoadTemplate {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save template `{id}`")]
    SaveTemplate {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("commit transaction for session `{id}` failed")]
    Commit {
        id: String,
        #[source]
        source: MongoError,
    },
    #[error("stored document `{id}` carries an invalid version {version}")]
    InvalidVersion { id: String, version: i64 },
}
