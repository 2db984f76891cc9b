mod config;
mod connection;
mod error;
mod models;
mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoSessionStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::InvalidVersion { id, version } => StorageError::Corrupted {
                id,
                message: format!("invalid version {version}"),
            },
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
