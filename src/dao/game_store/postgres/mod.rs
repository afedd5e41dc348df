//! PostgreSQL storage backend built on `sqlx`.

mod config;
mod error;
mod rows;
pub mod store;

pub use config::PgConfig;
pub use error::PgDaoError;
pub use store::PgGameStore;

use crate::dao::storage::StorageError;

impl From<PgDaoError> for StorageError {
    fn from(err: PgDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
