//! Error types and driver error classification for the PostgreSQL backend.

use thiserror::Error;

use crate::dao::storage::StorageError;

/// Failures raised while setting up the PostgreSQL backend.
#[derive(Debug, Error)]
pub enum PgDaoError {
    /// The pool could not open its first connection.
    #[error("failed to connect to PostgreSQL")]
    Connect {
        #[source]
        source: sqlx::Error,
    },
    /// Embedded migrations failed to apply.
    #[error("failed to run database migrations")]
    Migrate {
        #[source]
        source: sqlx::migrate::MigrateError,
    },
    /// Writing the built-in question catalogue failed.
    #[error("failed to seed question catalogue")]
    Seed {
        #[source]
        source: sqlx::Error,
    },
}

/// Result alias for backend setup.
pub type PgResult<T> = Result<T, PgDaoError>;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

/// Map a driver error raised by `operation` onto the storage taxonomy.
pub fn classify(operation: &'static str, err: sqlx::Error) -> StorageError {
    let message = format!("{operation}: {err}");
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => StorageError::unavailable(message, err),
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(SERIALIZATION_FAILURE) | Some(DEADLOCK_DETECTED) => {
                StorageError::unavailable(message, err)
            }
            Some(UNIQUE_VIOLATION) => StorageError::conflict(message),
            _ => StorageError::query(message, err),
        },
        _ => StorageError::query(message, err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_exhaustion_is_transient() {
        assert!(matches!(
            classify("begin", sqlx::Error::PoolTimedOut),
            StorageError::Unavailable { .. }
        ));
    }

    #[test]
    fn missing_rows_are_not_retried() {
        assert!(matches!(
            classify("room_by_id", sqlx::Error::RowNotFound),
            StorageError::Query { .. }
        ));
    }
}
