//! Database-specific error types and conversions.

use signet_core::error::SignetError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid stored value: {0}")]
    Corrupt(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<DbError> for SignetError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => SignetError::NotFound { entity, id },
            other => SignetError::Database(other.to_string()),
        }
    }
}
