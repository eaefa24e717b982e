//! Error types for the SIGNET system.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SignetError {
    /// Admission was rejected by the duplication policy. Carries the id
    /// of the surviving certificate the request conflicts with.
    #[error("duplicate entry: conflicts with certificate {conflict}")]
    DuplicateEntry { conflict: Uuid },

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// A lifecycle transition that the state machine does not permit,
    /// e.g. removing a certificate that was never revoked.
    #[error("invalid transition for {entity}: {from} -> {to}")]
    InvalidTransition {
        entity: String,
        from: String,
        to: String,
    },

    /// The CA lacks the permission required for the operation.
    #[error("operation {operation} not permitted for CA {ca}")]
    NotPermitted { operation: String, ca: String },

    /// The requested validity period violates the CA's validity mode,
    /// e.g. a certificate that would outlive a strict-mode CA.
    #[error("validity rejected for CA {ca}: {reason}")]
    ValidityRejected { ca: String, reason: String },

    /// Invalid configuration (unknown mode string, unknown permission
    /// name). Fatal at configuration time, never silently defaulted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A publication target could not be reached. Transient; retried by
    /// the publish queue and never surfaced to the original caller.
    #[error("publisher {publisher} unreachable: {reason}")]
    PublisherUnreachable { publisher: String, reason: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SignetResult<T> = Result<T, SignetError>;

impl SignetError {
    /// Shorthand for the common not-found case.
    pub fn not_found(entity: impl Into<String>, id: impl ToString) -> Self {
        SignetError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }
}
