//! SurrealDB implementation of [`AuditRepository`].
//!
//! The audit_event table is append-only; its schema denies update and
//! delete outright.

use signet_core::error::SignetResult;
use signet_core::models::audit::AuditEvent;
use signet_core::repository::AuditRepository;
use surrealdb::{Connection, Surreal};

use crate::error::DbError;

/// SurrealDB implementation of the audit repository.
#[derive(Clone)]
pub struct SurrealAuditRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAuditRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AuditRepository for SurrealAuditRepository<C> {
    async fn append(&self, event: &AuditEvent) -> SignetResult<()> {
        let fields: Vec<Vec<String>> = event
            .fields
            .iter()
            .map(|(name, value)| vec![name.clone(), value.clone()])
            .collect();

        self.db
            .query(
                "CREATE audit_event SET \
                 message_id = $message_id, \
                 app = $app, \
                 kind = $kind, \
                 outcome = $outcome, \
                 duration_ms = $duration_ms, \
                 fields = $fields, \
                 recorded_at = $recorded_at",
            )
            .bind(("message_id", event.message_id.to_string()))
            .bind(("app", event.app.clone()))
            .bind(("kind", event.kind.as_str().to_string()))
            .bind(("outcome", event.outcome.as_str().to_string()))
            .bind(("duration_ms", event.duration_ms))
            .bind(("fields", fields))
            .bind(("recorded_at", event.recorded_at))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }
}
