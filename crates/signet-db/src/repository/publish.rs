//! SurrealDB implementation of [`PublishQueueRepository`].
//!
//! The durable half of the publication queue. Rows are appended on
//! every committed lifecycle transition and removed on confirmed
//! delivery or administrative clear; the in-memory FIFOs are rebuilt
//! from `pending` at startup.

use chrono::{DateTime, Utc};
use signet_core::error::SignetResult;
use signet_core::models::publish::{
    CaScope, PublishOperation, PublishPayload, PublishTask, PublisherScope,
};
use signet_core::repository::PublishQueueRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct TaskRowWithId {
    record_id: String,
    ca_name: String,
    publisher: String,
    operation: String,
    payload_kind: String,
    cert_id: Option<String>,
    crl_number: Option<u64>,
    enqueued_at: DateTime<Utc>,
    attempts: u32,
    generation: u64,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

fn parse_operation(s: &str) -> Result<PublishOperation, DbError> {
    Ok(match s {
        "cert_issued" => PublishOperation::CertIssued,
        "cert_revoked" => PublishOperation::CertRevoked,
        "cert_unrevoked" => PublishOperation::CertUnrevoked,
        "cert_removed" => PublishOperation::CertRemoved,
        "ca_revoked" => PublishOperation::CaRevoked,
        "ca_unrevoked" => PublishOperation::CaUnrevoked,
        "crl_generated" => PublishOperation::CrlGenerated,
        other => {
            return Err(DbError::Corrupt(format!(
                "unknown publish operation: {other}"
            )));
        }
    })
}

/// (payload_kind, cert_id, crl_number) columns for a payload.
fn payload_columns(payload: &PublishPayload) -> (&'static str, Option<String>, Option<u64>) {
    match payload {
        PublishPayload::Cert { cert_id } => ("cert", Some(cert_id.to_string()), None),
        PublishPayload::Ca => ("ca", None, None),
        PublishPayload::Crl { crl_number } => ("crl", None, Some(*crl_number)),
    }
}

impl TaskRowWithId {
    fn try_into_task(self) -> Result<PublishTask, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Corrupt(format!("invalid UUID: {e}")))?;
        let payload = match self.payload_kind.as_str() {
            "cert" => {
                let cert_id = self.cert_id.as_deref().ok_or_else(|| {
                    DbError::Corrupt("cert payload without cert_id".into())
                })?;
                PublishPayload::Cert {
                    cert_id: Uuid::parse_str(cert_id)
                        .map_err(|e| DbError::Corrupt(format!("invalid cert UUID: {e}")))?,
                }
            }
            "ca" => PublishPayload::Ca,
            "crl" => PublishPayload::Crl {
                crl_number: self.crl_number.ok_or_else(|| {
                    DbError::Corrupt("crl payload without crl_number".into())
                })?,
            },
            other => {
                return Err(DbError::Corrupt(format!("unknown payload kind: {other}")));
            }
        };
        Ok(PublishTask {
            id,
            ca_name: self.ca_name,
            publisher: self.publisher,
            operation: parse_operation(&self.operation)?,
            payload,
            enqueued_at: self.enqueued_at,
            attempts: self.attempts,
            generation: self.generation,
        })
    }
}

/// WHERE clause for a clear scope. An empty clause means "everything".
fn scope_clause(ca: &CaScope, publishers: &PublisherScope) -> String {
    let mut conditions = Vec::new();
    if matches!(ca, CaScope::Named(_)) {
        conditions.push("ca_name = $ca_name");
    }
    if matches!(publishers, PublisherScope::Named(_)) {
        conditions.push("publisher IN $publishers");
    }
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// SurrealDB implementation of the publish-queue repository.
#[derive(Clone)]
pub struct SurrealPublishQueueRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealPublishQueueRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> PublishQueueRepository for SurrealPublishQueueRepository<C> {
    async fn append(&self, task: &PublishTask) -> SignetResult<()> {
        let (payload_kind, cert_id, crl_number) = payload_columns(&task.payload);

        self.db
            .query(
                "CREATE type::record('publish_task', $id) SET \
                 ca_name = $ca_name, \
                 publisher = $publisher, \
                 operation = $operation, \
                 payload_kind = $payload_kind, \
                 cert_id = $cert_id, \
                 crl_number = $crl_number, \
                 enqueued_at = $enqueued_at, \
                 attempts = $attempts, \
                 generation = $generation",
            )
            .bind(("id", task.id.to_string()))
            .bind(("ca_name", task.ca_name.clone()))
            .bind(("publisher", task.publisher.clone()))
            .bind(("operation", task.operation.as_str().to_string()))
            .bind(("payload_kind", payload_kind.to_string()))
            .bind(("cert_id", cert_id))
            .bind(("crl_number", crl_number))
            .bind(("enqueued_at", task.enqueued_at))
            .bind(("attempts", task.attempts))
            .bind(("generation", task.generation))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn remove(&self, task_id: Uuid) -> SignetResult<()> {
        self.db
            .query("DELETE type::record('publish_task', $id)")
            .bind(("id", task_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn record_attempt(&self, task_id: Uuid, attempts: u32) -> SignetResult<()> {
        self.db
            .query("UPDATE type::record('publish_task', $id) SET attempts = $attempts")
            .bind(("id", task_id.to_string()))
            .bind(("attempts", attempts))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn pending(&self) -> SignetResult<Vec<PublishTask>> {
        let mut result = self
            .db
            .query(
                "SELECT meta::id(id) AS record_id, * FROM publish_task \
                 ORDER BY enqueued_at ASC",
            )
            .await
            .map_err(DbError::from)?;

        let rows: Vec<TaskRowWithId> = result.take(0).map_err(DbError::from)?;
        let mut tasks = Vec::with_capacity(rows.len());
        for row in rows {
            tasks.push(row.try_into_task()?);
        }
        Ok(tasks)
    }

    async fn clear(&self, ca: &CaScope, publishers: &PublisherScope) -> SignetResult<u64> {
        let clause = scope_clause(ca, publishers);

        let count_query = format!(
            "SELECT count() AS total FROM publish_task{clause} GROUP ALL"
        );
        let delete_query = format!("DELETE publish_task{clause}");

        let mut request = self.db.query(count_query).query(delete_query);
        if let CaScope::Named(name) = ca {
            request = request.bind(("ca_name", name.clone()));
        }
        if let PublisherScope::Named(names) = publishers {
            request = request.bind(("publishers", names.clone()));
        }

        let mut result = request.await.map_err(DbError::from)?;
        let counts: Vec<CountRow> = result.take(0).map_err(DbError::from)?;

        Ok(counts.first().map(|c| c.total).unwrap_or(0))
    }
}
