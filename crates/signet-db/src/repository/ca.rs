//! SurrealDB implementation of [`CaRepository`].
//!
//! The CA name is the record id: it is the unique key of the table and
//! every lookup is by name.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use signet_core::error::SignetResult;
use signet_core::models::ca::{
    CaEntry, CaStatus, DuplicationMode, EnrollmentControl, Permissions, ValidityMode,
};
use signet_core::repository::CaRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CaRow {
    name: String,
    subject: String,
    cert_pem: String,
    profiles: Vec<String>,
    status: String,
    permissions: u32,
    permitted_request_types: Vec<String>,
    permitted_key_algorithms: Vec<String>,
    subject_duplication: String,
    key_duplication: String,
    validity_mode: String,
    num_crls: u32,
    max_validity_days: u32,
    expiration_period_days: u32,
    not_after: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

fn parse_status(s: &str) -> Result<CaStatus, DbError> {
    CaStatus::parse(s).map_err(|_| DbError::Corrupt(format!("unknown CA status: {s}")))
}

fn parse_duplication(s: &str) -> Result<DuplicationMode, DbError> {
    DuplicationMode::parse(s).map_err(|_| DbError::Corrupt(format!("unknown duplication mode: {s}")))
}

fn parse_validity(s: &str) -> Result<ValidityMode, DbError> {
    ValidityMode::parse(s).map_err(|_| DbError::Corrupt(format!("unknown validity mode: {s}")))
}

impl CaRow {
    fn try_into_entry(self) -> Result<CaEntry, DbError> {
        Ok(CaEntry {
            name: self.name,
            subject: self.subject,
            cert_pem: self.cert_pem,
            profiles: self.profiles.into_iter().collect(),
            status: parse_status(&self.status)?,
            permissions: Permissions::from_bits(self.permissions),
            enrollment: EnrollmentControl {
                permitted_request_types: self.permitted_request_types.into_iter().collect(),
                permitted_key_algorithms: self.permitted_key_algorithms.into_iter().collect(),
            },
            subject_duplication: parse_duplication(&self.subject_duplication)?,
            key_duplication: parse_duplication(&self.key_duplication)?,
            validity_mode: parse_validity(&self.validity_mode)?,
            num_crls: self.num_crls,
            max_validity_days: self.max_validity_days,
            expiration_period_days: self.expiration_period_days,
            not_after: self.not_after,
            created_at: self.created_at,
        })
    }
}

fn set_to_vec(set: &BTreeSet<String>) -> Vec<String> {
    set.iter().cloned().collect()
}

/// SurrealDB implementation of the CA repository.
#[derive(Clone)]
pub struct SurrealCaRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCaRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CaRepository for SurrealCaRepository<C> {
    async fn insert(&self, entry: &CaEntry) -> SignetResult<()> {
        self.db
            .query(
                "CREATE type::record('ca', $name) SET \
                 name = $name, \
                 subject = $subject, \
                 cert_pem = $cert_pem, \
                 profiles = $profiles, \
                 status = $status, \
                 permissions = $permissions, \
                 permitted_request_types = $permitted_request_types, \
                 permitted_key_algorithms = $permitted_key_algorithms, \
                 subject_duplication = $subject_duplication, \
                 key_duplication = $key_duplication, \
                 validity_mode = $validity_mode, \
                 num_crls = $num_crls, \
                 max_validity_days = $max_validity_days, \
                 expiration_period_days = $expiration_period_days, \
                 not_after = $not_after",
            )
            .bind(("name", entry.name.clone()))
            .bind(("subject", entry.subject.clone()))
            .bind(("cert_pem", entry.cert_pem.clone()))
            .bind(("profiles", set_to_vec(&entry.profiles)))
            .bind(("status", entry.status.as_str().to_string()))
            .bind(("permissions", entry.permissions.bits()))
            .bind((
                "permitted_request_types",
                set_to_vec(&entry.enrollment.permitted_request_types),
            ))
            .bind((
                "permitted_key_algorithms",
                set_to_vec(&entry.enrollment.permitted_key_algorithms),
            ))
            .bind((
                "subject_duplication",
                entry.subject_duplication.as_str().to_string(),
            ))
            .bind(("key_duplication", entry.key_duplication.as_str().to_string()))
            .bind(("validity_mode", entry.validity_mode.as_str().to_string()))
            .bind(("num_crls", entry.num_crls))
            .bind(("max_validity_days", entry.max_validity_days))
            .bind(("expiration_period_days", entry.expiration_period_days))
            .bind(("not_after", entry.not_after))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn update_status(&self, name: &str, status: CaStatus) -> SignetResult<()> {
        let mut result = self
            .db
            .query(
                "UPDATE type::record('ca', $name) SET status = $status \
                 RETURN AFTER",
            )
            .bind(("name", name.to_string()))
            .bind(("status", status.as_str().to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CaRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "ca".into(),
                id: name.to_string(),
            }
            .into());
        }

        Ok(())
    }

    async fn load_all(&self) -> SignetResult<Vec<CaEntry>> {
        let mut result = self
            .db
            .query("SELECT * FROM ca")
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CaRow> = result.take(0).map_err(DbError::from)?;
        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            entries.push(row.try_into_entry()?);
        }
        Ok(entries)
    }
}
