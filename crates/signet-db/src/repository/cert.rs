//! SurrealDB implementation of [`CertRepository`].
//!
//! One row per issued certificate: the fingerprint bundle plus
//! revocation state. Rows survive revocation and disappear only on
//! permanent removal.

use chrono::{DateTime, Utc};
use signet_core::error::SignetResult;
use signet_core::models::certificate::{CertRecord, RevocationReason};
use signet_core::repository::CertRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use uuid::Uuid;

use crate::error::DbError;
use crate::repository::{fp_from_hex, u64_from_hex, u64_to_hex};

#[derive(Debug, SurrealValue)]
struct BundleRow {
    ca_name: String,
    serial: String,
    profile: String,
    subject_fp: String,
    key_fp: String,
    revoked: bool,
    revocation_reason: Option<String>,
    invalidity_time: Option<DateTime<Utc>>,
    not_after: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct BundleRowWithId {
    record_id: String,
    ca_name: String,
    serial: String,
    profile: String,
    subject_fp: String,
    key_fp: String,
    revoked: bool,
    revocation_reason: Option<String>,
    invalidity_time: Option<DateTime<Utc>>,
    not_after: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

fn parse_reason(s: &str) -> Result<RevocationReason, DbError> {
    RevocationReason::parse(s)
        .map_err(|_| DbError::Corrupt(format!("unknown revocation reason: {s}")))
}

impl BundleRow {
    fn into_record(self, id: Uuid) -> Result<CertRecord, DbError> {
        Ok(CertRecord {
            id,
            ca_name: self.ca_name,
            serial: u64_from_hex(&self.serial)?,
            profile: self.profile,
            subject_fp: fp_from_hex(&self.subject_fp)?,
            key_fp: fp_from_hex(&self.key_fp)?,
            revoked: self.revoked,
            revocation_reason: self
                .revocation_reason
                .as_deref()
                .map(parse_reason)
                .transpose()?,
            invalidity_time: self.invalidity_time,
            not_after: self.not_after,
            created_at: self.created_at,
        })
    }
}

impl BundleRowWithId {
    fn try_into_record(self) -> Result<CertRecord, DbError> {
        let id = Uuid::parse_str(&self.record_id)
            .map_err(|e| DbError::Corrupt(format!("invalid UUID: {e}")))?;
        BundleRow {
            ca_name: self.ca_name,
            serial: self.serial,
            profile: self.profile,
            subject_fp: self.subject_fp,
            key_fp: self.key_fp,
            revoked: self.revoked,
            revocation_reason: self.revocation_reason,
            invalidity_time: self.invalidity_time,
            not_after: self.not_after,
            created_at: self.created_at,
        }
        .into_record(id)
    }
}

#[derive(Debug, SurrealValue)]
struct RevokedRow {
    serial: String,
    revocation_reason: Option<String>,
}

/// SurrealDB implementation of the certificate repository.
#[derive(Clone)]
pub struct SurrealCertRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCertRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CertRepository for SurrealCertRepository<C> {
    async fn insert(&self, record: &CertRecord) -> SignetResult<()> {
        self.db
            .query(
                "CREATE type::record('cert_bundle', $id) SET \
                 ca_name = $ca_name, \
                 serial = $serial, \
                 profile = $profile, \
                 subject_fp = $subject_fp, \
                 key_fp = $key_fp, \
                 revoked = $revoked, \
                 revocation_reason = $revocation_reason, \
                 invalidity_time = $invalidity_time, \
                 not_after = $not_after",
            )
            .bind(("id", record.id.to_string()))
            .bind(("ca_name", record.ca_name.clone()))
            .bind(("serial", u64_to_hex(record.serial)))
            .bind(("profile", record.profile.clone()))
            .bind(("subject_fp", record.subject_fp.to_string()))
            .bind(("key_fp", record.key_fp.to_string()))
            .bind(("revoked", record.revoked))
            .bind((
                "revocation_reason",
                record.revocation_reason.map(|r| r.as_str().to_string()),
            ))
            .bind(("invalidity_time", record.invalidity_time))
            .bind(("not_after", record.not_after))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn get(&self, cert_id: Uuid) -> SignetResult<CertRecord> {
        let id_str = cert_id.to_string();

        let mut result = self
            .db
            .query("SELECT * FROM type::record('cert_bundle', $id)")
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<BundleRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "certificate".into(),
            id: id_str,
        })?;

        Ok(row.into_record(cert_id)?)
    }

    async fn unrevoked_for_ca(
        &self,
        ca_name: &str,
        profile: Option<&str>,
    ) -> SignetResult<Vec<CertRecord>> {
        let mut query = String::from(
            "SELECT meta::id(id) AS record_id, * FROM cert_bundle \
             WHERE ca_name = $ca_name AND revoked = false",
        );
        if profile.is_some() {
            query.push_str(" AND profile = $profile");
        }

        let mut request = self
            .db
            .query(query)
            .bind(("ca_name", ca_name.to_string()));
        if let Some(profile) = profile {
            request = request.bind(("profile", profile.to_string()));
        }

        let mut result = request.await.map_err(DbError::from)?;
        let rows: Vec<BundleRowWithId> = result.take(0).map_err(DbError::from)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            records.push(row.try_into_record()?);
        }
        Ok(records)
    }

    async fn set_revocation(
        &self,
        cert_id: Uuid,
        reason: RevocationReason,
        invalidity_time: Option<DateTime<Utc>>,
    ) -> SignetResult<()> {
        let id_str = cert_id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('cert_bundle', $id) SET \
                 revoked = true, \
                 revocation_reason = $reason, \
                 invalidity_time = $invalidity_time \
                 RETURN AFTER",
            )
            .bind(("id", id_str.clone()))
            .bind(("reason", reason.as_str().to_string()))
            .bind(("invalidity_time", invalidity_time))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<BundleRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "certificate".into(),
                id: id_str,
            }
            .into());
        }

        Ok(())
    }

    async fn clear_revocation(&self, cert_id: Uuid) -> SignetResult<()> {
        let id_str = cert_id.to_string();

        let mut result = self
            .db
            .query(
                "UPDATE type::record('cert_bundle', $id) SET \
                 revoked = false, \
                 revocation_reason = NONE, \
                 invalidity_time = NONE \
                 RETURN AFTER",
            )
            .bind(("id", id_str.clone()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<BundleRow> = result.take(0).map_err(DbError::from)?;
        if rows.is_empty() {
            return Err(DbError::NotFound {
                entity: "certificate".into(),
                id: id_str,
            }
            .into());
        }

        Ok(())
    }

    async fn delete(&self, cert_id: Uuid) -> SignetResult<()> {
        self.db
            .query("DELETE type::record('cert_bundle', $id)")
            .bind(("id", cert_id.to_string()))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn revoked_serials(
        &self,
        ca_name: &str,
    ) -> SignetResult<Vec<(u64, RevocationReason)>> {
        let mut result = self
            .db
            .query(
                "SELECT serial, revocation_reason FROM cert_bundle \
                 WHERE ca_name = $ca_name AND revoked = true",
            )
            .bind(("ca_name", ca_name.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<RevokedRow> = result.take(0).map_err(DbError::from)?;
        let mut serials = Vec::with_capacity(rows.len());
        for row in rows {
            let reason = match row.revocation_reason.as_deref() {
                Some(s) => parse_reason(s)?,
                None => RevocationReason::Unspecified,
            };
            serials.push((u64_from_hex(&row.serial)?, reason));
        }
        Ok(serials)
    }
}
