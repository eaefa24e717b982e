//! SurrealDB implementation of [`CrlRepository`].

use chrono::{DateTime, Utc};
use signet_core::error::SignetResult;
use signet_core::models::crl::CrlRecord;
use signet_core::repository::CrlRepository;
use surrealdb::{Connection, Surreal};
use surrealdb_types::{Bytes, SurrealValue};

use crate::error::DbError;

#[derive(Debug, SurrealValue)]
struct CrlRow {
    ca_name: String,
    number: u64,
    der: Bytes,
    this_update: DateTime<Utc>,
}

#[derive(Debug, SurrealValue)]
struct NumberRow {
    number: u64,
}

#[derive(Debug, SurrealValue)]
struct CountRow {
    total: u64,
}

/// SurrealDB implementation of the CRL repository.
#[derive(Clone)]
pub struct SurrealCrlRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealCrlRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> CrlRepository for SurrealCrlRepository<C> {
    async fn insert(&self, crl: &CrlRecord) -> SignetResult<()> {
        self.db
            .query(
                "CREATE crl SET \
                 ca_name = $ca_name, \
                 number = $number, \
                 der = $der, \
                 this_update = $this_update",
            )
            .bind(("ca_name", crl.ca_name.clone()))
            .bind(("number", crl.number))
            .bind(("der", Bytes::from(crl.der.clone())))
            .bind(("this_update", crl.this_update))
            .await
            .map_err(DbError::from)?
            .check()
            .map_err(DbError::from)?;

        Ok(())
    }

    async fn get(&self, ca_name: &str, number: u64) -> SignetResult<CrlRecord> {
        let mut result = self
            .db
            .query(
                "SELECT * FROM crl \
                 WHERE ca_name = $ca_name AND number = $number",
            )
            .bind(("ca_name", ca_name.to_string()))
            .bind(("number", number))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<CrlRow> = result.take(0).map_err(DbError::from)?;
        let row = rows.into_iter().next().ok_or_else(|| DbError::NotFound {
            entity: "crl".into(),
            id: format!("{ca_name}/{number}"),
        })?;

        Ok(CrlRecord {
            ca_name: row.ca_name,
            number: row.number,
            der: row.der.into_inner().to_vec(),
            this_update: row.this_update,
        })
    }

    async fn latest_number(&self, ca_name: &str) -> SignetResult<Option<u64>> {
        let mut result = self
            .db
            .query(
                "SELECT number FROM crl WHERE ca_name = $ca_name \
                 ORDER BY number DESC LIMIT 1",
            )
            .bind(("ca_name", ca_name.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<NumberRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.first().map(|r| r.number))
    }

    async fn numbers_for_ca(&self, ca_name: &str) -> SignetResult<Vec<u64>> {
        let mut result = self
            .db
            .query(
                "SELECT number FROM crl WHERE ca_name = $ca_name \
                 ORDER BY number DESC",
            )
            .bind(("ca_name", ca_name.to_string()))
            .await
            .map_err(DbError::from)?;

        let rows: Vec<NumberRow> = result.take(0).map_err(DbError::from)?;
        Ok(rows.into_iter().map(|r| r.number).collect())
    }

    async fn delete_numbers(&self, ca_name: &str, numbers: &[u64]) -> SignetResult<u64> {
        if numbers.is_empty() {
            return Ok(0);
        }

        let mut result = self
            .db
            .query(
                "SELECT count() AS total FROM crl \
                 WHERE ca_name = $ca_name AND number IN $numbers GROUP ALL",
            )
            .query(
                "DELETE crl \
                 WHERE ca_name = $ca_name AND number IN $numbers",
            )
            .bind(("ca_name", ca_name.to_string()))
            .bind(("numbers", numbers.to_vec()))
            .await
            .map_err(DbError::from)?;

        let counts: Vec<CountRow> = result.take(0).map_err(DbError::from)?;
        Ok(counts.first().map(|c| c.total).unwrap_or(0))
    }
}
