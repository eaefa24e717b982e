//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode for data integrity.
//! UUIDs are stored as strings. Enums are stored as strings with
//! ASSERT constraints for validation. 64-bit fingerprints and serial
//! numbers are stored as fixed-width hex strings.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
    #[allow(dead_code)]
    name: String,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "initial_schema",
    sql: SCHEMA_V1,
}];

// -----------------------------------------------------------------------
// Schema v1 — initial table definitions
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Certificate authorities
-- =======================================================================
DEFINE TABLE ca SCHEMAFULL;
DEFINE FIELD name ON TABLE ca TYPE string;
DEFINE FIELD subject ON TABLE ca TYPE string;
DEFINE FIELD cert_pem ON TABLE ca TYPE string;
DEFINE FIELD profiles ON TABLE ca TYPE array<string>;
DEFINE FIELD status ON TABLE ca TYPE string \
    ASSERT $value IN ['active', 'inactive', 'revoked'];
DEFINE FIELD permissions ON TABLE ca TYPE int;
DEFINE FIELD permitted_request_types ON TABLE ca TYPE array<string>;
DEFINE FIELD permitted_key_algorithms ON TABLE ca TYPE array<string>;
DEFINE FIELD subject_duplication ON TABLE ca TYPE string \
    ASSERT $value IN ['forbidden', 'forbiddenWithinProfile', 'allowed'];
DEFINE FIELD key_duplication ON TABLE ca TYPE string \
    ASSERT $value IN ['forbidden', 'forbiddenWithinProfile', 'allowed'];
DEFINE FIELD validity_mode ON TABLE ca TYPE string \
    ASSERT $value IN ['strict', 'lenient'];
DEFINE FIELD num_crls ON TABLE ca TYPE int;
DEFINE FIELD max_validity_days ON TABLE ca TYPE int;
DEFINE FIELD expiration_period_days ON TABLE ca TYPE int;
DEFINE FIELD not_after ON TABLE ca TYPE datetime;
DEFINE FIELD created_at ON TABLE ca TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_ca_name ON TABLE ca COLUMNS name UNIQUE;

-- =======================================================================
-- Certificate fingerprint bundles
-- =======================================================================
DEFINE TABLE cert_bundle SCHEMAFULL;
DEFINE FIELD ca_name ON TABLE cert_bundle TYPE string;
DEFINE FIELD serial ON TABLE cert_bundle TYPE string;
DEFINE FIELD profile ON TABLE cert_bundle TYPE string;
DEFINE FIELD subject_fp ON TABLE cert_bundle TYPE string;
DEFINE FIELD key_fp ON TABLE cert_bundle TYPE string;
DEFINE FIELD revoked ON TABLE cert_bundle TYPE bool DEFAULT false;
DEFINE FIELD revocation_reason ON TABLE cert_bundle \
    TYPE option<string>;
DEFINE FIELD invalidity_time ON TABLE cert_bundle \
    TYPE option<datetime>;
DEFINE FIELD not_after ON TABLE cert_bundle TYPE datetime;
DEFINE FIELD created_at ON TABLE cert_bundle TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_bundle_ca ON TABLE cert_bundle COLUMNS ca_name;
DEFINE INDEX idx_bundle_ca_subject ON TABLE cert_bundle \
    COLUMNS ca_name, subject_fp;
DEFINE INDEX idx_bundle_ca_key ON TABLE cert_bundle \
    COLUMNS ca_name, key_fp;

-- =======================================================================
-- Publish queue tasks
-- =======================================================================
DEFINE TABLE publish_task SCHEMAFULL;
DEFINE FIELD ca_name ON TABLE publish_task TYPE string;
DEFINE FIELD publisher ON TABLE publish_task TYPE string;
DEFINE FIELD operation ON TABLE publish_task TYPE string \
    ASSERT $value IN ['cert_issued', 'cert_revoked', 'cert_unrevoked', \
    'cert_removed', 'ca_revoked', 'ca_unrevoked', 'crl_generated'];
DEFINE FIELD payload_kind ON TABLE publish_task TYPE string \
    ASSERT $value IN ['cert', 'ca', 'crl'];
DEFINE FIELD cert_id ON TABLE publish_task TYPE option<string>;
DEFINE FIELD crl_number ON TABLE publish_task TYPE option<int>;
DEFINE FIELD enqueued_at ON TABLE publish_task TYPE datetime;
DEFINE FIELD attempts ON TABLE publish_task TYPE int DEFAULT 0;
DEFINE FIELD generation ON TABLE publish_task TYPE int DEFAULT 0;
DEFINE INDEX idx_task_pair ON TABLE publish_task \
    COLUMNS ca_name, publisher;

-- =======================================================================
-- Certificate revocation lists
-- =======================================================================
DEFINE TABLE crl SCHEMAFULL;
DEFINE FIELD ca_name ON TABLE crl TYPE string;
DEFINE FIELD number ON TABLE crl TYPE int;
DEFINE FIELD der ON TABLE crl TYPE bytes;
DEFINE FIELD this_update ON TABLE crl TYPE datetime;
DEFINE INDEX idx_crl_ca_number ON TABLE crl \
    COLUMNS ca_name, number UNIQUE;

-- =======================================================================
-- Audit events (append-only)
-- =======================================================================
DEFINE TABLE audit_event SCHEMAFULL
    PERMISSIONS
        FOR create FULL
        FOR select FULL
        FOR update NONE
        FOR delete NONE;
DEFINE FIELD message_id ON TABLE audit_event TYPE string;
DEFINE FIELD app ON TABLE audit_event TYPE string;
DEFINE FIELD kind ON TABLE audit_event TYPE string \
    ASSERT $value IN ['gen_cert', 'revoke_cert', 'unrevoke_cert', \
    'remove_cert', 'revoke_ca', 'unrevoke_ca', 'gen_crl', 'cleanup_crl'];
DEFINE FIELD outcome ON TABLE audit_event TYPE string \
    ASSERT $value IN ['success', 'failure'];
DEFINE FIELD duration_ms ON TABLE audit_event TYPE int;
DEFINE FIELD fields ON TABLE audit_event TYPE array<array<string>>;
DEFINE FIELD recorded_at ON TABLE audit_event TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_audit_kind_time ON TABLE audit_event \
    COLUMNS kind, recorded_at;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
/// All DEFINE statements are idempotent so re-running is safe.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    // Ensure migration tracking table exists (idempotent).
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    // Determine current schema version.
    let mut result = db
        .query("SELECT * FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version > current_version {
            info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            db.query(migration.sql).await?.check().map_err(|e| {
                DbError::Migration(format!(
                    "Migration v{} '{}' failed: {}",
                    migration.version, migration.name, e,
                ))
            })?;

            // Record the applied migration.
            db.query(
                "CREATE _migration SET version = $version, \
                 name = $name",
            )
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;

            info!(
                version = migration.version,
                "Migration applied successfully"
            );
        }
    }

    Ok(())
}

/// Returns the raw schema DDL for version 1.
///
/// Exposed for testing with in-memory SurrealDB instances that
/// bypass the migration runner.
pub fn schema_v1() -> &'static str {
    SCHEMA_V1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_v1_is_nonempty() {
        assert!(!SCHEMA_V1.is_empty());
    }

    #[test]
    fn migrations_are_ordered() {
        for window in MIGRATIONS.windows(2) {
            assert!(
                window[0].version < window[1].version,
                "Migrations must be in ascending version order"
            );
        }
    }
}
