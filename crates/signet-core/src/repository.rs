//! Repository trait definitions for data access abstraction.
//!
//! All repository operations are async. The lifecycle services are
//! generic over these traits so they carry no dependency on the
//! storage crate.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::SignetResult;
use crate::models::{
    audit::AuditEvent,
    ca::{CaEntry, CaStatus},
    certificate::{CertRecord, RevocationReason},
    crl::CrlRecord,
    publish::{CaScope, PublishTask, PublisherScope},
};

/// CA table access. The registry loads all entries once at startup and
/// writes status changes and new CAs through.
pub trait CaRepository: Send + Sync {
    fn insert(&self, entry: &CaEntry) -> impl Future<Output = SignetResult<()>> + Send;
    fn update_status(
        &self,
        name: &str,
        status: CaStatus,
    ) -> impl Future<Output = SignetResult<()>> + Send;
    fn load_all(&self) -> impl Future<Output = SignetResult<Vec<CaEntry>>> + Send;
}

/// Fingerprint-bundle table access.
pub trait CertRepository: Send + Sync {
    fn insert(&self, record: &CertRecord) -> impl Future<Output = SignetResult<()>> + Send;
    fn get(&self, cert_id: Uuid) -> impl Future<Output = SignetResult<CertRecord>> + Send;
    /// Un-revoked bundles of one CA, optionally narrowed to a profile.
    /// This is the working set of the duplication guard.
    fn unrevoked_for_ca(
        &self,
        ca_name: &str,
        profile: Option<&str>,
    ) -> impl Future<Output = SignetResult<Vec<CertRecord>>> + Send;
    fn set_revocation(
        &self,
        cert_id: Uuid,
        reason: RevocationReason,
        invalidity_time: Option<DateTime<Utc>>,
    ) -> impl Future<Output = SignetResult<()>> + Send;
    fn clear_revocation(&self, cert_id: Uuid) -> impl Future<Output = SignetResult<()>> + Send;
    /// Permanently delete the bundle, freeing its fingerprints.
    fn delete(&self, cert_id: Uuid) -> impl Future<Output = SignetResult<()>> + Send;
    /// Serials and reasons of all currently revoked certificates of one
    /// CA, for CRL generation.
    fn revoked_serials(
        &self,
        ca_name: &str,
    ) -> impl Future<Output = SignetResult<Vec<(u64, RevocationReason)>>> + Send;
}

/// Publish-task table access. The durable half of the publication
/// queue; the in-memory FIFOs are rebuilt from `pending` at startup.
pub trait PublishQueueRepository: Send + Sync {
    fn append(&self, task: &PublishTask) -> impl Future<Output = SignetResult<()>> + Send;
    /// Remove one task on confirmed delivery.
    fn remove(&self, task_id: Uuid) -> impl Future<Output = SignetResult<()>> + Send;
    /// Persist the attempt count after a failed delivery.
    fn record_attempt(
        &self,
        task_id: Uuid,
        attempts: u32,
    ) -> impl Future<Output = SignetResult<()>> + Send;
    /// All pending tasks in enqueue order.
    fn pending(&self) -> impl Future<Output = SignetResult<Vec<PublishTask>>> + Send;
    /// Remove all tasks matching the scope; returns the removed count.
    fn clear(
        &self,
        ca: &CaScope,
        publishers: &PublisherScope,
    ) -> impl Future<Output = SignetResult<u64>> + Send;
}

/// CRL table access.
pub trait CrlRepository: Send + Sync {
    fn insert(&self, crl: &CrlRecord) -> impl Future<Output = SignetResult<()>> + Send;
    /// One stored CRL; publishers fetch the DER payload through this.
    fn get(
        &self,
        ca_name: &str,
        number: u64,
    ) -> impl Future<Output = SignetResult<CrlRecord>> + Send;
    fn latest_number(&self, ca_name: &str)
    -> impl Future<Output = SignetResult<Option<u64>>> + Send;
    /// All CRL numbers of one CA, newest first.
    fn numbers_for_ca(&self, ca_name: &str) -> impl Future<Output = SignetResult<Vec<u64>>> + Send;
    fn delete_numbers(
        &self,
        ca_name: &str,
        numbers: &[u64],
    ) -> impl Future<Output = SignetResult<u64>> + Send;
}

/// Append-only audit log access. Rows are never updated or deleted.
pub trait AuditRepository: Send + Sync {
    fn append(&self, event: &AuditEvent) -> impl Future<Output = SignetResult<()>> + Send;
}
