//! SurrealDB repository implementations.

mod audit;
mod ca;
mod cert;
mod crl;
mod publish;

pub use audit::SurrealAuditRepository;
pub use ca::SurrealCaRepository;
pub use cert::SurrealCertRepository;
pub use crl::SurrealCrlRepository;
pub use publish::SurrealPublishQueueRepository;

use signet_core::models::certificate::Fingerprint;

use crate::error::DbError;

/// Fingerprints and serial numbers are full-range u64 values; they are
/// stored as fixed-width hex strings since SurrealDB integers are i64.
pub(crate) fn u64_to_hex(value: u64) -> String {
    format!("{value:016x}")
}

pub(crate) fn u64_from_hex(s: &str) -> Result<u64, DbError> {
    u64::from_str_radix(s, 16)
        .map_err(|e| DbError::Corrupt(format!("invalid hex value {s:?}: {e}")))
}

pub(crate) fn fp_from_hex(s: &str) -> Result<Fingerprint, DbError> {
    u64_from_hex(s).map(Fingerprint)
}
