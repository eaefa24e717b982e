//! CRL domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stored certificate revocation list. The DER payload is opaque to
/// the lifecycle core; it is produced by the external signer and handed
/// to publishers verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrlRecord {
    pub ca_name: String,
    /// CRL number, monotonic per CA.
    pub number: u64,
    /// DER-encoded CRL.
    pub der: Vec<u8>,
    pub this_update: DateTime<Utc>,
}
