//! Trait seam for the external signer.
//!
//! The cryptographic signing operation is performed outside the
//! lifecycle core (typically by an HSM-backed service). The core hands
//! the signer the material to sign and treats the result as opaque.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signet_core::error::SignetResult;
use signet_core::models::ca::CaEntry;
use signet_core::models::certificate::{IssuanceRequest, RevocationReason};

#[async_trait]
pub trait CertSigner: Send + Sync {
    /// Produce a self-signed CA certificate for a new CA.
    async fn sign_self_signed_ca(
        &self,
        subject: &str,
        profile: &str,
        validity_days: u32,
    ) -> SignetResult<String>;

    /// Sign an end-entity certificate under the given CA. The serial
    /// number and expiry have already been allocated by the lifecycle
    /// core.
    async fn sign_certificate(
        &self,
        ca: &CaEntry,
        profile: &str,
        request: &IssuanceRequest,
        serial: u64,
        not_after: DateTime<Utc>,
    ) -> SignetResult<String>;

    /// Produce a DER-encoded CRL over the CA's currently revoked
    /// serials.
    async fn sign_crl(
        &self,
        ca: &CaEntry,
        crl_number: u64,
        revoked: &[(u64, RevocationReason)],
    ) -> SignetResult<Vec<u8>>;
}
