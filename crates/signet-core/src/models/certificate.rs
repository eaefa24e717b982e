//! Certificate domain models.
//!
//! SIGNET never parses X.509 structures: a certificate is tracked as a
//! [`CertRecord`] — its identifiers plus the two fingerprints the
//! duplication policy is enforced over.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{SignetError, SignetResult};

/// A fixed-size hash derived from subject or public-key material, used
/// for equality comparison without storing the full structure.
///
/// The value is the first 8 bytes of a SHA-256 digest, big-endian.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Fingerprint(u64::from_be_bytes(bytes))
    }

    /// Fingerprint of a distinguished-name string, normalized so that
    /// case and surrounding whitespace do not produce distinct values.
    pub fn of_subject(subject: &str) -> Self {
        let normalized = subject.trim().to_lowercase();
        Self::of(normalized.as_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Revocation reason, in RFC 5280 terms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RevocationReason {
    Unspecified,
    KeyCompromise,
    CaCompromise,
    AffiliationChanged,
    Superseded,
    CessationOfOperation,
    CertificateHold,
    PrivilegeWithdrawn,
    AaCompromise,
}

impl RevocationReason {
    pub fn parse(s: &str) -> SignetResult<Self> {
        match s {
            "unspecified" => Ok(Self::Unspecified),
            "keyCompromise" => Ok(Self::KeyCompromise),
            "cACompromise" => Ok(Self::CaCompromise),
            "affiliationChanged" => Ok(Self::AffiliationChanged),
            "superseded" => Ok(Self::Superseded),
            "cessationOfOperation" => Ok(Self::CessationOfOperation),
            "certificateHold" => Ok(Self::CertificateHold),
            "privilegeWithdrawn" => Ok(Self::PrivilegeWithdrawn),
            "aACompromise" => Ok(Self::AaCompromise),
            other => Err(SignetError::Configuration(format!(
                "unknown revocation reason: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unspecified => "unspecified",
            Self::KeyCompromise => "keyCompromise",
            Self::CaCompromise => "cACompromise",
            Self::AffiliationChanged => "affiliationChanged",
            Self::Superseded => "superseded",
            Self::CessationOfOperation => "cessationOfOperation",
            Self::CertificateHold => "certificateHold",
            Self::PrivilegeWithdrawn => "privilegeWithdrawn",
            Self::AaCompromise => "aACompromise",
        }
    }

    /// Whether a revocation under this reason may be undone. Compromise
    /// reasons are final.
    pub fn is_reversible(&self) -> bool {
        !matches!(
            self,
            Self::KeyCompromise | Self::CaCompromise | Self::AaCompromise
        )
    }
}

impl fmt::Display for RevocationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The stored record of one issued certificate: identifiers, issuing
/// profile, fingerprints, and revocation state.
///
/// Immutable except for the revocation fields. Never deleted on revoke;
/// deleted only when the certificate is permanently removed, which frees
/// its fingerprints for future admission checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertRecord {
    pub id: Uuid,
    /// Name of the issuing CA.
    pub ca_name: String,
    /// Serial number of the issued certificate.
    pub serial: u64,
    /// Profile the certificate was issued under.
    pub profile: String,
    /// Fingerprint of the normalized subject.
    pub subject_fp: Fingerprint,
    /// Fingerprint of the public key material.
    pub key_fp: Fingerprint,
    pub revoked: bool,
    /// Reason recorded at revocation; `None` while un-revoked.
    pub revocation_reason: Option<RevocationReason>,
    /// Caller-supplied invalidity time recorded at revocation.
    pub invalidity_time: Option<DateTime<Utc>>,
    /// Expiry of the certificate, for validity-mode enforcement.
    pub not_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// An admitted enrollment request as seen by the lifecycle core: the
/// protocol front-ends have already stripped their framing.
#[derive(Debug, Clone)]
pub struct IssuanceRequest {
    /// Requested subject distinguished name.
    pub subject: String,
    /// DER-encoded public key material.
    pub public_key: Vec<u8>,
    /// Key algorithm name, checked against the CA's enrollment control.
    pub key_algorithm: String,
    /// Protocol request type, checked against the CA's enrollment
    /// control (e.g. `p10cr`).
    pub request_type: String,
    /// Requested validity in days; capped by the CA's max validity.
    pub validity_days: Option<u32>,
    /// Requestor identity, recorded in the audit event.
    pub requestor: Option<String>,
}

impl IssuanceRequest {
    pub fn subject_fingerprint(&self) -> Fingerprint {
        Fingerprint::of_subject(&self.subject)
    }

    pub fn key_fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.public_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_fingerprint_is_case_and_whitespace_insensitive() {
        let a = Fingerprint::of_subject("CN=Device-001,O=ACME");
        let b = Fingerprint::of_subject("  cn=device-001,o=acme ");
        assert_eq!(a, b);
    }

    #[test]
    fn distinct_inputs_produce_distinct_fingerprints() {
        assert_ne!(
            Fingerprint::of(b"key material one"),
            Fingerprint::of(b"key material two")
        );
    }

    #[test]
    fn compromise_reasons_are_irreversible() {
        assert!(!RevocationReason::KeyCompromise.is_reversible());
        assert!(!RevocationReason::CaCompromise.is_reversible());
        assert!(!RevocationReason::AaCompromise.is_reversible());
        assert!(RevocationReason::CertificateHold.is_reversible());
        assert!(RevocationReason::Superseded.is_reversible());
    }

    #[test]
    fn reason_strings_round_trip() {
        for reason in [
            RevocationReason::Unspecified,
            RevocationReason::KeyCompromise,
            RevocationReason::CertificateHold,
            RevocationReason::AaCompromise,
        ] {
            assert_eq!(RevocationReason::parse(reason.as_str()).unwrap(), reason);
        }
        assert!(RevocationReason::parse("obsolete").is_err());
    }
}
