//! CA domain models.
//!
//! A [`CaEntry`] is the in-memory representation of one certificate
//! authority: its trust-anchor certificate, status, policy fields, and
//! permission set. Entries are owned by the registry and mutated only
//! through lifecycle transitions.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{SignetError, SignetResult};

/// Status of a CA in its lifecycle.
///
/// `Active` and `Inactive` are freely interchangeable; `Revoked` is
/// reachable from both but left only through the explicit unrevoke-CA
/// administrative operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CaStatus {
    Active,
    Inactive,
    Revoked,
}

impl CaStatus {
    /// Parse a configuration string. Unknown values are a configuration
    /// error, never defaulted.
    pub fn parse(s: &str) -> SignetResult<Self> {
        match s {
            "active" => Ok(CaStatus::Active),
            "inactive" => Ok(CaStatus::Inactive),
            "revoked" => Ok(CaStatus::Revoked),
            other => Err(SignetError::Configuration(format!(
                "unknown CA status: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CaStatus::Active => "active",
            CaStatus::Inactive => "inactive",
            CaStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy governing whether two certificates of one CA may share a
/// fingerprint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DuplicationMode {
    /// No two un-revoked certificates may share the fingerprint,
    /// regardless of profile.
    Forbidden,
    /// The fingerprint may not repeat within one profile, but may
    /// repeat across profiles.
    ForbiddenWithinProfile,
    /// No duplication constraint.
    Allowed,
}

impl DuplicationMode {
    pub fn parse(s: &str) -> SignetResult<Self> {
        match s {
            "forbidden" => Ok(DuplicationMode::Forbidden),
            "forbiddenWithinProfile" => Ok(DuplicationMode::ForbiddenWithinProfile),
            "allowed" => Ok(DuplicationMode::Allowed),
            other => Err(SignetError::Configuration(format!(
                "unknown duplication mode: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicationMode::Forbidden => "forbidden",
            DuplicationMode::ForbiddenWithinProfile => "forbiddenWithinProfile",
            DuplicationMode::Allowed => "allowed",
        }
    }
}

/// Policy governing certificate validity relative to the CA certificate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ValidityMode {
    /// A certificate may not outlive its CA; requests that would are
    /// rejected.
    Strict,
    /// A certificate may outlive its CA.
    Lenient,
}

impl ValidityMode {
    pub fn parse(s: &str) -> SignetResult<Self> {
        match s {
            "strict" => Ok(ValidityMode::Strict),
            "lenient" => Ok(ValidityMode::Lenient),
            other => Err(SignetError::Configuration(format!(
                "unknown validity mode: {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidityMode::Strict => "strict",
            ValidityMode::Lenient => "lenient",
        }
    }
}

/// Fixed-width permission bit-field over the closed permission
/// enumeration. Checks are a single bitwise test.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Permissions(u32);

impl Permissions {
    pub const ISSUE_CERT: Permissions = Permissions(1);
    pub const REVOKE_CERT: Permissions = Permissions(1 << 1);
    pub const UNREVOKE_CERT: Permissions = Permissions(1 << 2);
    pub const REMOVE_CERT: Permissions = Permissions(1 << 3);
    pub const GEN_CRL: Permissions = Permissions(1 << 4);
    pub const GET_CRL: Permissions = Permissions(1 << 5);

    const NAMED: &'static [(&'static str, Permissions)] = &[
        ("issue_cert", Permissions::ISSUE_CERT),
        ("revoke_cert", Permissions::REVOKE_CERT),
        ("unrevoke_cert", Permissions::UNREVOKE_CERT),
        ("remove_cert", Permissions::REMOVE_CERT),
        ("gen_crl", Permissions::GEN_CRL),
        ("get_crl", Permissions::GET_CRL),
    ];

    pub fn empty() -> Self {
        Permissions(0)
    }

    /// Every permission in the enumeration.
    pub fn all() -> Self {
        Self::NAMED
            .iter()
            .fold(Permissions(0), |acc, (_, p)| acc.union(*p))
    }

    pub const fn union(self, other: Permissions) -> Permissions {
        Permissions(self.0 | other.0)
    }

    pub fn contains(&self, other: Permissions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Reconstruct from stored bits, dropping any bit outside the
    /// enumeration.
    pub fn from_bits(bits: u32) -> Self {
        Permissions(bits & Self::all().0)
    }

    /// Parse a list of permission names from configuration. `"all"`
    /// grants every permission; any unknown name is a configuration
    /// error.
    pub fn from_names<I, S>(names: I) -> SignetResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut perms = Permissions::empty();
        for name in names {
            let name = name.as_ref();
            if name == "all" {
                return Ok(Permissions::all());
            }
            match Self::NAMED.iter().find(|(n, _)| *n == name) {
                Some((_, p)) => perms = perms.union(*p),
                None => {
                    return Err(SignetError::Configuration(format!(
                        "unknown permission: {name}"
                    )));
                }
            }
        }
        Ok(perms)
    }

    /// Names of the granted permissions, in enumeration order.
    pub fn names(&self) -> Vec<&'static str> {
        Self::NAMED
            .iter()
            .filter(|(_, p)| self.contains(*p))
            .map(|(n, _)| *n)
            .collect()
    }
}

/// Enrollment-control policy: which request types and key algorithms a
/// CA accepts. An empty set means no restriction on that axis.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EnrollmentControl {
    pub permitted_request_types: BTreeSet<String>,
    pub permitted_key_algorithms: BTreeSet<String>,
}

impl EnrollmentControl {
    pub fn permits_request_type(&self, request_type: &str) -> bool {
        self.permitted_request_types.is_empty()
            || self.permitted_request_types.contains(request_type)
    }

    pub fn permits_key_algorithm(&self, algorithm: &str) -> bool {
        self.permitted_key_algorithms.is_empty()
            || self.permitted_key_algorithms.contains(algorithm)
    }
}

/// One certificate authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaEntry {
    /// Unique CA name.
    pub name: String,
    /// Subject of the trust-anchor certificate.
    pub subject: String,
    /// PEM-encoded trust-anchor certificate.
    pub cert_pem: String,
    /// Certificate profiles this CA may issue under.
    pub profiles: BTreeSet<String>,
    pub status: CaStatus,
    pub permissions: Permissions,
    /// Enrollment-control policy consulted at issuance admission.
    pub enrollment: EnrollmentControl,
    /// Duplication policy for subject fingerprints.
    pub subject_duplication: DuplicationMode,
    /// Duplication policy for key fingerprints, independent of the
    /// subject policy.
    pub key_duplication: DuplicationMode,
    pub validity_mode: ValidityMode,
    /// How many CRLs to retain; older ones are deleted by CRL cleanup.
    pub num_crls: u32,
    /// Maximum validity of an issued certificate, in days.
    pub max_validity_days: u32,
    /// Validity of the CA certificate itself, in days.
    pub expiration_period_days: u32,
    /// Expiry of the trust-anchor certificate.
    pub not_after: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl CaEntry {
    pub fn permits(&self, permission: Permissions) -> bool {
        self.permissions.contains(permission)
    }

    pub fn supports_profile(&self, profile: &str) -> bool {
        self.profiles.contains(profile)
    }
}

/// Raw inputs for creating a self-signed CA, as received from the
/// administrative surface. Policy strings are parsed once, at creation;
/// unknown values fail with a configuration error.
#[derive(Debug, Clone)]
pub struct CreateCa {
    pub name: String,
    /// Profile the self-signed CA certificate itself is generated under.
    pub profile: String,
    pub subject: String,
    /// CA status; defaults to `active`.
    pub status: Option<String>,
    pub subject_duplication: Option<String>,
    pub key_duplication: Option<String>,
    /// Validity mode; defaults to `strict`.
    pub validity_mode: Option<String>,
    pub permissions: Vec<String>,
    pub profiles: BTreeSet<String>,
    pub enrollment: EnrollmentControl,
    /// CRL retention count; defaults to 30.
    pub num_crls: Option<u32>,
    /// CA certificate validity in days; defaults to 365.
    pub expiration_period_days: Option<u32>,
    pub max_validity_days: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_names_round_trip() {
        let perms = Permissions::from_names(["issue_cert", "revoke_cert", "gen_crl"]).unwrap();
        assert!(perms.contains(Permissions::ISSUE_CERT));
        assert!(perms.contains(Permissions::REVOKE_CERT));
        assert!(perms.contains(Permissions::GEN_CRL));
        assert!(!perms.contains(Permissions::REMOVE_CERT));
        assert_eq!(perms.names(), vec!["issue_cert", "revoke_cert", "gen_crl"]);
    }

    #[test]
    fn unknown_permission_is_configuration_error() {
        let err = Permissions::from_names(["issue_cert", "launch_missiles"]).unwrap_err();
        assert!(matches!(err, SignetError::Configuration(_)));
    }

    #[test]
    fn all_grants_everything() {
        let perms = Permissions::from_names(["all"]).unwrap();
        assert_eq!(perms, Permissions::all());
        assert!(perms.contains(Permissions::GET_CRL));
    }

    #[test]
    fn from_bits_masks_unknown_bits() {
        let perms = Permissions::from_bits(u32::MAX);
        assert_eq!(perms, Permissions::all());
    }

    #[test]
    fn unknown_mode_strings_are_rejected() {
        assert!(DuplicationMode::parse("permissive").is_err());
        assert!(ValidityMode::parse("cutoff").is_err());
        assert!(CaStatus::parse("enabled").is_err());
    }

    #[test]
    fn mode_strings_round_trip() {
        for mode in [
            DuplicationMode::Forbidden,
            DuplicationMode::ForbiddenWithinProfile,
            DuplicationMode::Allowed,
        ] {
            assert_eq!(DuplicationMode::parse(mode.as_str()).unwrap(), mode);
        }
    }

    #[test]
    fn empty_enrollment_control_permits_everything() {
        let control = EnrollmentControl::default();
        assert!(control.permits_request_type("p10cr"));
        assert!(control.permits_key_algorithm("ed25519"));
    }

    #[test]
    fn enrollment_control_restricts_listed_axes() {
        let control = EnrollmentControl {
            permitted_request_types: ["p10cr".to_string()].into(),
            permitted_key_algorithms: BTreeSet::new(),
        };
        assert!(control.permits_request_type("p10cr"));
        assert!(!control.permits_request_type("crmf"));
        assert!(control.permits_key_algorithm("rsa4096"));
    }
}
