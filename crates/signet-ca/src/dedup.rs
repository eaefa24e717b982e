//! Duplicate-issuance admission control.
//!
//! Before a new certificate is admitted, its subject and key
//! fingerprints are checked against the surviving (un-revoked) bundles
//! of the CA, each under its own independently configured
//! [`DuplicationMode`]. Revoked bundles never block: a holder can
//! re-enroll with the same subject and key after revocation.
//!
//! The check-then-insert window is racy by itself; callers hold the
//! CA's admission lock (see [`CaRegistry::name_lock`]) across the check
//! and the subsequent insert.
//!
//! [`CaRegistry::name_lock`]: crate::registry::CaRegistry::name_lock

use signet_core::error::{SignetError, SignetResult};
use signet_core::models::ca::{CaEntry, DuplicationMode};
use signet_core::models::certificate::{CertRecord, Fingerprint};
use signet_core::repository::CertRepository;
use uuid::Uuid;

pub struct DuplicationGuard<C: CertRepository> {
    certs: C,
}

impl<C: CertRepository> DuplicationGuard<C> {
    pub fn new(certs: C) -> Self {
        Self { certs }
    }

    /// Decide admission of a new request against existing bundles.
    ///
    /// Runs two independent passes — subject fingerprint under the
    /// CA's subject mode, key fingerprint under its key mode. Any
    /// surviving match rejects the whole request with the conflicting
    /// certificate id.
    pub async fn check_admission(
        &self,
        ca: &CaEntry,
        subject_fp: Fingerprint,
        key_fp: Fingerprint,
        profile: &str,
    ) -> SignetResult<()> {
        if let Some(conflict) = self
            .find_match(ca, ca.subject_duplication, profile, |b| {
                b.subject_fp == subject_fp
            })
            .await?
        {
            return Err(SignetError::DuplicateEntry { conflict });
        }

        if let Some(conflict) = self
            .find_match(ca, ca.key_duplication, profile, |b| b.key_fp == key_fp)
            .await?
        {
            return Err(SignetError::DuplicateEntry { conflict });
        }

        Ok(())
    }

    /// Post-insert backstop: look for another surviving bundle that
    /// collides with the just-inserted one. Only fires when an
    /// admission raced past the lock; the caller then withdraws its
    /// insert and rejects.
    pub async fn find_conflict(
        &self,
        ca: &CaEntry,
        subject_fp: Fingerprint,
        key_fp: Fingerprint,
        profile: &str,
        own_id: Uuid,
    ) -> SignetResult<Option<Uuid>> {
        let subject_hit = self
            .find_match(ca, ca.subject_duplication, profile, |b| {
                b.id != own_id && b.subject_fp == subject_fp
            })
            .await?;
        if subject_hit.is_some() {
            return Ok(subject_hit);
        }

        self.find_match(ca, ca.key_duplication, profile, |b| {
            b.id != own_id && b.key_fp == key_fp
        })
        .await
    }

    async fn find_match(
        &self,
        ca: &CaEntry,
        mode: DuplicationMode,
        profile: &str,
        matches: impl Fn(&CertRecord) -> bool,
    ) -> SignetResult<Option<Uuid>> {
        let scope_profile = match mode {
            DuplicationMode::Allowed => return Ok(None),
            DuplicationMode::ForbiddenWithinProfile => Some(profile),
            DuplicationMode::Forbidden => None,
        };

        let bundles = self.certs.unrevoked_for_ca(&ca.name, scope_profile).await?;
        Ok(bundles.iter().find(|b| matches(b)).map(|b| b.id))
    }
}
