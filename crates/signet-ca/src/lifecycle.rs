//! Certificate and CA lifecycle state machine.
//!
//! [`CaLifecycle`] is the single entry point for every status
//! transition: it validates preconditions against the registry,
//! consults the duplication guard before admitting new issuance,
//! applies the transition to the record store, fans the change out to
//! the publication queue, and emits exactly one audit event per
//! operation — success or failure.
//!
//! Certificate states: Issued -> Revoked -> back to Issued (unrevoke)
//! or Removed (terminal). Removal is only reachable from Revoked.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use signet_core::error::{SignetError, SignetResult};
use signet_core::models::audit::{AuditEvent, AuditEventKind, AuditOutcome, field};
use signet_core::models::batch::{BatchAction, RevokeBatch, UnrevokeOrRemoveBatch};
use signet_core::models::ca::{
    CaEntry, CaStatus, CreateCa, DuplicationMode, Permissions, ValidityMode,
};
use signet_core::models::certificate::{CertRecord, IssuanceRequest, RevocationReason};
use signet_core::models::crl::CrlRecord;
use signet_core::models::publish::{CaScope, PublishOperation, PublishPayload, PublisherScope};
use signet_core::repository::{
    AuditRepository, CaRepository, CertRepository, CrlRepository, PublishQueueRepository,
};
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::config::CaConfig;
use crate::dedup::DuplicationGuard;
use crate::publish::PublicationQueue;
use crate::registry::CaRegistry;
use crate::signer::CertSigner;

/// Result of a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    pub cert_id: Uuid,
    pub serial: u64,
    pub cert_pem: String,
}

/// Outcome of a revocation. `AlreadyRevoked` is a signal, not an
/// error: revocation is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeOutcome {
    Revoked,
    AlreadyRevoked,
}

/// Per-entry outcome of a batch command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Applied,
    AlreadyRevoked,
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct BatchEntryResult {
    pub id: String,
    pub outcome: BatchOutcome,
}

/// The lifecycle state machine.
///
/// Generic over repository implementations so the core carries no
/// dependency on the database crate.
pub struct CaLifecycle<A, C, Q, L, D>
where
    A: CaRepository,
    C: CertRepository,
    Q: PublishQueueRepository + 'static,
    L: CrlRepository,
    D: AuditRepository,
{
    registry: Arc<CaRegistry<A>>,
    certs: C,
    guard: DuplicationGuard<C>,
    crls: L,
    queue: Arc<PublicationQueue<Q>>,
    audit: AuditTrail<D>,
    signer: Arc<dyn CertSigner>,
    config: CaConfig,
}

impl<A, C, Q, L, D> CaLifecycle<A, C, Q, L, D>
where
    A: CaRepository,
    C: CertRepository + Clone,
    Q: PublishQueueRepository + 'static,
    L: CrlRepository,
    D: AuditRepository,
{
    pub fn new(
        registry: Arc<CaRegistry<A>>,
        certs: C,
        crls: L,
        queue: Arc<PublicationQueue<Q>>,
        audit: AuditTrail<D>,
        signer: Arc<dyn CertSigner>,
        config: CaConfig,
    ) -> Self {
        Self {
            registry,
            guard: DuplicationGuard::new(certs.clone()),
            certs,
            crls,
            queue,
            audit,
            signer,
            config,
        }
    }

    // -------------------------------------------------------------------
    // Certificate operations
    // -------------------------------------------------------------------

    /// Issue a new certificate under the given CA and profile.
    pub async fn issue(
        &self,
        ca_name: &str,
        profile: &str,
        request: IssuanceRequest,
    ) -> SignetResult<IssuedCertificate> {
        let started = Instant::now();
        let result = self.issue_inner(ca_name, profile, &request).await;

        let mut event = AuditEvent::new(AuditEventKind::GenCert)
            .with_field(field::CA, ca_name)
            .with_field(field::PROFILE, profile)
            .with_field(field::SUBJECT, &request.subject);
        if let Some(requestor) = &request.requestor {
            event = event.with_field(field::REQUESTOR, requestor);
        }
        match &result {
            Ok(issued) => {
                event = event
                    .with_field(field::ID, issued.cert_id)
                    .with_field(field::SERIAL, format!("{:x}", issued.serial));
            }
            Err(err) => {
                event = event
                    .with_outcome(AuditOutcome::Failure)
                    .with_field(field::MESSAGE, err);
            }
        }
        self.emit(event, started).await;

        result
    }

    async fn issue_inner(
        &self,
        ca_name: &str,
        profile: &str,
        request: &IssuanceRequest,
    ) -> SignetResult<IssuedCertificate> {
        let ca = self.registry.get(ca_name).await?;

        if ca.status != CaStatus::Active {
            return Err(SignetError::InvalidTransition {
                entity: format!("ca {ca_name}"),
                from: ca.status.as_str().into(),
                to: "issuing".into(),
            });
        }
        self.require_permission(&ca, Permissions::ISSUE_CERT, "issue_cert")?;

        if !ca.supports_profile(profile) {
            return Err(SignetError::not_found("profile", profile));
        }
        if !ca.enrollment.permits_request_type(&request.request_type) {
            return Err(SignetError::NotPermitted {
                operation: format!("request type {}", request.request_type),
                ca: ca_name.into(),
            });
        }
        if !ca.enrollment.permits_key_algorithm(&request.key_algorithm) {
            return Err(SignetError::NotPermitted {
                operation: format!("key algorithm {}", request.key_algorithm),
                ca: ca_name.into(),
            });
        }

        let not_after = self.validity_bound(&ca, request)?;

        let subject_fp = request.subject_fingerprint();
        let key_fp = request.key_fingerprint();

        // The admission window: check and insert must be atomic with
        // respect to other admissions against the same CA.
        let admission = self.registry.name_lock(ca_name).await;
        let _admission = admission.lock().await;

        self.guard
            .check_admission(&ca, subject_fp, key_fp, profile)
            .await?;

        let serial: u64 = rand::random();
        let cert_pem = self
            .signer
            .sign_certificate(&ca, profile, request, serial, not_after)
            .await?;

        let record = CertRecord {
            id: Uuid::new_v4(),
            ca_name: ca_name.to_string(),
            serial,
            profile: profile.to_string(),
            subject_fp,
            key_fp,
            revoked: false,
            revocation_reason: None,
            invalidity_time: None,
            not_after,
            created_at: Utc::now(),
        };
        self.certs.insert(&record).await?;

        // Backstop: a conflicting row observed after our own insert
        // means an admission raced past the lock (e.g. through another
        // front-end's store handle). Withdraw the insert and reject.
        if let Some(conflict) = self
            .guard
            .find_conflict(&ca, subject_fp, key_fp, profile, record.id)
            .await?
        {
            self.certs.delete(record.id).await?;
            return Err(SignetError::DuplicateEntry { conflict });
        }
        drop(_admission);

        self.queue
            .publish(
                ca_name,
                PublishOperation::CertIssued,
                PublishPayload::Cert {
                    cert_id: record.id,
                },
            )
            .await?;

        Ok(IssuedCertificate {
            cert_id: record.id,
            serial,
            cert_pem,
        })
    }

    fn validity_bound(
        &self,
        ca: &CaEntry,
        request: &IssuanceRequest,
    ) -> SignetResult<DateTime<Utc>> {
        let days = request
            .validity_days
            .unwrap_or(ca.max_validity_days)
            .min(ca.max_validity_days);
        let not_after = Utc::now() + Duration::days(i64::from(days));

        if ca.validity_mode == ValidityMode::Strict && not_after > ca.not_after {
            return Err(SignetError::ValidityRejected {
                ca: ca.name.clone(),
                reason: format!(
                    "certificate would expire {not_after}, after the CA certificate ({})",
                    ca.not_after
                ),
            });
        }
        Ok(not_after)
    }

    /// Revoke a certificate. Revoking an already-revoked certificate
    /// reports `AlreadyRevoked` instead of failing.
    pub async fn revoke(
        &self,
        cert_id: Uuid,
        reason: RevocationReason,
        invalidity_time: Option<DateTime<Utc>>,
    ) -> SignetResult<RevokeOutcome> {
        let started = Instant::now();
        let result = self.revoke_inner(cert_id, reason, invalidity_time).await;

        let mut event = AuditEvent::new(AuditEventKind::RevokeCert)
            .with_field(field::ID, cert_id)
            .with_field(field::REASON, reason);
        if let Some(invalidity) = invalidity_time {
            event = event.with_field(field::INVALIDITY_TIME, invalidity.to_rfc3339());
        }
        match &result {
            Ok(RevokeOutcome::Revoked) => {}
            Ok(RevokeOutcome::AlreadyRevoked) => {
                event = event.with_field(field::MESSAGE, "already revoked");
            }
            Err(err) => {
                event = event
                    .with_outcome(AuditOutcome::Failure)
                    .with_field(field::MESSAGE, err);
            }
        }
        self.emit(event, started).await;

        result
    }

    async fn revoke_inner(
        &self,
        cert_id: Uuid,
        reason: RevocationReason,
        invalidity_time: Option<DateTime<Utc>>,
    ) -> SignetResult<RevokeOutcome> {
        let cert = self.certs.get(cert_id).await?;
        let ca = self.registry.get(&cert.ca_name).await?;
        self.require_permission(&ca, Permissions::REVOKE_CERT, "revoke_cert")?;

        if cert.revoked {
            return Ok(RevokeOutcome::AlreadyRevoked);
        }

        self.certs
            .set_revocation(cert_id, reason, invalidity_time)
            .await?;

        self.queue
            .publish(
                &cert.ca_name,
                PublishOperation::CertRevoked,
                PublishPayload::Cert { cert_id },
            )
            .await?;

        Ok(RevokeOutcome::Revoked)
    }

    /// Undo a revocation. Only valid while the recorded reason is
    /// reversible — a compromise revocation is final.
    pub async fn unrevoke(&self, cert_id: Uuid) -> SignetResult<()> {
        let started = Instant::now();
        let result = self.unrevoke_inner(cert_id).await;

        let mut event =
            AuditEvent::new(AuditEventKind::UnrevokeCert).with_field(field::ID, cert_id);
        if let Err(err) = &result {
            event = event
                .with_outcome(AuditOutcome::Failure)
                .with_field(field::MESSAGE, err);
        }
        self.emit(event, started).await;

        result
    }

    async fn unrevoke_inner(&self, cert_id: Uuid) -> SignetResult<()> {
        let cert = self.certs.get(cert_id).await?;
        let ca = self.registry.get(&cert.ca_name).await?;
        self.require_permission(&ca, Permissions::UNREVOKE_CERT, "unrevoke_cert")?;

        if !cert.revoked {
            return Err(SignetError::InvalidTransition {
                entity: format!("certificate {cert_id}"),
                from: "issued".into(),
                to: "issued".into(),
            });
        }
        if let Some(reason) = cert.revocation_reason {
            if !reason.is_reversible() {
                return Err(SignetError::InvalidTransition {
                    entity: format!("certificate {cert_id}"),
                    from: format!("revoked({reason})"),
                    to: "issued".into(),
                });
            }
        }

        self.certs.clear_revocation(cert_id).await?;

        self.queue
            .publish(
                &cert.ca_name,
                PublishOperation::CertUnrevoked,
                PublishPayload::Cert { cert_id },
            )
            .await?;

        Ok(())
    }

    /// Permanently remove a certificate record. Only valid on a
    /// revoked certificate; removal frees the fingerprints for future
    /// admission checks.
    pub async fn remove(&self, cert_id: Uuid) -> SignetResult<()> {
        let started = Instant::now();
        let result = self.remove_inner(cert_id).await;

        let mut event = AuditEvent::new(AuditEventKind::RemoveCert).with_field(field::ID, cert_id);
        if let Err(err) = &result {
            event = event
                .with_outcome(AuditOutcome::Failure)
                .with_field(field::MESSAGE, err);
        }
        self.emit(event, started).await;

        result
    }

    async fn remove_inner(&self, cert_id: Uuid) -> SignetResult<()> {
        let cert = self.certs.get(cert_id).await?;
        let ca = self.registry.get(&cert.ca_name).await?;
        self.require_permission(&ca, Permissions::REMOVE_CERT, "remove_cert")?;

        if !cert.revoked {
            return Err(SignetError::InvalidTransition {
                entity: format!("certificate {cert_id}"),
                from: "issued".into(),
                to: "removed".into(),
            });
        }

        self.certs.delete(cert_id).await?;

        self.queue
            .publish(
                &cert.ca_name,
                PublishOperation::CertRemoved,
                PublishPayload::Cert { cert_id },
            )
            .await?;

        Ok(())
    }

    // -------------------------------------------------------------------
    // Batch operations
    // -------------------------------------------------------------------

    /// Apply a revocation batch. Entries are applied in order; a
    /// failing entry is reported in its result and does not abort the
    /// batch.
    pub async fn revoke_batch(&self, batch: &RevokeBatch) -> Vec<BatchEntryResult> {
        let mut results = Vec::with_capacity(batch.entries().len());
        for entry in batch.entries() {
            let outcome = match self
                .revoke(entry.cert_id, entry.reason, entry.invalidity_time)
                .await
            {
                Ok(RevokeOutcome::Revoked) => BatchOutcome::Applied,
                Ok(RevokeOutcome::AlreadyRevoked) => BatchOutcome::AlreadyRevoked,
                Err(err) => BatchOutcome::Rejected(err.to_string()),
            };
            results.push(BatchEntryResult {
                id: entry.id.clone(),
                outcome,
            });
        }
        results
    }

    /// Apply an unrevoke-or-remove batch, one outcome per entry.
    pub async fn unrevoke_or_remove_batch(
        &self,
        batch: &UnrevokeOrRemoveBatch,
    ) -> Vec<BatchEntryResult> {
        let mut results = Vec::with_capacity(batch.entries().len());
        for entry in batch.entries() {
            let applied = match entry.action {
                BatchAction::Unrevoke => self.unrevoke(entry.cert_id).await,
                BatchAction::Remove => self.remove(entry.cert_id).await,
            };
            results.push(BatchEntryResult {
                id: entry.id.clone(),
                outcome: match applied {
                    Ok(()) => BatchOutcome::Applied,
                    Err(err) => BatchOutcome::Rejected(err.to_string()),
                },
            });
        }
        results
    }

    // -------------------------------------------------------------------
    // CA operations
    // -------------------------------------------------------------------

    /// Revoke a CA. Dependent data is marked by downstream consumers of
    /// the published change.
    pub async fn revoke_ca(&self, ca_name: &str, reason: RevocationReason) -> SignetResult<()> {
        let started = Instant::now();
        let result = self.revoke_ca_inner(ca_name).await;

        let mut event = AuditEvent::new(AuditEventKind::RevokeCa)
            .with_field(field::CA, ca_name)
            .with_field(field::REASON, reason);
        if let Err(err) = &result {
            event = event
                .with_outcome(AuditOutcome::Failure)
                .with_field(field::MESSAGE, err);
        }
        self.emit(event, started).await;

        result
    }

    async fn revoke_ca_inner(&self, ca_name: &str) -> SignetResult<()> {
        self.registry
            .apply_status(ca_name, CaStatus::Revoked)
            .await?;
        self.queue
            .publish(ca_name, PublishOperation::CaRevoked, PublishPayload::Ca)
            .await
    }

    /// Explicit administrative unrevoke of a revoked CA.
    pub async fn unrevoke_ca(&self, ca_name: &str) -> SignetResult<()> {
        let started = Instant::now();
        let result = self.unrevoke_ca_inner(ca_name).await;

        let mut event = AuditEvent::new(AuditEventKind::UnrevokeCa).with_field(field::CA, ca_name);
        if let Err(err) = &result {
            event = event
                .with_outcome(AuditOutcome::Failure)
                .with_field(field::MESSAGE, err);
        }
        self.emit(event, started).await;

        result
    }

    async fn unrevoke_ca_inner(&self, ca_name: &str) -> SignetResult<()> {
        self.registry.unrevoke(ca_name).await?;
        self.queue
            .publish(ca_name, PublishOperation::CaUnrevoked, PublishPayload::Ca)
            .await
    }

    /// Change a CA between Active and Inactive.
    pub async fn set_ca_status(&self, ca_name: &str, status: CaStatus) -> SignetResult<()> {
        self.registry.apply_status(ca_name, status).await
    }

    // -------------------------------------------------------------------
    // CRL operations
    // -------------------------------------------------------------------

    /// Generate a CRL over the CA's currently revoked serials. Returns
    /// the allocated CRL number.
    pub async fn generate_crl(&self, ca_name: &str) -> SignetResult<u64> {
        let started = Instant::now();
        let result = self.generate_crl_inner(ca_name).await;

        let mut event = AuditEvent::new(AuditEventKind::GenCrl).with_field(field::CA, ca_name);
        match &result {
            Ok((number, revoked_count)) => {
                event = event
                    .with_field(field::CRL_NUMBER, number)
                    .with_field(field::NUM, revoked_count);
            }
            Err(err) => {
                event = event
                    .with_outcome(AuditOutcome::Failure)
                    .with_field(field::MESSAGE, err);
            }
        }
        self.emit(event, started).await;

        result.map(|(number, _)| number)
    }

    async fn generate_crl_inner(&self, ca_name: &str) -> SignetResult<(u64, usize)> {
        let ca = self.registry.get(ca_name).await?;
        self.require_permission(&ca, Permissions::GEN_CRL, "gen_crl")?;

        let revoked = self.certs.revoked_serials(ca_name).await?;
        let number = self.crls.latest_number(ca_name).await?.unwrap_or(0) + 1;

        let der = self.signer.sign_crl(&ca, number, &revoked).await?;
        self.crls
            .insert(&CrlRecord {
                ca_name: ca_name.to_string(),
                number,
                der,
                this_update: Utc::now(),
            })
            .await?;

        self.queue
            .publish(
                ca_name,
                PublishOperation::CrlGenerated,
                PublishPayload::Crl { crl_number: number },
            )
            .await?;

        Ok((number, revoked.len()))
    }

    /// Delete stored CRLs beyond the CA's retention count, keeping the
    /// newest `num_crls`. Returns the number of deleted CRLs.
    pub async fn cleanup_crl(&self, ca_name: &str) -> SignetResult<u64> {
        let started = Instant::now();
        let result = self.cleanup_crl_inner(ca_name).await;

        let mut event = AuditEvent::new(AuditEventKind::CleanupCrl).with_field(field::CA, ca_name);
        match &result {
            Ok(deleted) => {
                event = event.with_field(field::NUM, deleted);
            }
            Err(err) => {
                event = event
                    .with_outcome(AuditOutcome::Failure)
                    .with_field(field::MESSAGE, err);
            }
        }
        self.emit(event, started).await;

        result
    }

    async fn cleanup_crl_inner(&self, ca_name: &str) -> SignetResult<u64> {
        let ca = self.registry.get(ca_name).await?;

        let numbers = self.crls.numbers_for_ca(ca_name).await?;
        let keep = ca.num_crls as usize;
        if numbers.len() <= keep {
            return Ok(0);
        }

        self.crls.delete_numbers(ca_name, &numbers[keep..]).await
    }

    // -------------------------------------------------------------------
    // Administrative operations
    // -------------------------------------------------------------------

    /// Create a self-signed CA from raw configuration input. Unknown
    /// policy strings fail with a configuration error; nothing is
    /// silently defaulted to a different meaning.
    pub async fn generate_self_signed_ca(&self, input: CreateCa) -> SignetResult<CaEntry> {
        let status = match input.status.as_deref() {
            Some(s) => CaStatus::parse(s)?,
            None => CaStatus::Active,
        };
        let subject_duplication = match input.subject_duplication.as_deref() {
            Some(s) => DuplicationMode::parse(s)?,
            None => DuplicationMode::ForbiddenWithinProfile,
        };
        let key_duplication = match input.key_duplication.as_deref() {
            Some(s) => DuplicationMode::parse(s)?,
            None => DuplicationMode::ForbiddenWithinProfile,
        };
        let validity_mode = match input.validity_mode.as_deref() {
            Some(s) => ValidityMode::parse(s)?,
            None => ValidityMode::Strict,
        };
        let permissions = Permissions::from_names(&input.permissions)?;

        let num_crls = input.num_crls.unwrap_or(self.config.default_num_crls);
        let expiration_period_days = input
            .expiration_period_days
            .unwrap_or(self.config.default_expiration_period_days);

        let cert_pem = self
            .signer
            .sign_self_signed_ca(&input.subject, &input.profile, expiration_period_days)
            .await?;

        let entry = CaEntry {
            name: input.name.clone(),
            subject: input.subject,
            cert_pem,
            profiles: input.profiles,
            status,
            permissions,
            enrollment: input.enrollment,
            subject_duplication,
            key_duplication,
            validity_mode,
            num_crls,
            max_validity_days: input.max_validity_days,
            expiration_period_days,
            not_after: Utc::now() + Duration::days(i64::from(expiration_period_days)),
            created_at: Utc::now(),
        };

        self.registry.register(entry.clone()).await?;
        Ok(entry)
    }

    /// Administrative clear of the publish queue. A named CA must
    /// exist; "all" scopes skip the existence check.
    pub async fn clear_publish_queue(
        &self,
        ca: CaScope,
        publishers: PublisherScope,
    ) -> SignetResult<u64> {
        if let CaScope::Named(name) = &ca {
            self.registry.get(name).await?;
        }
        self.queue.clear(&ca, &publishers).await
    }

    // -------------------------------------------------------------------
    // Helpers
    // -------------------------------------------------------------------

    fn require_permission(
        &self,
        ca: &CaEntry,
        permission: Permissions,
        operation: &str,
    ) -> SignetResult<()> {
        if !ca.permits(permission) {
            return Err(SignetError::NotPermitted {
                operation: operation.into(),
                ca: ca.name.clone(),
            });
        }
        Ok(())
    }

    async fn emit(&self, event: AuditEvent, started: Instant) {
        self.audit
            .emit(event.with_duration_ms(started.elapsed().as_millis() as u64))
            .await;
    }
}
