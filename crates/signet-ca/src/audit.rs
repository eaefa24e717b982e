//! Audit trail emission.

use signet_core::models::audit::AuditEvent;
use signet_core::repository::AuditRepository;
use tracing::{error, info};

/// Structured audit emission: append to the audit repository and
/// mirror to the log.
///
/// `emit` is called exactly once per externally-visible operation
/// regardless of how many internal steps the operation performs. It
/// never fails the operation retroactively: a persistence failure of
/// the audit row itself is logged at error level.
pub struct AuditTrail<D: AuditRepository> {
    repo: D,
}

impl<D: AuditRepository> AuditTrail<D> {
    pub fn new(repo: D) -> Self {
        Self { repo }
    }

    pub async fn emit(&self, event: AuditEvent) {
        info!(
            target: "signet::audit",
            message_id = %event.message_id,
            kind = event.kind.as_str(),
            outcome = event.outcome.as_str(),
            duration_ms = event.duration_ms,
            "audit event"
        );

        if let Err(err) = self.repo.append(&event).await {
            error!(
                message_id = %event.message_id,
                kind = event.kind.as_str(),
                error = %err,
                "failed to persist audit event"
            );
        }
    }
}
