//! Trait seam for downstream publication targets.

use async_trait::async_trait;
use signet_core::error::SignetResult;
use signet_core::models::publish::PublishTask;

/// One downstream publication target (LDAP directory, OCSP feeder,
/// HTTP endpoint, …).
///
/// `deliver` is retried by the publication queue until it succeeds;
/// implementations should return [`SignetError::PublisherUnreachable`]
/// for transient failures and must tolerate redelivery of a task that
/// was acknowledged late.
///
/// [`SignetError::PublisherUnreachable`]: signet_core::SignetError::PublisherUnreachable
#[async_trait]
pub trait CertPublisher: Send + Sync {
    /// Unique publisher name; the queue keys its FIFOs by it.
    fn name(&self) -> &str;

    async fn deliver(&self, task: &PublishTask) -> SignetResult<()>;
}
