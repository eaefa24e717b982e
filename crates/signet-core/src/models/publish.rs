//! Publish-queue domain models.
//!
//! Every committed lifecycle transition fans out as one [`PublishTask`]
//! per configured publisher. Tasks live in a FIFO per (CA, publisher)
//! pair and are removed only on confirmed delivery or administrative
//! clear.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The lifecycle change a task delivers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PublishOperation {
    CertIssued,
    CertRevoked,
    CertUnrevoked,
    CertRemoved,
    CaRevoked,
    CaUnrevoked,
    CrlGenerated,
}

impl PublishOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CertIssued => "cert_issued",
            Self::CertRevoked => "cert_revoked",
            Self::CertUnrevoked => "cert_unrevoked",
            Self::CertRemoved => "cert_removed",
            Self::CaRevoked => "ca_revoked",
            Self::CaUnrevoked => "ca_unrevoked",
            Self::CrlGenerated => "crl_generated",
        }
    }
}

/// What the task refers to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum PublishPayload {
    /// A certificate lifecycle change.
    Cert { cert_id: Uuid },
    /// A CA status change.
    Ca,
    /// A newly generated CRL.
    Crl { crl_number: u64 },
}

/// One pending delivery of a lifecycle change to one publication
/// target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishTask {
    pub id: Uuid,
    pub ca_name: String,
    pub publisher: String,
    pub operation: PublishOperation,
    pub payload: PublishPayload,
    pub enqueued_at: DateTime<Utc>,
    /// Delivery attempts so far. Tracked for observability; a task is
    /// never expired on attempt count.
    pub attempts: u32,
    /// Queue generation the task was enqueued under. An administrative
    /// clear bumps the pair's generation; deliveries of older
    /// generations are discarded instead of acknowledged.
    pub generation: u64,
}

/// CA scope of an administrative queue clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaScope {
    All,
    Named(String),
}

impl CaScope {
    pub fn matches(&self, ca_name: &str) -> bool {
        match self {
            CaScope::All => true,
            CaScope::Named(name) => name == ca_name,
        }
    }
}

/// Publisher scope of an administrative queue clear.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublisherScope {
    All,
    Named(Vec<String>),
}

impl PublisherScope {
    pub fn matches(&self, publisher: &str) -> bool {
        match self {
            PublisherScope::All => true,
            PublisherScope::Named(names) => names.iter().any(|n| n == publisher),
        }
    }
}
