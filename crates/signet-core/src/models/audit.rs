//! Audit domain model.
//!
//! Every externally-visible lifecycle operation produces exactly one
//! [`AuditEvent`], success or failure. Events are append-only and never
//! mutated after emission.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Application name recorded on every event.
pub const APP_NAME: &str = "ca";

/// Well-known audit field names.
pub mod field {
    pub const CA: &str = "ca";
    pub const ID: &str = "id";
    pub const SERIAL: &str = "serial";
    pub const PROFILE: &str = "profile";
    pub const REASON: &str = "reason";
    pub const INVALIDITY_TIME: &str = "invalidity_time";
    pub const REQUESTOR: &str = "requestor";
    pub const SUBJECT: &str = "subject";
    pub const CRL_NUMBER: &str = "crl_number";
    pub const NUM: &str = "num";
    pub const MESSAGE: &str = "message";
}

/// Closed enumeration of audit event types. Field sets are fixed per
/// type; an unknown type cannot be constructed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AuditEventKind {
    GenCert,
    RevokeCert,
    UnrevokeCert,
    RemoveCert,
    RevokeCa,
    UnrevokeCa,
    GenCrl,
    CleanupCrl,
}

impl AuditEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenCert => "gen_cert",
            Self::RevokeCert => "revoke_cert",
            Self::UnrevokeCert => "unrevoke_cert",
            Self::RemoveCert => "remove_cert",
            Self::RevokeCa => "revoke_ca",
            Self::UnrevokeCa => "unrevoke_ca",
            Self::GenCrl => "gen_crl",
            Self::CleanupCrl => "cleanup_crl",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// An immutable structured record of one completed lifecycle operation.
///
/// Fields keep their insertion order so the emitted record reads in the
/// order the operation assembled it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Message id correlating the event with the operation.
    pub message_id: Uuid,
    pub app: String,
    pub kind: AuditEventKind,
    pub outcome: AuditOutcome,
    pub duration_ms: u64,
    pub fields: Vec<(String, String)>,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind) -> Self {
        AuditEvent {
            message_id: Uuid::new_v4(),
            app: APP_NAME.to_string(),
            kind,
            outcome: AuditOutcome::Success,
            duration_ms: 0,
            fields: Vec::new(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl ToString) -> Self {
        self.fields.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_outcome(mut self, outcome: AuditOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = duration_ms;
        self
    }
}
