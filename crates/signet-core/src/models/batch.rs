//! Batch request models.
//!
//! Administrative batch commands carry ordered entries, each with a
//! caller-supplied identifier. An identifier already accepted within the
//! same batch is rejected by `add_entry` returning `false` — a signal,
//! not an error — so an idempotent client retry of a partially-applied
//! batch does not abort the whole request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::certificate::RevocationReason;

/// What an unrevoke-or-remove entry asks for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum BatchAction {
    Unrevoke,
    Remove,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnrevokeOrRemoveEntry {
    /// Caller-supplied identifier, unique within the batch.
    pub id: String,
    pub cert_id: Uuid,
    pub action: BatchAction,
}

/// Ordered batch of unrevoke/remove entries.
#[derive(Debug, Clone, Default)]
pub struct UnrevokeOrRemoveBatch {
    entries: Vec<UnrevokeOrRemoveEntry>,
}

impl UnrevokeOrRemoveBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` without adding when the entry id is already
    /// present in this batch.
    pub fn add_entry(&mut self, entry: UnrevokeOrRemoveEntry) -> bool {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[UnrevokeOrRemoveEntry] {
        &self.entries
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeEntry {
    /// Caller-supplied identifier, unique within the batch.
    pub id: String,
    pub cert_id: Uuid,
    pub reason: RevocationReason,
    pub invalidity_time: Option<DateTime<Utc>>,
}

/// Ordered batch of revocation entries.
#[derive(Debug, Clone, Default)]
pub struct RevokeBatch {
    entries: Vec<RevokeEntry>,
}

impl RevokeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` without adding when the entry id is already
    /// present in this batch.
    pub fn add_entry(&mut self, entry: RevokeEntry) -> bool {
        if self.entries.iter().any(|e| e.id == entry.id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn entries(&self) -> &[RevokeEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_entry_id_is_not_added() {
        let mut batch = UnrevokeOrRemoveBatch::new();
        let cert_id = Uuid::new_v4();

        assert!(batch.add_entry(UnrevokeOrRemoveEntry {
            id: "req-1".into(),
            cert_id,
            action: BatchAction::Unrevoke,
        }));
        // Same id, different action: still rejected, batch unchanged.
        assert!(!batch.add_entry(UnrevokeOrRemoveEntry {
            id: "req-1".into(),
            cert_id: Uuid::new_v4(),
            action: BatchAction::Remove,
        }));
        assert_eq!(batch.entries().len(), 1);
        assert_eq!(batch.entries()[0].action, BatchAction::Unrevoke);
    }

    #[test]
    fn distinct_entry_ids_are_kept_in_order() {
        let mut batch = RevokeBatch::new();
        for i in 0..3 {
            assert!(batch.add_entry(RevokeEntry {
                id: format!("req-{i}"),
                cert_id: Uuid::new_v4(),
                reason: RevocationReason::Superseded,
                invalidity_time: None,
            }));
        }
        let ids: Vec<&str> = batch.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["req-0", "req-1", "req-2"]);
    }
}
