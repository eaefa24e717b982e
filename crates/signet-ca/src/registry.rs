//! In-memory CA registry.
//!
//! The registry is the source of truth for CA status and permissions.
//! It is loaded once from the CA repository at startup and kept
//! authoritative in memory: reads are snapshot `Arc` clones behind an
//! `RwLock`, writes go through per-CA named locks so mutations of one
//! CA serialize against each other while different CAs proceed in
//! parallel.

use std::collections::HashMap;
use std::sync::Arc;

use signet_core::error::{SignetError, SignetResult};
use signet_core::models::ca::{CaEntry, CaStatus};
use signet_core::repository::CaRepository;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

pub struct CaRegistry<R: CaRepository> {
    repo: R,
    entries: RwLock<HashMap<String, Arc<CaEntry>>>,
    /// Per-CA mutation locks. Also exported as the admission lock held
    /// across the duplication check-then-insert window.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<R: CaRepository> CaRegistry<R> {
    /// Load all CA entries from the repository.
    pub async fn load(repo: R) -> SignetResult<Self> {
        let entries = repo.load_all().await?;
        info!(count = entries.len(), "Loaded CA registry");

        let map = entries
            .into_iter()
            .map(|e| (e.name.clone(), Arc::new(e)))
            .collect();

        Ok(Self {
            repo,
            entries: RwLock::new(map),
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub async fn lookup(&self, name: &str) -> Option<Arc<CaEntry>> {
        self.entries.read().await.get(name).cloned()
    }

    /// Like [`lookup`](Self::lookup) but failing with `NotFound`.
    pub async fn get(&self, name: &str) -> SignetResult<Arc<CaEntry>> {
        self.lookup(name)
            .await
            .ok_or_else(|| SignetError::not_found("ca", name))
    }

    /// Snapshot of all entries, for "all CAs" administrative scope.
    pub async fn all(&self) -> Vec<Arc<CaEntry>> {
        self.entries.read().await.values().cloned().collect()
    }

    /// The named lock serializing mutations and admissions for one CA.
    pub async fn name_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Register a newly created CA.
    pub async fn register(&self, entry: CaEntry) -> SignetResult<()> {
        let lock = self.name_lock(&entry.name).await;
        let _guard = lock.lock().await;

        if self.entries.read().await.contains_key(&entry.name) {
            return Err(SignetError::Configuration(format!(
                "CA {} already exists",
                entry.name
            )));
        }

        self.repo.insert(&entry).await?;
        self.entries
            .write()
            .await
            .insert(entry.name.clone(), Arc::new(entry));
        Ok(())
    }

    /// Apply a CA status transition.
    ///
    /// Active ⇄ Inactive is freely bidirectional; both reach Revoked.
    /// Leaving Revoked is only possible through
    /// [`unrevoke`](Self::unrevoke), never through this method.
    pub async fn apply_status(&self, name: &str, new_status: CaStatus) -> SignetResult<()> {
        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;

        let current = self.get(name).await?;
        let permitted = matches!(
            (current.status, new_status),
            (CaStatus::Active, CaStatus::Inactive)
                | (CaStatus::Inactive, CaStatus::Active)
                | (CaStatus::Active, CaStatus::Revoked)
                | (CaStatus::Inactive, CaStatus::Revoked)
        );
        if !permitted {
            return Err(SignetError::InvalidTransition {
                entity: format!("ca {name}"),
                from: current.status.as_str().into(),
                to: new_status.as_str().into(),
            });
        }

        self.commit_status(name, &current, new_status).await
    }

    /// Explicit administrative unrevoke: Revoked -> Active.
    pub async fn unrevoke(&self, name: &str) -> SignetResult<()> {
        let lock = self.name_lock(name).await;
        let _guard = lock.lock().await;

        let current = self.get(name).await?;
        if current.status != CaStatus::Revoked {
            return Err(SignetError::InvalidTransition {
                entity: format!("ca {name}"),
                from: current.status.as_str().into(),
                to: CaStatus::Active.as_str().into(),
            });
        }

        self.commit_status(name, &current, CaStatus::Active).await
    }

    async fn commit_status(
        &self,
        name: &str,
        current: &CaEntry,
        new_status: CaStatus,
    ) -> SignetResult<()> {
        self.repo.update_status(name, new_status).await?;

        let mut updated = current.clone();
        updated.status = new_status;
        self.entries
            .write()
            .await
            .insert(name.to_string(), Arc::new(updated));

        info!(ca = name, status = new_status.as_str(), "CA status changed");
        Ok(())
    }
}
