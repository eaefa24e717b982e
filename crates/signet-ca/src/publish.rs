//! Durable publication queue.
//!
//! Every committed lifecycle transition enqueues one task per
//! configured publisher. Tasks live in a FIFO per (CA, publisher)
//! pair: one drain task per pair delivers strictly in order, so a
//! failing publisher blocks only its own queue while every other pair
//! keeps draining. A failed or timed-out delivery leaves the task at
//! the head and retries with exponential backoff; tasks are never
//! expired — they wait for recovery or administrative clear.
//!
//! An administrative clear bumps the pair's generation counter before
//! removing tasks. A delivery that was in flight when the clear
//! happened observes the changed generation on completion and is
//! discarded instead of acknowledged, so a cleared task can neither be
//! re-enqueued nor double-reported. The clear never blocks on a stuck
//! delivery.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use signet_core::error::SignetResult;
use signet_core::models::publish::{
    CaScope, PublishOperation, PublishPayload, PublishTask, PublisherScope,
};
use signet_core::repository::PublishQueueRepository;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::CaConfig;
use crate::publisher::CertPublisher;

/// Compute the exponential backoff delay for a retry attempt, capped.
fn retry_delay_ms(initial_ms: u64, multiplier: f64, attempt: u32, max_ms: u64) -> u64 {
    let mut delay = initial_ms as f64;
    for _ in 1..attempt {
        delay *= multiplier;
        if delay >= max_ms as f64 {
            return max_ms;
        }
    }
    (delay as u64).min(max_ms)
}

/// Shared state of one (CA, publisher) FIFO.
struct PairState {
    tasks: Mutex<VecDeque<PublishTask>>,
    /// Bumped by every administrative clear of this pair.
    generation: AtomicU64,
    /// Wakes the drain task when work arrives.
    notify: Notify,
}

impl PairState {
    fn new() -> Self {
        Self {
            tasks: Mutex::new(VecDeque::new()),
            generation: AtomicU64::new(0),
            notify: Notify::new(),
        }
    }
}

/// Durable per-(CA, publisher) task queue with retry and
/// administrative clear.
pub struct PublicationQueue<Q: PublishQueueRepository> {
    repo: Q,
    publishers: HashMap<String, Arc<dyn CertPublisher>>,
    pairs: Mutex<HashMap<(String, String), Arc<PairState>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
    config: CaConfig,
}

impl<Q: PublishQueueRepository + 'static> PublicationQueue<Q> {
    pub fn new(repo: Q, publishers: Vec<Arc<dyn CertPublisher>>, config: CaConfig) -> Arc<Self> {
        let (shutdown, _) = watch::channel(false);
        let publishers = publishers
            .into_iter()
            .map(|p| (p.name().to_string(), p))
            .collect();

        Arc::new(Self {
            repo,
            publishers,
            pairs: Mutex::new(HashMap::new()),
            handles: Mutex::new(Vec::new()),
            shutdown,
            config,
        })
    }

    /// Reload pending tasks from the store and start draining.
    ///
    /// Tasks are requeued in enqueue order under the current (fresh)
    /// generation of their pair.
    pub async fn start(self: &Arc<Self>) -> SignetResult<()> {
        let pending = self.repo.pending().await?;
        info!(count = pending.len(), "Reloading pending publish tasks");

        for mut task in pending {
            let pair = self.pair_state(&task.ca_name, &task.publisher).await;
            task.generation = pair.generation.load(Ordering::Acquire);
            pair.tasks.lock().await.push_back(task);
            pair.notify.notify_one();
        }
        Ok(())
    }

    /// Stop all drain tasks. Pending tasks stay durable in the store.
    pub async fn stop(&self) {
        let _ = self.shutdown.send(true);
        let mut handles = self.handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!("Publication queue stopped");
    }

    /// Fan one committed lifecycle transition out to every configured
    /// publisher. Persists each task before exposing it to the drain
    /// loop; a persistence failure surfaces to the caller.
    pub async fn publish(
        self: &Arc<Self>,
        ca_name: &str,
        operation: PublishOperation,
        payload: PublishPayload,
    ) -> SignetResult<()> {
        for publisher in self.publishers.keys() {
            let pair = self.pair_state(ca_name, publisher).await;
            let task = PublishTask {
                id: Uuid::new_v4(),
                ca_name: ca_name.to_string(),
                publisher: publisher.clone(),
                operation,
                payload: payload.clone(),
                enqueued_at: Utc::now(),
                attempts: 0,
                generation: pair.generation.load(Ordering::Acquire),
            };

            self.repo.append(&task).await?;
            pair.tasks.lock().await.push_back(task);
            pair.notify.notify_one();
        }
        Ok(())
    }

    /// Remove pending tasks in the given scope. Returns the number of
    /// removed tasks. Safe to call while deliveries are in flight.
    pub async fn clear(&self, ca: &CaScope, publishers: &PublisherScope) -> SignetResult<u64> {
        {
            let pairs = self.pairs.lock().await;
            for ((ca_name, publisher), state) in pairs.iter() {
                if ca.matches(ca_name) && publishers.matches(publisher) {
                    // Invalidate in-flight deliveries first, then drop
                    // the queued tasks.
                    state.generation.fetch_add(1, Ordering::AcqRel);
                    state.tasks.lock().await.clear();
                }
            }
        }

        let cleared = self.repo.clear(ca, publishers).await?;
        info!(cleared, "Cleared publish queue");
        Ok(cleared)
    }

    /// Pending task count of one pair, for tests and observability.
    pub async fn pending_len(&self, ca_name: &str, publisher: &str) -> usize {
        let pairs = self.pairs.lock().await;
        match pairs.get(&(ca_name.to_string(), publisher.to_string())) {
            Some(state) => state.tasks.lock().await.len(),
            None => 0,
        }
    }

    async fn pair_state(self: &Arc<Self>, ca_name: &str, publisher: &str) -> Arc<PairState> {
        let key = (ca_name.to_string(), publisher.to_string());
        let mut pairs = self.pairs.lock().await;
        if let Some(state) = pairs.get(&key) {
            return state.clone();
        }

        let state = Arc::new(PairState::new());
        pairs.insert(key.clone(), state.clone());
        drop(pairs);

        let queue = Arc::clone(self);
        let drain_state = state.clone();
        let handle = tokio::spawn(async move {
            queue.drain_pair(key.0, key.1, drain_state).await;
        });
        self.handles.lock().await.push(handle);

        state
    }

    /// Drain loop of one (CA, publisher) pair. Single-threaded per
    /// pair, preserving FIFO delivery order.
    async fn drain_pair(
        self: Arc<Self>,
        ca_name: String,
        publisher_name: String,
        pair: Arc<PairState>,
    ) {
        let mut shutdown = self.shutdown.subscribe();
        let publisher = self.publishers.get(&publisher_name).cloned();
        let delivery_timeout = Duration::from_millis(self.config.delivery_timeout_ms);

        debug!(ca = %ca_name, publisher = %publisher_name, "Drain task started");

        loop {
            if *shutdown.borrow() {
                return;
            }

            let head = pair.tasks.lock().await.front().cloned();
            let Some(task) = head else {
                tokio::select! {
                    _ = pair.notify.notified() => continue,
                    _ = shutdown.changed() => return,
                }
            };

            let Some(publisher) = publisher.as_ref() else {
                // No such publisher configured; tasks stay queued until
                // configuration changes or an administrative clear.
                warn!(
                    ca = %ca_name,
                    publisher = %publisher_name,
                    "Publisher not configured; leaving tasks queued"
                );
                tokio::select! {
                    _ = shutdown.changed() => return,
                    _ = sleep(Duration::from_millis(self.config.retry_max_delay_ms)) => continue,
                }
            };

            let generation = pair.generation.load(Ordering::Acquire);
            if task.generation != generation {
                // Enqueued before a clear that raced with the reload;
                // drop without acknowledging.
                Self::pop_head(&pair, task.id).await;
                continue;
            }

            let delivered = matches!(
                timeout(delivery_timeout, publisher.deliver(&task)).await,
                Ok(Ok(()))
            );

            if pair.generation.load(Ordering::Acquire) != generation {
                // Cleared mid-delivery: the task is gone from queue and
                // store; neither acknowledge nor re-enqueue it.
                debug!(
                    ca = %ca_name,
                    publisher = %publisher_name,
                    task = %task.id,
                    "Discarding delivery outcome of cleared task"
                );
                continue;
            }

            if delivered {
                Self::pop_head(&pair, task.id).await;
                if let Err(err) = self.repo.remove(task.id).await {
                    warn!(task = %task.id, error = %err, "Failed to remove delivered task");
                }
                debug!(
                    ca = %ca_name,
                    publisher = %publisher_name,
                    task = %task.id,
                    operation = task.operation.as_str(),
                    "Published"
                );
            } else {
                let attempts = task.attempts + 1;
                {
                    let mut tasks = pair.tasks.lock().await;
                    if let Some(head) = tasks.front_mut() {
                        if head.id == task.id {
                            head.attempts = attempts;
                        }
                    }
                }
                if let Err(err) = self.repo.record_attempt(task.id, attempts).await {
                    warn!(task = %task.id, error = %err, "Failed to record attempt count");
                }

                let delay = retry_delay_ms(
                    self.config.retry_initial_delay_ms,
                    self.config.retry_multiplier,
                    attempts,
                    self.config.retry_max_delay_ms,
                );
                warn!(
                    ca = %ca_name,
                    publisher = %publisher_name,
                    task = %task.id,
                    attempts,
                    retry_in_ms = delay,
                    "Delivery failed; task stays at queue head"
                );
                tokio::select! {
                    _ = sleep(Duration::from_millis(delay)) => {}
                    _ = shutdown.changed() => return,
                }
            }
        }
    }

    /// Pop the head of the pair queue if it is still the given task.
    async fn pop_head(pair: &PairState, task_id: Uuid) {
        let mut tasks = pair.tasks.lock().await;
        if tasks.front().is_some_and(|t| t.id == task_id) {
            tasks.pop_front();
        }
    }
}
