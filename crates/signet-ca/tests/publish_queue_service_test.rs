//! Integration tests for the publication queue: FIFO delivery order,
//! retry-until-recovery, pair independence, and race-free
//! administrative clears.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use signet_ca::{CaConfig, CertPublisher, PublicationQueue};
use signet_core::error::{SignetError, SignetResult};
use signet_core::models::publish::{
    CaScope, PublishOperation, PublishPayload, PublishTask, PublisherScope,
};
use signet_core::repository::PublishQueueRepository;
use signet_db::repository::SurrealPublishQueueRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::{Db, Mem};
use tokio::sync::Notify;
use uuid::Uuid;

fn test_config() -> CaConfig {
    CaConfig {
        delivery_timeout_ms: 500,
        retry_initial_delay_ms: 10,
        retry_max_delay_ms: 50,
        ..CaConfig::default()
    }
}

async fn setup_db() -> Surreal<Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    signet_db::run_migrations(&db).await.unwrap();
    db
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..300 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Publisher whose availability is toggled by the test. Deliveries
/// while offline fail as unreachable; successful deliveries are
/// recorded in order.
struct TogglePublisher {
    name: String,
    online: AtomicBool,
    delivered: StdMutex<Vec<PublishTask>>,
}

impl TogglePublisher {
    fn new(name: &str, online: bool) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            online: AtomicBool::new(online),
            delivered: StdMutex::new(Vec::new()),
        })
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::Release);
    }

    fn delivered_ops(&self) -> Vec<&'static str> {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .map(|t| t.operation.as_str())
            .collect()
    }

    fn delivered_len(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

#[async_trait]
impl CertPublisher for TogglePublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, task: &PublishTask) -> SignetResult<()> {
        if !self.online.load(Ordering::Acquire) {
            return Err(SignetError::PublisherUnreachable {
                publisher: self.name.clone(),
                reason: "connection refused".into(),
            });
        }
        self.delivered.lock().unwrap().push(task.clone());
        Ok(())
    }
}

/// Publisher that parks each delivery until the test releases it.
struct GatedPublisher {
    name: String,
    gate: Notify,
    entered: Notify,
    delivered: StdMutex<Vec<Uuid>>,
}

impl GatedPublisher {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            gate: Notify::new(),
            entered: Notify::new(),
            delivered: StdMutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CertPublisher for GatedPublisher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, task: &PublishTask) -> SignetResult<()> {
        self.entered.notify_one();
        self.gate.notified().await;
        self.delivered.lock().unwrap().push(task.id);
        Ok(())
    }
}

fn cert_payload() -> PublishPayload {
    PublishPayload::Cert {
        cert_id: Uuid::new_v4(),
    }
}

// -----------------------------------------------------------------------
// Delivery order & retry
// -----------------------------------------------------------------------

#[tokio::test]
async fn tasks_wait_for_recovery_and_deliver_in_fifo_order() {
    let db = setup_db().await;
    let publisher = TogglePublisher::new("p1", false);
    let queue = PublicationQueue::new(
        SurrealPublishQueueRepository::new(db.clone()),
        vec![publisher.clone() as Arc<dyn CertPublisher>],
        test_config(),
    );
    queue.start().await.unwrap();

    queue
        .publish("ca1", PublishOperation::CertIssued, cert_payload())
        .await
        .unwrap();
    queue
        .publish("ca1", PublishOperation::CertRevoked, cert_payload())
        .await
        .unwrap();
    queue
        .publish("ca1", PublishOperation::CrlGenerated, PublishPayload::Crl { crl_number: 1 })
        .await
        .unwrap();

    // Publisher down: nothing delivers, nothing is lost.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(publisher.delivered_len(), 0);
    assert_eq!(queue.pending_len("ca1", "p1").await, 3);

    // Attempt counts grow while the head task keeps failing.
    let repo = SurrealPublishQueueRepository::new(db.clone());
    let pending = repo.pending().await.unwrap();
    assert!(pending.iter().any(|t| t.attempts > 0));

    publisher.set_online(true);
    wait_until(|| publisher.delivered_len() == 3).await;

    // Strict FIFO despite the retries.
    assert_eq!(
        publisher.delivered_ops(),
        vec!["cert_issued", "cert_revoked", "crl_generated"]
    );
    // Delivered tasks are removed from the durable store.
    for _ in 0..300 {
        if repo.pending().await.unwrap().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(repo.pending().await.unwrap().is_empty());

    queue.stop().await;
}

#[tokio::test]
async fn a_stuck_publisher_does_not_block_other_pairs() {
    let db = setup_db().await;
    let stuck = TogglePublisher::new("stuck", false);
    let healthy = TogglePublisher::new("healthy", true);
    let queue = PublicationQueue::new(
        SurrealPublishQueueRepository::new(db.clone()),
        vec![
            stuck.clone() as Arc<dyn CertPublisher>,
            healthy.clone() as Arc<dyn CertPublisher>,
        ],
        test_config(),
    );
    queue.start().await.unwrap();

    queue
        .publish("ca1", PublishOperation::CertIssued, cert_payload())
        .await
        .unwrap();
    queue
        .publish("ca2", PublishOperation::CertIssued, cert_payload())
        .await
        .unwrap();

    // The healthy publisher drains both CAs while the stuck one holds
    // its own queues only.
    wait_until(|| healthy.delivered_len() == 2).await;
    assert_eq!(stuck.delivered_len(), 0);
    assert_eq!(queue.pending_len("ca1", "stuck").await, 1);
    assert_eq!(queue.pending_len("ca2", "stuck").await, 1);

    queue.stop().await;
}

#[tokio::test]
async fn pending_tasks_survive_restart() {
    let db = setup_db().await;

    {
        let queue = PublicationQueue::new(
            SurrealPublishQueueRepository::new(db.clone()),
            vec![TogglePublisher::new("p1", false) as Arc<dyn CertPublisher>],
            test_config(),
        );
        queue.start().await.unwrap();
        queue
            .publish("ca1", PublishOperation::CertIssued, cert_payload())
            .await
            .unwrap();
        queue.stop().await;
    }

    // A new queue instance over the same store sees and delivers the
    // task.
    let publisher = TogglePublisher::new("p1", true);
    let queue = PublicationQueue::new(
        SurrealPublishQueueRepository::new(db.clone()),
        vec![publisher.clone() as Arc<dyn CertPublisher>],
        test_config(),
    );
    queue.start().await.unwrap();

    wait_until(|| publisher.delivered_len() == 1).await;
    queue.stop().await;
}

// -----------------------------------------------------------------------
// Administrative clear
// -----------------------------------------------------------------------

#[tokio::test]
async fn clear_scopes_to_the_named_pair() {
    let db = setup_db().await;
    let p1 = TogglePublisher::new("p1", false);
    let p2 = TogglePublisher::new("p2", false);
    let queue = PublicationQueue::new(
        SurrealPublishQueueRepository::new(db.clone()),
        vec![
            p1.clone() as Arc<dyn CertPublisher>,
            p2.clone() as Arc<dyn CertPublisher>,
        ],
        test_config(),
    );
    queue.start().await.unwrap();

    queue
        .publish("ca1", PublishOperation::CertIssued, cert_payload())
        .await
        .unwrap();
    queue
        .publish("ca2", PublishOperation::CertIssued, cert_payload())
        .await
        .unwrap();

    // Pairs now: (ca1,p1), (ca1,p2), (ca2,p1), (ca2,p2).
    let cleared = queue
        .clear(
            &CaScope::Named("ca1".into()),
            &PublisherScope::Named(vec!["p1".into()]),
        )
        .await
        .unwrap();
    assert_eq!(cleared, 1);

    assert_eq!(queue.pending_len("ca1", "p1").await, 0);
    assert_eq!(queue.pending_len("ca1", "p2").await, 1);
    assert_eq!(queue.pending_len("ca2", "p1").await, 1);
    assert_eq!(queue.pending_len("ca2", "p2").await, 1);

    queue.stop().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clear_discards_in_flight_delivery_without_redelivery() {
    let db = setup_db().await;
    let publisher = GatedPublisher::new("p1");
    // Generous delivery timeout so the gated delivery is still in
    // flight when the clear lands.
    let config = CaConfig {
        delivery_timeout_ms: 30_000,
        ..test_config()
    };
    let queue = PublicationQueue::new(
        SurrealPublishQueueRepository::new(db.clone()),
        vec![publisher.clone() as Arc<dyn CertPublisher>],
        config,
    );
    queue.start().await.unwrap();

    queue
        .publish("ca1", PublishOperation::CertIssued, cert_payload())
        .await
        .unwrap();

    // Wait until the drain task is inside deliver(), parked on the
    // gate.
    publisher.entered.notified().await;

    // Clear while the delivery is in flight: returns promptly, counts
    // the pending row, and does not wait for the stuck publisher.
    let cleared = queue
        .clear(&CaScope::Named("ca1".into()), &PublisherScope::All)
        .await
        .unwrap();
    assert_eq!(cleared, 1);

    // Release the delivery. Its outcome is discarded: nothing is
    // re-enqueued and nothing further is delivered.
    publisher.gate.notify_one();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(publisher.delivered.lock().unwrap().len(), 1);
    assert_eq!(queue.pending_len("ca1", "p1").await, 0);

    let repo = SurrealPublishQueueRepository::new(db.clone());
    assert!(repo.pending().await.unwrap().is_empty());

    queue.stop().await;
}

#[tokio::test]
async fn publishing_resumes_after_clear() {
    let db = setup_db().await;
    let publisher = TogglePublisher::new("p1", true);
    let queue = PublicationQueue::new(
        SurrealPublishQueueRepository::new(db.clone()),
        vec![publisher.clone() as Arc<dyn CertPublisher>],
        test_config(),
    );
    queue.start().await.unwrap();

    queue
        .clear(&CaScope::All, &PublisherScope::All)
        .await
        .unwrap();

    // New tasks enqueue under the bumped generation and deliver
    // normally.
    queue
        .publish("ca1", PublishOperation::CaRevoked, PublishPayload::Ca)
        .await
        .unwrap();
    wait_until(|| publisher.delivered_len() == 1).await;

    queue.stop().await;
}
