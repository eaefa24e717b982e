//! Integration tests for the publish-queue repository implementation
//! using in-memory SurrealDB.

use chrono::Utc;
use signet_core::models::publish::{
    CaScope, PublishOperation, PublishPayload, PublishTask, PublisherScope,
};
use signet_core::repository::PublishQueueRepository;
use signet_db::repository::SurrealPublishQueueRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use uuid::Uuid;

async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    signet_db::run_migrations(&db).await.unwrap();
    db
}

fn task(ca: &str, publisher: &str) -> PublishTask {
    PublishTask {
        id: Uuid::new_v4(),
        ca_name: ca.into(),
        publisher: publisher.into(),
        operation: PublishOperation::CertIssued,
        payload: PublishPayload::Cert {
            cert_id: Uuid::new_v4(),
        },
        enqueued_at: Utc::now(),
        attempts: 0,
        generation: 0,
    }
}

#[tokio::test]
async fn append_and_reload_pending() {
    let db = setup().await;
    let repo = SurrealPublishQueueRepository::new(db);

    let t1 = task("ca1", "p1");
    let t2 = PublishTask {
        payload: PublishPayload::Crl { crl_number: 17 },
        operation: PublishOperation::CrlGenerated,
        ..task("ca1", "p2")
    };
    repo.append(&t1).await.unwrap();
    repo.append(&t2).await.unwrap();

    let pending = repo.pending().await.unwrap();
    assert_eq!(pending.len(), 2);

    let reloaded = pending.iter().find(|t| t.id == t2.id).unwrap();
    assert_eq!(reloaded.operation, PublishOperation::CrlGenerated);
    assert_eq!(reloaded.payload, PublishPayload::Crl { crl_number: 17 });
}

#[tokio::test]
async fn remove_deletes_one_task() {
    let db = setup().await;
    let repo = SurrealPublishQueueRepository::new(db);

    let t1 = task("ca1", "p1");
    let t2 = task("ca1", "p1");
    repo.append(&t1).await.unwrap();
    repo.append(&t2).await.unwrap();

    repo.remove(t1.id).await.unwrap();

    let pending = repo.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, t2.id);
}

#[tokio::test]
async fn record_attempt_persists_count() {
    let db = setup().await;
    let repo = SurrealPublishQueueRepository::new(db);

    let t = task("ca1", "p1");
    repo.append(&t).await.unwrap();
    repo.record_attempt(t.id, 5).await.unwrap();

    let pending = repo.pending().await.unwrap();
    assert_eq!(pending[0].attempts, 5);
}

#[tokio::test]
async fn clear_scopes_to_ca_and_publisher() {
    let db = setup().await;
    let repo = SurrealPublishQueueRepository::new(db);

    repo.append(&task("ca1", "p1")).await.unwrap();
    repo.append(&task("ca1", "p2")).await.unwrap();
    repo.append(&task("ca2", "p1")).await.unwrap();

    let cleared = repo
        .clear(
            &CaScope::Named("ca1".into()),
            &PublisherScope::Named(vec!["p1".into()]),
        )
        .await
        .unwrap();
    assert_eq!(cleared, 1);

    let remaining = repo.pending().await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(
        remaining
            .iter()
            .all(|t| !(t.ca_name == "ca1" && t.publisher == "p1"))
    );
}

#[tokio::test]
async fn clear_all_publishers_for_one_ca() {
    let db = setup().await;
    let repo = SurrealPublishQueueRepository::new(db);

    repo.append(&task("ca1", "p1")).await.unwrap();
    repo.append(&task("ca1", "p2")).await.unwrap();
    repo.append(&task("ca2", "p1")).await.unwrap();

    let cleared = repo
        .clear(&CaScope::Named("ca1".into()), &PublisherScope::All)
        .await
        .unwrap();
    assert_eq!(cleared, 2);

    let remaining = repo.pending().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].ca_name, "ca2");
}

#[tokio::test]
async fn clear_everything() {
    let db = setup().await;
    let repo = SurrealPublishQueueRepository::new(db);

    repo.append(&task("ca1", "p1")).await.unwrap();
    repo.append(&task("ca2", "p2")).await.unwrap();

    let cleared = repo.clear(&CaScope::All, &PublisherScope::All).await.unwrap();
    assert_eq!(cleared, 2);
    assert!(repo.pending().await.unwrap().is_empty());
}

#[tokio::test]
async fn clear_of_empty_scope_returns_zero() {
    let db = setup().await;
    let repo = SurrealPublishQueueRepository::new(db);

    let cleared = repo
        .clear(
            &CaScope::Named("nope".into()),
            &PublisherScope::Named(vec!["p9".into()]),
        )
        .await
        .unwrap();
    assert_eq!(cleared, 0);
}
