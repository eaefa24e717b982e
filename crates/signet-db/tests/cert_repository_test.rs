//! Integration tests for the certificate repository implementation
//! using in-memory SurrealDB.

use chrono::{Duration, Utc};
use signet_core::models::certificate::{CertRecord, Fingerprint, RevocationReason};
use signet_core::repository::CertRepository;
use signet_db::repository::SurrealCertRepository;
use surrealdb::Surreal;
use surrealdb::engine::local::Mem;
use uuid::Uuid;

/// Helper: spin up in-memory DB and run migrations.
async fn setup() -> Surreal<surrealdb::engine::local::Db> {
    let db = Surreal::new::<Mem>(()).await.unwrap();
    db.use_ns("test").use_db("test").await.unwrap();
    signet_db::run_migrations(&db).await.unwrap();
    db
}

fn record(ca_name: &str, profile: &str, subject_fp: u64, key_fp: u64) -> CertRecord {
    CertRecord {
        id: Uuid::new_v4(),
        ca_name: ca_name.into(),
        serial: rand_serial(),
        profile: profile.into(),
        subject_fp: Fingerprint(subject_fp),
        key_fp: Fingerprint(key_fp),
        revoked: false,
        revocation_reason: None,
        invalidity_time: None,
        not_after: Utc::now() + Duration::days(365),
        created_at: Utc::now(),
    }
}

fn rand_serial() -> u64 {
    // Tests only need distinct values; the UUID is a convenient source.
    Uuid::new_v4().as_u64_pair().0
}

#[tokio::test]
async fn insert_and_get_round_trips_fingerprints() {
    let db = setup().await;
    let repo = SurrealCertRepository::new(db);

    let rec = record("ca1", "tls-server", u64::MAX, 0x0123_4567_89ab_cdef);
    repo.insert(&rec).await.unwrap();

    let fetched = repo.get(rec.id).await.unwrap();
    assert_eq!(fetched.id, rec.id);
    assert_eq!(fetched.subject_fp, Fingerprint(u64::MAX));
    assert_eq!(fetched.key_fp, Fingerprint(0x0123_4567_89ab_cdef));
    assert_eq!(fetched.serial, rec.serial);
    assert!(!fetched.revoked);
}

#[tokio::test]
async fn get_unknown_certificate_is_not_found() {
    let db = setup().await;
    let repo = SurrealCertRepository::new(db);

    let err = repo.get(Uuid::new_v4()).await.unwrap_err();
    assert!(matches!(
        err,
        signet_core::SignetError::NotFound { .. }
    ));
}

#[tokio::test]
async fn unrevoked_query_excludes_revoked_and_respects_profile() {
    let db = setup().await;
    let repo = SurrealCertRepository::new(db);

    let live_a = record("ca1", "profile-a", 5, 100);
    let live_b = record("ca1", "profile-b", 5, 101);
    let dead = record("ca1", "profile-a", 5, 102);
    let other_ca = record("ca2", "profile-a", 5, 103);

    for rec in [&live_a, &live_b, &dead, &other_ca] {
        repo.insert(rec).await.unwrap();
    }
    repo.set_revocation(dead.id, RevocationReason::Superseded, None)
        .await
        .unwrap();

    // All un-revoked bundles of ca1.
    let all = repo.unrevoked_for_ca("ca1", None).await.unwrap();
    let ids: Vec<Uuid> = all.iter().map(|r| r.id).collect();
    assert_eq!(all.len(), 2);
    assert!(ids.contains(&live_a.id));
    assert!(ids.contains(&live_b.id));

    // Narrowed to one profile.
    let scoped = repo
        .unrevoked_for_ca("ca1", Some("profile-a"))
        .await
        .unwrap();
    assert_eq!(scoped.len(), 1);
    assert_eq!(scoped[0].id, live_a.id);
}

#[tokio::test]
async fn revocation_round_trip() {
    let db = setup().await;
    let repo = SurrealCertRepository::new(db);

    let rec = record("ca1", "profile-a", 7, 200);
    repo.insert(&rec).await.unwrap();

    let invalidity = Utc::now() - Duration::hours(2);
    repo.set_revocation(rec.id, RevocationReason::KeyCompromise, Some(invalidity))
        .await
        .unwrap();

    let revoked = repo.get(rec.id).await.unwrap();
    assert!(revoked.revoked);
    assert_eq!(
        revoked.revocation_reason,
        Some(RevocationReason::KeyCompromise)
    );
    assert!(revoked.invalidity_time.is_some());

    repo.clear_revocation(rec.id).await.unwrap();
    let restored = repo.get(rec.id).await.unwrap();
    assert!(!restored.revoked);
    assert_eq!(restored.revocation_reason, None);
    assert_eq!(restored.invalidity_time, None);
}

#[tokio::test]
async fn delete_frees_the_bundle() {
    let db = setup().await;
    let repo = SurrealCertRepository::new(db);

    let rec = record("ca1", "profile-a", 9, 300);
    repo.insert(&rec).await.unwrap();
    repo.delete(rec.id).await.unwrap();

    assert!(repo.get(rec.id).await.is_err());
    assert!(repo.unrevoked_for_ca("ca1", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn revoked_serials_lists_only_revoked() {
    let db = setup().await;
    let repo = SurrealCertRepository::new(db);

    let live = record("ca1", "profile-a", 1, 400);
    let dead = record("ca1", "profile-a", 2, 401);
    repo.insert(&live).await.unwrap();
    repo.insert(&dead).await.unwrap();
    repo.set_revocation(dead.id, RevocationReason::CessationOfOperation, None)
        .await
        .unwrap();

    let serials = repo.revoked_serials("ca1").await.unwrap();
    assert_eq!(serials.len(), 1);
    assert_eq!(serials[0].0, dead.serial);
    assert_eq!(serials[0].1, RevocationReason::CessationOfOperation);
}
