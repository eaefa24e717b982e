//! SIGNET Server — Application entry point.
//!
//! Wires the lifecycle core together: connects to SurrealDB, runs
//! migrations, loads the CA registry, starts the publication queue,
//! and keeps draining until shutdown. The enrollment protocol
//! front-ends, the HSM-backed signer, and the administrative surface
//! mount on top of the [`CaLifecycle`] handle constructed from these
//! parts.
//!
//! [`CaLifecycle`]: signet_ca::CaLifecycle

use std::sync::Arc;

use signet_ca::{CaConfig, CaRegistry, CertPublisher, PublicationQueue};
use signet_db::repository::{SurrealCaRepository, SurrealPublishQueueRepository};
use signet_db::{DbConfig, DbManager};
use tracing_subscriber::EnvFilter;

fn db_config_from_env() -> DbConfig {
    let defaults = DbConfig::default();
    DbConfig {
        url: std::env::var("SIGNET_DB_URL").unwrap_or(defaults.url),
        namespace: std::env::var("SIGNET_DB_NAMESPACE").unwrap_or(defaults.namespace),
        database: std::env::var("SIGNET_DB_DATABASE").unwrap_or(defaults.database),
        username: std::env::var("SIGNET_DB_USERNAME").unwrap_or(defaults.username),
        password: std::env::var("SIGNET_DB_PASSWORD").unwrap_or(defaults.password),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("signet=info".parse().unwrap()),
        )
        .json()
        .init();

    tracing::info!("Starting SIGNET server...");

    let db_config = db_config_from_env();
    let manager = DbManager::connect(&db_config).await?;
    let db = manager.client().clone();
    signet_db::run_migrations(&db).await?;

    let registry = Arc::new(CaRegistry::load(SurrealCaRepository::new(db.clone())).await?);
    tracing::info!(cas = registry.all().await.len(), "CA registry ready");

    // Publication targets are registered here as they are developed
    // (LDAP directory, OCSP feeder, HTTP endpoints).
    let publishers: Vec<Arc<dyn CertPublisher>> = Vec::new();

    let queue = PublicationQueue::new(
        SurrealPublishQueueRepository::new(db.clone()),
        publishers,
        CaConfig::default(),
    );
    queue.start().await?;

    // TODO: connect the HSM-backed signer and construct `CaLifecycle`
    // TODO: mount the enrollment protocol front-ends
    // TODO: mount the administrative command surface

    tracing::info!("SIGNET server ready");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down; stopping publication queue");
    queue.stop().await;

    tracing::info!("SIGNET server stopped.");
    Ok(())
}
