// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Juicekeeper Sync - score board and progress reconciliation server
//!
//! Runs next to the managed Juice Shop instances and:
//! - keeps a ranked score board current from instance annotations
//! - answers long-poll board reads
//! - records solutions reported by instance webhooks
//! - restores lost progress by reapplying continue codes

use std::sync::Arc;
use tracing::{info, warn};

use juicekeeper_core::ChallengeCatalog;
use juicekeeper_sync::config::{Config, StoreBackend};
use juicekeeper_sync::instance_api::HttpInstanceClient;
use juicekeeper_sync::runtime::SyncRuntime;
use juicekeeper_sync::store::{InstanceStore, KubeConfig, KubeInstanceStore, MemoryInstanceStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "juicekeeper_sync=info,juicekeeper_core=info".into()),
        )
        .init();

    // Load .env file if present
    if let Err(e) = dotenvy::dotenv() {
        warn!("No .env file loaded: {}", e);
    }

    let config = Config::from_env()?;

    info!(
        namespace = %config.namespace,
        http_addr = %config.http_addr,
        store = ?config.store,
        workers = config.worker_count,
        "Starting Juicekeeper Sync"
    );

    let catalog = Arc::new(ChallengeCatalog::from_path(&config.challenges_path)?);
    info!(challenges = catalog.len(), "Challenge catalog loaded");

    let store: Arc<dyn InstanceStore> = match config.store {
        StoreBackend::Kubernetes => {
            let kube = KubeConfig::in_cluster(&config.namespace)?;
            Arc::new(KubeInstanceStore::new(kube)?)
        }
        StoreBackend::Memory => {
            warn!("Using the in-memory instance store; progress is not persisted");
            Arc::new(MemoryInstanceStore::new())
        }
    };

    let instances = Arc::new(HttpInstanceClient::new(
        &config.instance_url_template,
        config.instance_timeout,
    )?);

    let runtime = SyncRuntime::builder()
        .store(store)
        .instances(instances)
        .catalog(catalog)
        .bind_addr(config.http_addr)
        .worker_count(config.worker_count)
        .sync_interval(config.sync_interval)
        .long_poll_timeout(config.long_poll_timeout)
        .build()?
        .start()
        .await?;

    info!(addr = %runtime.local_addr(), "Juicekeeper Sync ready");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    runtime.shutdown().await?;

    info!("Juicekeeper Sync shut down");

    Ok(())
}
