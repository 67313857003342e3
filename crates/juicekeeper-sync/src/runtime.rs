// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Embeddable runtime for the sync engine.
//!
//! [`SyncRuntime`] wires the score cache, the score watcher, the
//! reconciliation scheduler, the worker pool and the HTTP server together and
//! shuts them down as one.
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use juicekeeper_core::ChallengeCatalog;
//! use juicekeeper_sync::instance_api::HttpInstanceClient;
//! use juicekeeper_sync::runtime::SyncRuntime;
//! use juicekeeper_sync::store::MemoryInstanceStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = SyncRuntime::builder()
//!         .store(Arc::new(MemoryInstanceStore::new()))
//!         .instances(Arc::new(HttpInstanceClient::new(
//!             "http://juiceshop-{team}:3000",
//!             std::time::Duration::from_secs(5),
//!         )?))
//!         .catalog(Arc::new(ChallengeCatalog::from_path("challenges.json")?))
//!         .bind_addr("127.0.0.1:8080".parse()?)
//!         .build()?
//!         .start()
//!         .await?;
//!
//!     tokio::signal::ctrl_c().await?;
//!     runtime.shutdown().await
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use juicekeeper_core::ChallengeCatalog;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::instance_api::InstanceApi;
use crate::scheduler::{Scheduler, job_queue};
use crate::score_cache::ScoreCache;
use crate::score_watcher::{ScoreWatcher, ScoreWatcherConfig};
use crate::server::{AppState, serve};
use crate::store::InstanceStore;
use crate::worker_pool::{Reconciler, WorkerPool};

/// Builder for creating a [`SyncRuntime`].
pub struct SyncRuntimeBuilder {
    store: Option<Arc<dyn InstanceStore>>,
    instances: Option<Arc<dyn InstanceApi>>,
    catalog: Option<Arc<ChallengeCatalog>>,
    bind_addr: SocketAddr,
    worker_count: usize,
    sync_interval: Duration,
    long_poll_timeout: Duration,
    watcher_config: ScoreWatcherConfig,
}

impl Default for SyncRuntimeBuilder {
    fn default() -> Self {
        Self {
            store: None,
            instances: None,
            catalog: None,
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            worker_count: 10,
            sync_interval: Duration::from_secs(60),
            long_poll_timeout: Duration::from_secs(25),
            watcher_config: ScoreWatcherConfig::default(),
        }
    }
}

impl SyncRuntimeBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the instance store (required).
    pub fn store(mut self, store: Arc<dyn InstanceStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the instance API client (required).
    pub fn instances(mut self, instances: Arc<dyn InstanceApi>) -> Self {
        self.instances = Some(instances);
        self
    }

    /// Set the challenge catalog (required).
    pub fn catalog(mut self, catalog: Arc<ChallengeCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Set the HTTP bind address. Port 0 picks a free port.
    pub fn bind_addr(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the number of reconciliation workers.
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = count;
        self
    }

    /// Set the reconciliation period.
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = interval;
        self
    }

    /// Set the long-poll ceiling.
    pub fn long_poll_timeout(mut self, timeout: Duration) -> Self {
        self.long_poll_timeout = timeout;
        self
    }

    /// Set the watch retry backoff.
    pub fn watcher_config(mut self, config: ScoreWatcherConfig) -> Self {
        self.watcher_config = config;
        self
    }

    /// Build the runtime configuration.
    ///
    /// Returns an error if required fields are missing.
    pub fn build(self) -> Result<SyncRuntimeConfig> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("store is required"))?;
        let instances = self
            .instances
            .ok_or_else(|| anyhow::anyhow!("instances is required"))?;
        let catalog = self
            .catalog
            .ok_or_else(|| anyhow::anyhow!("catalog is required"))?;
        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be greater than zero");
        }

        Ok(SyncRuntimeConfig {
            store,
            instances,
            catalog,
            bind_addr: self.bind_addr,
            worker_count: self.worker_count,
            sync_interval: self.sync_interval,
            long_poll_timeout: self.long_poll_timeout,
            watcher_config: self.watcher_config,
        })
    }
}

/// Configuration for a [`SyncRuntime`].
pub struct SyncRuntimeConfig {
    store: Arc<dyn InstanceStore>,
    instances: Arc<dyn InstanceApi>,
    catalog: Arc<ChallengeCatalog>,
    bind_addr: SocketAddr,
    worker_count: usize,
    sync_interval: Duration,
    long_poll_timeout: Duration,
    watcher_config: ScoreWatcherConfig,
}

impl SyncRuntimeConfig {
    /// Start the runtime.
    ///
    /// The board is loaded before anything is spawned; failing to load it or
    /// to bind the listener is an error.
    pub async fn start(self) -> Result<SyncRuntime> {
        let cancel = CancellationToken::new();
        let cache = Arc::new(ScoreCache::new(self.catalog.clone()));

        let watcher = ScoreWatcher::new(
            self.store.clone(),
            cache.clone(),
            self.watcher_config,
            cancel.clone(),
        );
        watcher.load_board().await?;

        let listener = TcpListener::bind(self.bind_addr).await?;
        let local_addr = listener.local_addr()?;

        let watcher_handle = tokio::spawn(watcher.run());

        let (jobs_tx, jobs_rx) = job_queue();
        let scheduler = Scheduler::new(
            self.store.clone(),
            jobs_tx,
            self.sync_interval,
            cancel.clone(),
        );
        let scheduler_handle = tokio::spawn(scheduler.run());

        let reconciler = Arc::new(Reconciler::new(
            self.store.clone(),
            self.instances.clone(),
            self.catalog.clone(),
        ));
        let worker_handles =
            WorkerPool::new(reconciler, jobs_rx, self.worker_count, cancel.clone()).spawn();

        let state = AppState::new(
            cache.clone(),
            self.store.clone(),
            self.instances.clone(),
            self.long_poll_timeout,
            cancel.clone(),
        );
        let server_handle = tokio::spawn(serve(listener, state, cancel.clone()));

        info!(
            addr = %local_addr,
            workers = self.worker_count,
            sync_interval_secs = self.sync_interval.as_secs(),
            "SyncRuntime started"
        );

        Ok(SyncRuntime {
            server_handle,
            watcher_handle,
            scheduler_handle,
            worker_handles,
            cancel,
            cache,
            local_addr,
        })
    }
}

/// A running sync engine.
///
/// Call [`shutdown`](Self::shutdown) for graceful termination.
pub struct SyncRuntime {
    server_handle: JoinHandle<std::io::Result<()>>,
    watcher_handle: JoinHandle<()>,
    scheduler_handle: JoinHandle<()>,
    worker_handles: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
    cache: Arc<ScoreCache>,
    local_addr: SocketAddr,
}

impl SyncRuntime {
    /// Create a new builder for configuring the runtime.
    pub fn builder() -> SyncRuntimeBuilder {
        SyncRuntimeBuilder::new()
    }

    /// Address the HTTP server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The live score cache.
    pub fn cache(&self) -> &Arc<ScoreCache> {
        &self.cache
    }

    /// Gracefully shut down the runtime.
    ///
    /// Cancels every task, then waits for the watcher, the scheduler, the
    /// workers and the HTTP server to finish.
    pub async fn shutdown(self) -> Result<()> {
        info!("SyncRuntime shutting down...");
        self.cancel.cancel();

        if let Err(e) = self.watcher_handle.await {
            error!("Score watcher task panicked: {}", e);
        }

        if let Err(e) = self.scheduler_handle.await {
            error!("Scheduler task panicked: {}", e);
        }

        for handle in self.worker_handles {
            if let Err(e) = handle.await {
                error!("Reconciliation worker task panicked: {}", e);
            }
        }

        match self.server_handle.await {
            Ok(Ok(())) => {
                info!("SyncRuntime shutdown complete");
                Ok(())
            }
            Ok(Err(e)) => {
                error!("SyncRuntime server error during shutdown: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("SyncRuntime server task panicked: {}", e);
                Err(anyhow::anyhow!("server task panicked: {}", e))
            }
        }
    }

    /// Check if the runtime is still running.
    pub fn is_running(&self) -> bool {
        !self.server_handle.is_finished()
            && !self.watcher_handle.is_finished()
            && !self.scheduler_handle.is_finished()
            && self.worker_handles.iter().all(|handle| !handle.is_finished())
    }
}
