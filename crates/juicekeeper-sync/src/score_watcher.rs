// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Score watcher.
//!
//! Keeps the [`ScoreCache`] in step with the instance store. The board is
//! loaded once from a full listing, then a watch feeds every change into the
//! cache. Watches end routinely (server-side timeouts), so a closed watch is
//! reopened right away; a watch that cannot be opened is retried with
//! exponential backoff. Deletions missed while no watch was open are caught by
//! relisting the store after each reopen and dropping teams it no longer has.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::score_cache::ScoreCache;
use crate::store::{InstanceEvent, InstanceStore};

/// Score watcher configuration.
#[derive(Debug, Clone)]
pub struct ScoreWatcherConfig {
    /// Delay before the first retry after a failed watch
    pub initial_backoff: Duration,
    /// Upper bound for the retry delay
    pub max_backoff: Duration,
}

impl Default for ScoreWatcherConfig {
    fn default() -> Self {
        Self {
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// How a single watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The stream ended; a new watch should be opened.
    Closed,
    /// Shutdown was requested.
    Cancelled,
}

/// Background task mirroring instance changes into the score cache.
pub struct ScoreWatcher {
    store: Arc<dyn InstanceStore>,
    cache: Arc<ScoreCache>,
    config: ScoreWatcherConfig,
    cancel: CancellationToken,
}

impl ScoreWatcher {
    /// Create a watcher.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        cache: Arc<ScoreCache>,
        config: ScoreWatcherConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            cache,
            config,
            cancel,
        }
    }

    /// Fill the cache from a full listing of the store.
    pub async fn load_board(&self) -> Result<()> {
        let instances = self.store.list().await?;
        self.cache.load(&instances);
        info!(teams = instances.len(), "Score board loaded");
        Ok(())
    }

    /// Open one watch and apply its events until it ends.
    ///
    /// Errors opening the watch or relisting are returned. An error item on an
    /// open watch ends it like a close.
    pub async fn watch_once(&self) -> Result<WatchOutcome> {
        let mut events = self.store.watch().await?;
        debug!("Instance watch opened");
        self.prune_board().await?;

        loop {
            let next = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(WatchOutcome::Cancelled),
                next = events.next() => next,
            };

            match next {
                Some(Ok(InstanceEvent::Applied(instance))) => {
                    if self.cache.apply(&instance) {
                        debug!(team = %instance.team, "Score updated");
                    }
                }
                Some(Ok(InstanceEvent::Deleted(instance))) => {
                    if self.cache.remove(&instance.team) {
                        info!(team = %instance.team, "Team removed from score board");
                    }
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Instance watch failed, reopening");
                    return Ok(WatchOutcome::Closed);
                }
                None => {
                    debug!("Instance watch closed");
                    return Ok(WatchOutcome::Closed);
                }
            }
        }
    }

    /// Drop teams whose instance is gone from the store.
    ///
    /// Runs after the watch is open, so a deletion racing the listing still
    /// arrives as an event.
    async fn prune_board(&self) -> Result<()> {
        let instances = self.store.list().await?;
        let present: HashSet<&str> = instances.iter().map(|i| i.team.as_str()).collect();
        for team in self.cache.retain_teams(&present) {
            info!(team = %team, "Team no longer deployed, removed from score board");
        }
        Ok(())
    }

    /// Run the watch loop until cancelled.
    pub async fn run(self) {
        info!("Score watcher started");
        let mut backoff = self.config.initial_backoff;

        loop {
            match self.watch_once().await {
                Ok(WatchOutcome::Cancelled) => break,
                Ok(WatchOutcome::Closed) => {
                    backoff = self.config.initial_backoff;
                }
                Err(e) => {
                    error!(
                        error = %e,
                        retry_in_ms = backoff.as_millis() as u64,
                        "Failed to open instance watch"
                    );
                    tokio::select! {
                        biased;

                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(self.config.max_backoff);
                }
            }

            if self.cancel.is_cancelled() {
                break;
            }
        }

        info!("Score watcher shutting down");
    }
}
