// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reconciliation workers.
//!
//! A fixed number of workers drain the job queue. Each job compares what the
//! instance reports live with what was last persisted and repairs the
//! difference: lost progress is restored by applying continue codes, new
//! progress is persisted. A failed job is logged and dropped; the next cycle
//! queues the team again.

use std::sync::Arc;

use juicekeeper_core::comparator::categories_to_restore;
use juicekeeper_core::{
    ChallengeCatalog, ContinueCodeEncoder, ProgressAction, ProgressCategory, ProgressState,
    compare_progress,
};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::instance_api::InstanceApi;
use crate::scheduler::ReconciliationJob;
use crate::store::InstanceStore;

/// Executes a single reconciliation job.
pub struct Reconciler {
    store: Arc<dyn InstanceStore>,
    instances: Arc<dyn InstanceApi>,
    catalog: Arc<ChallengeCatalog>,
    encoder: ContinueCodeEncoder,
}

impl Reconciler {
    /// Create a reconciler.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        instances: Arc<dyn InstanceApi>,
        catalog: Arc<ChallengeCatalog>,
    ) -> Self {
        Self {
            store,
            instances,
            catalog,
            encoder: ContinueCodeEncoder::new(),
        }
    }

    /// Reconcile one team and report which action was taken.
    pub async fn reconcile(&self, job: &ReconciliationJob) -> Result<ProgressAction> {
        let team = job.team.as_str();
        let live = self.instances.live_progress(team).await?;
        let action = compare_progress(&live, &job.last_known);

        match action {
            ProgressAction::ApplyCode => {
                info!(
                    team,
                    live = live.challenges.len(),
                    persisted = job.last_known.challenges.len(),
                    "Instance lost progress, restoring"
                );
                self.restore(team, &job.last_known).await?;
                let restored = self.instances.live_progress(team).await?;
                self.ensure_restored(team, &restored, &job.last_known)?;
                self.store.patch_annotations(team, &restored).await?;
            }
            ProgressAction::UpdateCache => {
                debug!(team, solved = live.challenges.len(), "Persisting new progress");
                self.store.patch_annotations(team, &live).await?;
            }
            ProgressAction::UpdateBonusCodes => {
                debug!(team, "Persisting changed bonus codes");
                self.store.patch_annotations(team, &live).await?;
            }
            ProgressAction::NoOp => {
                debug!(team, "Progress in sync");
            }
        }

        Ok(action)
    }

    /// Apply persisted codes to the instance, stopping at the first failure.
    async fn restore(&self, team: &str, last_known: &ProgressState) -> Result<()> {
        for category in categories_to_restore(last_known) {
            let code = match category {
                ProgressCategory::Main => self
                    .encoder
                    .encode_progress(&self.catalog, &last_known.challenges)?,
                bonus => match last_known.code(bonus) {
                    Some(code) => code.to_string(),
                    None => continue,
                },
            };

            if let Err(e) = self.instances.apply_continue_code(team, category, &code).await {
                warn!(team, %category, error = %e, "Failed to apply continue code");
                return Err(e);
            }
            debug!(team, %category, "Continue code applied");
        }
        Ok(())
    }

    /// Refuse to persist progress that still lacks part of the record.
    ///
    /// Keys missing from the catalog cannot be encoded, so they are not
    /// expected back.
    fn ensure_restored(
        &self,
        team: &str,
        restored: &ProgressState,
        last_known: &ProgressState,
    ) -> Result<()> {
        let mut missing: Vec<String> = last_known
            .challenges
            .iter()
            .filter(|c| self.catalog.get(&c.key).is_some() && !restored.contains(&c.key))
            .map(|c| c.key.clone())
            .collect();
        missing.extend(
            ProgressCategory::BONUS
                .into_iter()
                .filter(|category| {
                    last_known.code(*category).is_some() && restored.code(*category).is_none()
                })
                .map(|category| format!("{category} continue code")),
        );

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::RestoreIncomplete {
                team: team.to_string(),
                missing,
            })
        }
    }
}

/// Fixed-size pool of reconciliation workers.
pub struct WorkerPool {
    reconciler: Arc<Reconciler>,
    jobs: Arc<Mutex<mpsc::Receiver<ReconciliationJob>>>,
    worker_count: usize,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Create a pool that will run `worker_count` workers over `jobs`.
    pub fn new(
        reconciler: Arc<Reconciler>,
        jobs: mpsc::Receiver<ReconciliationJob>,
        worker_count: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reconciler,
            jobs: Arc::new(Mutex::new(jobs)),
            worker_count,
            cancel,
        }
    }

    /// Spawn the workers.
    pub fn spawn(self) -> Vec<JoinHandle<()>> {
        info!(workers = self.worker_count, "Starting reconciliation workers");
        (0..self.worker_count)
            .map(|worker| {
                let reconciler = self.reconciler.clone();
                let jobs = self.jobs.clone();
                let cancel = self.cancel.clone();
                tokio::spawn(run_worker(worker, reconciler, jobs, cancel))
            })
            .collect()
    }
}

async fn run_worker(
    worker: usize,
    reconciler: Arc<Reconciler>,
    jobs: Arc<Mutex<mpsc::Receiver<ReconciliationJob>>>,
    cancel: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            job = async { jobs.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            debug!(worker, "Job queue closed");
            break;
        };

        if let Err(e) = reconciler.reconcile(&job).await {
            warn!(
                worker,
                team = %job.team,
                error = %e,
                "Reconciliation failed, will retry next cycle"
            );
        }
    }
    debug!(worker, "Reconciliation worker stopped");
}
