// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reconciliation scheduler.
//!
//! Every cycle lists the managed instances and queues one job per ready
//! instance, carrying the progress last persisted for it. The queue is
//! bounded, so a cycle blocks while workers are busy and cycles never pile up.

use std::sync::Arc;
use std::time::Duration;

use juicekeeper_core::ProgressState;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::store::InstanceStore;

/// Work item for the worker pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationJob {
    /// Team whose instance is reconciled.
    pub team: String,
    /// Progress persisted on the instance when the job was queued.
    pub last_known: ProgressState,
}

/// Create the job queue shared by the scheduler and the workers.
///
/// A capacity of one keeps at most one job waiting ahead of the workers.
pub fn job_queue() -> (mpsc::Sender<ReconciliationJob>, mpsc::Receiver<ReconciliationJob>) {
    mpsc::channel(1)
}

/// Periodic producer of reconciliation jobs.
pub struct Scheduler {
    store: Arc<dyn InstanceStore>,
    jobs: mpsc::Sender<ReconciliationJob>,
    interval: Duration,
    cancel: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler.
    pub fn new(
        store: Arc<dyn InstanceStore>,
        jobs: mpsc::Sender<ReconciliationJob>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            jobs,
            interval,
            cancel,
        }
    }

    /// Run cycles until cancelled. The first cycle starts immediately.
    pub async fn run(self) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Reconciliation scheduler started"
        );

        loop {
            match self.enqueue_cycle().await {
                Ok(queued) => debug!(queued, "Reconciliation cycle queued"),
                Err(e) => error!(error = %e, "Reconciliation cycle failed"),
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Reconciliation scheduler shutting down");
    }

    /// List instances and queue a job for every ready one.
    ///
    /// Returns the number of jobs queued. Stops early on cancellation.
    pub async fn enqueue_cycle(&self) -> Result<usize> {
        let instances = self.store.list().await?;
        let mut queued = 0;

        for instance in instances {
            if !instance.is_ready() {
                debug!(team = %instance.team, "Instance not ready, skipping");
                continue;
            }

            let job = ReconciliationJob {
                last_known: instance.persisted_progress(),
                team: instance.team,
            };

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => return Ok(queued),
                sent = self.jobs.send(job) => {
                    sent.map_err(|_| Error::Other("reconciliation queue closed".into()))?;
                }
            }
            queued += 1;
        }

        Ok(queued)
    }
}
