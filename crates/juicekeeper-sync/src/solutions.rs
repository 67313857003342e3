// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Recording solutions reported by instances.

use chrono::{DateTime, Utc};
use juicekeeper_core::ProgressCategory;
use tracing::{debug, info};

use crate::error::Result;
use crate::instance_api::InstanceApi;
use crate::store::InstanceStore;

/// What happened to a reported solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolutionOutcome {
    /// The challenge was added to the persisted progress.
    Recorded,
    /// The challenge was already recorded; nothing was written.
    AlreadySolved,
    /// A bonus challenge was solved and the category's code was refreshed.
    BonusCodeUpdated(ProgressCategory),
}

/// Persist a solved challenge reported for `team`.
///
/// Bonus challenges are tracked through their category's continue code, so
/// the current code is fetched from the instance and persisted instead of the
/// key. Other challenges are appended to the solved list unless present.
pub async fn record_solution(
    store: &dyn InstanceStore,
    instances: &dyn InstanceApi,
    team: &str,
    challenge: &str,
    solved_at: DateTime<Utc>,
) -> Result<SolutionOutcome> {
    let instance = store.get(team).await?;
    let mut progress = instance.persisted_progress();

    let category = ProgressCategory::of_challenge(challenge);
    if category != ProgressCategory::Main {
        let code = instances.continue_code(team, category).await?;
        progress.set_code(category, Some(code));
        store.patch_annotations(team, &progress).await?;
        info!(team, challenge, %category, "Bonus continue code updated");
        return Ok(SolutionOutcome::BonusCodeUpdated(category));
    }

    if !progress.record_solve(challenge, solved_at) {
        debug!(team, challenge, "Challenge already recorded");
        return Ok(SolutionOutcome::AlreadySolved);
    }

    store.patch_annotations(team, &progress).await?;
    info!(team, challenge, "Challenge solved");
    Ok(SolutionOutcome::Recorded)
}
