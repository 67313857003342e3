// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Progress comparator.
//!
//! Decides how a reconciliation job repairs divergence between what an
//! instance reports live and what was last persisted for it.

use crate::progress::{ProgressCategory, ProgressState};

/// Outcome of comparing live progress against the last persisted progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressAction {
    /// The instance lost progress; reapply the persisted codes, then persist
    /// what the instance reports afterwards.
    ApplyCode,
    /// The instance has different solved challenges; persist them.
    UpdateCache,
    /// Solved challenges match but a bonus code changed; persist the codes.
    UpdateBonusCodes,
    /// Nothing to do.
    NoOp,
}

/// Classify a reconciliation job.
///
/// Solved challenges are compared as key sets, so two lists of equal length
/// with different keys are not a no-op. A bonus code that was persisted but is
/// now missing on the instance counts as lost progress.
pub fn compare_progress(live: &ProgressState, last_known: &ProgressState) -> ProgressAction {
    let live_keys = live.solved_keys();
    let known_keys = last_known.solved_keys();

    let lost_challenges = !known_keys.is_subset(&live_keys);
    let lost_bonus = ProgressCategory::BONUS
        .into_iter()
        .any(|category| last_known.code(category).is_some() && live.code(category).is_none());
    if lost_challenges || lost_bonus {
        return ProgressAction::ApplyCode;
    }

    if live_keys != known_keys {
        return ProgressAction::UpdateCache;
    }

    if ProgressCategory::BONUS
        .into_iter()
        .any(|category| live.code(category) != last_known.code(category))
    {
        return ProgressAction::UpdateBonusCodes;
    }

    ProgressAction::NoOp
}

/// Categories whose persisted progress should be reapplied after a loss.
///
/// Only categories that have something to restore are returned.
pub fn categories_to_restore(last_known: &ProgressState) -> Vec<ProgressCategory> {
    let mut categories = Vec::with_capacity(3);
    if !last_known.challenges.is_empty() {
        categories.push(ProgressCategory::Main);
    }
    categories.extend(
        ProgressCategory::BONUS
            .into_iter()
            .filter(|category| last_known.code(*category).is_some()),
    );
    categories
}
