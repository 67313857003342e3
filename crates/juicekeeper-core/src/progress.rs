// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Progress model shared by the score cache and the reconciliation pool.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A solved challenge and when it was solved.
///
/// This is the element type of the persisted challenges annotation:
/// `[{"key": "...", "solvedAt": "2024-05-01T12:00:00Z"}]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeProgress {
    /// Challenge key.
    pub key: String,
    /// Solve timestamp.
    pub solved_at: DateTime<Utc>,
}

impl ChallengeProgress {
    /// Create a progress entry.
    pub fn new(key: impl Into<String>, solved_at: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            solved_at,
        }
    }
}

/// Parse a persisted challenges annotation. An empty string is an empty list.
pub fn parse_challenges(raw: &str) -> Result<Vec<ChallengeProgress>, serde_json::Error> {
    if raw.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(raw)
}

/// Stable sort by solve time; entries solved at the same instant keep their order.
pub fn sort_by_solved_at(challenges: &mut [ChallengeProgress]) {
    challenges.sort_by_key(|challenge| challenge.solved_at);
}

/// The three independently reconciled progress categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressCategory {
    /// Regular challenges.
    Main,
    /// "Find it" coding challenges.
    FindIt,
    /// "Fix it" coding challenges.
    FixIt,
}

impl ProgressCategory {
    /// The two bonus categories.
    pub const BONUS: [ProgressCategory; 2] = [ProgressCategory::FindIt, ProgressCategory::FixIt];

    /// Path segment under `/rest/continue-code`, `None` for the main category.
    pub fn path_segment(self) -> Option<&'static str> {
        match self {
            ProgressCategory::Main => None,
            ProgressCategory::FindIt => Some("find-it"),
            ProgressCategory::FixIt => Some("fix-it"),
        }
    }

    /// Category a solved challenge key belongs to.
    ///
    /// Coding challenge keys are prefixed with `find-it-` or `fix-it-`.
    pub fn of_challenge(key: &str) -> Self {
        if key.starts_with("find-it-") {
            ProgressCategory::FindIt
        } else if key.starts_with("fix-it-") {
            ProgressCategory::FixIt
        } else {
            ProgressCategory::Main
        }
    }
}

impl std::fmt::Display for ProgressCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path_segment().unwrap_or("main"))
    }
}

/// Progress of one team: solved challenges plus both bonus continue codes.
///
/// Used both for what is persisted on the resource and for what an instance
/// reports live. An empty code is normalised to `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressState {
    /// Solved challenges in persisted order.
    pub challenges: Vec<ChallengeProgress>,
    /// "Find it" continue code.
    pub find_it_code: Option<String>,
    /// "Fix it" continue code.
    pub fix_it_code: Option<String>,
}

impl ProgressState {
    /// Create a state, dropping empty codes.
    pub fn new(
        challenges: Vec<ChallengeProgress>,
        find_it_code: Option<String>,
        fix_it_code: Option<String>,
    ) -> Self {
        Self {
            challenges,
            find_it_code: non_empty(find_it_code),
            fix_it_code: non_empty(fix_it_code),
        }
    }

    /// Continue code of a bonus category. Always `None` for `Main`.
    pub fn code(&self, category: ProgressCategory) -> Option<&str> {
        match category {
            ProgressCategory::Main => None,
            ProgressCategory::FindIt => self.find_it_code.as_deref(),
            ProgressCategory::FixIt => self.fix_it_code.as_deref(),
        }
    }

    /// Replace the continue code of a bonus category.
    pub fn set_code(&mut self, category: ProgressCategory, code: Option<String>) {
        match category {
            ProgressCategory::Main => {}
            ProgressCategory::FindIt => self.find_it_code = non_empty(code),
            ProgressCategory::FixIt => self.fix_it_code = non_empty(code),
        }
    }

    /// Set of solved challenge keys.
    pub fn solved_keys(&self) -> BTreeSet<&str> {
        self.challenges.iter().map(|c| c.key.as_str()).collect()
    }

    /// Whether a challenge is already recorded.
    pub fn contains(&self, key: &str) -> bool {
        self.challenges.iter().any(|c| c.key == key)
    }

    /// Record a solve unless the key is already present.
    ///
    /// Returns `false` when the challenge was already recorded.
    pub fn record_solve(&mut self, key: &str, solved_at: DateTime<Utc>) -> bool {
        if self.contains(key) {
            return false;
        }
        self.challenges.push(ChallengeProgress::new(key, solved_at));
        sort_by_solved_at(&mut self.challenges);
        true
    }
}

fn non_empty(code: Option<String>) -> Option<String> {
    code.filter(|c| !c.is_empty())
}
