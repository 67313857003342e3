// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Managed instance resources and their progress annotations.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::progress::{ChallengeProgress, ProgressState, parse_challenges};

/// Annotation holding the JSON array of solved challenges.
pub const CHALLENGES_ANNOTATION: &str = "multi-juicer.owasp-juice.shop/challenges";
/// Annotation holding the "find it" continue code.
pub const FIND_IT_CODE_ANNOTATION: &str = "multi-juicer.owasp-juice.shop/continueCodeFindIt";
/// Annotation holding the "fix it" continue code.
pub const FIX_IT_CODE_ANNOTATION: &str = "multi-juicer.owasp-juice.shop/continueCodeFixIt";
/// Annotation holding the last request time in milliseconds since epoch.
pub const LAST_REQUEST_ANNOTATION: &str = "multi-juicer.owasp-juice.shop/lastRequest";

/// Label carrying the team name.
pub const TEAM_LABEL: &str = "team";
/// Label selector identifying managed instances.
pub const INSTANCE_LABEL_SELECTOR: &str =
    "app.kubernetes.io/name=juice-shop,app.kubernetes.io/part-of=multi-juicer";
/// Resource name prefix; the full name is `juiceshop-<team>`.
pub const INSTANCE_NAME_PREFIX: &str = "juiceshop-";

/// Resource name of a team's instance.
pub fn instance_name(team: &str) -> String {
    format!("{INSTANCE_NAME_PREFIX}{team}")
}

/// A team's instance as seen through the resource API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedInstance {
    /// Resource name.
    pub name: String,
    /// Team owning the instance.
    pub team: String,
    /// Resource annotations.
    pub annotations: BTreeMap<String, String>,
    /// Replicas currently passing readiness checks.
    pub ready_replicas: i32,
    /// Resource creation time.
    pub created_at: Option<DateTime<Utc>>,
}

impl ManagedInstance {
    /// Create an instance for a team with the conventional resource name.
    pub fn new(team: impl Into<String>) -> Self {
        let team = team.into();
        Self {
            name: instance_name(&team),
            team,
            ..Default::default()
        }
    }

    /// Whether the instance is currently serving traffic.
    pub fn is_ready(&self) -> bool {
        self.ready_replicas > 0
    }

    /// Annotation value, treating empty strings as absent.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Solved challenges from the challenges annotation.
    ///
    /// `None` when the annotation is absent or malformed; a malformed value is
    /// logged.
    pub fn solved_challenges(&self) -> Option<Vec<ChallengeProgress>> {
        let Some(raw) = self.annotation(CHALLENGES_ANNOTATION) else {
            debug!(team = %self.team, "No challenges annotation yet");
            return None;
        };
        match parse_challenges(raw) {
            Ok(challenges) => Some(challenges),
            Err(e) => {
                warn!(
                    team = %self.team,
                    error = %e,
                    "Invalid challenges annotation, assuming no solved challenges"
                );
                None
            }
        }
    }

    /// Last persisted progress.
    ///
    /// A missing or malformed challenges annotation reads as no solved
    /// challenges; the bonus codes are still returned.
    pub fn persisted_progress(&self) -> ProgressState {
        ProgressState::new(
            self.solved_challenges().unwrap_or_default(),
            self.annotation(FIND_IT_CODE_ANNOTATION).map(str::to_string),
            self.annotation(FIX_IT_CODE_ANNOTATION).map(str::to_string),
        )
    }

    /// Last request time in milliseconds since epoch, 0 when absent or unparsable.
    pub fn last_request_millis(&self) -> i64 {
        self.annotation(LAST_REQUEST_ANNOTATION)
            .and_then(|raw| raw.parse().ok())
            .unwrap_or(0)
    }
}

/// Annotation values persisting a progress state.
///
/// Missing bonus codes are written as empty strings so a cleared code overwrites
/// the previous one.
pub fn progress_annotations(
    progress: &ProgressState,
) -> Result<BTreeMap<String, String>, serde_json::Error> {
    let challenges = serde_json::to_string(&progress.challenges)?;
    Ok(BTreeMap::from([
        (CHALLENGES_ANNOTATION.to_string(), challenges),
        (
            FIND_IT_CODE_ANNOTATION.to_string(),
            progress.find_it_code.clone().unwrap_or_default(),
        ),
        (
            FIX_IT_CODE_ANNOTATION.to_string(),
            progress.fix_it_code.clone().unwrap_or_default(),
        ),
    ]))
}
