// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Score calculation.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::catalog::ChallengeCatalog;
use crate::instance::{
    CHALLENGES_ANNOTATION, FIND_IT_CODE_ANNOTATION, FIX_IT_CODE_ANNOTATION, ManagedInstance,
};
use crate::progress::ChallengeProgress;

/// Points per difficulty level of a solved challenge.
pub const DIFFICULTY_MULTIPLIER: u32 = 10;

/// Flat bonus for each bonus category with a continue code present.
pub const BONUS_CODE_POINTS: u32 = 50;

/// A team's entry on the score board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamScore {
    /// Team name.
    pub name: String,
    /// Total score.
    pub score: u32,
    /// Competition rank, assigned by [`crate::ranking::rank_teams`]; 0 until ranked.
    pub position: usize,
    /// Recognised solved challenges in persisted order.
    pub challenges: Vec<ChallengeProgress>,
    /// When this entry was computed.
    pub last_update: DateTime<Utc>,
    /// Whether the instance is serving traffic.
    #[serde(rename = "readiness")]
    pub instance_readiness: bool,
}

impl TeamScore {
    /// Compare everything except `last_update`.
    ///
    /// Challenges are compared by key sequence only.
    pub fn equals_ignoring_last_update(&self, other: &TeamScore) -> bool {
        self.name == other.name
            && self.score == other.score
            && self.position == other.position
            && self.instance_readiness == other.instance_readiness
            && self.challenges.len() == other.challenges.len()
            && self
                .challenges
                .iter()
                .zip(&other.challenges)
                .all(|(a, b)| a.key == b.key)
    }

    /// Most recent solve time, `None` when nothing is solved.
    pub fn latest_solve(&self) -> Option<DateTime<Utc>> {
        self.challenges.iter().map(|c| c.solved_at).max()
    }
}

/// Compute a team's score from its instance annotations.
///
/// A missing or malformed challenges annotation yields a zero score. Unknown
/// challenge keys are skipped with a warning. Each bonus category with a
/// non-empty continue code adds [`BONUS_CODE_POINTS`].
pub fn calculate_score(instance: &ManagedInstance, catalog: &ChallengeCatalog) -> TeamScore {
    let mut team_score = TeamScore {
        name: instance.team.clone(),
        score: 0,
        position: 0,
        challenges: Vec::new(),
        last_update: Utc::now(),
        instance_readiness: instance.is_ready(),
    };
    let Some(solved_challenges) = instance.solved_challenges() else {
        if instance.annotation(CHALLENGES_ANNOTATION).is_none() {
            warn!(team = %instance.team, "No challenges annotation, scoring zero");
        }
        return team_score;
    };

    let mut score = [FIND_IT_CODE_ANNOTATION, FIX_IT_CODE_ANNOTATION]
        .into_iter()
        .filter(|key| instance.annotation(key).is_some())
        .count() as u32
        * BONUS_CODE_POINTS;
    let mut challenges = Vec::with_capacity(solved_challenges.len());
    for solved in solved_challenges {
        let Some(entry) = catalog.get(&solved.key) else {
            warn!(
                team = %instance.team,
                challenge = %solved.key,
                "Solved challenge is not in the catalog; instance version may be incompatible"
            );
            continue;
        };
        score += entry.difficulty * DIFFICULTY_MULTIPLIER;
        challenges.push(solved);
    }

    team_score.score = score;
    team_score.challenges = challenges;
    team_score
}
