// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ranking engine.

use std::cmp::Ordering;

use crate::scoring::TeamScore;

/// Board order: higher score first, then the earlier latest solve, then name.
///
/// A team with no solves counts as having solved at the earliest possible time.
pub fn compare_teams(a: &TeamScore, b: &TeamScore) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.latest_solve().cmp(&b.latest_solve()))
        .then_with(|| a.name.cmp(&b.name))
}

/// Sort teams into board order and assign competition-ranking positions.
///
/// Equal scores share a position; the next distinct score resumes at its
/// 1-based index (1, 1, 3, ...).
pub fn rank_teams(teams: impl IntoIterator<Item = TeamScore>) -> Vec<TeamScore> {
    let mut ranked: Vec<TeamScore> = teams.into_iter().collect();
    ranked.sort_by(compare_teams);

    let mut position = 1;
    for i in 0..ranked.len() {
        if i > 0 && ranked[i].score != ranked[i - 1].score {
            position = i + 1;
        }
        ranked[i].position = position;
    }
    ranked
}
