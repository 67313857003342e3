// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Common test infrastructure for juicekeeper-sync integration tests.
//!
//! Provides a scripted [`FakeInstanceApi`], a small catalog and helpers for
//! building managed instances.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use juicekeeper_core::catalog::CatalogChallenge;
use juicekeeper_core::instance::progress_annotations;
use juicekeeper_core::progress::sort_by_solved_at;
use juicekeeper_core::{
    ChallengeCatalog, ChallengeProgress, ManagedInstance, ProgressCategory, ProgressState,
};

use juicekeeper_sync::error::{Error, Result};
use juicekeeper_sync::instance_api::InstanceApi;

/// Timestamp on a fixed day, `minute` minutes after 10:00.
pub fn at(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
}

/// Catalog with challenges `a` (id 1), `b` (id 2) and `c` (id 3) of
/// difficulty 1, 2 and 3.
pub fn catalog() -> Arc<ChallengeCatalog> {
    let challenges = [("a", 1), ("b", 2), ("c", 3)]
        .into_iter()
        .map(|(key, difficulty)| CatalogChallenge {
            key: key.to_string(),
            name: key.to_uppercase(),
            difficulty,
        })
        .collect();
    Arc::new(ChallengeCatalog::from_challenges(challenges).unwrap())
}

/// Solved challenges, the n-th key solved at minute n.
pub fn solved(keys: &[&str]) -> Vec<ChallengeProgress> {
    keys.iter()
        .enumerate()
        .map(|(i, key)| ChallengeProgress::new(*key, at(i as u32)))
        .collect()
}

/// A ready instance with `progress` persisted on it.
pub fn ready_instance(team: &str, progress: &ProgressState) -> ManagedInstance {
    let mut instance = ManagedInstance::new(team);
    instance.ready_replicas = 1;
    instance
        .annotations
        .extend(progress_annotations(progress).unwrap());
    instance
}

/// Poll `condition` until it holds or five seconds pass.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

// ============================================================================
// Fake instance API
// ============================================================================

/// Scripted state of one team's instance.
#[derive(Debug, Clone, Default)]
pub struct FakeInstance {
    /// Challenges the instance reports as solved.
    pub challenges: Vec<ChallengeProgress>,
    /// Continue codes the instance reports, per category.
    pub codes: HashMap<ProgressCategory, String>,
    /// Challenges restored when a main continue code is applied.
    pub restorable: Vec<ChallengeProgress>,
    /// Continue codes applied so far, in order.
    pub applied: Vec<(ProgressCategory, String)>,
    /// Whether every call fails.
    pub unreachable: bool,
    /// Whether applying a continue code fails while reads still succeed.
    pub apply_fails: bool,
    /// Whether reading a bonus continue code fails with a server error.
    pub bonus_code_fails: bool,
}

/// In-process stand-in for the instances' HTTP API.
#[derive(Default)]
pub struct FakeInstanceApi {
    instances: Mutex<HashMap<String, FakeInstance>>,
}

impl FakeInstanceApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Replace a team's instance.
    pub fn set(&self, team: &str, instance: FakeInstance) {
        self.instances
            .lock()
            .unwrap()
            .insert(team.to_string(), instance);
    }

    /// Current state of a team's instance.
    pub fn get(&self, team: &str) -> FakeInstance {
        self.instances
            .lock()
            .unwrap()
            .get(team)
            .cloned()
            .unwrap_or_default()
    }

    fn with<T>(&self, team: &str, f: impl FnOnce(&mut FakeInstance) -> T) -> Result<T> {
        let mut instances = self.instances.lock().unwrap();
        let instance = instances.entry(team.to_string()).or_default();
        if instance.unreachable {
            return Err(Error::InstanceStatus {
                team: team.to_string(),
                status: 503,
            });
        }
        Ok(f(instance))
    }
}

#[async_trait]
impl InstanceApi for FakeInstanceApi {
    async fn challenge_progress(&self, team: &str) -> Result<Vec<ChallengeProgress>> {
        self.with(team, |instance| {
            let mut challenges = instance.challenges.clone();
            sort_by_solved_at(&mut challenges);
            challenges
        })
    }

    async fn continue_code(&self, team: &str, category: ProgressCategory) -> Result<String> {
        self.with(team, |instance| {
            if instance.bonus_code_fails && category != ProgressCategory::Main {
                return Err(Error::InstanceStatus {
                    team: team.to_string(),
                    status: 500,
                });
            }
            Ok(instance.codes.get(&category).cloned().unwrap_or_default())
        })?
    }

    async fn apply_continue_code(
        &self,
        team: &str,
        category: ProgressCategory,
        code: &str,
    ) -> Result<()> {
        self.with(team, |instance| {
            if instance.apply_fails {
                return Err(Error::InstanceStatus {
                    team: team.to_string(),
                    status: 503,
                });
            }
            instance.applied.push((category, code.to_string()));
            match category {
                ProgressCategory::Main => {
                    for challenge in instance.restorable.clone() {
                        if !instance.challenges.iter().any(|c| c.key == challenge.key) {
                            instance.challenges.push(challenge);
                        }
                    }
                }
                bonus => {
                    instance.codes.insert(bonus, code.to_string());
                }
            }
            Ok(())
        })?
    }
}
