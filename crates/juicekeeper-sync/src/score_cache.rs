// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Score cache and long-poll reads.
//!
//! The cache holds one immutable [`ScoreSnapshot`] behind a mutex. Every change
//! builds a new snapshot (scores, ranked board and update time together) and
//! swaps it in, so readers clone an `Arc` and never see a half-applied update.
//! A watch channel carries the latest update time to long-polling readers.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use juicekeeper_core::{ChallengeCatalog, ManagedInstance, TeamScore, calculate_score, rank_teams};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// A consistent view of the board.
#[derive(Debug, Clone)]
pub struct ScoreSnapshot {
    ranked: Vec<TeamScore>,
    index: HashMap<String, usize>,
    last_update: DateTime<Utc>,
}

impl ScoreSnapshot {
    fn new(teams: impl IntoIterator<Item = TeamScore>, last_update: DateTime<Utc>) -> Self {
        let ranked = rank_teams(teams);
        let index = ranked
            .iter()
            .enumerate()
            .map(|(i, team)| (team.name.clone(), i))
            .collect();
        Self {
            ranked,
            index,
            last_update,
        }
    }

    /// Teams in board order with positions assigned.
    pub fn ranked(&self) -> &[TeamScore] {
        &self.ranked
    }

    /// A team's entry.
    pub fn team(&self, name: &str) -> Option<&TeamScore> {
        self.index.get(name).map(|&i| &self.ranked[i])
    }

    /// When the board last changed.
    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    /// Number of teams on the board.
    pub fn len(&self) -> usize {
        self.ranked.len()
    }

    /// Whether the board is empty.
    pub fn is_empty(&self) -> bool {
        self.ranked.is_empty()
    }
}

/// Live, rankable scores of every team.
pub struct ScoreCache {
    catalog: Arc<ChallengeCatalog>,
    snapshot: Mutex<Arc<ScoreSnapshot>>,
    updates: watch::Sender<DateTime<Utc>>,
}

impl ScoreCache {
    /// Create an empty cache.
    pub fn new(catalog: Arc<ChallengeCatalog>) -> Self {
        let now = Utc::now();
        let (updates, _) = watch::channel(now);
        Self {
            catalog,
            snapshot: Mutex::new(Arc::new(ScoreSnapshot::new(Vec::new(), now))),
            updates,
        }
    }

    /// Current board.
    pub fn snapshot(&self) -> Arc<ScoreSnapshot> {
        self.lock().clone()
    }

    /// A team's current entry.
    pub fn team_score(&self, team: &str) -> Option<TeamScore> {
        self.snapshot().team(team).cloned()
    }

    /// Replace the board with scores computed from `instances`.
    pub fn load<'a>(&self, instances: impl IntoIterator<Item = &'a ManagedInstance>) {
        let mut teams: Vec<TeamScore> = instances
            .into_iter()
            .map(|instance| calculate_score(instance, &self.catalog))
            .collect();
        let count = teams.len();

        let mut current = self.lock();
        let now = next_update_time(&current);
        for team in &mut teams {
            team.last_update = now;
        }
        self.publish(&mut current, teams, now);
        debug!(teams = count, "Score board loaded");
    }

    /// Recompute a team's score from its instance.
    ///
    /// Returns `false`, leaving the board untouched, when nothing but the
    /// update time would change.
    pub fn apply(&self, instance: &ManagedInstance) -> bool {
        let mut score = calculate_score(instance, &self.catalog);

        let mut current = self.lock();
        if let Some(existing) = current.team(&score.name) {
            // Positions are only known after ranking; compare against the cached one.
            score.position = existing.position;
            if existing.equals_ignoring_last_update(&score) {
                return false;
            }
        }

        let now = next_update_time(&current);
        score.last_update = now;
        let name = score.name.clone();
        let teams = current
            .ranked
            .iter()
            .filter(|team| team.name != name)
            .cloned()
            .chain(std::iter::once(score))
            .collect::<Vec<_>>();
        self.publish(&mut current, teams, now);
        true
    }

    /// Drop a team from the board. Returns whether it was present.
    pub fn remove(&self, team: &str) -> bool {
        let mut current = self.lock();
        if current.team(team).is_none() {
            return false;
        }

        let teams = current
            .ranked
            .iter()
            .filter(|entry| entry.name != team)
            .cloned()
            .collect::<Vec<_>>();
        let now = next_update_time(&current);
        self.publish(&mut current, teams, now);
        true
    }

    /// Drop every team not in `present`, in one update. Returns the dropped
    /// team names.
    pub fn retain_teams(&self, present: &HashSet<&str>) -> Vec<String> {
        let mut current = self.lock();
        let (kept, dropped): (Vec<TeamScore>, Vec<TeamScore>) = current
            .ranked
            .iter()
            .cloned()
            .partition(|entry| present.contains(entry.name.as_str()));
        if dropped.is_empty() {
            return Vec::new();
        }

        let now = next_update_time(&current);
        self.publish(&mut current, kept, now);
        dropped.into_iter().map(|entry| entry.name).collect()
    }

    /// Wait for a board newer than `after`.
    ///
    /// Returns immediately if the board already changed after `after`. Returns
    /// `None` once `timeout` elapses or `cancel` fires without a newer board.
    pub async fn wait_for_board_update(
        &self,
        after: DateTime<Utc>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Option<Arc<ScoreSnapshot>> {
        self.wait_until(timeout, cancel, |snapshot| {
            (snapshot.last_update > after).then(|| Arc::clone(snapshot))
        })
        .await
    }

    /// Wait for a team entry updated after `after`.
    ///
    /// Same timing rules as [`wait_for_board_update`](Self::wait_for_board_update);
    /// a team that does not exist yet is waited for.
    pub async fn wait_for_team_update(
        &self,
        team: &str,
        after: DateTime<Utc>,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Option<TeamScore> {
        self.wait_until(timeout, cancel, |snapshot| {
            snapshot
                .team(team)
                .filter(|score| score.last_update > after)
                .cloned()
        })
        .await
    }

    async fn wait_until<T>(
        &self,
        timeout: Duration,
        cancel: &CancellationToken,
        check: impl Fn(&Arc<ScoreSnapshot>) -> Option<T>,
    ) -> Option<T> {
        // Subscribe first so an update landing between the check and the wait is seen.
        let mut updates = self.updates.subscribe();
        if let Some(found) = check(&self.snapshot()) {
            return Some(found);
        }

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                _ = cancel.cancelled() => return None,
                _ = &mut deadline => return None,
                changed = updates.changed() => {
                    if changed.is_err() {
                        return None;
                    }
                    if let Some(found) = check(&self.snapshot()) {
                        return Some(found);
                    }
                }
            }
        }
    }

    fn publish(&self, current: &mut Arc<ScoreSnapshot>, teams: Vec<TeamScore>, at: DateTime<Utc>) {
        *current = Arc::new(ScoreSnapshot::new(teams, at));
        self.updates.send_replace(at);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Arc<ScoreSnapshot>> {
        self.snapshot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Update times are strictly increasing so watermarks always move forward.
fn next_update_time(current: &ScoreSnapshot) -> DateTime<Utc> {
    Utc::now().max(current.last_update + chrono::Duration::microseconds(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use juicekeeper_core::instance::{CHALLENGES_ANNOTATION, FIND_IT_CODE_ANNOTATION};

    fn catalog() -> Arc<ChallengeCatalog> {
        Arc::new(
            ChallengeCatalog::from_json(r#"[{"key":"a","difficulty":1},{"key":"b","difficulty":2}]"#)
                .unwrap(),
        )
    }

    fn instance(team: &str, solved: &[&str]) -> ManagedInstance {
        let challenges: Vec<String> = solved
            .iter()
            .map(|key| format!(r#"{{"key":"{key}","solvedAt":"2024-05-01T10:00:00Z"}}"#))
            .collect();
        let mut instance = ManagedInstance::new(team);
        instance.ready_replicas = 1;
        instance.annotations.insert(
            CHALLENGES_ANNOTATION.to_string(),
            format!("[{}]", challenges.join(",")),
        );
        instance
    }

    #[test]
    fn test_apply_ranks_board() {
        let cache = ScoreCache::new(catalog());
        assert!(cache.apply(&instance("red", &["a"])));
        assert!(cache.apply(&instance("blue", &["a", "b"])));

        let snapshot = cache.snapshot();
        let board: Vec<_> = snapshot
            .ranked()
            .iter()
            .map(|t| (t.name.as_str(), t.score, t.position))
            .collect();
        assert_eq!(board, vec![("blue", 30, 1), ("red", 10, 2)]);
        assert_eq!(snapshot.team("red").unwrap().position, 2);
    }

    #[test]
    fn test_unchanged_score_is_not_republished() {
        let cache = ScoreCache::new(catalog());
        cache.apply(&instance("red", &["a"]));
        cache.apply(&instance("blue", &["b"]));
        let before = cache.snapshot().last_update();

        assert!(!cache.apply(&instance("red", &["a"])));
        assert_eq!(cache.snapshot().last_update(), before);
    }

    #[test]
    fn test_changes_are_republished() {
        let cache = ScoreCache::new(catalog());
        cache.apply(&instance("red", &["a"]));
        let before = cache.snapshot().last_update();

        let mut with_bonus = instance("red", &["a"]);
        with_bonus
            .annotations
            .insert(FIND_IT_CODE_ANNOTATION.to_string(), "code".to_string());
        assert!(cache.apply(&with_bonus));
        assert_eq!(cache.team_score("red").unwrap().score, 60);

        let mut not_ready = with_bonus.clone();
        not_ready.ready_replicas = 0;
        assert!(cache.apply(&not_ready));
        assert!(cache.snapshot().last_update() > before);
    }

    #[test]
    fn test_remove() {
        let cache = ScoreCache::new(catalog());
        cache.apply(&instance("red", &["a"]));
        cache.apply(&instance("blue", &["b"]));

        assert!(cache.remove("blue"));
        assert!(!cache.remove("blue"));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.ranked()[0].position, 1);
    }

    #[test]
    fn test_apply_replaces_existing_team() {
        let cache = ScoreCache::new(catalog());
        cache.apply(&instance("red", &["a"]));
        cache.apply(&instance("blue", &["a"]));

        assert!(cache.apply(&instance("red", &["a", "b"])));

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.team("red").unwrap().score, 30);
        assert_eq!(snapshot.team("red").unwrap().last_update, snapshot.last_update());
    }

    #[test]
    fn test_retain_teams_drops_absent_teams() {
        let cache = ScoreCache::new(catalog());
        cache.apply(&instance("red", &["a"]));
        cache.apply(&instance("blue", &["a", "b"]));
        cache.apply(&instance("ghost", &["b"]));
        let before = cache.snapshot().last_update();

        let dropped = cache.retain_teams(&HashSet::from(["red", "blue"]));

        assert_eq!(dropped, vec!["ghost".to_string()]);
        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.team("ghost").is_none());
        assert!(snapshot.last_update() > before);

        // Nothing to drop: the board stays as it is.
        assert!(cache.retain_teams(&HashSet::from(["red", "blue"])).is_empty());
        assert_eq!(cache.snapshot().last_update(), snapshot.last_update());
    }

    #[test]
    fn test_load_replaces_board() {
        let cache = ScoreCache::new(catalog());
        cache.apply(&instance("stale", &[]));

        let instances = [instance("red", &["a"]), instance("blue", &[])];
        cache.load(&instances);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.team("stale").is_none());
    }

    #[tokio::test]
    async fn test_old_watermark_returns_immediately() {
        let cache = ScoreCache::new(catalog());
        let watermark = cache.snapshot().last_update() - chrono::Duration::seconds(1);

        let board = cache
            .wait_for_board_update(watermark, Duration::from_secs(25), &CancellationToken::new())
            .await;
        assert!(board.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_without_update() {
        let cache = ScoreCache::new(catalog());
        let watermark = cache.snapshot().last_update();

        let started = tokio::time::Instant::now();
        let board = cache
            .wait_for_board_update(watermark, Duration::from_secs(25), &CancellationToken::new())
            .await;

        assert!(board.is_none());
        assert!(started.elapsed() >= Duration::from_secs(25));
        assert!(started.elapsed() < Duration::from_secs(26));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_wakes_on_update() {
        let cache = Arc::new(ScoreCache::new(catalog()));
        let watermark = cache.snapshot().last_update();

        let writer = cache.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            writer.apply(&instance("red", &["b"]));
        });

        let started = tokio::time::Instant::now();
        let board = cache
            .wait_for_board_update(watermark, Duration::from_secs(25), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(board.ranked()[0].name, "red");
        assert!(started.elapsed() < Duration::from_secs(25));
    }

    #[tokio::test(start_paused = true)]
    async fn test_team_wait_ignores_other_teams() {
        let cache = Arc::new(ScoreCache::new(catalog()));
        cache.apply(&instance("red", &["a"]));
        let watermark = cache.team_score("red").unwrap().last_update;

        let writer = cache.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            writer.apply(&instance("blue", &["a"]));
            tokio::time::sleep(Duration::from_secs(1)).await;
            writer.apply(&instance("red", &["a", "b"]));
        });

        let started = tokio::time::Instant::now();
        let red = cache
            .wait_for_team_update("red", watermark, Duration::from_secs(25), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(red.score, 30);
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_cancel_returns_promptly() {
        let cache = ScoreCache::new(catalog());
        let watermark = cache.snapshot().last_update();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let board = tokio::time::timeout(
            Duration::from_secs(1),
            cache.wait_for_board_update(watermark, Duration::from_secs(25), &cancel),
        )
        .await
        .unwrap();
        assert!(board.is_none());
    }
}
