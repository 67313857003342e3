// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Tests for the score watcher feeding the score cache.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{catalog, eventually, ready_instance, solved};
use juicekeeper_core::ProgressState;
use juicekeeper_sync::score_cache::ScoreCache;
use juicekeeper_sync::score_watcher::{ScoreWatcher, ScoreWatcherConfig};
use juicekeeper_sync::store::MemoryInstanceStore;
use tokio_util::sync::CancellationToken;

struct Fixture {
    store: Arc<MemoryInstanceStore>,
    cache: Arc<ScoreCache>,
    cancel: CancellationToken,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryInstanceStore::new()),
            cache: Arc::new(ScoreCache::new(catalog())),
            cancel: CancellationToken::new(),
        }
    }

    fn watcher(&self) -> ScoreWatcher {
        ScoreWatcher::new(
            self.store.clone(),
            self.cache.clone(),
            ScoreWatcherConfig::default(),
            self.cancel.clone(),
        )
    }

    fn score(&self, team: &str) -> Option<u32> {
        self.cache.team_score(team).map(|entry| entry.score)
    }
}

fn progress(keys: &[&str]) -> ProgressState {
    ProgressState::new(solved(keys), None, None)
}

#[tokio::test]
async fn test_load_board_ranks_existing_instances() {
    let fx = Fixture::new();
    fx.store.insert(ready_instance("red", &progress(&["a"])));
    fx.store.insert(ready_instance("blue", &progress(&["c"])));

    fx.watcher().load_board().await.unwrap();

    let board = fx.cache.snapshot();
    let ranked: Vec<_> = board
        .ranked()
        .iter()
        .map(|entry| (entry.name.as_str(), entry.score, entry.position))
        .collect();
    assert_eq!(ranked, vec![("blue", 30, 1), ("red", 10, 2)]);
}

#[tokio::test]
async fn test_closed_watch_is_reopened() {
    let fx = Fixture::new();
    let handle = tokio::spawn(fx.watcher().run());

    assert!(eventually(|| fx.store.watches_opened() == 1).await);
    fx.store.insert(ready_instance("red", &progress(&["a"])));
    assert!(eventually(|| fx.score("red") == Some(10)).await);

    fx.store.close_watches();
    assert!(eventually(|| fx.store.watches_opened() == 2).await);

    // Changes after the restart still reach the board.
    fx.store.insert(ready_instance("red", &progress(&["a", "b"])));
    fx.store.insert(ready_instance("blue", &progress(&["c"])));
    assert!(eventually(|| fx.score("red") == Some(30) && fx.score("blue") == Some(30)).await);

    fx.cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_deleted_instance_leaves_the_board() {
    let fx = Fixture::new();
    fx.store.insert(ready_instance("red", &progress(&["a"])));
    fx.store.insert(ready_instance("blue", &progress(&["b"])));
    let watcher = fx.watcher();
    watcher.load_board().await.unwrap();
    let handle = tokio::spawn(watcher.run());

    assert!(eventually(|| fx.store.watches_opened() == 1).await);
    fx.store.remove("red");

    assert!(eventually(|| fx.score("red").is_none()).await);
    let blue = fx.cache.team_score("blue").unwrap();
    assert_eq!(blue.position, 1);

    fx.cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_reopened_watch_drops_teams_deleted_meanwhile() {
    let fx = Fixture::new();
    fx.store.insert(ready_instance("red", &progress(&["a"])));
    let watcher = fx.watcher();
    watcher.load_board().await.unwrap();
    // Deleted while no watch was open: the board still shows it.
    fx.cache.apply(&ready_instance("gone", &progress(&["c"])));
    assert_eq!(fx.score("gone"), Some(30));
    let handle = tokio::spawn(watcher.run());

    assert!(eventually(|| fx.score("gone").is_none()).await);
    assert_eq!(fx.score("red"), Some(10));
    assert_eq!(fx.cache.team_score("red").unwrap().position, 1);

    fx.cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_long_poll_wakes_on_watched_change() {
    let fx = Fixture::new();
    fx.store.insert(ready_instance("red", &progress(&["a"])));
    let watcher = fx.watcher();
    watcher.load_board().await.unwrap();
    let handle = tokio::spawn(watcher.run());
    assert!(eventually(|| fx.store.watches_opened() == 1).await);

    let after = fx.cache.snapshot().last_update();
    let cache = fx.cache.clone();
    let cancel = fx.cancel.clone();
    let waiter = tokio::spawn(async move {
        cache
            .wait_for_team_update("red", after, Duration::from_secs(5), &cancel)
            .await
    });

    fx.store.insert(ready_instance("red", &progress(&["a", "c"])));

    let updated = waiter.await.unwrap().expect("update before the timeout");
    assert_eq!(updated.score, 40);
    assert!(updated.last_update > after);

    fx.cancel.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_unchanged_instance_does_not_move_the_board() {
    let fx = Fixture::new();
    fx.store.insert(ready_instance("red", &progress(&["a"])));
    let watcher = fx.watcher();
    watcher.load_board().await.unwrap();
    let before = fx.cache.snapshot().last_update();
    let handle = tokio::spawn(watcher.run());

    // The fresh watch replays red unchanged; a later real change follows it.
    assert!(eventually(|| fx.store.watches_opened() == 1).await);
    fx.store.insert(ready_instance("blue", &progress(&["b"])));
    assert!(eventually(|| fx.score("blue") == Some(20)).await);

    let red = fx.cache.team_score("red").unwrap();
    assert!(red.last_update <= before);

    fx.cancel.cancel();
    handle.await.unwrap();
}
