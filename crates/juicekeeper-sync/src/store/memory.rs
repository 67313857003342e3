// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process instance store.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use juicekeeper_core::instance::progress_annotations;
use juicekeeper_core::{ManagedInstance, ProgressState};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::{InstanceEvent, InstanceEventStream, InstanceStore};
use crate::error::{Error, Result};

const WATCH_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
enum WatchMessage {
    Event(InstanceEvent),
    Close,
}

/// Instance store kept in memory.
///
/// Behaves like the cluster API as far as the engine can tell: watches start
/// with the current instances, patches emit a modification event. Open watches
/// can be closed with [`close_watches`](Self::close_watches).
pub struct MemoryInstanceStore {
    instances: Mutex<HashMap<String, ManagedInstance>>,
    events: broadcast::Sender<WatchMessage>,
    watches_opened: AtomicUsize,
}

impl Default for MemoryInstanceStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInstanceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_CAPACITY);
        Self {
            instances: Mutex::new(HashMap::new()),
            events,
            watches_opened: AtomicUsize::new(0),
        }
    }

    /// Add or replace an instance.
    pub fn insert(&self, instance: ManagedInstance) {
        self.lock().insert(instance.team.clone(), instance.clone());
        self.publish(InstanceEvent::Applied(instance));
    }

    /// Remove a team's instance.
    pub fn remove(&self, team: &str) -> Option<ManagedInstance> {
        let removed = self.lock().remove(team);
        if let Some(instance) = &removed {
            self.publish(InstanceEvent::Deleted(instance.clone()));
        }
        removed
    }

    /// End every open watch stream, as a server-side timeout would.
    pub fn close_watches(&self) {
        let _ = self.events.send(WatchMessage::Close);
    }

    /// Number of watches opened so far.
    pub fn watches_opened(&self) -> usize {
        self.watches_opened.load(Ordering::SeqCst)
    }

    fn publish(&self, event: InstanceEvent) {
        // No receivers just means nobody is watching.
        let _ = self.events.send(WatchMessage::Event(event));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, ManagedInstance>> {
        self.instances
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl InstanceStore for MemoryInstanceStore {
    async fn list(&self) -> Result<Vec<ManagedInstance>> {
        let mut instances: Vec<_> = self.lock().values().cloned().collect();
        instances.sort_by(|a, b| a.team.cmp(&b.team));
        Ok(instances)
    }

    async fn get(&self, team: &str) -> Result<ManagedInstance> {
        self.lock()
            .get(team)
            .cloned()
            .ok_or_else(|| Error::InstanceNotFound(team.to_string()))
    }

    async fn watch(&self) -> Result<InstanceEventStream> {
        // Subscribe before the snapshot so no change falls in between.
        let mut receiver = self.events.subscribe();
        let existing = self.list().await?;
        self.watches_opened.fetch_add(1, Ordering::SeqCst);

        let stream = async_stream::stream! {
            for instance in existing {
                yield Ok::<_, Error>(InstanceEvent::Applied(instance));
            }
            loop {
                match receiver.recv().await {
                    Ok(WatchMessage::Event(event)) => {
                        yield Ok::<_, Error>(event);
                    }
                    Ok(WatchMessage::Close) | Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Memory watch fell behind, closing it");
                        break;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn patch_annotations(&self, team: &str, progress: &ProgressState) -> Result<()> {
        let annotations = progress_annotations(progress)?;
        let updated = {
            let mut instances = self.lock();
            let instance = instances
                .get_mut(team)
                .ok_or_else(|| Error::InstanceNotFound(team.to_string()))?;
            instance.annotations.extend(annotations);
            instance.clone()
        };
        self.publish(InstanceEvent::Applied(updated));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use juicekeeper_core::instance::{CHALLENGES_ANNOTATION, FIX_IT_CODE_ANNOTATION};

    #[tokio::test]
    async fn test_get_and_list() {
        let store = MemoryInstanceStore::new();
        store.insert(ManagedInstance::new("b"));
        store.insert(ManagedInstance::new("a"));

        let teams: Vec<_> = store
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.team)
            .collect();
        assert_eq!(teams, vec!["a", "b"]);
        assert_eq!(store.get("a").await.unwrap().name, "juiceshop-a");
        assert!(matches!(
            store.get("missing").await,
            Err(Error::InstanceNotFound(team)) if team == "missing"
        ));
    }

    #[tokio::test]
    async fn test_watch_replays_then_follows() {
        let store = MemoryInstanceStore::new();
        store.insert(ManagedInstance::new("a"));

        let mut watch = store.watch().await.unwrap();
        assert_eq!(
            watch.next().await.unwrap().unwrap(),
            InstanceEvent::Applied(ManagedInstance::new("a"))
        );

        store.remove("a");
        assert_eq!(
            watch.next().await.unwrap().unwrap(),
            InstanceEvent::Deleted(ManagedInstance::new("a"))
        );

        store.close_watches();
        assert!(watch.next().await.is_none());
        assert_eq!(store.watches_opened(), 1);
    }

    #[tokio::test]
    async fn test_patch_writes_annotations_and_emits_event() {
        let store = MemoryInstanceStore::new();
        store.insert(ManagedInstance::new("a"));
        let mut watch = store.watch().await.unwrap();
        let _ = watch.next().await;

        let progress = ProgressState::new(vec![], None, Some("fix".into()));
        store.patch_annotations("a", &progress).await.unwrap();

        let instance = store.get("a").await.unwrap();
        assert_eq!(instance.annotations[CHALLENGES_ANNOTATION], "[]");
        assert_eq!(instance.annotations[FIX_IT_CODE_ANNOTATION], "fix");
        assert_eq!(
            watch.next().await.unwrap().unwrap(),
            InstanceEvent::Applied(instance)
        );
    }

    #[tokio::test]
    async fn test_patch_unknown_team() {
        let store = MemoryInstanceStore::new();
        let result = store
            .patch_annotations("ghost", &ProgressState::default())
            .await;
        assert!(matches!(result, Err(Error::InstanceNotFound(_))));
    }
}
