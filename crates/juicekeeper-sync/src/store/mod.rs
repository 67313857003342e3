// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance store abstraction.
//!
//! The store is where managed instances are enumerated and watched, and where
//! progress is persisted as annotations. The engine never talks to the cluster
//! directly; it goes through [`InstanceStore`] so tests and local runs can use
//! [`MemoryInstanceStore`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use juicekeeper_core::{ManagedInstance, ProgressState};

use crate::error::Result;

pub mod kube;
pub mod memory;

pub use kube::{KubeConfig, KubeInstanceStore};
pub use memory::MemoryInstanceStore;

/// A change to a managed instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceEvent {
    /// The instance was added or modified.
    Applied(ManagedInstance),
    /// The instance was deleted.
    Deleted(ManagedInstance),
}

/// Stream of instance events. Ends when the watch is closed.
pub type InstanceEventStream = BoxStream<'static, Result<InstanceEvent>>;

/// Access to managed instances and their persisted progress.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// List every managed instance.
    async fn list(&self) -> Result<Vec<ManagedInstance>>;

    /// Get a team's instance.
    ///
    /// Returns [`crate::Error::InstanceNotFound`] when the team has none.
    async fn get(&self, team: &str) -> Result<ManagedInstance>;

    /// Open a watch over managed instances.
    ///
    /// A fresh watch first reports every existing instance as
    /// [`InstanceEvent::Applied`], then live changes.
    async fn watch(&self) -> Result<InstanceEventStream>;

    /// Persist a team's progress as annotations on its instance.
    async fn patch_annotations(&self, team: &str, progress: &ProgressState) -> Result<()>;
}
