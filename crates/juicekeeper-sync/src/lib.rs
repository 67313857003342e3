// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Juicekeeper Sync - Score Board and Progress Reconciliation
//!
//! Keeps team scores live and makes sure no team loses progress when its
//! Juice Shop instance restarts.
//!
//! # Architecture
//!
//! ```text
//!   ┌────────────────────┐   watch    ┌──────────────┐   long-poll  ┌──────────┐
//!   │   Instance store   │──────────▶ │ Score cache  │◀─────────────│  Board   │
//!   │ (cluster / memory) │            └──────────────┘              │  reads   │
//!   └────────────────────┘                                          └──────────┘
//!       ▲        │ list
//!       │ patch  ▼
//!       │  ┌───────────┐  jobs   ┌─────────────┐  progress / codes  ┌──────────┐
//!       │  │ Scheduler │───────▶ │ Worker pool │◀──────────────────▶│Instances │
//!       │  └───────────┘         └─────────────┘                    └──────────┘
//!       │                              │                                 │
//!       └──────────────────────────────┴────────────── webhook ──────────┘
//! ```
//!
//! # Components
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`store`] | Managed instances: list, watch, persist progress annotations |
//! | [`instance_api`] | Progress and continue-code endpoints of each instance |
//! | [`score_cache`] | Ranked board with long-poll reads |
//! | [`score_watcher`] | Feeds store changes into the cache, restarting closed watches |
//! | [`scheduler`] | Periodic producer of reconciliation jobs |
//! | [`worker_pool`] | Reconciliation workers |
//! | [`solutions`] | Real-time recording of solved challenges |
//! | [`server`] | HTTP routes |
//! | [`runtime`] | Wiring and graceful shutdown |
//!
//! # Configuration
//!
//! See [`config::Config::from_env`] for the environment variables read by the
//! binary.

#![deny(missing_docs)]

/// Environment configuration.
pub mod config;

/// Error types.
pub mod error;

/// Instance API client.
pub mod instance_api;

/// Embeddable runtime.
pub mod runtime;

/// Reconciliation scheduler.
pub mod scheduler;

/// Score cache.
pub mod score_cache;

/// Score watcher.
pub mod score_watcher;

/// HTTP server.
pub mod server;

/// Webhook solution recording.
pub mod solutions;

/// Instance stores.
pub mod store;

/// Reconciliation workers.
pub mod worker_pool;

pub use config::Config;
pub use error::{Error, Result};
pub use runtime::SyncRuntime;
