// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Juicekeeper Core - Scoring and Progress Primitives
//!
//! Pure domain logic shared by the synchronisation engine. Nothing in this
//! crate performs network I/O; the only file access is loading the challenge
//! catalog at startup.
//!
//! # Components
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`catalog`] | Challenge key to numeric id and difficulty weight |
//! | [`continue_code`] | Salted hashids encoder for solved-challenge id lists |
//! | [`progress`] | Solved challenges, bonus codes and progress categories |
//! | [`instance`] | Managed instance resources and their annotations |
//! | [`scoring`] | Team score calculation from instance annotations |
//! | [`ranking`] | Board ordering and competition-ranking positions |
//! | [`comparator`] | Live vs. persisted progress decision |
//!
//! # Scoring
//!
//! A team scores `difficulty × 10` for every solved challenge found in the
//! catalog, plus 50 points for each bonus category (find it, fix it) that has a
//! continue code persisted on the instance.
//!
//! ```
//! use juicekeeper_core::catalog::ChallengeCatalog;
//! use juicekeeper_core::instance::{CHALLENGES_ANNOTATION, ManagedInstance};
//! use juicekeeper_core::scoring::calculate_score;
//!
//! let catalog = ChallengeCatalog::from_json(r#"[{"key": "X10", "difficulty": 3}]"#).unwrap();
//! let mut instance = ManagedInstance::new("red");
//! instance.annotations.insert(
//!     CHALLENGES_ANNOTATION.to_string(),
//!     r#"[{"key": "X10", "solvedAt": "2024-05-01T10:00:00Z"}]"#.to_string(),
//! );
//!
//! assert_eq!(calculate_score(&instance, &catalog).score, 30);
//! ```

#![deny(missing_docs)]

/// Challenge catalog.
pub mod catalog;

/// Comparator deciding how to reconcile progress.
pub mod comparator;

/// Continue-code encoding.
pub mod continue_code;

/// Error types.
pub mod error;

/// Managed instances and annotation keys.
pub mod instance;

/// Progress model.
pub mod progress;

/// Ranking engine.
pub mod ranking;

/// Score calculation.
pub mod scoring;

pub use catalog::ChallengeCatalog;
pub use comparator::{ProgressAction, compare_progress};
pub use continue_code::ContinueCodeEncoder;
pub use error::{Error, Result};
pub use instance::ManagedInstance;
pub use progress::{ChallengeProgress, ProgressCategory, ProgressState};
pub use ranking::rank_teams;
pub use scoring::{TeamScore, calculate_score};
