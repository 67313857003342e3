// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for juicekeeper-sync.

use thiserror::Error;

/// Sync engine errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Catalog or other domain error.
    #[error("Core error: {0}")]
    Core(#[from] juicekeeper_core::Error),

    /// Continue code could not be encoded.
    #[error("Continue code error: {0}")]
    ContinueCode(#[from] juicekeeper_core::continue_code::CodecError),

    /// HTTP transport failed (cluster API or instance).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No managed instance exists for the team.
    #[error("Instance not found for team: {0}")]
    InstanceNotFound(String),

    /// The cluster API rejected a request.
    #[error("Cluster API returned {status}: {message}")]
    ClusterApi {
        /// HTTP status code.
        status: u16,
        /// Response body or reason.
        message: String,
    },

    /// An instance answered with an unexpected status code.
    #[error("Instance for team '{team}' returned unexpected status {status}")]
    InstanceStatus {
        /// Team owning the instance.
        team: String,
        /// HTTP status code.
        status: u16,
    },

    /// An instance still lacks persisted progress after its codes were applied.
    #[error("Restore incomplete for team '{team}', still missing: {}", missing.join(", "))]
    RestoreIncomplete {
        /// Team owning the instance.
        team: String,
        /// Challenge keys and bonus codes the instance does not report.
        missing: Vec<String>,
    },

    /// The cluster API stopped answering on an open watch.
    #[error("Watch idle for {0:?}")]
    WatchIdle(std::time::Duration),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type using sync Error.
pub type Result<T> = std::result::Result<T, Error>;
