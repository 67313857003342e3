// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for juicekeeper-core.

use std::path::PathBuf;

use thiserror::Error;

/// Core errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The catalog file could not be read.
    #[error("Failed to read challenge catalog {}: {source}", path.display())]
    CatalogIo {
        /// Path that was read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The catalog file is not a JSON array of challenges.
    #[error("Failed to parse challenge catalog: {0}")]
    CatalogParse(#[from] serde_json::Error),

    /// The catalog lists the same key twice.
    #[error("Duplicate challenge key in catalog: {0}")]
    DuplicateChallenge(String),

    /// Continue code encoding failed.
    #[error("Continue code error: {0}")]
    ContinueCode(#[from] crate::continue_code::CodecError),
}

/// Result type using core Error.
pub type Result<T> = std::result::Result<T, Error>;
