// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Challenge catalog.
//!
//! Maps challenge keys to a difficulty weight and a sequential numeric id.
//! Ids are assigned from the position in the catalog file (first entry is 1),
//! which is the same numbering the instances use when decoding continue codes.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

/// A challenge as listed in the catalog file.
///
/// Only `key` is required; other fields of the instance's challenge
/// definitions are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogChallenge {
    /// Stable challenge key.
    pub key: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Difficulty weight (1-6 in practice).
    #[serde(default)]
    pub difficulty: u32,
}

/// Catalog lookup result for one challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Sequential id used in continue codes.
    pub id: u32,
    /// Stable challenge key.
    pub key: String,
    /// Display name.
    pub name: String,
    /// Difficulty weight.
    pub difficulty: u32,
}

/// Read-only challenge catalog, built once at startup and shared.
#[derive(Debug, Clone, Default)]
pub struct ChallengeCatalog {
    entries: HashMap<String, CatalogEntry>,
}

impl ChallengeCatalog {
    /// Load the catalog from a JSON file containing an array of challenges.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| Error::CatalogIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse the catalog from a JSON array of challenges.
    pub fn from_json(raw: &str) -> Result<Self> {
        let challenges: Vec<CatalogChallenge> = serde_json::from_str(raw)?;
        Self::from_challenges(challenges)
    }

    /// Build the catalog, assigning ids in list order starting at 1.
    pub fn from_challenges(challenges: Vec<CatalogChallenge>) -> Result<Self> {
        let mut entries = HashMap::with_capacity(challenges.len());
        for (index, challenge) in challenges.into_iter().enumerate() {
            if entries.contains_key(&challenge.key) {
                return Err(Error::DuplicateChallenge(challenge.key));
            }
            let entry = CatalogEntry {
                id: index as u32 + 1,
                key: challenge.key.clone(),
                name: challenge.name,
                difficulty: challenge.difficulty,
            };
            entries.insert(challenge.key, entry);
        }
        Ok(Self { entries })
    }

    /// Look up a challenge by key.
    pub fn get(&self, key: &str) -> Option<&CatalogEntry> {
        self.entries.get(key)
    }

    /// Numeric id of a challenge, if known.
    pub fn id_of(&self, key: &str) -> Option<u32> {
        self.entries.get(key).map(|entry| entry.id)
    }

    /// Number of challenges in the catalog.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const CATALOG: &str = r#"[
        {"key": "scoreBoardChallenge", "name": "Score Board", "difficulty": 1, "category": "Misc"},
        {"key": "loginAdminChallenge", "name": "Login Admin", "difficulty": 2},
        {"key": "X10", "difficulty": 3}
    ]"#;

    #[test]
    fn test_ids_follow_file_order() {
        let catalog = ChallengeCatalog::from_json(CATALOG).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.id_of("scoreBoardChallenge"), Some(1));
        assert_eq!(catalog.id_of("loginAdminChallenge"), Some(2));
        assert_eq!(catalog.id_of("X10"), Some(3));
        assert_eq!(catalog.id_of("unknown"), None);
    }

    #[test]
    fn test_entry_fields() {
        let catalog = ChallengeCatalog::from_json(CATALOG).unwrap();
        let entry = catalog.get("loginAdminChallenge").unwrap();

        assert_eq!(entry.name, "Login Admin");
        assert_eq!(entry.difficulty, 2);
        assert_eq!(catalog.get("X10").unwrap().name, "");
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let result = ChallengeCatalog::from_json(r#"[{"key":"a"},{"key":"a"}]"#);
        assert!(matches!(result, Err(Error::DuplicateChallenge(key)) if key == "a"));
    }

    #[test]
    fn test_invalid_json_rejected() {
        let result = ChallengeCatalog::from_json("{not json");
        assert!(matches!(result, Err(Error::CatalogParse(_))));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let catalog = ChallengeCatalog::from_path(file.path()).unwrap();
        assert_eq!(catalog.len(), 3);
    }

    #[test]
    fn test_from_missing_path() {
        let result = ChallengeCatalog::from_path("/nonexistent/challenges.json");
        assert!(matches!(result, Err(Error::CatalogIo { .. })));
    }
}
