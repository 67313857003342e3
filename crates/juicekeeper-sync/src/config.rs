// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration for juicekeeper-sync.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Placeholder substituted with the team name in [`Config::instance_url_template`].
pub const TEAM_PLACEHOLDER: &str = "{team}";

/// Where managed instances are read from and progress is persisted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// The cluster API, using the in-cluster service account.
    Kubernetes,
    /// An in-process store, for local runs without a cluster.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "kubernetes" | "kube" => Ok(StoreBackend::Kubernetes),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

/// Sync engine configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Namespace holding the managed instances
    pub namespace: String,
    /// Challenge catalog file
    pub challenges_path: PathBuf,
    /// HTTP listen address for webhooks and board reads
    pub http_addr: SocketAddr,
    /// Instance store backend
    pub store: StoreBackend,
    /// Number of reconciliation workers
    pub worker_count: usize,
    /// Period between reconciliation scans
    pub sync_interval: Duration,
    /// Instance base URL with a `{team}` placeholder
    pub instance_url_template: String,
    /// Timeout for requests to instances
    pub instance_timeout: Duration,
    /// Ceiling for long-poll reads
    pub long_poll_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            challenges_path: PathBuf::from("/challenges.json"),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            store: StoreBackend::Kubernetes,
            worker_count: 10,
            sync_interval: Duration::from_secs(60),
            instance_url_template: "http://juiceshop-{team}:3000".to_string(),
            instance_timeout: Duration::from_secs(5),
            long_poll_timeout: Duration::from_secs(25),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let namespace = std::env::var("NAMESPACE").unwrap_or(defaults.namespace);

        let challenges_path = std::env::var("JUICEKEEPER_CHALLENGES_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.challenges_path);

        let port: u16 = parse_var("JUICEKEEPER_PORT")?.unwrap_or(defaults.http_addr.port());
        let http_addr = SocketAddr::from(([0, 0, 0, 0], port));

        let store = parse_var("JUICEKEEPER_STORE")?.unwrap_or(defaults.store);

        let worker_count: usize = parse_var("JUICEKEEPER_WORKERS")?.unwrap_or(defaults.worker_count);
        if worker_count == 0 {
            return Err(ConfigError::Invalid {
                var: "JUICEKEEPER_WORKERS",
                value: "0".to_string(),
            });
        }

        let sync_interval = parse_var("JUICEKEEPER_SYNC_INTERVAL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.sync_interval);

        let instance_url_template = std::env::var("JUICEKEEPER_INSTANCE_URL")
            .unwrap_or(defaults.instance_url_template);
        if !instance_url_template.contains(TEAM_PLACEHOLDER) {
            return Err(ConfigError::Invalid {
                var: "JUICEKEEPER_INSTANCE_URL",
                value: instance_url_template,
            });
        }

        let instance_timeout = parse_var("JUICEKEEPER_INSTANCE_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.instance_timeout);

        let long_poll_timeout = parse_var("JUICEKEEPER_LONG_POLL_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.long_poll_timeout);

        Ok(Self {
            namespace,
            challenges_path,
            http_addr,
            store,
            worker_count,
            sync_interval,
            instance_url_template,
            instance_timeout,
            long_poll_timeout,
        })
    }
}

fn parse_var<T: FromStr>(var: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(&'static str),
    /// An environment variable has an unusable value.
    #[error("Invalid value for {var}: {value:?}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Rejected value.
        value: String,
    },
}
