// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Instance store backed by the cluster API.
//!
//! Talks to the apps/v1 deployments endpoint of the namespace directly over
//! HTTPS using the pod's service account:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | list | `GET /apis/apps/v1/namespaces/{ns}/deployments?labelSelector=...` |
//! | get | `GET .../deployments/juiceshop-{team}` |
//! | watch | `GET .../deployments?labelSelector=...&watch=true&timeoutSeconds=290` (one JSON event per line) |
//!
//! The server ends each watch after `timeoutSeconds`. A watch that goes silent
//! for longer than the idle timeout is ended from this side, so a dead
//! connection cannot stall the score board.
//! | patch | `PATCH .../deployments/juiceshop-{team}` with a JSON merge patch |

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use juicekeeper_core::instance::{
    INSTANCE_LABEL_SELECTOR, TEAM_LABEL, instance_name, progress_annotations,
};
use juicekeeper_core::{ManagedInstance, ProgressState};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{InstanceEvent, InstanceEventStream, InstanceStore};
use crate::config::ConfigError;
use crate::error::{Error, Result};

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MERGE_PATCH: &str = "application/merge-patch+json";
const WATCH_TIMEOUT_SECS: &str = "290";
const DEFAULT_WATCH_IDLE_TIMEOUT: Duration = Duration::from_secs(330);

/// Connection settings for the cluster API.
#[derive(Debug, Clone)]
pub struct KubeConfig {
    /// API server base URL, e.g. `https://10.0.0.1:443`
    pub api_server: String,
    /// Bearer token
    pub token: Option<String>,
    /// Namespace holding the managed instances
    pub namespace: String,
    /// PEM bundle of the cluster CA
    pub ca_certificate: Option<Vec<u8>>,
}

impl KubeConfig {
    /// Settings for a pod running inside the cluster.
    ///
    /// Reads `KUBERNETES_SERVICE_HOST`/`KUBERNETES_SERVICE_PORT` and the mounted
    /// service account token and CA bundle.
    pub fn in_cluster(namespace: impl Into<String>) -> Result<Self> {
        let host = std::env::var("KUBERNETES_SERVICE_HOST")
            .map_err(|_| ConfigError::MissingEnvVar("KUBERNETES_SERVICE_HOST"))?;
        let port = std::env::var("KUBERNETES_SERVICE_PORT").unwrap_or_else(|_| "443".to_string());

        let api_server = if host.contains(':') {
            format!("https://[{host}]:{port}")
        } else {
            format!("https://{host}:{port}")
        };

        let token = std::fs::read_to_string(format!("{SERVICE_ACCOUNT_DIR}/token"))?;
        let ca_certificate = std::fs::read(format!("{SERVICE_ACCOUNT_DIR}/ca.crt"))?;

        Ok(Self {
            api_server,
            token: Some(token.trim().to_string()),
            namespace: namespace.into(),
            ca_certificate: Some(ca_certificate),
        })
    }
}

/// [`InstanceStore`] over the cluster REST API.
pub struct KubeInstanceStore {
    client: reqwest::Client,
    config: KubeConfig,
    watch_idle_timeout: Duration,
}

impl KubeInstanceStore {
    /// Create a store. Fails if the CA bundle is not valid PEM.
    pub fn new(config: KubeConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(pem) = &config.ca_certificate {
            builder = builder.add_root_certificate(reqwest::Certificate::from_pem(pem)?);
        }
        Ok(Self {
            client: builder.build()?,
            config,
            watch_idle_timeout: DEFAULT_WATCH_IDLE_TIMEOUT,
        })
    }

    /// End a watch that delivers nothing for `timeout`, opening included.
    pub fn with_watch_idle_timeout(mut self, timeout: Duration) -> Self {
        self.watch_idle_timeout = timeout;
        self
    }

    fn deployments_url(&self) -> String {
        format!(
            "{}/apis/apps/v1/namespaces/{}/deployments",
            self.config.api_server.trim_end_matches('/'),
            self.config.namespace
        )
    }

    fn deployment_url(&self, team: &str) -> String {
        format!("{}/{}", self.deployments_url(), instance_name(team))
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl InstanceStore for KubeInstanceStore {
    async fn list(&self) -> Result<Vec<ManagedInstance>> {
        let response = self
            .request(Method::GET, self.deployments_url())
            .query(&[("labelSelector", INSTANCE_LABEL_SELECTOR)])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let list: DeploymentList = ensure_success(response).await?.json().await?;

        Ok(list
            .items
            .into_iter()
            .filter_map(Deployment::into_instance)
            .collect())
    }

    async fn get(&self, team: &str) -> Result<ManagedInstance> {
        let response = self
            .request(Method::GET, self.deployment_url(team))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::InstanceNotFound(team.to_string()));
        }
        let deployment: Deployment = ensure_success(response).await?.json().await?;

        deployment
            .into_instance()
            .ok_or_else(|| Error::InstanceNotFound(team.to_string()))
    }

    async fn watch(&self) -> Result<InstanceEventStream> {
        let idle = self.watch_idle_timeout;
        let request = self
            .request(Method::GET, self.deployments_url())
            .query(&[
                ("labelSelector", INSTANCE_LABEL_SELECTOR),
                ("watch", "true"),
                ("timeoutSeconds", WATCH_TIMEOUT_SECS),
            ])
            .send();
        let response = tokio::time::timeout(idle, request)
            .await
            .map_err(|_| Error::WatchIdle(idle))??;
        let mut body = ensure_success(response).await?.bytes_stream();
        debug!(namespace = %self.config.namespace, "Opened deployment watch");

        let stream = async_stream::stream! {
            let mut buffer = BytesMut::new();
            loop {
                let chunk = match tokio::time::timeout(idle, body.next()).await {
                    Ok(Some(chunk)) => chunk,
                    Ok(None) => return,
                    Err(_) => {
                        yield Err::<InstanceEvent, Error>(Error::WatchIdle(idle));
                        return;
                    }
                };
                match chunk {
                    Ok(chunk) => buffer.extend_from_slice(&chunk),
                    Err(e) => {
                        yield Err::<InstanceEvent, Error>(Error::from(e));
                        return;
                    }
                }

                while let Some(end) = buffer.iter().position(|b| *b == b'\n') {
                    let line = buffer.split_to(end + 1);
                    match parse_watch_line(&line[..end]) {
                        Ok(Some(event)) => {
                            yield Ok(event);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn patch_annotations(&self, team: &str, progress: &ProgressState) -> Result<()> {
        let patch = serde_json::json!({
            "metadata": { "annotations": progress_annotations(progress)? }
        });

        let response = self
            .request(Method::PATCH, self.deployment_url(team))
            .header(CONTENT_TYPE, MERGE_PATCH)
            .body(serde_json::to_vec(&patch)?)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::InstanceNotFound(team.to_string()));
        }
        ensure_success(response).await?;
        Ok(())
    }
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(Error::ClusterApi {
        status: status.as_u16(),
        message,
    })
}

/// Parse one line of a watch response. Bookmarks and unknown types yield `None`.
fn parse_watch_line(line: &[u8]) -> Result<Option<InstanceEvent>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let event: WatchEvent = serde_json::from_slice(line)?;
    match event.kind.as_str() {
        "ADDED" | "MODIFIED" => {
            let deployment: Deployment = serde_json::from_value(event.object)?;
            Ok(deployment.into_instance().map(InstanceEvent::Applied))
        }
        "DELETED" => {
            let deployment: Deployment = serde_json::from_value(event.object)?;
            Ok(deployment.into_instance().map(InstanceEvent::Deleted))
        }
        "ERROR" => {
            let status: ApiStatus = serde_json::from_value(event.object)?;
            Err(Error::ClusterApi {
                status: status.code,
                message: status.message,
            })
        }
        other => {
            debug!(kind = other, "Ignoring watch event");
            Ok(None)
        }
    }
}

#[derive(Debug, Deserialize)]
struct WatchEvent {
    #[serde(rename = "type")]
    kind: String,
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentList {
    #[serde(default)]
    items: Vec<Deployment>,
}

#[derive(Debug, Deserialize)]
struct Deployment {
    metadata: ObjectMeta,
    #[serde(default)]
    status: DeploymentStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMeta {
    name: String,
    #[serde(default)]
    labels: BTreeMap<String, String>,
    #[serde(default)]
    annotations: BTreeMap<String, String>,
    creation_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentStatus {
    #[serde(default)]
    ready_replicas: i32,
}

impl Deployment {
    fn into_instance(self) -> Option<ManagedInstance> {
        let ObjectMeta {
            name,
            mut labels,
            annotations,
            creation_timestamp,
        } = self.metadata;

        let Some(team) = labels.remove(TEAM_LABEL) else {
            warn!(deployment = %name, "Managed deployment has no team label, ignoring it");
            return None;
        };

        Some(ManagedInstance {
            name,
            team,
            annotations,
            ready_replicas: self.status.ready_replicas,
            created_at: creation_timestamp,
        })
    }
}
