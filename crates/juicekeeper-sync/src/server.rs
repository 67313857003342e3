// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP surface.
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /ready` | readiness probe |
//! | `POST /team/{team}/webhook` | solution reported by an instance |
//! | `GET /api/score-board` | ranked board, long-poll with `wait-for-update-after` |
//! | `GET /api/teams/{team}/score` | one team's entry, same long-poll rules |
//! | `GET /api/instances` | managed instances and their last activity |

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use juicekeeper_core::TeamScore;

use crate::error::Error;
use crate::instance_api::InstanceApi;
use crate::score_cache::ScoreCache;
use crate::solutions::record_solution;
use crate::store::InstanceStore;

/// Shared state of the HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    cache: Arc<ScoreCache>,
    store: Arc<dyn InstanceStore>,
    instances: Arc<dyn InstanceApi>,
    long_poll_timeout: Duration,
    cancel: CancellationToken,
}

impl AppState {
    /// Create handler state. Long-polls end when `cancel` fires.
    pub fn new(
        cache: Arc<ScoreCache>,
        store: Arc<dyn InstanceStore>,
        instances: Arc<dyn InstanceApi>,
        long_poll_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            cache,
            store,
            instances,
            long_poll_timeout,
            cancel,
        }
    }
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ready", get(ready))
        .route("/team/{team}/webhook", post(webhook))
        .route("/api/score-board", get(score_board))
        .route("/api/teams/{team}/score", get(team_score))
        .route("/api/instances", get(list_instances))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the router on `listener` until `cancel` fires.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "HTTP server listening");
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}

async fn ready() -> &'static str {
    "ok"
}

// ============================================================================
// Webhook
// ============================================================================

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    solution: WebhookSolution,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WebhookSolution {
    challenge: String,
    issued_on: DateTime<Utc>,
}

async fn webhook(
    State(state): State<AppState>,
    Path(team): Path<String>,
    body: Bytes,
) -> Response {
    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(team = %team, error = %e, "Rejected malformed webhook");
            return (StatusCode::BAD_REQUEST, "invalid json").into_response();
        }
    };

    let result = record_solution(
        state.store.as_ref(),
        state.instances.as_ref(),
        &team,
        &payload.solution.challenge,
        payload.solution.issued_on,
    )
    .await;

    match result {
        Ok(_) => (StatusCode::OK, "ok").into_response(),
        Err(Error::InstanceNotFound(_)) => {
            (StatusCode::NOT_FOUND, "team not found").into_response()
        }
        Err(e) => {
            error!(team = %team, error = %e, "Failed to record solution");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to record solution").into_response()
        }
    }
}

// ============================================================================
// Score reads
// ============================================================================

#[derive(Debug, Deserialize)]
struct WaitParams {
    #[serde(rename = "wait-for-update-after")]
    wait_for_update_after: Option<String>,
}

impl WaitParams {
    /// Parsed watermark; `Err` carries the ready-made 400 response.
    fn watermark(&self) -> Result<Option<DateTime<Utc>>, Response> {
        match self.wait_for_update_after.as_deref() {
            None | Some("") => Ok(None),
            Some(raw) => DateTime::parse_from_rfc3339(raw)
                .map(|at| Some(at.with_timezone(&Utc)))
                .map_err(|_| {
                    (StatusCode::BAD_REQUEST, "invalid wait-for-update-after").into_response()
                }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScoreBoardResponse {
    total_teams: usize,
    last_update: DateTime<Utc>,
    teams: Vec<TeamScore>,
}

async fn score_board(State(state): State<AppState>, Query(params): Query<WaitParams>) -> Response {
    let watermark = match params.watermark() {
        Ok(watermark) => watermark,
        Err(response) => return response,
    };

    let snapshot = match watermark {
        None => state.cache.snapshot(),
        Some(after) => {
            match state
                .cache
                .wait_for_board_update(after, state.long_poll_timeout, &state.cancel)
                .await
            {
                Some(snapshot) => snapshot,
                None => return StatusCode::NO_CONTENT.into_response(),
            }
        }
    };

    Json(ScoreBoardResponse {
        total_teams: snapshot.len(),
        last_update: snapshot.last_update(),
        teams: snapshot.ranked().to_vec(),
    })
    .into_response()
}

async fn team_score(
    State(state): State<AppState>,
    Path(team): Path<String>,
    Query(params): Query<WaitParams>,
) -> Response {
    let watermark = match params.watermark() {
        Ok(watermark) => watermark,
        Err(response) => return response,
    };

    match watermark {
        None => match state.cache.team_score(&team) {
            Some(score) => Json(score).into_response(),
            None => (StatusCode::NOT_FOUND, "team not found").into_response(),
        },
        Some(after) => match state
            .cache
            .wait_for_team_update(&team, after, state.long_poll_timeout, &state.cancel)
            .await
        {
            Some(score) => Json(score).into_response(),
            None => StatusCode::NO_CONTENT.into_response(),
        },
    }
}

// ============================================================================
// Instances
// ============================================================================

#[derive(Debug, Serialize)]
struct InstanceListResponse {
    instances: Vec<InstanceSummary>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InstanceSummary {
    team: String,
    ready: bool,
    created_at: Option<DateTime<Utc>>,
    last_connect: i64,
}

async fn list_instances(State(state): State<AppState>) -> Response {
    match state.store.list().await {
        Ok(instances) => Json(InstanceListResponse {
            instances: instances
                .iter()
                .map(|instance| InstanceSummary {
                    team: instance.team.clone(),
                    ready: instance.is_ready(),
                    created_at: instance.created_at,
                    last_connect: instance.last_request_millis(),
                })
                .collect(),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list instances");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to list instances").into_response()
        }
    }
}
