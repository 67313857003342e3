// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Client for the progress endpoints each instance exposes.
//!
//! | Call | Request |
//! |------|---------|
//! | challenge progress | `GET /api/challenges` |
//! | continue code | `GET /rest/continue-code[/find-it\|/fix-it]` |
//! | apply code | `PUT /rest/continue-code[/find-it\|/fix-it]/apply/{code}` |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use juicekeeper_core::progress::sort_by_solved_at;
use juicekeeper_core::{ChallengeProgress, ProgressCategory, ProgressState};
use reqwest::Response;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::TEAM_PLACEHOLDER;
use crate::error::{Error, Result};

/// Progress API of a team's instance.
#[async_trait]
pub trait InstanceApi: Send + Sync {
    /// Solved challenges, stable-sorted by solve time.
    async fn challenge_progress(&self, team: &str) -> Result<Vec<ChallengeProgress>>;

    /// Current continue code of a category.
    async fn continue_code(&self, team: &str, category: ProgressCategory) -> Result<String>;

    /// Apply a continue code to a category.
    async fn apply_continue_code(
        &self,
        team: &str,
        category: ProgressCategory,
        code: &str,
    ) -> Result<()>;

    /// Live progress: solved challenges plus both bonus codes.
    ///
    /// The challenge list is required. A bonus endpoint the instance does not
    /// serve (404) counts as an empty code; any other failure leaves the code
    /// unknown and fails the call.
    async fn live_progress(&self, team: &str) -> Result<ProgressState> {
        let challenges = self.challenge_progress(team).await?;

        let mut progress = ProgressState::new(challenges, None, None);
        for category in ProgressCategory::BONUS {
            match self.continue_code(team, category).await {
                Ok(code) => progress.set_code(category, Some(code)),
                Err(Error::InstanceStatus { status: 404, .. }) => {
                    debug!(team, %category, "Instance has no continue code endpoint");
                }
                Err(e) => {
                    warn!(team, %category, error = %e, "Failed to fetch continue code");
                    return Err(e);
                }
            }
        }
        Ok(progress)
    }
}

/// [`InstanceApi`] over HTTP.
#[derive(Clone)]
pub struct HttpInstanceClient {
    client: reqwest::Client,
    url_template: String,
}

impl HttpInstanceClient {
    /// Create a client.
    ///
    /// `url_template` is the instance base URL with `{team}` in place of the
    /// team name; every request is bounded by `timeout`.
    pub fn new(url_template: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url_template: url_template.into(),
        })
    }

    fn base_url(&self, team: &str) -> String {
        self.url_template
            .replace(TEAM_PLACEHOLDER, team)
            .trim_end_matches('/')
            .to_string()
    }

    fn continue_code_url(&self, team: &str, category: ProgressCategory) -> String {
        match category.path_segment() {
            Some(segment) => format!("{}/rest/continue-code/{segment}", self.base_url(team)),
            None => format!("{}/rest/continue-code", self.base_url(team)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChallengesResponse {
    #[serde(default)]
    data: Vec<ChallengeEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChallengeEntry {
    key: String,
    #[serde(default)]
    solved: bool,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContinueCodeResponse {
    #[serde(default)]
    continue_code: String,
}

fn ensure_success(team: &str, response: Response) -> Result<Response> {
    if response.status().is_success() {
        Ok(response)
    } else {
        Err(Error::InstanceStatus {
            team: team.to_string(),
            status: response.status().as_u16(),
        })
    }
}

#[async_trait]
impl InstanceApi for HttpInstanceClient {
    async fn challenge_progress(&self, team: &str) -> Result<Vec<ChallengeProgress>> {
        let url = format!("{}/api/challenges", self.base_url(team));
        let response = ensure_success(team, self.client.get(url).send().await?)?;
        let body: ChallengesResponse = response.json().await?;

        let mut solved: Vec<ChallengeProgress> = body
            .data
            .into_iter()
            .filter(|challenge| challenge.solved)
            .filter_map(|challenge| match challenge.updated_at {
                Some(solved_at) => Some(ChallengeProgress::new(challenge.key, solved_at)),
                None => {
                    warn!(team, challenge = %challenge.key, "Solved challenge has no timestamp");
                    None
                }
            })
            .collect();
        sort_by_solved_at(&mut solved);
        Ok(solved)
    }

    async fn continue_code(&self, team: &str, category: ProgressCategory) -> Result<String> {
        let url = self.continue_code_url(team, category);
        let response = ensure_success(team, self.client.get(url).send().await?)?;
        let body: ContinueCodeResponse = response.json().await?;
        Ok(body.continue_code)
    }

    async fn apply_continue_code(
        &self,
        team: &str,
        category: ProgressCategory,
        code: &str,
    ) -> Result<()> {
        let url = format!("{}/apply/{code}", self.continue_code_url(team, category));
        ensure_success(team, self.client.put(url).send().await?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> HttpInstanceClient {
        // The mock server stands in for every team's instance.
        HttpInstanceClient::new(format!("{}/{{team}}", server.uri()), Duration::from_secs(2))
            .unwrap()
    }

    async fn mock_code(server: &MockServer, segment: &str, status: u16, code: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/red/rest/continue-code{segment}")))
            .respond_with(
                ResponseTemplate::new(status).set_body_json(json!({ "continueCode": code })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_challenge_progress_keeps_solved_sorted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/red/api/challenges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "success",
                "data": [
                    {"id": 1, "key": "late", "name": "Late", "difficulty": 2, "solved": true, "updatedAt": "2024-05-01T12:00:00.000Z"},
                    {"id": 2, "key": "open", "name": "Open", "difficulty": 1, "solved": false, "updatedAt": "2024-05-01T08:00:00.000Z"},
                    {"id": 3, "key": "early", "name": "Early", "difficulty": 3, "solved": true, "updatedAt": "2024-05-01T09:00:00.000Z"}
                ]
            })))
            .mount(&server)
            .await;

        let progress = client(&server).challenge_progress("red").await.unwrap();

        assert_eq!(
            progress,
            vec![
                ChallengeProgress::new("early", Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()),
                ChallengeProgress::new("late", Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            ]
        );
    }

    #[tokio::test]
    async fn test_challenge_progress_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/red/api/challenges"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = client(&server).challenge_progress("red").await;
        assert!(matches!(
            result,
            Err(Error::InstanceStatus { status: 503, .. })
        ));
    }

    #[tokio::test]
    async fn test_continue_code_paths() {
        let server = MockServer::start().await;
        mock_code(&server, "", 200, "main-code").await;
        mock_code(&server, "/find-it", 200, "find-code").await;

        let client = client(&server);
        assert_eq!(
            client
                .continue_code("red", ProgressCategory::Main)
                .await
                .unwrap(),
            "main-code"
        );
        assert_eq!(
            client
                .continue_code("red", ProgressCategory::FindIt)
                .await
                .unwrap(),
            "find-code"
        );
    }

    #[tokio::test]
    async fn test_apply_continue_code() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/red/rest/continue-code/fix-it/apply/abc123"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/red/rest/continue-code/apply/bad"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server);
        client
            .apply_continue_code("red", ProgressCategory::FixIt, "abc123")
            .await
            .unwrap();
        assert!(
            client
                .apply_continue_code("red", ProgressCategory::Main, "bad")
                .await
                .is_err()
        );
    }

    async fn mock_empty_challenges(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/red/api/challenges"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "success", "data": []})))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_live_progress_treats_missing_bonus_endpoint_as_empty() {
        let server = MockServer::start().await;
        mock_empty_challenges(&server).await;
        mock_code(&server, "/find-it", 404, "").await;
        mock_code(&server, "/fix-it", 200, "fix-code").await;

        let progress = client(&server).live_progress("red").await.unwrap();

        assert!(progress.challenges.is_empty());
        assert_eq!(progress.find_it_code, None);
        assert_eq!(progress.fix_it_code.as_deref(), Some("fix-code"));
    }

    #[tokio::test]
    async fn test_live_progress_fails_on_bonus_server_error() {
        let server = MockServer::start().await;
        mock_empty_challenges(&server).await;
        mock_code(&server, "/find-it", 500, "").await;
        mock_code(&server, "/fix-it", 200, "fix-code").await;

        let result = client(&server).live_progress("red").await;

        assert!(matches!(
            result,
            Err(Error::InstanceStatus { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn test_live_progress_requires_challenges() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/red/api/challenges"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        assert!(client(&server).live_progress("red").await.is_err());
    }
}
