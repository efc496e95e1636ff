//! GitHub REST adapter for the comment client port.

use std::sync::Arc;

use async_trait::async_trait;
use kome_application::{CommentClient, TokenProvider};
use kome_core::{AppError, AppResult};
use kome_domain::PullRequestRef;
use reqwest::header;
use serde::Deserialize;
use serde_json::json;

const USER_AGENT: &str = "kome";
const ACCEPT: &str = "application/vnd.github+json";

/// GitHub implementation of the comment client.
///
/// Pull request comments go through the issues API; every pull request is an
/// issue with the same number.
pub struct GitHubCommentClient {
    http_client: reqwest::Client,
    api_base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

#[derive(Debug, Deserialize)]
struct CreatedCommentResponse {
    id: u64,
}

impl GitHubCommentClient {
    /// Creates one comment client adapter.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        api_base_url: impl Into<String>,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            http_client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            tokens,
        }
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> AppResult<reqwest::Response> {
        let token = self.tokens.bearer_token().await?;
        let response = request
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, ACCEPT)
            .send()
            .await
            .map_err(|error| {
                AppError::Transport(format!("failed to call GitHub {operation}: {error}"))
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<body unavailable>".to_owned());

        Err(AppError::Transport(format!(
            "GitHub {operation} returned status {}: {body}",
            status.as_u16()
        )))
    }
}

#[async_trait]
impl CommentClient for GitHubCommentClient {
    async fn create_comment(&self, pull_request: &PullRequestRef, body: &str) -> AppResult<u64> {
        let endpoint = format!(
            "{}/repos/{}/{}/issues/{}/comments",
            self.api_base_url,
            pull_request.owner(),
            pull_request.repo(),
            pull_request.number()
        );

        let response = self
            .send(
                self.http_client.post(endpoint).json(&json!({"body": body})),
                "comment create",
            )
            .await?;

        let created = response
            .json::<CreatedCommentResponse>()
            .await
            .map_err(|error| {
                AppError::Transport(format!(
                    "failed to parse GitHub comment create response: {error}"
                ))
            })?;

        Ok(created.id)
    }

    async fn update_comment(
        &self,
        pull_request: &PullRequestRef,
        comment_id: u64,
        body: &str,
    ) -> AppResult<()> {
        let endpoint = format!(
            "{}/repos/{}/{}/issues/comments/{comment_id}",
            self.api_base_url,
            pull_request.owner(),
            pull_request.repo()
        );

        self.send(
            self.http_client.patch(endpoint).json(&json!({"body": body})),
            "comment update",
        )
        .await?;

        Ok(())
    }
}
