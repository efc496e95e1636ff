//! Firebase Realtime Database REST adapter for the metadata store port.

use async_trait::async_trait;
use kome_application::{MetadataStore, StoreMutation, StoreTransaction, StoreUpdateFn};
use kome_core::{AppError, AppResult};
use reqwest::{Method, StatusCode, header};
use serde_json::Value;

/// Ceiling for ETag compare-and-swap rounds inside one conditional update.
const CONDITIONAL_UPDATE_RETRY_LIMIT: u32 = 25;

/// Firebase Realtime Database implementation of the metadata store.
///
/// Conditional updates run as an ETag compare-and-swap loop: read with
/// `X-Firebase-ETag`, apply the update function, then write with `if-match`;
/// a 412 response re-reads and re-runs the update function.
pub struct FirebaseMetadataStore {
    http_client: reqwest::Client,
    database_url: String,
    base_ref: String,
    auth_token: Option<String>,
}

impl FirebaseMetadataStore {
    /// Creates one store adapter rooted at `<database_url>/<base_ref>`.
    #[must_use]
    pub fn new(
        http_client: reqwest::Client,
        database_url: impl Into<String>,
        base_ref: impl Into<String>,
        auth_token: Option<String>,
    ) -> Self {
        Self {
            http_client,
            database_url: database_url.into().trim_end_matches('/').to_owned(),
            base_ref: base_ref.into(),
            auth_token,
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let endpoint = format!("{}/{}/{path}.json", self.database_url, self.base_ref);
        let mut request = self.http_client.request(method, endpoint);
        if let Some(token) = self.auth_token.as_deref() {
            request = request.query(&[("auth", token)]);
        }

        request
    }

    async fn read_with_etag(&self, path: &str) -> AppResult<(Option<Value>, String)> {
        let response = self
            .request(Method::GET, path)
            .header("X-Firebase-ETag", "true")
            .send()
            .await
            .map_err(|error| {
                AppError::Transport(format!("failed to read store path '{path}': {error}"))
            })?;
        let response = ensure_success(response, "read", path).await?;

        let etag = response
            .headers()
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                AppError::Transport(format!("store read at '{path}' returned no ETag"))
            })?;

        let value = response.json::<Value>().await.map_err(|error| {
            AppError::Transport(format!(
                "failed to parse store response at '{path}': {error}"
            ))
        })?;

        Ok((non_null(value), etag))
    }
}

#[async_trait]
impl MetadataStore for FirebaseMetadataStore {
    async fn read(&self, path: &str) -> AppResult<Option<Value>> {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(|error| {
                AppError::Transport(format!("failed to read store path '{path}': {error}"))
            })?;
        let response = ensure_success(response, "read", path).await?;

        let value = response.json::<Value>().await.map_err(|error| {
            AppError::Transport(format!(
                "failed to parse store response at '{path}': {error}"
            ))
        })?;

        Ok(non_null(value))
    }

    async fn write(&self, path: &str, value: Value) -> AppResult<()> {
        let response = self
            .request(Method::PUT, path)
            .json(&value)
            .send()
            .await
            .map_err(|error| {
                AppError::Transport(format!("failed to write store path '{path}': {error}"))
            })?;
        ensure_success(response, "write", path).await?;

        Ok(())
    }

    async fn conditional_update(
        &self,
        path: &str,
        update: &StoreUpdateFn<'_>,
    ) -> AppResult<StoreTransaction> {
        for _ in 0..CONDITIONAL_UPDATE_RETRY_LIMIT {
            let (current, etag) = self.read_with_etag(path).await?;

            let (request, value) = match update(current.as_ref()) {
                StoreMutation::Abort => {
                    return Ok(StoreTransaction {
                        committed: false,
                        value: current,
                    });
                }
                StoreMutation::Set(value) => {
                    let request = self.request(Method::PUT, path).json(&value);
                    (request, Some(value))
                }
                StoreMutation::Remove => (self.request(Method::DELETE, path), None),
            };

            let response = request
                .header("if-match", etag.as_str())
                .send()
                .await
                .map_err(|error| {
                    AppError::Transport(format!("failed to write store path '{path}': {error}"))
                })?;

            if response.status() == StatusCode::PRECONDITION_FAILED {
                continue;
            }

            ensure_success(response, "conditional update", path).await?;
            return Ok(StoreTransaction {
                committed: true,
                value,
            });
        }

        Err(AppError::Transport(format!(
            "conditional update at '{path}' exceeded {CONDITIONAL_UPDATE_RETRY_LIMIT} attempts"
        )))
    }
}

fn non_null(value: Value) -> Option<Value> {
    if value.is_null() { None } else { Some(value) }
}

async fn ensure_success(
    response: reqwest::Response,
    operation: &str,
    path: &str,
) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_owned());

    Err(AppError::Transport(format!(
        "store {operation} at '{path}' returned status {}: {body}",
        status.as_u16()
    )))
}
