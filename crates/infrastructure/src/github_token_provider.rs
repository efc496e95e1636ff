//! Credential providers for the GitHub comment client.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use kome_application::TokenProvider;
use kome_core::{AppError, AppResult};
use reqwest::header;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

/// Credential shape resolved once at startup into one token provider.
#[derive(Debug, Clone)]
pub enum GitHubCredentials {
    /// Pre-issued personal or installation access token.
    Token {
        /// The token itself.
        token: String,
    },
    /// GitHub App key material exchanged for installation tokens.
    App {
        /// Numeric app identifier, used as the JWT issuer.
        app_id: String,
        /// PEM-encoded RSA private key of the app.
        private_key_pem: String,
        /// Installation whose tokens are minted.
        installation_id: String,
    },
}

impl GitHubCredentials {
    /// Resolves the credential shape into one opaque token provider.
    pub fn into_token_provider(
        self,
        http_client: reqwest::Client,
        api_base_url: impl Into<String>,
    ) -> AppResult<Arc<dyn TokenProvider>> {
        match self {
            Self::Token { token } => Ok(Arc::new(StaticTokenProvider::new(token))),
            Self::App {
                app_id,
                private_key_pem,
                installation_id,
            } => Ok(Arc::new(GitHubAppTokenProvider::new(
                http_client,
                api_base_url,
                app_id,
                private_key_pem.as_str(),
                installation_id,
            )?)),
        }
    }
}

/// Token provider backed by one fixed token.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    /// Creates a provider that always returns the given token.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn bearer_token(&self) -> AppResult<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Serialize)]
struct AppJwtClaims {
    iat: i64,
    exp: i64,
    iss: String,
}

#[derive(Debug, Deserialize)]
struct InstallationTokenResponse {
    token: String,
    expires_at: DateTime<Utc>,
}

struct CachedInstallationToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// Token provider that mints short-lived GitHub App installation tokens.
///
/// The installation token is cached until shortly before its expiry; each
/// refresh signs a fresh RS256 app JWT and exchanges it at the API.
pub struct GitHubAppTokenProvider {
    http_client: reqwest::Client,
    api_base_url: String,
    app_id: String,
    installation_id: String,
    encoding_key: EncodingKey,
    cached: Mutex<Option<CachedInstallationToken>>,
}

impl GitHubAppTokenProvider {
    /// Creates one app token provider from PEM key material.
    pub fn new(
        http_client: reqwest::Client,
        api_base_url: impl Into<String>,
        app_id: impl Into<String>,
        private_key_pem: &str,
        installation_id: impl Into<String>,
    ) -> AppResult<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
            .map_err(|error| AppError::Config(format!("invalid GitHub App private key: {error}")))?;

        Ok(Self {
            http_client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_owned(),
            app_id: app_id.into(),
            installation_id: installation_id.into(),
            encoding_key,
            cached: Mutex::new(None),
        })
    }

    fn mint_app_jwt(&self, now: DateTime<Utc>) -> AppResult<String> {
        // Backdated iat absorbs clock skew against the API.
        let claims = AppJwtClaims {
            iat: (now - chrono::Duration::seconds(10)).timestamp(),
            exp: (now + chrono::Duration::minutes(9)).timestamp(),
            iss: self.app_id.clone(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|error| AppError::Internal(format!("failed to sign GitHub App JWT: {error}")))
    }

    async fn exchange_installation_token(&self) -> AppResult<InstallationTokenResponse> {
        let jwt = self.mint_app_jwt(Utc::now())?;
        let endpoint = format!(
            "{}/app/installations/{}/access_tokens",
            self.api_base_url, self.installation_id
        );

        let response = self
            .http_client
            .post(endpoint)
            .header(header::AUTHORIZATION, format!("Bearer {jwt}"))
            .header(header::USER_AGENT, "kome")
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|error| {
                AppError::Transport(format!(
                    "failed to call GitHub installation token endpoint: {error}"
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_owned());
            return Err(AppError::Transport(format!(
                "GitHub installation token endpoint returned status {}: {body}",
                status.as_u16()
            )));
        }

        response
            .json::<InstallationTokenResponse>()
            .await
            .map_err(|error| {
                AppError::Transport(format!(
                    "failed to parse GitHub installation token response: {error}"
                ))
            })
    }
}

#[async_trait]
impl TokenProvider for GitHubAppTokenProvider {
    async fn bearer_token(&self) -> AppResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref()
            && token.expires_at - Utc::now() > chrono::Duration::seconds(60)
        {
            return Ok(token.token.clone());
        }

        let fresh = self.exchange_installation_token().await?;
        let token = fresh.token.clone();
        *cached = Some(CachedInstallationToken {
            token: fresh.token,
            expires_at: fresh.expires_at,
        });

        Ok(token)
    }
}
