use std::env;
use std::time::Duration;

use base64::Engine;
use kome_application::LeaseLockConfig;
use kome_core::{AppError, AppResult};
use kome_infrastructure::GitHubCredentials;
use tracing_subscriber::EnvFilter;

/// Startup configuration loaded once from the environment.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Base URL of the metadata database.
    pub database_url: String,
    /// Top-level node all metadata lives under.
    pub base_ref: String,
    /// Optional auth token appended to every database request.
    pub database_auth: Option<String>,
    /// Base URL of the GitHub API.
    pub github_api_url: String,
    /// Resolved credential shape; `None` until publishing is requested.
    pub github_credentials: Option<GitHubCredentials>,
    /// Lease lock tuning for the comment publish.
    pub lease_lock: LeaseLockConfig,
}

impl CliConfig {
    /// Loads and validates the configuration.
    pub fn load() -> AppResult<Self> {
        let database_url = required_env("KOME_DATABASE_URL")?
            .trim_end_matches('/')
            .to_owned();
        let base_ref = env::var("KOME_BASE_REF").unwrap_or_else(|_| "kome".to_owned());
        let database_auth = optional_env("KOME_DATABASE_AUTH");
        let github_api_url = env::var("KOME_GITHUB_API_URL")
            .unwrap_or_else(|_| "https://api.github.com".to_owned())
            .trim_end_matches('/')
            .to_owned();
        let github_credentials = load_github_credentials()?;

        let lease_seconds = parse_env_u64("KOME_LOCK_LEASE_SECONDS", 10)?;
        let max_attempts = parse_env_u32("KOME_LOCK_ATTEMPTS", 10)?;
        let retry_delay_seconds = parse_env_u64("KOME_LOCK_RETRY_DELAY_SECONDS", 5)?;

        if lease_seconds == 0 {
            return Err(AppError::Config(
                "KOME_LOCK_LEASE_SECONDS must be greater than zero".to_owned(),
            ));
        }

        if max_attempts == 0 {
            return Err(AppError::Config(
                "KOME_LOCK_ATTEMPTS must be greater than zero".to_owned(),
            ));
        }

        Ok(Self {
            database_url,
            base_ref,
            database_auth,
            github_api_url,
            github_credentials,
            lease_lock: LeaseLockConfig {
                lease_duration: Duration::from_secs(lease_seconds),
                max_attempts,
                retry_delay: Duration::from_secs(retry_delay_seconds),
            },
        })
    }
}

fn load_github_credentials() -> AppResult<Option<GitHubCredentials>> {
    if let Some(token) = optional_env("KOME_GITHUB_TOKEN") {
        return Ok(Some(GitHubCredentials::Token { token }));
    }

    let app_id = optional_env("KOME_GITHUB_APP_ID");
    let private_key = optional_env("KOME_GITHUB_APP_PRIVATE_KEY");
    let installation_id = optional_env("KOME_GITHUB_APP_INSTALLATION_ID");

    match (app_id, private_key, installation_id) {
        (None, None, None) => Ok(None),
        (Some(app_id), Some(private_key), Some(installation_id)) => {
            let decoded = base64::engine::general_purpose::STANDARD
                .decode(private_key.trim())
                .map_err(|error| {
                    AppError::Config(format!(
                        "KOME_GITHUB_APP_PRIVATE_KEY must be base64-encoded PEM: {error}"
                    ))
                })?;
            let private_key_pem = String::from_utf8(decoded).map_err(|error| {
                AppError::Config(format!(
                    "KOME_GITHUB_APP_PRIVATE_KEY must decode to UTF-8 PEM: {error}"
                ))
            })?;

            Ok(Some(GitHubCredentials::App {
                app_id,
                private_key_pem,
                installation_id,
            }))
        }
        _ => Err(AppError::Config(
            "KOME_GITHUB_APP_ID, KOME_GITHUB_APP_PRIVATE_KEY and \
             KOME_GITHUB_APP_INSTALLATION_ID must be set together"
                .to_owned(),
        )),
    }
}

/// Initializes the tracing subscriber for the binary.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Config(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn parse_env_u32(name: &str, default: u32) -> AppResult<u32> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u32>()
            .map_err(|error| AppError::Config(format!("invalid {name} value '{value}': {error}"))),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u64>()
            .map_err(|error| AppError::Config(format!("invalid {name} value '{value}': {error}"))),
        Err(_) => Ok(default),
    }
}
