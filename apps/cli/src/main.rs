//! kome command-line entry point.
//!
//! Collects commit metadata from a directory, stores it in the metadata
//! database, and publishes an idempotent status comment on the pull request.

#![forbid(unsafe_code)]

mod cli_config;
mod render;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use kome_application::{LeaseLock, MetadataService, PublishOutcome, PublishService, SystemClock};
use kome_core::{AppError, AppResult};
use kome_domain::{CommitSha, PullRequestRef};
use kome_infrastructure::{FirebaseMetadataStore, GitHubCommentClient, collect_metadata};
use tracing::{info, warn};

use cli_config::{CliConfig, init_tracing};
use render::default_renderer;

/// Scans commit metadata and creates or updates the pull request status comment.
#[derive(Debug, Parser)]
#[command(name = "kome", version)]
struct CliArgs {
    /// Path to a directory with commit metadata to collect and store.
    #[arg(long, value_name = "DIR")]
    metadata_path: Option<PathBuf>,

    /// URL of the pull request that receives the status comment.
    #[arg(long, value_name = "URL")]
    pull: Option<String>,

    /// Commit the metadata belongs to; defaults to the checked-out HEAD.
    #[arg(long, value_name = "SHA")]
    sha: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = CliArgs::parse();
    let config = CliConfig::load()?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .map_err(|error| AppError::Internal(format!("failed to build HTTP client: {error}")))?;

    let store = Arc::new(FirebaseMetadataStore::new(
        http_client.clone(),
        config.database_url.clone(),
        config.base_ref.clone(),
        config.database_auth.clone(),
    ));
    let metadata_service = MetadataService::new(store.clone());

    if args.metadata_path.is_none() && args.pull.is_none() {
        info!("nothing to do; neither --metadata-path nor --pull is provided");
        return Ok(());
    }

    let sha = resolve_sha(args.sha.as_deref())?;

    match args.metadata_path {
        Some(path) => {
            info!(path = %path.display(), "collecting commit metadata");
            let metadata = collect_metadata(path.as_path())?;
            metadata_service.store_commit_metadata(&sha, metadata).await?;
            info!(sha = %sha, "stored commit metadata");
        }
        None => {
            info!("skipping commit metadata collection because --metadata-path is not provided");
        }
    }

    match args.pull {
        Some(pull_url) => {
            let pull_request = PullRequestRef::parse_url(pull_url.as_str())?;
            metadata_service.record_pull_head(&pull_request, &sha).await?;

            let credentials = config.github_credentials.clone().ok_or_else(|| {
                AppError::Config(
                    "publishing requires KOME_GITHUB_TOKEN or the KOME_GITHUB_APP_* variables"
                        .to_owned(),
                )
            })?;
            let tokens = credentials
                .into_token_provider(http_client.clone(), config.github_api_url.clone())?;
            let comments = Arc::new(GitHubCommentClient::new(
                http_client,
                config.github_api_url.clone(),
                tokens,
            ));

            let lock = LeaseLock::new(
                store.clone(),
                Arc::new(SystemClock),
                config.lease_lock.clone(),
            );
            let publish_service = PublishService::new(store, comments, lock, default_renderer());

            let outcome = publish_service.publish(&pull_request, &sha).await?;
            match outcome {
                PublishOutcome::LockBusy => {
                    warn!(
                        pull_request = %pull_request,
                        "gave up on the comment lock; another publisher holds it"
                    );
                }
                outcome => {
                    info!(
                        pull_request = %pull_request,
                        sha = %sha,
                        outcome = outcome.as_str(),
                        "pull request comment publish finished"
                    );
                }
            }
        }
        None => {
            info!("skipping pull request comment update because --pull is not provided");
        }
    }

    Ok(())
}

fn resolve_sha(explicit: Option<&str>) -> AppResult<CommitSha> {
    if let Some(sha) = explicit {
        return CommitSha::new(sha);
    }

    let output = std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .map_err(|error| AppError::Config(format!("failed to run git rev-parse HEAD: {error}")))?;

    if !output.status.success() {
        return Err(AppError::Config(
            "git rev-parse HEAD failed; pass --sha explicitly".to_owned(),
        ));
    }

    CommitSha::new(String::from_utf8_lossy(&output.stdout).trim())
}
