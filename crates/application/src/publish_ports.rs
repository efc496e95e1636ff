use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use kome_core::AppResult;
use kome_domain::{PublishContext, PullRequestRef};
use serde_json::Value;

/// Mutation decided by a conditional-update function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreMutation {
    /// Leave the stored value untouched; the transaction reports not committed.
    Abort,
    /// Replace the stored value.
    Set(Value),
    /// Delete the stored value.
    Remove,
}

/// Result of one conditional update against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreTransaction {
    /// Whether the mutation was applied.
    pub committed: bool,
    /// Value stored at the path after the transaction.
    pub value: Option<Value>,
}

/// Update function run inside one conditional update.
///
/// May be invoked more than once when the store detects contention.
pub type StoreUpdateFn<'a> = dyn Fn(Option<&Value>) -> StoreMutation + Send + Sync + 'a;

/// Transactional key-value store port.
///
/// Paths are `/`-separated segments into one tree; each individual read and
/// write is atomic and linearizable per path, with no multi-path atomicity.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Reads the value at `path`; absent values are `None`.
    async fn read(&self, path: &str) -> AppResult<Option<Value>>;

    /// Writes the value at `path` unconditionally.
    ///
    /// Only used by single-producer paths that never contend.
    async fn write(&self, path: &str, value: Value) -> AppResult<()>;

    /// Runs one atomic read-modify-write at `path`.
    async fn conditional_update(
        &self,
        path: &str,
        update: &StoreUpdateFn<'_>,
    ) -> AppResult<StoreTransaction>;
}

/// Remote comment API port.
#[async_trait]
pub trait CommentClient: Send + Sync {
    /// Creates a new comment on the pull request and returns its identifier.
    async fn create_comment(&self, pull_request: &PullRequestRef, body: &str) -> AppResult<u64>;

    /// Rewrites the body of an existing comment.
    async fn update_comment(
        &self,
        pull_request: &PullRequestRef,
        comment_id: u64,
        body: &str,
    ) -> AppResult<()>;
}

/// Opaque credential capability consumed by the comment client.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a bearer token valid for the next request.
    async fn bearer_token(&self) -> AppResult<String>;
}

/// Wall-clock port; injected so lease liveness is deterministically testable.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// System wall-clock implementation.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Injected pure rendering callback producing the comment body.
///
/// Must be deterministic for identical context; idempotence depends on it.
pub type MessageRenderer = Arc<dyn Fn(&PublishContext) -> String + Send + Sync>;
