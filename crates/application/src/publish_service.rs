use std::collections::BTreeMap;
use std::sync::Arc;

use kome_core::{AppError, AppResult, ContentDigest};
use kome_domain::{CommentRecord, CommitSha, PublishContext, PullRequestRef};
use serde_json::Value;

use crate::lease_lock::LeaseLock;
use crate::publish_ports::{CommentClient, MessageRenderer, MetadataStore, StoreMutation};

/// Outcome of one publish attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// A new remote comment was created.
    Created,
    /// The existing remote comment body was rewritten.
    Updated,
    /// The stored digest matched the rendered text; no remote call was made.
    Unchanged,
    /// The lease could not be acquired; nothing was read or mutated.
    LockBusy,
}

impl PublishOutcome {
    /// Returns a stable label for logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
            Self::LockBusy => "lock_busy",
        }
    }
}

/// Coordinates one idempotent publish of the status comment.
///
/// All reads and mutations after acquisition happen under the per-pull lease,
/// so at most one worker mutates the remote comment at a time.
pub struct PublishService {
    store: Arc<dyn MetadataStore>,
    comments: Arc<dyn CommentClient>,
    lock: LeaseLock,
    renderer: MessageRenderer,
}

impl PublishService {
    /// Creates one publish coordinator.
    #[must_use]
    pub fn new(
        store: Arc<dyn MetadataStore>,
        comments: Arc<dyn CommentClient>,
        lock: LeaseLock,
        renderer: MessageRenderer,
    ) -> Self {
        Self {
            store,
            comments,
            lock,
            renderer,
        }
    }

    /// Publishes the status comment for one pull request.
    ///
    /// Returns `LockBusy` without any further action when the lease is held
    /// elsewhere; that is the backpressure mechanism under contention, and the
    /// next push event retries the whole operation.
    pub async fn publish(
        &self,
        pull_request: &PullRequestRef,
        sha: &CommitSha,
    ) -> AppResult<PublishOutcome> {
        let Some(guard) = self.lock.acquire(&pull_request.comment_lock_path()).await? else {
            return Ok(PublishOutcome::LockBusy);
        };

        let outcome = self.publish_locked(pull_request, sha).await;

        // The release runs on every exit path. Its own failure never replaces
        // the publish result; lease expiry is the backstop.
        let _released = guard.release().await;

        outcome
    }

    async fn publish_locked(
        &self,
        pull_request: &PullRequestRef,
        sha: &CommitSha,
    ) -> AppResult<PublishOutcome> {
        let commit_metadata = self.read_metadata_map(&sha.metadata_path()).await?;
        let pull_request_metadata = self.read_metadata_map(&pull_request.metadata_path()).await?;

        let context = PublishContext {
            commit_metadata,
            pull_request_metadata,
            sha: sha.clone(),
            pull_request: pull_request.clone(),
        };
        let body = (self.renderer)(&context);
        let digest = ContentDigest::of_text(body.as_str());

        let record_path = pull_request.comment_record_path();
        let record = self.read_comment_record(&record_path).await?;

        match record.comment_id {
            None => {
                let comment_id = self
                    .comments
                    .create_comment(pull_request, body.as_str())
                    .await?;
                self.store_comment_record(&record_path, &record, comment_id, &digest)
                    .await?;
                Ok(PublishOutcome::Created)
            }
            Some(_) if record.content_hash.as_ref() == Some(&digest) => {
                Ok(PublishOutcome::Unchanged)
            }
            Some(comment_id) => {
                self.comments
                    .update_comment(pull_request, comment_id, body.as_str())
                    .await?;
                self.store_comment_record(&record_path, &record, comment_id, &digest)
                    .await?;
                Ok(PublishOutcome::Updated)
            }
        }
    }

    /// Reads one flat metadata map; absence degrades to an empty map.
    async fn read_metadata_map(&self, path: &str) -> AppResult<BTreeMap<String, Value>> {
        let value = self.store.read(path).await?;

        Ok(match value {
            Some(Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        })
    }

    async fn read_comment_record(&self, path: &str) -> AppResult<CommentRecord> {
        let Some(value) = self.store.read(path).await? else {
            return Ok(CommentRecord::default());
        };

        serde_json::from_value(value).map_err(|error| {
            AppError::Internal(format!("comment record at '{path}' failed to parse: {error}"))
        })
    }

    /// Persists the comment record, gated on the record still matching what
    /// was read under this lease.
    ///
    /// A declined write means a newer publish already landed (a stale holder
    /// racing past its expired lease) and is deliberately left in place.
    async fn store_comment_record(
        &self,
        path: &str,
        previous: &CommentRecord,
        comment_id: u64,
        digest: &ContentDigest,
    ) -> AppResult<()> {
        self.store
            .conditional_update(path, &|current| {
                let current_record = match current {
                    None => CommentRecord::default(),
                    Some(value) => match serde_json::from_value(value.clone()) {
                        Ok(record) => record,
                        Err(_) => return StoreMutation::Abort,
                    },
                };

                if current_record != *previous {
                    return StoreMutation::Abort;
                }

                // Sibling keys under the record path are preserved; the lease
                // node lives at `<path>/lock`.
                let mut object = match current {
                    Some(Value::Object(map)) => map.clone(),
                    _ => serde_json::Map::new(),
                };
                object.insert("commentId".to_owned(), Value::from(comment_id));
                object.insert("hash".to_owned(), Value::from(digest.as_str()));

                StoreMutation::Set(Value::Object(object))
            })
            .await?;

        Ok(())
    }
}
