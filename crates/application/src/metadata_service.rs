use std::collections::BTreeMap;
use std::sync::Arc;

use kome_core::AppResult;
use kome_domain::{CommitSha, PullRequestRef};
use serde_json::Value;

use crate::publish_ports::MetadataStore;

/// Writes collected build metadata into the store.
///
/// Metadata paths have exactly one producer per key, so no locking is
/// involved here; only the comment publish contends.
pub struct MetadataService {
    store: Arc<dyn MetadataStore>,
}

impl MetadataService {
    /// Creates one metadata service over the store.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>) -> Self {
        Self { store }
    }

    /// Stores the flat metadata map collected for one commit.
    pub async fn store_commit_metadata(
        &self,
        sha: &CommitSha,
        metadata: BTreeMap<String, Value>,
    ) -> AppResult<()> {
        let value = Value::Object(metadata.into_iter().collect());
        self.store.write(&sha.metadata_path(), value).await
    }

    /// Records the current head commit on the pull request metadata node.
    pub async fn record_pull_head(
        &self,
        pull_request: &PullRequestRef,
        sha: &CommitSha,
    ) -> AppResult<()> {
        let path = format!("{}/head", pull_request.metadata_path());
        self.store
            .write(path.as_str(), Value::String(sha.as_str().to_owned()))
            .await
    }
}
