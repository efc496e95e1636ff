use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kome_core::ContentDigest;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::pull_request::{CommitSha, PullRequestRef};

/// Lease stored at a lock path while one publisher mutates the comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaseRecord {
    /// Opaque identifier of the holder, fresh per acquisition attempt.
    pub owner_id: String,
    /// Timestamp assigned when the lease was written.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub acquired_at: DateTime<Utc>,
}

impl LeaseRecord {
    /// Returns true while the lease is still within its duration.
    ///
    /// A lease past the threshold is expired and eligible for takeover
    /// regardless of owner.
    #[must_use]
    pub fn is_live(&self, now: DateTime<Utc>, lease_duration: Duration) -> bool {
        let Ok(lease_duration) = chrono::Duration::from_std(lease_duration) else {
            return true;
        };

        match now.checked_sub_signed(lease_duration) {
            Some(threshold) => self.acquired_at >= threshold,
            None => true,
        }
    }
}

/// Persisted state of the published comment for one pull request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentRecord {
    /// Identifier of the remote comment; absent before the first publish.
    #[serde(rename = "commentId", skip_serializing_if = "Option::is_none")]
    pub comment_id: Option<u64>,
    /// Digest of the last published body; absent before the first publish.
    #[serde(rename = "hash", skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<ContentDigest>,
}

/// Render input assembled for one publish attempt; never persisted.
#[derive(Debug, Clone)]
pub struct PublishContext {
    /// Flat metadata map collected for the commit.
    pub commit_metadata: BTreeMap<String, Value>,
    /// Flat metadata map accumulated on the pull request.
    pub pull_request_metadata: BTreeMap<String, Value>,
    /// Commit the metadata was collected for.
    pub sha: CommitSha,
    /// Pull request receiving the comment.
    pub pull_request: PullRequestRef,
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;

    use super::{CommentRecord, LeaseRecord};

    #[test]
    fn lease_is_live_until_duration_elapses() {
        let acquired_at = Utc.timestamp_millis_opt(1_000_000).single();
        assert!(acquired_at.is_some());
        let acquired_at = acquired_at.unwrap_or_default();
        let lease = LeaseRecord {
            owner_id: "owner-1".to_owned(),
            acquired_at,
        };

        let lease_duration = Duration::from_secs(10);
        assert!(lease.is_live(acquired_at, lease_duration));
        assert!(lease.is_live(acquired_at + chrono::Duration::seconds(10), lease_duration));
        assert!(!lease.is_live(acquired_at + chrono::Duration::seconds(11), lease_duration));
    }

    #[test]
    fn lease_record_serializes_with_epoch_millis() {
        let acquired_at = Utc.timestamp_millis_opt(1_700_000_000_000).single();
        assert!(acquired_at.is_some());
        let lease = LeaseRecord {
            owner_id: "owner-1".to_owned(),
            acquired_at: acquired_at.unwrap_or_default(),
        };

        let value = serde_json::to_value(&lease).unwrap_or_default();
        assert_eq!(
            value,
            json!({"ownerId": "owner-1", "acquiredAt": 1_700_000_000_000_i64})
        );

        let parsed: Result<LeaseRecord, _> = serde_json::from_value(value);
        assert_eq!(parsed.ok(), Some(lease));
    }

    #[test]
    fn comment_record_ignores_sibling_keys_on_read() {
        let value = json!({
            "commentId": 99,
            "hash": kome_core::ContentDigest::of_text("Meow!").as_str(),
            "lock": {"ownerId": "other", "acquiredAt": 0},
        });

        let parsed: Result<CommentRecord, _> = serde_json::from_value(value);
        assert!(parsed.is_ok());
        let record = parsed.unwrap_or_default();
        assert_eq!(record.comment_id, Some(99));
        assert_eq!(
            record.content_hash,
            Some(kome_core::ContentDigest::of_text("Meow!"))
        );
    }

    #[test]
    fn empty_comment_record_serializes_without_fields() {
        let value = serde_json::to_value(CommentRecord::default()).unwrap_or_default();
        assert_eq!(value, json!({}));
    }
}
