use std::sync::Arc;
use std::time::Duration;

use kome_core::{AppError, AppResult};
use kome_domain::LeaseRecord;
use serde_json::Value;
use uuid::Uuid;

use crate::publish_ports::{Clock, MetadataStore, StoreMutation};

/// Tuning for lease acquisition.
#[derive(Debug, Clone)]
pub struct LeaseLockConfig {
    /// How long an acquired lease stays live without release.
    pub lease_duration: Duration,
    /// Bounded number of acquisition attempts before giving up.
    pub max_attempts: u32,
    /// Delay between acquisition attempts.
    pub retry_delay: Duration,
}

impl Default for LeaseLockConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(10),
            max_attempts: 10,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Lease-based mutual exclusion over one store path.
///
/// Acquisition is an optimistic compare-and-update: the store commits the
/// lease only when no live lease is present. Natural expiry is the backstop
/// for holders that crash before releasing.
#[derive(Clone)]
pub struct LeaseLock {
    store: Arc<dyn MetadataStore>,
    clock: Arc<dyn Clock>,
    config: LeaseLockConfig,
}

impl LeaseLock {
    /// Creates one lease lock over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn MetadataStore>, clock: Arc<dyn Clock>, config: LeaseLockConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Attempts to acquire the lease at `path`.
    ///
    /// Returns `None` when every attempt found a live lease held by someone
    /// else; that is the expected "lock busy" outcome, not an error. Transient
    /// store errors propagate immediately and do not consume attempts.
    pub async fn acquire(&self, path: &str) -> AppResult<Option<LeaseGuard>> {
        if path.trim().is_empty() {
            return Err(AppError::Validation(
                "lease path must not be empty".to_owned(),
            ));
        }

        if self.config.max_attempts == 0 {
            return Err(AppError::Validation(
                "lease max_attempts must be greater than zero".to_owned(),
            ));
        }

        let owner_id = Uuid::new_v4().to_string();

        for attempt in 1..=self.config.max_attempts {
            let now = self.clock.now();
            let lease_duration = self.config.lease_duration;
            let claim = serde_json::to_value(LeaseRecord {
                owner_id: owner_id.clone(),
                acquired_at: now,
            })
            .map_err(|error| {
                AppError::Internal(format!("failed to serialize lease record: {error}"))
            })?;

            let transaction = self
                .store
                .conditional_update(path, &|current| {
                    // A record that fails to parse counts as not live, so a
                    // corrupt lease node is taken over rather than wedged.
                    let held = parse_lease(current)
                        .is_some_and(|lease| lease.is_live(now, lease_duration));

                    if held {
                        StoreMutation::Abort
                    } else {
                        StoreMutation::Set(claim.clone())
                    }
                })
                .await?;

            if transaction.committed {
                return Ok(Some(LeaseGuard {
                    store: self.store.clone(),
                    path: path.to_owned(),
                    owner_id,
                }));
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Ok(None)
    }
}

/// Handle bound to one acquired lease.
pub struct LeaseGuard {
    store: Arc<dyn MetadataStore>,
    path: String,
    owner_id: String,
}

impl LeaseGuard {
    /// Returns the owner id this handle is bound to.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        self.owner_id.as_str()
    }

    /// Releases the lease using owner compare-and-delete semantics.
    ///
    /// When the lease already expired and was taken over by another owner,
    /// the delete aborts and the new owner's record stays in place.
    pub async fn release(self) -> AppResult<()> {
        let owner_id = self.owner_id;

        self.store
            .conditional_update(self.path.as_str(), &|current| match parse_lease(current) {
                Some(lease) if lease.owner_id == owner_id => StoreMutation::Remove,
                _ => StoreMutation::Abort,
            })
            .await?;

        Ok(())
    }
}

fn parse_lease(value: Option<&Value>) -> Option<LeaseRecord> {
    value.and_then(|value| serde_json::from_value(value.clone()).ok())
}

#[cfg(test)]
mod tests;
