use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use tokio::sync::Mutex;

use kome_core::{AppError, AppResult};
use kome_domain::LeaseRecord;
use serde_json::Value;

use crate::publish_ports::{Clock, MetadataStore, StoreMutation, StoreTransaction, StoreUpdateFn};

use super::{LeaseLock, LeaseLockConfig};

#[derive(Default)]
struct FakeStore {
    values: Mutex<HashMap<String, Value>>,
    conditional_update_calls: Mutex<u32>,
}

impl FakeStore {
    async fn stored_lease(&self, path: &str) -> Option<LeaseRecord> {
        self.values
            .lock()
            .await
            .get(path)
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

#[async_trait]
impl MetadataStore for FakeStore {
    async fn read(&self, path: &str) -> AppResult<Option<Value>> {
        Ok(self.values.lock().await.get(path).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> AppResult<()> {
        self.values.lock().await.insert(path.to_owned(), value);
        Ok(())
    }

    async fn conditional_update(
        &self,
        path: &str,
        update: &StoreUpdateFn<'_>,
    ) -> AppResult<StoreTransaction> {
        *self.conditional_update_calls.lock().await += 1;

        let mut values = self.values.lock().await;
        let mutation = update(values.get(path));
        match mutation {
            StoreMutation::Abort => Ok(StoreTransaction {
                committed: false,
                value: values.get(path).cloned(),
            }),
            StoreMutation::Set(value) => {
                values.insert(path.to_owned(), value.clone());
                Ok(StoreTransaction {
                    committed: true,
                    value: Some(value),
                })
            }
            StoreMutation::Remove => {
                values.remove(path);
                Ok(StoreTransaction {
                    committed: true,
                    value: None,
                })
            }
        }
    }
}

struct FailingStore;

#[async_trait]
impl MetadataStore for FailingStore {
    async fn read(&self, _path: &str) -> AppResult<Option<Value>> {
        Err(AppError::Transport("store unavailable".to_owned()))
    }

    async fn write(&self, _path: &str, _value: Value) -> AppResult<()> {
        Err(AppError::Transport("store unavailable".to_owned()))
    }

    async fn conditional_update(
        &self,
        _path: &str,
        _update: &StoreUpdateFn<'_>,
    ) -> AppResult<StoreTransaction> {
        Err(AppError::Transport("store unavailable".to_owned()))
    }
}

struct ManualClock {
    now: std::sync::Mutex<DateTime<Utc>>,
}

impl ManualClock {
    fn starting_at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self {
            now: std::sync::Mutex::new(now),
        })
    }

    fn advance(&self, delta: chrono::Duration) {
        let mut now = self
            .now
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self
            .now
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn epoch() -> DateTime<Utc> {
    Utc.timestamp_millis_opt(1_700_000_000_000)
        .single()
        .unwrap_or_default()
}

fn config(max_attempts: u32) -> LeaseLockConfig {
    LeaseLockConfig {
        lease_duration: Duration::from_secs(10),
        max_attempts,
        retry_delay: Duration::ZERO,
    }
}

#[tokio::test]
async fn acquire_commits_lease_and_blocks_second_acquirer() {
    let store = Arc::new(FakeStore::default());
    let clock = ManualClock::starting_at(epoch());
    let lock = LeaseLock::new(store.clone(), clock, config(3));

    let first = lock.acquire("comments/1/lock").await;
    assert!(first.is_ok());
    let first = first.unwrap_or_else(|_| unreachable!());
    assert!(first.is_some());

    let second = lock.acquire("comments/1/lock").await;
    assert!(second.is_ok());
    assert!(second.unwrap_or_else(|_| unreachable!()).is_none());
}

#[tokio::test]
async fn exhaustion_consumes_exactly_max_attempts() {
    let store = Arc::new(FakeStore::default());
    let clock = ManualClock::starting_at(epoch());
    let lock = LeaseLock::new(store.clone(), clock, config(3));

    let held = lock.acquire("comments/1/lock").await;
    assert!(held.is_ok());
    *store.conditional_update_calls.lock().await = 0;

    let busy = lock.acquire("comments/1/lock").await;
    assert!(busy.is_ok());
    assert!(busy.unwrap_or_else(|_| unreachable!()).is_none());
    assert_eq!(*store.conditional_update_calls.lock().await, 3);
}

#[tokio::test]
async fn released_lease_is_immediately_reacquirable() {
    let store = Arc::new(FakeStore::default());
    let clock = ManualClock::starting_at(epoch());
    let lock = LeaseLock::new(store.clone(), clock, config(1));

    let guard = lock.acquire("comments/1/lock").await;
    assert!(guard.is_ok());
    let guard = guard.unwrap_or_else(|_| unreachable!());
    assert!(guard.is_some());

    let released = guard
        .map(|guard| guard.release())
        .unwrap_or_else(|| unreachable!())
        .await;
    assert!(released.is_ok());
    assert!(store.stored_lease("comments/1/lock").await.is_none());

    let reacquired = lock.acquire("comments/1/lock").await;
    assert!(reacquired.is_ok());
    assert!(reacquired.unwrap_or_else(|_| unreachable!()).is_some());
}

#[tokio::test]
async fn expired_lease_is_taken_over_by_new_caller() {
    let store = Arc::new(FakeStore::default());
    let clock = ManualClock::starting_at(epoch());
    let lock = LeaseLock::new(store.clone(), clock.clone(), config(1));

    let first = lock.acquire("comments/1/lock").await;
    assert!(first.is_ok());

    clock.advance(chrono::Duration::seconds(11));

    let second = lock.acquire("comments/1/lock").await;
    assert!(second.is_ok());
    assert!(second.unwrap_or_else(|_| unreachable!()).is_some());
}

#[tokio::test]
async fn stale_release_never_deletes_the_new_owner_record() {
    let store = Arc::new(FakeStore::default());
    let clock = ManualClock::starting_at(epoch());
    let lock = LeaseLock::new(store.clone(), clock.clone(), config(1));

    let stale = lock.acquire("comments/1/lock").await;
    assert!(stale.is_ok());
    let stale = stale.unwrap_or_else(|_| unreachable!());
    assert!(stale.is_some());

    clock.advance(chrono::Duration::seconds(11));

    let takeover = lock.acquire("comments/1/lock").await;
    assert!(takeover.is_ok());
    let takeover = takeover.unwrap_or_else(|_| unreachable!());
    assert!(takeover.is_some());
    let new_owner = takeover
        .as_ref()
        .map(|guard| guard.owner_id().to_owned())
        .unwrap_or_default();

    let released = stale
        .map(|guard| guard.release())
        .unwrap_or_else(|| unreachable!())
        .await;
    assert!(released.is_ok());

    let stored = store.stored_lease("comments/1/lock").await;
    assert_eq!(stored.map(|lease| lease.owner_id), Some(new_owner));
}

#[tokio::test]
async fn corrupt_lease_record_is_taken_over() {
    let store = Arc::new(FakeStore::default());
    store
        .values
        .lock()
        .await
        .insert("comments/1/lock".to_owned(), Value::String("junk".to_owned()));
    let clock = ManualClock::starting_at(epoch());
    let lock = LeaseLock::new(store.clone(), clock, config(1));

    let acquired = lock.acquire("comments/1/lock").await;
    assert!(acquired.is_ok());
    assert!(acquired.unwrap_or_else(|_| unreachable!()).is_some());
}

#[tokio::test]
async fn store_errors_propagate_without_consuming_attempts() {
    let clock = ManualClock::starting_at(epoch());
    let lock = LeaseLock::new(Arc::new(FailingStore), clock, config(5));

    let result = lock.acquire("comments/1/lock").await;
    assert!(matches!(result, Err(AppError::Transport(_))));
}

#[tokio::test]
async fn acquire_rejects_empty_path_and_zero_attempts() {
    let store = Arc::new(FakeStore::default());
    let clock = ManualClock::starting_at(epoch());

    let lock = LeaseLock::new(store.clone(), clock.clone(), config(1));
    assert!(matches!(
        lock.acquire("  ").await,
        Err(AppError::Validation(_))
    ));

    let lock = LeaseLock::new(store, clock, config(0));
    assert!(matches!(
        lock.acquire("comments/1/lock").await,
        Err(AppError::Validation(_))
    ));
}
