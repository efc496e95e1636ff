use async_trait::async_trait;
use kome_application::{MetadataStore, StoreMutation, StoreTransaction, StoreUpdateFn};
use kome_core::{AppError, AppResult};
use serde_json::Value;
use tokio::sync::Mutex;

/// In-memory metadata store implementation.
///
/// Paths are `/`-separated segments into one JSON tree, like the real
/// database. Every operation holds a single mutex, so each call is
/// linearizable; used by tests and available for local runs.
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    root: Mutex<Value>,
}

impl InMemoryMetadataStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            root: Mutex::new(Value::Null),
        }
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn read(&self, path: &str) -> AppResult<Option<Value>> {
        let segments = split_path(path)?;
        let root = self.root.lock().await;
        Ok(lookup(&root, &segments).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> AppResult<()> {
        let segments = split_path(path)?;
        let mut root = self.root.lock().await;
        set_node(&mut root, &segments, value);
        Ok(())
    }

    async fn conditional_update(
        &self,
        path: &str,
        update: &StoreUpdateFn<'_>,
    ) -> AppResult<StoreTransaction> {
        let segments = split_path(path)?;
        let mut root = self.root.lock().await;
        let mutation = update(lookup(&root, &segments));

        match mutation {
            StoreMutation::Abort => Ok(StoreTransaction {
                committed: false,
                value: lookup(&root, &segments).cloned(),
            }),
            StoreMutation::Set(value) => {
                set_node(&mut root, &segments, value.clone());
                Ok(StoreTransaction {
                    committed: true,
                    value: Some(value),
                })
            }
            StoreMutation::Remove => {
                if remove_node(&mut root, &segments) {
                    *root = Value::Null;
                }
                Ok(StoreTransaction {
                    committed: true,
                    value: None,
                })
            }
        }
    }
}

fn split_path(path: &str) -> AppResult<Vec<String>> {
    let segments: Vec<String> = path.split('/').map(str::to_owned).collect();

    if segments.iter().any(|segment| segment.trim().is_empty()) {
        return Err(AppError::Validation(format!(
            "store path '{path}' must be non-empty '/'-separated segments"
        )));
    }

    Ok(segments)
}

fn lookup<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    let mut node = root;
    for segment in segments {
        node = node.as_object()?.get(segment.as_str())?;
    }

    if node.is_null() { None } else { Some(node) }
}

fn set_node(node: &mut Value, segments: &[String], value: Value) {
    if !node.is_object() {
        *node = Value::Object(serde_json::Map::new());
    }
    let Some(object) = node.as_object_mut() else {
        return;
    };

    match segments {
        [] => {}
        [last] => {
            object.insert(last.clone(), value);
        }
        [head, rest @ ..] => {
            let child = object.entry(head.clone()).or_insert(Value::Null);
            set_node(child, rest, value);
        }
    }
}

/// Removes the value at `segments`; returns true when the node became empty
/// and should be pruned by its parent.
fn remove_node(node: &mut Value, segments: &[String]) -> bool {
    let Some(object) = node.as_object_mut() else {
        return false;
    };

    match segments {
        [] => {}
        [last] => {
            object.remove(last.as_str());
        }
        [head, rest @ ..] => {
            if let Some(child) = object.get_mut(head.as_str())
                && remove_node(child, rest)
            {
                object.remove(head.as_str());
            }
        }
    }

    object.is_empty()
}
