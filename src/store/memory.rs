// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-memory implementation of the remote store contract.
//!
//! Serves two purposes: the offline/test backend, and the reference
//! semantics for cloud adapters. A single mutex makes batches and
//! conditional updates atomic; listeners are notified with the latest
//! matching state after every mutation (level-triggered).

use crate::error::{AppError, Result};
use crate::store::remote::{
    DocumentSnapshot, FieldUpdates, FieldValue, Filter, FilterOp, OrderBy, OrderDirection,
    RemoteStore, SubscribeTarget, Subscription, WriteOp, MAX_BATCH_OPS,
};
use crate::time_utils::Clock;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

struct Watcher {
    target: SubscribeTarget,
    sender: mpsc::UnboundedSender<Vec<DocumentSnapshot>>,
    token: CancellationToken,
}

#[derive(Default)]
struct Inner {
    collections: HashMap<String, BTreeMap<String, Value>>,
    watchers: Vec<Watcher>,
}

/// In-memory document store.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn server_timestamp(&self) -> Value {
        Value::String(crate::time_utils::format_utc_rfc3339(self.clock.now()))
    }

    fn apply_write(&self, inner: &mut Inner, op: &WriteOp) -> Result<()> {
        match op {
            WriteOp::Set {
                collection,
                id,
                fields,
                merge,
            } => {
                let docs = inner.collections.entry(collection.clone()).or_default();
                if *merge && docs.contains_key(id) {
                    if let Some(existing) = docs.get_mut(id) {
                        deep_merge(existing, fields);
                    }
                } else {
                    docs.insert(id.clone(), fields.clone());
                }
            }
            WriteOp::Update {
                collection,
                id,
                updates,
            } => {
                let now = self.server_timestamp();
                let docs = inner.collections.entry(collection.clone()).or_default();
                let doc = docs.entry(id.clone()).or_insert_with(|| Value::Object(Map::new()));
                apply_updates(doc, updates, &now);
            }
            WriteOp::Delete { collection, id } => {
                if let Some(docs) = inner.collections.get_mut(collection) {
                    docs.remove(id);
                }
            }
        }
        Ok(())
    }

    /// Push the latest matching state to every live watcher of `collection`.
    fn notify(&self, inner: &mut Inner, collection: &str) {
        let snapshots: Vec<(String, Value)> = inner
            .collections
            .get(collection)
            .map(|docs| docs.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        inner.watchers.retain(|watcher| {
            if watcher.token.is_cancelled() {
                return false;
            }
            let payload = match &watcher.target {
                SubscribeTarget::Document {
                    collection: c,
                    id,
                } => {
                    if c != collection {
                        return true;
                    }
                    snapshots
                        .iter()
                        .filter(|(doc_id, _)| doc_id == id)
                        .map(|(doc_id, fields)| DocumentSnapshot {
                            id: doc_id.clone(),
                            fields: fields.clone(),
                        })
                        .collect::<Vec<_>>()
                }
                SubscribeTarget::Collection {
                    collection: c,
                    filters,
                } => {
                    if c != collection {
                        return true;
                    }
                    snapshots
                        .iter()
                        .filter(|(_, fields)| matches_filters(fields, filters))
                        .map(|(doc_id, fields)| DocumentSnapshot {
                            id: doc_id.clone(),
                            fields: fields.clone(),
                        })
                        .collect::<Vec<_>>()
                }
            };
            watcher.sender.send(payload).is_ok()
        });
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    fn generate_id(&self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id))
            .map(|fields| DocumentSnapshot {
                id: id.to_string(),
                fields: fields.clone(),
            }))
    }

    async fn set_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
        merge: bool,
    ) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.apply_write(
            &mut inner,
            &WriteOp::Set {
                collection: collection.to_string(),
                id: id.to_string(),
                fields,
                merge,
            },
        )?;
        self.notify(&mut inner, collection);
        Ok(())
    }

    async fn update_fields(&self, collection: &str, id: &str, updates: FieldUpdates) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.apply_write(
            &mut inner,
            &WriteOp::Update {
                collection: collection.to_string(),
                id: id.to_string(),
                updates,
            },
        )?;
        self.notify(&mut inner, collection);
        Ok(())
    }

    async fn conditional_update(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: Value,
        updates: FieldUpdates,
    ) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();

        let current = inner
            .collections
            .get(collection)
            .and_then(|docs| docs.get(id));
        let Some(doc) = current else {
            return Ok(false);
        };
        if get_path(doc, field) != Some(&expected) {
            return Ok(false);
        }

        self.apply_write(
            &mut inner,
            &WriteOp::Update {
                collection: collection.to_string(),
                id: id.to_string(),
                updates,
            },
        )?;
        self.notify(&mut inner, collection);
        Ok(true)
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        self.apply_write(
            &mut inner,
            &WriteOp::Delete {
                collection: collection.to_string(),
                id: id.to_string(),
            },
        )?;
        self.notify(&mut inner, collection);
        Ok(())
    }

    async fn run_query(
        &self,
        collection: &str,
        filters: &[Filter],
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<DocumentSnapshot>> {
        let inner = self.inner.lock().unwrap();
        let mut results: Vec<DocumentSnapshot> = inner
            .collections
            .get(collection)
            .map(|docs| {
                docs.iter()
                    .filter(|(_, fields)| matches_filters(fields, filters))
                    .map(|(id, fields)| DocumentSnapshot {
                        id: id.clone(),
                        fields: fields.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = order_by {
            results.sort_by(|a, b| {
                let ordering = compare_values(
                    get_path(&a.fields, &order.field),
                    get_path(&b.fields, &order.field),
                );
                match order.direction {
                    OrderDirection::Ascending => ordering,
                    OrderDirection::Descending => ordering.reverse(),
                }
            });
        }

        if let Some(limit) = limit {
            results.truncate(limit);
        }

        Ok(results)
    }

    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()> {
        if ops.len() > MAX_BATCH_OPS {
            return Err(AppError::InvalidState(format!(
                "batch of {} exceeds limit of {} operations",
                ops.len(),
                MAX_BATCH_OPS
            )));
        }

        let mut inner = self.inner.lock().unwrap();
        for op in &ops {
            self.apply_write(&mut inner, op)?;
        }

        let mut touched: Vec<&str> = ops
            .iter()
            .map(|op| match op {
                WriteOp::Set { collection, .. }
                | WriteOp::Update { collection, .. }
                | WriteOp::Delete { collection, .. } => collection.as_str(),
            })
            .collect();
        touched.sort_unstable();
        touched.dedup();
        let touched: Vec<String> = touched.into_iter().map(String::from).collect();
        for collection in touched {
            self.notify(&mut inner, &collection);
        }
        Ok(())
    }

    async fn subscribe(&self, target: SubscribeTarget) -> Result<Subscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let token = CancellationToken::new();

        let mut inner = self.inner.lock().unwrap();

        // Initial snapshot: listeners always start from current state.
        let initial = match &target {
            SubscribeTarget::Document { collection, id } => inner
                .collections
                .get(collection)
                .and_then(|docs| docs.get(id))
                .map(|fields| {
                    vec![DocumentSnapshot {
                        id: id.clone(),
                        fields: fields.clone(),
                    }]
                })
                .unwrap_or_default(),
            SubscribeTarget::Collection {
                collection,
                filters,
            } => inner
                .collections
                .get(collection)
                .map(|docs| {
                    docs.iter()
                        .filter(|(_, fields)| matches_filters(fields, filters))
                        .map(|(id, fields)| DocumentSnapshot {
                            id: id.clone(),
                            fields: fields.clone(),
                        })
                        .collect()
                })
                .unwrap_or_default(),
        };
        let _ = sender.send(initial);

        inner.watchers.push(Watcher {
            target,
            sender,
            token: token.clone(),
        });

        Ok(Subscription { receiver, token })
    }
}

// ─── Document field helpers ──────────────────────────────────────────

/// Read a dotted path from a document.
fn get_path<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a dotted path, creating intermediate objects.
fn set_path(doc: &mut Value, path: &str, value: Value) {
    let mut current = doc;
    let segments: Vec<&str> = path.split('.').collect();
    for (i, segment) in segments.iter().enumerate() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = current.as_object_mut().expect("object ensured above");
        if i == segments.len() - 1 {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}

fn apply_updates(doc: &mut Value, updates: &FieldUpdates, server_now: &Value) {
    for (path, field_value) in updates {
        match field_value {
            FieldValue::Json(value) => set_path(doc, path, value.clone()),
            FieldValue::ServerTimestamp => set_path(doc, path, server_now.clone()),
            FieldValue::ArrayUnion(values) => {
                let mut array = get_path(doc, path)
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default();
                for value in values {
                    if !array.contains(value) {
                        array.push(value.clone());
                    }
                }
                set_path(doc, path, Value::Array(array));
            }
            FieldValue::ArrayRemove(values) => {
                let array = get_path(doc, path)
                    .and_then(|v| v.as_array().cloned())
                    .unwrap_or_default();
                let remaining: Vec<Value> =
                    array.into_iter().filter(|v| !values.contains(v)).collect();
                set_path(doc, path, Value::Array(remaining));
            }
        }
    }
}

/// Recursive object merge (set-with-merge semantics).
fn deep_merge(existing: &mut Value, incoming: &Value) {
    match (existing, incoming) {
        (Value::Object(existing_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match existing_map.get_mut(key) {
                    Some(slot) if slot.is_object() && value.is_object() => {
                        deep_merge(slot, value);
                    }
                    _ => {
                        existing_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (existing, incoming) => *existing = incoming.clone(),
    }
}

fn matches_filters(doc: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        let Some(actual) = get_path(doc, &filter.field) else {
            return false;
        };
        let ordering = compare_values(Some(actual), Some(&filter.value));
        match filter.op {
            FilterOp::Eq => actual == &filter.value,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Gte => ordering != Ordering::Less,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Lte => ordering != Ordering::Greater,
        }
    })
}

/// Total order over the value types we query on (numbers, strings).
/// Missing values sort first.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.partial_cmp(&y).unwrap_or(Ordering::Equal)
            }
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
    }
}
