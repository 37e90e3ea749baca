// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote document store contract.
//!
//! The backing service is an external collaborator: an eventually
//! consistent document store with point reads/writes, filtered queries,
//! bounded atomic batches, and push-based snapshot listeners. Every call
//! is async and fallible. Listener streams are level-triggered: each
//! event carries the latest matching state and intermediate states may
//! be skipped.

use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// The store rejects atomic batches beyond this many operations.
pub const MAX_BATCH_OPS: usize = 500;

/// A document as observed at some point in time.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub id: String,
    pub fields: Value,
}

impl DocumentSnapshot {
    /// Decode into a typed model.
    ///
    /// Failures surface as `InvalidState` so list-query consumers can
    /// skip a corrupt record instead of failing the whole listing.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.fields.clone()).map_err(|e| {
            AppError::InvalidState(format!("undecodable document {}: {}", self.id, e))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

/// Field filter for queries.
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Eq,
            value: value.into(),
        }
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Lt,
            value: value.into(),
        }
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Gt,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub field: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Ascending,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: OrderDirection::Descending,
        }
    }
}

/// Value written to a single (possibly dotted) field path.
#[derive(Debug, Clone)]
pub enum FieldValue {
    Json(Value),
    /// Resolved to the store's monotonic write time at commit.
    ServerTimestamp,
    /// Atomic array union: appends elements not already present.
    ArrayUnion(Vec<Value>),
    /// Atomic array removal of all matching elements.
    ArrayRemove(Vec<Value>),
}

impl FieldValue {
    /// Serialize a model into a `Json` field value.
    pub fn json<T: serde::Serialize>(value: &T) -> Result<Self> {
        Ok(FieldValue::Json(serde_json::to_value(value).map_err(
            |e| AppError::Internal(anyhow::anyhow!("serialize: {}", e)),
        )?))
    }
}

/// Partial update: dotted field path -> new value.
pub type FieldUpdates = BTreeMap<String, FieldValue>;

/// One operation inside an atomic batch.
#[derive(Debug, Clone)]
pub enum WriteOp {
    Set {
        collection: String,
        id: String,
        fields: Value,
        merge: bool,
    },
    Update {
        collection: String,
        id: String,
        updates: FieldUpdates,
    },
    Delete {
        collection: String,
        id: String,
    },
}

/// What a listener observes.
#[derive(Debug, Clone)]
pub enum SubscribeTarget {
    Document {
        collection: String,
        id: String,
    },
    Collection {
        collection: String,
        filters: Vec<Filter>,
    },
}

/// Cancelable handle to a snapshot listener.
///
/// Each received event is the full latest matching set (one element at
/// most for a document target). After `cancel()` no further events are
/// produced and the remote listener is released.
pub struct Subscription {
    pub(crate) receiver: mpsc::UnboundedReceiver<Vec<DocumentSnapshot>>,
    pub(crate) token: CancellationToken,
}

impl Subscription {
    /// Next snapshot event, or `None` once canceled / the store dropped
    /// the listener.
    pub async fn next(&mut self) -> Option<Vec<DocumentSnapshot>> {
        tokio::select! {
            _ = self.token.cancelled() => None,
            event = self.receiver.recv() => event,
        }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Contract the core consumes from the backing document store.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// New store-assigned opaque document id.
    fn generate_id(&self) -> String;

    async fn get_document(&self, collection: &str, id: &str) -> Result<Option<DocumentSnapshot>>;

    /// Whole-document write. With `merge` set, unspecified fields keep
    /// their current values.
    async fn set_document(&self, collection: &str, id: &str, fields: Value, merge: bool)
        -> Result<()>;

    /// Field-level partial update with upsert semantics.
    async fn update_fields(&self, collection: &str, id: &str, updates: FieldUpdates) -> Result<()>;

    /// Guarded partial update: applies `updates` only if the document
    /// exists and `field` currently equals `expected`. Returns whether
    /// the write applied. This is the only safe way to transition shared
    /// status fields under concurrent writers.
    async fn conditional_update(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        expected: Value,
        updates: FieldUpdates,
    ) -> Result<bool>;

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()>;

    async fn run_query(
        &self,
        collection: &str,
        filters: &[Filter],
        order_by: Option<OrderBy>,
        limit: Option<usize>,
    ) -> Result<Vec<DocumentSnapshot>>;

    /// Atomic multi-document write, at most [`MAX_BATCH_OPS`] operations.
    async fn batch_write(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Open a push-based snapshot listener. The current state is
    /// delivered as the first event.
    async fn subscribe(&self, target: SubscribeTarget) -> Result<Subscription>;
}
