//! In-process document store.
//!
//! Holds collections in ordered maps and records the size of every commit.
//! Lookups and commits can be made to fail on demand, which is how the
//! runner's error paths are exercised without a network.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};

use crate::error::AppError;
use crate::store::{Document, DocumentStore, FieldUpdate, WriteBatch};

type Collection = BTreeMap<String, Map<String, JsonValue>>;

#[derive(Default)]
struct State {
    collections: BTreeMap<String, Collection>,
    commits: Vec<usize>,
    lookups: usize,
    failing_lookups: HashSet<(String, String)>,
    failing_commit: Option<usize>,
    fail_fetch_all: bool,
}

/// Memory-backed [`DocumentStore`] with failure injection.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Inserts or replaces a document. Non-object `fields` store an empty document.
    pub fn insert(&self, collection: &str, id: &str, fields: JsonValue) {
        let fields = match fields {
            JsonValue::Object(map) => map,
            _ => Map::new(),
        };
        self.state()
            .collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
    }

    /// Current snapshot of a document.
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.state()
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone()))
    }

    /// Sizes of every successful commit, in order.
    pub fn commits(&self) -> Vec<usize> {
        self.state().commits.clone()
    }

    /// Number of `fetch_one` calls served (including failed ones).
    pub fn lookups(&self) -> usize {
        self.state().lookups
    }

    /// Makes `fetch_one(collection, id)` return a transport-style error.
    pub fn fail_lookup(&self, collection: &str, id: &str) {
        self.state()
            .failing_lookups
            .insert((collection.to_string(), id.to_string()));
    }

    /// Makes the `n`th commit (1-based) fail without writing anything.
    pub fn fail_commit(&self, n: usize) {
        self.state().failing_commit = Some(n);
    }

    /// Makes `fetch_all` fail.
    pub fn fail_fetch_all(&self) {
        self.state().fail_fetch_all = true;
    }

    fn apply(&self, updates: &[FieldUpdate]) -> Result<usize, AppError> {
        let mut state = self.state();
        let attempt = state.commits.len() + 1;
        if state.failing_commit == Some(attempt) {
            return Err(AppError::CommitFailed {
                pending: updates.len(),
                message: format!("injected failure on commit {}", attempt),
            });
        }

        // All targets must exist before anything is written.
        if let Some(missing) = updates.iter().find(|u| {
            !state
                .collections
                .get(&u.collection)
                .is_some_and(|c| c.contains_key(&u.id))
        }) {
            return Err(AppError::CommitFailed {
                pending: updates.len(),
                message: format!("no document to update: {}/{}", missing.collection, missing.id),
            });
        }

        for update in updates {
            if let Some(fields) = state
                .collections
                .get_mut(&update.collection)
                .and_then(|c| c.get_mut(&update.id))
            {
                fields.insert(update.field.clone(), update.value.clone());
            }
        }
        state.commits.push(updates.len());
        Ok(updates.len())
    }
}

/// Updates held until commit.
pub struct MemoryBatch<'a> {
    store: &'a MemoryStore,
    updates: Vec<FieldUpdate>,
}

#[async_trait]
impl WriteBatch for MemoryBatch<'_> {
    fn update_field(&mut self, collection: &str, id: &str, field: &str, value: JsonValue) {
        self.updates
            .push(FieldUpdate::new(collection, id, field, value));
    }

    fn len(&self) -> usize {
        self.updates.len()
    }

    async fn commit(self) -> Result<usize, AppError> {
        self.store.apply(&self.updates)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    type Batch<'a> = MemoryBatch<'a>;

    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, AppError> {
        let state = self.state();
        if state.fail_fetch_all {
            return Err(AppError::Api {
                status: 503,
                message: "UNAVAILABLE: injected failure".to_string(),
            });
        }
        Ok(state
            .collections
            .get(collection)
            .map(|c| {
                c.iter()
                    .map(|(id, fields)| Document::new(id.as_str(), fields.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        let mut state = self.state();
        state.lookups += 1;
        if state
            .failing_lookups
            .contains(&(collection.to_string(), id.to_string()))
        {
            return Err(AppError::Api {
                status: 500,
                message: format!("INTERNAL: injected failure reading {}/{}", collection, id),
            });
        }
        Ok(state
            .collections
            .get(collection)
            .and_then(|c| c.get(id))
            .map(|fields| Document::new(id, fields.clone())))
    }

    fn batch(&self) -> Self::Batch<'_> {
        MemoryBatch {
            store: self,
            updates: Vec::new(),
        }
    }
}
