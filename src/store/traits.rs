//! Core traits for document store abstraction.
//!
//! - [`DocumentStore`] - Collection listing, point lookups, and batch creation
//! - [`WriteBatch`] - Accumulates field updates and flushes them as one unit

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::store::Document;

/// A group of pending field updates.
///
/// Nothing is written until [`commit`](WriteBatch::commit) is called.
#[async_trait]
pub trait WriteBatch: Send {
    /// Enqueues `collection/id.field = value`.
    fn update_field(&mut self, collection: &str, id: &str, field: &str, value: JsonValue);

    /// Number of enqueued, uncommitted updates.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flushes every enqueued update and returns how many were written.
    ///
    /// Consumes the batch - it cannot be used after commit. Whether the
    /// flush is atomic depends on the backend.
    async fn commit(self) -> Result<usize, AppError>;
}

/// A document database the migration can read from and write to.
///
/// Implementations wrap a transport (Firestore commit API, per-document
/// REST patches, or memory for tests) and are passed to the runner
/// explicitly.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// The batch type returned by this store.
    type Batch<'a>: WriteBatch
    where
        Self: 'a;

    /// Fetches every document in a collection. Empty if there are none.
    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, AppError>;

    /// Fetches one document by id, or `None` if it does not exist.
    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError>;

    /// Starts a new, empty batch.
    fn batch(&self) -> Self::Batch<'_>;
}
