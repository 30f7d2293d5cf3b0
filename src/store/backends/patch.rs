//! Firestore backend that writes each update with its own `PATCH` request.
//!
//! The REST surface has no multi-document write short of `documents:commit`,
//! so this backend trades atomicity for the simplest possible request shape.
//! Updates are held until the batch is committed and then sent in order; a
//! failure stops the flush and leaves earlier updates applied.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::firestore::FirestoreClient;
use crate::store::{Document, DocumentStore, FieldUpdate, WriteBatch};

/// Store that patches documents one at a time.
#[derive(Clone)]
pub struct PatchStore {
    client: FirestoreClient,
}

impl PatchStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &FirestoreClient {
        &self.client
    }
}

/// Updates waiting to be patched.
pub struct PatchBatch<'a> {
    client: &'a FirestoreClient,
    updates: Vec<FieldUpdate>,
}

#[async_trait]
impl WriteBatch for PatchBatch<'_> {
    fn update_field(&mut self, collection: &str, id: &str, field: &str, value: JsonValue) {
        self.updates
            .push(FieldUpdate::new(collection, id, field, value));
    }

    fn len(&self) -> usize {
        self.updates.len()
    }

    async fn commit(self) -> Result<usize, AppError> {
        let total = self.updates.len();
        for (written, update) in self.updates.iter().enumerate() {
            if let Err(e) = self
                .client
                .patch_field(&update.collection, &update.id, &update.field, &update.value)
                .await
            {
                tracing::error!(
                    "Patch of {}/{} failed after {} of {} updates: {}",
                    update.collection,
                    update.id,
                    written,
                    total,
                    e
                );
                return Err(AppError::CommitFailed {
                    pending: total - written,
                    message: e.to_string(),
                });
            }
        }
        Ok(total)
    }
}

#[async_trait]
impl DocumentStore for PatchStore {
    type Batch<'a> = PatchBatch<'a>;

    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, AppError> {
        self.client.list_documents(collection).await
    }

    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        self.client.get_document(collection, id).await
    }

    fn batch(&self) -> Self::Batch<'_> {
        PatchBatch {
            client: &self.client,
            updates: Vec::new(),
        }
    }
}
