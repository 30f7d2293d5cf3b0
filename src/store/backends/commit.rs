//! Firestore backend using the atomic `documents:commit` endpoint.
//!
//! Every batch becomes one commit request. Each write is masked to the single
//! field being set and preconditioned on the document existing, so a visit
//! deleted mid-run fails the commit instead of being recreated.

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::error::AppError;
use crate::firestore::FirestoreClient;
use crate::store::{Document, DocumentStore, FieldUpdate, WriteBatch};

/// Store that commits each batch atomically.
#[derive(Clone)]
pub struct CommitStore {
    client: FirestoreClient,
}

impl CommitStore {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &FirestoreClient {
        &self.client
    }
}

/// Pending writes for one `documents:commit` request.
pub struct CommitBatch<'a> {
    client: &'a FirestoreClient,
    writes: Vec<FieldUpdate>,
}

#[async_trait]
impl WriteBatch for CommitBatch<'_> {
    fn update_field(&mut self, collection: &str, id: &str, field: &str, value: JsonValue) {
        self.writes
            .push(FieldUpdate::new(collection, id, field, value));
    }

    fn len(&self) -> usize {
        self.writes.len()
    }

    async fn commit(self) -> Result<usize, AppError> {
        let pending = self.writes.len();
        self.client
            .commit(&self.writes)
            .await
            .map_err(|e| AppError::CommitFailed {
                pending,
                message: e.to_string(),
            })?;
        Ok(pending)
    }
}

#[async_trait]
impl DocumentStore for CommitStore {
    type Batch<'a> = CommitBatch<'a>;

    async fn fetch_all(&self, collection: &str) -> Result<Vec<Document>, AppError> {
        self.client.list_documents(collection).await
    }

    async fn fetch_one(&self, collection: &str, id: &str) -> Result<Option<Document>, AppError> {
        self.client.get_document(collection, id).await
    }

    fn batch(&self) -> Self::Batch<'_> {
        CommitBatch {
            client: &self.client,
            writes: Vec::new(),
        }
    }
}
