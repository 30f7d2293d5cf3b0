//! Minimal Cloud Firestore REST client.
//!
//! Covers the four calls the migration needs: list a collection (following
//! `nextPageToken`), get one document, patch a single field, and commit a
//! batch of writes atomically.
//!
//! # Example
//!
//! ```ignore
//! use visit_backfill::firestore::{FirestoreClient, auth::StaticToken};
//!
//! let client = FirestoreClient::new(
//!     reqwest::Client::new(),
//!     "https://firestore.googleapis.com/v1",
//!     "my-project",
//!     "(default)",
//!     Arc::new(StaticToken::new(token)),
//! )?;
//! let visits = client.list_documents("visits").await?;
//! ```

pub mod auth;
pub mod value;

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use url::Url;

use crate::config::FirestoreConfig;
use crate::error::AppError;
use crate::store::{Document, FieldUpdate};

use self::auth::TokenProvider;

const DEFAULT_PAGE_SIZE: u32 = 300;

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, JsonValue>,
}

impl RawDocument {
    fn into_document(self) -> Result<Document, AppError> {
        let id = self
            .name
            .rsplit('/')
            .next()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Decode(format!("bad document name '{}'", self.name)))?
            .to_string();
        Ok(Document::new(id, value::decode_fields(&self.fields)?))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    documents: Vec<RawDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Firestore REST client bound to one project and database.
///
/// Cheap to clone; the HTTP connection pool and token provider are shared.
#[derive(Clone)]
pub struct FirestoreClient {
    http: reqwest::Client,
    base_url: Url,
    project_id: Arc<str>,
    database: Arc<str>,
    page_size: u32,
    tokens: Arc<dyn TokenProvider>,
}

impl FirestoreClient {
    /// Creates a client against `base_url` (e.g. `https://firestore.googleapis.com/v1`).
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        project_id: &str,
        database: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, AppError> {
        let base_url = Url::parse(base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(AppError::InvalidConfig(format!(
                "firestore.base_url is not a base URL: {}",
                base_url
            )));
        }
        Ok(Self {
            http,
            base_url,
            project_id: Arc::from(project_id),
            database: Arc::from(database),
            page_size: DEFAULT_PAGE_SIZE,
            tokens,
        })
    }

    /// Creates a client from configuration.
    pub fn from_config(
        http: reqwest::Client,
        config: &FirestoreConfig,
        project_id: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, AppError> {
        Ok(Self::new(http, &config.base_url, project_id, &config.database, tokens)?
            .with_page_size(config.page_size))
    }

    /// Sets the page size used when listing collections.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// `projects/{project}/databases/{database}/documents`
    pub fn documents_root(&self) -> String {
        format!(
            "projects/{}/databases/{}/documents",
            self.project_id, self.database
        )
    }

    /// Fully qualified resource name of a document.
    pub fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.documents_root(), collection, id)
    }

    fn url(&self, segments: &[&str]) -> Result<Url, AppError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("base URL cannot hold a path".to_string()))?
            .pop_if_empty()
            .extend(["projects", &*self.project_id, "databases", &*self.database])
            .extend(segments);
        Ok(url)
    }

    async fn authorized(
        &self,
        method: reqwest::Method,
        url: Url,
    ) -> Result<reqwest::RequestBuilder, AppError> {
        let token = self.tokens.access_token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Fetches every document in a collection, following pagination.
    pub async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, AppError> {
        let url = self.url(&["documents", collection])?;
        let page_size = self.page_size.to_string();
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .authorized(reqwest::Method::GET, url.clone())
                .await?
                .query(&[("pageSize", page_size.as_str())]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: ListResponse = check(request.send().await?).await?.json().await?;
            tracing::debug!(
                "Fetched page of {} documents from '{}'",
                page.documents.len(),
                collection
            );
            for raw in page.documents {
                documents.push(raw.into_document()?);
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(documents)
    }

    /// Fetches a single document; `None` if it does not exist.
    pub async fn get_document(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, AppError> {
        let url = self.url(&["documents", collection, id])?;
        let response = self
            .authorized(reqwest::Method::GET, url)
            .await?
            .send()
            .await?;

        match check(response).await {
            Ok(response) => {
                let raw: RawDocument = response.json().await?;
                raw.into_document().map(Some)
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Sets one field on an existing document, leaving all others untouched.
    pub async fn patch_field(
        &self,
        collection: &str,
        id: &str,
        field: &str,
        new_value: &JsonValue,
    ) -> Result<(), AppError> {
        let url = self.url(&["documents", collection, id])?;
        let body = json!({ "fields": { field: value::encode_value(new_value) } });
        let response = self
            .authorized(reqwest::Method::PATCH, url)
            .await?
            .query(&[
                ("updateMask.fieldPaths", field),
                ("currentDocument.exists", "true"),
            ])
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    /// Applies all writes in one atomic `documents:commit` request.
    pub async fn commit(&self, writes: &[FieldUpdate]) -> Result<(), AppError> {
        if writes.is_empty() {
            return Ok(());
        }

        let url = self.url(&["documents:commit"])?;
        let body = json!({ "writes": writes.iter().map(|w| self.write_json(w)).collect::<Vec<_>>() });
        let response = self
            .authorized(reqwest::Method::POST, url)
            .await?
            .json(&body)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    fn write_json(&self, write: &FieldUpdate) -> JsonValue {
        json!({
            "update": {
                "name": self.document_name(&write.collection, &write.id),
                "fields": { &write.field: value::encode_value(&write.value) },
            },
            "updateMask": { "fieldPaths": [&write.field] },
            "currentDocument": { "exists": true },
        })
    }
}

/// HTTP client with a per-request timeout.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, AppError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(AppError::from)
}

/// Turns a non-success response into [`AppError::Api`].
async fn check(response: reqwest::Response) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<ApiErrorBody>(&body) {
        Ok(parsed) => match parsed.error.status {
            Some(code) => format!("{}: {}", code, parsed.error.message),
            None => parsed.error.message,
        },
        Err(_) => body,
    };
    Err(AppError::Api {
        status: status.as_u16(),
        message,
    })
}
