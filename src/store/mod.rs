//! Storage abstraction for backend-agnostic document access.
//!
//! The migration runner only sees [`DocumentStore`] and [`WriteBatch`];
//! the concrete transport is chosen at startup from configuration.
//!
//! # Usage
//!
//! ```ignore
//! use visit_backfill::store::{DocumentStore, WriteBatch};
//!
//! let visits = store.fetch_all("visits").await?;
//! let employee = store.fetch_one("users", "e1").await?;
//!
//! let mut batch = store.batch();
//! batch.update_field("visits", "v1", "adminId", json!("a1"));
//! batch.commit().await?;
//! ```

mod traits;

pub mod backends;

pub use traits::{DocumentStore, WriteBatch};

use serde_json::{Map, Value as JsonValue};

/// A document snapshot: its id within the collection plus decoded fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, JsonValue>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, JsonValue>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Raw field value, if present.
    pub fn get(&self, field: &str) -> Option<&JsonValue> {
        self.fields.get(field)
    }

    /// Field value if it is a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(JsonValue::as_str)
    }

    /// Field value if it is present and truthy (see [`is_truthy`]).
    pub fn get_set(&self, field: &str) -> Option<&JsonValue> {
        self.get(field).filter(|v| is_truthy(v))
    }
}

/// Loose truthiness: null, `false`, zero, and the empty string are unset.
pub fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(_) | JsonValue::Object(_) => true,
    }
}

/// One pending single-field write.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldUpdate {
    pub collection: String,
    pub id: String,
    pub field: String,
    pub value: JsonValue,
}

impl FieldUpdate {
    pub fn new(collection: &str, id: &str, field: &str, value: JsonValue) -> Self {
        Self {
            collection: collection.to_string(),
            id: id.to_string(),
            field: field.to_string(),
            value,
        }
    }
}
