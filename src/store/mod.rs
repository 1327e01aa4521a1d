//! Remote authoritative store, consumed as an opaque collaborator.

pub mod memory;

use serde_json::Value;
use thiserror::Error;

use crate::error::Transience;
use crate::model::RecordId;

pub use memory::MemoryStore;

/// Row-membership filter: keep rows whose `field` value is one of `values`.
/// The only query shape the sync core needs (restricting a join read to the
/// distinct foreign ids actually referenced).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Filter {
    pub field: String,
    pub values: Vec<String>,
}

impl Filter {
    pub fn field_in(field: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            field: field.into(),
            values,
        }
    }

    pub fn matches(&self, row: &Value) -> bool {
        row.get(&self.field)
            .and_then(Value::as_str)
            .is_some_and(|v| self.values.iter().any(|want| want == v))
    }
}

/// Failure reported by the remote store for a read or write.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct StoreError {
    pub message: String,
    pub transience: Transience,
}

impl StoreError {
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transience: Transience::Permanent,
        }
    }

    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transience: Transience::Retryable,
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            transience: Transience::Unknown,
        }
    }
}

/// Opaque remote store contract. Rows are JSON objects; transport framing is
/// the store's concern, not this core's.
pub trait RemoteStore: Send + Sync {
    fn read(&self, collection: &str, filter: Option<&Filter>) -> Result<Vec<Value>, StoreError>;

    fn insert(&self, collection: &str, record: Value) -> Result<(), StoreError>;

    /// Apply a partial patch to the row with the given id.
    fn update_patch(
        &self,
        collection: &str,
        id: &RecordId,
        patch: Value,
    ) -> Result<(), StoreError>;

    fn delete(&self, collection: &str, id: &RecordId) -> Result<(), StoreError>;
}
