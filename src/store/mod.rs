//! Document store abstraction.
//!
//! The inventory keeps all durable state in keyed collections of JSON
//! documents. Every document carries its identifier in the `_id` field and a
//! store-managed revision used for optimistic concurrency: writes name the
//! revision they were computed from and fail with [`StoreError::Conflict`] if
//! somebody else got there first.
//!
//! ## Key Components
//!
//! - [`DocumentStore`]: the primitives the inventory needs (`find`, `insert`,
//!   conditional `update_one`, `delete`, atomic multi-document `apply`)
//! - [`MemoryStore`]: in-process implementation with optional JSON snapshots
//! - [`UnitOfWork`]: stages reads and writes of one logical operation and
//!   commits them as a single batch

pub mod memory;
pub mod session;

pub use memory::MemoryStore;
pub use session::{transact, RetryPolicy, UnitOfWork};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Field holding the document identifier
pub const ID_FIELD: &str = "_id";

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Revision conflict on {collection}/{id}")]
    Conflict { collection: String, id: String },

    #[error("Duplicate {field} '{value}' in {collection}")]
    DuplicateKey {
        collection: String,
        field: String,
        value: String,
    },

    #[error("Document in {collection} has no string '_id'")]
    MissingId { collection: String },

    #[error("Snapshot I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot is malformed: {0}")]
    Snapshot(#[from] serde_json::Error),
}

/// A document together with its revision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Versioned {
    pub rev: u64,
    pub doc: Value,
}

impl Versioned {
    pub fn id(&self) -> Option<&str> {
        self.doc.get(ID_FIELD).and_then(Value::as_str)
    }
}

/// Equality filter over top-level document fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every document
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::all().and(field, value)
    }

    pub fn by_id(id: impl ToString) -> Self {
        Filter::eq(ID_FIELD, id.to_string())
    }

    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((field.into(), value.into()));
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.conditions
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

/// One write of an atomic batch.
///
/// `expected` is the revision the write was computed from, or `None` when the
/// document must not exist yet. A `doc` of `None` deletes the document.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub collection: String,
    pub id: String,
    pub expected: Option<u64>,
    pub doc: Option<Value>,
}

/// Primitives the inventory requires from its backing store
pub trait DocumentStore: Send + Sync {
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Versioned>>;

    /// Apply every write or none of them
    fn apply(&self, batch: Vec<WriteOp>) -> StoreResult<()>;

    fn find_one(&self, collection: &str, filter: &Filter) -> StoreResult<Option<Versioned>> {
        Ok(self.find(collection, filter)?.into_iter().next())
    }

    fn get(&self, collection: &str, id: &str) -> StoreResult<Option<Versioned>> {
        self.find_one(collection, &Filter::by_id(id))
    }

    /// Insert a new document, generating an `_id` when the document has none
    fn insert(&self, collection: &str, mut doc: Value) -> StoreResult<Versioned> {
        let id = match doc.get(ID_FIELD) {
            Some(Value::String(id)) => id.clone(),
            Some(_) => {
                return Err(StoreError::MissingId {
                    collection: collection.to_string(),
                })
            }
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                match doc.as_object_mut() {
                    Some(fields) => fields.insert(ID_FIELD.to_string(), Value::String(id.clone())),
                    None => {
                        return Err(StoreError::MissingId {
                            collection: collection.to_string(),
                        })
                    }
                };
                id
            }
        };
        self.apply(vec![WriteOp {
            collection: collection.to_string(),
            id,
            expected: None,
            doc: Some(doc.clone()),
        }])?;
        Ok(Versioned { rev: 1, doc })
    }

    /// Replace a document if it is still at `expected_rev`; returns the new revision
    fn update_one(&self, collection: &str, id: &str, expected_rev: u64, doc: Value) -> StoreResult<u64> {
        self.apply(vec![WriteOp {
            collection: collection.to_string(),
            id: id.to_string(),
            expected: Some(expected_rev),
            doc: Some(doc),
        }])?;
        Ok(expected_rev + 1)
    }

    fn delete(&self, collection: &str, id: &str, expected_rev: u64) -> StoreResult<()> {
        self.apply(vec![WriteOp {
            collection: collection.to_string(),
            id: id.to_string(),
            expected: Some(expected_rev),
            doc: None,
        }])
    }
}
