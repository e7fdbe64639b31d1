//! Error types for inventory operations.

use crate::model::EntityKind;
use crate::store::StoreError;

/// Result type for inventory operations
pub type Result<T> = std::result::Result<T, Error>;

/// Inventory errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Address allocation
    #[error("Address space of network '{network}' is exhausted")]
    AddressSpaceExhausted { network: String },

    #[error("Offset {offset} is not available in network '{network}'")]
    AddressUnavailable { network: String, offset: u64 },

    #[error("Offset {offset} of network '{network}' is already free")]
    DoubleRelease { network: String, offset: u64 },

    // Usage graph
    #[error("No usage link from {from} to {to}")]
    LinkNotFound { from: String, to: String },

    #[error("Usage graph is inconsistent between {from} and {to}: {uses} != {used_by}")]
    UsageGraphInconsistent {
        from: String,
        to: String,
        uses: u32,
        used_by: u32,
    },

    #[error("{kind} '{name}' is still in use by: {dependents}")]
    EntityInUse {
        kind: EntityKind,
        name: String,
        dependents: String,
    },

    // Node lifecycle
    #[error("Failed to move node '{node}' to group '{group}': {source}")]
    GroupMigrationFailed {
        node: String,
        group: String,
        #[source]
        source: Box<Error>,
    },

    #[error("MAC {mac} is already bound to node '{node}'")]
    DuplicateMac { mac: String, node: String },

    // Lookup
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} '{name}' already exists")]
    AlreadyExists { kind: String, name: String },

    // Input
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    // Infrastructure
    #[error("Gave up after {attempts} conflicting attempts to commit '{operation}'")]
    TransientConflict { operation: String, attempts: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Malformed document: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Package introspection failed: {0}")]
    Package(String),
}

impl Error {
    pub fn not_found(kind: impl ToString, name: impl ToString) -> Self {
        Error::NotFound {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    pub fn already_exists(kind: impl ToString, name: impl ToString) -> Self {
        Error::AlreadyExists {
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }
}
