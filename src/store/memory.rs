//! In-process document store.
//!
//! Collections live behind a single mutex, which makes every batch atomic.
//! When opened with a snapshot path, each committed batch is written to a
//! JSON file before it becomes visible, so a restarted process sees exactly
//! the committed state.

use super::{DocumentStore, Filter, StoreError, StoreResult, Versioned, WriteOp};
use log::{debug, info};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

type Collections = BTreeMap<String, BTreeMap<String, Versioned>>;

/// Unique constraint on a top-level field of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
struct UniqueIndex {
    collection: String,
    field: String,
}

/// Mutex-guarded map of collections
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<Collections>,
    unique: Vec<UniqueIndex>,
    snapshot: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Open a store backed by a JSON snapshot file. A missing file starts empty.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let state = if path.exists() {
            let content = fs::read_to_string(path)?;
            let collections: Collections = serde_json::from_str(&content)?;
            info!(
                "Loaded {} documents from snapshot {:?}",
                collections.values().map(BTreeMap::len).sum::<usize>(),
                path
            );
            collections
        } else {
            info!("Snapshot {:?} does not exist yet, starting with an empty store", path);
            Collections::new()
        };

        Ok(MemoryStore {
            state: Mutex::new(state),
            unique: Vec::new(),
            snapshot: Some(path.to_path_buf()),
        })
    }

    /// Require `field` to be unique across `collection`
    pub fn with_unique_index(mut self, collection: &str, field: &str) -> Self {
        self.unique.push(UniqueIndex {
            collection: collection.to_string(),
            field: field.to_string(),
        });
        self
    }

    fn lock(&self) -> MutexGuard<'_, Collections> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_revisions(state: &Collections, batch: &[WriteOp]) -> StoreResult<()> {
        for op in batch {
            let current = state
                .get(&op.collection)
                .and_then(|docs| docs.get(&op.id))
                .map(|v| v.rev);
            if current != op.expected {
                debug!(
                    "Conflict on {}/{}: expected {:?}, found {:?}",
                    op.collection, op.id, op.expected, current
                );
                return Err(StoreError::Conflict {
                    collection: op.collection.clone(),
                    id: op.id.clone(),
                });
            }
        }
        Ok(())
    }

    fn check_unique(&self, state: &Collections, batch: &[WriteOp]) -> StoreResult<()> {
        for index in &self.unique {
            let touched: Vec<&WriteOp> = batch
                .iter()
                .filter(|op| op.collection == index.collection)
                .collect();
            let mut seen: Vec<&Value> = Vec::new();

            for op in &touched {
                let Some(value) = op.doc.as_ref().and_then(|d| d.get(&index.field)) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }

                let clashes_in_batch = seen.contains(&value);
                seen.push(value);
                let clashes_in_store = state
                    .get(&index.collection)
                    .map_or(false, |docs| {
                        docs.iter().any(|(id, existing)| {
                            existing.doc.get(&index.field) == Some(value)
                                && !touched.iter().any(|t| &t.id == id)
                        })
                    });

                if clashes_in_batch || clashes_in_store {
                    return Err(StoreError::DuplicateKey {
                        collection: index.collection.clone(),
                        field: index.field.clone(),
                        value: value.as_str().map_or_else(|| value.to_string(), str::to_string),
                    });
                }
            }
        }
        Ok(())
    }

    fn write_ops(state: &mut Collections, batch: Vec<WriteOp>) {
        for op in batch {
            let docs = state.entry(op.collection).or_default();
            match op.doc {
                Some(doc) => {
                    let rev = op.expected.map_or(1, |r| r + 1);
                    docs.insert(op.id, Versioned { rev, doc });
                }
                None => {
                    docs.remove(&op.id);
                }
            }
        }
    }

    fn write_snapshot(path: &Path, state: &Collections) -> StoreResult<()> {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_string_pretty(state)?)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    fn find(&self, collection: &str, filter: &Filter) -> StoreResult<Vec<Versioned>> {
        let state = self.lock();
        Ok(state
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|v| filter.matches(&v.doc))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn apply(&self, batch: Vec<WriteOp>) -> StoreResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut state = self.lock();
        Self::check_revisions(&state, &batch)?;
        self.check_unique(&state, &batch)?;

        match &self.snapshot {
            Some(path) => {
                let mut next = state.clone();
                Self::write_ops(&mut next, batch);
                Self::write_snapshot(path, &next)?;
                *state = next;
            }
            None => Self::write_ops(&mut state, batch),
        }
        Ok(())
    }
}
