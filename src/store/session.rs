//! Units of work over a [`DocumentStore`].
//!
//! Operations never write to the store directly. They read documents through
//! a [`UnitOfWork`], which remembers the revision of everything it has seen,
//! stage their changes in it, and commit the whole set as one conditional
//! batch. A failed operation simply drops its unit of work, so nothing it did
//! becomes visible. [`transact`] reruns an operation from scratch when the
//! commit loses a race.

use super::{DocumentStore, Filter, StoreError, StoreResult, WriteOp};
use crate::error::{Error, Result};
use crate::model::{Document, EntityId, Participant};
use log::{debug, warn};
use rand::Rng;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::thread;
use std::time::Duration;

type Key = (&'static str, String);

/// How often and how patiently conflicting commits are retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 16,
            backoff: Duration::from_millis(5),
        }
    }
}

impl RetryPolicy {
    /// Randomised pause before the given attempt, growing linearly
    fn pause(&self, attempt: u32) -> Duration {
        let ceiling = self.backoff.as_micros().saturating_mul(u128::from(attempt));
        let ceiling = u64::try_from(ceiling).unwrap_or(u64::MAX);
        if ceiling == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(rand::thread_rng().gen_range(0..=ceiling))
    }
}

/// Staged reads and writes of one logical operation
pub struct UnitOfWork<'a> {
    store: &'a dyn DocumentStore,
    seen: HashMap<Key, u64>,
    staged: BTreeMap<Key, Option<Value>>,
}

impl<'a> UnitOfWork<'a> {
    pub fn new(store: &'a dyn DocumentStore) -> Self {
        UnitOfWork {
            store,
            seen: HashMap::new(),
            staged: BTreeMap::new(),
        }
    }

    fn key<T: Document>(id: &EntityId) -> Key {
        (T::COLLECTION, id.to_string())
    }

    /// Current view of a document: staged copy first, store otherwise
    pub fn get<T: Document>(&mut self, id: &EntityId) -> Result<Option<T>> {
        let key = Self::key::<T>(id);
        if let Some(staged) = self.staged.get(&key) {
            return match staged {
                Some(doc) => Ok(Some(serde_json::from_value(doc.clone())?)),
                None => Ok(None),
            };
        }

        match self.store.get(T::COLLECTION, &key.1)? {
            Some(found) => {
                self.seen.entry(key).or_insert(found.rev);
                Ok(Some(serde_json::from_value(found.doc)?))
            }
            None => Ok(None),
        }
    }

    /// Like [`get`](Self::get) but a missing document is an error
    pub fn load<T: Participant>(&mut self, id: &EntityId) -> Result<T> {
        self.get(id)?
            .ok_or_else(|| Error::not_found(T::KIND, id))
    }

    /// All documents matching `filter`, staged changes included
    pub fn find<T: Document>(&mut self, filter: &Filter) -> Result<Vec<T>> {
        let mut docs = Vec::new();

        for found in self.store.find(T::COLLECTION, filter)? {
            let Some(id) = found.id().map(str::to_string) else {
                return Err(StoreError::MissingId {
                    collection: T::COLLECTION.to_string(),
                }
                .into());
            };
            let key = (T::COLLECTION, id);
            if self.staged.contains_key(&key) {
                continue;
            }
            self.seen.entry(key).or_insert(found.rev);
            docs.push(serde_json::from_value(found.doc)?);
        }

        for ((collection, _), staged) in &self.staged {
            if let Some(doc) = staged {
                if *collection == T::COLLECTION && filter.matches(doc) {
                    docs.push(serde_json::from_value(doc.clone())?);
                }
            }
        }
        Ok(docs)
    }

    pub fn find_one<T: Document>(&mut self, filter: &Filter) -> Result<Option<T>> {
        Ok(self.find(filter)?.into_iter().next())
    }

    /// Look up a participant by its unique name
    pub fn by_name<T: Participant>(&mut self, name: &str) -> Result<T> {
        self.find_one(&Filter::eq("name", name))?
            .ok_or_else(|| Error::not_found(T::KIND, name))
    }

    pub fn name_taken<T: Participant>(&mut self, name: &str) -> Result<bool> {
        Ok(self.find_one::<T>(&Filter::eq("name", name))?.is_some())
    }

    /// Stage the current state of a document
    pub fn save<T: Document>(&mut self, doc: &T) -> Result<()> {
        let value = serde_json::to_value(doc)?;
        self.staged.insert(Self::key::<T>(doc.id()), Some(value));
        Ok(())
    }

    /// Stage the removal of a document
    pub fn remove<T: Document>(&mut self, id: &EntityId) {
        self.staged.insert(Self::key::<T>(id), None);
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Write every staged change as one conditional batch
    pub fn commit(self) -> StoreResult<()> {
        let UnitOfWork { store, seen, staged } = self;
        let batch: Vec<WriteOp> = staged
            .into_iter()
            .filter_map(|(key, doc)| {
                let expected = seen.get(&key).copied();
                // created and removed within the same unit: nothing to write
                if expected.is_none() && doc.is_none() {
                    return None;
                }
                Some(WriteOp {
                    collection: key.0.to_string(),
                    id: key.1,
                    expected,
                    doc,
                })
            })
            .collect();
        store.apply(batch)
    }
}

/// Run `work` in a fresh unit of work and commit it, retrying on conflicts.
///
/// Errors returned by `work` abort immediately; nothing it staged is written.
pub fn transact<T, F>(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    operation: &str,
    mut work: F,
) -> Result<T>
where
    F: FnMut(&mut UnitOfWork<'_>) -> Result<T>,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
        let mut uow = UnitOfWork::new(store);
        let outcome = work(&mut uow)?;

        match uow.commit() {
            Ok(()) => return Ok(outcome),
            Err(StoreError::Conflict { collection, id }) => {
                debug!(
                    "{}: conflict on {}/{} (attempt {}/{})",
                    operation, collection, id, attempt, attempts
                );
                if attempt < attempts {
                    thread::sleep(policy.pause(attempt));
                }
            }
            Err(StoreError::DuplicateKey { collection, value, .. }) => {
                return Err(Error::already_exists(collection, value));
            }
            Err(e) => return Err(e.into()),
        }
    }

    warn!("{}: giving up after {} conflicting attempts", operation, attempts);
    Err(Error::TransientConflict {
        operation: operation.to_string(),
        attempts,
    })
}
