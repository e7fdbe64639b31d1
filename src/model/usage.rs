//! Usage graph: who depends on whom.
//!
//! When entity `R` depends on entity `S`, `R` records
//! `_use_[S.kind][S.id] = n` and `S` records the mirror entry
//! `_usedby_[R.kind][R.id] = n`. Both sides are only ever changed together,
//! through [`link`] and [`unlink`]; an entity whose `_usedby_` side is empty
//! may be deleted.

use super::{EntityId, EntityKind, Participant};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

type Counts = BTreeMap<EntityKind, BTreeMap<EntityId, u32>>;

/// Both directions of one entity's usage links
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(rename = "_use_", default)]
    uses: Counts,
    #[serde(rename = "_usedby_", default)]
    used_by: Counts,
}

fn count(map: &Counts, kind: EntityKind, id: &EntityId) -> u32 {
    map.get(&kind)
        .and_then(|ids| ids.get(id))
        .copied()
        .unwrap_or(0)
}

fn increment(map: &mut Counts, kind: EntityKind, id: EntityId) {
    *map.entry(kind).or_default().entry(id).or_insert(0) += 1;
}

fn decrement(map: &mut Counts, kind: EntityKind, id: &EntityId) {
    if let Some(ids) = map.get_mut(&kind) {
        if let Some(n) = ids.get_mut(id) {
            *n -= 1;
            if *n == 0 {
                ids.remove(id);
            }
        }
        if ids.is_empty() {
            map.remove(&kind);
        }
    }
}

impl Usage {
    /// How many times this entity uses `id` of `kind`
    pub fn uses(&self, kind: EntityKind, id: &EntityId) -> u32 {
        count(&self.uses, kind, id)
    }

    /// How many times `id` of `kind` uses this entity
    pub fn used_by(&self, kind: EntityKind, id: &EntityId) -> u32 {
        count(&self.used_by, kind, id)
    }

    /// Entities of `kind` this entity depends on
    pub fn used(&self, kind: EntityKind) -> impl Iterator<Item = (&EntityId, u32)> {
        self.uses
            .get(&kind)
            .into_iter()
            .flat_map(|ids| ids.iter().map(|(id, n)| (id, *n)))
    }

    /// Entities of `kind` that depend on this entity
    pub fn users(&self, kind: EntityKind) -> impl Iterator<Item = (&EntityId, u32)> {
        self.used_by
            .get(&kind)
            .into_iter()
            .flat_map(|ids| ids.iter().map(|(id, n)| (id, *n)))
    }

    pub fn is_used(&self) -> bool {
        !self.used_by.is_empty()
    }

    /// Human-readable summary of dependents, e.g. `node: 3, switch: 1`
    pub fn dependents_summary(&self) -> String {
        self.used_by
            .iter()
            .map(|(kind, ids)| format!("{}: {}", kind, ids.len()))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn describe<T: Participant>(entity: &T) -> String {
    format!("{} '{}'", T::KIND, entity.name())
}

/// Record that `user` depends on `used` once more
pub fn link<R: Participant, S: Participant>(user: &mut R, used: &mut S) {
    let user_id = *user.id();
    let used_id = *used.id();
    increment(&mut user.usage_mut().uses, S::KIND, used_id);
    increment(&mut used.usage_mut().used_by, R::KIND, user_id);
}

/// Drop one dependency of `user` on `used`
pub fn unlink<R: Participant, S: Participant>(user: &mut R, used: &mut S) -> Result<()> {
    let uses = user.usage().uses(S::KIND, used.id());
    let used_by = used.usage().used_by(R::KIND, user.id());

    if uses != used_by {
        return Err(Error::UsageGraphInconsistent {
            from: describe(user),
            to: describe(used),
            uses,
            used_by,
        });
    }
    if uses == 0 {
        return Err(Error::LinkNotFound {
            from: describe(user),
            to: describe(used),
        });
    }

    let user_id = *user.id();
    let used_id = *used.id();
    decrement(&mut user.usage_mut().uses, S::KIND, &used_id);
    decrement(&mut used.usage_mut().used_by, R::KIND, &user_id);
    Ok(())
}

/// An entity may be deleted once nothing uses it
pub fn can_delete<S: Participant>(entity: &S) -> bool {
    !entity.usage().is_used()
}

/// Fail with [`Error::EntityInUse`] unless `entity` can be deleted
pub fn ensure_deletable<S: Participant>(entity: &S) -> Result<()> {
    if can_delete(entity) {
        Ok(())
    } else {
        Err(Error::EntityInUse {
            kind: S::KIND,
            name: entity.name().to_string(),
            dependents: entity.usage().dependents_summary(),
        })
    }
}
