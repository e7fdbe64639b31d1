//! Moving a node to another group.
//!
//! Interfaces of the old and new group are matched by name. An address is
//! carried over when both interfaces are bound to the same network for that
//! family; everything else held by the node is released and everything the
//! new group binds is allocated afresh. All releases happen before the first
//! allocation, so an address the move frees can be handed out by the same
//! move.

use super::{allocate_on, release_on, Inventory};
use crate::error::{Error, Result};
use crate::ip::Family;
use crate::model::usage::{link, unlink};
use crate::model::{EntityId, Group, InterfaceId, Node, NodeInterface};
use crate::store::UnitOfWork;
use log::{debug, info};
use std::collections::BTreeMap;

/// What a move does to the node's addresses
#[derive(Debug, Default, PartialEq, Eq)]
struct MigrationPlan {
    /// Offsets to give back, per network
    releases: Vec<(EntityId, u64)>,
    /// New interface records, pre-filled with carried offsets
    records: BTreeMap<InterfaceId, NodeInterface>,
    /// Slots to fill from the bound network
    allocations: Vec<(InterfaceId, Family, EntityId)>,
}

/// Diff the node's current interfaces against the new group's
fn plan(node: &Node, old: &Group, new: &Group) -> MigrationPlan {
    let old_ifs = old.interfaces_by_name();
    let new_ifs = new.interfaces_by_name();
    let mut plan = MigrationPlan::default();

    for (name, old_id) in &old_ifs {
        let old_iface = &old.interfaces[old_id];
        let held = node.interfaces.get(old_id).cloned().unwrap_or_default();
        let successor = new_ifs.get(name).map(|id| (*id, &new.interfaces[id]));

        for family in Family::ALL {
            let (Some(old_net), Some(offset)) = (*old_iface.network.get(family), *held.get(family))
            else {
                continue;
            };
            match successor {
                Some((new_id, new_iface)) if *new_iface.network.get(family) == Some(old_net) => {
                    *plan.records.entry(new_id).or_default().get_mut(family) = Some(offset);
                }
                _ => plan.releases.push((old_net, offset)),
            }
        }
    }

    for new_id in new_ifs.values() {
        let record = plan.records.entry(*new_id).or_default();
        for family in Family::ALL {
            if let Some(net) = *new.interfaces[new_id].network.get(family) {
                if record.get(family).is_none() {
                    plan.allocations.push((*new_id, family, net));
                }
            }
        }
    }
    plan
}

fn migrate(uow: &mut UnitOfWork<'_>, node: &mut Node, old: &mut Group, new: &mut Group) -> Result<()> {
    let MigrationPlan {
        releases,
        mut records,
        allocations,
    } = plan(node, old, new);
    debug!(
        "Moving '{}': {} releases, {} carried interfaces, {} allocations",
        node.name,
        releases.len(),
        records.len(),
        allocations.len()
    );

    for (net, offset) in releases {
        release_on(uow, node, &net, offset)?;
    }
    for (if_id, family, net) in allocations {
        let offset = allocate_on(uow, node, &net)?;
        *records.entry(if_id).or_default().get_mut(family) = Some(offset);
    }

    node.interfaces = records;
    unlink(node, old)?;
    link(node, new);
    node.group = new.id;

    uow.save(old)?;
    uow.save(new)?;
    uow.save(node)
}

impl Inventory {
    /// Move a node to another group.
    ///
    /// Returns `false` and changes nothing when the node already belongs to
    /// the group. Any failure while moving is reported as
    /// [`Error::GroupMigrationFailed`] and leaves the node where it was.
    pub fn set_group(&self, node: &str, group: &str) -> Result<bool> {
        self.transact("set_group", |uow| {
            let mut target: Group = uow.by_name(group)?;
            let mut moving: Node = uow.by_name(node)?;
            if moving.group == target.id {
                return Ok(false);
            }
            let mut current: Group = uow.load(&moving.group)?;

            migrate(uow, &mut moving, &mut current, &mut target).map_err(|source| {
                Error::GroupMigrationFailed {
                    node: moving.name.clone(),
                    group: target.name.clone(),
                    source: Box::new(source),
                }
            })?;
            info!(
                "Moved node '{}' from group '{}' to '{}'",
                moving.name, current.name, target.name
            );
            Ok(true)
        })
    }
}
