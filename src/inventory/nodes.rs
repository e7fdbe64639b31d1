//! Node creation, deletion and per-node settings.

use super::{allocate_on, attach, detach, ensure_new_name, release_on, Inventory};
use crate::config::MacPolicy;
use crate::error::{Error, Result};
use crate::ip::Family;
use crate::model::cluster::CLUSTER_NAME;
use crate::model::mac::normalize_mac;
use crate::model::usage::{ensure_deletable, link};
use crate::model::{
    Cluster, EntityId, Group, InterfaceId, MacBinding, Network, Node, NodeInterface, Switch,
};
use crate::store::{Filter, UnitOfWork};
use log::{debug, info};
use std::net::IpAddr;

/// Next free default name; advances the cluster's counter past taken names
fn next_node_name(uow: &mut UnitOfWork<'_>, cluster: &mut Cluster) -> Result<String> {
    loop {
        let candidate = cluster.format_node_name(cluster.next_node_number);
        cluster.next_node_number += 1;
        if !uow.name_taken::<Node>(&candidate)? {
            return Ok(candidate);
        }
        debug!("Default node name '{}' is taken, skipping", candidate);
    }
}

fn mac_bindings(uow: &mut UnitOfWork<'_>, node: &EntityId) -> Result<Vec<MacBinding>> {
    uow.find(&Filter::eq("node", node.to_string()))
}

/// Network bound to a group interface for one family
fn bound_network(group: &Group, if_id: &InterfaceId, family: Family) -> Option<EntityId> {
    group
        .interfaces
        .get(if_id)
        .and_then(|iface| *iface.network.get(family))
}

impl Inventory {
    /// Create a node in `group`, allocating an address on every bound network.
    ///
    /// Without a name the node is called after the cluster's node counter,
    /// e.g. `node001`.
    pub fn create_node(&self, group: &str, name: Option<&str>) -> Result<Node> {
        self.transact("create_node", |uow| {
            let mut group: Group = uow.by_name(group)?;
            let mut cluster: Cluster = uow.by_name(CLUSTER_NAME)?;

            let name = match name {
                Some(name) => {
                    ensure_new_name::<Node>(uow, name)?;
                    name.to_string()
                }
                None => next_node_name(uow, &mut cluster)?,
            };

            let mut node = Node::new(&name, group.id);
            for (if_id, iface) in &group.interfaces {
                let mut slots = NodeInterface::default();
                for family in Family::ALL {
                    if let Some(net) = iface.network.get(family) {
                        *slots.get_mut(family) = Some(allocate_on(uow, &mut node, net)?);
                    }
                }
                node.interfaces.insert(*if_id, slots);
            }

            link(&mut node, &mut cluster);
            link(&mut node, &mut group);
            uow.save(&cluster)?;
            uow.save(&group)?;
            uow.save(&node)?;
            info!("Created node '{}' in group '{}'", node.name, group.name);
            Ok(node)
        })
    }

    /// Delete a node, returning its addresses and dropping its MAC binding
    pub fn delete_node(&self, name: &str) -> Result<()> {
        self.transact("delete_node", |uow| {
            let mut node: Node = uow.by_name(name)?;
            ensure_deletable(&node)?;
            let group: Group = uow.load(&node.group)?;

            let held: Vec<_> = node.allocations().collect();
            for (if_id, family, offset) in held {
                let net = bound_network(&group, &if_id, family).ok_or_else(|| {
                    Error::not_found("interface", format!("{}/{}", group.name, if_id))
                })?;
                release_on(uow, &mut node, &net, offset)?;
            }

            detach::<Node, Group>(uow, &mut node, &group.id)?;
            let cluster: Cluster = uow.by_name(CLUSTER_NAME)?;
            detach::<Node, Cluster>(uow, &mut node, &cluster.id)?;
            if let Some(switch) = node.switch {
                detach::<Node, Switch>(uow, &mut node, &switch)?;
            }
            for binding in mac_bindings(uow, &node.id)? {
                uow.remove::<MacBinding>(&binding.id);
            }

            uow.remove::<Node>(&node.id);
            info!("Deleted node '{}'", name);
            Ok(())
        })
    }

    /// Bind a MAC address to a node; an empty string clears it
    pub fn set_mac(&self, node: &str, mac: &str) -> Result<()> {
        self.transact("set_mac", |uow| {
            let node: Node = uow.by_name(node)?;
            let current = mac_bindings(uow, &node.id)?;

            if mac.trim().is_empty() {
                for binding in current {
                    uow.remove::<MacBinding>(&binding.id);
                }
                return Ok(());
            }

            let mac = normalize_mac(mac)
                .ok_or_else(|| Error::InvalidArgument(format!("invalid MAC address '{}'", mac)))?;

            if let Some(holder) = uow.find_one::<MacBinding>(&Filter::eq("mac", mac.as_str()))? {
                if holder.node == node.id {
                    return Ok(());
                }
                let previous: Node = uow.load(&holder.node)?;
                match self.mac_policy {
                    MacPolicy::Reject => {
                        return Err(Error::DuplicateMac {
                            mac,
                            node: previous.name,
                        })
                    }
                    MacPolicy::Reassign => {
                        info!("Moving MAC {} from '{}' to '{}'", mac, previous.name, node.name);
                        uow.remove::<MacBinding>(&holder.id);
                    }
                }
            }

            for binding in current {
                uow.remove::<MacBinding>(&binding.id);
            }
            uow.save(&MacBinding::new(&mac, node.id))
        })
    }

    pub fn get_mac(&self, node: &str) -> Result<Option<String>> {
        self.read(|uow| {
            let node: Node = uow.by_name(node)?;
            Ok(mac_bindings(uow, &node.id)?.into_iter().next().map(|b| b.mac))
        })
    }

    /// Cable a node to a switch port, or disconnect it with `None`
    pub fn set_switch(&self, node: &str, switch: Option<&str>, port: Option<u32>) -> Result<()> {
        self.transact("set_switch", |uow| {
            let mut node: Node = uow.by_name(node)?;
            if let Some(old) = node.switch.take() {
                detach::<Node, Switch>(uow, &mut node, &old)?;
            }
            node.port = None;

            if let Some(switch) = switch {
                let target: Switch = uow.by_name(switch)?;
                attach::<Node, Switch>(uow, &mut node, &target.id)?;
                node.switch = Some(target.id);
                node.port = port;
            }
            uow.save(&node)
        })
    }

    /// Pin the address of a node interface, returning the old one to the pool
    pub fn set_node_ip(&self, node: &str, interface: &str, ip: IpAddr) -> Result<()> {
        self.transact("set_node_ip", |uow| {
            let mut node: Node = uow.by_name(node)?;
            let group: Group = uow.load(&node.group)?;
            let if_id = group
                .interface(interface)
                .map(|(id, _)| *id)
                .ok_or_else(|| Error::not_found("interface", interface))?;
            let family = Family::of(&ip);
            let net_id = bound_network(&group, &if_id, family).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "interface '{}' has no IPv{} network",
                    interface, family
                ))
            })?;

            let mut net: Network = uow.load(&net_id)?;
            let offset = net.offset_of(ip)?;
            let current = node
                .interfaces
                .get(&if_id)
                .and_then(|slots| *slots.get(family));
            if current == Some(offset) {
                return Ok(());
            }

            if let Some(old) = current {
                net.release(old)?;
            }
            net.allocate_specific(offset)?;
            if current.is_none() {
                link(&mut node, &mut net);
            }
            *node.interfaces.entry(if_id).or_default().get_mut(family) = Some(offset);

            uow.save(&net)?;
            uow.save(&node)?;
            debug!("Node '{}' {} is now {}", node.name, interface, ip);
            Ok(())
        })
    }

    /// Address of a node interface, if one is allocated
    pub fn node_ip(&self, node: &str, interface: &str, family: Family) -> Result<Option<IpAddr>> {
        self.read(|uow| {
            let node: Node = uow.by_name(node)?;
            let group: Group = uow.load(&node.group)?;
            let Some((if_id, _)) = group.interface(interface) else {
                return Err(Error::not_found("interface", interface));
            };
            let offset = node.interfaces.get(if_id).and_then(|slots| *slots.get(family));
            match (offset, bound_network(&group, if_id, family)) {
                (Some(offset), Some(net)) => {
                    let net: Network = uow.load(&net)?;
                    Ok(Some(net.address_of(offset)?))
                }
                _ => Ok(None),
            }
        })
    }

    pub fn set_localboot(&self, node: &str, value: bool) -> Result<()> {
        self.edit("set_localboot", node, |n: &mut Node| {
            n.localboot = value;
            Ok(())
        })
        .map(|_| ())
    }

    pub fn set_setupbmc(&self, node: &str, value: bool) -> Result<()> {
        self.edit("set_setupbmc", node, |n: &mut Node| {
            n.setupbmc = value;
            Ok(())
        })
        .map(|_| ())
    }

    pub fn set_service(&self, node: &str, value: bool) -> Result<()> {
        self.edit("set_service", node, |n: &mut Node| {
            n.service = value;
            Ok(())
        })
        .map(|_| ())
    }

    pub fn set_comment(&self, node: &str, comment: &str) -> Result<()> {
        self.edit("set_comment", node, |n: &mut Node| {
            n.comment = comment.to_string();
            Ok(())
        })
        .map(|_| ())
    }
}
