//! Groups, their interfaces and network bindings.
//!
//! A group interface binds at most one network per address family. Binding a
//! network allocates an address for every node already in the group;
//! unbinding gives those addresses back. Adding or removing interface names
//! alone does not allocate anything.

use super::{attach, detach, ensure_new_name, nodes_of, validate_name, Inventory};
use crate::error::{Error, Result};
use crate::ip::Family;
use crate::model::usage::{ensure_deletable, link, unlink};
use crate::model::{BmcSetup, EntityKind, Group, InterfaceId, Network, OsImage};
use crate::store::UnitOfWork;
use log::{debug, info};

const INTERFACE: &str = "interface";

fn interface_id(group: &Group, interface: &str) -> Result<InterfaceId> {
    group
        .interface(interface)
        .map(|(id, _)| *id)
        .ok_or_else(|| Error::not_found("interface", format!("{}/{}", group.name, interface)))
}

/// Release every node allocation on one interface/family and clear the binding
fn unbind_network(
    uow: &mut UnitOfWork<'_>,
    group: &mut Group,
    if_id: InterfaceId,
    family: Family,
) -> Result<()> {
    let Some(net_id) = group
        .interfaces
        .get(&if_id)
        .and_then(|iface| *iface.network.get(family))
    else {
        return Ok(());
    };

    let mut net: Network = uow.load(&net_id)?;
    for mut node in nodes_of(uow, &group.id)? {
        let held = node
            .interfaces
            .get_mut(&if_id)
            .and_then(|slots| slots.get_mut(family).take());
        if let Some(offset) = held {
            net.release(offset)?;
            unlink(&mut node, &mut net)?;
            uow.save(&node)?;
        }
    }
    unlink(group, &mut net)?;
    uow.save(&net)?;

    if let Some(iface) = group.interfaces.get_mut(&if_id) {
        *iface.network.get_mut(family) = None;
    }
    debug!(
        "Unbound network '{}' from {}/{} (IPv{})",
        net.name, group.name, if_id, family
    );
    Ok(())
}

impl Inventory {
    /// Create a group booting `osimage` with the given interface names
    pub fn create_group(&self, name: &str, osimage: &str, interfaces: &[&str]) -> Result<Group> {
        self.transact("create_group", |uow| {
            ensure_new_name::<Group>(uow, name)?;
            let mut image: OsImage = uow.by_name(osimage)?;

            let mut group = Group::new(name, image.id);
            for interface in interfaces {
                validate_name(INTERFACE, interface)?;
                if group.interface(interface).is_some() {
                    return Err(Error::InvalidArgument(format!(
                        "interface '{}' listed twice",
                        interface
                    )));
                }
                group.push_interface(interface);
            }

            link(&mut group, &mut image);
            uow.save(&image)?;
            uow.save(&group)?;
            info!("Created group '{}' with interfaces {:?}", name, interfaces);
            Ok(group)
        })
    }

    /// Delete a group no node belongs to, dropping everything it uses
    pub fn delete_group(&self, name: &str) -> Result<()> {
        self.transact("delete_group", |uow| {
            let mut group: Group = uow.by_name(name)?;
            ensure_deletable(&group)?;

            let osimage = group.osimage;
            detach::<Group, OsImage>(uow, &mut group, &osimage)?;
            if let Some(bmc) = group.bmcsetup {
                detach::<Group, BmcSetup>(uow, &mut group, &bmc)?;
            }
            if let Some(domain) = group.domain {
                detach::<Group, Network>(uow, &mut group, &domain)?;
            }
            for (_, _, net) in group.bound_networks() {
                detach::<Group, Network>(uow, &mut group, &net)?;
            }

            uow.remove::<Group>(&group.id);
            info!("Deleted group '{}'", name);
            Ok(())
        })
    }

    /// Add an interface name; existing nodes get no addresses until a network is bound
    pub fn add_interface(&self, group: &str, interface: &str) -> Result<InterfaceId> {
        self.transact("add_interface", |uow| {
            let mut group: Group = uow.by_name(group)?;
            validate_name(INTERFACE, interface)?;
            if group.interface(interface).is_some() {
                return Err(Error::already_exists(
                    "interface",
                    format!("{}/{}", group.name, interface),
                ));
            }
            let id = group.push_interface(interface);
            uow.save(&group)?;
            Ok(id)
        })
    }

    /// Remove an interface, releasing what nodes hold on it
    pub fn del_interface(&self, group: &str, interface: &str) -> Result<()> {
        self.transact("del_interface", |uow| {
            let mut group: Group = uow.by_name(group)?;
            let if_id = interface_id(&group, interface)?;

            for family in Family::ALL {
                unbind_network(uow, &mut group, if_id, family)?;
            }
            for mut node in nodes_of(uow, &group.id)? {
                if node.interfaces.remove(&if_id).is_some() {
                    uow.save(&node)?;
                }
            }
            group.interfaces.remove(&if_id);
            uow.save(&group)?;
            info!("Removed interface '{}' from group '{}'", interface, group.name);
            Ok(())
        })
    }

    /// Free-text options of a group interface
    pub fn set_interface_params(&self, group: &str, interface: &str, params: &str) -> Result<()> {
        self.edit("set_interface_params", group, |group: &mut Group| {
            let (_, iface) = group.interface_mut(interface).ok_or_else(|| {
                Error::not_found("interface", interface)
            })?;
            iface.params = params.to_string();
            Ok(())
        })
        .map(|_| ())
    }

    /// Bind `network` to an interface and give every node of the group an address on it
    pub fn set_net_to_if(&self, group: &str, interface: &str, network: &str) -> Result<()> {
        self.transact("set_net_to_if", |uow| {
            let mut group: Group = uow.by_name(group)?;
            let mut net: Network = uow.by_name(network)?;
            let family = net.family();
            let if_id = interface_id(&group, interface)?;

            let slot = group
                .interfaces
                .get_mut(&if_id)
                .map(|iface| iface.network.get_mut(family))
                .ok_or_else(|| Error::not_found("interface", interface))?;
            if slot.is_some() {
                return Err(Error::InvalidArgument(format!(
                    "interface '{}' of group '{}' already has an IPv{} network",
                    interface, group.name, family
                )));
            }
            *slot = Some(net.id);
            link(&mut group, &mut net);

            for mut node in nodes_of(uow, &group.id)? {
                let offset = net.allocate()?;
                *node.interfaces.entry(if_id).or_default().get_mut(family) = Some(offset);
                link(&mut node, &mut net);
                uow.save(&node)?;
            }

            uow.save(&net)?;
            uow.save(&group)?;
            info!(
                "Bound network '{}' to {}/{} (IPv{})",
                net.name, group.name, interface, family
            );
            Ok(())
        })
    }

    /// Unbind the network of one family from an interface
    pub fn del_net_from_if(&self, group: &str, interface: &str, family: Family) -> Result<()> {
        self.transact("del_net_from_if", |uow| {
            let mut group: Group = uow.by_name(group)?;
            let if_id = interface_id(&group, interface)?;
            let bound = group
                .interfaces
                .get(&if_id)
                .map_or(false, |iface| iface.network.get(family).is_some());
            if !bound {
                return Err(Error::InvalidArgument(format!(
                    "interface '{}' of group '{}' has no IPv{} network",
                    interface, group.name, family
                )));
            }
            unbind_network(uow, &mut group, if_id, family)?;
            uow.save(&group)
        })
    }

    /// Network whose name is used as the DNS domain of the group's nodes
    pub fn set_domain(&self, group: &str, network: Option<&str>) -> Result<()> {
        self.transact("set_domain", |uow| {
            let mut group: Group = uow.by_name(group)?;
            if let Some(old) = group.domain.take() {
                detach::<Group, Network>(uow, &mut group, &old)?;
            }
            if let Some(network) = network {
                let net: Network = uow.by_name(network)?;
                attach::<Group, Network>(uow, &mut group, &net.id)?;
                group.domain = Some(net.id);
            }
            uow.save(&group)
        })
    }

    pub fn set_bmcsetup(&self, group: &str, bmcsetup: Option<&str>) -> Result<()> {
        self.transact("set_bmcsetup", |uow| {
            let mut group: Group = uow.by_name(group)?;
            if let Some(old) = group.bmcsetup.take() {
                detach::<Group, BmcSetup>(uow, &mut group, &old)?;
            }
            if let Some(bmcsetup) = bmcsetup {
                let bmc: BmcSetup = uow.by_name(bmcsetup)?;
                attach::<Group, BmcSetup>(uow, &mut group, &bmc.id)?;
                group.bmcsetup = Some(bmc.id);
            }
            uow.save(&group)
        })
    }

    /// Change the OS image a group boots
    pub fn set_osimage(&self, group: &str, osimage: &str) -> Result<()> {
        self.transact("set_osimage", |uow| {
            let mut group: Group = uow.by_name(group)?;
            let image: OsImage = uow.by_name(osimage)?;
            let old = group.osimage;
            detach::<Group, OsImage>(uow, &mut group, &old)?;
            attach::<Group, OsImage>(uow, &mut group, &image.id)?;
            group.osimage = image.id;
            uow.save(&group)
        })
    }

    /// Replace the pre-install, partitioning and post-install scripts
    pub fn set_scripts(
        &self,
        group: &str,
        prescript: Option<&str>,
        partscript: Option<&str>,
        postscript: Option<&str>,
    ) -> Result<()> {
        self.edit("set_scripts", group, |group: &mut Group| {
            if let Some(script) = prescript {
                group.prescript = script.to_string();
            }
            if let Some(script) = partscript {
                group.partscript = script.to_string();
            }
            if let Some(script) = postscript {
                group.postscript = script.to_string();
            }
            Ok(())
        })
        .map(|_| ())
    }

    /// Interface the install torrent is served over
    pub fn set_torrent_if(&self, group: &str, interface: Option<&str>) -> Result<()> {
        self.edit("set_torrent_if", group, |group: &mut Group| {
            if let Some(name) = interface {
                interface_id(group, name)?;
            }
            group.torrent_if = interface.map(str::to_string);
            Ok(())
        })
        .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::Range;
    use crate::model::{Node, Participant};

    fn setup() -> Inventory {
        let inventory = Inventory::in_memory();
        inventory.init_cluster("/trinity", "root").unwrap();
        inventory.create_osimage("compute", "/os/compute").unwrap();
        inventory.create_network("cluster", "10.50.0.0/16").unwrap();
        inventory.create_network("ipmi", "10.51.0.0/16").unwrap();
        inventory
    }

    #[test]
    fn test_create_group_links_osimage() {
        let inventory = setup();
        let group = inventory.create_group("compute", "compute", &["eth0"]).unwrap();
        let image: OsImage = inventory.get("compute").unwrap();
        assert_eq!(image.usage.used_by(EntityKind::Group, &group.id), 1);
        assert_eq!(group.interfaces.len(), 1);

        assert!(matches!(
            inventory.create_group("compute", "compute", &[]),
            Err(Error::AlreadyExists { .. })
        ));
        assert!(matches!(
            inventory.create_group("gpu", "missing", &[]),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_set_net_allocates_for_existing_nodes() {
        let inventory = setup();
        inventory.create_group("compute", "compute", &["eth0"]).unwrap();
        inventory.create_node("compute", None).unwrap();
        inventory.create_node("compute", None).unwrap();

        inventory.set_net_to_if("compute", "eth0", "cluster").unwrap();
        let net: Network = inventory.get("cluster").unwrap();
        assert_eq!(net.freelist.ranges(), &[Range::new(4, 65533)]);
        let group: Group = inventory.get("compute").unwrap();
        assert_eq!(net.usage.used_by(EntityKind::Group, &group.id), 1);

        let node: Node = inventory.get("node002").unwrap();
        let (eth0, _) = group.interface("eth0").unwrap();
        assert_eq!(node.interfaces[eth0].v4, Some(3));

        assert!(matches!(
            inventory.set_net_to_if("compute", "eth0", "ipmi"),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_set_net_rolls_back_on_exhaustion() {
        let inventory = setup();
        inventory.create_network("tiny", "10.52.0.0/30").unwrap();
        inventory.create_group("compute", "compute", &["eth0"]).unwrap();
        inventory.create_node("compute", None).unwrap();
        inventory.create_node("compute", None).unwrap();

        assert!(matches!(
            inventory.set_net_to_if("compute", "eth0", "tiny"),
            Err(Error::AddressSpaceExhausted { .. })
        ));

        let net: Network = inventory.get("tiny").unwrap();
        assert_eq!(net.freelist.ranges(), &[Range::new(2, 2)]);
        assert!(!net.usage.is_used());
        assert_eq!(net.usage.users(EntityKind::Node).count(), 0);

        let group: Group = inventory.get("compute").unwrap();
        let (eth0, iface) = group.interface("eth0").unwrap();
        assert_eq!(iface.network.v4, None);
        assert_eq!(group.usage.used(EntityKind::Network).count(), 0);
        for name in ["node001", "node002"] {
            let node: Node = inventory.get(name).unwrap();
            assert_eq!(node.interfaces.get(eth0).and_then(|slots| slots.v4), None);
            assert_eq!(node.usage.used(EntityKind::Network).count(), 0);
        }
    }

    #[test]
    fn test_interface_names_are_validated() {
        let inventory = setup();
        inventory.create_group("compute", "compute", &["eth0"]).unwrap();
        match inventory.add_interface("compute", "eth 1") {
            Err(Error::InvalidArgument(msg)) => assert!(msg.contains("invalid interface name")),
            other => panic!("unexpected {:?}", other),
        }
        match inventory.create_group("gpu", "compute", &["-ib0"]) {
            Err(Error::InvalidArgument(msg)) => assert!(msg.starts_with("invalid interface name")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_del_net_releases_everything() {
        let inventory = setup();
        inventory.create_group("compute", "compute", &["eth0"]).unwrap();
        inventory.set_net_to_if("compute", "eth0", "cluster").unwrap();
        inventory.create_node("compute", None).unwrap();

        inventory.del_net_from_if("compute", "eth0", Family::V4).unwrap();
        let net: Network = inventory.get("cluster").unwrap();
        assert_eq!(net.freelist.ranges(), &[Range::new(2, 65533)]);
        assert!(!net.usage.is_used());

        let node: Node = inventory.get("node001").unwrap();
        assert!(node.allocations().next().is_none());
        assert!(matches!(
            inventory.del_net_from_if("compute", "eth0", Family::V4),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_add_and_del_interface() {
        let inventory = setup();
        inventory.create_group("compute", "compute", &["eth0"]).unwrap();
        inventory.create_node("compute", None).unwrap();

        inventory.add_interface("compute", "BOOTIF").unwrap();
        let node: Node = inventory.get("node001").unwrap();
        assert_eq!(node.interfaces.len(), 1);
        assert!(matches!(
            inventory.add_interface("compute", "BOOTIF"),
            Err(Error::AlreadyExists { .. })
        ));

        inventory.set_net_to_if("compute", "BOOTIF", "ipmi").unwrap();
        inventory.set_interface_params("compute", "BOOTIF", "MTU=9000").unwrap();
        inventory.del_interface("compute", "BOOTIF").unwrap();

        let net: Network = inventory.get("ipmi").unwrap();
        assert_eq!(net.freelist.ranges(), &[Range::new(2, 65533)]);
        assert!(!net.usage.is_used());
        let group: Group = inventory.get("compute").unwrap();
        assert!(group.interface("BOOTIF").is_none());
        let node: Node = inventory.get("node001").unwrap();
        assert_eq!(node.interfaces.len(), 1);
    }

    #[test]
    fn test_domain_and_bmcsetup_links() {
        let inventory = setup();
        inventory.create_bmcsetup("bmc").unwrap();
        let group = inventory.create_group("compute", "compute", &[]).unwrap();

        inventory.set_domain("compute", Some("cluster")).unwrap();
        inventory.set_bmcsetup("compute", Some("bmc")).unwrap();
        let net: Network = inventory.get("cluster").unwrap();
        let bmc: BmcSetup = inventory.get("bmc").unwrap();
        assert_eq!(net.usage.used_by(EntityKind::Group, &group.id), 1);
        assert_eq!(bmc.usage.used_by(EntityKind::Group, &group.id), 1);

        // rebinding the same network keeps a single link
        inventory.set_domain("compute", Some("cluster")).unwrap();
        let net: Network = inventory.get("cluster").unwrap();
        assert_eq!(net.usage.used_by(EntityKind::Group, &group.id), 1);

        inventory.set_domain("compute", None).unwrap();
        inventory.set_bmcsetup("compute", None).unwrap();
        assert!(!inventory.get::<Network>("cluster").unwrap().usage.is_used());
        assert!(!inventory.get::<BmcSetup>("bmc").unwrap().usage.is_used());
    }

    #[test]
    fn test_delete_group_unlinks_everything() {
        let inventory = setup();
        inventory.create_bmcsetup("bmc").unwrap();
        inventory.create_group("compute", "compute", &["eth0", "ib0"]).unwrap();
        inventory.set_net_to_if("compute", "eth0", "cluster").unwrap();
        inventory.set_net_to_if("compute", "ib0", "cluster").unwrap();
        inventory.set_domain("compute", Some("cluster")).unwrap();
        inventory.set_bmcsetup("compute", Some("bmc")).unwrap();

        inventory.create_node("compute", None).unwrap();
        assert!(matches!(
            inventory.delete_group("compute"),
            Err(Error::EntityInUse { kind: EntityKind::Group, .. })
        ));

        inventory.delete_node("node001").unwrap();
        inventory.delete_group("compute").unwrap();
        assert!(!inventory.get::<Network>("cluster").unwrap().usage.is_used());
        assert!(!inventory.get::<OsImage>("compute").unwrap().usage.is_used());
        assert!(!inventory.get::<BmcSetup>("bmc").unwrap().usage.is_used());
    }

    #[test]
    fn test_set_osimage_moves_link() {
        let inventory = setup();
        inventory.create_osimage("gpu", "/os/gpu").unwrap();
        inventory.create_group("compute", "compute", &[]).unwrap();
        inventory.set_osimage("compute", "gpu").unwrap();

        assert!(!inventory.get::<OsImage>("compute").unwrap().usage.is_used());
        assert!(inventory.get::<OsImage>("gpu").unwrap().usage.is_used());
        inventory.delete_osimage("compute").unwrap();
    }

    #[test]
    fn test_scripts_and_torrent_if() {
        let inventory = setup();
        inventory.create_group("compute", "compute", &["eth0"]).unwrap();
        inventory
            .set_scripts("compute", Some("echo pre"), None, Some(""))
            .unwrap();
        inventory.set_torrent_if("compute", Some("eth0")).unwrap();
        assert!(inventory.set_torrent_if("compute", Some("ib0")).is_err());

        let group: Group = inventory.get("compute").unwrap();
        assert_eq!(group.prescript, "echo pre");
        assert_eq!(group.partscript, crate::model::group::DEFAULT_PARTSCRIPT);
        assert!(group.postscript.is_empty());
        assert_eq!(group.torrent_if.as_deref(), Some("eth0"));
        assert_eq!(group.usage.used(EntityKind::OsImage).count(), 1);
        assert_eq!(Group::KIND, EntityKind::Group);
    }
}
