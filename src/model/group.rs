//! Node groups and their interface templates.

use super::{EntityId, EntityKind, InterfaceId, PerFamily, Usage};
use crate::ip::Family;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default partition script: root lives in tmpfs
pub const DEFAULT_PARTSCRIPT: &str = "mount -t tmpfs tmpfs /sysroot";

/// Default post-install script: fstab entry for the tmpfs root
pub const DEFAULT_POSTSCRIPT: &str =
    "cat << EOF >> /sysroot/etc/fstab\ntmpfs   /       tmpfs    defaults        0 0\nEOF";

/// An interface every node of the group gets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInterface {
    pub name: String,
    /// Network bound per address family
    #[serde(default)]
    pub network: PerFamily<Option<EntityId>>,
    /// Free-text interface options
    #[serde(default)]
    pub params: String,
}

impl GroupInterface {
    pub fn new(name: &str) -> Self {
        GroupInterface {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    pub osimage: EntityId,
    #[serde(default)]
    pub interfaces: BTreeMap<InterfaceId, GroupInterface>,
    #[serde(default)]
    pub bmcsetup: Option<EntityId>,
    /// Network whose name serves as the DNS domain of the nodes
    #[serde(default)]
    pub domain: Option<EntityId>,
    #[serde(default)]
    pub prescript: String,
    #[serde(default)]
    pub partscript: String,
    #[serde(default)]
    pub postscript: String,
    #[serde(default)]
    pub torrent_if: Option<String>,
    #[serde(default)]
    pub comment: String,
    #[serde(flatten)]
    pub usage: Usage,
}

participant!(Group, EntityKind::Group);

impl Group {
    pub fn new(name: &str, osimage: EntityId) -> Self {
        Group {
            id: EntityId::new(),
            name: name.to_string(),
            osimage,
            interfaces: BTreeMap::new(),
            bmcsetup: None,
            domain: None,
            prescript: String::new(),
            partscript: DEFAULT_PARTSCRIPT.to_string(),
            postscript: DEFAULT_POSTSCRIPT.to_string(),
            torrent_if: None,
            comment: String::new(),
            usage: Usage::default(),
        }
    }

    /// Find an interface by name
    pub fn interface(&self, name: &str) -> Option<(&InterfaceId, &GroupInterface)> {
        self.interfaces.iter().find(|(_, iface)| iface.name == name)
    }

    pub fn interface_mut(&mut self, name: &str) -> Option<(InterfaceId, &mut GroupInterface)> {
        self.interfaces
            .iter_mut()
            .find(|(_, iface)| iface.name == name)
            .map(|(id, iface)| (*id, iface))
    }

    /// Interface ids keyed by interface name
    pub fn interfaces_by_name(&self) -> BTreeMap<&str, InterfaceId> {
        self.interfaces
            .iter()
            .map(|(id, iface)| (iface.name.as_str(), *id))
            .collect()
    }

    /// Every (interface, family, network) binding
    pub fn bound_networks(&self) -> Vec<(InterfaceId, Family, EntityId)> {
        self.interfaces
            .iter()
            .flat_map(|(id, iface)| {
                Family::ALL
                    .into_iter()
                    .filter_map(move |f| (*iface.network.get(f)).map(|net| (*id, f, net)))
            })
            .collect()
    }

    /// Add a named interface under a fresh id
    pub fn push_interface(&mut self, name: &str) -> InterfaceId {
        let id = InterfaceId::new();
        self.interfaces.insert(id, GroupInterface::new(name));
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_lookup() {
        let mut group = Group::new("compute", EntityId::new());
        let eth0 = group.push_interface("eth0");
        group.push_interface("BOOTIF");

        assert_eq!(group.interface("eth0").map(|(id, _)| *id), Some(eth0));
        assert!(group.interface("em1").is_none());
        assert_eq!(
            group.interfaces_by_name().keys().copied().collect::<Vec<_>>(),
            vec!["BOOTIF", "eth0"]
        );

        let net = EntityId::new();
        if let Some((_, iface)) = group.interface_mut("eth0") {
            *iface.network.get_mut(Family::V4) = Some(net);
        }
        assert_eq!(group.interfaces[&eth0].network.v4, Some(net));
    }

    #[test]
    fn test_default_scripts() {
        let group = Group::new("compute", EntityId::new());
        assert_eq!(group.partscript, DEFAULT_PARTSCRIPT);
        assert!(group.postscript.starts_with("cat << EOF"));
        assert!(group.prescript.is_empty());
    }
}
