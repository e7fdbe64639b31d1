//! Nodes and their per-interface allocations.

use super::{EntityId, EntityKind, InterfaceId, PerFamily, Usage};
use crate::ip::Family;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Offsets a node holds on one group interface, per family
pub type NodeInterface = PerFamily<Option<u64>>;

/// Last provisioning step a node reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub step: String,
    pub time: DateTime<Utc>,
}

fn default_setupbmc() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    pub group: EntityId,
    /// Keyed by the id of the matching group interface
    #[serde(default)]
    pub interfaces: BTreeMap<InterfaceId, NodeInterface>,
    #[serde(default)]
    pub switch: Option<EntityId>,
    #[serde(default)]
    pub port: Option<u32>,
    #[serde(default)]
    pub localboot: bool,
    #[serde(default = "default_setupbmc")]
    pub setupbmc: bool,
    #[serde(default)]
    pub service: bool,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub status: Option<StatusRecord>,
    #[serde(flatten)]
    pub usage: Usage,
}

participant!(Node, EntityKind::Node);

impl Node {
    pub fn new(name: &str, group: EntityId) -> Self {
        Node {
            id: EntityId::new(),
            name: name.to_string(),
            group,
            interfaces: BTreeMap::new(),
            switch: None,
            port: None,
            localboot: false,
            setupbmc: default_setupbmc(),
            service: false,
            comment: String::new(),
            status: None,
            usage: Usage::default(),
        }
    }

    /// Every (interface, offset) pair held on any family
    pub fn allocations(&self) -> impl Iterator<Item = (InterfaceId, Family, u64)> + '_ {
        self.interfaces.iter().flat_map(|(id, slots)| {
            Family::ALL
                .into_iter()
                .filter_map(move |family| (*slots.get(family)).map(|offset| (*id, family, offset)))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_node_flags() {
        let node = Node::new("node001", EntityId::new());
        assert!(!node.localboot);
        assert!(node.setupbmc);
        assert!(!node.service);
        assert!(node.status.is_none());
    }

    #[test]
    fn test_allocations() {
        let mut node = Node::new("node001", EntityId::new());
        let eth0 = InterfaceId::new();
        let ib0 = InterfaceId::new();
        node.interfaces.insert(eth0, PerFamily { v4: Some(5), v6: Some(9) });
        node.interfaces.insert(ib0, PerFamily::default());

        let mut held: Vec<_> = node.allocations().collect();
        held.sort();
        assert_eq!(held, vec![(eth0, Family::V4, 5), (eth0, Family::V6, 9)]);
    }

    #[test]
    fn test_interfaces_layout() {
        let mut node = Node::new("node001", EntityId::new());
        let eth0 = InterfaceId::new();
        node.interfaces.insert(eth0, PerFamily { v4: Some(2), v6: None });

        let doc = serde_json::to_value(&node).unwrap();
        assert_eq!(doc["interfaces"][eth0.to_string()], json!({"4": 2, "6": null}));
    }
}
