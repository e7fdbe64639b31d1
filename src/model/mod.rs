//! Persisted inventory entities.
//!
//! Every entity kind is a plain serde struct stored as one JSON document.
//! Kinds that take part in dependency tracking implement [`Participant`],
//! which exposes their name and their [`Usage`](usage::Usage) ledger.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Implements [`Document`] and [`Participant`] for a struct with `id`, `name`
/// and `usage` fields.
macro_rules! participant {
    ($ty:ty, $kind:expr) => {
        impl $crate::model::Document for $ty {
            const COLLECTION: &'static str = $kind.as_str();

            fn id(&self) -> &$crate::model::EntityId {
                &self.id
            }
        }

        impl $crate::model::Participant for $ty {
            const KIND: $crate::model::EntityKind = $kind;

            fn name(&self) -> &str {
                &self.name
            }

            fn usage(&self) -> &$crate::model::usage::Usage {
                &self.usage
            }

            fn usage_mut(&mut self) -> &mut $crate::model::usage::Usage {
                &mut self.usage
            }
        }
    };
}

pub mod bmcsetup;
pub mod cluster;
pub mod group;
pub mod mac;
pub mod network;
pub mod node;
pub mod osimage;
pub mod switch;
pub mod tracker;
pub mod usage;

pub use bmcsetup::BmcSetup;
pub use cluster::Cluster;
pub use group::{Group, GroupInterface};
pub use mac::MacBinding;
pub use network::Network;
pub use node::{Node, NodeInterface, StatusRecord};
pub use osimage::OsImage;
pub use switch::Switch;
pub use tracker::ProgressSample;
pub use usage::Usage;

/// Kinds of entities that take part in the usage graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Cluster,
    Group,
    Node,
    Network,
    Switch,
    OsImage,
    BmcSetup,
}

impl EntityKind {
    /// Collection name, also used as the key inside usage maps
    pub const fn as_str(self) -> &'static str {
        match self {
            EntityKind::Cluster => "cluster",
            EntityKind::Group => "group",
            EntityKind::Node => "node",
            EntityKind::Network => "network",
            EntityKind::Switch => "switch",
            EntityKind::OsImage => "osimage",
            EntityKind::BmcSetup => "bmcsetup",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable identifier of a document or a group interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(Uuid);

/// Group interfaces are keyed the same way as documents
pub type InterfaceId = EntityId;

impl EntityId {
    pub fn new() -> Self {
        EntityId(Uuid::new_v4())
    }
}

impl Default for EntityId {
    fn default() -> Self {
        EntityId::new()
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for EntityId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(EntityId)
    }
}

/// A value stored as one document of a collection
pub trait Document: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;

    fn id(&self) -> &EntityId;
}

/// A named document that takes part in the usage graph
pub trait Participant: Document {
    const KIND: EntityKind;

    fn name(&self) -> &str;
    fn usage(&self) -> &Usage;
    fn usage_mut(&mut self) -> &mut Usage;
}

/// One value per address family, serialized under the keys `"4"` and `"6"`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerFamily<T> {
    #[serde(rename = "4")]
    pub v4: T,
    #[serde(rename = "6")]
    pub v6: T,
}

impl<T> PerFamily<T> {
    pub fn get(&self, family: crate::ip::Family) -> &T {
        match family {
            crate::ip::Family::V4 => &self.v4,
            crate::ip::Family::V6 => &self.v6,
        }
    }

    pub fn get_mut(&mut self, family: crate::ip::Family) -> &mut T {
        match family {
            crate::ip::Family::V4 => &mut self.v4,
            crate::ip::Family::V6 => &mut self.v6,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::Family;
    use std::collections::BTreeMap;

    #[test]
    fn test_kind_names_match_collections() {
        assert_eq!(serde_json::to_value(EntityKind::OsImage).unwrap(), "osimage");
        assert_eq!(serde_json::to_value(EntityKind::BmcSetup).unwrap(), "bmcsetup");
        assert_eq!(Node::COLLECTION, "node");
        assert_eq!(Network::COLLECTION, "network");
    }

    #[test]
    fn test_kind_and_id_as_map_keys() {
        let id = EntityId::new();
        let mut counts: BTreeMap<EntityKind, BTreeMap<EntityId, u32>> = BTreeMap::new();
        counts.entry(EntityKind::Group).or_default().insert(id, 1);

        let value = serde_json::to_value(&counts).unwrap();
        assert_eq!(value["group"][id.to_string()], 1);

        let back: BTreeMap<EntityKind, BTreeMap<EntityId, u32>> = serde_json::from_value(value).unwrap();
        assert_eq!(back, counts);
    }

    #[test]
    fn test_per_family_layout() {
        let mut slots: PerFamily<Option<u64>> = PerFamily::default();
        *slots.get_mut(Family::V4) = Some(5);
        assert_eq!(
            serde_json::to_value(&slots).unwrap(),
            serde_json::json!({"4": 5, "6": null})
        );
    }
}
