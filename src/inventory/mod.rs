//! Inventory operations.
//!
//! [`Inventory`] is the entry point for everything that reads or changes the
//! cluster description. Each mutating operation runs in its own unit of work:
//! it loads the documents it needs, changes them in memory, keeps both sides
//! of every usage link in step, and commits all touched documents at once.
//! Either the whole operation becomes visible or none of it does.
//!
//! ## Operations by area
//!
//! - `references`: cluster, OS images, BMC setups, switches
//! - `networks`: networks and manually reserved addresses
//! - `groups`: groups, their interfaces and network bindings
//! - `nodes`: node creation, deletion, MAC, switch and per-node settings
//! - `migration`: moving a node to another group
//! - `status`: provisioning status and download progress
//! - `params`: boot and install parameters

pub mod groups;
pub mod migration;
pub mod networks;
pub mod nodes;
pub mod params;
pub mod references;
pub mod status;

pub use params::{BootParams, InstallParams};
pub use status::NodeStatus;

use crate::config::{Config, MacPolicy};
use crate::error::{Error, Result};
use crate::model::usage::{link, unlink};
use crate::model::{
    BmcSetup, Cluster, Document, EntityId, EntityKind, Group, MacBinding, Network, Node, OsImage,
    Participant, Switch,
};
use crate::store::{transact, DocumentStore, Filter, MemoryStore, RetryPolicy, UnitOfWork};
use crate::utils::package::{PackageInspector, RpmInspector};
use log::{info, warn};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Entity names: letters, digits, `_`, `-` and `.`, not starting with punctuation
static NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("valid name regex")
});

/// Cluster inventory backed by a document store
pub struct Inventory {
    store: Arc<dyn DocumentStore>,
    retry: RetryPolicy,
    mac_policy: MacPolicy,
    inspector: Box<dyn PackageInspector>,
}

impl Inventory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Inventory {
            store,
            retry: RetryPolicy::default(),
            mac_policy: MacPolicy::default(),
            inspector: Box::new(RpmInspector::default()),
        }
    }

    /// Empty in-memory inventory with the standard unique indexes
    pub fn in_memory() -> Self {
        Inventory::new(Arc::new(with_indexes(MemoryStore::new())))
    }

    /// Inventory over the snapshot file and policies named in `config`
    pub fn open(config: &Config) -> Result<Self> {
        let store = with_indexes(MemoryStore::open(&config.store.path)?);
        info!("Opened inventory at {:?}", config.store.path);
        Ok(Inventory::new(Arc::new(store))
            .with_retry_policy(config.retry_policy())
            .with_mac_policy(config.nodes.mac_policy))
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_mac_policy(mut self, mac_policy: MacPolicy) -> Self {
        self.mac_policy = mac_policy;
        self
    }

    pub fn with_inspector(mut self, inspector: impl PackageInspector + 'static) -> Self {
        self.inspector = Box::new(inspector);
        self
    }

    pub fn store(&self) -> &dyn DocumentStore {
        &*self.store
    }

    /// Run a mutating operation as one committed unit of work
    fn transact<T>(
        &self,
        operation: &str,
        work: impl FnMut(&mut UnitOfWork<'_>) -> Result<T>,
    ) -> Result<T> {
        transact(&*self.store, &self.retry, operation, work)
    }

    /// Run a read-only operation; nothing is ever committed
    fn read<T>(&self, work: impl FnOnce(&mut UnitOfWork<'_>) -> Result<T>) -> Result<T> {
        let mut uow = UnitOfWork::new(&*self.store);
        work(&mut uow)
    }

    /// Load an entity by name
    pub fn get<T: Participant>(&self, name: &str) -> Result<T> {
        self.read(|uow| uow.by_name(name))
    }

    /// Every entity of a kind, ordered by name
    pub fn list<T: Participant>(&self) -> Result<Vec<T>> {
        let mut all: Vec<T> = self.read(|uow| uow.find(&Filter::all()))?;
        all.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(all)
    }

    /// Apply a change to fields no other document depends on
    fn edit<T, F>(&self, operation: &str, name: &str, mut change: F) -> Result<T>
    where
        T: Participant,
        F: FnMut(&mut T) -> Result<()>,
    {
        self.transact(operation, |uow| {
            let mut entity: T = uow.by_name(name)?;
            change(&mut entity)?;
            uow.save(&entity)?;
            Ok(entity)
        })
    }
}

/// Unique constraints the inventory relies on
pub fn with_indexes(store: MemoryStore) -> MemoryStore {
    [
        Cluster::COLLECTION,
        Group::COLLECTION,
        Node::COLLECTION,
        Network::COLLECTION,
        Switch::COLLECTION,
        OsImage::COLLECTION,
        BmcSetup::COLLECTION,
    ]
    .into_iter()
    .fold(store, |store, collection| store.with_unique_index(collection, "name"))
    .with_unique_index(MacBinding::COLLECTION, "mac")
}

/// Check a name; `what` labels it in the error, e.g. `node` or `interface`
fn validate_name(what: impl fmt::Display, name: &str) -> Result<()> {
    if NAME_RE.is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!("invalid {} name '{}'", what, name)))
    }
}

/// Fail if a participant of this kind already carries `name`
fn ensure_new_name<T: Participant>(uow: &mut UnitOfWork<'_>, name: &str) -> Result<()> {
    validate_name(T::KIND, name)?;
    if uow.name_taken::<T>(name)? {
        return Err(Error::already_exists(T::KIND, name));
    }
    Ok(())
}

/// Link `user` to the stored entity `used` and stage the target
fn attach<R: Participant, S: Participant>(
    uow: &mut UnitOfWork<'_>,
    user: &mut R,
    used: &EntityId,
) -> Result<()> {
    let mut target: S = uow.load(used)?;
    link(user, &mut target);
    uow.save(&target)
}

/// Unlink `user` from the stored entity `used` and stage the target
fn detach<R: Participant, S: Participant>(
    uow: &mut UnitOfWork<'_>,
    user: &mut R,
    used: &EntityId,
) -> Result<()> {
    let mut target: S = uow.load(used)?;
    unlink(user, &mut target)?;
    uow.save(&target)
}

/// Take the next free offset of a network for `user` and record the usage
fn allocate_on<R: Participant>(
    uow: &mut UnitOfWork<'_>,
    user: &mut R,
    network: &EntityId,
) -> Result<u64> {
    let mut net: Network = uow.load(network)?;
    let offset = net.allocate().map_err(|e| {
        warn!("{} '{}' cannot get an address: {}", R::KIND, user.name(), e);
        e
    })?;
    link(user, &mut net);
    uow.save(&net)?;
    Ok(offset)
}

/// Give an offset held by `user` back to its network and drop the usage
fn release_on<R: Participant>(
    uow: &mut UnitOfWork<'_>,
    user: &mut R,
    network: &EntityId,
    offset: u64,
) -> Result<()> {
    let mut net: Network = uow.load(network)?;
    net.release(offset)?;
    unlink(user, &mut net)?;
    uow.save(&net)
}

/// All nodes of a group, ordered by name
fn nodes_of(uow: &mut UnitOfWork<'_>, group: &EntityId) -> Result<Vec<Node>> {
    let mut nodes: Vec<Node> = uow.find(&Filter::eq("group", group.to_string()))?;
    nodes.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_name() {
        assert!(validate_name(EntityKind::Node, "node001").is_ok());
        assert!(validate_name(EntityKind::Group, "compute.gpu-a_1").is_ok());
        assert!(validate_name(EntityKind::Node, "").is_err());
        assert!(validate_name(EntityKind::Node, "-node").is_err());
        assert!(validate_name(EntityKind::Node, "node 1").is_err());
    }

    #[test]
    fn test_indexes_reject_duplicate_names() {
        let inventory = Inventory::in_memory();
        inventory.init_cluster("/trinity", "root").unwrap();
        inventory.create_network("cluster", "10.50.0.0/16").unwrap();
        assert!(matches!(
            inventory.create_network("cluster", "10.51.0.0/16"),
            Err(Error::AlreadyExists { .. })
        ));
    }

    #[test]
    fn test_list_sorted_by_name() {
        let inventory = Inventory::in_memory();
        inventory.create_network("ipmi", "10.52.0.0/16").unwrap();
        inventory.create_network("cluster", "10.50.0.0/16").unwrap();

        let names: Vec<String> = inventory
            .list::<Network>()
            .unwrap()
            .into_iter()
            .map(|n| n.name)
            .collect();
        assert_eq!(names, vec!["cluster", "ipmi"]);
    }
}
