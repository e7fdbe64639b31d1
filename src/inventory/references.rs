//! Cluster, OS images, BMC setups and switches.
//!
//! These are the entities other documents point at. They are created
//! explicitly and can only be deleted once nothing uses them.

use super::{detach, ensure_new_name, Inventory};
use crate::error::{Error, Result};
use crate::model::cluster::CLUSTER_NAME;
use crate::model::usage::{ensure_deletable, link};
use crate::model::{BmcSetup, Cluster, Network, OsImage, Participant, Switch};
use log::info;
use std::net::IpAddr;

impl Inventory {
    /// Create the cluster singleton
    pub fn init_cluster(&self, path: &str, user: &str) -> Result<Cluster> {
        self.transact("init_cluster", |uow| {
            if uow.name_taken::<Cluster>(CLUSTER_NAME)? {
                return Err(Error::already_exists(Cluster::KIND, CLUSTER_NAME));
            }
            let cluster = Cluster::new(path, user);
            uow.save(&cluster)?;
            info!("Initialised cluster at {} for user {}", path, user);
            Ok(cluster)
        })
    }

    pub fn cluster(&self) -> Result<Cluster> {
        self.get(CLUSTER_NAME)
    }

    /// Change cluster settings that nothing else depends on
    pub fn update_cluster(&self, change: impl FnMut(&mut Cluster) -> Result<()>) -> Result<Cluster> {
        self.edit("update_cluster", CLUSTER_NAME, change)
    }

    pub fn create_osimage(&self, name: &str, path: &str) -> Result<OsImage> {
        self.transact("create_osimage", |uow| {
            ensure_new_name::<OsImage>(uow, name)?;
            let image = OsImage::new(name, path);
            uow.save(&image)?;
            info!("Created osimage '{}' at {}", name, path);
            Ok(image)
        })
    }

    /// Change image files, kernel options or the kernel version override
    pub fn update_osimage(
        &self,
        name: &str,
        change: impl FnMut(&mut OsImage) -> Result<()>,
    ) -> Result<OsImage> {
        self.edit("update_osimage", name, change)
    }

    pub fn delete_osimage(&self, name: &str) -> Result<()> {
        self.transact("delete_osimage", |uow| {
            let image: OsImage = uow.by_name(name)?;
            ensure_deletable(&image)?;
            uow.remove::<OsImage>(&image.id);
            Ok(())
        })
    }

    pub fn create_bmcsetup(&self, name: &str) -> Result<BmcSetup> {
        self.transact("create_bmcsetup", |uow| {
            ensure_new_name::<BmcSetup>(uow, name)?;
            let bmc = BmcSetup::new(name);
            uow.save(&bmc)?;
            Ok(bmc)
        })
    }

    pub fn update_bmcsetup(
        &self,
        name: &str,
        change: impl FnMut(&mut BmcSetup) -> Result<()>,
    ) -> Result<BmcSetup> {
        self.edit("update_bmcsetup", name, change)
    }

    pub fn delete_bmcsetup(&self, name: &str) -> Result<()> {
        self.transact("delete_bmcsetup", |uow| {
            let bmc: BmcSetup = uow.by_name(name)?;
            ensure_deletable(&bmc)?;
            uow.remove::<BmcSetup>(&bmc.id);
            Ok(())
        })
    }

    /// Register a switch reachable at `ip` on `network`
    pub fn create_switch(&self, name: &str, network: &str, ip: IpAddr) -> Result<Switch> {
        self.transact("create_switch", |uow| {
            ensure_new_name::<Switch>(uow, name)?;
            let mut net: Network = uow.by_name(network)?;
            // the address must belong to the network, it is not allocated from it
            net.offset_of(ip)?;

            let mut switch = Switch::new(name, net.id, ip);
            link(&mut switch, &mut net);
            uow.save(&net)?;
            uow.save(&switch)?;
            info!("Created switch '{}' at {} on network '{}'", name, ip, network);
            Ok(switch)
        })
    }

    /// Change SNMP settings or the comment of a switch
    pub fn update_switch(
        &self,
        name: &str,
        mut change: impl FnMut(&mut Switch) -> Result<()>,
    ) -> Result<Switch> {
        self.edit("update_switch", name, |switch: &mut Switch| {
            let network = switch.network;
            change(switch)?;
            if switch.network != network {
                return Err(Error::InvalidArgument(
                    "the network of a switch cannot be changed".to_string(),
                ));
            }
            Ok(())
        })
    }

    pub fn delete_switch(&self, name: &str) -> Result<()> {
        self.transact("delete_switch", |uow| {
            let mut switch: Switch = uow.by_name(name)?;
            ensure_deletable(&switch)?;
            let network = switch.network;
            detach::<Switch, Network>(uow, &mut switch, &network)?;
            uow.remove::<Switch>(&switch.id);
            info!("Deleted switch '{}'", name);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityKind;

    #[test]
    fn test_cluster_singleton() {
        let inventory = Inventory::in_memory();
        inventory.init_cluster("/trinity", "root").unwrap();
        assert!(matches!(
            inventory.init_cluster("/trinity", "root"),
            Err(Error::AlreadyExists { .. })
        ));

        let cluster = inventory
            .update_cluster(|c| {
                c.frontend_address = Some("10.50.255.254".to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(inventory.cluster().unwrap(), cluster);
    }

    #[test]
    fn test_switch_uses_network() {
        let inventory = Inventory::in_memory();
        inventory.create_network("ipmi", "10.52.0.0/16").unwrap();
        let switch = inventory
            .create_switch("sw01", "ipmi", "10.52.255.1".parse().unwrap())
            .unwrap();

        let net: Network = inventory.get("ipmi").unwrap();
        assert_eq!(net.usage.used_by(EntityKind::Switch, &switch.id), 1);
        assert!(matches!(
            inventory.delete_network("ipmi"),
            Err(Error::EntityInUse { .. })
        ));

        inventory.delete_switch("sw01").unwrap();
        inventory.delete_network("ipmi").unwrap();
    }

    #[test]
    fn test_switch_address_must_be_in_network() {
        let inventory = Inventory::in_memory();
        inventory.create_network("ipmi", "10.52.0.0/16").unwrap();
        assert!(inventory
            .create_switch("sw01", "ipmi", "192.168.0.1".parse().unwrap())
            .is_err());
        assert!(inventory.get::<Switch>("sw01").is_err());
    }

    #[test]
    fn test_switch_network_is_fixed() {
        let inventory = Inventory::in_memory();
        inventory.create_network("ipmi", "10.52.0.0/16").unwrap();
        inventory
            .create_switch("sw01", "ipmi", "10.52.255.1".parse().unwrap())
            .unwrap();

        let updated = inventory
            .update_switch("sw01", |s| {
                s.rw = "secret".to_string();
                Ok(())
            })
            .unwrap();
        assert_eq!(updated.rw, "secret");

        let moved = inventory.update_switch("sw01", |s| {
            s.network = crate::model::EntityId::new();
            Ok(())
        });
        assert!(matches!(moved, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_osimage_lifecycle() {
        let inventory = Inventory::in_memory();
        inventory.create_osimage("compute", "/os/compute").unwrap();
        let image = inventory
            .update_osimage("compute", |img| {
                img.kernel_version = Some("3.10-999-el0.x86_64".to_string());
                Ok(())
            })
            .unwrap();
        assert_eq!(image.kernel_version.as_deref(), Some("3.10-999-el0.x86_64"));

        inventory.delete_osimage("compute").unwrap();
        assert!(matches!(
            inventory.get::<OsImage>("compute"),
            Err(Error::NotFound { .. })
        ));
    }
}
