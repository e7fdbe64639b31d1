//! Networks and manually reserved addresses.

use super::{ensure_new_name, Inventory};
use crate::error::Result;
use crate::model::usage::ensure_deletable;
use crate::model::Network;
use log::{debug, info};
use std::net::IpAddr;

impl Inventory {
    /// Create a network from a CIDR string such as `10.50.0.0/16`
    pub fn create_network(&self, name: &str, cidr: &str) -> Result<Network> {
        self.transact("create_network", |uow| {
            ensure_new_name::<Network>(uow, name)?;
            let net = Network::new(name, cidr)?;
            uow.save(&net)?;
            info!(
                "Created network '{}' {}/{} with {} free addresses",
                name,
                net.network,
                net.prefix,
                net.freelist.free_count()
            );
            Ok(net)
        })
    }

    pub fn delete_network(&self, name: &str) -> Result<()> {
        self.transact("delete_network", |uow| {
            let net: Network = uow.by_name(name)?;
            ensure_deletable(&net)?;
            uow.remove::<Network>(&net.id);
            info!("Deleted network '{}'", name);
            Ok(())
        })
    }

    /// Take an address out of the pool without assigning it to a node
    pub fn reserve_ip(&self, network: &str, ip: IpAddr) -> Result<u64> {
        self.transact("reserve_ip", |uow| {
            let mut net: Network = uow.by_name(network)?;
            let offset = net.offset_of(ip)?;
            net.reserve(offset)?;
            uow.save(&net)?;
            debug!("Reserved {} (offset {}) on '{}'", ip, offset, network);
            Ok(offset)
        })
    }

    /// Return a manually reserved address to the pool. Addresses held by
    /// nodes are refused.
    pub fn release_ip(&self, network: &str, ip: IpAddr) -> Result<()> {
        self.transact("release_ip", |uow| {
            let mut net: Network = uow.by_name(network)?;
            let offset = net.offset_of(ip)?;
            net.unreserve(offset)?;
            uow.save(&net)?;
            debug!("Released {} (offset {}) on '{}'", ip, offset, network);
            Ok(())
        })
    }

    /// Change the comment of a network
    pub fn set_network_comment(&self, name: &str, comment: &str) -> Result<Network> {
        self.edit("set_network_comment", name, |net: &mut Network| {
            net.comment = comment.to_string();
            Ok(())
        })
    }
}
