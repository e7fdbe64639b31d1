//! IP networks and their free offset lists.

use super::{EntityId, EntityKind, Usage};
use crate::error::{Error, Result};
use crate::ip::{AddressSpace, Family, Freelist, FreelistError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;

/// A network nodes and switches take addresses from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Network {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    /// Base address, host bits cleared
    pub network: IpAddr,
    pub prefix: u8,
    pub freelist: Freelist,
    /// Offsets taken out of the pool by hand rather than by a node
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub reserved: BTreeSet<u64>,
    #[serde(default)]
    pub comment: String,
    #[serde(flatten)]
    pub usage: Usage,
}

participant!(Network, EntityKind::Network);

impl Network {
    /// A network with a pristine freelist
    pub fn new(name: &str, cidr: &str) -> Result<Self> {
        let space = AddressSpace::parse(cidr)?;
        let (first, last) = space.host_window();
        Ok(Network {
            id: EntityId::new(),
            name: name.to_string(),
            network: space.base(),
            prefix: space.prefix_len(),
            freelist: Freelist::spanning(first, last),
            reserved: BTreeSet::new(),
            comment: String::new(),
            usage: Usage::default(),
        })
    }

    pub fn space(&self) -> Result<AddressSpace> {
        AddressSpace::from_parts(self.network, self.prefix)
    }

    pub fn family(&self) -> Family {
        Family::of(&self.network)
    }

    fn map_freelist_error(&self, err: FreelistError) -> Error {
        match err {
            FreelistError::Exhausted => Error::AddressSpaceExhausted {
                network: self.name.clone(),
            },
            FreelistError::Unavailable(offset) => Error::AddressUnavailable {
                network: self.name.clone(),
                offset,
            },
            FreelistError::DoubleRelease(offset) => Error::DoubleRelease {
                network: self.name.clone(),
                offset,
            },
        }
    }

    /// Take the smallest free offset
    pub fn allocate(&mut self) -> Result<u64> {
        self.freelist
            .allocate()
            .map_err(|e| self.map_freelist_error(e))
    }

    pub fn allocate_specific(&mut self, offset: u64) -> Result<u64> {
        self.freelist
            .allocate_specific(offset)
            .map_err(|e| self.map_freelist_error(e))
    }

    /// Give an offset back. Offsets outside the host window were never handed out.
    pub fn release(&mut self, offset: u64) -> Result<()> {
        if !self.space()?.in_host_window(offset) {
            return Err(Error::AddressUnavailable {
                network: self.name.clone(),
                offset,
            });
        }
        self.freelist
            .release(offset)
            .map_err(|e| self.map_freelist_error(e))
    }

    /// Take a specific offset out of the pool without a node holding it
    pub fn reserve(&mut self, offset: u64) -> Result<u64> {
        self.allocate_specific(offset)?;
        self.reserved.insert(offset);
        Ok(offset)
    }

    /// Return an offset taken by [`reserve`](Self::reserve). Offsets held by
    /// nodes are only given back through the node.
    pub fn unreserve(&mut self, offset: u64) -> Result<()> {
        if !self.reserved.contains(&offset) {
            return Err(if self.freelist.is_free(offset) {
                Error::DoubleRelease {
                    network: self.name.clone(),
                    offset,
                }
            } else {
                Error::AddressUnavailable {
                    network: self.name.clone(),
                    offset,
                }
            });
        }
        self.release(offset)?;
        self.reserved.remove(&offset);
        Ok(())
    }

    pub fn address_of(&self, offset: u64) -> Result<IpAddr> {
        self.space()?.address_of(offset)
    }

    pub fn offset_of(&self, ip: IpAddr) -> Result<u64> {
        self.space()?.offset_of(ip)
    }
}
