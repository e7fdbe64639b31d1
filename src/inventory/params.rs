//! Boot and install parameters.
//!
//! The assemblers are pure functions over loaded documents; the boot and
//! install templates receive their output unchanged.

use super::Inventory;
use crate::error::Result;
use crate::ip::Family;
use crate::model::{BmcSetup, EntityId, Group, Network, Node, OsImage};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::Path;

/// Interface the node PXE boots from
pub const BOOT_INTERFACE: &str = "BOOTIF";

/// Static address handed to the boot loader
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootNet {
    pub ip: String,
    pub mask: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BootParams {
    pub name: String,
    pub hostname: String,
    pub domain: String,
    pub kernel_file: String,
    pub initrd_file: String,
    pub kern_opts: String,
    pub mac: String,
    pub localboot: bool,
    pub service: bool,
    /// `static` when `net` holds an address, `dhcp` otherwise
    pub bootproto: String,
    pub net: BTreeMap<String, BootNet>,
}

/// One family of an install interface; empty strings when unallocated
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InterfaceAddress {
    pub ip: String,
    pub netmask: String,
    pub prefix: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallInterface {
    pub options: String,
    #[serde(rename = "4")]
    pub v4: InterfaceAddress,
    #[serde(rename = "6")]
    pub v6: InterfaceAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BmcParams {
    pub userid: u32,
    pub user: String,
    pub password: String,
    pub netchannel: u32,
    pub mgmtchannel: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallParams {
    pub name: String,
    pub hostname: String,
    pub domain: String,
    pub mac: String,
    pub setupbmc: bool,
    pub kernver: String,
    pub kernopts: String,
    pub tarball: String,
    pub torrent: String,
    pub torrent_if: String,
    pub prescript: String,
    pub partscript: String,
    pub postscript: String,
    pub interfaces: BTreeMap<String, InstallInterface>,
    /// Serialized as `{}` when the group has no BMC setup
    #[serde(serialize_with = "bmc_or_empty")]
    pub bmcsetup: Option<BmcParams>,
}

fn bmc_or_empty<S: Serializer>(
    bmc: &Option<BmcParams>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match bmc {
        Some(bmc) => bmc.serialize(serializer),
        None => serializer.serialize_map(Some(0))?.end(),
    }
}

/// Everything the assemblers read about one node
#[derive(Debug, Clone, Copy)]
pub struct NodeContext<'a> {
    pub node: &'a Node,
    pub group: &'a Group,
    pub osimage: &'a OsImage,
    pub bmcsetup: Option<&'a BmcSetup>,
    /// Bound networks of the group plus its domain network
    pub networks: &'a BTreeMap<EntityId, Network>,
    pub mac: Option<&'a str>,
}

impl NodeContext<'_> {
    fn domain(&self) -> String {
        self.group
            .domain
            .and_then(|id| self.networks.get(&id))
            .map(|net| net.name.clone())
            .unwrap_or_default()
    }

    fn hostname(&self) -> String {
        match self.domain() {
            domain if domain.is_empty() => self.node.name.clone(),
            domain => format!("{}.{}", self.node.name, domain),
        }
    }

    /// Address of one interface/family as (ip, netmask, prefix)
    fn address(&self, interface: &str, family: Family) -> Result<Option<(String, String, String)>> {
        let Some((if_id, iface)) = self.group.interface(interface) else {
            return Ok(None);
        };
        let offset = self
            .node
            .interfaces
            .get(if_id)
            .and_then(|slots| *slots.get(family));
        let network = (*iface.network.get(family)).and_then(|id| self.networks.get(&id));

        match (offset, network) {
            (Some(offset), Some(net)) => {
                let space = net.space()?;
                Ok(Some((
                    space.address_of(offset)?.to_string(),
                    space.netmask().to_string(),
                    space.prefix_len().to_string(),
                )))
            }
            _ => Ok(None),
        }
    }

    /// Interface names in boot order: `BOOTIF` first, then by name
    fn boot_order(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.group.interfaces_by_name().into_keys().collect();
        names.sort_by_key(|name| (*name != BOOT_INTERFACE, *name));
        names
    }
}

/// Parameters for the iPXE boot script
pub fn boot_params(ctx: &NodeContext<'_>) -> Result<BootParams> {
    let mut net = BTreeMap::new();

    // a static address only makes sense once the node can be recognised by its MAC
    if ctx.mac.is_some() {
        for interface in ctx.boot_order() {
            if let Some((ip, mask, prefix)) = ctx.address(interface, Family::V4)? {
                net.insert(Family::V4.to_string(), BootNet { ip, mask, prefix });
                break;
            }
        }
    }

    Ok(BootParams {
        name: ctx.node.name.clone(),
        hostname: ctx.hostname(),
        domain: ctx.domain(),
        kernel_file: ctx.osimage.kernel_file.clone(),
        initrd_file: ctx.osimage.initrd_file.clone(),
        kern_opts: ctx.osimage.kern_opts.clone(),
        mac: ctx.mac.unwrap_or_default().to_string(),
        localboot: ctx.node.localboot,
        service: ctx.node.service,
        bootproto: if net.is_empty() { "dhcp" } else { "static" }.to_string(),
        net,
    })
}

/// Parameters for the install script
pub fn install_params(ctx: &NodeContext<'_>, kernver: &str) -> Result<InstallParams> {
    let mut interfaces = BTreeMap::new();
    for (name, if_id) in ctx.group.interfaces_by_name() {
        let mut entry = InstallInterface {
            options: ctx.group.interfaces[&if_id].params.clone(),
            v4: InterfaceAddress::default(),
            v6: InterfaceAddress::default(),
        };
        for family in Family::ALL {
            if let Some((ip, netmask, prefix)) = ctx.address(name, family)? {
                let slot = match family {
                    Family::V4 => &mut entry.v4,
                    Family::V6 => &mut entry.v6,
                };
                *slot = InterfaceAddress { ip, netmask, prefix };
            }
        }
        interfaces.insert(name.to_string(), entry);
    }

    Ok(InstallParams {
        name: ctx.node.name.clone(),
        hostname: ctx.hostname(),
        domain: ctx.domain(),
        mac: ctx.mac.unwrap_or_default().to_string(),
        setupbmc: ctx.node.setupbmc,
        kernver: kernver.to_string(),
        kernopts: ctx.osimage.kern_opts.clone(),
        tarball: ctx.osimage.tarball.clone(),
        torrent: ctx.osimage.torrent.clone(),
        torrent_if: ctx.group.torrent_if.clone().unwrap_or_default(),
        prescript: ctx.group.prescript.clone(),
        partscript: ctx.group.partscript.clone(),
        postscript: ctx.group.postscript.clone(),
        interfaces,
        bmcsetup: ctx.bmcsetup.map(|bmc| BmcParams {
            userid: bmc.userid,
            user: bmc.user.clone(),
            password: bmc.password.clone(),
            netchannel: bmc.netchannel,
            mgmtchannel: bmc.mgmtchannel,
        }),
    })
}

/// Documents loaded for one node
struct Loaded {
    node: Node,
    group: Group,
    osimage: OsImage,
    bmcsetup: Option<BmcSetup>,
    networks: BTreeMap<EntityId, Network>,
    mac: Option<String>,
}

impl Loaded {
    fn context(&self) -> NodeContext<'_> {
        NodeContext {
            node: &self.node,
            group: &self.group,
            osimage: &self.osimage,
            bmcsetup: self.bmcsetup.as_ref(),
            networks: &self.networks,
            mac: self.mac.as_deref(),
        }
    }
}

impl Inventory {
    fn load_for_params(&self, name: &str) -> Result<Loaded> {
        let mac = self.get_mac(name)?;
        self.read(|uow| {
            let node: Node = uow.by_name(name)?;
            let group: Group = uow.load(&node.group)?;
            let osimage: OsImage = uow.load(&group.osimage)?;
            let bmcsetup = match group.bmcsetup {
                Some(id) => Some(uow.load::<BmcSetup>(&id)?),
                None => None,
            };

            let mut networks = BTreeMap::new();
            let ids = group
                .bound_networks()
                .into_iter()
                .map(|(_, _, net)| net)
                .chain(group.domain);
            for id in ids {
                if !networks.contains_key(&id) {
                    networks.insert(id, uow.load::<Network>(&id)?);
                }
            }

            Ok(Loaded {
                node,
                group,
                osimage,
                bmcsetup,
                networks,
                mac,
            })
        })
    }

    pub fn boot_params(&self, node: &str) -> Result<BootParams> {
        let loaded = self.load_for_params(node)?;
        boot_params(&loaded.context())
    }

    /// Install parameters; the kernel version comes from the image unless overridden
    pub fn install_params(&self, node: &str) -> Result<InstallParams> {
        let loaded = self.load_for_params(node)?;
        let kernver = match &loaded.osimage.kernel_version {
            Some(version) => version.clone(),
            None => self
                .inspector
                .kernel_package(Path::new(&loaded.osimage.path))?
                .kernel_version(),
        };
        install_params(&loaded.context(), &kernver)
    }
}
