//! Managed switches nodes are cabled to.

use super::{EntityId, EntityKind, Usage};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Switch {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    pub network: EntityId,
    pub ip: IpAddr,
    /// SNMP read community
    pub read: String,
    /// SNMP write community
    pub rw: String,
    /// OID of the forwarding table
    pub oid: String,
    #[serde(default)]
    pub comment: String,
    #[serde(flatten)]
    pub usage: Usage,
}

participant!(Switch, EntityKind::Switch);

impl Switch {
    pub fn new(name: &str, network: EntityId, ip: IpAddr) -> Self {
        Switch {
            id: EntityId::new(),
            name: name.to_string(),
            network,
            ip,
            read: "public".to_string(),
            rw: "private".to_string(),
            oid: ".1.3.6.1.2.1.17.7.1.2.2.1.2".to_string(),
            comment: String::new(),
            usage: Usage::default(),
        }
    }
}
