//! BMC (IPMI) credentials and channels applied during install.

use super::{EntityId, EntityKind, Usage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BmcSetup {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    pub userid: u32,
    pub user: String,
    pub password: String,
    pub netchannel: u32,
    pub mgmtchannel: u32,
    #[serde(default)]
    pub comment: String,
    #[serde(flatten)]
    pub usage: Usage,
}

participant!(BmcSetup, EntityKind::BmcSetup);

impl BmcSetup {
    pub fn new(name: &str) -> Self {
        BmcSetup {
            id: EntityId::new(),
            name: name.to_string(),
            userid: 3,
            user: "ladmin".to_string(),
            password: "ladmin".to_string(),
            netchannel: 1,
            mgmtchannel: 1,
            comment: String::new(),
            usage: Usage::default(),
        }
    }
}
