//! MAC address bindings.
//!
//! Bindings live in their own collection so the store can keep `mac` unique.

use super::{Document, EntityId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacBinding {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub mac: String,
    pub node: EntityId,
}

impl Document for MacBinding {
    const COLLECTION: &'static str = "mac";

    fn id(&self) -> &EntityId {
        &self.id
    }
}

impl MacBinding {
    pub fn new(mac: &str, node: EntityId) -> Self {
        MacBinding {
            id: EntityId::new(),
            mac: mac.to_string(),
            node,
        }
    }
}

/// Lower-case, colon separated form of a MAC address, or `None` if malformed
pub fn normalize_mac(mac: &str) -> Option<String> {
    let parts: Vec<&str> = mac.trim().split(|c| c == ':' || c == '-').collect();
    let valid = parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()));
    valid.then(|| parts.join(":").to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mac() {
        assert_eq!(
            normalize_mac("00:1A:2b:3C:4d:5E").as_deref(),
            Some("00:1a:2b:3c:4d:5e")
        );
        assert_eq!(
            normalize_mac("00-11-22-33-44-55").as_deref(),
            Some("00:11:22:33:44:55")
        );
        assert!(normalize_mac("00:11:22:33:44").is_none());
        assert!(normalize_mac("zz:11:22:33:44:55").is_none());
    }
}
