//! The cluster singleton.

use super::{EntityId, EntityKind, Usage};
use serde::{Deserialize, Serialize};

/// Name of the one cluster document
pub const CLUSTER_NAME: &str = "general";

fn default_node_prefix() -> String {
    "node".to_string()
}

fn default_node_digits() -> usize {
    3
}

fn default_next_node_number() -> u64 {
    1
}

/// Cluster-wide settings. Every node uses the cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    pub path: String,
    pub user: String,
    #[serde(default)]
    pub frontend_address: Option<String>,
    #[serde(default = "default_node_prefix")]
    pub node_prefix: String,
    #[serde(default = "default_node_digits")]
    pub node_digits: usize,
    /// Number the next default node name is derived from
    #[serde(default = "default_next_node_number")]
    pub next_node_number: u64,
    #[serde(default)]
    pub comment: String,
    #[serde(flatten)]
    pub usage: Usage,
}

participant!(Cluster, EntityKind::Cluster);

impl Cluster {
    pub fn new(path: &str, user: &str) -> Self {
        Cluster {
            id: EntityId::new(),
            name: CLUSTER_NAME.to_string(),
            path: path.to_string(),
            user: user.to_string(),
            frontend_address: None,
            node_prefix: default_node_prefix(),
            node_digits: default_node_digits(),
            next_node_number: default_next_node_number(),
            comment: String::new(),
            usage: Usage::default(),
        }
    }

    /// Node name for a counter value, e.g. `node007`
    pub fn format_node_name(&self, number: u64) -> String {
        format!(
            "{}{:0width$}",
            self.node_prefix,
            number,
            width = self.node_digits
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_name_formatting() {
        let mut cluster = Cluster::new("/trinity", "root");
        assert_eq!(cluster.format_node_name(1), "node001");
        assert_eq!(cluster.format_node_name(1234), "node1234");

        cluster.node_prefix = "cn".to_string();
        cluster.node_digits = 5;
        assert_eq!(cluster.format_node_name(42), "cn00042");
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let cluster: Cluster = serde_json::from_value(serde_json::json!({
            "_id": EntityId::new(),
            "name": "general",
            "path": "/trinity",
            "user": "root",
        }))
        .unwrap();
        assert_eq!(cluster.node_prefix, "node");
        assert_eq!(cluster.node_digits, 3);
        assert_eq!(cluster.next_node_number, 1);
        assert!(!cluster.usage.is_used());
    }
}
