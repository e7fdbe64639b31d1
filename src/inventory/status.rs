//! Provisioning status of nodes.
//!
//! Nodes report dotted step names while they install (`install.download`,
//! `install.unpack`, ...). During the download step the status is enriched
//! with the progress the torrent tracker last saw from the node.

use super::Inventory;
use crate::error::Result;
use crate::model::tracker::{peer_id_for, TRACKER_COLLECTION};
use crate::model::{Node, ProgressSample, StatusRecord};
use crate::store::Filter;
use crate::utils::duration::format_elapsed;
use chrono::Utc;
use log::{debug, warn};
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// Dot separated words of letters, digits, `_` and `-`
static STEP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_-]+(\.[A-Za-z0-9_-]+)*$").expect("valid step regex")
});

/// Step during which tracker progress is reported
const DOWNLOAD_STEP: &str = "install.download";

const ABSOLUTE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Status as shown to operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub status: String,
    /// Elapsed time since the step, or its timestamp
    pub time: String,
}

pub fn is_valid_step(step: &str) -> bool {
    STEP_RE.is_match(step)
}

impl Inventory {
    /// Record a provisioning step. Missing or malformed steps are ignored and
    /// reported as `false`.
    pub fn update_status(&self, node: &str, step: Option<&str>) -> Result<bool> {
        let Some(step) = step.filter(|s| is_valid_step(s)) else {
            warn!("Ignoring invalid status step {:?} for node '{}'", step, node);
            return Ok(false);
        };

        self.edit("update_status", node, |n: &mut Node| {
            n.status = Some(StatusRecord {
                step: step.to_string(),
                time: Utc::now(),
            });
            Ok(())
        })?;
        debug!("Node '{}' reached step '{}'", node, step);
        Ok(true)
    }

    /// Forget the last reported step
    pub fn clear_status(&self, node: &str) -> Result<()> {
        self.edit("clear_status", node, |n: &mut Node| {
            n.status = None;
            Ok(())
        })
        .map(|_| ())
    }

    /// Current status, with download progress while the image is fetched
    pub fn get_status(&self, node: &str, relative: bool) -> Result<Option<NodeStatus>> {
        let node: Node = self.get(node)?;
        let Some(record) = node.status else {
            return Ok(None);
        };
        let now = Utc::now();

        let time = if relative {
            format_elapsed(record.time, now)
        } else {
            record.time.format(ABSOLUTE_TIME_FORMAT).to_string()
        };

        let mut status = record.step.clone();
        if record.step == DOWNLOAD_STEP {
            if let Some(sample) = self.progress_sample(&node.name)? {
                status = format!(
                    "{} ({:.2}% / last update {})",
                    record.step,
                    sample.percent(),
                    format_elapsed(sample.updated, now)
                );
            }
        }
        Ok(Some(NodeStatus { status, time }))
    }

    /// Latest tracker sample announced under the node's peer id. Records the
    /// tracker wrote in a shape we cannot read are skipped.
    fn progress_sample(&self, name: &str) -> Result<Option<ProgressSample>> {
        let filter = Filter::eq("peer_id", peer_id_for(name));
        let samples = self
            .store()
            .find(TRACKER_COLLECTION, &filter)?
            .into_iter()
            .filter_map(|found| match serde_json::from_value::<ProgressSample>(found.doc) {
                Ok(sample) => Some(sample),
                Err(e) => {
                    warn!("Skipping unreadable tracker record for node '{}': {}", name, e);
                    None
                }
            });
        Ok(samples.max_by_key(|s| s.updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    fn setup() -> Inventory {
        let inventory = Inventory::in_memory();
        inventory.init_cluster("/trinity", "root").unwrap();
        inventory.create_osimage("compute", "/os/compute").unwrap();
        inventory.create_group("compute", "compute", &["eth0"]).unwrap();
        inventory.create_node("compute", None).unwrap();
        inventory
    }

    #[test]
    fn test_step_validation() {
        assert!(is_valid_step("status1"));
        assert!(is_valid_step("install.download"));
        assert!(is_valid_step("boot.request-2"));
        assert!(!is_valid_step("#$#%"));
        assert!(!is_valid_step(""));
        assert!(!is_valid_step("install..download"));
        assert!(!is_valid_step(".install"));
    }

    #[test]
    fn test_update_status() {
        let inventory = setup();
        assert!(!inventory.update_status("node001", None).unwrap());
        assert!(!inventory.update_status("node001", Some("#$#%")).unwrap());
        assert!(inventory.get::<Node>("node001").unwrap().status.is_none());

        assert!(inventory.update_status("node001", Some("status1")).unwrap());
        let node: Node = inventory.get("node001").unwrap();
        assert_eq!(node.status.unwrap().step, "status1");

        assert!(matches!(
            inventory.update_status("node999", Some("status1")),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn test_get_status() {
        let inventory = setup();
        assert_eq!(inventory.get_status("node001", true).unwrap(), None);

        inventory.update_status("node001", Some("status1")).unwrap();
        let status = inventory.get_status("node001", true).unwrap().unwrap();
        assert_eq!(status.status, "status1");
        assert!(!status.time.is_empty());

        let absolute = inventory.get_status("node001", false).unwrap().unwrap();
        assert_eq!(absolute.status, "status1");
        assert_eq!(absolute.time.len(), "2024-01-01 00:00:00".len());

        inventory.clear_status("node001").unwrap();
        assert_eq!(inventory.get_status("node001", true).unwrap(), None);
    }

    #[test]
    fn test_download_progress() {
        let inventory = setup();
        inventory.update_status("node001", Some(DOWNLOAD_STEP)).unwrap();
        // no sample yet
        assert_eq!(
            inventory.get_status("node001", true).unwrap().unwrap().status,
            DOWNLOAD_STEP
        );

        inventory
            .store()
            .insert(
                TRACKER_COLLECTION,
                json!({
                    "peer_id": peer_id_for("node001"),
                    "updated": Utc::now(),
                    "downloaded": 2,
                    "left": 1,
                }),
            )
            .unwrap();
        let status = inventory.get_status("node001", true).unwrap().unwrap();
        assert!(status
            .status
            .starts_with("install.download (66.67% / last update "));
    }

    #[test]
    fn test_unreadable_tracker_records_are_skipped() {
        let inventory = setup();
        inventory.update_status("node001", Some(DOWNLOAD_STEP)).unwrap();
        inventory
            .store()
            .insert(
                TRACKER_COLLECTION,
                json!({"peer_id": peer_id_for("node001"), "updated": "garbage", "left": 1}),
            )
            .unwrap();
        assert_eq!(
            inventory.get_status("node001", true).unwrap().unwrap().status,
            DOWNLOAD_STEP
        );

        // zone-less timestamps are read as UTC
        inventory
            .store()
            .insert(
                TRACKER_COLLECTION,
                json!({
                    "peer_id": peer_id_for("node001"),
                    "updated": "2024-01-01T00:00:00",
                    "downloaded": 1,
                    "left": 3,
                }),
            )
            .unwrap();
        let status = inventory.get_status("node001", true).unwrap().unwrap();
        assert!(status
            .status
            .starts_with("install.download (25.00% / last update "));
    }
}
