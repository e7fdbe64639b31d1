//! Download progress samples published by the torrent tracker.
//!
//! The tracker writes these into its own collection; the inventory only reads
//! them.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt::Write;

/// Collection the tracker publishes into
pub const TRACKER_COLLECTION: &str = "tracker";

/// Width node names are padded to when forming a peer id
const PEER_ID_WIDTH: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSample {
    pub peer_id: String,
    /// The tracker may write timestamps without a zone; those are UTC
    #[serde(deserialize_with = "utc_or_naive")]
    pub updated: DateTime<Utc>,
    pub downloaded: u64,
    pub left: u64,
}

/// Formats accepted for timestamps that carry no zone
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

fn utc_or_naive<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    if let Ok(time) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(time.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(&raw, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

impl ProgressSample {
    /// Downloaded share in percent, 0 when nothing is known yet
    pub fn percent(&self) -> f64 {
        let total = self.downloaded.saturating_add(self.left);
        if total == 0 {
            return 0.0;
        }
        self.downloaded as f64 / total as f64 * 100.0
    }
}

/// Peer id a node announces itself with: its name right-aligned in 20
/// characters, hex encoded
pub fn peer_id_for(name: &str) -> String {
    let padded = format!("{:>width$}", name, width = PEER_ID_WIDTH);
    padded.bytes().fold(String::new(), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_id_for() {
        let id = peer_id_for("node001");
        assert_eq!(id.len(), 40);
        // 13 spaces then "node001"
        assert!(id.starts_with(&"20".repeat(13)));
        assert!(id.ends_with("6e6f6465303031"));
    }

    #[test]
    fn test_updated_without_zone() {
        let sample: ProgressSample = serde_json::from_value(serde_json::json!({
            "peer_id": peer_id_for("node001"),
            "updated": "2024-01-01T00:00:00",
            "downloaded": 1,
            "left": 1,
        }))
        .unwrap();
        assert_eq!(sample.updated.to_rfc3339(), "2024-01-01T00:00:00+00:00");

        let zoned: ProgressSample = serde_json::from_value(serde_json::json!({
            "peer_id": "x",
            "updated": "2024-01-01T02:00:00+02:00",
            "downloaded": 0,
            "left": 0,
        }))
        .unwrap();
        assert_eq!(zoned.updated, sample.updated);

        assert!(serde_json::from_value::<ProgressSample>(serde_json::json!({
            "peer_id": "x",
            "updated": "yesterday",
            "downloaded": 0,
            "left": 0,
        }))
        .is_err());
    }

    #[test]
    fn test_percent() {
        let mut sample = ProgressSample {
            peer_id: peer_id_for("node001"),
            updated: Utc::now(),
            downloaded: 0,
            left: 0,
        };
        assert_eq!(sample.percent(), 0.0);

        sample.downloaded = 1;
        sample.left = 3;
        assert_eq!(sample.percent(), 25.0);
    }
}
