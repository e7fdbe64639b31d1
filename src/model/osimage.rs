//! OS images groups boot and install from.

use super::{EntityId, EntityKind, Usage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OsImage {
    #[serde(rename = "_id")]
    pub id: EntityId,
    pub name: String,
    /// Root of the image tree
    pub path: String,
    /// Overrides the version read from the image's kernel package
    #[serde(default)]
    pub kernel_version: Option<String>,
    #[serde(default)]
    pub kernel_file: String,
    #[serde(default)]
    pub initrd_file: String,
    #[serde(default)]
    pub kern_opts: String,
    #[serde(default)]
    pub tarball: String,
    #[serde(default)]
    pub torrent: String,
    #[serde(default)]
    pub comment: String,
    #[serde(flatten)]
    pub usage: Usage,
}

participant!(OsImage, EntityKind::OsImage);

impl OsImage {
    pub fn new(name: &str, path: &str) -> Self {
        OsImage {
            id: EntityId::new(),
            name: name.to_string(),
            path: path.to_string(),
            kernel_version: None,
            kernel_file: String::new(),
            initrd_file: String::new(),
            kern_opts: String::new(),
            tarball: String::new(),
            torrent: String::new(),
            comment: String::new(),
            usage: Usage::default(),
        }
    }
}
