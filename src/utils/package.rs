//! Kernel package introspection for OS images.
//!
//! Install parameters need the kernel version of the image a group boots
//! (`<version>-<release>.<arch>`). Production reads it from the image's RPM
//! database; tests plug in a fixed answer.

use crate::error::{Error, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

/// Version triple of an installed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageVersion {
    pub version: String,
    pub release: String,
    pub arch: String,
}

impl PackageVersion {
    /// Kernel version string, e.g. `3.10-999-el0.x86_64`
    pub fn kernel_version(&self) -> String {
        format!("{}-{}.{}", self.version, self.release, self.arch)
    }
}

/// Looks up the kernel package installed in an image tree
pub trait PackageInspector: Send + Sync {
    fn kernel_package(&self, image_path: &Path) -> Result<PackageVersion>;
}

/// Queries the RPM database of the image with the `rpm` command
#[derive(Debug, Clone)]
pub struct RpmInspector {
    pub package: String,
}

impl Default for RpmInspector {
    fn default() -> Self {
        RpmInspector {
            package: "kernel".to_string(),
        }
    }
}

impl PackageInspector for RpmInspector {
    fn kernel_package(&self, image_path: &Path) -> Result<PackageVersion> {
        debug!("Querying {} package in {:?}", self.package, image_path);
        let output = Command::new("rpm")
            .arg("--root")
            .arg(image_path)
            .args(["-q", "--queryformat", "%{VERSION} %{RELEASE} %{ARCH}\\n"])
            .arg(&self.package)
            .output()
            .map_err(|e| Error::Package(format!("failed to run rpm: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Package(format!(
                "rpm query for '{}' in {:?} failed: {}",
                self.package,
                image_path,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_query_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// First line of `VERSION RELEASE ARCH` output
fn parse_query_output(stdout: &str) -> Result<PackageVersion> {
    let line = stdout.lines().next().unwrap_or_default();
    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next(), fields.next()) {
        (Some(version), Some(release), Some(arch)) => Ok(PackageVersion {
            version: version.to_string(),
            release: release.to_string(),
            arch: arch.to_string(),
        }),
        _ => Err(Error::Package(format!("unexpected rpm output: '{}'", line))),
    }
}

/// Answers every query with the same version
#[derive(Debug, Clone)]
pub struct StaticInspector(pub PackageVersion);

impl PackageInspector for StaticInspector {
    fn kernel_package(&self, _image_path: &Path) -> Result<PackageVersion> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kernel_version_string() {
        let version = PackageVersion {
            version: "3.10".to_string(),
            release: "999-el0".to_string(),
            arch: "x86_64".to_string(),
        };
        assert_eq!(version.kernel_version(), "3.10-999-el0.x86_64");
    }

    #[test]
    fn test_parse_query_output() {
        let parsed = parse_query_output("3.10.0 1160.el7 x86_64\n3.10.0 957.el7 x86_64\n").unwrap();
        assert_eq!(parsed.kernel_version(), "3.10.0-1160.el7.x86_64");

        assert!(matches!(parse_query_output("garbage\n"), Err(Error::Package(_))));
        assert!(parse_query_output("").is_err());
    }
}
