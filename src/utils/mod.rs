//! Shared utilities: elapsed-time rendering and OS image package queries.

pub mod duration;
pub mod package;

pub use duration::format_elapsed;
pub use package::{PackageInspector, PackageVersion, RpmInspector};
