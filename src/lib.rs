//! # Clusterbook - Inventory and provisioning bookkeeping for bare-metal clusters
//!
//! This library keeps the records a PXE provisioning service needs: OS images,
//! node groups with their interface templates, networks with their address
//! freelists, nodes with their addresses, MAC bindings and provisioning status.
//!
//! ## Overview
//!
//! Every entity is a JSON document in a [`store::DocumentStore`]. Operations
//! read and write through a [`store::UnitOfWork`] and commit their changes as
//! one batch, retried on optimistic concurrency conflicts. Entities that
//! depend on each other record the dependency in both directions, so an entity
//! still in use cannot be deleted.
//!
//! ## Key Features
//!
//! - **Address allocation**: per-network freelists of host offsets, IPv4 and IPv6
//! - **Group templates**: interfaces bound to networks, allocated for every node
//! - **Group migration**: addresses carried over where the binding is unchanged
//! - **Boot parameters**: the documents the iPXE and install templates render
//! - **Status tracking**: install steps enriched with torrent download progress
//!
//! ## Architecture
//!
//! - `ip`: address spaces and the offset freelist
//! - `model`: entity documents and the usage ledger
//! - `store`: document store, unit of work and the in-memory snapshot store
//! - `inventory`: the operations, grouped by the entity they manage
//! - `config` / `config_loader`: YAML configuration
//! - `utils`: elapsed-time formatting and image package inspection
//!
//! ## Example Usage
//!
//! ```rust
//! use clusterbook::Inventory;
//!
//! let inventory = Inventory::in_memory();
//! inventory.init_cluster("/trinity", "root")?;
//! inventory.create_osimage("compute", "/trinity/images/compute")?;
//! inventory.create_network("cluster", "10.141.0.0/16")?;
//! inventory.create_group("compute", "compute", &["BOOTIF"])?;
//! inventory.set_net_to_if("compute", "BOOTIF", "cluster")?;
//!
//! let node = inventory.create_node("compute", None)?;
//! assert_eq!(node.name, "node001");
//! # Ok::<(), clusterbook::Error>(())
//! ```

pub mod config;
pub mod config_loader;
pub mod error;
pub mod inventory;
pub mod ip;
pub mod model;
pub mod store;
pub mod utils;

pub use error::{Error, Result};
pub use inventory::Inventory;
