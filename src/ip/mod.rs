//! IP address allocation module.
//!
//! Each network owns a [`Freelist`] of unallocated host offsets. The
//! [`AddressSpace`] of the network turns offsets into concrete IPv4 or IPv6
//! addresses and back.

pub mod address;
pub mod freelist;

// Re-export commonly used types
pub use address::{AddressSpace, Family, FIRST_HOST_OFFSET};
pub use freelist::{Freelist, FreelistError, Range};
