//! Host-side networking capabilities for the pod-to-guest binding engine.
//!
//! Everything privileged goes through the [`NetHandler`] trait: netlink link
//! and address manipulation, firewall programming, tap queue descriptors and
//! the in-pod DHCP server. Concrete handlers live with the launcher binary;
//! this crate only carries the capability surface, the host-side data types
//! and the pure address/MAC helpers that every handler shares.

mod cidr;
mod error;
mod handler;
mod mac;
mod types;
mod vif;

pub use cidr::host_and_gw_from_cidr;
pub use error::{HostNetError, Result};
pub use handler::NetHandler;
pub use mac::random_mac;
pub use types::{Link, LinkKind, Route};
pub use vif::Vif;
