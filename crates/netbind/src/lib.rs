//! Pod-to-guest network binding.
//!
//! A VM booting inside a pod has to take over the pod's single
//! CNI-provisioned interface. Depending on the interface spec, the pod link
//! is rebound into one of four guest-facing topologies and the matching
//! hypervisor device fragment is written into the domain:
//!
//! ```text
//!  bridge                          masquerade
//!  ┌─────────────────────┐         ┌──────────────────────────┐
//!  │  guest ── k6t-eth0  │         │  guest ── k6t-eth0       │
//!  │            │        │         │   10.0.2.2   │ 10.0.2.1  │
//!  │           eth0      │         │        k6t-eth0-nic      │
//!  │  (MAC/IP → guest)   │         │            NAT → eth0    │
//!  └─────────────────────┘         └──────────────────────────┘
//!
//!  macvtap                         slirp
//!  ┌─────────────────────┐         ┌──────────────────────────┐
//!  │  guest ← /dev/tapN  │         │  guest ← user-space net  │
//!  │           │         │         │  (qemu args only)        │
//!  │          eth0       │         └──────────────────────────┘
//!  └─────────────────────┘
//! ```
//!
//! The kernel mutations are privileged, order-sensitive and have no rollback,
//! so [`plug`] caches its decorated output per interface name: re-invocation
//! after a crash replays the domain mutation from the cache instead of
//! touching the kernel again.

mod bind;
mod cache;
mod error;
mod nat;
mod plug;
mod routes;

pub use cache::{CacheError, InterfaceCache};
pub use error::{PlugError, Result};
pub use plug::plug;
