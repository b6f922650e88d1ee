use std::fs::{File, OpenOptions};
use std::path::Path;

use async_trait::async_trait;
use ipnet::Ipv4Net;
use macaddr::MacAddr6;
use vm_api::DhcpOptions;

use crate::cidr;
use crate::error::{HostNetError, Result};
use crate::mac;
use crate::types::{Link, LinkKind, Route};
use crate::vif::Vif;

/// Capability surface over the privileged host networking machinery.
///
/// Concrete implementations wrap netlink, iptables/nftables and the in-pod
/// DHCP server; the binding engine only ever talks through this trait, which
/// keeps the privileged surface in one place and lets tests substitute a
/// recording fake. Every operation is a synchronous kernel round-trip on the
/// host side and completes in milliseconds; nothing here is cancelable.
///
/// The address and MAC helpers at the bottom are pure and shared by all
/// implementations.
#[async_trait]
pub trait NetHandler: Send + Sync {
    async fn link_by_name(&self, name: &str) -> Result<Link>;

    async fn link_list(&self) -> Result<Vec<Link>>;

    /// Create a link of `kind` named `name` and return its handle.
    async fn link_add(&self, name: &str, kind: LinkKind) -> Result<Link>;

    async fn link_set_up(&self, link: &Link) -> Result<()>;

    async fn link_set_down(&self, link: &Link) -> Result<()>;

    /// Enslave `link` to the bridge `master`.
    async fn link_set_master(&self, link: &Link, master: &Link) -> Result<()>;

    /// Turn off MAC learning on a bridge port.
    async fn link_set_learning_off(&self, link: &Link) -> Result<()>;

    /// IPv4 addresses currently assigned to `link`.
    async fn addr_list(&self, link: &Link) -> Result<Vec<Ipv4Net>>;

    async fn addr_add(&self, link: &Link, addr: &Ipv4Net) -> Result<()>;

    async fn addr_del(&self, link: &Link, addr: &Ipv4Net) -> Result<()>;

    /// IPv4 routes scoped to `link`.
    async fn route_list(&self, link: &Link) -> Result<Vec<Route>>;

    /// Hardware address currently programmed on the named link.
    async fn mac_by_name(&self, name: &str) -> Result<MacAddr6>;

    /// Replace the link's MAC with a random one; returns the new address.
    async fn set_random_mac(&self, name: &str) -> Result<MacAddr6>;

    /// Launch the in-pod DHCP server advertising `vif`, bound to `bridge`
    /// and replying from `server_addr`. The server runs on its own worker for
    /// the pod's lifetime; only launch failures are reported.
    async fn start_dhcp(
        &self,
        vif: &Vif,
        server_addr: &Ipv4Net,
        bridge: &str,
        options: Option<&DhcpOptions>,
    ) -> Result<()>;

    /// Whether NAT programming goes through iptables (else nftables).
    fn use_iptables(&self) -> bool;

    async fn iptables_new_chain(&self, table: &str, chain: &str) -> Result<()>;

    async fn iptables_append_rule(&self, table: &str, chain: &str, rule: &[&str]) -> Result<()>;

    /// Load a named nftables preamble before programming any rules.
    async fn nftables_load(&self, name: &str) -> Result<()>;

    async fn nftables_new_chain(&self, table: &str, chain: &str) -> Result<()>;

    async fn nftables_append_rule(&self, table: &str, chain: &str, rule: &[&str]) -> Result<()>;

    /// Open `count` read-write descriptors on a queue-capable device node.
    /// Descriptors opened before a failure are closed again.
    fn create_fds(&self, device: &Path, count: usize) -> Result<Vec<File>> {
        let mut fds = Vec::with_capacity(count);
        for _ in 0..count {
            // Dropping the partially filled vec closes the earlier fds.
            fds.push(OpenOptions::new().read(true).write(true).open(device)?);
        }
        Ok(fds)
    }

    /// Parse an `a.b.c.d/len` address.
    fn parse_addr(&self, addr: &str) -> Result<Ipv4Net> {
        addr.parse()
            .map_err(|e: ipnet::AddrParseError| HostNetError::InvalidAddr {
                value: addr.to_string(),
                detail: e.to_string(),
            })
    }

    /// Generate a random locally-administered MAC.
    fn generate_random_mac(&self) -> MacAddr6 {
        mac::random_mac()
    }

    /// Gateway and guest addresses derived from a VM network CIDR.
    fn host_and_gw_from_cidr(&self, cidr: &str) -> Result<(Ipv4Net, Ipv4Net)> {
        cidr::host_and_gw_from_cidr(cidr)
    }
}
