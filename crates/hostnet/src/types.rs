use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

/// Kernel link kinds the binding engine distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Physical or otherwise unclassified device.
    Device,
    Veth,
    Bridge,
    Dummy,
    Macvtap,
}

/// Handle to a kernel network link, as observed over netlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub name: String,
    /// Kernel interface index; macvtap links expose their character device at
    /// `/dev/tap<index>`.
    pub index: u32,
    /// Raw MTU as reported by the kernel; discovery validates it into `u16`.
    pub mtu: i32,
    pub kind: LinkKind,
}

/// An IPv4 route scoped to a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    /// Destination network; `None` is the default route.
    pub dst: Option<Ipv4Net>,
    pub gw: Option<Ipv4Addr>,
    pub src: Option<Ipv4Addr>,
}
