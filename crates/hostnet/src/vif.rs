use std::fmt;
use std::net::Ipv4Addr;

use ipnet::Ipv4Net;
use macaddr::MacAddr6;

use crate::types::Route;

/// In-memory descriptor of the interface the guest will see.
///
/// Created when a binding strategy is selected, filled during discovery,
/// consumed by prepare/decorate and dropped when the plug call returns. The
/// MAC here is the one the guest uses; after prepare the pod link answers to
/// a different, randomized address.
#[derive(Debug, Clone, Default)]
pub struct Vif {
    /// Pod-side host link name.
    pub name: String,
    pub mac: Option<MacAddr6>,
    /// Address handed to the guest; `None` for layer-2-only interfaces.
    pub ip: Option<Ipv4Net>,
    pub gateway: Option<Ipv4Addr>,
    pub mtu: u16,
    /// Additional routes advertised via DHCP option 121.
    pub routes: Vec<Route>,
}

impl fmt::Display for Vif {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VIF {{ name: {}", self.name)?;
        match self.ip {
            Some(ip) => write!(f, ", ip: {ip}")?,
            None => write!(f, ", ip: -")?,
        }
        match self.mac {
            Some(mac) => write!(f, ", mac: {mac}")?,
            None => write!(f, ", mac: -")?,
        }
        match self.gateway {
            Some(gw) => write!(f, ", gateway: {gw}")?,
            None => write!(f, ", gateway: -")?,
        }
        write!(f, ", mtu: {}, routes: {} }}", self.mtu, self.routes.len())
    }
}
