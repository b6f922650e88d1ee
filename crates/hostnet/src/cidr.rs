use std::net::Ipv4Addr;

use ipnet::Ipv4Net;

use crate::error::{HostNetError, Result};

/// Compute the gateway and guest addresses for a VM network CIDR.
///
/// The gateway is the first usable host (network + 1) and the guest sits
/// right behind it (network + 2); both keep the CIDR's prefix length.
pub fn host_and_gw_from_cidr(cidr: &str) -> Result<(Ipv4Net, Ipv4Net)> {
    let net: Ipv4Net = cidr.parse().map_err(|e: ipnet::AddrParseError| {
        HostNetError::InvalidAddr {
            value: cidr.to_string(),
            detail: e.to_string(),
        }
    })?;

    let network = u32::from(net.network());
    let broadcast = u32::from(net.broadcast());
    let Some(guest) = network.checked_add(2) else {
        return Err(HostNetError::CidrTooSmall(cidr.to_string()));
    };
    if guest >= broadcast {
        return Err(HostNetError::CidrTooSmall(cidr.to_string()));
    }

    let prefix = net.prefix_len();
    let gateway = new_net(Ipv4Addr::from(network + 1), prefix, cidr)?;
    let guest = new_net(Ipv4Addr::from(guest), prefix, cidr)?;
    Ok((gateway, guest))
}

fn new_net(addr: Ipv4Addr, prefix: u8, cidr: &str) -> Result<Ipv4Net> {
    Ipv4Net::new(addr, prefix).map_err(|e| HostNetError::InvalidAddr {
        value: cidr.to_string(),
        detail: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_vm_cidr_yields_dot_one_and_dot_two() {
        let (gw, guest) = host_and_gw_from_cidr("10.0.2.0/24").unwrap();
        assert_eq!(gw.to_string(), "10.0.2.1/24");
        assert_eq!(guest.to_string(), "10.0.2.2/24");
    }

    #[test]
    fn slash_30_has_exactly_enough_hosts() {
        let (gw, guest) = host_and_gw_from_cidr("192.168.4.0/30").unwrap();
        assert_eq!(gw.to_string(), "192.168.4.1/30");
        assert_eq!(guest.to_string(), "192.168.4.2/30");
    }

    #[test]
    fn slash_31_is_too_small() {
        assert!(matches!(
            host_and_gw_from_cidr("10.0.0.0/31"),
            Err(HostNetError::CidrTooSmall(_))
        ));
    }

    #[test]
    fn slash_32_is_too_small() {
        assert!(matches!(
            host_and_gw_from_cidr("10.0.0.1/32"),
            Err(HostNetError::CidrTooSmall(_))
        ));
    }

    #[test]
    fn host_bits_are_masked_before_deriving_addresses() {
        let (gw, guest) = host_and_gw_from_cidr("10.0.2.77/24").unwrap();
        assert_eq!(gw.addr(), Ipv4Addr::new(10, 0, 2, 1));
        assert_eq!(guest.addr(), Ipv4Addr::new(10, 0, 2, 2));
    }

    #[test]
    fn garbage_input_is_rejected() {
        assert!(matches!(
            host_and_gw_from_cidr("not-a-cidr"),
            Err(HostNetError::InvalidAddr { .. })
        ));
    }
}
