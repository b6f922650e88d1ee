//! Binding strategies, one per guest-facing topology.
//!
//! Each strategy runs the same three-phase pipeline — discover, prepare,
//! decorate — bracketed by a cache lookup and a cache write. The phases are
//! strictly ordered and the ordering inside each phase is load-bearing: the
//! pod link must be down before its MAC changes, tap fds can only be opened
//! once the link is back up, and so on. None of the steps may be reordered
//! even where their results look independent.

mod bridge;
mod macvtap;
mod masquerade;
mod slirp;

use hostnet::{Link, NetHandler, Vif};
use macaddr::MacAddr6;
use vm_api::{BindingMethod, DomainSpec, Interface, InterfaceSpec, NetworkSpec, Vmi};

use crate::cache::InterfaceCache;
use crate::error::{PlugError, Result};
use bridge::BridgeBinding;
use macvtap::MacvtapBinding;
use masquerade::MasqueradeBinding;
use slirp::SlirpBinding;

/// Prefix of the in-pod bridge created in front of the pod interface.
const BRIDGE_PREFIX: &str = "k6t-";

/// Capabilities threaded explicitly through every phase.
pub(crate) struct Ctx<'a> {
    pub handler: &'a dyn NetHandler,
    pub cache: &'a InterfaceCache,
}

/// The selected strategy plus its working state, dispatched per phase.
pub(crate) enum Binding<'d> {
    Bridge(BridgeBinding<'d>),
    Masquerade(MasqueradeBinding<'d>),
    Macvtap(MacvtapBinding<'d>),
    Slirp(SlirpBinding<'d>),
}

impl Binding<'_> {
    /// Replay the decorated fragment from the cache. `true` means the domain
    /// has been mutated and the pipeline must not run.
    pub async fn load_cached(&mut self, ctx: &Ctx<'_>, name: &str) -> Result<bool> {
        match self {
            Binding::Bridge(b) => b.load_cached(ctx, name).await,
            Binding::Masquerade(m) => m.load_cached(ctx, name).await,
            Binding::Macvtap(m) => m.load_cached(ctx, name).await,
            Binding::Slirp(s) => s.load_cached(ctx, name).await,
        }
    }

    pub async fn discover(&mut self, ctx: &Ctx<'_>) -> Result<()> {
        match self {
            Binding::Bridge(b) => b.discover(ctx).await,
            Binding::Masquerade(m) => m.discover(ctx).await,
            Binding::Macvtap(m) => m.discover(ctx).await,
            Binding::Slirp(s) => s.discover(),
        }
    }

    pub async fn prepare(&mut self, ctx: &Ctx<'_>) -> Result<()> {
        match self {
            Binding::Bridge(b) => b.prepare(ctx).await,
            Binding::Masquerade(m) => m.prepare(ctx).await,
            Binding::Macvtap(m) => m.prepare(ctx).await,
            Binding::Slirp(s) => s.prepare(),
        }
    }

    pub fn decorate(&mut self) -> Result<()> {
        match self {
            Binding::Bridge(b) => b.decorate(),
            Binding::Masquerade(m) => m.decorate(),
            Binding::Macvtap(m) => m.decorate(),
            Binding::Slirp(s) => s.decorate(),
        }
    }

    pub async fn write_cache(&self, ctx: &Ctx<'_>, name: &str) -> Result<()> {
        match self {
            Binding::Bridge(b) => b.write_cache(ctx, name).await,
            Binding::Masquerade(m) => m.write_cache(),
            Binding::Macvtap(m) => m.write_cache(ctx, name).await,
            Binding::Slirp(s) => s.write_cache(ctx, name).await,
        }
    }
}

/// Select the binding strategy for an interface and seed its working state.
pub(crate) fn get_binding<'d>(
    vmi: &'d Vmi,
    iface: &'d InterfaceSpec,
    network: &'d NetworkSpec,
    domain: &'d mut DomainSpec,
    pod_iface_name: &str,
) -> Result<Binding<'d>> {
    let slot = find_interface_slot(&domain.devices.interfaces, &iface.name)?;
    let mac = parse_user_mac(iface)?;
    let vif = Vif {
        name: pod_iface_name.to_string(),
        mac,
        ..Vif::default()
    };
    let bridge_name = format!("{BRIDGE_PREFIX}{pod_iface_name}");

    match &iface.binding {
        Some(BindingMethod::Bridge) => Ok(Binding::Bridge(BridgeBinding {
            vmi,
            iface,
            domain,
            vif,
            slot,
            pod_iface_name: pod_iface_name.to_string(),
            bridge_name,
            pod_link: None,
            is_layer2: false,
        })),
        Some(BindingMethod::Masquerade) => Ok(Binding::Masquerade(MasqueradeBinding {
            vmi,
            iface,
            domain,
            vif,
            slot,
            pod_iface_name: pod_iface_name.to_string(),
            bridge_name,
            vm_network_cidr: network.pod.vm_network_cidr.clone(),
            pod_link: None,
            gateway_addr: None,
        })),
        Some(BindingMethod::Macvtap { mode }) => Ok(Binding::Macvtap(MacvtapBinding {
            vmi,
            iface,
            domain,
            vif,
            slot,
            pod_iface_name: pod_iface_name.to_string(),
            source_mode: mode.unwrap_or_default(),
            pod_link: None,
            tap_link: None,
            is_layer2: false,
            tap_fds: Vec::new(),
            vhost_fds: Vec::new(),
        })),
        Some(BindingMethod::Slirp) => Ok(Binding::Slirp(SlirpBinding {
            iface,
            domain,
            slot,
        })),
        Some(BindingMethod::Sriov) | None => Err(PlugError::NotImplemented(iface.name.clone())),
    }
}

fn find_interface_slot(interfaces: &[Interface], name: &str) -> Result<usize> {
    interfaces
        .iter()
        .position(|iface| iface.alias.name == name)
        .ok_or_else(|| PlugError::InterfaceNotFound(name.to_string()))
}

fn parse_user_mac(iface: &InterfaceSpec) -> Result<Option<MacAddr6>> {
    match iface.mac_address.as_deref() {
        None | Some("") => Ok(None),
        Some(s) => s
            .parse::<MacAddr6>()
            .map(Some)
            .map_err(|e| PlugError::InvalidMac {
                value: s.to_string(),
                detail: e.to_string(),
            }),
    }
}

/// Fake link-local address for the in-pod bridge, so the DHCP server has a
/// source address to reply from. The slot index is appended as decimal digits
/// to keep sibling interfaces of one domain distinct.
fn bridge_fake_ip(slot: usize) -> String {
    format!("169.254.75.1{slot}/32")
}

/// Kernel MTU must fit the guest config's `u16`.
fn mtu_from_link(link: &Link) -> Result<u16> {
    if !(0..=65535).contains(&link.mtu) {
        return Err(PlugError::MtuOutOfRange(link.mtu));
    }
    Ok(link.mtu as u16)
}

#[cfg(test)]
mod tests {
    use hostnet::LinkKind;

    use super::*;

    #[test]
    fn bridge_fake_ip_appends_the_slot_index() {
        assert_eq!(bridge_fake_ip(0), "169.254.75.10/32");
        assert_eq!(bridge_fake_ip(1), "169.254.75.11/32");
        assert_eq!(bridge_fake_ip(5), "169.254.75.15/32");
    }

    #[test]
    fn bridge_fake_ips_are_distinct_per_slot() {
        let ips: Vec<_> = (0..8).map(bridge_fake_ip).collect();
        for (i, a) in ips.iter().enumerate() {
            for b in &ips[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn mtu_boundaries_are_inclusive() {
        let mut link = Link {
            name: "eth0".into(),
            index: 1,
            mtu: 0,
            kind: LinkKind::Veth,
        };
        assert_eq!(mtu_from_link(&link).unwrap(), 0);

        link.mtu = 65535;
        assert_eq!(mtu_from_link(&link).unwrap(), 65535);

        link.mtu = 65536;
        assert!(matches!(
            mtu_from_link(&link),
            Err(PlugError::MtuOutOfRange(65536))
        ));

        link.mtu = -1;
        assert!(matches!(
            mtu_from_link(&link),
            Err(PlugError::MtuOutOfRange(-1))
        ));
    }

    #[test]
    fn empty_user_mac_counts_as_unset() {
        let iface = InterfaceSpec {
            name: "default".into(),
            mac_address: Some(String::new()),
            ..InterfaceSpec::default()
        };
        assert!(parse_user_mac(&iface).unwrap().is_none());
    }

    #[test]
    fn malformed_user_mac_is_a_config_error() {
        let iface = InterfaceSpec {
            name: "default".into(),
            mac_address: Some("zz:00".into()),
            ..InterfaceSpec::default()
        };
        assert!(matches!(
            parse_user_mac(&iface),
            Err(PlugError::InvalidMac { .. })
        ));
    }
}
