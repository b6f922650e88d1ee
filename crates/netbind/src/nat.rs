use std::net::Ipv4Addr;

use hostnet::NetHandler;
use vm_api::PortSpec;

/// Firewall chain scoping DNAT rules for guest-bound traffic.
const PREINBOUND_CHAIN: &str = "KUBEVIRT_PREINBOUND";
/// Firewall chain scoping SNAT rules for guest-originated replies.
const POSTINBOUND_CHAIN: &str = "KUBEVIRT_POSTINBOUND";
/// nftables preamble loaded before any rule programming.
const NFT_IPV4_NAT: &str = "ipv4-nat";

const NAT_TABLE: &str = "nat";

/// The NAT rule program for one masquerade interface.
///
/// Guest traffic leaves through the pod link masqueraded as the pod; inbound
/// pod traffic is DNATed to the guest address. When ports are declared, each
/// one additionally gets an SNAT back to the gateway (so replies to
/// host-local clients are rewritten) and a loopback DNAT (so host-local
/// clients reach the guest via 127.0.0.1).
pub(crate) struct NatRules<'a> {
    pub pod_iface: &'a str,
    pub bridge: &'a str,
    /// Guest address, DNAT target.
    pub vif_ip: Ipv4Addr,
    /// Bridge gateway address, SNAT source for host-local clients.
    pub gateway: Ipv4Addr,
    pub ports: &'a [PortSpec],
}

impl NatRules<'_> {
    pub async fn apply(&self, handler: &dyn NetHandler) -> hostnet::Result<()> {
        if handler.use_iptables() {
            self.apply_iptables(handler).await
        } else {
            self.apply_nftables(handler).await
        }
    }

    async fn apply_iptables(&self, h: &dyn NetHandler) -> hostnet::Result<()> {
        h.iptables_new_chain(NAT_TABLE, PREINBOUND_CHAIN).await?;
        h.iptables_new_chain(NAT_TABLE, POSTINBOUND_CHAIN).await?;

        let vif_ip = self.vif_ip.to_string();
        let gateway = self.gateway.to_string();

        h.iptables_append_rule(NAT_TABLE, "POSTROUTING", &["-s", &vif_ip, "-j", "MASQUERADE"])
            .await?;
        h.iptables_append_rule(
            NAT_TABLE,
            "PREROUTING",
            &["-i", self.pod_iface, "-j", PREINBOUND_CHAIN],
        )
        .await?;
        h.iptables_append_rule(
            NAT_TABLE,
            "POSTROUTING",
            &["-o", self.bridge, "-j", POSTINBOUND_CHAIN],
        )
        .await?;

        if self.ports.is_empty() {
            return h
                .iptables_append_rule(
                    NAT_TABLE,
                    PREINBOUND_CHAIN,
                    &["-j", "DNAT", "--to-destination", &vif_ip],
                )
                .await;
        }

        for port in self.ports {
            let proto = protocol(port);
            let dport = port.port.to_string();

            h.iptables_append_rule(
                NAT_TABLE,
                POSTINBOUND_CHAIN,
                &["-p", &proto, "--dport", &dport, "-j", "SNAT", "--to-source", &gateway],
            )
            .await?;

            h.iptables_append_rule(
                NAT_TABLE,
                PREINBOUND_CHAIN,
                &["-p", &proto, "--dport", &dport, "-j", "DNAT", "--to-destination", &vif_ip],
            )
            .await?;

            h.iptables_append_rule(
                NAT_TABLE,
                "OUTPUT",
                &[
                    "-p",
                    &proto,
                    "--dport",
                    &dport,
                    "--destination",
                    "127.0.0.1",
                    "-j",
                    "DNAT",
                    "--to-destination",
                    &vif_ip,
                ],
            )
            .await?;
        }

        Ok(())
    }

    async fn apply_nftables(&self, h: &dyn NetHandler) -> hostnet::Result<()> {
        h.nftables_load(NFT_IPV4_NAT).await?;

        h.nftables_new_chain(NAT_TABLE, PREINBOUND_CHAIN).await?;
        h.nftables_new_chain(NAT_TABLE, POSTINBOUND_CHAIN).await?;

        let vif_ip = self.vif_ip.to_string();
        let gateway = self.gateway.to_string();

        h.nftables_append_rule(
            NAT_TABLE,
            "postrouting",
            &["ip", "saddr", &vif_ip, "counter", "masquerade"],
        )
        .await?;
        h.nftables_append_rule(
            NAT_TABLE,
            "prerouting",
            &["iifname", self.pod_iface, "counter", "jump", PREINBOUND_CHAIN],
        )
        .await?;
        h.nftables_append_rule(
            NAT_TABLE,
            "postrouting",
            &["oifname", self.bridge, "counter", "jump", POSTINBOUND_CHAIN],
        )
        .await?;

        if self.ports.is_empty() {
            return h
                .nftables_append_rule(
                    NAT_TABLE,
                    PREINBOUND_CHAIN,
                    &["counter", "dnat", "to", &vif_ip],
                )
                .await;
        }

        for port in self.ports {
            let proto = protocol(port);
            let dport = port.port.to_string();

            h.nftables_append_rule(
                NAT_TABLE,
                POSTINBOUND_CHAIN,
                &[&proto, "dport", &dport, "counter", "snat", "to", &gateway],
            )
            .await?;

            h.nftables_append_rule(
                NAT_TABLE,
                PREINBOUND_CHAIN,
                &[&proto, "dport", &dport, "counter", "dnat", "to", &vif_ip],
            )
            .await?;

            h.nftables_append_rule(
                NAT_TABLE,
                "output",
                &[
                    "ip",
                    "daddr",
                    "127.0.0.1",
                    &proto,
                    "dport",
                    &dport,
                    "counter",
                    "dnat",
                    "to",
                    &vif_ip,
                ],
            )
            .await?;
        }

        Ok(())
    }
}

fn protocol(port: &PortSpec) -> String {
    port.protocol.as_deref().unwrap_or("tcp").to_lowercase()
}
