use hostnet::{Link, LinkKind, Vif};
use ipnet::Ipv4Net;
use tracing::{error, info};
use vm_api::{DEFAULT_VM_CIDR, DomainSpec, InterfaceSpec, MacAddress, Mtu, Vmi};

use super::{Ctx, mtu_from_link};
use crate::error::{PlugError, Result};
use crate::nat::NatRules;

/// Masquerade: the pod link is left untouched. A dummy link anchors a new
/// in-pod bridge holding a private gateway address; guest traffic crosses the
/// bridge and is NATed out the pod link, so the guest lives in its own CIDR
/// behind the pod's address.
pub(crate) struct MasqueradeBinding<'d> {
    pub vmi: &'d Vmi,
    pub iface: &'d InterfaceSpec,
    pub domain: &'d mut DomainSpec,
    pub vif: Vif,
    pub slot: usize,
    pub pod_iface_name: String,
    pub bridge_name: String,
    pub vm_network_cidr: Option<String>,
    pub pod_link: Option<Link>,
    pub gateway_addr: Option<Ipv4Net>,
}

impl MasqueradeBinding<'_> {
    pub async fn discover(&mut self, ctx: &Ctx<'_>) -> Result<()> {
        let link = ctx
            .handler
            .link_by_name(&self.pod_iface_name)
            .await
            .inspect_err(
                |e| error!(iface = %self.pod_iface_name, error = %e, "failed to get a link for interface"),
            )?;
        self.vif.mtu = mtu_from_link(&link)?;
        self.pod_link = Some(link);

        let cidr = self.vm_network_cidr.as_deref().unwrap_or(DEFAULT_VM_CIDR);
        let (gateway, guest) = ctx.handler.host_and_gw_from_cidr(cidr).inspect_err(
            |e| error!(cidr, error = %e, "failed to get gw and vm available addresses"),
        )?;
        self.vif.gateway = Some(gateway.addr());
        self.gateway_addr = Some(gateway);
        self.vif.ip = Some(guest);

        Ok(())
    }

    pub async fn prepare(&mut self, ctx: &Ctx<'_>) -> Result<()> {
        let nic_name = format!("{}-nic", self.bridge_name);
        let dummy = ctx
            .handler
            .link_add(&nic_name, LinkKind::Dummy)
            .await
            .inspect_err(|e| error!(iface = %nic_name, error = %e, "failed to create an interface"))?;
        ctx.handler
            .link_set_up(&dummy)
            .await
            .inspect_err(|e| error!(iface = %nic_name, error = %e, "failed to bring link up"))?;

        if self.vif.mac.is_none() {
            self.vif.mac = Some(ctx.handler.generate_random_mac());
        }

        self.create_bridge(ctx, &dummy).await?;

        self.create_nat_rules(ctx)
            .await
            .inspect_err(|e| error!(error = %e, "failed to create nat rules for vm"))?;

        self.start_dhcp_server(ctx).await?;

        Ok(())
    }

    pub fn decorate(&mut self) -> Result<()> {
        let mac = self
            .vif
            .mac
            .ok_or_else(|| PlugError::MissingMac(self.iface.name.clone()))?;
        let mtu = self.pod_link()?.mtu;
        let slot = &mut self.domain.devices.interfaces[self.slot];
        slot.mtu = Some(Mtu {
            size: mtu.to_string(),
        });
        slot.mac = Some(MacAddress {
            address: mac.to_string(),
        });
        Ok(())
    }

    pub async fn load_cached(&mut self, ctx: &Ctx<'_>, name: &str) -> Result<bool> {
        match ctx.cache.read_interface(name).await? {
            Some(record) => {
                self.domain.devices.interfaces[self.slot] = record;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn write_cache(&self) -> Result<()> {
        // NAT rules must be reprogrammed on every invocation; persisting the
        // decorated slot would short-circuit prepare on the next plug call.
        Ok(())
    }

    async fn create_bridge(&self, ctx: &Ctx<'_>, dummy: &Link) -> Result<()> {
        let bridge = ctx
            .handler
            .link_add(&self.bridge_name, LinkKind::Bridge)
            .await
            .inspect_err(|e| error!(error = %e, "failed to create a bridge"))?;

        ctx.handler
            .link_set_master(dummy, &bridge)
            .await
            .inspect_err(
                |e| error!(iface = %dummy.name, bridge = %self.bridge_name, error = %e, "failed to connect interface to bridge"),
            )?;

        ctx.handler.link_set_up(&bridge).await.inspect_err(
            |e| error!(iface = %self.bridge_name, error = %e, "failed to bring link up"),
        )?;

        let gateway = self.gateway_addr()?;
        ctx.handler
            .addr_add(&bridge, &gateway)
            .await
            .inspect_err(|e| error!(error = %e, "failed to set bridge IP"))?;

        Ok(())
    }

    async fn create_nat_rules(&self, ctx: &Ctx<'_>) -> Result<()> {
        let vif_ip = self
            .vif
            .ip
            .ok_or_else(|| PlugError::NotDiscovered(self.pod_iface_name.clone()))?;
        let gateway = self.gateway_addr()?;
        NatRules {
            pod_iface: &self.pod_iface_name,
            bridge: &self.bridge_name,
            vif_ip: vif_ip.addr(),
            gateway: gateway.addr(),
            ports: &self.iface.ports,
        }
        .apply(ctx.handler)
        .await?;
        Ok(())
    }

    async fn start_dhcp_server(&self, ctx: &Ctx<'_>) -> Result<()> {
        let gateway = self.gateway_addr()?;
        info!(vmi = %self.vmi.name, vif = %self.vif, "masquerade pod interface");
        ctx.handler
            .start_dhcp(
                &self.vif,
                &gateway,
                &self.bridge_name,
                self.iface.dhcp_options.as_ref(),
            )
            .await?;
        Ok(())
    }

    fn pod_link(&self) -> Result<&Link> {
        self.pod_link
            .as_ref()
            .ok_or_else(|| PlugError::NotDiscovered(self.pod_iface_name.clone()))
    }

    fn gateway_addr(&self) -> Result<Ipv4Net> {
        self.gateway_addr
            .ok_or_else(|| PlugError::NotDiscovered(self.pod_iface_name.clone()))
    }
}
