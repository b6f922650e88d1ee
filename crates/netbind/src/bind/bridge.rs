use hostnet::{Link, LinkKind, Vif};
use tracing::{error, info};
use vm_api::{DomainSpec, InterfaceSpec, MacAddress, Mtu, Vmi};

use super::{Ctx, bridge_fake_ip, mtu_from_link};
use crate::error::{PlugError, Result};
use crate::routes::filter_pod_network_routes;

/// Transparent bridge: the pod link is enslaved to a new in-pod bridge and
/// its original MAC and address are stolen onto the VIF, so the guest —
/// served by the in-pod DHCP server — takes over the pod's identity.
pub(crate) struct BridgeBinding<'d> {
    pub vmi: &'d Vmi,
    pub iface: &'d InterfaceSpec,
    pub domain: &'d mut DomainSpec,
    pub vif: Vif,
    pub slot: usize,
    pub pod_iface_name: String,
    pub bridge_name: String,
    pub pod_link: Option<Link>,
    pub is_layer2: bool,
}

impl BridgeBinding<'_> {
    pub async fn discover(&mut self, ctx: &Ctx<'_>) -> Result<()> {
        let link = ctx
            .handler
            .link_by_name(&self.pod_iface_name)
            .await
            .inspect_err(
                |e| error!(iface = %self.pod_iface_name, error = %e, "failed to get a link for interface"),
            )?;

        let addrs = ctx.handler.addr_list(&link).await.inspect_err(
            |e| error!(iface = %self.pod_iface_name, error = %e, "failed to get an ip address"),
        )?;
        match addrs.first() {
            // No pod-side address: the guest gets addressed by external means.
            None => self.is_layer2 = true,
            Some(addr) => {
                self.vif.ip = Some(*addr);
                self.is_layer2 = false;
            }
        }

        if self.vif.mac.is_none() {
            self.vif.mac = Some(ctx.handler.mac_by_name(&self.pod_iface_name).await.inspect_err(
                |e| error!(iface = %self.pod_iface_name, error = %e, "failed to get MAC"),
            )?);
        }

        self.vif.mtu = mtu_from_link(&link)?;

        if !self.is_layer2 {
            self.set_interface_routes(ctx, &link).await?;
        }

        self.pod_link = Some(link);
        Ok(())
    }

    pub async fn prepare(&mut self, ctx: &Ctx<'_>) -> Result<()> {
        let pod_link = self.pod_link()?.clone();

        // The link must be down while its MAC changes.
        ctx.handler.link_set_down(&pod_link).await.inspect_err(
            |e| error!(iface = %self.pod_iface_name, error = %e, "failed to bring link down"),
        )?;
        ctx.handler.set_random_mac(&self.pod_iface_name).await?;
        ctx.handler.link_set_up(&pod_link).await.inspect_err(
            |e| error!(iface = %self.pod_iface_name, error = %e, "failed to bring link up"),
        )?;

        self.create_bridge(ctx, &pod_link).await?;

        if !self.is_layer2 {
            // The stolen address moves to the guest; the pod link must stop
            // answering for it.
            if let Some(ip) = self.vif.ip {
                ctx.handler.addr_del(&pod_link, &ip).await.inspect_err(
                    |e| error!(iface = %self.pod_iface_name, error = %e, "failed to delete address"),
                )?;
            }
            self.start_dhcp_server(ctx).await?;
        }

        // The guest MAC now lives beyond the bridge port; the bridge must not
        // learn it back onto the pod side.
        ctx.handler
            .link_set_learning_off(&pod_link)
            .await
            .inspect_err(
                |e| error!(iface = %self.pod_iface_name, error = %e, "failed to disable mac learning"),
            )?;

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

    pub async fn write_cache(&self, ctx: &Ctx<'_>, name: &str) -> Result<()> {
        ctx.cache
            .write_interface(name, &self.domain.devices.interfaces[self.slot])
            .await?;
        Ok(())
    }

    async fn set_interface_routes(&mut self, ctx: &Ctx<'_>, link: &Link) -> Result<()> {
        let routes = ctx.handler.route_list(link).await.inspect_err(
            |e| error!(iface = %self.pod_iface_name, error = %e, "failed to get routes"),
        )?;
        let Some(first) = routes.first() else {
            return Err(PlugError::NoGateway(self.pod_iface_name.clone()));
        };
        self.vif.gateway = first.gw;
        if routes.len() > 1 {
            self.vif.routes = filter_pod_network_routes(&routes, &self.vif);
        }
        Ok(())
    }

    async fn create_bridge(&self, ctx: &Ctx<'_>, pod_link: &Link) -> Result<()> {
        let bridge = ctx
            .handler
            .link_add(&self.bridge_name, LinkKind::Bridge)
            .await
            .inspect_err(|e| error!(error = %e, "failed to create a bridge"))?;

        ctx.handler
            .link_set_master(pod_link, &bridge)
            .await
            .inspect_err(
                |e| error!(iface = %self.pod_iface_name, bridge = %self.bridge_name, error = %e, "failed to connect interface to bridge"),
            )?;

        ctx.handler.link_set_up(&bridge).await.inspect_err(
            |e| error!(iface = %self.bridge_name, error = %e, "failed to bring link up"),
        )?;

        let fake_addr = ctx.handler.parse_addr(&bridge_fake_ip(self.slot))?;
        ctx.handler
            .addr_add(&bridge, &fake_addr)
            .await
            .inspect_err(|e| error!(error = %e, "failed to set bridge IP"))?;

        Ok(())
    }

    async fn start_dhcp_server(&self, ctx: &Ctx<'_>) -> Result<()> {
        let server_addr = ctx.handler.parse_addr(&bridge_fake_ip(self.slot))?;
        info!(vmi = %self.vmi.name, vif = %self.vif, "bridge pod interface");
        ctx.handler
            .start_dhcp(
                &self.vif,
                &server_addr,
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
}
