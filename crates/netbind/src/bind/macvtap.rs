use std::fs::File;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

use hostnet::{Link, LinkKind, Vif};
use tracing::{error, info};
use vm_api::{Arg, DomainSpec, Interface, InterfaceSpec, MacvtapMode, Vmi};

use super::{Ctx, mtu_from_link};
use crate::error::{PlugError, Result};

/// Character device multiplexing guest queues onto the host network stack.
const VHOST_NET_DEV: &str = "/dev/vhost-net";

/// Direct macvtap pass-through: an externally provisioned macvtap device
/// already sits on the pod link. The engine opens its character device once
/// per guest queue and hands the descriptors to the hypervisor on the command
/// line; no bridge and no DHCP server are involved.
pub(crate) struct MacvtapBinding<'d> {
    pub vmi: &'d Vmi,
    pub iface: &'d InterfaceSpec,
    pub domain: &'d mut DomainSpec,
    pub vif: Vif,
    pub slot: usize,
    pub pod_iface_name: String,
    pub source_mode: MacvtapMode,
    pub pod_link: Option<Link>,
    pub tap_link: Option<Link>,
    pub is_layer2: bool,
    /// Queue descriptors on `/dev/tap<ifindex>`, inherited by the hypervisor.
    pub tap_fds: Vec<File>,
    pub vhost_fds: Vec<File>,
}

impl MacvtapBinding<'_> {
    pub async fn discover(&mut self, ctx: &Ctx<'_>) -> Result<()> {
        let link = ctx
            .handler
            .link_by_name(&self.pod_iface_name)
            .await
            .inspect_err(
                |e| error!(iface = %self.pod_iface_name, error = %e, "failed to get a link for interface"),
            )?;

        let links = ctx.handler.link_list().await?;
        let tap = links
            .into_iter()
            .find(|l| l.kind == LinkKind::Macvtap)
            .ok_or(PlugError::MacvtapNotFound)?;

        let addrs = ctx.handler.addr_list(&link).await.inspect_err(
            |e| error!(iface = %self.pod_iface_name, error = %e, "failed to get an ip address"),
        )?;
        match addrs.first() {
            None => self.is_layer2 = true,
            Some(addr) => {
                self.vif.ip = Some(*addr);
                self.is_layer2 = false;
            }
        }

        if self.vif.mac.is_none() {
            // The tap carries the guest-facing MAC, not the pod link.
            self.vif.mac = Some(ctx.handler.mac_by_name(&tap.name).await.inspect_err(
                |e| error!(iface = %tap.name, error = %e, "failed to get MAC"),
            )?);
        }

        self.vif.mtu = mtu_from_link(&link)?;

        if !self.is_layer2 {
            self.set_interface_routes(ctx, &link).await?;
        }

        self.pod_link = Some(link);
        self.tap_link = Some(tap);
        Ok(())
    }

    pub async fn prepare(&mut self, ctx: &Ctx<'_>) -> Result<()> {
        let pod_link = self.pod_link()?.clone();
        let tap_index = self.tap_link()?.index;

        ctx.handler.link_set_down(&pod_link).await.inspect_err(
            |e| error!(iface = %self.pod_iface_name, error = %e, "failed to bring link down"),
        )?;
        ctx.handler.set_random_mac(&self.pod_iface_name).await?;
        ctx.handler.link_set_up(&pod_link).await.inspect_err(
            |e| error!(iface = %self.pod_iface_name, error = %e, "failed to bring link up"),
        )?;

        // The underlying links must be up before the queue fds are opened.
        self.open_tap_queues(ctx, tap_index)?;

        if !self.is_layer2
            && let Some(ip) = self.vif.ip
        {
            ctx.handler.addr_del(&pod_link, &ip).await.inspect_err(
                |e| error!(iface = %self.pod_iface_name, error = %e, "failed to delete address"),
            )?;
        }

        Ok(())
    }

    pub fn decorate(&mut self) -> Result<()> {
        let mac = self
            .vif
            .mac
            .ok_or_else(|| PlugError::MissingMac(self.iface.name.clone()))?;

        // The guest side is driven entirely by the command line; the device
        // slot stays as an empty placeholder.
        self.domain.devices.interfaces[self.slot] = Interface::default();

        let tap_fds = fd_list(&self.tap_fds);
        let vhost_fds = fd_list(&self.vhost_fds);
        let args = &mut self.domain.qemu_cmd.args;
        args.push(Arg {
            value: "-netdev".into(),
        });
        args.push(Arg {
            value: format!("tap,id=network-1,vhost=on,vhostfds={vhost_fds},fds={tap_fds}"),
        });
        args.push(Arg {
            value: "-device".into(),
        });
        args.push(Arg {
            value: format!(
                "driver=virtio-net-pci,netdev=network-1,mac={mac},disable-modern=false,mq=on,vectors=4,romfile="
            ),
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
            self.vif.routes = routes;
        }
        Ok(())
    }

    fn open_tap_queues(&mut self, ctx: &Ctx<'_>, tap_index: u32) -> Result<()> {
        let queues = if self.vmi.network_interface_multi_queue {
            self.domain.vcpu.cpus as usize
        } else {
            0
        };
        let tap_path = PathBuf::from(format!("/dev/tap{tap_index}"));
        info!(
            tap = %tap_path.display(),
            queues,
            mode = %self.source_mode,
            "opening macvtap queues"
        );

        self.tap_fds = ctx
            .handler
            .create_fds(&tap_path, queues)
            .map_err(|e| PlugError::TapOpen {
                device: tap_path.display().to_string(),
                source: e,
            })?;

        match ctx.handler.create_fds(Path::new(VHOST_NET_DEV), queues) {
            Ok(fds) => self.vhost_fds = fds,
            Err(e) => {
                self.tap_fds.clear();
                return Err(PlugError::TapOpen {
                    device: VHOST_NET_DEV.to_string(),
                    source: e,
                });
            }
        }

        Ok(())
    }

    fn pod_link(&self) -> Result<&Link> {
        self.pod_link
            .as_ref()
            .ok_or_else(|| PlugError::NotDiscovered(self.pod_iface_name.clone()))
    }

    fn tap_link(&self) -> Result<&Link> {
        self.tap_link
            .as_ref()
            .ok_or_else(|| PlugError::NotDiscovered(self.pod_iface_name.clone()))
    }
}

fn fd_list(files: &[File]) -> String {
    files
        .iter()
        .map(|f| f.as_raw_fd().to_string())
        .collect::<Vec<_>>()
        .join(":")
}
