//! Shared harness: a recording fake of the host capability surface plus
//! builders for domains and specs.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use hostnet::{HostNetError, Link, LinkKind, NetHandler, Result, Route, Vif};
use ipnet::Ipv4Net;
use macaddr::MacAddr6;
use netbind::InterfaceCache;
use vm_api::{
    Alias, Devices, DhcpOptions, DomainSpec, Interface, InterfaceSpec, Model, NetworkSpec,
    PodNetwork, VCpu, Vmi,
};

/// Every state-changing host operation the engine asked for, in call order.
/// Read-only operations (link/addr/route queries) are not recorded.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    LinkAdd { name: String, kind: LinkKind },
    LinkSetUp(String),
    LinkSetDown(String),
    LinkSetMaster { link: String, master: String },
    LinkSetLearningOff(String),
    AddrAdd { link: String, addr: Ipv4Net },
    AddrDel { link: String, addr: Ipv4Net },
    SetRandomMac(String),
    StartDhcp { bridge: String },
    CreateFds { device: String, count: usize },
    IptablesNewChain { table: String, chain: String },
    IptablesAppendRule { table: String, chain: String, rule: Vec<String> },
    NftablesLoad(String),
    NftablesNewChain { table: String, chain: String },
    NftablesAppendRule { table: String, chain: String, rule: Vec<String> },
}

/// Snapshot of a DHCP server launch.
#[derive(Debug, Clone)]
pub struct DhcpStart {
    pub vif: Vif,
    pub server: Ipv4Net,
    pub bridge: String,
    pub options: Option<DhcpOptions>,
}

/// The MAC the fake programs onto links in `set_random_mac`. Fixed so tests
/// can assert the pod link no longer answers to the guest MAC.
pub const SCRAMBLED_MAC: MacAddr6 = MacAddr6::new(0x0a, 0x58, 0x00, 0x00, 0x00, 0x99);

#[derive(Default)]
struct FakeState {
    links: Vec<Link>,
    addrs: HashMap<String, Vec<Ipv4Net>>,
    routes: HashMap<String, Vec<Route>>,
    macs: HashMap<String, MacAddr6>,
    use_iptables: bool,
    fail_link_add: bool,
    calls: Vec<Call>,
    dhcp_starts: Vec<DhcpStart>,
    next_index: u32,
}

/// In-memory `NetHandler` that records every mutation instead of touching the
/// kernel. Queue fds are opened on `/dev/null` so descriptor plumbing stays
/// observable.
pub struct FakeHandler {
    state: Mutex<FakeState>,
}

impl Default for FakeHandler {
    fn default() -> Self {
        Self {
            state: Mutex::new(FakeState {
                use_iptables: true,
                next_index: 100,
                ..FakeState::default()
            }),
        }
    }
}

impl FakeHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_link(&self, name: &str, index: u32, mtu: i32, kind: LinkKind) {
        self.state.lock().unwrap().links.push(Link {
            name: name.to_string(),
            index,
            mtu,
            kind,
        });
    }

    pub fn set_mac(&self, name: &str, mac: &str) {
        self.state
            .lock()
            .unwrap()
            .macs
            .insert(name.to_string(), mac.parse().unwrap());
    }

    pub fn add_addr(&self, name: &str, addr: &str) {
        self.state
            .lock()
            .unwrap()
            .addrs
            .entry(name.to_string())
            .or_default()
            .push(addr.parse().unwrap());
    }

    pub fn add_route(&self, name: &str, dst: Option<&str>, gw: Option<&str>, src: Option<&str>) {
        self.state
            .lock()
            .unwrap()
            .routes
            .entry(name.to_string())
            .or_default()
            .push(Route {
                dst: dst.map(|d| d.parse().unwrap()),
                gw: gw.map(|g| g.parse().unwrap()),
                src: src.map(|s| s.parse().unwrap()),
            });
    }

    pub fn use_nftables(&self) {
        self.state.lock().unwrap().use_iptables = false;
    }

    pub fn fail_link_add(&self) {
        self.state.lock().unwrap().fail_link_add = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn dhcp_starts(&self) -> Vec<DhcpStart> {
        self.state.lock().unwrap().dhcp_starts.clone()
    }

    /// MAC currently programmed on the named link.
    pub fn mac_of(&self, name: &str) -> Option<MacAddr6> {
        self.state.lock().unwrap().macs.get(name).copied()
    }

    fn record(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl NetHandler for FakeHandler {
    async fn link_by_name(&self, name: &str) -> Result<Link> {
        self.state
            .lock()
            .unwrap()
            .links
            .iter()
            .find(|l| l.name == name)
            .cloned()
            .ok_or_else(|| HostNetError::LinkNotFound(name.to_string()))
    }

    async fn link_list(&self) -> Result<Vec<Link>> {
        Ok(self.state.lock().unwrap().links.clone())
    }

    async fn link_add(&self, name: &str, kind: LinkKind) -> Result<Link> {
        let mut state = self.state.lock().unwrap();
        if state.fail_link_add {
            return Err(HostNetError::Netlink {
                link: name.to_string(),
                detail: "injected failure".into(),
            });
        }
        state.next_index += 1;
        let link = Link {
            name: name.to_string(),
            index: state.next_index,
            mtu: 1500,
            kind,
        };
        state.links.push(link.clone());
        state.calls.push(Call::LinkAdd {
            name: name.to_string(),
            kind,
        });
        Ok(link)
    }

    async fn link_set_up(&self, link: &Link) -> Result<()> {
        self.record(Call::LinkSetUp(link.name.clone()));
        Ok(())
    }

    async fn link_set_down(&self, link: &Link) -> Result<()> {
        self.record(Call::LinkSetDown(link.name.clone()));
        Ok(())
    }

    async fn link_set_master(&self, link: &Link, master: &Link) -> Result<()> {
        self.record(Call::LinkSetMaster {
            link: link.name.clone(),
            master: master.name.clone(),
        });
        Ok(())
    }

    async fn link_set_learning_off(&self, link: &Link) -> Result<()> {
        self.record(Call::LinkSetLearningOff(link.name.clone()));
        Ok(())
    }

    async fn addr_list(&self, link: &Link) -> Result<Vec<Ipv4Net>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .addrs
            .get(&link.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn addr_add(&self, link: &Link, addr: &Ipv4Net) -> Result<()> {
        self.record(Call::AddrAdd {
            link: link.name.clone(),
            addr: *addr,
        });
        Ok(())
    }

    async fn addr_del(&self, link: &Link, addr: &Ipv4Net) -> Result<()> {
        self.record(Call::AddrDel {
            link: link.name.clone(),
            addr: *addr,
        });
        Ok(())
    }

    async fn route_list(&self, link: &Link) -> Result<Vec<Route>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .routes
            .get(&link.name)
            .cloned()
            .unwrap_or_default())
    }

    async fn mac_by_name(&self, name: &str) -> Result<MacAddr6> {
        self.state
            .lock()
            .unwrap()
            .macs
            .get(name)
            .copied()
            .ok_or_else(|| HostNetError::LinkNotFound(name.to_string()))
    }

    async fn set_random_mac(&self, name: &str) -> Result<MacAddr6> {
        let mut state = self.state.lock().unwrap();
        state.macs.insert(name.to_string(), SCRAMBLED_MAC);
        state.calls.push(Call::SetRandomMac(name.to_string()));
        Ok(SCRAMBLED_MAC)
    }

    async fn start_dhcp(
        &self,
        vif: &Vif,
        server_addr: &Ipv4Net,
        bridge: &str,
        options: Option<&DhcpOptions>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::StartDhcp {
            bridge: bridge.to_string(),
        });
        state.dhcp_starts.push(DhcpStart {
            vif: vif.clone(),
            server: *server_addr,
            bridge: bridge.to_string(),
            options: options.cloned(),
        });
        Ok(())
    }

    fn use_iptables(&self) -> bool {
        self.state.lock().unwrap().use_iptables
    }

    async fn iptables_new_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.record(Call::IptablesNewChain {
            table: table.to_string(),
            chain: chain.to_string(),
        });
        Ok(())
    }

    async fn iptables_append_rule(&self, table: &str, chain: &str, rule: &[&str]) -> Result<()> {
        self.record(Call::IptablesAppendRule {
            table: table.to_string(),
            chain: chain.to_string(),
            rule: rule.iter().map(|s| s.to_string()).collect(),
        });
        Ok(())
    }

    async fn nftables_load(&self, name: &str) -> Result<()> {
        self.record(Call::NftablesLoad(name.to_string()));
        Ok(())
    }

    async fn nftables_new_chain(&self, table: &str, chain: &str) -> Result<()> {
        self.record(Call::NftablesNewChain {
            table: table.to_string(),
            chain: chain.to_string(),
        });
        Ok(())
    }

    async fn nftables_append_rule(&self, table: &str, chain: &str, rule: &[&str]) -> Result<()> {
        self.record(Call::NftablesAppendRule {
            table: table.to_string(),
            chain: chain.to_string(),
            rule: rule.iter().map(|s| s.to_string()).collect(),
        });
        Ok(())
    }

    fn create_fds(&self, device: &Path, count: usize) -> Result<Vec<File>> {
        self.record(Call::CreateFds {
            device: device.display().to_string(),
            count,
        });
        let mut fds = Vec::with_capacity(count);
        for _ in 0..count {
            fds.push(
                std::fs::OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open("/dev/null")?,
            );
        }
        Ok(fds)
    }
}

// ---------------------------------------------------------------------------
// Spec builders
// ---------------------------------------------------------------------------

pub fn domain(cpus: u32, slots: &[(&str, &str)]) -> DomainSpec {
    DomainSpec {
        vcpu: VCpu { cpus },
        devices: Devices {
            interfaces: slots
                .iter()
                .map(|(alias, model)| Interface {
                    alias: Alias {
                        name: alias.to_string(),
                    },
                    model: Model {
                        kind: model.to_string(),
                    },
                    ..Interface::default()
                })
                .collect(),
        },
        ..DomainSpec::default()
    }
}

pub fn vmi(name: &str) -> Vmi {
    Vmi {
        name: name.to_string(),
        ..Vmi::default()
    }
}

pub fn iface_spec(name: &str, binding: vm_api::BindingMethod) -> InterfaceSpec {
    InterfaceSpec {
        name: name.to_string(),
        binding: Some(binding),
        ..InterfaceSpec::default()
    }
}

pub fn network() -> NetworkSpec {
    NetworkSpec::default()
}

pub fn network_with_cidr(cidr: &str) -> NetworkSpec {
    NetworkSpec {
        pod: PodNetwork {
            vm_network_cidr: Some(cidr.to_string()),
        },
    }
}

pub fn cache() -> (tempfile::TempDir, InterfaceCache) {
    let dir = tempfile::tempdir().expect("create tempdir");
    let cache = InterfaceCache::new(dir.path());
    (dir, cache)
}
