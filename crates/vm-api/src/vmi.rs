/// A virtual machine instance, reduced to what interface binding consumes.
#[derive(Debug, Clone, Default)]
pub struct Vmi {
    pub name: String,
    /// When set, guest NICs are multi-queue and the queue count follows the
    /// domain's vCPU count.
    pub network_interface_multi_queue: bool,
}

/// Interface section of the VMI spec.
#[derive(Debug, Clone, Default)]
pub struct InterfaceSpec {
    /// Matches the alias of exactly one slot in the domain device list.
    pub name: String,
    /// Guest MAC requested by the user; discovered from the pod side when
    /// absent.
    pub mac_address: Option<String>,
    pub binding: Option<BindingMethod>,
    /// Ports forwarded to the guest in masquerade mode; empty forwards
    /// everything.
    pub ports: Vec<PortSpec>,
    pub dhcp_options: Option<DhcpOptions>,
}

/// How the pod interface is bound into the guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingMethod {
    Bridge,
    Masquerade,
    Slirp,
    Macvtap { mode: Option<MacvtapMode> },
    /// Plugged by the device passthrough path; nothing to bind here.
    Sriov,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MacvtapMode {
    #[default]
    Bridge,
    Vepa,
    Private,
    Passthru,
}

impl std::fmt::Display for MacvtapMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bridge => f.write_str("bridge"),
            Self::Vepa => f.write_str("vepa"),
            Self::Private => f.write_str("private"),
            Self::Passthru => f.write_str("passthru"),
        }
    }
}

/// A single forwarded port declaration.
#[derive(Debug, Clone, Default)]
pub struct PortSpec {
    pub name: Option<String>,
    /// Defaults to `tcp` when unset.
    pub protocol: Option<String>,
    pub port: u16,
}

/// DHCP options advertised to the guest alongside the stolen address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DhcpOptions {
    pub boot_file_name: Option<String>,
    pub tftp_server_name: Option<String>,
    pub ntp_servers: Vec<String>,
    pub private_options: Vec<DhcpPrivateOption>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpPrivateOption {
    pub option: u8,
    pub value: String,
}

/// Network section of the VMI spec.
#[derive(Debug, Clone, Default)]
pub struct NetworkSpec {
    pub pod: PodNetwork,
}

#[derive(Debug, Clone, Default)]
pub struct PodNetwork {
    /// CIDR the guest is addressed from in masquerade mode;
    /// [`DEFAULT_VM_CIDR`](crate::DEFAULT_VM_CIDR) when unset.
    pub vm_network_cidr: Option<String>,
}
