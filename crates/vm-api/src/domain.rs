use serde::{Deserialize, Serialize};

/// Guest network CIDR used for masquerade interfaces when the network spec
/// does not supply one.
pub const DEFAULT_VM_CIDR: &str = "10.0.2.0/24";

/// The slice of the hypervisor domain the binding engine reads and mutates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainSpec {
    pub vcpu: VCpu,
    pub devices: Devices,
    pub qemu_cmd: Commandline,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VCpu {
    pub cpus: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Devices {
    /// Guest interface slots, addressed by alias name.
    pub interfaces: Vec<Interface>,
}

/// One guest network interface slot in the domain device list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Interface {
    pub alias: Alias,
    pub model: Model,
    pub mac: Option<MacAddress>,
    pub mtu: Option<Mtu>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Alias {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Model {
    /// Device model the guest sees (`virtio`, `e1000`, ...).
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MacAddress {
    pub address: String,
}

/// Device MTU, carried as the decimal string the domain config expects.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mtu {
    pub size: String,
}

/// Extra hypervisor command-line arguments appended by device plumbing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Commandline {
    pub args: Vec<Arg>,
}

/// A single hypervisor command-line token.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub value: String,
}
