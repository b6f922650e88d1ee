mod domain;
mod vmi;

pub use domain::{
    Alias, Arg, Commandline, DEFAULT_VM_CIDR, Devices, DomainSpec, Interface, MacAddress, Model,
    Mtu, VCpu,
};
pub use vmi::{
    BindingMethod, DhcpOptions, DhcpPrivateOption, InterfaceSpec, MacvtapMode, NetworkSpec,
    PodNetwork, PortSpec, Vmi,
};
