pub type Result<T> = std::result::Result<T, HostNetError>;

#[derive(Debug, thiserror::Error)]
pub enum HostNetError {
    #[error("link not found: {0}")]
    LinkNotFound(String),

    #[error("netlink operation failed on {link}: {detail}")]
    Netlink { link: String, detail: String },

    #[error("firewall operation failed: {0}")]
    Firewall(String),

    #[error("invalid address {value}: {detail}")]
    InvalidAddr { value: String, detail: String },

    #[error("CIDR {0} has no room for gateway and guest addresses")]
    CidrTooSmall(String),

    #[error("dhcp server failed to start on {bridge}: {detail}")]
    Dhcp { bridge: String, detail: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
