use hostnet::HostNetError;

use crate::cache::CacheError;

pub type Result<T> = std::result::Result<T, PlugError>;

#[derive(Debug, thiserror::Error)]
pub enum PlugError {
    // Configuration errors: the caller may fix the interface spec and retry.
    #[error("no interface with alias {0} found in domain devices")]
    InterfaceNotFound(String),

    #[error("network binding for interface {0} is not implemented")]
    NotImplemented(String),

    #[error("invalid MAC address {value}: {detail}")]
    InvalidMac { value: String, detail: String },

    // Discovery errors: nothing was mutated yet, a retry is safe.
    #[error("MTU value {0} out of range")]
    MtuOutOfRange(i32),

    #[error("no gateway address found in routes for {0}")]
    NoGateway(String),

    #[error("no ready macvtap link found")]
    MacvtapNotFound,

    #[error("pod interface {0} has not been discovered")]
    NotDiscovered(String),

    #[error("interface {0} has no MAC address after discovery")]
    MissingMac(String),

    #[error("could not set up tap device fds for {device}: {source}")]
    TapOpen {
        device: String,
        #[source]
        source: HostNetError,
    },

    #[error(transparent)]
    Host(#[from] HostNetError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A mutation phase failed with the kernel namespace half-rewritten.
    /// There is no rollback; the orchestrator recovers by recreating the pod.
    #[error("{phase} failed for interface {iface}: {source}")]
    Fatal {
        phase: &'static str,
        iface: String,
        #[source]
        source: Box<PlugError>,
    },
}

impl PlugError {
    /// Whether the kernel networking state may be half-mutated, making a
    /// retry inside the same pod unsafe.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlugError::Fatal { .. })
    }

    pub(crate) fn fatal(phase: &'static str, iface: &str, source: PlugError) -> Self {
        PlugError::Fatal {
            phase,
            iface: iface.to_string(),
            source: Box::new(source),
        }
    }
}
