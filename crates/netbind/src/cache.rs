use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use vm_api::{Arg, Interface};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache IO failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache entry {path} is not valid JSON: {source}")]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk cache of decorated guest-config fragments, one JSON file per
/// interface name.
///
/// This is the only channel between plug invocations: a relaunched process
/// re-runs plug, hits the cache and replays the domain mutation without
/// touching the (already mutated, non-idempotent) kernel state again. Bridge,
/// masquerade and macvtap persist their domain interface record; slirp
/// persists its single hypervisor command-line argument.
#[derive(Debug, Clone)]
pub struct InterfaceCache {
    dir: PathBuf,
}

impl InterfaceCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn interface_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("interface-cache-{name}.json"))
    }

    fn qemu_arg_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("qemu-arg-cache-{name}.json"))
    }

    /// Cached domain interface record, if one was written for `name`.
    pub async fn read_interface(&self, name: &str) -> Result<Option<Interface>, CacheError> {
        read_entry(&self.interface_path(name)).await
    }

    pub async fn write_interface(&self, name: &str, iface: &Interface) -> Result<(), CacheError> {
        write_entry(&self.interface_path(name), iface).await
    }

    /// Cached hypervisor command-line argument, if one was written for `name`.
    pub async fn read_qemu_arg(&self, name: &str) -> Result<Option<Arg>, CacheError> {
        read_entry(&self.qemu_arg_path(name)).await
    }

    pub async fn write_qemu_arg(&self, name: &str, arg: &Arg) -> Result<(), CacheError> {
        write_entry(&self.qemu_arg_path(name), arg).await
    }
}

async fn read_entry<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source: e,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| CacheError::Serde {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn write_entry<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let json = serde_json::to_vec_pretty(value).map_err(|e| CacheError::Serde {
        path: path.to_path_buf(),
        source: e,
    })?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| CacheError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
    }
    tokio::fs::write(path, json).await.map_err(|e| CacheError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}
