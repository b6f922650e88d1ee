use hostnet::NetHandler;
use tracing::error;
use vm_api::{BindingMethod, DomainSpec, InterfaceSpec, NetworkSpec, Vmi};

use crate::bind::{Ctx, get_binding};
use crate::cache::InterfaceCache;
use crate::error::{PlugError, Result};

/// Connect a pod network device to the virtual machine.
///
/// The decorated fragment is looked up in the cache first; a hit means a
/// previous invocation already mutated the kernel and only the domain needs
/// replaying. On a miss the selected strategy runs
/// discover → prepare → decorate → write-cache.
///
/// Errors up to and including `discover` are recoverable: nothing was
/// mutated, the caller may retry from scratch. Anything later comes back as
/// [`PlugError::Fatal`] — the kernel namespace is half-rewritten, there is no
/// rollback, and the orchestrator must recreate the pod.
pub async fn plug(
    handler: &dyn NetHandler,
    cache: &InterfaceCache,
    vmi: &Vmi,
    iface: &InterfaceSpec,
    network: &NetworkSpec,
    domain: &mut DomainSpec,
    pod_iface_name: &str,
) -> Result<()> {
    // SR-IOV devices are plugged by the device passthrough path.
    if matches!(iface.binding, Some(BindingMethod::Sriov)) {
        return Ok(());
    }

    let ctx = Ctx { handler, cache };
    let mut binding = get_binding(vmi, iface, network, domain, pod_iface_name)?;

    if binding.load_cached(&ctx, &iface.name).await? {
        return Ok(());
    }

    binding.discover(&ctx).await?;

    if let Err(e) = binding.prepare(&ctx).await {
        error!(iface = %iface.name, error = %e, "failed to prepare pod networking");
        return Err(PlugError::fatal("prepare", &iface.name, e));
    }

    if let Err(e) = binding.decorate() {
        error!(iface = %iface.name, error = %e, "failed to create hypervisor interface configuration");
        return Err(PlugError::fatal("decorate", &iface.name, e));
    }

    if let Err(e) = binding.write_cache(&ctx, &iface.name).await {
        error!(iface = %iface.name, error = %e, "failed to save interface configuration");
        return Err(PlugError::fatal("write cache", &iface.name, e));
    }

    Ok(())
}
