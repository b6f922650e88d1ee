use vm_api::{Arg, DomainSpec, InterfaceSpec};

use super::Ctx;
use crate::error::Result;

/// User-space networking: no kernel state is touched at all. The device slot
/// is folded into hypervisor command-line arguments, and `slot` is re-aimed
/// at the argument index once the device record has been spliced out.
pub(crate) struct SlirpBinding<'d> {
    pub iface: &'d InterfaceSpec,
    pub domain: &'d mut DomainSpec,
    pub slot: usize,
}

impl SlirpBinding<'_> {
    pub fn discover(&mut self) -> Result<()> {
        self.domain.qemu_cmd.args.push(Arg {
            value: "-device".into(),
        });
        Ok(())
    }

    pub fn prepare(&mut self) -> Result<()> {
        let device = self.domain.devices.interfaces[self.slot].clone();
        self.domain.qemu_cmd.args.push(Arg {
            value: format!("{},netdev={}", device.model.kind, self.iface.name),
        });

        self.domain.devices.interfaces.remove(self.slot);
        // Later phases address the argument, not the removed device slot.
        self.slot = self.domain.qemu_cmd.args.len() - 1;
        Ok(())
    }

    pub fn decorate(&mut self) -> Result<()> {
        let arg = &mut self.domain.qemu_cmd.args[self.slot];
        arg.value.push_str(&format!(",id={}", self.iface.name));
        if let Some(mac) = self.iface.mac_address.as_deref()
            && !mac.is_empty()
        {
            // Validated at the API layer; passed through verbatim.
            arg.value.push_str(&format!(",mac={mac}"));
        }
        Ok(())
    }

    pub async fn load_cached(&mut self, ctx: &Ctx<'_>, name: &str) -> Result<bool> {
        match ctx.cache.read_qemu_arg(name).await? {
            Some(arg) => {
                self.domain.devices.interfaces.remove(self.slot);
                self.domain.qemu_cmd.args.push(arg);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn write_cache(&self, ctx: &Ctx<'_>, name: &str) -> Result<()> {
        ctx.cache
            .write_qemu_arg(name, &self.domain.qemu_cmd.args[self.slot])
            .await?;
        Ok(())
    }
}
