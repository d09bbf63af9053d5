//! Leaving the physical address world.
//!
//! The image is linked at `HIGHER_HALF_BASE` but runs at its load address until the MMU is
//! on. PC-relative addressing (adrp) hands out physical addresses in that state, so every
//! symbol's higher half address is its physical address rebased onto `HIGHER_HALF_BASE`.
//! The jump is a plain `br`: there is no frame to return to on the other side.

use super::vm::HIGHER_HALF_BASE;
use crate::vm::{PhysicalAddress, VirtualAddress};

/// Where instructions are being fetched from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ExecutionContext {
    /// MMU off, or on but still running out of the identity mapping.
    Physical,
    /// Running at this higher half address.
    Higher(VirtualAddress),
}

impl ExecutionContext {
    /// The one transition there is. Going back is not a thing.
    pub fn transition(self, entry: VirtualAddress) -> ExecutionContext {
        match self {
            ExecutionContext::Physical => ExecutionContext::Higher(entry),
            higher @ ExecutionContext::Higher(_) => higher,
        }
    }
}

/// Higher half alias of something that sits at `phys` in an image loaded at `load_addr`.
pub fn higher_half_alias(load_addr: PhysicalAddress, phys: PhysicalAddress) -> VirtualAddress {
    HIGHER_HALF_BASE + (phys - load_addr)
}

/// # Safety
/// `entry` must be mapped executable in the current regime and must not return.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub unsafe fn jump(entry: VirtualAddress, load_addr: PhysicalAddress) -> ! {
    core::arch::asm!(
        "br {entry}",
        // only reached if the branch didn't happen
        "b .",
        entry = in(reg) entry.0,
        in("x0") load_addr.0,
        options(noreturn, nostack),
    );
}

/// Runs the kernel if `context` says there is one to run.
///
/// # Safety
/// See [`jump`].
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub unsafe fn enter(context: ExecutionContext, load_addr: PhysicalAddress) -> ! {
    match context {
        ExecutionContext::Higher(entry) => jump(entry, load_addr),
        // nowhere to go
        ExecutionContext::Physical => loop {
            aarch64_cpu::asm::wfe();
        },
    }
}

/// Branches to `entry` through the identity mapping, falling back to a PSCI reset.
///
/// # Safety
/// Same as [`jump`], and PSCI has to be there for the fallback.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub unsafe fn jump_or_reset(entry: PhysicalAddress) -> ! {
    core::arch::asm!("br {entry}", entry = in(reg) entry.0, options(nostack));
    super::platform::system_reset()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alias_rebases_onto_higher_half() {
        let load = PhysicalAddress(0x4000_0000);
        assert_eq!(higher_half_alias(load, load), HIGHER_HALF_BASE);
        assert_eq!(
            higher_half_alias(load, PhysicalAddress(0x4012_3450)),
            VirtualAddress(0xffff_ffa0_0012_3450)
        );
    }

    #[test]
    fn transition_is_one_way() {
        let entry = VirtualAddress(0xffff_ffa0_0000_1000);
        let context = ExecutionContext::Physical.transition(entry);
        assert_eq!(context, ExecutionContext::Higher(entry));
        assert_eq!(context.transition(VirtualAddress(0x4000_0000)), context);
    }
}
