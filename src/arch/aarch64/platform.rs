// PSCI based platform control

pub const PSCI_SYSTEM_RESET: usize = 0x8400_0009;

/// Last resort for the reset path.
///
/// # Safety
/// System must be a PSCI system with an hvc conduit, else UB.
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub unsafe fn system_reset() -> ! {
    core::arch::asm!(
        "hvc #0",
        "1: wfi",
        "b 1b",
        in("x0") PSCI_SYSTEM_RESET,
        options(noreturn, nostack),
    );
}
