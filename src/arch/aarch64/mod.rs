//! Early boot: build the boot tables, turn the MMU on and move to the higher half.
//!
//! [`map`] is what the boot assembly calls, with a stack and the image's load address and
//! size in x0/x1. It never returns: it ends with a branch to `start_kernel` at its higher
//! half address. [`reset`] turns translation back on from the tables `map` left behind and
//! branches to `cpu_reset` through the identity map.

use log::{info, warn};

use crate::board::Board;
use crate::vm::{DeviceMapping, ImageMapping, MappingRequest};

pub mod handoff;
pub mod platform;
pub mod sysreg;
pub mod vm;

pub use vm::{BLOCK_SIZE, HIGHER_HALF_BASE, VA_BITS};

const BOOT_MESSAGE: &[u8] = b"Set up minimal page_table... Jumping to Rust code";

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod boot {
    use log::LevelFilter;

    use super::handoff::{self, higher_half_alias, ExecutionContext};
    use super::{sysreg, vm, BOOT_MESSAGE};
    use crate::board::Board;
    use crate::console::uart::{board_putchar, DiagnosticUart};
    use crate::console::Writer;
    use crate::logger::{install, ConsoleLogger};
    use crate::vm::{MappingRequest, PhysicalAddress};

    extern "C" {
        fn start_kernel(load_addr: PhysicalAddress) -> !;
        fn cpu_reset() -> !;
    }

    // both are only ever reached through a computed branch
    #[used]
    static START_KERNEL: unsafe extern "C" fn(PhysicalAddress) -> ! = start_kernel;
    #[used]
    static CPU_RESET: unsafe extern "C" fn() -> ! = cpu_reset;

    static CONSOLE: ConsoleLogger = ConsoleLogger::new(Writer(board_putchar), LevelFilter::Info);

    /// adrp/add against a symbol: its physical address while we run from the load address.
    macro_rules! physical_address_of {
        ($sym:path) => {{
            let addr: usize;
            core::arch::asm!(
                "adrp {addr}, {sym}",
                "add {addr}, {addr}, :lo12:{sym}",
                addr = out(reg) addr,
                sym = sym $sym,
                options(pure, nomem, nostack),
            );
            PhysicalAddress(addr)
        }};
    }

    /// # Safety
    /// Boot core only, MMU off, running from `load_addr` with a usable stack. `image_size`
    /// must cover the whole image, rounded up to 2 MiB.
    #[link_section = ".text.boot"]
    #[no_mangle]
    pub unsafe extern "C" fn map(load_addr: PhysicalAddress, image_size: usize) -> ! {
        let board = Board::SELECTED;
        let request = MappingRequest::new(load_addr, image_size);

        let tables = vm::boot_tables();
        let image = tables.map_image(request);
        let device = tables.map_device(board.uart_base());

        sysreg::execute(&sysreg::map_sequence(
            tables.level1_phys(),
            sysreg::MAP_CACHE_POLICY,
        ));

        if device.is_device_memory() {
            let uart = DiagnosticUart::new(board);
            uart.write_line(BOOT_MESSAGE);
            uart.write_line(board.line_ending());

            // caches are on, so the logger's lock and atomics work from here
            let console = higher_half_alias(load_addr, physical_address_of!(CONSOLE));
            if install(&*(console.0 as *const ConsoleLogger)) {
                super::report(board, request, image, device);
            }
        }

        let entry = higher_half_alias(load_addr, physical_address_of!(start_kernel));
        handoff::enter(ExecutionContext::Physical.transition(entry), load_addr)
    }

    /// # Safety
    /// Only after [`map`] has built the tables, with the MMU off and running from the
    /// identity map.
    #[link_section = ".text.boot"]
    #[no_mangle]
    pub unsafe extern "C" fn reset() -> ! {
        let tables = vm::boot_tables();
        sysreg::execute(&sysreg::reset_sequence(tables.level1_phys()));
        handoff::jump_or_reset(physical_address_of!(cpu_reset))
    }
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use boot::{map, reset};

/// Says what the mapper did. Only call with translation on.
pub fn report(board: Board, request: MappingRequest, image: ImageMapping, device: DeviceMapping) {
    info!(
        "boot mapping on {:?}: image at {:?}, {:#x} bytes, {} blocks, l1={:#x}",
        board, request.load_addr, request.image_size, image.blocks, image.identity_slot,
    );

    if !board.ram().contains(request.load_addr) {
        warn!("image loaded outside the board's RAM at {:?}", board.ram().base);
    }
    if request.image_size % BLOCK_SIZE != 0 {
        warn!(
            "image size isn't 2 MiB aligned, last {:#x} bytes not mapped",
            request.image_size % BLOCK_SIZE,
        );
    }
    if image.crosses_window {
        warn!("image runs past its 1 GiB window, identity map of the tail points elsewhere");
    }

    let uart = board.uart_base();
    match device {
        DeviceMapping::Dedicated { slot } => {
            info!("uart {:?} has its own window, slot={:#x}", uart, slot)
        }
        DeviceMapping::SharedWindow { table, slot } => {
            info!("uart {:?} shares the {:?} table, slot={:#x}", uart, table, slot)
        }
        DeviceMapping::AlreadyMapped { table, slot } => {
            warn!(
                "uart {:?} already mapped as normal memory in {:?}, slot={:#x}",
                uart, table, slot,
            )
        }
        DeviceMapping::Foreign { window } => {
            warn!("uart {:?} window {:#x} taken by an unknown table, not mapped", uart, window)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::vm::BootTables;
    use super::*;
    use crate::logger::capture::logged;
    use crate::vm::PhysicalAddress;

    const MIB: usize = 1 << 20;

    fn reported(board: Board, load: usize, size: usize) -> String {
        let request = MappingRequest::new(PhysicalAddress(load), size);
        let mut tables = Box::new(BootTables::new());
        let image = tables.map_image(request);
        let device = tables.map_device(board.uart_base());
        logged(|| report(board, request, image, device))
    }

    #[test]
    fn clean_qemu_boot_reports_no_warnings() {
        let out = reported(Board::Qemu, 0x4000_0000, 4 * MIB);
        assert!(out.contains("boot mapping on Qemu"), "{}", out);
        assert!(out.contains("image at 0p40000000, 0x400000 bytes, 2 blocks"), "{}", out);
        assert!(out.contains("uart 0p09000000 has its own window, slot=0x48"), "{}", out);
        assert!(!out.contains("WARN"), "{}", out);
    }

    #[test]
    fn orangepi_uart_is_reported_in_the_image_window() {
        let out = reported(Board::OrangePi, 0x0040_0000, 4 * MIB);
        assert!(out.contains("shares the Identity table, slot=0xe"), "{}", out);
        assert!(!out.contains("WARN"), "{}", out);
    }

    #[test]
    fn suspicious_requests_are_warned_about() {
        let out = reported(Board::Qemu, 0xc000_0000 - 2 * MIB, 5 * MIB);
        assert!(out.contains("outside the board's RAM"), "{}", out);
        assert!(out.contains("last 0x100000 bytes not mapped"), "{}", out);
        assert!(out.contains("runs past its 1 GiB window"), "{}", out);
    }

    #[test]
    fn image_over_the_uart_is_warned_about() {
        let out = reported(Board::OrangePi, 0x0100_0000, 32 * MIB);
        assert!(out.contains("already mapped as normal memory"), "{}", out);
        assert!(out.contains("WARN"), "{}", out);
    }
}
