//! Build-time board selection.
//!
//! A board contributes the address of its boot uart, whether that uart needs transmit-ready
//! polling, and its RAM window. Adding a board means adding a variant here and a feature in
//! Cargo.toml.

use crate::vm::{AddressRegion, PhysicalAddress};

#[cfg(not(any(feature = "board-qemu", feature = "board-orangepi")))]
compile_error!("select a board: enable `board-qemu` or `board-orangepi`");

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Board {
    /// QEMU `virt`, PL011 at 0x0900_0000
    Qemu,
    /// Orange Pi PC2 (Allwinner H5), 16550-style uart at 0x01C2_8000
    OrangePi,
}

/// Transmit-ready predicate for uarts that need one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReadyPoll {
    /// Byte offset of the status register from the uart base.
    pub status_offset: usize,
    /// The transmitter can take a byte once these bits are set.
    pub ready_mask: u32,
}

impl Board {
    #[cfg(feature = "board-qemu")]
    pub const SELECTED: Board = Board::Qemu;
    #[cfg(all(feature = "board-orangepi", not(feature = "board-qemu")))]
    pub const SELECTED: Board = Board::OrangePi;

    pub const fn uart_base(self) -> PhysicalAddress {
        match self {
            Board::Qemu => PhysicalAddress(0x0900_0000),
            Board::OrangePi => PhysicalAddress(0x01C2_8000),
        }
    }

    pub const fn ready_poll(self) -> Option<ReadyPoll> {
        match self {
            Board::Qemu => None,
            // LSR, TEMT
            Board::OrangePi => Some(ReadyPoll { status_offset: 5 * 4, ready_mask: 0x40 }),
        }
    }

    pub const fn ram(self) -> AddressRegion {
        match self {
            Board::Qemu => AddressRegion::normal(PhysicalAddress(0x4000_0000), 0x4000_0000),
            Board::OrangePi => AddressRegion::normal(PhysicalAddress(0x0040_0000), 0x0200_0000),
        }
    }

    pub const fn line_ending(self) -> &'static [u8] {
        match self {
            Board::Qemu => b"\n",
            Board::OrangePi => b"\n\r",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::vm::table::level1_index;

    #[test]
    fn qemu_uart_sits_outside_the_ram_window() {
        let board = Board::Qemu;
        assert_eq!(board.ready_poll(), None);
        assert!(!board.ram().contains(board.uart_base()));
        assert_ne!(level1_index(board.uart_base().0), level1_index(board.ram().base.0));
    }

    #[test]
    fn orangepi_uart_shares_a_window_with_ram() {
        let board = Board::OrangePi;
        assert_eq!(
            board.ready_poll(),
            Some(ReadyPoll { status_offset: 0x14, ready_mask: 0x40 })
        );
        assert_eq!(level1_index(board.uart_base().0), level1_index(board.ram().base.0));
        assert_eq!(board.line_ending(), b"\n\r");
    }

    #[test]
    fn default_build_selects_qemu() {
        if cfg!(feature = "board-qemu") {
            assert_eq!(Board::SELECTED, Board::Qemu);
        }
    }
}
