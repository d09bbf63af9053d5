//! The boot uart: polled, unbuffered, byte at a time.
//!
//! Usable with the MMU off (the accesses are Device anyway) and afterwards through the
//! identity mapped device window.

use crate::board::{Board, ReadyPoll};

pub struct DiagnosticUart {
    base: *mut u8,
    poll: Option<ReadyPoll>,
}

impl DiagnosticUart {
    pub const fn new(board: Board) -> Self {
        DiagnosticUart {
            base: board.uart_base().0 as *mut u8,
            poll: board.ready_poll(),
        }
    }

    /// # Safety
    /// `base` (and the status register, if polling) must be valid for volatile accesses for
    /// as long as this uart is used.
    #[cfg(test)]
    const unsafe fn at(base: *mut u8, poll: Option<ReadyPoll>) -> Self {
        DiagnosticUart { base, poll }
    }

    /// Spins until the transmitter takes bytes. There is no timeout: a dead uart hangs the
    /// boot right here.
    fn wait_ready(&self) {
        if let Some(poll) = self.poll {
            unsafe {
                let status = self.base.add(poll.status_offset) as *const u32;
                while status.read_volatile() & poll.ready_mask == 0 {
                    core::hint::spin_loop();
                }
            }
        }
    }

    pub fn putchar(&self, c: u8) {
        self.wait_ready();
        unsafe { self.base.write_volatile(c) };
    }

    pub fn write_line(&self, bytes: &[u8]) {
        for &byte in bytes {
            self.putchar(byte);
        }
    }
}

/// Writes one byte to the selected board's uart.
pub fn board_putchar(c: u8) {
    DiagnosticUart::new(Board::SELECTED).putchar(c);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C, align(4))]
    struct FakeRegs([u8; 0x20]);

    #[test]
    fn every_byte_goes_to_the_data_register() {
        let mut regs = FakeRegs([0; 0x20]);
        let uart = unsafe { DiagnosticUart::at(regs.0.as_mut_ptr(), None) };
        uart.write_line(b"ok");
        assert_eq!(regs.0[0], b'k');
        assert_eq!(&regs.0[1..], &[0; 0x1f]);
    }

    #[test]
    fn ready_transmitter_is_polled_then_written() {
        let mut regs = FakeRegs([0; 0x20]);
        regs.0[0x14] = 0x40;
        let poll = Board::OrangePi.ready_poll();
        let uart = unsafe { DiagnosticUart::at(regs.0.as_mut_ptr(), poll) };
        uart.write_line(b"boot");
        assert_eq!(regs.0[0], b't');
        assert_eq!(regs.0[0x14], 0x40);
    }

    #[test]
    fn empty_line_touches_nothing() {
        let mut regs = FakeRegs([0xaa; 0x20]);
        let uart = unsafe { DiagnosticUart::at(regs.0.as_mut_ptr(), None) };
        uart.write_line(b"");
        assert_eq!(regs.0, [0xaa; 0x20]);
    }
}
