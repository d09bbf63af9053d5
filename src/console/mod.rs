use core::fmt::{Result, Write};

pub mod uart;

#[derive(Copy, Clone)]
pub struct Writer(pub fn(u8));

impl Write for Writer {
    fn write_str(&mut self, s: &str) -> Result {
        for byte in s.bytes() {
            (self.0)(byte);
        }
        Ok(())
    }
}
