// Only aarch64 for now. Everything that touches the hardware is gated on the bare metal
// target inside, so host test builds still get the tables and the register sequences.
pub mod aarch64;
pub use self::aarch64::*;
