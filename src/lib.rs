//! Early MMU bring-up for an AArch64 kernel linked in the higher half.
//!
//! The boot assembly sets up a stack and calls [`arch::map`] with the MMU off. That builds
//! identity and higher half mappings for the image plus an identity device mapping for the
//! boot uart, turns translation on and branches to `start_kernel` at its higher half
//! address. [`arch::reset`] is the way back in after a soft reset.

#![cfg_attr(not(test), no_std)]

pub mod arch;
pub mod board;
pub mod console;
mod fmt;
pub mod logger;
mod panic;
pub mod vm;
