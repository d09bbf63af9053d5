//! A `log` backend that prints straight to the boot uart.
//!
//! Nothing here allocates: records are formatted directly into the console `Writer`, one
//! line each. The line lock is a spinlock, so only install this after the MMU and caches
//! are on.

use core::fmt::Write;

use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

use crate::console::Writer;

pub struct ConsoleLogger {
    writer: Writer,
    max_level: LevelFilter,
    // keeps lines whole once other cores start logging through us
    line: Mutex<()>,
}

impl ConsoleLogger {
    pub const fn new(writer: Writer, max_level: LevelFilter) -> Self {
        ConsoleLogger {
            writer,
            max_level,
            line: Mutex::new(()),
        }
    }
}

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _line = self.line.lock();
        let mut w = self.writer;
        let _ = writeln!(w, "{}: {}: {}", record.level(), record.target(), record.args());
    }

    fn flush(&self) {}
}

/// Makes `logger` the global logger. Returns false if something else got there first.
pub fn install(logger: &'static ConsoleLogger) -> bool {
    log::set_logger(logger)
        .map(|()| log::set_max_level(logger.max_level))
        .is_ok()
}

/// One global logger for the whole test binary, writing into a per-thread buffer so tests
/// running side by side don't see each other's lines.
#[cfg(test)]
pub(crate) mod capture {
    use super::*;
    use std::cell::RefCell;
    use std::sync::Once;

    thread_local! {
        static OUT: RefCell<Vec<u8>> = RefCell::new(Vec::new());
    }

    fn push(c: u8) {
        OUT.with(|out| out.borrow_mut().push(c));
    }

    static LOGGER: ConsoleLogger = ConsoleLogger::new(Writer(push), LevelFilter::Info);
    static INSTALL: Once = Once::new();

    pub fn logged(f: impl FnOnce()) -> String {
        INSTALL.call_once(|| assert!(install(&LOGGER)));
        OUT.with(|out| out.borrow_mut().clear());
        f();
        OUT.with(|out| String::from_utf8(out.borrow().clone()).unwrap())
    }
}
