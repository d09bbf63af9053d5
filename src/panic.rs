// Only for images that link nothing else; a kernel built on top brings its own handler.
#[cfg(all(not(test), feature = "panic-handler", target_arch = "aarch64", target_os = "none"))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    use core::fmt::Write;

    use crate::console::uart::board_putchar;
    use crate::console::Writer;

    // the logger may not be up yet, go straight to the uart
    let mut w = Writer(board_putchar);
    let _ = match info.location() {
        Some(loc) => writeln!(
            w,
            "panic encountered at {}:{}:{}",
            loc.file(),
            loc.line(),
            loc.column()
        ),
        None => writeln!(w, "panic encountered"),
    };
    let _ = writeln!(w, "panic message: {}", info.message());

    loop {
        aarch64_cpu::asm::wfi();
    }
}
