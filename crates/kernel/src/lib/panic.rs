// Kernel panic handler

#[cfg(target_os = "none")]
use core::panic::PanicInfo;
#[cfg(target_os = "none")]
use core::sync::atomic::{AtomicBool, Ordering};

/// Prevents recursive panics from re-entering the logger.
#[cfg(target_os = "none")]
static PANICKING: AtomicBool = AtomicBool::new(false);

#[cfg(target_os = "none")]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    x86_64::instructions::interrupts::disable();

    if !PANICKING.swap(true, Ordering::SeqCst) {
        crate::error!("kernel panic: {}", info);
        if let Some(location) = info.location() {
            crate::error!("  at {}:{}", location.file(), location.line());
        }
    }

    loop {
        x86_64::instructions::hlt();
    }
}
