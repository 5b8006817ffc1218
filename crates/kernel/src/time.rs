// Tick accounting driven by the PIT timer interrupt

use crate::arch::x86_64::trapframe::InterruptFrame;
use crate::config::SCHED_TICK_DIVIDER;
use core::sync::atomic::{AtomicU64, Ordering};

static GLOBAL_TICKS: AtomicU64 = AtomicU64::new(0);

pub fn ticks() -> u64 {
    GLOBAL_TICKS.load(Ordering::Relaxed)
}

/// Timer interrupt handler body, BSP only. Every second tick hands the
/// interrupted frame to the scheduler.
pub fn timer_tick(frame: &mut InterruptFrame) {
    let now = GLOBAL_TICKS.fetch_add(1, Ordering::Relaxed) + 1;
    if now % SCHED_TICK_DIVIDER == 0 && crate::process::scheduler::enabled() {
        crate::process::scheduler::schedule_bsp(frame);
    }
}

/// Busy wait on the tick counter. Only usable before the scheduler runs.
pub fn sleep_no_task(ticks_to_wait: u64) {
    let start = ticks();
    while ticks() < start + ticks_to_wait {
        core::hint::spin_loop();
    }
}

pub fn stopwatch_start() -> u64 {
    ticks()
}

pub fn stopwatch_stop(start: u64) -> u64 {
    ticks() - start
}
