// Compile-time kernel configuration

/// Maximum number of CPUs the static per-CPU tables are sized for.
pub const MAX_CPUS: usize = 8;

/// Stack size for kernel worker threads spawned via `new_kernel_process`.
pub const TASK_STACK_SIZE: usize = 64 * 1024;

/// Per-thread kernel stack (entered on interrupts and syscalls).
pub const KERNEL_STACK_SIZE: usize = 4096;

/// PIT channel 0 divisor: 1193182 Hz / 1193 ~= 1000 Hz.
pub const PIT_DIVISOR: u16 = 1193;

/// The scheduler runs every SCHED_TICK_DIVIDER-th timer tick.
pub const SCHED_TICK_DIVIDER: u64 = 2;

/// IDT vector for the PIT timer (IRQ 0 after PIC remap).
pub const TIMER_VECTOR: u8 = 32;

/// IDT vector used for cross-CPU reschedule requests.
pub const RESCHED_IPI_VECTOR: u8 = 253;

/// Longest allowed path component, matching the on-disk name field.
pub const MAX_NAME_LEN: usize = 201;

/// Load address for raw user binaries.
pub const USER_LOAD_ADDR: u64 = 0x40_0000;

/// Top of the user stack mapping.
pub const USER_STACK_TOP: u64 = 0x7FFF_FFFF_F000;
