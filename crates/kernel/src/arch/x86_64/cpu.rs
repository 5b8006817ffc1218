// CPU helpers: TSC, segment-base MSRs, interrupt gating

/// MSR numbers for the repurposed segment bases. FS carries the
/// thread-local block, GS the per-CPU block.
pub const MSR_FS_BASE: u32 = 0xC000_0100;
pub const MSR_GS_BASE: u32 = 0xC000_0101;

pub fn read_tsc() -> u64 {
    unsafe { core::arch::x86_64::_rdtsc() }
}

#[cfg(target_os = "none")]
pub fn write_fs_base(value: u64) {
    unsafe { x86_64::registers::model_specific::Msr::new(MSR_FS_BASE).write(value) };
}

#[cfg(not(target_os = "none"))]
pub fn write_fs_base(_value: u64) {}

#[cfg(target_os = "none")]
pub fn read_gs_base() -> u64 {
    unsafe { x86_64::registers::model_specific::Msr::new(MSR_GS_BASE).read() }
}

#[cfg(not(target_os = "none"))]
pub fn read_gs_base() -> u64 {
    0
}

#[cfg(target_os = "none")]
pub fn write_gs_base(value: u64) {
    unsafe { x86_64::registers::model_specific::Msr::new(MSR_GS_BASE).write(value) };
}

#[cfg(not(target_os = "none"))]
pub fn write_gs_base(_value: u64) {}

#[cfg(target_os = "none")]
pub fn interrupts_disable() {
    x86_64::instructions::interrupts::disable();
}

#[cfg(not(target_os = "none"))]
pub fn interrupts_disable() {}

#[cfg(target_os = "none")]
pub fn interrupts_enable() {
    x86_64::instructions::interrupts::enable();
}

#[cfg(not(target_os = "none"))]
pub fn interrupts_enable() {}

#[cfg(target_os = "none")]
pub fn halt() {
    x86_64::instructions::hlt();
}

#[cfg(not(target_os = "none"))]
pub fn halt() {
    core::hint::spin_loop();
}

/// Runs the closure with interrupts disabled, restoring the previous state
/// afterwards. The scheduler lock is only ever taken under this guard.
#[cfg(target_os = "none")]
pub fn without_interrupts<T>(f: impl FnOnce() -> T) -> T {
    x86_64::instructions::interrupts::without_interrupts(f)
}

#[cfg(not(target_os = "none"))]
pub fn without_interrupts<T>(f: impl FnOnce() -> T) -> T {
    f()
}
