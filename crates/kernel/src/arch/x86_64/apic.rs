// Local APIC access
//
// Consumed contract for the scheduler's cross-CPU signalling: LAPIC id of
// the calling CPU, raw ICR sends, EOI, and the processor records the
// platform discovered at boot (MADT parsing itself lives with the platform
// layer, which registers each record here).

use alloc::vec::Vec;
use spin::RwLock;

/// xAPIC MMIO window. The boot mapping keeps this physically addressed
/// region accessible.
#[cfg(target_os = "none")]
const LAPIC_BASE: u64 = 0xFEE0_0000;

#[cfg(target_os = "none")]
mod regs {
    pub const ID: u64 = 0x020;
    pub const EOI: u64 = 0x0B0;
    pub const SPURIOUS: u64 = 0x0F0;
    pub const ICR_LOW: u64 = 0x300;
    pub const ICR_HIGH: u64 = 0x310;
}

/// One processor record: LAPIC id plus the MADT flag word
/// (bit 0 = enabled, bit 1 = online capable).
#[derive(Debug, Clone, Copy)]
pub struct CpuRecord {
    pub apic_id: u32,
    pub cpu_flags: u32,
}

impl CpuRecord {
    pub fn usable(&self) -> bool {
        self.cpu_flags & 0b11 != 0
    }
}

static CPU_RECORDS: RwLock<Vec<CpuRecord>> = RwLock::new(Vec::new());

pub fn register_cpu(record: CpuRecord) {
    CPU_RECORDS.write().push(record);
}

pub fn cpu_records() -> Vec<CpuRecord> {
    CPU_RECORDS.read().clone()
}

#[cfg(target_os = "none")]
unsafe fn lapic_read(reg: u64) -> u32 {
    core::ptr::read_volatile((LAPIC_BASE + reg) as *const u32)
}

#[cfg(target_os = "none")]
unsafe fn lapic_write(reg: u64, value: u32) {
    core::ptr::write_volatile((LAPIC_BASE + reg) as *mut u32, value);
}

/// Software-enable the local APIC with the spurious vector parked at 0xFF.
#[cfg(target_os = "none")]
pub fn configure_apic() {
    let cpuid = raw_cpuid::CpuId::new();
    let has_apic = cpuid
        .get_feature_info()
        .map(|f| f.has_apic())
        .unwrap_or(false);
    if !has_apic {
        crate::warn!("apic: cpu reports no local APIC");
        return;
    }

    unsafe {
        let svr = lapic_read(regs::SPURIOUS);
        lapic_write(regs::SPURIOUS, svr | 0x100 | 0xFF);
    }
    crate::info!("apic: enabled, lapic id {}", get_lapic_id());
}

#[cfg(not(target_os = "none"))]
pub fn configure_apic() {}

#[cfg(target_os = "none")]
pub fn get_lapic_id() -> u32 {
    unsafe { lapic_read(regs::ID) >> 24 }
}

#[cfg(not(target_os = "none"))]
pub fn get_lapic_id() -> u32 {
    0
}

/// Raw ICR send. `icr_low` carries the delivery mode and vector bits; the
/// destination goes in ICR_HIGH bits 24..31.
#[cfg(target_os = "none")]
pub fn send_ipi(apic_id: u32, icr_low: u32) {
    unsafe {
        lapic_write(regs::ICR_HIGH, apic_id << 24);
        lapic_write(regs::ICR_LOW, icr_low);
        // Wait for the delivery-status bit to clear.
        while lapic_read(regs::ICR_LOW) & (1 << 12) != 0 {
            core::hint::spin_loop();
        }
    }
}

#[cfg(not(target_os = "none"))]
pub fn send_ipi(_apic_id: u32, _icr_low: u32) {}

#[cfg(target_os = "none")]
pub fn eoi() {
    unsafe { lapic_write(regs::EOI, 0) };
}

#[cfg(not(target_os = "none"))]
pub fn eoi() {}
