// SMP wiring: per-CPU blocks, reschedule IPIs, AP bring-up

pub mod ipi;
pub mod percpu;

use crate::config::MAX_CPUS;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

static CPU_ONLINE: [AtomicBool; MAX_CPUS] = [
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
    AtomicBool::new(false),
];

static ONLINE_COUNT: AtomicUsize = AtomicUsize::new(0);

pub fn set_cpu_online(cpu: usize) {
    if cpu < MAX_CPUS && !CPU_ONLINE[cpu].swap(true, Ordering::SeqCst) {
        ONLINE_COUNT.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn is_cpu_online(cpu: usize) -> bool {
    cpu < MAX_CPUS && CPU_ONLINE[cpu].load(Ordering::SeqCst)
}

pub fn online_count() -> usize {
    ONLINE_COUNT.load(Ordering::SeqCst)
}

/// Entry point every application processor lands on once the platform
/// trampoline has it in long mode with the kernel address space active.
#[cfg(target_os = "none")]
pub fn ap_entry(cpu_index: usize) -> ! {
    use crate::arch::x86_64;

    percpu::init_cpu(cpu_index);
    unsafe { x86_64::idt::load() };
    crate::process::scheduler::scheduler_init_ap();
    set_cpu_online(cpu_index);
    crate::info!("smp: cpu {} online", cpu_index);

    x86_64::cpu::interrupts_enable();
    loop {
        x86_64::cpu::halt();
    }
}

/// Walk the platform's processor records and start every usable AP. The
/// INIT-SIPI-SIPI transaction itself goes through the APIC contract; the
/// real-mode trampoline is installed by the platform layer.
#[cfg(target_os = "none")]
pub fn launch_cpus() {
    use crate::arch::x86_64::apic;

    let bsp_id = apic::get_lapic_id();
    for record in apic::cpu_records() {
        if !record.usable() || record.apic_id == bsp_id {
            continue;
        }
        // INIT, then two start-up IPIs per the MP spec.
        apic::send_ipi(record.apic_id, 0x4500);
        crate::time::sleep_no_task(10);
        apic::send_ipi(record.apic_id, 0x4608);
        apic::send_ipi(record.apic_id, 0x4608);
        crate::debug!("smp: kicked apic id {}", record.apic_id);
    }
}
