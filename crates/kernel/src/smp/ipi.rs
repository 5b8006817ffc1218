// Reschedule IPIs
//
// The BSP broadcasts vector 253 to every other online CPU on each
// scheduler tick; receiving CPUs reschedule locally without
// re-broadcasting.

use crate::arch::x86_64::apic;
use crate::arch::x86_64::trapframe::InterruptFrame;
use crate::config::{MAX_CPUS, RESCHED_IPI_VECTOR};
use core::sync::atomic::{AtomicU64, Ordering};

/// ICR low word: fixed delivery, assert level, vector 253.
const RESCHED_ICR: u32 = (1 << 14) | RESCHED_IPI_VECTOR as u32;

/// Reschedule IPIs received, per CPU.
static RESCHED_RECEIVED: [AtomicU64; MAX_CPUS] = [
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
    AtomicU64::new(0),
];

/// Reschedule IPIs sent by this kernel since boot.
static RESCHED_SENT: AtomicU64 = AtomicU64::new(0);

/// Broadcast a reschedule request to every usable CPU except the caller.
pub fn send_scheduler_ipis() {
    let self_id = apic::get_lapic_id();
    for record in apic::cpu_records() {
        if record.usable() && record.apic_id != self_id {
            apic::send_ipi(record.apic_id, RESCHED_ICR);
            RESCHED_SENT.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Vector-253 handler body.
pub fn handle_resched(frame: &mut InterruptFrame) {
    let cpu = crate::smp::percpu::current().cpu_index;
    RESCHED_RECEIVED[cpu].fetch_add(1, Ordering::Relaxed);
    crate::process::scheduler::schedule_ap(frame);
}

pub fn resched_sent() -> u64 {
    RESCHED_SENT.load(Ordering::Relaxed)
}

pub fn resched_received(cpu: usize) -> u64 {
    RESCHED_RECEIVED[core::cmp::min(cpu, MAX_CPUS - 1)].load(Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_skips_self_and_offline() {
        // Hosted LAPIC id is 0; records: self, one enabled AP, one disabled.
        apic::register_cpu(apic::CpuRecord {
            apic_id: 0,
            cpu_flags: 1,
        });
        apic::register_cpu(apic::CpuRecord {
            apic_id: 1,
            cpu_flags: 1,
        });
        apic::register_cpu(apic::CpuRecord {
            apic_id: 2,
            cpu_flags: 0,
        });

        let before = resched_sent();
        send_scheduler_ipis();
        assert_eq!(resched_sent() - before, 1);
    }

    #[test]
    fn icr_word_targets_vector_253() {
        assert_eq!(RESCHED_ICR & 0xFF, 253);
        assert_ne!(RESCHED_ICR & (1 << 14), 0);
    }
}
