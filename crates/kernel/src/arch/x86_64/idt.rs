// Interrupt Descriptor Table
//
// Raw 16-byte long-mode gate descriptors; handlers are the assembly entry
// stubs from interrupts.rs. Only the vectors this kernel actually services
// are populated: the fault vectors, the PIT timer, and the reschedule IPI.

use super::gdt::KERNEL_CS;
use crate::config::{RESCHED_IPI_VECTOR, TIMER_VECTOR};

#[repr(C, packed)]
#[derive(Clone, Copy)]
struct IdtEntry {
    offset_low: u16,
    selector: u16,
    ist: u8,
    type_attr: u8,
    offset_mid: u16,
    offset_high: u32,
    reserved: u32,
}

impl IdtEntry {
    const fn missing() -> Self {
        Self {
            offset_low: 0,
            selector: 0,
            ist: 0,
            type_attr: 0,
            offset_mid: 0,
            offset_high: 0,
            reserved: 0,
        }
    }

    fn interrupt_gate(handler: u64) -> Self {
        Self {
            offset_low: handler as u16,
            selector: KERNEL_CS,
            ist: 0,
            // Present, DPL 0, 64-bit interrupt gate.
            type_attr: 0x8E,
            offset_mid: (handler >> 16) as u16,
            offset_high: (handler >> 32) as u32,
            reserved: 0,
        }
    }
}

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u64,
}

static mut IDT: [IdtEntry; 256] = [IdtEntry::missing(); 256];

extern "C" {
    fn isr_divide_error();
    fn isr_page_fault();
    fn isr_timer();
    fn isr_resched();
}

/// Build the gate table and load it on the calling CPU.
pub fn configure_idt() {
    unsafe {
        let idt = &mut *core::ptr::addr_of_mut!(IDT);
        idt[0] = IdtEntry::interrupt_gate(isr_divide_error as usize as u64);
        idt[14] = IdtEntry::interrupt_gate(isr_page_fault as usize as u64);
        idt[TIMER_VECTOR as usize] = IdtEntry::interrupt_gate(isr_timer as usize as u64);
        idt[RESCHED_IPI_VECTOR as usize] = IdtEntry::interrupt_gate(isr_resched as usize as u64);

        load();
    }
    crate::info!("idt: configured vectors 0, 14, {}, {}", TIMER_VECTOR, RESCHED_IPI_VECTOR);
}

/// Load the already-built table (AP path).
pub unsafe fn load() {
    let pointer = IdtPointer {
        limit: (core::mem::size_of::<[IdtEntry; 256]>() - 1) as u16,
        base: core::ptr::addr_of!(IDT) as u64,
    };
    core::arch::asm!("lidt [{}]", in(reg) &pointer, options(readonly, nostack, preserves_flags));
}
