// Interrupt entry stubs and dispatch
//
// Each stub normalizes the stack to the InterruptFrame layout (dummy error
// word for vectors the CPU does not push one for, then the vector number,
// then all general registers) and hands the frame pointer to
// `interrupt_dispatch`. The push order below is the inverse of the
// InterruptFrame field order.

use super::trapframe::InterruptFrame;
use crate::config::{RESCHED_IPI_VECTOR, TIMER_VECTOR};

core::arch::global_asm!(
    r#"
.section .text

.global isr_divide_error
isr_divide_error:
    push 0
    push 0
    jmp isr_common

.global isr_page_fault
isr_page_fault:
    // CPU already pushed the error code; it lands in the err slot.
    push 14
    jmp isr_common

.global isr_timer
isr_timer:
    push 0
    push 32
    jmp isr_common

.global isr_resched
isr_resched:
    push 0
    push 253
    jmp isr_common

isr_common:
    push rax
    push rbx
    push rcx
    push rdx
    push rsi
    push rdi
    push rbp
    push r8
    push r9
    push r10
    push r11
    push r12
    push r13
    push r14
    push r15
    mov rdi, rsp
    cld
    call interrupt_dispatch
    pop r15
    pop r14
    pop r13
    pop r12
    pop r11
    pop r10
    pop r9
    pop r8
    pop rbp
    pop rdi
    pop rsi
    pop rdx
    pop rcx
    pop rbx
    pop rax
    add rsp, 16
    iretq
"#
);

#[no_mangle]
extern "C" fn interrupt_dispatch(frame: *mut InterruptFrame) {
    let frame = unsafe { &mut *frame };
    let vector = frame.int_no as u8;

    match vector {
        0 => crate::process::scheduler::handle_fault(frame, "divide error"),
        14 => crate::process::scheduler::handle_fault(frame, "page fault"),
        v if v == TIMER_VECTOR => {
            crate::time::timer_tick(frame);
            super::pit::end_of_interrupt();
        }
        v if v == RESCHED_IPI_VECTOR => {
            crate::smp::ipi::handle_resched(frame);
            super::apic::eoi();
        }
        other => {
            crate::warn!("interrupt: unexpected vector {}", other);
        }
    }
}
