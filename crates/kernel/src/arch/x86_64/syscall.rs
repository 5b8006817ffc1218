// SYSCALL/SYSRET entry
//
// The stub swaps to the current thread's kernel stack (stashed at fixed
// offsets in the per-CPU block reachable through GS), saves the user
// return state, and calls into the dispatcher. The gs:[0]/gs:[8] offsets
// are the first two fields of smp::percpu::CpuLocals. SFMASK clears IF on
// entry, so no interrupt can land while the stack is mid-swap; the user
// RFLAGS come back from r11 at sysretq.

use super::gdt;
use x86_64::registers::model_specific::{Efer, EferFlags, LStar, SFMask, Star};
use x86_64::registers::rflags::RFlags;
use x86_64::VirtAddr;

extern "C" {
    fn syscall_stub();
}

/// Per-CPU MSR setup: segment selectors for SYSCALL/SYSRET, the entry
/// stub address, the entry flag mask, and the SCE enable bit.
pub fn init_cpu() {
    Star::write(
        gdt::user_code_selector(),
        gdt::user_data_selector(),
        gdt::kernel_code_selector(),
        gdt::kernel_data_selector(),
    )
    .expect("invalid STAR selector configuration");

    LStar::write(VirtAddr::new(syscall_stub as usize as u64));

    // Interrupts stay off until sysretq restores the user RFLAGS.
    SFMask::write(
        RFlags::INTERRUPT_FLAG
            | RFlags::TRAP_FLAG
            | RFlags::ALIGNMENT_CHECK
            | RFlags::DIRECTION_FLAG,
    );

    unsafe {
        Efer::update(|flags| {
            *flags |= EferFlags::SYSTEM_CALL_EXTENSIONS;
        });
    }
}

core::arch::global_asm!(
    r#"
.section .text
.global syscall_stub
syscall_stub:
    mov qword ptr gs:[8], rsp
    mov rsp, qword ptr gs:[0]
    push rcx
    push r11
    push rbp
    push rbx
    push r12
    push r13
    push r14
    push r15
    mov rcx, rdx
    mov rdx, rsi
    mov rsi, rdi
    mov rdi, rax
    cld
    call syscall_gateway
    pop r15
    pop r14
    pop r13
    pop r12
    pop rbx
    pop rbp
    pop r11
    pop rcx
    mov rsp, qword ptr gs:[8]
    sysretq
"#
);

#[no_mangle]
extern "C" fn syscall_gateway(nr: u64, a1: u64, a2: u64, a3: u64) -> i64 {
    crate::syscall::dispatch(nr, a1, a2, a3)
}
