// Interrupt stack frame layout
//
// Field order mirrors the hardware interrupt push plus the entry stubs'
// register saves: the stubs push rax..r15 after the vector/error words, so
// ascending memory order is r15..rax, int_no, err, then the CPU-pushed
// iretq frame. This layout is shared with the assembly in interrupts.rs
// and must not be reordered.

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterruptFrame {
    pub r15: u64,
    pub r14: u64,
    pub r13: u64,
    pub r12: u64,
    pub r11: u64,
    pub r10: u64,
    pub r9: u64,
    pub r8: u64,
    pub rbp: u64,
    pub rdi: u64,
    pub rsi: u64,
    pub rdx: u64,
    pub rcx: u64,
    pub rbx: u64,
    pub rax: u64,
    pub int_no: u64,
    pub err_code: u64,
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::mem::{offset_of, size_of};

    #[test]
    fn layout_matches_entry_stubs() {
        assert_eq!(size_of::<InterruptFrame>(), 22 * 8);
        assert_eq!(offset_of!(InterruptFrame, r15), 0);
        assert_eq!(offset_of!(InterruptFrame, rax), 14 * 8);
        assert_eq!(offset_of!(InterruptFrame, int_no), 15 * 8);
        assert_eq!(offset_of!(InterruptFrame, err_code), 16 * 8);
        assert_eq!(offset_of!(InterruptFrame, rip), 17 * 8);
        assert_eq!(offset_of!(InterruptFrame, ss), 21 * 8);
    }
}
