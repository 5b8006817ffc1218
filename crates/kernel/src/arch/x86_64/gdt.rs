// Global Descriptor Table
//
// Flat long-mode segments. SYSRET computes CS as STAR[63:48]+16 and SS as
// STAR[63:48]+8, so user data must come before user code in the table.
// That ordering fixes the user selectors at ss=0x1B/cs=0x23 (RPL 3); the
// ring-3 TaskRegs defaults and the STAR programming both derive from the
// constants here.

use lazy_static::lazy_static;
use x86_64::instructions::segmentation::{Segment, CS, SS};
use x86_64::instructions::tables::load_tss;
use x86_64::structures::gdt::{Descriptor, GlobalDescriptorTable, SegmentSelector};
use x86_64::structures::tss::TaskStateSegment;
use x86_64::VirtAddr;

pub const KERNEL_CS: u16 = 0x08;
pub const KERNEL_SS: u16 = 0x10;
pub const USER_SS: u16 = 0x1B;
pub const USER_CS: u16 = 0x23;

static mut TSS: TaskStateSegment = TaskStateSegment::new();

struct Selectors {
    kernel_code: SegmentSelector,
    kernel_data: SegmentSelector,
    user_data: SegmentSelector,
    user_code: SegmentSelector,
    tss: SegmentSelector,
}

lazy_static! {
    static ref GDT: (GlobalDescriptorTable, Selectors) = {
        let mut gdt = GlobalDescriptorTable::new();

        // Entry 0 is the mandatory null descriptor.
        let kernel_code = gdt.add_entry(Descriptor::kernel_code_segment()); // 0x08
        let kernel_data = gdt.add_entry(Descriptor::kernel_data_segment()); // 0x10
        // User data must come before user code for SYSRET compatibility.
        let user_data = gdt.add_entry(Descriptor::user_data_segment()); // 0x18 | RPL3 = 0x1B
        let user_code = gdt.add_entry(Descriptor::user_code_segment()); // 0x20 | RPL3 = 0x23
        let tss = gdt.add_entry(Descriptor::tss_segment(unsafe {
            &*core::ptr::addr_of!(TSS)
        }));

        (
            gdt,
            Selectors {
                kernel_code,
                kernel_data,
                user_data,
                user_code,
                tss,
            },
        )
    };
}

pub fn init() {
    GDT.0.load();
    unsafe {
        CS::set_reg(GDT.1.kernel_code);
        SS::set_reg(GDT.1.kernel_data);
        load_tss(GDT.1.tss);
    }

    debug_assert_eq!(GDT.1.kernel_code.0, KERNEL_CS);
    debug_assert_eq!(GDT.1.kernel_data.0, KERNEL_SS);
    debug_assert_eq!(GDT.1.user_data.0, USER_SS);
    debug_assert_eq!(GDT.1.user_code.0, USER_CS);

    crate::info!("gdt: loaded, kernel cs={:#x} user cs={:#x}", KERNEL_CS, USER_CS);
}

pub fn kernel_code_selector() -> SegmentSelector {
    GDT.1.kernel_code
}

pub fn kernel_data_selector() -> SegmentSelector {
    GDT.1.kernel_data
}

pub fn user_code_selector() -> SegmentSelector {
    GDT.1.user_code
}

pub fn user_data_selector() -> SegmentSelector {
    GDT.1.user_data
}

/// Install the kernel stack used on ring-3 to ring-0 interrupt entry.
pub fn set_interrupt_stack(rsp: u64) {
    unsafe {
        (*core::ptr::addr_of_mut!(TSS)).privilege_stack_table[0] = VirtAddr::new(rsp);
    }
}
