// Thread records
//
// A Task is one schedulable thread: saved register image, privilege ring,
// stacks, TSC accounting, and the FS-base thread-local block. Fields the
// scheduler mutates are atomics or locked, so a shared task reference out
// of the thread table is enough for every writer.

use crate::arch::x86_64::cpu;
use crate::arch::x86_64::trapframe::InterruptFrame;
use crate::config::KERNEL_STACK_SIZE;
use crate::lib::arena::Handle;
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicI64, AtomicU64, AtomicU8, Ordering};
use spin::Mutex;

pub type Tid = Handle;
pub type Pid = Handle;

const NO_ID: u64 = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Ready = 0,
    Running = 1,
    Blocked = 2,
    Zombie = 3,
}

/// Saved register image for a thread, the scheduler's copy-in/copy-out
/// target. cs/ss defaults differ per ring; rflags always has IF and the
/// reserved bit set.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct TaskRegs {
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
    pub rip: u64,
    pub cs: u64,
    pub rflags: u64,
    pub rsp: u64,
    pub ss: u64,
    pub cr3: u64,
    pub fs: u64,
}

pub const KERNEL_CS: u64 = 0x08;
pub const KERNEL_SS: u64 = 0x10;
// User data precedes user code in the GDT so SYSRET's fixed +8/+16
// selector arithmetic resolves both; CS is always SS + 8.
pub const USER_SS: u64 = 0x1B;
pub const USER_CS: u64 = 0x23;
pub const DEFAULT_RFLAGS: u64 = 0x202;

impl TaskRegs {
    pub const fn default_kernel() -> Self {
        let mut regs = Self::zeroed();
        regs.cs = KERNEL_CS;
        regs.ss = KERNEL_SS;
        regs.rflags = DEFAULT_RFLAGS;
        regs
    }

    pub const fn default_user() -> Self {
        let mut regs = Self::zeroed();
        regs.cs = USER_CS;
        regs.ss = USER_SS;
        regs.rflags = DEFAULT_RFLAGS;
        regs
    }

    const fn zeroed() -> Self {
        Self {
            r15: 0,
            r14: 0,
            r13: 0,
            r12: 0,
            r11: 0,
            r10: 0,
            r9: 0,
            r8: 0,
            rbp: 0,
            rdi: 0,
            rsi: 0,
            rdx: 0,
            rcx: 0,
            rbx: 0,
            rax: 0,
            rip: 0,
            cs: 0,
            rflags: 0,
            rsp: 0,
            ss: 0,
            cr3: 0,
            fs: 0,
        }
    }

    /// Capture an interrupted frame.
    pub fn save_frame(&mut self, frame: &InterruptFrame) {
        self.r15 = frame.r15;
        self.r14 = frame.r14;
        self.r13 = frame.r13;
        self.r12 = frame.r12;
        self.r11 = frame.r11;
        self.r10 = frame.r10;
        self.r9 = frame.r9;
        self.r8 = frame.r8;
        self.rbp = frame.rbp;
        self.rdi = frame.rdi;
        self.rsi = frame.rsi;
        self.rdx = frame.rdx;
        self.rcx = frame.rcx;
        self.rbx = frame.rbx;
        self.rax = frame.rax;
        self.rip = frame.rip;
        self.cs = frame.cs;
        self.rflags = frame.rflags;
        self.rsp = frame.rsp;
        self.ss = frame.ss;
    }

    /// Install this image into the frame the interrupt will return
    /// through.
    pub fn load_frame(&self, frame: &mut InterruptFrame) {
        frame.r15 = self.r15;
        frame.r14 = self.r14;
        frame.r13 = self.r13;
        frame.r12 = self.r12;
        frame.r11 = self.r11;
        frame.r10 = self.r10;
        frame.r9 = self.r9;
        frame.r8 = self.r8;
        frame.rbp = self.rbp;
        frame.rdi = self.rdi;
        frame.rsi = self.rsi;
        frame.rdx = self.rdx;
        frame.rcx = self.rcx;
        frame.rbx = self.rbx;
        frame.rax = self.rax;
        frame.rip = self.rip;
        frame.cs = self.cs;
        frame.rflags = self.rflags;
        frame.rsp = self.rsp;
        frame.ss = self.ss;
    }
}

/// Thread-local block reached through FS. The first field is a pointer to
/// the block itself so user code can locate it via fs:[0].
#[repr(C)]
pub struct ThreadInfoBlock {
    pub meta_pointer: AtomicU64,
    pub tid: AtomicU64,
    pub errno: AtomicI64,
}

pub struct Task {
    pub name: String,
    pub ring: u8,
    state: AtomicU8,
    regs: Mutex<TaskRegs>,
    tid: AtomicU64,
    parent_pid: AtomicU64,
    /// Stack tops as stashed in the CPU locals while running.
    pub kernel_stack: AtomicU64,
    pub user_stack: AtomicU64,
    pub tsc_total: AtomicU64,
    pub tsc_started: AtomicU64,
    pub tsc_stopped: AtomicU64,
    info_block: Box<ThreadInfoBlock>,
    /// Backing allocations whose lifetime is tied to the thread.
    stacks: Mutex<Vec<Box<[u8]>>>,
}

impl Task {
    /// Build a thread record with a default register frame for the ring, a
    /// fresh kernel stack, and a thread-local block pointing at itself.
    pub fn create_thread(name: &str, entry: u64, rsp: u64, ring: u8) -> Task {
        let mut regs = if ring == 3 {
            TaskRegs::default_user()
        } else {
            TaskRegs::default_kernel()
        };
        regs.rip = entry;
        regs.rsp = rsp;
        regs.cr3 = crate::mm::vmm::base_kernel_cr3();

        let info_block = Box::new(ThreadInfoBlock {
            meta_pointer: AtomicU64::new(0),
            tid: AtomicU64::new(NO_ID),
            errno: AtomicI64::new(0),
        });
        let info_addr = &*info_block as *const ThreadInfoBlock as u64;
        info_block.meta_pointer.store(info_addr, Ordering::SeqCst);
        regs.fs = info_addr;

        let kstack = alloc::vec![0u8; KERNEL_STACK_SIZE].into_boxed_slice();
        let kstack_top = (kstack.as_ptr() as u64 + KERNEL_STACK_SIZE as u64) & !0xF;

        Task {
            name: name.into(),
            ring,
            state: AtomicU8::new(TaskState::Ready as u8),
            regs: Mutex::new(regs),
            tid: AtomicU64::new(NO_ID),
            parent_pid: AtomicU64::new(NO_ID),
            kernel_stack: AtomicU64::new(kstack_top),
            user_stack: AtomicU64::new(0),
            tsc_total: AtomicU64::new(0),
            tsc_started: AtomicU64::new(0),
            tsc_stopped: AtomicU64::new(0),
            info_block,
            stacks: Mutex::new(alloc::vec![kstack]),
        }
    }

    pub fn state(&self) -> TaskState {
        match self.state.load(Ordering::Acquire) {
            0 => TaskState::Ready,
            1 => TaskState::Running,
            2 => TaskState::Blocked,
            _ => TaskState::Zombie,
        }
    }

    pub fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub fn tid(&self) -> Option<Tid> {
        match self.tid.load(Ordering::Acquire) {
            NO_ID => None,
            raw => Some(Handle::unpack(raw)),
        }
    }

    pub fn set_tid(&self, tid: Tid) {
        self.tid.store(tid.pack(), Ordering::Release);
        self.info_block.tid.store(tid.pack(), Ordering::Release);
    }

    pub fn parent_pid(&self) -> Option<Pid> {
        match self.parent_pid.load(Ordering::Acquire) {
            NO_ID => None,
            raw => Some(Handle::unpack(raw)),
        }
    }

    pub fn set_parent_pid(&self, pid: Pid) {
        self.parent_pid.store(pid.pack(), Ordering::Release);
    }

    pub fn regs(&self) -> spin::MutexGuard<'_, TaskRegs> {
        self.regs.lock()
    }

    pub fn errno(&self) -> i64 {
        self.info_block.errno.load(Ordering::Acquire)
    }

    pub fn set_errno(&self, value: i64) {
        self.info_block.errno.store(value, Ordering::Release);
    }

    pub fn info_block_addr(&self) -> u64 {
        &*self.info_block as *const ThreadInfoBlock as u64
    }

    /// Record the thread-local's FS base into the frame on switch-in.
    pub fn fs_base(&self) -> u64 {
        self.regs.lock().fs
    }

    /// Tie a stack (or other backing allocation) to this thread's
    /// lifetime.
    pub fn adopt_stack(&self, stack: Box<[u8]>) {
        self.stacks.lock().push(stack);
    }

    /// TSC accounting on switch-out.
    pub fn account_stop(&self) {
        let now = cpu::read_tsc();
        self.tsc_stopped.store(now, Ordering::Relaxed);
        let started = self.tsc_started.load(Ordering::Relaxed);
        self.tsc_total
            .fetch_add(now.saturating_sub(started), Ordering::Relaxed);
    }

    pub fn account_start(&self) {
        self.tsc_started.store(cpu::read_tsc(), Ordering::Relaxed);
    }
}

impl core::fmt::Debug for Task {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("tid", &self.tid())
            .field("state", &self.state())
            .field("ring", &self.ring)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_defaults() {
        let kernel = TaskRegs::default_kernel();
        assert_eq!(kernel.cs, 0x08);
        assert_eq!(kernel.ss, 0x10);
        assert_eq!(kernel.rflags, 0x202);

        let user = TaskRegs::default_user();
        assert_eq!(user.cs, 0x23);
        assert_eq!(user.ss, 0x1B);
        assert_eq!(user.rflags, 0x202);
        // SYSRET derives CS as SS + 8; the GDT order must keep it that way.
        assert_eq!(USER_CS, USER_SS + 8);
    }

    #[test]
    fn frame_round_trip() {
        let mut regs = TaskRegs::default_kernel();
        let mut frame = InterruptFrame::default();
        frame.rax = 0xAA;
        frame.r15 = 0x15;
        frame.rip = 0x1000;
        frame.rsp = 0x2000;
        frame.cs = 0x08;
        frame.ss = 0x10;
        frame.rflags = 0x202;
        regs.save_frame(&frame);

        let mut out = InterruptFrame::default();
        regs.load_frame(&mut out);
        assert_eq!(out, frame);
    }

    #[test]
    fn thread_local_block_self_pointer() {
        let task = Task::create_thread("t", 0x1234, 0x5678, 0);
        let fs = task.fs_base();
        assert_eq!(fs, task.info_block_addr());
        // fs:[0] dereferences to the block itself.
        let meta = unsafe { *(fs as *const u64) };
        assert_eq!(meta, fs);

        let regs = task.regs();
        assert_eq!(regs.rip, 0x1234);
        assert_eq!(regs.rsp, 0x5678);
        assert_eq!(task.state(), TaskState::Ready);
    }

    #[test]
    fn kernel_stack_is_aligned() {
        let task = Task::create_thread("t", 0, 0, 0);
        let top = task.kernel_stack.load(Ordering::Relaxed);
        assert_eq!(top & 0xF, 0);
        assert_ne!(top, 0);
    }
}
