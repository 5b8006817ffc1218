// Per-CPU data blocks
//
// One CpuLocals per possible CPU, reached through the GS base MSR on bare
// metal. The first two fields are read by the syscall entry stub at
// gs:[0]/gs:[8]; keep them first.

use crate::arch::x86_64::cpu;
use crate::config::MAX_CPUS;
use crate::lib::arena::Handle;
use core::sync::atomic::{AtomicU64, Ordering};

const NO_TID: u64 = u64::MAX;

#[repr(C)]
pub struct CpuLocals {
    /// Kernel stack top of the current thread. gs:[0] in the syscall stub.
    pub thread_kernel_stack: AtomicU64,
    /// User stack stash of the current thread. gs:[8] in the syscall stub.
    pub thread_user_stack: AtomicU64,
    pub cpu_index: usize,
    current_tid: AtomicU64,
    idle_tid: AtomicU64,
    pub idle_start_tsc: AtomicU64,
    pub idle_end_tsc: AtomicU64,
    pub idle_tsc_count: AtomicU64,
    pub total_tsc: AtomicU64,
}

impl CpuLocals {
    const fn new(cpu_index: usize) -> Self {
        Self {
            thread_kernel_stack: AtomicU64::new(0),
            thread_user_stack: AtomicU64::new(0),
            cpu_index,
            current_tid: AtomicU64::new(NO_TID),
            idle_tid: AtomicU64::new(NO_TID),
            idle_start_tsc: AtomicU64::new(0),
            idle_end_tsc: AtomicU64::new(0),
            idle_tsc_count: AtomicU64::new(0),
            total_tsc: AtomicU64::new(0),
        }
    }

    pub fn current_tid(&self) -> Option<Handle> {
        match self.current_tid.load(Ordering::Acquire) {
            NO_TID => None,
            raw => Some(Handle::unpack(raw)),
        }
    }

    pub fn set_current_tid(&self, tid: Option<Handle>) {
        self.current_tid
            .store(tid.map(|t| t.pack()).unwrap_or(NO_TID), Ordering::Release);
    }

    pub fn idle_tid(&self) -> Option<Handle> {
        match self.idle_tid.load(Ordering::Acquire) {
            NO_TID => None,
            raw => Some(Handle::unpack(raw)),
        }
    }

    pub fn set_idle_tid(&self, tid: Handle) {
        self.idle_tid.store(tid.pack(), Ordering::Release);
    }
}

static CPU_LOCALS: [CpuLocals; MAX_CPUS] = [
    CpuLocals::new(0),
    CpuLocals::new(1),
    CpuLocals::new(2),
    CpuLocals::new(3),
    CpuLocals::new(4),
    CpuLocals::new(5),
    CpuLocals::new(6),
    CpuLocals::new(7),
];

/// Point GS at this CPU's block. Called once per CPU during bring-up.
pub fn init_cpu(cpu_index: usize) {
    let locals = &CPU_LOCALS[cpu_index];
    cpu::write_gs_base(locals as *const CpuLocals as u64);
}

/// The calling CPU's block. Hosted builds resolve to CPU 0.
pub fn current() -> &'static CpuLocals {
    let base = cpu::read_gs_base();
    if base == 0 {
        return &CPU_LOCALS[0];
    }
    unsafe { &*(base as *const CpuLocals) }
}

pub fn get(cpu_index: usize) -> &'static CpuLocals {
    &CPU_LOCALS[core::cmp::min(cpu_index, MAX_CPUS - 1)]
}
