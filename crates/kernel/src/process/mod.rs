// Process management
//
// Processes own an address-space root, a descriptor table, and the list
// of their thread ids. Threads live in the global task table; both tables
// are stable-id arenas so scheduler and VFS code can hold elements across
// preemption.

pub mod exec;
pub mod scheduler;
pub mod task;

pub use task::{Pid, Task, TaskState, Tid};

use crate::config::TASK_STACK_SIZE;
use crate::lib::arena::{Arena, ArenaRef, Handle};
use crate::lib::error::{Errno, Result};
use crate::vfs::{FdTable, OpenFlags};
use alloc::string::String;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::Mutex;

pub struct Process {
    pub name: String,
    pid: AtomicU64,
    pub cr3: AtomicU64,
    pub uid: u32,
    pub gid: u32,
    /// Child thread ids, a stable-id list of its own.
    pub threads: Arena<Tid>,
    pub fd_table: Mutex<FdTable>,
}

impl Process {
    pub fn pid(&self) -> Option<Pid> {
        match self.pid.load(Ordering::Acquire) {
            u64::MAX => None,
            raw => Some(Handle::unpack(raw)),
        }
    }

    fn set_pid(&self, pid: Pid) {
        self.pid.store(pid.pack(), Ordering::Release);
    }
}

/// Global thread table.
pub static TASKS: Arena<Task> = Arena::new();
/// Global process table.
pub static PROCESSES: Arena<Process> = Arena::new();

/// Allocate a process record. Standard descriptors are wired to the
/// console when the device exists.
pub fn new_process(name: &str, cr3: u64) -> Pid {
    let mut fd_table = FdTable::new();
    if let Ok(tty) = crate::vfs::open("/dev/tty1", OpenFlags::O_RDWR) {
        for _ in 0..3 {
            let _ = fd_table.alloc_fd(tty.clone());
        }
    }

    let process = Process {
        name: name.into(),
        pid: AtomicU64::new(u64::MAX),
        cr3: AtomicU64::new(cr3),
        uid: 0,
        gid: 0,
        threads: Arena::new(),
        fd_table: Mutex::new(fd_table),
    };

    let pid = scheduler::with_sched_lock(|| {
        let pid = PROCESSES.insert(process);
        if let Some(slot) = PROCESSES.get(pid) {
            slot.set_pid(pid);
        }
        pid
    });
    crate::debug!("process: created pid {} ({})", pid, name);
    pid
}

/// Insert a thread into the global table without a parent process.
pub fn add_new_thread(task: Task) -> Tid {
    scheduler::with_sched_lock(|| {
        let tid = TASKS.insert(task);
        if let Some(slot) = TASKS.get(tid) {
            slot.set_tid(tid);
        }
        tid
    })
}

/// Insert a thread and attach it to its parent process: the thread
/// inherits the parent's cr3 and its tid is appended to the parent's
/// thread list.
pub fn add_new_child_thread(task: Task, pid: Pid) -> Result<Tid> {
    scheduler::with_sched_lock(|| {
        let Some(parent) = PROCESSES.get(pid) else {
            crate::error!("process: no parent process for child thread");
            return Err(Errno::ESRCH);
        };

        let tid = TASKS.insert(task);
        if let Some(slot) = TASKS.get(tid) {
            slot.set_tid(tid);
            slot.set_parent_pid(pid);
            slot.regs().cr3 = parent.cr3.load(Ordering::Acquire);
        }
        parent.threads.insert(tid);
        Ok(tid)
    })
}

/// Create a thread and register it as a child of `pid`.
pub fn new_thread(name: &str, entry: u64, rsp: u64, pid: Pid, ring: u8) -> Result<Tid> {
    let task = Task::create_thread(name, entry, rsp, ring);
    add_new_child_thread(task, pid)
}

/// Convenience composition: a process sharing the kernel address space
/// plus one ring-0 thread running `entry` on a fresh stack.
pub fn new_kernel_process(name: &str, entry: fn() -> !) -> Result<(Pid, Tid)> {
    let pid = new_process(name, crate::mm::vmm::base_kernel_cr3());

    let stack = alloc::vec![0u8; TASK_STACK_SIZE].into_boxed_slice();
    let rsp = (stack.as_ptr() as u64 + TASK_STACK_SIZE as u64) & !0xF;

    let task = Task::create_thread(name, entry as usize as u64, rsp, 0);
    task.adopt_stack(stack);
    let tid = add_new_child_thread(task, pid)?;
    Ok((pid, tid))
}

/// The calling CPU's current thread id.
pub fn current_tid() -> Option<Tid> {
    crate::smp::percpu::current().current_tid()
}

pub fn current_task() -> Option<ArenaRef<'static, Task>> {
    TASKS.get(current_tid()?)
}

pub fn current_pid() -> Option<Pid> {
    current_task()?.parent_pid()
}

pub fn current_process() -> Option<ArenaRef<'static, Process>> {
    PROCESSES.get(current_pid()?)
}

/// Mirror an error into the calling thread's local block, negative-errno
/// convention.
pub fn set_errno(errno: Errno) {
    if let Some(task) = current_task() {
        task.set_errno(errno.as_i64());
    }
}

pub fn current_errno() -> i64 {
    current_task().map(|t| t.errno()).unwrap_or(0)
}
