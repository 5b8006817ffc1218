// Preemptive SMP scheduler
//
// One shared run queue: the thread table itself. The BSP's timer tick
// broadcasts reschedule IPIs and switches locally; every switch happens
// under the single scheduler spinlock with interrupts disabled. The
// running thread on each CPU holds one counted table reference, released
// when it is switched out.

use super::task::{Task, TaskState};
use super::{Pid, Tid, PROCESSES, TASKS};
use crate::arch::x86_64::cpu;
use crate::arch::x86_64::trapframe::InterruptFrame;
use crate::lib::error::{Errno, Result};
use crate::mm::vmm;
use crate::smp::percpu::{self, CpuLocals};
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

static SCHEDULER_ENABLED: AtomicBool = AtomicBool::new(false);

/// Protects the pick-and-switch sequence and table insertions.
static SCHED_LOCK: Mutex<()> = Mutex::new(());

pub fn enabled() -> bool {
    SCHEDULER_ENABLED.load(Ordering::Acquire)
}

pub fn set_enabled(value: bool) {
    SCHEDULER_ENABLED.store(value, Ordering::Release);
}

/// Run `f` under the scheduler lock with interrupts disabled.
pub fn with_sched_lock<T>(f: impl FnOnce() -> T) -> T {
    cpu::without_interrupts(|| {
        let _guard = SCHED_LOCK.lock();
        f()
    })
}

fn idle_entry() -> ! {
    loop {
        cpu::halt();
    }
}

/// Create this CPU's idle thread: attached to the idle process (PID 0),
/// state Blocked so the picker never selects it.
fn setup_idle_task(idle_pid: Pid) {
    let stack = alloc::vec![0u8; crate::config::KERNEL_STACK_SIZE].into_boxed_slice();
    let rsp = (stack.as_ptr() as u64 + stack.len() as u64) & !0xF;
    let task = Task::create_thread("idle", idle_entry as usize as u64, rsp, 0);
    task.adopt_stack(stack);

    let tid = super::add_new_child_thread(task, idle_pid).expect("idle process exists");
    if let Some(task) = TASKS.get(tid) {
        task.set_state(TaskState::Blocked);
    }
    percpu::current().set_idle_tid(tid);
    crate::debug!("scheduler: idle task {} on cpu {}", tid, percpu::current().cpu_index);
}

/// BSP scheduler bring-up: per-CPU syscall MSRs, the idle process, and
/// this CPU's idle thread.
pub fn scheduler_init_bsp() -> Pid {
    #[cfg(target_os = "none")]
    crate::arch::x86_64::syscall::init_cpu();

    let idle_pid = super::new_process("Idle tasks", vmm::base_kernel_cr3());
    setup_idle_task(idle_pid);
    crate::info!("scheduler: bsp initialized, idle pid {}", idle_pid);
    idle_pid
}

/// AP bring-up: syscall MSRs and a local idle thread in the existing idle
/// process.
pub fn scheduler_init_ap() {
    #[cfg(target_os = "none")]
    crate::arch::x86_64::syscall::init_cpu();

    // The idle process is always the first process table slot.
    if let Some(idle_pid) = PROCESSES.get_slot(0).and_then(|p| p.pid()) {
        setup_idle_task(idle_pid);
    } else {
        crate::error!("scheduler: ap init before bsp, no idle process");
    }
}

fn start_idle(locals: &CpuLocals) {
    locals.idle_start_tsc.store(cpu::read_tsc(), Ordering::Relaxed);
}

fn end_idle(locals: &CpuLocals) {
    let now = cpu::read_tsc();
    locals.idle_end_tsc.store(now, Ordering::Relaxed);
    let started = locals.idle_start_tsc.load(Ordering::Relaxed);
    locals
        .idle_tsc_count
        .fetch_add(now.saturating_sub(started), Ordering::Relaxed);
}

/// Round-robin pick over the whole thread table, starting right after the
/// current thread's slot. Returns None when nothing is READY (the caller
/// falls back to the CPU's idle thread).
fn pick_task(locals: &CpuLocals) -> Option<Tid> {
    let current = locals.current_tid()?;
    let slots = TASKS.slot_count();

    let start = current.slot() + 1;
    for offset in 0..slots {
        let slot = (start + offset) % slots;
        if let Some(task) = TASKS.get_slot(slot) {
            if task.state() == TaskState::Ready {
                return Some(task.handle());
            }
        }
    }
    None
}

/// The context switch. Saves the outgoing thread's frame and stashed
/// stacks, picks the next READY thread (or idle), and installs its frame,
/// FS base, and address space.
pub fn schedule(frame: &mut InterruptFrame) {
    let _guard = SCHED_LOCK.lock();
    let locals = percpu::current();

    if let Some(current) = locals.current_tid() {
        let is_idle = Some(current) == locals.idle_tid();
        if let Some(task) = TASKS.get(current) {
            if is_idle {
                end_idle(locals);
            }

            {
                let mut regs = task.regs();
                regs.save_frame(frame);
                regs.cr3 = vmm::get_pml4t();
            }
            task.kernel_stack.store(
                locals.thread_kernel_stack.load(Ordering::Acquire),
                Ordering::Release,
            );
            task.user_stack.store(
                locals.thread_user_stack.load(Ordering::Acquire),
                Ordering::Release,
            );
            task.account_stop();

            if task.state() == TaskState::Running && !is_idle {
                task.set_state(TaskState::Ready);
            }
        }
        // Release the running reference taken when it was switched in.
        TASKS.unref(current);
    }

    let picked = pick_task(locals);
    let tid = match picked.or_else(|| locals.idle_tid()) {
        Some(tid) => tid,
        None => {
            // Nothing to run and no idle thread yet (early boot).
            locals.set_current_tid(None);
            return;
        }
    };

    let Some(task) = TASKS.get(tid) else {
        locals.set_current_tid(None);
        return;
    };

    if picked.is_some() {
        task.set_state(TaskState::Running);
    }

    {
        let regs = task.regs();
        regs.load_frame(frame);
        cpu::write_fs_base(regs.fs);

        if vmm::get_pml4t() != regs.cr3 {
            vmm::set_pml4t(regs.cr3);
        }
    }

    locals.thread_kernel_stack.store(
        task.kernel_stack.load(Ordering::Acquire),
        Ordering::Release,
    );
    locals
        .thread_user_stack
        .store(task.user_stack.load(Ordering::Acquire), Ordering::Release);
    #[cfg(target_os = "none")]
    crate::arch::x86_64::gdt::set_interrupt_stack(task.kernel_stack.load(Ordering::Acquire));

    task.account_start();
    locals.set_current_tid(Some(tid));

    if picked.is_none() {
        start_idle(locals);
    }
    locals.total_tsc.store(cpu::read_tsc(), Ordering::Relaxed);

    // The new current thread keeps one counted reference.
    let _ = task.leak();
}

/// BSP reschedule: signal the other CPUs, then switch locally.
pub fn schedule_bsp(frame: &mut InterruptFrame) {
    crate::smp::ipi::send_scheduler_ipis();
    schedule(frame);
}

/// IPI reschedule on an AP: local switch only, no re-broadcast.
pub fn schedule_ap(frame: &mut InterruptFrame) {
    schedule(frame);
}

/// Terminate a thread. If the victim is this CPU's current thread its
/// running reference is dropped first, then the slot is marked for
/// removal (reclaimed once the last reference goes away).
pub fn kill_task(tid: Tid) -> Result<()> {
    cpu::without_interrupts(|| {
        let _guard = SCHED_LOCK.lock();
        let locals = percpu::current();

        let Some(task) = TASKS.get(tid) else {
            return Err(Errno::ESRCH);
        };
        task.set_state(TaskState::Zombie);
        drop(task);

        if locals.current_tid() == Some(tid) {
            TASKS.unref(tid);
        }
        TASKS.remove(tid);
        Ok(())
    })
}

/// Terminate a process: every child thread, then the process slot.
pub fn kill_process(pid: Pid) -> Result<()> {
    if let Some(process) = PROCESSES.get(pid) {
        for slot in 0..process.threads.slot_count() {
            if let Some(tid) = process.threads.get_slot(slot) {
                let _ = kill_task(*tid);
            }
        }
    } else {
        return Err(Errno::ESRCH);
    }
    PROCESSES.remove(pid);
    Ok(())
}

/// CPU fault entry. Ring-3 faults are fatal to the offending thread only;
/// the scheduler switches away from the corpse. Ring-0 faults take the
/// system down.
pub fn handle_fault(frame: &mut InterruptFrame, what: &str) {
    if frame.cs & 0b11 == 0b11 {
        let tid = percpu::current().current_tid();
        crate::error!(
            "{} in ring-3 thread {:?} at rip {:#x}, killing thread",
            what,
            tid,
            frame.rip
        );
        if let Some(tid) = tid {
            let _ = kill_task(tid);
        }
        schedule(frame);
    } else {
        panic!("{} in ring 0 at rip {:#x}", what, frame.rip);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{new_kernel_process, new_process, new_thread};

    fn noop_entry() -> ! {
        loop {
            core::hint::spin_loop();
        }
    }

    /// Builds a process with an idle thread and N worker threads, and
    /// parks CPU 0 on the first worker as if it were running.
    fn setup(workers: usize) -> (Pid, Vec<Tid>) {
        let locals = percpu::current();
        locals.set_current_tid(None);

        let pid = new_process("sched-test", vmm::base_kernel_cr3());

        let stack_top = 0x8000u64;
        let idle = new_thread("idle", noop_entry as usize as u64, stack_top, pid, 0).unwrap();
        TASKS.get(idle).unwrap().set_state(TaskState::Blocked);
        locals.set_idle_tid(idle);

        let mut tids = Vec::new();
        for i in 0..workers {
            let entry = 0x1000 + i as u64 * 0x100;
            let tid = new_thread("worker", entry, stack_top, pid, 0).unwrap();
            tids.push(tid);
        }
        (pid, tids)
    }

    fn teardown(pid: Pid) {
        let locals = percpu::current();
        if let Some(cur) = locals.current_tid() {
            TASKS.unref(cur);
        }
        locals.set_current_tid(None);
        let _ = kill_process(pid);
    }

    /// Pretend `tid` is running on CPU 0, holding the running reference.
    fn install_current(tid: Tid) {
        let task = TASKS.get(tid).unwrap();
        task.set_state(TaskState::Running);
        let _ = task.leak();
        percpu::current().set_current_tid(Some(tid));
    }

    #[test]
    fn round_robin_rotation() {
        let _g = crate::lib::testing::lock();
        let (pid, tids) = setup(3);
        install_current(tids[0]);

        let mut frame = InterruptFrame::default();
        frame.rip = 0xDEAD;
        schedule(&mut frame);

        // Switched to the next READY thread after tids[0].
        let locals = percpu::current();
        assert_eq!(locals.current_tid(), Some(tids[1]));
        assert_eq!(TASKS.get(tids[1]).unwrap().state(), TaskState::Running);
        // Outgoing thread went back to READY with its frame captured.
        let t0 = TASKS.get(tids[0]).unwrap();
        assert_eq!(t0.state(), TaskState::Ready);
        assert_eq!(t0.regs().rip, 0xDEAD);
        drop(t0);
        // The incoming frame carries the new thread's context.
        assert_eq!(frame.rip, 0x1100);
        assert_eq!(frame.cs, 0x08);

        // Another tick rotates to the third worker, then wraps.
        schedule(&mut frame);
        assert_eq!(locals.current_tid(), Some(tids[2]));
        schedule(&mut frame);
        assert_eq!(locals.current_tid(), Some(tids[0]));

        teardown(pid);
    }

    #[test]
    fn idle_fallback_and_accounting() {
        let _g = crate::lib::testing::lock();
        let (pid, tids) = setup(1);
        let locals = percpu::current();

        install_current(tids[0]);
        TASKS.get(tids[0]).unwrap().set_state(TaskState::Blocked);

        let mut frame = InterruptFrame::default();
        schedule(&mut frame);

        // Nothing READY: the per-CPU idle thread is selected but stays
        // Blocked (the picker must never choose it).
        let idle = locals.idle_tid().unwrap();
        assert_eq!(locals.current_tid(), Some(idle));
        assert_eq!(TASKS.get(idle).unwrap().state(), TaskState::Blocked);

        // Waking the worker ends the idle period and accumulates idle TSC.
        let before = locals.idle_tsc_count.load(Ordering::Relaxed);
        TASKS.get(tids[0]).unwrap().set_state(TaskState::Ready);
        schedule(&mut frame);
        assert_eq!(locals.current_tid(), Some(tids[0]));
        assert!(locals.idle_tsc_count.load(Ordering::Relaxed) >= before);
        assert!(locals.total_tsc.load(Ordering::Relaxed) > 0);

        teardown(pid);
    }

    #[test]
    fn kill_current_task_switches_away() {
        let _g = crate::lib::testing::lock();
        let (pid, tids) = setup(2);
        install_current(tids[0]);

        // Kill the running thread: slot is reclaimed (self-ref released
        // first), next tick picks the survivor.
        kill_task(tids[0]).unwrap();
        assert!(TASKS.get(tids[0]).is_none());

        let mut frame = InterruptFrame::default();
        schedule(&mut frame);
        let locals = percpu::current();
        assert_eq!(locals.current_tid(), Some(tids[1]));

        teardown(pid);
    }

    #[test]
    fn create_and_kill_restores_live_count() {
        let _g = crate::lib::testing::lock();
        let before = TASKS.live_count();
        let (pid, tids) = setup(4);
        assert_eq!(TASKS.live_count(), before + 5); // 4 workers + idle

        for tid in &tids {
            kill_task(*tid).unwrap();
        }
        let _ = kill_process(pid);
        percpu::current().set_current_tid(None);
        assert_eq!(TASKS.live_count(), before);
        // Process slot can be reused afterwards.
        let pid2 = new_process("reuse", 0);
        assert!(PROCESSES.get(pid2).is_some());
        let _ = kill_process(pid2);
    }

    #[test]
    fn ring3_fault_zombifies_only_the_thread() {
        let _g = crate::lib::testing::lock();
        let (pid, tids) = setup(2);
        install_current(tids[0]);

        let mut frame = InterruptFrame::default();
        frame.cs = 0x23;
        frame.rip = 0xBAD;
        handle_fault(&mut frame, "divide error");

        // The faulting thread is gone, the other carries on.
        assert!(TASKS.get(tids[0]).is_none());
        assert_eq!(percpu::current().current_tid(), Some(tids[1]));
        assert!(TASKS.get(tids[1]).is_some());

        teardown(pid);
    }

    #[test]
    fn enabled_flag_gates_ticks() {
        let _g = crate::lib::testing::lock();
        set_enabled(false);
        assert!(!enabled());
        set_enabled(true);
        assert!(enabled());
        set_enabled(false);
    }

    #[test]
    fn kernel_worker_pair_accumulates_runtime() {
        let _g = crate::lib::testing::lock();
        let locals = percpu::current();
        locals.set_current_tid(None);

        let (pid_a, tid_a) = new_kernel_process("counter-a", noop_entry).unwrap();
        let (pid_b, tid_b) = new_kernel_process("counter-b", noop_entry).unwrap();

        // Drive many ticks; both threads get scheduled and build TSC time.
        install_current(tid_a);
        let mut frame = InterruptFrame::default();
        for _ in 0..1000 {
            schedule(&mut frame);
        }
        assert!(TASKS.get(tid_a).unwrap().tsc_total.load(Ordering::Relaxed) > 0);
        assert!(TASKS.get(tid_b).unwrap().tsc_total.load(Ordering::Relaxed) > 0);

        if let Some(cur) = locals.current_tid() {
            TASKS.unref(cur);
        }
        locals.set_current_tid(None);
        let _ = kill_process(pid_a);
        let _ = kill_process(pid_b);
    }
}
