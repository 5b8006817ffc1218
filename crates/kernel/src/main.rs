// ferrite kernel
//
// A small x86_64 preemptive multitasking kernel: per-core round-robin
// scheduling over a shared thread table, a VFS with lazily-mounted
// filesystem drivers, an echFS read-only driver, and a minimal SYSCALL
// gateway. Hosted builds compile the same tree against std so the unit
// tests run on the development machine.

#![cfg_attr(target_os = "none", no_std)]
#![cfg_attr(target_os = "none", no_main)]

extern crate alloc;

// Core library (error handling, logging, containers)
#[allow(special_module_name)]
pub mod lib;
// Architecture support
pub mod arch;
// Compile-time configuration
pub mod config;
// Filesystem drivers
pub mod fs;
// Memory management
pub mod mm;
// Process and scheduler
pub mod process;
// SMP wiring
pub mod smp;
// System call interface
pub mod syscall;
// Tick accounting
pub mod time;
// Virtual File System
pub mod vfs;

#[cfg(target_os = "none")]
mod boot {
    use crate::arch::x86_64::{self, apic, cpu};
    use crate::{fs, info, mm, process, smp, vfs, warn};
    use alloc::sync::Arc;
    use bootloader_api::info::{MemoryRegionKind, Optional};
    use bootloader_api::{entry_point, BootInfo};

    entry_point!(kernel_entry);

    fn kernel_entry(boot_info: &'static mut BootInfo) -> ! {
        x86_64::serial::init();
        info!("ferrite: booting");

        mm::heap::init_heap();

        let usable: u64 = boot_info
            .memory_regions
            .iter()
            .filter(|r| r.kind == MemoryRegionKind::Usable)
            .map(|r| r.end - r.start)
            .sum();
        info!("ferrite: {} MiB usable memory reported", usable >> 20);
        if let Optional::Some(fb) = &boot_info.framebuffer {
            let fb_info = fb.info();
            info!(
                "ferrite: framebuffer {}x{} bpp {}",
                fb_info.width,
                fb_info.height,
                fb_info.bytes_per_pixel * 8
            );
        }

        x86_64::gdt::init();

        // Interrupt stack for ring crossings until the first switch.
        let boot_istack = alloc::vec![0u8; crate::config::KERNEL_STACK_SIZE].into_boxed_slice();
        x86_64::gdt::set_interrupt_stack(
            (boot_istack.as_ptr() as u64 + boot_istack.len() as u64) & !0xF,
        );
        core::mem::forget(boot_istack);

        mm::vmm::set_provider(Arc::new(mm::vmm::BootVmm));

        apic::configure_apic();
        apic::register_cpu(apic::CpuRecord {
            apic_id: apic::get_lapic_id(),
            cpu_flags: 1,
        });

        smp::percpu::init_cpu(0);
        smp::set_cpu_online(0);
        process::scheduler::scheduler_init_bsp();

        x86_64::idt::configure_idt();
        x86_64::pit::init_pic();
        x86_64::pit::set_pit_freq();
        info!("ferrite: timer at ~1000 Hz");

        process::new_kernel_process("Kernel process", kernel_task)
            .expect("kernel worker process");

        smp::launch_cpus();

        process::scheduler::set_enabled(true);
        info!("ferrite: scheduler enabled");

        cpu::interrupts_enable();
        loop {
            cpu::halt();
        }
    }

    /// First scheduled thread: brings up the VFS and mounts the disk.
    fn kernel_task() -> ! {
        info!("ferrite: kernel thread running");

        vfs::vfs_init();
        if let Err(e) = vfs::devfs::devfs_init() {
            warn!("devfs init failed: {:?}", e);
        }
        if let Err(e) = vfs::devfs::register_device("tty1", vfs::devfs::TtyDev::new()) {
            warn!("tty registration failed: {:?}", e);
        }

        match fs::echfs::echfs_mount("/dev/satadeva", "/echfs_mount") {
            Ok(_) => {
                match vfs::file::fd_open("/echfs_mount/hello.txt", vfs::OpenFlags::O_RDONLY) {
                    Ok(fd) => {
                        let mut buf = [0u8; 100];
                        let n = vfs::file::fd_read(fd, &mut buf).unwrap_or(0);
                        info!(
                            "echfs: hello.txt ({} bytes): {}",
                            n,
                            core::str::from_utf8(&buf[..n]).unwrap_or("<binary>")
                        );
                        let _ = vfs::file::fd_close(fd);
                    }
                    Err(e) => warn!("echfs: hello.txt open failed: {:?}", e),
                }

                if let Err(e) = process::exec::launch_binary("/echfs_mount/programs/program_1.bin")
                {
                    warn!("exec: program_1.bin not launched: {:?}", e);
                }
            }
            Err(e) => warn!("echfs: no filesystem on /dev/satadeva: {:?}", e),
        }

        info!("ferrite: kernel thread idle");
        loop {
            cpu::halt();
        }
    }
}

#[cfg(not(target_os = "none"))]
fn main() {
    // The kernel proper only runs on bare metal; hosted builds exist for
    // the unit tests.
}
