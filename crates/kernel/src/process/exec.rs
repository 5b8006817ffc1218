// Raw binary launch
//
// Loads a flat binary image through the VFS into a forked address space
// and spawns a ring-3 thread at the load base. No object-format parsing:
// byte zero of the file is the entry point.

use super::{add_new_child_thread, new_process, Pid, Task};
use crate::config::{TASK_STACK_SIZE, USER_LOAD_ADDR, USER_STACK_TOP};
use crate::lib::error::{Errno, Result};
use crate::mm::vmm::{self, PageFlags, PAGE_SIZE};
use crate::vfs::{self, OpenFlags};
use alloc::boxed::Box;
use alloc::vec::Vec;

/// Map `backing` (kernel memory) into `cr3` at `virt`, page by page.
fn map_backing(backing: &[u8], virt: u64, cr3: u64) -> Result<()> {
    let kernel_cr3 = vmm::get_pml4t();
    let pages = backing.len() as u64 / PAGE_SIZE;
    for page in 0..pages {
        let kernel_virt = backing.as_ptr() as u64 + page * PAGE_SIZE;
        let phys = vmm::virt_to_phys(kernel_virt, kernel_cr3).ok_or(Errno::EFAULT)?;
        vmm::map_pages(
            phys,
            virt + page * PAGE_SIZE,
            cr3,
            1,
            PageFlags::PRESENT | PageFlags::WRITE | PageFlags::USER,
        )?;
    }
    Ok(())
}

/// Read a binary at `path` and launch it as a new single-threaded ring-3
/// process. Returns the new pid.
pub fn launch_binary(path: &str) -> Result<Pid> {
    let file = vfs::open(path, OpenFlags::O_RDONLY)?;

    let mut image: Vec<u8> = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = file.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        image.extend_from_slice(&chunk[..n]);
    }
    if image.is_empty() {
        return Err(Errno::EINVAL);
    }

    let new_cr3 = vmm::fork_higher_half(vmm::get_pml4t())?;
    let name = path.rsplit('/').next().unwrap_or(path);
    let pid = new_process(name, new_cr3);

    // Page-aligned copies of the image and a zeroed user stack, mapped
    // into the new address space.
    let image_pages = (image.len() as u64).div_ceil(PAGE_SIZE);
    let mut code: Box<[u8]> = alloc::vec![0u8; (image_pages * PAGE_SIZE) as usize].into_boxed_slice();
    code[..image.len()].copy_from_slice(&image);
    map_backing(&code, USER_LOAD_ADDR, new_cr3)?;

    let stack: Box<[u8]> = alloc::vec![0u8; TASK_STACK_SIZE].into_boxed_slice();
    map_backing(&stack, USER_STACK_TOP - TASK_STACK_SIZE as u64, new_cr3)?;

    let task = Task::create_thread(name, USER_LOAD_ADDR, USER_STACK_TOP, 3);
    task.adopt_stack(code);
    task.adopt_stack(stack);
    let tid = add_new_child_thread(task, pid)?;

    crate::info!("exec: launched {} as pid {} tid {}", path, pid, tid);
    Ok(pid)
}
