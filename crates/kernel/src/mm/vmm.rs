// VMM contract
//
// The page-table primitives are owned by the platform's virtual memory
// manager; this module is the typed surface the core consumes. A provider
// is installed once at boot (tests install in-memory fakes). Address-space
// roots travel as raw physical addresses, matching what lands in a
// thread's cr3 slot.

use crate::lib::error::{Errno, Result};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::RwLock;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u64 {
        const PRESENT = 1 << 0;
        const WRITE = 1 << 1;
        const USER = 1 << 2;
    }
}

pub const PAGE_SIZE: u64 = 4096;

pub trait VmmOps: Send + Sync {
    /// Physical address of the active top-level page table.
    fn get_pml4t(&self) -> u64;

    /// Switch the active address space.
    fn set_pml4t(&self, phys: u64);

    /// Clone the kernel (higher-half) mappings into a fresh root for a new
    /// user address space.
    fn fork_higher_half(&self, src_phys: u64) -> Result<u64>;

    /// Map `count` pages of `phys` at `virt` in the address space `cr3`.
    fn map_pages(&self, phys: u64, virt: u64, cr3: u64, count: u64, flags: PageFlags) -> Result<()>;

    /// Translate a virtual address under `cr3`, if mapped.
    fn virt_to_phys(&self, virt: u64, cr3: u64) -> Option<u64>;
}

static VMM: RwLock<Option<Arc<dyn VmmOps>>> = RwLock::new(None);

/// Address-space root every kernel thread shares; recorded once at boot.
static BASE_KERNEL_CR3: AtomicU64 = AtomicU64::new(0);

pub fn set_provider(provider: Arc<dyn VmmOps>) {
    BASE_KERNEL_CR3.store(provider.get_pml4t(), Ordering::SeqCst);
    *VMM.write() = Some(provider);
}

pub fn base_kernel_cr3() -> u64 {
    BASE_KERNEL_CR3.load(Ordering::SeqCst)
}

pub fn get_pml4t() -> u64 {
    match VMM.read().as_ref() {
        Some(vmm) => vmm.get_pml4t(),
        None => base_kernel_cr3(),
    }
}

pub fn set_pml4t(phys: u64) {
    if let Some(vmm) = VMM.read().as_ref() {
        vmm.set_pml4t(phys);
    }
}

pub fn fork_higher_half(src_phys: u64) -> Result<u64> {
    match VMM.read().as_ref() {
        Some(vmm) => vmm.fork_higher_half(src_phys),
        None => Err(Errno::ENOSYS),
    }
}

pub fn map_pages(phys: u64, virt: u64, cr3: u64, count: u64, flags: PageFlags) -> Result<()> {
    match VMM.read().as_ref() {
        Some(vmm) => vmm.map_pages(phys, virt, cr3, count, flags),
        None => Err(Errno::ENOSYS),
    }
}

pub fn virt_to_phys(virt: u64, cr3: u64) -> Option<u64> {
    VMM.read().as_ref()?.virt_to_phys(virt, cr3)
}

/// Boot-time provider reading the live CR3. The real page-table walker
/// belongs to the platform VMM; translation here assumes the bootloader's
/// full physical mapping, which holds for everything the kernel itself
/// dereferences.
#[cfg(target_os = "none")]
pub struct BootVmm;

#[cfg(target_os = "none")]
impl VmmOps for BootVmm {
    fn get_pml4t(&self) -> u64 {
        x86_64::registers::control::Cr3::read().0.start_address().as_u64()
    }

    fn set_pml4t(&self, phys: u64) {
        use x86_64::registers::control::Cr3;
        use x86_64::structures::paging::PhysFrame;
        use x86_64::PhysAddr;
        unsafe {
            let (_, flags) = Cr3::read();
            Cr3::write(PhysFrame::containing_address(PhysAddr::new(phys)), flags);
        }
    }

    fn fork_higher_half(&self, src_phys: u64) -> Result<u64> {
        // Shared kernel address space until the platform VMM is wired in.
        Ok(src_phys)
    }

    fn map_pages(
        &self,
        _phys: u64,
        _virt: u64,
        _cr3: u64,
        _count: u64,
        _flags: PageFlags,
    ) -> Result<()> {
        Err(Errno::ENOSYS)
    }

    fn virt_to_phys(&self, virt: u64, _cr3: u64) -> Option<u64> {
        Some(virt)
    }
}
