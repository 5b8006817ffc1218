// User pointer validation
//
// Every pointer argument crossing the syscall boundary is checked to be
// mapped in the caller's address space before the kernel touches it.

use crate::lib::error::{Errno, Result};
use crate::mm::vmm::{self, PAGE_SIZE};
use alloc::string::String;

/// Longest accepted user path, NUL included.
pub const PATH_MAX: usize = 4096;

fn caller_cr3() -> u64 {
    crate::process::current_task()
        .map(|t| t.regs().cr3)
        .filter(|&cr3| cr3 != 0)
        .unwrap_or_else(vmm::get_pml4t)
}

/// Check that every page of `[ptr, ptr+len)` is mapped for the caller.
pub fn validate_user_range(ptr: u64, len: usize) -> Result<()> {
    if ptr == 0 {
        return Err(Errno::EFAULT);
    }
    if len == 0 {
        return Ok(());
    }
    let cr3 = caller_cr3();
    let first = ptr & !(PAGE_SIZE - 1);
    let last = (ptr + len as u64 - 1) & !(PAGE_SIZE - 1);
    let mut page = first;
    loop {
        if vmm::virt_to_phys(page, cr3).is_none() {
            return Err(Errno::EFAULT);
        }
        if page == last {
            break;
        }
        page += PAGE_SIZE;
    }
    Ok(())
}

/// Copy a NUL-terminated string out of user memory, page-validating as
/// the scan crosses page boundaries.
pub fn copy_user_cstr(ptr: u64) -> Result<String> {
    if ptr == 0 {
        return Err(Errno::EFAULT);
    }
    let cr3 = caller_cr3();

    let mut bytes = alloc::vec::Vec::new();
    let mut addr = ptr;
    let mut validated_page = u64::MAX;
    loop {
        if bytes.len() >= PATH_MAX {
            return Err(Errno::ENAMETOOLONG);
        }
        let page = addr & !(PAGE_SIZE - 1);
        if page != validated_page {
            if vmm::virt_to_phys(page, cr3).is_none() {
                return Err(Errno::EFAULT);
            }
            validated_page = page;
        }
        let byte = unsafe { core::ptr::read(addr as *const u8) };
        if byte == 0 {
            break;
        }
        bytes.push(byte);
        addr += 1;
    }

    String::from_utf8(bytes).map_err(|_| Errno::EINVAL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::vmm::testing::MockVmm;

    #[test]
    fn rejects_null_and_unmapped() {
        let _g = crate::lib::testing::lock();
        vmm::set_provider(MockVmm::permissive());
        assert_eq!(validate_user_range(0, 8), Err(Errno::EFAULT));

        // Only one specific page mapped.
        let buf = alloc::vec![0u8; 64];
        let addr = buf.as_ptr() as u64;
        let page = addr & !(PAGE_SIZE - 1);
        vmm::set_provider(MockVmm::with_pages(&[page]));

        // In-page range passes when it does not cross out of the page.
        let in_page = validate_user_range(page, 16);
        assert_eq!(in_page, Ok(()));
        // A range starting in the next (unmapped) page fails.
        assert_eq!(
            validate_user_range(page + PAGE_SIZE, 8),
            Err(Errno::EFAULT)
        );

        vmm::set_provider(MockVmm::permissive());
    }

    #[test]
    fn copies_terminated_strings() {
        let _g = crate::lib::testing::lock();
        vmm::set_provider(MockVmm::permissive());
        let s = b"/dev/tty1\0";
        let copied = copy_user_cstr(s.as_ptr() as u64).unwrap();
        assert_eq!(copied, "/dev/tty1");
        assert_eq!(copy_user_cstr(0), Err(Errno::EFAULT));
    }
}
