// Syscall dispatch
//
// Number in rax, arguments in rdi/rsi/rdx, result in rax. Negative errno
// on failure, mirrored into the caller's thread-local block.

pub mod uaccess;

use crate::lib::error::{Errno, Result};
use crate::vfs::file::{fd_close, fd_open, fd_read, fd_seek, fd_write};
use crate::vfs::OpenFlags;

pub const SYS_READ: u64 = 0;
pub const SYS_WRITE: u64 = 1;
pub const SYS_OPEN: u64 = 2;
pub const SYS_CLOSE: u64 = 3;
pub const SYS_SEEK: u64 = 8;

/// Dispatcher body shared by the SYSCALL entry stub.
pub fn dispatch(nr: u64, a1: u64, a2: u64, a3: u64) -> i64 {
    let result = match nr {
        SYS_READ => sys_read(a1 as i32, a2, a3 as usize),
        SYS_WRITE => sys_write(a1 as i32, a2, a3 as usize),
        SYS_OPEN => sys_open(a1, a2 as u32),
        SYS_CLOSE => sys_close(a1 as i32),
        SYS_SEEK => sys_seek(a1 as i32, a2, a3 as i32),
        _ => {
            crate::warn!("syscall: unknown number {}", nr);
            Err(Errno::EINVAL)
        }
    };

    #[cfg(feature = "syscall-verbose")]
    crate::debug!("syscall {} -> {:?}", nr, result);

    match result {
        Ok(value) => value,
        Err(errno) => {
            crate::process::set_errno(errno);
            errno.as_i64()
        }
    }
}

fn sys_read(fd: i32, buf: u64, count: usize) -> Result<i64> {
    if count == 0 {
        return Ok(0);
    }
    uaccess::validate_user_range(buf, count)?;
    let slice = unsafe { core::slice::from_raw_parts_mut(buf as *mut u8, count) };
    let n = fd_read(fd, slice)?;
    Ok(n as i64)
}

fn sys_write(fd: i32, buf: u64, count: usize) -> Result<i64> {
    if count == 0 {
        return Ok(0);
    }
    uaccess::validate_user_range(buf, count)?;
    let slice = unsafe { core::slice::from_raw_parts(buf as *const u8, count) };
    let n = fd_write(fd, slice)?;
    Ok(n as i64)
}

fn sys_open(path: u64, flags: u32) -> Result<i64> {
    let path = uaccess::copy_user_cstr(path)?;
    let flags = OpenFlags::from_bits_truncate(flags);
    let fd = fd_open(&path, flags)?;
    Ok(fd as i64)
}

fn sys_close(fd: i32) -> Result<i64> {
    fd_close(fd)?;
    Ok(0)
}

fn sys_seek(fd: i32, offset: u64, whence: i32) -> Result<i64> {
    let new_offset = fd_seek(fd, offset, whence)?;
    Ok(new_offset as i64)
}
