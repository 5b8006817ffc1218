// Open files and the per-process descriptor table

use super::{NodeOps, VfsNode};
use crate::lib::error::{Errno, Result};
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};

bitflags::bitflags! {
    /// Open mode flags captured at open time.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const O_RDONLY = 0o0;
        const O_WRONLY = 0o1;
        const O_RDWR = 0o2;
    }
}

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// An open file: node reference, seek offset, and the mode captured at
/// open time. Shared between descriptor slots via Arc.
pub struct File {
    pub node: Arc<VfsNode>,
    offset: AtomicU64,
    pub flags: OpenFlags,
}

impl File {
    pub fn new(node: Arc<VfsNode>, flags: OpenFlags) -> Self {
        Self {
            node,
            offset: AtomicU64::new(0),
            flags,
        }
    }

    fn ops(&self) -> &Arc<dyn NodeOps> {
        self.node.ops()
    }

    pub fn offset(&self) -> u64 {
        self.offset.load(Ordering::Acquire)
    }

    pub fn set_offset(&self, offset: u64) {
        self.offset.store(offset, Ordering::Release);
    }

    /// Read at the current offset, advancing it by the bytes transferred.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let offset = self.offset();
        let n = self.ops().read(&self.node, offset, buf)?;
        self.offset.fetch_add(n as u64, Ordering::AcqRel);
        Ok(n)
    }

    /// Write at the current offset, advancing it by the bytes transferred.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        let offset = self.offset();
        let n = self.ops().write(&self.node, offset, buf)?;
        self.offset.fetch_add(n as u64, Ordering::AcqRel);
        Ok(n)
    }

    /// Reposition the offset. Only SEEK_SET is supported.
    pub fn seek(&self, offset: u64, whence: i32) -> Result<u64> {
        if whence != SEEK_SET {
            return Err(Errno::EINVAL);
        }
        let validated = self.ops().seek(&self.node, offset)?;
        self.set_offset(validated);
        Ok(validated)
    }
}

impl Drop for File {
    fn drop(&mut self) {
        let _ = self.node.ops().close(&self.node);
    }
}

/// Per-process descriptor table. Descriptors are the smallest unused
/// indices; entries hold a counted file reference.
pub struct FdTable {
    fds: Vec<Option<Arc<File>>>,
}

const FD_LIMIT: usize = 256;

impl FdTable {
    pub fn new() -> Self {
        Self { fds: Vec::new() }
    }

    /// Allocate the smallest free descriptor.
    pub fn alloc_fd(&mut self, file: Arc<File>) -> Result<i32> {
        for (i, slot) in self.fds.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(i as i32);
            }
        }
        if self.fds.len() >= FD_LIMIT {
            return Err(Errno::EMFILE);
        }
        self.fds.push(Some(file));
        Ok((self.fds.len() - 1) as i32)
    }

    pub fn get(&self, fd: i32) -> Result<Arc<File>> {
        if fd < 0 || fd as usize >= self.fds.len() {
            return Err(Errno::EBADF);
        }
        self.fds[fd as usize].clone().ok_or(Errno::EBADF)
    }

    /// Drop the descriptor. The node's close op runs when the last file
    /// reference goes away.
    pub fn close(&mut self, fd: i32) -> Result<()> {
        if fd < 0 || fd as usize >= self.fds.len() {
            return Err(Errno::EBADF);
        }
        if self.fds[fd as usize].is_none() {
            return Err(Errno::EBADF);
        }
        self.fds[fd as usize] = None;
        Ok(())
    }

    pub fn open_count(&self) -> usize {
        self.fds.iter().filter(|s| s.is_some()).count()
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

// Descriptor operations against the calling process's table. Errors
// surface as negative errno at the syscall boundary and are mirrored into
// the caller's thread-local block by the dispatcher.

pub fn fd_open(path: &str, flags: OpenFlags) -> Result<i32> {
    let process = crate::process::current_process().ok_or(Errno::ESRCH)?;
    let file = super::open(path, flags)?;
    let fd = process.fd_table.lock().alloc_fd(file);
    fd
}

pub fn fd_close(fd: i32) -> Result<()> {
    let process = crate::process::current_process().ok_or(Errno::ESRCH)?;
    let mut table = process.fd_table.lock();
    table.close(fd)
}

pub fn fd_read(fd: i32, buf: &mut [u8]) -> Result<usize> {
    let process = crate::process::current_process().ok_or(Errno::ESRCH)?;
    let file = process.fd_table.lock().get(fd)?;
    file.read(buf)
}

pub fn fd_write(fd: i32, buf: &[u8]) -> Result<usize> {
    let process = crate::process::current_process().ok_or(Errno::ESRCH)?;
    let file = process.fd_table.lock().get(fd)?;
    file.write(buf)
}

pub fn fd_seek(fd: i32, offset: u64, whence: i32) -> Result<u64> {
    let process = crate::process::current_process().ok_or(Errno::ESRCH)?;
    let file = process.fd_table.lock().get(fd)?;
    file.seek(offset, whence)
}
