// devfs: the /dev subtree
//
// Devices are plain VFS nodes with driver-provided ops. Block drivers
// register byte-addressed nodes here (the filesystem layer reads disks
// through them); the TTY registers its write sink.

use super::{add_child, get_node_from_path, DummyOps, NodeOps, OpenFlags, VfsNode};
use crate::lib::error::{Errno, Result};
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::Mutex;

/// Create /dev under the root.
pub fn devfs_init() -> Result<()> {
    let root = super::root().ok_or(Errno::ENOENT)?;
    let dev = VfsNode::new("dev", Arc::new(DummyOps));
    add_child(&root, &dev)?;
    crate::info!("devfs: mounted at /dev");
    Ok(())
}

/// Register a device node under /dev.
pub fn register_device(name: &str, ops: Arc<dyn NodeOps>) -> Result<Arc<VfsNode>> {
    let dev = get_node_from_path("/dev")?;
    let node = VfsNode::new(name, ops);
    add_child(&dev, &node)?;
    crate::info!("devfs: registered /dev/{}", name);
    Ok(node)
}

/// TTY device. Writes go to the console; a sink buffer keeps the bytes
/// observable for diagnostics.
pub struct TtyDev {
    sink: Mutex<Vec<u8>>,
}

impl TtyDev {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sink: Mutex::new(Vec::new()),
        })
    }

    /// Drain everything written so far.
    pub fn take_output(&self) -> Vec<u8> {
        core::mem::take(&mut *self.sink.lock())
    }
}

impl NodeOps for TtyDev {
    fn read(&self, _node: &Arc<VfsNode>, _offset: u64, _buf: &mut [u8]) -> Result<usize> {
        Ok(0)
    }

    fn write(&self, _node: &Arc<VfsNode>, _offset: u64, buf: &[u8]) -> Result<usize> {
        #[cfg(target_os = "none")]
        crate::arch::x86_64::serial::write_bytes(buf);
        self.sink.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn seek(&self, _node: &Arc<VfsNode>, _target: u64) -> Result<u64> {
        Err(Errno::ESPIPE)
    }
}

/// RAM-backed block device exposing the byte-addressed read/seek contract
/// real disk drivers provide.
pub struct RamDisk {
    data: Vec<u8>,
}

impl RamDisk {
    pub fn new(data: Vec<u8>) -> Arc<Self> {
        Arc::new(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }
}

impl NodeOps for RamDisk {
    fn open(&self, _node: &Arc<VfsNode>, _flags: OpenFlags) -> Result<()> {
        Ok(())
    }

    fn read(&self, _node: &Arc<VfsNode>, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let offset = offset as usize;
        if offset >= self.data.len() {
            return Ok(0);
        }
        let n = core::cmp::min(buf.len(), self.data.len() - offset);
        buf[..n].copy_from_slice(&self.data[offset..offset + n]);
        Ok(n)
    }

    fn write(&self, _node: &Arc<VfsNode>, _offset: u64, _buf: &[u8]) -> Result<usize> {
        Err(Errno::EIO)
    }

    fn seek(&self, _node: &Arc<VfsNode>, target: u64) -> Result<u64> {
        Ok(target)
    }
}
