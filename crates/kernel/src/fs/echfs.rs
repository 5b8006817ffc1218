// echFS driver (read-only)
//
// On-disk layout: a 64-byte header in block 0 carrying the magic at byte
// 4 and the geometry words, a packed u64 allocation table starting at
// block 16, and a flat main directory of 256-byte entries directly after
// it. File contents are chains through the allocation table terminated by
// END_OF_CHAIN. All device I/O goes through the device's VFS node.

use crate::config::MAX_NAME_LEN;
use crate::lib::error::{Errno, Result};
use crate::vfs::file::SEEK_SET;
use crate::vfs::mount::FilesystemHandler;
use crate::vfs::{self, DummyOps, NodeOps, OpenFlags, VfsNode};
use alloc::collections::BTreeMap;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec;
use alloc::vec::Vec;
use spin::RwLock;

pub const ECHFS_MAGIC: &[u8; 8] = b"_ECH_FS_";
pub const END_OF_CHAIN: u64 = 0xFFFF_FFFF_FFFF_FFFF;
pub const DELETED_ENTRY: u64 = 0xFFFF_FFFF_FFFF_FFFF;
pub const ROOT_DIR_ID: u64 = 0xFFFF_FFFF_FFFF_FFFE;

/// First block of the allocation table.
const ALLOC_TABLE_BLOCK: u64 = 16;
const DIR_ENTRY_SIZE: u64 = 256;

/// Byte offsets inside a 256-byte directory entry.
const ENT_PARENT_ID: usize = 0;
const ENT_TYPE: usize = 8;
const ENT_NAME: usize = 9;
const ENT_STARTING_BLOCK: usize = 240;
const ENT_FILE_SIZE: usize = 248;

pub const TYPE_FILE: u8 = 0;
pub const TYPE_DIRECTORY: u8 = 1;

/// Resolution failures, mirroring the driver's error bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchfsError {
    /// The literal path "/": the root has no directory entry.
    RootEntry,
    /// A component exceeded the 201-byte name field.
    NameTooLong,
    /// No entry matched, or a file showed up mid-path.
    SearchFail,
    /// Device I/O failed underneath the scan.
    Io(Errno),
}

impl From<EchfsError> for Errno {
    fn from(err: EchfsError) -> Self {
        match err {
            EchfsError::RootEntry => Errno::EISDIR,
            EchfsError::NameTooLong => Errno::ENAMETOOLONG,
            EchfsError::SearchFail => Errno::ENOENT,
            EchfsError::Io(e) => e,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchfsDirEntry {
    pub parent_id: u64,
    pub entry_type: u8,
    pub name: String,
    pub starting_block: u64,
    pub file_size_bytes: u64,
}

/// Parsed filesystem descriptor for one mounted device.
pub struct EchfsFilesystem {
    pub device_name: String,
    pub blocks: u64,
    pub block_size: u64,
    pub alloc_table_addr: u64,
    pub alloc_table_block: u64,
    pub alloc_table_blocks: u64,
    pub alloc_table_size: u64,
    pub main_dir_block: u64,
    pub main_dir_blocks: u64,
    pub mountpoint_path: String,
    pub mountpoint: Weak<VfsNode>,
}

/// Mountpoint-unid to descriptor attribution, consulted by file ops.
static MOUNT_DESCRIPTORS: RwLock<BTreeMap<u64, Arc<EchfsFilesystem>>> = RwLock::new(BTreeMap::new());

fn descriptor_for(unid: u64) -> Option<Arc<EchfsFilesystem>> {
    MOUNT_DESCRIPTORS.read().get(&unid).cloned()
}

impl EchfsFilesystem {
    /// Read the 64-byte header off block 0 and populate a descriptor.
    /// Fails with EINVAL when the magic is absent.
    pub fn probe(device: &str) -> Result<Self> {
        let dev = vfs::open(device, OpenFlags::O_RDONLY)?;
        let mut block0 = [0u8; 64];
        dev.seek(0, SEEK_SET)?;
        if dev.read(&mut block0)? < 36 {
            return Err(Errno::EIO);
        }

        if &block0[4..12] != ECHFS_MAGIC {
            crate::warn!("echfs: no signature on {}", device);
            return Err(Errno::EINVAL);
        }

        let block_count = u64::from_le_bytes(block0[12..20].try_into().unwrap());
        let main_dir_blocks = u64::from_le_bytes(block0[20..28].try_into().unwrap());
        let block_size = u64::from_le_bytes(block0[28..36].try_into().unwrap());
        if block_size == 0 || block_size % 8 != 0 {
            return Err(Errno::EINVAL);
        }

        let alloc_table_size = block_count * 8;
        let alloc_table_blocks = alloc_table_size.div_ceil(block_size);

        crate::info!(
            "echfs: {} blocks of {} bytes on {}, main dir {} blocks",
            block_count,
            block_size,
            device,
            main_dir_blocks
        );

        Ok(Self {
            device_name: device.into(),
            blocks: block_count,
            block_size,
            alloc_table_addr: ALLOC_TABLE_BLOCK * block_size,
            alloc_table_block: ALLOC_TABLE_BLOCK,
            alloc_table_blocks,
            alloc_table_size,
            main_dir_block: ALLOC_TABLE_BLOCK + alloc_table_blocks,
            main_dir_blocks,
            mountpoint_path: String::new(),
            mountpoint: Weak::new(),
        })
    }

    /// Byte-addressed device read through the /dev node.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let dev = vfs::open(&self.device_name, OpenFlags::O_RDONLY)?;
        dev.seek(offset, SEEK_SET)?;
        dev.read(buf)
    }

    /// Read one whole block.
    pub fn read_block(&self, block: u64) -> Result<Vec<u8>> {
        let mut data = vec![0u8; self.block_size as usize];
        let n = self.read_at(block * self.block_size, &mut data)?;
        if n < data.len() {
            return Err(Errno::EIO);
        }
        Ok(data)
    }

    /// Allocation-table entry for a block: the next block in the chain or
    /// END_OF_CHAIN.
    pub fn alloc_table_entry(&self, block: u64) -> Result<u64> {
        let table_block = ALLOC_TABLE_BLOCK + (block * 8) / self.block_size;
        let offset_in_block = (block % (self.block_size / 8)) * 8;
        let mut raw = [0u8; 8];
        let n = self.read_at(table_block * self.block_size + offset_in_block, &mut raw)?;
        if n < 8 {
            return Err(Errno::EIO);
        }
        Ok(u64::from_le_bytes(raw))
    }

    /// Number of entries the main directory can hold.
    fn dir_capacity(&self) -> u64 {
        self.main_dir_blocks * self.block_size / DIR_ENTRY_SIZE
    }

    /// Read the n-th main-directory entry. None past the directory end.
    pub fn read_dir_entry(&self, n: u64) -> Result<Option<EchfsDirEntry>> {
        if n >= self.dir_capacity() {
            return Ok(None);
        }
        let mut raw = [0u8; DIR_ENTRY_SIZE as usize];
        let offset = self.main_dir_block * self.block_size + n * DIR_ENTRY_SIZE;
        let read = self.read_at(offset, &mut raw)?;
        if read < raw.len() {
            return Ok(None);
        }

        let name_field = &raw[ENT_NAME..ENT_NAME + MAX_NAME_LEN];
        let name_len = name_field.iter().position(|&b| b == 0).unwrap_or(MAX_NAME_LEN);
        let name = core::str::from_utf8(&name_field[..name_len])
            .map_err(|_| Errno::EIO)?
            .into();

        Ok(Some(EchfsDirEntry {
            parent_id: u64::from_le_bytes(raw[ENT_PARENT_ID..ENT_PARENT_ID + 8].try_into().unwrap()),
            entry_type: raw[ENT_TYPE],
            name,
            starting_block: u64::from_le_bytes(
                raw[ENT_STARTING_BLOCK..ENT_STARTING_BLOCK + 8].try_into().unwrap(),
            ),
            file_size_bytes: u64::from_le_bytes(raw[ENT_FILE_SIZE..ENT_FILE_SIZE + 8].try_into().unwrap()),
        }))
    }

    /// Linear scan for `(parent_id, name)`. Returns the entry index.
    pub fn find_entry(&self, name: &str, parent_id: u64) -> Result<Option<u64>> {
        let mut n = 0;
        while let Some(entry) = self.read_dir_entry(n)? {
            if entry.parent_id == 0 {
                return Ok(None);
            }
            if entry.parent_id == parent_id && entry.name == name {
                return Ok(Some(n));
            }
            n += 1;
        }
        Ok(None)
    }

    /// Find a directory entry by its directory id.
    pub fn entry_from_id(&self, id: u64) -> Result<Option<EchfsDirEntry>> {
        let mut n = 0;
        while let Some(entry) = self.read_dir_entry(n)? {
            if entry.parent_id == 0 {
                return Ok(None);
            }
            if entry.entry_type == TYPE_DIRECTORY && entry.starting_block == id {
                return Ok(Some(entry));
            }
            n += 1;
        }
        Ok(None)
    }

    /// Walk a path relative to the filesystem root down the flat
    /// directory. Non-final components must be directories; their id
    /// becomes the parent filter for the next component.
    pub fn path_resolve(&self, path: &str) -> core::result::Result<EchfsDirEntry, EchfsError> {
        let path = path.strip_prefix('/').unwrap_or(path);
        if path.is_empty() {
            return Err(EchfsError::RootEntry);
        }

        let components: Vec<&str> = path.split('/').filter(|c| !c.is_empty()).collect();
        if components.is_empty() {
            return Err(EchfsError::RootEntry);
        }

        let mut current_parent = ROOT_DIR_ID;
        for (i, component) in components.iter().enumerate() {
            let is_last = i == components.len() - 1;
            if component.len() > MAX_NAME_LEN {
                return Err(EchfsError::NameTooLong);
            }

            let index = self
                .find_entry(component, current_parent)
                .map_err(EchfsError::Io)?
                .ok_or(EchfsError::SearchFail)?;
            let entry = self
                .read_dir_entry(index)
                .map_err(EchfsError::Io)?
                .ok_or(EchfsError::SearchFail)?;

            if is_last {
                return Ok(entry);
            }
            if entry.entry_type != TYPE_DIRECTORY {
                return Err(EchfsError::SearchFail);
            }
            current_parent = entry.starting_block;
        }

        Err(EchfsError::SearchFail)
    }

    /// Copy out of a file's block chain starting at `offset` file bytes.
    /// Returns the bytes copied; 0 at or past EOF. The chain walk is
    /// bounded by the block count so a corrupt table cannot loop forever.
    pub fn read_range(&self, entry: &EchfsDirEntry, offset: u64, buf: &mut [u8]) -> Result<usize> {
        if offset >= entry.file_size_bytes {
            return Ok(0);
        }
        let wanted = core::cmp::min(buf.len() as u64, entry.file_size_bytes - offset) as usize;

        let mut block = entry.starting_block;
        let mut chain_pos = 0u64;
        let mut copied = 0usize;
        let mut steps = 0u64;

        while copied < wanted && block != END_OF_CHAIN {
            if steps > self.blocks {
                crate::error!("echfs: allocation chain exceeds block count, rejecting");
                return Err(Errno::EIO);
            }

            let block_start = chain_pos * self.block_size;
            let block_end = block_start + self.block_size;
            let read_pos = offset + copied as u64;
            if read_pos >= block_start && read_pos < block_end {
                let data = self.read_block(block)?;
                let start_in_block = (read_pos - block_start) as usize;
                let available = self.block_size as usize - start_in_block;
                let n = core::cmp::min(available, wanted - copied);
                buf[copied..copied + n]
                    .copy_from_slice(&data[start_in_block..start_in_block + n]);
                copied += n;
            }

            block = self.alloc_table_entry(block)?;
            chain_pos += 1;
            steps += 1;
        }

        Ok(copied)
    }

    /// Whole-file read: walk the chain to the end and truncate to the
    /// recorded size.
    pub fn read_file(&self, entry: &EchfsDirEntry) -> Result<Vec<u8>> {
        let mut data = vec![0u8; entry.file_size_bytes as usize];
        let n = self.read_range(entry, 0, &mut data)?;
        data.truncate(n);
        Ok(data)
    }
}

/// Per-file ops installed on lazily created nodes. Reads walk the block
/// chain; the descriptor is found through the node's mountpoint
/// attribution.
struct EchfsFileOps {
    starting_block: u64,
    file_size_bytes: u64,
}

impl EchfsFileOps {
    fn filesystem(&self, node: &Arc<VfsNode>) -> Result<Arc<EchfsFilesystem>> {
        let mountpoint = node.mountpoint().ok_or(Errno::ENOENT)?;
        descriptor_for(mountpoint.unid()).ok_or(Errno::ENOENT)
    }
}

impl NodeOps for EchfsFileOps {
    fn read(&self, node: &Arc<VfsNode>, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let fs = self.filesystem(node)?;
        let entry = EchfsDirEntry {
            parent_id: 0,
            entry_type: TYPE_FILE,
            name: node.name.clone(),
            starting_block: self.starting_block,
            file_size_bytes: self.file_size_bytes,
        };
        fs.read_range(&entry, offset, buf)
    }

    fn write(&self, _node: &Arc<VfsNode>, _offset: u64, _buf: &[u8]) -> Result<usize> {
        // Read-only filesystem.
        Err(Errno::EIO)
    }

    fn seek(&self, _node: &Arc<VfsNode>, target: u64) -> Result<u64> {
        if target > self.file_size_bytes {
            return Err(Errno::EINVAL);
        }
        Ok(target)
    }
}

/// The mountpoint's node handler: resolve on disk, then materialize VFS
/// nodes for the hit.
pub struct EchfsHandler {
    fs: Arc<EchfsFilesystem>,
}

impl FilesystemHandler for EchfsHandler {
    fn generate_node(&self, relative_path: &str) {
        let entry = match self.fs.path_resolve(relative_path) {
            Ok(entry) => entry,
            Err(EchfsError::RootEntry) => return,
            Err(err) => {
                crate::debug!("echfs: resolve {} failed: {:?}", relative_path, err);
                return;
            }
        };

        let Some(mountpoint) = self.fs.mountpoint.upgrade() else {
            return;
        };

        let mut full_path = self.fs.mountpoint_path.clone();
        if !relative_path.starts_with('/') {
            full_path.push('/');
        }
        full_path.push_str(relative_path);

        let ops: Arc<dyn NodeOps> = if entry.entry_type == TYPE_DIRECTORY {
            Arc::new(DummyOps)
        } else {
            Arc::new(EchfsFileOps {
                starting_block: entry.starting_block,
                file_size_bytes: entry.file_size_bytes,
            })
        };

        if let Err(e) = vfs::create_missing_nodes_from_path(&full_path, ops, &mountpoint) {
            crate::warn!("echfs: node creation for {} failed: {:?}", full_path, e);
        }
    }
}

/// Probe `device` and mount it at `mountpoint_path`. Creates the
/// mountpoint node, records the unid attribution, and registers the node
/// handler.
pub fn echfs_mount(device: &str, mountpoint_path: &str) -> Result<Arc<EchfsFilesystem>> {
    let mut fs = EchfsFilesystem::probe(device)?;

    let (parent_path, name) = mountpoint_path
        .rsplit_once('/')
        .ok_or(Errno::EINVAL)?;
    let parent = if parent_path.is_empty() {
        vfs::root().ok_or(Errno::ENOENT)?
    } else {
        vfs::get_node_from_path(parent_path)?
    };

    let mountpoint = VfsNode::new(name, Arc::new(DummyOps));
    vfs::add_child(&parent, &mountpoint)?;

    fs.mountpoint_path = mountpoint_path.into();
    fs.mountpoint = Arc::downgrade(&mountpoint);
    let fs = Arc::new(fs);

    MOUNT_DESCRIPTORS
        .write()
        .insert(mountpoint.unid(), fs.clone());
    vfs::mount::register_mountpoint(mountpoint_path, Arc::new(EchfsHandler { fs: fs.clone() }));

    crate::info!("echfs: mounted {} at {}", device, mountpoint_path);
    Ok(fs)
}

#[cfg(test)]
pub mod testing {
    use super::*;

    pub const TEST_BLOCK_SIZE: u64 = 512;
    pub const TEST_BLOCK_COUNT: u64 = 128;

    pub enum TestEntry<'a> {
        Dir {
            id: u64,
            parent: u64,
            name: &'a str,
        },
        File {
            parent: u64,
            name: &'a str,
            content: &'a [u8],
        },
    }

    /// Synthesizes a minimal echFS image: header, allocation table at
    /// block 16, a 2-block main directory, then data blocks.
    pub fn build_image(entries: &[TestEntry<'_>]) -> Vec<u8> {
        let bs = TEST_BLOCK_SIZE as usize;
        let alloc_blocks = (TEST_BLOCK_COUNT * 8).div_ceil(TEST_BLOCK_SIZE);
        let main_dir_block = 16 + alloc_blocks;
        let main_dir_blocks = 4u64;
        let data_start = main_dir_block + main_dir_blocks;

        let mut image = vec![0u8; bs * TEST_BLOCK_COUNT as usize];
        image[4..12].copy_from_slice(ECHFS_MAGIC);
        image[12..20].copy_from_slice(&TEST_BLOCK_COUNT.to_le_bytes());
        image[20..28].copy_from_slice(&main_dir_blocks.to_le_bytes());
        image[28..36].copy_from_slice(&TEST_BLOCK_SIZE.to_le_bytes());

        let mut next_data_block = data_start;
        let mut dir_index = 0usize;

        let mut write_entry =
            |image: &mut Vec<u8>, parent: u64, etype: u8, name: &str, start: u64, size: u64| {
                let base = (16 + alloc_blocks as usize) * bs + dir_index * 256;
                image[base..base + 8].copy_from_slice(&parent.to_le_bytes());
                image[base + 8] = etype;
                image[base + 9..base + 9 + name.len()].copy_from_slice(name.as_bytes());
                image[base + 240..base + 248].copy_from_slice(&start.to_le_bytes());
                image[base + 248..base + 256].copy_from_slice(&size.to_le_bytes());
                dir_index += 1;
            };

        for entry in entries {
            match entry {
                TestEntry::Dir { id, parent, name } => {
                    write_entry(&mut image, *parent, TYPE_DIRECTORY, name, *id, 0);
                }
                TestEntry::File {
                    parent,
                    name,
                    content,
                } => {
                    let start = next_data_block;
                    let nblocks = core::cmp::max(1, content.len().div_ceil(bs));
                    for i in 0..nblocks {
                        let block = next_data_block;
                        let chunk_start = i * bs;
                        let chunk_end = core::cmp::min(chunk_start + bs, content.len());
                        if chunk_start < content.len() {
                            image[block as usize * bs
                                ..block as usize * bs + (chunk_end - chunk_start)]
                                .copy_from_slice(&content[chunk_start..chunk_end]);
                        }
                        let next = if i == nblocks - 1 {
                            END_OF_CHAIN
                        } else {
                            next_data_block + 1
                        };
                        let table_offset = 16 * bs + block as usize * 8;
                        image[table_offset..table_offset + 8].copy_from_slice(&next.to_le_bytes());
                        next_data_block += 1;
                    }
                    write_entry(
                        &mut image,
                        *parent,
                        TYPE_FILE,
                        name,
                        start,
                        content.len() as u64,
                    );
                }
            }
        }

        image
    }

    /// Corrupt a file's allocation chain into a self-loop.
    pub fn poison_chain(image: &mut [u8], block: u64) {
        let table_offset = 16 * TEST_BLOCK_SIZE as usize + block as usize * 8;
        image[table_offset..table_offset + 8].copy_from_slice(&block.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::vfs::devfs::{devfs_init, register_device, RamDisk};
    use crate::vfs::vfs_init;

    const HELLO: &[u8] = b"Hello, DripOS!\n";

    fn standard_image() -> Vec<u8> {
        build_image(&[
            TestEntry::File {
                parent: ROOT_DIR_ID,
                name: "hello.txt",
                content: HELLO,
            },
            TestEntry::Dir {
                id: 1,
                parent: ROOT_DIR_ID,
                name: "docs",
            },
            TestEntry::File {
                parent: 1,
                name: "README.md",
                content: b"# readme",
            },
            TestEntry::File {
                parent: ROOT_DIR_ID,
                name: "big.bin",
                content: &[0xAB; 1300],
            },
        ])
    }

    /// Mounts a fresh tree with the image behind /dev/satadeva.
    fn mount_standard(image: Vec<u8>) -> Arc<EchfsFilesystem> {
        vfs_init();
        devfs_init().unwrap();
        register_device("satadeva", RamDisk::new(image)).unwrap();
        echfs_mount("/dev/satadeva", "/echfs_mount").unwrap()
    }

    #[test]
    fn probe_rejects_bad_magic() {
        let _g = crate::lib::testing::lock();
        vfs_init();
        devfs_init().unwrap();
        let mut image = standard_image();
        image[4] = b'X';
        register_device("satadeva", RamDisk::new(image)).unwrap();
        assert!(matches!(
            EchfsFilesystem::probe("/dev/satadeva"),
            Err(Errno::EINVAL)
        ));
    }

    #[test]
    fn probe_parses_geometry() {
        let _g = crate::lib::testing::lock();
        let fs = mount_standard(standard_image());
        assert_eq!(fs.block_size, TEST_BLOCK_SIZE);
        assert_eq!(fs.blocks, TEST_BLOCK_COUNT);
        // 128 blocks * 8 bytes = 1024 bytes = 2 blocks of table.
        assert_eq!(fs.alloc_table_blocks, 2);
        assert_eq!(fs.main_dir_block, 18);
        assert_eq!(fs.alloc_table_addr, 16 * TEST_BLOCK_SIZE);
    }

    #[test]
    fn path_resolution_cases() {
        let _g = crate::lib::testing::lock();
        let fs = mount_standard(standard_image());

        let entry = fs.path_resolve("/hello.txt").unwrap();
        assert_eq!(entry.entry_type, TYPE_FILE);
        assert_eq!(entry.file_size_bytes, HELLO.len() as u64);

        let nested = fs.path_resolve("/docs/README.md").unwrap();
        assert_eq!(nested.name, "README.md");

        let dir = fs.path_resolve("/docs").unwrap();
        assert_eq!(dir.entry_type, TYPE_DIRECTORY);

        assert_eq!(fs.path_resolve("/"), Err(EchfsError::RootEntry));
        assert_eq!(fs.path_resolve("/nope"), Err(EchfsError::SearchFail));
        assert_eq!(
            fs.path_resolve("/docs/missing"),
            Err(EchfsError::SearchFail)
        );
        // A file used as a directory fails the scan.
        assert_eq!(
            fs.path_resolve("/hello.txt/x"),
            Err(EchfsError::SearchFail)
        );

        let long: String = core::iter::repeat('a').take(205).collect();
        let mut path = String::from("/");
        path.push_str(&long);
        assert_eq!(fs.path_resolve(&path), Err(EchfsError::NameTooLong));
    }

    #[test]
    fn chain_reads_and_eof() {
        let _g = crate::lib::testing::lock();
        let fs = mount_standard(standard_image());

        let entry = fs.path_resolve("/hello.txt").unwrap();
        assert_eq!(fs.read_file(&entry).unwrap(), HELLO);

        // Multi-block file: 1300 bytes spans three 512-byte blocks with a
        // truncated tail.
        let big = fs.path_resolve("/big.bin").unwrap();
        let data = fs.read_file(&big).unwrap();
        assert_eq!(data.len(), 1300);
        assert!(data.iter().all(|&b| b == 0xAB));

        // Offset reads across a block boundary.
        let mut buf = [0u8; 100];
        assert_eq!(fs.read_range(&big, 500, &mut buf).unwrap(), 100);

        // Reads at EOF return 0, reads near EOF are short.
        assert_eq!(fs.read_range(&big, 1300, &mut buf).unwrap(), 0);
        assert_eq!(fs.read_range(&big, 1290, &mut buf).unwrap(), 10);
    }

    #[test]
    fn corrupt_chain_is_rejected() {
        let _g = crate::lib::testing::lock();
        let mut image = standard_image();
        // hello.txt occupies the first data block (22); loop it onto itself.
        poison_chain(&mut image, 22);
        let fs = mount_standard(image);

        let hello = fs.path_resolve("/hello.txt").unwrap();
        // A walk longer than block_count steps must be rejected, not spin.
        let mut fake = hello.clone();
        fake.file_size_bytes = 70_000;
        let mut buf = alloc::vec![0u8; 70_000];
        assert!(matches!(
            fs.read_range(&fake, 0, &mut buf),
            Err(Errno::EIO)
        ));
    }

    #[test]
    fn mounted_lookup_reads_through_vfs() {
        let _g = crate::lib::testing::lock();
        mount_standard(standard_image());

        let file = vfs::open("/echfs_mount/hello.txt", OpenFlags::O_RDONLY).unwrap();
        let mut buf = [0u8; 100];
        assert_eq!(file.read(&mut buf).unwrap(), HELLO.len());
        assert_eq!(&buf[..HELLO.len()], HELLO);

        // Seek back and re-read: identical bytes.
        file.seek(0, SEEK_SET).unwrap();
        let mut buf2 = [0u8; 100];
        assert_eq!(file.read(&mut buf2).unwrap(), HELLO.len());
        assert_eq!(buf[..], buf2[..]);

        // Nested lazy materialization, including the intermediate dir.
        let readme = vfs::open("/echfs_mount/docs/README.md", OpenFlags::O_RDONLY).unwrap();
        let mut rbuf = [0u8; 32];
        assert_eq!(readme.read(&mut rbuf).unwrap(), 8);
        assert_eq!(&rbuf[..8], b"# readme");
        let docs = vfs::get_node_from_path("/echfs_mount/docs").unwrap();
        assert!(docs.mountpoint().is_some());

        // Misses below the mountpoint stay ENOENT.
        assert!(matches!(
            vfs::open("/echfs_mount/ghost", OpenFlags::O_RDONLY),
            Err(Errno::ENOENT)
        ));

        // Seek past EOF on an echfs file is rejected.
        let file = vfs::open("/echfs_mount/hello.txt", OpenFlags::O_RDONLY).unwrap();
        assert!(matches!(
            file.seek(HELLO.len() as u64 + 1, SEEK_SET),
            Err(Errno::EINVAL)
        ));
    }

    #[test]
    fn entry_from_id_finds_directories() {
        let _g = crate::lib::testing::lock();
        let fs = mount_standard(standard_image());
        let docs = fs.entry_from_id(1).unwrap().unwrap();
        assert_eq!(docs.name, "docs");
        assert!(fs.entry_from_id(99).unwrap().is_none());
    }
}
