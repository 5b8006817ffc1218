// Virtual File System
//
// A named node tree with a five-operation vtable per node. Nodes under a
// mounted filesystem are materialized lazily: a lookup miss below a
// registered mountpoint asks the filesystem's node handler to create the
// missing nodes, then retries.

pub mod devfs;
pub mod file;
pub mod mount;

pub use file::{File, FdTable, OpenFlags};

use crate::config::MAX_NAME_LEN;
use crate::lib::error::{Errno, Result};
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::sync::atomic::{AtomicU64, Ordering};
use spin::RwLock;

/// Node operations. Filesystem drivers override only what they implement;
/// the defaults are the directory ("dummy") behavior.
pub trait NodeOps: Send + Sync {
    fn open(&self, node: &Arc<VfsNode>, flags: OpenFlags) -> Result<()> {
        let _ = (node, flags);
        Ok(())
    }

    fn close(&self, node: &Arc<VfsNode>) -> Result<()> {
        let _ = node;
        Ok(())
    }

    fn read(&self, node: &Arc<VfsNode>, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let _ = (node, offset, buf);
        Err(Errno::EISDIR)
    }

    fn write(&self, node: &Arc<VfsNode>, offset: u64, buf: &[u8]) -> Result<usize> {
        let _ = (node, offset, buf);
        Err(Errno::EISDIR)
    }

    /// Validate an absolute seek target; the FD layer stores the offset.
    fn seek(&self, node: &Arc<VfsNode>, target: u64) -> Result<u64> {
        let _ = node;
        Ok(target)
    }
}

/// The default directory ops.
pub struct DummyOps;

impl NodeOps for DummyOps {}

pub struct VfsNode {
    pub name: String,
    ops: Arc<dyn NodeOps>,
    parent: RwLock<Weak<VfsNode>>,
    children: RwLock<Vec<Arc<VfsNode>>>,
    mountpoint: RwLock<Weak<VfsNode>>,
    unid: u64,
}

static NEXT_UNID: AtomicU64 = AtomicU64::new(1);

impl VfsNode {
    pub fn new(name: &str, ops: Arc<dyn NodeOps>) -> Arc<Self> {
        debug_assert!(!name.contains('/'));
        debug_assert!(name.len() <= MAX_NAME_LEN);
        Arc::new(Self {
            name: name.into(),
            ops,
            parent: RwLock::new(Weak::new()),
            children: RwLock::new(Vec::new()),
            mountpoint: RwLock::new(Weak::new()),
            unid: NEXT_UNID.fetch_add(1, Ordering::SeqCst),
        })
    }

    pub fn unid(&self) -> u64 {
        self.unid
    }

    pub fn ops(&self) -> &Arc<dyn NodeOps> {
        &self.ops
    }

    pub fn parent(&self) -> Option<Arc<VfsNode>> {
        self.parent.read().upgrade()
    }

    /// The mountpoint node this subtree belongs to, if any.
    pub fn mountpoint(&self) -> Option<Arc<VfsNode>> {
        self.mountpoint.read().upgrade()
    }

    pub fn set_mountpoint(&self, mountpoint: &Arc<VfsNode>) {
        *self.mountpoint.write() = Arc::downgrade(mountpoint);
    }

    pub fn find_child(&self, name: &str) -> Option<Arc<VfsNode>> {
        self.children
            .read()
            .iter()
            .find(|c| c.name == name)
            .cloned()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }
}

static ROOT_NODE: RwLock<Option<Arc<VfsNode>>> = RwLock::new(None);

/// Build a fresh tree with an empty root. Also resets mountpoint
/// registrations.
pub fn vfs_init() {
    *ROOT_NODE.write() = Some(VfsNode::new("", Arc::new(DummyOps)));
    mount::reset_mountpoints();
    crate::info!("vfs: initialized");
}

pub fn root() -> Option<Arc<VfsNode>> {
    ROOT_NODE.read().clone()
}

/// Attach `child` to `parent`. Sibling names are unique.
pub fn add_child(parent: &Arc<VfsNode>, child: &Arc<VfsNode>) -> Result<()> {
    let mut children = parent.children.write();
    if children.iter().any(|c| c.name == child.name) {
        return Err(Errno::EEXIST);
    }
    *child.parent.write() = Arc::downgrade(parent);
    children.push(child.clone());
    Ok(())
}

/// Split an absolute path into validated components.
fn split_components(path: &str) -> Result<Vec<&str>> {
    if !path.starts_with('/') {
        return Err(Errno::ENOENT);
    }
    let mut components = Vec::new();
    for part in path.split('/') {
        if part.is_empty() {
            continue;
        }
        if part.len() > MAX_NAME_LEN {
            return Err(Errno::ENAMETOOLONG);
        }
        components.push(part);
    }
    Ok(components)
}

/// Pure tree walk, no mountpoint fallback.
fn walk(path: &str) -> Result<Arc<VfsNode>> {
    let mut current = root().ok_or(Errno::ENOENT)?;
    for component in split_components(path)? {
        current = current.find_child(component).ok_or(Errno::ENOENT)?;
    }
    Ok(current)
}

/// Resolve an absolute path. A miss below a registered mountpoint gives
/// the filesystem's node handler one chance to materialize the nodes.
pub fn get_node_from_path(path: &str) -> Result<Arc<VfsNode>> {
    match walk(path) {
        Ok(node) => Ok(node),
        Err(Errno::ENOENT) => {
            let (mp_path, handler) = mount::nearest_mountpoint(path).ok_or(Errno::ENOENT)?;
            let relative = &path[mp_path.len()..];
            let relative = if relative.is_empty() { "/" } else { relative };
            handler.generate_node(relative);
            walk(path)
        }
        Err(e) => Err(e),
    }
}

/// Create any missing nodes along `path`. Intermediates get directory
/// ops; the leaf gets `ops`. Every created node is attributed to
/// `mountpoint`. Returns the leaf.
pub fn create_missing_nodes_from_path(
    path: &str,
    ops: Arc<dyn NodeOps>,
    mountpoint: &Arc<VfsNode>,
) -> Result<Arc<VfsNode>> {
    let components = split_components(path)?;
    let mut current = root().ok_or(Errno::ENOENT)?;

    for (i, component) in components.iter().enumerate() {
        let is_last = i == components.len() - 1;
        current = match current.find_child(component) {
            Some(existing) => existing,
            None => {
                let node_ops: Arc<dyn NodeOps> = if is_last {
                    ops.clone()
                } else {
                    Arc::new(DummyOps)
                };
                let node = VfsNode::new(component, node_ops);
                node.set_mountpoint(mountpoint);
                add_child(&current, &node)?;
                node
            }
        };
    }

    Ok(current)
}

/// Reconstruct the absolute path of a node by walking parents.
pub fn get_full_path(node: &Arc<VfsNode>) -> String {
    let mut names: Vec<String> = Vec::new();
    let mut current = node.clone();
    while let Some(parent) = current.parent() {
        names.push(current.name.clone());
        current = parent;
    }
    if names.is_empty() {
        return "/".into();
    }
    let mut path = String::new();
    for name in names.iter().rev() {
        path.push('/');
        path.push_str(name);
    }
    path
}

/// Resolve a path and open it, yielding the kernel file handle.
pub fn open(path: &str, flags: OpenFlags) -> Result<Arc<File>> {
    let node = get_node_from_path(path)?;
    node.ops().open(&node, flags)?;
    Ok(Arc::new(File::new(node, flags)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Arc<VfsNode> {
        vfs_init();
        root().unwrap()
    }

    #[test]
    fn tree_construction_and_lookup() {
        let _g = crate::lib::testing::lock();
        let root = setup();

        let dir = VfsNode::new("dir", Arc::new(DummyOps));
        add_child(&root, &dir).unwrap();
        let leaf = VfsNode::new("leaf", Arc::new(DummyOps));
        add_child(&dir, &leaf).unwrap();

        let found = get_node_from_path("/dir/leaf").unwrap();
        assert_eq!(found.unid(), leaf.unid());
        assert_eq!(get_full_path(&found), "/dir/leaf");
        assert!(found.parent().is_some());

        // Sibling names are unique.
        let dup = VfsNode::new("leaf", Arc::new(DummyOps));
        assert_eq!(add_child(&dir, &dup), Err(Errno::EEXIST));
    }

    #[test]
    fn missing_paths_are_enoent() {
        let _g = crate::lib::testing::lock();
        setup();
        assert!(matches!(get_node_from_path("/nope"), Err(Errno::ENOENT)));
    }

    #[test]
    fn component_length_boundary() {
        let _g = crate::lib::testing::lock();
        let root = setup();

        let long_ok: String = core::iter::repeat('a').take(201).collect();
        let node = VfsNode::new(&long_ok, Arc::new(DummyOps));
        add_child(&root, &node).unwrap();
        let mut path = String::from("/");
        path.push_str(&long_ok);
        assert!(get_node_from_path(&path).is_ok());

        let long_bad: String = core::iter::repeat('a').take(202).collect();
        let mut path = String::from("/");
        path.push_str(&long_bad);
        assert!(matches!(get_node_from_path(&path), Err(Errno::ENAMETOOLONG)));
    }

    #[test]
    fn create_missing_nodes_attributes_mountpoint() {
        let _g = crate::lib::testing::lock();
        let root = setup();

        let mp = VfsNode::new("mnt", Arc::new(DummyOps));
        add_child(&root, &mp).unwrap();

        let leaf =
            create_missing_nodes_from_path("/mnt/a/b/c.txt", Arc::new(DummyOps), &mp).unwrap();
        assert_eq!(get_full_path(&leaf), "/mnt/a/b/c.txt");
        assert_eq!(leaf.mountpoint().unwrap().unid(), mp.unid());

        let mid = get_node_from_path("/mnt/a/b").unwrap();
        assert_eq!(mid.mountpoint().unwrap().unid(), mp.unid());
        // Intermediates carry directory ops.
        let mut buf = [0u8; 4];
        assert_eq!(mid.ops().read(&mid, 0, &mut buf), Err(Errno::EISDIR));

        // Idempotent: resolving again yields the same nodes.
        let again =
            create_missing_nodes_from_path("/mnt/a/b/c.txt", Arc::new(DummyOps), &mp).unwrap();
        assert_eq!(again.unid(), leaf.unid());
    }

    #[test]
    fn open_close_leaves_tree_unchanged() {
        let _g = crate::lib::testing::lock();
        let root = setup();
        let node = VfsNode::new("file", Arc::new(DummyOps));
        add_child(&root, &node).unwrap();

        let before = root.child_count();
        let file = open("/file", OpenFlags::O_RDONLY).unwrap();
        file.node.ops().close(&file.node).unwrap();
        drop(file);
        assert_eq!(root.child_count(), before);
        assert!(get_node_from_path("/file").is_ok());
    }
}
