// Mountpoint registry
//
// Maps absolute paths to filesystem handlers. A handler owns its typed
// filesystem descriptor and materializes VFS nodes on lookup misses below
// its mountpoint.

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use spin::RwLock;

pub trait FilesystemHandler: Send + Sync {
    /// Called on a lookup miss with the path relative to the mountpoint
    /// (leading slash included). Creates the missing VFS nodes if the
    /// filesystem knows the path.
    fn generate_node(&self, relative_path: &str);
}

struct Mountpoint {
    path: String,
    handler: Arc<dyn FilesystemHandler>,
}

static MOUNTPOINTS: RwLock<Vec<Mountpoint>> = RwLock::new(Vec::new());

pub fn register_mountpoint(path: &str, handler: Arc<dyn FilesystemHandler>) {
    crate::info!("vfs: registered mountpoint {}", path);
    MOUNTPOINTS.write().push(Mountpoint {
        path: path.into(),
        handler,
    });
}

pub fn is_mountpoint(path: &str) -> bool {
    MOUNTPOINTS.read().iter().any(|m| m.path == path)
}

/// The deepest registered mountpoint that is an ancestor of `path`.
pub fn nearest_mountpoint(path: &str) -> Option<(String, Arc<dyn FilesystemHandler>)> {
    let mounts = MOUNTPOINTS.read();
    let mut best: Option<&Mountpoint> = None;
    for mount in mounts.iter() {
        let is_prefix = path == mount.path
            || (path.starts_with(&mount.path)
                && path.as_bytes().get(mount.path.len()) == Some(&b'/'));
        if is_prefix && best.map(|b| mount.path.len() > b.path.len()).unwrap_or(true) {
            best = Some(mount);
        }
    }
    best.map(|m| (m.path.clone(), m.handler.clone()))
}

/// Drop all registrations; part of `vfs_init`.
pub fn reset_mountpoints() {
    MOUNTPOINTS.write().clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NullHandler;

    impl FilesystemHandler for NullHandler {
        fn generate_node(&self, _relative_path: &str) {}
    }

    #[test]
    fn prefix_matching_respects_component_boundaries() {
        let _g = crate::lib::testing::lock();
        reset_mountpoints();
        register_mountpoint("/mnt", Arc::new(NullHandler));
        register_mountpoint("/mnt/inner", Arc::new(NullHandler));

        assert!(nearest_mountpoint("/mnt/file").is_some());
        // "/mntx" shares a string prefix but not a path prefix.
        assert!(nearest_mountpoint("/mntx/file").is_none());

        let (path, _) = nearest_mountpoint("/mnt/inner/deep/file").unwrap();
        assert_eq!(path, "/mnt/inner");

        let (path, _) = nearest_mountpoint("/mnt/other").unwrap();
        assert_eq!(path, "/mnt");

        reset_mountpoints();
        assert!(nearest_mountpoint("/mnt/file").is_none());
    }
}
