// packages/bridge/src/vfs/source.rs
//! Tree sources consumed by the resolver

use crate::utils::errors::{BridgeError, Result};
use crate::vfs::VirtualFile;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Read-only access to the project tree
pub trait TreeSource: Send + Sync {
    /// Current root folder
    fn tree(&self) -> Result<Arc<VirtualFile>>;
}

impl<T: TreeSource + ?Sized> TreeSource for Arc<T> {
    fn tree(&self) -> Result<Arc<VirtualFile>> {
        (**self).tree()
    }
}

/// In-memory tree shared between the editor side and the resolver
///
/// Readers get a snapshot; writers swap in a new root, so a request always
/// sees one consistent tree.
pub struct SharedTree {
    root: RwLock<Arc<VirtualFile>>,
}

impl SharedTree {
    pub fn new(root: VirtualFile) -> Self {
        Self {
            root: RwLock::new(Arc::new(root)),
        }
    }

    /// Replace the whole tree
    pub fn replace(&self, root: VirtualFile) {
        *self.root.write() = Arc::new(root);
        debug!("Project tree replaced");
    }

    /// Overwrite the content of an existing file, addressed by `/`-separated path
    pub fn update_file_content(&self, path: &str, content: impl Into<String>) -> Result<()> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() {
            return Err(BridgeError::Tree("Empty file path".to_string()));
        }

        let mut guard = self.root.write();
        let root = Arc::make_mut(&mut guard);

        let file = find_file_mut(root, &segments)
            .ok_or_else(|| BridgeError::Tree(format!("No such file: {}", path)))?;
        file.content = Some(content.into());

        debug!("Updated content of {}", path);
        Ok(())
    }
}

impl TreeSource for SharedTree {
    fn tree(&self) -> Result<Arc<VirtualFile>> {
        Ok(Arc::clone(&self.root.read()))
    }
}

fn find_file_mut<'a>(
    folder: &'a mut VirtualFile,
    segments: &[&str],
) -> Option<&'a mut VirtualFile> {
    let (first, rest) = segments.split_first()?;
    let child = folder
        .children
        .as_mut()?
        .iter_mut()
        .find(|c| c.name == *first)?;

    if rest.is_empty() {
        child.is_file().then_some(child)
    } else if child.is_folder() {
        find_file_mut(child, rest)
    } else {
        None
    }
}
