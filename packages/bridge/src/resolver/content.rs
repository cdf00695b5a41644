// packages/bridge/src/resolver/content.rs
//! Path lookup in the virtual tree
//!
//! Matching is exact: `/styles/style.css` matches only the file `style.css`
//! inside the top-level folder `styles`. No prefix matching, no implied
//! extensions, no directory fallbacks.

use crate::resolver::media_type::media_type_for;
use crate::vfs::VirtualFile;

/// A file found for a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent<'a> {
    pub content: &'a str,
    pub media_type: &'static str,
}

/// Look up `path` (with leading `/`) under `root`
///
/// Files without content are treated as absent.
pub fn resolve<'a>(path: &str, root: &'a VirtualFile) -> Option<ResolvedContent<'a>> {
    let relative = path.strip_prefix('/')?;
    let file = find(root.children(), relative)?;

    Some(ResolvedContent {
        content: file.content.as_deref()?,
        media_type: media_type_for(&file.name),
    })
}

// Depth-first: each node's path is its ancestors' names joined by `/`.
fn find<'a>(nodes: &'a [VirtualFile], remaining: &str) -> Option<&'a VirtualFile> {
    for node in nodes {
        if node.is_file() {
            if node.name == remaining {
                return Some(node);
            }
            continue;
        }

        let Some(rest) = remaining
            .strip_prefix(node.name.as_str())
            .and_then(|r| r.strip_prefix('/'))
        else {
            continue;
        };

        if let Some(found) = find(node.children(), rest) {
            return Some(found);
        }
    }

    None
}
