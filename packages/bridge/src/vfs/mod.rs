// packages/bridge/src/vfs/mod.rs
//! Virtual project filesystem
//!
//! The bridge only ever reads the tree. Files carry text content, folders
//! carry children, and a file's path is its ancestors' names joined with `/`
//! (the root folder itself does not contribute a segment).

pub mod source;

pub use source::{SharedTree, TreeSource};

use crate::utils::errors::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Node kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Folder,
}

/// A node in the project tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualFile {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: FileKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<VirtualFile>>,
}

impl VirtualFile {
    pub fn file(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::File,
            content: Some(content.into()),
            children: None,
        }
    }

    pub fn folder(name: impl Into<String>, children: Vec<VirtualFile>) -> Self {
        Self {
            name: name.into(),
            kind: FileKind::Folder,
            content: None,
            children: Some(children),
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_folder(&self) -> bool {
        self.kind == FileKind::Folder
    }

    /// Children of a folder; empty for files
    pub fn children(&self) -> &[VirtualFile] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Starter project used when no tree file is configured
    pub fn demo_project() -> Self {
        Self::folder(
            "project",
            vec![
                Self::file(
                    "index.html",
                    "<!DOCTYPE html>\n<html>\n<head>\n    <title>My App</title>\n    \
                     <link rel=\"stylesheet\" href=\"/styles/style.css\">\n</head>\n<body>\n    \
                     <h1>Hello from the virtual filesystem!</h1>\n    \
                     <script src=\"/app.js\"></script>\n</body>\n</html>",
                ),
                Self::file("app.js", "console.log(\"Hello from the virtual filesystem!\");"),
                Self::folder(
                    "styles",
                    vec![Self::file("style.css", "body { font-family: Arial, sans-serif; }")],
                ),
            ],
        )
    }

    /// Load a tree from a JSON or YAML file, chosen by extension
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;

        let tree: VirtualFile = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml") | Some("yml") => serde_yaml::from_str(&raw)?,
            Some("json") => serde_json::from_str(&raw)?,
            other => {
                return Err(BridgeError::Tree(format!(
                    "Unsupported tree file extension: {:?}",
                    other
                )))
            }
        };

        if !tree.is_folder() {
            return Err(BridgeError::Tree(format!(
                "Tree root '{}' must be a folder",
                tree.name
            )));
        }

        Ok(tree)
    }

    /// All nodes below this folder in depth-first pre-order
    pub fn entries(&self) -> Vec<TreeEntry<'_>> {
        let mut entries = Vec::new();
        collect_entries(self.children(), "", &mut entries);
        entries
    }
}

/// A node paired with its path relative to the root, without a leading `/`
#[derive(Debug, Clone)]
pub struct TreeEntry<'a> {
    pub path: String,
    pub node: &'a VirtualFile,
}

fn collect_entries<'a>(nodes: &'a [VirtualFile], prefix: &str, out: &mut Vec<TreeEntry<'a>>) {
    for node in nodes {
        let path = if prefix.is_empty() {
            node.name.clone()
        } else {
            format!("{}/{}", prefix, node.name)
        };

        out.push(TreeEntry {
            path: path.clone(),
            node,
        });

        if node.is_folder() {
            collect_entries(node.children(), &path, out);
        }
    }
}
