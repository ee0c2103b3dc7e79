use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::KbaseError;
use crate::path::VaultPath;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// A single entry (file or directory) in the vault's file tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub name: String,
    pub path: VaultPath,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub children: Vec<TreeNode>,
    pub created: Option<i64>,
    pub modified: Option<i64>,
}

impl TreeNode {
    pub fn is_directory(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    /// Finds the node at `path`, descending from this node.
    pub fn find(&self, path: &VaultPath) -> Option<&TreeNode> {
        if &self.path == path {
            return Some(self);
        }
        if !path.starts_with(&self.path) {
            return None;
        }
        self.children.iter().find_map(|child| child.find(path))
    }

    /// Flattens the tree into a depth-first list, this node first.
    pub fn flatten(&self) -> Vec<&TreeNode> {
        let mut result = vec![self];
        for child in &self.children {
            result.extend(child.flatten());
        }
        result
    }

    /// Paths of every note below this node.
    pub fn note_paths(&self) -> Vec<&VaultPath> {
        self.flatten()
            .into_iter()
            .filter(|node| node.kind == NodeKind::File)
            .map(|node| &node.path)
            .collect()
    }
}

/// Scans `root` for markdown files and directories, excluding hidden entries.
///
/// Empty directories are kept so freshly created folders show up. Within a
/// directory, subdirectories come first, then files, each sorted
/// case-insensitively.
pub fn scan_tree(root: &Path) -> Result<TreeNode, KbaseError> {
    let metadata = std::fs::metadata(root)?;
    Ok(TreeNode {
        name: "vault".to_string(),
        path: VaultPath::root(),
        kind: NodeKind::Directory,
        children: scan_recursive(root, &VaultPath::root())?,
        created: super::unix_seconds(metadata.created()),
        modified: super::unix_seconds(metadata.modified()),
    })
}

fn scan_recursive(directory: &Path, relative: &VaultPath) -> Result<Vec<TreeNode>, KbaseError> {
    let read_dir = match std::fs::read_dir(directory) {
        Ok(read_dir) => read_dir,
        Err(error) if error.kind() == std::io::ErrorKind::PermissionDenied => {
            log::warn!("Skipping unreadable directory {}: {error}", directory.display());
            return Ok(Vec::new());
        }
        Err(error) => return Err(error.into()),
    };

    let mut entries = Vec::new();

    for entry in read_dir.filter_map(|entry| entry.ok()) {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }

        let path = entry.path();
        // Links are never followed: they may loop or lead out of the vault.
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if metadata.file_type().is_symlink() {
            continue;
        }
        let Ok(node_path) = relative.join(&name) else {
            continue;
        };

        if metadata.is_dir() {
            entries.push(TreeNode {
                children: scan_recursive(&path, &node_path)?,
                name,
                path: node_path,
                kind: NodeKind::Directory,
                created: super::unix_seconds(metadata.created()),
                modified: super::unix_seconds(metadata.modified()),
            });
        } else if node_path.is_markdown() {
            entries.push(TreeNode {
                name,
                path: node_path,
                kind: NodeKind::File,
                children: Vec::new(),
                created: super::unix_seconds(metadata.created()),
                modified: super::unix_seconds(metadata.modified()),
            });
        }
    }

    entries.sort_by(|a, b| {
        b.is_directory()
            .cmp(&a.is_directory())
            .then(a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    Ok(entries)
}
