use std::path::Path;

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use super::{ensure_parent, unix_seconds, NodeKind, Vault};
use crate::error::KbaseError;
use crate::path::VaultPath;

/// One entry of a shallow directory listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub name: String,
    pub path: VaultPath,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// Zero for directories.
    pub size: u64,
    pub modified: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub name: String,
    pub path: VaultPath,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub size: u64,
    pub modified: i64,
    pub item_count: usize,
    pub contents: Vec<DirectoryEntry>,
}

impl Vault {
    pub fn create_directory(&self, path: &VaultPath) -> Result<VaultPath, KbaseError> {
        if path.is_root() {
            return Err(KbaseError::AlreadyExists(path.to_string()));
        }
        let dir_path = self.resolve(path)?;
        if dir_path.exists() {
            return Err(KbaseError::AlreadyExists(path.to_string()));
        }

        std::fs::create_dir_all(&dir_path)?;
        log::info!("Created directory {path}");
        Ok(path.clone())
    }

    /// Lists the immediate children of a directory, hidden entries excluded.
    pub fn get_directory(&self, path: &VaultPath) -> Result<DirectoryListing, KbaseError> {
        let dir_path = self.resolve(path)?;

        if !dir_path.exists() {
            return Err(KbaseError::NotFound(path.to_string()));
        }
        if !dir_path.is_dir() {
            return Err(KbaseError::NotADirectory(path.to_string()));
        }

        let metadata = std::fs::metadata(&dir_path)?;
        let contents = self.shallow_contents(&dir_path, path)?;
        let name = if path.is_root() {
            self.config.name.clone()
        } else {
            path.file_name().to_string()
        };

        Ok(DirectoryListing {
            name,
            path: path.clone(),
            kind: NodeKind::Directory,
            size: metadata.len(),
            modified: unix_seconds(metadata.modified()).unwrap_or_default(),
            item_count: contents.len(),
            contents,
        })
    }

    fn shallow_contents(&self, dir_path: &Path, relative: &VaultPath) -> Result<Vec<DirectoryEntry>, KbaseError> {
        let read_dir = match std::fs::read_dir(dir_path) {
            Ok(read_dir) => read_dir,
            Err(error) if error.kind() == std::io::ErrorKind::PermissionDenied => {
                log::warn!("Cannot list {}: {error}", dir_path.display());
                return Ok(Vec::new());
            }
            Err(error) => return Err(error.into()),
        };

        let mut contents = Vec::new();
        for entry in read_dir.filter_map(|entry| entry.ok()) {
            let name = entry.file_name().to_string_lossy().to_string();
            if name.starts_with('.') {
                continue;
            }
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            if metadata.file_type().is_symlink() {
                continue;
            }
            let Ok(path) = relative.join(&name) else {
                continue;
            };
            let is_dir = metadata.is_dir();
            contents.push(DirectoryEntry {
                name,
                path,
                kind: if is_dir { NodeKind::Directory } else { NodeKind::File },
                size: if is_dir { 0 } else { metadata.len() },
                modified: unix_seconds(metadata.modified()).unwrap_or_default(),
            });
        }

        contents.sort_by(|a, b| {
            (a.kind == NodeKind::File)
                .cmp(&(b.kind == NodeKind::File))
                .then(a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        });
        Ok(contents)
    }

    /// Renames the last segment of a directory path, keeping its parent.
    pub fn rename_directory(&self, path: &VaultPath, new_name: &str) -> Result<VaultPath, KbaseError> {
        let destination = path.with_file_name(new_name)?;
        self.move_directory(path, &destination)
    }

    pub fn move_directory(&self, source: &VaultPath, destination: &VaultPath) -> Result<VaultPath, KbaseError> {
        let (source_dir, dest_dir) = self.check_directory_transfer(source, destination)?;
        ensure_parent(&dest_dir)?;
        std::fs::rename(&source_dir, &dest_dir)?;
        log::info!("Moved directory {source} -> {destination}");
        Ok(destination.clone())
    }

    /// Copies a directory tree. Symlinks are not followed or copied.
    pub fn copy_directory(&self, source: &VaultPath, destination: &VaultPath) -> Result<VaultPath, KbaseError> {
        let (source_dir, dest_dir) = self.check_directory_transfer(source, destination)?;
        ensure_parent(&dest_dir)?;

        for entry in WalkDir::new(&source_dir).follow_links(false) {
            let entry = entry.map_err(std::io::Error::from)?;
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&source_dir) else {
                continue;
            };
            let target = dest_dir.join(relative);
            if file_type.is_dir() {
                std::fs::create_dir_all(&target)?;
            } else {
                std::fs::copy(entry.path(), &target)?;
            }
        }

        log::info!("Copied directory {source} -> {destination}");
        Ok(destination.clone())
    }

    /// Deletes a directory; non-empty directories require `recursive`.
    pub fn delete_directory(&self, path: &VaultPath, recursive: bool) -> Result<VaultPath, KbaseError> {
        if path.is_root() {
            return Err(KbaseError::InvalidPath {
                path: path.to_string(),
                reason: "the vault root cannot be deleted",
            });
        }
        let dir_path = self.resolve(path)?;

        if !dir_path.exists() {
            return Err(KbaseError::NotFound(path.to_string()));
        }
        if !dir_path.is_dir() {
            return Err(KbaseError::NotADirectory(path.to_string()));
        }

        if recursive {
            std::fs::remove_dir_all(&dir_path)?;
        } else {
            if std::fs::read_dir(&dir_path)?.next().is_some() {
                return Err(KbaseError::DirectoryNotEmpty(path.to_string()));
            }
            std::fs::remove_dir(&dir_path)?;
        }

        log::info!("Deleted directory {path} (recursive: {recursive})");
        Ok(path.clone())
    }

    fn check_directory_transfer(
        &self,
        source: &VaultPath,
        destination: &VaultPath,
    ) -> Result<(std::path::PathBuf, std::path::PathBuf), KbaseError> {
        if source.is_root() {
            return Err(KbaseError::InvalidPath {
                path: source.to_string(),
                reason: "the vault root cannot be moved or copied",
            });
        }
        let source_dir = self.resolve(source)?;
        let dest_dir = self.resolve(destination)?;

        if !source_dir.exists() {
            return Err(KbaseError::NotFound(source.to_string()));
        }
        if !source_dir.is_dir() {
            return Err(KbaseError::NotADirectory(source.to_string()));
        }
        if dest_dir.exists() {
            return Err(KbaseError::AlreadyExists(destination.to_string()));
        }
        if destination.starts_with(source) {
            return Err(KbaseError::IntoItself(destination.to_string()));
        }

        Ok((source_dir, dest_dir))
    }
}
