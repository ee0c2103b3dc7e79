//! The vault: a sandboxed directory of markdown notes on disk.
//!
//! Every operation takes a [`VaultPath`], which is already free of `..`
//! segments, and resolves it through [`Vault::resolve`], which additionally
//! guards against symlinks that point outside the vault root.

mod config;
mod directories;
mod notes;
mod resources;
mod tree;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub use config::{VaultConfig, VAULT_DIR};
pub use directories::{DirectoryEntry, DirectoryListing};
pub use notes::Note;
pub use resources::{
    content_type_for, resource_path, Image, IMAGE_CONTENT_TYPES, IMAGE_EXTENSIONS, MAX_IMAGE_SIZE,
    RESOURCES_DIR,
};
pub use tree::{scan_tree, NodeKind, TreeNode};

use crate::error::KbaseError;
use crate::path::VaultPath;

/// An open vault rooted at a directory on disk.
#[derive(Debug)]
pub struct Vault {
    root: PathBuf,
    pub config: VaultConfig,
}

impl Vault {
    /// Initialises a new vault at the given path, creating `.kbase/config.toml`.
    pub fn create(path: &Path) -> Result<Self, KbaseError> {
        std::fs::create_dir_all(path)?;
        Self::open(path)
    }

    /// Opens an existing directory as a vault, creating config if absent.
    pub fn open(path: &Path) -> Result<Self, KbaseError> {
        let root = path.canonicalize()?;
        if !root.is_dir() {
            return Err(KbaseError::NotADirectory(path.display().to_string()));
        }
        let config = VaultConfig::load_or_init(&root)?;
        log::info!("Opened vault {:?} at {}", config.name, root.display());
        Ok(Self { root, config })
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps a vault path to a filesystem path and checks it stays under the root.
    ///
    /// The nearest existing ancestor is canonicalized so a symlink inside the
    /// vault cannot be used to reach files outside it.
    pub fn resolve(&self, path: &VaultPath) -> Result<PathBuf, KbaseError> {
        let full = self.root.join(path.as_str());

        let mut ancestor = full.as_path();
        loop {
            match ancestor.canonicalize() {
                Ok(canonical) => {
                    if !canonical.starts_with(&self.root) {
                        return Err(KbaseError::PathTraversal(path.to_string()));
                    }
                    break;
                }
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => match ancestor.parent() {
                    Some(parent) => ancestor = parent,
                    None => break,
                },
                Err(error) => return Err(error.into()),
            }
        }

        Ok(full)
    }

    /// Returns the full file tree of the vault.
    pub fn list_tree(&self) -> Result<TreeNode, KbaseError> {
        scan_tree(&self.root)
    }
}

pub(crate) fn unix_seconds(time: std::io::Result<SystemTime>) -> Option<i64> {
    time.ok()?
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|duration| duration.as_secs() as i64)
}

/// Creates the parent directory of `path` if needed.
fn ensure_parent(path: &Path) -> Result<(), KbaseError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Vault with `note1.md`, `note2.md` and `subdir/note3.md`.
    pub(crate) fn fixture() -> (TempDir, Vault) {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("test_vault");
        std::fs::create_dir_all(root.join("subdir")).unwrap();
        std::fs::write(root.join("note1.md"), "# Test Note 1\n\nThis is a test note.").unwrap();
        std::fs::write(root.join("note2.md"), "# Test Note 2\n\nAnother test note.").unwrap();
        std::fs::write(root.join("subdir/note3.md"), "# Test Note 3\n\nNested test note.").unwrap();
        let vault = Vault::open(&root).unwrap();
        (temp, vault)
    }

    #[test]
    fn create_vault_produces_config() {
        let temp = TempDir::new().unwrap();
        let vault_path = temp.path().join("new-vault");

        let vault = Vault::create(&vault_path).unwrap();

        assert_eq!(vault.config.name, "new-vault");
        assert!(vault_path.join(".kbase/config.toml").exists());
    }

    #[test]
    fn open_vault_reads_existing_config() {
        let temp = TempDir::new().unwrap();
        let vault_path = temp.path().join("existing");
        std::fs::create_dir_all(&vault_path).unwrap();
        let saved = VaultConfig {
            name: "Existing Notes".to_string(),
            autosave_ms: 300,
        };
        saved.save(&vault_path).unwrap();

        let vault = Vault::open(&vault_path).unwrap();
        assert_eq!(vault.config, saved);
    }

    #[test]
    fn open_missing_directory_fails() {
        let temp = TempDir::new().unwrap();
        assert!(Vault::open(&temp.path().join("nope")).is_err());
    }

    #[test]
    fn resolve_keeps_paths_under_root() {
        let (_temp, vault) = fixture();
        let resolved = vault.resolve(&VaultPath::parse("subdir/new/deeper.md").unwrap()).unwrap();
        assert!(resolved.starts_with(vault.root()));
    }

    #[cfg(unix)]
    #[test]
    fn resolve_rejects_symlink_escape() {
        let (temp, vault) = fixture();
        let outside = temp.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        std::fs::write(outside.join("secret.md"), "secret").unwrap();
        std::os::unix::fs::symlink(&outside, vault.root().join("link")).unwrap();

        let escaped = VaultPath::parse("link/secret.md").unwrap();
        assert!(matches!(vault.resolve(&escaped), Err(KbaseError::PathTraversal(_))));

        let not_yet = VaultPath::parse("link/new.md").unwrap();
        assert!(matches!(vault.resolve(&not_yet), Err(KbaseError::PathTraversal(_))));
    }
}
