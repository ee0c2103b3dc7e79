use serde::{Deserialize, Serialize};

use super::{ensure_parent, unix_seconds, Vault};
use crate::error::KbaseError;
use crate::path::VaultPath;

/// A note's content together with its on-disk metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub content: String,
    pub path: VaultPath,
    pub size: u64,
    /// Unix seconds.
    pub modified: i64,
}

impl Vault {
    pub fn get_note(&self, path: &VaultPath) -> Result<Note, KbaseError> {
        let file_path = self.resolve(path)?;

        if !file_path.exists() {
            return Err(KbaseError::NotFound(path.to_string()));
        }
        if !file_path.is_file() {
            return Err(KbaseError::NotAFile(path.to_string()));
        }
        if !path.is_markdown() {
            return Err(KbaseError::NotMarkdown(path.to_string()));
        }

        let bytes = std::fs::read(&file_path)?;
        let content = String::from_utf8(bytes).map_err(|_| KbaseError::InvalidUtf8(path.to_string()))?;
        let metadata = std::fs::metadata(&file_path)?;

        Ok(Note {
            content,
            path: path.clone(),
            size: metadata.len(),
            modified: unix_seconds(metadata.modified()).unwrap_or_default(),
        })
    }

    /// Creates a note, appending `.md` when the path has no markdown extension.
    /// Returns the path actually written.
    pub fn create_note(&self, path: &VaultPath, content: &str) -> Result<VaultPath, KbaseError> {
        if path.is_root() {
            return Err(KbaseError::NotAFile(path.to_string()));
        }
        let target = path.with_markdown_extension();
        if self.resolve(path)?.exists() {
            return Err(KbaseError::AlreadyExists(path.to_string()));
        }
        let file_path = self.resolve(&target)?;
        if file_path.exists() {
            return Err(KbaseError::AlreadyExists(target.to_string()));
        }

        ensure_parent(&file_path)?;
        std::fs::write(&file_path, content)?;
        log::info!("Created note {target}");
        Ok(target)
    }

    pub fn update_note(&self, path: &VaultPath, content: &str) -> Result<VaultPath, KbaseError> {
        let file_path = self.resolve(path)?;

        if !file_path.exists() {
            return Err(KbaseError::NotFound(path.to_string()));
        }
        if !file_path.is_file() {
            return Err(KbaseError::NotAFile(path.to_string()));
        }
        if !path.is_markdown() {
            return Err(KbaseError::NotMarkdown(path.to_string()));
        }

        std::fs::write(&file_path, content)?;
        log::debug!("Updated note {path} ({} bytes)", content.len());
        Ok(path.clone())
    }

    pub fn delete_note(&self, path: &VaultPath) -> Result<VaultPath, KbaseError> {
        let file_path = self.resolve(path)?;

        if !file_path.exists() {
            return Err(KbaseError::NotFound(path.to_string()));
        }
        if !file_path.is_file() {
            return Err(KbaseError::NotAFile(path.to_string()));
        }

        std::fs::remove_file(&file_path)?;
        log::info!("Deleted note {path}");
        Ok(path.clone())
    }

    /// Moves or renames a note. Returns the destination path, with `.md`
    /// appended if it had no markdown extension.
    pub fn move_note(&self, source: &VaultPath, destination: &VaultPath) -> Result<VaultPath, KbaseError> {
        let (source_path, target, target_path) = self.check_note_transfer(source, destination)?;
        ensure_parent(&target_path)?;
        std::fs::rename(&source_path, &target_path)?;
        log::info!("Moved note {source} -> {target}");
        Ok(target)
    }

    pub fn copy_note(&self, source: &VaultPath, destination: &VaultPath) -> Result<VaultPath, KbaseError> {
        let (source_path, target, target_path) = self.check_note_transfer(source, destination)?;
        ensure_parent(&target_path)?;
        std::fs::copy(&source_path, &target_path)?;
        log::info!("Copied note {source} -> {target}");
        Ok(target)
    }

    fn check_note_transfer(
        &self,
        source: &VaultPath,
        destination: &VaultPath,
    ) -> Result<(std::path::PathBuf, VaultPath, std::path::PathBuf), KbaseError> {
        let source_path = self.resolve(source)?;
        let raw_destination = self.resolve(destination)?;
        let target = destination.with_markdown_extension();
        let target_path = self.resolve(&target)?;

        if !source_path.exists() {
            return Err(KbaseError::NotFound(source.to_string()));
        }
        if !source_path.is_file() {
            return Err(KbaseError::NotAFile(source.to_string()));
        }
        if destination.is_root() {
            return Err(KbaseError::NotAFile(destination.to_string()));
        }
        if raw_destination.exists() || target_path.exists() {
            return Err(KbaseError::AlreadyExists(destination.to_string()));
        }

        Ok((source_path, target, target_path))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::KbaseError;
    use crate::path::VaultPath;
    use crate::vault::tests::fixture;

    fn p(raw: &str) -> VaultPath {
        VaultPath::parse(raw).unwrap()
    }

    #[test]
    fn get_note_returns_content_and_metadata() {
        let (_temp, vault) = fixture();
        let note = vault.get_note(&p("note1.md")).unwrap();
        assert_eq!(note.content, "# Test Note 1\n\nThis is a test note.");
        assert_eq!(note.path.to_url_path(), "/note1.md");
        assert_eq!(note.size, note.content.len() as u64);
        assert!(note.modified > 0);
    }

    #[test]
    fn get_nested_note() {
        let (_temp, vault) = fixture();
        let note = vault.get_note(&p("/subdir/note3.md")).unwrap();
        assert_eq!(note.content, "# Test Note 3\n\nNested test note.");
    }

    #[test]
    fn get_missing_note_is_not_found() {
        let (_temp, vault) = fixture();
        assert!(matches!(vault.get_note(&p("nope.md")), Err(KbaseError::NotFound(_))));
    }

    #[test]
    fn get_directory_as_note_is_rejected() {
        let (_temp, vault) = fixture();
        assert!(matches!(vault.get_note(&p("subdir")), Err(KbaseError::NotAFile(_))));
    }

    #[test]
    fn get_invalid_utf8_is_rejected() {
        let (_temp, vault) = fixture();
        std::fs::write(vault.root().join("binary.md"), [0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(vault.get_note(&p("binary.md")), Err(KbaseError::InvalidUtf8(_))));
    }

    #[test]
    fn create_note_in_new_nested_directory() {
        let (_temp, vault) = fixture();
        let created = vault.create_note(&p("nested/new_note.md"), "# Nested").unwrap();
        assert_eq!(created.as_str(), "nested/new_note.md");
        assert_eq!(vault.get_note(&created).unwrap().content, "# Nested");
    }

    #[test]
    fn create_note_appends_extension() {
        let (_temp, vault) = fixture();
        let created = vault.create_note(&p("ideas"), "").unwrap();
        assert_eq!(created.as_str(), "ideas.md");
        assert!(vault.root().join("ideas.md").exists());
    }

    #[test]
    fn create_existing_note_conflicts() {
        let (_temp, vault) = fixture();
        let result = vault.create_note(&p("note1.md"), "dup");
        assert!(matches!(result, Err(KbaseError::AlreadyExists(_))));
        assert_eq!(vault.get_note(&p("note1.md")).unwrap().content, "# Test Note 1\n\nThis is a test note.");
    }

    #[test]
    fn update_note_rewrites_content() {
        let (_temp, vault) = fixture();
        vault.update_note(&p("/note1.md"), "changed").unwrap();
        assert_eq!(vault.get_note(&p("note1.md")).unwrap().content, "changed");
    }

    #[test]
    fn update_missing_note_is_not_found() {
        let (_temp, vault) = fixture();
        assert!(matches!(vault.update_note(&p("ghost.md"), "x"), Err(KbaseError::NotFound(_))));
        assert!(!vault.root().join("ghost.md").exists());
    }

    #[test]
    fn delete_note_removes_file() {
        let (_temp, vault) = fixture();
        vault.delete_note(&p("note2.md")).unwrap();
        assert!(matches!(vault.get_note(&p("note2.md")), Err(KbaseError::NotFound(_))));
    }

    #[test]
    fn move_note_into_new_directory() {
        let (_temp, vault) = fixture();
        let moved = vault.move_note(&p("note1.md"), &p("archive/renamed")).unwrap();
        assert_eq!(moved.as_str(), "archive/renamed.md");
        assert!(!vault.root().join("note1.md").exists());
        assert!(vault.root().join("archive/renamed.md").exists());
    }

    #[test]
    fn move_onto_existing_conflicts() {
        let (_temp, vault) = fixture();
        let result = vault.move_note(&p("note1.md"), &p("note2.md"));
        assert!(matches!(result, Err(KbaseError::AlreadyExists(_))));
        assert!(vault.root().join("note1.md").exists());
    }

    #[test]
    fn copy_note_keeps_source() {
        let (_temp, vault) = fixture();
        vault.copy_note(&p("note1.md"), &p("subdir/copy.md")).unwrap();
        assert!(vault.root().join("note1.md").exists());
        assert_eq!(
            vault.get_note(&p("subdir/copy.md")).unwrap().content,
            vault.get_note(&p("note1.md")).unwrap().content
        );
    }

    #[test]
    fn copy_missing_source_is_not_found() {
        let (_temp, vault) = fixture();
        let result = vault.copy_note(&p("missing.md"), &p("x.md"));
        assert!(matches!(result, Err(KbaseError::NotFound(_))));
    }
}
