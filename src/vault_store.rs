//! Client-side orchestration of note and directory CRUD.
//!
//! User input is validated here before anything reaches the backend; backend
//! failures are kept as store-level error state for the UI and also returned.
//! Nothing is retried automatically.

use std::collections::HashMap;

use crate::error::{ErrorKind, KbaseError};
use crate::path::{validate_name, validate_note_name, VaultPath};
use crate::vault::{DirectoryListing, Note, TreeNode, Vault};

/// The vault operations the client depends on. [`Vault`] implements it
/// in-process; an HTTP client would implement it against the REST API.
pub trait NoteBackend: Send {
    fn list_tree(&self) -> Result<TreeNode, KbaseError>;
    fn get_note(&self, path: &VaultPath) -> Result<Note, KbaseError>;
    fn create_note(&self, path: &VaultPath, content: &str) -> Result<VaultPath, KbaseError>;
    fn update_note(&self, path: &VaultPath, content: &str) -> Result<VaultPath, KbaseError>;
    fn delete_note(&self, path: &VaultPath) -> Result<VaultPath, KbaseError>;
    fn move_note(&self, from: &VaultPath, to: &VaultPath) -> Result<VaultPath, KbaseError>;
    fn copy_note(&self, from: &VaultPath, to: &VaultPath) -> Result<VaultPath, KbaseError>;
    fn create_directory(&self, path: &VaultPath) -> Result<VaultPath, KbaseError>;
    fn get_directory(&self, path: &VaultPath) -> Result<DirectoryListing, KbaseError>;
    fn move_directory(&self, from: &VaultPath, to: &VaultPath) -> Result<VaultPath, KbaseError>;
    fn copy_directory(&self, from: &VaultPath, to: &VaultPath) -> Result<VaultPath, KbaseError>;
    fn delete_directory(&self, path: &VaultPath, recursive: bool) -> Result<VaultPath, KbaseError>;
}

impl NoteBackend for Vault {
    fn list_tree(&self) -> Result<TreeNode, KbaseError> {
        Vault::list_tree(self)
    }

    fn get_note(&self, path: &VaultPath) -> Result<Note, KbaseError> {
        Vault::get_note(self, path)
    }

    fn create_note(&self, path: &VaultPath, content: &str) -> Result<VaultPath, KbaseError> {
        Vault::create_note(self, path, content)
    }

    fn update_note(&self, path: &VaultPath, content: &str) -> Result<VaultPath, KbaseError> {
        Vault::update_note(self, path, content)
    }

    fn delete_note(&self, path: &VaultPath) -> Result<VaultPath, KbaseError> {
        Vault::delete_note(self, path)
    }

    fn move_note(&self, from: &VaultPath, to: &VaultPath) -> Result<VaultPath, KbaseError> {
        Vault::move_note(self, from, to)
    }

    fn copy_note(&self, from: &VaultPath, to: &VaultPath) -> Result<VaultPath, KbaseError> {
        Vault::copy_note(self, from, to)
    }

    fn create_directory(&self, path: &VaultPath) -> Result<VaultPath, KbaseError> {
        Vault::create_directory(self, path)
    }

    fn get_directory(&self, path: &VaultPath) -> Result<DirectoryListing, KbaseError> {
        Vault::get_directory(self, path)
    }

    fn move_directory(&self, from: &VaultPath, to: &VaultPath) -> Result<VaultPath, KbaseError> {
        Vault::move_directory(self, from, to)
    }

    fn copy_directory(&self, from: &VaultPath, to: &VaultPath) -> Result<VaultPath, KbaseError> {
        Vault::copy_directory(self, from, to)
    }

    fn delete_directory(&self, path: &VaultPath, recursive: bool) -> Result<VaultPath, KbaseError> {
        Vault::delete_directory(self, path, recursive)
    }
}

/// A backend failure as shown to the user.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreError {
    pub kind: ErrorKind,
    pub message: String,
}

pub struct VaultStore {
    backend: Box<dyn NoteBackend>,
    tree: Option<TreeNode>,
    cache: HashMap<VaultPath, Note>,
    last_error: Option<StoreError>,
}

/// Parses a user-typed note path and checks its file name.
fn note_path(raw: &str) -> Result<VaultPath, KbaseError> {
    let path = VaultPath::parse(raw)?;
    validate_note_name(path.file_name())?;
    Ok(path)
}

/// Parses a user-typed directory path and checks its last segment.
fn directory_path(raw: &str) -> Result<VaultPath, KbaseError> {
    let path = VaultPath::parse(raw)?;
    validate_name(path.file_name())?;
    Ok(path)
}

impl VaultStore {
    pub fn new(backend: Box<dyn NoteBackend>) -> Self {
        Self {
            backend,
            tree: None,
            cache: HashMap::new(),
            last_error: None,
        }
    }

    pub fn tree(&self) -> Option<&TreeNode> {
        self.tree.as_ref()
    }

    pub fn last_error(&self) -> Option<&StoreError> {
        self.last_error.as_ref()
    }

    pub fn clear_error(&mut self) {
        self.last_error = None;
    }

    pub fn cached(&self, path: &VaultPath) -> Option<&Note> {
        self.cache.get(path)
    }

    /// Replaces a cached note's text with content that is already saved elsewhere.
    pub fn set_cached_content(&mut self, path: &VaultPath, content: &str) {
        if let Some(note) = self.cache.get_mut(path) {
            note.content = content.to_string();
            note.size = content.len() as u64;
        }
    }

    /// Drops a note from the cache, e.g. when its tab closes.
    pub fn evict(&mut self, path: &VaultPath) {
        self.cache.remove(path);
    }

    /// Runs a backend call, recording failures as store error state.
    fn call<T>(&mut self, f: impl FnOnce(&dyn NoteBackend) -> Result<T, KbaseError>) -> Result<T, KbaseError> {
        match f(self.backend.as_ref()) {
            Ok(value) => {
                self.last_error = None;
                Ok(value)
            }
            Err(error) => {
                log::error!("Vault operation failed: {error}");
                self.last_error = Some(StoreError {
                    kind: error.kind(),
                    message: error.to_string(),
                });
                Err(error)
            }
        }
    }

    pub fn refresh_tree(&mut self) -> Result<&TreeNode, KbaseError> {
        let tree = self.call(|backend| backend.list_tree())?;
        Ok(self.tree.insert(tree))
    }

    /// Reloads the tree after a mutation; a failure here only updates the error state.
    fn refresh_after_mutation(&mut self) {
        let _ = self.refresh_tree();
    }

    /// Fetches a note from the backend and caches it.
    pub fn get_note(&mut self, path: &VaultPath) -> Result<&Note, KbaseError> {
        let note = self.call(|backend| backend.get_note(path))?;
        Ok(self.cache.entry(path.clone()).insert_entry(note).into_mut())
    }

    pub fn create_note(&mut self, raw_path: &str, content: &str) -> Result<VaultPath, KbaseError> {
        let path = note_path(raw_path)?;
        let created = self.call(|backend| backend.create_note(&path, content))?;
        self.refresh_after_mutation();
        Ok(created)
    }

    pub fn update_note(&mut self, path: &VaultPath, content: &str) -> Result<(), KbaseError> {
        self.call(|backend| backend.update_note(path, content))?;
        self.set_cached_content(path, content);
        Ok(())
    }

    pub fn delete_note(&mut self, path: &VaultPath) -> Result<(), KbaseError> {
        self.call(|backend| backend.delete_note(path))?;
        self.cache.remove(path);
        self.refresh_after_mutation();
        Ok(())
    }

    pub fn move_note(&mut self, from: &VaultPath, raw_destination: &str) -> Result<VaultPath, KbaseError> {
        let destination = note_path(raw_destination)?;
        let moved = self.call(|backend| backend.move_note(from, &destination))?;
        self.rekey(from, &moved);
        self.refresh_after_mutation();
        Ok(moved)
    }

    pub fn copy_note(&mut self, from: &VaultPath, raw_destination: &str) -> Result<VaultPath, KbaseError> {
        let destination = note_path(raw_destination)?;
        let copied = self.call(|backend| backend.copy_note(from, &destination))?;
        self.refresh_after_mutation();
        Ok(copied)
    }

    pub fn create_directory(&mut self, raw_path: &str) -> Result<VaultPath, KbaseError> {
        let path = directory_path(raw_path)?;
        let created = self.call(|backend| backend.create_directory(&path))?;
        self.refresh_after_mutation();
        Ok(created)
    }

    pub fn get_directory(&mut self, path: &VaultPath) -> Result<DirectoryListing, KbaseError> {
        self.call(|backend| backend.get_directory(path))
    }

    pub fn rename_directory(&mut self, path: &VaultPath, new_name: &str) -> Result<VaultPath, KbaseError> {
        let destination = path.with_file_name(new_name)?;
        self.move_directory(path, &destination.to_url_path())
    }

    pub fn move_directory(&mut self, from: &VaultPath, raw_destination: &str) -> Result<VaultPath, KbaseError> {
        let destination = directory_path(raw_destination)?;
        let moved = self.call(|backend| backend.move_directory(from, &destination))?;
        self.rekey(from, &moved);
        self.refresh_after_mutation();
        Ok(moved)
    }

    pub fn copy_directory(&mut self, from: &VaultPath, raw_destination: &str) -> Result<VaultPath, KbaseError> {
        let destination = directory_path(raw_destination)?;
        let copied = self.call(|backend| backend.copy_directory(from, &destination))?;
        self.refresh_after_mutation();
        Ok(copied)
    }

    pub fn delete_directory(&mut self, path: &VaultPath, recursive: bool) -> Result<(), KbaseError> {
        self.call(|backend| backend.delete_directory(path, recursive))?;
        self.cache.retain(|cached, _| !cached.starts_with(path));
        self.refresh_after_mutation();
        Ok(())
    }

    /// Moves cache entries at or under `from` to the same place under `to`.
    fn rekey(&mut self, from: &VaultPath, to: &VaultPath) {
        let moved: Vec<VaultPath> = self
            .cache
            .keys()
            .filter(|path| path.starts_with(from))
            .cloned()
            .collect();
        for old in moved {
            if let (Some(mut note), Some(new)) = (self.cache.remove(&old), old.rebase(from, to)) {
                note.path = new.clone();
                self.cache.insert(new, note);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vault::tests::fixture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend that fails every call with a fixed error and counts calls.
    struct FailingBackend {
        calls: Arc<AtomicUsize>,
        error: fn() -> KbaseError,
    }

    impl FailingBackend {
        fn fail<T>(&self) -> Result<T, KbaseError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err((self.error)())
        }
    }

    impl NoteBackend for FailingBackend {
        fn list_tree(&self) -> Result<TreeNode, KbaseError> {
            self.fail()
        }
        fn get_note(&self, _: &VaultPath) -> Result<Note, KbaseError> {
            self.fail()
        }
        fn create_note(&self, _: &VaultPath, _: &str) -> Result<VaultPath, KbaseError> {
            self.fail()
        }
        fn update_note(&self, _: &VaultPath, _: &str) -> Result<VaultPath, KbaseError> {
            self.fail()
        }
        fn delete_note(&self, _: &VaultPath) -> Result<VaultPath, KbaseError> {
            self.fail()
        }
        fn move_note(&self, _: &VaultPath, _: &VaultPath) -> Result<VaultPath, KbaseError> {
            self.fail()
        }
        fn copy_note(&self, _: &VaultPath, _: &VaultPath) -> Result<VaultPath, KbaseError> {
            self.fail()
        }
        fn create_directory(&self, _: &VaultPath) -> Result<VaultPath, KbaseError> {
            self.fail()
        }
        fn get_directory(&self, _: &VaultPath) -> Result<DirectoryListing, KbaseError> {
            self.fail()
        }
        fn move_directory(&self, _: &VaultPath, _: &VaultPath) -> Result<VaultPath, KbaseError> {
            self.fail()
        }
        fn copy_directory(&self, _: &VaultPath, _: &VaultPath) -> Result<VaultPath, KbaseError> {
            self.fail()
        }
        fn delete_directory(&self, _: &VaultPath, _: bool) -> Result<VaultPath, KbaseError> {
            self.fail()
        }
    }

    fn failing(error: fn() -> KbaseError) -> (VaultStore, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let backend = FailingBackend {
            calls: calls.clone(),
            error,
        };
        (VaultStore::new(Box::new(backend)), calls)
    }

    fn p(raw: &str) -> VaultPath {
        VaultPath::parse(raw).unwrap()
    }

    #[test]
    fn validation_errors_never_reach_backend() {
        let (mut store, calls) = failing(|| KbaseError::Network("down".into()));

        assert!(store.create_note("../escape.md", "").is_err());
        assert!(store.create_note("no-extension", "").is_err());
        assert!(store.create_note("dir/CON.md", "").is_err());
        assert!(store.move_note(&p("a.md"), "b").is_err());
        assert!(store.create_directory("bad:name").is_err());
        assert!(store.rename_directory(&p("dir"), "a/b").is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.last_error().is_none());
    }

    #[test]
    fn backend_errors_become_store_state() {
        let (mut store, calls) = failing(|| KbaseError::Network("connection refused".into()));
        assert!(store.get_note(&p("a.md")).is_err());

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let error = store.last_error().unwrap();
        assert_eq!(error.kind, ErrorKind::Network);
        assert!(error.message.contains("connection refused"));
    }

    #[test]
    fn auth_failures_are_not_network_failures() {
        let (mut store, _) = failing(|| KbaseError::Unauthorized);
        assert!(store.refresh_tree().is_err());
        assert_eq!(store.last_error().unwrap().kind, ErrorKind::Unauthorized);
    }

    #[test]
    fn conflicts_surface_without_retry() {
        let (_temp, vault) = fixture();
        let mut store = VaultStore::new(Box::new(vault));

        let result = store.create_note("note1.md", "dup");
        assert!(matches!(result, Err(KbaseError::AlreadyExists(_))));
        assert_eq!(store.last_error().unwrap().kind, ErrorKind::Conflict);

        store.clear_error();
        assert!(store.last_error().is_none());
    }

    #[test]
    fn get_note_caches_until_evicted() {
        let (_temp, vault) = fixture();
        let mut store = VaultStore::new(Box::new(vault));

        store.get_note(&p("note1.md")).unwrap();
        assert!(store.cached(&p("note1.md")).is_some());

        store.update_note(&p("note1.md"), "edited").unwrap();
        assert_eq!(store.cached(&p("note1.md")).unwrap().content, "edited");

        store.evict(&p("note1.md"));
        assert!(store.cached(&p("note1.md")).is_none());
    }

    #[test]
    fn mutations_refresh_the_tree() {
        let (_temp, vault) = fixture();
        let mut store = VaultStore::new(Box::new(vault));
        store.refresh_tree().unwrap();

        store.create_directory("projects").unwrap();
        store.create_note("projects/plan.md", "# Plan").unwrap();

        let tree = store.tree().unwrap();
        assert!(tree.find(&p("projects/plan.md")).is_some());
    }

    #[test]
    fn moving_directory_rekeys_cached_notes() {
        let (_temp, vault) = fixture();
        let mut store = VaultStore::new(Box::new(vault));
        store.get_note(&p("subdir/note3.md")).unwrap();

        store.rename_directory(&p("subdir"), "renamed").unwrap();

        assert!(store.cached(&p("subdir/note3.md")).is_none());
        let note = store.cached(&p("renamed/note3.md")).unwrap();
        assert_eq!(note.path, p("renamed/note3.md"));
    }

    #[test]
    fn deleting_directory_evicts_notes_under_it() {
        let (_temp, vault) = fixture();
        let mut store = VaultStore::new(Box::new(vault));
        store.get_note(&p("subdir/note3.md")).unwrap();
        store.get_note(&p("note1.md")).unwrap();

        store.delete_directory(&p("subdir"), true).unwrap();

        assert!(store.cached(&p("subdir/note3.md")).is_none());
        assert!(store.cached(&p("note1.md")).is_some());
    }
}
