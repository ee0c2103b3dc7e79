use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::KbaseError;

/// Hidden per-vault directory; never listed in the file tree.
pub const VAULT_DIR: &str = ".kbase";

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_AUTOSAVE_MS: u64 = 750;

/// Per-vault settings stored at `<vault>/.kbase/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct VaultConfig {
    /// Display name; the vault directory's name unless set.
    pub name: String,
    /// Debounce delay for auto-save, in milliseconds.
    pub autosave_ms: u64,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            autosave_ms: DEFAULT_AUTOSAVE_MS,
        }
    }
}

impl VaultConfig {
    fn path(vault_root: &Path) -> PathBuf {
        vault_root.join(VAULT_DIR).join(CONFIG_FILE)
    }

    pub fn autosave_delay(&self) -> Duration {
        Duration::from_millis(self.autosave_ms)
    }

    /// Reads the vault's config, writing a fresh one on first open.
    pub fn load_or_init(vault_root: &Path) -> Result<Self, KbaseError> {
        let path = Self::path(vault_root);
        let mut config = if path.exists() {
            toml::from_str(&std::fs::read_to_string(&path)?)?
        } else {
            let config = Self::default();
            config.save(vault_root)?;
            config
        };

        if config.name.trim().is_empty() {
            config.name = vault_root
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("vault")
                .to_string();
        }
        Ok(config)
    }

    pub fn save(&self, vault_root: &Path) -> Result<(), KbaseError> {
        let path = Self::path(vault_root);
        std::fs::create_dir_all(vault_root.join(VAULT_DIR))?;
        std::fs::write(&path, toml::to_string_pretty(self)?)?;
        Ok(())
    }
}
