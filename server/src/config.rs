use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ServerError;

/// Default token lifetime: seven days.
pub const DEFAULT_TOKEN_EXPIRE_MINUTES: i64 = 7 * 24 * 60;

/// Server settings from `server.toml`, overridden by environment variables.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub vault_path: Option<PathBuf>,
    pub host: String,
    pub port: u16,
    pub app_name: String,
    pub app_version: String,
    pub password: Option<String>,
    pub secret_key: Option<String>,
    pub disable_auth: bool,
    pub token_expire_minutes: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            vault_path: None,
            host: "0.0.0.0".to_string(),
            port: 8000,
            app_name: "KBase".to_string(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            password: None,
            secret_key: None,
            disable_auth: false,
            token_expire_minutes: DEFAULT_TOKEN_EXPIRE_MINUTES,
        }
    }
}

/// `$KBASE_CONFIG`, or `~/.config/kbase/server.toml`.
fn config_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("KBASE_CONFIG") {
        return Some(PathBuf::from(path));
    }
    dirs_next::config_dir().map(|dir| dir.join("kbase").join("server.toml"))
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

impl ServerConfig {
    /// Reads the config file (if any) and applies the process environment.
    pub fn load() -> Result<Self, ServerError> {
        let mut config = match config_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ServerError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Overrides fields from `VAULT_PATH`, `HOST`, `PORT`, `PASSWORD`,
    /// `SECRET_KEY`, `DISABLE_AUTH` and `TOKEN_EXPIRE_MINUTES`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ServerError> {
        if let Some(value) = lookup("VAULT_PATH") {
            self.vault_path = Some(PathBuf::from(value));
        }
        if let Some(value) = lookup("HOST") {
            self.host = value;
        }
        if let Some(value) = lookup("PORT") {
            self.port = value
                .parse()
                .map_err(|_| ServerError::Config(format!("PORT is not a valid port: {value}")))?;
        }
        if let Some(value) = lookup("PASSWORD") {
            self.password = Some(value);
        }
        if let Some(value) = lookup("SECRET_KEY") {
            self.secret_key = Some(value);
        }
        if let Some(value) = lookup("DISABLE_AUTH") {
            self.disable_auth = parse_flag(&value);
        }
        if let Some(value) = lookup("TOKEN_EXPIRE_MINUTES") {
            self.token_expire_minutes = value.parse().map_err(|_| {
                ServerError::Config(format!("TOKEN_EXPIRE_MINUTES is not a number: {value}"))
            })?;
        }
        Ok(())
    }

    pub fn auth_enabled(&self) -> bool {
        !self.disable_auth
    }

    /// The configured vault directory, which must exist.
    pub fn vault_dir(&self) -> Result<PathBuf, ServerError> {
        let path = self
            .vault_path
            .as_ref()
            .ok_or_else(|| ServerError::Config("VAULT_PATH is not set".to_string()))?;
        if !path.exists() {
            return Err(ServerError::Config(format!("Vault path does not exist: {}", path.display())));
        }
        if !path.is_dir() {
            return Err(ServerError::Config(format!(
                "Vault path is not a directory: {}",
                path.display()
            )));
        }
        Ok(path.canonicalize()?)
    }

    pub fn addr(&self) -> Result<SocketAddr, ServerError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| ServerError::Config(format!("invalid listen address {}:{}", self.host, self.port)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8000);
        assert_eq!(config.app_name, "KBase");
        assert_eq!(config.token_expire_minutes, 10080);
        assert!(config.auth_enabled());
    }

    #[test]
    fn environment_overrides_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("server.toml");
        std::fs::write(&path, "port = 9000\npassword = \"from-file\"\n").unwrap();

        let mut config = ServerConfig::from_file(&path).unwrap();
        assert_eq!(config.port, 9000);
        assert_eq!(config.host, "0.0.0.0");

        config
            .apply_env(env(&[("PASSWORD", "from-env"), ("DISABLE_AUTH", "true")]))
            .unwrap();
        assert_eq!(config.password.as_deref(), Some("from-env"));
        assert!(!config.auth_enabled());
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn bad_port_is_rejected() {
        let mut config = ServerConfig::default();
        assert!(config.apply_env(env(&[("PORT", "eighty")])).is_err());
    }

    #[test]
    fn vault_dir_must_exist() {
        let temp = TempDir::new().unwrap();
        let mut config = ServerConfig::default();
        assert!(config.vault_dir().is_err());

        config.vault_path = Some(temp.path().join("missing"));
        assert!(config.vault_dir().is_err());

        let file = temp.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        config.vault_path = Some(file);
        assert!(config.vault_dir().is_err());

        config.vault_path = Some(temp.path().to_path_buf());
        assert_eq!(config.vault_dir().unwrap(), temp.path().canonicalize().unwrap());
    }
}
