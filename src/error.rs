use std::fmt;

use crate::tabs::TabId;

/// Coarse classification used by the UI and the HTTP layer to decide how an
/// error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad path, reserved name, missing extension. Handled locally.
    Validation,
    /// Destination already exists.
    Conflict,
    NotFound,
    /// No response from the backend at all.
    Network,
    Unauthorized,
    Internal,
}

/// All fallible operations in the KBase workspace funnel through this type.
#[derive(Debug)]
pub enum KbaseError {
    Io(std::io::Error),
    Json(serde_json::Error),
    TomlDeserialize(toml::de::Error),
    TomlSerialize(toml::ser::Error),
    InvalidPath { path: String, reason: &'static str },
    PathTraversal(String),
    InvalidName { name: String, reason: &'static str },
    NotFound(String),
    AlreadyExists(String),
    NotAFile(String),
    NotADirectory(String),
    NotMarkdown(String),
    InvalidUtf8(String),
    DirectoryNotEmpty(String),
    IntoItself(String),
    UnknownTab(TabId),
    Network(String),
    Unauthorized,
    NoDataDir,
    NoOpenNote,
    UnsupportedImageType(String),
    UnsupportedImageExtension(String),
    /// Upload size in bytes.
    ImageTooLarge(u64),
}

impl KbaseError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPath { .. }
            | Self::PathTraversal(_)
            | Self::InvalidName { .. }
            | Self::NotAFile(_)
            | Self::NotADirectory(_)
            | Self::NotMarkdown(_)
            | Self::InvalidUtf8(_)
            | Self::DirectoryNotEmpty(_)
            | Self::IntoItself(_)
            | Self::NoOpenNote
            | Self::UnsupportedImageType(_)
            | Self::UnsupportedImageExtension(_)
            | Self::ImageTooLarge(_) => ErrorKind::Validation,
            Self::AlreadyExists(_) => ErrorKind::Conflict,
            Self::NotFound(_) | Self::UnknownTab(_) => ErrorKind::NotFound,
            Self::Network(_) => ErrorKind::Network,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Io(_)
            | Self::Json(_)
            | Self::TomlDeserialize(_)
            | Self::TomlSerialize(_)
            | Self::NoDataDir => ErrorKind::Internal,
        }
    }
}

impl fmt::Display for KbaseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(error) => write!(formatter, "IO error: {error}"),
            Self::Json(error) => write!(formatter, "JSON error: {error}"),
            Self::TomlDeserialize(error) => write!(formatter, "TOML parse error: {error}"),
            Self::TomlSerialize(error) => write!(formatter, "TOML serialize error: {error}"),
            Self::InvalidPath { path, reason } => write!(formatter, "Invalid path {path:?}: {reason}"),
            Self::PathTraversal(path) => write!(formatter, "Path traversal detected: {path}"),
            Self::InvalidName { name, reason } => write!(formatter, "Invalid name {name:?}: {reason}"),
            Self::NotFound(path) => write!(formatter, "Not found: {path}"),
            Self::AlreadyExists(path) => write!(formatter, "Destination already exists: {path}"),
            Self::NotAFile(path) => write!(formatter, "Path is not a file: {path}"),
            Self::NotADirectory(path) => write!(formatter, "Path is not a directory: {path}"),
            Self::NotMarkdown(path) => write!(formatter, "File is not a markdown file: {path}"),
            Self::InvalidUtf8(path) => write!(formatter, "File contains invalid UTF-8 content: {path}"),
            Self::DirectoryNotEmpty(path) => write!(
                formatter,
                "Directory is not empty: {path}. Use recursive=true to delete non-empty directories."
            ),
            Self::IntoItself(path) => write!(formatter, "Cannot move or copy directory into itself: {path}"),
            Self::UnknownTab(id) => write!(formatter, "No open tab with id {id}"),
            Self::Network(detail) => write!(formatter, "Backend unreachable: {detail}"),
            Self::Unauthorized => write!(formatter, "Invalid authentication credentials"),
            Self::NoDataDir => write!(formatter, "could not determine local data directory"),
            Self::NoOpenNote => write!(formatter, "No note is open"),
            Self::UnsupportedImageType(content_type) => write!(
                formatter,
                "Unsupported file type: {content_type}. Supported types: {}",
                crate::vault::IMAGE_CONTENT_TYPES.join(", ")
            ),
            Self::UnsupportedImageExtension(extension) => write!(
                formatter,
                "Unsupported file extension: {extension}. Supported extensions: {}",
                crate::vault::IMAGE_EXTENSIONS.join(", ")
            ),
            Self::ImageTooLarge(_) => write!(
                formatter,
                "File too large. Maximum size is {}MB",
                crate::vault::MAX_IMAGE_SIZE / (1024 * 1024)
            ),
        }
    }
}

impl std::error::Error for KbaseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(error) => Some(error),
            Self::Json(error) => Some(error),
            Self::TomlDeserialize(error) => Some(error),
            Self::TomlSerialize(error) => Some(error),
            _ => None,
        }
    }
}

impl From<std::io::Error> for KbaseError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error)
    }
}

impl From<serde_json::Error> for KbaseError {
    fn from(error: serde_json::Error) -> Self {
        Self::Json(error)
    }
}

impl From<toml::de::Error> for KbaseError {
    fn from(error: toml::de::Error) -> Self {
        Self::TomlDeserialize(error)
    }
}

impl From<toml::ser::Error> for KbaseError {
    fn from(error: toml::ser::Error) -> Self {
        Self::TomlSerialize(error)
    }
}

pub type Result<T, E = KbaseError> = std::result::Result<T, E>;
